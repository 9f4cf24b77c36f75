//! Stand-alone captioning page, served by the `caption-demo` binary.
//!
//! Only the caption model is ever loaded here; the embedding worker is created
//! alongside it but never receives a message.

use crate::{
    ai::AIHandler, config::Config, error::ApiError, image_source, routes::read_multipart_field,
    standalone::shutdown_signal,
};
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    response::Html,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct CaptionResponse {
    pub caption: String,
}

async fn index() -> Html<&'static str> {
    Html(include_str!("index.html"))
}

/// `POST /caption` with the image in the multipart field `image`.
async fn caption_image(
    State(handler): State<AIHandler>,
    mut multipart: Multipart,
) -> Result<Json<CaptionResponse>, ApiError> {
    let contents = read_multipart_field(&mut multipart, "image").await?;
    let image = image_source::decode_rgb_image(&contents).map_err(ApiError::LoadImage)?;

    let caption = handler
        .caption(Arc::new(image))
        .await
        .map_err(ApiError::Processing)?;

    Ok(Json(CaptionResponse { caption }))
}

pub fn get_demo_routes(handler: AIHandler, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/caption", post(caption_image))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(handler)
}

pub async fn start_demo() -> anyhow::Result<()> {
    analytics_tracing::init_tracing();
    let config = Config::from_env()?;

    let handler = AIHandler::new(&config.models)?;
    tracing::info!("loading {}", handler.image_caption.model_id());
    handler.image_caption.ready().await?;

    let app = get_demo_routes(handler, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(config.caption_demo_addr).await?;
    tracing::info!("Caption demo on http://{}", config.caption_demo_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::tests::{fake_handler, json_body, multipart_request, png_bytes};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use image::{Rgb, RgbImage};
    use tower::ServiceExt;

    fn app() -> Router {
        get_demo_routes(fake_handler(), 1024 * 1024)
    }

    #[test_log::test(tokio::test)]
    async fn test_index_page() {
        let response = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let html = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(html.contains("type=\"file\""));
        assert!(html.contains("fetch('caption'"));
    }

    #[test_log::test(tokio::test)]
    async fn test_caption() {
        let image = RgbImage::from_pixel(4, 3, Rgb([0, 0, 0]));
        let response = app()
            .oneshot(multipart_request("/caption", "image", &png_bytes(image)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({ "caption": "a 4x3 picture" })
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_caption_corrupt_image() {
        let response = app()
            .oneshot(multipart_request("/caption", "image", b"\x89PNG broken"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["error"].is_string());
    }

    #[test_log::test(tokio::test)]
    async fn test_demo_has_no_embedding_route() {
        let image = RgbImage::from_pixel(4, 3, Rgb([0, 0, 0]));
        let response = app()
            .oneshot(multipart_request("/embed-image/", "file", &png_bytes(image)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
