mod embed;
mod items;

pub(crate) use embed::read_multipart_field;


use crate::ai::AIHandler;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

#[derive(Clone, Debug)]
pub struct AppState {
    pub ai: AIHandler,
    pub http_client: reqwest::Client,
}

impl AppState {
    pub fn new(ai: AIHandler) -> Self {
        Self {
            ai,
            http_client: reqwest::Client::new(),
        }
    }
}

pub fn get_routes(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(embed::describe_image_url))
        .route("/items/:item_id", get(items::read_item))
        .route("/embed-image/", post(embed::embed_image))
        .route("/embed-image", post(embed::embed_image))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer({
            let cors = CorsLayer::new()
                .allow_methods(Any)
                .allow_headers(Any)
                .allow_origin(Any);
            cors
        })
        .with_state(state)
}
