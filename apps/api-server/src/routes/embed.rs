use super::AppState;
use crate::{ai::ImageDescription, error::ApiError, image_source};
use axum::{
    extract::{Multipart, Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize, Debug)]
pub struct ImageUrlQuery {
    pub image_url: String,
}

/// `GET /?image_url=...`
pub async fn describe_image_url(
    State(state): State<AppState>,
    Query(query): Query<ImageUrlQuery>,
) -> Result<Json<ImageDescription>, ApiError> {
    let image = image_source::load_image_from_url(&state.http_client, &query.image_url)
        .await
        .map_err(ApiError::LoadImage)?;

    let result = state
        .ai
        .describe(Arc::new(image))
        .await
        .map_err(ApiError::Processing)?;

    Ok(Json(result))
}

/// `POST /embed-image/` with the image in the multipart field `file`.
pub async fn embed_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ImageDescription>, ApiError> {
    let contents = read_multipart_field(&mut multipart, "file").await?;
    // the bytes were accepted as-is, a failed decode counts as a processing failure here
    let image = image_source::decode_rgb_image(&contents)
        .map_err(|e| ApiError::Processing(e.context("failed to decode image")))?;

    let result = state
        .ai
        .describe(Arc::new(image))
        .await
        .map_err(ApiError::Processing)?;

    Ok(Json(result))
}

/// Bytes of the first field called `name`; other fields are skipped.
pub(crate) async fn read_multipart_field(
    multipart: &mut Multipart,
    name: &str,
) -> Result<Vec<u8>, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(name) {
            let bytes = field.bytes().await?;
            return Ok(bytes.to_vec());
        }
    }

    Err(ApiError::InvalidUpload(format!("missing field `{}`", name)))
}
