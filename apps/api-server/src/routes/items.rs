use axum::{
    extract::{Path, Query},
    Json,
};
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Debug)]
pub struct ItemQuery {
    pub q: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct ItemResponse {
    pub item_id: i64,
    pub q: Option<String>,
}

/// `GET /items/:item_id?q=...` echoes its parameters.
pub async fn read_item(
    Path(item_id): Path<i64>,
    Query(query): Query<ItemQuery>,
) -> Json<ItemResponse> {
    Json(ItemResponse {
        item_id,
        q: query.q,
    })
}
