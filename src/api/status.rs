//! Health and status endpoints.

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/status", get(status))
}

async fn root() -> Json<Value> {
    Json(json!({ "service": "gatehouse" }))
}

async fn status() -> Json<Value> {
    Json(json!({
        "ok": true,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
