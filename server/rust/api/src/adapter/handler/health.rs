use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use super::AppState;

pub async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "message": "Keycloak Auth Demo API",
        "docs": "/docs",
        "keycloak_admin": state.admin_console_url,
    }))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}
