use axum::Json;
use genesis_auth::middleware::AuthenticatedUser;
use genesis_auth::Principal;
use serde::Serialize;
use serde_json::{json, Value};

/// /api/me のレスポンス。
#[derive(Debug, Serialize)]
pub struct UserInfoResponse {
    pub user_id: String,
    pub email: Option<String>,
    pub username: Option<String>,
    pub name: String,
    pub roles: Vec<String>,
}

impl From<&Principal> for UserInfoResponse {
    fn from(p: &Principal) -> Self {
        Self {
            user_id: p.subject().to_string(),
            email: p.email().map(str::to_string),
            username: p.preferred_username().map(str::to_string),
            name: p.display_name(),
            roles: p.roles().iter().cloned().collect(),
        }
    }
}

pub async fn me(AuthenticatedUser(principal): AuthenticatedUser) -> Json<UserInfoResponse> {
    Json(UserInfoResponse::from(&principal))
}

pub async fn protected(AuthenticatedUser(principal): AuthenticatedUser) -> Json<Value> {
    Json(json!({
        "message": "This is a protected endpoint",
        "user_id": principal.subject(),
        "access": "granted",
    }))
}

pub async fn admin(AuthenticatedUser(principal): AuthenticatedUser) -> Json<Value> {
    Json(json!({
        "message": "Welcome to the admin area!",
        "user_id": principal.subject(),
        "access": "admin",
    }))
}
