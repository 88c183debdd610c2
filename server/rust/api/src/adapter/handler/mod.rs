pub mod health;
pub mod user_handler;

use axum::http::HeaderValue;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::get;
use axum::Router;
use genesis_auth::middleware::{auth_middleware, require_role, AuthState};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::infrastructure::config::CorsConfig;

#[derive(Clone)]
pub struct AppState {
    pub auth_state: AuthState,
    pub admin_console_url: String,
}

pub fn router(state: AppState, cors: &CorsConfig) -> Router {
    let public_routes = Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health));

    // 認証済みであれば誰でもアクセス可能
    let user_routes = Router::new()
        .route("/api/me", get(user_handler::me))
        .route("/api/protected", get(user_handler::protected));

    // admin ロール必須
    let admin_routes = Router::new()
        .route("/api/admin", get(user_handler::admin))
        .route_layer(from_fn(require_role("admin")));

    let api_routes = user_routes
        .merge(admin_routes)
        .layer(from_fn_with_state(state.auth_state.clone(), auth_middleware));

    public_routes
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors))
        .with_state(state)
}

/// 設定されたオリジンのみを許可する CORS レイヤー。資格情報付きリクエストを許可する。
fn cors_layer(cors: &CorsConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = cors
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}
