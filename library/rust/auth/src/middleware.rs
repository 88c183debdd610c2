//! axum 用の認証ミドルウェア。

use crate::error::AuthError;
use crate::guard::{AccessDenied, AccessGuard};
use crate::principal::Principal;
use crate::rbac::RoleRequirement;
use axum::{
    body::Body,
    extract::{FromRequestParts, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use http::{header, request::Parts, HeaderValue, StatusCode};
use serde_json::json;

/// ミドルウェアファクトリの戻り値型。
type AuthMiddlewareFuture = std::pin::Pin<
    Box<dyn std::future::Future<Output = Result<Response, AuthErrorResponse>> + Send>,
>;

/// 鍵配布エンドポイント障害時に返す Retry-After 秒数。
const RETRY_AFTER_SECS: &str = "5";

/// AuthState はミドルウェアが使用する共有状態。
#[derive(Clone)]
pub struct AuthState {
    pub guard: AccessGuard,
}

/// auth_middleware は JWT 認証ミドルウェア。
/// Authorization ヘッダーから Bearer トークンを取得し、JWKS 検証を行う。
/// 検証成功時は Principal をリクエストエクステンションに格納する。
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AuthErrorResponse> {
    let token = extract_bearer_token(&req)?;

    let principal = state
        .guard
        .require_authenticated(&token)
        .await
        .map_err(AuthErrorResponse::from)?;

    req.extensions_mut().insert(principal);

    Ok(next.run(req).await)
}

/// require_role は指定ロールを必須とするミドルウェアファクトリ。
/// auth_middleware の後に使用すること。
pub fn require_role(
    role: &'static str,
) -> impl Fn(Request<Body>, Next) -> AuthMiddlewareFuture + Clone {
    let requirement = RoleRequirement::new(role);
    move |req: Request<Body>, next: Next| {
        let requirement = requirement.clone();
        Box::pin(async move {
            let principal = req
                .extensions()
                .get::<Principal>()
                .cloned()
                .ok_or_else(AuthErrorResponse::unauthenticated)?;

            AccessGuard::check_role(principal, &requirement).map_err(AuthErrorResponse::from)?;

            Ok(next.run(req).await)
        })
    }
}

/// AuthenticatedUser は auth_middleware が格納した Principal を取り出すエクストラクタ。
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub Principal);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthErrorResponse;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(AuthenticatedUser)
            .ok_or_else(AuthErrorResponse::unauthenticated)
    }
}

/// Bearer トークンを Authorization ヘッダーから取得する。
fn extract_bearer_token(req: &Request<Body>) -> Result<String, AuthErrorResponse> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AuthErrorResponse::rejected(AuthError::MissingToken))?;

    let parts: Vec<&str> = auth_header.splitn(2, ' ').collect();
    if parts.len() != 2 || !parts[0].eq_ignore_ascii_case("Bearer") {
        return Err(AuthErrorResponse::rejected(AuthError::InvalidAuthHeader));
    }

    let token = parts[1].trim();
    if token.is_empty() {
        return Err(AuthErrorResponse::rejected(AuthError::MissingToken));
    }

    Ok(token.to_string())
}

/// AuthErrorResponse は認証・認可エラーの HTTP レスポンス。
#[derive(Debug)]
pub struct AuthErrorResponse {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl AuthErrorResponse {
    fn rejected(err: AuthError) -> Self {
        tracing::debug!(kind = err.kind(), "request rejected before verification");
        Self::from(AccessDenied::from(err))
    }

    fn unauthenticated() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: "AUTH_UNAUTHENTICATED".into(),
            message: "Authentication required".into(),
        }
    }

    fn forbidden(role: &str) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            code: "AUTH_FORBIDDEN".into(),
            message: format!("Role '{role}' required"),
        }
    }

    fn unavailable() -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            code: "AUTH_JWKS_UNAVAILABLE".into(),
            message: "Could not fetch JWKS keys".into(),
        }
    }
}

impl From<AccessDenied> for AuthErrorResponse {
    fn from(denied: AccessDenied) -> Self {
        match denied {
            // 種別はトークン偽造の手掛かりになるため外部には出さない
            AccessDenied::Unauthenticated(_) => Self::unauthenticated(),
            AccessDenied::Unavailable(_) => Self::unavailable(),
            AccessDenied::Forbidden(AuthError::InsufficientRole { role }) => Self::forbidden(&role),
            AccessDenied::Forbidden(_) => Self {
                status: StatusCode::FORBIDDEN,
                code: "AUTH_FORBIDDEN".into(),
                message: "Insufficient permissions".into(),
            },
        }
    }
}

impl IntoResponse for AuthErrorResponse {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.code,
            "message": self.message,
        });

        let mut resp = (self.status, Json(body)).into_response();
        match self.status {
            StatusCode::UNAUTHORIZED => {
                resp.headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            }
            StatusCode::SERVICE_UNAVAILABLE => {
                resp.headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECS));
            }
            _ => {}
        }
        resp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::principal::test_principal;
    use axum::{middleware::from_fn, routing::get, Router};
    use tower::ServiceExt;

    fn request(auth: Option<&str>) -> Request<Body> {
        let mut builder = http::Request::builder().uri("/");
        if let Some(v) = auth {
            builder = builder.header(header::AUTHORIZATION, v);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(
            extract_bearer_token(&request(Some("Bearer abc.def.ghi"))).unwrap(),
            "abc.def.ghi"
        );
        assert_eq!(
            extract_bearer_token(&request(Some("bearer  abc"))).unwrap(),
            "abc"
        );

        let err = extract_bearer_token(&request(None)).unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);

        let err = extract_bearer_token(&request(Some("Basic dXNlcjpwYXNz"))).unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);

        let err = extract_bearer_token(&request(Some("Bearer   "))).unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_error_response_mapping() {
        let resp = AuthErrorResponse::from(AccessDenied::Unauthenticated(AuthError::ExpiredToken));
        assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
        assert!(!resp.message.contains("expired"));

        let resp = AuthErrorResponse::from(AccessDenied::Unavailable(AuthError::KeyFetch(
            "refused".into(),
        )));
        assert_eq!(resp.status, StatusCode::SERVICE_UNAVAILABLE);

        let resp = AuthErrorResponse::from(AccessDenied::Forbidden(AuthError::InsufficientRole {
            role: "admin".into(),
        }));
        assert_eq!(resp.status, StatusCode::FORBIDDEN);
        assert_eq!(resp.message, "Role 'admin' required");
    }

    #[test]
    fn test_into_response_headers() {
        let resp = AuthErrorResponse::unauthenticated().into_response();
        assert_eq!(resp.headers()[header::WWW_AUTHENTICATE], "Bearer");

        let resp = AuthErrorResponse::unavailable().into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(resp.headers()[header::RETRY_AFTER], RETRY_AFTER_SECS);
    }

    async fn status_with_principal(principal: Option<Principal>) -> StatusCode {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .route_layer(from_fn(require_role("admin")));

        let mut req = request(None);
        if let Some(p) = principal {
            req.extensions_mut().insert(p);
        }
        app.oneshot(req).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_require_role_middleware() {
        assert_eq!(status_with_principal(None).await, StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_with_principal(Some(test_principal("u1", &["user"]))).await,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_with_principal(Some(test_principal("u1", &["admin"]))).await,
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn test_authenticated_user_extractor() {
        let app = Router::new().route(
            "/",
            get(|AuthenticatedUser(p): AuthenticatedUser| async move { p.subject().to_string() }),
        );

        let resp = app.clone().oneshot(request(None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let mut req = request(None);
        req.extensions_mut().insert(test_principal("u123", &[]));
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
