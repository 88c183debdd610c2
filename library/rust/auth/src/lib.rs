//! genesis-auth: サーバー用 JWT JWKS 検証 + RBAC ライブラリ
//!
//! Keycloak のレルムが公開する JWKS から公開鍵を取得し、Bearer トークンの
//! 署名・発行者・有効期限を検証して `Principal` を返す。鍵のローテーションは
//! 未知の kid を検出した時点で一度だけ JWKS を取り直すことで吸収する。
//!
//! # 使い方
//!
//! ```ignore
//! use genesis_auth::{AccessGuard, AuthConfig, TokenVerifier};
//! use std::sync::Arc;
//!
//! let config = AuthConfig::new("http://keycloak:8080", "genesis");
//! let verifier = Arc::new(TokenVerifier::from_config(&config)?);
//! let guard = AccessGuard::new(verifier);
//!
//! let principal = guard.require_role("eyJ...", "admin").await?;
//! ```

pub mod claims;
pub mod config;
pub mod error;
pub mod guard;
pub mod jwks;
pub mod middleware;
pub mod principal;
pub mod rbac;
pub mod verifier;

pub use claims::Claims;
pub use config::AuthConfig;
pub use error::AuthError;
pub use guard::{AccessDenied, AccessGuard};
pub use jwks::{HttpJwksFetcher, JwkSet, JwksCache, JwksFetcher, KeySet};
pub use principal::Principal;
pub use rbac::{has_role, RoleRequirement};
pub use verifier::TokenVerifier;
