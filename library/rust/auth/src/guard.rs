//! アクセスガード: 保護対象の操作を認証と任意のロール要件で囲む。
//!
//! 認証失敗の具体的な種別は診断ログにのみ出し、呼び出し元には
//! `AccessDenied::Unauthenticated` として一律に返す。

use crate::error::AuthError;
use crate::principal::Principal;
use crate::rbac::RoleRequirement;
use crate::verifier::TokenVerifier;
use std::sync::Arc;
use tracing::warn;

/// AccessDenied はガードが拒否した理由を表す。
#[derive(thiserror::Error, Debug)]
pub enum AccessDenied {
    /// 認証失敗。原因は診断用に保持するが外部には出さない。
    #[error("unauthenticated")]
    Unauthenticated(#[source] AuthError),

    /// 鍵配布エンドポイントに到達できない。呼び出し元は後で再試行する。
    #[error("authentication service unavailable")]
    Unavailable(#[source] AuthError),

    /// 認証済みだがロールが不足している。
    #[error("forbidden")]
    Forbidden(#[source] AuthError),
}

impl AccessDenied {
    /// 元になった認証エラーを返す（ログ・テスト用）。
    pub fn cause(&self) -> &AuthError {
        match self {
            AccessDenied::Unauthenticated(e)
            | AccessDenied::Unavailable(e)
            | AccessDenied::Forbidden(e) => e,
        }
    }
}

impl From<AuthError> for AccessDenied {
    fn from(err: AuthError) -> Self {
        if err.is_unavailable() {
            AccessDenied::Unavailable(err)
        } else if err.is_authentication_failure() {
            AccessDenied::Unauthenticated(err)
        } else {
            AccessDenied::Forbidden(err)
        }
    }
}

/// AccessGuard は TokenVerifier をラップし、認証・認可の判定を行う。
#[derive(Clone)]
pub struct AccessGuard {
    verifier: Arc<TokenVerifier>,
}

impl AccessGuard {
    pub fn new(verifier: Arc<TokenVerifier>) -> Self {
        Self { verifier }
    }

    /// トークンを検証し、有効な Principal を返す。
    pub async fn require_authenticated(&self, token: &str) -> Result<Principal, AccessDenied> {
        self.verifier.verify(token).await.map_err(|e| {
            warn!(kind = e.kind(), error = %e, "token rejected");
            AccessDenied::from(e)
        })
    }

    /// 認証に加えて、指定ロールの保持を要求する。
    pub async fn require_role(&self, token: &str, role: &str) -> Result<Principal, AccessDenied> {
        let principal = self.require_authenticated(token).await?;
        Self::check_role(principal, &RoleRequirement::new(role))
    }

    /// 認証済み Principal にロール要件を適用する。成功時は Principal をそのまま返す。
    pub fn check_role(
        principal: Principal,
        requirement: &RoleRequirement,
    ) -> Result<Principal, AccessDenied> {
        match requirement.check(&principal) {
            Ok(()) => Ok(principal),
            Err(e) => {
                warn!(
                    subject = %principal.subject(),
                    role = %requirement.role(),
                    "required role missing"
                );
                Err(AccessDenied::Forbidden(e))
            }
        }
    }
}
