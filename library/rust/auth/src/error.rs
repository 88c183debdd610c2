//! 認証・認可エラーの分類。

/// AuthError は認証・認可処理で発生するエラーを表す。
///
/// `InsufficientRole` 以外はすべて認証レイヤーの失敗であり、HTTP 境界では
/// 一律に「未認証」として扱われる。個別の種別は診断ログにのみ残す。
#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("missing Authorization header")]
    MissingToken,

    #[error("invalid Authorization header format")]
    InvalidAuthHeader,

    #[error("malformed token: {0}")]
    MalformedToken(String),

    #[error("JWKS fetch failed: {0}")]
    KeyFetch(String),

    #[error("unknown signing key: {kid}")]
    UnknownKey { kid: String },

    #[error("invalid token signature: {0}")]
    InvalidSignature(String),

    #[error("token expired")]
    ExpiredToken,

    #[error("token not yet valid")]
    NotYetValid,

    #[error("issuer mismatch")]
    IssuerMismatch,

    #[error("audience mismatch")]
    AudienceMismatch,

    #[error("token has no subject")]
    MissingSubject,

    #[error("role '{role}' required")]
    InsufficientRole { role: String },
}

impl AuthError {
    /// ログ出力用の種別名を返す。
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "missing_token",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::MalformedToken(_) => "malformed_token",
            AuthError::KeyFetch(_) => "key_fetch",
            AuthError::UnknownKey { .. } => "unknown_key",
            AuthError::InvalidSignature(_) => "invalid_signature",
            AuthError::ExpiredToken => "expired_token",
            AuthError::NotYetValid => "not_yet_valid",
            AuthError::IssuerMismatch => "issuer_mismatch",
            AuthError::AudienceMismatch => "audience_mismatch",
            AuthError::MissingSubject => "missing_subject",
            AuthError::InsufficientRole { .. } => "insufficient_role",
        }
    }

    /// 発行者側の鍵配布エンドポイントに到達できない場合に true を返す。
    /// 呼び出し元の過失ではないため、503 として扱う。
    pub fn is_unavailable(&self) -> bool {
        matches!(self, AuthError::KeyFetch(_))
    }

    /// 認可（ロール不足）ではなく認証の失敗であれば true を返す。
    pub fn is_authentication_failure(&self) -> bool {
        !matches!(
            self,
            AuthError::InsufficientRole { .. } | AuthError::KeyFetch(_)
        )
    }
}
