//! トークン検証器: kid から鍵を解決し、署名と標準 Claim を検証して Principal を返す。

use crate::claims::Claims;
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::jwks::{JwksCache, KeySet, VerificationKey};
use crate::principal::Principal;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use std::sync::Arc;
use tracing::{debug, instrument};

/// TokenVerifier は JWKS キャッシュを使って Bearer トークンを検証する。
pub struct TokenVerifier {
    keys: Arc<JwksCache>,
    issuer: String,
    audience: Option<String>,
    validate_audience: bool,
    allowed_algorithms: Vec<Algorithm>,
    leeway_secs: u64,
}

impl TokenVerifier {
    /// 設定値と注入された鍵キャッシュから検証器を生成する。
    pub fn new(config: &AuthConfig, keys: Arc<JwksCache>) -> Self {
        Self {
            keys,
            issuer: config.issuer(),
            audience: config.audience.clone(),
            validate_audience: config.validate_audience,
            allowed_algorithms: config.allowed_algorithms.clone(),
            leeway_secs: config.leeway_secs,
        }
    }

    /// 設定から HTTP フェッチャー付きの鍵キャッシュを構築して検証器を生成する。
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        let keys = JwksCache::new(&config.jwks_url(), config.fetch_timeout())?;
        Ok(Self::new(config, Arc::new(keys)))
    }

    pub fn key_cache(&self) -> &Arc<JwksCache> {
        &self.keys
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// トークン文字列を検証し、Principal を返す。
    #[instrument(skip_all)]
    pub async fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        let header =
            decode_header(token).map_err(|e| AuthError::MalformedToken(e.to_string()))?;
        let kid = header
            .kid
            .ok_or_else(|| AuthError::MalformedToken("missing kid in header".into()))?;

        let keys = self.resolve_keys(&kid).await?;
        let key = keys.get(&kid).ok_or_else(|| AuthError::UnknownKey { kid: kid.clone() })?;

        let validation = self.validation_for(header.alg, key)?;
        let data = decode::<Claims>(token, &key.key, &validation).map_err(map_jwt_error)?;

        let principal = Principal::from_claims(data.claims)?;
        debug!(kid = %kid, subject = %principal.subject(), "token verified");
        Ok(principal)
    }

    /// kid を含む鍵セットを返す。見つからなければ一度だけ取り直す。
    /// 再取得後も無い場合はそのまま返し、呼び出し側で UnknownKey とする。
    async fn resolve_keys(&self, kid: &str) -> Result<Arc<KeySet>, AuthError> {
        let keys = self.keys.get_keys().await?;
        if keys.contains(kid) {
            return Ok(keys);
        }

        debug!(kid = %kid, "kid not in cached JWKS, refreshing once");
        self.keys.invalidate().await;
        self.keys.get_keys().await
    }

    /// ヘッダーの alg と鍵のメタデータから Validation を組み立てる。
    fn validation_for(
        &self,
        alg: Algorithm,
        key: &VerificationKey,
    ) -> Result<Validation, AuthError> {
        if !self.allowed_algorithms.contains(&alg) {
            return Err(AuthError::InvalidSignature(format!(
                "algorithm {alg:?} is not allowed"
            )));
        }
        if key.alg.is_some_and(|declared| declared != alg) {
            return Err(AuthError::InvalidSignature(format!(
                "algorithm {alg:?} does not match key {}",
                key.kid
            )));
        }
        if !key.family.supports(alg) {
            return Err(AuthError::InvalidSignature(format!(
                "algorithm {alg:?} cannot be verified with key {}",
                key.kid
            )));
        }

        let mut validation = Validation::new(alg);
        validation.leeway = self.leeway_secs;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iss"]);

        match (&self.audience, self.validate_audience) {
            (Some(aud), true) => validation.set_audience(&[aud]),
            (None, true) => {
                // 期待値が無いまま有効化された場合は aud の存在のみ要求する
                validation.set_required_spec_claims(&["exp", "iss", "aud"]);
                validation.validate_aud = false;
            }
            (_, false) => validation.validate_aud = false,
        }

        Ok(validation)
    }
}

/// jsonwebtoken のエラーを認証エラーの分類に写像する。
fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
        ErrorKind::InvalidIssuer => AuthError::IssuerMismatch,
        ErrorKind::InvalidAudience => AuthError::AudienceMismatch,
        ErrorKind::MissingRequiredClaim(claim) => match claim.as_str() {
            "exp" => AuthError::ExpiredToken,
            "iss" => AuthError::IssuerMismatch,
            "aud" => AuthError::AudienceMismatch,
            "sub" => AuthError::MissingSubject,
            other => AuthError::MalformedToken(format!("missing claim: {other}")),
        },
        ErrorKind::InvalidToken
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_) => AuthError::MalformedToken(err.to_string()),
        ErrorKind::ImmatureSignature => AuthError::NotYetValid,
        _ => AuthError::InvalidSignature(err.to_string()),
    }
}
