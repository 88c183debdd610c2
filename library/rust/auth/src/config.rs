//! 認証設定。外部のローダーが読み込んだ値をそのまま受け取る。

use jsonwebtoken::Algorithm;
use serde::Deserialize;
use std::time::Duration;

/// AuthConfig はトークン検証に必要な設定値を表す。
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// JWKS 取得に使う Keycloak のベース URL（サービス間通信用の内部 URL）
    pub issuer_base_url: String,

    /// トークンの iss に現れる公開 URL。未指定時は issuer_base_url と同じ。
    #[serde(default)]
    pub public_base_url: Option<String>,

    /// レルム名
    pub realm: String,

    /// 期待する iss の明示指定。未指定時は `{public_base_url}/realms/{realm}`。
    #[serde(default)]
    pub expected_issuer: Option<String>,

    /// 期待するオーディエンス（validate_audience が true のときのみ使用）
    #[serde(default)]
    pub audience: Option<String>,

    /// Keycloak は全トークンに既定の aud を付与するため、既定では検証しない。
    #[serde(default)]
    pub validate_audience: bool,

    #[serde(default = "default_allowed_algorithms")]
    pub allowed_algorithms: Vec<Algorithm>,

    /// exp 判定の許容秒数
    #[serde(default)]
    pub leeway_secs: u64,

    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

fn default_allowed_algorithms() -> Vec<Algorithm> {
    vec![Algorithm::RS256]
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

impl AuthConfig {
    /// 必須項目のみを指定して生成する。その他は既定値。
    pub fn new(issuer_base_url: &str, realm: &str) -> Self {
        Self {
            issuer_base_url: issuer_base_url.to_string(),
            public_base_url: None,
            realm: realm.to_string(),
            expected_issuer: None,
            audience: None,
            validate_audience: false,
            allowed_algorithms: default_allowed_algorithms(),
            leeway_secs: 0,
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }

    /// JWKS エンドポイントの URL を返す。
    pub fn jwks_url(&self) -> String {
        format!(
            "{}/realms/{}/protocol/openid-connect/certs",
            self.issuer_base_url.trim_end_matches('/'),
            self.realm
        )
    }

    /// iss Claim と照合する発行者文字列を返す。
    pub fn issuer(&self) -> String {
        if let Some(ref iss) = self.expected_issuer {
            return iss.clone();
        }
        let base = self
            .public_base_url
            .as_deref()
            .unwrap_or(&self.issuer_base_url);
        format!("{}/realms/{}", base.trim_end_matches('/'), self.realm)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}
