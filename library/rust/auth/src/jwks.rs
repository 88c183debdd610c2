//! JWKS キャッシュ: 発行者の公開鍵セットを HTTP で取得しプロセス内に保持する。
//!
//! 鍵セットは初回利用時に取得し、時間では失効させない。未知の kid を含む
//! トークンを受け取った場合にのみ検証器が `invalidate` を呼び、次回の
//! `get_keys` で丸ごと取り直す。

use crate::error::AuthError;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// JWKS レスポンスの構造体。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JwkSet {
    #[serde(default)]
    pub keys: Vec<Jwk>,
}

/// 個々の JWK 鍵。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,

    // RSA
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,

    // EC
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

/// 鍵の系統。ヘッダーの alg がこの系統に属さない場合は署名不正として扱う。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    Rsa,
    EcP256,
    EcP384,
}

impl KeyFamily {
    /// この系統の鍵で検証できるアルゴリズムかを判定する。
    pub fn supports(self, alg: Algorithm) -> bool {
        match self {
            KeyFamily::Rsa => matches!(
                alg,
                Algorithm::RS256
                    | Algorithm::RS384
                    | Algorithm::RS512
                    | Algorithm::PS256
                    | Algorithm::PS384
                    | Algorithm::PS512
            ),
            KeyFamily::EcP256 => alg == Algorithm::ES256,
            KeyFamily::EcP384 => alg == Algorithm::ES384,
        }
    }
}

/// VerificationKey は kid に紐づく検証用公開鍵と、そのメタデータ。
#[derive(Clone)]
pub struct VerificationKey {
    pub kid: String,
    pub family: KeyFamily,
    /// JWK に宣言された alg。宣言が無い鍵は系統のみで判定する。
    pub alg: Option<Algorithm>,
    pub key: DecodingKey,
}

impl std::fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationKey")
            .field("kid", &self.kid)
            .field("family", &self.family)
            .field("alg", &self.alg)
            .finish_non_exhaustive()
    }
}

impl VerificationKey {
    /// JWK を検証鍵に変換する。署名に使えない鍵は Err を返す。
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, String> {
        if jwk.key_use.as_deref() == Some("enc") {
            return Err("encryption key".into());
        }
        let kid = jwk.kid.clone().ok_or("missing 'kid'")?;
        let alg = match jwk.alg.as_deref() {
            Some(a) => Some(Algorithm::from_str(a).map_err(|e| format!("alg {a}: {e}"))?),
            None => None,
        };

        let (family, key) = match jwk.kty.as_str() {
            "RSA" => {
                let n = jwk.n.as_deref().ok_or("RSA key missing 'n'")?;
                let e = jwk.e.as_deref().ok_or("RSA key missing 'e'")?;
                let key = DecodingKey::from_rsa_components(n, e).map_err(|e| e.to_string())?;
                (KeyFamily::Rsa, key)
            }
            "EC" => {
                let family = match jwk.crv.as_deref() {
                    Some("P-256") => KeyFamily::EcP256,
                    Some("P-384") => KeyFamily::EcP384,
                    Some(crv) => return Err(format!("unsupported EC curve: {crv}")),
                    None => return Err("EC key missing 'crv'".into()),
                };
                let x = jwk.x.as_deref().ok_or("EC key missing 'x'")?;
                let y = jwk.y.as_deref().ok_or("EC key missing 'y'")?;
                let key = DecodingKey::from_ec_components(x, y).map_err(|e| e.to_string())?;
                (family, key)
            }
            kty => return Err(format!("unsupported key type: {kty}")),
        };

        if let Some(alg) = alg {
            if !family.supports(alg) {
                return Err(format!("alg {alg:?} does not match key type {}", jwk.kty));
            }
        }

        Ok(Self {
            kid,
            family,
            alg,
            key,
        })
    }
}

/// KeySet は kid から検証鍵へのマッピング。一度構築したら変更しない。
#[derive(Debug, Default)]
pub struct KeySet {
    keys: HashMap<String, VerificationKey>,
}

impl KeySet {
    /// JWKS ドキュメントから鍵セットを構築する。
    /// 変換できない鍵と重複した kid はスキップする。
    pub fn from_jwks(jwks: &JwkSet) -> Self {
        let mut keys = HashMap::new();
        for jwk in &jwks.keys {
            match VerificationKey::from_jwk(jwk) {
                Ok(key) => {
                    if keys.contains_key(&key.kid) {
                        warn!(kid = %key.kid, "duplicate kid in JWKS, keeping the first entry");
                        continue;
                    }
                    debug!(kid = %key.kid, kty = %jwk.kty, "loaded JWK");
                    keys.insert(key.kid.clone(), key);
                }
                Err(reason) => {
                    warn!(kid = ?jwk.kid, kty = %jwk.kty, reason = %reason, "skipping JWK");
                }
            }
        }
        Self { keys }
    }

    pub fn get(&self, kid: &str) -> Option<&VerificationKey> {
        self.keys.get(kid)
    }

    pub fn contains(&self, kid: &str) -> bool {
        self.keys.contains_key(kid)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn kids(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }
}

/// JwksFetcher は JWKS エンドポイントからの鍵取得を抽象化するトレイト。
#[async_trait::async_trait]
pub trait JwksFetcher: Send + Sync {
    async fn fetch_keys(&self, jwks_url: &str) -> Result<JwkSet, AuthError>;
}

/// HttpJwksFetcher は reqwest で JWKS を取得するデフォルト実装。
pub struct HttpJwksFetcher {
    client: reqwest::Client,
}

impl HttpJwksFetcher {
    /// タイムアウト付きの HTTP クライアントで生成する。
    pub fn new(timeout: Duration) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::KeyFetch(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl JwksFetcher for HttpJwksFetcher {
    async fn fetch_keys(&self, jwks_url: &str) -> Result<JwkSet, AuthError> {
        let resp = self
            .client
            .get(jwks_url)
            .send()
            .await
            .map_err(|e| AuthError::KeyFetch(e.to_string()))?
            .error_for_status()
            .map_err(|e| AuthError::KeyFetch(e.to_string()))?;

        resp.json::<JwkSet>()
            .await
            .map_err(|e| AuthError::KeyFetch(format!("invalid JWKS body: {e}")))
    }
}

/// JwksCache は発行者の鍵セットを保持する共有キャッシュ。
///
/// 同時に複数のリクエストが空のキャッシュを観測しても、取得は
/// `fill_lock` で直列化されるためネットワーク呼び出しは一度で済む。
pub struct JwksCache {
    jwks_url: String,
    fetcher: Arc<dyn JwksFetcher>,
    cache: RwLock<Option<Arc<KeySet>>>,
    fill_lock: Mutex<()>,
}

impl JwksCache {
    /// HTTP フェッチャーを使う JwksCache を生成する。
    pub fn new(jwks_url: &str, fetch_timeout: Duration) -> Result<Self, AuthError> {
        let fetcher = HttpJwksFetcher::new(fetch_timeout)?;
        Ok(Self::with_fetcher(jwks_url, Arc::new(fetcher)))
    }

    /// カスタムフェッチャーを使う JwksCache を生成する（テスト用）。
    pub fn with_fetcher(jwks_url: &str, fetcher: Arc<dyn JwksFetcher>) -> Self {
        Self {
            jwks_url: jwks_url.to_string(),
            fetcher,
            cache: RwLock::new(None),
            fill_lock: Mutex::new(()),
        }
    }

    /// キャッシュ済みの鍵セットを返す。未取得なら取得して保持する。
    /// 取得失敗は内部で再試行しない。
    pub async fn get_keys(&self) -> Result<Arc<KeySet>, AuthError> {
        if let Some(keys) = self.cache.read().await.as_ref() {
            debug!("JWKS cache hit");
            return Ok(Arc::clone(keys));
        }

        let _fill = self.fill_lock.lock().await;

        // ダブルチェック
        if let Some(keys) = self.cache.read().await.as_ref() {
            return Ok(Arc::clone(keys));
        }

        debug!(url = %self.jwks_url, "fetching JWKS");
        let jwks = match self.fetcher.fetch_keys(&self.jwks_url).await {
            Ok(jwks) => jwks,
            Err(e) => {
                warn!(url = %self.jwks_url, error = %e, "JWKS fetch failed");
                return Err(e);
            }
        };

        let keys = Arc::new(KeySet::from_jwks(&jwks));
        if keys.is_empty() {
            warn!(url = %self.jwks_url, "JWKS contains no usable signing keys");
        }
        info!(
            url = %self.jwks_url,
            key_count = keys.len(),
            kids = ?keys.kids().collect::<Vec<_>>(),
            "JWKS cache refreshed"
        );

        *self.cache.write().await = Some(Arc::clone(&keys));
        Ok(keys)
    }

    /// キャッシュを破棄する。次回の get_keys で再取得される。
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
        debug!(url = %self.jwks_url, "JWKS cache invalidated");
    }

    /// 起動時に鍵セットを先読みする。取得できた鍵の数を返す。
    pub async fn prewarm(&self) -> Result<usize, AuthError> {
        Ok(self.get_keys().await?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const RSA_N: &str = "0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAtVT86zwu1RK7aPFFxuhDR1L6tSoc_BJECPebWKRXjBZCiFV4n3oknjhMstn64tZ_2W-5JsGY4Hc5n9yBXArwl93lqt7_RN5w6Cf0h4QyQ5v-65YGjQR0_FDW2QvzqY368QQMicAtaSqzs8KJZgnYb9c7d0zgdAZHzu6qMQvRL5hajrn1n91CbOpbISD08qNLyrdkt-bFTWhAI4vMQFh6WeZu0fM4lFd2NcRwr3XPksINHaQ-G_xBniIqbw0Ls1jF44-csFCur-kEgU8awapJzKnqDKgw";

    fn rsa_jwk(kid: &str) -> Jwk {
        Jwk {
            kty: "RSA".into(),
            kid: Some(kid.into()),
            alg: Some("RS256".into()),
            key_use: Some("sig".into()),
            n: Some(RSA_N.into()),
            e: Some("AQAB".into()),
            ..Jwk::default()
        }
    }

    struct StaticFetcher {
        jwks: JwkSet,
        count: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl JwksFetcher for StaticFetcher {
        async fn fetch_keys(&self, _jwks_url: &str) -> Result<JwkSet, AuthError> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(self.jwks.clone())
        }
    }

    #[test]
    fn test_keyset_skips_unusable_keys() {
        let mut enc = rsa_jwk("enc-key");
        enc.key_use = Some("enc".into());
        let mut no_kid = rsa_jwk("x");
        no_kid.kid = None;
        let oct = Jwk {
            kty: "oct".into(),
            kid: Some("hmac".into()),
            ..Jwk::default()
        };
        let mut wrong_alg = rsa_jwk("wrong-alg");
        wrong_alg.alg = Some("ES256".into());

        let jwks = JwkSet {
            keys: vec![rsa_jwk("k1"), enc, no_kid, oct, wrong_alg],
        };
        let set = KeySet::from_jwks(&jwks);

        assert_eq!(set.len(), 1);
        assert!(set.contains("k1"));
        assert!(!set.contains("enc-key"));
        assert!(!set.contains("hmac"));
        assert!(!set.contains("wrong-alg"));
    }

    #[test]
    fn test_ec_key_conversion() {
        let jwk = Jwk {
            kty: "EC".into(),
            kid: Some("ec-1".into()),
            alg: Some("ES256".into()),
            crv: Some("P-256".into()),
            x: Some("MKBCTNIcKUSDii11ySs3526iDZ8AiTo7Tu6KPAqv7D4".into()),
            y: Some("4Etl6SRW2YiLUrN5vfvVHuhp7x8PxltmWWlbbM4IFyM".into()),
            ..Jwk::default()
        };
        let key = VerificationKey::from_jwk(&jwk).unwrap();
        assert_eq!(key.family, KeyFamily::EcP256);
        assert_eq!(key.alg, Some(Algorithm::ES256));

        let mut unsupported = jwk.clone();
        unsupported.crv = Some("P-521".into());
        assert!(VerificationKey::from_jwk(&unsupported).is_err());
    }

    #[test]
    fn test_keyset_keeps_first_duplicate() {
        let mut second = rsa_jwk("k1");
        second.alg = Some("RS512".into());
        let set = KeySet::from_jwks(&JwkSet {
            keys: vec![rsa_jwk("k1"), second],
        });

        assert_eq!(set.len(), 1);
        assert_eq!(set.get("k1").unwrap().alg, Some(Algorithm::RS256));
    }

    #[test]
    fn test_key_family_supports() {
        assert!(KeyFamily::Rsa.supports(Algorithm::RS256));
        assert!(KeyFamily::Rsa.supports(Algorithm::PS384));
        assert!(!KeyFamily::Rsa.supports(Algorithm::HS256));
        assert!(!KeyFamily::Rsa.supports(Algorithm::ES256));
        assert!(KeyFamily::EcP256.supports(Algorithm::ES256));
        assert!(!KeyFamily::EcP256.supports(Algorithm::ES384));
        assert!(KeyFamily::EcP384.supports(Algorithm::ES384));
    }

    #[test]
    fn test_jwk_set_parses_keycloak_document() {
        let doc = r#"{"keys":[{"kid":"abc","kty":"RSA","alg":"RSA-OAEP","use":"enc","n":"AQAB","e":"AQAB"},
            {"kid":"k1","kty":"RSA","alg":"RS256","use":"sig","n":"AQAB","e":"AQAB","x5c":["MIIB"]}]}"#;
        let jwks: JwkSet = serde_json::from_str(doc).unwrap();
        assert_eq!(jwks.keys.len(), 2);
        assert_eq!(jwks.keys[1].kid.as_deref(), Some("k1"));
        assert_eq!(jwks.keys[0].key_use.as_deref(), Some("enc"));
    }

    #[tokio::test]
    async fn test_get_keys_is_idempotent() {
        let fetcher = Arc::new(StaticFetcher {
            jwks: JwkSet {
                keys: vec![rsa_jwk("k1")],
            },
            count: AtomicUsize::new(0),
        });
        let cache = JwksCache::with_fetcher("https://issuer/certs", fetcher.clone());

        let first = cache.get_keys().await.unwrap();
        let second = cache.get_keys().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(fetcher.count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let fetcher = Arc::new(StaticFetcher {
            jwks: JwkSet {
                keys: vec![rsa_jwk("k1")],
            },
            count: AtomicUsize::new(0),
        });
        let cache = JwksCache::with_fetcher("https://issuer/certs", fetcher.clone());

        let first = cache.get_keys().await.unwrap();
        cache.invalidate().await;
        let second = cache.get_keys().await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(fetcher.count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_cold_cache_fetches_once() {
        let fetcher = Arc::new(StaticFetcher {
            jwks: JwkSet {
                keys: vec![rsa_jwk("k1")],
            },
            count: AtomicUsize::new(0),
        });
        let cache = Arc::new(JwksCache::with_fetcher(
            "https://issuer/certs",
            fetcher.clone(),
        ));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move { cache.get_keys().await }));
        }
        for h in handles {
            assert!(h.await.unwrap().is_ok());
        }

        assert_eq!(fetcher.count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_prewarm_reports_key_count() {
        let fetcher = Arc::new(StaticFetcher {
            jwks: JwkSet {
                keys: vec![rsa_jwk("k1"), rsa_jwk("k2")],
            },
            count: AtomicUsize::new(0),
        });
        let cache = JwksCache::with_fetcher("https://issuer/certs", fetcher);
        assert_eq!(cache.prewarm().await.unwrap(), 2);
    }
}
