use genesis_auth::AuthConfig;
use serde::Deserialize;

/// Application configuration for the genesis API server.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    pub auth: AuthConfig,
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let cfg: Config = serde_yaml::from_str(&content)?;
        Ok(cfg)
    }

    /// Keycloak 関連の環境変数で設定を上書きする。
    /// コンテナ配備では YAML を共有し、接続先のみ環境変数で切り替えるため。
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("KEYCLOAK_URL") {
            self.auth.issuer_base_url = url;
        }
        if let Some(url) = lookup("KEYCLOAK_PUBLIC_URL") {
            self.auth.public_base_url = Some(url);
        }
        if let Some(realm) = lookup("KEYCLOAK_REALM") {
            self.auth.realm = realm;
        }
        if let Some(client_id) = lookup("KEYCLOAK_CLIENT_ID") {
            self.auth.audience = Some(client_id);
        }
    }

    /// 管理コンソールの URL（公開 URL 基準）。
    pub fn admin_console_url(&self) -> String {
        let base = self
            .auth
            .public_base_url
            .as_deref()
            .unwrap_or(&self.auth.issuer_base_url);
        format!("{}/admin", base.trim_end_matches('/'))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_environment")]
    pub environment: String,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

fn default_environment() -> String {
    "dev".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

/// LoggingConfig はログ出力の設定を表す。format は "json" または "text"。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CorsConfig {
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}
