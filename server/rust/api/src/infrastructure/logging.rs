use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::config::LoggingConfig;

/// tracing サブスクライバを初期化する。RUST_LOG が設定されていればそちらを優先する。
pub fn init_logging(cfg: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level));
    let registry = tracing_subscriber::registry().with(filter);

    if cfg.format == "text" {
        registry.with(fmt::layer().with_target(true)).try_init()?;
    } else {
        registry
            .with(fmt::layer().json().with_target(true))
            .try_init()?;
    }

    Ok(())
}
