use std::net::SocketAddr;
use std::sync::Arc;

use genesis_api_server::adapter::handler::{router, AppState};
use genesis_api_server::infrastructure::config::Config;
use genesis_api_server::infrastructure::logging::init_logging;
use genesis_auth::middleware::AuthState;
use genesis_auth::{AccessGuard, TokenVerifier};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/config.yaml".to_string());
    let mut cfg = Config::load(&config_path)?;
    cfg.apply_env_overrides(|key| std::env::var(key).ok());

    init_logging(&cfg.logging)?;

    info!(
        service = %cfg.app.name,
        version = %cfg.app.version,
        environment = %cfg.app.environment,
        issuer = %cfg.auth.issuer(),
        jwks_url = %cfg.auth.jwks_url(),
        "starting genesis api server"
    );

    let verifier = Arc::new(TokenVerifier::from_config(&cfg.auth)?);

    // 起動時に鍵を取得しておく。失敗しても初回リクエストで再取得する。
    match verifier.key_cache().prewarm().await {
        Ok(count) => info!(keys = count, "JWKS prewarmed"),
        Err(e) => warn!(error = %e, "JWKS prewarm failed, keys will be fetched on demand"),
    }

    let state = AppState {
        auth_state: AuthState {
            guard: AccessGuard::new(verifier),
        },
        admin_console_url: cfg.admin_console_url(),
    };
    let app = router(state, &cfg.cors);

    let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port).parse()?;
    info!(%addr, "REST server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("genesis api server exited");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
