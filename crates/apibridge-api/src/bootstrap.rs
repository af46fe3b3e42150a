//! Process bootstrap: configuration, runtime, listener.
use crate::{create_app, serve, Bridge};
use anyhow::Context;
use apibridge_core::config::read_config;
use apibridge_core::{ConfigMode, RuntimeBuilder};
use axum::Router;
use std::io::Write;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Listen address override
pub const ADDR_ENV: &str = "APIBRIDGE_ADDR";
pub const DEFAULT_ADDR: &str = "127.0.0.1:0";

/// Log to stderr; stdout carries the serving port. Filter from `RUST_LOG`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Serve `app` with the default runtime.
pub async fn run(app: Router) -> anyhow::Result<()> {
    run_configured(|builder| builder, app).await
}

/// Serve `app`; `configure` registers error-code tables, namespace mods,
/// or a different transport before the runtime is frozen.
pub async fn run_configured<F>(configure: F, app: Router) -> anyhow::Result<()>
where
    F: FnOnce(RuntimeBuilder) -> RuntimeBuilder,
{
    let loaded = read_config(std::io::stdin().lock()).context("appengine: could not load runtime configuration")?;
    match loaded.mode {
        ConfigMode::Supplied => tracing::info!(app_id = %loaded.instance.app_id, "runtime configuration loaded"),
        ConfigMode::Standalone => tracing::warn!("no runtime configuration supplied, running standalone test instance"),
    }
    tracing::debug!(config = %serde_json::to_string(&loaded.instance)?, "instance configuration");

    let runtime = Arc::new(configure(RuntimeBuilder::new(loaded.instance)).build());
    let app = create_app(Bridge::new(runtime), app);

    let addr = std::env::var(ADDR_ENV).unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("appengine: couldn't listen to TCP socket {}", addr))?;
    let port = listener.local_addr()?.port();

    // The host reads the serving port from stdout.
    let mut stdout = std::io::stdout();
    writeln!(stdout, "{}", port)?;
    stdout.flush()?;

    tracing::info!(port, "API bridge listening");
    serve(listener, app).await.context("appengine: server error")
}
