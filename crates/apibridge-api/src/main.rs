//! Binary entrypoint for the API bridge.
use apibridge_api::{bootstrap, run};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    bootstrap::init_tracing();
    // Application routes are mounted by embedding the library; the bare
    // binary serves the health check only.
    run(axum::Router::new()).await
}
