use std::sync::Arc;

use giftcard_dashboard::{
    dashboard_router_at, init_logging, log_app_bind, log_app_start, DashboardConfig,
    GiftCardSource, LoggingConfig,
};

// The blocking HTTP client must be built outside the async runtime, so the
// runtime is constructed by hand after the source exists.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = LoggingConfig::from_env();
    init_logging(&logging_cfg)?;
    log_app_start(&logging_cfg);

    let cfg = DashboardConfig::from_env()?;
    let source = cfg.build_source();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve(cfg, source))
}

async fn serve(
    cfg: DashboardConfig,
    source: Arc<dyn GiftCardSource>,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = dashboard_router_at(source, &cfg.base_path);
    let listener = tokio::net::TcpListener::bind(cfg.bind_addr).await?;
    let bound_addr = listener.local_addr()?;

    log_app_bind(bound_addr, &cfg.base_path);
    axum::serve(listener, app).await?;

    Ok(())
}
