//! Minimal embedding binary: wires a [`driver::LoopbackDriver`] into
//! `adapter-runtime`, following the same init-config/start/wait-on-
//! signal/shutdown shape the teacher's own `drmemd` binary uses.

mod driver;

use adapter_runtime::clients::{ConfigRegistryClient, HttpConfigRegistryClient, HttpDataClient, HttpMetadataClient};
use adapter_runtime::config::Config;
use adapter_runtime::{server, Lifecycle};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

async fn init_app() -> Option<Config> {
    let cfg = adapter_runtime::config::get().await?;

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(cfg.get_log_level())
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("unable to set global default subscriber");
    Some(cfg)
}

async fn run() -> adapter_api::Result<()> {
    let Some(cfg) = init_app().await else {
        return Ok(());
    };

    let data_client = Arc::new(HttpDataClient::new(cfg.clients.data.base_url()));
    let metadata_client = Arc::new(HttpMetadataClient::new(cfg.clients.metadata.base_url()));
    let registry_client: Option<Arc<dyn ConfigRegistryClient>> = cfg
        .registry
        .as_ref()
        .map(|r| Arc::new(HttpConfigRegistryClient::new(r.base_url())) as Arc<dyn ConfigRegistryClient>);

    let addr: IpAddr = cfg.service.host.parse().unwrap_or(IpAddr::from([0, 0, 0, 0]));
    let bind_addr = SocketAddr::new(addr, cfg.service.port);

    let lifecycle = Lifecycle::start(
        "loopback-adapter",
        cfg,
        Box::new(driver::LoopbackDriver::new()),
        data_client,
        metadata_client,
        registry_client,
    )
    .await?;

    tracing::info!(addr = %bind_addr, "serving northbound API");

    tokio::select! {
        _ = server::server(lifecycle.clone(), bind_addr) => {
            tracing::warn!("HTTP server exited unexpectedly");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    lifecycle.shutdown(false).await;
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("ERROR: {}", e);
        std::process::exit(1);
    }
}
