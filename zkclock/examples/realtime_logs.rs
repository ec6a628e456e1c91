//! Print live check-ins until Ctrl-C

use tracing::info;
use tracing_subscriber::EnvFilter;
use zkclock::{DeviceConfig, DeviceService, SocketCallbacks};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let ip = std::env::var("DEVICE_IP").unwrap_or_else(|_| "192.168.1.201".to_string());

    let callbacks = SocketCallbacks::new()
        .with_on_close(|kind| info!(%kind, "Socket closed"))
        .with_on_error(|e| info!(error = %e, "Socket error"));

    let mut service = DeviceService::new(DeviceConfig::new(ip)).with_callbacks(callbacks);
    service.connect().await?;

    service
        .get_real_time_logs(Box::new(|log| {
            println!("{} checked in at {}", log.user_id, log.att_time);
        }))
        .await?;

    tokio::signal::ctrl_c().await?;
    service.disconnect().await?;
    Ok(())
}
