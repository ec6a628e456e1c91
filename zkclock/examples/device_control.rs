//! Device control example

use std::time::Duration;

use tokio::time::sleep;
use tracing_subscriber::EnvFilter;
use zkclock::{DeviceConfig, DeviceService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("info"))
        .init();

    let ip = std::env::var("DEVICE_IP").unwrap_or_else(|_| "192.168.1.201".to_string());

    let mut service = DeviceService::new(DeviceConfig::new(ip).with_timeout(Duration::from_secs(3)));
    service.connect().await?;

    // Terminal shows "Working..." and ignores punches
    println!("Disabling device...");
    service.disable_device().await?;
    sleep(Duration::from_secs(3)).await;

    println!("Enabling device...");
    service.enable_device().await?;

    service.disconnect().await?;
    Ok(())
}
