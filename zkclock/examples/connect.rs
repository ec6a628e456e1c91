//! Connect, print device counters and download the attendance log
//!
//! Set `DEVICE_IP` to the terminal's address and `RUST_LOG=zkclock=debug`
//! to watch the transfer.

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use zkclock::{DeviceConfig, DeviceService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let ip = std::env::var("DEVICE_IP").unwrap_or_else(|_| "192.168.1.201".to_string());

    let mut service = DeviceService::new(DeviceConfig::new(ip.clone()));
    service
        .connect()
        .await
        .with_context(|| format!("connecting to {}", ip))?;
    println!("Connected via {:?}", service.active_transport());

    let info = service.get_info().await?;
    println!("Device: {}", info);
    println!("Clock: {}", service.get_time().await?);

    let users = service.get_users().await?;
    println!("{} users", users.records.len());

    let logs = service
        .get_attendances(Some(Box::new(|received, total| {
            println!("  {}/{} bytes", received, total);
        })))
        .await?;
    for record in logs.records.iter().rev().take(10) {
        println!("{}", record);
    }
    if let Some(e) = logs.error {
        eprintln!("Attendance log is incomplete: {}", e);
    }

    service.disconnect().await?;
    Ok(())
}
