//! # zkclock
//!
//! Async client for ZKTeco attendance terminals.
//!
//! ## Features
//!
//! - TCP and UDP framing with automatic TCP → UDP fallback
//! - Chunked download of users and attendance logs
//! - Real-time attendance pushes
//! - Device clock, capacity counters, enable/disable and log clearing
//!
//! ## Quick Start
//!
//! ```no_run
//! use zkclock::{DeviceConfig, DeviceService};
//!
//! #[tokio::main]
//! async fn main() -> zkclock::Result<()> {
//!     let mut service = DeviceService::new(DeviceConfig::new("192.168.1.201"));
//!     service.connect().await?;
//!
//!     let info = service.get_info().await?;
//!     println!("{}", info);
//!
//!     let logs = service.get_attendances(None).await?;
//!     for record in &logs.records {
//!         println!("{}", record);
//!     }
//!
//!     service.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod service;

pub use config::DeviceConfig;
pub use driver::{DeviceDriver, TcpDriver, UdpDriver, ZkDriver};
pub use error::{Error, Result};
pub use service::{ConnectionState, DeviceService};

// Re-export the types callers handle directly
pub use zkclock_core::{Command, TransportKind};
pub use zkclock_protocol::{EventHandler, ProgressHandler, RecordSet};
pub use zkclock_transport::SocketCallbacks;
pub use zkclock_types::{AttendanceRecord, DeviceInfo, RealTimeLog, UserRecord};
