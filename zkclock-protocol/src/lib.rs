//! Request/response engine for ZKTeco terminals
//!
//! Sits between a [`zkclock_transport::Transport`] and the device
//! drivers. Handles session bookkeeping, reply matching, chunked bulk
//! reads and the real-time attendance subscription.

pub mod engine;
pub mod error;
pub mod transfer;

#[cfg(test)]
mod testing;

pub use engine::{BulkRead, EngineConfig, EventHandler, ProgressHandler, ProtocolEngine, RecordSet};
pub use error::{Error, Result};
pub use transfer::{Absorb, BulkTransfer, ChunkPlan, TransferState};
