//! # zkclock-core
//!
//! Core protocol primitives for ZKTeco attendance terminals.
//!
//! This crate provides:
//! - Frame structure and encoding/decoding for both transports
//! - Checksum calculation
//! - TCP stream reassembly
//! - Command definitions and protocol constants
//! - Session bookkeeping

pub mod checksum;
pub mod codec;
pub mod command;
pub mod constants;
pub mod error;
pub mod packet;
pub mod session;

pub use codec::StreamReassembler;
pub use command::Command;
pub use constants::EventFlags;
pub use error::{Error, Result};
pub use packet::{build_request, Frame, Header, TransportKind};
pub use session::{Session, SessionState};

/// Default device port
pub const DEFAULT_PORT: u16 = 4370;
