//! Session bookkeeping
//!
//! A session tracks:
//! - Session ID (assigned by device on CMD_CONNECT)
//! - Reply counter (advanced before every request)
//! - Reply timeout and transport kind
//!
//! It is a plain value owned by one protocol engine; every change goes
//! through an explicit transition.

use std::time::Duration;

use tracing::debug;

use crate::{
    command::Command,
    constants::{DEFAULT_TIMEOUT, HANDSHAKE_TIMEOUT, USHRT_MAX},
    packet::TransportKind,
};

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No handshake completed
    Disconnected,

    /// CMD_CONNECT sent, waiting for the device to assign a session id
    Connecting,

    /// Session id assigned
    Connected,
}

/// Per-connection session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    kind: TransportKind,
    timeout: Duration,
    session_id: u16,
    reply_id: u16,
    state: SessionState,
}

impl Session {
    /// Create a disconnected session
    pub fn new(kind: TransportKind, timeout: Duration) -> Self {
        Self {
            kind,
            timeout,
            session_id: 0,
            reply_id: 0,
            state: SessionState::Disconnected,
        }
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn session_id(&self) -> u16 {
        self.session_id
    }

    pub fn reply_id(&self) -> u16 {
        self.reply_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    /// Reply window for a command
    pub fn timeout_for(&self, command: Command) -> Duration {
        if command.is_handshake() {
            HANDSHAKE_TIMEOUT
        } else {
            self.timeout
        }
    }

    /// Reset ids to (0, 0) ahead of CMD_CONNECT
    pub fn begin_connect(&mut self) {
        self.session_id = 0;
        self.reply_id = 0;
        self.state = SessionState::Connecting;
    }

    /// Advance the reply counter and return the ids for the next request
    ///
    /// The counter wraps at `USHRT_MAX`, the same modulus the wire rewrite uses.
    pub fn advance(&mut self) -> (u16, u16) {
        self.reply_id = ((u32::from(self.reply_id) + 1) % USHRT_MAX) as u16;
        (self.session_id, self.reply_id)
    }

    /// Ids for the next request of `command`
    ///
    /// CMD_CONNECT restarts the session, everything else advances it.
    pub fn next_ids(&mut self, command: Command) -> (u16, u16) {
        if command == Command::Connect {
            self.begin_connect();
            (self.session_id, self.reply_id)
        } else {
            self.advance()
        }
    }

    /// Record the session id the device assigned
    pub fn establish(&mut self, session_id: u16) {
        debug!(transport = %self.kind, session_id, "Session established");
        self.session_id = session_id;
        self.state = SessionState::Connected;
    }

    /// Forget the session
    pub fn close(&mut self) {
        self.session_id = 0;
        self.reply_id = 0;
        self.state = SessionState::Disconnected;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(TransportKind::Tcp, DEFAULT_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_session_new() {
        let session = Session::new(TransportKind::Udp, Duration::from_secs(3));
        assert_eq!(session.session_id(), 0);
        assert_eq!(session.reply_id(), 0);
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(!session.is_connected());
    }

    #[test]
    fn test_connect_resets_ids() {
        let mut session = Session::default();
        session.establish(1234);
        session.advance();
        session.advance();

        assert_eq!(session.next_ids(Command::Connect), (0, 0));
        assert_eq!(session.state(), SessionState::Connecting);
    }

    #[test]
    fn test_advance_increments_reply() {
        let mut session = Session::default();
        session.begin_connect();
        session.establish(77);

        assert_eq!(session.next_ids(Command::FreeData), (77, 1));
        assert_eq!(session.next_ids(Command::DataWrrq), (77, 2));
        assert!(session.is_connected());
    }

    #[test]
    fn test_reply_counter_wraps() {
        let mut session = Session::default();
        for _ in 0..65534 {
            session.advance();
        }
        assert_eq!(session.reply_id(), 65534);
        assert_eq!(session.advance(), (0, 0));
    }

    #[test]
    fn test_timeout_for_handshake() {
        let session = Session::new(TransportKind::Tcp, Duration::from_secs(9));
        assert_eq!(session.timeout_for(Command::Connect), HANDSHAKE_TIMEOUT);
        assert_eq!(session.timeout_for(Command::Exit), HANDSHAKE_TIMEOUT);
        assert_eq!(session.timeout_for(Command::GetTime), Duration::from_secs(9));
    }

    #[test]
    fn test_close() {
        let mut session = Session::default();
        session.establish(5);
        session.advance();
        session.close();

        assert_eq!(session.session_id(), 0);
        assert_eq!(session.reply_id(), 0);
        assert_eq!(session.state(), SessionState::Disconnected);
    }
}
