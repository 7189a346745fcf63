//! Per-client session state.
//!
//! A session owns one fixed-size message buffer and is either receiving
//! (the transport is accumulating a request) or transmitting (the buffer
//! holds a framed reply being drained). Exactly one message is in flight
//! at a time; clients do not pipeline.
//!
//! Dropping a session releases everything it holds: the hypervisor
//! connection and any in-progress SASL context go with it, which is how
//! teardown cancels in-flight state.

use std::net::SocketAddr;

use virtd_common::protocol::MESSAGE_MAX;

use crate::hypervisor::HvConnection;
use crate::sasl::SaslSession;

/// Whether the session buffer currently belongs to the receive or the
/// transmit side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Rx,
    Tx,
}

/// I/O interest of the TLS layer; only meaningful when TLS wraps the
/// transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsDirection {
    Read,
    Write,
}

/// Authentication progress of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// Authorized (or authentication was never required).
    None,
    /// SASL negotiation is required and not yet complete.
    SaslPending,
}

/// Everything about a session except the message buffer. The dispatcher
/// splits this from the buffer so handlers can hold the connection while
/// encoding into the buffer.
pub struct SessionState {
    pub readonly: bool,
    pub tls: bool,
    pub tls_direction: TlsDirection,
    pub auth: AuthState,
    pub sasl: Option<Box<dyn SaslSession>>,
    pub conn: Option<Box<dyn HvConnection>>,
    pub local_addr: SocketAddr,
    pub remote_addr: SocketAddr,
}

impl SessionState {
    /// Local endpoint in the `IP;PORT` form SASL mechanisms bind to.
    pub fn local_sasl_addr(&self) -> String {
        format!("{};{}", self.local_addr.ip(), self.local_addr.port())
    }

    /// Remote endpoint in the `IP;PORT` form SASL mechanisms bind to.
    pub fn remote_sasl_addr(&self) -> String {
        format!("{};{}", self.remote_addr.ip(), self.remote_addr.port())
    }

    /// True while the auth gate must hold back non-auth procedures.
    pub fn requires_auth(&self) -> bool {
        matches!(self.auth, AuthState::SaslPending)
    }
}

/// One client connection's dispatch state.
pub struct Session {
    pub(crate) state: SessionState,
    pub(crate) buffer: Box<[u8]>,
    pub(crate) buffer_len: usize,
    pub(crate) buffer_offset: usize,
    pub(crate) mode: SessionMode,
}

impl Session {
    pub fn new(
        readonly: bool,
        auth_required: bool,
        local_addr: SocketAddr,
        remote_addr: SocketAddr,
    ) -> Self {
        Self {
            state: SessionState {
                readonly,
                tls: false,
                tls_direction: TlsDirection::Read,
                auth: if auth_required {
                    AuthState::SaslPending
                } else {
                    AuthState::None
                },
                sasl: None,
                conn: None,
                local_addr,
                remote_addr,
            },
            buffer: vec![0u8; MESSAGE_MAX].into_boxed_slice(),
            buffer_len: 0,
            buffer_offset: 0,
            mode: SessionMode::Rx,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// Hands the framed reply to the transmit side.
    pub(crate) fn begin_tx(&mut self, len: usize) {
        debug_assert!(len <= self.buffer.len());
        self.mode = SessionMode::Tx;
        self.buffer_len = len;
        self.buffer_offset = 0;
        if self.state.tls {
            self.state.tls_direction = TlsDirection::Write;
        }
    }

    /// The framed reply still to be written out.
    pub fn tx_bytes(&self) -> &[u8] {
        debug_assert_eq!(self.mode, SessionMode::Tx);
        &self.buffer[self.buffer_offset..self.buffer_len]
    }

    /// Marks `n` reply bytes as written.
    pub fn advance_tx(&mut self, n: usize) {
        self.buffer_offset = (self.buffer_offset + n).min(self.buffer_len);
    }

    /// Reply fully drained; the buffer belongs to the receive side again.
    pub fn finish_tx(&mut self) {
        self.mode = SessionMode::Rx;
        self.buffer_len = 0;
        self.buffer_offset = 0;
        if self.state.tls {
            self.state.tls_direction = TlsDirection::Read;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(
            false,
            false,
            "127.0.0.1:16509".parse().unwrap(),
            "127.0.0.1:40000".parse().unwrap(),
        )
    }

    #[test]
    fn starts_receiving_without_connection() {
        let s = session();
        assert_eq!(s.mode(), SessionMode::Rx);
        assert!(s.state().conn.is_none());
        assert!(!s.state().requires_auth());
    }

    #[test]
    fn auth_required_until_cleared() {
        let mut s = Session::new(
            false,
            true,
            "127.0.0.1:16509".parse().unwrap(),
            "127.0.0.1:40000".parse().unwrap(),
        );
        assert!(s.state().requires_auth());
        s.state.auth = AuthState::None;
        assert!(!s.state().requires_auth());
    }

    #[test]
    fn tx_cycle_tracks_offsets() {
        let mut s = session();
        s.buffer[..8].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        s.begin_tx(8);
        assert_eq!(s.tx_bytes().len(), 8);
        s.advance_tx(5);
        assert_eq!(s.tx_bytes(), &[6, 7, 8]);
        s.finish_tx();
        assert_eq!(s.mode(), SessionMode::Rx);
    }

    #[test]
    fn sasl_addr_formatting() {
        let s = session();
        assert_eq!(s.state().local_sasl_addr(), "127.0.0.1;16509");
        assert_eq!(s.state().remote_sasl_addr(), "127.0.0.1;40000");
    }
}
