//! # virtd-common
//!
//! Shared components for the virtd remote management protocol.
//!
//! This crate contains:
//! - The binary wire codec (readers, writers, encode/decode traits)
//! - The message envelope and framing rules
//! - Typed argument/return bodies for every procedure
//! - Protocol constants and shared error definitions
//!
//! ## Architecture
//!
//! The common crate is deliberately I/O-free: everything here operates on
//! byte slices so that both the daemon and test clients share one codec.
//! Protocol changes must stay wire-compatible; the envelope carries a
//! program and version number that the dispatcher validates on every call.

pub mod error;
pub mod protocol;
pub mod types;

// Re-export commonly used items at crate root
pub use error::WireError;
pub use protocol::{Direction, Envelope, Procedure, Status};
pub use types::{AuthType, DomainRef, ErrorBody, ErrorCode, ErrorDomain, ErrorLevel, NetworkRef};
