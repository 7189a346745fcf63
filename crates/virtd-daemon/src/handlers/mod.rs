//! Procedure handlers.
//!
//! Handlers are thin adapters: decode the arguments, check preconditions,
//! call the hypervisor connection, encode the return. They never frame
//! replies themselves — failures are returned to the dispatcher as
//! [`HandlerError`]s.
//!
//! Per-call object handles are wrapped in guards at acquisition, so every
//! exit path releases them exactly once; `DOMAIN_DESTROY` dismisses its
//! guard because the destroy operation consumes the handle.

pub mod auth;
pub mod conn;
pub mod domain;
pub mod network;

use virtd_common::types::{DomainRef, NetworkRef};

use crate::dispatch::HandlerError;
use crate::hypervisor::{DomainGuard, DomainHandle, HvConnection, NetworkGuard, NetworkHandle};
use crate::session::SessionState;

/// The open hypervisor connection, or the standard "connection not open"
/// error.
pub(crate) fn require_conn(state: &SessionState) -> Result<&dyn HvConnection, HandlerError> {
    state
        .conn
        .as_deref()
        .ok_or_else(|| HandlerError::rpc("connection not open"))
}

/// Resolves a wire domain reference into a scope-released handle.
///
/// The advisory `id` on the wire is ignored; the driver's lookup result is
/// authoritative.
pub(crate) fn lookup_domain<'c>(
    conn: &'c dyn HvConnection,
    dom: &DomainRef,
) -> Result<DomainGuard<'c>, HandlerError> {
    match conn.get_domain(&dom.name, &dom.uuid) {
        Ok(handle) => Ok(DomainGuard::new(conn, handle)),
        Err(_) => Err(HandlerError::rpc("domain not found")),
    }
}

/// Resolves a wire network reference into a scope-released handle.
pub(crate) fn lookup_network<'c>(
    conn: &'c dyn HvConnection,
    net: &NetworkRef,
) -> Result<NetworkGuard<'c>, HandlerError> {
    match conn.get_network(&net.name, &net.uuid) {
        Ok(handle) => Ok(NetworkGuard::new(conn, handle)),
        Err(_) => Err(HandlerError::rpc("network not found")),
    }
}

/// Copies a handle's identity into a freshly owned wire reference.
pub(crate) fn make_domain_ref(handle: &DomainHandle) -> DomainRef {
    DomainRef {
        name: handle.name.clone(),
        uuid: handle.uuid,
        id: handle.id,
    }
}

pub(crate) fn make_network_ref(handle: &NetworkHandle) -> NetworkRef {
    NetworkRef {
        name: handle.name.clone(),
        uuid: handle.uuid,
    }
}
