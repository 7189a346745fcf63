//! The hypervisor collaborator interface.
//!
//! The dispatcher never talks to a hypervisor directly; it goes through
//! [`Hypervisor`] and [`HvConnection`], which a driver implements. All
//! calls are synchronous and return structured [`HvError`]s — there is no
//! last-error slot to read after the fact; whatever the driver returns is
//! what the dispatcher forwards to the client.
//!
//! Lookups hand out [`DomainHandle`]/[`NetworkHandle`] values that the
//! driver may be tracking (reference counts, caches), so every handle a
//! handler acquires must be released exactly once. [`DomainGuard`] and
//! [`NetworkGuard`] tie the release to scope exit; `DOMAIN_DESTROY`
//! dismisses the guard because the destroy operation consumes the handle.

pub mod mem;

use std::fmt;
use std::ops::Deref;

use thiserror::Error;
use uuid::Uuid;

use virtd_common::protocol::body::{
    BlockStatsRet, DomainGetInfoRet, InterfaceStatsRet, NodeGetInfoRet, SchedParam, VcpuInfo,
};
use virtd_common::types::{ErrorBody, ErrorCode, ErrorDomain};

/// Connection open flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenFlags(pub u32);

impl OpenFlags {
    /// The connection may only perform queries.
    pub const READ_ONLY: OpenFlags = OpenFlags(1);

    pub fn contains(self, other: OpenFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn with(self, other: OpenFlags) -> OpenFlags {
        OpenFlags(self.0 | other.0)
    }
}

/// Structured failure from a driver call.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{message}")]
pub struct HvError {
    pub code: ErrorCode,
    pub domain: ErrorDomain,
    pub message: String,
    pub detail: Option<String>,
}

impl HvError {
    pub fn new(code: ErrorCode, domain: ErrorDomain, message: impl Into<String>) -> Self {
        Self {
            code,
            domain,
            message: message.into(),
            detail: None,
        }
    }

    pub fn no_domain(name: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::NoDomain,
            ErrorDomain::Domain,
            format!("domain not found: {name}"),
        )
    }

    pub fn no_network(name: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::NoNetwork,
            ErrorDomain::Network,
            format!("network not found: {name}"),
        )
    }

    pub fn denied(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::OperationDenied, ErrorDomain::Hypervisor, message)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::OperationFailed,
            ErrorDomain::Hypervisor,
            message,
        )
    }

    /// The error record sent to the client.
    pub fn to_body(&self) -> ErrorBody {
        let mut body = ErrorBody::with_code(self.code, self.domain, self.message.clone());
        body.str2 = self.detail.clone();
        body
    }
}

/// Result alias for driver calls.
pub type HvResult<T> = std::result::Result<T, HvError>;

/// A live reference to a domain held by the server.
///
/// `id` is the hypervisor-assigned run id, -1 while the domain is not
/// running. The driver's value is authoritative; ids arriving on the wire
/// are advisory and ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainHandle {
    pub name: String,
    pub uuid: Uuid,
    pub id: i32,
}

/// A live reference to a virtual network held by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkHandle {
    pub name: String,
    pub uuid: Uuid,
}

/// Entry point of a driver: opens connections.
pub trait Hypervisor: Send + Sync {
    fn open(&self, name: Option<&str>, flags: OpenFlags) -> HvResult<Box<dyn HvConnection>>;
}

/// One open connection to a hypervisor.
///
/// Every method mirrors one remote procedure. Enumeration methods take the
/// client's (already validated) capacity and return at most that many
/// entries.
pub trait HvConnection: Send {
    // === Host queries ===
    fn kind(&self) -> HvResult<String>;
    fn version(&self) -> HvResult<u64>;
    fn hostname(&self) -> HvResult<String>;
    fn capabilities(&self) -> HvResult<String>;
    fn max_vcpus(&self, kind: Option<&str>) -> HvResult<i32>;
    fn node_info(&self) -> HvResult<NodeGetInfoRet>;
    fn supports_feature(&self, feature: i32) -> HvResult<bool>;

    /// Close the connection. The session clears its slot only on success.
    fn close(&self) -> HvResult<()>;

    // === Domain enumeration and lookup ===
    fn list_domain_ids(&self, max: usize) -> HvResult<Vec<i32>>;
    fn num_of_domains(&self) -> HvResult<i32>;
    fn list_defined_domains(&self, max: usize) -> HvResult<Vec<String>>;
    fn num_of_defined_domains(&self) -> HvResult<i32>;
    fn domain_lookup_by_id(&self, id: i32) -> HvResult<DomainHandle>;
    fn domain_lookup_by_name(&self, name: &str) -> HvResult<DomainHandle>;
    fn domain_lookup_by_uuid(&self, uuid: &Uuid) -> HvResult<DomainHandle>;

    /// Resolve a wire reference into a live handle by `(name, uuid)`.
    fn get_domain(&self, name: &str, uuid: &Uuid) -> HvResult<DomainHandle>;

    /// Release a handle obtained from any of the lookup methods.
    fn release_domain(&self, dom: &DomainHandle);

    // === Domain lifecycle ===
    fn domain_create_linux(&self, xml: &str, flags: u32) -> HvResult<DomainHandle>;
    fn domain_define_xml(&self, xml: &str) -> HvResult<DomainHandle>;
    fn domain_undefine(&self, dom: &DomainHandle) -> HvResult<()>;
    fn domain_create(&self, dom: &DomainHandle) -> HvResult<()>;

    /// Destroy a running domain. On success the handle is consumed by the
    /// driver; the caller must not release it again.
    fn domain_destroy(&self, dom: &DomainHandle) -> HvResult<()>;

    fn domain_shutdown(&self, dom: &DomainHandle) -> HvResult<()>;
    fn domain_reboot(&self, dom: &DomainHandle, flags: u32) -> HvResult<()>;
    fn domain_suspend(&self, dom: &DomainHandle) -> HvResult<()>;
    fn domain_resume(&self, dom: &DomainHandle) -> HvResult<()>;
    fn domain_save(&self, dom: &DomainHandle, to: &str) -> HvResult<()>;
    fn domain_restore(&self, from: &str) -> HvResult<()>;
    fn domain_core_dump(&self, dom: &DomainHandle, to: &str, flags: u32) -> HvResult<()>;

    // === Domain queries and tuning ===
    fn domain_info(&self, dom: &DomainHandle) -> HvResult<DomainGetInfoRet>;
    fn domain_xml_desc(&self, dom: &DomainHandle, flags: u32) -> HvResult<String>;
    fn domain_os_type(&self, dom: &DomainHandle) -> HvResult<String>;
    fn domain_max_memory(&self, dom: &DomainHandle) -> HvResult<u64>;
    fn domain_set_max_memory(&self, dom: &DomainHandle, kib: u64) -> HvResult<()>;
    fn domain_set_memory(&self, dom: &DomainHandle, kib: u64) -> HvResult<()>;
    fn domain_max_vcpus(&self, dom: &DomainHandle) -> HvResult<i32>;
    fn domain_set_vcpus(&self, dom: &DomainHandle, nvcpus: i32) -> HvResult<()>;
    fn domain_pin_vcpu(&self, dom: &DomainHandle, vcpu: i32, cpumap: &[u8]) -> HvResult<()>;

    /// Fill vCPU info and pinning maps; returns at most `maxinfo` entries
    /// and `maxinfo * maplen` map bytes.
    fn domain_vcpus(
        &self,
        dom: &DomainHandle,
        maxinfo: usize,
        maplen: usize,
    ) -> HvResult<(Vec<VcpuInfo>, Vec<u8>)>;

    fn domain_autostart(&self, dom: &DomainHandle) -> HvResult<bool>;
    fn domain_set_autostart(&self, dom: &DomainHandle, autostart: bool) -> HvResult<()>;
    fn domain_attach_device(&self, dom: &DomainHandle, xml: &str) -> HvResult<()>;
    fn domain_detach_device(&self, dom: &DomainHandle, xml: &str) -> HvResult<()>;
    fn domain_block_stats(&self, dom: &DomainHandle, path: &str) -> HvResult<BlockStatsRet>;
    fn domain_interface_stats(
        &self,
        dom: &DomainHandle,
        path: &str,
    ) -> HvResult<InterfaceStatsRet>;
    fn domain_scheduler_type(&self, dom: &DomainHandle) -> HvResult<(String, i32)>;
    fn domain_scheduler_parameters(
        &self,
        dom: &DomainHandle,
        nparams: usize,
    ) -> HvResult<Vec<SchedParam>>;
    fn domain_set_scheduler_parameters(
        &self,
        dom: &DomainHandle,
        params: &[SchedParam],
    ) -> HvResult<()>;

    // === Migration ===
    fn migrate_prepare(
        &self,
        uri_in: Option<&str>,
        flags: u64,
        dname: Option<&str>,
        resource: u64,
    ) -> HvResult<(Vec<u8>, Option<String>)>;
    fn migrate_perform(
        &self,
        dom: &DomainHandle,
        cookie: &[u8],
        uri: &str,
        flags: u64,
        dname: Option<&str>,
        resource: u64,
    ) -> HvResult<()>;
    fn migrate_finish(
        &self,
        dname: &str,
        cookie: &[u8],
        uri: &str,
        flags: u64,
    ) -> HvResult<DomainHandle>;

    // === Networks ===
    fn list_networks(&self, max: usize) -> HvResult<Vec<String>>;
    fn num_of_networks(&self) -> HvResult<i32>;
    fn list_defined_networks(&self, max: usize) -> HvResult<Vec<String>>;
    fn num_of_defined_networks(&self) -> HvResult<i32>;
    fn network_lookup_by_name(&self, name: &str) -> HvResult<NetworkHandle>;
    fn network_lookup_by_uuid(&self, uuid: &Uuid) -> HvResult<NetworkHandle>;

    /// Resolve a wire reference into a live handle by `(name, uuid)`.
    fn get_network(&self, name: &str, uuid: &Uuid) -> HvResult<NetworkHandle>;

    /// Release a handle obtained from any of the lookup methods.
    fn release_network(&self, net: &NetworkHandle);

    fn network_create_xml(&self, xml: &str) -> HvResult<NetworkHandle>;
    fn network_define_xml(&self, xml: &str) -> HvResult<NetworkHandle>;
    fn network_undefine(&self, net: &NetworkHandle) -> HvResult<()>;
    fn network_create(&self, net: &NetworkHandle) -> HvResult<()>;
    fn network_destroy(&self, net: &NetworkHandle) -> HvResult<()>;
    fn network_xml_desc(&self, net: &NetworkHandle, flags: u32) -> HvResult<String>;
    fn network_bridge_name(&self, net: &NetworkHandle) -> HvResult<String>;
    fn network_autostart(&self, net: &NetworkHandle) -> HvResult<bool>;
    fn network_set_autostart(&self, net: &NetworkHandle, autostart: bool) -> HvResult<()>;
}

/// Scoped domain handle: releases on drop unless dismissed.
pub struct DomainGuard<'c> {
    conn: &'c dyn HvConnection,
    handle: Option<DomainHandle>,
}

impl<'c> DomainGuard<'c> {
    pub fn new(conn: &'c dyn HvConnection, handle: DomainHandle) -> Self {
        Self {
            conn,
            handle: Some(handle),
        }
    }

    /// Skip the release; the operation consumed the handle.
    pub fn dismiss(mut self) {
        self.handle = None;
    }
}

impl Deref for DomainGuard<'_> {
    type Target = DomainHandle;

    fn deref(&self) -> &DomainHandle {
        self.handle.as_ref().expect("guard used after dismiss")
    }
}

impl Drop for DomainGuard<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.conn.release_domain(&handle);
        }
    }
}

/// Scoped network handle: releases on drop.
pub struct NetworkGuard<'c> {
    conn: &'c dyn HvConnection,
    handle: Option<NetworkHandle>,
}

impl<'c> NetworkGuard<'c> {
    pub fn new(conn: &'c dyn HvConnection, handle: NetworkHandle) -> Self {
        Self {
            conn,
            handle: Some(handle),
        }
    }
}

impl Deref for NetworkGuard<'_> {
    type Target = NetworkHandle;

    fn deref(&self) -> &NetworkHandle {
        self.handle.as_ref().expect("guard used after dismiss")
    }
}

impl Drop for NetworkGuard<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.conn.release_network(&handle);
        }
    }
}
