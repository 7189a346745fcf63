//! In-memory hypervisor driver.
//!
//! A self-contained [`Hypervisor`] implementation over an in-process
//! registry of domains and networks. It gives the daemon a fully working
//! backend without any host virtualization: lifecycle transitions, XML
//! descriptions, scheduler parameters and handle accounting all behave,
//! but no guest ever runs.
//!
//! The driver counts outstanding handles (`lookup`/`get` increments,
//! `release` decrements, a successful destroy consumes) so leaks in the
//! dispatch layer are observable.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;

use virtd_common::protocol::body::{
    BlockStatsRet, DomainGetInfoRet, InterfaceStatsRet, NodeGetInfoRet, SchedParam, SchedValue,
    VcpuInfo,
};
use virtd_common::types::{ErrorCode, ErrorDomain};

use super::{
    DomainHandle, HvConnection, HvError, HvResult, Hypervisor, NetworkHandle, OpenFlags,
};

// Domain lifecycle states, as reported in DOMAIN_GET_INFO.
const STATE_RUNNING: i32 = 1;
const STATE_PAUSED: i32 = 3;
const STATE_SHUTOFF: i32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Running,
    Paused,
    Shutoff,
}

impl Lifecycle {
    fn as_info_state(self) -> i32 {
        match self {
            Lifecycle::Running => STATE_RUNNING,
            Lifecycle::Paused => STATE_PAUSED,
            Lifecycle::Shutoff => STATE_SHUTOFF,
        }
    }

    fn is_active(self) -> bool {
        !matches!(self, Lifecycle::Shutoff)
    }
}

#[derive(Debug, Clone)]
struct MemDomain {
    name: String,
    uuid: Uuid,
    id: i32,
    lifecycle: Lifecycle,
    persistent: bool,
    xml: String,
    os_type: String,
    max_mem: u64,
    memory: u64,
    vcpus: i32,
    max_vcpus: i32,
    autostart: bool,
    sched: Vec<SchedParam>,
    devices: Vec<String>,
}

impl MemDomain {
    fn new(name: String, uuid: Uuid, xml: String, persistent: bool) -> Self {
        Self {
            name,
            uuid,
            id: -1,
            lifecycle: Lifecycle::Shutoff,
            persistent,
            xml,
            os_type: "hvm".into(),
            max_mem: 1 << 20,
            memory: 1 << 20,
            vcpus: 1,
            max_vcpus: 16,
            autostart: false,
            sched: vec![
                SchedParam {
                    field: "weight".into(),
                    value: SchedValue::Uint(256),
                },
                SchedParam {
                    field: "cap".into(),
                    value: SchedValue::Uint(0),
                },
            ],
            devices: Vec::new(),
        }
    }

    fn handle(&self) -> DomainHandle {
        DomainHandle {
            name: self.name.clone(),
            uuid: self.uuid,
            id: self.id,
        }
    }
}

#[derive(Debug, Clone)]
struct MemNetwork {
    name: String,
    uuid: Uuid,
    active: bool,
    persistent: bool,
    autostart: bool,
    bridge: String,
    xml: String,
}

impl MemNetwork {
    fn handle(&self) -> NetworkHandle {
        NetworkHandle {
            name: self.name.clone(),
            uuid: self.uuid,
        }
    }
}

#[derive(Debug, Default)]
struct MemState {
    domains: Vec<MemDomain>,
    networks: Vec<MemNetwork>,
    saved: HashMap<String, MemDomain>,
    next_domain_id: i32,
    next_bridge: u32,
    handle_refs: i64,
}

/// The in-memory driver.
pub struct MemHypervisor {
    state: Arc<Mutex<MemState>>,
    hostname: String,
}

impl MemHypervisor {
    pub fn new() -> Self {
        let mut state = MemState {
            next_domain_id: 1,
            next_bridge: 1,
            ..MemState::default()
        };
        // Every host ships with the default network, matching what
        // clients of real drivers expect to find.
        state.networks.push(MemNetwork {
            name: "default".into(),
            uuid: Uuid::new_v4(),
            active: true,
            persistent: true,
            autostart: true,
            bridge: "virbr0".into(),
            xml: "<network><name>default</name></network>".into(),
        });
        Self {
            state: Arc::new(Mutex::new(state)),
            hostname: "virtd-host".into(),
        }
    }

    /// Handles acquired and not yet released across all connections.
    pub fn outstanding_handles(&self) -> i64 {
        lock(&self.state).handle_refs
    }
}

impl Default for MemHypervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Hypervisor for MemHypervisor {
    fn open(&self, _name: Option<&str>, flags: OpenFlags) -> HvResult<Box<dyn HvConnection>> {
        Ok(Box::new(MemConnection {
            state: Arc::clone(&self.state),
            hostname: self.hostname.clone(),
            readonly: flags.contains(OpenFlags::READ_ONLY),
        }))
    }
}

fn lock(state: &Mutex<MemState>) -> MutexGuard<'_, MemState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Pulls the text of `<tag>...</tag>` out of a description document.
fn extract_tag(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)? + start;
    let value = xml[start..end].trim();
    (!value.is_empty()).then(|| value.to_string())
}

struct MemConnection {
    state: Arc<Mutex<MemState>>,
    hostname: String,
    readonly: bool,
}

impl MemConnection {
    fn writable(&self) -> HvResult<()> {
        if self.readonly {
            Err(HvError::denied("operation denied on a read-only connection"))
        } else {
            Ok(())
        }
    }

    fn with_domain<T>(
        &self,
        dom: &DomainHandle,
        f: impl FnOnce(&mut MemDomain, &mut MemState) -> HvResult<T>,
    ) -> HvResult<T> {
        let mut state = lock(&self.state);
        let idx = state
            .domains
            .iter()
            .position(|d| d.uuid == dom.uuid || d.name == dom.name)
            .ok_or_else(|| HvError::no_domain(&dom.name))?;
        // Take the domain out so the closure can also reach the registry.
        let mut domain = state.domains.remove(idx);
        let result = f(&mut domain, &mut state);
        state.domains.insert(idx, domain);
        result
    }

    fn with_network<T>(
        &self,
        net: &NetworkHandle,
        f: impl FnOnce(&mut MemNetwork, &mut MemState) -> HvResult<T>,
    ) -> HvResult<T> {
        let mut state = lock(&self.state);
        let idx = state
            .networks
            .iter()
            .position(|n| n.uuid == net.uuid || n.name == net.name)
            .ok_or_else(|| HvError::no_network(&net.name))?;
        let mut network = state.networks.remove(idx);
        let result = f(&mut network, &mut state);
        state.networks.insert(idx, network);
        result
    }

    fn acquire_domain(state: &mut MemState, idx: usize) -> DomainHandle {
        state.handle_refs += 1;
        state.domains[idx].handle()
    }

    fn acquire_network(state: &mut MemState, idx: usize) -> NetworkHandle {
        state.handle_refs += 1;
        state.networks[idx].handle()
    }
}

impl HvConnection for MemConnection {
    fn kind(&self) -> HvResult<String> {
        Ok("mem".into())
    }

    fn version(&self) -> HvResult<u64> {
        // major * 1_000_000 + minor * 1_000 + release
        Ok(2_001_000)
    }

    fn hostname(&self) -> HvResult<String> {
        Ok(self.hostname.clone())
    }

    fn capabilities(&self) -> HvResult<String> {
        Ok(concat!(
            "<capabilities>",
            "<host><cpu><arch>x86_64</arch></cpu></host>",
            "<guest><os_type>hvm</os_type><arch name='x86_64'/></guest>",
            "</capabilities>"
        )
        .into())
    }

    fn max_vcpus(&self, _kind: Option<&str>) -> HvResult<i32> {
        Ok(16)
    }

    fn node_info(&self) -> HvResult<NodeGetInfoRet> {
        Ok(NodeGetInfoRet {
            model: "x86_64".into(),
            memory: 16 << 20,
            cpus: 8,
            mhz: 2400,
            nodes: 1,
            sockets: 1,
            cores: 4,
            threads: 2,
        })
    }

    fn supports_feature(&self, feature: i32) -> HvResult<bool> {
        // Feature 1 is cooperative migration; nothing else is offered.
        Ok(feature == 1)
    }

    fn close(&self) -> HvResult<()> {
        Ok(())
    }

    fn list_domain_ids(&self, max: usize) -> HvResult<Vec<i32>> {
        let state = lock(&self.state);
        Ok(state
            .domains
            .iter()
            .filter(|d| d.lifecycle.is_active())
            .map(|d| d.id)
            .take(max)
            .collect())
    }

    fn num_of_domains(&self) -> HvResult<i32> {
        let state = lock(&self.state);
        Ok(state.domains.iter().filter(|d| d.lifecycle.is_active()).count() as i32)
    }

    fn list_defined_domains(&self, max: usize) -> HvResult<Vec<String>> {
        let state = lock(&self.state);
        Ok(state
            .domains
            .iter()
            .filter(|d| d.persistent && !d.lifecycle.is_active())
            .map(|d| d.name.clone())
            .take(max)
            .collect())
    }

    fn num_of_defined_domains(&self) -> HvResult<i32> {
        let state = lock(&self.state);
        Ok(state
            .domains
            .iter()
            .filter(|d| d.persistent && !d.lifecycle.is_active())
            .count() as i32)
    }

    fn domain_lookup_by_id(&self, id: i32) -> HvResult<DomainHandle> {
        let mut state = lock(&self.state);
        let idx = state
            .domains
            .iter()
            .position(|d| d.lifecycle.is_active() && d.id == id)
            .ok_or_else(|| HvError::no_domain(format_args!("id {id}")))?;
        Ok(Self::acquire_domain(&mut state, idx))
    }

    fn domain_lookup_by_name(&self, name: &str) -> HvResult<DomainHandle> {
        let mut state = lock(&self.state);
        let idx = state
            .domains
            .iter()
            .position(|d| d.name == name)
            .ok_or_else(|| HvError::no_domain(name))?;
        Ok(Self::acquire_domain(&mut state, idx))
    }

    fn domain_lookup_by_uuid(&self, uuid: &Uuid) -> HvResult<DomainHandle> {
        let mut state = lock(&self.state);
        let idx = state
            .domains
            .iter()
            .position(|d| d.uuid == *uuid)
            .ok_or_else(|| HvError::no_domain(uuid))?;
        Ok(Self::acquire_domain(&mut state, idx))
    }

    fn get_domain(&self, name: &str, uuid: &Uuid) -> HvResult<DomainHandle> {
        let mut state = lock(&self.state);
        let idx = state
            .domains
            .iter()
            .position(|d| d.uuid == *uuid)
            .or_else(|| state.domains.iter().position(|d| d.name == name))
            .ok_or_else(|| HvError::no_domain(name))?;
        Ok(Self::acquire_domain(&mut state, idx))
    }

    fn release_domain(&self, _dom: &DomainHandle) {
        lock(&self.state).handle_refs -= 1;
    }

    fn domain_create_linux(&self, xml: &str, _flags: u32) -> HvResult<DomainHandle> {
        self.writable()?;
        let name = extract_tag(xml, "name").ok_or_else(|| {
            HvError::new(
                ErrorCode::InvalidArg,
                ErrorDomain::Domain,
                "description is missing a <name> element",
            )
        })?;
        let mut state = lock(&self.state);
        if state.domains.iter().any(|d| d.name == name) {
            return Err(HvError::failed(format!("domain {name} already exists")));
        }
        let uuid = extract_tag(xml, "uuid")
            .and_then(|s| Uuid::parse_str(&s).ok())
            .unwrap_or_else(Uuid::new_v4);
        let mut domain = MemDomain::new(name, uuid, xml.to_string(), false);
        domain.id = state.next_domain_id;
        state.next_domain_id += 1;
        domain.lifecycle = Lifecycle::Running;
        state.domains.push(domain);
        let idx = state.domains.len() - 1;
        Ok(Self::acquire_domain(&mut state, idx))
    }

    fn domain_define_xml(&self, xml: &str) -> HvResult<DomainHandle> {
        self.writable()?;
        let name = extract_tag(xml, "name").ok_or_else(|| {
            HvError::new(
                ErrorCode::InvalidArg,
                ErrorDomain::Domain,
                "description is missing a <name> element",
            )
        })?;
        let uuid = extract_tag(xml, "uuid")
            .and_then(|s| Uuid::parse_str(&s).ok())
            .unwrap_or_else(Uuid::new_v4);
        let mut state = lock(&self.state);
        if let Some(idx) = state.domains.iter().position(|d| d.name == name) {
            // Redefinition updates the description in place.
            state.domains[idx].xml = xml.to_string();
            state.domains[idx].persistent = true;
            return Ok(Self::acquire_domain(&mut state, idx));
        }
        state
            .domains
            .push(MemDomain::new(name, uuid, xml.to_string(), true));
        let idx = state.domains.len() - 1;
        Ok(Self::acquire_domain(&mut state, idx))
    }

    fn domain_undefine(&self, dom: &DomainHandle) -> HvResult<()> {
        self.writable()?;
        let mut state = lock(&self.state);
        let idx = state
            .domains
            .iter()
            .position(|d| d.uuid == dom.uuid || d.name == dom.name)
            .ok_or_else(|| HvError::no_domain(&dom.name))?;
        if state.domains[idx].lifecycle.is_active() {
            return Err(HvError::failed("cannot undefine an active domain"));
        }
        if !state.domains[idx].persistent {
            return Err(HvError::failed("cannot undefine a transient domain"));
        }
        state.domains.remove(idx);
        Ok(())
    }

    fn domain_create(&self, dom: &DomainHandle) -> HvResult<()> {
        self.writable()?;
        self.with_domain(dom, |d, state| {
            if d.lifecycle.is_active() {
                return Err(HvError::failed("domain is already running"));
            }
            d.id = state.next_domain_id;
            state.next_domain_id += 1;
            d.lifecycle = Lifecycle::Running;
            Ok(())
        })
    }

    fn domain_destroy(&self, dom: &DomainHandle) -> HvResult<()> {
        self.writable()?;
        let mut state = lock(&self.state);
        let idx = state
            .domains
            .iter()
            .position(|d| d.uuid == dom.uuid || d.name == dom.name)
            .ok_or_else(|| HvError::no_domain(&dom.name))?;
        if !state.domains[idx].lifecycle.is_active() {
            return Err(HvError::failed("domain is not running"));
        }
        if state.domains[idx].persistent {
            state.domains[idx].lifecycle = Lifecycle::Shutoff;
            state.domains[idx].id = -1;
        } else {
            state.domains.remove(idx);
        }
        // Destroy consumes the caller's handle.
        state.handle_refs -= 1;
        Ok(())
    }

    fn domain_shutdown(&self, dom: &DomainHandle) -> HvResult<()> {
        self.writable()?;
        self.with_domain(dom, |d, _| {
            if !d.lifecycle.is_active() {
                return Err(HvError::failed("domain is not running"));
            }
            d.lifecycle = Lifecycle::Shutoff;
            d.id = -1;
            Ok(())
        })
    }

    fn domain_reboot(&self, dom: &DomainHandle, _flags: u32) -> HvResult<()> {
        self.writable()?;
        self.with_domain(dom, |d, _| {
            if d.lifecycle != Lifecycle::Running {
                return Err(HvError::failed("domain is not running"));
            }
            Ok(())
        })
    }

    fn domain_suspend(&self, dom: &DomainHandle) -> HvResult<()> {
        self.writable()?;
        self.with_domain(dom, |d, _| {
            if d.lifecycle != Lifecycle::Running {
                return Err(HvError::failed("domain is not running"));
            }
            d.lifecycle = Lifecycle::Paused;
            Ok(())
        })
    }

    fn domain_resume(&self, dom: &DomainHandle) -> HvResult<()> {
        self.writable()?;
        self.with_domain(dom, |d, _| {
            if d.lifecycle != Lifecycle::Paused {
                return Err(HvError::failed("domain is not paused"));
            }
            d.lifecycle = Lifecycle::Running;
            Ok(())
        })
    }

    fn domain_save(&self, dom: &DomainHandle, to: &str) -> HvResult<()> {
        self.writable()?;
        if to.is_empty() {
            return Err(HvError::new(
                ErrorCode::InvalidArg,
                ErrorDomain::Domain,
                "empty save path",
            ));
        }
        self.with_domain(dom, |d, state| {
            if !d.lifecycle.is_active() {
                return Err(HvError::failed("domain is not running"));
            }
            let mut image = d.clone();
            image.lifecycle = Lifecycle::Running;
            state.saved.insert(to.to_string(), image);
            d.lifecycle = Lifecycle::Shutoff;
            d.id = -1;
            Ok(())
        })
    }

    fn domain_restore(&self, from: &str) -> HvResult<()> {
        self.writable()?;
        let mut state = lock(&self.state);
        let mut image = state
            .saved
            .remove(from)
            .ok_or_else(|| HvError::failed(format!("no saved image at {from}")))?;
        if state
            .domains
            .iter()
            .any(|d| d.name == image.name && d.lifecycle.is_active())
        {
            return Err(HvError::failed(format!(
                "domain {} is already running",
                image.name
            )));
        }
        image.id = state.next_domain_id;
        state.next_domain_id += 1;
        state.domains.retain(|d| d.name != image.name);
        state.domains.push(image);
        Ok(())
    }

    fn domain_core_dump(&self, dom: &DomainHandle, to: &str, _flags: u32) -> HvResult<()> {
        self.writable()?;
        if to.is_empty() {
            return Err(HvError::new(
                ErrorCode::InvalidArg,
                ErrorDomain::Domain,
                "empty dump path",
            ));
        }
        self.with_domain(dom, |d, _| {
            if !d.lifecycle.is_active() {
                return Err(HvError::failed("domain is not running"));
            }
            Ok(())
        })
    }

    fn domain_info(&self, dom: &DomainHandle) -> HvResult<DomainGetInfoRet> {
        self.with_domain(dom, |d, _| {
            Ok(DomainGetInfoRet {
                state: d.lifecycle.as_info_state(),
                max_mem: d.max_mem,
                memory: d.memory,
                nr_virt_cpu: d.vcpus,
                cpu_time: if d.lifecycle.is_active() { 1_000_000 } else { 0 },
            })
        })
    }

    fn domain_xml_desc(&self, dom: &DomainHandle, _flags: u32) -> HvResult<String> {
        self.with_domain(dom, |d, _| Ok(d.xml.clone()))
    }

    fn domain_os_type(&self, dom: &DomainHandle) -> HvResult<String> {
        self.with_domain(dom, |d, _| Ok(d.os_type.clone()))
    }

    fn domain_max_memory(&self, dom: &DomainHandle) -> HvResult<u64> {
        self.with_domain(dom, |d, _| Ok(d.max_mem))
    }

    fn domain_set_max_memory(&self, dom: &DomainHandle, kib: u64) -> HvResult<()> {
        self.writable()?;
        self.with_domain(dom, |d, _| {
            d.max_mem = kib;
            d.memory = d.memory.min(kib);
            Ok(())
        })
    }

    fn domain_set_memory(&self, dom: &DomainHandle, kib: u64) -> HvResult<()> {
        self.writable()?;
        self.with_domain(dom, |d, _| {
            if kib > d.max_mem {
                return Err(HvError::new(
                    ErrorCode::InvalidArg,
                    ErrorDomain::Domain,
                    "memory above the configured maximum",
                ));
            }
            d.memory = kib;
            Ok(())
        })
    }

    fn domain_max_vcpus(&self, dom: &DomainHandle) -> HvResult<i32> {
        self.with_domain(dom, |d, _| Ok(d.max_vcpus))
    }

    fn domain_set_vcpus(&self, dom: &DomainHandle, nvcpus: i32) -> HvResult<()> {
        self.writable()?;
        self.with_domain(dom, |d, _| {
            if nvcpus < 1 || nvcpus > d.max_vcpus {
                return Err(HvError::new(
                    ErrorCode::InvalidArg,
                    ErrorDomain::Domain,
                    "vcpu count out of range",
                ));
            }
            d.vcpus = nvcpus;
            Ok(())
        })
    }

    fn domain_pin_vcpu(&self, dom: &DomainHandle, vcpu: i32, cpumap: &[u8]) -> HvResult<()> {
        self.writable()?;
        self.with_domain(dom, |d, _| {
            if vcpu < 0 || vcpu >= d.vcpus {
                return Err(HvError::new(
                    ErrorCode::InvalidArg,
                    ErrorDomain::Domain,
                    "vcpu index out of range",
                ));
            }
            if cpumap.is_empty() {
                return Err(HvError::new(
                    ErrorCode::InvalidArg,
                    ErrorDomain::Domain,
                    "empty cpu map",
                ));
            }
            Ok(())
        })
    }

    fn domain_vcpus(
        &self,
        dom: &DomainHandle,
        maxinfo: usize,
        maplen: usize,
    ) -> HvResult<(Vec<VcpuInfo>, Vec<u8>)> {
        self.with_domain(dom, |d, _| {
            if !d.lifecycle.is_active() {
                return Err(HvError::failed("domain is not running"));
            }
            let count = (d.vcpus as usize).min(maxinfo);
            let info = (0..count)
                .map(|n| VcpuInfo {
                    number: n as i32,
                    state: STATE_RUNNING,
                    cpu_time: 1_000_000,
                    cpu: (n % 8) as i32,
                })
                .collect();
            let mut maps = vec![0u8; count * maplen];
            for chunk in maps.chunks_mut(maplen.max(1)) {
                if let Some(first) = chunk.first_mut() {
                    *first = 0xFF;
                }
            }
            Ok((info, maps))
        })
    }

    fn domain_autostart(&self, dom: &DomainHandle) -> HvResult<bool> {
        self.with_domain(dom, |d, _| Ok(d.autostart))
    }

    fn domain_set_autostart(&self, dom: &DomainHandle, autostart: bool) -> HvResult<()> {
        self.writable()?;
        self.with_domain(dom, |d, _| {
            d.autostart = autostart;
            Ok(())
        })
    }

    fn domain_attach_device(&self, dom: &DomainHandle, xml: &str) -> HvResult<()> {
        self.writable()?;
        self.with_domain(dom, |d, _| {
            d.devices.push(xml.to_string());
            Ok(())
        })
    }

    fn domain_detach_device(&self, dom: &DomainHandle, xml: &str) -> HvResult<()> {
        self.writable()?;
        self.with_domain(dom, |d, _| {
            let before = d.devices.len();
            d.devices.retain(|dev| dev != xml);
            if d.devices.len() == before {
                return Err(HvError::failed("no matching device attached"));
            }
            Ok(())
        })
    }

    fn domain_block_stats(&self, dom: &DomainHandle, path: &str) -> HvResult<BlockStatsRet> {
        if path.is_empty() {
            return Err(HvError::new(
                ErrorCode::InvalidArg,
                ErrorDomain::Domain,
                "empty device path",
            ));
        }
        self.with_domain(dom, |d, _| {
            if !d.lifecycle.is_active() {
                return Err(HvError::failed("domain is not running"));
            }
            Ok(BlockStatsRet {
                rd_req: 128,
                rd_bytes: 128 * 512,
                wr_req: 64,
                wr_bytes: 64 * 512,
                errs: -1,
            })
        })
    }

    fn domain_interface_stats(
        &self,
        dom: &DomainHandle,
        path: &str,
    ) -> HvResult<InterfaceStatsRet> {
        if path.is_empty() {
            return Err(HvError::new(
                ErrorCode::InvalidArg,
                ErrorDomain::Domain,
                "empty interface path",
            ));
        }
        self.with_domain(dom, |d, _| {
            if !d.lifecycle.is_active() {
                return Err(HvError::failed("domain is not running"));
            }
            Ok(InterfaceStatsRet {
                rx_bytes: 4096,
                rx_packets: 32,
                tx_bytes: 2048,
                tx_packets: 16,
                rx_errs: -1,
                rx_drop: -1,
                tx_errs: -1,
                tx_drop: -1,
            })
        })
    }

    fn domain_scheduler_type(&self, dom: &DomainHandle) -> HvResult<(String, i32)> {
        self.with_domain(dom, |d, _| Ok(("credit".to_string(), d.sched.len() as i32)))
    }

    fn domain_scheduler_parameters(
        &self,
        dom: &DomainHandle,
        nparams: usize,
    ) -> HvResult<Vec<SchedParam>> {
        self.with_domain(dom, |d, _| {
            Ok(d.sched.iter().take(nparams).cloned().collect())
        })
    }

    fn domain_set_scheduler_parameters(
        &self,
        dom: &DomainHandle,
        params: &[SchedParam],
    ) -> HvResult<()> {
        self.writable()?;
        self.with_domain(dom, |d, _| {
            for param in params {
                match d.sched.iter_mut().find(|p| p.field == param.field) {
                    Some(existing) => existing.value = param.value.clone(),
                    None => {
                        return Err(HvError::new(
                            ErrorCode::InvalidArg,
                            ErrorDomain::Domain,
                            format!("unknown scheduler parameter: {}", param.field),
                        ))
                    }
                }
            }
            Ok(())
        })
    }

    fn migrate_prepare(
        &self,
        uri_in: Option<&str>,
        _flags: u64,
        _dname: Option<&str>,
        _resource: u64,
    ) -> HvResult<(Vec<u8>, Option<String>)> {
        self.writable()?;
        let uri = uri_in
            .map(str::to_string)
            .unwrap_or_else(|| format!("tcp://{}/", self.hostname));
        let cookie = format!("virtd-mig:{}", Uuid::new_v4()).into_bytes();
        Ok((cookie, Some(uri)))
    }

    fn migrate_perform(
        &self,
        dom: &DomainHandle,
        cookie: &[u8],
        _uri: &str,
        _flags: u64,
        _dname: Option<&str>,
        _resource: u64,
    ) -> HvResult<()> {
        self.writable()?;
        if cookie.is_empty() {
            return Err(HvError::failed("migration cookie missing"));
        }
        let mut state = lock(&self.state);
        let idx = state
            .domains
            .iter()
            .position(|d| d.uuid == dom.uuid || d.name == dom.name)
            .ok_or_else(|| HvError::no_domain(&dom.name))?;
        if !state.domains[idx].lifecycle.is_active() {
            return Err(HvError::failed("domain is not running"));
        }
        // The guest has moved to the destination host.
        if state.domains[idx].persistent {
            state.domains[idx].lifecycle = Lifecycle::Shutoff;
            state.domains[idx].id = -1;
        } else {
            state.domains.remove(idx);
        }
        Ok(())
    }

    fn migrate_finish(
        &self,
        dname: &str,
        cookie: &[u8],
        _uri: &str,
        _flags: u64,
    ) -> HvResult<DomainHandle> {
        self.writable()?;
        if cookie.is_empty() {
            return Err(HvError::failed("migration cookie missing"));
        }
        let mut state = lock(&self.state);
        let idx = match state.domains.iter().position(|d| d.name == dname) {
            Some(idx) => idx,
            None => {
                // Incoming transient guest.
                state.domains.push(MemDomain::new(
                    dname.to_string(),
                    Uuid::new_v4(),
                    format!("<domain><name>{dname}</name></domain>"),
                    false,
                ));
                state.domains.len() - 1
            }
        };
        state.domains[idx].id = state.next_domain_id;
        state.next_domain_id += 1;
        state.domains[idx].lifecycle = Lifecycle::Running;
        Ok(Self::acquire_domain(&mut state, idx))
    }

    fn list_networks(&self, max: usize) -> HvResult<Vec<String>> {
        let state = lock(&self.state);
        Ok(state
            .networks
            .iter()
            .filter(|n| n.active)
            .map(|n| n.name.clone())
            .take(max)
            .collect())
    }

    fn num_of_networks(&self) -> HvResult<i32> {
        let state = lock(&self.state);
        Ok(state.networks.iter().filter(|n| n.active).count() as i32)
    }

    fn list_defined_networks(&self, max: usize) -> HvResult<Vec<String>> {
        let state = lock(&self.state);
        Ok(state
            .networks
            .iter()
            .filter(|n| n.persistent && !n.active)
            .map(|n| n.name.clone())
            .take(max)
            .collect())
    }

    fn num_of_defined_networks(&self) -> HvResult<i32> {
        let state = lock(&self.state);
        Ok(state
            .networks
            .iter()
            .filter(|n| n.persistent && !n.active)
            .count() as i32)
    }

    fn network_lookup_by_name(&self, name: &str) -> HvResult<NetworkHandle> {
        let mut state = lock(&self.state);
        let idx = state
            .networks
            .iter()
            .position(|n| n.name == name)
            .ok_or_else(|| HvError::no_network(name))?;
        Ok(Self::acquire_network(&mut state, idx))
    }

    fn network_lookup_by_uuid(&self, uuid: &Uuid) -> HvResult<NetworkHandle> {
        let mut state = lock(&self.state);
        let idx = state
            .networks
            .iter()
            .position(|n| n.uuid == *uuid)
            .ok_or_else(|| HvError::no_network(uuid))?;
        Ok(Self::acquire_network(&mut state, idx))
    }

    fn get_network(&self, name: &str, uuid: &Uuid) -> HvResult<NetworkHandle> {
        let mut state = lock(&self.state);
        let idx = state
            .networks
            .iter()
            .position(|n| n.uuid == *uuid)
            .or_else(|| state.networks.iter().position(|n| n.name == name))
            .ok_or_else(|| HvError::no_network(name))?;
        Ok(Self::acquire_network(&mut state, idx))
    }

    fn release_network(&self, _net: &NetworkHandle) {
        lock(&self.state).handle_refs -= 1;
    }

    fn network_create_xml(&self, xml: &str) -> HvResult<NetworkHandle> {
        self.writable()?;
        let name = extract_tag(xml, "name").ok_or_else(|| {
            HvError::new(
                ErrorCode::InvalidArg,
                ErrorDomain::Network,
                "description is missing a <name> element",
            )
        })?;
        let mut state = lock(&self.state);
        if state.networks.iter().any(|n| n.name == name) {
            return Err(HvError::failed(format!("network {name} already exists")));
        }
        let bridge = format!("virbr{}", state.next_bridge);
        state.next_bridge += 1;
        state.networks.push(MemNetwork {
            name,
            uuid: Uuid::new_v4(),
            active: true,
            persistent: false,
            autostart: false,
            bridge,
            xml: xml.to_string(),
        });
        let idx = state.networks.len() - 1;
        Ok(Self::acquire_network(&mut state, idx))
    }

    fn network_define_xml(&self, xml: &str) -> HvResult<NetworkHandle> {
        self.writable()?;
        let name = extract_tag(xml, "name").ok_or_else(|| {
            HvError::new(
                ErrorCode::InvalidArg,
                ErrorDomain::Network,
                "description is missing a <name> element",
            )
        })?;
        let mut state = lock(&self.state);
        if let Some(idx) = state.networks.iter().position(|n| n.name == name) {
            state.networks[idx].xml = xml.to_string();
            state.networks[idx].persistent = true;
            return Ok(Self::acquire_network(&mut state, idx));
        }
        let bridge = format!("virbr{}", state.next_bridge);
        state.next_bridge += 1;
        state.networks.push(MemNetwork {
            name,
            uuid: Uuid::new_v4(),
            active: false,
            persistent: true,
            autostart: false,
            bridge,
            xml: xml.to_string(),
        });
        let idx = state.networks.len() - 1;
        Ok(Self::acquire_network(&mut state, idx))
    }

    fn network_undefine(&self, net: &NetworkHandle) -> HvResult<()> {
        self.writable()?;
        let mut state = lock(&self.state);
        let idx = state
            .networks
            .iter()
            .position(|n| n.uuid == net.uuid || n.name == net.name)
            .ok_or_else(|| HvError::no_network(&net.name))?;
        if state.networks[idx].active {
            return Err(HvError::failed("cannot undefine an active network"));
        }
        state.networks.remove(idx);
        Ok(())
    }

    fn network_create(&self, net: &NetworkHandle) -> HvResult<()> {
        self.writable()?;
        self.with_network(net, |n, _| {
            if n.active {
                return Err(HvError::failed("network is already active"));
            }
            n.active = true;
            Ok(())
        })
    }

    fn network_destroy(&self, net: &NetworkHandle) -> HvResult<()> {
        self.writable()?;
        let mut state = lock(&self.state);
        let idx = state
            .networks
            .iter()
            .position(|n| n.uuid == net.uuid || n.name == net.name)
            .ok_or_else(|| HvError::no_network(&net.name))?;
        if !state.networks[idx].active {
            return Err(HvError::failed("network is not active"));
        }
        if state.networks[idx].persistent {
            state.networks[idx].active = false;
        } else {
            state.networks.remove(idx);
        }
        Ok(())
    }

    fn network_xml_desc(&self, net: &NetworkHandle, _flags: u32) -> HvResult<String> {
        self.with_network(net, |n, _| Ok(n.xml.clone()))
    }

    fn network_bridge_name(&self, net: &NetworkHandle) -> HvResult<String> {
        self.with_network(net, |n, _| Ok(n.bridge.clone()))
    }

    fn network_autostart(&self, net: &NetworkHandle) -> HvResult<bool> {
        self.with_network(net, |n, _| Ok(n.autostart))
    }

    fn network_set_autostart(&self, net: &NetworkHandle, autostart: bool) -> HvResult<()> {
        self.writable()?;
        self.with_network(net, |n, _| {
            n.autostart = autostart;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rw_conn(hv: &MemHypervisor) -> Box<dyn HvConnection> {
        hv.open(None, OpenFlags::default()).unwrap()
    }

    const XML: &str = "<domain><name>guest1</name><os><type>hvm</type></os></domain>";

    #[test]
    fn define_create_lookup_destroy_lifecycle() {
        let hv = MemHypervisor::new();
        let conn = rw_conn(&hv);

        let dom = conn.domain_define_xml(XML).unwrap();
        assert_eq!(dom.id, -1);
        assert_eq!(conn.num_of_defined_domains().unwrap(), 1);
        assert_eq!(conn.num_of_domains().unwrap(), 0);

        conn.domain_create(&dom).unwrap();
        assert_eq!(conn.num_of_domains().unwrap(), 1);
        let running = conn.domain_lookup_by_name("guest1").unwrap();
        assert!(running.id > 0);
        conn.release_domain(&running);

        conn.domain_destroy(&dom).unwrap();
        assert_eq!(conn.num_of_domains().unwrap(), 0);
        assert_eq!(conn.num_of_defined_domains().unwrap(), 1);
        assert_eq!(hv.outstanding_handles(), 0);
    }

    #[test]
    fn readonly_connection_rejects_mutations() {
        let hv = MemHypervisor::new();
        let conn = hv.open(None, OpenFlags::READ_ONLY).unwrap();
        let err = conn.domain_define_xml(XML).unwrap_err();
        assert_eq!(err.code, ErrorCode::OperationDenied);
        // Queries still work.
        assert_eq!(conn.num_of_domains().unwrap(), 0);
    }

    #[test]
    fn suspend_resume_transitions() {
        let hv = MemHypervisor::new();
        let conn = rw_conn(&hv);
        let dom = conn.domain_create_linux(XML, 0).unwrap();

        conn.domain_suspend(&dom).unwrap();
        assert_eq!(conn.domain_info(&dom).unwrap().state, STATE_PAUSED);
        assert!(conn.domain_suspend(&dom).is_err());
        conn.domain_resume(&dom).unwrap();
        assert_eq!(conn.domain_info(&dom).unwrap().state, STATE_RUNNING);
        conn.release_domain(&dom);
    }

    #[test]
    fn save_restore_roundtrip() {
        let hv = MemHypervisor::new();
        let conn = rw_conn(&hv);
        let dom = conn.domain_define_xml(XML).unwrap();
        conn.domain_create(&dom).unwrap();

        conn.domain_save(&dom, "/var/lib/virtd/guest1.img").unwrap();
        assert_eq!(conn.num_of_domains().unwrap(), 0);

        conn.domain_restore("/var/lib/virtd/guest1.img").unwrap();
        assert_eq!(conn.num_of_domains().unwrap(), 1);
        assert!(conn.domain_restore("/var/lib/virtd/guest1.img").is_err());
        conn.release_domain(&dom);
    }

    #[test]
    fn scheduler_parameters_update_known_fields_only() {
        let hv = MemHypervisor::new();
        let conn = rw_conn(&hv);
        let dom = conn.domain_define_xml(XML).unwrap();

        conn.domain_set_scheduler_parameters(
            &dom,
            &[SchedParam {
                field: "weight".into(),
                value: SchedValue::Uint(512),
            }],
        )
        .unwrap();
        let params = conn.domain_scheduler_parameters(&dom, 2).unwrap();
        assert_eq!(params[0].value, SchedValue::Uint(512));

        let err = conn
            .domain_set_scheduler_parameters(
                &dom,
                &[SchedParam {
                    field: "nonsense".into(),
                    value: SchedValue::Int(1),
                }],
            )
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidArg);
        conn.release_domain(&dom);
    }

    #[test]
    fn default_network_is_seeded() {
        let hv = MemHypervisor::new();
        let conn = rw_conn(&hv);
        assert_eq!(conn.list_networks(10).unwrap(), vec!["default"]);
        let net = conn.network_lookup_by_name("default").unwrap();
        assert_eq!(conn.network_bridge_name(&net).unwrap(), "virbr0");
        conn.release_network(&net);
        assert_eq!(hv.outstanding_handles(), 0);
    }

    #[test]
    fn migrate_perform_removes_and_finish_creates() {
        let hv = MemHypervisor::new();
        let conn = rw_conn(&hv);
        let dom = conn.domain_create_linux(XML, 0).unwrap();

        let (cookie, uri_out) = conn.migrate_prepare(None, 0, None, 0).unwrap();
        assert!(uri_out.is_some());
        conn.migrate_perform(&dom, &cookie, "tcp://dest/", 0, None, 0)
            .unwrap();
        assert_eq!(conn.num_of_domains().unwrap(), 0);

        let incoming = conn
            .migrate_finish("guest1", &cookie, "tcp://dest/", 0)
            .unwrap();
        assert!(incoming.id > 0);
        conn.release_domain(&incoming);
        conn.release_domain(&dom);
        assert_eq!(hv.outstanding_handles(), 0);
    }

    #[test]
    fn extract_tag_parses_simple_documents() {
        assert_eq!(
            extract_tag("<domain><name>x</name></domain>", "name").as_deref(),
            Some("x")
        );
        assert_eq!(extract_tag("<domain></domain>", "name"), None);
        assert_eq!(extract_tag("<domain><name></name></domain>", "name"), None);
    }
}
