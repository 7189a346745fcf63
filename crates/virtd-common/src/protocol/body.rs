//! Typed argument and return bodies for every procedure.
//!
//! These are the generated-stub layer of the protocol: one struct per
//! message shape, each with a symmetric encode/decode pair. Shapes shared
//! by several procedures (a bare domain reference, a name-list request)
//! are defined once and reused.
//!
//! Bounds named in [`crate::protocol`] are enforced here at decode time,
//! before any allocation sized by the decoded value. Client-supplied
//! *capacity* fields (`maxids`, `maxnames`, `maxinfo`) are plain integers
//! whose range the dispatcher's handlers check.

use uuid::Uuid;

use crate::error::{WireError, WireResult};
use crate::protocol::wire::{WireDecode, WireEncode, WireReader, WireWriter};
use crate::protocol::{
    AUTH_SASL_DATA_MAX, CPUMAPS_MAX, CPUMAP_MAX, DOMAIN_ID_LIST_MAX, DOMAIN_NAME_LIST_MAX,
    DOMAIN_SCHEDULER_PARAMETERS_MAX, MIGRATE_COOKIE_MAX, NODE_MODEL_LEN, SCHED_FIELD_LENGTH,
    VCPUINFO_MAX,
};
use crate::types::{AuthType, DomainRef, NetworkRef};

// === Shared shapes ===

/// Arguments consisting of a single domain reference.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainArgs {
    pub dom: DomainRef,
}

impl WireEncode for DomainArgs {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        self.dom.encode(w)
    }
}

impl WireDecode for DomainArgs {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            dom: DomainRef::decode(r)?,
        })
    }
}

/// Arguments consisting of a single network reference.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkArgs {
    pub net: NetworkRef,
}

impl WireEncode for NetworkArgs {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        self.net.encode(w)
    }
}

impl WireDecode for NetworkArgs {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            net: NetworkRef::decode(r)?,
        })
    }
}

/// Return carrying a single domain reference.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainRet {
    pub dom: DomainRef,
}

impl WireEncode for DomainRet {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        self.dom.encode(w)
    }
}

impl WireDecode for DomainRet {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            dom: DomainRef::decode(r)?,
        })
    }
}

/// Return carrying a single network reference.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkRet {
    pub net: NetworkRef,
}

impl WireEncode for NetworkRet {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        self.net.encode(w)
    }
}

impl WireDecode for NetworkRet {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            net: NetworkRef::decode(r)?,
        })
    }
}

/// Return carrying a single count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumRet {
    pub num: i32,
}

impl WireEncode for NumRet {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.i32(self.num)
    }
}

impl WireDecode for NumRet {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self { num: r.i32()? })
    }
}

/// Request for a bounded name list; the handler validates `maxnames`
/// against the per-procedure maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameListArgs {
    pub maxnames: i32,
}

impl WireEncode for NameListArgs {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.i32(self.maxnames)
    }
}

impl WireDecode for NameListArgs {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self { maxnames: r.i32()? })
    }
}

/// A list of object names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameListRet {
    pub names: Vec<String>,
}

impl WireEncode for NameListRet {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.array("names", DOMAIN_NAME_LIST_MAX, &self.names, |w, n| {
            w.string(n)
        })
    }
}

impl WireDecode for NameListRet {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            names: r.array("names", DOMAIN_NAME_LIST_MAX, |r| r.string())?,
        })
    }
}

/// Return carrying an XML description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlRet {
    pub xml: String,
}

impl WireEncode for XmlRet {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.string(&self.xml)
    }
}

impl WireDecode for XmlRet {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self { xml: r.string()? })
    }
}

/// Return carrying an autostart flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutostartRet {
    pub autostart: bool,
}

impl WireEncode for AutostartRet {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.bool(self.autostart)
    }
}

impl WireDecode for AutostartRet {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            autostart: r.bool()?,
        })
    }
}

// === Connection and host ===

/// `OPEN`. A `None` name selects the default hypervisor URI; the
/// distinction between absent and empty is preserved on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenArgs {
    pub name: Option<String>,
    pub flags: u32,
}

impl WireEncode for OpenArgs {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.option(self.name.as_ref(), |w, s| w.string(s))?;
        w.u32(self.flags)
    }
}

impl WireDecode for OpenArgs {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            name: r.option(|r| r.string())?,
            flags: r.u32()?,
        })
    }
}

/// `GET_TYPE` return: the driver name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetTypeRet {
    pub kind: String,
}

impl WireEncode for GetTypeRet {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.string(&self.kind)
    }
}

impl WireDecode for GetTypeRet {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self { kind: r.string()? })
    }
}

/// `GET_VERSION` return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetVersionRet {
    pub hv_version: u64,
}

impl WireEncode for GetVersionRet {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.u64(self.hv_version)
    }
}

impl WireDecode for GetVersionRet {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            hv_version: r.u64()?,
        })
    }
}

/// `GET_HOSTNAME` return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetHostnameRet {
    pub hostname: String,
}

impl WireEncode for GetHostnameRet {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.string(&self.hostname)
    }
}

impl WireDecode for GetHostnameRet {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            hostname: r.string()?,
        })
    }
}

/// `GET_CAPABILITIES` return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetCapabilitiesRet {
    pub capabilities: String,
}

impl WireEncode for GetCapabilitiesRet {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.string(&self.capabilities)
    }
}

impl WireDecode for GetCapabilitiesRet {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            capabilities: r.string()?,
        })
    }
}

/// `GET_MAX_VCPUS` arguments; the optional string selects a guest type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetMaxVcpusArgs {
    pub kind: Option<String>,
}

impl WireEncode for GetMaxVcpusArgs {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.option(self.kind.as_ref(), |w, s| w.string(s))
    }
}

impl WireDecode for GetMaxVcpusArgs {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            kind: r.option(|r| r.string())?,
        })
    }
}

/// `GET_MAX_VCPUS` return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetMaxVcpusRet {
    pub max_vcpus: i32,
}

impl WireEncode for GetMaxVcpusRet {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.i32(self.max_vcpus)
    }
}

impl WireDecode for GetMaxVcpusRet {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            max_vcpus: r.i32()?,
        })
    }
}

/// `NODE_GET_INFO` return. The model string occupies a fixed 32-byte
/// NUL-padded slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeGetInfoRet {
    pub model: String,
    pub memory: u64,
    pub cpus: i32,
    pub mhz: i32,
    pub nodes: i32,
    pub sockets: i32,
    pub cores: i32,
    pub threads: i32,
}

impl WireEncode for NodeGetInfoRet {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        let mut model = [0u8; NODE_MODEL_LEN];
        let src = self.model.as_bytes();
        if src.len() > NODE_MODEL_LEN {
            return Err(WireError::FieldTooLong {
                field: "node model",
                len: src.len() as u32,
                max: NODE_MODEL_LEN as u32,
            });
        }
        model[..src.len()].copy_from_slice(src);
        w.opaque(&model)?;
        w.u64(self.memory)?;
        w.i32(self.cpus)?;
        w.i32(self.mhz)?;
        w.i32(self.nodes)?;
        w.i32(self.sockets)?;
        w.i32(self.cores)?;
        w.i32(self.threads)
    }
}

impl WireDecode for NodeGetInfoRet {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        let raw = r.opaque::<NODE_MODEL_LEN>()?;
        let end = raw.iter().position(|b| *b == 0).unwrap_or(NODE_MODEL_LEN);
        let model =
            String::from_utf8(raw[..end].to_vec()).map_err(|_| WireError::InvalidUtf8)?;
        Ok(Self {
            model,
            memory: r.u64()?,
            cpus: r.i32()?,
            mhz: r.i32()?,
            nodes: r.i32()?,
            sockets: r.i32()?,
            cores: r.i32()?,
            threads: r.i32()?,
        })
    }
}

/// `SUPPORTS_FEATURE` arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupportsFeatureArgs {
    pub feature: i32,
}

impl WireEncode for SupportsFeatureArgs {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.i32(self.feature)
    }
}

impl WireDecode for SupportsFeatureArgs {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self { feature: r.i32()? })
    }
}

/// `SUPPORTS_FEATURE` return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupportsFeatureRet {
    pub supported: bool,
}

impl WireEncode for SupportsFeatureRet {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.bool(self.supported)
    }
}

impl WireDecode for SupportsFeatureRet {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            supported: r.bool()?,
        })
    }
}

// === Domain enumeration and lookup ===

/// `LIST_DOMAINS` arguments; the handler validates `maxids` against
/// [`DOMAIN_ID_LIST_MAX`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListDomainsArgs {
    pub maxids: i32,
}

impl WireEncode for ListDomainsArgs {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.i32(self.maxids)
    }
}

impl WireDecode for ListDomainsArgs {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self { maxids: r.i32()? })
    }
}

/// `LIST_DOMAINS` return: ids of running domains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListDomainsRet {
    pub ids: Vec<i32>,
}

impl WireEncode for ListDomainsRet {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.array("ids", DOMAIN_ID_LIST_MAX, &self.ids, |w, v| w.i32(*v))
    }
}

impl WireDecode for ListDomainsRet {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            ids: r.array("ids", DOMAIN_ID_LIST_MAX, |r| r.i32())?,
        })
    }
}

/// `DOMAIN_LOOKUP_BY_ID` arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainLookupByIdArgs {
    pub id: i32,
}

impl WireEncode for DomainLookupByIdArgs {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.i32(self.id)
    }
}

impl WireDecode for DomainLookupByIdArgs {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self { id: r.i32()? })
    }
}

/// `DOMAIN_LOOKUP_BY_NAME` arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainLookupByNameArgs {
    pub name: String,
}

impl WireEncode for DomainLookupByNameArgs {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.string(&self.name)
    }
}

impl WireDecode for DomainLookupByNameArgs {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self { name: r.string()? })
    }
}

/// `DOMAIN_LOOKUP_BY_UUID` arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainLookupByUuidArgs {
    pub uuid: Uuid,
}

impl WireEncode for DomainLookupByUuidArgs {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        self.uuid.encode(w)
    }
}

impl WireDecode for DomainLookupByUuidArgs {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            uuid: Uuid::decode(r)?,
        })
    }
}

// === Domain lifecycle ===

/// `DOMAIN_CREATE_LINUX` arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainCreateLinuxArgs {
    pub xml_desc: String,
    pub flags: u32,
}

impl WireEncode for DomainCreateLinuxArgs {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.string(&self.xml_desc)?;
        w.u32(self.flags)
    }
}

impl WireDecode for DomainCreateLinuxArgs {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            xml_desc: r.string()?,
            flags: r.u32()?,
        })
    }
}

/// `DOMAIN_DEFINE_XML` arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainDefineXmlArgs {
    pub xml: String,
}

impl WireEncode for DomainDefineXmlArgs {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.string(&self.xml)
    }
}

impl WireDecode for DomainDefineXmlArgs {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self { xml: r.string()? })
    }
}

/// `DOMAIN_REBOOT` arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainRebootArgs {
    pub dom: DomainRef,
    pub flags: u32,
}

impl WireEncode for DomainRebootArgs {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        self.dom.encode(w)?;
        w.u32(self.flags)
    }
}

impl WireDecode for DomainRebootArgs {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            dom: DomainRef::decode(r)?,
            flags: r.u32()?,
        })
    }
}

/// `DOMAIN_SAVE` arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainSaveArgs {
    pub dom: DomainRef,
    pub to: String,
}

impl WireEncode for DomainSaveArgs {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        self.dom.encode(w)?;
        w.string(&self.to)
    }
}

impl WireDecode for DomainSaveArgs {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            dom: DomainRef::decode(r)?,
            to: r.string()?,
        })
    }
}

/// `DOMAIN_RESTORE` arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainRestoreArgs {
    pub from: String,
}

impl WireEncode for DomainRestoreArgs {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.string(&self.from)
    }
}

impl WireDecode for DomainRestoreArgs {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self { from: r.string()? })
    }
}

/// `DOMAIN_CORE_DUMP` arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainCoreDumpArgs {
    pub dom: DomainRef,
    pub to: String,
    pub flags: u32,
}

impl WireEncode for DomainCoreDumpArgs {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        self.dom.encode(w)?;
        w.string(&self.to)?;
        w.u32(self.flags)
    }
}

impl WireDecode for DomainCoreDumpArgs {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            dom: DomainRef::decode(r)?,
            to: r.string()?,
            flags: r.u32()?,
        })
    }
}

// === Domain queries and tuning ===

/// `DOMAIN_GET_INFO` return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainGetInfoRet {
    pub state: i32,
    pub max_mem: u64,
    pub memory: u64,
    pub nr_virt_cpu: i32,
    pub cpu_time: u64,
}

impl WireEncode for DomainGetInfoRet {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.i32(self.state)?;
        w.u64(self.max_mem)?;
        w.u64(self.memory)?;
        w.i32(self.nr_virt_cpu)?;
        w.u64(self.cpu_time)
    }
}

impl WireDecode for DomainGetInfoRet {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            state: r.i32()?,
            max_mem: r.u64()?,
            memory: r.u64()?,
            nr_virt_cpu: r.i32()?,
            cpu_time: r.u64()?,
        })
    }
}

/// `DOMAIN_GET_XML_DESC` arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainGetXmlDescArgs {
    pub dom: DomainRef,
    pub flags: u32,
}

impl WireEncode for DomainGetXmlDescArgs {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        self.dom.encode(w)?;
        w.u32(self.flags)
    }
}

impl WireDecode for DomainGetXmlDescArgs {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            dom: DomainRef::decode(r)?,
            flags: r.u32()?,
        })
    }
}

/// `DOMAIN_GET_OS_TYPE` return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainGetOsTypeRet {
    pub os_type: String,
}

impl WireEncode for DomainGetOsTypeRet {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.string(&self.os_type)
    }
}

impl WireDecode for DomainGetOsTypeRet {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            os_type: r.string()?,
        })
    }
}

/// `DOMAIN_GET_MAX_MEMORY` return (kibibytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainGetMaxMemoryRet {
    pub memory: u64,
}

impl WireEncode for DomainGetMaxMemoryRet {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.u64(self.memory)
    }
}

impl WireDecode for DomainGetMaxMemoryRet {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self { memory: r.u64()? })
    }
}

/// `DOMAIN_SET_MAX_MEMORY` / `DOMAIN_SET_MEMORY` arguments (kibibytes).
#[derive(Debug, Clone, PartialEq)]
pub struct DomainSetMemoryArgs {
    pub dom: DomainRef,
    pub memory: u64,
}

impl WireEncode for DomainSetMemoryArgs {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        self.dom.encode(w)?;
        w.u64(self.memory)
    }
}

impl WireDecode for DomainSetMemoryArgs {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            dom: DomainRef::decode(r)?,
            memory: r.u64()?,
        })
    }
}

/// `DOMAIN_SET_VCPUS` arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainSetVcpusArgs {
    pub dom: DomainRef,
    pub nvcpus: i32,
}

impl WireEncode for DomainSetVcpusArgs {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        self.dom.encode(w)?;
        w.i32(self.nvcpus)
    }
}

impl WireDecode for DomainSetVcpusArgs {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            dom: DomainRef::decode(r)?,
            nvcpus: r.i32()?,
        })
    }
}

/// `DOMAIN_PIN_VCPU` arguments; the map is bounded by [`CPUMAP_MAX`].
#[derive(Debug, Clone, PartialEq)]
pub struct DomainPinVcpuArgs {
    pub dom: DomainRef,
    pub vcpu: i32,
    pub cpumap: Vec<u8>,
}

impl WireEncode for DomainPinVcpuArgs {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        self.dom.encode(w)?;
        w.i32(self.vcpu)?;
        w.bytes("cpumap", CPUMAP_MAX, &self.cpumap)
    }
}

impl WireDecode for DomainPinVcpuArgs {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            dom: DomainRef::decode(r)?,
            vcpu: r.i32()?,
            cpumap: r.bytes("cpumap", CPUMAP_MAX)?,
        })
    }
}

/// `DOMAIN_GET_VCPUS` arguments; the handler validates `maxinfo` and
/// `maxinfo * maplen` before sizing anything.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainGetVcpusArgs {
    pub dom: DomainRef,
    pub maxinfo: i32,
    pub maplen: i32,
}

impl WireEncode for DomainGetVcpusArgs {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        self.dom.encode(w)?;
        w.i32(self.maxinfo)?;
        w.i32(self.maplen)
    }
}

impl WireDecode for DomainGetVcpusArgs {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            dom: DomainRef::decode(r)?,
            maxinfo: r.i32()?,
            maplen: r.i32()?,
        })
    }
}

/// Per-vCPU runtime information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VcpuInfo {
    pub number: i32,
    pub state: i32,
    pub cpu_time: u64,
    pub cpu: i32,
}

impl WireEncode for VcpuInfo {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.i32(self.number)?;
        w.i32(self.state)?;
        w.u64(self.cpu_time)?;
        w.i32(self.cpu)
    }
}

impl WireDecode for VcpuInfo {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            number: r.i32()?,
            state: r.i32()?,
            cpu_time: r.u64()?,
            cpu: r.i32()?,
        })
    }
}

/// `DOMAIN_GET_VCPUS` return. `cpumaps` is the concatenation of one
/// `maplen`-byte map per returned vCPU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainGetVcpusRet {
    pub info: Vec<VcpuInfo>,
    pub cpumaps: Vec<u8>,
}

impl WireEncode for DomainGetVcpusRet {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.array("vcpu info", VCPUINFO_MAX, &self.info, |w, i| i.encode(w))?;
        w.bytes("cpumaps", CPUMAPS_MAX, &self.cpumaps)
    }
}

impl WireDecode for DomainGetVcpusRet {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            info: r.array("vcpu info", VCPUINFO_MAX, VcpuInfo::decode)?,
            cpumaps: r.bytes("cpumaps", CPUMAPS_MAX)?,
        })
    }
}

/// `DOMAIN_SET_AUTOSTART` arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainSetAutostartArgs {
    pub dom: DomainRef,
    pub autostart: bool,
}

impl WireEncode for DomainSetAutostartArgs {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        self.dom.encode(w)?;
        w.bool(self.autostart)
    }
}

impl WireDecode for DomainSetAutostartArgs {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            dom: DomainRef::decode(r)?,
            autostart: r.bool()?,
        })
    }
}

/// `DOMAIN_ATTACH_DEVICE` / `DOMAIN_DETACH_DEVICE` arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainDeviceArgs {
    pub dom: DomainRef,
    pub xml: String,
}

impl WireEncode for DomainDeviceArgs {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        self.dom.encode(w)?;
        w.string(&self.xml)
    }
}

impl WireDecode for DomainDeviceArgs {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            dom: DomainRef::decode(r)?,
            xml: r.string()?,
        })
    }
}

// === Statistics ===

/// `DOMAIN_BLOCK_STATS` / `DOMAIN_INTERFACE_STATS` arguments: the device
/// path within the domain.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainStatsArgs {
    pub dom: DomainRef,
    pub path: String,
}

impl WireEncode for DomainStatsArgs {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        self.dom.encode(w)?;
        w.string(&self.path)
    }
}

impl WireDecode for DomainStatsArgs {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            dom: DomainRef::decode(r)?,
            path: r.string()?,
        })
    }
}

/// Block device counters; -1 means the counter is not supported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockStatsRet {
    pub rd_req: i64,
    pub rd_bytes: i64,
    pub wr_req: i64,
    pub wr_bytes: i64,
    pub errs: i64,
}

impl WireEncode for BlockStatsRet {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.i64(self.rd_req)?;
        w.i64(self.rd_bytes)?;
        w.i64(self.wr_req)?;
        w.i64(self.wr_bytes)?;
        w.i64(self.errs)
    }
}

impl WireDecode for BlockStatsRet {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            rd_req: r.i64()?,
            rd_bytes: r.i64()?,
            wr_req: r.i64()?,
            wr_bytes: r.i64()?,
            errs: r.i64()?,
        })
    }
}

/// Network interface counters; -1 means the counter is not supported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterfaceStatsRet {
    pub rx_bytes: i64,
    pub rx_packets: i64,
    pub rx_errs: i64,
    pub rx_drop: i64,
    pub tx_bytes: i64,
    pub tx_packets: i64,
    pub tx_errs: i64,
    pub tx_drop: i64,
}

impl WireEncode for InterfaceStatsRet {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.i64(self.rx_bytes)?;
        w.i64(self.rx_packets)?;
        w.i64(self.rx_errs)?;
        w.i64(self.rx_drop)?;
        w.i64(self.tx_bytes)?;
        w.i64(self.tx_packets)?;
        w.i64(self.tx_errs)?;
        w.i64(self.tx_drop)
    }
}

impl WireDecode for InterfaceStatsRet {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            rx_bytes: r.i64()?,
            rx_packets: r.i64()?,
            rx_errs: r.i64()?,
            rx_drop: r.i64()?,
            tx_bytes: r.i64()?,
            tx_packets: r.i64()?,
            tx_errs: r.i64()?,
            tx_drop: r.i64()?,
        })
    }
}

// === Scheduler parameters ===

/// One scheduler parameter value; the discriminant selects the arm.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedValue {
    Int(i32),
    Uint(u32),
    Llong(i64),
    Ullong(u64),
    Double(f64),
    Boolean(bool),
}

impl SchedValue {
    pub fn discriminant(&self) -> i32 {
        match self {
            SchedValue::Int(_) => 1,
            SchedValue::Uint(_) => 2,
            SchedValue::Llong(_) => 3,
            SchedValue::Ullong(_) => 4,
            SchedValue::Double(_) => 5,
            SchedValue::Boolean(_) => 6,
        }
    }
}

impl WireEncode for SchedValue {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.i32(self.discriminant())?;
        match self {
            SchedValue::Int(v) => w.i32(*v),
            SchedValue::Uint(v) => w.u32(*v),
            SchedValue::Llong(v) => w.i64(*v),
            SchedValue::Ullong(v) => w.u64(*v),
            SchedValue::Double(v) => w.f64(*v),
            SchedValue::Boolean(v) => w.bool(*v),
        }
    }
}

impl WireDecode for SchedValue {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        match r.i32()? {
            1 => Ok(SchedValue::Int(r.i32()?)),
            2 => Ok(SchedValue::Uint(r.u32()?)),
            3 => Ok(SchedValue::Llong(r.i64()?)),
            4 => Ok(SchedValue::Ullong(r.u64()?)),
            5 => Ok(SchedValue::Double(r.f64()?)),
            6 => Ok(SchedValue::Boolean(r.bool()?)),
            value => Err(WireError::BadDiscriminant {
                what: "scheduler parameter type",
                value,
            }),
        }
    }
}

/// A named scheduler parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedParam {
    pub field: String,
    pub value: SchedValue,
}

impl WireEncode for SchedParam {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.bytes("sched field", SCHED_FIELD_LENGTH, self.field.as_bytes())?;
        self.value.encode(w)
    }
}

impl WireDecode for SchedParam {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        let raw = r.bytes("sched field", SCHED_FIELD_LENGTH)?;
        let field = String::from_utf8(raw).map_err(|_| WireError::InvalidUtf8)?;
        Ok(Self {
            field,
            value: SchedValue::decode(r)?,
        })
    }
}

/// `DOMAIN_GET_SCHEDULER_TYPE` return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedTypeRet {
    pub kind: String,
    pub nparams: i32,
}

impl WireEncode for SchedTypeRet {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.string(&self.kind)?;
        w.i32(self.nparams)
    }
}

impl WireDecode for SchedTypeRet {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            kind: r.string()?,
            nparams: r.i32()?,
        })
    }
}

/// `DOMAIN_GET_SCHEDULER_PARAMETERS` arguments; the handler validates
/// `nparams` against [`DOMAIN_SCHEDULER_PARAMETERS_MAX`].
#[derive(Debug, Clone, PartialEq)]
pub struct SchedGetParamsArgs {
    pub dom: DomainRef,
    pub nparams: i32,
}

impl WireEncode for SchedGetParamsArgs {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        self.dom.encode(w)?;
        w.i32(self.nparams)
    }
}

impl WireDecode for SchedGetParamsArgs {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            dom: DomainRef::decode(r)?,
            nparams: r.i32()?,
        })
    }
}

/// A scheduler parameter vector in either direction.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedParamsRet {
    pub params: Vec<SchedParam>,
}

impl WireEncode for SchedParamsRet {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.array(
            "sched params",
            DOMAIN_SCHEDULER_PARAMETERS_MAX,
            &self.params,
            |w, p| p.encode(w),
        )
    }
}

impl WireDecode for SchedParamsRet {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            params: r.array(
                "sched params",
                DOMAIN_SCHEDULER_PARAMETERS_MAX,
                SchedParam::decode,
            )?,
        })
    }
}

/// `DOMAIN_SET_SCHEDULER_PARAMETERS` arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedSetParamsArgs {
    pub dom: DomainRef,
    pub params: Vec<SchedParam>,
}

impl WireEncode for SchedSetParamsArgs {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        self.dom.encode(w)?;
        w.array(
            "sched params",
            DOMAIN_SCHEDULER_PARAMETERS_MAX,
            &self.params,
            |w, p| p.encode(w),
        )
    }
}

impl WireDecode for SchedSetParamsArgs {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            dom: DomainRef::decode(r)?,
            params: r.array(
                "sched params",
                DOMAIN_SCHEDULER_PARAMETERS_MAX,
                SchedParam::decode,
            )?,
        })
    }
}

// === Migration ===

/// `DOMAIN_MIGRATE_PREPARE` arguments (runs on the destination host).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigratePrepareArgs {
    pub uri_in: Option<String>,
    pub flags: u64,
    pub dname: Option<String>,
    pub resource: u64,
}

impl WireEncode for MigratePrepareArgs {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.option(self.uri_in.as_ref(), |w, s| w.string(s))?;
        w.u64(self.flags)?;
        w.option(self.dname.as_ref(), |w, s| w.string(s))?;
        w.u64(self.resource)
    }
}

impl WireDecode for MigratePrepareArgs {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            uri_in: r.option(|r| r.string())?,
            flags: r.u64()?,
            dname: r.option(|r| r.string())?,
            resource: r.u64()?,
        })
    }
}

/// `DOMAIN_MIGRATE_PREPARE` return. The cookie is opaque to the protocol
/// layer and is echoed into PERFORM/FINISH unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigratePrepareRet {
    pub cookie: Vec<u8>,
    pub uri_out: Option<String>,
}

impl WireEncode for MigratePrepareRet {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.bytes("migrate cookie", MIGRATE_COOKIE_MAX, &self.cookie)?;
        w.option(self.uri_out.as_ref(), |w, s| w.string(s))
    }
}

impl WireDecode for MigratePrepareRet {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            cookie: r.bytes("migrate cookie", MIGRATE_COOKIE_MAX)?,
            uri_out: r.option(|r| r.string())?,
        })
    }
}

/// `DOMAIN_MIGRATE_PERFORM` arguments (runs on the source host).
#[derive(Debug, Clone, PartialEq)]
pub struct MigratePerformArgs {
    pub dom: DomainRef,
    pub cookie: Vec<u8>,
    pub uri: String,
    pub flags: u64,
    pub dname: Option<String>,
    pub resource: u64,
}

impl WireEncode for MigratePerformArgs {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        self.dom.encode(w)?;
        w.bytes("migrate cookie", MIGRATE_COOKIE_MAX, &self.cookie)?;
        w.string(&self.uri)?;
        w.u64(self.flags)?;
        w.option(self.dname.as_ref(), |w, s| w.string(s))?;
        w.u64(self.resource)
    }
}

impl WireDecode for MigratePerformArgs {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            dom: DomainRef::decode(r)?,
            cookie: r.bytes("migrate cookie", MIGRATE_COOKIE_MAX)?,
            uri: r.string()?,
            flags: r.u64()?,
            dname: r.option(|r| r.string())?,
            resource: r.u64()?,
        })
    }
}

/// `DOMAIN_MIGRATE_FINISH` arguments (back on the destination host).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrateFinishArgs {
    pub dname: String,
    pub cookie: Vec<u8>,
    pub uri: String,
    pub flags: u64,
}

impl WireEncode for MigrateFinishArgs {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.string(&self.dname)?;
        w.bytes("migrate cookie", MIGRATE_COOKIE_MAX, &self.cookie)?;
        w.string(&self.uri)?;
        w.u64(self.flags)
    }
}

impl WireDecode for MigrateFinishArgs {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            dname: r.string()?,
            cookie: r.bytes("migrate cookie", MIGRATE_COOKIE_MAX)?,
            uri: r.string()?,
            flags: r.u64()?,
        })
    }
}

// === Networks ===

/// `NETWORK_LOOKUP_BY_NAME` arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkLookupByNameArgs {
    pub name: String,
}

impl WireEncode for NetworkLookupByNameArgs {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.string(&self.name)
    }
}

impl WireDecode for NetworkLookupByNameArgs {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self { name: r.string()? })
    }
}

/// `NETWORK_LOOKUP_BY_UUID` arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkLookupByUuidArgs {
    pub uuid: Uuid,
}

impl WireEncode for NetworkLookupByUuidArgs {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        self.uuid.encode(w)
    }
}

impl WireDecode for NetworkLookupByUuidArgs {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            uuid: Uuid::decode(r)?,
        })
    }
}

/// `NETWORK_CREATE_XML` / `NETWORK_DEFINE_XML` arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkXmlArgs {
    pub xml: String,
}

impl WireEncode for NetworkXmlArgs {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.string(&self.xml)
    }
}

impl WireDecode for NetworkXmlArgs {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self { xml: r.string()? })
    }
}

/// `NETWORK_DUMP_XML` arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkDumpXmlArgs {
    pub net: NetworkRef,
    pub flags: u32,
}

impl WireEncode for NetworkDumpXmlArgs {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        self.net.encode(w)?;
        w.u32(self.flags)
    }
}

impl WireDecode for NetworkDumpXmlArgs {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            net: NetworkRef::decode(r)?,
            flags: r.u32()?,
        })
    }
}

/// `NETWORK_GET_BRIDGE_NAME` return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeNameRet {
    pub name: String,
}

impl WireEncode for BridgeNameRet {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.string(&self.name)
    }
}

impl WireDecode for BridgeNameRet {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self { name: r.string()? })
    }
}

/// `NETWORK_SET_AUTOSTART` arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkSetAutostartArgs {
    pub net: NetworkRef,
    pub autostart: bool,
}

impl WireEncode for NetworkSetAutostartArgs {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        self.net.encode(w)?;
        w.bool(self.autostart)
    }
}

impl WireDecode for NetworkSetAutostartArgs {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            net: NetworkRef::decode(r)?,
            autostart: r.bool()?,
        })
    }
}

// === Authentication ===

/// `AUTH_LIST` return: the schemes the server will accept, in preference
/// order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthListRet {
    pub types: Vec<AuthType>,
}

impl WireEncode for AuthListRet {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.array("auth types", 8, &self.types, |w, t| t.encode(w))
    }
}

impl WireDecode for AuthListRet {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            types: r.array("auth types", 8, AuthType::decode)?,
        })
    }
}

/// `AUTH_SASL_INIT` return: comma-separated mechanism list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaslInitRet {
    pub mechlist: String,
}

impl WireEncode for SaslInitRet {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.string(&self.mechlist)
    }
}

impl WireDecode for SaslInitRet {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            mechlist: r.string()?,
        })
    }
}

/// A SASL payload in either direction.
///
/// `None` is the protocol's `nil = 1`: no payload at all. `Some(vec![])`
/// is an empty payload. SASL mechanisms treat the two differently, so the
/// distinction must survive both encode and decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaslPayload(pub Option<Vec<u8>>);

impl SaslPayload {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn data(bytes: impl Into<Vec<u8>>) -> Self {
        Self(Some(bytes.into()))
    }

    pub fn as_deref(&self) -> Option<&[u8]> {
        self.0.as_deref()
    }
}

impl WireEncode for SaslPayload {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.bool(self.0.is_none())?;
        let data = self.0.as_deref().unwrap_or(&[]);
        w.bytes("sasl data", AUTH_SASL_DATA_MAX, data)
    }
}

impl WireDecode for SaslPayload {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        let nil = r.bool()?;
        let data = r.bytes("sasl data", AUTH_SASL_DATA_MAX)?;
        Ok(Self(if nil { None } else { Some(data) }))
    }
}

/// `AUTH_SASL_START` arguments: the chosen mechanism plus the client's
/// initial response, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaslStartArgs {
    pub mech: String,
    pub payload: SaslPayload,
}

impl WireEncode for SaslStartArgs {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.string(&self.mech)?;
        self.payload.encode(w)
    }
}

impl WireDecode for SaslStartArgs {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            mech: r.string()?,
            payload: SaslPayload::decode(r)?,
        })
    }
}

/// `AUTH_SASL_STEP` arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaslStepArgs {
    pub payload: SaslPayload,
}

impl WireEncode for SaslStepArgs {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        self.payload.encode(w)
    }
}

impl WireDecode for SaslStepArgs {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            payload: SaslPayload::decode(r)?,
        })
    }
}

/// `AUTH_SASL_START` / `AUTH_SASL_STEP` return: `complete` flips to true
/// when the negotiation has succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaslNegotiateRet {
    pub complete: bool,
    pub payload: SaslPayload,
}

impl WireEncode for SaslNegotiateRet {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.bool(self.complete)?;
        self.payload.encode(w)
    }
}

impl WireDecode for SaslNegotiateRet {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            complete: r.bool()?,
            payload: SaslPayload::decode(r)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T: WireEncode + WireDecode + PartialEq + std::fmt::Debug>(value: &T) {
        let mut buf = [0u8; 4096];
        let mut w = WireWriter::new(&mut buf);
        value.encode(&mut w).unwrap();
        let n = w.position();
        let mut r = WireReader::new(&buf[..n]);
        assert_eq!(&T::decode(&mut r).unwrap(), value);
        assert_eq!(r.remaining(), 0, "decoder left trailing bytes");
    }

    fn dom() -> DomainRef {
        DomainRef {
            name: "guest".into(),
            uuid: Uuid::new_v4(),
            id: 3,
        }
    }

    #[test]
    fn open_preserves_null_vs_empty_name() {
        let null = OpenArgs {
            name: None,
            flags: 0,
        };
        let empty = OpenArgs {
            name: Some(String::new()),
            flags: 0,
        };
        roundtrip(&null);
        roundtrip(&empty);

        let mut a = [0u8; 64];
        let mut w = WireWriter::new(&mut a);
        null.encode(&mut w).unwrap();
        let na = w.position();
        let mut b = [0u8; 64];
        let mut w = WireWriter::new(&mut b);
        empty.encode(&mut w).unwrap();
        let nb = w.position();
        assert_ne!(&a[..na], &b[..nb]);
    }

    #[test]
    fn sched_value_all_arms_roundtrip() {
        for value in [
            SchedValue::Int(-5),
            SchedValue::Uint(256),
            SchedValue::Llong(-(1 << 40)),
            SchedValue::Ullong(1 << 50),
            SchedValue::Double(0.25),
            SchedValue::Boolean(true),
        ] {
            roundtrip(&SchedParam {
                field: "weight".into(),
                value,
            });
        }
    }

    #[test]
    fn sched_value_unknown_discriminant_rejected() {
        let mut buf = [0u8; 16];
        let mut w = WireWriter::new(&mut buf);
        w.i32(7).unwrap();
        w.u32(0).unwrap();
        let mut r = WireReader::new(&buf[..8]);
        assert!(matches!(
            SchedValue::decode(&mut r),
            Err(WireError::BadDiscriminant {
                what: "scheduler parameter type",
                value: 7
            })
        ));
    }

    #[test]
    fn sched_field_length_enforced() {
        let long = "x".repeat(SCHED_FIELD_LENGTH as usize + 1);
        let param = SchedParam {
            field: long,
            value: SchedValue::Uint(1),
        };
        let mut buf = [0u8; 512];
        let mut w = WireWriter::new(&mut buf);
        assert!(matches!(
            param.encode(&mut w),
            Err(WireError::FieldTooLong { .. })
        ));
    }

    #[test]
    fn sched_params_vector_bound_enforced_before_elements() {
        // Claim 17 parameters; the decoder must fail on the count alone.
        let mut buf = [0u8; 8];
        let mut w = WireWriter::new(&mut buf);
        w.u32(DOMAIN_SCHEDULER_PARAMETERS_MAX + 1).unwrap();
        let mut r = WireReader::new(&buf[..4]);
        assert!(matches!(
            SchedParamsRet::decode(&mut r),
            Err(WireError::FieldTooLong { .. })
        ));
    }

    #[test]
    fn sasl_payload_nil_and_empty_are_distinct() {
        let nil = SaslPayload::none();
        let empty = SaslPayload::data(Vec::new());
        roundtrip(&nil);
        roundtrip(&empty);

        let mut a = [0u8; 16];
        let mut w = WireWriter::new(&mut a);
        nil.encode(&mut w).unwrap();
        let na = w.position();
        let mut b = [0u8; 16];
        let mut w = WireWriter::new(&mut b);
        empty.encode(&mut w).unwrap();
        let nb = w.position();
        assert_ne!(&a[..na], &b[..nb]);
    }

    #[test]
    fn sasl_data_bound_enforced() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0u32.to_be_bytes()); // nil = 0
        buf.extend_from_slice(&(AUTH_SASL_DATA_MAX + 1).to_be_bytes());
        let mut r = WireReader::new(&buf);
        assert!(matches!(
            SaslPayload::decode(&mut r),
            Err(WireError::FieldTooLong { .. })
        ));
    }

    #[test]
    fn migrate_bodies_roundtrip() {
        roundtrip(&MigratePrepareArgs {
            uri_in: None,
            flags: 1,
            dname: Some("renamed".into()),
            resource: 100,
        });
        roundtrip(&MigratePrepareRet {
            cookie: vec![1, 2, 3],
            uri_out: Some("tcp://dest/".into()),
        });
        roundtrip(&MigratePerformArgs {
            dom: dom(),
            cookie: vec![9; 16],
            uri: "tcp://dest/".into(),
            flags: 0,
            dname: None,
            resource: 0,
        });
        roundtrip(&MigrateFinishArgs {
            dname: "guest".into(),
            cookie: vec![],
            uri: "tcp://dest/".into(),
            flags: 0,
        });
    }

    #[test]
    fn vcpu_bodies_roundtrip() {
        roundtrip(&DomainGetVcpusArgs {
            dom: dom(),
            maxinfo: 4,
            maplen: 2,
        });
        roundtrip(&DomainGetVcpusRet {
            info: vec![VcpuInfo {
                number: 0,
                state: 1,
                cpu_time: 12345,
                cpu: 2,
            }],
            cpumaps: vec![0xFF, 0x01],
        });
    }

    #[test]
    fn node_info_model_fits_fixed_slot() {
        roundtrip(&NodeGetInfoRet {
            model: "x86_64".into(),
            memory: 16 << 20,
            cpus: 8,
            mhz: 2400,
            nodes: 1,
            sockets: 1,
            cores: 4,
            threads: 2,
        });
    }

    #[test]
    fn stats_bodies_roundtrip() {
        roundtrip(&BlockStatsRet {
            rd_req: 1,
            rd_bytes: 2,
            wr_req: 3,
            wr_bytes: 4,
            errs: -1,
        });
        roundtrip(&InterfaceStatsRet {
            rx_bytes: 10,
            tx_drop: -1,
            ..Default::default()
        });
    }

    #[test]
    fn auth_bodies_roundtrip() {
        roundtrip(&AuthListRet {
            types: vec![AuthType::Sasl],
        });
        roundtrip(&SaslInitRet {
            mechlist: "ANONYMOUS,PLAIN".into(),
        });
        roundtrip(&SaslStartArgs {
            mech: "PLAIN".into(),
            payload: SaslPayload::data(b"\0admin\0secret".to_vec()),
        });
        roundtrip(&SaslNegotiateRet {
            complete: true,
            payload: SaslPayload::none(),
        });
    }
}
