//! Wire protocol definitions for virtd remote calls.
//!
//! Every message on the wire is `[u32 length | envelope | body]`, where the
//! length covers itself, the 24-byte envelope, and the body. The modules
//! here define the vocabulary ([`wire`]), the envelope ([`envelope`]) and
//! the typed bodies for every procedure ([`body`]).

pub mod body;
pub mod envelope;
pub mod wire;

pub use envelope::{Direction, Envelope, Status};
pub use wire::{WireDecode, WireEncode, WireReader, WireWriter, STRING_MAX};

use crate::error::WireError;

/// Program number expected in every envelope.
pub const PROGRAM: u32 = 0x7669_7274;

/// Protocol version expected in every envelope.
pub const PROTOCOL_VERSION: u32 = 1;

/// Size of the session message buffer; no frame may exceed this.
pub const MESSAGE_MAX: usize = 262_144;

// === Per-field protocol maxima ===
//
// Each bound is checked before any allocation sized by the value.

/// Upper bound a client may pass as `maxids` to `LIST_DOMAINS`.
pub const DOMAIN_ID_LIST_MAX: u32 = 16_384;

/// Upper bound a client may pass as `maxnames` for domain name lists.
pub const DOMAIN_NAME_LIST_MAX: u32 = 1_024;

/// Upper bound a client may pass as `maxnames` for network name lists.
pub const NETWORK_NAME_LIST_MAX: u32 = 256;

/// Upper bound on a single vCPU pinning map.
pub const CPUMAP_MAX: u32 = 256;

/// Upper bound a client may pass as `maxinfo` to `DOMAIN_GET_VCPUS`.
pub const VCPUINFO_MAX: u32 = 2_048;

/// Upper bound on `maxinfo * maplen` in `DOMAIN_GET_VCPUS`.
pub const CPUMAPS_MAX: u32 = 16_384;

/// Upper bound on the scheduler parameter count in either direction.
pub const DOMAIN_SCHEDULER_PARAMETERS_MAX: u32 = 16;

/// Upper bound on a scheduler parameter field name.
pub const SCHED_FIELD_LENGTH: u32 = 80;

/// Upper bound on a SASL payload in either direction.
pub const AUTH_SASL_DATA_MAX: u32 = 65_536;

/// Upper bound on a migration cookie.
pub const MIGRATE_COOKIE_MAX: u32 = 16_384;

/// Fixed size of an object UUID on the wire.
pub const UUID_BUFLEN: usize = 16;

/// Fixed size of the node model string in `NODE_GET_INFO`.
pub const NODE_MODEL_LEN: usize = 32;

/// Procedure numbers.
///
/// Explicit discriminants are part of the wire contract; numbers are never
/// reused. Grouped as: connection/host ops, domain ops, network ops, auth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Procedure {
    // === Connection and host (1 - 9) ===
    Open = 1,
    Close = 2,
    GetType = 3,
    GetVersion = 4,
    GetHostname = 5,
    GetCapabilities = 6,
    GetMaxVcpus = 7,
    NodeGetInfo = 8,
    SupportsFeature = 9,

    // === Domains (10 - 50) ===
    ListDomains = 10,
    NumOfDomains = 11,
    ListDefinedDomains = 12,
    NumOfDefinedDomains = 13,
    DomainLookupById = 14,
    DomainLookupByName = 15,
    DomainLookupByUuid = 16,
    DomainCreateLinux = 17,
    DomainDefineXml = 18,
    DomainUndefine = 19,
    DomainCreate = 20,
    DomainDestroy = 21,
    DomainShutdown = 22,
    DomainReboot = 23,
    DomainSuspend = 24,
    DomainResume = 25,
    DomainSave = 26,
    DomainRestore = 27,
    DomainCoreDump = 28,
    DomainGetInfo = 29,
    DomainGetXmlDesc = 30,
    DomainGetOsType = 31,
    DomainGetMaxMemory = 32,
    DomainSetMaxMemory = 33,
    DomainSetMemory = 34,
    DomainGetMaxVcpus = 35,
    DomainSetVcpus = 36,
    DomainPinVcpu = 37,
    DomainGetVcpus = 38,
    DomainGetAutostart = 39,
    DomainSetAutostart = 40,
    DomainAttachDevice = 41,
    DomainDetachDevice = 42,
    DomainBlockStats = 43,
    DomainInterfaceStats = 44,
    DomainGetSchedulerType = 45,
    DomainGetSchedulerParameters = 46,
    DomainSetSchedulerParameters = 47,
    DomainMigratePrepare = 48,
    DomainMigratePerform = 49,
    DomainMigrateFinish = 50,

    // === Networks (51 - 65) ===
    ListNetworks = 51,
    NumOfNetworks = 52,
    ListDefinedNetworks = 53,
    NumOfDefinedNetworks = 54,
    NetworkLookupByName = 55,
    NetworkLookupByUuid = 56,
    NetworkCreateXml = 57,
    NetworkDefineXml = 58,
    NetworkUndefine = 59,
    NetworkCreate = 60,
    NetworkDestroy = 61,
    NetworkDumpXml = 62,
    NetworkGetBridgeName = 63,
    NetworkGetAutostart = 64,
    NetworkSetAutostart = 65,

    // === Authentication (66 - 69) ===
    AuthList = 66,
    AuthSaslInit = 67,
    AuthSaslStart = 68,
    AuthSaslStep = 69,
}

impl Procedure {
    pub const FIRST: i32 = Procedure::Open as i32;
    pub const LAST: i32 = Procedure::AuthSaslStep as i32;

    /// Procedures an unauthenticated session may still call.
    pub fn auth_exempt(proc_nr: i32) -> bool {
        proc_nr == Procedure::AuthList as i32
            || proc_nr == Procedure::AuthSaslInit as i32
            || proc_nr == Procedure::AuthSaslStart as i32
            || proc_nr == Procedure::AuthSaslStep as i32
    }

    /// Short name for logging.
    pub fn name(self) -> &'static str {
        match self {
            Procedure::Open => "open",
            Procedure::Close => "close",
            Procedure::GetType => "get_type",
            Procedure::GetVersion => "get_version",
            Procedure::GetHostname => "get_hostname",
            Procedure::GetCapabilities => "get_capabilities",
            Procedure::GetMaxVcpus => "get_max_vcpus",
            Procedure::NodeGetInfo => "node_get_info",
            Procedure::SupportsFeature => "supports_feature",
            Procedure::ListDomains => "list_domains",
            Procedure::NumOfDomains => "num_of_domains",
            Procedure::ListDefinedDomains => "list_defined_domains",
            Procedure::NumOfDefinedDomains => "num_of_defined_domains",
            Procedure::DomainLookupById => "domain_lookup_by_id",
            Procedure::DomainLookupByName => "domain_lookup_by_name",
            Procedure::DomainLookupByUuid => "domain_lookup_by_uuid",
            Procedure::DomainCreateLinux => "domain_create_linux",
            Procedure::DomainDefineXml => "domain_define_xml",
            Procedure::DomainUndefine => "domain_undefine",
            Procedure::DomainCreate => "domain_create",
            Procedure::DomainDestroy => "domain_destroy",
            Procedure::DomainShutdown => "domain_shutdown",
            Procedure::DomainReboot => "domain_reboot",
            Procedure::DomainSuspend => "domain_suspend",
            Procedure::DomainResume => "domain_resume",
            Procedure::DomainSave => "domain_save",
            Procedure::DomainRestore => "domain_restore",
            Procedure::DomainCoreDump => "domain_core_dump",
            Procedure::DomainGetInfo => "domain_get_info",
            Procedure::DomainGetXmlDesc => "domain_get_xml_desc",
            Procedure::DomainGetOsType => "domain_get_os_type",
            Procedure::DomainGetMaxMemory => "domain_get_max_memory",
            Procedure::DomainSetMaxMemory => "domain_set_max_memory",
            Procedure::DomainSetMemory => "domain_set_memory",
            Procedure::DomainGetMaxVcpus => "domain_get_max_vcpus",
            Procedure::DomainSetVcpus => "domain_set_vcpus",
            Procedure::DomainPinVcpu => "domain_pin_vcpu",
            Procedure::DomainGetVcpus => "domain_get_vcpus",
            Procedure::DomainGetAutostart => "domain_get_autostart",
            Procedure::DomainSetAutostart => "domain_set_autostart",
            Procedure::DomainAttachDevice => "domain_attach_device",
            Procedure::DomainDetachDevice => "domain_detach_device",
            Procedure::DomainBlockStats => "domain_block_stats",
            Procedure::DomainInterfaceStats => "domain_interface_stats",
            Procedure::DomainGetSchedulerType => "domain_get_scheduler_type",
            Procedure::DomainGetSchedulerParameters => "domain_get_scheduler_parameters",
            Procedure::DomainSetSchedulerParameters => "domain_set_scheduler_parameters",
            Procedure::DomainMigratePrepare => "domain_migrate_prepare",
            Procedure::DomainMigratePerform => "domain_migrate_perform",
            Procedure::DomainMigrateFinish => "domain_migrate_finish",
            Procedure::ListNetworks => "list_networks",
            Procedure::NumOfNetworks => "num_of_networks",
            Procedure::ListDefinedNetworks => "list_defined_networks",
            Procedure::NumOfDefinedNetworks => "num_of_defined_networks",
            Procedure::NetworkLookupByName => "network_lookup_by_name",
            Procedure::NetworkLookupByUuid => "network_lookup_by_uuid",
            Procedure::NetworkCreateXml => "network_create_xml",
            Procedure::NetworkDefineXml => "network_define_xml",
            Procedure::NetworkUndefine => "network_undefine",
            Procedure::NetworkCreate => "network_create",
            Procedure::NetworkDestroy => "network_destroy",
            Procedure::NetworkDumpXml => "network_dump_xml",
            Procedure::NetworkGetBridgeName => "network_get_bridge_name",
            Procedure::NetworkGetAutostart => "network_get_autostart",
            Procedure::NetworkSetAutostart => "network_set_autostart",
            Procedure::AuthList => "auth_list",
            Procedure::AuthSaslInit => "auth_sasl_init",
            Procedure::AuthSaslStart => "auth_sasl_start",
            Procedure::AuthSaslStep => "auth_sasl_step",
        }
    }
}

impl TryFrom<i32> for Procedure {
    type Error = WireError;

    fn try_from(value: i32) -> Result<Self, WireError> {
        if (Procedure::FIRST..=Procedure::LAST).contains(&value) {
            // Discriminants are contiguous; the range check makes the
            // transmute-free match below total.
            Ok(PROCEDURES[(value - Procedure::FIRST) as usize])
        } else {
            Err(WireError::BadDiscriminant {
                what: "procedure",
                value,
            })
        }
    }
}

/// All procedures in discriminant order; index = number - FIRST.
pub const PROCEDURES: [Procedure; 69] = [
    Procedure::Open,
    Procedure::Close,
    Procedure::GetType,
    Procedure::GetVersion,
    Procedure::GetHostname,
    Procedure::GetCapabilities,
    Procedure::GetMaxVcpus,
    Procedure::NodeGetInfo,
    Procedure::SupportsFeature,
    Procedure::ListDomains,
    Procedure::NumOfDomains,
    Procedure::ListDefinedDomains,
    Procedure::NumOfDefinedDomains,
    Procedure::DomainLookupById,
    Procedure::DomainLookupByName,
    Procedure::DomainLookupByUuid,
    Procedure::DomainCreateLinux,
    Procedure::DomainDefineXml,
    Procedure::DomainUndefine,
    Procedure::DomainCreate,
    Procedure::DomainDestroy,
    Procedure::DomainShutdown,
    Procedure::DomainReboot,
    Procedure::DomainSuspend,
    Procedure::DomainResume,
    Procedure::DomainSave,
    Procedure::DomainRestore,
    Procedure::DomainCoreDump,
    Procedure::DomainGetInfo,
    Procedure::DomainGetXmlDesc,
    Procedure::DomainGetOsType,
    Procedure::DomainGetMaxMemory,
    Procedure::DomainSetMaxMemory,
    Procedure::DomainSetMemory,
    Procedure::DomainGetMaxVcpus,
    Procedure::DomainSetVcpus,
    Procedure::DomainPinVcpu,
    Procedure::DomainGetVcpus,
    Procedure::DomainGetAutostart,
    Procedure::DomainSetAutostart,
    Procedure::DomainAttachDevice,
    Procedure::DomainDetachDevice,
    Procedure::DomainBlockStats,
    Procedure::DomainInterfaceStats,
    Procedure::DomainGetSchedulerType,
    Procedure::DomainGetSchedulerParameters,
    Procedure::DomainSetSchedulerParameters,
    Procedure::DomainMigratePrepare,
    Procedure::DomainMigratePerform,
    Procedure::DomainMigrateFinish,
    Procedure::ListNetworks,
    Procedure::NumOfNetworks,
    Procedure::ListDefinedNetworks,
    Procedure::NumOfDefinedNetworks,
    Procedure::NetworkLookupByName,
    Procedure::NetworkLookupByUuid,
    Procedure::NetworkCreateXml,
    Procedure::NetworkDefineXml,
    Procedure::NetworkUndefine,
    Procedure::NetworkCreate,
    Procedure::NetworkDestroy,
    Procedure::NetworkDumpXml,
    Procedure::NetworkGetBridgeName,
    Procedure::NetworkGetAutostart,
    Procedure::NetworkSetAutostart,
    Procedure::AuthList,
    Procedure::AuthSaslInit,
    Procedure::AuthSaslStart,
    Procedure::AuthSaslStep,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn procedure_numbers_roundtrip() {
        for (i, proc) in PROCEDURES.iter().enumerate() {
            let nr = *proc as i32;
            assert_eq!(nr, Procedure::FIRST + i as i32, "{:?} out of order", proc);
            assert_eq!(Procedure::try_from(nr).unwrap(), *proc);
        }
    }

    #[test]
    fn unknown_procedure_rejected() {
        assert!(Procedure::try_from(0).is_err());
        assert!(Procedure::try_from(Procedure::LAST + 1).is_err());
        assert!(Procedure::try_from(-3).is_err());
    }

    #[test]
    fn auth_exempt_set_is_exactly_the_auth_procedures() {
        let exempt: Vec<_> = (Procedure::FIRST..=Procedure::LAST)
            .filter(|nr| Procedure::auth_exempt(*nr))
            .collect();
        assert_eq!(
            exempt,
            vec![
                Procedure::AuthList as i32,
                Procedure::AuthSaslInit as i32,
                Procedure::AuthSaslStart as i32,
                Procedure::AuthSaslStep as i32,
            ]
        );
    }
}
