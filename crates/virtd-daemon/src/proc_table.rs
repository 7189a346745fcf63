//! The static procedure table.
//!
//! One entry per procedure, in discriminant order. Each entry is a stub
//! that decodes its arguments, runs the operation and encodes its return;
//! the dispatcher indexes the table after validating the envelope, so a
//! procedure number always resolves to exactly one handler.

use virtd_common::protocol::Procedure;

use crate::dispatch::ProcFn;
use crate::handlers::{auth, conn, domain, network};

/// Handler for a (validated) procedure.
pub fn lookup(procedure: Procedure) -> ProcFn {
    TABLE[(procedure as i32 - Procedure::FIRST) as usize]
}

static TABLE: [ProcFn; 69] = [
    // Connection and host
    conn::open,
    conn::close,
    conn::get_type,
    conn::get_version,
    conn::get_hostname,
    conn::get_capabilities,
    conn::get_max_vcpus,
    conn::node_get_info,
    conn::supports_feature,
    // Domains
    domain::list_domains,
    domain::num_of_domains,
    domain::list_defined_domains,
    domain::num_of_defined_domains,
    domain::lookup_by_id,
    domain::lookup_by_name,
    domain::lookup_by_uuid,
    domain::create_linux,
    domain::define_xml,
    domain::undefine,
    domain::create,
    domain::destroy,
    domain::shutdown,
    domain::reboot,
    domain::suspend,
    domain::resume,
    domain::save,
    domain::restore,
    domain::core_dump,
    domain::get_info,
    domain::get_xml_desc,
    domain::get_os_type,
    domain::get_max_memory,
    domain::set_max_memory,
    domain::set_memory,
    domain::get_max_vcpus,
    domain::set_vcpus,
    domain::pin_vcpu,
    domain::get_vcpus,
    domain::get_autostart,
    domain::set_autostart,
    domain::attach_device,
    domain::detach_device,
    domain::block_stats,
    domain::interface_stats,
    domain::get_scheduler_type,
    domain::get_scheduler_parameters,
    domain::set_scheduler_parameters,
    domain::migrate_prepare,
    domain::migrate_perform,
    domain::migrate_finish,
    // Networks
    network::list_networks,
    network::num_of_networks,
    network::list_defined_networks,
    network::num_of_defined_networks,
    network::lookup_by_name,
    network::lookup_by_uuid,
    network::create_xml,
    network::define_xml,
    network::undefine,
    network::create,
    network::destroy,
    network::dump_xml,
    network::get_bridge_name,
    network::get_autostart,
    network::set_autostart,
    // Authentication
    auth::list,
    auth::sasl_init,
    auth::sasl_start,
    auth::sasl_step,
];

#[cfg(test)]
mod tests {
    use super::*;
    use virtd_common::protocol::PROCEDURES;

    #[test]
    fn every_procedure_has_a_table_entry() {
        assert_eq!(TABLE.len(), PROCEDURES.len());
        for procedure in PROCEDURES {
            // Indexing must not panic for any valid procedure.
            let _ = lookup(procedure);
        }
    }
}
