//! Domain handlers.

use virtd_common::protocol::body::{
    AutostartRet, DomainArgs, DomainCoreDumpArgs, DomainCreateLinuxArgs, DomainDefineXmlArgs,
    DomainDeviceArgs, DomainGetMaxMemoryRet, DomainGetOsTypeRet, DomainGetVcpusArgs,
    DomainGetVcpusRet, DomainGetXmlDescArgs, DomainLookupByIdArgs, DomainLookupByNameArgs,
    DomainLookupByUuidArgs, DomainPinVcpuArgs, DomainRebootArgs, DomainRestoreArgs, DomainRet,
    DomainSaveArgs, DomainSetAutostartArgs, DomainSetMemoryArgs, DomainSetVcpusArgs,
    DomainStatsArgs, ListDomainsArgs, ListDomainsRet, MigrateFinishArgs, MigratePerformArgs,
    MigratePrepareArgs, MigratePrepareRet, NameListArgs, NameListRet, NumRet, SchedGetParamsArgs,
    SchedParamsRet, SchedSetParamsArgs, SchedTypeRet, XmlRet,
};
use virtd_common::protocol::{
    WireDecode, WireEncode, WireReader, WireWriter, CPUMAPS_MAX, DOMAIN_ID_LIST_MAX,
    DOMAIN_NAME_LIST_MAX, DOMAIN_SCHEDULER_PARAMETERS_MAX, VCPUINFO_MAX,
};

use crate::dispatch::{HandlerCtx, HandlerError};

use super::{lookup_domain, make_domain_ref, require_conn};

// === Enumeration ===

pub(crate) fn list_domains(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = ListDomainsArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    if args.maxids < 0 || args.maxids as u32 > DOMAIN_ID_LIST_MAX {
        return Err(HandlerError::rpc("maxids > DOMAIN_ID_LIST_MAX"));
    }
    let ids = conn.list_domain_ids(args.maxids as usize)?;
    ListDomainsRet { ids }.encode(w)?;
    Ok(())
}

pub(crate) fn num_of_domains(
    ctx: &mut HandlerCtx<'_>,
    _r: &mut WireReader<'_>,
    w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let conn = require_conn(ctx.state)?;
    let num = conn.num_of_domains()?;
    NumRet { num }.encode(w)?;
    Ok(())
}

pub(crate) fn list_defined_domains(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = NameListArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    if args.maxnames < 0 || args.maxnames as u32 > DOMAIN_NAME_LIST_MAX {
        return Err(HandlerError::rpc("maxnames > DOMAIN_NAME_LIST_MAX"));
    }
    let names = conn.list_defined_domains(args.maxnames as usize)?;
    NameListRet { names }.encode(w)?;
    Ok(())
}

pub(crate) fn num_of_defined_domains(
    ctx: &mut HandlerCtx<'_>,
    _r: &mut WireReader<'_>,
    w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let conn = require_conn(ctx.state)?;
    let num = conn.num_of_defined_domains()?;
    NumRet { num }.encode(w)?;
    Ok(())
}

// === Lookup ===

pub(crate) fn lookup_by_id(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = DomainLookupByIdArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let handle = conn.domain_lookup_by_id(args.id)?;
    let guard = crate::hypervisor::DomainGuard::new(conn, handle);
    DomainRet {
        dom: make_domain_ref(&guard),
    }
    .encode(w)?;
    Ok(())
}

pub(crate) fn lookup_by_name(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = DomainLookupByNameArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let handle = conn.domain_lookup_by_name(&args.name)?;
    let guard = crate::hypervisor::DomainGuard::new(conn, handle);
    DomainRet {
        dom: make_domain_ref(&guard),
    }
    .encode(w)?;
    Ok(())
}

pub(crate) fn lookup_by_uuid(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = DomainLookupByUuidArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let handle = conn.domain_lookup_by_uuid(&args.uuid)?;
    let guard = crate::hypervisor::DomainGuard::new(conn, handle);
    DomainRet {
        dom: make_domain_ref(&guard),
    }
    .encode(w)?;
    Ok(())
}

// === Lifecycle ===

pub(crate) fn create_linux(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = DomainCreateLinuxArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let handle = conn.domain_create_linux(&args.xml_desc, args.flags)?;
    let guard = crate::hypervisor::DomainGuard::new(conn, handle);
    DomainRet {
        dom: make_domain_ref(&guard),
    }
    .encode(w)?;
    Ok(())
}

pub(crate) fn define_xml(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = DomainDefineXmlArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let handle = conn.domain_define_xml(&args.xml)?;
    let guard = crate::hypervisor::DomainGuard::new(conn, handle);
    DomainRet {
        dom: make_domain_ref(&guard),
    }
    .encode(w)?;
    Ok(())
}

pub(crate) fn undefine(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    _w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = DomainArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let dom = lookup_domain(conn, &args.dom)?;
    conn.domain_undefine(&dom)?;
    Ok(())
}

pub(crate) fn create(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    _w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = DomainArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let dom = lookup_domain(conn, &args.dom)?;
    conn.domain_create(&dom)?;
    Ok(())
}

pub(crate) fn destroy(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    _w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = DomainArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let dom = lookup_domain(conn, &args.dom)?;
    conn.domain_destroy(&dom)?;
    // Destroy consumed the handle; the guard must not release it again.
    dom.dismiss();
    Ok(())
}

pub(crate) fn shutdown(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    _w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = DomainArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let dom = lookup_domain(conn, &args.dom)?;
    conn.domain_shutdown(&dom)?;
    Ok(())
}

pub(crate) fn reboot(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    _w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = DomainRebootArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let dom = lookup_domain(conn, &args.dom)?;
    conn.domain_reboot(&dom, args.flags)?;
    Ok(())
}

pub(crate) fn suspend(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    _w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = DomainArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let dom = lookup_domain(conn, &args.dom)?;
    conn.domain_suspend(&dom)?;
    Ok(())
}

pub(crate) fn resume(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    _w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = DomainArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let dom = lookup_domain(conn, &args.dom)?;
    conn.domain_resume(&dom)?;
    Ok(())
}

pub(crate) fn save(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    _w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = DomainSaveArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let dom = lookup_domain(conn, &args.dom)?;
    conn.domain_save(&dom, &args.to)?;
    Ok(())
}

pub(crate) fn restore(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    _w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = DomainRestoreArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    conn.domain_restore(&args.from)?;
    Ok(())
}

pub(crate) fn core_dump(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    _w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = DomainCoreDumpArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let dom = lookup_domain(conn, &args.dom)?;
    conn.domain_core_dump(&dom, &args.to, args.flags)?;
    Ok(())
}

// === Queries ===

pub(crate) fn get_info(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = DomainArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let dom = lookup_domain(conn, &args.dom)?;
    let info = conn.domain_info(&dom)?;
    info.encode(w)?;
    Ok(())
}

pub(crate) fn get_xml_desc(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = DomainGetXmlDescArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let dom = lookup_domain(conn, &args.dom)?;
    let xml = conn.domain_xml_desc(&dom, args.flags)?;
    XmlRet { xml }.encode(w)?;
    Ok(())
}

pub(crate) fn get_os_type(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = DomainArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let dom = lookup_domain(conn, &args.dom)?;
    let os_type = conn.domain_os_type(&dom)?;
    DomainGetOsTypeRet { os_type }.encode(w)?;
    Ok(())
}

pub(crate) fn get_max_memory(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = DomainArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let dom = lookup_domain(conn, &args.dom)?;
    let memory = conn.domain_max_memory(&dom)?;
    DomainGetMaxMemoryRet { memory }.encode(w)?;
    Ok(())
}

pub(crate) fn set_max_memory(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    _w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = DomainSetMemoryArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let dom = lookup_domain(conn, &args.dom)?;
    conn.domain_set_max_memory(&dom, args.memory)?;
    Ok(())
}

pub(crate) fn set_memory(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    _w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = DomainSetMemoryArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let dom = lookup_domain(conn, &args.dom)?;
    conn.domain_set_memory(&dom, args.memory)?;
    Ok(())
}

pub(crate) fn get_max_vcpus(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = DomainArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let dom = lookup_domain(conn, &args.dom)?;
    let num = conn.domain_max_vcpus(&dom)?;
    NumRet { num }.encode(w)?;
    Ok(())
}

pub(crate) fn set_vcpus(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    _w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = DomainSetVcpusArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let dom = lookup_domain(conn, &args.dom)?;
    conn.domain_set_vcpus(&dom, args.nvcpus)?;
    Ok(())
}

pub(crate) fn pin_vcpu(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    _w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = DomainPinVcpuArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let dom = lookup_domain(conn, &args.dom)?;
    conn.domain_pin_vcpu(&dom, args.vcpu, &args.cpumap)?;
    Ok(())
}

pub(crate) fn get_vcpus(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = DomainGetVcpusArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let dom = lookup_domain(conn, &args.dom)?;
    if args.maxinfo < 0 || args.maxinfo as u32 > VCPUINFO_MAX {
        return Err(HandlerError::rpc("maxinfo > VCPUINFO_MAX"));
    }
    if args.maplen < 0 || args.maxinfo as i64 * args.maplen as i64 > CPUMAPS_MAX as i64 {
        return Err(HandlerError::rpc("maxinfo * maplen > CPUMAPS_MAX"));
    }
    let (info, cpumaps) = conn.domain_vcpus(&dom, args.maxinfo as usize, args.maplen as usize)?;
    DomainGetVcpusRet { info, cpumaps }.encode(w)?;
    Ok(())
}

pub(crate) fn get_autostart(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = DomainArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let dom = lookup_domain(conn, &args.dom)?;
    let autostart = conn.domain_autostart(&dom)?;
    AutostartRet { autostart }.encode(w)?;
    Ok(())
}

pub(crate) fn set_autostart(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    _w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = DomainSetAutostartArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let dom = lookup_domain(conn, &args.dom)?;
    conn.domain_set_autostart(&dom, args.autostart)?;
    Ok(())
}

pub(crate) fn attach_device(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    _w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = DomainDeviceArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let dom = lookup_domain(conn, &args.dom)?;
    conn.domain_attach_device(&dom, &args.xml)?;
    Ok(())
}

pub(crate) fn detach_device(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    _w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = DomainDeviceArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let dom = lookup_domain(conn, &args.dom)?;
    conn.domain_detach_device(&dom, &args.xml)?;
    Ok(())
}

// === Statistics ===

pub(crate) fn block_stats(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = DomainStatsArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let dom = lookup_domain(conn, &args.dom)?;
    let stats = conn.domain_block_stats(&dom, &args.path)?;
    stats.encode(w)?;
    Ok(())
}

pub(crate) fn interface_stats(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = DomainStatsArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let dom = lookup_domain(conn, &args.dom)?;
    let stats = conn.domain_interface_stats(&dom, &args.path)?;
    stats.encode(w)?;
    Ok(())
}

// === Scheduler ===

pub(crate) fn get_scheduler_type(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = DomainArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let dom = lookup_domain(conn, &args.dom)?;
    let (kind, nparams) = conn.domain_scheduler_type(&dom)?;
    SchedTypeRet { kind, nparams }.encode(w)?;
    Ok(())
}

pub(crate) fn get_scheduler_parameters(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = SchedGetParamsArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    if args.nparams < 0 || args.nparams as u32 > DOMAIN_SCHEDULER_PARAMETERS_MAX {
        return Err(HandlerError::rpc(
            "nparams > DOMAIN_SCHEDULER_PARAMETERS_MAX",
        ));
    }
    let dom = lookup_domain(conn, &args.dom)?;
    let params = conn.domain_scheduler_parameters(&dom, args.nparams as usize)?;
    SchedParamsRet { params }.encode(w)?;
    Ok(())
}

pub(crate) fn set_scheduler_parameters(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    _w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    // The vector bound and field lengths are enforced by the decoder.
    let args = SchedSetParamsArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let dom = lookup_domain(conn, &args.dom)?;
    conn.domain_set_scheduler_parameters(&dom, &args.params)?;
    Ok(())
}

// === Migration ===

pub(crate) fn migrate_prepare(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = MigratePrepareArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let (cookie, uri_out) = conn.migrate_prepare(
        args.uri_in.as_deref(),
        args.flags,
        args.dname.as_deref(),
        args.resource,
    )?;
    MigratePrepareRet { cookie, uri_out }.encode(w)?;
    Ok(())
}

pub(crate) fn migrate_perform(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    _w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = MigratePerformArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let dom = lookup_domain(conn, &args.dom)?;
    conn.migrate_perform(
        &dom,
        &args.cookie,
        &args.uri,
        args.flags,
        args.dname.as_deref(),
        args.resource,
    )?;
    Ok(())
}

pub(crate) fn migrate_finish(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = MigrateFinishArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let handle = conn.migrate_finish(&args.dname, &args.cookie, &args.uri, args.flags)?;
    let guard = crate::hypervisor::DomainGuard::new(conn, handle);
    DomainRet {
        dom: make_domain_ref(&guard),
    }
    .encode(w)?;
    Ok(())
}
