//! Virtual network handlers.

use virtd_common::protocol::body::{
    AutostartRet, BridgeNameRet, NameListArgs, NameListRet, NetworkArgs, NetworkDumpXmlArgs,
    NetworkLookupByNameArgs, NetworkLookupByUuidArgs, NetworkRet, NetworkSetAutostartArgs,
    NetworkXmlArgs, NumRet, XmlRet,
};
use virtd_common::protocol::{
    WireDecode, WireEncode, WireReader, WireWriter, NETWORK_NAME_LIST_MAX,
};

use crate::dispatch::{HandlerCtx, HandlerError};
use crate::hypervisor::NetworkGuard;

use super::{lookup_network, make_network_ref, require_conn};

pub(crate) fn list_networks(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = NameListArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    if args.maxnames < 0 || args.maxnames as u32 > NETWORK_NAME_LIST_MAX {
        return Err(HandlerError::rpc("maxnames > NETWORK_NAME_LIST_MAX"));
    }
    let names = conn.list_networks(args.maxnames as usize)?;
    NameListRet { names }.encode(w)?;
    Ok(())
}

pub(crate) fn num_of_networks(
    ctx: &mut HandlerCtx<'_>,
    _r: &mut WireReader<'_>,
    w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let conn = require_conn(ctx.state)?;
    let num = conn.num_of_networks()?;
    NumRet { num }.encode(w)?;
    Ok(())
}

pub(crate) fn list_defined_networks(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = NameListArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    if args.maxnames < 0 || args.maxnames as u32 > NETWORK_NAME_LIST_MAX {
        return Err(HandlerError::rpc("maxnames > NETWORK_NAME_LIST_MAX"));
    }
    let names = conn.list_defined_networks(args.maxnames as usize)?;
    NameListRet { names }.encode(w)?;
    Ok(())
}

pub(crate) fn num_of_defined_networks(
    ctx: &mut HandlerCtx<'_>,
    _r: &mut WireReader<'_>,
    w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let conn = require_conn(ctx.state)?;
    let num = conn.num_of_defined_networks()?;
    NumRet { num }.encode(w)?;
    Ok(())
}

pub(crate) fn lookup_by_name(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = NetworkLookupByNameArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let handle = conn.network_lookup_by_name(&args.name)?;
    let guard = NetworkGuard::new(conn, handle);
    NetworkRet {
        net: make_network_ref(&guard),
    }
    .encode(w)?;
    Ok(())
}

pub(crate) fn lookup_by_uuid(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = NetworkLookupByUuidArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let handle = conn.network_lookup_by_uuid(&args.uuid)?;
    let guard = NetworkGuard::new(conn, handle);
    NetworkRet {
        net: make_network_ref(&guard),
    }
    .encode(w)?;
    Ok(())
}

pub(crate) fn create_xml(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = NetworkXmlArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let handle = conn.network_create_xml(&args.xml)?;
    let guard = NetworkGuard::new(conn, handle);
    NetworkRet {
        net: make_network_ref(&guard),
    }
    .encode(w)?;
    Ok(())
}

pub(crate) fn define_xml(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = NetworkXmlArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let handle = conn.network_define_xml(&args.xml)?;
    let guard = NetworkGuard::new(conn, handle);
    NetworkRet {
        net: make_network_ref(&guard),
    }
    .encode(w)?;
    Ok(())
}

pub(crate) fn undefine(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    _w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = NetworkArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let net = lookup_network(conn, &args.net)?;
    conn.network_undefine(&net)?;
    Ok(())
}

pub(crate) fn create(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    _w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = NetworkArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let net = lookup_network(conn, &args.net)?;
    conn.network_create(&net)?;
    Ok(())
}

pub(crate) fn destroy(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    _w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = NetworkArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let net = lookup_network(conn, &args.net)?;
    conn.network_destroy(&net)?;
    Ok(())
}

pub(crate) fn dump_xml(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = NetworkDumpXmlArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let net = lookup_network(conn, &args.net)?;
    let xml = conn.network_xml_desc(&net, args.flags)?;
    XmlRet { xml }.encode(w)?;
    Ok(())
}

pub(crate) fn get_bridge_name(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = NetworkArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let net = lookup_network(conn, &args.net)?;
    let name = conn.network_bridge_name(&net)?;
    BridgeNameRet { name }.encode(w)?;
    Ok(())
}

pub(crate) fn get_autostart(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = NetworkArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let net = lookup_network(conn, &args.net)?;
    let autostart = conn.network_autostart(&net)?;
    AutostartRet { autostart }.encode(w)?;
    Ok(())
}

pub(crate) fn set_autostart(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    _w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = NetworkSetAutostartArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let net = lookup_network(conn, &args.net)?;
    conn.network_set_autostart(&net, args.autostart)?;
    Ok(())
}
