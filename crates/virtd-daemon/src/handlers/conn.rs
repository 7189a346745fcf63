//! Connection and host-level handlers.

use virtd_common::protocol::body::{
    GetCapabilitiesRet, GetHostnameRet, GetMaxVcpusArgs, GetMaxVcpusRet, GetTypeRet,
    GetVersionRet, OpenArgs, SupportsFeatureArgs, SupportsFeatureRet,
};
use virtd_common::protocol::{WireDecode, WireEncode, WireReader, WireWriter};

use crate::dispatch::{HandlerCtx, HandlerError};
use crate::hypervisor::OpenFlags;

use super::require_conn;

pub(crate) fn open(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    _w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = OpenArgs::decode(r)?;
    if ctx.state.conn.is_some() {
        return Err(HandlerError::rpc("connection already open"));
    }

    // A connection arriving on a read-only socket is forced read-only no
    // matter what the client asked for.
    let mut flags = OpenFlags(args.flags);
    if ctx.state.readonly {
        flags = flags.with(OpenFlags::READ_ONLY);
    }

    let conn = ctx.env.hypervisor.open(args.name.as_deref(), flags)?;
    ctx.state.conn = Some(conn);
    Ok(())
}

pub(crate) fn close(
    ctx: &mut HandlerCtx<'_>,
    _r: &mut WireReader<'_>,
    _w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let conn = require_conn(ctx.state)?;
    conn.close()?;
    // The slot is cleared only once the driver has agreed to close.
    ctx.state.conn = None;
    Ok(())
}

pub(crate) fn get_type(
    ctx: &mut HandlerCtx<'_>,
    _r: &mut WireReader<'_>,
    w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let conn = require_conn(ctx.state)?;
    let kind = conn.kind()?;
    GetTypeRet { kind }.encode(w)?;
    Ok(())
}

pub(crate) fn get_version(
    ctx: &mut HandlerCtx<'_>,
    _r: &mut WireReader<'_>,
    w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let conn = require_conn(ctx.state)?;
    let hv_version = conn.version()?;
    GetVersionRet { hv_version }.encode(w)?;
    Ok(())
}

pub(crate) fn get_hostname(
    ctx: &mut HandlerCtx<'_>,
    _r: &mut WireReader<'_>,
    w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let conn = require_conn(ctx.state)?;
    let hostname = conn.hostname()?;
    GetHostnameRet { hostname }.encode(w)?;
    Ok(())
}

pub(crate) fn get_capabilities(
    ctx: &mut HandlerCtx<'_>,
    _r: &mut WireReader<'_>,
    w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let conn = require_conn(ctx.state)?;
    let capabilities = conn.capabilities()?;
    GetCapabilitiesRet { capabilities }.encode(w)?;
    Ok(())
}

pub(crate) fn get_max_vcpus(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = GetMaxVcpusArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let max_vcpus = conn.max_vcpus(args.kind.as_deref())?;
    GetMaxVcpusRet { max_vcpus }.encode(w)?;
    Ok(())
}

pub(crate) fn node_get_info(
    ctx: &mut HandlerCtx<'_>,
    _r: &mut WireReader<'_>,
    w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let conn = require_conn(ctx.state)?;
    let info = conn.node_info()?;
    info.encode(w)?;
    Ok(())
}

pub(crate) fn supports_feature(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = SupportsFeatureArgs::decode(r)?;
    let conn = require_conn(ctx.state)?;
    let supported = conn.supports_feature(args.feature)?;
    SupportsFeatureRet { supported }.encode(w)?;
    Ok(())
}
