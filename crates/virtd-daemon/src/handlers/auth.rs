//! Authentication handlers: the SASL state machine.
//!
//! A session starts in `SaslPending` when the server is configured for
//! SASL. `AUTH_SASL_INIT` creates the negotiation context, `START` and
//! `STEP` feed it client payloads, and success flips the session's auth
//! state to `None`, opening the gate for every other procedure. Any
//! failure destroys the context and answers with the fixed
//! "authentication failed" error.

use tracing::{debug, info, warn};

use virtd_common::protocol::body::{
    AuthListRet, SaslInitRet, SaslNegotiateRet, SaslPayload, SaslStartArgs, SaslStepArgs,
};
use virtd_common::protocol::{WireDecode, WireEncode, WireReader, WireWriter, AUTH_SASL_DATA_MAX};
use virtd_common::types::AuthType;

use crate::dispatch::{HandlerCtx, HandlerError};
use crate::sasl::SaslStep;
use crate::session::AuthState;

/// Name the SASL service registers under.
const SASL_SERVICE: &str = "virtd";

pub(crate) fn list(
    ctx: &mut HandlerCtx<'_>,
    _r: &mut WireReader<'_>,
    w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    // Reports the scheme still standing between the client and the other
    // procedures; after authorization that is None.
    let advertised = match ctx.state.auth {
        AuthState::SaslPending => AuthType::Sasl,
        AuthState::None => AuthType::None,
    };
    AuthListRet {
        types: vec![advertised],
    }
    .encode(w)?;
    Ok(())
}

pub(crate) fn sasl_init(
    ctx: &mut HandlerCtx<'_>,
    _r: &mut WireReader<'_>,
    w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    if !ctx.state.requires_auth() || ctx.state.sasl.is_some() {
        warn!(peer = %ctx.state.remote_addr, "client sent an invalid SASL init request");
        return Err(HandlerError::auth_failed());
    }

    let local = ctx.state.local_sasl_addr();
    let remote = ctx.state.remote_sasl_addr();
    let session = ctx
        .env
        .sasl
        .new_session(SASL_SERVICE, &local, &remote)
        .map_err(|e| {
            warn!(error = %e, "SASL context setup failed");
            HandlerError::auth_failed()
        })?;
    let mechlist = session.mechanisms().map_err(|e| {
        warn!(error = %e, "cannot list SASL mechanisms");
        HandlerError::auth_failed()
    })?;

    debug!(mechlist = %mechlist, peer = %ctx.state.remote_addr, "offering SASL mechanisms");
    ctx.state.sasl = Some(session);
    SaslInitRet { mechlist }.encode(w)?;
    Ok(())
}

pub(crate) fn sasl_start(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = SaslStartArgs::decode(r)?;
    debug!(
        mech = %args.mech,
        nil = args.payload.0.is_none(),
        "SASL start"
    );
    negotiate(ctx, w, Some(&args.mech), &args.payload)
}

pub(crate) fn sasl_step(
    ctx: &mut HandlerCtx<'_>,
    r: &mut WireReader<'_>,
    w: &mut WireWriter<'_>,
) -> Result<(), HandlerError> {
    let args = SaslStepArgs::decode(r)?;
    debug!(nil = args.payload.0.is_none(), "SASL step");
    negotiate(ctx, w, None, &args.payload)
}

/// Shared transition for START (with a mechanism) and STEP (without).
fn negotiate(
    ctx: &mut HandlerCtx<'_>,
    w: &mut WireWriter<'_>,
    mech: Option<&str>,
    payload: &SaslPayload,
) -> Result<(), HandlerError> {
    let Some(sasl) = ctx.state.sasl.as_mut() else {
        warn!(peer = %ctx.state.remote_addr, "SASL round without a context");
        return Err(HandlerError::auth_failed());
    };

    // The nil/empty distinction is forwarded untouched.
    let client_in = payload.as_deref();
    let outcome = match mech {
        Some(mech) => sasl.start(mech, client_in),
        None => sasl.step(client_in),
    };

    let step = match outcome {
        Ok(step) => step,
        Err(e) => {
            warn!(error = %e, peer = %ctx.state.remote_addr, "SASL negotiation failed");
            ctx.state.sasl = None;
            return Err(HandlerError::auth_failed());
        }
    };

    let (complete, server_out) = match step {
        SaslStep::Continue(data) => (false, data),
        SaslStep::Done(data) => (true, data),
    };

    if let Some(data) = &server_out {
        if data.len() as u32 > AUTH_SASL_DATA_MAX {
            warn!(len = data.len(), "SASL reply data too long");
            ctx.state.sasl = None;
            return Err(HandlerError::auth_failed());
        }
    }

    if complete {
        info!(peer = %ctx.state.remote_addr, "client authenticated");
        ctx.state.auth = AuthState::None;
        ctx.state.sasl = None;
    }

    SaslNegotiateRet {
        complete,
        payload: SaslPayload(server_out),
    }
    .encode(w)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::dispatch::ServerEnv;
    use crate::hypervisor::mem::MemHypervisor;
    use crate::sasl::{SaslBackend, SaslError, SaslSession};
    use crate::session::Session;
    use virtd_common::protocol::MESSAGE_MAX;

    // A backend whose Done payload is larger than the protocol allows.
    struct OversizeBackend;

    impl SaslBackend for OversizeBackend {
        fn new_session(
            &self,
            _service: &str,
            _local: &str,
            _remote: &str,
        ) -> Result<Box<dyn SaslSession>, SaslError> {
            Ok(Box::new(OversizeSession))
        }
    }

    struct OversizeSession;

    impl SaslSession for OversizeSession {
        fn mechanisms(&self) -> Result<String, SaslError> {
            Ok("BULKY".into())
        }

        fn start(
            &mut self,
            _mechanism: &str,
            _client_in: Option<&[u8]>,
        ) -> Result<SaslStep, SaslError> {
            Ok(SaslStep::Done(Some(vec![
                0u8;
                AUTH_SASL_DATA_MAX as usize + 1
            ])))
        }

        fn step(&mut self, _client_in: Option<&[u8]>) -> Result<SaslStep, SaslError> {
            Ok(SaslStep::Continue(None))
        }
    }

    fn sasl_session() -> Session {
        Session::new(
            false,
            true,
            "127.0.0.1:16509".parse().unwrap(),
            "127.0.0.1:40000".parse().unwrap(),
        )
    }

    #[test]
    fn oversize_server_payload_fails_auth_and_destroys_context() {
        let env = ServerEnv {
            hypervisor: Arc::new(MemHypervisor::new()),
            sasl: Arc::new(OversizeBackend),
            auth: AuthType::Sasl,
        };
        let mut session = sasl_session();
        let mut buf = vec![0u8; MESSAGE_MAX];

        // init succeeds
        {
            let mut ctx = HandlerCtx {
                state: &mut session.state,
                env: &env,
            };
            let mut r = WireReader::new(&[]);
            let mut w = WireWriter::new(&mut buf);
            sasl_init(&mut ctx, &mut r, &mut w).unwrap();
        }
        assert!(session.state.sasl.is_some());

        // start trips the payload limit
        {
            let mut ctx = HandlerCtx {
                state: &mut session.state,
                env: &env,
            };
            let mut w = WireWriter::new(&mut buf);
            let err = negotiate(&mut ctx, &mut w, Some("BULKY"), &SaslPayload::none());
            assert!(matches!(err, Err(HandlerError::Proto { .. })));
        }
        assert!(session.state.sasl.is_none());
        assert!(session.state.requires_auth());
    }
}
