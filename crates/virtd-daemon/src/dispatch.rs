//! The request dispatcher.
//!
//! [`dispatch`] drives exactly one framed request to completion: parse the
//! envelope, validate its constants, hold unauthenticated clients to the
//! auth procedures, resolve the handler, run it, and frame the reply into
//! the session buffer. It never unwinds into the transport; every failure
//! becomes an error reply unless even that cannot be framed, in which case
//! the session is torn down.

use std::sync::Arc;

use tracing::{debug, error, warn};

use virtd_common::protocol::{
    Direction, Envelope, Procedure, Status, WireDecode, WireEncode, WireReader, WireWriter,
    PROGRAM, PROTOCOL_VERSION,
};
use virtd_common::types::{AuthType, ErrorBody, ErrorCode, ErrorDomain};
use virtd_common::WireError;

use crate::hypervisor::{HvError, Hypervisor};
use crate::proc_table;
use crate::sasl::SaslBackend;
use crate::session::{Session, SessionState};

/// Shared server-wide collaborators handed to every handler.
pub struct ServerEnv {
    pub hypervisor: Arc<dyn Hypervisor>,
    pub sasl: Arc<dyn SaslBackend>,
    /// Scheme new sessions must complete before other procedures.
    pub auth: AuthType,
}

/// What the transport should do after a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchAction {
    /// A reply is framed in the session buffer; drain it.
    Reply,
    /// The reply could not be framed; drop the connection.
    Teardown,
}

/// Failure from a handler. The dispatcher owns the only reply-framing
/// path, so handlers describe errors instead of writing them.
#[derive(Debug)]
pub enum HandlerError {
    /// The hypervisor collaborator failed; its error is forwarded.
    Hv(HvError),
    /// A dispatch-level precondition failed.
    Proto {
        code: ErrorCode,
        domain: ErrorDomain,
        message: String,
    },
    /// Argument decoding or reply encoding failed.
    Wire(WireError),
}

impl HandlerError {
    pub fn rpc(message: impl Into<String>) -> Self {
        HandlerError::Proto {
            code: ErrorCode::Rpc,
            domain: ErrorDomain::Rpc,
            message: message.into(),
        }
    }

    pub fn auth_failed() -> Self {
        HandlerError::Proto {
            code: ErrorCode::AuthFailed,
            domain: ErrorDomain::Auth,
            message: "authentication failed".into(),
        }
    }

    fn into_body(self) -> ErrorBody {
        match self {
            HandlerError::Hv(e) => e.to_body(),
            HandlerError::Proto {
                code,
                domain,
                message,
            } => ErrorBody::with_code(code, domain, message),
            HandlerError::Wire(WireError::PayloadTooLarge) => {
                ErrorBody::rpc("reply payload too large for the message buffer")
            }
            HandlerError::Wire(e) => ErrorBody::rpc(format!("failed to parse arguments: {e}")),
        }
    }
}

impl From<HvError> for HandlerError {
    fn from(e: HvError) -> Self {
        HandlerError::Hv(e)
    }
}

impl From<WireError> for HandlerError {
    fn from(e: WireError) -> Self {
        HandlerError::Wire(e)
    }
}

/// Per-call view handed to a handler: the session state (connection slot,
/// auth state, readonly flag) plus the server collaborators.
pub struct HandlerCtx<'a> {
    pub state: &'a mut SessionState,
    pub env: &'a ServerEnv,
}

/// One table entry: decode the arguments, run, encode the return.
pub type ProcFn =
    fn(&mut HandlerCtx<'_>, &mut WireReader<'_>, &mut WireWriter<'_>) -> Result<(), HandlerError>;

/// Drives one complete request (envelope + body, length word already
/// stripped) and frames the reply into the session buffer.
pub fn dispatch(session: &mut Session, env: &ServerEnv, request: &[u8]) -> DispatchAction {
    let mut r = WireReader::new(request);

    // Failures before the envelope is parsed are replied blind, with a
    // synthesised header maximally-compatible clients can still decode.
    let req = match Envelope::decode(&mut r) {
        Ok(req) => req,
        Err(e) => {
            warn!(error = %e, "failed to parse message header");
            return error_reply(
                session,
                None,
                ErrorBody::rpc(format!("failed to parse message header: {e}")),
            );
        }
    };

    // Envelope constants, in fixed order.
    if req.program != PROGRAM {
        return error_reply(
            session,
            Some(&req),
            ErrorBody::rpc(format!(
                "program mismatch (actual {:#x}, expected {:#x})",
                req.program, PROGRAM
            )),
        );
    }
    if req.version != PROTOCOL_VERSION {
        return error_reply(
            session,
            Some(&req),
            ErrorBody::rpc(format!(
                "version mismatch (actual {}, expected {})",
                req.version, PROTOCOL_VERSION
            )),
        );
    }
    if req.direction != Direction::Call as i32 {
        return error_reply(
            session,
            Some(&req),
            ErrorBody::rpc(format!("direction ({}) != CALL", req.direction)),
        );
    }
    if req.status != Status::Ok as i32 {
        return error_reply(
            session,
            Some(&req),
            ErrorBody::rpc(format!("status ({}) != OK", req.status)),
        );
    }

    // Until authentication completes, only the auth procedures pass.
    if session.state.requires_auth() && !Procedure::auth_exempt(req.procedure) {
        warn!(
            procedure = req.procedure,
            peer = %session.state.remote_addr,
            "request rejected: authentication required"
        );
        return error_reply(session, Some(&req), ErrorBody::rpc("authentication required"));
    }

    let procedure = match Procedure::try_from(req.procedure) {
        Ok(p) => p,
        Err(_) => {
            return error_reply(
                session,
                Some(&req),
                ErrorBody::rpc(format!("unknown procedure: {}", req.procedure)),
            );
        }
    };
    let handler = proc_table::lookup(procedure);

    debug!(
        procedure = procedure.name(),
        serial = req.serial,
        "dispatching request"
    );

    // Frame optimistically: length word, OK envelope, then the handler
    // encodes its return straight into the buffer. On failure the buffer
    // is rewritten from scratch as an error reply.
    let Session { state, buffer, .. } = session;
    let mut w = WireWriter::new(buffer);
    let framed = (|| -> Result<usize, HandlerError> {
        let len_at = w.reserve(4)?;
        Envelope::reply_to(&req, Status::Ok).encode(&mut w)?;
        let mut ctx = HandlerCtx { state, env };
        handler(&mut ctx, &mut r, &mut w)?;
        let len = w.position();
        w.patch_u32(len_at, len as u32);
        Ok(len)
    })();

    match framed {
        Ok(len) => {
            session.begin_tx(len);
            DispatchAction::Reply
        }
        Err(e) => {
            debug!(procedure = procedure.name(), serial = req.serial, "request failed");
            error_reply(session, Some(&req), e.into_body())
        }
    }
}

/// Frames a complete error reply. Without a parsed request envelope the
/// reply is addressed `{procedure = OPEN, serial = 1}` so that clients of
/// any protocol revision can still decode the error body.
fn error_reply(session: &mut Session, req: Option<&Envelope>, body: ErrorBody) -> DispatchAction {
    let rep = match req {
        Some(req) => Envelope::reply_to(req, Status::Error),
        None => Envelope {
            program: PROGRAM,
            version: PROTOCOL_VERSION,
            procedure: Procedure::Open as i32,
            direction: Direction::Reply as i32,
            serial: 1,
            status: Status::Error as i32,
        },
    };

    let Session { buffer, .. } = session;
    let mut w = WireWriter::new(buffer);
    let framed = (|| -> Result<usize, WireError> {
        let len_at = w.reserve(4)?;
        rep.encode(&mut w)?;
        body.encode(&mut w)?;
        let len = w.position();
        w.patch_u32(len_at, len as u32);
        Ok(len)
    })();

    match framed {
        Ok(len) => {
            session.begin_tx(len);
            DispatchAction::Reply
        }
        Err(e) => {
            // Nothing sane can be sent; abandon the reply.
            error!(error = %e, "failed to frame error reply, tearing session down");
            DispatchAction::Teardown
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::hypervisor::mem::MemHypervisor;
    use crate::hypervisor::{HvConnection, HvResult, OpenFlags};
    use crate::sasl::{StaticSasl, StaticSaslConfig};
    use virtd_common::protocol::body::{
        AuthListRet, DomainArgs, DomainDefineXmlArgs, DomainLookupByNameArgs, DomainRet,
        GetHostnameRet, ListDomainsArgs, NameListArgs, OpenArgs, SaslInitRet, SaslNegotiateRet,
        SaslPayload, SaslStartArgs, SchedGetParamsArgs, SchedParam, SchedParamsRet,
        SchedSetParamsArgs, SchedValue,
    };
    use virtd_common::protocol::{DOMAIN_ID_LIST_MAX, MESSAGE_MAX};
    use virtd_common::types::DomainRef;

    // Records the flags passed to open, then delegates to the in-memory
    // driver.
    struct FlagSpy {
        inner: MemHypervisor,
        seen: Mutex<Option<OpenFlags>>,
    }

    impl FlagSpy {
        fn new() -> Self {
            Self {
                inner: MemHypervisor::new(),
                seen: Mutex::new(None),
            }
        }
    }

    impl Hypervisor for FlagSpy {
        fn open(&self, name: Option<&str>, flags: OpenFlags) -> HvResult<Box<dyn HvConnection>> {
            *self.seen.lock().unwrap() = Some(flags);
            self.inner.open(name, flags)
        }
    }

    fn env_with(hypervisor: Arc<dyn Hypervisor>, auth: AuthType) -> ServerEnv {
        ServerEnv {
            hypervisor,
            sasl: Arc::new(StaticSasl::new(StaticSaslConfig {
                allow_anonymous: true,
                users: HashMap::from([("admin".to_string(), "secret".to_string())]),
            })),
            auth,
        }
    }

    fn env() -> ServerEnv {
        env_with(Arc::new(MemHypervisor::new()), AuthType::None)
    }

    fn session(env: &ServerEnv, readonly: bool) -> Session {
        Session::new(
            readonly,
            env.auth != AuthType::None,
            "127.0.0.1:16509".parse().unwrap(),
            "127.0.0.1:40000".parse().unwrap(),
        )
    }

    /// Builds `envelope + body` (no length word, as the transport hands it
    /// to the dispatcher).
    fn request(procedure: Procedure, serial: u32, args: &impl WireEncode) -> Vec<u8> {
        let mut buf = vec![0u8; MESSAGE_MAX];
        let mut w = WireWriter::new(&mut buf);
        Envelope::call(procedure as i32, serial)
            .encode(&mut w)
            .unwrap();
        args.encode(&mut w).unwrap();
        let n = w.position();
        buf.truncate(n);
        buf
    }

    /// Runs one request and parses the framed reply.
    fn roundtrip(
        session: &mut Session,
        env: &ServerEnv,
        request_bytes: &[u8],
    ) -> (Envelope, Vec<u8>) {
        assert_eq!(
            dispatch(session, env, request_bytes),
            DispatchAction::Reply
        );
        let reply = session.tx_bytes().to_vec();
        session.finish_tx();

        let mut r = WireReader::new(&reply);
        let len = r.u32().unwrap() as usize;
        assert_eq!(len, reply.len(), "length word covers the whole frame");
        let envelope = Envelope::decode(&mut r).unwrap();
        let body = reply[r.position()..].to_vec();
        (envelope, body)
    }

    fn call(
        session: &mut Session,
        env: &ServerEnv,
        procedure: Procedure,
        serial: u32,
        args: &impl WireEncode,
    ) -> (Envelope, Vec<u8>) {
        roundtrip(session, env, &request(procedure, serial, args))
    }

    fn expect_ok<T: WireDecode>(reply: &(Envelope, Vec<u8>)) -> T {
        assert_eq!(reply.0.status, Status::Ok as i32, "expected OK reply");
        let mut r = WireReader::new(&reply.1);
        let ret = T::decode(&mut r).unwrap();
        assert_eq!(r.remaining(), 0);
        ret
    }

    fn expect_error(reply: &(Envelope, Vec<u8>)) -> ErrorBody {
        assert_eq!(reply.0.status, Status::Error as i32, "expected ERROR reply");
        let mut r = WireReader::new(&reply.1);
        ErrorBody::decode(&mut r).unwrap()
    }

    fn open(session: &mut Session, env: &ServerEnv) {
        let reply = call(
            session,
            env,
            Procedure::Open,
            1,
            &OpenArgs {
                name: None,
                flags: 0,
            },
        );
        assert_eq!(reply.0.status, Status::Ok as i32);
        assert!(reply.1.is_empty(), "OPEN reply has an empty body");
    }

    fn define_guest(session: &mut Session, env: &ServerEnv) -> DomainRef {
        let reply = call(
            session,
            env,
            Procedure::DomainDefineXml,
            90,
            &DomainDefineXmlArgs {
                xml: "<domain><name>guest1</name></domain>".into(),
            },
        );
        expect_ok::<DomainRet>(&reply).dom
    }

    #[test]
    fn open_on_readonly_session_forces_readonly_flag() {
        let spy = Arc::new(FlagSpy::new());
        let env = env_with(spy.clone(), AuthType::None);
        let mut session = session(&env, true);

        let reply = call(
            &mut session,
            &env,
            Procedure::Open,
            42,
            &OpenArgs {
                name: None,
                flags: 0,
            },
        );
        assert_eq!(reply.0.serial, 42);
        assert_eq!(reply.0.status, Status::Ok as i32);
        assert!(reply.1.is_empty());

        let seen = spy.seen.lock().unwrap().unwrap();
        assert!(seen.contains(OpenFlags::READ_ONLY));
    }

    #[test]
    fn open_twice_is_rejected() {
        let env = env();
        let mut session = session(&env, false);
        open(&mut session, &env);
        let reply = call(
            &mut session,
            &env,
            Procedure::Open,
            2,
            &OpenArgs {
                name: None,
                flags: 0,
            },
        );
        let body = expect_error(&reply);
        assert_eq!(body.code, ErrorCode::Rpc);
        assert!(body.message.unwrap().contains("already open"));
    }

    #[test]
    fn close_clears_the_connection_slot() {
        let env = env();
        let mut session = session(&env, false);
        open(&mut session, &env);
        let reply = call(&mut session, &env, Procedure::Close, 3, &());
        assert_eq!(reply.0.status, Status::Ok as i32);
        assert!(session.state().conn.is_none());

        // Further calls need a new OPEN.
        let reply = call(&mut session, &env, Procedure::GetHostname, 4, &());
        let body = expect_error(&reply);
        assert!(body.message.unwrap().contains("connection not open"));
    }

    #[test]
    fn serial_is_echoed_on_ok_and_error() {
        let env = env();
        let mut session = session(&env, false);
        open(&mut session, &env);

        let reply = call(&mut session, &env, Procedure::GetHostname, 7077, &());
        assert_eq!(reply.0.serial, 7077);
        expect_ok::<GetHostnameRet>(&reply);

        let reply = call(
            &mut session,
            &env,
            Procedure::DomainLookupByName,
            7078,
            &DomainLookupByNameArgs {
                name: "absent".into(),
            },
        );
        assert_eq!(reply.0.serial, 7078);
        expect_error(&reply);
    }

    #[test]
    fn list_domains_bound_is_enforced_before_driver_call() {
        let env = env();
        let mut session = session(&env, false);
        open(&mut session, &env);

        let reply = call(
            &mut session,
            &env,
            Procedure::ListDomains,
            5,
            &ListDomainsArgs {
                maxids: DOMAIN_ID_LIST_MAX as i32 + 1,
            },
        );
        let body = expect_error(&reply);
        assert_eq!(body.code, ErrorCode::Rpc);
        assert!(body.message.unwrap().contains("DOMAIN_ID_LIST_MAX"));
    }

    #[test]
    fn name_list_bound_is_enforced() {
        let env = env();
        let mut session = session(&env, false);
        open(&mut session, &env);
        let reply = call(
            &mut session,
            &env,
            Procedure::ListDefinedDomains,
            6,
            &NameListArgs { maxnames: 70_000 },
        );
        let body = expect_error(&reply);
        assert!(body.message.unwrap().contains("DOMAIN_NAME_LIST_MAX"));
    }

    #[test]
    fn auth_gate_blocks_everything_but_auth_procedures() {
        let env = env_with(Arc::new(MemHypervisor::new()), AuthType::Sasl);
        let mut session = session(&env, false);

        let reply = call(&mut session, &env, Procedure::GetHostname, 11, &());
        let body = expect_error(&reply);
        assert_eq!(body.message.unwrap(), "authentication required");

        // AUTH_LIST passes the gate and reports SASL.
        let reply = call(&mut session, &env, Procedure::AuthList, 12, &());
        let ret = expect_ok::<AuthListRet>(&reply);
        assert_eq!(ret.types, vec![AuthType::Sasl]);
    }

    #[test]
    fn sasl_anonymous_flow_authorizes_the_session() {
        let env = env_with(Arc::new(MemHypervisor::new()), AuthType::Sasl);
        let mut session = session(&env, false);

        let reply = call(&mut session, &env, Procedure::AuthSaslInit, 20, &());
        let init = expect_ok::<SaslInitRet>(&reply);
        assert!(init.mechlist.contains("ANONYMOUS"));

        let reply = call(
            &mut session,
            &env,
            Procedure::AuthSaslStart,
            21,
            &SaslStartArgs {
                mech: "ANONYMOUS".into(),
                payload: SaslPayload::none(),
            },
        );
        let ret = expect_ok::<SaslNegotiateRet>(&reply);
        assert!(ret.complete);
        assert_eq!(ret.payload, SaslPayload::none());
        assert!(!session.state().requires_auth());

        // The gate is open now.
        open(&mut session, &env);
        let reply = call(&mut session, &env, Procedure::GetHostname, 22, &());
        expect_ok::<GetHostnameRet>(&reply);

        // AUTH_LIST now reports no authentication required.
        let reply = call(&mut session, &env, Procedure::AuthList, 23, &());
        let ret = expect_ok::<AuthListRet>(&reply);
        assert_eq!(ret.types, vec![AuthType::None]);
    }

    #[test]
    fn sasl_plain_two_round_flow() {
        let env = env_with(Arc::new(MemHypervisor::new()), AuthType::Sasl);
        let mut session = session(&env, false);

        call(&mut session, &env, Procedure::AuthSaslInit, 30, &());
        let reply = call(
            &mut session,
            &env,
            Procedure::AuthSaslStart,
            31,
            &SaslStartArgs {
                mech: "PLAIN".into(),
                payload: SaslPayload::none(),
            },
        );
        let ret = expect_ok::<SaslNegotiateRet>(&reply);
        assert!(!ret.complete);
        assert!(session.state().requires_auth());

        let reply = call(
            &mut session,
            &env,
            Procedure::AuthSaslStep,
            33,
            &SaslPayload::data(b"\0admin\0secret".to_vec()),
        );
        let ret = expect_ok::<SaslNegotiateRet>(&reply);
        assert!(ret.complete);
        assert!(!session.state().requires_auth());
    }

    #[test]
    fn sasl_failure_destroys_the_context() {
        let env = env_with(Arc::new(MemHypervisor::new()), AuthType::Sasl);
        let mut session = session(&env, false);

        call(&mut session, &env, Procedure::AuthSaslInit, 40, &());
        let reply = call(
            &mut session,
            &env,
            Procedure::AuthSaslStart,
            41,
            &SaslStartArgs {
                mech: "PLAIN".into(),
                payload: SaslPayload::data(b"\0admin\0wrong".to_vec()),
            },
        );
        let body = expect_error(&reply);
        assert_eq!(body.code, ErrorCode::AuthFailed);
        assert!(session.state().sasl.is_none());

        // With the context gone, STEP fails auth too.
        let reply = call(
            &mut session,
            &env,
            Procedure::AuthSaslStep,
            42,
            &SaslPayload::data(b"\0admin\0secret".to_vec()),
        );
        let body = expect_error(&reply);
        assert_eq!(body.code, ErrorCode::AuthFailed);
        assert!(session.state().requires_auth());
    }

    #[test]
    fn sasl_init_twice_fails_auth() {
        let env = env_with(Arc::new(MemHypervisor::new()), AuthType::Sasl);
        let mut session = session(&env, false);
        call(&mut session, &env, Procedure::AuthSaslInit, 50, &());
        let reply = call(&mut session, &env, Procedure::AuthSaslInit, 51, &());
        let body = expect_error(&reply);
        assert_eq!(body.code, ErrorCode::AuthFailed);
    }

    #[test]
    fn sasl_init_without_sasl_auth_fails() {
        // Session does not require auth at all.
        let env = env();
        let mut session = session(&env, false);
        let reply = call(&mut session, &env, Procedure::AuthSaslInit, 52, &());
        let body = expect_error(&reply);
        assert_eq!(body.code, ErrorCode::AuthFailed);
    }

    #[test]
    fn program_mismatch_echoes_serial() {
        let env = env();
        let mut session = session(&env, false);

        let mut req = Envelope::call(Procedure::GetHostname as i32, 77);
        req.program ^= 1;
        let mut buf = vec![0u8; 64];
        let mut w = WireWriter::new(&mut buf);
        req.encode(&mut w).unwrap();
        let n = w.position();
        buf.truncate(n);

        let reply = roundtrip(&mut session, &env, &buf);
        assert_eq!(reply.0.serial, 77);
        assert_eq!(reply.0.program, req.program, "reply echoes the request header");
        let body = expect_error(&reply);
        assert!(body.message.unwrap().contains("program mismatch"));
    }

    #[test]
    fn bad_version_direction_and_status_are_rejected_in_order() {
        let env = env();
        let mut session = session(&env, false);

        let mut req = Envelope::call(Procedure::GetHostname as i32, 1);
        req.version = 9;
        let mut buf = vec![0u8; 64];
        let mut w = WireWriter::new(&mut buf);
        req.encode(&mut w).unwrap();
        let n = w.position();
        let reply = roundtrip(&mut session, &env, &buf[..n]);
        assert!(expect_error(&reply)
            .message
            .unwrap()
            .contains("version mismatch"));

        let mut req = Envelope::call(Procedure::GetHostname as i32, 2);
        req.direction = Direction::Reply as i32;
        let mut w = WireWriter::new(&mut buf);
        req.encode(&mut w).unwrap();
        let n = w.position();
        let reply = roundtrip(&mut session, &env, &buf[..n]);
        assert!(expect_error(&reply).message.unwrap().contains("direction"));

        let mut req = Envelope::call(Procedure::GetHostname as i32, 3);
        req.status = Status::Error as i32;
        let mut w = WireWriter::new(&mut buf);
        req.encode(&mut w).unwrap();
        let n = w.position();
        let reply = roundtrip(&mut session, &env, &buf[..n]);
        assert!(expect_error(&reply).message.unwrap().contains("status"));
    }

    #[test]
    fn unknown_procedure_is_rejected() {
        let env = env();
        let mut session = session(&env, false);
        let req = Envelope::call(999, 9);
        let mut buf = vec![0u8; 64];
        let mut w = WireWriter::new(&mut buf);
        req.encode(&mut w).unwrap();
        let n = w.position();
        let reply = roundtrip(&mut session, &env, &buf[..n]);
        let body = expect_error(&reply);
        assert!(body.message.unwrap().contains("unknown procedure: 999"));
    }

    #[test]
    fn truncated_header_gets_a_blind_error_reply() {
        let env = env();
        let mut session = session(&env, false);
        let reply = roundtrip(&mut session, &env, &[0u8; 7]);
        assert_eq!(reply.0.procedure, Procedure::Open as i32);
        assert_eq!(reply.0.serial, 1);
        assert_eq!(reply.0.direction, Direction::Reply as i32);
        expect_error(&reply);
    }

    #[test]
    fn truncated_arguments_yield_a_parse_error() {
        let env = env();
        let mut session = session(&env, false);
        open(&mut session, &env);

        // DOMAIN_LOOKUP_BY_NAME with no body at all.
        let buf = request(Procedure::DomainLookupByName, 13, &());
        let reply = roundtrip(&mut session, &env, &buf);
        let body = expect_error(&reply);
        assert!(body
            .message
            .unwrap()
            .contains("failed to parse arguments"));
    }

    #[test]
    fn calls_before_open_are_rejected() {
        let env = env();
        let mut session = session(&env, false);
        let reply = call(&mut session, &env, Procedure::NumOfDomains, 14, &());
        let body = expect_error(&reply);
        assert!(body.message.unwrap().contains("connection not open"));
    }

    #[test]
    fn domain_lifecycle_over_the_wire_releases_all_handles() {
        let hv = Arc::new(MemHypervisor::new());
        let env = env_with(hv.clone(), AuthType::None);
        let mut session = session(&env, false);
        open(&mut session, &env);

        let dom = define_guest(&mut session, &env);
        assert_eq!(dom.id, -1);

        let reply = call(
            &mut session,
            &env,
            Procedure::DomainCreate,
            91,
            &DomainArgs { dom: dom.clone() },
        );
        assert_eq!(reply.0.status, Status::Ok as i32);

        let reply = call(
            &mut session,
            &env,
            Procedure::DomainSuspend,
            92,
            &DomainArgs { dom: dom.clone() },
        );
        assert_eq!(reply.0.status, Status::Ok as i32);

        let reply = call(
            &mut session,
            &env,
            Procedure::DomainResume,
            93,
            &DomainArgs { dom: dom.clone() },
        );
        assert_eq!(reply.0.status, Status::Ok as i32);

        // DESTROY consumes its handle inside the driver; everything else
        // released via guards. Nothing may leak.
        let reply = call(
            &mut session,
            &env,
            Procedure::DomainDestroy,
            94,
            &DomainArgs { dom: dom.clone() },
        );
        assert_eq!(reply.0.status, Status::Ok as i32);
        assert_eq!(hv.outstanding_handles(), 0);
    }

    #[test]
    fn failed_lookup_releases_no_handles() {
        let hv = Arc::new(MemHypervisor::new());
        let env = env_with(hv.clone(), AuthType::None);
        let mut session = session(&env, false);
        open(&mut session, &env);

        let reply = call(
            &mut session,
            &env,
            Procedure::DomainSuspend,
            95,
            &DomainArgs {
                dom: DomainRef {
                    name: "ghost".into(),
                    uuid: uuid::Uuid::new_v4(),
                    id: 0,
                },
            },
        );
        let body = expect_error(&reply);
        assert!(body.message.unwrap().contains("domain not found"));
        assert_eq!(hv.outstanding_handles(), 0);
    }

    #[test]
    fn advisory_wire_id_is_ignored() {
        let hv = Arc::new(MemHypervisor::new());
        let env = env_with(hv.clone(), AuthType::None);
        let mut session = session(&env, false);
        open(&mut session, &env);

        let dom = define_guest(&mut session, &env);
        call(
            &mut session,
            &env,
            Procedure::DomainCreate,
            96,
            &DomainArgs { dom: dom.clone() },
        );

        // Send a bogus advisory id; the lookup reply must carry the
        // server's id, not ours.
        let forged = DomainRef { id: 4242, ..dom };
        let reply = call(
            &mut session,
            &env,
            Procedure::DomainLookupByName,
            97,
            &DomainLookupByNameArgs {
                name: forged.name.clone(),
            },
        );
        let ret = expect_ok::<DomainRet>(&reply);
        assert_ne!(ret.dom.id, 4242);
        assert!(ret.dom.id > 0);
        assert_eq!(hv.outstanding_handles(), 0);
    }

    #[test]
    fn scheduler_parameters_roundtrip_through_the_driver() {
        let env = env();
        let mut session = session(&env, false);
        open(&mut session, &env);
        let dom = define_guest(&mut session, &env);

        let reply = call(
            &mut session,
            &env,
            Procedure::DomainSetSchedulerParameters,
            98,
            &SchedSetParamsArgs {
                dom: dom.clone(),
                params: vec![SchedParam {
                    field: "weight".into(),
                    value: SchedValue::Uint(256),
                }],
            },
        );
        assert_eq!(reply.0.status, Status::Ok as i32);

        let reply = call(
            &mut session,
            &env,
            Procedure::DomainGetSchedulerParameters,
            99,
            &SchedGetParamsArgs {
                dom: dom.clone(),
                nparams: 2,
            },
        );
        let ret = expect_ok::<SchedParamsRet>(&reply);
        assert_eq!(ret.params[0].field, "weight");
        assert_eq!(ret.params[0].value, SchedValue::Uint(256));
    }

    #[test]
    fn sched_nparams_bound_is_enforced() {
        let env = env();
        let mut session = session(&env, false);
        open(&mut session, &env);
        let dom = define_guest(&mut session, &env);

        let reply = call(
            &mut session,
            &env,
            Procedure::DomainGetSchedulerParameters,
            100,
            &SchedGetParamsArgs { dom, nparams: 17 },
        );
        let body = expect_error(&reply);
        assert!(body
            .message
            .unwrap()
            .contains("DOMAIN_SCHEDULER_PARAMETERS_MAX"));
    }
}
