//! SASL collaborator interface and the built-in backend.
//!
//! The auth state machine drives a [`SaslSession`] obtained from a
//! [`SaslBackend`]; the daemon never interprets mechanism payloads itself.
//! Payloads are `Option<&[u8]>` end to end because SASL distinguishes "no
//! payload" from "empty payload" and several mechanisms break if the two
//! are conflated.
//!
//! [`StaticSasl`] is the in-tree backend: ANONYMOUS (for open installs
//! and tests) and PLAIN verified against a configured credential table.
//! A Cyrus-backed implementation can be plugged in behind the same traits.

use std::collections::HashMap;

use thiserror::Error;

/// Failure inside the SASL library or a rejected authentication.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct SaslError(pub String);

impl SaslError {
    fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Outcome of one negotiation round. The payload, when present, is sent
/// back to the client verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaslStep {
    /// More rounds are needed.
    Continue(Option<Vec<u8>>),
    /// The client is authenticated.
    Done(Option<Vec<u8>>),
}

/// Creates per-session negotiation state.
///
/// `local_addr` and `remote_addr` are `IP;PORT` strings so mechanisms can
/// bind to the connection endpoints.
pub trait SaslBackend: Send + Sync {
    fn new_session(
        &self,
        service: &str,
        local_addr: &str,
        remote_addr: &str,
    ) -> Result<Box<dyn SaslSession>, SaslError>;
}

/// One client's negotiation state.
pub trait SaslSession: Send {
    /// Comma-separated list of mechanisms this session offers.
    fn mechanisms(&self) -> Result<String, SaslError>;

    /// First round: the client names a mechanism and may send an initial
    /// response.
    fn start(&mut self, mechanism: &str, client_in: Option<&[u8]>)
        -> Result<SaslStep, SaslError>;

    /// Subsequent rounds.
    fn step(&mut self, client_in: Option<&[u8]>) -> Result<SaslStep, SaslError>;
}

/// Configuration for [`StaticSasl`].
#[derive(Debug, Clone, Default)]
pub struct StaticSaslConfig {
    /// Offer ANONYMOUS, which authenticates any client immediately.
    pub allow_anonymous: bool,
    /// PLAIN credentials: authcid -> password.
    pub users: HashMap<String, String>,
}

/// The built-in backend.
pub struct StaticSasl {
    config: StaticSaslConfig,
}

impl StaticSasl {
    pub fn new(config: StaticSaslConfig) -> Self {
        Self { config }
    }
}

impl SaslBackend for StaticSasl {
    fn new_session(
        &self,
        _service: &str,
        _local_addr: &str,
        _remote_addr: &str,
    ) -> Result<Box<dyn SaslSession>, SaslError> {
        if !self.config.allow_anonymous && self.config.users.is_empty() {
            return Err(SaslError::new("no SASL mechanisms are configured"));
        }
        Ok(Box::new(StaticSession {
            config: self.config.clone(),
            mechanism: None,
        }))
    }
}

struct StaticSession {
    config: StaticSaslConfig,
    mechanism: Option<&'static str>,
}

impl StaticSession {
    /// PLAIN message: `authzid NUL authcid NUL passwd`.
    fn verify_plain(&self, payload: &[u8]) -> Result<SaslStep, SaslError> {
        let mut parts = payload.splitn(3, |b| *b == 0);
        let _authzid = parts.next().unwrap_or_default();
        let authcid = parts
            .next()
            .ok_or_else(|| SaslError::new("malformed PLAIN response"))?;
        let passwd = parts
            .next()
            .ok_or_else(|| SaslError::new("malformed PLAIN response"))?;
        let authcid =
            std::str::from_utf8(authcid).map_err(|_| SaslError::new("malformed PLAIN response"))?;
        match self.config.users.get(authcid) {
            Some(expected) if expected.as_bytes() == passwd => Ok(SaslStep::Done(None)),
            _ => Err(SaslError::new("bad username or password")),
        }
    }
}

impl SaslSession for StaticSession {
    fn mechanisms(&self) -> Result<String, SaslError> {
        let mut mechs = Vec::new();
        if self.config.allow_anonymous {
            mechs.push("ANONYMOUS");
        }
        if !self.config.users.is_empty() {
            mechs.push("PLAIN");
        }
        if mechs.is_empty() {
            return Err(SaslError::new("no SASL mechanisms are configured"));
        }
        Ok(mechs.join(","))
    }

    fn start(
        &mut self,
        mechanism: &str,
        client_in: Option<&[u8]>,
    ) -> Result<SaslStep, SaslError> {
        match mechanism {
            "ANONYMOUS" if self.config.allow_anonymous => {
                // Any trace token (or none at all) is accepted.
                Ok(SaslStep::Done(None))
            }
            "PLAIN" if !self.config.users.is_empty() => {
                self.mechanism = Some("PLAIN");
                match client_in {
                    Some(payload) => self.verify_plain(payload),
                    // No initial response; ask for one.
                    None => Ok(SaslStep::Continue(None)),
                }
            }
            other => Err(SaslError::new(format!("unsupported mechanism: {other}"))),
        }
    }

    fn step(&mut self, client_in: Option<&[u8]>) -> Result<SaslStep, SaslError> {
        match self.mechanism {
            Some("PLAIN") => match client_in {
                Some(payload) => self.verify_plain(payload),
                None => Err(SaslError::new("PLAIN response missing")),
            },
            _ => Err(SaslError::new("no negotiation in progress")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(anonymous: bool, users: &[(&str, &str)]) -> StaticSasl {
        StaticSasl::new(StaticSaslConfig {
            allow_anonymous: anonymous,
            users: users
                .iter()
                .map(|(u, p)| (u.to_string(), p.to_string()))
                .collect(),
        })
    }

    fn session(backend: &StaticSasl) -> Box<dyn SaslSession> {
        backend
            .new_session("virtd", "127.0.0.1;16509", "127.0.0.1;40000")
            .unwrap()
    }

    #[test]
    fn mechanism_list_reflects_config() {
        let both = backend(true, &[("admin", "secret")]);
        assert_eq!(session(&both).mechanisms().unwrap(), "ANONYMOUS,PLAIN");
        let plain_only = backend(false, &[("admin", "secret")]);
        assert_eq!(session(&plain_only).mechanisms().unwrap(), "PLAIN");
    }

    #[test]
    fn no_mechanisms_refuses_session() {
        let none = backend(false, &[]);
        assert!(none
            .new_session("virtd", "127.0.0.1;16509", "127.0.0.1;40000")
            .is_err());
    }

    #[test]
    fn anonymous_completes_on_start_without_payload() {
        let b = backend(true, &[]);
        let mut s = session(&b);
        assert_eq!(s.start("ANONYMOUS", None).unwrap(), SaslStep::Done(None));
    }

    #[test]
    fn plain_with_initial_response() {
        let b = backend(false, &[("admin", "secret")]);
        let mut s = session(&b);
        let step = s.start("PLAIN", Some(b"\0admin\0secret")).unwrap();
        assert_eq!(step, SaslStep::Done(None));
    }

    #[test]
    fn plain_two_round_negotiation() {
        let b = backend(false, &[("admin", "secret")]);
        let mut s = session(&b);
        assert_eq!(s.start("PLAIN", None).unwrap(), SaslStep::Continue(None));
        assert_eq!(s.step(Some(b"\0admin\0secret")).unwrap(), SaslStep::Done(None));
    }

    #[test]
    fn plain_rejects_bad_password() {
        let b = backend(false, &[("admin", "secret")]);
        let mut s = session(&b);
        assert!(s.start("PLAIN", Some(b"\0admin\0wrong")).is_err());
    }

    #[test]
    fn unsupported_mechanism_rejected() {
        let b = backend(true, &[]);
        let mut s = session(&b);
        assert!(s.start("GSSAPI", None).is_err());
        // PLAIN is not offered without users.
        assert!(s.start("PLAIN", Some(b"\0a\0b")).is_err());
    }
}
