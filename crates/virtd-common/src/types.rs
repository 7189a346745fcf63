//! Core type definitions shared by the daemon and its clients.
//!
//! Object references are the wire form of server-side handles: a client
//! never holds a live handle, only the `(name, uuid[, id])` identity it can
//! send back to name the object in a later call.

use std::fmt;

use uuid::Uuid;

use crate::error::{WireError, WireResult};
use crate::protocol::wire::{WireDecode, WireEncode, WireReader, WireWriter};

/// Wire reference to a domain (a guest VM).
///
/// The `id` is the hypervisor-assigned run id (-1 while the domain is not
/// running). On the wire it is advisory: the server resolves the object by
/// `(name, uuid)` and its own id wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainRef {
    pub name: String,
    pub uuid: Uuid,
    pub id: i32,
}

impl WireEncode for DomainRef {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.string(&self.name)?;
        self.uuid.encode(w)?;
        w.i32(self.id)
    }
}

impl WireDecode for DomainRef {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            name: r.string()?,
            uuid: Uuid::decode(r)?,
            id: r.i32()?,
        })
    }
}

impl fmt::Display for DomainRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.uuid)
    }
}

/// Wire reference to a virtual network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkRef {
    pub name: String,
    pub uuid: Uuid,
}

impl WireEncode for NetworkRef {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.string(&self.name)?;
        self.uuid.encode(w)
    }
}

impl WireDecode for NetworkRef {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            name: r.string()?,
            uuid: Uuid::decode(r)?,
        })
    }
}

impl fmt::Display for NetworkRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.uuid)
    }
}

/// Error classes carried in error replies.
///
/// Explicit discriminants are wire values; never reuse a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    /// Internal dispatcher failure.
    Internal = 1,
    /// Allocation failure.
    NoMemory = 2,
    /// Protocol-level failure: bad envelope, bad arguments, bound exceeded.
    Rpc = 3,
    /// The hypervisor reported an operation failure.
    OperationFailed = 4,
    /// The operation is not supported by the active driver.
    NoSupport = 5,
    /// Named domain does not exist.
    NoDomain = 6,
    /// Named network does not exist.
    NoNetwork = 7,
    /// Authentication failed or was rejected.
    AuthFailed = 8,
    /// An argument value was out of range for the operation.
    InvalidArg = 9,
    /// The operation is denied on this connection (e.g. read-only).
    OperationDenied = 10,
}

impl TryFrom<i32> for ErrorCode {
    type Error = WireError;

    fn try_from(value: i32) -> Result<Self, WireError> {
        Ok(match value {
            1 => ErrorCode::Internal,
            2 => ErrorCode::NoMemory,
            3 => ErrorCode::Rpc,
            4 => ErrorCode::OperationFailed,
            5 => ErrorCode::NoSupport,
            6 => ErrorCode::NoDomain,
            7 => ErrorCode::NoNetwork,
            8 => ErrorCode::AuthFailed,
            9 => ErrorCode::InvalidArg,
            10 => ErrorCode::OperationDenied,
            other => {
                return Err(WireError::BadDiscriminant {
                    what: "error code",
                    value: other,
                })
            }
        })
    }
}

/// Subsystem an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorDomain {
    Rpc = 1,
    Hypervisor = 2,
    Domain = 3,
    Network = 4,
    Auth = 5,
}

impl TryFrom<i32> for ErrorDomain {
    type Error = WireError;

    fn try_from(value: i32) -> Result<Self, WireError> {
        Ok(match value {
            1 => ErrorDomain::Rpc,
            2 => ErrorDomain::Hypervisor,
            3 => ErrorDomain::Domain,
            4 => ErrorDomain::Network,
            5 => ErrorDomain::Auth,
            other => {
                return Err(WireError::BadDiscriminant {
                    what: "error domain",
                    value: other,
                })
            }
        })
    }
}

/// Error severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorLevel {
    Warning = 1,
    Error = 2,
}

impl TryFrom<i32> for ErrorLevel {
    type Error = WireError;

    fn try_from(value: i32) -> Result<Self, WireError> {
        Ok(match value {
            1 => ErrorLevel::Warning,
            2 => ErrorLevel::Error,
            other => {
                return Err(WireError::BadDiscriminant {
                    what: "error level",
                    value: other,
                })
            }
        })
    }
}

/// Body of a reply whose status is `Error`.
///
/// Field order on the wire is fixed: code, domain, message, level, dom,
/// str1..str3, int1, int2, net.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub domain: ErrorDomain,
    pub message: Option<String>,
    pub level: ErrorLevel,
    pub dom: Option<DomainRef>,
    pub str1: Option<String>,
    pub str2: Option<String>,
    pub str3: Option<String>,
    pub int1: i32,
    pub int2: i32,
    pub net: Option<NetworkRef>,
}

impl ErrorBody {
    /// Protocol-level error with an `Rpc` code.
    pub fn rpc(message: impl Into<String>) -> Self {
        Self::with_code(ErrorCode::Rpc, ErrorDomain::Rpc, message)
    }

    /// The fixed "authentication failed" error.
    pub fn auth_failed() -> Self {
        Self::with_code(ErrorCode::AuthFailed, ErrorDomain::Auth, "authentication failed")
    }

    pub fn with_code(code: ErrorCode, domain: ErrorDomain, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            code,
            domain,
            message: Some(message.clone()),
            level: ErrorLevel::Error,
            dom: None,
            str1: Some(message),
            str2: None,
            str3: None,
            int1: 0,
            int2: 0,
            net: None,
        }
    }
}

impl WireEncode for ErrorBody {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.i32(self.code as i32)?;
        w.i32(self.domain as i32)?;
        w.option(self.message.as_ref(), |w, s| w.string(s))?;
        w.i32(self.level as i32)?;
        w.option(self.dom.as_ref(), |w, d| d.encode(w))?;
        w.option(self.str1.as_ref(), |w, s| w.string(s))?;
        w.option(self.str2.as_ref(), |w, s| w.string(s))?;
        w.option(self.str3.as_ref(), |w, s| w.string(s))?;
        w.i32(self.int1)?;
        w.i32(self.int2)?;
        w.option(self.net.as_ref(), |w, n| n.encode(w))
    }
}

impl WireDecode for ErrorBody {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            code: ErrorCode::try_from(r.i32()?)?,
            domain: ErrorDomain::try_from(r.i32()?)?,
            message: r.option(|r| r.string())?,
            level: ErrorLevel::try_from(r.i32()?)?,
            dom: r.option(DomainRef::decode)?,
            str1: r.option(|r| r.string())?,
            str2: r.option(|r| r.string())?,
            str3: r.option(|r| r.string())?,
            int1: r.i32()?,
            int2: r.i32()?,
            net: r.option(NetworkRef::decode)?,
        })
    }
}

/// Authentication scheme advertised to a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum AuthType {
    /// No authentication required.
    None = 0,
    /// SASL negotiation over the auth procedures.
    Sasl = 1,
}

impl TryFrom<i32> for AuthType {
    type Error = WireError;

    fn try_from(value: i32) -> Result<Self, WireError> {
        Ok(match value {
            0 => AuthType::None,
            1 => AuthType::Sasl,
            other => {
                return Err(WireError::BadDiscriminant {
                    what: "auth type",
                    value: other,
                })
            }
        })
    }
}

impl WireEncode for AuthType {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.i32(*self as i32)
    }
}

impl WireDecode for AuthType {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        AuthType::try_from(r.i32()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T: WireEncode + WireDecode + PartialEq + std::fmt::Debug>(value: &T) {
        let mut buf = [0u8; 1024];
        let mut w = WireWriter::new(&mut buf);
        value.encode(&mut w).unwrap();
        let n = w.position();
        let mut r = WireReader::new(&buf[..n]);
        assert_eq!(&T::decode(&mut r).unwrap(), value);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn domain_ref_roundtrip() {
        roundtrip(&DomainRef {
            name: "fedora30".into(),
            uuid: Uuid::new_v4(),
            id: 9,
        });
    }

    #[test]
    fn network_ref_roundtrip() {
        roundtrip(&NetworkRef {
            name: "default".into(),
            uuid: Uuid::new_v4(),
        });
    }

    #[test]
    fn error_body_roundtrip() {
        roundtrip(&ErrorBody::rpc("maxids > DOMAIN_ID_LIST_MAX"));
        roundtrip(&ErrorBody::auth_failed());
        roundtrip(&ErrorBody {
            dom: Some(DomainRef {
                name: "w2k".into(),
                uuid: Uuid::new_v4(),
                id: -1,
            }),
            net: Some(NetworkRef {
                name: "default".into(),
                uuid: Uuid::new_v4(),
            }),
            int1: 3,
            int2: -4,
            ..ErrorBody::with_code(ErrorCode::NoDomain, ErrorDomain::Domain, "domain not found")
        });
    }

    #[test]
    fn unknown_error_code_rejected() {
        assert!(ErrorCode::try_from(99).is_err());
        assert!(ErrorLevel::try_from(0).is_err());
        assert!(AuthType::try_from(7).is_err());
    }
}
