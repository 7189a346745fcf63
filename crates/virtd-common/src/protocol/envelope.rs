//! The fixed message envelope.
//!
//! Every call and every reply starts with the same 24-byte header. A reply
//! echoes the call's `(program, version, procedure, serial)` unchanged;
//! only `direction` and `status` differ.

use crate::error::WireResult;
use crate::protocol::wire::{WireDecode, WireEncode, WireReader, WireWriter};
use crate::protocol::{PROGRAM, PROTOCOL_VERSION};

/// Message direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Direction {
    Call = 0,
    Reply = 1,
}

/// Message status; `Error` replies carry an [`crate::types::ErrorBody`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Status {
    Ok = 0,
    Error = 1,
}

/// The header on every message.
///
/// `procedure`, `direction` and `status` stay raw `i32`s: the dispatcher
/// validates them in a fixed order and needs to echo unknown values back
/// in its error replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope {
    pub program: u32,
    pub version: u32,
    pub procedure: i32,
    pub direction: i32,
    pub serial: u32,
    pub status: i32,
}

impl Envelope {
    /// Encoded size in bytes.
    pub const SIZE: usize = 24;

    /// Header for a new call; used by test clients.
    pub fn call(procedure: i32, serial: u32) -> Self {
        Self {
            program: PROGRAM,
            version: PROTOCOL_VERSION,
            procedure,
            direction: Direction::Call as i32,
            serial,
            status: Status::Ok as i32,
        }
    }

    /// Reply header echoing a call.
    pub fn reply_to(req: &Envelope, status: Status) -> Self {
        Self {
            program: req.program,
            version: req.version,
            procedure: req.procedure,
            direction: Direction::Reply as i32,
            serial: req.serial,
            status: status as i32,
        }
    }
}

impl WireEncode for Envelope {
    fn encode(&self, w: &mut WireWriter<'_>) -> WireResult<()> {
        w.u32(self.program)?;
        w.u32(self.version)?;
        w.i32(self.procedure)?;
        w.i32(self.direction)?;
        w.u32(self.serial)?;
        w.i32(self.status)
    }
}

impl WireDecode for Envelope {
    fn decode(r: &mut WireReader<'_>) -> WireResult<Self> {
        Ok(Self {
            program: r.u32()?,
            version: r.u32()?,
            procedure: r.i32()?,
            direction: r.i32()?,
            serial: r.u32()?,
            status: r.i32()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Procedure;

    #[test]
    fn envelope_roundtrip() {
        let env = Envelope::call(Procedure::GetHostname as i32, 42);
        let mut buf = [0u8; Envelope::SIZE];
        let mut w = WireWriter::new(&mut buf);
        env.encode(&mut w).unwrap();
        assert_eq!(w.position(), Envelope::SIZE);

        let mut r = WireReader::new(&buf);
        assert_eq!(Envelope::decode(&mut r).unwrap(), env);
    }

    #[test]
    fn truncated_envelope_fails() {
        let mut r = WireReader::new(&[0u8; 10]);
        assert!(Envelope::decode(&mut r).is_err());
    }

    #[test]
    fn reply_echoes_identity() {
        let req = Envelope::call(Procedure::Open as i32, 7);
        let rep = Envelope::reply_to(&req, Status::Error);
        assert_eq!(rep.program, req.program);
        assert_eq!(rep.version, req.version);
        assert_eq!(rep.procedure, req.procedure);
        assert_eq!(rep.serial, 7);
        assert_eq!(rep.direction, Direction::Reply as i32);
        assert_eq!(rep.status, Status::Error as i32);
    }
}
