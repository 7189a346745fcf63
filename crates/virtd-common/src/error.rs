//! Error types for the wire codec.
//!
//! `WireError` is the single failure type for encode and decode. Decoders
//! never panic and never read past the message; encoders never write past
//! the caller-provided buffer.

use thiserror::Error;

/// Failures raised by the wire codec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// The decoder would read past the end of the message.
    #[error("unexpected end of message: need {need} more bytes, {remaining} remain")]
    ShortBuffer { need: usize, remaining: usize },

    /// A string field did not hold valid UTF-8.
    #[error("invalid UTF-8 in string field")]
    InvalidUtf8,

    /// A length-prefixed field exceeded its protocol maximum.
    #[error("{field}: length {len} exceeds maximum {max}")]
    FieldTooLong {
        field: &'static str,
        len: u32,
        max: u32,
    },

    /// A wire boolean was neither 0 nor 1.
    #[error("boolean field out of range: {0}")]
    BadBool(u32),

    /// A tagged-union discriminant was not one of the known arms.
    #[error("unknown discriminant {value} for {what}")]
    BadDiscriminant { what: &'static str, value: i32 },

    /// The encoded reply does not fit in the fixed message buffer.
    #[error("payload too large for the message buffer")]
    PayloadTooLarge,
}

/// Result alias for codec operations.
pub type WireResult<T> = std::result::Result<T, WireError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_bound() {
        let err = WireError::FieldTooLong {
            field: "mechlist",
            len: 70_000,
            max: 65_536,
        };
        assert!(err.to_string().contains("mechlist"));
        assert!(err.to_string().contains("65536"));
    }
}
