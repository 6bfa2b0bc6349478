use thiserror::Error;

/// Codec failures are returned as values, never as panics: the dispatcher decides
///  per kind whether a failed datagram is answered with a Reset or dropped.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// insufficient bytes for a declared field, or an output buffer too small
    ///  for the message
    #[error("buffer too short for the declared contents")]
    Truncated,

    #[error("token length {tkl} exceeds the maximum of 8")]
    TokenTooLarge { tkl: u8 },

    /// an option delta or length of 15 - the reserved nibble value. This codec
    ///  has no extended-length encoding.
    #[error("option delta or length nibble 15 is reserved and not supported")]
    OptionsNotSupported,

    #[error("option value of {len} bytes exceeds the maximum of 14")]
    OptionOversize { len: usize },

    /// The header fields are decoded before the version gate, so the message id
    ///  carried here is valid for building a Reset even though parsing failed.
    #[error("unsupported protocol version {version}")]
    VersionMismatch { version: u8, message_id: u16 },
}
