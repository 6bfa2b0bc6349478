//! Message model and wire codec.
//!
//! Wire layout - all multi-byte numbers in network byte order (BE):
//! ```ascii
//! 0:  version (2 bits, must be 1) | kind (2 bits) | token length (4 bits, 0..=8)
//! 1:  code (u8) - a method (1-4), a response code (class.detail) or 0 for 'empty'
//! 2:  message id (u16)
//! 4:  token (0..=8 bytes, verbatim)
//! *:  options, each: delta (4 bits) | length (4 bits), then `length` value bytes.
//!      Deltas accumulate onto the previous option number; a nibble of 15 is
//!      reserved and rejected - there is no extended-length fallback.
//! *:  optionally 0xFF followed by the payload (everything up to the end of the
//!      datagram; nothing after the marker is an explicit empty payload)
//! ```

pub mod error;
pub mod message;
pub mod wire;

pub use error::CodecError;
pub use message::{CoapMessage, CoapOption, MessageKind};
