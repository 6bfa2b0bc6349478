use bytes::BytesMut;

use crate::codec::error::CodecError;
use crate::codec::message::{CoapMessage, CoapOption, MessageKind, MAX_TOKEN_LEN, PAYLOAD_MARKER, PROTOCOL_VERSION};

/// the exact number of bytes [serialize] will write for this message
pub fn serialized_len(msg: &CoapMessage) -> usize {
    let mut needed = 4 + msg.token.len();
    for opt in &msg.options {
        needed += 1 + opt.value.len();
    }
    if let Some(payload) = &msg.payload {
        needed += 1 + payload.len();
    }
    needed
}

/// Serializes a message into a caller-provided buffer, returning the number of
///  bytes written.
///
/// Validation happens in a fixed order: the token length first, then the exact
///  required size against the buffer (nothing is written on [CodecError::Truncated]),
///  then per-option delta/length limits while writing. A delta or length that
///  does not fit its nibble aborts with [CodecError::OptionsNotSupported]; the
///  caller must not assume partial output is usable after that.
///
/// No sorting happens here - the options list is trusted to be ascending, and
///  the deltas are re-validated against that order.
pub fn serialize(msg: &CoapMessage, out: &mut [u8]) -> Result<usize, CodecError> {
    if msg.token.len() > MAX_TOKEN_LEN {
        return Err(CodecError::TokenTooLarge { tkl: msg.token.len() as u8 });
    }
    if out.len() < serialized_len(msg) {
        return Err(CodecError::Truncated);
    }

    out[0] = ((msg.version & 0x03) << 6)
        | ((u8::from(msg.kind) & 0x03) << 4)
        | (msg.token.len() as u8 & 0x0F);
    out[1] = msg.code;
    out[2..4].copy_from_slice(&msg.message_id.to_be_bytes());

    let mut idx = 4;
    out[idx..idx + msg.token.len()].copy_from_slice(&msg.token);
    idx += msg.token.len();

    let mut previous = 0u16;
    for opt in &msg.options {
        // wrapping: an out-of-order list produces a huge delta and is rejected
        let delta = opt.number.wrapping_sub(previous);
        // the nibble value 15 is reserved, so 14 is the largest encodable delta and length
        if delta > 14 || opt.value.len() > 14 {
            return Err(CodecError::OptionsNotSupported);
        }

        out[idx] = ((delta as u8) << 4) | (opt.value.len() as u8);
        idx += 1;
        out[idx..idx + opt.value.len()].copy_from_slice(&opt.value);
        idx += opt.value.len();
        previous = opt.number;
    }

    if let Some(payload) = &msg.payload {
        out[idx] = PAYLOAD_MARKER;
        idx += 1;
        out[idx..idx + payload.len()].copy_from_slice(payload);
        idx += payload.len();
    }

    Ok(idx)
}

/// Serializes into a freshly allocated buffer sized to the message's exact need.
pub fn to_bytes(msg: &CoapMessage) -> Result<BytesMut, CodecError> {
    let mut buf = BytesMut::zeroed(serialized_len(msg));
    let written = serialize(msg, &mut buf)?;
    debug_assert_eq!(written, buf.len());
    Ok(buf)
}

/// Parses one datagram into a message.
///
/// The header fields (version, kind, token length, code, message id) are always
///  decoded before any validation, so that [CodecError::VersionMismatch] can
///  carry the message id the caller needs for building a Reset.
pub fn parse(buf: &[u8]) -> Result<CoapMessage, CodecError> {
    if buf.len() < 4 {
        return Err(CodecError::Truncated);
    }

    let first = buf[0];
    let version = (first >> 6) & 0x03;
    let kind = MessageKind::try_from((first >> 4) & 0x03)
        .expect("a 2-bit field covers exactly the four message kinds");
    let tkl = (first & 0x0F) as usize;
    let code = buf[1];
    let message_id = u16::from_be_bytes([buf[2], buf[3]]);

    if version != PROTOCOL_VERSION {
        return Err(CodecError::VersionMismatch { version, message_id });
    }
    if tkl > MAX_TOKEN_LEN {
        return Err(CodecError::TokenTooLarge { tkl: tkl as u8 });
    }

    let mut idx = 4;
    if buf.len() < idx + tkl {
        return Err(CodecError::Truncated);
    }
    let token = buf[idx..idx + tkl].to_vec();
    idx += tkl;

    let mut msg = CoapMessage {
        version,
        kind,
        code,
        message_id,
        token,
        options: Vec::new(),
        payload: None,
    };

    let mut previous = 0u16;
    while idx < buf.len() {
        if buf[idx] == PAYLOAD_MARKER {
            // everything after the marker is payload; zero remaining bytes is
            //  an explicit empty payload, not an error
            msg.payload = Some(buf[idx + 1..].to_vec());
            return Ok(msg);
        }

        let header = buf[idx];
        idx += 1;
        let delta = ((header >> 4) & 0x0F) as u16;
        let len = (header & 0x0F) as usize;

        if delta == 15 || len == 15 {
            return Err(CodecError::OptionsNotSupported);
        }
        if buf.len() < idx + len {
            return Err(CodecError::Truncated);
        }

        // deltas are non-negative and applied in stream order, so the list is
        //  ascending by construction; a chain that would push the number past
        //  u16::MAX has no representable option and is rejected
        let number = previous.checked_add(delta)
            .ok_or(CodecError::OptionsNotSupported)?;
        msg.options.push(CoapOption {
            number,
            value: buf[idx..idx + len].to_vec(),
        });
        previous = number;
        idx += len;
    }

    // end of buffer without a marker simply means no payload
    Ok(msg)
}
