use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::codec::error::CodecError;

pub const PROTOCOL_VERSION: u8 = 1;
pub const MAX_TOKEN_LEN: usize = 8;
/// the largest value length encodable in the 4-bit length nibble (15 is reserved)
pub const MAX_OPTION_LEN: usize = 14;
pub const PAYLOAD_MARKER: u8 = 0xFF;

/// Uri-Path option number (RFC 7252); repeatable, one option per path segment
pub const OPTION_URI_PATH: u16 = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum MessageKind {
    Confirmable = 0,
    NonConfirmable = 1,
    Acknowledgement = 2,
    Reset = 3,
}

/// Method and response codes. Response codes pack class.detail as class in the
///  high 3 bits and detail in the low 5 bits.
pub mod code {
    pub const EMPTY: u8 = 0x00;
    pub const GET: u8 = 0x01;
    pub const POST: u8 = 0x02;
    pub const PUT: u8 = 0x03;
    pub const DELETE: u8 = 0x04;

    pub const CREATED: u8 = 0x41; // 2.01
    pub const DELETED: u8 = 0x42; // 2.02
    pub const VALID: u8 = 0x43; // 2.03
    pub const CHANGED: u8 = 0x44; // 2.04
    pub const CONTENT: u8 = 0x45; // 2.05

    pub const BAD_REQUEST: u8 = 0x80; // 4.00
    pub const NOT_FOUND: u8 = 0x84; // 4.04

    pub const INTERNAL_ERROR: u8 = 0xA0; // 5.00
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoapOption {
    pub number: u16,
    pub value: Vec<u8>,
}

/// One protocol message. A message is owned exclusively by the worker or caller
///  that produced it and is never shared across tasks; the options list stays
///  sorted ascending by number through [CoapMessage::add_option].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoapMessage {
    pub version: u8,
    pub kind: MessageKind,
    pub code: u8,
    pub message_id: u16,
    pub token: Vec<u8>,
    pub options: Vec<CoapOption>,
    pub payload: Option<Vec<u8>>,
}

impl Default for CoapMessage {
    fn default() -> CoapMessage {
        CoapMessage::new()
    }
}

impl CoapMessage {
    /// a safe starting point for both request and reply construction: version 1,
    ///  confirmable, empty code, message id 0, no token / options / payload
    pub fn new() -> CoapMessage {
        CoapMessage {
            version: PROTOCOL_VERSION,
            kind: MessageKind::Confirmable,
            code: code::EMPTY,
            message_id: 0,
            token: Vec::new(),
            options: Vec::new(),
            payload: None,
        }
    }

    /// Inserts an option, keeping the list sorted ascending by number. Equal
    ///  numbers keep their insertion order, so repeated Uri-Path segments
    ///  serialize in the order they were added. On error nothing is inserted.
    pub fn add_option(&mut self, number: u16, value: &[u8]) -> Result<(), CodecError> {
        if value.len() > MAX_OPTION_LEN {
            return Err(CodecError::OptionOversize { len: value.len() });
        }

        let idx = self.options.partition_point(|opt| opt.number <= number);
        self.options.insert(idx, CoapOption {
            number,
            value: value.to_vec(),
        });
        Ok(())
    }

    /// Joins the values of all Uri-Path options with '/' into a single path,
    ///  or None if the message carries no Uri-Path option.
    pub fn uri_path(&self) -> Option<String> {
        let segments = self.options.iter()
            .filter(|opt| opt.number == OPTION_URI_PATH)
            .map(|opt| String::from_utf8_lossy(&opt.value))
            .collect::<Vec<_>>();

        if segments.is_empty() {
            None
        }
        else {
            Some(segments.join("/"))
        }
    }

    /// empty Acknowledgement for a request the application has nothing to say about
    pub fn build_empty_ack(req: &CoapMessage) -> CoapMessage {
        let mut ack = CoapMessage::new();
        ack.kind = MessageKind::Acknowledgement;
        ack.message_id = req.message_id;
        ack
    }

    pub fn build_rst_for(req: &CoapMessage) -> CoapMessage {
        Self::build_rst_for_id(req.message_id)
    }

    /// Reset from a bare message id - for rejecting datagrams where parsing
    ///  failed after the header was decoded (e.g. a version mismatch)
    pub fn build_rst_for_id(message_id: u16) -> CoapMessage {
        let mut rst = CoapMessage::new();
        rst.kind = MessageKind::Reset;
        rst.message_id = message_id;
        rst
    }
}


#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_new_message_defaults() {
        let msg = CoapMessage::new();
        assert_eq!(msg.version, PROTOCOL_VERSION);
        assert_eq!(msg.kind, MessageKind::Confirmable);
        assert_eq!(msg.code, code::EMPTY);
        assert_eq!(msg.message_id, 0);
        assert!(msg.token.is_empty());
        assert!(msg.options.is_empty());
        assert!(msg.payload.is_none());
    }

    #[rstest]
    #[case::ascending(vec![(1, b"a".to_vec()), (4, b"b".to_vec()), (11, b"c".to_vec())])]
    #[case::descending(vec![(11, b"a".to_vec()), (4, b"b".to_vec()), (1, b"c".to_vec())])]
    #[case::interleaved(vec![(4, b"a".to_vec()), (11, b"b".to_vec()), (1, b"c".to_vec()), (7, b"d".to_vec())])]
    #[case::duplicates(vec![(11, b"a".to_vec()), (11, b"b".to_vec()), (4, b"c".to_vec())])]
    fn test_add_option_keeps_ascending_order(#[case] insertions: Vec<(u16, Vec<u8>)>) {
        let mut msg = CoapMessage::new();
        for (number, value) in insertions {
            msg.add_option(number, &value).unwrap();
        }

        let numbers = msg.options.iter().map(|opt| opt.number).collect::<Vec<_>>();
        let mut sorted = numbers.clone();
        sorted.sort();
        assert_eq!(numbers, sorted);
    }

    #[test]
    fn test_add_option_same_number_keeps_insertion_order() {
        let mut msg = CoapMessage::new();
        msg.add_option(OPTION_URI_PATH, b"sensor").unwrap();
        msg.add_option(OPTION_URI_PATH, b"1").unwrap();

        assert_eq!(msg.options[0].value, b"sensor");
        assert_eq!(msg.options[1].value, b"1");
        assert_eq!(msg.uri_path(), Some("sensor/1".to_string()));
    }

    #[test]
    fn test_add_option_rejects_oversize_value() {
        let mut msg = CoapMessage::new();
        let result = msg.add_option(11, &[0u8; 15]);
        assert_eq!(result, Err(CodecError::OptionOversize { len: 15 }));
        assert!(msg.options.is_empty());

        msg.add_option(11, &[0u8; 14]).unwrap();
        assert_eq!(msg.options.len(), 1);
    }

    #[test]
    fn test_uri_path_without_options() {
        let mut msg = CoapMessage::new();
        assert_eq!(msg.uri_path(), None);

        msg.add_option(4, b"etag").unwrap();
        assert_eq!(msg.uri_path(), None);
    }

    #[rstest]
    #[case::ack(CoapMessage::build_empty_ack(&req(0x1234)), MessageKind::Acknowledgement)]
    #[case::rst(CoapMessage::build_rst_for(&req(0x1234)), MessageKind::Reset)]
    fn test_empty_reply_constructors(#[case] reply: CoapMessage, #[case] expected_kind: MessageKind) {
        assert_eq!(reply.kind, expected_kind);
        assert_eq!(reply.code, code::EMPTY);
        assert_eq!(reply.message_id, 0x1234);
        assert!(reply.token.is_empty());
        assert!(reply.options.is_empty());
        assert!(reply.payload.is_none());
    }

    fn req(message_id: u16) -> CoapMessage {
        let mut req = CoapMessage::new();
        req.message_id = message_id;
        req.token = vec![0xAA, 0xBB];
        req
    }
}
