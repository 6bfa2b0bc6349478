//! Per-exchange reliability rules. An *exchange* is one request/reply pairing
//!  correlated by message id.
//!
//! The responder side is a pure decision: given the kind of an inbound message,
//!  what (if anything) does the protocol owe in reply. The initiator side is a
//!  retransmission schedule with doubling waits plus the correlation rule that
//!  advances an outstanding exchange when a reply arrives.

use std::time::Duration;

use crate::codec::message::{CoapMessage, MessageKind};

/// What the protocol owes in reply to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyObligation {
    /// a confirmable request: exactly one reply, echoing message id and token
    Respond,
    /// a non-confirmable request: processed, but no reply bytes are owed
    Silent,
    /// an Acknowledgement or Reset received in the requester role is a protocol
    ///  violation, answered with a Reset echoing its message id
    Reject,
}

pub fn reply_obligation(kind: MessageKind) -> ReplyObligation {
    match kind {
        MessageKind::Confirmable => ReplyObligation::Respond,
        MessageKind::NonConfirmable => ReplyObligation::Silent,
        MessageKind::Acknowledgement | MessageKind::Reset => ReplyObligation::Reject,
    }
}

/// States of an initiator's outstanding exchange. `Acked`, `Reset` and
///  `TimedOut` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    AwaitingSend,
    AwaitingAck,
    Acked,
    Reset,
    TimedOut,
}

/// Applies one received reply to an exchange awaiting its ack. Returns the new
///  state, or None if the reply does not touch this exchange (wrong message id,
///  or a kind that is not a reply) - in that case the retransmission timer
///  keeps running.
pub fn on_reply(outstanding_id: u16, reply: &CoapMessage) -> Option<ExchangeState> {
    if reply.message_id != outstanding_id {
        return None;
    }
    match reply.kind {
        MessageKind::Acknowledgement => Some(ExchangeState::Acked),
        MessageKind::Reset => Some(ExchangeState::Reset),
        _ => None,
    }
}

/// Terminal result of a confirmable exchange as reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// the peer acknowledged; the full response (payload included, if any) is
    ///  delivered to the caller
    Acked { response: CoapMessage },
    /// explicit peer rejection - terminal, never retried
    Reset,
    /// all send attempts exhausted without a correlated reply
    TimedOut,
}

/// Fixed exponential backoff: the same bytes are resent after a wait that
///  doubles per attempt, up to a fixed number of attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetransmitSchedule {
    pub initial_wait: Duration,
    pub max_attempts: u32,
}

impl RetransmitSchedule {
    /// The wait after send attempt `attempt` (0-based) before the next
    ///  retransmission, or None once the attempts are exhausted - at which
    ///  point the exchange is [ExchangeState::TimedOut].
    pub fn wait_after_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        Some(self.initial_wait * 2u32.saturating_pow(attempt))
    }
}


#[cfg(test)]
mod tests {
    use rstest::rstest;

    use crate::codec::message::code;

    use super::*;

    #[rstest]
    #[case::con(MessageKind::Confirmable, ReplyObligation::Respond)]
    #[case::non(MessageKind::NonConfirmable, ReplyObligation::Silent)]
    #[case::ack(MessageKind::Acknowledgement, ReplyObligation::Reject)]
    #[case::rst(MessageKind::Reset, ReplyObligation::Reject)]
    fn test_reply_obligation(#[case] kind: MessageKind, #[case] expected: ReplyObligation) {
        assert_eq!(reply_obligation(kind), expected);
    }

    #[rstest]
    #[case::correlated_ack(0x1234, MessageKind::Acknowledgement, Some(ExchangeState::Acked))]
    #[case::correlated_rst(0x1234, MessageKind::Reset, Some(ExchangeState::Reset))]
    #[case::wrong_message_id(0x9999, MessageKind::Acknowledgement, None)]
    #[case::con_is_not_a_reply(0x1234, MessageKind::Confirmable, None)]
    #[case::non_is_not_a_reply(0x1234, MessageKind::NonConfirmable, None)]
    fn test_on_reply(#[case] reply_id: u16, #[case] kind: MessageKind, #[case] expected: Option<ExchangeState>) {
        let mut reply = CoapMessage::new();
        reply.kind = kind;
        reply.code = code::CONTENT;
        reply.message_id = reply_id;

        assert_eq!(on_reply(0x1234, &reply), expected);
    }

    #[test]
    fn test_schedule_doubles_then_exhausts() {
        let schedule = RetransmitSchedule {
            initial_wait: Duration::from_millis(2000),
            max_attempts: 4,
        };

        let waits = (0..4)
            .map(|attempt| schedule.wait_after_attempt(attempt).unwrap().as_millis())
            .collect::<Vec<_>>();
        assert_eq!(waits, vec![2000, 4000, 8000, 16000]);

        assert_eq!(schedule.wait_after_attempt(4), None);
    }

    #[test]
    fn test_schedule_single_attempt() {
        let schedule = RetransmitSchedule {
            initial_wait: Duration::from_millis(500),
            max_attempts: 1,
        };

        assert_eq!(schedule.wait_after_attempt(0), Some(Duration::from_millis(500)));
        assert_eq!(schedule.wait_after_attempt(1), None);
    }
}
