//! A constrained machine-to-machine messaging core over UDP, modelled on CoAP
//!  (RFC 7252) but intentionally smaller: options are limited to the 4-bit
//!  delta/length nibble encoding, and there is no block-wise transfer, observe
//!  or DTLS.
//!
//! The crate is built from three pieces:
//! * [codec] - the in-memory message model and its bidirectional wire transform
//! * [exchange] - the per-exchange reliability rules: what a responder owes in
//!    reply, and how an initiator retransmits confirmable messages
//! * [dispatcher] - a concurrent UDP server that runs one isolated worker task
//!    per received datagram, calling out to a [store::RecordStore] collaborator
//!
//! [client] is the initiator-side counterpart to the dispatcher, driving the
//!  retransmission schedule over its own socket.

pub mod client;
pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod exchange;
pub mod store;


#[cfg(test)]
mod test {
    use tracing::Level;

    #[ctor::ctor]
    fn init_test_logging() {
        tracing_subscriber::fmt()
            .with_max_level(Level::TRACE)
            .try_init()
            .ok();
    }
}
