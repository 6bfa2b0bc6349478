//! Initiator side of an exchange: sends a confirmable message and drives the
//!  retransmission schedule until a correlated reply arrives or the attempts
//!  are exhausted.

use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tokio::time;
use tracing::{debug, trace, warn};

use crate::codec::message::CoapMessage;
use crate::codec::wire;
use crate::config::ExchangeConfig;
use crate::exchange::{on_reply, ExchangeOutcome, ExchangeState};

pub struct CoapClient {
    socket: UdpSocket,
    peer: SocketAddr,
    config: ExchangeConfig,
}

impl CoapClient {
    pub async fn bind(peer: SocketAddr, config: ExchangeConfig) -> anyhow::Result<CoapClient> {
        config.validate()?;

        let bind_addr = if peer.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr).await?;

        Ok(CoapClient {
            socket,
            peer,
            config,
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn random_message_id() -> u16 {
        rand::random()
    }

    /// Sends a confirmable message and waits for the correlated reply,
    ///  retransmitting the same serialized bytes with doubling waits. A reply
    ///  correlates only by exact message id match; everything else is ignored
    ///  without affecting the running timer. Returns the terminal outcome - a
    ///  transport error is the only way this fails with Err.
    pub async fn send_confirmable(&self, msg: &CoapMessage) -> anyhow::Result<ExchangeOutcome> {
        let out = wire::to_bytes(msg)?;
        let schedule = self.config.schedule();

        let mut attempt = 0;
        while let Some(wait) = schedule.wait_after_attempt(attempt) {
            trace!("attempt {}: sending {} bytes to {:?}", attempt, out.len(), self.peer);
            self.socket.send_to(&out, self.peer).await?;

            let deadline = time::Instant::now() + wait;
            loop {
                let mut buf = [0u8; 1500];
                let (len, from) = match time::timeout_at(deadline, self.socket.recv_from(&mut buf)).await {
                    Ok(r) => r?,
                    Err(_) => break, // retransmission timer expired
                };

                if from != self.peer {
                    debug!("reply from unexpected peer {:?} - ignoring", from);
                    continue;
                }

                let reply = match wire::parse(&buf[..len]) {
                    Ok(reply) => reply,
                    Err(e) => {
                        debug!("unparseable reply - ignoring: {}", e);
                        continue;
                    }
                };

                match on_reply(msg.message_id, &reply) {
                    Some(ExchangeState::Acked) => {
                        trace!("exchange {:#06x} acknowledged", msg.message_id);
                        return Ok(ExchangeOutcome::Acked { response: reply });
                    }
                    Some(ExchangeState::Reset) => {
                        debug!("peer rejected exchange {:#06x} with Reset", msg.message_id);
                        return Ok(ExchangeOutcome::Reset);
                    }
                    _ => {
                        trace!("uncorrelated reply (mid {:#06x}) - ignoring", reply.message_id);
                    }
                }
            }

            attempt += 1;
        }

        warn!("no reply for exchange {:#06x} after {} attempts", msg.message_id, schedule.max_attempts);
        Ok(ExchangeOutcome::TimedOut)
    }

    /// fire and forget: one send, no reply is ever owed
    pub async fn send_nonconfirmable(&self, msg: &CoapMessage) -> anyhow::Result<()> {
        let out = wire::to_bytes(msg)?;
        self.socket.send_to(&out, self.peer).await?;
        Ok(())
    }
}
