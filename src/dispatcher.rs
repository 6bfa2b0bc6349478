//! The concurrent dispatcher: a single receive loop on one UDP socket, with one
//!  spawned worker task per datagram so a slow collaborator call cannot stall
//!  receipt of subsequent datagrams. Workers share nothing but the socket
//!  handle; each datagram's bytes, parsed message and reply are owned by its
//!  worker alone.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

use crate::codec::error::CodecError;
use crate::codec::message::{code, CoapMessage, MessageKind};
use crate::codec::wire;
use crate::config::ServerConfig;
use crate::exchange::{reply_obligation, ReplyObligation};
use crate::store::RecordStore;

pub struct UdpServer {
    socket: Arc<UdpSocket>,
    store: Arc<dyn RecordStore>,
    config: ServerConfig,
    cancel_sender: broadcast::Sender<()>,
}

impl UdpServer {
    pub async fn bind(config: ServerConfig, store: Arc<dyn RecordStore>) -> anyhow::Result<UdpServer> {
        config.validate()?;

        let socket = Arc::new(UdpSocket::bind(config.bind_addr).await?);
        info!("bound server socket to {:?}", socket.local_addr()?);

        let (cancel_sender, _) = broadcast::channel(1);

        Ok(UdpServer {
            socket,
            store,
            config,
            cancel_sender,
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Blocks on the socket, reading one datagram at a time and spawning an
    ///  isolated worker task for each. Receive errors are logged and the loop
    ///  continues; only cancellation ends it.
    pub async fn recv_loop(&self) -> anyhow::Result<()> {
        info!("starting receive loop");

        let mut buf = vec![0u8; self.config.recv_buffer_size];
        let mut cancel_receiver = self.cancel_sender.subscribe();

        loop {
            tokio::select! {
                r = self.socket.recv_from(&mut buf) => {
                    match r {
                        Ok((len, from)) => {
                            let worker = DatagramWorker {
                                socket: self.socket.clone(),
                                store: self.store.clone(),
                            };
                            let datagram = buf[..len].to_vec();
                            tokio::spawn(async move {
                                worker.handle_datagram(&datagram, from).await;
                            });
                        }
                        Err(e) => {
                            error!("error receiving from datagram socket: {}", e);
                        }
                    }
                }
                _ = cancel_receiver.recv() => break,
            }
        }

        info!("shutting down receive loop");
        Ok(())
    }

    pub fn cancel_recv_loop(&self) {
        if let Err(err) = self.cancel_sender.send(()) {
            warn!(?err, "error cancelling receive loop");
        }
    }
}


struct DatagramWorker {
    socket: Arc<UdpSocket>,
    store: Arc<dyn RecordStore>,
}

impl DatagramWorker {
    async fn handle_datagram(&self, datagram: &[u8], from: SocketAddr) {
        trace!("received {} bytes from {:?}", datagram.len(), from);

        if let Some(reply) = dispatch(self.store.as_ref(), datagram).await {
            self.send_reply(&reply, from).await;
        }
    }

    async fn send_reply(&self, reply: &CoapMessage, to: SocketAddr) {
        match wire::to_bytes(reply) {
            Ok(out) => {
                trace!("sending {} reply bytes to {:?}", out.len(), to);
                if let Err(e) = self.socket.send_to(&out, to).await {
                    error!("error sending reply to {:?}: {}", to, e);
                }
            }
            Err(e) => {
                error!("error serializing reply for {:?}: {}", to, e);
            }
        }
    }
}

/// Parses one datagram and works out the owed reply, if any. Pure protocol and
///  collaborator logic, kept free of socket handling so it can be tested with a
///  mocked store.
pub(crate) async fn dispatch(store: &dyn RecordStore, datagram: &[u8]) -> Option<CoapMessage> {
    let req = match wire::parse(datagram) {
        Ok(req) => req,
        Err(CodecError::VersionMismatch { version, message_id }) => {
            debug!("unsupported version {} - answering with Reset", version);
            return Some(CoapMessage::build_rst_for_id(message_id));
        }
        Err(e) => {
            // majority behavior of the historical variants: other parse errors
            //  are dropped without a reply
            debug!("dropping unparseable datagram: {}", e);
            return None;
        }
    };

    match reply_obligation(req.kind) {
        ReplyObligation::Respond => Some(respond(store, &req).await),
        ReplyObligation::Silent => {
            // the method still runs for its side effects; the result is discarded
            if let Err(e) = apply_method(store, &req).await {
                debug!("record store failure on non-confirmable request: {}", e);
            }
            None
        }
        ReplyObligation::Reject => {
            warn!("received unsolicited {:?} (mid {:#06x}) - answering with Reset", req.kind, req.message_id);
            Some(CoapMessage::build_rst_for(&req))
        }
    }
}

/// the application's real response to a confirmable request: message id and
///  token echoed, code and payload from the record store call
async fn respond(store: &dyn RecordStore, req: &CoapMessage) -> CoapMessage {
    let mut resp = CoapMessage::new();
    resp.kind = MessageKind::Acknowledgement;
    resp.message_id = req.message_id;
    resp.token = req.token.clone();

    match apply_method(store, req).await {
        Ok((code, payload)) => {
            resp.code = code;
            resp.payload = payload;
        }
        Err(e) => {
            // collaborator failures become a response code, never a protocol fault
            error!("record store failure for mid {:#06x}: {}", req.message_id, e);
            resp.code = code::INTERNAL_ERROR;
        }
    }

    debug!("mid {:#06x} code {:#04x} -> {:#04x}", req.message_id, req.code, resp.code);
    resp
}

/// Runs the request's method against the record store, returning the response
///  code and payload.
async fn apply_method(store: &dyn RecordStore, req: &CoapMessage) -> anyhow::Result<(u8, Option<Vec<u8>>)> {
    match req.code {
        code::GET => {
            match req.uri_path().as_deref().and_then(parse_record_id) {
                Some(id) => match store.get(id).await? {
                    Some(value) => Ok((code::CONTENT, Some(value.into_bytes()))),
                    None => Ok((code::NOT_FOUND, None)),
                },
                None => {
                    let listing = store.get_all().await?.iter()
                        .map(|(id, value)| format!("{{\"id\":{},\"value\":{:?}}}", id, value))
                        .collect::<Vec<_>>()
                        .join(",");
                    Ok((code::CONTENT, Some(format!("[{}]", listing).into_bytes())))
                }
            }
        }
        code::POST => {
            let Some(payload) = payload_str(req) else {
                return Ok((code::BAD_REQUEST, None));
            };

            // a leading "<id>=" or "<id> " makes this an explicit-id insert
            match split_id_and_value(payload) {
                Some((id, value)) => {
                    if store.insert_with_id(id, value).await? {
                        Ok((code::CREATED, Some(format!("{{\"id\":{}}}", id).into_bytes())))
                    }
                    else {
                        Ok((code::BAD_REQUEST, None))
                    }
                }
                None => {
                    let id = store.insert(payload).await?;
                    Ok((code::CREATED, Some(format!("{{\"id\":{}}}", id).into_bytes())))
                }
            }
        }
        code::PUT => {
            match payload_str(req).and_then(split_id_and_value) {
                Some((id, value)) if !value.is_empty() => {
                    if store.update(id, value).await? {
                        Ok((code::CHANGED, Some(format!("{{\"updated\":{}}}", id).into_bytes())))
                    }
                    else {
                        Ok((code::NOT_FOUND, None))
                    }
                }
                _ => Ok((code::BAD_REQUEST, None)),
            }
        }
        code::DELETE => {
            match payload_str(req).and_then(parse_record_id) {
                Some(id) => {
                    if store.delete(id).await? {
                        Ok((code::DELETED, Some(format!("{{\"deleted\":{}}}", id).into_bytes())))
                    }
                    else {
                        Ok((code::NOT_FOUND, None))
                    }
                }
                None => Ok((code::NOT_FOUND, None)),
            }
        }
        other => {
            debug!("unsupported method code {:#04x}", other);
            Ok((code::BAD_REQUEST, None))
        }
    }
}

fn payload_str(req: &CoapMessage) -> Option<&str> {
    let payload = req.payload.as_deref()?;
    if payload.is_empty() {
        return None;
    }
    std::str::from_utf8(payload).ok()
}

/// record ids are positive decimal numbers
fn parse_record_id(s: &str) -> Option<u32> {
    match s.trim().parse::<u32>() {
        Ok(id) if id > 0 => Some(id),
        _ => None,
    }
}

/// splits "<id>=<value>" or "<id> <value>" into its parts; None if the text
///  does not start with a numeric id
fn split_id_and_value(s: &str) -> Option<(u32, &str)> {
    let sep = s.find(['=', ' '])?;
    let id = parse_record_id(&s[..sep])?;
    Some((id, s[sep + 1..].trim_start()))
}
