//! Message transport for remote dispatch.
//!
//! [`Transport`] is the only thing the dispatch adapter needs: send a
//! request, block until the reply arrives. [`MailboxRouter`] is the
//! in-process implementation: providers bind a mailbox and answer requests
//! from their own thread.
//!
//! # Blocking
//!
//! `request` blocks the calling thread. Call it from plain threads or
//! `spawn_blocking`, never from inside an async task.

use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{trace, warn};
use urs_types::MailboxId;

use crate::config::UrsConfig;
use crate::wire::{Reply, Request, WireError};

/// Message delivery failure, as opposed to a provider refusing.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no mailbox bound at {0}")]
    NoMailbox(MailboxId),

    #[error("mailbox {0} is already bound")]
    AlreadyBound(MailboxId),

    #[error("{0} went away before replying")]
    Disconnected(MailboxId),

    #[error("no reply from {mailbox} within {timeout:?}")]
    Timeout {
        mailbox: MailboxId,
        timeout: Duration,
    },

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error("transport runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

/// Blocking request/reply exchange.
pub trait Transport: Send + Sync {
    fn request(&self, request: Request) -> Result<Reply, TransportError>;
}

struct Envelope {
    bytes: Vec<u8>,
    reply_to: oneshot::Sender<Vec<u8>>,
}

/// In-process mailbox fabric.
pub struct MailboxRouter {
    boxes: DashMap<MailboxId, mpsc::UnboundedSender<Envelope>>,
    /// Timer runtime and deadline, when replies are bounded.
    deadline: Option<(tokio::runtime::Runtime, Duration)>,
}

impl std::fmt::Debug for MailboxRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailboxRouter")
            .field("mailboxes", &self.boxes.len())
            .field("timeout", &self.deadline.as_ref().map(|(_, d)| *d))
            .finish()
    }
}

impl Default for MailboxRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl MailboxRouter {
    /// A router whose requests wait for replies indefinitely.
    pub fn new() -> Self {
        Self {
            boxes: DashMap::new(),
            deadline: None,
        }
    }

    /// A router whose requests give up after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        Ok(Self {
            boxes: DashMap::new(),
            deadline: Some((runtime, timeout)),
        })
    }

    /// Build from the service config's remote deadline.
    pub fn from_config(config: &UrsConfig) -> Result<Self, TransportError> {
        match config.remote_timeout() {
            Some(timeout) => Self::with_timeout(timeout),
            None => Ok(Self::new()),
        }
    }

    /// Claim `id` and return its receiving end.
    pub fn bind(&self, id: MailboxId) -> Result<Mailbox, TransportError> {
        use dashmap::mapref::entry::Entry;

        match self.boxes.entry(id) {
            Entry::Occupied(mut occupied) => {
                // A mailbox whose receiver is gone can be rebound.
                if !occupied.get().is_closed() {
                    return Err(TransportError::AlreadyBound(id));
                }
                let (tx, rx) = mpsc::unbounded_channel();
                occupied.insert(tx);
                Ok(Mailbox { id, rx })
            }
            Entry::Vacant(vacant) => {
                let (tx, rx) = mpsc::unbounded_channel();
                vacant.insert(tx);
                Ok(Mailbox { id, rx })
            }
        }
    }

    /// Forget a mailbox. Pending requests see `Disconnected`.
    pub fn unbind(&self, id: MailboxId) -> bool {
        self.boxes.remove(&id).is_some()
    }

    fn wait(
        &self,
        mailbox: MailboxId,
        reply_rx: oneshot::Receiver<Vec<u8>>,
    ) -> Result<Vec<u8>, TransportError> {
        match &self.deadline {
            Some((runtime, timeout)) => {
                match runtime.block_on(tokio::time::timeout(*timeout, reply_rx)) {
                    Ok(Ok(bytes)) => Ok(bytes),
                    Ok(Err(_)) => Err(TransportError::Disconnected(mailbox)),
                    Err(_) => {
                        warn!(%mailbox, ?timeout, "remote reply deadline expired");
                        Err(TransportError::Timeout {
                            mailbox,
                            timeout: *timeout,
                        })
                    }
                }
            }
            None => reply_rx
                .blocking_recv()
                .map_err(|_| TransportError::Disconnected(mailbox)),
        }
    }
}

impl Transport for MailboxRouter {
    fn request(&self, request: Request) -> Result<Reply, TransportError> {
        let mailbox = request.mailbox;
        let bytes = request.encode()?;
        let (reply_to, reply_rx) = oneshot::channel();

        trace!(%mailbox, opcode = request.opcode, func = request.func, len = bytes.len(), "send");
        {
            let tx = self
                .boxes
                .get(&mailbox)
                .ok_or(TransportError::NoMailbox(mailbox))?;
            tx.send(Envelope { bytes, reply_to })
                .map_err(|_| TransportError::Disconnected(mailbox))?;
        }

        let bytes = self.wait(mailbox, reply_rx)?;
        Ok(Reply::decode(&bytes)?)
    }
}

/// Receiving end of a bound mailbox.
pub struct Mailbox {
    id: MailboxId,
    rx: mpsc::UnboundedReceiver<Envelope>,
}

impl Mailbox {
    pub fn id(&self) -> MailboxId {
        self.id
    }

    /// Block until the next request. `None` once the router forgot this
    /// mailbox and every queued request has been taken.
    pub fn recv(&mut self) -> Option<Incoming> {
        self.rx.blocking_recv().map(|envelope| Incoming {
            bytes: envelope.bytes,
            reply_to: envelope.reply_to,
        })
    }
}

/// A request waiting for its reply.
///
/// Dropping it without replying makes the requester see `Disconnected`.
pub struct Incoming {
    bytes: Vec<u8>,
    reply_to: oneshot::Sender<Vec<u8>>,
}

impl Incoming {
    pub fn request(&self) -> Result<Request, WireError> {
        Request::decode(&self.bytes)
    }

    /// Send the reply. A requester that already gave up is not an error.
    pub fn reply(self, reply: &Reply) -> Result<(), WireError> {
        let bytes = reply.encode()?;
        let _ = self.reply_to.send(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::RemoteTarget;
    use urs_types::{DispatchId, OpKind, Status, SuperId};

    fn request(mailbox: u64) -> Request {
        Request::for_op(
            &RemoteTarget::new(MailboxId(mailbox), 1, 0),
            OpKind::Release,
            SuperId::new(0, 0),
            DispatchId(1),
        )
    }

    #[test]
    fn test_round_trip_through_mailbox() {
        let router = MailboxRouter::new();
        let mut mailbox = router.bind(MailboxId(1)).unwrap();

        let server = std::thread::spawn(move || {
            let incoming = mailbox.recv().unwrap();
            let req = incoming.request().unwrap();
            let (header, _) = req.open().unwrap();
            assert_eq!(header.op, OpKind::Release);
            incoming.reply(&Reply::new().status(Status::OK)).unwrap();
        });

        let reply = router.request(request(1)).unwrap();
        assert_eq!(reply.result().unwrap(), Status::OK);
        server.join().unwrap();
    }

    #[test]
    fn test_unbound_mailbox() {
        let router = MailboxRouter::new();
        let err = router.request(request(8)).unwrap_err();
        assert!(matches!(err, TransportError::NoMailbox(MailboxId(8))));
    }

    #[test]
    fn test_double_bind_rejected_until_receiver_dropped() {
        let router = MailboxRouter::new();
        let first = router.bind(MailboxId(2)).unwrap();
        assert!(matches!(
            router.bind(MailboxId(2)),
            Err(TransportError::AlreadyBound(_))
        ));
        drop(first);
        assert!(router.bind(MailboxId(2)).is_ok());
    }

    #[test]
    fn test_dropped_request_disconnects() {
        let router = MailboxRouter::new();
        let mut mailbox = router.bind(MailboxId(3)).unwrap();
        let server = std::thread::spawn(move || {
            let incoming = mailbox.recv().unwrap();
            drop(incoming);
        });
        let err = router.request(request(3)).unwrap_err();
        assert!(matches!(err, TransportError::Disconnected(MailboxId(3))));
        server.join().unwrap();
    }

    #[test]
    fn test_deadline_expires() {
        let router = MailboxRouter::with_timeout(Duration::from_millis(20)).unwrap();
        // Bound but never serviced.
        let _mailbox = router.bind(MailboxId(4)).unwrap();
        let err = router.request(request(4)).unwrap_err();
        assert!(matches!(err, TransportError::Timeout { .. }));
    }

    #[test]
    fn test_from_config_respects_timeout() {
        let config = UrsConfig::default().with_remote_timeout(Duration::from_millis(5));
        let router = MailboxRouter::from_config(&config).unwrap();
        assert!(router.deadline.is_some());
        assert!(MailboxRouter::from_config(&UrsConfig::default())
            .unwrap()
            .deadline
            .is_none());
    }
}
