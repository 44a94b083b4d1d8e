//! Provider side of message-routed dispatch.
//!
//! [`serve`] drains a bound mailbox, decodes each request with the layout
//! `crate::dispatch` encodes, calls the [`Provider`] and sends the reply.
//! Requests that do not decode are answered with `Status::INVALID`.

use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{debug, trace, warn};
use urs_types::{CreateKind, DispatchId, OpKind, ProcessId, SeekFrom, Status};

use crate::dispatch::MAX_TRANSFER;
use crate::provider::{CreateArgs, Provider};
use crate::transport::Mailbox;
use crate::wire::{Reply, Request, WireError};

/// Answer requests until the mailbox is unbound.
pub fn serve(mut mailbox: Mailbox, provider: Arc<dyn Provider>) {
    let id = mailbox.id();
    debug!(mailbox = %id, "provider serving");

    while let Some(incoming) = mailbox.recv() {
        let reply = match incoming.request() {
            Ok(request) => handle(provider.as_ref(), &request),
            Err(err) => {
                warn!(mailbox = %id, error = %err, "undecodable request");
                Reply::failure(Status::INVALID)
            }
        };
        if let Err(err) = incoming.reply(&reply) {
            warn!(mailbox = %id, error = %err, "failed to encode reply");
        }
    }

    debug!(mailbox = %id, "provider mailbox closed");
}

/// Run [`serve`] on its own named thread.
pub fn spawn(mailbox: Mailbox, provider: Arc<dyn Provider>) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name(format!("urs-{}", mailbox.id()))
        .spawn(move || serve(mailbox, provider))
}

/// Decode one request, call the provider, encode the reply.
pub fn handle(provider: &dyn Provider, request: &Request) -> Reply {
    match answer(provider, request) {
        Ok(Ok(reply)) => reply,
        Ok(Err(status)) => Reply::failure(status),
        Err(err) => {
            warn!(opcode = request.opcode, func = request.func, error = %err, "malformed request");
            Reply::failure(Status::INVALID)
        }
    }
}

fn answer(provider: &dyn Provider, request: &Request) -> Result<Result<Reply, Status>, WireError> {
    let (header, mut params) = request.open()?;
    let (sup, id) = (header.sup, header.id);
    trace!(op = %header.op, %sup, ?id, "serving");

    match header.op {
        OpKind::Lookup => {
            let process = ProcessId(params.value()?);
            let name = params.str()?;
            let cap = usize::try_from(params.value()?).unwrap_or(usize::MAX);
            match provider.lookup(sup, id, process, name) {
                Ok(found) => {
                    let is_link = u64::from(found.link.is_some());
                    let link = found.link.unwrap_or_default();
                    let bytes = link.as_bytes();
                    // The full length travels even when the bytes do not fit,
                    // so the requester can tell a truncated target apart.
                    ok(Reply::new()
                        .value(is_link)
                        .value(found.node.0)
                        .buffer(&bytes[..bytes.len().min(cap)])
                        .value(bytes.len() as u64))
                }
                Err(status) => Ok(Err(status)),
            }
        }
        OpKind::Open => {
            let process = ProcessId(params.value()?);
            match provider.open(sup, id, process) {
                Ok(open) => ok(Reply::new().value(open.0)),
                Err(status) => Ok(Err(status)),
            }
        }
        OpKind::Release => Ok(provider.release(sup, id).map(|()| Reply::new().status(Status::OK))),
        OpKind::Read | OpKind::List => {
            let count = usize::try_from(params.value()?)
                .unwrap_or(usize::MAX)
                .min(MAX_TRANSFER);
            let mut buf = vec![0u8; count];
            let result = if header.op == OpKind::List {
                provider.list(sup, id, &mut buf)
            } else {
                provider.read(sup, id, &mut buf)
            };
            match result {
                Ok(n) => {
                    buf.truncate(n.min(count));
                    let size = buf.len() as u64;
                    ok(Reply::new().buffer(buf).value(size))
                }
                Err(status) => Ok(Err(status)),
            }
        }
        OpKind::Write => {
            let data = params.buffer()?;
            let count = usize::try_from(params.value()?).unwrap_or(usize::MAX);
            let data = &data[..data.len().min(count)];
            match provider.write(sup, id, data) {
                Ok(actual) => ok(Reply::new().value(actual as u64)),
                Err(status) => Ok(Err(status)),
            }
        }
        OpKind::Truncate => Ok(provider.truncate(sup, id).map(|()| Reply::new().status(Status::OK))),
        OpKind::SeekData | OpKind::SeekList => {
            let offset = params.value()?;
            let from = SeekFrom::try_from(params.value()?)?;
            let result = if header.op == OpKind::SeekList {
                provider.seek_list(sup, id, offset, from)
            } else {
                provider.seek_data(sup, id, offset, from)
            };
            match result {
                Ok(pos) => ok(Reply::new().value(pos)),
                Err(status) => Ok(Err(status)),
            }
        }
        OpKind::Create => {
            let name = params.str()?;
            let kind = CreateKind::try_from(params.value()?)?;
            let flags = u32::try_from(params.value()?).map_err(|_| WireError::TypeMismatch {
                index: 6,
                expected: "32-bit flags",
            })?;
            let target = params.str()?;
            let target_id = DispatchId(params.value()?);
            let args = CreateArgs {
                name,
                kind,
                flags,
                target,
                target_id,
            };
            Ok(provider
                .create(sup, id, &args)
                .map(|()| Reply::new().status(Status::OK)))
        }
        OpKind::Remove => {
            let erase = params.value()? != 0;
            Ok(provider
                .remove(sup, id, erase)
                .map(|()| Reply::new().status(Status::OK)))
        }
        OpKind::Rename => {
            let name = params.str()?;
            Ok(provider
                .rename(sup, id, name)
                .map(|()| Reply::new().status(Status::OK)))
        }
        OpKind::Stat => match provider.stat(sup, id) {
            Ok(stat) => ok(Reply::new().buffer(postcard::to_stdvec(&stat)?)),
            Err(status) => Ok(Err(status)),
        },
    }
}

fn ok(reply: Reply) -> Result<Result<Reply, Status>, WireError> {
    Ok(Ok(reply.status(Status::OK)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::RemoteTarget;
    use crate::provider::LookupReply;
    use urs_types::{MailboxId, ProviderResult, Stat, SuperId};

    struct Fixed;

    impl Provider for Fixed {
        fn lookup(&self, _: SuperId, _: DispatchId, _: ProcessId, name: &str) -> ProviderResult<LookupReply> {
            match name {
                "link" => Ok(LookupReply::link(DispatchId(3), "/elsewhere")),
                "file" => Ok(LookupReply::node(DispatchId(2))),
                _ => Err(Status::NOT_FOUND),
            }
        }

        fn read(&self, _: SuperId, _: DispatchId, buf: &mut [u8]) -> ProviderResult<usize> {
            let data = b"abcdef";
            let n = buf.len().min(data.len());
            buf[..n].copy_from_slice(&data[..n]);
            Ok(n)
        }

        fn stat(&self, _: SuperId, _: DispatchId) -> ProviderResult<Stat> {
            Ok(Stat::file(6, 0o644))
        }
    }

    fn request(op: OpKind) -> Request {
        Request::for_op(
            &RemoteTarget::new(MailboxId(1), 0, op.index() as u32),
            op,
            SuperId::new(0, 0),
            DispatchId(1),
        )
    }

    #[test]
    fn test_lookup_reports_link() {
        let reply = handle(
            &Fixed,
            &request(OpKind::Lookup).value(7).buffer("link").value(128),
        );
        assert_eq!(reply.result().unwrap(), Status::OK);
        let mut out = reply.outputs();
        assert_eq!(out.value().unwrap(), 1);
        assert_eq!(out.value().unwrap(), 3);
        assert_eq!(out.buffer().unwrap(), b"/elsewhere");
        assert_eq!(out.value().unwrap(), 10);
    }

    #[test]
    fn test_lookup_truncates_link_to_capacity() {
        let reply = handle(
            &Fixed,
            &request(OpKind::Lookup).value(7).buffer("link").value(4),
        );
        let mut out = reply.outputs();
        out.value().unwrap();
        out.value().unwrap();
        assert_eq!(out.buffer().unwrap(), b"/els");
        assert_eq!(out.value().unwrap(), 10);
    }

    #[test]
    fn test_provider_status_becomes_failure_reply() {
        let reply = handle(
            &Fixed,
            &request(OpKind::Lookup).value(7).buffer("nope").value(128),
        );
        assert_eq!(reply.result().unwrap(), Status::NOT_FOUND);
        assert_eq!(reply.params.len(), 1);
    }

    #[test]
    fn test_read_respects_count() {
        let reply = handle(&Fixed, &request(OpKind::Read).value(4));
        let mut out = reply.outputs();
        assert_eq!(out.buffer().unwrap(), b"abcd");
        assert_eq!(out.value().unwrap(), 4);
    }

    #[test]
    fn test_unsupported_op_answers_not_supported() {
        let reply = handle(&Fixed, &request(OpKind::Rename).buffer("x"));
        assert_eq!(reply.result().unwrap(), Status::NOT_SUPPORTED);
    }

    #[test]
    fn test_stat_is_postcard_encoded() {
        let reply = handle(&Fixed, &request(OpKind::Stat));
        let bytes = reply.outputs().buffer().unwrap().to_vec();
        let stat: Stat = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(stat, Stat::file(6, 0o644));
    }

    #[test]
    fn test_malformed_request_is_invalid() {
        // Missing the count parameter.
        let reply = handle(&Fixed, &request(OpKind::Read));
        assert_eq!(reply.result().unwrap(), Status::INVALID);

        let reply = handle(&Fixed, &request(OpKind::SeekData).value(0).value(9));
        assert_eq!(reply.result().unwrap(), Status::INVALID);
    }
}
