//! Dispatch adapter: one entry point per operation kind.
//!
//! Each call reads the super's capability slot for the operation and either
//! invokes the provider in-process or marshals a request, blocks on the
//! reply, and unmarshals the outputs. The two branches of every operation
//! must stay mirror images of `crate::remote`, which decodes what this module
//! encodes.

use std::sync::Arc;

use tracing::{trace, warn};
use urs_types::{DispatchId, OpKind, ProcessId, ProviderResult, SeekFrom, Stat};

use crate::capability::{Capability, RemoteTarget};
use crate::error::{UrsError, UrsResult};
use crate::provider::{CreateArgs, LookupReply, Provider};
use crate::registry::Super;
use crate::transport::{Transport, TransportError};
use crate::wire::{Reply, Request, WireError};

impl From<WireError> for UrsError {
    fn from(err: WireError) -> Self {
        UrsError::InternalDispatch(format!("malformed reply: {err}"))
    }
}

enum Route<'a> {
    Local(&'a Arc<dyn Provider>),
    Remote(&'a RemoteTarget),
}

fn route(sup: &Super, op: OpKind) -> UrsResult<Route<'_>> {
    match sup.capabilities().get(op) {
        Capability::Unsupported => Err(UrsError::unsupported(op, sup.path())),
        Capability::Local(provider) => Ok(Route::Local(provider)),
        Capability::Remote(target) => Ok(Route::Remote(target)),
    }
}

fn local<T>(op: OpKind, result: ProviderResult<T>) -> UrsResult<T> {
    result.map_err(|status| UrsError::Provider { op, status })
}

/// Largest read or list a single dispatch transfers, on either branch.
pub const MAX_TRANSFER: usize = 1 << 20;

/// Copy a reply buffer out, never more than the caller asked for, the
/// caller's buffer holds, or the reply says it carries.
fn copy_out(buf: &mut [u8], data: &[u8], size: u64) -> usize {
    let size = usize::try_from(size).unwrap_or(usize::MAX);
    let n = buf.len().min(data.len()).min(size);
    buf[..n].copy_from_slice(&data[..n]);
    n
}

/// Routes logical operations to providers.
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    link_buffer_len: usize,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("link_buffer_len", &self.link_buffer_len)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>, link_buffer_len: usize) -> Self {
        Self {
            transport,
            link_buffer_len,
        }
    }

    pub fn link_buffer_len(&self) -> usize {
        self.link_buffer_len
    }

    /// Send a request and hand back a reply whose status was zero.
    fn exchange(
        &self,
        sup: &Super,
        op: OpKind,
        target: &RemoteTarget,
        id: DispatchId,
        fill: impl FnOnce(Request) -> Request,
    ) -> UrsResult<Reply> {
        let request = fill(Request::for_op(target, op, sup.id(), id));
        trace!(%op, sup = %sup.id(), mailbox = %target.mailbox, params = request.params.len(), "remote dispatch");

        let reply = self.transport.request(request).map_err(|err| match err {
            TransportError::Timeout { mailbox, .. } => {
                UrsError::ProviderUnresponsive { mailbox, op }
            }
            TransportError::Wire(wire) => UrsError::from(wire),
            other => {
                warn!(%op, mailbox = %target.mailbox, error = %other, "remote dispatch failed");
                UrsError::Transport(other)
            }
        })?;

        let status = reply.result()?;
        if !status.is_ok() {
            return Err(UrsError::Provider { op, status });
        }
        Ok(reply)
    }

    fn check_link(&self, link: Option<String>) -> UrsResult<Option<String>> {
        match link {
            Some(target) if target.len() > self.link_buffer_len => {
                Err(UrsError::NameTooLong(target.len()))
            }
            link => Ok(link),
        }
    }

    /// Resolve one component. `node` is `DispatchId::NONE` with name `/`
    /// for the provider root.
    pub fn lookup(
        &self,
        sup: &Super,
        node: DispatchId,
        process: ProcessId,
        name: &str,
    ) -> UrsResult<LookupReply> {
        let op = OpKind::Lookup;
        trace!(sup = %sup.id(), ?node, name, "lookup");
        match route(sup, op)? {
            Route::Local(provider) => {
                let reply = local(op, provider.lookup(sup.id(), node, process, name))?;
                Ok(LookupReply {
                    node: reply.node,
                    link: self.check_link(reply.link)?,
                })
            }
            Route::Remote(target) => {
                let reply = self.exchange(sup, op, target, node, |r| {
                    r.value(process.0)
                        .buffer(name.as_bytes())
                        .value(self.link_buffer_len as u64)
                })?;
                let mut out = reply.outputs();
                let is_link = out.value()? != 0;
                let next = DispatchId(out.value()?);
                let data = out.buffer()?;
                let link_len = out.value()?;

                if !is_link {
                    return Ok(LookupReply::node(next));
                }
                let len = usize::try_from(link_len).unwrap_or(usize::MAX);
                if len > self.link_buffer_len {
                    return Err(UrsError::NameTooLong(len));
                }
                let bytes = &data[..len.min(data.len())];
                let target = std::str::from_utf8(bytes)
                    .map_err(|_| UrsError::invalid_path(String::from_utf8_lossy(bytes)))?;
                Ok(LookupReply::link(next, target))
            }
        }
    }

    pub fn open(&self, sup: &Super, node: DispatchId, process: ProcessId) -> UrsResult<DispatchId> {
        let op = OpKind::Open;
        match route(sup, op)? {
            Route::Local(provider) => local(op, provider.open(sup.id(), node, process)),
            Route::Remote(target) => {
                let reply = self.exchange(sup, op, target, node, |r| r.value(process.0))?;
                Ok(DispatchId(reply.outputs().value()?))
            }
        }
    }

    pub fn release(&self, sup: &Super, open: DispatchId) -> UrsResult<()> {
        let op = OpKind::Release;
        match route(sup, op)? {
            Route::Local(provider) => local(op, provider.release(sup.id(), open)),
            Route::Remote(target) => self.exchange(sup, op, target, open, |r| r).map(drop),
        }
    }

    pub fn read(&self, sup: &Super, open: DispatchId, buf: &mut [u8]) -> UrsResult<usize> {
        self.read_like(OpKind::Read, sup, open, buf)
    }

    pub fn list(&self, sup: &Super, open: DispatchId, buf: &mut [u8]) -> UrsResult<usize> {
        self.read_like(OpKind::List, sup, open, buf)
    }

    fn read_like(
        &self,
        op: OpKind,
        sup: &Super,
        open: DispatchId,
        buf: &mut [u8],
    ) -> UrsResult<usize> {
        let cap = buf.len().min(MAX_TRANSFER);
        let buf = &mut buf[..cap];
        match route(sup, op)? {
            Route::Local(provider) => {
                let n = match op {
                    OpKind::List => local(op, provider.list(sup.id(), open, buf))?,
                    _ => local(op, provider.read(sup.id(), open, buf))?,
                };
                Ok(n.min(buf.len()))
            }
            Route::Remote(target) => {
                let reply =
                    self.exchange(sup, op, target, open, |r| r.value(buf.len() as u64))?;
                let mut out = reply.outputs();
                let data = out.buffer()?;
                let size = out.value()?;
                Ok(copy_out(buf, data, size))
            }
        }
    }

    pub fn write(&self, sup: &Super, open: DispatchId, data: &[u8]) -> UrsResult<usize> {
        let op = OpKind::Write;
        match route(sup, op)? {
            Route::Local(provider) => {
                local(op, provider.write(sup.id(), open, data)).map(|n| n.min(data.len()))
            }
            Route::Remote(target) => {
                let reply = self.exchange(sup, op, target, open, |r| {
                    r.buffer(data).value(data.len() as u64)
                })?;
                let actual = reply.outputs().value()?;
                Ok(usize::try_from(actual).unwrap_or(usize::MAX).min(data.len()))
            }
        }
    }

    pub fn truncate(&self, sup: &Super, open: DispatchId) -> UrsResult<()> {
        let op = OpKind::Truncate;
        match route(sup, op)? {
            Route::Local(provider) => local(op, provider.truncate(sup.id(), open)),
            Route::Remote(target) => self.exchange(sup, op, target, open, |r| r).map(drop),
        }
    }

    pub fn seek_data(
        &self,
        sup: &Super,
        open: DispatchId,
        offset: u64,
        from: SeekFrom,
    ) -> UrsResult<u64> {
        self.seek_like(OpKind::SeekData, sup, open, offset, from)
    }

    pub fn seek_list(
        &self,
        sup: &Super,
        open: DispatchId,
        offset: u64,
        from: SeekFrom,
    ) -> UrsResult<u64> {
        self.seek_like(OpKind::SeekList, sup, open, offset, from)
    }

    fn seek_like(
        &self,
        op: OpKind,
        sup: &Super,
        open: DispatchId,
        offset: u64,
        from: SeekFrom,
    ) -> UrsResult<u64> {
        match route(sup, op)? {
            Route::Local(provider) => match op {
                OpKind::SeekList => local(op, provider.seek_list(sup.id(), open, offset, from)),
                _ => local(op, provider.seek_data(sup.id(), open, offset, from)),
            },
            Route::Remote(target) => {
                let reply = self.exchange(sup, op, target, open, |r| {
                    r.value(offset).value(from as u64)
                })?;
                Ok(reply.outputs().value()?)
            }
        }
    }

    pub fn create(&self, sup: &Super, open: DispatchId, args: &CreateArgs<'_>) -> UrsResult<()> {
        let op = OpKind::Create;
        match route(sup, op)? {
            Route::Local(provider) => local(op, provider.create(sup.id(), open, args)),
            Route::Remote(target) => self
                .exchange(sup, op, target, open, |r| {
                    r.buffer(args.name.as_bytes())
                        .value(args.kind as u64)
                        .value(u64::from(args.flags))
                        .buffer(args.target.as_bytes())
                        .value(args.target_id.0)
                })
                .map(drop),
        }
    }

    pub fn remove(&self, sup: &Super, open: DispatchId, erase: bool) -> UrsResult<()> {
        let op = OpKind::Remove;
        match route(sup, op)? {
            Route::Local(provider) => local(op, provider.remove(sup.id(), open, erase)),
            Route::Remote(target) => self
                .exchange(sup, op, target, open, |r| r.value(u64::from(erase)))
                .map(drop),
        }
    }

    pub fn rename(&self, sup: &Super, open: DispatchId, name: &str) -> UrsResult<()> {
        let op = OpKind::Rename;
        match route(sup, op)? {
            Route::Local(provider) => local(op, provider.rename(sup.id(), open, name)),
            Route::Remote(target) => self
                .exchange(sup, op, target, open, |r| r.buffer(name.as_bytes()))
                .map(drop),
        }
    }

    pub fn stat(&self, sup: &Super, open: DispatchId) -> UrsResult<Stat> {
        let op = OpKind::Stat;
        match route(sup, op)? {
            Route::Local(provider) => local(op, provider.stat(sup.id(), open)),
            Route::Remote(target) => {
                let reply = self.exchange(sup, op, target, open, |r| r)?;
                let bytes = reply.outputs().buffer()?;
                Ok(postcard::from_bytes(bytes).map_err(WireError::from)?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityTable;
    use crate::registry::Registry;
    use parking_lot::Mutex;
    use urs_types::{MailboxId, Status};

    /// Transport that answers from a canned reply and records requests.
    struct Canned {
        reply: Reply,
        seen: Mutex<Vec<Request>>,
    }

    impl Transport for Canned {
        fn request(&self, request: Request) -> Result<Reply, TransportError> {
            self.seen.lock().push(request);
            Ok(self.reply.clone())
        }
    }

    struct Unreachable;

    impl Transport for Unreachable {
        fn request(&self, request: Request) -> Result<Reply, TransportError> {
            Err(TransportError::NoMailbox(request.mailbox))
        }
    }

    struct Echo;

    impl Provider for Echo {
        fn write(&self, _: urs_types::SuperId, _: DispatchId, data: &[u8]) -> ProviderResult<usize> {
            // Claims more than it was given.
            Ok(data.len() + 10)
        }

        fn read(&self, _: urs_types::SuperId, _: DispatchId, buf: &mut [u8]) -> ProviderResult<usize> {
            buf.fill(b'x');
            Ok(buf.len())
        }

        fn lookup(
            &self,
            _: urs_types::SuperId,
            _: DispatchId,
            _: ProcessId,
            name: &str,
        ) -> ProviderResult<LookupReply> {
            match name {
                "long" => Ok(LookupReply::link(DispatchId(2), "x".repeat(200))),
                "/" => Ok(LookupReply::node(DispatchId(1))),
                _ => Err(Status::NOT_FOUND),
            }
        }
    }

    fn mount(reg: &Registry, caps: CapabilityTable) -> crate::registry::SuperRef {
        reg.register("/m", "m", 0, caps).unwrap();
        reg.obtain("/m").unwrap()
    }

    fn canned(reply: Reply) -> Arc<Canned> {
        Arc::new(Canned {
            reply,
            seen: Mutex::new(Vec::new()),
        })
    }

    #[test]
    fn test_empty_slot_is_unsupported() {
        let reg = Registry::new("vfs://");
        let sup = mount(&reg, CapabilityTable::new());
        let d = Dispatcher::new(Arc::new(Unreachable), 128);
        let err = d.stat(&sup, DispatchId(1)).unwrap_err();
        assert!(matches!(err, UrsError::Unsupported { op: OpKind::Stat, .. }));
    }

    #[test]
    fn test_local_branch_calls_provider() {
        let reg = Registry::new("vfs://");
        let sup = mount(&reg, CapabilityTable::all_local(Arc::new(Echo)));
        let d = Dispatcher::new(Arc::new(Unreachable), 128);

        assert_eq!(d.write(&sup, DispatchId(1), b"hello").unwrap(), 5);
        let mut buf = [0u8; 3];
        assert_eq!(d.read(&sup, DispatchId(1), &mut buf).unwrap(), 3);
        assert_eq!(&buf, b"xxx");

        let err = d
            .lookup(&sup, DispatchId(1), ProcessId(0), "missing")
            .unwrap_err();
        assert!(matches!(
            err,
            UrsError::Provider {
                op: OpKind::Lookup,
                status: Status::NOT_FOUND
            }
        ));
    }

    #[test]
    fn test_local_write_never_overreports() {
        let reg = Registry::new("vfs://");
        let sup = mount(&reg, CapabilityTable::all_local(Arc::new(Echo)));
        let d = Dispatcher::new(Arc::new(Unreachable), 128);
        assert_eq!(d.write(&sup, DispatchId(1), b"hi").unwrap(), 2);
    }

    #[test]
    fn test_local_read_is_capped() {
        let reg = Registry::new("vfs://");
        let sup = mount(&reg, CapabilityTable::all_local(Arc::new(Echo)));
        let d = Dispatcher::new(Arc::new(Unreachable), 128);
        let mut buf = vec![0u8; 2 * MAX_TRANSFER];
        assert_eq!(d.read(&sup, DispatchId(1), &mut buf).unwrap(), MAX_TRANSFER);
        assert_eq!(buf[MAX_TRANSFER], 0);
    }

    #[test]
    fn test_remote_read_request_is_capped() {
        let reg = Registry::new("vfs://");
        let sup = mount(&reg, CapabilityTable::all_remote(MailboxId(1), 0x10));
        let transport = canned(Reply::new().buffer(Vec::new()).value(0).status(Status::OK));
        let d = Dispatcher::new(transport.clone(), 128);
        let mut buf = vec![0u8; 2 * MAX_TRANSFER];
        assert_eq!(d.list(&sup, DispatchId(1), &mut buf).unwrap(), 0);

        let seen = transport.seen.lock();
        let (_, mut rest) = seen[0].open().unwrap();
        assert_eq!(rest.value().unwrap(), MAX_TRANSFER as u64);
    }

    #[test]
    fn test_local_link_longer_than_buffer() {
        let reg = Registry::new("vfs://");
        let sup = mount(&reg, CapabilityTable::all_local(Arc::new(Echo)));
        let d = Dispatcher::new(Arc::new(Unreachable), 128);
        let err = d.lookup(&sup, DispatchId(1), ProcessId(0), "long").unwrap_err();
        assert!(matches!(err, UrsError::NameTooLong(200)));
    }

    #[test]
    fn test_remote_read_never_overruns() {
        let reg = Registry::new("vfs://");
        let sup = mount(&reg, CapabilityTable::all_remote(MailboxId(1), 0x10));
        // The reply claims more than the caller asked for.
        let transport = canned(Reply::new().buffer(vec![7u8; 32]).value(32).status(Status::OK));
        let d = Dispatcher::new(transport.clone(), 128);

        let mut buf = [0u8; 4];
        assert_eq!(d.read(&sup, DispatchId(9), &mut buf).unwrap(), 4);
        assert_eq!(buf, [7; 4]);

        let seen = transport.seen.lock();
        let (header, mut rest) = seen[0].open().unwrap();
        assert_eq!(header.op, OpKind::Read);
        assert_eq!(header.id, DispatchId(9));
        assert_eq!(rest.value().unwrap(), 4);
    }

    #[test]
    fn test_remote_read_honours_reported_size() {
        let reg = Registry::new("vfs://");
        let sup = mount(&reg, CapabilityTable::all_remote(MailboxId(1), 0x10));
        let transport = canned(Reply::new().buffer(vec![1u8; 8]).value(3).status(Status::OK));
        let d = Dispatcher::new(transport, 128);
        let mut buf = [0u8; 16];
        assert_eq!(d.read(&sup, DispatchId(1), &mut buf).unwrap(), 3);
    }

    #[test]
    fn test_remote_failure_status() {
        let reg = Registry::new("vfs://");
        let sup = mount(&reg, CapabilityTable::all_remote(MailboxId(1), 0x10));
        let d = Dispatcher::new(canned(Reply::failure(Status::NOT_PERMITTED)), 128);
        let err = d.open(&sup, DispatchId(1), ProcessId(3)).unwrap_err();
        assert!(matches!(
            err,
            UrsError::Provider {
                op: OpKind::Open,
                status: Status::NOT_PERMITTED
            }
        ));
    }

    #[test]
    fn test_malformed_reply_is_internal() {
        let reg = Registry::new("vfs://");
        let sup = mount(&reg, CapabilityTable::all_remote(MailboxId(1), 0x10));
        // Status ok but the open id is missing.
        let d = Dispatcher::new(canned(Reply::new().status(Status::OK)), 128);
        let err = d.open(&sup, DispatchId(1), ProcessId(3)).unwrap_err();
        assert!(matches!(err, UrsError::InternalDispatch(_)));
    }

    #[test]
    fn test_delivery_failure_is_transport() {
        let reg = Registry::new("vfs://");
        let sup = mount(&reg, CapabilityTable::all_remote(MailboxId(4), 0x10));
        let d = Dispatcher::new(Arc::new(Unreachable), 128);
        let err = d.release(&sup, DispatchId(1)).unwrap_err();
        assert!(matches!(
            err,
            UrsError::Transport(TransportError::NoMailbox(MailboxId(4)))
        ));
    }

    #[test]
    fn test_remote_lookup_link() {
        let reg = Registry::new("vfs://");
        let sup = mount(&reg, CapabilityTable::all_remote(MailboxId(1), 0x10));
        let transport = canned(
            Reply::new()
                .value(1)
                .value(5)
                .buffer(b"/tmp/target".to_vec())
                .value(11)
                .status(Status::OK),
        );
        let d = Dispatcher::new(transport.clone(), 128);
        let reply = d.lookup(&sup, DispatchId::NONE, ProcessId(2), "/").unwrap();
        assert_eq!(reply, LookupReply::link(DispatchId(5), "/tmp/target"));

        let seen = transport.seen.lock();
        let (_, mut rest) = seen[0].open().unwrap();
        assert_eq!(rest.value().unwrap(), 2);
        assert_eq!(rest.str().unwrap(), "/");
        assert_eq!(rest.value().unwrap(), 128);
    }
}
