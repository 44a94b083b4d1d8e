//! Wire encoding for message-routed dispatch.
//!
//! A request is `{mailbox, opcode, func, params}`; a reply is `{params}`.
//! Parameters are inline scalars or length-prefixed buffers. Every request
//! starts with `[op, super, dispatch-id]`; every reply ends with the
//! integer status. Whole messages are postcard-encoded for the transport.
//!
//! Both ends walk parameters in a fixed per-operation order with
//! [`ParamReader`], so the adapter (`crate::dispatch`) and the provider
//! server (`crate::remote`) must agree exactly.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use urs_types::{DispatchId, InvalidDiscriminant, MailboxId, OpKind, Status, SuperId};

use crate::capability::RemoteTarget;

/// Wire decoding error.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("codec: {0}")]
    Codec(#[from] postcard::Error),

    #[error("missing parameter {index}")]
    Missing { index: usize },

    #[error("parameter {index}: expected {expected}")]
    TypeMismatch {
        index: usize,
        expected: &'static str,
    },

    #[error("reply has no trailing status")]
    NoStatus,

    #[error("parameter {index} is not UTF-8")]
    BadUtf8 { index: usize },

    #[error("invalid super id {0:#x}")]
    BadSuperId(u64),

    #[error(transparent)]
    BadDiscriminant(#[from] InvalidDiscriminant),
}

/// One message parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Param {
    /// Unsigned scalar (IDs, counts, offsets, flags).
    Value(u64),
    /// Signed scalar (result codes).
    Int(i64),
    /// Length-prefixed attachment.
    Buffer(Vec<u8>),
}

/// A dispatch request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub mailbox: MailboxId,
    pub opcode: u32,
    pub func: u32,
    pub params: Vec<Param>,
}

/// The fixed leading parameters of every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub op: OpKind,
    pub sup: SuperId,
    pub id: DispatchId,
}

impl Request {
    /// Stamp a request for `op` with the target's routing and the leading
    /// `[op, super, dispatch-id]` parameters.
    pub fn for_op(target: &RemoteTarget, op: OpKind, sup: SuperId, id: DispatchId) -> Self {
        Self {
            mailbox: target.mailbox,
            opcode: target.opcode,
            func: target.func,
            params: vec![
                Param::Value(op.index() as u64),
                Param::Value(sup.raw()),
                Param::Value(id.0),
            ],
        }
    }

    pub fn value(mut self, value: u64) -> Self {
        self.params.push(Param::Value(value));
        self
    }

    pub fn buffer(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.params.push(Param::Buffer(data.into()));
        self
    }

    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        Ok(postcard::to_stdvec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        Ok(postcard::from_bytes(bytes)?)
    }

    /// Reader positioned after the header, plus the decoded header.
    pub fn open(&self) -> Result<(Header, ParamReader<'_>), WireError> {
        let mut reader = ParamReader::new(&self.params);
        let op = OpKind::try_from(reader.value()?)?;
        let raw_sup = reader.value()?;
        let sup = SuperId::from_raw(raw_sup).ok_or(WireError::BadSuperId(raw_sup))?;
        let id = DispatchId(reader.value()?);
        Ok((Header { op, sup, id }, reader))
    }
}

/// A dispatch reply. The last parameter is always the status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub params: Vec<Param>,
}

impl Reply {
    /// Start an empty reply; finish it with [`Reply::status`].
    pub fn new() -> Self {
        Self::default()
    }

    /// A reply carrying only a failure status.
    pub fn failure(status: Status) -> Self {
        Self::new().status(status)
    }

    pub fn value(mut self, value: u64) -> Self {
        self.params.push(Param::Value(value));
        self
    }

    pub fn buffer(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.params.push(Param::Buffer(data.into()));
        self
    }

    /// Append the trailing status.
    pub fn status(mut self, status: Status) -> Self {
        self.params.push(Param::Int(status.0 as i64));
        self
    }

    /// The trailing status.
    pub fn result(&self) -> Result<Status, WireError> {
        match self.params.last() {
            Some(Param::Int(code)) => i32::try_from(*code)
                .map(Status)
                .map_err(|_| WireError::TypeMismatch {
                    index: self.params.len() - 1,
                    expected: "32-bit status",
                }),
            _ => Err(WireError::NoStatus),
        }
    }

    /// Reader over the output parameters (status excluded).
    pub fn outputs(&self) -> ParamReader<'_> {
        let end = self.params.len().saturating_sub(1);
        ParamReader::new(&self.params[..end])
    }

    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        Ok(postcard::to_stdvec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        Ok(postcard::from_bytes(bytes)?)
    }
}

/// Sequential typed access to a parameter list.
#[derive(Debug)]
pub struct ParamReader<'a> {
    params: &'a [Param],
    pos: usize,
}

impl<'a> ParamReader<'a> {
    pub fn new(params: &'a [Param]) -> Self {
        Self { params, pos: 0 }
    }

    fn next(&mut self) -> Result<(usize, &'a Param), WireError> {
        let index = self.pos;
        let param = self
            .params
            .get(index)
            .ok_or(WireError::Missing { index })?;
        self.pos += 1;
        Ok((index, param))
    }

    pub fn value(&mut self) -> Result<u64, WireError> {
        match self.next()? {
            (_, Param::Value(v)) => Ok(*v),
            (index, _) => Err(WireError::TypeMismatch {
                index,
                expected: "value",
            }),
        }
    }

    pub fn buffer(&mut self) -> Result<&'a [u8], WireError> {
        match self.next()? {
            (_, Param::Buffer(b)) => Ok(b),
            (index, _) => Err(WireError::TypeMismatch {
                index,
                expected: "buffer",
            }),
        }
    }

    pub fn str(&mut self) -> Result<&'a str, WireError> {
        let index = self.pos;
        let bytes = self.buffer()?;
        std::str::from_utf8(bytes).map_err(|_| WireError::BadUtf8 { index })
    }
}
