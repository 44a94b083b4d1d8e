//! Per-operation capability tables.
//!
//! Each mount carries one slot per [`OpKind`]. A slot is either empty, a
//! provider to call in-process, or a mailbox to message. Slots are set once
//! at registration and read-only afterwards; a provider may mix branches
//! across operations.

use std::fmt;
use std::sync::Arc;

use strum::EnumCount;
use urs_types::{MailboxId, OpKind};

use crate::error::{UrsError, UrsResult};
use crate::provider::Provider;

/// Raw tag of an empty slot in a registration record.
pub const TAG_NONE: u8 = 0;
/// Raw tag of a local slot. Never valid in a record from another process.
pub const TAG_LOCAL: u8 = 1;
/// Raw tag of a message-routed slot.
pub const TAG_REMOTE: u8 = 2;

/// Where a message-routed operation goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteTarget {
    pub mailbox: MailboxId,
    pub opcode: u32,
    /// Sub-function number inside `opcode`.
    pub func: u32,
}

impl RemoteTarget {
    pub fn new(mailbox: MailboxId, opcode: u32, func: u32) -> Self {
        Self {
            mailbox,
            opcode,
            func,
        }
    }
}

/// One capability-table slot.
#[derive(Clone, Default)]
pub enum Capability {
    #[default]
    Unsupported,
    Local(Arc<dyn Provider>),
    Remote(RemoteTarget),
}

impl Capability {
    pub fn is_supported(&self) -> bool {
        !matches!(self, Capability::Unsupported)
    }

    /// Raw registration tag for this slot.
    pub fn tag(&self) -> u8 {
        match self {
            Capability::Unsupported => TAG_NONE,
            Capability::Local(_) => TAG_LOCAL,
            Capability::Remote(_) => TAG_REMOTE,
        }
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Unsupported => f.write_str("Unsupported"),
            Capability::Local(_) => f.write_str("Local(<provider>)"),
            Capability::Remote(target) => f.debug_tuple("Remote").field(target).finish(),
        }
    }
}

/// A slot as it arrives in a registration message from another process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawCapability {
    pub tag: u8,
    pub opcode: u32,
    pub func: u32,
}

/// Capability table indexed by operation kind.
#[derive(Clone, Debug)]
pub struct CapabilityTable {
    slots: [Capability; OpKind::COUNT],
}

impl Default for CapabilityTable {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityTable {
    /// A table with every slot empty.
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| Capability::Unsupported),
        }
    }

    /// Every operation routed to `provider` in-process.
    pub fn all_local(provider: Arc<dyn Provider>) -> Self {
        Self {
            slots: std::array::from_fn(|_| Capability::Local(Arc::clone(&provider))),
        }
    }

    /// Every operation routed to `mailbox` under one opcode, with the
    /// operation index as sub-function.
    pub fn all_remote(mailbox: MailboxId, opcode: u32) -> Self {
        Self {
            slots: std::array::from_fn(|i| {
                Capability::Remote(RemoteTarget::new(mailbox, opcode, i as u32))
            }),
        }
    }

    /// Decode slots received from another process.
    ///
    /// Missing trailing slots are empty. A local tag cannot cross a process
    /// boundary, so it is rejected along with unknown tags.
    pub fn from_raw(mailbox: MailboxId, entries: &[RawCapability]) -> UrsResult<Self> {
        if entries.len() > OpKind::COUNT {
            return Err(UrsError::internal(format!(
                "{} capability entries for {} operations",
                entries.len(),
                OpKind::COUNT
            )));
        }

        let mut table = Self::new();
        for (op, entry) in OpKind::ALL.iter().zip(entries) {
            table.slots[op.index()] = match entry.tag {
                TAG_NONE => Capability::Unsupported,
                TAG_REMOTE => {
                    Capability::Remote(RemoteTarget::new(mailbox, entry.opcode, entry.func))
                }
                tag => {
                    return Err(UrsError::internal(format!(
                        "capability tag {tag} invalid for {op} in a remote registration"
                    )));
                }
            };
        }
        Ok(table)
    }

    pub fn set(mut self, op: OpKind, capability: Capability) -> Self {
        self.slots[op.index()] = capability;
        self
    }

    pub fn local(self, op: OpKind, provider: Arc<dyn Provider>) -> Self {
        self.set(op, Capability::Local(provider))
    }

    pub fn remote(self, op: OpKind, target: RemoteTarget) -> Self {
        self.set(op, Capability::Remote(target))
    }

    pub fn unsupported(self, op: OpKind) -> Self {
        self.set(op, Capability::Unsupported)
    }

    pub fn get(&self, op: OpKind) -> &Capability {
        &self.slots[op.index()]
    }

    pub fn supports(&self, op: OpKind) -> bool {
        self.get(op).is_supported()
    }

    /// Operations with a non-empty slot.
    pub fn supported_ops(&self) -> Vec<OpKind> {
        OpKind::ALL
            .iter()
            .copied()
            .filter(|op| self.supports(*op))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy;
    impl Provider for Dummy {}

    #[test]
    fn test_new_table_is_empty() {
        let table = CapabilityTable::new();
        assert!(table.supported_ops().is_empty());
        assert_eq!(table.get(OpKind::Read).tag(), TAG_NONE);
    }

    #[test]
    fn test_builder_mixes_branches() {
        let provider: Arc<dyn Provider> = Arc::new(Dummy);
        let target = RemoteTarget::new(MailboxId(9), 0x40, 4);
        let table = CapabilityTable::new()
            .local(OpKind::Lookup, provider)
            .remote(OpKind::Write, target);

        assert!(matches!(table.get(OpKind::Lookup), Capability::Local(_)));
        match table.get(OpKind::Write) {
            Capability::Remote(t) => assert_eq!(*t, target),
            other => panic!("expected remote slot, got {other:?}"),
        }
        assert_eq!(table.supported_ops(), vec![OpKind::Lookup, OpKind::Write]);
    }

    #[test]
    fn test_all_remote_uses_op_index_as_func() {
        let table = CapabilityTable::all_remote(MailboxId(3), 0x10);
        match table.get(OpKind::Stat) {
            Capability::Remote(t) => {
                assert_eq!(t.func, OpKind::Stat.index() as u32);
                assert_eq!(t.opcode, 0x10);
            }
            other => panic!("expected remote slot, got {other:?}"),
        }
    }

    #[test]
    fn test_from_raw_decodes_tags() {
        let raw = [
            RawCapability {
                tag: TAG_REMOTE,
                opcode: 7,
                func: 1,
            },
            RawCapability {
                tag: TAG_NONE,
                opcode: 0,
                func: 0,
            },
        ];
        let table = CapabilityTable::from_raw(MailboxId(5), &raw).unwrap();
        assert!(table.supports(OpKind::Lookup));
        assert!(!table.supports(OpKind::Open));
        assert!(!table.supports(OpKind::Stat));
    }

    #[test]
    fn test_from_raw_rejects_local_and_unknown_tags() {
        for tag in [TAG_LOCAL, 7] {
            let raw = [RawCapability {
                tag,
                opcode: 0,
                func: 0,
            }];
            let err = CapabilityTable::from_raw(MailboxId(5), &raw).unwrap_err();
            assert!(matches!(err, UrsError::InternalDispatch(_)));
        }
    }

    #[test]
    fn test_from_raw_rejects_oversized_tables() {
        let raw = vec![
            RawCapability {
                tag: TAG_NONE,
                opcode: 0,
                func: 0,
            };
            OpKind::COUNT + 1
        ];
        assert!(CapabilityTable::from_raw(MailboxId(1), &raw).is_err());
    }
}
