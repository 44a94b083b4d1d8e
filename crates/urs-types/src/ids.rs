//! Typed identifiers for supers, nodes, open handles, and provider tokens.
//!
//! Slot IDs (`SuperId`, `NodeId`, `HandleId`) are an arena index plus the
//! generation the slot had when the object was stored. Freeing a slot bumps
//! its generation, so an ID held past the object's lifetime is detected as
//! stale instead of silently naming whatever reused the slot.
//!
//! On the raw ABI every slot ID packs into a nonzero `u64`; `0` is reserved
//! as the invalid ID.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A mounted provider's registration record.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct SuperId {
    index: u32,
    generation: u32,
}

/// A transient node produced during path resolution.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

/// A persistent open handle bound to a caller.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct HandleId {
    index: u32,
    generation: u32,
}

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_slot_id {
    ($T:ident, $name:literal) => {
        impl $T {
            /// Build an ID from an arena slot index and its generation.
            pub const fn new(index: u32, generation: u32) -> Self {
                Self { index, generation }
            }

            /// Arena slot index.
            pub const fn index(&self) -> u32 {
                self.index
            }

            /// Generation of the slot when this ID was issued.
            pub const fn generation(&self) -> u32 {
                self.generation
            }

            /// Pack into a nonzero `u64` for the raw ABI.
            ///
            /// The index is stored off by one so that slot 0, generation 0
            /// never packs to the reserved `0`.
            pub const fn raw(&self) -> u64 {
                (((self.index as u64) + 1) << 32) | self.generation as u64
            }

            /// Unpack a raw ABI value. Returns `None` for the invalid ID `0`.
            pub const fn from_raw(raw: u64) -> Option<Self> {
                let hi = (raw >> 32) as u32;
                if hi == 0 {
                    return None;
                }
                Some(Self {
                    index: hi - 1,
                    generation: raw as u32,
                })
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}:{}", self.index, self.generation)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({}:{})", $name, self.index, self.generation)
            }
        }
    };
}

impl_slot_id!(SuperId, "SuperId");
impl_slot_id!(NodeId, "NodeId");
impl_slot_id!(HandleId, "HandleId");

// ── Opaque tokens ───────────────────────────────────────────────────────────

/// Provider-private token naming a node or an open file inside a provider.
///
/// The core never interprets it beyond the two reserved values.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DispatchId(pub u64);

impl DispatchId {
    /// No node. Also the node passed with the root lookup.
    pub const NONE: DispatchId = DispatchId(0);

    /// Hard-link creation: the provider resolves the target by name.
    pub const RESOLVE_BY_NAME: DispatchId = DispatchId(u64::MAX);

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for DispatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DispatchId({:#x})", self.0)
    }
}

/// Caller process identity, passed through every dispatch untouched.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(pub u64);

/// Destination mailbox of a message-routed provider.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MailboxId(pub u64);

impl fmt::Display for MailboxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mbox#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_round_trip_is_nonzero() {
        let id = HandleId::new(0, 0);
        assert_ne!(id.raw(), 0);
        assert_eq!(HandleId::from_raw(id.raw()), Some(id));

        let id = SuperId::new(41, 7);
        assert_eq!(SuperId::from_raw(id.raw()), Some(id));
    }

    #[test]
    fn test_zero_is_invalid() {
        assert_eq!(NodeId::from_raw(0), None);
        // Generation bits alone are not a valid ID either.
        assert_eq!(NodeId::from_raw(5), None);
    }

    #[test]
    fn test_generations_distinguish_ids() {
        let old = HandleId::new(3, 1);
        let new = HandleId::new(3, 2);
        assert_ne!(old, new);
        assert_ne!(old.raw(), new.raw());
    }

    #[test]
    fn test_dispatch_sentinels() {
        assert!(DispatchId::NONE.is_none());
        assert!(!DispatchId::RESOLVE_BY_NAME.is_none());
    }

    #[test]
    fn test_debug_shows_kind() {
        assert_eq!(format!("{:?}", SuperId::new(2, 9)), "SuperId(2:9)");
        assert_eq!(format!("{}", MailboxId(12)), "mbox#12");
    }
}
