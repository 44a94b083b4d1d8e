//! Operation kinds and their scalar arguments.
//!
//! Every enum here crosses the message boundary as a plain integer, so each
//! one has a fixed discriminant and a checked conversion back from `u64`.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumCount, EnumIter, IntoStaticStr};

/// A value on the wire did not name any variant of the target enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} discriminant {value}")]
pub struct InvalidDiscriminant {
    pub kind: &'static str,
    pub value: u64,
}

/// The operations a provider may support, one capability slot each.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumCount,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum OpKind {
    Lookup = 0,
    Open = 1,
    Release = 2,
    Read = 3,
    Write = 4,
    Truncate = 5,
    SeekData = 6,
    List = 7,
    SeekList = 8,
    Create = 9,
    Remove = 10,
    Rename = 11,
    Stat = 12,
}

impl OpKind {
    /// All operations in capability-table order.
    pub const ALL: [OpKind; OpKind::COUNT] = [
        OpKind::Lookup,
        OpKind::Open,
        OpKind::Release,
        OpKind::Read,
        OpKind::Write,
        OpKind::Truncate,
        OpKind::SeekData,
        OpKind::List,
        OpKind::SeekList,
        OpKind::Create,
        OpKind::Remove,
        OpKind::Rename,
        OpKind::Stat,
    ];

    /// Slot index in a capability table.
    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<OpKind> {
        Self::ALL.get(index).copied()
    }
}

impl TryFrom<u64> for OpKind {
    type Error = InvalidDiscriminant;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        usize::try_from(value)
            .ok()
            .and_then(OpKind::from_index)
            .ok_or(InvalidDiscriminant {
                kind: "op",
                value,
            })
    }
}

/// Origin for `seek_data` / `seek_list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum SeekFrom {
    Begin = 0,
    Current = 1,
    End = 2,
}

impl TryFrom<u64> for SeekFrom {
    type Error = InvalidDiscriminant;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SeekFrom::Begin),
            1 => Ok(SeekFrom::Current),
            2 => Ok(SeekFrom::End),
            _ => Err(InvalidDiscriminant {
                kind: "seek origin",
                value,
            }),
        }
    }
}

/// What `create_node` makes inside the open directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum CreateKind {
    /// A plain node. The target string carries provider-specific hints
    /// (the memory provider treats `"dir"` as "make a directory").
    Node = 0,
    SymLink = 1,
    HardLink = 2,
    DynLink = 3,
}

impl TryFrom<u64> for CreateKind {
    type Error = InvalidDiscriminant;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CreateKind::Node),
            1 => Ok(CreateKind::SymLink),
            2 => Ok(CreateKind::HardLink),
            3 => Ok(CreateKind::DynLink),
            _ => Err(InvalidDiscriminant {
                kind: "create kind",
                value,
            }),
        }
    }
}
