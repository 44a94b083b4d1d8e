//! Shared types for the uniform resource system.
//!
//! This crate is the leaf every other URS crate builds on: typed IDs,
//! operation kinds, node metadata and provider status codes. It has **no
//! internal dependencies**, so providers that live in another process can
//! depend on it without pulling in the dispatch layer.
//!
//! # Key Types
//!
//! |----------------|-----------------------------------------------|
//! | Type           | Purpose                                       |
//! |----------------|-----------------------------------------------|
//! | [`SuperId`]    | Which mounted provider (generation-checked)   |
//! | [`NodeId`]     | Which transient resolution node               |
//! | [`HandleId`]   | Which open handle                             |
//! | [`DispatchId`] | Provider-private node / open token            |
//! | [`OpKind`]     | Capability-table slot                         |
//! | [`Stat`]       | Node attributes                               |
//! | [`Status`]     | Provider result code                          |
//! |----------------|-----------------------------------------------|

pub mod ids;
pub mod op;
pub mod stat;
pub mod status;

pub use ids::{DispatchId, HandleId, MailboxId, NodeId, ProcessId, SuperId};
pub use op::{CreateKind, InvalidDiscriminant, OpKind, SeekFrom};
pub use stat::{NodeKind, Stat};
pub use status::{ProviderResult, Status};
