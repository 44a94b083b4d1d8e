//! # urs-kernel
//!
//! Uniform resource system: one hierarchical namespace over many providers.
//!
//! A provider registers a capability table at a mount prefix such as
//! `vfs://dev/`. Paths are resolved by longest-prefix match, then walked one
//! component at a time through the provider's `lookup`, following links
//! across mounts. Opening a node produces a handle; every later operation
//! goes through the handle to the provider, either as a direct call
//! ([`Provider`]) or as a message over a [`Transport`].
//!
//! The core is synchronous. Reference counts on mounts and nodes are held
//! by RAII guards ([`SuperRef`], [`NodeRef`]), so an error anywhere in a
//! resolution or open releases exactly what it took.

pub mod abi;
pub mod arena;
pub mod capability;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod handles;
pub mod nodes;
pub mod path;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod remote;
pub mod resolve;
pub mod service;
pub mod transport;
pub mod wire;

pub use capability::{Capability, CapabilityTable, RawCapability, RemoteTarget, TAG_LOCAL, TAG_NONE, TAG_REMOTE};
pub use config::{ConfigError, UrsConfig};
pub use dispatch::Dispatcher;
pub use error::{UrsError, UrsResult};
pub use handles::{HandleInfo, HandleState};
pub use nodes::NodeRef;
pub use provider::{CreateArgs, LookupReply, Provider};
pub use providers::{DevProvider, MemoryProvider};
pub use registry::{MountInfo, Registry, SuperRef};
pub use service::Urs;
pub use transport::{Mailbox, MailboxRouter, Transport, TransportError};
pub use wire::{Reply, Request, WireError};

pub use urs_types;
