//! # urs-server
//!
//! Boots a [`Urs`](urs_kernel::Urs) instance with the reference providers
//! and runs resource commands against it.
//!
//! | Mount        | Provider                      | Dispatch             |
//! |--------------|-------------------------------|----------------------|
//! | `vfs://dev/` | [`DevProvider`]               | in-process calls     |
//! | `vfs://tmp/` | [`MemoryProvider`]            | mailbox, own thread  |
//!
//! [`DevProvider`]: urs_kernel::DevProvider
//! [`MemoryProvider`]: urs_kernel::MemoryProvider

pub mod commands;
pub mod daemon;

pub use commands::{Command, run, run_script};
pub use daemon::{Daemon, TMP_MAILBOX};
