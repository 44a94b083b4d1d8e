//! Reference providers.
//!
//! - [`DevProvider`]: `null` and `zero` devices under a fixed root
//! - [`MemoryProvider`]: ephemeral tree of directories, files and links

mod dev;
mod memory;

pub use dev::DevProvider;
pub use memory::MemoryProvider;
