//! Resource commands.
//!
//! Each command opens what it needs through the public [`Urs`] API and
//! closes it again before returning, so a command never leaves handles
//! behind, even when it fails halfway.

use std::io::{BufRead, Write};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};
use urs_kernel::urs_types::{CreateKind, HandleId, ProcessId, SeekFrom};
use urs_kernel::{Urs, UrsError, UrsResult};

const CHUNK: usize = 4096;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{path}: provider accepted no bytes")]
    ShortWrite { path: String },

    #[error("{path}: no parent directory")]
    NoParent { path: String },

    #[error("{target}: not on the mount of {path}")]
    CrossMount { target: String, path: String },

    #[error("line {line}: {source}")]
    Script { line: usize, source: clap::Error },
}

/// One resource command.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print a node's contents
    Cat { path: String },

    /// Write text to a file, creating it if missing
    Write {
        path: String,
        #[arg(required = true)]
        text: Vec<String>,
        /// Append instead of replacing the contents
        #[arg(long)]
        append: bool,
    },

    /// List a directory, one name per line
    Ls { path: String },

    /// Print node attributes as JSON
    Stat { path: String },

    /// Print registered mounts as JSON
    Mounts,

    /// Print open handles as JSON
    Handles,

    /// Create a directory
    Mkdir { path: String },

    /// Create a link at PATH pointing to TARGET
    Ln {
        target: String,
        path: String,
        /// Hard link; TARGET must be on the same mount as PATH
        #[arg(long)]
        hard: bool,
    },

    /// Remove a node
    Rm {
        path: String,
        /// Ask the provider to destroy the data too
        #[arg(long)]
        erase: bool,
    },

    /// Rename a node within its directory
    Mv { path: String, name: String },
}

/// A line of a command script.
#[derive(Parser, Debug)]
#[command(no_binary_name = true)]
struct ScriptLine {
    #[command(subcommand)]
    command: Command,
}

// ── Handle guard ────────────────────────────────────────────────────────────

/// An open handle that is closed on drop.
struct Opened<'a> {
    urs: &'a Urs,
    id: HandleId,
    live: bool,
}

impl<'a> Opened<'a> {
    fn new(urs: &'a Urs, path: &str) -> UrsResult<Self> {
        let id = urs.open_node(path, 0, caller())?;
        Ok(Self {
            urs,
            id,
            live: true,
        })
    }

    /// Remove the node; the handle goes with it.
    fn remove(mut self, erase: bool) -> UrsResult<()> {
        self.urs.remove_node(self.id, erase)?;
        self.live = false;
        Ok(())
    }
}

impl Drop for Opened<'_> {
    fn drop(&mut self) {
        if !self.live {
            return;
        }
        if let Err(err) = self.urs.close_node(self.id) {
            warn!(handle = %self.id, error = %err, "close failed");
        }
    }
}

fn caller() -> ProcessId {
    ProcessId(u64::from(std::process::id()))
}

/// Split `path` into its parent directory and final name.
fn split_parent(path: &str) -> Result<(String, &str), CommandError> {
    let no_parent = || CommandError::NoParent {
        path: path.to_string(),
    };
    let trimmed = path.trim_end_matches('/');
    let (parent, name) = trimmed.rsplit_once('/').ok_or_else(no_parent)?;
    if name.is_empty() {
        return Err(no_parent());
    }
    let parent = if parent.is_empty() || parent.ends_with(":/") {
        format!("{parent}/")
    } else {
        parent.to_string()
    };
    Ok((parent, name))
}

fn create(urs: &Urs, path: &str, kind: CreateKind, target: &str) -> anyhow::Result<()> {
    let (parent, name) = split_parent(path)?;
    let dir = Opened::new(urs, &parent).with_context(|| format!("open {parent}"))?;
    urs.create_node(dir.id, name, kind, 0, target)
        .with_context(|| format!("create {path}"))?;
    Ok(())
}

/// Hard-link targets travel relative to the provider root, so the target
/// must live on the same mount as the new link.
fn mount_relative(urs: &Urs, path: &str, target: &str) -> anyhow::Result<String> {
    let registry = urs.registry();
    let link_mount = registry.match_path(path)?;
    let target_mount = registry.match_path(target)?;
    if link_mount.id() != target_mount.id() {
        return Err(CommandError::CrossMount {
            target: target.to_string(),
            path: path.to_string(),
        }
        .into());
    }
    let normalized = registry.normalize(target)?;
    Ok(format!(
        "/{}",
        urs_kernel::path::remainder(&normalized, target_mount.path())
    ))
}

/// Drain a read-like operation into `out`.
fn drain(
    out: &mut impl Write,
    mut step: impl FnMut(&mut [u8]) -> UrsResult<usize>,
) -> anyhow::Result<u64> {
    let mut buf = vec![0u8; CHUNK];
    let mut total = 0;
    loop {
        let n = step(&mut buf)?;
        if n == 0 {
            return Ok(total);
        }
        out.write_all(&buf[..n])?;
        total += n as u64;
    }
}

// ── Commands ────────────────────────────────────────────────────────────────

/// Run one command, writing its output to `out`.
pub fn run(urs: &Urs, command: &Command, out: &mut impl Write) -> anyhow::Result<()> {
    debug!(?command, "running");
    match command {
        Command::Cat { path } => {
            let file = Opened::new(urs, path).with_context(|| format!("open {path}"))?;
            drain(out, |buf| urs.read_node(file.id, buf)).with_context(|| format!("read {path}"))?;
        }

        Command::Write { path, text, append } => {
            let file = match Opened::new(urs, path) {
                Ok(file) => file,
                Err(UrsError::PathNotFound(_)) => {
                    create(urs, path, CreateKind::Node, "")?;
                    Opened::new(urs, path).with_context(|| format!("open {path}"))?
                }
                Err(err) => return Err(anyhow::Error::new(err).context(format!("open {path}"))),
            };

            if *append {
                urs.seek_data(file.id, 0, SeekFrom::End)?;
            } else {
                urs.truncate_node(file.id)?;
            }

            let mut data = text.join(" ").into_bytes();
            data.push(b'\n');
            let mut rest = data.as_slice();
            while !rest.is_empty() {
                let n = urs
                    .write_node(file.id, rest)
                    .with_context(|| format!("write {path}"))?;
                if n == 0 {
                    return Err(CommandError::ShortWrite { path: path.clone() }.into());
                }
                rest = &rest[n.min(rest.len())..];
            }
        }

        Command::Ls { path } => {
            let dir = Opened::new(urs, path).with_context(|| format!("open {path}"))?;
            drain(out, |buf| urs.list_node(dir.id, buf)).with_context(|| format!("list {path}"))?;
        }

        Command::Stat { path } => {
            let node = Opened::new(urs, path).with_context(|| format!("open {path}"))?;
            let stat = urs.stat_node(node.id).with_context(|| format!("stat {path}"))?;
            serde_json::to_writer_pretty(&mut *out, &stat)?;
            writeln!(out)?;
        }

        Command::Mounts => {
            let mounts: Vec<_> = urs
                .mounts()
                .into_iter()
                .map(|m| {
                    json!({
                        "id": m.id.to_string(),
                        "path": m.path,
                        "name": m.name,
                        "flags": m.flags,
                        "refs": m.refs,
                        "ops": m.ops.iter().map(|op| op.to_string()).collect::<Vec<_>>(),
                    })
                })
                .collect();
            serde_json::to_writer_pretty(&mut *out, &mounts)?;
            writeln!(out)?;
        }

        Command::Handles => {
            let handles: Vec<_> = urs
                .open_handles()
                .into_iter()
                .map(|h| {
                    json!({
                        "id": h.id.to_string(),
                        "path": h.path,
                        "mount": h.mount,
                        "flags": h.flags,
                        "process": h.process.0,
                        "state": format!("{:?}", h.state),
                    })
                })
                .collect();
            serde_json::to_writer_pretty(&mut *out, &handles)?;
            writeln!(out)?;
        }

        Command::Mkdir { path } => create(urs, path, CreateKind::Node, "dir")?,

        Command::Ln { target, path, hard } => {
            if *hard {
                let target = mount_relative(urs, path, target)?;
                create(urs, path, CreateKind::HardLink, &target)?;
            } else {
                create(urs, path, CreateKind::SymLink, target)?;
            }
        }

        Command::Rm { path, erase } => {
            let node = Opened::new(urs, path).with_context(|| format!("open {path}"))?;
            node.remove(*erase).with_context(|| format!("remove {path}"))?;
        }

        Command::Mv { path, name } => {
            let node = Opened::new(urs, path).with_context(|| format!("open {path}"))?;
            urs.rename_node(node.id, name)
                .with_context(|| format!("rename {path} to {name}"))?;
        }
    }
    Ok(())
}

/// Run one command per line of `input`. Blank lines and `#` comments are
/// skipped; the first failing line stops the script.
pub fn run_script(urs: &Urs, input: impl BufRead, out: &mut impl Write) -> anyhow::Result<usize> {
    let mut ran = 0;
    for (index, line) in input.lines().enumerate() {
        let line = line?;
        let line_no = index + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let parsed = ScriptLine::try_parse_from(trimmed.split_whitespace()).map_err(|source| {
            CommandError::Script {
                line: line_no,
                source,
            }
        })?;
        run(urs, &parsed.command, out).with_context(|| format!("line {line_no}"))?;
        ran += 1;
    }
    Ok(ran)
}
