//! Integer-only entry points for a system-call layer.
//!
//! Handles and supers travel as raw `u64` ids (`0` is never valid). Status
//! results are `0` on success or a negative errno from `UrsError::errno`.
//! Data transfers return `(status, count)`; the count is `0` on failure.

use urs_types::{CreateKind, HandleId, ProcessId, SeekFrom, Stat, Status};

use crate::capability::CapabilityTable;
use crate::error::UrsResult;
use crate::service::Urs;

fn handle(raw: u64) -> Result<HandleId, i32> {
    HandleId::from_raw(raw).ok_or(-Status::BAD_HANDLE.0)
}

fn status(result: UrsResult<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => err.errno(),
    }
}

fn counted(result: UrsResult<usize>) -> (i32, u64) {
    match result {
        Ok(n) => (0, n as u64),
        Err(err) => (err.errno(), 0),
    }
}

fn position(result: UrsResult<u64>) -> (i32, u64) {
    match result {
        Ok(pos) => (0, pos),
        Err(err) => (err.errno(), 0),
    }
}

fn window(buf_len: usize, count: u64) -> usize {
    usize::try_from(count).map_or(buf_len, |count| count.min(buf_len))
}

/// Returns the raw super id, or `0` when the path is taken or invalid.
pub fn register(urs: &Urs, path: &str, name: &str, flags: u32, caps: CapabilityTable) -> u64 {
    urs.register(path, name, flags, caps)
        .map(|id| id.raw())
        .unwrap_or(0)
}

/// Returns the raw handle id, or `0` on any failure.
pub fn open_node(urs: &Urs, path: &str, flags: u32, process: u64) -> u64 {
    urs.open_node(path, flags, ProcessId(process))
        .map(|id| id.raw())
        .unwrap_or(0)
}

pub fn close_node(urs: &Urs, raw: u64) -> i32 {
    match handle(raw) {
        Ok(id) => status(urs.close_node(id)),
        Err(errno) => errno,
    }
}

/// Reads at most `min(count, buf.len())` bytes.
pub fn read_node(urs: &Urs, raw: u64, buf: &mut [u8], count: u64) -> (i32, u64) {
    match handle(raw) {
        Ok(id) => {
            let n = window(buf.len(), count);
            counted(urs.read_node(id, &mut buf[..n]))
        }
        Err(errno) => (errno, 0),
    }
}

/// Writes at most `min(count, data.len())` bytes.
pub fn write_node(urs: &Urs, raw: u64, data: &[u8], count: u64) -> (i32, u64) {
    match handle(raw) {
        Ok(id) => {
            let n = window(data.len(), count);
            counted(urs.write_node(id, &data[..n]))
        }
        Err(errno) => (errno, 0),
    }
}

pub fn truncate_node(urs: &Urs, raw: u64) -> i32 {
    match handle(raw) {
        Ok(id) => status(urs.truncate_node(id)),
        Err(errno) => errno,
    }
}

pub fn seek_data(urs: &Urs, raw: u64, offset: u64, origin: u64) -> (i32, u64) {
    let Ok(from) = SeekFrom::try_from(origin) else {
        return (-Status::INVALID.0, 0);
    };
    match handle(raw) {
        Ok(id) => position(urs.seek_data(id, offset, from)),
        Err(errno) => (errno, 0),
    }
}

pub fn list_node(urs: &Urs, raw: u64, buf: &mut [u8], count: u64) -> (i32, u64) {
    match handle(raw) {
        Ok(id) => {
            let n = window(buf.len(), count);
            counted(urs.list_node(id, &mut buf[..n]))
        }
        Err(errno) => (errno, 0),
    }
}

pub fn seek_list(urs: &Urs, raw: u64, offset: u64, origin: u64) -> (i32, u64) {
    let Ok(from) = SeekFrom::try_from(origin) else {
        return (-Status::INVALID.0, 0);
    };
    match handle(raw) {
        Ok(id) => position(urs.seek_list(id, offset, from)),
        Err(errno) => (errno, 0),
    }
}

pub fn create_node(urs: &Urs, raw: u64, name: &str, kind: u64, flags: u32, target: &str) -> i32 {
    let Ok(kind) = CreateKind::try_from(kind) else {
        return -Status::INVALID.0;
    };
    match handle(raw) {
        Ok(id) => status(urs.create_node(id, name, kind, flags, target)),
        Err(errno) => errno,
    }
}

pub fn remove_node(urs: &Urs, raw: u64, erase: bool) -> i32 {
    match handle(raw) {
        Ok(id) => status(urs.remove_node(id, erase)),
        Err(errno) => errno,
    }
}

pub fn rename_node(urs: &Urs, raw: u64, name: &str) -> i32 {
    match handle(raw) {
        Ok(id) => status(urs.rename_node(id, name)),
        Err(errno) => errno,
    }
}

/// Fills `out` on success and leaves it untouched on failure.
pub fn stat_node(urs: &Urs, raw: u64, out: &mut Stat) -> i32 {
    let id = match handle(raw) {
        Ok(id) => id,
        Err(errno) => return errno,
    };
    match urs.stat_node(id) {
        Ok(stat) => {
            *out = stat;
            0
        }
        Err(err) => err.errno(),
    }
}
