//! End-to-end tests through the `Urs` service with the reference providers.
//!
//! Every operation goes path → registry → resolver → handle table →
//! dispatch → provider and back, for both a local mount (`vfs://dev/`) and a
//! message-routed one (`vfs://tmp/`).

use std::sync::Arc;

use urs_kernel::urs_types::{CreateKind, MailboxId, NodeKind, ProcessId, SeekFrom, Status};
use urs_kernel::{
    CapabilityTable, DevProvider, MailboxRouter, MemoryProvider, Urs, UrsConfig, UrsError, remote,
};

const PID: ProcessId = ProcessId(42);
const TMP_MAILBOX: MailboxId = MailboxId(7);

// ============================================================================
// Shared test setup
// ============================================================================

/// `vfs://dev/` served in-process, `vfs://tmp/` served from its own thread.
fn setup() -> (Urs, Arc<DevProvider>, Arc<MemoryProvider>) {
    let router = Arc::new(MailboxRouter::new());
    let urs = Urs::new(UrsConfig::default(), router.clone());

    let dev = Arc::new(DevProvider::new());
    urs.register("/dev", "dev", 0, CapabilityTable::all_local(dev.clone()))
        .unwrap();

    let tmp = Arc::new(MemoryProvider::new());
    let mailbox = router.bind(TMP_MAILBOX).unwrap();
    remote::spawn(mailbox, tmp.clone()).unwrap();
    urs.register("/tmp", "tmp", 0, CapabilityTable::all_remote(TMP_MAILBOX, 1))
        .unwrap();

    (urs, dev, tmp)
}

fn read_all(urs: &Urs, path: &str) -> Vec<u8> {
    let h = urs.open_node(path, 0, PID).unwrap();
    let mut out = Vec::new();
    let mut buf = [0u8; 5];
    loop {
        let n = urs.read_node(h, &mut buf).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    urs.close_node(h).unwrap();
    out
}

fn list_all(urs: &Urs, path: &str) -> String {
    let h = urs.open_node(path, 0, PID).unwrap();
    let mut out = Vec::new();
    let mut buf = [0u8; 4];
    loop {
        let n = urs.list_node(h, &mut buf).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    urs.close_node(h).unwrap();
    String::from_utf8(out).unwrap()
}

// ============================================================================
// Device mount
// ============================================================================

#[test]
fn test_dev_null_session() {
    let (urs, dev, _) = setup();

    let h = urs.open_node("/dev/null", 0, PID).unwrap();
    assert_eq!(dev.open_count(), 1);
    assert_eq!(urs.write_node(h, b"hi").unwrap(), 2);

    let mut buf = [0u8; 16];
    assert_eq!(urs.read_node(h, &mut buf).unwrap(), 0);

    urs.close_node(h).unwrap();
    assert_eq!(dev.open_count(), 0);
    assert!(matches!(urs.read_node(h, &mut buf), Err(UrsError::BadHandle(_))));
    assert!(matches!(urs.close_node(h), Err(UrsError::BadHandle(_))));
}

#[test]
fn test_scheme_qualified_and_slash_paths_agree() {
    let (urs, _, _) = setup();
    let a = urs.open_node("vfs://dev/zero", 0, PID).unwrap();
    let b = urs.open_node("/dev/zero", 0, PID).unwrap();

    assert_eq!(urs.handles_for_path("/dev/zero"), vec![a, b]);
    assert_eq!(urs.stat_node(a).unwrap().kind, NodeKind::Device);

    urs.close_node(a).unwrap();
    urs.close_node(b).unwrap();
}

#[test]
fn test_dev_listing() {
    let (urs, _, _) = setup();
    assert_eq!(list_all(&urs, "/dev"), "null\nzero\n");
    assert_eq!(list_all(&urs, "/dev/"), "null\nzero\n");
}

#[test]
fn test_dev_refuses_namespace_changes() {
    let (urs, _, _) = setup();
    let root = urs.open_node("/dev", 0, PID).unwrap();

    let err = urs
        .create_node(root, "sda", CreateKind::Node, 0, "")
        .unwrap_err();
    assert!(matches!(
        err,
        UrsError::Provider {
            status: Status::NOT_PERMITTED,
            ..
        }
    ));
    assert_eq!(err.errno(), -Status::NOT_PERMITTED.0);
    urs.close_node(root).unwrap();
}

// ============================================================================
// Message-routed memory mount
// ============================================================================

#[test]
fn test_tmp_create_write_read() {
    let (urs, _, tmp) = setup();

    let root = urs.open_node("/tmp", 0, PID).unwrap();
    urs.create_node(root, "notes", CreateKind::Node, 0, "dir").unwrap();
    urs.close_node(root).unwrap();

    let dir = urs.open_node("/tmp/notes", 0, PID).unwrap();
    urs.create_node(dir, "a.txt", CreateKind::Node, 0o600, "").unwrap();
    urs.close_node(dir).unwrap();

    let h = urs.open_node("/tmp/notes/a.txt", 0, PID).unwrap();
    assert_eq!(urs.write_node(h, b"hello, world").unwrap(), 12);
    assert_eq!(urs.seek_data(h, 7, SeekFrom::Begin).unwrap(), 7);
    urs.truncate_node(h).unwrap();

    let stat = urs.stat_node(h).unwrap();
    assert_eq!(stat.kind, NodeKind::File);
    assert_eq!(stat.size, 7);
    assert_eq!(stat.perm, 0o600);
    urs.close_node(h).unwrap();

    assert_eq!(read_all(&urs, "/tmp/notes/a.txt"), b"hello, ");
    assert_eq!(tmp.file_contents("notes/a.txt").unwrap(), b"hello, ");
    assert_eq!(tmp.open_count(), 0);
}

#[test]
fn test_tmp_seek_from_end_and_current() {
    let (urs, _, tmp) = setup();
    tmp.insert_file("log", b"0123456789").unwrap();

    let h = urs.open_node("/tmp/log", 0, PID).unwrap();
    assert_eq!(urs.seek_data(h, -3i64 as u64, SeekFrom::End).unwrap(), 7);

    let mut buf = [0u8; 8];
    assert_eq!(urs.read_node(h, &mut buf).unwrap(), 3);
    assert_eq!(&buf[..3], b"789");

    assert_eq!(urs.seek_data(h, 0, SeekFrom::Begin).unwrap(), 0);
    assert_eq!(urs.seek_data(h, 4, SeekFrom::Current).unwrap(), 4);
    urs.close_node(h).unwrap();
}

#[test]
fn test_tmp_listing_with_cursor() {
    let (urs, _, tmp) = setup();
    tmp.insert_file("b", b"").unwrap();
    tmp.insert_file("a", b"").unwrap();
    tmp.mkdir_all("c").unwrap();

    assert_eq!(list_all(&urs, "/tmp"), "a\nb\nc\n");

    let h = urs.open_node("/tmp", 0, PID).unwrap();
    let mut buf = [0u8; 64];
    assert_eq!(urs.list_node(h, &mut buf).unwrap(), 6);
    assert_eq!(urs.list_node(h, &mut buf).unwrap(), 0);
    assert_eq!(urs.seek_list(h, 2, SeekFrom::Begin).unwrap(), 2);
    let n = urs.list_node(h, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"b\nc\n");
    urs.close_node(h).unwrap();
}

#[test]
fn test_tmp_rename_and_remove() {
    let (urs, _, tmp) = setup();
    tmp.insert_file("draft", b"v1").unwrap();

    let h = urs.open_node("/tmp/draft", 0, PID).unwrap();
    urs.rename_node(h, "final").unwrap();
    urs.close_node(h).unwrap();

    assert!(matches!(
        urs.open_node("/tmp/draft", 0, PID),
        Err(UrsError::PathNotFound(_))
    ));
    assert_eq!(read_all(&urs, "/tmp/final"), b"v1");

    let h = urs.open_node("/tmp/final", 0, PID).unwrap();
    urs.remove_node(h, true).unwrap();
    assert!(matches!(urs.stat_node(h), Err(UrsError::BadHandle(_))));
    assert!(urs.open_handles().is_empty());
    assert_eq!(tmp.open_count(), 0);
    assert!(matches!(
        urs.open_node("/tmp/final", 0, PID),
        Err(UrsError::PathNotFound(_))
    ));
}

#[test]
fn test_remove_refused_keeps_handle() {
    let (urs, _, tmp) = setup();
    tmp.insert_file("full/inner", b"").unwrap();

    let h = urs.open_node("/tmp/full", 0, PID).unwrap();
    let err = urs.remove_node(h, false).unwrap_err();
    assert_eq!(err.errno(), -Status::NOT_EMPTY.0);

    // Still usable.
    assert!(urs.stat_node(h).unwrap().kind.is_dir());
    urs.close_node(h).unwrap();
}

#[test]
fn test_hard_link_through_service() {
    let (urs, _, tmp) = setup();
    tmp.insert_file("orig", b"same bytes").unwrap();

    let root = urs.open_node("/tmp", 0, PID).unwrap();
    urs.create_node(root, "alias", CreateKind::HardLink, 0, "/orig")
        .unwrap();
    urs.close_node(root).unwrap();

    assert_eq!(read_all(&urs, "/tmp/alias"), b"same bytes");
    let h = urs.open_node("/tmp/alias", 0, PID).unwrap();
    assert_eq!(urs.stat_node(h).unwrap().nlink, 2);
    urs.close_node(h).unwrap();
}

// ============================================================================
// Errors and introspection
// ============================================================================

#[test]
fn test_resolution_errors() {
    let (urs, _, _) = setup();

    assert!(matches!(
        urs.open_node("/nowhere/x", 0, PID),
        Err(UrsError::NoSuchMount(_))
    ));
    assert!(matches!(
        urs.open_node("/dev/sda", 0, PID),
        Err(UrsError::PathNotFound(_))
    ));
    assert!(matches!(
        urs.open_node("", 0, PID),
        Err(UrsError::InvalidPath(_))
    ));
    assert_eq!(urs.live_nodes(), 0);
}

#[test]
fn test_mount_snapshot() {
    let (urs, _, _) = setup();
    let h = urs.open_node("/tmp", 0, PID).unwrap();

    let mounts = urs.mounts();
    let paths: Vec<&str> = mounts.iter().map(|m| m.path.as_str()).collect();
    assert_eq!(paths, vec!["vfs://dev/", "vfs://tmp/"]);
    assert_eq!(mounts[0].refs, 1);
    assert_eq!(mounts[1].refs, 2);

    let handles = urs.open_handles();
    assert_eq!(handles.len(), 1);
    assert_eq!(handles[0].path, "/tmp");
    assert_eq!(handles[0].mount, "vfs://tmp/");
    assert_eq!(handles[0].process, PID);

    urs.close_node(h).unwrap();
}
