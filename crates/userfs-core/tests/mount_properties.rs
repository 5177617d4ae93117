// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! End-to-end behaviour of the operation table over the in-memory backend

use std::sync::Arc;

use userfs_core::{
    AdapterFactory, MemoryBackend, MountConfig, OpCall, OperationTable, Owner, Payload,
};

const OWNER: Owner = Owner { uid: 1000, gid: 1000 };

fn mount(users: &[&str]) -> (MemoryBackend, OperationTable) {
    let backend = MemoryBackend::new();
    for user in users {
        backend.add_user(user).unwrap();
    }
    let factory =
        AdapterFactory::new(Arc::new(backend.clone()), MountConfig::default()).with_owner(OWNER);
    let fs = factory.create_for_users(users).unwrap();
    (backend, OperationTable::build(fs))
}

fn entries(table: &OperationTable, path: &str) -> Vec<String> {
    let outcome = table.dispatch(OpCall::Readdir { path });
    assert_eq!(outcome.code, 0, "readdir {path}");
    match outcome.payload {
        Payload::Entries(names) => names,
        other => panic!("unexpected payload {other:?}"),
    }
}

fn read_all(table: &OperationTable, path: &str) -> Vec<u8> {
    let outcome = table.dispatch(OpCall::Read { path, size: 4096, offset: 0 });
    assert!(outcome.is_ok(), "read {path}: {}", outcome.code);
    match outcome.payload {
        Payload::Data(data) => {
            assert_eq!(outcome.code as usize, data.len());
            data
        }
        other => panic!("unexpected payload {other:?}"),
    }
}

fn size_of(table: &OperationTable, path: &str) -> u64 {
    match table.dispatch(OpCall::Getattr { path }).payload {
        Payload::Attr(stat) => stat.size,
        other => panic!("unexpected payload {other:?}"),
    }
}

#[test]
fn root_lists_identifiers_once_in_registration_order() {
    let users = ["carol", "alice", "bob"];
    let (_, table) = mount(&users);
    let listed = entries(&table, "/");
    assert_eq!(listed, vec![".", "..", "carol", "alice", "bob"]);
}

#[test]
fn unregistered_first_level_paths_are_not_implemented() {
    let (_, table) = mount(&["alice", "bob"]);
    let enosys = -libc::ENOSYS;
    for path in ["/mallory", "/alice", "/"] {
        assert_eq!(table.dispatch(OpCall::Mknod { path, mode: 0o644, dev: 0 }).code, enosys);
        assert_eq!(table.dispatch(OpCall::Mkdir { path, mode: 0o755 }).code, enosys);
        assert_eq!(table.dispatch(OpCall::Unlink { path }).code, enosys);
        assert_eq!(table.dispatch(OpCall::Rmdir { path }).code, enosys);
        assert_eq!(table.dispatch(OpCall::Chmod { path, mode: 0o600 }).code, enosys);
        assert_eq!(table.dispatch(OpCall::Chown { path, uid: 0, gid: 0 }).code, enosys);
        assert_eq!(table.dispatch(OpCall::Truncate { path, length: 0 }).code, enosys);
        assert_eq!(table.dispatch(OpCall::Utime { path }).code, enosys);
        assert_eq!(table.dispatch(OpCall::Open { path, flags: 0 }).code, enosys);
        assert_eq!(
            table.dispatch(OpCall::Write { path, data: b"x", offset: 0 }).code,
            enosys
        );
    }
    assert_eq!(table.dispatch(OpCall::Getattr { path: "/mallory" }).code, enosys);
}

#[test]
fn written_text_reads_back_with_its_size() {
    let (_, table) = mount(&["alice", "bob"]);
    let path = "/alice/lorem.txt";
    assert_eq!(table.dispatch(OpCall::Mknod { path, mode: 0o644, dev: 0 }).code, 0);

    let written = table.dispatch(OpCall::Write { path, data: b"Lorem ipsum", offset: 0 });
    assert_eq!(written.code, 11);
    assert_eq!(read_all(&table, path), b"Lorem ipsum");
    assert_eq!(size_of(&table, path), 11);
}

#[test]
fn single_user_mount_serves_paths_directly() {
    let (backend, table) = mount(&["alice"]);
    backend.seed_file("alice", "/notes.txt", b"hello").unwrap();
    assert_eq!(entries(&table, "/"), vec![".", "..", "notes.txt"]);
    assert_eq!(read_all(&table, "/notes.txt"), b"hello");
    assert!(table.lookup("getxattr").is_some());
}

#[test]
fn rename_across_namespaces_moves_the_entry() {
    let (backend, table) = mount(&["alice", "bob"]);
    backend.seed_file("alice", "/report.pdf", b"%PDF-1.7").unwrap();

    let outcome = table.dispatch(OpCall::Rename {
        from: "/alice/report.pdf",
        to: "/bob/report.pdf",
    });
    assert_eq!(outcome.code, 0);
    assert!(!entries(&table, "/alice").contains(&"report.pdf".to_string()));
    assert!(entries(&table, "/bob").contains(&"report.pdf".to_string()));
    assert_eq!(read_all(&table, "/bob/report.pdf"), b"%PDF-1.7");
}

#[test]
fn rename_within_namespace_preserves_content() {
    let (backend, table) = mount(&["alice", "bob"]);
    backend.seed_folder("alice", "/archive").unwrap();
    backend.seed_file("alice", "/draft.md", b"# Title\n").unwrap();

    let outcome = table.dispatch(OpCall::Rename {
        from: "/alice/draft.md",
        to: "/alice/archive/final.md",
    });
    assert_eq!(outcome.code, 0);
    assert_eq!(read_all(&table, "/alice/archive/final.md"), b"# Title\n");
    assert_eq!(table.dispatch(OpCall::Getattr { path: "/alice/draft.md" }).code, -libc::ENOENT);
}

#[test]
fn locked_cross_namespace_rename_fails_generically() {
    let (backend, table) = mount(&["alice", "bob"]);
    backend.seed_file("alice", "/busy", b"").unwrap();
    backend.lock_node("alice", "/busy");

    let outcome = table.dispatch(OpCall::Rename { from: "/alice/busy", to: "/bob/busy" });
    assert_eq!(outcome.code, -1);
    assert!(backend.exists("alice", "/busy"));
}

#[test]
fn root_size_is_sum_of_user_roots() {
    let (backend, table) = mount(&["alice", "bob"]);
    backend.seed_file("alice", "/a.bin", &[0u8; 100]).unwrap();
    backend.seed_file("bob", "/b.bin", &[0u8; 250]).unwrap();
    assert_eq!(size_of(&table, "/"), 350);
    assert_eq!(size_of(&table, "/bob"), 250);
}

#[test]
fn root_mtime_is_the_oldest_user_root() {
    let (backend, table) = mount(&["alice", "bob"]);
    backend.set_mtime("alice", "/", 1_700_000_500).unwrap();
    backend.set_mtime("bob", "/", 1_700_000_100).unwrap();
    match table.dispatch(OpCall::Getattr { path: "/" }).payload {
        Payload::Attr(stat) => assert_eq!(stat.times.mtime, 1_700_000_100),
        other => panic!("unexpected payload {other:?}"),
    }
}

#[test]
fn truncated_file_reads_empty() {
    let (backend, table) = mount(&["alice", "bob"]);
    backend.seed_file("alice", "/log.txt", b"some content").unwrap();
    assert_eq!(table.dispatch(OpCall::Truncate { path: "/alice/log.txt", length: 0 }).code, 0);

    for size in [0, 1, 64, 4096] {
        let outcome = table.dispatch(OpCall::Read { path: "/alice/log.txt", size, offset: 0 });
        assert_eq!(outcome.code, 0);
        assert_eq!(outcome.payload, Payload::Data(Vec::new()));
    }
}

#[test]
fn unlink_reports_missing_nodes_and_removes_existing_ones() {
    let (backend, table) = mount(&["alice", "bob"]);
    assert_eq!(table.dispatch(OpCall::Unlink { path: "/alice/ghost" }).code, -libc::ENOENT);

    backend.seed_file("alice", "/real", b"x").unwrap();
    assert_eq!(table.dispatch(OpCall::Unlink { path: "/alice/real" }).code, 0);
    assert_eq!(table.dispatch(OpCall::Getattr { path: "/alice/real" }).code, -libc::ENOENT);
}

#[test]
fn delegator_does_not_register_extended_attributes() {
    let (_, table) = mount(&["alice", "bob"]);
    assert!(table.lookup("getxattr").is_none());
    let outcome = table.dispatch(OpCall::Getxattr { path: "/alice/x", name: "user.tag" });
    assert_eq!(outcome.code, -libc::ENOSYS);
}

#[test]
fn readdir_refreshes_shared_state_first() {
    let (backend, table) = mount(&["alice", "bob"]);
    entries(&table, "/alice");
    entries(&table, "/alice");
    assert_eq!(backend.refresh_count("alice"), 2);
    assert_eq!(backend.refresh_count("bob"), 0);
}

#[test]
fn concurrent_writes_to_one_file_all_survive() {
    let (backend, table) = mount(&["alice", "bob"]);
    backend.seed_file("alice", "/f", &[b'.'; 65]).unwrap();

    let codes: Vec<(u64, i32)> = std::thread::scope(|scope| {
        let handles: Vec<_> = (1..=64u64)
            .map(|offset| {
                let table = &table;
                scope.spawn(move || {
                    let outcome =
                        table.dispatch(OpCall::Write { path: "/alice/f", data: b"X", offset });
                    (offset, outcome.code)
                })
            })
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    let content = backend.content("alice", "/f").unwrap();
    assert_eq!(content.len(), 65);
    assert_eq!(content[0], b'.');
    for (offset, code) in codes {
        assert_eq!(code, 1, "write at {offset}");
        assert_eq!(content[offset as usize], b'X', "write at {offset} was lost");
    }
}

#[test]
fn write_to_locked_file_is_generic_failure() {
    let (backend, table) = mount(&["alice", "bob"]);
    backend.seed_file("alice", "/held", b"orig").unwrap();
    backend.lock_node("alice", "/held");

    let outcome = table.dispatch(OpCall::Write { path: "/alice/held", data: b"new", offset: 2 });
    assert_eq!(outcome.code, -1);
    assert_eq!(backend.content("alice", "/held").unwrap(), b"orig");
}
