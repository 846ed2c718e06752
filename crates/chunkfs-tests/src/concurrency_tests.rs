//! Many readers sharing one adapter, with the tree swapped underneath them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crate::harness::{TestEnv, SAMPLE_A};

fn body(seed: u8, len: usize) -> Vec<u8> {
    (0..len).map(|i| seed.wrapping_add((i % 251) as u8)).collect()
}

#[test]
fn test_parallel_readers_see_consistent_bytes() {
    let env = TestEnv::new("parallel_readers");
    let files: Vec<(String, Vec<u8>)> = (0..8u8)
        .map(|i| (format!("dir{}/file{}.bin", i % 3, i), body(i, 300 + i as usize * 37)))
        .collect();
    for (path, data) in &files {
        env.write_file(path, data);
    }
    let mount = env.chunked_mount(32);

    thread::scope(|s| {
        for t in 0..8usize {
            let mount = &mount;
            let files = &files;
            s.spawn(move || {
                for round in 0..10 {
                    let (path, data) = &files[(t + round) % files.len()];
                    let got = mount.read_all(path, 17 + t as u64).unwrap();
                    assert_eq!(&got, data, "thread {t} round {round} path {path}");
                }
            });
        }
    });

    assert_eq!(mount.adapter.open_handles(), 0);
}

#[test]
fn test_handles_are_unique_across_threads() {
    let env = TestEnv::new("unique_handles");
    env.sample_tree();
    let mount = env.chunked_mount(4);

    let mut handles: Vec<u64> = thread::scope(|s| {
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let adapter = &mount.adapter;
                s.spawn(move || {
                    (0..50)
                        .map(|_| adapter.open_file("a.txt").unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        workers
            .into_iter()
            .flat_map(|w| w.join().unwrap())
            .collect()
    });

    assert_eq!(mount.adapter.open_handles(), 200);
    handles.sort_unstable();
    handles.dedup();
    assert_eq!(handles.len(), 200);
    for fh in handles {
        mount.adapter.release(fh).unwrap();
    }
    assert_eq!(mount.adapter.open_handles(), 0);
}

#[test]
fn test_reads_survive_tree_replacement() {
    let env = TestEnv::new("tree_swap");
    let original = env.sample_tree();
    let mount = env.chunked_mount(4);

    env.write_file("extra.txt", b"later");
    let extended = env.scan();
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        for _ in 0..4 {
            let mount = &mount;
            let done = &done;
            s.spawn(move || {
                while !done.load(Ordering::Relaxed) {
                    // a.txt exists in both trees and its bytes never change.
                    assert_eq!(mount.read_all("a.txt", 5).unwrap(), SAMPLE_A);
                    let names = mount.adapter.list_directory("").unwrap();
                    assert!(names.len() == 2 || names.len() == 3);
                }
            });
        }

        for i in 0..200 {
            let tree = if i % 2 == 0 {
                extended.clone()
            } else {
                original.clone()
            };
            mount.adapter.replace_tree(tree);
        }
        done.store(true, Ordering::Relaxed);
    });

    assert_eq!(mount.adapter.open_handles(), 0);
}

#[test]
fn test_open_handle_outlives_tree_replacement() {
    let env = TestEnv::new("handle_outlives");
    env.sample_tree();
    let mount = env.chunked_mount(4);

    let fh = mount.adapter.open_file("a.txt").unwrap();
    env.mkdir("only_dirs");
    let tree = chunkfs_meta::DirectoryTree::from_path(&env.data_dir().join("only_dirs")).unwrap();
    mount.adapter.replace_tree(tree);

    assert!(mount.adapter.get_attributes("a.txt").is_err());
    assert_eq!(&mount.adapter.read(fh, 0, 12).unwrap()[..], SAMPLE_A);
    mount.adapter.release(fh).unwrap();
}
