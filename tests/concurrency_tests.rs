// Several worker processes share one database file; each thread here opens
// its own connection the way a separate process would.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Barrier};
use std::thread;
use loongshot::db::DbConnection;
use loongshot::error::QueueError;
use loongshot::models::flags;
use loongshot::models::{Channel, InsertMode, SyncEntry};
use loongshot::repo::{Dequeued, Finalize, PackageRepo, TaskRepo};
use tempfile::TempDir;

fn shared_db() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("ledger.db");
    // Create the schema before the threads race to open it
    drop(DbConnection::open(&path).unwrap());
    (temp_dir, path)
}

fn spawn_workers<T, F>(path: &Path, count: usize, work: F) -> Vec<T>
where
    T: Send + 'static,
    F: Fn(usize, rusqlite::Connection) -> T + Send + Sync + 'static,
{
    let work = Arc::new(work);
    let barrier = Arc::new(Barrier::new(count));
    let handles: Vec<_> = (0..count)
        .map(|n| {
            let path = path.to_path_buf();
            let work = Arc::clone(&work);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let conn = DbConnection::open(&path).unwrap();
                barrier.wait();
                work(n, conn)
            })
        })
        .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

#[test]
fn test_each_task_is_dequeued_once() {
    let (_temp_dir, path) = shared_db();
    let names: Vec<String> = (0..40).map(|n| format!("pkg{:02}", n)).collect();
    {
        let conn = DbConnection::open(&path).unwrap();
        TaskRepo::enqueue(&conn, &names, 1, Channel::Stable, InsertMode::Append).unwrap();
    }

    let claimed = spawn_workers(&path, 4, |_, conn| {
        let mut mine = Vec::new();
        loop {
            match TaskRepo::dequeue(&conn, 1, true).unwrap() {
                Dequeued::Package(task) => {
                    assert!(TaskRepo::finalize(&conn, &task.pkgbase, 1, Finalize::Done).unwrap());
                    mine.push(task.pkgbase);
                }
                Dequeued::Command(_) => unreachable!("no commands were queued"),
                Dequeued::Stop | Dequeued::Drained => break,
            }
        }
        mine
    });

    let all: Vec<String> = claimed.into_iter().flatten().collect();
    let unique: HashSet<&String> = all.iter().collect();
    assert_eq!(all.len(), 40, "a task was claimed twice or lost");
    assert_eq!(unique.len(), 40);
}

#[test]
fn test_concurrent_enqueue_of_same_package() {
    let (_temp_dir, path) = shared_db();

    let results = spawn_workers(&path, 6, |n, conn| {
        let names = vec!["zlib".to_string()];
        TaskRepo::enqueue(&conn, &names, n as i64 + 1, Channel::Stable, InsertMode::Append)
    });

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(QueueError::Conflict(_))))
        .count();
    assert_eq!(succeeded, 1);
    assert_eq!(conflicts, 5);
}

#[test]
fn test_concurrent_inserts_keep_numbering_dense() {
    let (_temp_dir, path) = shared_db();
    let base: Vec<String> = (0..5).map(|n| format!("base{}", n)).collect();
    {
        let conn = DbConnection::open(&path).unwrap();
        TaskRepo::enqueue(&conn, &base, 1, Channel::Stable, InsertMode::Append).unwrap();
    }

    spawn_workers(&path, 6, |n, conn| {
        let names = vec![format!("ins{}a", n), format!("ins{}b", n)];
        let mode = if n % 2 == 0 { InsertMode::Top } else { InsertMode::At(2) };
        TaskRepo::enqueue(&conn, &names, 1, Channel::Stable, mode).unwrap();
    });

    let conn = DbConnection::open(&path).unwrap();
    let tasks = TaskRepo::list(&conn, 1).unwrap();
    let tasknos: Vec<i64> = tasks.iter().map(|t| t.taskno).collect();
    assert_eq!(tasknos, (1..=17).collect::<Vec<i64>>());

    let unique: HashSet<&str> = tasks.iter().map(|t| t.pkgbase.as_str()).collect();
    assert_eq!(unique.len(), 17);

    // Each batch stays contiguous and the original rows keep their order
    for n in 0..6 {
        let first = tasks.iter().position(|t| t.pkgbase == format!("ins{}a", n)).unwrap();
        assert_eq!(tasks[first + 1].pkgbase, format!("ins{}b", n));
    }
    let originals: Vec<&str> = tasks
        .iter()
        .map(|t| t.pkgbase.as_str())
        .filter(|p| p.starts_with("base"))
        .collect();
    assert_eq!(originals, vec!["base0", "base1", "base2", "base3", "base4"]);
}

#[test]
fn test_concurrent_bit_updates_are_not_lost() {
    let (_temp_dir, path) = shared_db();
    {
        let conn = DbConnection::open(&path).unwrap();
        let entry = SyncEntry {
            base: "zlib".to_string(),
            ..SyncEntry::default()
        };
        PackageRepo::sync(&conn, &[entry]).unwrap();
    }

    let bits = [
        flags::PATCH,
        flags::NOCHECK,
        flags::OLDCONFIG,
        flags::QEMU,
        flags::HASLOG,
        flags::SKIPPGP,
        flags::SKIPHASH,
        flags::TESTING,
    ];
    spawn_workers(&path, bits.len(), move |n, conn| {
        PackageRepo::update_bits(&conn, "zlib", bits[n], 0).unwrap();
    });

    let conn = DbConnection::open(&path).unwrap();
    let expected = bits.iter().fold(0, |acc, bit| acc | bit);
    assert_eq!(PackageRepo::read(&conn, "zlib").unwrap(), Some(expected));
}
