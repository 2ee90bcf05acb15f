//! Concurrency tests: identifier uniqueness and racing invalidation/sweep

use super::test_utils::{manager_with, DisposeLog};
use contree::continuation::{Continuation, NewContinuation};
use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_concurrent_creates_yield_distinct_ids() {
    // Two random bytes per id make collisions frequent enough to exercise regeneration
    let manager = Arc::new(manager_with(|c| c.id_bytes = 2));
    let threads = 8;
    let per_thread = 500;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                (0..per_thread)
                    .map(|_| {
                        manager
                            .create(NewContinuation::new("p", "flow"))
                            .unwrap()
                            .id()
                            .to_string()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut ids = HashSet::new();
    for handle in handles {
        for id in handle.join().unwrap() {
            assert!(ids.insert(id), "duplicate continuation id");
        }
    }
    assert_eq!(ids.len(), threads * per_thread);
    assert_eq!(manager.metrics().live as usize, threads * per_thread);
}

#[test]
fn test_racing_invalidation_and_sweep_dispose_once() {
    let manager = Arc::new(manager_with(|_| {}));
    let log = DisposeLog::new();
    let start = Instant::now();

    let mut nodes: Vec<Arc<Continuation<&'static str>>> = Vec::new();
    for _ in 0..50 {
        let root = manager
            .create(log.request("r", "flow").time_to_live(Duration::from_millis(1)))
            .unwrap();
        let child = manager
            .create(
                log.request("c", "flow")
                    .parent(&root)
                    .time_to_live(Duration::from_millis(1)),
            )
            .unwrap();
        nodes.push(root);
        nodes.push(child);
    }

    let barrier = Arc::new(Barrier::new(3));
    let sweeper = {
        let manager = Arc::clone(&manager);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            manager.sweep_at(start + Duration::from_secs(1)).removed()
        })
    };
    let invalidators: Vec<_> = [0usize, 1]
        .into_iter()
        .map(|offset| {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            let nodes = nodes.clone();
            thread::spawn(move || {
                barrier.wait();
                nodes
                    .iter()
                    .skip(offset)
                    .step_by(2)
                    .filter_map(|node| manager.invalidate(node).ok())
                    .sum::<usize>()
            })
        })
        .collect();

    let mut removed = sweeper.join().unwrap();
    for handle in invalidators {
        removed += handle.join().unwrap();
    }

    assert_eq!(removed, 100);
    assert_eq!(log.len(), 100);
    for node in &nodes {
        assert_eq!(log.count_of(node.id().as_str()), 1);
    }
    assert!(manager.list_all().is_empty());
    assert_eq!(manager.metrics().live, 0);
}
