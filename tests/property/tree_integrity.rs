//! Property-based tests for tree integrity under random operation sequences

use contree::config::ContinuationsConfig;
use contree::continuation::{Continuation, ContinuationsManager, NewContinuation, NodeState};
use contree::types::ContinuationId;
use parking_lot::Mutex;
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
enum Op {
    /// Create under the n-th created node (modulo), or as a root
    Create { parent: Option<usize>, ttl_ms: u64 },
    Invalidate(usize),
    /// Sweep with the clock advanced to `at_ms` after the run started
    Sweep { at_ms: u64 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (proptest::option::of(any::<usize>()), 1u64..200)
            .prop_map(|(parent, ttl_ms)| Op::Create { parent, ttl_ms }),
        1 => any::<usize>().prop_map(Op::Invalidate),
        1 => (0u64..400).prop_map(|at_ms| Op::Sweep { at_ms }),
    ]
}

type Node = Arc<Continuation<usize>>;

fn check_forest(manager: &ContinuationsManager<usize>) {
    let infos = manager.list_all();
    let parents: HashMap<ContinuationId, Option<ContinuationId>> = infos
        .iter()
        .map(|info| (info.id.clone(), info.parent_id.clone()))
        .collect();

    for info in &infos {
        let mut current = info.parent_id.clone();
        let mut steps = 0;
        while let Some(parent) = current {
            steps += 1;
            assert!(steps <= infos.len(), "cycle through {}", info.id);
            current = parents
                .get(&parent)
                .unwrap_or_else(|| panic!("{} has a parent that is not live", info.id))
                .clone();
        }
        for child in &info.child_ids {
            assert_eq!(parents.get(child), Some(&Some(info.id.clone())));
        }
        // Sweep candidates are exactly the nodes with fewer than two children
        assert_eq!(info.expiration_tracked, info.child_ids.len() < 2);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_tree_stays_consistent(ops in proptest::collection::vec(op_strategy(), 1..80)) {
        let manager = ContinuationsManager::new(ContinuationsConfig::default());
        let disposals: Arc<Mutex<HashMap<usize, usize>>> = Arc::new(Mutex::new(HashMap::new()));
        let start = Instant::now();
        let mut created: Vec<Node> = Vec::new();

        for op in ops {
            match op {
                Op::Create { parent, ttl_ms } => {
                    let seq = created.len();
                    let disposals = Arc::clone(&disposals);
                    let mut request = NewContinuation::new(seq, "flow")
                        .time_to_live(Duration::from_millis(ttl_ms))
                        .disposer(move |c: &Continuation<usize>| {
                            *disposals.lock().entry(*c.payload()).or_insert(0) += 1;
                            Ok(())
                        });
                    let parent = parent
                        .filter(|_| !created.is_empty())
                        .map(|p| Arc::clone(&created[p % created.len()]));
                    if let Some(parent) = &parent {
                        request = request.parent(parent);
                    }
                    match manager.create(request) {
                        Ok(node) => created.push(node),
                        Err(_) => prop_assert!(parent.map_or(false, |p| !p.is_live())),
                    }
                }
                Op::Invalidate(index) => {
                    if created.is_empty() {
                        continue;
                    }
                    let node = &created[index % created.len()];
                    let was_live = node.is_live();
                    let result = manager.invalidate(node);
                    prop_assert_eq!(result.is_ok(), was_live);
                }
                Op::Sweep { at_ms } => {
                    manager.sweep_at(start + Duration::from_millis(at_ms));
                }
            }
            check_forest(&manager);
        }

        let disposals = disposals.lock();
        for (seq, node) in created.iter().enumerate() {
            let count = disposals.get(&seq).copied().unwrap_or(0);
            match node.state() {
                NodeState::Live => prop_assert_eq!(count, 0),
                NodeState::Disposed => prop_assert_eq!(count, 1),
                NodeState::Detached => prop_assert!(false, "node left detached"),
            }
        }
        let live = created.iter().filter(|n| n.is_live()).count();
        prop_assert_eq!(manager.metrics().live as usize, live);
        prop_assert_eq!(manager.list_all().len(), live);
    }
}
