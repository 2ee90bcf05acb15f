//! Integration tests for continuation creation, lookup and invalidation

use super::test_utils::{manager_with, DisposeLog};
use contree::continuation::{NewContinuation, NodeState};
use contree::error::ApiError;
use std::time::Duration;

#[test]
fn test_root_child_lookup_and_invalidate() {
    let manager = manager_with(|_| {});
    let log = DisposeLog::new();

    let root = manager
        .create(log.request("root", "flowA").time_to_live(Duration::from_millis(1000)))
        .unwrap();
    let child = manager
        .create(
            log.request("child", "flowA")
                .parent(&root)
                .time_to_live(Duration::from_millis(1000)),
        )
        .unwrap();

    let found = manager.lookup(child.id().as_str(), "flowA", None).unwrap();
    assert_eq!(found.id(), child.id());
    assert_eq!(*found.payload(), "child");
    assert_eq!(found.parent_id(), Some(root.id()));

    let miss = manager.lookup(child.id().as_str(), "flowB", None).unwrap_err();
    assert!(miss.is_not_found());

    assert_eq!(manager.invalidate(&root).unwrap(), 2);
    assert_eq!(log.ids(), vec![root.id().to_string(), child.id().to_string()]);

    assert!(manager.lookup(root.id().as_str(), "flowA", None).unwrap_err().is_not_found());
    assert!(manager.lookup(child.id().as_str(), "flowA", None).unwrap_err().is_not_found());
    assert_eq!(root.state(), NodeState::Disposed);
    assert_eq!(child.state(), NodeState::Disposed);
}

#[test]
fn test_cascade_spares_ancestors_and_siblings() {
    let manager = manager_with(|_| {});
    let log = DisposeLog::new();

    let root = manager.create(log.request("r", "flow")).unwrap();
    let x = manager.create(log.request("x", "flow").parent(&root)).unwrap();
    let sibling = manager.create(log.request("s", "flow").parent(&root)).unwrap();
    let x1 = manager.create(log.request("x1", "flow").parent(&x)).unwrap();
    let x2 = manager.create(log.request("x2", "flow").parent(&x)).unwrap();
    let x11 = manager.create(log.request("x11", "flow").parent(&x1)).unwrap();

    assert_eq!(manager.invalidate(&x).unwrap(), 4);

    for node in [&x, &x1, &x2, &x11] {
        assert_eq!(log.count_of(node.id().as_str()), 1);
        assert!(!manager.contains(node.id().as_str(), None));
    }
    assert_eq!(log.count_of(root.id().as_str()), 0);
    assert_eq!(log.count_of(sibling.id().as_str()), 0);
    assert!(root.is_live());
    assert!(sibling.is_live());

    // Depth-first, node before its descendants
    assert_eq!(
        log.ids(),
        vec![
            x.id().to_string(),
            x1.id().to_string(),
            x11.id().to_string(),
            x2.id().to_string()
        ]
    );

    let remaining: Vec<_> = manager.children(&root).iter().map(|c| c.id().clone()).collect();
    assert_eq!(remaining, vec![sibling.id().clone()]);
}

#[test]
fn test_invalidating_twice_disposes_once() {
    let manager = manager_with(|_| {});
    let log = DisposeLog::new();
    let node = manager.create(log.request("n", "flow")).unwrap();

    assert_eq!(manager.invalidate(&node).unwrap(), 1);
    let again = manager.invalidate(&node).unwrap_err();
    assert!(matches!(again, ApiError::NotFound(_)));
    assert_eq!(log.len(), 1);
}

#[test]
fn test_scope_isolation_and_legacy_compat() {
    let strict = manager_with(|_| {});
    let node = strict.create(NewContinuation::new("p", "A")).unwrap();
    assert!(strict.lookup(node.id().as_str(), "A", None).is_ok());
    assert!(strict.lookup(node.id().as_str(), "B", None).unwrap_err().is_not_found());

    let permissive = manager_with(|c| c.legacy_scope_compat = true);
    let node = permissive.create(NewContinuation::new("p", "A")).unwrap();
    let found = permissive.lookup(node.id().as_str(), "B", None).unwrap();
    assert_eq!(found.scope_tag(), "A");
}

#[test]
fn test_failing_disposer_does_not_block_removal() {
    let manager = manager_with(|_| {});
    let root = manager
        .create(NewContinuation::new("r", "flow").disposer(|_| Err(anyhow::anyhow!("busy"))))
        .unwrap();
    let child = manager
        .create(NewContinuation::new("c", "flow").parent(&root).disposer(|_| panic!("broken disposer")))
        .unwrap();

    assert_eq!(manager.invalidate(&root).unwrap(), 2);
    assert!(!manager.contains(root.id().as_str(), None));
    assert!(!manager.contains(child.id().as_str(), None));
    assert_eq!(child.state(), NodeState::Disposed);

    let metrics = manager.metrics();
    assert_eq!(metrics.disposer_failures, 2);
    assert_eq!(metrics.live, 0);
    assert_eq!(metrics.invalidated, 2);
}

#[test]
fn test_list_all_reports_tree_shape() {
    let manager = manager_with(|_| {});
    let root = manager.create(NewContinuation::new("r", "flow")).unwrap();
    let a = manager.create(NewContinuation::new("a", "flow").parent(&root)).unwrap();
    manager.create(NewContinuation::new("b", "flow").parent(&root)).unwrap();
    let other = manager.create(NewContinuation::new("o", "other")).unwrap();

    let infos = manager.list_all();
    assert_eq!(infos.len(), 4);

    let root_info = infos.iter().find(|i| &i.id == root.id()).unwrap();
    assert_eq!(root_info.child_ids.len(), 2);
    assert!(root_info.parent_id.is_none());
    assert!(!root_info.expiration_tracked);

    let a_info = infos.iter().find(|i| &i.id == a.id()).unwrap();
    assert_eq!(a_info.parent_id.as_ref(), Some(root.id()));
    assert!(a_info.expiration_tracked);

    let other_info = infos.iter().find(|i| &i.id == other.id()).unwrap();
    assert_eq!(other_info.scope_tag, "other");

    let json = serde_json::to_value(&infos).unwrap();
    assert_eq!(json.as_array().unwrap().len(), 4);
}
