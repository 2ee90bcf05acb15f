//! Integration tests for session-bound continuation holders

use super::test_utils::{manager_with, DisposeLog};
use contree::continuation::NewContinuation;
use contree::error::ApiError;
use contree::types::SessionId;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_sessions_do_not_see_each_other() {
    let manager = manager_with(|c| c.session_bound = true);
    let alice = SessionId::new("alice");
    let bob = SessionId::new("bob");

    let a = manager
        .create(NewContinuation::new("a", "flow").session(alice.clone()))
        .unwrap();
    let b = manager
        .create(NewContinuation::new("b", "flow").session(bob.clone()))
        .unwrap();
    assert_eq!(manager.session_count(), 2);
    assert_eq!(a.session(), Some(&alice));

    assert!(manager.lookup(a.id().as_str(), "flow", Some(&alice)).is_ok());
    assert!(manager.lookup(a.id().as_str(), "flow", Some(&bob)).unwrap_err().is_not_found());
    assert!(manager.lookup(b.id().as_str(), "flow", Some(&alice)).unwrap_err().is_not_found());
    assert!(!manager.contains(a.id().as_str(), Some(&SessionId::new("carol"))));
    assert_eq!(manager.session_count(), 2);
}

#[test]
fn test_cross_session_parent_rejected() {
    let manager = manager_with(|c| c.session_bound = true);
    let root = manager
        .create(NewContinuation::new("r", "flow").session("alice"))
        .unwrap();
    let err = manager
        .create(NewContinuation::new("c", "flow").parent(&root).session("bob"))
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidParent(_)));
}

#[test]
fn test_end_session_disposes_whole_holder() {
    let manager = manager_with(|c| c.session_bound = true);
    let log = DisposeLog::new();
    let session = SessionId::new("s");

    let r1 = manager.create(log.request("r1", "flow").session(session.clone())).unwrap();
    let c1 = manager.create(log.request("c1", "flow").parent(&r1)).unwrap();
    manager.create(log.request("c2", "flow").parent(&c1)).unwrap();
    manager.create(log.request("r2", "flow").session(session.clone())).unwrap();
    let other = manager.create(log.request("o", "flow").session("other")).unwrap();

    assert_eq!(manager.end_session(&session), 4);
    assert_eq!(log.len(), 4);
    assert_eq!(log.count_of(other.id().as_str()), 0);
    assert!(manager.lookup(r1.id().as_str(), "flow", Some(&session)).is_err());
    assert_eq!(manager.session_count(), 1);

    // Handles from the ended session cannot be used as parents
    let err = manager
        .create(NewContinuation::new("late", "flow").parent(&r1))
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidParent(_)));
    assert_eq!(manager.metrics().live, 1);
}

#[test]
fn test_sweep_reaches_session_holders() {
    let manager = manager_with(|c| c.session_bound = true);
    let log = DisposeLog::new();
    let start = Instant::now();
    for session in ["s1", "s2", "s3"] {
        manager
            .create(
                log.request("leaf", "flow")
                    .session(session)
                    .time_to_live(Duration::from_millis(5)),
            )
            .unwrap();
    }

    let report = manager.sweep_at(start + Duration::from_secs(1));
    assert_eq!(report.expired, 3);
    assert_eq!(log.len(), 3);
}

#[test]
fn test_concurrent_create_and_end_session() {
    let manager = Arc::new(manager_with(|c| c.session_bound = true));
    let log = DisposeLog::new();
    let session = SessionId::new("churn");

    let creators: Vec<_> = (0..4)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let log = log.clone();
            let session = session.clone();
            thread::spawn(move || {
                let mut created = 0;
                for _ in 0..200 {
                    if manager
                        .create(log.request("x", "flow").session(session.clone()))
                        .is_ok()
                    {
                        created += 1;
                    }
                }
                created
            })
        })
        .collect();

    let mut ended = 0;
    for _ in 0..20 {
        ended += manager.end_session(&session);
        thread::yield_now();
    }

    let created: usize = creators.into_iter().map(|h| h.join().unwrap()).sum();
    ended += manager.end_session(&session);

    assert_eq!(created, 800);
    assert_eq!(ended, created);
    assert_eq!(log.len(), created);
    assert_eq!(manager.metrics().live, 0);
}
