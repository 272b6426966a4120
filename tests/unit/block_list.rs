//! Block List Unit Tests
//!
//! Temporary block lifecycle: create, refresh, expire, purge.

use rate_guard::limiter::BlockList;

#[test]
fn test_block_visible_until_expiry() {
    let list = BlockList::new();
    list.block("203.0.113.9", 5000.0);
    assert_eq!(list.check("203.0.113.9", 4999.9), Some(5000.0));
    assert_eq!(list.check("203.0.113.9", 5000.0), None);
}

#[test]
fn test_refresh_extends_block() {
    let list = BlockList::new();
    list.block("203.0.113.9", 5000.0);
    list.block("203.0.113.9", 9000.0);
    assert_eq!(list.check("203.0.113.9", 6000.0), Some(9000.0));
}

#[test]
fn test_unknown_ip_not_blocked() {
    let list = BlockList::new();
    assert_eq!(list.check("203.0.113.10", 0.0), None);
}

#[test]
fn test_live_count_excludes_expired() {
    let list = BlockList::new();
    list.block("203.0.113.1", 100.0);
    list.block("203.0.113.2", 200.0);
    list.block("203.0.113.3", 300.0);
    assert_eq!(list.len(150.0), 2);
    assert!(!list.is_empty(150.0));
    assert!(list.is_empty(1000.0));
}

#[test]
fn test_manual_unblock() {
    let list = BlockList::new();
    list.block("203.0.113.9", 5000.0);
    assert!(list.unblock("203.0.113.9"));
    assert!(!list.unblock("203.0.113.9"));
    assert_eq!(list.check("203.0.113.9", 0.0), None);
}
