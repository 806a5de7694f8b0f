use super::*;
use crate::test_support::entity;

#[test]
fn set_then_get_returns_snapshot() {
    let cache = EntityCache::new();
    assert!(cache.is_empty());

    cache.set(EntityId(1), entity(1, "Aceh", 23));

    assert_eq!(cache.get(EntityId(1)), Some(entity(1, "Aceh", 23)));
    assert_eq!(cache.get(EntityId(2)), None);
    assert_eq!(cache.len(), 1);
}

#[test]
fn set_overwrites_previous_entry() {
    let cache = EntityCache::new();
    cache.set(EntityId(3), entity(3, "Jambi", 11));
    let first = cache.entry(EntityId(3)).expect("first entry");

    cache.set(EntityId(3), entity(3, "Jambi Baru", 11));
    let second = cache.entry(EntityId(3)).expect("second entry");

    assert_eq!(cache.len(), 1);
    assert_eq!(second.entity.name, "Jambi Baru");
    assert!(second.cached_at >= first.cached_at);
}

#[test]
fn invalidate_removes_only_that_id() {
    let cache = EntityCache::new();
    cache.set(EntityId(1), entity(1, "Aceh", 23));
    cache.set(EntityId(2), entity(2, "Bali", 9));

    cache.invalidate(EntityId(1));
    cache.invalidate(EntityId(42));

    assert_eq!(cache.get(EntityId(1)), None);
    assert_eq!(cache.get(EntityId(2)), Some(entity(2, "Bali", 9)));
}

#[test]
fn clear_empties_cache() {
    let cache = EntityCache::new();
    cache.set(EntityId(1), entity(1, "Aceh", 23));
    cache.set(EntityId(2), entity(2, "Bali", 9));

    cache.clear();

    assert!(cache.is_empty());
}
