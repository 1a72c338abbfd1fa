//! Id-based deduplication of collected records.
//!
//! [`merge`] is a pure function: the seen-id set goes in and comes back out,
//! so a run (or a combine pass) owns its set explicitly and nothing is cached
//! between calls.

use std::collections::HashSet;

use crate::model::Keyed;

/// Drops every value whose id is already in `seen`, keeping first-seen order.
///
/// Duplicates inside `new_items` are also dropped (the first occurrence wins).
/// Returns the kept values and the updated seen-id set.
///
/// # Example
///
/// ```
/// use std::collections::HashSet;
/// use harvester_core::dedupe::merge;
/// use harvester_core::model::Moderator;
///
/// let mods = vec![
///     Moderator { name: "a".into(), id: "t2_a".into(), permissions: vec![] },
///     Moderator { name: "a".into(), id: "t2_a".into(), permissions: vec![] },
/// ];
/// let (kept, seen) = merge(HashSet::new(), mods);
/// assert_eq!(kept.len(), 1);
/// assert!(seen.contains("a"));
/// ```
#[must_use]
pub fn merge<T: Keyed>(mut seen: HashSet<String>, new_items: Vec<T>) -> (Vec<T>, HashSet<String>) {
    let mut kept = Vec::with_capacity(new_items.len());
    for item in new_items {
        if seen.insert(item.key().to_string()) {
            kept.push(item);
        }
    }
    (kept, seen)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::post;

    fn ids<T: Keyed>(items: &[T]) -> Vec<&str> {
        items.iter().map(Keyed::key).collect()
    }

    #[test]
    fn test_merge_keeps_order_and_drops_seen() {
        let seen: HashSet<String> = ["b".to_string()].into_iter().collect();
        let (kept, seen) = merge(seen, vec![post("a"), post("b"), post("c")]);
        assert_eq!(ids(&kept), ["a", "c"]);
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_merge_drops_duplicates_within_batch() {
        let (kept, _) = merge(HashSet::new(), vec![post("a"), post("a"), post("b")]);
        assert_eq!(ids(&kept), ["a", "b"]);
    }

    #[test]
    fn test_merge_twice_is_idempotent() {
        let batch = vec![post("a"), post("b")];
        let (first, seen) = merge(HashSet::new(), batch.clone());
        assert_eq!(first.len(), 2);
        let (second, seen_again) = merge(seen.clone(), batch);
        assert!(second.is_empty());
        assert_eq!(seen, seen_again);
    }

    #[test]
    fn test_merge_empty_input() {
        let (kept, seen) = merge::<crate::model::Item>(HashSet::new(), Vec::new());
        assert!(kept.is_empty());
        assert!(seen.is_empty());
    }
}
