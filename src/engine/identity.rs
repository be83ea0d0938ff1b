use dashmap::DashSet;

/// Instance identifiers submitted during the lifetime of an engine.
///
/// A fast pre-check in front of the index lookup, catching duplicates the
/// last commit does not show yet. It never shrinks and starts empty on every
/// restart; the index lookup stays the authoritative check.
#[derive(Debug, Default)]
pub struct IndexedIdentitySet {
    seen: DashSet<String>,
}

impl IndexedIdentitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `uid`. Returns `false` if it was already recorded.
    pub fn insert(&self, uid: &str) -> bool {
        self.seen.insert(uid.to_string())
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.seen.contains(uid)
    }

    /// Forget `uid`, used when its document never reached the writer.
    pub fn remove(&self, uid: &str) -> bool {
        self.seen.remove(uid).is_some()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_insert_once() {
        let set = IndexedIdentitySet::new();
        assert!(set.insert("1.2.3"));
        assert!(!set.insert("1.2.3"));
        assert!(set.contains("1.2.3"));
        assert!(set.remove("1.2.3"));
        assert!(set.is_empty());
    }

    #[test]
    fn test_concurrent_inserts_have_one_winner() {
        let set = Arc::new(IndexedIdentitySet::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let set = Arc::clone(&set);
                std::thread::spawn(move || set.insert("1.2.840.1"))
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(set.len(), 1);
    }
}
