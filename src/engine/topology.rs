use std::collections::HashSet;

use parking_lot::RwLock;

use super::ClusterTopology;

/// In-memory copy of the cluster routing table.
///
/// Readers never wait on the network; the owner replaces the whole set after
/// each successful cluster state fetch.
#[derive(Debug, Default)]
pub struct RoutingTableCache {
    indices: RwLock<HashSet<String>>,
}

impl RoutingTableCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the known indices with `indices`.
    pub fn replace<I, S>(&self, indices: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.indices.write() = indices.into_iter().map(Into::into).collect();
    }

    /// Number of known indices.
    pub fn index_count(&self) -> usize {
        self.indices.read().len()
    }
}

impl ClusterTopology for RoutingTableCache {
    fn has_index(&self, index: &str) -> bool {
        self.indices.read().contains(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_empty() {
        let cache = RoutingTableCache::new();
        assert_eq!(cache.index_count(), 0);
        assert!(!cache.has_index("anything"));
    }

    #[test]
    fn test_replace_swaps_whole_set() {
        let cache = RoutingTableCache::new();
        cache.replace(["a", "b"]);
        assert!(cache.has_index("a"));
        assert_eq!(cache.index_count(), 2);

        cache.replace(vec!["c".to_string()]);
        assert!(!cache.has_index("a"));
        assert!(cache.has_index("c"));
        assert_eq!(cache.index_count(), 1);
    }
}
