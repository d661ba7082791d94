//! Index-based union-find forest over fragment ids.

use ahash::AHashMap;

/// Union-find forest mapping every fragment to its current root.
///
/// Unions are directed: the caller chooses which root survives, so a merge
/// result keeps the id of the segment it was merged into.
#[derive(Debug, Clone)]
pub struct MergeForest {
    ids: Vec<u64>,
    index: AHashMap<u64, usize>,
    parent: Vec<usize>,
}

impl MergeForest {
    /// Create a forest where every id is its own root.
    pub fn new(ids: &[u64]) -> Self {
        let index = ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();
        Self {
            ids: ids.to_vec(),
            index,
            parent: (0..ids.len()).collect(),
        }
    }

    /// All ids in the forest, in construction order.
    pub fn ids(&self) -> &[u64] {
        &self.ids
    }

    pub fn contains(&self, id: u64) -> bool {
        self.index.contains_key(&id)
    }

    /// Current root of `id` without modifying the forest.
    pub fn find(&self, id: u64) -> Option<u64> {
        let mut current = *self.index.get(&id)?;
        while self.parent[current] != current {
            current = self.parent[current];
        }
        Some(self.ids[current])
    }

    /// Current root of `id`, compressing the path walked.
    pub fn find_mut(&mut self, id: u64) -> Option<u64> {
        let start = *self.index.get(&id)?;
        let mut root = start;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut current = start;
        while self.parent[current] != root {
            let next = self.parent[current];
            self.parent[current] = root;
            current = next;
        }
        Some(self.ids[root])
    }

    /// Whether `id` is currently a root.
    pub fn is_root(&self, id: u64) -> bool {
        self.index
            .get(&id)
            .is_some_and(|&i| self.parent[i] == i)
    }

    /// Attach root `child` under root `root`. Returns false if either id is
    /// unknown or not a root, or if they are the same.
    pub fn union(&mut self, root: u64, child: u64) -> bool {
        let (Some(&r), Some(&c)) = (self.index.get(&root), self.index.get(&child)) else {
            return false;
        };
        if r == c || self.parent[r] != r || self.parent[c] != c {
            return false;
        }
        self.parent[c] = r;
        true
    }
}
