//! Disjoint-set clustering
//!
//! Union-by-rank with path compression over opaque element ids.
//! `find` implicitly inserts singletons; `union` is idempotent.

use std::collections::HashMap;
use std::hash::Hash;

/// Disjoint-set forest over arbitrary hashable ids.
pub struct UnionFind<T> {
    index: HashMap<T, usize>,
    elements: Vec<T>,
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl<T: Eq + Hash + Clone> UnionFind<T> {
    pub fn new() -> Self {
        Self {
            index: HashMap::new(),
            elements: Vec::new(),
            parent: Vec::new(),
            rank: Vec::new(),
        }
    }

    /// Number of distinct elements seen so far.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    fn intern(&mut self, x: T) -> usize {
        if let Some(&idx) = self.index.get(&x) {
            return idx;
        }
        let idx = self.elements.len();
        self.index.insert(x.clone(), idx);
        self.elements.push(x);
        self.parent.push(idx);
        self.rank.push(0);
        idx
    }

    fn find_root(&mut self, mut idx: usize) -> usize {
        let mut root = idx;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        // Path compression, iterative second pass.
        while self.parent[idx] != root {
            let next = self.parent[idx];
            self.parent[idx] = root;
            idx = next;
        }
        root
    }

    /// Representative of `x`'s set, inserting `x` as a singleton if new.
    pub fn find(&mut self, x: T) -> T {
        let idx = self.intern(x);
        let root = self.find_root(idx);
        self.elements[root].clone()
    }

    /// Merge the sets containing `x` and `y`. Idempotent.
    pub fn union(&mut self, x: T, y: T) {
        let x_idx = self.intern(x);
        let y_idx = self.intern(y);
        let x_root = self.find_root(x_idx);
        let y_root = self.find_root(y_idx);
        if x_root == y_root {
            return;
        }
        match self.rank[x_root].cmp(&self.rank[y_root]) {
            std::cmp::Ordering::Less => self.parent[x_root] = y_root,
            std::cmp::Ordering::Greater => self.parent[y_root] = x_root,
            std::cmp::Ordering::Equal => {
                self.parent[y_root] = x_root;
                self.rank[x_root] += 1;
            }
        }
    }

    pub fn connected(&mut self, x: T, y: T) -> bool {
        let x_idx = self.intern(x);
        let y_idx = self.intern(y);
        self.find_root(x_idx) == self.find_root(y_idx)
    }

    /// The partition: representative → members (singletons included).
    pub fn groups(&mut self) -> HashMap<T, Vec<T>> {
        let mut out: HashMap<T, Vec<T>> = HashMap::new();
        for idx in 0..self.elements.len() {
            let root = self.find_root(idx);
            out.entry(self.elements[root].clone())
                .or_default()
                .push(self.elements[idx].clone());
        }
        out
    }
}

impl<T: Eq + Hash + Clone> Default for UnionFind<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_find_inserts_singleton() {
        let mut uf = UnionFind::new();
        assert_eq!(uf.find(7i64), 7);
        assert_eq!(uf.len(), 1);
    }

    #[test]
    fn test_union_and_connected() {
        let mut uf = UnionFind::new();
        uf.union(1i64, 2);
        assert!(uf.connected(1, 2));
        assert!(!uf.connected(1, 3));
    }

    #[test]
    fn test_transitivity() {
        let mut uf = UnionFind::new();
        uf.union(1i64, 2);
        uf.union(2, 3);
        assert!(uf.connected(1, 3));
    }

    #[test]
    fn test_union_idempotent() {
        let mut uf = UnionFind::new();
        uf.union(1i64, 2);
        uf.union(1, 2);
        uf.union(2, 1);
        assert_eq!(uf.len(), 2);

        let groups = uf.groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups.values().next().unwrap().len(), 2);
    }

    #[test]
    fn test_groups_partition() {
        let mut uf = UnionFind::new();
        uf.union(1i64, 2);
        uf.union(2, 3);
        uf.union(10, 11);
        uf.find(99); // singleton

        let groups = uf.groups();
        assert_eq!(groups.len(), 3);

        let mut sizes: Vec<usize> = groups.values().map(|v| v.len()).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![1, 2, 3]);

        // Every group is keyed by one of its own members.
        for (rep, members) in &groups {
            assert!(members.contains(rep));
        }
    }

    #[test]
    fn test_string_ids() {
        let mut uf = UnionFind::new();
        uf.union("a".to_string(), "b".to_string());
        assert!(uf.connected("a".to_string(), "b".to_string()));
    }

    #[test]
    fn test_long_chain_compresses() {
        let mut uf = UnionFind::new();
        for i in 0..1000i64 {
            uf.union(i, i + 1);
        }
        assert!(uf.connected(0, 1000));
        assert_eq!(uf.groups().len(), 1);
    }

    proptest! {
        #[test]
        fn prop_union_transitive(pairs in proptest::collection::vec((0i64..50, 0i64..50), 1..100)) {
            let mut uf = UnionFind::new();
            for &(a, b) in &pairs {
                uf.union(a, b);
            }
            // Every union edge stays connected afterwards.
            for &(a, b) in &pairs {
                prop_assert!(uf.connected(a, b));
            }
            // groups() is a partition: member counts sum to len().
            let total: usize = uf.groups().values().map(|v| v.len()).sum();
            prop_assert_eq!(total, uf.len());
        }
    }
}
