//! Read-only LOUDS trie navigation over persisted tree bytes
//!
//! Nothing is rebuilt: rank and select run directly on the bit-vectors
//! embedded in the block.

use crate::error::{IndexError, Result};
use rusts_compression::{BitVectorView, ByteReader, RankSelect};
use std::collections::VecDeque;

/// Node number of the real root
const ROOT: usize = 1;

/// Queries a LOUDS trie in place
#[derive(Debug, Clone, Copy)]
pub struct TrieQuerier<'a> {
    labels: &'a [u8],
    is_prefix_key: BitVectorView<'a>,
    louds: BitVectorView<'a>,
}

impl<'a> TrieQuerier<'a> {
    /// Parse tree bytes as written by `LoudsTrie::write_tree`. `tree` must
    /// hold exactly one tree.
    pub fn new(tree: &'a [u8]) -> Result<Self> {
        let mut reader = ByteReader::new(tree);
        let labels = reader.read_len_prefixed()?;
        let is_prefix_key = BitVectorView::new(reader.read_len_prefixed()?)?;
        let louds = BitVectorView::new(reader.read_len_prefixed()?)?;
        if !reader.is_empty() {
            return Err(IndexError::Corrupted(format!(
                "{} trailing bytes after trie",
                reader.remaining()
            )));
        }

        // Every node but the pseudo-root has exactly one incoming edge, so a
        // trie of n nodes has n zeros and n - 1 ones.
        let n = labels.len();
        if n < 2 || is_prefix_key.len() != n || louds.len() != 2 * n - 1 || louds.count(true) != n - 1 {
            return Err(IndexError::Corrupted(format!(
                "inconsistent trie: {} labels, {} prefix bits, {} louds bits",
                n,
                is_prefix_key.len(),
                louds.len()
            )));
        }

        // Children must come after their parent in BFS order, otherwise
        // walks and parent chains can loop.
        if !louds.bit(0) || louds.bit(1) {
            return Err(IndexError::Corrupted(
                "trie pseudo-root must have exactly one child".to_string(),
            ));
        }
        let mut node = 0;
        let mut child = ROOT;
        for pos in 0..louds.len() {
            if !louds.bit(pos) {
                node += 1;
                continue;
            }
            if child <= node {
                return Err(IndexError::Corrupted(format!(
                    "trie node {} lists node {} as a child",
                    node, child
                )));
            }
            child += 1;
        }

        Ok(Self {
            labels,
            is_prefix_key,
            louds,
        })
    }

    /// Number of keys in the trie
    pub fn key_count(&self) -> usize {
        self.is_prefix_key.count(true)
    }

    /// Number of nodes, including the pseudo-root and the root
    pub fn node_count(&self) -> usize {
        self.labels.len()
    }

    /// Label of `node`
    pub fn label(&self, node: usize) -> u8 {
        self.labels[node]
    }

    /// True if a key ends at `node`
    pub fn is_terminal(&self, node: usize) -> bool {
        self.is_prefix_key.bit(node)
    }

    /// First child of `node`
    pub fn first_child(&self, node: usize) -> Option<usize> {
        let pos = if node == 0 {
            0
        } else {
            self.louds.select(node - 1, false) + 1
        };
        if !self.louds.bit(pos) {
            return None;
        }
        Some(self.louds.rank(pos, true) + 1)
    }

    /// Last child of `node`
    pub fn last_child(&self, node: usize) -> Option<usize> {
        self.first_child(node)?;
        let end = self.louds.select(node, false);
        Some(self.louds.rank(end, true))
    }

    /// Inclusive child range of `node`
    fn children(&self, node: usize) -> Option<(usize, usize)> {
        let first = self.first_child(node)?;
        let end = self.louds.select(node, false);
        Some((first, self.louds.rank(end, true)))
    }

    /// Parent of `node`; the root's parent is the pseudo-root
    pub fn parent(&self, node: usize) -> Option<usize> {
        if node == 0 || node >= self.node_count() {
            return None;
        }
        let pos = self.louds.select(node - 1, true);
        Some(self.louds.rank(pos, false))
    }

    /// Walk `value` down from the root.
    ///
    /// Returns whether the whole value was consumed and the last node
    /// reached.
    pub fn walk_tree_by_value(&self, value: &[u8]) -> (bool, usize) {
        let mut node = ROOT;
        for &label in value {
            let Some((first, last)) = self.children(node) else {
                return (false, node);
            };
            match self.labels[first..=last].binary_search(&label) {
                Ok(idx) => node = first + idx,
                Err(_) => return (false, node),
            }
        }
        (true, node)
    }

    /// Rank of the key ending at `node` among all keys
    fn offset_of(&self, node: usize) -> usize {
        self.is_prefix_key.rank(node + 1, true) - 1
    }

    /// Offset of `value`, if present
    pub fn find_offset(&self, value: &[u8]) -> Option<usize> {
        if value.is_empty() {
            return None;
        }
        let (exhausted, node) = self.walk_tree_by_value(value);
        (exhausted && self.is_terminal(node)).then(|| self.offset_of(node))
    }

    /// Offsets of keys equal to `value`: zero or one result
    pub fn find_offsets_by_equal(&self, value: &[u8]) -> Vec<usize> {
        self.find_offset(value).into_iter().collect()
    }

    /// Offsets of keys equal to any of `values`, in argument order
    pub fn find_offsets_by_in<T: AsRef<[u8]>>(&self, values: &[T]) -> Vec<usize> {
        values
            .iter()
            .filter_map(|v| self.find_offset(v.as_ref()))
            .collect()
    }

    /// Offsets of every key starting with `prefix`, ascending.
    ///
    /// An empty prefix matches every key.
    pub fn find_offsets_by_like(&self, prefix: &[u8]) -> Vec<usize> {
        let (exhausted, start) = self.walk_tree_by_value(prefix);
        if !exhausted {
            return Vec::new();
        }

        // BFS inside the subtree visits node numbers in ascending order,
        // so offsets come out sorted.
        let mut offsets = Vec::new();
        let mut queue = VecDeque::new();
        queue.push_back(start);
        while let Some(node) = queue.pop_front() {
            if self.is_terminal(node) {
                offsets.push(self.offset_of(node));
            }
            if let Some((first, last)) = self.children(node) {
                queue.extend(first..=last);
            }
        }
        offsets
    }

    /// Regular expression matching is not supported; always empty
    pub fn find_offsets_by_regex(&self, _pattern: &str) -> Vec<usize> {
        Vec::new()
    }

    /// Key stored at `offset`
    pub fn key_at(&self, offset: usize) -> Option<Vec<u8>> {
        let mut node = self.is_prefix_key.select(offset, true);
        if node >= self.node_count() {
            return None;
        }
        let mut key = Vec::new();
        while node > ROOT {
            key.push(self.labels[node]);
            node = self.parent(node)?;
        }
        key.reverse();
        Some(key)
    }

    /// All keys in offset order
    pub fn keys(&self) -> impl Iterator<Item = Vec<u8>> + '_ {
        (0..self.key_count()).filter_map(move |offset| self.key_at(offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trie::TrieBuilder;
    use rand::rngs::StdRng;
    use rusts_compression::{put_uvarint, BitVector};
    use rand::{Rng, SeedableRng};

    fn build(keys: &[&str]) -> Vec<u8> {
        let mut builder = TrieBuilder::new();
        for key in keys {
            builder.add(key.as_bytes(), key.to_string());
        }
        builder.marshal_binary().unwrap().tree_bytes().unwrap()
    }

    fn raw_tree(labels: &[u8], prefix: &[bool], louds: &[bool]) -> Vec<u8> {
        let mut tree = Vec::new();
        put_uvarint(&mut tree, labels.len() as u64);
        tree.extend_from_slice(labels);
        for bits in [prefix, louds] {
            let mut bv = BitVector::new();
            for &bit in bits {
                bv.push_back(bit);
            }
            let bytes = bv.marshal_binary().unwrap();
            put_uvarint(&mut tree, bytes.len() as u64);
            tree.extend_from_slice(&bytes);
        }
        tree
    }

    #[test]
    fn test_rejects_backward_children() {
        // "a": pseudo(0) root(1) a(2) => 10 10 0
        let ok = raw_tree(&[0, 0, b'a'], &[false, false, true], &[true, false, true, false, false]);
        let q = TrieQuerier::new(&ok).unwrap();
        assert_eq!(q.find_offset(b"a"), Some(0));

        // Pseudo-root without children, root listing itself
        let self_loop = raw_tree(&[0, 0, b'a'], &[false, false, true], &[false, true, true, false, false]);
        assert!(matches!(
            TrieQuerier::new(&self_loop),
            Err(IndexError::Corrupted(_))
        ));

        // Node 2 listing itself as its own child
        let cycle = raw_tree(&[0, 0, b'a'], &[false, false, true], &[true, false, false, true, false]);
        assert!(matches!(
            TrieQuerier::new(&cycle),
            Err(IndexError::Corrupted(_))
        ));
    }

    #[test]
    fn test_navigation() {
        // pseudo(0) root(1) a(2) b(3) ab(4)
        let tree = build(&["ab", "a", "b"]);
        let q = TrieQuerier::new(&tree).unwrap();

        assert_eq!(q.node_count(), 5);
        assert_eq!(q.key_count(), 3);
        assert_eq!(q.first_child(0), Some(1));
        assert_eq!(q.last_child(0), Some(1));
        assert_eq!(q.first_child(1), Some(2));
        assert_eq!(q.last_child(1), Some(3));
        assert_eq!(q.first_child(2), Some(4));
        assert_eq!(q.first_child(3), None);
        assert_eq!(q.last_child(4), None);
        assert_eq!(q.parent(4), Some(2));
        assert_eq!(q.parent(3), Some(1));
        assert_eq!(q.parent(1), Some(0));
        assert_eq!(q.parent(0), None);
    }

    #[test]
    fn test_find_offsets() {
        let keys = ["us-east", "us-west", "eu-central", "us"];
        let tree = build(&keys);
        let q = TrieQuerier::new(&tree).unwrap();

        // Rank order: us, us-east, us-west, eu-central
        assert_eq!(q.find_offsets_by_equal(b"us"), vec![0]);
        assert_eq!(q.find_offsets_by_equal(b"us-west"), vec![2]);
        assert!(q.find_offsets_by_equal(b"us-").is_empty());
        assert!(q.find_offsets_by_equal(b"asia").is_empty());
        assert!(q.find_offsets_by_equal(b"").is_empty());

        assert_eq!(q.find_offsets_by_in(&["eu-central", "nope", "us-east"]), vec![3, 1]);
        assert_eq!(q.find_offsets_by_like(b"us-"), vec![1, 2]);
        assert_eq!(q.find_offsets_by_like(b"us"), vec![0, 1, 2]);
        assert_eq!(q.find_offsets_by_like(b""), vec![0, 1, 2, 3]);
        assert!(q.find_offsets_by_like(b"x").is_empty());
        assert!(q.find_offsets_by_regex("us-.*").is_empty());
    }

    #[test]
    fn test_walk_tree_by_value() {
        let tree = build(&["football", "foo", "f", "fo", "feet"]);
        let q = TrieQuerier::new(&tree).unwrap();

        let (exhausted, node) = q.walk_tree_by_value(b"foot");
        assert!(exhausted);
        assert!(!q.is_terminal(node));
        assert_eq!(q.label(node), b't');

        let (exhausted, node) = q.walk_tree_by_value(b"fox");
        assert!(!exhausted);
        assert_eq!(q.label(node), b'o');
    }

    #[test]
    fn test_key_at() {
        let keys = ["football", "foo", "f", "fo", "feet"];
        let tree = build(&keys);
        let q = TrieQuerier::new(&tree).unwrap();

        let all: Vec<String> = q.keys().map(|k| String::from_utf8(k).unwrap()).collect();
        assert_eq!(all, vec!["f", "fo", "foo", "feet", "football"]);
        assert!(q.key_at(5).is_none());
    }

    #[test]
    fn test_empty_trie() {
        let tree = build(&[]);
        let q = TrieQuerier::new(&tree).unwrap();
        assert_eq!(q.key_count(), 0);
        assert!(q.find_offsets_by_like(b"").is_empty());
        assert!(q.find_offsets_by_equal(b"a").is_empty());
        assert!(q.key_at(0).is_none());
    }

    #[test]
    fn test_rejects_malformed_tree() {
        let mut tree = build(&["abc", "abd"]);
        tree.push(0);
        assert!(TrieQuerier::new(&tree).is_err());
        assert!(TrieQuerier::new(&tree[..3]).is_err());
    }

    #[test]
    fn test_matches_builder_payloads() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut builder = TrieBuilder::new();
        let mut keys = Vec::new();
        for _ in 0..2_000 {
            let len = rng.gen_range(1..12);
            let key: Vec<u8> = (0..len).map(|_| rng.gen_range(b'a'..=b'f')).collect();
            builder.add(&key, key.clone());
            keys.push(key);
        }

        let trie = builder.marshal_binary().unwrap();
        let tree = trie.tree_bytes().unwrap();
        let q = TrieQuerier::new(&tree).unwrap();
        assert_eq!(q.key_count(), trie.values.len());

        for key in &keys {
            let offset = q.find_offset(key).unwrap();
            assert_eq!(trie.values[offset], key);
            assert_eq!(q.key_at(offset).as_ref(), Some(key));
        }

        for prefix in [&b"a"[..], b"ab", b"fff", b"cafe"] {
            let mut expected: Vec<usize> = keys
                .iter()
                .filter(|k| k.starts_with(prefix))
                .map(|k| q.find_offset(k).unwrap())
                .collect();
            expected.sort_unstable();
            expected.dedup();
            assert_eq!(q.find_offsets_by_like(prefix), expected);
        }
    }
}
