//! Trie builder and LOUDS marshaling
//!
//! The builder keeps an ordered byte trie in an arena. Marshaling walks it
//! breadth-first and produces the LOUDS form used by every on-disk index:
//!
//! - `labels`: one byte per node in BFS order. Node 0 is a pseudo-root and
//!   node 1 is the real root; both carry label 0.
//! - `is_prefix_key`: one bit per node, set when a key ends at that node.
//! - `louds`: `10` for the pseudo-root, then for every node in BFS order one
//!   `1` per child followed by a `0`. The j-th `1` (0-based) is node `j + 1`.
//! - `values`: payloads of the terminal nodes, in BFS order.
//!
//! The BFS order of terminal nodes sorts keys by (length, bytes). That rank
//! is the key's offset in `values` and in the on-disk data index.
//!
//! Tree bytes, as embedded in the blocks:
//!
//! ```text
//! [labels_len uvarint][labels][is_prefix_len uvarint][is_prefix bit-vector]
//! [louds_len uvarint][louds bit-vector]
//! ```

use crate::error::{IndexError, Result};
use rusts_compression::{put_uvarint, uvarint_len, BitVector};
use std::collections::VecDeque;

const ROOT: usize = 0;

#[derive(Debug)]
struct TrieNode<V> {
    label: u8,
    /// Arena indices of the children, sorted by label
    children: Vec<u32>,
    is_prefix_key: bool,
    payload: Option<V>,
}

impl<V> TrieNode<V> {
    fn new(label: u8) -> Self {
        Self {
            label,
            children: Vec::new(),
            is_prefix_key: false,
            payload: None,
        }
    }

    fn recycle(&mut self) {
        self.label = 0;
        self.children.clear();
        self.is_prefix_key = false;
        self.payload = None;
    }
}

/// Ordered byte trie mapping keys to payloads.
///
/// Nodes live in an arena and are returned to a free list on `reset`, so a
/// flusher can build one trie per tag key without reallocating.
#[derive(Debug)]
pub struct TrieBuilder<V> {
    nodes: Vec<TrieNode<V>>,
    pool: Vec<TrieNode<V>>,
    key_num: usize,
}

impl<V> TrieBuilder<V> {
    /// Create an empty builder
    pub fn new() -> Self {
        Self {
            nodes: vec![TrieNode::new(0)],
            pool: Vec::new(),
            key_num: 0,
        }
    }

    /// Insert `key` with `payload`. Re-inserting a key replaces its payload.
    /// Empty keys are ignored.
    pub fn add(&mut self, key: &[u8], payload: V) {
        if key.is_empty() {
            return;
        }

        let mut cur = ROOT;
        for &label in key {
            let children = &self.nodes[cur].children;
            cur = match children.binary_search_by_key(&label, |&c| self.nodes[c as usize].label) {
                Ok(pos) => children[pos] as usize,
                Err(pos) => {
                    let child = self.alloc_node(label);
                    self.nodes[cur].children.insert(pos, child as u32);
                    child
                }
            };
        }

        let node = &mut self.nodes[cur];
        if !node.is_prefix_key {
            node.is_prefix_key = true;
            self.key_num += 1;
        }
        node.payload = Some(payload);
    }

    /// Payload stored under `key`
    pub fn get(&self, key: &[u8]) -> Option<&V> {
        let node = self.find(key)?;
        self.nodes[node].payload.as_ref()
    }

    /// Mutable payload stored under `key`
    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut V> {
        let node = self.find(key)?;
        self.nodes[node].payload.as_mut()
    }

    fn find(&self, key: &[u8]) -> Option<usize> {
        if key.is_empty() {
            return None;
        }
        let mut cur = ROOT;
        for &label in key {
            let children = &self.nodes[cur].children;
            let pos = children
                .binary_search_by_key(&label, |&c| self.nodes[c as usize].label)
                .ok()?;
            cur = children[pos] as usize;
        }
        self.nodes[cur].is_prefix_key.then_some(cur)
    }

    fn alloc_node(&mut self, label: u8) -> usize {
        let mut node = self.pool.pop().unwrap_or_else(|| TrieNode::new(label));
        node.label = label;
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Number of nodes, excluding the root
    pub fn node_num(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Number of distinct keys
    pub fn key_num(&self) -> usize {
        self.key_num
    }

    /// True if no key has been added since the last reset
    pub fn is_empty(&self) -> bool {
        self.key_num == 0
    }

    /// Return every node to the free list and start over with a bare root.
    ///
    /// Payloads are dropped here so large postings do not outlive the tag
    /// key they were built for.
    pub fn reset(&mut self) {
        for mut node in self.nodes.drain(..) {
            node.recycle();
            self.pool.push(node);
        }
        self.key_num = 0;
        let root = self.pool.pop().unwrap_or_else(|| TrieNode::new(0));
        self.nodes.push(root);
    }

    /// Produce the LOUDS form of the current trie
    pub fn marshal_binary(&self) -> Result<LoudsTrie<'_, V>> {
        // Pseudo-root plus every arena node
        let node_count = self.nodes.len() + 1;
        let mut labels = Vec::with_capacity(node_count);
        let mut is_prefix_key = BitVector::with_capacity(node_count);
        let mut louds = BitVector::with_capacity(node_count * 2);
        let mut values = Vec::with_capacity(self.key_num);

        labels.push(0);
        is_prefix_key.push_back(false);
        louds.push_back(true);
        louds.push_back(false);

        let mut queue = VecDeque::with_capacity(self.nodes.len());
        queue.push_back(ROOT);
        while let Some(idx) = queue.pop_front() {
            let node = &self.nodes[idx];
            labels.push(node.label);
            is_prefix_key.push_back(node.is_prefix_key);
            if node.is_prefix_key {
                let payload = node.payload.as_ref().ok_or_else(|| {
                    IndexError::Encode(format!("terminal trie node {} has no payload", idx))
                })?;
                values.push(payload);
            }
            for &child in &node.children {
                louds.push_back(true);
                queue.push_back(child as usize);
            }
            louds.push_back(false);
        }

        Ok(LoudsTrie {
            labels,
            is_prefix_key,
            louds,
            values,
        })
    }
}

impl<V> Default for TrieBuilder<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// LOUDS form of a trie, ready to be written into a block
#[derive(Debug)]
pub struct LoudsTrie<'a, V> {
    pub labels: Vec<u8>,
    pub is_prefix_key: BitVector,
    pub louds: BitVector,
    /// Payloads in key rank order
    pub values: Vec<&'a V>,
}

impl<V> LoudsTrie<'_, V> {
    /// Size of the tree bytes written by `write_tree`
    pub fn tree_len(&self) -> usize {
        let prefix_len = self.is_prefix_key.marshaled_len();
        let louds_len = self.louds.marshaled_len();
        uvarint_len(self.labels.len() as u64)
            + self.labels.len()
            + uvarint_len(prefix_len as u64)
            + prefix_len
            + uvarint_len(louds_len as u64)
            + louds_len
    }

    /// Append the tree bytes (labels and both bit-vectors) to `buf`
    pub fn write_tree(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.reserve(self.tree_len());
        put_uvarint(buf, self.labels.len() as u64);
        buf.extend_from_slice(&self.labels);
        put_uvarint(buf, self.is_prefix_key.marshaled_len() as u64);
        self.is_prefix_key.marshal_binary_into(buf)?;
        put_uvarint(buf, self.louds.marshaled_len() as u64);
        self.louds.marshal_binary_into(buf)?;
        Ok(())
    }

    /// Tree bytes in a fresh buffer
    pub fn tree_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.tree_len());
        self.write_tree(&mut buf)?;
        Ok(buf)
    }
}
