//! Consistent Hash Ring
//!
//! Maps object keys to an ordered list of distinct physical nodes. Each node
//! owns `virtual_nodes` tokens on a 64-bit ring; a lookup hashes the key and
//! walks clockwise collecting nodes until enough distinct ones are found.
//!
//! Adding or removing a node only moves that node's tokens, so every key
//! whose replica set did not involve the node keeps its placement.

use crate::membership::types::NodeId;
use std::collections::BTreeSet;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone)]
pub struct ConsistentHashRing {
    virtual_nodes: usize,
    /// Sorted by token, then node id.
    tokens: Vec<(u64, NodeId)>,
    nodes: BTreeSet<NodeId>,
}

impl ConsistentHashRing {
    pub fn new(virtual_nodes: usize) -> Self {
        Self {
            virtual_nodes: virtual_nodes.max(1),
            tokens: Vec::new(),
            nodes: BTreeSet::new(),
        }
    }

    /// Inserts the node's virtual tokens. No-op if the node is already present.
    pub fn add_node(&mut self, id: NodeId) {
        if self.nodes.contains(&id) {
            return;
        }

        for index in 0..self.virtual_nodes {
            self.tokens.push((token_for(&id, index), id.clone()));
        }
        self.tokens.sort_unstable();
        self.nodes.insert(id);
    }

    pub fn remove_node(&mut self, id: &NodeId) {
        if self.nodes.remove(id) {
            self.tokens.retain(|(_, owner)| owner != id);
        }
    }

    /// Returns up to `n` distinct nodes responsible for `object_key`, in
    /// ring order starting at the key's position.
    ///
    /// When the ring holds fewer than `n` nodes all of them are returned; a
    /// short list means reduced durability, not failure.
    pub fn get_nodes(&self, object_key: &str, n: usize) -> Vec<NodeId> {
        if n == 0 || self.tokens.is_empty() {
            return Vec::new();
        }

        let wanted = n.min(self.nodes.len());
        let position = hash_key(object_key);
        let start = self.tokens.partition_point(|(token, _)| *token < position);

        let mut selected: Vec<NodeId> = Vec::with_capacity(wanted);
        for (_, owner) in self.tokens[start..].iter().chain(self.tokens[..start].iter()) {
            if !selected.contains(owner) {
                selected.push(owner.clone());
                if selected.len() == wanted {
                    break;
                }
            }
        }
        selected
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains(id)
    }

    pub fn nodes(&self) -> Vec<NodeId> {
        self.nodes.iter().cloned().collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    pub fn virtual_nodes(&self) -> usize {
        self.virtual_nodes
    }
}

fn hash_key(key: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

fn token_for(id: &NodeId, index: usize) -> u64 {
    hash_key(&format!("{}#{}", id.0, index))
}
