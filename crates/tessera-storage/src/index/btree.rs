//! In-memory B+ tree over a sorted key array.
//!
//! The tree does not own keys. Each leaf entry is a `(key, offset)` pair
//! naming the start of a run in the sorted array it was built from, so a
//! lookup descends to a leaf and then scans that array forward by offset:
//!
//! ```text
//!                 [ 40 | 80 ]                 internal fences
//!               /     |      \
//!   [0:0 20:4]   [40:8 60:12]   [80:16 ...]   leaf entries key:offset
//!       |  |        |    |         |
//!   sorted: 0 5 10 15 20 25 30 35 40 45 ...   backing array
//! ```
//!
//! Nodes live in an arena and refer to each other by index.

use std::ops::Range;
use tessera_common::ValueRange;

type NodeId = u32;

#[derive(Debug, Clone)]
enum Node {
    Internal {
        fences: Vec<i32>,
        children: Vec<NodeId>,
    },
    Leaf {
        keys: Vec<i32>,
        offsets: Vec<u32>,
    },
}

impl Node {
    fn leaf(capacity: usize) -> Self {
        Node::Leaf {
            keys: Vec::with_capacity(capacity),
            offsets: Vec::with_capacity(capacity),
        }
    }

    fn len(&self) -> usize {
        match self {
            Node::Internal { fences, .. } => fences.len(),
            Node::Leaf { keys, .. } => keys.len(),
        }
    }
}

/// B+ tree with fixed node capacity.
#[derive(Debug, Clone)]
pub struct BPlusTree {
    nodes: Vec<Node>,
    root: NodeId,
    capacity: usize,
    height: usize,
    entries: usize,
}

impl BPlusTree {
    /// Creates an empty tree whose nodes hold up to `capacity` keys.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(3);
        Self {
            nodes: vec![Node::leaf(capacity)],
            root: 0,
            capacity,
            height: 1,
            entries: 0,
        }
    }

    /// Builds a tree over `sorted`, one leaf entry per `capacity` keys.
    pub fn build(sorted: &[i32], capacity: usize) -> Self {
        let mut tree = Self::with_capacity(capacity);
        let stride = tree.capacity;
        for offset in (0..sorted.len()).step_by(stride) {
            tree.insert(sorted[offset], offset as u32);
        }
        tree
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of leaf entries.
    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    fn is_full(&self, id: NodeId) -> bool {
        self.nodes[id as usize].len() >= self.capacity
    }

    /// Inserts an entry. Full nodes on the way down are split before
    /// descending, so a split never propagates more than one level.
    pub fn insert(&mut self, key: i32, offset: u32) {
        if self.is_full(self.root) {
            let old_root = self.root;
            let new_root = self.push_node(Node::Internal {
                fences: Vec::with_capacity(self.capacity),
                children: vec![old_root],
            });
            self.root = new_root;
            self.split_child(new_root, 0);
            self.height += 1;
        }

        let mut current = self.root;
        loop {
            let next = match &self.nodes[current as usize] {
                Node::Leaf { .. } => break,
                Node::Internal { fences, children } => {
                    let idx = fences.partition_point(|&f| f <= key);
                    (idx, children[idx])
                }
            };
            let (mut idx, mut child) = next;
            if self.is_full(child) {
                self.split_child(current, idx);
                if let Node::Internal { fences, children } = &self.nodes[current as usize] {
                    if key >= fences[idx] {
                        idx += 1;
                    }
                    child = children[idx];
                }
            }
            current = child;
        }

        if let Node::Leaf { keys, offsets } = &mut self.nodes[current as usize] {
            let pos = keys.partition_point(|&k| k <= key);
            keys.insert(pos, key);
            offsets.insert(pos, offset);
        }
        self.entries += 1;
    }

    fn push_node(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        (self.nodes.len() - 1) as NodeId
    }

    /// Splits the full child at `children[idx]` of `parent`.
    ///
    /// A leaf split copies the first key of the right half up; an internal
    /// split moves its middle fence up.
    fn split_child(&mut self, parent: NodeId, idx: usize) {
        let child = match &self.nodes[parent as usize] {
            Node::Internal { children, .. } => children[idx],
            Node::Leaf { .. } => return,
        };

        let (separator, right) = match &mut self.nodes[child as usize] {
            Node::Leaf { keys, offsets } => {
                let mid = keys.len() / 2;
                let right_keys = keys.split_off(mid);
                let right_offsets = offsets.split_off(mid);
                (
                    right_keys[0],
                    Node::Leaf {
                        keys: right_keys,
                        offsets: right_offsets,
                    },
                )
            }
            Node::Internal { fences, children } => {
                let mid = fences.len() / 2;
                let right_fences = fences.split_off(mid + 1);
                let right_children = children.split_off(mid + 1);
                let separator = fences.pop().unwrap_or_default();
                (
                    separator,
                    Node::Internal {
                        fences: right_fences,
                        children: right_children,
                    },
                )
            }
        };

        let right_id = self.push_node(right);
        if let Node::Internal { fences, children } = &mut self.nodes[parent as usize] {
            fences.insert(idx, separator);
            children.insert(idx + 1, right_id);
        }
    }

    /// Returns the offset in the backing array where a scan for keys
    /// `>= low` should start, or `None` for an empty tree.
    ///
    /// Descent routes on fences strictly below `low`, so a run of duplicates
    /// equal to `low` that straddles a fence is still reached from its start.
    pub fn seek(&self, low: Option<i32>) -> Option<usize> {
        let mut current = self.root;
        loop {
            match &self.nodes[current as usize] {
                Node::Internal { fences, children } => {
                    let idx = match low {
                        Some(low) => fences.partition_point(|&f| f < low),
                        None => 0,
                    };
                    current = children[idx];
                }
                Node::Leaf { keys, offsets } => {
                    if keys.is_empty() {
                        return None;
                    }
                    let below = match low {
                        Some(low) => keys.partition_point(|&k| k < low),
                        None => 0,
                    };
                    return Some(offsets[below.saturating_sub(1)] as usize);
                }
            }
        }
    }

    /// Returns the ranks of `sorted` whose keys fall in `range`.
    ///
    /// `sorted` must be the array the tree was built from.
    pub fn rank_range(&self, sorted: &[i32], range: &ValueRange) -> Range<usize> {
        if range.is_empty() {
            return 0..0;
        }
        let Some(mut start) = self.seek(range.low) else {
            return 0..0;
        };
        while start < sorted.len() && range.is_below(sorted[start]) {
            start += 1;
        }
        let mut end = start;
        while end < sorted.len() && !range.is_above(sorted[end]) {
            end += 1;
        }
        start..end
    }
}
