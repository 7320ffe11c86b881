//! Secondary indexes over a single column.
//!
//! Two kinds are supported:
//!
//! - `Sorted`: a sorted key array searched by binary search.
//! - `BTree`: the same sorted key array with a B+ tree on top of it. Leaf
//!   entries point into the array by offset, so a hit scans forward in the
//!   array instead of walking sibling leaves.
//!
//! Either kind can be clustered, in which case the owning table is kept
//! physically ordered by the indexed column and no position map is stored.

mod btree;
mod sorted;

pub use btree::BPlusTree;
pub use sorted::{SortedIndex, sort_permutation};

use tessera_common::{BTREE_NODE_CAPACITY, Result, TesseraError, ValueRange};

/// On-disk tags for index kinds.
const SORTED_TAG: u8 = 1;
const BTREE_TAG: u8 = 2;

/// Index structure used for range lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    Sorted,
    BTree,
}

impl IndexKind {
    pub(crate) fn code(self) -> u8 {
        match self {
            IndexKind::Sorted => SORTED_TAG,
            IndexKind::BTree => BTREE_TAG,
        }
    }

    pub(crate) fn from_code(code: u8) -> Result<Self> {
        match code {
            SORTED_TAG => Ok(IndexKind::Sorted),
            BTREE_TAG => Ok(IndexKind::BTree),
            _ => Err(TesseraError::Corrupted(format!("invalid index kind: {}", code))),
        }
    }
}

/// Freshness of a column's index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    NoIndex,
    Fresh,
    Stale,
}

/// An index attached to a column.
#[derive(Debug, Clone)]
pub struct ColumnIndex {
    kind: IndexKind,
    sorted: SortedIndex,
    tree: Option<BPlusTree>,
}

impl ColumnIndex {
    /// Builds an index over `values`.
    ///
    /// When `clustered` is set, `values` must already be in sorted order.
    pub fn build(kind: IndexKind, clustered: bool, values: &[i32]) -> Result<Self> {
        let sorted = if clustered {
            SortedIndex::build_clustered(values)?
        } else {
            SortedIndex::build_unclustered(values)?
        };
        Ok(Self::from_sorted(kind, sorted))
    }

    /// Wraps a sorted index, building the B+ tree for `BTree` indexes.
    pub(crate) fn from_sorted(kind: IndexKind, sorted: SortedIndex) -> Self {
        let tree = match kind {
            IndexKind::Sorted => None,
            IndexKind::BTree => Some(BPlusTree::build(sorted.keys(), BTREE_NODE_CAPACITY)),
        };
        Self { kind, sorted, tree }
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    pub fn is_clustered(&self) -> bool {
        self.sorted.is_clustered()
    }

    pub fn sorted(&self) -> &SortedIndex {
        &self.sorted
    }

    pub fn tree(&self) -> Option<&BPlusTree> {
        self.tree.as_ref()
    }

    /// Returns row positions whose keys fall in `range`, in key order.
    pub fn range(&self, range: &ValueRange) -> Vec<u32> {
        let ranks = match &self.tree {
            Some(tree) => tree.rank_range(self.sorted.keys(), range),
            None => self.sorted.rank_range(range),
        };
        self.sorted.positions_for(ranks)
    }
}
