//! Sorted projection of a column with an optional position map.

use std::ops::Range;
use tessera_common::{Result, TesseraError, ValueRange};

/// Sorted copy of a column.
///
/// For an unclustered index `positions[rank]` is the row holding the key at
/// `rank`. A clustered index has no position map because the owning table is
/// physically ordered by the key, so the rank is the row.
#[derive(Debug, Clone)]
pub struct SortedIndex {
    keys: Vec<i32>,
    positions: Option<Vec<u32>>,
}

impl SortedIndex {
    /// Builds an unclustered index over `values`.
    ///
    /// Ties keep their original row order.
    pub fn build_unclustered(values: &[i32]) -> Result<Self> {
        let permutation = sort_permutation(values)?;
        let mut keys = Vec::new();
        keys.try_reserve_exact(values.len())
            .map_err(|_| TesseraError::OutOfMemory {
                requested: values.len(),
            })?;
        keys.extend(permutation.iter().map(|&p| values[p as usize]));

        Ok(Self {
            keys,
            positions: Some(permutation),
        })
    }

    /// Builds a clustered index over values that are already in sorted order.
    pub fn build_clustered(sorted_values: &[i32]) -> Result<Self> {
        let mut keys = Vec::new();
        keys.try_reserve_exact(sorted_values.len())
            .map_err(|_| TesseraError::OutOfMemory {
                requested: sorted_values.len(),
            })?;
        keys.extend_from_slice(sorted_values);
        Ok(Self {
            keys,
            positions: None,
        })
    }

    /// Reassembles an index from persisted arrays.
    pub(crate) fn from_parts(keys: Vec<i32>, positions: Option<Vec<u32>>) -> Result<Self> {
        if let Some(ref positions) = positions {
            if positions.len() != keys.len() {
                return Err(TesseraError::Corrupted(format!(
                    "position map has {} entries for {} keys",
                    positions.len(),
                    keys.len()
                )));
            }
        }
        if keys.windows(2).any(|w| w[0] > w[1]) {
            return Err(TesseraError::Corrupted(
                "sorted index keys out of order".to_string(),
            ));
        }
        Ok(Self { keys, positions })
    }

    pub fn keys(&self) -> &[i32] {
        &self.keys
    }

    pub fn positions(&self) -> Option<&[u32]> {
        self.positions.as_deref()
    }

    pub fn is_clustered(&self) -> bool {
        self.positions.is_none()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Returns the ranks whose keys fall in `range`.
    pub fn rank_range(&self, range: &ValueRange) -> Range<usize> {
        if range.is_empty() {
            return 0..0;
        }
        let start = match range.low {
            Some(low) => self.keys.partition_point(|&k| k < low),
            None => 0,
        };
        let end = match range.high {
            Some(high) => self.keys.partition_point(|&k| k < high),
            None => self.keys.len(),
        };
        start..end.max(start)
    }

    /// Translates ranks to row positions, in sorted key order.
    pub fn positions_for(&self, ranks: Range<usize>) -> Vec<u32> {
        match &self.positions {
            Some(map) => map[ranks].to_vec(),
            None => ranks.map(|r| r as u32).collect(),
        }
    }

    /// Returns the row positions whose keys fall in `range`, in key order.
    pub fn range(&self, range: &ValueRange) -> Vec<u32> {
        self.positions_for(self.rank_range(range))
    }
}

/// Returns row numbers ordered by value, ties in row order.
///
/// Applying the result to every column of a table clusters it on `values`.
pub fn sort_permutation(values: &[i32]) -> Result<Vec<u32>> {
    let mut permutation = Vec::new();
    permutation
        .try_reserve_exact(values.len())
        .map_err(|_| TesseraError::OutOfMemory {
            requested: values.len(),
        })?;
    permutation.extend(0..values.len() as u32);
    // sort_by_key is a stable merge sort
    permutation.sort_by_key(|&p| values[p as usize]);
    Ok(permutation)
}
