//! Column storage with bounded update and delete buffers.

use crate::index::{ColumnIndex, IndexState};
use tessera_common::{DELETE_BUFFER_SIZE, Result, TesseraError, UPDATE_BUFFER_SIZE};

/// Bounded list of row positions touched since the last index rebuild.
#[derive(Debug, Clone)]
pub struct PositionBuffer {
    positions: Vec<u32>,
    limit: usize,
}

impl PositionBuffer {
    /// Creates an empty buffer holding at most `limit` positions.
    pub fn new(limit: usize) -> Self {
        Self {
            positions: Vec::with_capacity(limit),
            limit,
        }
    }

    /// Appends a position unless it is already buffered.
    ///
    /// Returns true if the buffer is full afterwards.
    pub fn push(&mut self, position: u32) -> bool {
        if !self.positions.contains(&position) && self.positions.len() < self.limit {
            self.positions.push(position);
        }
        self.is_full()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.positions.len() >= self.limit
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn contains(&self, position: u32) -> bool {
        self.positions.contains(&position)
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.positions
    }

    /// Returns the buffered positions in ascending order.
    pub fn sorted(&self) -> Vec<u32> {
        let mut sorted = self.positions.clone();
        sorted.sort_unstable();
        sorted
    }

    pub fn clear(&mut self) {
        self.positions.clear();
    }

    /// Rewrites every position `p` to `mapping[p]`, keeping them ascending.
    pub(crate) fn remap(&mut self, mapping: &[u32]) {
        for p in &mut self.positions {
            *p = mapping[*p as usize];
        }
        self.positions.sort_unstable();
    }

    pub(crate) fn from_positions(positions: Vec<u32>, limit: usize) -> Self {
        Self { positions, limit }
    }
}

/// A named column of 32-bit integers.
///
/// `capacity` grows by doubling and is tracked separately from the backing
/// vector so that it survives a save and load cycle unchanged.
#[derive(Debug)]
pub struct Column {
    name: String,
    data: Vec<i32>,
    capacity: usize,
    index: Option<ColumnIndex>,
    updated: PositionBuffer,
    deleted: PositionBuffer,
    stale: bool,
}

impl Column {
    /// Creates an empty column with the given initial capacity.
    pub fn new(name: impl Into<String>, capacity: usize) -> Result<Self> {
        let capacity = capacity.max(1);
        let mut data = Vec::new();
        data.try_reserve_exact(capacity)
            .map_err(|_| TesseraError::OutOfMemory {
                requested: capacity,
            })?;

        Ok(Self {
            name: name.into(),
            data,
            capacity,
            index: None,
            updated: PositionBuffer::new(UPDATE_BUFFER_SIZE),
            deleted: PositionBuffer::new(DELETE_BUFFER_SIZE),
            stale: false,
        })
    }

    pub(crate) fn from_parts(
        name: String,
        data: Vec<i32>,
        capacity: usize,
        index: Option<ColumnIndex>,
        updated: Vec<u32>,
        deleted: Vec<u32>,
    ) -> Self {
        Self {
            name,
            capacity: capacity.max(data.len()).max(1),
            data,
            index,
            updated: PositionBuffer::from_positions(updated, UPDATE_BUFFER_SIZE),
            deleted: PositionBuffer::from_positions(deleted, DELETE_BUFFER_SIZE),
            stale: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stored values, including rows pending deletion.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the raw values, including rows pending deletion.
    pub fn values(&self) -> &[i32] {
        &self.data
    }

    /// Returns the values of rows that are not pending deletion.
    pub fn live_values(&self) -> Vec<i32> {
        if self.deleted.is_empty() {
            return self.data.clone();
        }
        let mask = self.deleted.sorted();
        self.data
            .iter()
            .enumerate()
            .filter(|(pos, _)| mask.binary_search(&(*pos as u32)).is_err())
            .map(|(_, v)| *v)
            .collect()
    }

    /// Returns the value at `position`.
    pub fn get(&self, position: u32) -> Result<i32> {
        self.data
            .get(position as usize)
            .copied()
            .ok_or(TesseraError::PositionOutOfBounds {
                position: position as usize,
                length: self.data.len(),
            })
    }

    pub fn index(&self) -> Option<&ColumnIndex> {
        self.index.as_ref()
    }

    pub fn index_state(&self) -> IndexState {
        match (&self.index, self.stale) {
            (None, _) => IndexState::NoIndex,
            (Some(_), false) => IndexState::Fresh,
            (Some(_), true) => IndexState::Stale,
        }
    }

    pub fn is_clustered(&self) -> bool {
        self.index.as_ref().is_some_and(|i| i.is_clustered())
    }

    pub fn updated_positions(&self) -> &PositionBuffer {
        &self.updated
    }

    pub fn deleted_positions(&self) -> &PositionBuffer {
        &self.deleted
    }

    /// Makes room for `additional` more values, doubling capacity as needed.
    pub(crate) fn reserve(&mut self, additional: usize) -> Result<()> {
        let needed = self.data.len() + additional;
        if needed <= self.capacity && needed <= self.data.capacity() {
            return Ok(());
        }

        let mut new_capacity = self.capacity;
        while new_capacity < needed {
            new_capacity = new_capacity.saturating_mul(2);
        }
        self.data
            .try_reserve_exact(new_capacity - self.data.len())
            .map_err(|_| TesseraError::OutOfMemory {
                requested: new_capacity,
            })?;
        self.capacity = new_capacity;
        Ok(())
    }

    /// Appends a value. Room must already be reserved.
    pub(crate) fn push(&mut self, value: i32) {
        self.data.push(value);
        if self.index.is_some() {
            self.stale = true;
        }
    }

    pub(crate) fn set(&mut self, position: u32, value: i32) {
        self.data[position as usize] = value;
    }

    /// Records updated positions. Returns true if the update buffer filled,
    /// in which case the caller must rebuild the index.
    pub(crate) fn buffer_updates(&mut self, positions: &[u32]) -> bool {
        if self.index.is_none() {
            return false;
        }
        let mut overflow = false;
        for &pos in positions {
            if self.updated.is_full() {
                overflow = true;
                break;
            }
            self.updated.push(pos);
        }
        overflow = overflow || self.updated.is_full();
        if !overflow {
            self.stale = true;
        }
        overflow
    }

    /// Records deleted positions. Returns true if the delete buffer filled.
    pub(crate) fn buffer_deletes(&mut self, positions: &[u32]) -> bool {
        let mut full = false;
        for &pos in positions {
            full = self.deleted.push(pos);
            if full {
                break;
            }
        }
        if self.index.is_some() {
            self.stale = true;
        }
        full
    }

    /// Removes every row in `sorted_positions` (ascending, unique).
    pub(crate) fn remove_rows(&mut self, sorted_positions: &[u32]) {
        let mut next = 0;
        let mut pos = 0u32;
        self.data.retain(|_| {
            let keep = !(next < sorted_positions.len() && sorted_positions[next] == pos);
            if !keep {
                next += 1;
            }
            pos += 1;
            keep
        });
        self.deleted.clear();
    }

    /// Reorders rows so that row `i` becomes the old row `permutation[i]`.
    ///
    /// `inverse` maps each old row to its new position; buffered deletes
    /// are moved along with their rows.
    pub(crate) fn apply_permutation(&mut self, permutation: &[u32], inverse: &[u32]) {
        let reordered: Vec<i32> = permutation
            .iter()
            .map(|&p| self.data[p as usize])
            .collect();
        self.data.clear();
        self.data.extend_from_slice(&reordered);
        self.deleted.remap(inverse);
    }

    /// Installs a freshly built index and clears the update buffer.
    pub(crate) fn install_index(&mut self, index: ColumnIndex) {
        self.index = Some(index);
        self.updated.clear();
        self.stale = false;
    }
}
