//! Equi-joins over position/value pairs.
//!
//! Every algorithm returns the same pairs in the same order: matches are
//! sorted by the position on the smaller input, then by the position on the
//! larger input. The smaller input (the left one on ties) is the build side.

use crate::fork::fork_join;
use crate::ops::JoinKind;
use tessera_common::{ExecConfig, Result, TesseraError};
use tracing::debug;

/// FxHash multiplier.
const HASH_SEED: u64 = 0x517cc1b727220a95;

const NIL: u32 = u32::MAX;

fn try_vec<T>(len: usize) -> Result<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| TesseraError::OutOfMemory { requested: len })?;
    Ok(v)
}

/// One side of a join: row positions and the join key at each position.
#[derive(Debug, Clone, Copy)]
pub struct JoinInput<'a> {
    positions: &'a [u32],
    values: &'a [i32],
}

impl<'a> JoinInput<'a> {
    pub fn new(positions: &'a [u32], values: &'a [i32]) -> Result<Self> {
        if positions.len() != values.len() {
            return Err(TesseraError::LengthMismatch {
                left: positions.len(),
                right: values.len(),
            });
        }
        Ok(Self { positions, values })
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Matched positions, `left[i]` pairs with `right[i]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinOutput {
    pub left: Vec<u32>,
    pub right: Vec<u32>,
}

impl JoinOutput {
    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }
}

/// Chained hash table from key to build-side position.
struct JoinHashTable {
    heads: Vec<u32>,
    next: Vec<u32>,
    keys: Vec<i32>,
    positions: Vec<u32>,
    shift: u32,
}

impl JoinHashTable {
    fn build(input: &JoinInput<'_>) -> Result<Self> {
        let bits = (input.len().max(1) * 2).next_power_of_two().trailing_zeros().max(1);
        let buckets = 1usize << bits;

        let mut heads = try_vec(buckets)?;
        heads.resize(buckets, NIL);
        let mut table = Self {
            heads,
            next: try_vec(input.len())?,
            keys: try_vec(input.len())?,
            positions: try_vec(input.len())?,
            shift: 64 - bits,
        };
        for (&pos, &key) in input.positions.iter().zip(input.values) {
            let bucket = table.bucket(key);
            let slot = table.keys.len() as u32;
            table.keys.push(key);
            table.positions.push(pos);
            table.next.push(table.heads[bucket]);
            table.heads[bucket] = slot;
        }
        Ok(table)
    }

    #[inline]
    fn bucket(&self, key: i32) -> usize {
        ((key as u32 as u64).wrapping_mul(HASH_SEED) >> self.shift) as usize
    }

    /// Calls `f` with the position of every entry equal to `key`.
    #[inline]
    fn probe(&self, key: i32, mut f: impl FnMut(u32)) {
        let mut slot = self.heads[self.bucket(key)];
        while slot != NIL {
            let s = slot as usize;
            if self.keys[s] == key {
                f(self.positions[s]);
            }
            slot = self.next[s];
        }
    }
}

fn nested_loop(build: &JoinInput<'_>, probe: &JoinInput<'_>) -> Vec<(u32, u32)> {
    let mut pairs = Vec::new();
    for (&bp, &bv) in build.positions.iter().zip(build.values) {
        for (&pp, &pv) in probe.positions.iter().zip(probe.values) {
            if bv == pv {
                pairs.push((bp, pp));
            }
        }
    }
    pairs
}

fn hash_join(build: &JoinInput<'_>, probe: &JoinInput<'_>) -> Result<Vec<(u32, u32)>> {
    let table = JoinHashTable::build(build)?;
    let mut pairs = Vec::new();
    for (&pp, &pv) in probe.positions.iter().zip(probe.values) {
        table.probe(pv, |bp| pairs.push((bp, pp)));
    }
    Ok(pairs)
}

/// Owned slice of one input falling into a single partition.
#[derive(Default)]
struct Partition {
    positions: Vec<u32>,
    values: Vec<i32>,
}

impl Partition {
    fn input(&self) -> JoinInput<'_> {
        JoinInput {
            positions: &self.positions,
            values: &self.values,
        }
    }
}

fn partition(input: &JoinInput<'_>, count: usize) -> Vec<Partition> {
    let mut parts: Vec<Partition> = (0..count).map(|_| Partition::default()).collect();
    for (&pos, &value) in input.positions.iter().zip(input.values) {
        let p = value.rem_euclid(count as i32) as usize;
        parts[p].positions.push(pos);
        parts[p].values.push(value);
    }
    parts
}

fn partitioned_hash_join(
    build: &JoinInput<'_>,
    probe: &JoinInput<'_>,
    partitions: usize,
) -> Result<Vec<(u32, u32)>> {
    let build_parts = partition(build, partitions);
    let probe_parts = partition(probe, partitions);

    let tasks: Vec<_> = build_parts
        .iter()
        .zip(&probe_parts)
        .map(|(b, p)| move || hash_join(&b.input(), &p.input()))
        .collect();
    let results = fork_join(tasks, partitions)?;

    let total = results.iter().map(Vec::len).sum();
    let mut pairs = try_vec(total)?;
    for part in results {
        pairs.extend(part);
    }
    Ok(pairs)
}

/// Joins `left` and `right` on equal values.
pub fn join(
    left: JoinInput<'_>,
    right: JoinInput<'_>,
    kind: JoinKind,
    config: &ExecConfig,
) -> Result<JoinOutput> {
    // The smaller side builds; on ties the left side does.
    let swapped = right.len() < left.len();
    let (build, probe) = if swapped { (right, left) } else { (left, right) };

    let partitions = config.join_partitions.clamp(1, i32::MAX as usize);
    let partitioned = partitions > 1 && build.len() + probe.len() >= config.partition_threshold;
    let mut pairs = match kind {
        JoinKind::NestedLoop => nested_loop(&build, &probe),
        JoinKind::Hash if partitioned => {
            debug!(build = build.len(), probe = probe.len(), partitions, "partitioned hash join");
            partitioned_hash_join(&build, &probe, partitions)?
        }
        JoinKind::Hash => hash_join(&build, &probe)?,
    };
    pairs.sort_unstable();

    let mut output = JoinOutput {
        left: try_vec(pairs.len())?,
        right: try_vec(pairs.len())?,
    };
    for (b, p) in pairs {
        let (l, r) = if swapped { (p, b) } else { (b, p) };
        output.left.push(l);
        output.right.push(r);
    }
    Ok(output)
}
