//! Bulk-loaded spatial index over the hyperrectangles of a run.
//!
//! The index is a packed R-tree: boxes are ordered once with
//! Sort-Tile-Recursive tiling (sort on the first dimension, cut into slabs,
//! sort every slab on the next dimension, ...) and then grouped
//! `node_capacity` at a time into leaves, leaves into parents, and so on
//! until a single root is left.
//!
//! Since every level is packed, the children of node `k` are always the
//! contiguous run `k * node_capacity..(k + 1) * node_capacity` of the level
//! below, so no child pointers are stored. All the storage is owned `Vec`s
//! that are freed when the index is dropped (see [`SpatialIndex::release`]).

use crate::engine::hyperrectangle::{
    overlaps,
    HyperrectangleSet,
};
use crate::errors::ResourceError;
use crate::utils::TupleRange;
use std::time::{
    Duration,
    Instant,
};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_NODE_CAPACITY: usize = 16;

#[derive(Error, Debug)]
pub enum BuildError {
    /// Nothing to index. Not a failure: an empty batch has no consensus rows.
    #[error("No hyperrectangles to index")]
    EmptyBatch,
    #[error(transparent)]
    Resource(#[from] ResourceError),
}

/// Statistics about a [`SpatialIndex`].
///
/// Usually used for logging and performance monitoring.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexStats {
    pub num_boxes: usize,
    pub num_nodes: usize,
    pub depth: usize,
    pub node_capacity: usize,
    pub memory_usage_bytes: usize,
    pub build_time: Duration,
}

impl std::fmt::Display for IndexStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} boxes in {} nodes (depth {}, capacity {}), ~{} bytes, built in {:.2?}",
            self.num_boxes,
            self.num_nodes,
            self.depth,
            self.node_capacity,
            self.memory_usage_bytes,
            self.build_time
        )
    }
}

/// One level of packed nodes, `n_dims` bounds per node.
#[derive(Debug)]
struct NodeLevel {
    bounds: Vec<TupleRange<f64>>,
    len: usize,
}

/// Read-only packed R-tree. Safe to query from many threads at once.
#[derive(Debug)]
pub struct SpatialIndex {
    n_dims: usize,
    node_capacity: usize,
    /// Box ids in leaf order.
    entries: Vec<u32>,
    /// Bounds of `entries`, in the same order, so leaf scans stay contiguous.
    entry_bounds: Vec<TupleRange<f64>>,
    /// `levels[0]` are the leaves, the last level holds only the root.
    levels: Vec<NodeLevel>,
    stats: IndexStats,
}

fn try_alloc<T>(len: usize, what: &'static str) -> Result<Vec<T>, ResourceError> {
    let mut out = Vec::new();
    out.try_reserve_exact(len)
        .map_err(|source| ResourceError::Allocation {
            what,
            requested: len,
            source,
        })?;
    Ok(out)
}

/// Sort-Tile-Recursive ordering of `ids` starting at dimension `dim`.
fn str_tile(ids: &mut [u32], centers: &[f64], dim: usize, n_dims: usize, node_capacity: usize) {
    ids.sort_unstable_by(|a, b| {
        let ca = centers[*a as usize * n_dims + dim];
        let cb = centers[*b as usize * n_dims + dim];
        ca.total_cmp(&cb).then(a.cmp(b))
    });
    if dim + 1 >= n_dims {
        return;
    }

    let n_leaves = ids.len().div_ceil(node_capacity);
    let remaining_dims = (n_dims - dim) as f64;
    let n_slabs = (n_leaves as f64).powf(1.0 / remaining_dims).ceil().max(1.0) as usize;
    let slab_size = node_capacity * n_leaves.div_ceil(n_slabs);
    for slab in ids.chunks_mut(slab_size.max(1)) {
        str_tile(slab, centers, dim + 1, n_dims, node_capacity);
    }
}

impl SpatialIndex {
    /// Bulk-loads every box of `rects`.
    ///
    /// ```
    /// use mzbasket::engine::{build_hyperrectangles, MatchDimensions, SpatialIndex};
    /// use mzbasket::models::{FeatureRow, FeatureTable, TableSchema, Tolerance, ToleranceMap};
    ///
    /// let schema = TableSchema::new(vec!["PrecMz".into()], vec![]);
    /// let rows = vec![
    ///     FeatureRow::new(vec![100.0], vec![]),
    ///     FeatureRow::new(vec![100.5], vec![]),
    ///     FeatureRow::new(vec![200.0], vec![]),
    /// ];
    /// let table = FeatureTable::try_from_rows(schema.clone(), rows).unwrap();
    /// let mut tols = ToleranceMap::new();
    /// tols.insert("PrecMz".into(), Tolerance::Window(0.25));
    /// let dims = MatchDimensions::resolve(&schema, &["PrecMz".into()], &tols).unwrap();
    ///
    /// let built = build_hyperrectangles(&table, &dims).unwrap();
    /// let index = SpatialIndex::bulk_load(&built.rects, 4).unwrap();
    /// assert_eq!(index.query(&built.rects, 0), vec![0, 1]);
    /// assert_eq!(index.query(&built.rects, 2), vec![2]);
    /// ```
    #[tracing::instrument(level = "debug", skip_all, fields(n = rects.len()))]
    pub fn bulk_load(rects: &HyperrectangleSet, node_capacity: usize) -> Result<Self, BuildError> {
        let st = Instant::now();
        let n = rects.len();
        if n == 0 {
            return Err(BuildError::EmptyBatch);
        }
        if n > u32::MAX as usize {
            return Err(ResourceError::IndexCapacity {
                requested: n,
                max: u32::MAX as usize,
            }
            .into());
        }
        let node_capacity = node_capacity.max(2);
        let n_dims = rects.n_dims();

        let mut centers: Vec<f64> = try_alloc(n * n_dims, "box centers")?;
        for rect in rects.iter() {
            centers.extend(rect.iter().map(|r| r.center()));
        }

        let mut entries: Vec<u32> = try_alloc(n, "index entries")?;
        entries.extend(0..n as u32);
        str_tile(&mut entries, &centers, 0, n_dims, node_capacity);
        drop(centers);

        let mut entry_bounds: Vec<TupleRange<f64>> = try_alloc(n * n_dims, "index entry bounds")?;
        for id in entries.iter() {
            entry_bounds.extend_from_slice(rects.get(*id as usize));
        }

        let mut levels: Vec<NodeLevel> = Vec::new();
        let mut level = Self::pack_level(&entry_bounds, n, n_dims, node_capacity)?;
        while level.len > 1 {
            let parent = Self::pack_level(&level.bounds, level.len, n_dims, node_capacity)?;
            levels.push(level);
            level = parent;
        }
        levels.push(level);

        let num_nodes = levels.iter().map(|l| l.len).sum();
        let depth = levels.len();
        let mut out = Self {
            n_dims,
            node_capacity,
            entries,
            entry_bounds,
            levels,
            stats: IndexStats {
                num_boxes: n,
                num_nodes,
                depth,
                node_capacity,
                memory_usage_bytes: 0,
                build_time: Duration::ZERO,
            },
        };
        out.stats.memory_usage_bytes = out.aproximate_memory_usage();
        out.stats.build_time = st.elapsed();
        debug!("Built spatial index: {}", out.stats);
        Ok(out)
    }

    fn pack_level(
        child_bounds: &[TupleRange<f64>],
        child_len: usize,
        n_dims: usize,
        node_capacity: usize,
    ) -> Result<NodeLevel, ResourceError> {
        let len = child_len.div_ceil(node_capacity);
        let mut bounds: Vec<TupleRange<f64>> = try_alloc(len * n_dims, "index nodes")?;
        for group in child_bounds.chunks(node_capacity * n_dims) {
            let mut acc: Vec<TupleRange<f64>> = group[..n_dims].to_vec();
            for child in group.chunks_exact(n_dims).skip(1) {
                for (a, c) in acc.iter_mut().zip(child.iter()) {
                    *a = a.union(*c);
                }
            }
            bounds.extend_from_slice(&acc);
        }
        debug_assert_eq!(bounds.len(), len * n_dims);
        Ok(NodeLevel { bounds, len })
    }

    fn node_bounds(&self, level: usize, node: usize) -> &[TupleRange<f64>] {
        &self.levels[level].bounds[node * self.n_dims..(node + 1) * self.n_dims]
    }

    fn entry(&self, slot: usize) -> &[TupleRange<f64>] {
        &self.entry_bounds[slot * self.n_dims..(slot + 1) * self.n_dims]
    }

    fn children(&self, level: usize, node: usize) -> std::ops::Range<usize> {
        let n_children = if level == 0 {
            self.entries.len()
        } else {
            self.levels[level - 1].len
        };
        let start = node * self.node_capacity;
        let end = (start + self.node_capacity).min(n_children);
        start..end
    }

    /// Collects into `out` the ids of every indexed box that overlaps `rect`
    /// on all dimensions (closed intervals). `out` is cleared first and the
    /// ids come back sorted ascending.
    pub fn query_into(&self, rect: &[TupleRange<f64>], out: &mut Vec<u32>) {
        out.clear();
        let root_level = self.levels.len() - 1;
        if !overlaps(self.node_bounds(root_level, 0), rect) {
            return;
        }
        let mut stack: Vec<(usize, usize)> = Vec::with_capacity(self.levels.len() * self.node_capacity);
        stack.push((root_level, 0));

        while let Some((level, node)) = stack.pop() {
            let children = self.children(level, node);
            if level == 0 {
                for slot in children {
                    if overlaps(self.entry(slot), rect) {
                        out.push(self.entries[slot]);
                    }
                }
            } else {
                for child in children {
                    if overlaps(self.node_bounds(level - 1, child), rect) {
                        stack.push((level - 1, child));
                    }
                }
            }
        }
        out.sort_unstable();
    }

    /// Ids of every box overlapping box `i` of `rects`, including `i` itself.
    ///
    /// `rects` has to be the set the index was built from.
    pub fn query(&self, rects: &HyperrectangleSet, i: usize) -> Vec<u32> {
        let mut out = Vec::new();
        self.query_into(rects.get(i), &mut out);
        out
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> &IndexStats {
        &self.stats
    }

    /// Frees all the index storage now and hands back its statistics.
    ///
    /// Call this at the end of a run instead of letting the index linger
    /// until its owner goes out of scope.
    pub fn release(self) -> IndexStats {
        let stats = self.stats.clone();
        drop(self);
        stats
    }

    fn aproximate_memory_usage(&self) -> usize {
        let self_mem = std::mem::size_of::<Self>();
        let entry_mem = self.entries.capacity() * std::mem::size_of::<u32>();
        let bound_mem = self.entry_bounds.capacity() * std::mem::size_of::<TupleRange<f64>>();
        let node_mem: usize = self
            .levels
            .iter()
            .map(|l| l.bounds.capacity() * std::mem::size_of::<TupleRange<f64>>())
            .sum();
        self_mem + entry_mem + bound_mem + node_mem
    }
}
