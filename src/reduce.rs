use crate::config;
use crate::error::{ConfigError, Result};
use crate::query::{Neighbor, NeighborQuery};
use rayon::prelude::*;
use tracing::info_span;

/// Per-neighbor strategy applied to every reference particle.
///
/// For each particle `i` the engine calls `init`, then `fold` once per
/// neighbor within the query radius, then `finalize`. A particle without
/// neighbors yields `finalize(init())`, which is the kernel's no-neighbor value.
pub trait NeighborKernel: Sync {
    type Accumulator: Send;
    type Output: Send;

    fn init(&self) -> Self::Accumulator;

    fn fold(&self, acc: &mut Self::Accumulator, neighbor: &Neighbor);

    fn finalize(&self, acc: Self::Accumulator) -> Self::Output;

    /// Whether an empty snapshot is a configuration error for this kernel.
    fn requires_input(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Runs `kernel` over the neighbors of every indexed particle.
pub fn reduce_over_neighbors<K: NeighborKernel>(
    query: &NeighborQuery<'_>,
    radius: f64,
    kernel: &K,
) -> Result<Vec<K::Output>> {
    let mut out = Vec::new();
    reduce_into(query, radius, kernel, &mut out)?;
    Ok(out)
}

/// Like [`reduce_over_neighbors`], writing into `out`.
///
/// `out` is left untouched on error. On success it holds exactly one entry
/// per particle; its allocation is reused when large enough.
pub fn reduce_into<K: NeighborKernel>(
    query: &NeighborQuery<'_>,
    radius: f64,
    kernel: &K,
    out: &mut Vec<K::Output>,
) -> Result<()> {
    query.check_radius(radius)?;
    let n = query.len();
    if n == 0 && kernel.requires_input() {
        return Err(ConfigError::EmptyInput(kernel.name()).into());
    }

    let _span = info_span!("reduce_over_neighbors", n_particles = n, radius).entered();
    out.clear();
    if n < config::get_parallel_threshold() {
        out.extend((0..n).map(|i| reduce_one(query, i, radius, kernel)));
    } else {
        // Each task owns a disjoint range of reference particles; collection
        // preserves index order.
        out.par_extend(
            (0..n)
                .into_par_iter()
                .with_min_len(config::min_chunk_len(n))
                .map(|i| reduce_one(query, i, radius, kernel)),
        );
    }
    Ok(())
}

fn reduce_one<K: NeighborKernel>(
    query: &NeighborQuery<'_>,
    i: usize,
    radius: f64,
    kernel: &K,
) -> K::Output {
    let mut acc = kernel.init();
    query.for_each_neighbor_unchecked(i, radius, |nb| kernel.fold(&mut acc, &nb));
    kernel.finalize(acc)
}

/// Histogram accumulation over reference indices `0..n_refs`.
///
/// `visit(i, bins)` adds reference `i`'s contributions to a worker-local
/// buffer of `n_bins` counters. Worker buffers are summed in one serial pass
/// after all workers finish; no counter is shared between workers.
pub fn histogram_over_references<F>(n_refs: usize, n_bins: usize, visit: F) -> Vec<u64>
where
    F: Fn(usize, &mut [u64]) + Sync,
{
    let _span = info_span!("histogram_over_references", n_refs, n_bins).entered();
    if n_refs < config::get_parallel_threshold() {
        let mut bins = vec![0u64; n_bins];
        for i in 0..n_refs {
            visit(i, &mut bins);
        }
        return bins;
    }

    let locals: Vec<Vec<u64>> = (0..n_refs)
        .into_par_iter()
        .with_min_len(config::min_chunk_len(n_refs))
        .fold(
            || vec![0u64; n_bins],
            |mut local, i| {
                visit(i, &mut local);
                local
            },
        )
        .collect();

    let mut bins = vec![0u64; n_bins];
    for local in &locals {
        for (total, &count) in bins.iter_mut().zip(local) {
            *total += count;
        }
    }
    bins
}
