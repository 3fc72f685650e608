// Parallel shard construction
//
// Each worker owns its own dataset instance. `build_shards` constructs all of
// them on the rayon pool and partitions each with its worker id, so N workers
// pay for one load's wall-clock time instead of N.

use rayon::prelude::*;

use vole_core::{Error, Result};

use crate::dataset::Dataset;

/// Build `num_workers` datasets with `factory` and partition each one.
///
/// `factory` receives the worker id. Shards come back in worker order; the
/// first construction or partitioning error is returned.
pub fn build_shards<D, F>(num_workers: usize, factory: F) -> Result<Vec<D>>
where
    D: Dataset,
    F: Fn(usize) -> Result<D> + Sync,
{
    if num_workers == 0 {
        return Err(Error::config("num_workers must be at least 1"));
    }
    log::debug!("building {num_workers} shards");
    (0..num_workers)
        .into_par_iter()
        .map(|worker_id| factory(worker_id)?.worker_init(worker_id, num_workers))
        .collect()
}
