// Dataset trait: unified interface for sampling data sources
//
// A dataset here is an endless sampler: every call to `next` produces one
// item. Worker processes each own an instance and carve out their share of
// the data once, up front, through `worker_init`.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use vole_core::{ErrorKind, Result};

/// A source of training items.
///
/// Implementations must be `Send` so a shard can be built on one thread and
/// handed to the worker that will sample from it.
pub trait Dataset: Send {
    /// What one call to [`next`](Dataset::next) yields.
    type Item;

    /// Draw the next item.
    fn next(&mut self) -> Result<Self::Item>;

    /// Restrict this instance to the share of data owned by `worker_id`.
    ///
    /// Consumes the dataset and returns the partitioned one. The default
    /// keeps everything, which is right for generated or streaming sources.
    fn worker_init(self, worker_id: usize, num_workers: usize) -> Result<Self>
    where
        Self: Sized,
    {
        vole_core::ops::chunk_range(0, worker_id, num_workers)?;
        Ok(self)
    }

    /// Optional human-readable name.
    fn name(&self) -> &str {
        "dataset"
    }

    /// Borrow the dataset as an endless iterator of results.
    fn iter(&mut self) -> DatasetIter<'_, Self>
    where
        Self: Sized,
    {
        DatasetIter { dataset: self }
    }

    /// Smoke-test the dataset by drawing up to `opts.max_samples` items.
    ///
    /// With `handle_errors` set, failed draws are counted and logged rather
    /// than aborting the run.
    fn test(&mut self, opts: TestOptions) -> Result<TestSummary> {
        let start = Instant::now();
        let mut summary = TestSummary::default();

        for i in 0..opts.max_samples {
            match self.next() {
                Ok(_) => summary.samples += 1,
                Err(e) if opts.handle_errors => {
                    log::warn!("{}: sample {i} failed: {e}", self.name());
                    *summary.errors.entry(e.kind()).or_insert(0) += 1;
                }
                Err(e) => return Err(e),
            }
            if let Some(every) = opts.log_every {
                if every > 0 && (i + 1) % every == 0 {
                    log::info!(
                        "{}: {} samples in {:.2?}",
                        self.name(),
                        i + 1,
                        start.elapsed()
                    );
                }
            }
        }

        summary.elapsed = start.elapsed();
        log::info!(
            "{}: drew {} samples ({} errors) in {:.2?}, {:.1} samples/s",
            self.name(),
            summary.samples,
            summary.error_count(),
            summary.elapsed,
            summary.throughput()
        );
        Ok(summary)
    }
}

/// Endless iterator over a borrowed dataset. Never returns `None`.
pub struct DatasetIter<'a, D: Dataset> {
    dataset: &'a mut D,
}

impl<D: Dataset> Iterator for DatasetIter<'_, D> {
    type Item = Result<D::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.dataset.next())
    }
}

/// Settings for [`Dataset::test`].
#[derive(Debug, Clone)]
pub struct TestOptions {
    /// Number of draws to attempt.
    pub max_samples: usize,
    /// Count failed draws instead of returning the first error.
    pub handle_errors: bool,
    /// Log progress every this many draws.
    pub log_every: Option<usize>,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            max_samples: 100,
            handle_errors: false,
            log_every: None,
        }
    }
}

impl TestOptions {
    pub fn max_samples(mut self, n: usize) -> Self {
        self.max_samples = n;
        self
    }

    pub fn handle_errors(mut self, h: bool) -> Self {
        self.handle_errors = h;
        self
    }

    pub fn log_every(mut self, n: usize) -> Self {
        self.log_every = Some(n);
        self
    }
}

/// Outcome of a [`Dataset::test`] run.
#[derive(Debug, Clone, Default)]
pub struct TestSummary {
    pub samples: usize,
    pub errors: BTreeMap<ErrorKind, usize>,
    pub elapsed: Duration,
}

impl TestSummary {
    pub fn error_count(&self) -> usize {
        self.errors.values().sum()
    }

    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.samples as f64 / secs
        } else {
            0.0
        }
    }
}
