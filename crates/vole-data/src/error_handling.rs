// ErrorHandlingDataset: retry failed draws with backoff
//
// Wraps any Dataset so that a failing `next` is retried instead of surfacing
// immediately. Consecutive failures are counted; past `backoff_after` the
// wrapper sleeps between retries with an exponentially growing delay, and past
// `maximum_exceptions` it gives up with `Error::TooManyErrors`. Every failure
// is bucketed by kind and the tally is logged periodically.

use std::collections::BTreeMap;
use std::fmt;
use std::thread;
use std::time::Duration;

use vole_core::{Error, ErrorKind, Result};

use crate::dataset::Dataset;

/// Configuration for [`ErrorHandlingDataset`].
#[derive(Debug, Clone)]
pub struct ErrorHandlingConfig {
    /// Give up after this many consecutive failures.
    pub maximum_exceptions: usize,
    /// Start sleeping between retries after this many consecutive failures.
    pub backoff_after: usize,
    /// Base sleep in seconds once backoff kicks in.
    pub sleep_backoff: f64,
    /// Growth factor applied to the sleep for each further failure.
    pub sleep_backoff_power: f64,
    /// Log the error summary every this many failures (0 = never).
    pub flush_summary_every: usize,
}

impl Default for ErrorHandlingConfig {
    fn default() -> Self {
        Self {
            maximum_exceptions: 10,
            backoff_after: 5,
            sleep_backoff: 0.1,
            sleep_backoff_power: 2.0,
            flush_summary_every: 100,
        }
    }
}

impl ErrorHandlingConfig {
    pub fn maximum_exceptions(mut self, n: usize) -> Self {
        self.maximum_exceptions = n;
        self
    }

    pub fn backoff_after(mut self, n: usize) -> Self {
        self.backoff_after = n;
        self
    }

    pub fn sleep_backoff(mut self, secs: f64) -> Self {
        self.sleep_backoff = secs;
        self
    }

    pub fn sleep_backoff_power(mut self, p: f64) -> Self {
        self.sleep_backoff_power = p;
        self
    }

    pub fn flush_summary_every(mut self, n: usize) -> Self {
        self.flush_summary_every = n;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.maximum_exceptions == 0 {
            return Err(Error::config("maximum_exceptions must be at least 1"));
        }
        if !(self.sleep_backoff >= 0.0 && self.sleep_backoff.is_finite()) {
            return Err(Error::config(format!(
                "sleep_backoff must be a non-negative number, got {}",
                self.sleep_backoff
            )));
        }
        if !(self.sleep_backoff_power >= 1.0 && self.sleep_backoff_power.is_finite()) {
            return Err(Error::config(format!(
                "sleep_backoff_power must be >= 1, got {}",
                self.sleep_backoff_power
            )));
        }
        Ok(())
    }

    /// Sleep before retry number `consecutive` (1-based), if any.
    fn backoff_for(&self, consecutive: usize) -> Option<Duration> {
        if consecutive <= self.backoff_after || self.sleep_backoff == 0.0 {
            return None;
        }
        let steps = (consecutive - self.backoff_after - 1) as i32;
        let secs = self.sleep_backoff * self.sleep_backoff_power.powi(steps);
        Some(Duration::from_secs_f64(secs))
    }
}

/// Running tally of failures, bucketed by [`ErrorKind`].
#[derive(Debug, Clone, Default)]
pub struct ErrorSummary {
    counts: BTreeMap<ErrorKind, usize>,
    last_message: BTreeMap<ErrorKind, String>,
    total: usize,
}

impl ErrorSummary {
    pub fn record(&mut self, err: &Error) {
        let kind = err.kind();
        *self.counts.entry(kind).or_insert(0) += 1;
        self.last_message.insert(kind, err.to_string());
        self.total += 1;
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn count(&self, kind: ErrorKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

impl fmt::Display for ErrorSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} errors", self.total)?;
        for (kind, count) in &self.counts {
            write!(f, "\n  {kind:<16} {count:>6}")?;
            if let Some(msg) = self.last_message.get(kind) {
                write!(f, "  last: {msg}")?;
            }
        }
        Ok(())
    }
}

/// A dataset that retries its inner dataset's failed draws.
pub struct ErrorHandlingDataset<D: Dataset> {
    inner: D,
    config: ErrorHandlingConfig,
    summary: ErrorSummary,
}

impl<D: Dataset> ErrorHandlingDataset<D> {
    pub fn new(inner: D, config: ErrorHandlingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner,
            config,
            summary: ErrorSummary::default(),
        })
    }

    pub fn summary(&self) -> &ErrorSummary {
        &self.summary
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    pub fn into_inner(self) -> D {
        self.inner
    }
}

impl<D: Dataset> Dataset for ErrorHandlingDataset<D> {
    type Item = D::Item;

    fn next(&mut self) -> Result<D::Item> {
        let mut consecutive = 0;
        loop {
            let err = match self.inner.next() {
                Ok(item) => return Ok(item),
                Err(e) => e,
            };

            consecutive += 1;
            self.summary.record(&err);
            log::debug!(
                "{}: draw failed ({consecutive} in a row): {err}",
                self.inner.name()
            );

            let every = self.config.flush_summary_every;
            if every > 0 && self.summary.total() % every == 0 {
                log::info!("{}: {}", self.inner.name(), self.summary);
            }

            if consecutive >= self.config.maximum_exceptions {
                log::warn!("{}: {}", self.inner.name(), self.summary);
                return Err(Error::TooManyErrors {
                    count: consecutive,
                    last: Box::new(err),
                });
            }

            if let Some(delay) = self.config.backoff_for(consecutive) {
                thread::sleep(delay);
            }
        }
    }

    fn worker_init(self, worker_id: usize, num_workers: usize) -> Result<Self> {
        Ok(Self {
            inner: self.inner.worker_init(worker_id, num_workers)?,
            config: self.config,
            summary: self.summary,
        })
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
