//! # vole-data
//!
//! Dataset sampling for vole.
//!
//! This crate provides:
//! - [`Dataset`] trait: endless sampler with per-worker partitioning
//! - [`ErrorHandlingDataset`]: retries failed draws with backoff
//! - [`DataDownloader`]: download-once file cache
//! - [`Mnist`]: MNIST loader (IDX format parser, seeded sampling)
//! - [`build_shards`]: construct one partitioned instance per worker in parallel

pub mod dataset;
pub mod download;
pub mod error_handling;
pub mod mnist;
pub mod shard;

pub use dataset::{Dataset, DatasetIter, TestOptions, TestSummary};
pub use download::{default_data_root, DataDownloader, DATA_DIR_ENV};
pub use error_handling::{ErrorHandlingConfig, ErrorHandlingDataset, ErrorSummary};
pub use mnist::{Label, Labels, Mnist, MnistConfig, MnistSplit};
pub use shard::build_shards;

pub use vole_core::{DType, Error, ErrorKind, Result};
