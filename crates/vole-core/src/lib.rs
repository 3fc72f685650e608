//! # vole-core
//!
//! Shared building blocks for the vole dataset crates.
//!
//! This crate provides:
//! - [`Error`] / [`Result`]: the error taxonomy used across the workspace
//! - [`DType`]: output representation applied to sampled images
//! - [`ops`]: one-hot encoding, partial flattening and worker chunking

pub mod dtype;
pub mod error;
pub mod ops;

pub use dtype::DType;
pub use error::{Error, ErrorKind, Result};
