//! # odflow Parallel
//!
//! Execution support for batch computations such as permutation tests.
//!
//! This crate provides:
//! - `ProcessingMode`: sequential, all-core or fixed-size-pool execution
//!   using Rayon (sequential fallback without the `parallel` feature)
//! - `CancelToken`: cooperative early abort between batches

pub mod cancel;
pub mod strategy;

pub use cancel::CancelToken;
pub use strategy::{num_threads, Executor, ParallelStrategy, ProcessingMode};
