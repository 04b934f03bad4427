//! Execution strategies for independent batch work

use odflow_core::{Error, Result};
#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Processing mode for batch computations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingMode {
    /// Single-threaded processing
    Sequential,
    /// Parallel processing using all available cores
    Parallel,
    /// Parallel with specified number of threads
    ParallelWith(usize),
}

impl Default for ProcessingMode {
    fn default() -> Self {
        ProcessingMode::Parallel
    }
}

/// Strategy for executing independent work items
pub trait ParallelStrategy {
    /// Map a function over indices and collect results in index order
    fn par_map<T, F>(&self, range: std::ops::Range<usize>, f: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send;
}

fn zero_threads() -> Error {
    Error::InvalidParameter {
        name: "threads",
        value: "0".into(),
        reason: "must be > 0".into(),
    }
}

impl ProcessingMode {
    /// Build an executor that can run many batches in this mode.
    ///
    /// For `ParallelWith` the thread pool is created here, once.
    pub fn executor(&self) -> Result<Executor> {
        if let ProcessingMode::ParallelWith(0) = self {
            return Err(zero_threads());
        }
        #[cfg(feature = "parallel")]
        let pool = match self {
            ProcessingMode::ParallelWith(threads) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(*threads)
                    .build()
                    .map_err(|e| Error::Other(format!("failed to build thread pool: {}", e)))?,
            ),
            _ => None,
        };
        Ok(Executor {
            mode: *self,
            #[cfg(feature = "parallel")]
            pool,
        })
    }
}

/// Reusable execution context for repeated `par_map` calls
#[derive(Debug)]
pub struct Executor {
    mode: ProcessingMode,
    #[cfg(feature = "parallel")]
    pool: Option<rayon::ThreadPool>,
}

impl Executor {
    pub fn mode(&self) -> ProcessingMode {
        self.mode
    }
}

impl ParallelStrategy for Executor {
    #[cfg(feature = "parallel")]
    fn par_map<T, F>(&self, range: std::ops::Range<usize>, f: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        Ok(match (&self.pool, self.mode) {
            (Some(pool), _) => pool.install(|| range.into_par_iter().map(f).collect()),
            (None, ProcessingMode::Parallel) => range.into_par_iter().map(f).collect(),
            (None, _) => range.map(f).collect(),
        })
    }

    /// Without the `parallel` feature every mode runs sequentially.
    #[cfg(not(feature = "parallel"))]
    fn par_map<T, F>(&self, range: std::ops::Range<usize>, f: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        Ok(range.map(f).collect())
    }
}

/// One-off batches. Repeated batches should share an [`Executor`].
impl ParallelStrategy for ProcessingMode {
    fn par_map<T, F>(&self, range: std::ops::Range<usize>, f: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        self.executor()?.par_map(range, f)
    }
}

/// Number of worker threads a `Parallel` run will use
pub fn num_threads() -> usize {
    #[cfg(feature = "parallel")]
    {
        rayon::current_num_threads()
    }
    #[cfg(not(feature = "parallel"))]
    {
        1
    }
}
