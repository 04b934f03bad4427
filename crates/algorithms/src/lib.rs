//! # odflow Algorithms
//!
//! Spatial statistics for origin-destination flow vectors.
//!
//! ## Available Algorithm Categories
//!
//! - **statistics**: Vector Moran's I with analytical and permutation inference

pub mod statistics;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::statistics::{
        vector_morans_i, vector_morans_i_with_control, MoranParams, PermutationInference,
        PermutationStatus, VectorMoran, VectorMoranResult,
    };
    pub use odflow_core::prelude::*;
    pub use odflow_parallel::{CancelToken, ProcessingMode};
}
