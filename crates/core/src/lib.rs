//! # odflow Core
//!
//! Core types, traits and I/O for origin-destination flow statistics.
//!
//! This crate provides:
//! - `FlowVector` / `VectorSample`: observed movement vectors
//! - `SpatialWeights`: the weights capability consumed by the statistics,
//!   with `DenseWeights` as the in-memory provider
//! - `WeightTransform`: binary, row, doubly, untransformed and
//!   variance-stabilizing weight transforms
//! - Text I/O for vector files
//! - Algorithm traits for consistent API

pub mod error;
pub mod io;
pub mod vector;
pub mod weights;

pub use error::{Error, Result};
pub use vector::{Anchor, FlowVector, VectorSample};
pub use weights::{DenseWeights, InverseDistanceParams, SpatialWeights, WeightMoments, WeightTransform};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::vector::{Anchor, FlowVector, VectorSample};
    pub use crate::weights::{
        DenseWeights, InverseDistanceParams, SpatialWeights, WeightMoments, WeightTransform,
    };
    pub use crate::Algorithm;
}

/// Core trait for all algorithms in odflow.
///
/// Algorithms are pure functions that transform input data according to parameters.
pub trait Algorithm {
    /// Input type for the algorithm
    type Input;
    /// Output type for the algorithm
    type Output;
    /// Parameters controlling algorithm behavior
    type Params: Default;
    /// Error type for algorithm execution
    type Error: std::error::Error;

    /// Returns the algorithm name
    fn name(&self) -> &'static str;

    /// Returns a description of what the algorithm does
    fn description(&self) -> &'static str;

    /// Execute the algorithm
    fn execute(&self, input: Self::Input, params: Self::Params) -> std::result::Result<Self::Output, Self::Error>;

    /// Execute with default parameters
    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}
