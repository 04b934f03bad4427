//! Spatial statistics for flow data
//!
//! - **vector_moran**: Global Moran's I of origin-destination displacement vectors

pub mod vector_moran;

pub use vector_moran::{
    moments, normal_p_value, observed_statistic, vector_morans_i, vector_morans_i_with_control,
    MoranParams, Moments, PermutationInference, PermutationStatus, VectorMoran,
    VectorMoranResult, MIN_SAMPLE_SIZE,
};
