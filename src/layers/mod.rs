pub mod pointwise;

pub use pointwise::PointwiseLayer;
