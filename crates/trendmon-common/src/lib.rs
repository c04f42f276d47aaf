//! Shared types for the trendmon aggregation engine.
//!
//! Samples arrive as [`types::RawSample`] (the JSON form) and are classified
//! into [`types::Sample`] before they reach the aggregator. Bucket arithmetic
//! lives in [`bucket`], the wall-clock seam in [`clock`].

pub mod bucket;
pub mod clock;
pub mod error;
pub mod types;

pub use error::SampleError;
