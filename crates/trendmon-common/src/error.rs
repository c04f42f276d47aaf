/// Errors raised while classifying or merging a single sample.
///
/// These never abort a batch: the aggregator logs them and moves on to the
/// next sample.
///
/// # Examples
///
/// ```rust
/// use trendmon_common::SampleError;
///
/// let err = SampleError::MissingBatchValue {
///     name: "lead_time".to_string(),
///     sample_size: 4,
/// };
/// assert!(err.to_string().contains("lead_time"));
/// ```
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SampleError {
    /// A pre-aggregated batch (non-zero sample size) carried no value.
    #[error("Sample: batch '{name}' has sample size {sample_size} but no value")]
    MissingBatchValue { name: String, sample_size: u64 },

    /// The sample value is NaN or infinite.
    #[error("Sample: value of '{name}' is not finite ({value})")]
    NonFiniteValue { name: String, value: f64 },

    /// The epoch-millisecond timestamp cannot be represented.
    #[error("Sample: timestamp {millis} of '{name}' is out of range")]
    InvalidTimestamp { name: String, millis: i64 },

    /// Merging produced a non-finite value (e.g. overflow of the running sum).
    #[error("Sample: merging into '{name}' produced a non-finite value")]
    DegenerateMerge { name: String },
}
