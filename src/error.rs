//! Error types for the probe harness.

/// Error returned by arena access, timing and aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// An index fell outside the buffer it was meant for.
    ///
    /// Raised before the access happens; indices are never clamped.
    OutOfRange {
        /// The rejected index.
        index: usize,
        /// Length of the buffer at the time of the access.
        len: usize,
    },

    /// The timing source could not be read or calibrated.
    ///
    /// Fatal: every result of a run is meaningless without valid timings.
    ClockUnavailable(String),

    /// A location ended up with no samples (e.g. zero trials configured).
    DegenerateSample {
        /// The location that has no samples, if known.
        location: Option<usize>,
    },
}

impl std::fmt::Display for ProbeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeError::OutOfRange { index, len } => {
                write!(f, "index {} out of range for buffer of length {}", index, len)
            }
            ProbeError::ClockUnavailable(reason) => {
                write!(f, "monotonic clock unavailable: {}", reason)
            }
            ProbeError::DegenerateSample { location: Some(loc) } => {
                write!(f, "no samples collected for location {}", loc)
            }
            ProbeError::DegenerateSample { location: None } => {
                write!(f, "no samples collected")
            }
        }
    }
}

impl std::error::Error for ProbeError {}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, ProbeError>;
