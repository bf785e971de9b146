//! Statistical aggregation of timing samples.
//!
//! - Median by O(n) selection
//! - Median / mean / population standard deviation per location
//! - Chi-square uniformity of measurement positions

mod quantile;
mod summary;
mod uniformity;

pub use quantile::median_ns;
pub use summary::{aggregate_collection, contrast, summarize, LocationSummary, Summary};
pub use uniformity::{chi_square_uniform, position_counts};
