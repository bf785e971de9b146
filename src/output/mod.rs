//! Human-readable and JSON report output.

mod json;
mod terminal;

pub use json::{to_json, to_json_pretty};
pub use terminal::{format_batched, format_experiment, format_simulation};
