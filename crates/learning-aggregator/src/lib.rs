pub mod buckets;
pub mod report;
pub mod review;
#[cfg(test)]
mod tests;

pub use report::render_report;
pub use review::{filter_sensitivity, LearningAggregator, ReviewSettings, Tally, LOW_CONFIDENCE_NOTE};
