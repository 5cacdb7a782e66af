//! Prediction: ranking knowledge items for a query context

pub mod keywords;
pub mod types;
pub mod engine;

pub use engine::{predict, PredictionEngine};
pub use types::{PredictionOptions, Recommendation, ScoreWeights};
