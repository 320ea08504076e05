//! EPA feature engineering: aggregation, smoothing, and per-game assembly.

pub mod combine;
pub mod epa;
pub mod matchup;
pub mod smoothing;
