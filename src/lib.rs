//! NFL EPA feature pipeline.
//!
//! Imports play-by-play records, aggregates team/week Expected Points Added,
//! smooths it with a dynamic-span exponential moving average, and assembles
//! per-game home/away feature rows for an upcoming season's schedule.

pub mod config;
pub mod data;
pub mod db;
pub mod error;
pub mod features;
pub mod monitoring;
pub mod pipeline;
