//! Error conditions callers need to tell apart.
//!
//! Everything else travels as `anyhow::Error` with context attached.

use thiserror::Error;

/// Failures fetching external source data. None of these are recovered
/// locally: the pipeline stops before anything is persisted.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("{feed} has no data published for season {season} (HTTP {status})")]
    NotPublished { feed: String, season: u32, status: u16 },

    #[error("{feed} returned no rows for season {season}")]
    EmptySeason { feed: String, season: u32 },

    #[error("{feed} unreachable for season {season}: {reason}")]
    Unreachable {
        feed: String,
        season: u32,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("feature store holds unfinished run {run_id}; run `import` to replace it")]
    IncompleteStore { run_id: String },

    #[error("feature store holds {found} rows after writing {expected}")]
    WriteMismatch { expected: u64, found: u64 },
}

/// True when `err` (or anything in its context chain) is a [`DataError`].
pub fn is_data_unavailable(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.downcast_ref::<DataError>().is_some())
}
