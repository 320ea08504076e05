pub mod store;

use anyhow::Result;
use async_trait::async_trait;

use crate::features::matchup::GameFeatureRow;

/// What a previous pipeline run left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreStatus {
    Empty,
    Populated { rows: u64 },
    /// The latest run recorded its start but never completed its write.
    Incomplete { run_id: String },
}

/// Persistence for assembled game rows.
///
/// Rows are only ever replaced wholesale; nothing reads back state from a
/// run that is still writing.
#[async_trait]
pub trait FeatureStore: Send + Sync {
    async fn status(&self) -> Result<StoreStatus>;

    /// Record that a run for `target_season` is about to write.
    async fn begin_run(&self, run_id: &str, target_season: u32) -> Result<()>;

    /// Delete every persisted row, insert `rows`, and mark `run_id` complete,
    /// all or nothing. Returns the number of rows written.
    ///
    /// Fails with `PipelineError::WriteMismatch` when the table does not hold
    /// exactly `rows` before commit; the run then stays incomplete.
    async fn replace_all(&self, run_id: &str, rows: &[GameFeatureRow]) -> Result<u64>;

    /// Delete every row and run marker.
    async fn clear(&self) -> Result<()>;

    async fn row_count(&self) -> Result<u64>;

    async fn rows_for_week(&self, week: u32) -> Result<Vec<GameFeatureRow>>;

    async fn all_rows(&self) -> Result<Vec<GameFeatureRow>>;
}
