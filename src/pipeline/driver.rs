//! Pipeline driver.
//!
//! Imports every configured season, builds the smoothed feature table, and
//! assembles one row per scheduled game of the target season, using the most
//! recently completed week's features for each week. All rows are computed
//! before the store is touched, then replaced in a single write.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::data::{week_matchups, PlaySource, ScheduleSource};
use crate::db::{FeatureStore, StoreStatus};
use crate::error::PipelineError;
use crate::features::combine::{FeatureTable, WeekKey};
use crate::features::epa::aggregate;
use crate::features::matchup::{assemble_week, predictor_week, GameFeatureRow};
use crate::monitoring::metrics::{log_metrics, RunMetrics, WeekReport};

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Rows from an earlier run were already persisted; nothing was fetched.
    Skipped { rows: u64 },
    Completed {
        run_id: String,
        rows: u64,
        metrics: RunMetrics,
    },
}

pub struct Pipeline {
    config: PipelineConfig,
    plays: Arc<dyn PlaySource>,
    schedule: Arc<dyn ScheduleSource>,
    store: Arc<dyn FeatureStore>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        plays: Arc<dyn PlaySource>,
        schedule: Arc<dyn ScheduleSource>,
        store: Arc<dyn FeatureStore>,
    ) -> Self {
        Self {
            config,
            plays,
            schedule,
            store,
        }
    }

    /// Run unless rows are already persisted.
    ///
    /// A store left mid-write by an earlier run is reported, not skipped.
    pub async fn run(&self) -> Result<RunOutcome> {
        match self.store.status().await? {
            StoreStatus::Populated { rows } => {
                info!(rows, "Feature rows already persisted, skipping import");
                Ok(RunOutcome::Skipped { rows })
            }
            StoreStatus::Incomplete { run_id } => {
                Err(PipelineError::IncompleteStore { run_id }.into())
            }
            StoreStatus::Empty => self.run_forced().await,
        }
    }

    /// Import, assemble, and replace every persisted row.
    pub async fn run_forced(&self) -> Result<RunOutcome> {
        let start = Instant::now();
        let target_season = self.config.target_season;

        info!(
            first_season = self.config.first_season,
            target_season,
            weeks = self.config.weeks,
            "Pipeline run starting"
        );

        let (rows, metrics) = self.assemble().await?;

        let run_id = Uuid::new_v4().to_string();
        self.store.begin_run(&run_id, target_season).await?;

        let written = self
            .store
            .replace_all(&run_id, &rows)
            .await
            .with_context(|| format!("Failed to persist {} rows for run {run_id}", rows.len()))?;

        log_metrics(&metrics);
        info!(
            run_id = %run_id,
            rows = written,
            duration_ms = start.elapsed().as_millis() as u64,
            "Pipeline run complete"
        );

        Ok(RunOutcome::Completed {
            run_id,
            rows: written,
            metrics,
        })
    }

    /// Fetch source data and build every game row of the target season,
    /// without persisting anything.
    pub async fn assemble(&self) -> Result<(Vec<GameFeatureRow>, RunMetrics)> {
        let target_season = self.config.target_season;
        let seasons = self.config.seasons();

        let plays = self
            .plays
            .fetch_plays(&seasons)
            .await
            .with_context(|| format!("Failed to import plays from {}", self.plays.name()))?;

        let tables = aggregate(&plays);
        let mut metrics = RunMetrics::new(plays.len(), &tables);
        drop(plays);

        let features = FeatureTable::build(&tables);
        metrics.feature_rows = features.len();
        metrics.dropped_season = features.dropped_season();

        let schedule = self
            .schedule
            .fetch_schedule(target_season)
            .await
            .with_context(|| {
                format!(
                    "Failed to import {target_season} schedule from {}",
                    self.schedule.name()
                )
            })?;

        let mut rows = Vec::new();
        for week in 1..=self.config.weeks {
            let target = WeekKey {
                season: target_season,
                week,
            };
            let predictor = predictor_week(target, self.config.prior_season_final_week);
            let games = week_matchups(&schedule, week);
            let week_rows = assemble_week(&features, predictor, &games);

            let report = WeekReport {
                week,
                predictor,
                scheduled: games.len(),
                assembled: week_rows.len(),
            };

            if report.excluded() > 0 {
                warn!(
                    week,
                    predictor_season = predictor.season,
                    predictor_week = predictor.week,
                    excluded = report.excluded(),
                    "Games without predictor features excluded"
                );
            } else {
                info!(week, games = report.assembled, "Week assembled");
            }

            rows.extend(week_rows);
            metrics.weeks.push(report);
        }

        Ok((rows, metrics))
    }
}
