//! Pipeline run summary.
//!
//! Counts what each stage produced so a run can be checked at a glance,
//! including how many scheduled games had to be left out because a team
//! had no features for the predictor week.

use tracing::info;

use crate::features::combine::WeekKey;
use crate::features::epa::{EpaTables, MetricFamily};

/// Assembly outcome for one target week.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekReport {
    pub week: u32,
    /// Week whose features were used as the predictor.
    pub predictor: WeekKey,
    pub scheduled: usize,
    pub assembled: usize,
}

impl WeekReport {
    pub fn excluded(&self) -> usize {
        self.scheduled.saturating_sub(self.assembled)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunMetrics {
    pub plays: usize,
    /// Team-week rows per metric family, in model-input order.
    pub team_weeks: [usize; 4],
    pub feature_rows: usize,
    pub dropped_season: Option<u32>,
    pub weeks: Vec<WeekReport>,
}

impl RunMetrics {
    pub fn new(plays: usize, tables: &EpaTables) -> Self {
        let mut team_weeks = [0; 4];
        for (slot, family) in team_weeks.iter_mut().zip(MetricFamily::ALL) {
            *slot = tables.len(family);
        }
        Self {
            plays,
            team_weeks,
            ..Self::default()
        }
    }

    pub fn games_scheduled(&self) -> usize {
        self.weeks.iter().map(|w| w.scheduled).sum()
    }

    pub fn games_assembled(&self) -> usize {
        self.weeks.iter().map(|w| w.assembled).sum()
    }

    pub fn games_excluded(&self) -> usize {
        self.weeks.iter().map(WeekReport::excluded).sum()
    }

    pub fn summary(&self) -> String {
        format!(
            "Plays: {} | Team-weeks rush_off/pass_off/rush_def/pass_def: {}/{}/{}/{}\n\
             Feature rows: {} (dropped season: {})\n\
             Games: {} scheduled, {} assembled, {} excluded",
            self.plays,
            self.team_weeks[0],
            self.team_weeks[1],
            self.team_weeks[2],
            self.team_weeks[3],
            self.feature_rows,
            self.dropped_season
                .map(|s| s.to_string())
                .unwrap_or_else(|| "none".to_string()),
            self.games_scheduled(),
            self.games_assembled(),
            self.games_excluded(),
        )
    }
}

pub fn log_metrics(metrics: &RunMetrics) {
    info!(
        plays = metrics.plays,
        rush_off_rows = metrics.team_weeks[0],
        pass_off_rows = metrics.team_weeks[1],
        rush_def_rows = metrics.team_weeks[2],
        pass_def_rows = metrics.team_weeks[3],
        feature_rows = metrics.feature_rows,
        dropped_season = ?metrics.dropped_season,
        games_scheduled = metrics.games_scheduled(),
        games_assembled = metrics.games_assembled(),
        games_excluded = metrics.games_excluded(),
        "Pipeline metrics"
    );
}
