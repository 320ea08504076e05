//! Combined per-team-per-week feature table.
//!
//! The four smoothed families are joined into one row per (team, season,
//! week): rush with pass on each side of the ball, then offense with
//! defense. Every join is an inner join on the declared key, so a team-week
//! missing from any family drops out.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::features::epa::{EpaTables, MetricFamily};
use crate::features::smoothing::{smooth, SmoothedEpa};

/// Join key shared by every per-team table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TeamWeekKey {
    pub team: String,
    pub season: u32,
    pub week: u32,
}

impl TeamWeekKey {
    fn of(row: &SmoothedEpa) -> Self {
        Self {
            team: row.team.clone(),
            season: row.season,
            week: row.week,
        }
    }
}

/// A (season, week) slot in the calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WeekKey {
    pub season: u32,
    pub week: u32,
}

/// The four smoothed metrics of one team after one week.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TeamMetrics {
    pub rush_off: f64,
    pub pass_off: f64,
    pub rush_def: f64,
    pub pass_def: f64,
}

impl TeamMetrics {
    pub fn get(&self, family: MetricFamily) -> f64 {
        match family {
            MetricFamily::RushOffense => self.rush_off,
            MetricFamily::PassOffense => self.pass_off,
            MetricFamily::RushDefense => self.rush_def,
            MetricFamily::PassDefense => self.pass_def,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamFeatures {
    pub team: String,
    pub season: u32,
    pub week: u32,
    pub metrics: TeamMetrics,
}

/// Smoothed features for every team-week, ordered by (team, season, week).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTable {
    rows: Vec<TeamFeatures>,
    dropped_season: Option<u32>,
}

impl FeatureTable {
    /// Smooth each family, join them, and drop the earliest season present.
    pub fn build(tables: &EpaTables) -> Self {
        let keyed = |family: MetricFamily| -> BTreeMap<TeamWeekKey, f64> {
            smooth(tables.table(family))
                .iter()
                .map(|row| (TeamWeekKey::of(row), row.ewma_dynamic))
                .collect()
        };

        let offense = merge_on(
            keyed(MetricFamily::RushOffense),
            keyed(MetricFamily::PassOffense),
        );
        let defense = merge_on(
            keyed(MetricFamily::RushDefense),
            keyed(MetricFamily::PassDefense),
        );

        let rows: Vec<TeamFeatures> = merge_on(offense, defense)
            .into_iter()
            .map(|(key, ((rush_off, pass_off), (rush_def, pass_def)))| TeamFeatures {
                team: key.team,
                season: key.season,
                week: key.week,
                metrics: TeamMetrics {
                    rush_off,
                    pass_off,
                    rush_def,
                    pass_def,
                },
            })
            .collect();

        Self::from_rows(rows)
    }

    /// Drop the earliest season: its smoothing has too little history to be
    /// a meaningful predictor.
    pub fn from_rows(mut rows: Vec<TeamFeatures>) -> Self {
        let dropped_season = rows.iter().map(|r| r.season).min();
        if let Some(earliest) = dropped_season {
            rows.retain(|r| r.season != earliest);
        }

        info!(
            rows = rows.len(),
            dropped_season = ?dropped_season,
            "Feature table assembled"
        );

        Self {
            rows,
            dropped_season,
        }
    }

    pub fn rows(&self) -> &[TeamFeatures] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Season excluded as insufficient history, if any rows were given.
    pub fn dropped_season(&self) -> Option<u32> {
        self.dropped_season
    }

    /// Every team's features after one (season, week), keyed by team.
    pub fn week(&self, key: WeekKey) -> BTreeMap<&str, &TeamMetrics> {
        self.rows
            .iter()
            .filter(|r| r.season == key.season && r.week == key.week)
            .map(|r| (r.team.as_str(), &r.metrics))
            .collect()
    }
}

/// Inner join of two keyed tables. Keys present on only one side are dropped.
pub fn merge_on<K: Ord, A, B>(
    left: BTreeMap<K, A>,
    mut right: BTreeMap<K, B>,
) -> BTreeMap<K, (A, B)> {
    left.into_iter()
        .filter_map(|(key, a)| {
            let b = right.remove(&key)?;
            Some((key, (a, b)))
        })
        .collect()
}
