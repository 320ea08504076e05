//! Per-game feature rows.
//!
//! A week's schedule is joined against the feature table twice, once on the
//! home team and once on the away team, and the two halves are merged back on
//! the game key. Games where either side has no features are dropped.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::data::ScheduleEntry;
use crate::features::combine::{merge_on, FeatureTable, TeamMetrics, WeekKey};
use crate::features::epa::MetricFamily;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Home,
    Away,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Home, Side::Away];

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Home => "home",
            Side::Away => "away",
        }
    }

    fn team<'a>(&self, game: &'a ScheduleEntry) -> &'a str {
        match self {
            Side::Home => &game.home_team,
            Side::Away => &game.away_team,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Join key for the home and away halves of a game.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GameKey {
    pub season: u32,
    pub week: u32,
    pub home_team: String,
    pub away_team: String,
}

impl GameKey {
    fn of(game: &ScheduleEntry) -> Self {
        Self {
            season: game.season,
            week: game.week,
            home_team: game.home_team.clone(),
            away_team: game.away_team.clone(),
        }
    }
}

/// Model input for one scheduled game: both teams' smoothed metrics as of the
/// most recently completed week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameFeatureRow {
    pub season: u32,
    pub week: u32,
    pub home_team: String,
    pub away_team: String,
    pub home: TeamMetrics,
    pub away: TeamMetrics,
    /// Home score minus away score, when the game has been played.
    pub result: Option<f64>,
}

impl GameFeatureRow {
    pub fn side(&self, side: Side) -> &TeamMetrics {
        match side {
            Side::Home => &self.home,
            Side::Away => &self.away,
        }
    }

    /// The eight features in the order the prediction model expects:
    /// rush/pass offense then rush/pass defense, home before away.
    pub fn model_input(&self) -> [f64; 8] {
        let mut input = [0.0; 8];
        let ordered = Side::BOTH
            .iter()
            .flat_map(|&side| MetricFamily::ALL.iter().map(move |&f| self.side(side).get(f)));
        for (slot, value) in input.iter_mut().zip(ordered) {
            *slot = value;
        }
        input
    }
}

/// Column name for one metric of one side, e.g. `ewma_dynamic_rush_off_home`.
pub fn column_name(family: MetricFamily, side: Side) -> String {
    format!("ewma_dynamic_{family}_{side}")
}

/// Column names matching [`GameFeatureRow::model_input`] position by position.
pub fn feature_columns() -> Vec<String> {
    Side::BOTH
        .iter()
        .flat_map(|&side| MetricFamily::ALL.iter().map(move |&f| column_name(f, side)))
        .collect()
}

/// The most recently completed week before `target`: the previous week of the
/// same season, or the prior season's final week when `target` is week 1.
pub fn predictor_week(target: WeekKey, prior_season_final_week: u32) -> WeekKey {
    if target.week > 1 {
        WeekKey {
            season: target.season,
            week: target.week - 1,
        }
    } else {
        WeekKey {
            season: target.season.saturating_sub(1),
            week: prior_season_final_week,
        }
    }
}

/// Join one side of each game against a week of team features.
fn join_side<'a>(
    games: &'a [ScheduleEntry],
    features: &BTreeMap<&str, &TeamMetrics>,
    side: Side,
) -> BTreeMap<GameKey, (&'a ScheduleEntry, TeamMetrics)> {
    games
        .iter()
        .filter_map(|game| {
            let metrics = features.get(side.team(game))?;
            Some((GameKey::of(game), (game, **metrics)))
        })
        .collect()
}

/// Build one row per scheduled game from the features of `predictor`.
pub fn assemble_week(
    table: &FeatureTable,
    predictor: WeekKey,
    games: &[ScheduleEntry],
) -> Vec<GameFeatureRow> {
    let features = table.week(predictor);

    let home = join_side(games, &features, Side::Home);
    let away = join_side(games, &features, Side::Away);

    merge_on(home, away)
        .into_iter()
        .map(|(key, ((game, home), (_, away)))| GameFeatureRow {
            season: key.season,
            week: key.week,
            home_team: key.home_team,
            away_team: key.away_team,
            home,
            away,
            result: game.result,
        })
        .collect()
}
