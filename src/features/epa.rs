//! Team/week EPA aggregation.
//!
//! Collapses play-level records into the mean EPA per (team, season, week)
//! for each of the four metric families.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::data::PlayRecord;

/// Rushing or passing, from the offense's or the defense's side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricFamily {
    RushOffense,
    PassOffense,
    RushDefense,
    PassDefense,
}

impl MetricFamily {
    /// Model-input order within one side of a matchup.
    pub const ALL: [MetricFamily; 4] = [
        MetricFamily::RushOffense,
        MetricFamily::PassOffense,
        MetricFamily::RushDefense,
        MetricFamily::PassDefense,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricFamily::RushOffense => "rush_off",
            MetricFamily::PassOffense => "pass_off",
            MetricFamily::RushDefense => "rush_def",
            MetricFamily::PassDefense => "pass_def",
        }
    }

    fn qualifies(&self, play: &PlayRecord) -> bool {
        match self {
            MetricFamily::RushOffense | MetricFamily::RushDefense => play.rush_attempt,
            MetricFamily::PassOffense | MetricFamily::PassDefense => play.pass_attempt,
        }
    }

    /// The team a qualifying play is credited to.
    fn team<'a>(&self, play: &'a PlayRecord) -> Option<&'a str> {
        match self {
            MetricFamily::RushOffense | MetricFamily::PassOffense => play.posteam.as_deref(),
            MetricFamily::RushDefense | MetricFamily::PassDefense => play.defteam.as_deref(),
        }
    }
}

impl fmt::Display for MetricFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mean EPA of one team's qualifying plays in one week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamWeekEpa {
    pub team: String,
    pub season: u32,
    pub week: u32,
    pub epa: f64,
    pub plays: u32,
}

/// The four aggregate tables, each ordered by (team, season, week).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EpaTables {
    tables: BTreeMap<MetricFamily, Vec<TeamWeekEpa>>,
}

impl EpaTables {
    pub fn table(&self, family: MetricFamily) -> &[TeamWeekEpa] {
        self.tables.get(&family).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self, family: MetricFamily) -> usize {
        self.table(family).len()
    }
}

/// Aggregate plays into the four team/week tables.
///
/// Plays without EPA, or without a team on the relevant side, are ignored;
/// a (team, season, week) with nothing left is absent rather than zero.
pub fn aggregate(plays: &[PlayRecord]) -> EpaTables {
    let tables = MetricFamily::ALL
        .into_iter()
        .map(|family| (family, aggregate_family(plays, family)))
        .collect();

    EpaTables { tables }
}

fn aggregate_family(plays: &[PlayRecord], family: MetricFamily) -> Vec<TeamWeekEpa> {
    let mut groups: BTreeMap<(&str, u32, u32), Vec<f64>> = BTreeMap::new();

    for play in plays.iter().filter(|p| family.qualifies(p)) {
        let (Some(team), Some(epa)) = (family.team(play), play.epa) else {
            continue;
        };
        groups
            .entry((team, play.season, play.week))
            .or_default()
            .push(epa);
    }

    groups
        .into_iter()
        .map(|((team, season, week), mut values)| {
            // Summing in sorted order keeps the mean bit-identical under any
            // permutation of the input plays.
            values.sort_by(f64::total_cmp);
            let sum: f64 = values.iter().sum();
            TeamWeekEpa {
                team: team.to_string(),
                season,
                week,
                epa: sum / values.len() as f64,
                plays: values.len() as u32,
            }
        })
        .collect()
}
