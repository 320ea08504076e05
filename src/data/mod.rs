pub mod nflverse;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One play, narrowed to the fields the feature pipeline reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayRecord {
    pub season: u32,
    pub week: u32,
    /// Team in possession; missing on kickoffs, timeouts and similar plays.
    pub posteam: Option<String>,
    pub defteam: Option<String>,
    pub home_team: String,
    pub away_team: String,
    pub home_score: Option<u32>,
    pub away_score: Option<u32>,
    pub rush_attempt: bool,
    pub pass_attempt: bool,
    /// Expected Points Added; undefined for some plays.
    pub epa: Option<f64>,
}

/// One scheduled game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub season: u32,
    pub week: u32,
    pub home_team: String,
    pub away_team: String,
    /// Home score minus away score, once the game has been played.
    pub result: Option<f64>,
}

/// Source of play-by-play records.
#[async_trait]
pub trait PlaySource: Send + Sync {
    /// Fetch every play for the given seasons, concatenated in season order.
    /// Fails if any season is unavailable.
    async fn fetch_plays(&self, seasons: &[u32]) -> Result<Vec<PlayRecord>>;

    /// Human-readable name of this data source.
    fn name(&self) -> &str;
}

/// Source of season schedules.
#[async_trait]
pub trait ScheduleSource: Send + Sync {
    /// Fetch every scheduled game of a season.
    async fn fetch_schedule(&self, season: u32) -> Result<Vec<ScheduleEntry>>;

    fn name(&self) -> &str;
}

/// Narrow a season schedule to one week's matchups.
pub fn week_matchups(schedule: &[ScheduleEntry], week: u32) -> Vec<ScheduleEntry> {
    schedule.iter().filter(|g| g.week == week).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn game(week: u32, home: &str, away: &str) -> ScheduleEntry {
        ScheduleEntry {
            season: 2023,
            week,
            home_team: home.to_string(),
            away_team: away.to_string(),
            result: None,
        }
    }

    #[test]
    fn test_week_matchups_filters_by_week() {
        let schedule = vec![
            game(1, "KC", "DET"),
            game(1, "ATL", "CAR"),
            game(2, "DET", "SEA"),
        ];
        let week1 = week_matchups(&schedule, 1);
        assert_eq!(week1.len(), 2);
        assert!(week1.iter().all(|g| g.week == 1));
        assert_eq!(week1[0].home_team, "KC");
    }

    #[test]
    fn test_week_matchups_empty_for_unscheduled_week() {
        let schedule = vec![game(1, "KC", "DET")];
        assert!(week_matchups(&schedule, 5).is_empty());
    }
}
