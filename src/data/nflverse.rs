//! nflverse data releases.
//!
//! Play-by-play is published as one CSV per season on the nflverse-data
//! releases page; schedules come from the nfldata games table, a single CSV
//! covering every season. Both are deserialized by header name and narrowed
//! to the fields the pipeline reads.

use std::io::Read;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::config::{RateLimitConfig, SourcesConfig};
use crate::data::{PlayRecord, PlaySource, ScheduleEntry, ScheduleSource};
use crate::error::DataError;

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

const PBP_FEED: &str = "nflverse_pbp";
const SCHEDULE_FEED: &str = "nflverse_schedule";

pub struct NflverseClient {
    http: reqwest::Client,
    sources: SourcesConfig,
    backoff: RateLimitConfig,
    limiter: Arc<Limiter>,
}

impl NflverseClient {
    pub fn new(sources: SourcesConfig, rate_limit: RateLimitConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(sources.user_agent.clone())
            .timeout(Duration::from_secs(sources.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        let limiter = create_rate_limiter(&rate_limit);

        Ok(Self {
            http,
            sources,
            backoff: rate_limit,
            limiter,
        })
    }

    /// Download one CSV body, retrying transient failures.
    async fn fetch_csv(&self, feed: &str, url: &str, season: u32) -> Result<Vec<u8>> {
        self.with_retry(feed, season, || self.get_once(feed, url, season))
            .await
    }

    async fn get_once(&self, feed: &str, url: &str, season: u32) -> Result<Vec<u8>> {
        self.limiter.until_ready().await;

        let resp = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Err(DataError::NotPublished {
                feed: feed.to_string(),
                season,
                status: status.as_u16(),
            }
            .into());
        }
        if !status.is_success() {
            anyhow::bail!("GET {url} returned HTTP {status}");
        }

        let body = resp
            .bytes()
            .await
            .with_context(|| format!("Failed to read body of {url}"))?;
        Ok(body.to_vec())
    }

    // === Retry Logic ===

    async fn with_retry<F, Fut, T>(&self, feed: &str, season: u32, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let max_retries = self.sources.max_retries;
        let base_ms = self.backoff.backoff_base_ms;
        let max_ms = self.backoff.backoff_max_ms;

        let mut attempt = 0u32;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    // A missing release will not appear by asking again
                    if e.downcast_ref::<DataError>().is_some() {
                        return Err(e);
                    }

                    attempt += 1;
                    if attempt > max_retries {
                        return Err(DataError::Unreachable {
                            feed: feed.to_string(),
                            season,
                            reason: format!("{e:#} (after {max_retries} retries)"),
                        }
                        .into());
                    }

                    let backoff_ms = std::cmp::min(
                        base_ms.saturating_mul(2u64.saturating_pow(attempt - 1)),
                        max_ms,
                    );

                    warn!(
                        feed,
                        season,
                        attempt,
                        backoff_ms,
                        error = %e,
                        "Retrying after transient failure"
                    );

                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                }
            }
        }
    }
}

#[async_trait]
impl PlaySource for NflverseClient {
    #[instrument(skip(self), fields(feed = PBP_FEED))]
    async fn fetch_plays(&self, seasons: &[u32]) -> Result<Vec<PlayRecord>> {
        let mut plays = Vec::new();

        for &season in seasons {
            let url = self.sources.pbp_url(season);
            let body = self.fetch_csv(PBP_FEED, &url, season).await?;
            let season_plays = parse_plays(body.as_slice())
                .with_context(|| format!("Failed to parse play-by-play for {season}"))?;

            if season_plays.is_empty() {
                return Err(DataError::EmptySeason {
                    feed: PBP_FEED.to_string(),
                    season,
                }
                .into());
            }

            info!(season, plays = season_plays.len(), "Play-by-play season imported");
            plays.extend(season_plays);
        }

        Ok(plays)
    }

    fn name(&self) -> &str {
        PBP_FEED
    }
}

#[async_trait]
impl ScheduleSource for NflverseClient {
    #[instrument(skip(self), fields(feed = SCHEDULE_FEED))]
    async fn fetch_schedule(&self, season: u32) -> Result<Vec<ScheduleEntry>> {
        let body = self
            .fetch_csv(SCHEDULE_FEED, &self.sources.schedule_url, season)
            .await?;
        let games = parse_schedule(body.as_slice(), season).context("Failed to parse schedule")?;

        if games.is_empty() {
            return Err(DataError::EmptySeason {
                feed: SCHEDULE_FEED.to_string(),
                season,
            }
            .into());
        }

        info!(season, games = games.len(), "Schedule imported");
        Ok(games)
    }

    fn name(&self) -> &str {
        SCHEDULE_FEED
    }
}

fn create_rate_limiter(config: &RateLimitConfig) -> Arc<Limiter> {
    let rps = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
    let burst = NonZeroU32::new(config.burst_size).unwrap_or(rps);

    let quota = Quota::per_second(rps).allow_burst(burst);
    Arc::new(RateLimiter::direct(quota))
}

/// Parse a play-by-play CSV, keeping only the pipeline's fields.
///
/// Rows whose season or week cannot be read are skipped and counted.
pub fn parse_plays<R: Read>(reader: R) -> Result<Vec<PlayRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(reader);

    let mut plays = Vec::new();
    let mut skipped = 0usize;

    for row in reader.deserialize::<PbpRow>() {
        match row {
            Ok(row) => plays.push(row.narrow()),
            Err(e) => {
                if skipped == 0 {
                    warn!(error = %e, "Skipping malformed play-by-play row");
                }
                skipped += 1;
            }
        }
    }

    if skipped > 0 {
        warn!(skipped, kept = plays.len(), "Malformed play-by-play rows skipped");
    }

    Ok(plays)
}

/// Parse the games table and keep one season.
///
/// Malformed rows are skipped and counted, as for play-by-play.
pub fn parse_schedule<R: Read>(reader: R, season: u32) -> Result<Vec<ScheduleEntry>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(reader);

    let mut games = Vec::new();
    let mut skipped = 0usize;

    for row in reader.deserialize::<GameRow>() {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                if skipped == 0 {
                    warn!(error = %e, "Skipping malformed schedule row");
                }
                skipped += 1;
                continue;
            }
        };
        if row.season == season {
            games.push(ScheduleEntry {
                season: row.season,
                week: row.week,
                home_team: row.home_team,
                away_team: row.away_team,
                result: row.result.filter(|r| r.is_finite()),
            });
        }
    }

    if skipped > 0 {
        warn!(skipped, kept = games.len(), "Malformed schedule rows skipped");
    }

    Ok(games)
}

/// Empty and `NA` cells both mean "missing".
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty() && v != "NA")
}

fn is_set(flag: Option<f64>) -> bool {
    flag == Some(1.0)
}

// --- nflverse CSV row types ---

#[derive(Debug, Deserialize)]
struct PbpRow {
    season: u32,
    week: u32,
    #[serde(default)]
    posteam: Option<String>,
    #[serde(default)]
    defteam: Option<String>,
    home_team: String,
    away_team: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    home_score: Option<u32>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    away_score: Option<u32>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    rush_attempt: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pass_attempt: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    epa: Option<f64>,
}

impl PbpRow {
    fn narrow(self) -> PlayRecord {
        PlayRecord {
            season: self.season,
            week: self.week,
            posteam: present(self.posteam),
            defteam: present(self.defteam),
            home_team: self.home_team,
            away_team: self.away_team,
            home_score: self.home_score,
            away_score: self.away_score,
            rush_attempt: is_set(self.rush_attempt),
            pass_attempt: is_set(self.pass_attempt),
            epa: self.epa.filter(|v| v.is_finite()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GameRow {
    season: u32,
    week: u32,
    home_team: String,
    away_team: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    result: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const PBP_CSV: &str = "\
play_id,game_id,home_team,away_team,season_type,week,posteam,defteam,desc,home_score,away_score,rush_attempt,pass_attempt,epa,season
1,2020_01_KC_HOU,KC,HOU,REG,1,,,\"GAME, start\",34,20,NA,NA,NA,2020
55,2020_01_KC_HOU,KC,HOU,REG,1,HOU,KC,\"(15:00) D.Johnson left end, to KC 40 for 3 yards\",34,20,1,0,-0.25,2020
77,2020_01_KC_HOU,KC,HOU,REG,1,KC,HOU,\"P.Mahomes pass short right\",34,20,0,1,1.5,2020
";

    #[test]
    fn test_parse_plays_narrows_fields() {
        let plays = parse_plays(PBP_CSV.as_bytes()).unwrap();
        assert_eq!(plays.len(), 3);

        let rush = &plays[1];
        assert_eq!(rush.season, 2020);
        assert_eq!(rush.week, 1);
        assert_eq!(rush.posteam.as_deref(), Some("HOU"));
        assert_eq!(rush.defteam.as_deref(), Some("KC"));
        assert_eq!(rush.home_score, Some(34));
        assert!(rush.rush_attempt);
        assert!(!rush.pass_attempt);
        assert_eq!(rush.epa, Some(-0.25));
    }

    #[test]
    fn test_parse_plays_treats_na_as_missing() {
        let plays = parse_plays(PBP_CSV.as_bytes()).unwrap();
        let kickoff = &plays[0];
        assert_eq!(kickoff.posteam, None);
        assert_eq!(kickoff.defteam, None);
        assert!(!kickoff.rush_attempt);
        assert!(!kickoff.pass_attempt);
        assert_eq!(kickoff.epa, None);
    }

    #[test]
    fn test_parse_plays_skips_rows_without_week() {
        let csv = "season,week,posteam,defteam,home_team,away_team,rush_attempt,pass_attempt,epa\n\
                   2020,1,KC,HOU,KC,HOU,1,0,0.3\n\
                   2020,,KC,HOU,KC,HOU,1,0,0.3\n";
        let plays = parse_plays(csv.as_bytes()).unwrap();
        assert_eq!(plays.len(), 1);
    }

    #[test]
    fn test_parse_schedule_keeps_requested_season() {
        let csv = "\
game_id,season,game_type,week,away_team,away_score,home_team,home_score,result
2022_18_LAC_DEN,2022,REG,18,LAC,28,DEN,31,3
2023_01_DET_KC,2023,REG,1,DET,21,KC,20,-1
2023_02_KC_JAX,2023,REG,2,KC,NA,JAX,NA,NA
";
        let games = parse_schedule(csv.as_bytes(), 2023).unwrap();
        assert_eq!(games.len(), 2);
        assert_eq!(games[0].home_team, "KC");
        assert_eq!(games[0].away_team, "DET");
        assert_eq!(games[0].result, Some(-1.0));
        assert_eq!(games[1].week, 2);
        assert_eq!(games[1].result, None);
    }

    #[test]
    fn test_parse_schedule_skips_malformed_rows() {
        let csv = "\
game_id,season,game_type,week,away_team,away_score,home_team,home_score,result
2023_01_DET_KC,2023,REG,1,DET,21,KC,20,-1
2023_XX_BAD,2023,REG,,CHI,NA,GB,NA,NA
2023_01_CAR_ATL,2023,REG,1,CAR,10,ATL,24,14
";
        let games = parse_schedule(csv.as_bytes(), 2023).unwrap();
        assert_eq!(games.len(), 2);
        assert_eq!(games[0].home_team, "KC");
        assert_eq!(games[1].home_team, "ATL");
        assert_eq!(games[1].result, Some(14.0));
    }

    #[test]
    fn test_rate_limiter_tolerates_zero_config() {
        let limiter = create_rate_limiter(&RateLimitConfig {
            requests_per_second: 0,
            burst_size: 0,
            backoff_base_ms: 0,
            backoff_max_ms: 0,
        });
        assert!(limiter.check().is_ok());
    }
}
