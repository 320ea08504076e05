use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqliteConnection, SqlitePool};

use crate::db::{FeatureStore, StoreStatus};
use crate::error::PipelineError;
use crate::features::combine::TeamMetrics;
use crate::features::matchup::GameFeatureRow;

const SELECT_GAME_FEATURES: &str = "SELECT id, run_id, season, week, home_team, away_team,
        ewma_dynamic_rush_off_home, ewma_dynamic_pass_off_home,
        ewma_dynamic_rush_def_home, ewma_dynamic_pass_def_home,
        ewma_dynamic_rush_off_away, ewma_dynamic_pass_off_away,
        ewma_dynamic_rush_def_away, ewma_dynamic_pass_def_away,
        result
     FROM game_features";

pub struct SqliteStore {
    pool: SqlitePool,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct GameFeatureRecord {
    pub id: Option<i64>,
    pub run_id: String,
    pub season: i64,
    pub week: i64,
    pub home_team: String,
    pub away_team: String,
    pub ewma_dynamic_rush_off_home: f64,
    pub ewma_dynamic_pass_off_home: f64,
    pub ewma_dynamic_rush_def_home: f64,
    pub ewma_dynamic_pass_def_home: f64,
    pub ewma_dynamic_rush_off_away: f64,
    pub ewma_dynamic_pass_off_away: f64,
    pub ewma_dynamic_rush_def_away: f64,
    pub ewma_dynamic_pass_def_away: f64,
    pub result: Option<f64>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RunRecord {
    pub run_id: String,
    pub target_season: i64,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub rows_written: Option<i64>,
}

impl GameFeatureRecord {
    fn from_row(run_id: &str, row: &GameFeatureRow) -> Self {
        Self {
            id: None,
            run_id: run_id.to_string(),
            season: i64::from(row.season),
            week: i64::from(row.week),
            home_team: row.home_team.clone(),
            away_team: row.away_team.clone(),
            ewma_dynamic_rush_off_home: row.home.rush_off,
            ewma_dynamic_pass_off_home: row.home.pass_off,
            ewma_dynamic_rush_def_home: row.home.rush_def,
            ewma_dynamic_pass_def_home: row.home.pass_def,
            ewma_dynamic_rush_off_away: row.away.rush_off,
            ewma_dynamic_pass_off_away: row.away.pass_off,
            ewma_dynamic_rush_def_away: row.away.rush_def,
            ewma_dynamic_pass_def_away: row.away.pass_def,
            result: row.result,
        }
    }

    fn into_row(self) -> Result<GameFeatureRow> {
        Ok(GameFeatureRow {
            season: u32::try_from(self.season)
                .with_context(|| format!("Invalid season {} in game_features", self.season))?,
            week: u32::try_from(self.week)
                .with_context(|| format!("Invalid week {} in game_features", self.week))?,
            home_team: self.home_team,
            away_team: self.away_team,
            home: TeamMetrics {
                rush_off: self.ewma_dynamic_rush_off_home,
                pass_off: self.ewma_dynamic_pass_off_home,
                rush_def: self.ewma_dynamic_rush_def_home,
                pass_def: self.ewma_dynamic_pass_def_home,
            },
            away: TeamMetrics {
                rush_off: self.ewma_dynamic_rush_off_away,
                pass_off: self.ewma_dynamic_pass_off_away,
                rush_def: self.ewma_dynamic_rush_def_away,
                pass_def: self.ewma_dynamic_pass_def_away,
            },
            result: self.result,
        })
    }
}

impl SqliteStore {
    pub async fn new(database_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{database_path}"))
            .context("Invalid database path")?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        // Every connection to :memory: opens its own database
        let max_connections = if database_path == ":memory:" { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        let store = Self { pool };
        store.migrate().await?;

        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        let migration_sql = include_str!("../../migrations/001_init.sql");
        // Execute each statement separately (sqlx doesn't support multiple statements in one call)
        for statement in migration_sql.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed)
                    .execute(&self.pool)
                    .await
                    .with_context(|| format!("Failed to execute migration: {trimmed}"))?;
            }
        }
        Ok(())
    }

    // --- Run operations ---

    pub async fn get_latest_run(&self) -> Result<Option<RunRecord>> {
        let run = sqlx::query_as::<_, RunRecord>(
            "SELECT run_id, target_season, started_at, completed_at, rows_written
             FROM pipeline_runs ORDER BY rowid DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch latest run")?;
        Ok(run)
    }

    async fn insert_game(conn: &mut SqliteConnection, record: &GameFeatureRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO game_features (run_id, season, week, home_team, away_team,
                ewma_dynamic_rush_off_home, ewma_dynamic_pass_off_home,
                ewma_dynamic_rush_def_home, ewma_dynamic_pass_def_home,
                ewma_dynamic_rush_off_away, ewma_dynamic_pass_off_away,
                ewma_dynamic_rush_def_away, ewma_dynamic_pass_def_away, result)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.run_id)
        .bind(record.season)
        .bind(record.week)
        .bind(&record.home_team)
        .bind(&record.away_team)
        .bind(record.ewma_dynamic_rush_off_home)
        .bind(record.ewma_dynamic_pass_off_home)
        .bind(record.ewma_dynamic_rush_def_home)
        .bind(record.ewma_dynamic_pass_def_home)
        .bind(record.ewma_dynamic_rush_off_away)
        .bind(record.ewma_dynamic_pass_off_away)
        .bind(record.ewma_dynamic_rush_def_away)
        .bind(record.ewma_dynamic_pass_def_away)
        .bind(record.result)
        .execute(conn)
        .await
        .with_context(|| {
            format!(
                "Failed to insert game {} week {} {} vs {}",
                record.season, record.week, record.home_team, record.away_team
            )
        })?;
        Ok(())
    }
}

#[async_trait]
impl FeatureStore for SqliteStore {
    async fn status(&self) -> Result<StoreStatus> {
        if let Some(run) = self.get_latest_run().await? {
            if run.completed_at.is_none() {
                return Ok(StoreStatus::Incomplete { run_id: run.run_id });
            }
        }

        match self.row_count().await? {
            0 => Ok(StoreStatus::Empty),
            rows => Ok(StoreStatus::Populated { rows }),
        }
    }

    async fn begin_run(&self, run_id: &str, target_season: u32) -> Result<()> {
        sqlx::query(
            "INSERT INTO pipeline_runs (run_id, target_season, started_at) VALUES (?, ?, ?)",
        )
        .bind(run_id)
        .bind(i64::from(target_season))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to record pipeline run")?;
        Ok(())
    }

    async fn replace_all(&self, run_id: &str, rows: &[GameFeatureRow]) -> Result<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin replace transaction")?;

        sqlx::query("DELETE FROM game_features")
            .execute(&mut *tx)
            .await
            .context("Failed to delete previous game features")?;

        for row in rows {
            let record = GameFeatureRecord::from_row(run_id, row);
            Self::insert_game(&mut tx, &record).await?;
        }

        let written = rows.len() as u64;
        let (found,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM game_features")
            .fetch_one(&mut *tx)
            .await
            .context("Failed to count written game features")?;
        let found = found as u64;
        // Dropping the transaction rolls back and leaves the run incomplete
        if found != written {
            return Err(PipelineError::WriteMismatch {
                expected: written,
                found,
            }
            .into());
        }

        let marked = sqlx::query(
            "UPDATE pipeline_runs SET completed_at = ?, rows_written = ? WHERE run_id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(written as i64)
        .bind(run_id)
        .execute(&mut *tx)
        .await
        .context("Failed to mark pipeline run complete")?;

        if marked.rows_affected() != 1 {
            anyhow::bail!("Pipeline run {run_id} was never started");
        }

        tx.commit()
            .await
            .context("Failed to commit replace transaction")?;

        Ok(written)
    }

    async fn clear(&self) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin clear transaction")?;

        sqlx::query("DELETE FROM game_features")
            .execute(&mut *tx)
            .await
            .context("Failed to delete game features")?;
        sqlx::query("DELETE FROM pipeline_runs")
            .execute(&mut *tx)
            .await
            .context("Failed to delete pipeline runs")?;

        tx.commit().await.context("Failed to commit clear")?;
        Ok(())
    }

    async fn row_count(&self) -> Result<u64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM game_features")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count game features")?;
        Ok(row.0 as u64)
    }

    async fn rows_for_week(&self, week: u32) -> Result<Vec<GameFeatureRow>> {
        let records = sqlx::query_as::<_, GameFeatureRecord>(&format!(
            "{SELECT_GAME_FEATURES} WHERE week = ? ORDER BY id"
        ))
        .bind(i64::from(week))
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch game features by week")?;

        records.into_iter().map(GameFeatureRecord::into_row).collect()
    }

    async fn all_rows(&self) -> Result<Vec<GameFeatureRow>> {
        let records =
            sqlx::query_as::<_, GameFeatureRecord>(&format!("{SELECT_GAME_FEATURES} ORDER BY id"))
                .fetch_all(&self.pool)
                .await
                .context("Failed to fetch all game features")?;

        records.into_iter().map(GameFeatureRecord::into_row).collect()
    }
}
