use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub sources: SourcesConfig,
    pub rate_limit: RateLimitConfig,
    pub database: DatabaseConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Earliest season imported. Its features are dropped after smoothing.
    pub first_season: u32,
    /// Season whose weekly matchups are assembled.
    pub target_season: u32,
    pub weeks: u32,
    /// Week of the prior season used as the predictor for week 1.
    pub prior_season_final_week: u32,
}

impl PipelineConfig {
    /// Seasons to import, in ascending order.
    pub fn seasons(&self) -> Vec<u32> {
        (self.first_season..=self.target_season).collect()
    }

    pub fn validate(&self) -> Result<()> {
        // The earliest season is dropped after smoothing, and week 1 reads
        // the season before the target, so that season must not be the first.
        if self.first_season.saturating_add(1) >= self.target_season {
            bail!(
                "first_season ({}) must be at least two seasons before target_season ({}): \
                 week 1 uses season {} as its predictor, and the earliest season is dropped",
                self.first_season,
                self.target_season,
                self.target_season.saturating_sub(1)
            );
        }
        if self.weeks == 0 {
            bail!("weeks must be at least 1");
        }
        if self.prior_season_final_week == 0 {
            bail!("prior_season_final_week must be at least 1");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    /// Play-by-play CSV location; `{season}` is substituted per request.
    pub pbp_url_template: String,
    pub schedule_url: String,
    pub timeout_seconds: u64,
    pub user_agent: String,
    pub max_retries: u32,
}

impl SourcesConfig {
    pub fn pbp_url(&self, season: u32) -> String {
        self.pbp_url_template.replace("{season}", &season.to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
    pub burst_size: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    pub log_level: String,
}

impl AppConfig {
    /// Load configuration from `config/default.toml`.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(DEFAULT_CONFIG_PATH))
    }

    /// Load configuration from a TOML file, after overlaying `.env` onto the
    /// process environment so `RUST_LOG` can live there.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        dotenvy::dotenv().ok();

        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        config.pipeline.validate()?;

        Ok(config)
    }
}
