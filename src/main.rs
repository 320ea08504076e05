use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use nfl_epa_features::config::{AppConfig, DEFAULT_CONFIG_PATH};
use nfl_epa_features::data::nflverse::NflverseClient;
use nfl_epa_features::db::store::SqliteStore;
use nfl_epa_features::db::FeatureStore;
use nfl_epa_features::features::matchup::{feature_columns, GameFeatureRow};
use nfl_epa_features::monitoring::logger;
use nfl_epa_features::pipeline::driver::{Pipeline, RunOutcome};

#[derive(Parser, Debug)]
#[command(author, version, about = "Build per-game EPA features for NFL matchups")]
struct Cli {
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import and assemble features unless they are already persisted
    Run,
    /// Re-import and replace every persisted row
    Import,
    /// Print persisted feature rows for one week
    Show {
        #[arg(short, long)]
        week: u32,

        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    /// Delete every persisted row
    Clear,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config)?;

    logger::init_logging(&config.monitoring)?;

    tracing::info!(
        command = ?cli.command,
        database = %config.database.path,
        "nfl-epa-features starting"
    );

    let store = Arc::new(SqliteStore::new(&config.database.path).await?);

    match cli.command {
        Command::Run => run_pipeline(&config, store, false).await,
        Command::Import => run_pipeline(&config, store, true).await,
        Command::Show { week, format } => show_week(store.as_ref(), week, format).await,
        Command::Clear => {
            store.clear().await?;
            tracing::info!("Feature store cleared");
            Ok(())
        }
    }
}

async fn run_pipeline(config: &AppConfig, store: Arc<SqliteStore>, force: bool) -> Result<()> {
    let client = Arc::new(NflverseClient::new(
        config.sources.clone(),
        config.rate_limit.clone(),
    )?);

    let pipeline = Pipeline::new(config.pipeline.clone(), client.clone(), client, store);

    let outcome = if force {
        pipeline.run_forced().await?
    } else {
        pipeline.run().await?
    };

    match outcome {
        RunOutcome::Skipped { rows } => {
            println!("{rows} feature rows already persisted; use `import` to rebuild");
        }
        RunOutcome::Completed {
            run_id,
            rows,
            metrics,
        } => {
            println!("Run {run_id}: {rows} feature rows persisted");
            println!("{}", metrics.summary());
        }
    }

    Ok(())
}

async fn show_week(store: &SqliteStore, week: u32, format: OutputFormat) -> Result<()> {
    let rows = store.rows_for_week(week).await?;
    if rows.is_empty() {
        tracing::warn!(week, "No feature rows persisted for week");
    }

    match format {
        OutputFormat::Json => {
            for row in &rows {
                let json = serde_json::json!({
                    "season": row.season,
                    "week": row.week,
                    "home_team": row.home_team,
                    "away_team": row.away_team,
                    "result": row.result,
                    "model_input": row.model_input(),
                });
                println!("{}", serde_json::to_string(&json)?);
            }
        }
        OutputFormat::Csv => write_csv(&rows)?,
    }

    Ok(())
}

fn write_csv(rows: &[GameFeatureRow]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(std::io::stdout());

    let mut header = vec![
        "season".to_string(),
        "week".to_string(),
        "home_team".to_string(),
        "away_team".to_string(),
    ];
    header.extend(feature_columns());
    writer.write_record(&header)?;

    for row in rows {
        let mut record = vec![
            row.season.to_string(),
            row.week.to_string(),
            row.home_team.clone(),
            row.away_team.clone(),
        ];
        record.extend(row.model_input().iter().map(f64::to_string));
        writer.write_record(&record)?;
    }

    writer.flush().context("Failed to flush CSV output")?;
    Ok(())
}
