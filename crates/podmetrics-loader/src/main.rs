//! Podcast metrics loader - stage and merge upstream results for one or more days

use anyhow::{bail, Result};
use chrono::NaiveDate;
use clap::Parser;
use podmetrics_common::logging::{init_logging, LogConfig};
use podmetrics_common::types::MetricType;
use podmetrics_loader::{build_loader, config::Config};
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(name = "podmetrics-loader")]
#[command(author, version, about = "Load vendor podcast metrics into the permanent tables")]
struct Cli {
    /// Day to load (YYYY-MM-DD); repeatable
    #[arg(short, long = "date")]
    dates: Vec<NaiveDate>,

    /// First day of an inclusive range
    #[arg(long, requires = "to")]
    from: Option<NaiveDate>,

    /// Last day of an inclusive range
    #[arg(long, requires = "from")]
    to: Option<NaiveDate>,

    /// Results bucket (defaults to METRICS_BUCKET)
    #[arg(short, long)]
    bucket: Option<String>,

    /// Metric types to skip, e.g. EPISODE_DAY_CITY
    #[arg(long, value_delimiter = ',')]
    exclude: Vec<MetricType>,

    /// Extra metric types to load, e.g. PODCAST_HOUR
    #[arg(long, value_delimiter = ',')]
    include: Vec<MetricType>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn days(&self) -> Result<Vec<NaiveDate>> {
        let mut days = self.dates.clone();

        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                bail!("--from {} is after --to {}", from, to);
            }
            days.extend(from.iter_days().take_while(|day| *day <= to));
        }

        if days.is_empty() {
            bail!("No days requested: pass --date or --from/--to");
        }
        Ok(days)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };

    let log_config = LogConfig {
        level: log_level,
        log_file_prefix: "podmetrics-loader".to_string(),
        ..LogConfig::default()
    };

    // Environment variables take precedence
    let log_config = log_config.merge_env()?;

    let _guard = init_logging(&log_config)?;

    let days = cli.days()?;
    let config = Config::load()?;
    let bucket = cli.bucket.clone().unwrap_or_else(|| config.loader.bucket.clone());

    let loader = build_loader(&config).await?;
    let reports = loader
        .load_days(&bucket, &days, &cli.exclude, &cli.include)
        .await?;

    for report in &reports {
        info!(
            day = %report.day,
            units = report.units.len(),
            rows = report.total_compacted(),
            "Loaded metrics"
        );
    }

    info!("Load complete");
    Ok(())
}
