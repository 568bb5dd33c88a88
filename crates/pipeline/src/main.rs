//! `fledger`: load a forecast, optionally shift every interval, run the
//! validate → save pipeline and print the resulting rows as JSON.

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::Parser;

use fledger_core::LedgerConfig;
use fledger_pipeline::http::parse_series;
use fledger_pipeline::{EditSession, HttpAdjustmentsClient, PipelineConfig};

#[derive(Parser)]
#[command(
    name = "fledger",
    about = "Apply manual adjustments to a forecast and push them through validation and save",
    after_help = "Without FORECAST the series is fetched from FORECAST_API_URL."
)]
struct Cli {
    /// Forecast JSON file (`{"series": [...]}` or a bare array)
    forecast: Option<PathBuf>,

    /// Adjustment delta added to every interval
    #[arg(allow_negative_numbers = true)]
    delta: Option<f64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    fledger_observability::init();

    let ledger = LedgerConfig::from_env();
    let pipeline = PipelineConfig::from_env();

    let points = match &cli.forecast {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("cannot read forecast from {}", path.display()))?;
            let json = serde_json::from_str::<serde_json::Value>(&text)
                .with_context(|| format!("{} is not valid JSON", path.display()))?;
            parse_series(json).with_context(|| format!("cannot parse forecast in {}", path.display()))?
        }
        None => {
            let Some(client) = HttpAdjustmentsClient::from_config(&pipeline) else {
                bail!("no forecast file given and FORECAST_API_URL is not set");
            };
            client
                .fetch_forecast_series()
                .await
                .with_context(|| format!("cannot fetch forecast from {}", client.base_url()))?
        }
    };

    let mut session = EditSession::connect(ledger, pipeline);
    session.load(points).context("forecast rejected")?;

    if let Some(delta) = cli.delta {
        session.select_all();
        session.increment(delta).context("edit rejected")?;
        session.clear_selection();
        for resolution in session.settle().await {
            if let Some(failure) = resolution.failure {
                tracing::warn!(batch = %resolution.batch, %failure, "pipeline did not save");
            }
        }
    }

    let report = serde_json::json!({
        "summary": session.summary(),
        "rows": session.rows(),
    });
    println!("{}", serde_json::to_string_pretty(&report).context("cannot render report")?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_forecast_and_negative_delta() {
        let cli = Cli::try_parse_from(["fledger", "week.json", "-2.5"]).unwrap();
        assert_eq!(cli.forecast, Some(PathBuf::from("week.json")));
        assert_eq!(cli.delta, Some(-2.5));
    }

    #[test]
    fn rejects_extra_and_malformed_arguments() {
        assert!(Cli::try_parse_from(["fledger", "week.json", "5", "extra"]).is_err());
        assert!(Cli::try_parse_from(["fledger", "week.json", "five"]).is_err());
    }
}
