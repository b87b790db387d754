use std::io::Read;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use consilium_agents::StaticMarketData;
use consilium_models::{ConsiliumConfig, MarketBriefingDocument};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "consilium", about = "Multi-agent probability analysis for prediction markets")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/consilium.toml")]
    config: String,

    /// Market to analyze. Defaults to the briefing's own market_id
    #[arg(short, long)]
    market: Option<String>,

    /// Read the MarketBriefingDocument JSON from a file instead of stdin
    #[arg(short, long)]
    briefing: Option<String>,

    /// Pretty-print the output JSON
    #[arg(long)]
    pretty: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn to_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<String> {
    let output = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(output)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    // Load config
    let config_str = std::fs::read_to_string(&cli.config)
        .with_context(|| format!("Failed to read config: {}", cli.config))?;
    let config: ConsiliumConfig =
        toml::from_str(&config_str).with_context(|| "Failed to parse config")?;

    // Read briefing
    let briefing_json = if let Some(path) = &cli.briefing {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read briefing: {path}"))?
    } else {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read from stdin")?;
        buf
    };
    let briefing: MarketBriefingDocument = serde_json::from_str(&briefing_json)
        .context("Failed to parse MarketBriefingDocument JSON")?;
    let market_id = cli.market.clone().unwrap_or_else(|| briefing.market_id.clone());

    let market_data = Arc::new(StaticMarketData::from_briefings([briefing]));
    let pipeline =
        consilium::build_pipeline(&config, market_data).context("Failed to build pipeline")?;

    // Ctrl-C cancels the run; partial results are still reported
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling analysis");
            on_signal.cancel();
        }
    });

    match consilium::analyze(&pipeline, &market_id, &cancel).await {
        Ok(report) => {
            println!("{}", to_json(&report, cli.pretty)?);
            Ok(())
        }
        Err(failure) => {
            println!("{}", to_json(&failure, cli.pretty)?);
            Err(anyhow::Error::new(failure).context("Analysis failed"))
        }
    }
}
