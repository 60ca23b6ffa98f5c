use anyhow::{Context, Result};
use clap::Parser;
use metals_var::{loader, VarConfig, VarEngine, VarMethod};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[clap(name = "metals-var", about = "Value-at-Risk for a metals futures portfolio")]
struct Args {
    /// Run configuration (YAML or JSON); defaults apply when omitted
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Cleaned positions table (CSV)
    #[clap(long)]
    positions: PathBuf,

    /// Cleaned prices table (CSV)
    #[clap(long)]
    prices: PathBuf,

    /// Override the VaR method (parametric or historical)
    #[clap(long)]
    method: Option<VarMethod>,

    /// Override the confidence level, e.g. 0.99
    #[clap(long)]
    confidence: Option<f64>,

    /// Override the horizon in days
    #[clap(long)]
    horizon_days: Option<u32>,

    /// Override the lookback window in days
    #[clap(long)]
    lookback_days: Option<u32>,
}

impl Args {
    fn apply_overrides(&self, config: &mut VarConfig) {
        if let Some(method) = self.method {
            config.method = method;
        }
        if let Some(confidence) = self.confidence {
            config.confidence_level = confidence;
        }
        if let Some(horizon) = self.horizon_days {
            config.horizon_days = horizon;
        }
        if let Some(lookback) = self.lookback_days {
            config.lookback_days = lookback;
        }
    }
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            VarConfig::load(path).with_context(|| format!("Failed to load {:?}", path))?
        }
        None => VarConfig::default(),
    };
    args.apply_overrides(&mut config);

    let engine = VarEngine::new(config).context("Invalid VaR configuration")?;

    let positions = loader::load_positions(&args.positions)
        .with_context(|| format!("Failed to read positions from {:?}", args.positions))?;
    let prices = loader::load_prices(&args.prices)
        .with_context(|| format!("Failed to read prices from {:?}", args.prices))?;

    let report = engine.run(&positions, &prices).context("VaR run failed")?;

    for result in &report.results {
        info!(
            "{:<24} {} VaR {:.1}% {}d: {:.2}",
            result.scope.to_string(),
            result.method,
            result.confidence_level * 100.0,
            result.time_horizon_days,
            result.var_amount
        );
    }
    if !report.warnings.is_empty() {
        warn!("Run completed with {} warning(s)", report.warnings.len());
    }

    loader::write_report_json(&report, std::io::stdout().lock())?;
    Ok(())
}
