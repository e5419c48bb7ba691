use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use dayanchor_core::{AnchorConfig, AnchoringCoordinator, AnchoringMode, HttpScoringProvider};
use tracing::warn;

#[derive(Args)]
pub struct RunArgs {
    /// Day description JSON (`-` for stdin)
    #[arg(short, long)]
    input: PathBuf,
    /// Anchoring mode: deterministic, hybrid or ai_only
    #[arg(long)]
    mode: Option<AnchoringMode>,
    /// Minimum confidence for anchoring (0.0 - 1.0)
    #[arg(long)]
    threshold: Option<f64>,
    /// Never call the scoring provider
    #[arg(long)]
    offline: bool,
}

pub fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut request = super::read_request(&args.input)?;
    if let Some(mode) = args.mode {
        request.mode = Some(mode);
    }
    if let Some(threshold) = args.threshold {
        request.confidence_threshold = Some(threshold);
    }

    let config = AnchorConfig::load()?;
    let mode = request.mode.unwrap_or(config.default_mode);
    let mut coordinator = AnchoringCoordinator::new(config.clone());

    if !args.offline && mode.uses_provider() {
        match HttpScoringProvider::from_config(&config.provider) {
            Ok(provider) => coordinator = coordinator.with_provider(Arc::new(provider)),
            Err(e) => warn!(error = %e, "scoring provider unavailable"),
        }
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(coordinator.anchor(&request))?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
