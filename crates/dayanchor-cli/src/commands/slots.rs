use std::path::PathBuf;

use clap::Args;
use dayanchor_core::{AnchorConfig, AnchoringCoordinator};

#[derive(Args)]
pub struct SlotsArgs {
    /// Day description JSON (`-` for stdin)
    #[arg(short, long)]
    input: PathBuf,
}

pub fn run(args: SlotsArgs) -> Result<(), Box<dyn std::error::Error>> {
    let request = super::read_request(&args.input)?;
    let coordinator = AnchoringCoordinator::new(AnchorConfig::load()?);

    let slots = coordinator.compute_slots(&request)?;
    println!("{}", serde_json::to_string_pretty(&slots)?);
    Ok(())
}
