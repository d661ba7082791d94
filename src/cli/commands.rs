//! Command implementations for the proofreader CLI.

use std::time::Instant;

use log::info;

use crate::cli::args::*;
use crate::cli::output::*;
use crate::config::SessionConfig;
use crate::correction::CorrectionLog;
use crate::error::Result;
use crate::protocol::TcpChannel;
use crate::session::ProofreadingSession;
use crate::simulator::proofread;
use crate::volume::{ImageVolume, LabelVolume};

/// Execute a CLI command.
pub fn execute_command(args: ProofreaderArgs) -> Result<()> {
    match &args.command {
        Command::Serve(serve_args) => serve(serve_args.clone(), &args),
        Command::Simulate(simulate_args) => simulate(simulate_args.clone(), &args),
    }
}

/// Serve one session until the client stops it.
fn serve(args: ServeArgs, cli_args: &ProofreaderArgs) -> Result<()> {
    let start = Instant::now();
    let mut config = SessionConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;

    let labels = LabelVolume::load(&args.labels)?;
    let image = match &args.image {
        Some(path) => ImageVolume::load(path)?,
        None => ImageVolume::empty(),
    };

    let mut session = ProofreadingSession::new(&labels, &image, config.clone())?;
    if let Some(path) = args.corrections.as_deref().filter(|p| p.exists()) {
        session = session.with_log(CorrectionLog::load(path)?)?;
    }

    let binding = TcpChannel::bind(config.address())?;
    let address = binding.local_addr()?.to_string();
    if cli_args.verbosity() > 0 {
        println!("Session {} listening on {address}", session.id());
    }
    let mut channel = binding.accept()?;
    let outcome = session.listen(&mut channel);

    if let Some(path) = &args.corrections {
        session.log().save(path)?;
        info!("saved {} corrections to {}", session.log().len(), path.display());
    }
    outcome?;

    output_result(
        "Session stopped",
        &ServeSummary {
            session_id: session.id().to_string(),
            address,
            corrections: session.log().len(),
            stats: *session.stats(),
            duration_ms: start.elapsed().as_millis() as u64,
        },
        cli_args,
    )
}

/// Proofread a running session and print the lookup table it returns.
fn simulate(args: SimulateArgs, cli_args: &ProofreaderArgs) -> Result<()> {
    let start = Instant::now();
    let fragments = LabelVolume::load(&args.fragments)?;
    let truth = LabelVolume::load(&args.truth)?;

    let table = proofread(
        &fragments,
        &truth,
        args.address(),
        args.simulator_config(),
    )?;

    output_result(
        "Lookup table received",
        &SimulationResult {
            segment_count: table.segment_count(),
            fragments: table.fragments,
            segments: table.segments,
            duration_ms: start.elapsed().as_millis() as u64,
        },
        cli_args,
    )
}
