use anyhow::Result;
use cadastre_redefinition::replay::{load_session, replay};
use cadastre_redefinition::CoincidentVertex;
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Recorded editing session (JSON)
    #[arg(value_name = "SESSION")]
    session: PathBuf,

    /// Write the result here instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Maximum distance between a node and a ring segment, in map units
    #[arg(long)]
    snap_tolerance: Option<f64>,

    /// Do not add a vertex where the ring already has one
    #[arg(long)]
    merge_coincident: bool,

    /// Node request timeout in milliseconds (0 disables it)
    #[arg(long)]
    fetch_timeout_ms: Option<u64>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // stdout carries the result
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let args = Args::parse();
    let start_time = std::time::Instant::now();

    let mut session = load_session(&args.session)?;
    if let Some(tolerance) = args.snap_tolerance {
        session.config.snap_tolerance = tolerance;
    }
    if args.merge_coincident {
        session.config.coincident_vertex = CoincidentVertex::Merge;
    }
    if let Some(ms) = args.fetch_timeout_ms {
        session.config.fetch_timeout = (ms > 0).then(|| Duration::from_millis(ms));
    }
    session.config.validate()?;

    info!("Replaying session: {:?}", args.session);
    let outcome = replay(session).await?;

    let failed = outcome.gestures.iter().filter(|g| g.error.is_some()).count();
    if failed > 0 {
        warn!("{} of {} gestures failed", failed, outcome.gestures.len());
    }

    let json = serde_json::to_string_pretty(&outcome)?;
    match &args.output {
        Some(path) => {
            fs::write(path, json)?;
            info!("Written result: {:?}", path);
        }
        None => println!("{}", json),
    }

    info!("Total processing time: {:?}", start_time.elapsed());
    Ok(())
}
