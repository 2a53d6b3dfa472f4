//! Pair Study Builder CLI
//!
//! Builds the pairwise interference scenarios for a study and writes the
//! ordered run queue as a JSON report.
//!
//! Usage:
//!   pair-study --study data/study.json --channels 14-36,38 \
//!              --workers 8 --output data/pair_report.json

use anyhow::{Context, Result};
use clap::Parser;
use pair_study::{
    parse_channel_list, prepare_run, restore_study, BuildConfig, BuildReport, BuildRequest,
    CancelFlag, DigitalReplicator,
};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use study_model::{InMemoryRepository, Study, StudyRepository};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "pair-study",
    about = "Generate pairwise interference scenarios for a broadcast study"
)]
struct Args {
    /// Path to the study JSON file
    #[arg(short, long)]
    study: PathBuf,

    /// Study channels, e.g. "14-36,38"
    #[arg(short, long)]
    channels: String,

    /// Maximum worker processes to recommend
    #[arg(short, long)]
    workers: Option<usize>,

    /// Build config JSON file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Compare every transmitter of distributed undesired stations
    #[arg(long)]
    check_each_transmitter: bool,

    /// Output report JSON file
    #[arg(short, long, default_value = "data/pair_report.json")]
    output: PathBuf,

    /// Remove the generated scenarios again after writing the report
    #[arg(long)]
    restore: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("{}", "=".repeat(60));
    info!("Pair Study Builder");
    info!("{}", "=".repeat(60));

    let mut config = match &args.config {
        Some(path) => BuildConfig::from_file(path)?,
        None => BuildConfig::new(),
    };
    if let Some(n) = args.workers {
        config = config.workers(n);
    }
    if args.check_each_transmitter {
        config = config.check_each_transmitter(true);
    }
    let channels = parse_channel_list(&args.channels)?;

    info!("Loading study from {:?}", args.study);
    let file = File::open(&args.study)
        .with_context(|| format!("opening study file {:?}", args.study))?;
    let study: Study = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing study file {:?}", args.study))?;
    let study_id = study.id.clone();

    let repository = InMemoryRepository::new();
    repository.insert_study(study);

    let request = BuildRequest::new(channels).with_config(config);
    let run = match prepare_run(
        &repository,
        &study_id,
        &request,
        &DigitalReplicator,
        &CancelFlag::new(),
    ) {
        Ok(run) => run,
        Err(e) => match e.user_message() {
            Some(message) => {
                error!("{}", message);
                return Err(e.into());
            }
            None => {
                info!("Build cancelled");
                return Ok(());
            }
        },
    };

    let report = BuildReport::new(&run.study, &run.queue, run.stats.clone());
    info!("Writing report to {:?}", args.output);
    let file = File::create(&args.output)
        .with_context(|| format!("creating report file {:?}", args.output))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &report)?;

    let mut lock = run.lock;
    if args.restore {
        let summary = restore_study(&repository, &study_id, &lock)?;
        if let Some(restored) = summary.lock {
            lock = restored;
        }
    }
    repository.release_lock(&lock)?;

    info!("\n{}", "=".repeat(60));
    info!("SUMMARY");
    info!("{}", "=".repeat(60));
    info!("Scenarios queued:    {}", run.queue.total_scenario_count());
    info!("Recommended workers: {}", run.queue.recommended_worker_count());

    Ok(())
}
