use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use contact_harvester::harvest::BatchState;
use contact_harvester::logging::init_logging;
use contact_harvester::replay::ReplaySource;
use contact_harvester::{Collaborators, HarvestController, HarvesterSettings, StatusEvent};

/// Batch-harvest group contacts against a replay fixture.
#[derive(Parser, Debug)]
#[command(name = "harvester", version, about)]
struct Cli {
    /// JSON fixture backing every collaborator call
    #[arg(long)]
    fixture: PathBuf,

    /// TOML settings file
    #[arg(long, default_value = "harvester.toml")]
    config: PathBuf,

    /// File with one group target per line
    #[arg(long, conflicts_with = "targets")]
    targets_file: Option<PathBuf>,

    /// Group targets; defaults to every group in the fixture
    targets: Vec<String>,

    /// Export format: csv, json or excel
    #[arg(long)]
    export: Option<String>,

    /// Where to write the export; defaults to the format's file name
    #[arg(long, requires = "export")]
    output: Option<PathBuf>,

    /// Keep monitoring the first target for this many seconds after the batch
    #[arg(long)]
    monitor_secs: Option<u64>,

    /// Overrides the configured log level
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = HarvesterSettings::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    init_logging(cli.log_level.as_deref().unwrap_or(&settings.logging.level));

    let source = Arc::new(
        ReplaySource::from_file(&cli.fixture)
            .with_context(|| format!("loading fixture {}", cli.fixture.display()))?,
    );

    let targets = match &cli.targets_file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?
            .lines()
            .map(str::to_string)
            .collect(),
        None if cli.targets.is_empty() => source.targets(),
        None => cli.targets.clone(),
    };

    let controller = HarvestController::new(Collaborators::from_source(source), &settings)?;

    let mut last_seen = 0;
    let started =
        controller.start_batch(targets.clone(), settings.filters, settings.session.clone());
    last_seen = print_events(&controller, last_seen);
    started?;

    let report = controller
        .wait_for_batch()
        .await?
        .context("batch was not started")?;
    last_seen = print_events(&controller, last_seen);

    if report.state != BatchState::Completed {
        controller.teardown().await.ok();
        bail!("batch ended in state {:?}", report.state);
    }
    println!(
        "{}% | {} contacts from {} of {} group(s)",
        report.progress.percent,
        report.stats.contacts_added,
        report.stats.succeeded,
        report.stats.total_targets
    );

    let first_target = targets.iter().find(|t| !t.trim().is_empty());
    if let (Some(secs), Some(target)) = (cli.monitor_secs, first_target) {
        controller.start_monitor(target)?;
        tokio::time::sleep(Duration::from_secs(secs)).await;
        controller.stop_monitor();
        last_seen = print_events(&controller, last_seen);
    }

    if let Some(format) = &cli.export {
        let artifact = controller.export(format)?;
        let path = cli
            .output
            .clone()
            .unwrap_or_else(|| PathBuf::from(artifact.filename));
        std::fs::write(&path, &artifact.bytes)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("wrote {} ({})", path.display(), artifact.content_type);
    }

    controller.teardown().await?;
    print_events(&controller, last_seen);
    Ok(())
}

fn print_events(controller: &HarvestController, after: u64) -> u64 {
    let events: Vec<StatusEvent> = controller.events_since(after);
    for event in &events {
        println!(
            "[{}] {:<7} {}",
            event.timestamp.format("%H:%M:%S"),
            event.kind,
            event.message
        );
    }
    events.last().map_or(after, |e| e.id)
}
