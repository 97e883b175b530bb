//! Curator - segmented daily digest CLI
//!
//! The `curator` command drives the digest pipeline for one run date.
//!
//! ## Commands
//!
//! - `run`: classify, enrich, compose, validate and heal every segment
//! - `classify`: produce and enrich a Selection for one segment
//! - `compose`: render a Selection into an HTML artifact
//! - `validate`: run the quality gate over an artifact
//! - `score`: print the newsworthiness score of a Selection
//! - `heal`: drive a Selection through the self-healing loop

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::{info, Level};

use curator_core::completion::HttpCompletionClient;
use curator_core::composer::Composer;
use curator_core::config::{require_input, CuratorConfig};
use curator_core::delivery::{DeliveryChannel, OutboxDelivery};
use curator_core::escalation::{write_escalation_artifact, EscalationRecord, EscalationSink, FallbackSink};
use curator_core::obs::SegmentSpan;
use curator_core::pipeline::{Pipeline, SegmentOutcome};
use curator_core::quality_gate::QualityGate;
use curator_core::self_healing::{HealResult, SelfHealingEngine};
use curator_core::store::{read_selection, write_selection, JsonSelectionStore};
use curator_core::{
    scorer, Enricher, ItemPool, RenderedArtifact, SegmentCatalog, SegmentProfile, Selection,
    TierClassifier,
};

#[derive(Parser)]
#[command(name = "curator")]
#[command(author = "Brief Delights")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Segmented daily digest pipeline", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// TOML configuration file (defaults apply when omitted)
    #[arg(short, long, global = true, env = "CURATOR_CONFIG")]
    config: Option<PathBuf>,

    /// Run date, YYYY-MM-DD (default: today)
    #[arg(long, global = true)]
    date: Option<NaiveDate>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every segment end to end
    Run {
        /// Segment profiles (JSON)
        #[arg(long)]
        segments: PathBuf,

        /// Raw item pool (JSON)
        #[arg(long)]
        pool: PathBuf,

        /// Only run these segments (repeatable)
        #[arg(long = "segment")]
        only: Vec<String>,

        /// Override the outbox directory
        #[arg(long)]
        outbox_dir: Option<PathBuf>,
    },

    /// Select and enrich items for one segment
    Classify {
        #[arg(long)]
        segments: PathBuf,

        #[arg(long)]
        pool: PathBuf,

        #[arg(long)]
        segment: String,

        /// Where to write the Selection (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Render a Selection into an artifact
    Compose {
        #[arg(long)]
        segments: PathBuf,

        /// Selection file written by `classify`
        #[arg(long)]
        selection: PathBuf,

        /// Where to write the HTML (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run the quality gate over a rendered artifact
    Validate {
        #[arg(long)]
        selection: PathBuf,

        /// Rendered HTML artifact
        #[arg(long)]
        artifact: PathBuf,

        /// Report failures but exit successfully
        #[arg(long)]
        warn_only: bool,
    },

    /// Print the newsworthiness score of a Selection
    Score {
        #[arg(long)]
        selection: PathBuf,

        /// Score against this segment's tier targets
        #[arg(long, requires = "segment")]
        segments: Option<PathBuf>,

        #[arg(long)]
        segment: Option<String>,
    },

    /// Drive a Selection through compose, validate and heal
    Heal {
        #[arg(long)]
        segments: PathBuf,

        #[arg(long)]
        selection: PathBuf,

        /// Deliver to the outbox when the gate passes
        #[arg(long)]
        deliver: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    curator_core::init_tracing(cli.json, level);

    let config = CuratorConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let run_date = cli
        .date
        .unwrap_or_else(|| chrono::Local::now().date_naive());

    match cli.command {
        Commands::Run {
            segments,
            pool,
            only,
            outbox_dir,
        } => cmd_run(config, run_date, &segments, &pool, &only, outbox_dir).await,
        Commands::Classify {
            segments,
            pool,
            segment,
            output,
        } => cmd_classify(&config, &segments, &pool, &segment, output.as_deref()).await,
        Commands::Compose {
            segments,
            selection,
            output,
        } => cmd_compose(&config, run_date, &segments, &selection, output.as_deref()).await,
        Commands::Validate {
            selection,
            artifact,
            warn_only,
        } => cmd_validate(&config, run_date, &selection, &artifact, warn_only).await,
        Commands::Score {
            selection,
            segments,
            segment,
        } => cmd_score(&selection, segments.as_deref(), segment.as_deref()).await,
        Commands::Heal {
            segments,
            selection,
            deliver,
        } => cmd_heal(&config, run_date, &segments, &selection, deliver).await,
    }
}

fn load_catalog(path: &Path) -> Result<SegmentCatalog> {
    require_input(path)?;
    SegmentCatalog::load(path).context(format!("Failed to load segments from {:?}", path))
}

fn load_pool(path: &Path) -> Result<ItemPool> {
    require_input(path)?;
    ItemPool::load(path).context(format!("Failed to load item pool from {:?}", path))
}

async fn load_selection(path: &Path) -> Result<Selection> {
    require_input(path)?;
    read_selection(path)
        .await
        .context(format!("Failed to read selection from {:?}", path))
}

fn profile_for<'a>(catalog: &'a SegmentCatalog, segment_id: &str) -> Result<&'a SegmentProfile> {
    catalog
        .get(segment_id)
        .context(format!("Unknown segment '{}'", segment_id))
}

fn write_or_print(output: Option<&Path>, text: &str) -> Result<()> {
    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, text).context(format!("Failed to write to {:?}", path))?;
            println!("Wrote {:?}", path);
        }
        None => println!("{}", text),
    }
    Ok(())
}

async fn cmd_run(
    mut config: CuratorConfig,
    run_date: NaiveDate,
    segments: &Path,
    pool: &Path,
    only: &[String],
    outbox_dir: Option<PathBuf>,
) -> Result<()> {
    let mut catalog = load_catalog(segments)?;
    let pool = load_pool(pool)?;
    if !only.is_empty() {
        for id in only {
            profile_for(&catalog, id)?;
        }
        catalog.segments.retain(|id, _| only.contains(id));
    }
    if let Some(dir) = outbox_dir {
        config.paths.outbox_dir = dir;
    }

    let service = HttpCompletionClient::new(&config.completion)
        .context("Completion service is not configured")?;
    let pipeline = Pipeline::new(
        &config,
        Arc::new(service),
        Arc::new(FallbackSink::from_config(&config.escalation)),
        Arc::new(OutboxDelivery::new(&config.paths.outbox_dir)),
        run_date,
    );

    info!(segments = catalog.len(), pool = pool.len(), date = %run_date, "Starting run");
    let summary = pipeline.run(&pool, &catalog).await;

    println!("Run {}", summary.run_date);
    for report in &summary.segments {
        match &report.outcome {
            SegmentOutcome::Delivered { receipt, score, .. } => println!(
                "  ✓ {:<16} delivered  {:>5.1} ({})  {}",
                report.segment_id,
                score.value,
                score.tier.as_str(),
                receipt.location
            ),
            SegmentOutcome::Escalated { record, ticket } => println!(
                "  ✗ {:<16} escalated  {}  {}",
                report.segment_id,
                record.reason,
                ticket
                    .as_ref()
                    .map(|t| t.location.as_str())
                    .unwrap_or("(ticket not filed)")
            ),
        }
    }

    if !summary.all_delivered() {
        bail!(
            "{} of {} segments were not delivered",
            summary.escalated(),
            summary.segments.len()
        );
    }
    Ok(())
}

async fn cmd_classify(
    config: &CuratorConfig,
    segments: &Path,
    pool: &Path,
    segment: &str,
    output: Option<&Path>,
) -> Result<()> {
    let catalog = load_catalog(segments)?;
    let profile = profile_for(&catalog, segment)?;
    let pool = load_pool(pool)?;

    let service = Arc::new(
        HttpCompletionClient::new(&config.completion)
            .context("Completion service is not configured")?,
    );
    let classifier = TierClassifier::new(service.clone(), config);
    let mut selection = classifier
        .classify(&pool.items, profile)
        .await
        .context(format!("Classification failed for segment '{}'", segment))?;
    let report = Enricher::new(service, config)
        .enrich(&mut selection, profile)
        .await;
    info!(
        segment_id = %segment,
        items = selection.len(),
        service = report.service,
        fallback = report.fallback,
        "Selection ready"
    );

    match output {
        Some(path) => {
            write_selection(&selection, path)
                .await
                .context(format!("Failed to write selection to {:?}", path))?;
            println!("Wrote {:?}", path);
        }
        None => println!("{}", serde_json::to_string_pretty(&selection)?),
    }
    Ok(())
}

async fn cmd_compose(
    config: &CuratorConfig,
    run_date: NaiveDate,
    segments: &Path,
    selection: &Path,
    output: Option<&Path>,
) -> Result<()> {
    let catalog = load_catalog(segments)?;
    let mut selection = load_selection(selection).await?;
    let profile = profile_for(&catalog, &selection.segment_id)?;
    let _span = SegmentSpan::enter(&profile.id, &run_date.to_string());

    let artifact = Composer::new(config.brand.clone())
        .compose(&mut selection, profile, run_date)
        .context("Compose failed")?;
    info!(bytes = artifact.byte_size, digest = %artifact.digest().short(), "Artifact composed");
    write_or_print(output, &artifact.body)
}

async fn cmd_validate(
    config: &CuratorConfig,
    run_date: NaiveDate,
    selection: &Path,
    artifact: &Path,
    warn_only: bool,
) -> Result<()> {
    let selection = load_selection(selection).await?;
    require_input(artifact)?;
    let body = std::fs::read_to_string(artifact)
        .context(format!("Failed to read artifact {:?}", artifact))?;
    let _span = SegmentSpan::enter(&selection.segment_id, &run_date.to_string());

    let artifact = RenderedArtifact::new(selection.segment_id.clone(), run_date, body);
    let report = QualityGate::new(&config.brand).validate(&artifact, &selection);
    print!("{}", report.render_text());

    if !report.overall_pass() {
        if warn_only {
            println!("(warn-only mode: not failing)");
        } else {
            bail!("Quality gate failed for segment '{}'", selection.segment_id);
        }
    }
    Ok(())
}

async fn cmd_score(
    selection: &Path,
    segments: Option<&Path>,
    segment: Option<&str>,
) -> Result<()> {
    let selection = load_selection(selection).await?;
    let score = match (segments, segment) {
        (Some(segments), Some(segment)) => {
            let catalog = load_catalog(segments)?;
            scorer::score_with(&selection, &profile_for(&catalog, segment)?.targets)
        }
        _ => scorer::score(&selection),
    };
    println!("{}", serde_json::to_string_pretty(&score)?);
    Ok(())
}

async fn cmd_heal(
    config: &CuratorConfig,
    run_date: NaiveDate,
    segments: &Path,
    selection: &Path,
    deliver: bool,
) -> Result<()> {
    let catalog = load_catalog(segments)?;
    let selection = load_selection(selection).await?;
    let profile = profile_for(&catalog, &selection.segment_id)?;

    let engine = SelfHealingEngine::new(
        Composer::new(config.brand.clone()),
        QualityGate::new(&config.brand),
        config.pipeline.max_heal_attempts,
    )
    .with_store(Arc::new(JsonSelectionStore::new(&config.paths.runs_dir)));

    match engine.run(selection, profile, run_date).await {
        HealResult::Approved {
            artifact, session, ..
        } => {
            println!(
                "✓ {} passed ({:?}, {} heal attempts)",
                profile.id,
                session.outcome,
                session.attempts_used()
            );
            if deliver {
                let receipt = OutboxDelivery::new(&config.paths.outbox_dir)
                    .deliver(&artifact)
                    .await
                    .context("Delivery failed")?;
                println!("Delivered to {}", receipt.location);
            }
            Ok(())
        }
        HealResult::Escalate {
            reason, session, ..
        } => {
            let record = EscalationRecord::new(&profile.id, run_date, reason).with_session(session);
            let path = write_escalation_artifact(&record, &config.paths.runs_dir)
                .context("Failed to persist escalation")?;
            let ticket = FallbackSink::from_config(&config.escalation)
                .file(&record)
                .await
                .context("Failed to file escalation")?;
            println!("✗ {} escalated: {}", profile.id, record.reason);
            println!("  record: {:?}", path);
            println!("  ticket: {} ({})", ticket.location, ticket.sink);
            bail!("Segment '{}' needs human review", profile.id)
        }
    }
}
