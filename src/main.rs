// src/main.rs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lane_runner::{
    matcher, run_eval, ColorMode, Config, Frame, LaneDodgePolicy, LaneRunnerEnv, ObstacleCatalog,
    PerceptionError, RecordingKeys, ReplayCapture, StateExtractor, TemplateStore,
};
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "lane-runner", about = "Perception and episode engine for a lane-runner agent")]
struct Cli {
    /// Path to the YAML config
    #[arg(long, default_value = "config.yaml", global = true)]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play episodes with the rule-based policy over recorded screenshots
    Run(RunArgs),
    /// Run one template against one screenshot and report the matches
    Probe(ProbeArgs),
}

#[derive(clap::Args)]
struct RunArgs {
    /// Directory of recorded PNG screenshots
    #[arg(long)]
    frames: PathBuf,
    /// Screenshots already cover exactly the game region
    #[arg(long)]
    cropped: bool,
    /// Overrides eval.episodes
    #[arg(long)]
    episodes: Option<usize>,
    /// Skip the settle delays (useful on recordings)
    #[arg(long)]
    no_wait: bool,
}

#[derive(clap::Args)]
struct ProbeArgs {
    /// Screenshot of the game region
    #[arg(long)]
    image: PathBuf,
    /// Template name (file base name in the template dir)
    #[arg(long)]
    template: String,
    /// Overrides detection.match_threshold
    #[arg(long)]
    threshold: Option<f32>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = if std::path::Path::new(&cli.config).exists() {
        Config::load(&cli.config)?
    } else {
        Config::default()
    };

    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| format!("lane_runner={}", config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if !std::path::Path::new(&cli.config).exists() {
        warn!("Config {} not found, using defaults", cli.config);
    } else {
        info!("✓ Configuration loaded from {}", cli.config);
    }

    let outcome = match &cli.command {
        Commands::Run(args) => run(config, args),
        Commands::Probe(args) => probe(&config, args),
    };
    if let Err(e) = &outcome {
        error!("{:#}", e);
        if e
            .downcast_ref::<PerceptionError>()
            .is_some_and(PerceptionError::is_configuration)
        {
            error!(
                "Check {} and detection.template_dir before retrying",
                cli.config
            );
        }
    }
    outcome
}

fn run(mut config: Config, args: &RunArgs) -> Result<()> {
    if args.no_wait {
        config.timing.focus_delay_ms = 0;
        config.timing.restart_settle_ms = 0;
        config.timing.retry_pause_ms = 0;
        config.timing.action_settle_ms = 0;
    }
    let episodes = args.episodes.unwrap_or(config.eval.episodes);
    let max_steps = config.eval.max_steps;

    let capture = ReplayCapture::new(&args.frames, args.cropped)?;
    let mut env = LaneRunnerEnv::from_config(config, capture, RecordingKeys::new())?;
    let mut policy = LaneDodgePolicy::new(env.catalog().clone(), env.corrective().clone());

    let stats = run_eval(&mut env, &mut policy, episodes, max_steps);

    info!("----- Evaluation finished -----");
    info!("{}", serde_json::to_string_pretty(&stats)?);
    info!("Keys sent: {}", env.input().pressed().len());
    Ok(())
}

fn probe(config: &Config, args: &ProbeArgs) -> Result<()> {
    let catalog = ObstacleCatalog::from_config(config);
    let store = TemplateStore::load(&config.detection.template_dir, &catalog)?;
    let template = store.get(&args.template).with_context(|| {
        format!(
            "Template '{}' not loaded; available: {:?}",
            args.template,
            store.name_to_class().keys().collect::<Vec<_>>()
        )
    })?;

    let img = image::open(&args.image)
        .with_context(|| format!("Failed to open {}", args.image.display()))?;
    let frame = Frame::from_image(&img, ColorMode::Gray);
    let threshold = args.threshold.unwrap_or(config.detection.match_threshold);

    info!(
        "Probing '{}' ({}x{}) in {} ({}x{}) at threshold {:.2}",
        template.name,
        template.image.width,
        template.image.height,
        args.image.display(),
        frame.width,
        frame.height,
        threshold
    );

    let matches = matcher::detect(&frame, &template.image, threshold);
    if matches.is_empty() {
        warn!("No matches for '{}'", template.name);
    }
    for m in &matches {
        info!("  {}", serde_json::to_string(m)?);
    }

    let extractor = StateExtractor::new(config);
    if let Some(obs) = extractor.extract(Some(&frame), store.obstacle_templates()) {
        info!("Observation: {:?}", obs.map(|c| c.0));
    }
    Ok(())
}
