//! Two-step task runner.
//!
//! Examples:
//!   twostep run --subject s01 --block 1
//!   twostep run --subject s01 --block 0 --tutorial --ntrials 50
//!   twostep simulate --subject sim01 --agent hybrid --weight 0.5 --ntrials 201
//!   twostep init-config
//!   twostep paths
//!
//! Task options are read from `config.json` in the data directory (see
//! `twostep paths`) or from `--config`, then overridden by flags.
//! Set `RUST_LOG=debug` to log every trial.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tracing::info;
use tracing_subscriber::EnvFilter;

use twostep::agents::{LearnerParams, LearningAgent, RandomAgent, ResponseTiming};
use twostep::clock::VirtualClock;
use twostep::paths::{AppPaths, OutputKind};
use twostep::sequencer::{ChoiceSource, NullPresenter, Presenter, Rig, TrialSequencer};
use twostep::transition::TransitionKind;
use twostep::trial_log::TrialLog;
use twostep::TaskConfig;

#[derive(Parser)]
#[command(name = "twostep")]
#[command(about = "Two-step reinforcement learning task")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a block at the keyboard (respond with f / j + Enter)
    Run {
        #[command(flatten)]
        block: BlockArgs,
    },
    /// Run a block with a simulated participant
    Simulate {
        #[command(flatten)]
        block: BlockArgs,

        #[arg(long, value_enum, default_value = "hybrid")]
        agent: AgentKind,

        /// Model-based weight for the hybrid agent
        #[arg(long, default_value = "0.5")]
        weight: f64,

        /// Seed for the simulated participant
        #[arg(long, default_value = "1")]
        agent_seed: u64,
    },
    /// Write the default task options to the config file
    InitConfig {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
    /// Show the data directory and config file path
    Paths,
}

#[derive(Args)]
struct BlockArgs {
    /// Subject identifier (required)
    #[arg(long)]
    subject: String,

    /// Block number, used in output file names
    #[arg(long, default_value = "1")]
    block: u32,

    /// Task options (JSON); defaults to config.json in the data directory
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for the CSV exports; defaults to the data directory
    #[arg(long)]
    out: Option<PathBuf>,

    #[arg(long)]
    ntrials: Option<u32>,

    /// Tutorial block: fixed seed and `-tut` output names
    #[arg(long)]
    tutorial: bool,

    /// Seed for the task's random stream
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum AgentKind {
    #[value(name = "random")]
    Random,
    #[value(name = "model-free")]
    ModelFree,
    #[value(name = "model-based")]
    ModelBased,
    #[value(name = "hybrid")]
    Hybrid,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { block } => run_terminal(&block),
        Commands::Simulate {
            block,
            agent,
            weight,
            agent_seed,
        } => run_simulated(&block, agent, weight, agent_seed),
        Commands::InitConfig { force } => init_config(force),
        Commands::Paths => {
            let paths = AppPaths::new()?;
            println!("Data directory: {}", paths.data_dir().display());
            println!("Config file:    {}", paths.config_file().display());
            Ok(())
        }
    }
}

fn load_config(args: &BlockArgs, paths: &AppPaths) -> Result<TaskConfig> {
    let mut cfg = match &args.config {
        Some(path) => TaskConfig::load(path)?,
        None if paths.config_file().is_file() => TaskConfig::load(&paths.config_file())?,
        None => TaskConfig::default(),
    };
    if let Some(n) = args.ntrials {
        cfg.ntrials = n;
    }
    if args.tutorial {
        cfg.tutorial = true;
    }
    if args.seed.is_some() {
        cfg.seed = args.seed;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn check_subject(subject: &str) -> Result<()> {
    if subject.trim().is_empty() {
        bail!("a subject identifier is required");
    }
    if subject.contains(['/', '\\']) {
        bail!("subject identifier must not contain path separators: {subject:?}");
    }
    Ok(())
}

fn task_rng(cfg: &TaskConfig) -> ChaCha20Rng {
    let seed = cfg.effective_seed().unwrap_or_else(rand::random);
    info!(seed, "task random stream");
    ChaCha20Rng::seed_from_u64(seed)
}

/// Runs one block and writes both exports.
fn run_block(
    args: &BlockArgs,
    cfg: TaskConfig,
    input: &mut dyn ChoiceSource,
    presenter: &mut dyn Presenter,
    clock: &mut dyn twostep::clock::Clock,
    paths: &AppPaths,
) -> Result<()> {
    let tutorial = cfg.tutorial;
    let rng = task_rng(&cfg);
    let mut seq = TrialSequencer::new(cfg, rng)?;

    let mut rig = Rig::new(input, presenter, clock);
    seq.run(&mut rig);

    let stats = seq.stats().clone();
    let log = seq.into_log();

    let out = match &args.out {
        Some(dir) => AppPaths::at(dir)?,
        None => paths.clone(),
    };
    write_exports(&log, &out, &args.subject, args.block, tutorial)?;

    println!(
        "Completed {} trials ({} aborted), reward rate {:.3}",
        stats.completed,
        stats.total_aborted(),
        stats.reward_rate()
    );
    print_stay_table(&log);
    Ok(())
}

fn write_exports(log: &TrialLog, out: &AppPaths, subject: &str, block: u32, tutorial: bool) -> Result<()> {
    let raw = out.output_file(OutputKind::Raw, subject, block, tutorial);
    let file = File::create(&raw).with_context(|| format!("creating {}", raw.display()))?;
    log.write_csv(BufWriter::new(file), subject, block)?;
    info!(path = %raw.display(), rows = log.len(), "raw trials written");

    let tf = out.output_file(OutputKind::StayAnalysis, subject, block, tutorial);
    let file = File::create(&tf).with_context(|| format!("creating {}", tf.display()))?;
    log.write_stay_csv(BufWriter::new(file), subject)?;
    info!(path = %tf.display(), "stay analysis written");
    Ok(())
}

fn print_stay_table(log: &TrialLog) {
    let table = log.stay_table();
    println!("Stay probability      common    rare");
    for (label, rewarded) in [("after reward", true), ("after no reward", false)] {
        let fmt = |kind: TransitionKind| match table.cell(rewarded, kind).probability() {
            Some(p) => format!("{p:>8.3}"),
            None => format!("{:>8}", "-"),
        };
        println!(
            "  {label:<18}{}{}",
            fmt(TransitionKind::Common),
            fmt(TransitionKind::Rare)
        );
    }
}

#[cfg(feature = "terminal")]
fn run_terminal(args: &BlockArgs) -> Result<()> {
    use twostep::clock::SystemClock;
    use twostep::terminal::{TerminalInput, TextPresenter};

    check_subject(&args.subject)?;
    let paths = AppPaths::new()?;
    let cfg = load_config(args, &paths)?;

    let mut clock = SystemClock::new();
    let mut input = TerminalInput::new(clock)?;
    let mut presenter = TextPresenter::new();
    println!("Respond with f (left) or j (right), then Enter.");
    run_block(args, cfg, &mut input, &mut presenter, &mut clock, &paths)
}

#[cfg(not(feature = "terminal"))]
fn run_terminal(_args: &BlockArgs) -> Result<()> {
    bail!("keyboard input needs the `terminal` feature")
}

fn run_simulated(args: &BlockArgs, kind: AgentKind, weight: f64, agent_seed: u64) -> Result<()> {
    check_subject(&args.subject)?;
    if !(0.0..=1.0).contains(&weight) {
        bail!("--weight must lie in [0, 1], got {weight}");
    }
    let paths = AppPaths::new()?;
    let cfg = load_config(args, &paths)?;

    let rng = ChaCha20Rng::seed_from_u64(agent_seed);
    let timing = ResponseTiming::default();
    let mut input: Box<dyn ChoiceSource> = match kind {
        AgentKind::Random => Box::new(RandomAgent::new(rng, timing)),
        AgentKind::ModelFree => Box::new(LearningAgent::model_free(rng, timing)),
        AgentKind::ModelBased => Box::new(LearningAgent::model_based(rng, timing)),
        AgentKind::Hybrid => {
            let params = LearnerParams {
                w: weight,
                p_common: cfg.ptrans,
                ..LearnerParams::default()
            };
            Box::new(LearningAgent::new(rng, params, timing))
        }
    };
    info!(agent = ?kind, "simulating participant");

    let mut presenter = NullPresenter;
    let mut clock = VirtualClock::new();
    run_block(args, cfg, input.as_mut(), &mut presenter, &mut clock, &paths)
}

fn init_config(force: bool) -> Result<()> {
    let paths = AppPaths::new()?;
    let path = paths.config_file();
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let text = serde_json::to_string_pretty(&TaskConfig::default())?;
    std::fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}
