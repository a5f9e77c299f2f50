//! Summarize exported two-step blocks.
//!
//! Examples:
//!   twostep-summary twostep-raw-s01-block-1.csv
//!   twostep-summary twostep-raw-s01-block-*.csv --json
//!
//! Reads raw trial CSVs and prints completion counts, reward rate, mean
//! reaction times and the stay-probability table for each file.

use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use twostep::transition::TransitionKind;
use twostep::trial_log::{read_csv, TrialLog};

#[derive(Parser)]
#[command(name = "twostep-summary")]
#[command(about = "Summarize raw two-step trial exports")]
struct Cli {
    /// Raw trial CSV files
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Print one JSON object per file instead of a table
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct BlockSummary {
    file: String,
    subject_id: String,
    block: u32,
    attempts: usize,
    completed: usize,
    aborted: usize,
    reward_rate: Option<f64>,
    mean_rt1: Option<f64>,
    mean_rt2: Option<f64>,
    /// `[after reward, after no reward] x [common, rare]`
    stay: [[Option<f64>; 2]; 2],
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

fn summarize(file: &PathBuf) -> Result<BlockSummary> {
    let reader = File::open(file).with_context(|| format!("opening {}", file.display()))?;
    let rows = read_csv(reader).with_context(|| format!("reading {}", file.display()))?;
    let log = TrialLog::from_rows(&rows).with_context(|| format!("parsing {}", file.display()))?;

    let (subject_id, block) = rows
        .first()
        .map(|r| (r.subject_id.clone(), r.block))
        .unwrap_or_default();

    let completed: Vec<_> = log.completed().collect();
    let rewarded = completed.iter().filter(|r| r.reward == Some(1)).count();
    let table = log.stay_table();
    let stay = [true, false].map(|rewarded| {
        [TransitionKind::Common, TransitionKind::Rare]
            .map(|kind| table.cell(rewarded, kind).probability())
    });

    Ok(BlockSummary {
        file: file.display().to_string(),
        subject_id,
        block,
        attempts: log.len(),
        completed: completed.len(),
        aborted: log.len() - completed.len(),
        reward_rate: (!completed.is_empty()).then(|| rewarded as f64 / completed.len() as f64),
        mean_rt1: mean(completed.iter().filter_map(|r| r.stage1_rt)),
        mean_rt2: mean(completed.iter().filter_map(|r| r.stage2_rt)),
        stay,
    })
}

fn show(v: Option<f64>) -> String {
    v.map(|x| format!("{x:.3}")).unwrap_or_else(|| "-".to_string())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    for file in &cli.files {
        let s = summarize(file)?;
        if cli.json {
            println!("{}", serde_json::to_string(&s)?);
            continue;
        }

        println!("{} (subject {}, block {})", s.file, s.subject_id, s.block);
        println!(
            "  trials: {} completed, {} aborted, reward rate {}",
            s.completed,
            s.aborted,
            show(s.reward_rate)
        );
        println!("  mean RT: step 1 {}s, step 2 {}s", show(s.mean_rt1), show(s.mean_rt2));
        println!("  stay after reward:    common {}  rare {}", show(s.stay[0][0]), show(s.stay[0][1]));
        println!("  stay after no reward: common {}  rare {}", show(s.stay[1][0]), show(s.stay[1][1]));
    }
    Ok(())
}
