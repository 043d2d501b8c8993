//! trialtool - Operator CLI for trial matrices: convert, merge, split,
//! sort, and summarize score files.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use sveval_trials::{TrialKey, TrialNdx, TrialScores};

/// Trial matrix toolbox for speaker verification evaluation.
///
/// File formats follow the extension convention of the containers: `.txt`
/// selects the sparse text format, anything else the binary container, on
/// both input and output paths.
#[derive(Parser)]
#[command(name = "trialtool")]
#[command(about = "Trial matrix toolbox for speaker verification evaluation")]
#[command(version)]
struct Cli {
    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Which trial container type a file holds.
#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Ndx,
    Key,
    Scores,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a container and re-save it (e.g. binary <-> text)
    Convert {
        /// Container type of the input file
        #[arg(long, value_enum)]
        kind: Kind,
        input: PathBuf,
        output: PathBuf,
    },
    /// Merge partial containers into one
    Merge {
        /// Container type of the input files
        #[arg(long, value_enum)]
        kind: Kind,
        /// Output file
        #[arg(short = 'o', long)]
        output: PathBuf,
        /// Input files
        inputs: Vec<PathBuf>,
    },
    /// Extract one deterministic block of the grid
    Split {
        /// Container type of the input file
        #[arg(long, value_enum)]
        kind: Kind,
        /// Row block as PART/PARTS, e.g. 2/4
        #[arg(long, default_value = "1/1")]
        rows: String,
        /// Column block as PART/PARTS
        #[arg(long, default_value = "1/1")]
        cols: String,
        input: PathBuf,
        output: PathBuf,
    },
    /// Sort both axes into lexical order
    Sort {
        /// Container type of the input file
        #[arg(long, value_enum)]
        kind: Kind,
        input: PathBuf,
        output: PathBuf,
    },
    /// Align scores against a key and report target/non-target statistics
    TarNon {
        /// Trial key file
        #[arg(long)]
        key: PathBuf,
        /// Score file
        #[arg(long)]
        scores: PathBuf,
        /// Also write the report as JSON to this file
        #[arg(long)]
        json: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    match &cli.command {
        Commands::Convert {
            kind,
            input,
            output,
        } => convert(*kind, input, output),
        Commands::Merge {
            kind,
            output,
            inputs,
        } => merge(*kind, inputs, output),
        Commands::Split {
            kind,
            rows,
            cols,
            input,
            output,
        } => split(*kind, rows, cols, input, output),
        Commands::Sort {
            kind,
            input,
            output,
        } => sort(*kind, input, output),
        Commands::TarNon { key, scores, json } => tar_non(key, scores, json.as_deref()),
    }
}

fn convert(kind: Kind, input: &Path, output: &Path) -> Result<()> {
    match kind {
        Kind::Ndx => TrialNdx::load(input)?.save(output)?,
        Kind::Key => TrialKey::load(input)?.save(output)?,
        Kind::Scores => TrialScores::load(input)?.save(output)?,
    }
    Ok(())
}

fn merge(kind: Kind, inputs: &[PathBuf], output: &Path) -> Result<()> {
    ensure!(!inputs.is_empty(), "merge needs at least one input file");
    match kind {
        Kind::Ndx => {
            let parts: Vec<TrialNdx> = load_all(inputs, |p| TrialNdx::load(p))?;
            TrialNdx::merge(&parts).save(output)?;
        }
        Kind::Key => {
            let parts: Vec<TrialKey> = load_all(inputs, |p| TrialKey::load(p))?;
            TrialKey::merge(&parts)?.save(output)?;
        }
        Kind::Scores => {
            let parts: Vec<TrialScores> = load_all(inputs, |p| TrialScores::load(p))?;
            TrialScores::merge(&parts)?.save(output)?;
        }
    }
    Ok(())
}

fn load_all<T, E, F>(inputs: &[PathBuf], load: F) -> Result<Vec<T>>
where
    E: std::error::Error + Send + Sync + 'static,
    F: Fn(&Path) -> Result<T, E>,
{
    inputs
        .iter()
        .map(|p| load(p).with_context(|| format!("load {}", p.display())))
        .collect()
}

fn split(kind: Kind, rows: &str, cols: &str, input: &Path, output: &Path) -> Result<()> {
    let (row_part, row_parts) = parse_block(rows)?;
    let (col_part, col_parts) = parse_block(cols)?;
    match kind {
        Kind::Ndx => TrialNdx::load(input)?
            .split(row_part, row_parts, col_part, col_parts)
            .save(output)?,
        Kind::Key => TrialKey::load(input)?
            .split(row_part, row_parts, col_part, col_parts)
            .save(output)?,
        Kind::Scores => TrialScores::load(input)?
            .split(row_part, row_parts, col_part, col_parts)
            .save(output)?,
    }
    Ok(())
}

/// Parses a block spec like `2/4` into (part, num_parts).
fn parse_block(spec: &str) -> Result<(usize, usize)> {
    let (part, parts) = spec
        .split_once('/')
        .context("block must be PART/PARTS, e.g. 2/4")?;
    let part: usize = part.trim().parse().context("bad block part")?;
    let parts: usize = parts.trim().parse().context("bad block count")?;
    ensure!(
        part >= 1 && part <= parts,
        "block part must be in 1..=PARTS"
    );
    Ok((part, parts))
}

fn sort(kind: Kind, input: &Path, output: &Path) -> Result<()> {
    match kind {
        Kind::Ndx => {
            let mut x = TrialNdx::load(input)?;
            x.sort();
            x.save(output)?;
        }
        Kind::Key => {
            let mut x = TrialKey::load(input)?;
            x.sort();
            x.save(output)?;
        }
        Kind::Scores => {
            let mut x = TrialScores::load(input)?;
            x.sort();
            x.save(output)?;
        }
    }
    Ok(())
}

/// Summary statistics over one flat score sequence.
#[derive(Serialize)]
struct ScoreStats {
    count: usize,
    mean: Option<f64>,
    min: Option<f64>,
    max: Option<f64>,
}

impl ScoreStats {
    fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self {
                count: 0,
                mean: None,
                min: None,
                max: None,
            };
        }
        let sum: f64 = values.iter().sum();
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Self {
            count: values.len(),
            mean: Some(sum / values.len() as f64),
            min: Some(min),
            max: Some(max),
        }
    }
}

#[derive(Serialize)]
struct TarNonReport {
    tar: ScoreStats,
    non: ScoreStats,
}

fn tar_non(key_path: &Path, scores_path: &Path, json: Option<&Path>) -> Result<()> {
    let key = TrialKey::load(key_path).with_context(|| format!("load {}", key_path.display()))?;
    let scr = TrialScores::load(scores_path)
        .with_context(|| format!("load {}", scores_path.display()))?;
    let (tar, non) = scr.get_tar_non(&key)?;

    let report = TarNonReport {
        tar: ScoreStats::from_values(&tar),
        non: ScoreStats::from_values(&non),
    };
    if let Some(path) = json {
        std::fs::write(path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("write {}", path.display()))?;
    }

    println!("target trials:     {}", report.tar.count);
    println!("non-target trials: {}", report.non.count);
    if let (Some(tm), Some(nm)) = (report.tar.mean, report.non.mean) {
        println!("mean target:       {tm:.4}");
        println!("mean non-target:   {nm:.4}");
        println!("mean separation:   {:.4}", tm - nm);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_block_accepts_part_of_parts() {
        assert_eq!(parse_block("2/4").unwrap(), (2, 4));
        assert_eq!(parse_block("1/1").unwrap(), (1, 1));
        assert!(parse_block("0/4").is_err());
        assert!(parse_block("5/4").is_err());
        assert!(parse_block("nope").is_err());
    }

    #[test]
    fn score_stats_handle_empty_input() {
        let stats = ScoreStats::from_values(&[]);
        assert_eq!(stats.count, 0);
        assert!(stats.mean.is_none());

        let stats = ScoreStats::from_values(&[1.0, 3.0]);
        assert_eq!(stats.count, 2);
        assert_eq!(stats.mean, Some(2.0));
        assert_eq!(stats.min, Some(1.0));
        assert_eq!(stats.max, Some(3.0));
    }
}
