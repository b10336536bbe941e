//! trendlab command line
//!
//! `list` prints the classifier registry, `evaluate` runs one classifier (or a
//! recurrent regressor) on a CSV price file, `run` executes an experiment file and `synthetic` writes a
//! sinusoid OHLCV table for quick trials.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use std::time::Instant;

use crate::analysis::AnalysisReport;
use crate::classifier::{list, ClassifierKind, Params};
use crate::data::synthetic::{create_dataframe, SinusoidConfig};
use crate::experiment::{run_experiment, CrossValidationConfig, DataSource, ExperimentConfig, ExperimentOutcome, Task};
use crate::splitter::DEFAULT_SEQ_LEN;

fn dim(s: &str) -> ColoredString {
    s.truecolor(100, 100, 100)
}

fn accent(s: &str) -> ColoredString {
    s.truecolor(120, 170, 255)
}

fn muted(s: &str) -> ColoredString {
    s.truecolor(140, 140, 140)
}

fn ok(s: &str) -> ColoredString {
    s.truecolor(100, 210, 120)
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn comma_list(value: &Option<String>) -> Vec<String> {
    value
        .as_deref()
        .map(|s| s.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect())
        .unwrap_or_default()
}

#[derive(Parser)]
#[command(name = "trendlab")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Trend classification experiments on financial time series")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the registered classifiers
    List,

    /// Evaluate one classifier on a CSV price file
    Evaluate {
        /// OHLCV CSV file
        #[arg(short, long)]
        data: PathBuf,

        /// Registry name, e.g. "decision tree" or "lstm1"
        #[arg(short, long, default_value = "decision tree")]
        classifier: String,

        /// Classifier params as a JSON object
        #[arg(short, long)]
        params: Option<String>,

        /// Target column
        #[arg(short, long, default_value = "target")]
        target: String,

        /// Comma-separated indicators to add (trend_1d, ema, sma, macd, bbands, rsi_30,
        /// cci_30, dx_30, simple_rtn, target, next_close, next_pct_change)
        #[arg(short, long)]
        indicators: Option<String>,

        /// Comma-separated columns to drop
        #[arg(short, long)]
        remove: Option<String>,

        /// Training fraction of the hold-out split
        #[arg(long, default_value = "0.7")]
        train_fraction: f64,

        /// Cross-validate over this many folds instead of a hold-out split
        #[arg(long)]
        cv: Option<usize>,

        /// Look-back of the recurrent families
        #[arg(long, default_value_t = DEFAULT_SEQ_LEN)]
        seq_len: usize,

        /// Regress the continuous target with the recurrent architecture named
        /// by --classifier
        #[arg(long)]
        regression: bool,

        /// Directory for result files
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run an experiment file (JSON)
    Run {
        /// Experiment file
        config: PathBuf,
    },

    /// Write a synthetic sinusoid OHLCV table
    Synthetic {
        /// Output CSV file
        #[arg(short, long)]
        output: PathBuf,

        #[arg(long, default_value = "500")]
        length: usize,

        #[arg(long, default_value = "1.0")]
        amplitude: f64,

        /// Cycles per sample
        #[arg(long, default_value = "0.02")]
        frequency: f64,

        #[arg(long, default_value = "10.0")]
        height: f64,

        /// Relative price noise
        #[arg(long, default_value = "0.01")]
        noise: f64,

        #[arg(long)]
        seed: Option<u64>,
    },
}

pub fn cmd_list() -> anyhow::Result<()> {
    section("Classifiers");
    for name in list() {
        let input = match ClassifierKind::from_name(name) {
            Some(kind) if kind.is_recurrent() => "windows",
            _ => "rows",
        };
        println!("  {:<24} {}", name.white(), muted(input));
    }
    println!();
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn cmd_evaluate(
    data: PathBuf,
    classifier: String,
    params: Option<String>,
    target: String,
    indicators: Option<String>,
    remove: Option<String>,
    train_fraction: f64,
    cv: Option<usize>,
    seq_len: usize,
    regression: bool,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let params = match params {
        Some(text) => Params::from_json(&text)?,
        None => Params::new(),
    };
    let cross_validation = cv.map(|nb_splits| CrossValidationConfig {
        nb_splits,
        ..CrossValidationConfig::default()
    });
    let task = if regression { Task::Regression } else { Task::Classification };
    let config = ExperimentConfig::new(DataSource::Csv { path: data })
        .with_task(task)
        .with_indicators(comma_list(&indicators))
        .with_removed_features(comma_list(&remove))
        .with_target(target)
        .with_classifier(classifier, params)
        .with_train_fraction(train_fraction)
        .with_cross_validation(cross_validation)
        .with_seq_len(seq_len)
        .with_output_dir(output);
    execute(&config)
}

pub fn cmd_run(path: PathBuf) -> anyhow::Result<()> {
    let config = ExperimentConfig::from_file(&path)?;
    execute(&config)
}

pub fn cmd_synthetic(
    output: PathBuf,
    sinusoid: SinusoidConfig,
    noise: f64,
    seed: Option<u64>,
) -> anyhow::Result<()> {
    section("Synthetic");
    step_run(&format!("Writing {}", output.display()));
    let table = create_dataframe(&sinusoid.generate(), noise, seed)?;
    table.write_csv(&output)?;
    step_done(&format!("{} rows × {} cols", table.nrows(), table.ncols()));
    println!();
    Ok(())
}

fn execute(config: &ExperimentConfig) -> anyhow::Result<()> {
    section("Evaluate");
    println!("  {:<16} {}", muted("Classifier"), config.classifier.cyan());
    println!("  {:<16} {}", muted("Target"), config.target.white());
    println!();

    step_run("Running");
    let start = Instant::now();
    let outcome = run_experiment(config)?;
    step_done(&format!("{:.2?}", start.elapsed()));

    match &outcome {
        ExperimentOutcome::Holdout {
            analysis,
            train_rows,
            test_rows,
            history,
        } => {
            println!();
            println!(
                "  {:<16} {}",
                muted("Rows"),
                format!("{} train / {} test", train_rows, test_rows).white()
            );
            if let Some(loss) = history.as_ref().and_then(|h| h.last_loss()) {
                println!("  {:<16} {}", muted("Final loss"), format!("{:.4}", loss).white());
            }
            print_report(analysis);
        }
        ExperimentOutcome::CrossValidation(report) => {
            println!();
            println!("  {:<8} {:>10} {:>10} {:>10} {:>10}", muted("Fold"), muted("Accuracy"), muted("Precision"), muted("Recall"), muted("F1"));
            println!("  {}", dim(&"─".repeat(52)));
            for fold in report.folds() {
                let get = |name: &str| fold.analysis.get(name).unwrap_or(0.0);
                println!(
                    "  {:<8} {:>10.4} {:>10.4} {:>10.4} {:>10.4}",
                    fold.fold,
                    get("accuracy"),
                    get("precision"),
                    get("recall"),
                    get("f1_score")
                );
            }
            println!("  {}", dim(&"─".repeat(52)));
            println!(
                "  {:<16} {} {}",
                muted("Accuracy"),
                format!("{:.4}", report.average_accuracy()).white().bold(),
                dim(&format!("± {:.4}", report.std_accuracy()))
            );
        }
    }
    if let Some(dir) = &config.output_dir {
        println!("  {:<16} {}", muted("Results"), dir.display().to_string().white());
    }
    println!();
    Ok(())
}

fn print_report(report: &AnalysisReport) {
    println!();
    for (name, value) in report.iter() {
        println!("  {:<16} {}", muted(name), format!("{:.4}", value).white().bold());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_evaluate() {
        let cli = Cli::parse_from([
            "trendlab",
            "evaluate",
            "--data",
            "prices.csv",
            "--classifier",
            "svc",
            "--indicators",
            "trend_1d, target",
            "--cv",
            "5",
        ]);
        match cli.command {
            Commands::Evaluate {
                classifier,
                indicators,
                cv,
                seq_len,
                regression,
                ..
            } => {
                assert_eq!(classifier, "svc");
                assert_eq!(comma_list(&indicators), vec!["trend_1d", "target"]);
                assert_eq!(cv, Some(5));
                assert_eq!(seq_len, DEFAULT_SEQ_LEN);
                assert!(!regression);
            }
            _ => panic!("expected evaluate"),
        }
    }

    #[test]
    fn test_parse_regression_flag() {
        let cli = Cli::parse_from([
            "trendlab",
            "evaluate",
            "--data",
            "prices.csv",
            "--classifier",
            "lstmhao2020",
            "--target",
            "next_close",
            "--regression",
        ]);
        match cli.command {
            Commands::Evaluate { regression, target, .. } => {
                assert!(regression);
                assert_eq!(target, "next_close");
            }
            _ => panic!("expected evaluate"),
        }
    }

    #[test]
    fn test_synthetic_writes_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prices.csv");
        let sinusoid = SinusoidConfig::default().with_length(30).with_height(10.0);
        cmd_synthetic(path.clone(), sinusoid, 0.0, None).unwrap();

        let table = crate::data::FeatureTable::read_csv(&path).unwrap();
        assert_eq!(table.nrows(), 30);
        assert!(table.has_column("close"));
    }
}
