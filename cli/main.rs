#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process;

use rankin::config::AnalysisConfig;
use rankin::frontier::{FrontierAnalysis, FrontierPoint, analyze};
use rankin::pipeline::{Evaluator, Scenario, TrialSet};

#[derive(Parser)]
#[command(
    name = "rankin",
    about = "Cost-effectiveness of prehospital stroke triage strategies",
    long_about = "Simulates a cohort of suspected-stroke emergency calls through a lifetime \
                 Markov model of modified Rankin Scale states and picks the cost-effective \
                 triage strategy on the efficiency frontier."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate every strategy of a single patient scenario
    #[command(about = "Evaluate the strategies of one scenario")]
    Evaluate {
        /// Scenario TOML with a [patient] table and [[strategies]] entries
        #[arg(value_name = "SCENARIO")]
        scenario: PathBuf,

        /// Analysis settings TOML (threshold, horizon, discounting, costs)
        #[arg(long)]
        config: Option<PathBuf>,

        /// `age,male,female` CSV of annual mortality replacing the built-in life table
        #[arg(long, value_name = "CSV")]
        life_table: Option<PathBuf>,
    },

    /// Build the efficiency frontier from precomputed effects and costs
    #[command(about = "Run the frontier on label,effect,cost rows")]
    Frontier {
        /// Headerless CSV of label,effect,cost rows
        #[arg(value_name = "POINTS")]
        points: PathBuf,

        /// Willingness to pay per unit of effect
        #[arg(long, default_value = "100000")]
        threshold: f64,
    },

    /// Evaluate many sampled trials in parallel and summarise the selections
    #[command(about = "Run a batch of trials")]
    Batch {
        /// TOML file of [[trials]] entries
        #[arg(value_name = "TRIALS")]
        trials: PathBuf,

        /// Analysis settings TOML
        #[arg(long)]
        config: Option<PathBuf>,

        /// `age,male,female` CSV of annual mortality replacing the built-in life table
        #[arg(long, value_name = "CSV")]
        life_table: Option<PathBuf>,
    },
}

fn main() {
    env_logger::init();
    let Cli { command } = Cli::parse();

    let result = match command {
        Some(Commands::Evaluate {
            scenario,
            config,
            life_table,
        }) => run_evaluate(&scenario, config.as_deref(), life_table),
        Some(Commands::Frontier { points, threshold }) => run_frontier(&points, threshold),
        Some(Commands::Batch {
            trials,
            config,
            life_table,
        }) => run_batch(&trials, config.as_deref(), life_table),
        None => Cli::command()
            .print_help()
            .map(|()| println!())
            .map_err(Into::into),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn load_config(
    path: Option<&Path>,
    life_table: Option<PathBuf>,
) -> Result<AnalysisConfig, Box<dyn std::error::Error>> {
    let mut config = match path {
        Some(path) => AnalysisConfig::load(path)?,
        None => AnalysisConfig::default(),
    };
    if life_table.is_some() {
        config.life_table = life_table;
    }
    Ok(config)
}

fn print_frontier(analysis: &FrontierAnalysis) {
    println!("\nEfficiency frontier:");
    println!("  {:<24} {:>12} {:>14} {:>14}", "strategy", "QALYs", "cost", "ICER");
    for entry in &analysis.frontier {
        println!(
            "  {:<24} {:>12.4} {:>14.2} {:>14}",
            entry.point.label,
            entry.point.effect,
            entry.point.cost,
            entry.icer.to_string()
        );
    }
    for (point, dominance) in &analysis.dominated {
        println!("  removed '{}' ({dominance:?})", point.label);
    }
    println!(
        "\nSelected strategy: {} (ICER {})",
        analysis.selected, analysis.selected_icer
    );
}

fn run_evaluate(
    scenario_path: &Path,
    config_path: Option<&Path>,
    life_table: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path, life_table)?;
    let evaluator = Evaluator::from_config(&config)?;
    println!("Loading scenario from: {}", scenario_path.display());
    let scenario = Scenario::load(scenario_path)?;

    let result = evaluator.evaluate_scenario(&scenario)?;
    println!("  {:<24} {:>12} {:>14}", "strategy", "QALYs", "cost");
    for evaluation in &result.evaluations {
        println!(
            "  {:<24} {:>12.4} {:>14.2}",
            evaluation.label, evaluation.qalys, evaluation.cost
        );
    }
    for failure in &result.failures {
        println!("  {:<24} excluded: {}", failure.label, failure.reason);
    }
    print_frontier(&result.frontier);
    println!("Maximum benefit: {}", result.max_benefit);
    Ok(())
}

fn read_points(path: &Path) -> Result<Vec<FrontierPoint>, Box<dyn std::error::Error>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_path(path)?;
    let mut points = Vec::new();
    for row in reader.deserialize() {
        let (label, effect, cost): (String, f64, f64) = row?;
        points.push(FrontierPoint::new(label, effect, cost));
    }
    Ok(points)
}

fn run_frontier(path: &Path, threshold: f64) -> Result<(), Box<dyn std::error::Error>> {
    let points = read_points(path)?;
    println!("Read {} strategies from {}", points.len(), path.display());
    let analysis = analyze(points, threshold)?;
    print_frontier(&analysis);
    Ok(())
}

fn create_progress_bar(len: u64) -> Result<ProgressBar, Box<dyn std::error::Error>> {
    let draw_target = if std::io::stderr().is_terminal() {
        ProgressDrawTarget::stderr_with_hz(20)
    } else {
        ProgressDrawTarget::hidden()
    };
    let pb = ProgressBar::with_draw_target(Some(len), draw_target);
    pb.set_style(
        ProgressStyle::with_template(
            "\n> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )?
        .progress_chars("█▉▊▋▌▍▎▏  "),
    );
    pb.set_message("trials");
    Ok(pb)
}

fn run_batch(
    trials_path: &Path,
    config_path: Option<&Path>,
    life_table: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path, life_table)?;
    let evaluator = Evaluator::from_config(&config)?;
    let set = TrialSet::load(trials_path)?;

    let pb = create_progress_bar(set.trials.len() as u64)?;
    let summary = evaluator.run_batch(&set.trials, Some(&pb));
    pb.finish_and_clear();

    println!(
        "Completed {} of {} trials (threshold ${:.0}/QALY)",
        summary.completed(),
        summary.trials,
        evaluator.threshold()
    );
    for (label, share) in summary.ranked_shares() {
        let best = summary.max_benefit.get(&label).copied().unwrap_or(0);
        println!(
            "  {label:<24} selected in {:>6.2}% of trials, maximum benefit in {best}",
            share * 100.0
        );
    }
    if !summary.failed_trials.is_empty() {
        println!("Failed trials: {}", summary.failed_trials.join(", "));
    }
    Ok(())
}
