use std::path::PathBuf;

use clap::Parser;
use plan_solver::config::PlanConfig;
use plan_solver::render;
use plan_solver::solver::{SearchStats, SearchResult};
use plan_solver::types::Solution;
use serde::Serialize;
use tracing::Level;

#[derive(Parser)]
#[command(
    name = "plan_solver",
    about = "Apartment layout search on a floor plate grid"
)]
struct Cli {
    /// Configuration document (JSON)
    #[arg(long, short)]
    config: PathBuf,

    /// Number of distinct layouts to keep
    #[arg(long)]
    max_solutions: Option<usize>,

    /// Similarity at or above which a layout counts as a duplicate (0..=1)
    #[arg(long)]
    threshold: Option<f64>,

    /// Abandon the search after this many candidate attempts
    #[arg(long)]
    max_steps: Option<u64>,

    /// Abandon the search after this many milliseconds
    #[arg(long)]
    time_limit_ms: Option<u64>,

    /// Show ASCII layout of each solution
    #[arg(long)]
    layout: bool,

    /// Write solutions and statistics as JSON to this file
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Log search progress at debug level
    #[arg(long, short)]
    verbose: bool,
}

#[derive(Serialize)]
struct Report<'a> {
    solutions: &'a [Solution],
    stats: &'a SearchStats,
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", message);
    std::process::exit(1);
}

fn load_config(cli: &Cli) -> Result<PlanConfig, String> {
    let text = std::fs::read_to_string(&cli.config)
        .map_err(|e| format!("cannot read {}: {}", cli.config.display(), e))?;
    let mut config = PlanConfig::from_json(&text).map_err(|e| e.to_string())?;

    if let Some(n) = cli.max_solutions {
        config.limits.max_solutions = n;
    }
    if let Some(t) = cli.threshold {
        config.ranking.similarity_threshold = t;
    }
    if cli.max_steps.is_some() {
        config.limits.max_steps = cli.max_steps;
    }
    if cli.time_limit_ms.is_some() {
        config.limits.time_limit_ms = cli.time_limit_ms;
    }
    Ok(config)
}

fn print_result(result: &SearchResult, layout: bool) {
    let solutions = result.outcome.solutions();
    for (i, solution) in solutions.iter().enumerate() {
        println!(
            "Layout {} (score {:.3}, shape variance {:.3}, {} empty cell{}):",
            i + 1,
            solution.score,
            solution.shape_variance,
            solution.empty_cell_count(),
            if solution.empty_cell_count() == 1 { "" } else { "s" },
        );
        print!("{}", render::legend(solution));
        if layout {
            print!("{}", render::render_solution(solution));
        }
        println!();
    }

    let stats = &result.stats;
    println!(
        "Summary: {}, {} layout{} kept of {} found, {} steps in {} ms",
        result.outcome.status(),
        solutions.len(),
        if solutions.len() == 1 { "" } else { "s" },
        stats.raw_solutions,
        stats.steps,
        stats.elapsed_ms,
    );
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    let config = load_config(&cli).unwrap_or_else(|e| fail(e));
    let plan = config.resolve().unwrap_or_else(|e| fail(e));
    let solver = plan.solver().unwrap_or_else(|e| fail(e));
    let result = solver.solve();

    if let Some(path) = &cli.output {
        let report = Report {
            solutions: result.outcome.solutions(),
            stats: &result.stats,
        };
        let json = serde_json::to_string_pretty(&report).unwrap_or_else(|e| fail(e));
        std::fs::write(path, json)
            .unwrap_or_else(|e| fail(format!("cannot write {}: {}", path.display(), e)));
    }

    print_result(&result, cli.layout);
}
