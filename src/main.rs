use std::env;
use std::fs;
use std::process::ExitCode;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use sokosearch::{solve, SearchStatus, SolverConfig};

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: sokosearch <level.xsb> [config.toml]");
        return Ok(ExitCode::from(2));
    }

    let level_path = &args[1];
    let level = fs::read_to_string(level_path).with_context(|| format!("failed to read level {level_path}"))?;

    let config = match args.get(2) {
        Some(path) => {
            let text = fs::read_to_string(path).with_context(|| format!("failed to read config {path}"))?;
            SolverConfig::from_toml_str(&text).with_context(|| format!("invalid config {path}"))?
        }
        None => SolverConfig::default(),
    };

    let outcome = solve(&level, config)?;

    println!("status: {}", outcome.status);
    if let Some(solution) = &outcome.solution {
        println!("pushes: {}", solution.pushes);
        println!("moves: {}", solution.moves());
        println!("{}", solution.lurd());
    }
    let stats = &outcome.stats;
    println!(
        "expanded: {}  generated: {}  duplicates: {}  patterns: {}  time: {:.3}s",
        stats.expanded,
        stats.generated,
        stats.duplicates,
        outcome.patterns,
        stats.elapsed.as_secs_f64()
    );
    println!("deadlocks: {:?}", outcome.deadlocks);

    Ok(match outcome.status {
        SearchStatus::Solved if outcome.solution.is_some() => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    })
}
