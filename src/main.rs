mod algorithm;
mod common;
mod config;
mod conflict;
mod grid;
mod scenario;
mod solver;
mod stat;

use std::fs::File;
use std::io::BufWriter;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::{Cli, Config};
use scenario::Scenario;
use solver::{Auction, AuctionOptions, AuctionOutcome, Cbs, PricingStrategy};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::new(&cli);
    config.validate()?;

    // The core is synchronous; the runtime only enforces the external
    // deadline around it.
    let deadline = Duration::from_secs(config.timeout_secs);
    let solve = tokio::task::spawn_blocking(move || run_solver(config));
    match tokio::time::timeout(deadline, solve).await {
        Ok(result) => result?,
        Err(_) => Err(anyhow!("solver exceeded {}s deadline", cli.timeout_secs)),
    }
}

fn run_solver(config: Config) -> Result<()> {
    let scenario = Scenario::load_from_yaml(&config.scenario_path)?;
    let grid = scenario.build_grid()?;
    let agents = scenario.agents(&grid)?;
    let t_max = config
        .t_max
        .or(scenario.t_max)
        .unwrap_or_else(|| grid.default_time_limit());

    let extra_constraints = match &config.constraints_path {
        Some(path) => scenario::load_constraints(path, t_max)?,
        None => Vec::new(),
    };

    let start_time = Instant::now();
    match config.solver.as_str() {
        "cbs" => {
            let mut cbs = Cbs::new(&agents, &grid, config.landing_hold, t_max);
            let solution = cbs.solve(&extra_constraints);
            let mut stats = cbs.stats().clone();
            stats.time_ms = start_time.elapsed().as_millis() as usize;
            stats.report(&config);

            match solution {
                Some(solution) => {
                    info!(cost = solution.cost(), "conflict-free plan found");
                    write_json(&config.solution_path, &solution)?;
                }
                None => info!("infeasible: no conflict-free plan within the step bound"),
            }
        }
        "auction" => {
            if !extra_constraints.is_empty() {
                warn!("auction starts from the bare problem; initial constraints are ignored");
            }
            let options = AuctionOptions {
                max_rounds: config.max_rounds,
                base_price: config.base_price,
                strategy: PricingStrategy::parse(&config.strategy)?,
                horizon: config.horizon,
            };
            let rng = StdRng::seed_from_u64(config.seed);
            let mut auction = Auction::new(
                &agents,
                &grid,
                config.landing_hold,
                t_max,
                options,
                rng,
            );
            let outcome = auction.run();
            let mut stats = auction.stats().clone();
            stats.time_ms = start_time.elapsed().as_millis() as usize;
            stats.report(&config);

            match &outcome {
                AuctionOutcome::Solved { solution, rounds } => {
                    info!(
                        cost = solution.cost(),
                        rounds = rounds.len(),
                        "auction delivered a plan"
                    );
                }
                AuctionOutcome::NoCongestion { .. } => info!("no congestion to price"),
                AuctionOutcome::NoBidders { .. } => info!("auction closed with no bidders"),
                AuctionOutcome::ExceededMaxRounds { .. } => {
                    info!(max_rounds = config.max_rounds, "auction exceeded max rounds")
                }
                AuctionOutcome::AgentNoPath { agent } => {
                    info!(agent = %agent, "agent has no path at all")
                }
            }
            write_json(&config.solution_path, &outcome)?;
        }
        _ => unreachable!(),
    }

    Ok(())
}

fn write_json<T: Serialize>(path: &Option<String>, value: &T) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    let file = File::create(path).with_context(|| format!("cannot create '{path}'"))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)
        .with_context(|| format!("cannot write '{path}'"))?;
    info!(path = %path, "wrote result");
    Ok(())
}
