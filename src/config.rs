use anyhow::{anyhow, Result};
use clap::Parser;

use crate::solver::PricingStrategy;

#[derive(Parser, Debug)]
#[command(
    name = "Airspace MAPF",
    about = "Multi-agent path planner for a grid urban airspace: CBS with auction-based congestion mitigation.",
    version = "1.0"
)]
pub struct Cli {
    #[arg(long, help = "Path to the YAML scenario file")]
    pub scenario_path: String,

    #[arg(long, help = "Path to a JSON file of initial constraints")]
    pub constraints_path: Option<String>,

    #[arg(long, help = "Append run statistics as CSV to this file")]
    pub output_path: Option<String>,

    #[arg(long, help = "Write the solution or auction outcome as JSON to this file")]
    pub solution_path: Option<String>,

    #[arg(long, help = "Solver to use: cbs or auction", default_value = "cbs")]
    pub solver: String,

    #[arg(long, help = "Maximum timestep for the low-level search")]
    pub t_max: Option<usize>,

    #[arg(
        long,
        help = "Steps an agent keeps occupying its goal after landing",
        default_value_t = crate::conflict::DEFAULT_LANDING_HOLD
    )]
    pub landing_hold: usize,

    #[arg(long, help = "Maximum auction rounds", default_value_t = 5)]
    pub max_rounds: usize,

    #[arg(long, help = "Starting price per contested cell", default_value_t = 10.0)]
    pub base_price: f64,

    #[arg(long, help = "Pricing strategy: linear or log", default_value = "linear")]
    pub strategy: String,

    #[arg(
        long,
        help = "Timesteps covered by auctioned cell closures",
        default_value_t = 50
    )]
    pub horizon: usize,

    #[arg(long, help = "Seed for the bid simulation", default_value_t = 0)]
    pub seed: u64,

    #[arg(long, help = "Timeout seconds", default_value_t = 60)]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub scenario_path: String,
    pub constraints_path: Option<String>,
    pub output_path: Option<String>,
    pub solution_path: Option<String>,
    pub solver: String,
    pub t_max: Option<usize>,
    pub landing_hold: usize,
    pub max_rounds: usize,
    pub base_price: f64,
    pub strategy: String,
    pub horizon: usize,
    pub seed: u64,
    pub timeout_secs: u64,
}

impl Config {
    pub fn new(cli: &Cli) -> Self {
        Self {
            scenario_path: cli.scenario_path.clone(),
            constraints_path: cli.constraints_path.clone(),
            output_path: cli.output_path.clone(),
            solution_path: cli.solution_path.clone(),
            solver: cli.solver.clone(),
            t_max: cli.t_max,
            landing_hold: cli.landing_hold,
            max_rounds: cli.max_rounds,
            base_price: cli.base_price,
            strategy: cli.strategy.clone(),
            horizon: cli.horizon,
            seed: cli.seed,
            timeout_secs: cli.timeout_secs,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self.solver.as_str() {
            "cbs" | "auction" => {}
            other => {
                return Err(anyhow!(
                    "unknown solver '{other}', expected 'cbs' or 'auction'"
                ))
            }
        }

        PricingStrategy::parse(&self.strategy)?;

        if self.t_max == Some(0) {
            return Err(anyhow!("step bound must be positive"));
        }
        if self.max_rounds == 0 {
            return Err(anyhow!("auction needs at least one round"));
        }
        if self.base_price <= 0.0 {
            return Err(anyhow!(
                "base price must be positive, got {}",
                self.base_price
            ));
        }
        if self.horizon == 0 {
            return Err(anyhow!("auction horizon must be positive"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            scenario_path: "scenario.yaml".to_string(),
            constraints_path: None,
            output_path: None,
            solution_path: None,
            solver: "cbs".to_string(),
            t_max: None,
            landing_hold: 2,
            max_rounds: 5,
            base_price: 10.0,
            strategy: "linear".to_string(),
            horizon: 50,
            seed: 0,
            timeout_secs: 60,
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_unknown_solver_rejected() {
        let mut config = base_config();
        config.solver = "ecbs".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_auction_knobs_rejected() {
        let mut config = base_config();
        config.strategy = "quadratic".to_string();
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.base_price = 0.0;
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.t_max = Some(0);
        assert!(config.validate().is_err());
    }
}
