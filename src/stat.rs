use std::fs::OpenOptions;
use std::io::Write;

use tracing::{error, info};

use crate::config::Config;

#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub costs: usize,
    pub time_ms: usize,
    pub low_level_expanded: usize,
    pub high_level_expanded: usize,
    pub auction_rounds: usize,
}

impl Stats {
    pub(crate) fn merge(&mut self, other: &Stats) {
        self.costs = other.costs;
        self.low_level_expanded += other.low_level_expanded;
        self.high_level_expanded += other.high_level_expanded;
    }

    pub fn report(&self, config: &Config) {
        info!(
            costs = self.costs,
            time_ms = self.time_ms,
            high_level_expanded = self.high_level_expanded,
            low_level_expanded = self.low_level_expanded,
            auction_rounds = self.auction_rounds,
            "run finished"
        );

        let Some(output_path) = &config.output_path else {
            return;
        };
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(output_path);
        let mut file = match file {
            Ok(file) => file,
            Err(e) => {
                error!("Failed to open '{}': {}", output_path, e);
                return;
            }
        };

        let line = format!(
            "{},{},{},{},{},{},{},{},{}\n",
            config.scenario_path,
            config.solver,
            config.seed,
            self.costs,
            self.time_ms,
            self.high_level_expanded,
            self.low_level_expanded,
            self.auction_rounds,
            config.landing_hold,
        );
        if let Err(e) = file.write_all(line.as_bytes()) {
            error!("Failed to write to file '{}': {}", output_path, e);
        }
    }
}
