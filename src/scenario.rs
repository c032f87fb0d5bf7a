use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use crate::common::{Agent, Cell, Constraint, ConstraintRecord};
use crate::grid::Grid;

#[derive(Debug, Deserialize)]
pub struct Endpoints {
    pub start: Cell,
    pub goal: Cell,
}

/// YAML planning scenario: grid dimensions, static obstacles, and the agent
/// catalog keyed by agent id.
#[derive(Debug, Deserialize)]
pub struct Scenario {
    pub width: usize,
    pub height: usize,
    #[serde(default)]
    pub obstacles: Vec<Cell>,
    pub agents: BTreeMap<String, Endpoints>,
    #[serde(default)]
    pub t_max: Option<usize>,
}

impl Scenario {
    pub fn load_from_yaml(path: &str) -> Result<Scenario> {
        let file = File::open(path).with_context(|| format!("cannot open scenario '{path}'"))?;
        let reader = BufReader::new(file);
        let scenario: Scenario =
            serde_yaml::from_reader(reader).with_context(|| format!("malformed scenario '{path}'"))?;
        info!(
            width = scenario.width,
            height = scenario.height,
            agents = scenario.agents.len(),
            obstacles = scenario.obstacles.len(),
            "loaded scenario"
        );
        Ok(scenario)
    }

    pub fn build_grid(&self) -> Result<Grid> {
        Grid::with_obstacles(self.width, self.height, &self.obstacles)
    }

    /// Agent catalog in id order, endpoints validated against the grid.
    pub fn agents(&self, grid: &Grid) -> Result<Vec<Agent>> {
        if self.agents.is_empty() {
            bail!("scenario defines no agents");
        }
        let mut agents = Vec::with_capacity(self.agents.len());
        for (id, endpoints) in &self.agents {
            grid.require_open(endpoints.start)
                .with_context(|| format!("agent '{id}' start"))?;
            grid.require_open(endpoints.goal)
                .with_context(|| format!("agent '{id}' goal"))?;
            agents.push(Agent {
                id: id.clone(),
                start: endpoints.start,
                goal: endpoints.goal,
            });
        }
        Ok(agents)
    }
}

/// JSON array of constraint records. Malformed records are dropped, matching
/// the planner's tolerance for loose upstream generators; a time beyond the
/// step bound is a caller error.
pub fn load_constraints(path: &str, t_max: usize) -> Result<Vec<Constraint>> {
    let file = File::open(path).with_context(|| format!("cannot open constraints '{path}'"))?;
    let records: Vec<ConstraintRecord> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("malformed constraints '{path}'"))?;

    let mut constraints = Vec::with_capacity(records.len());
    for record in &records {
        let Some(constraint) = record.parse() else {
            debug!(?record, "dropping malformed constraint record");
            continue;
        };
        if constraint.time() > t_max {
            bail!(
                "constraint time {} exceeds the step bound {t_max}",
                constraint.time()
            );
        }
        constraints.push(constraint);
    }
    info!(
        kept = constraints.len(),
        dropped = records.len() - constraints.len(),
        "loaded constraints"
    );
    Ok(constraints)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = "\
width: 4
height: 3
obstacles:
  - [1, 1]
agents:
  A1:
    start: [0, 0]
    goal: [3, 2]
  A2:
    start: [3, 0]
    goal: [0, 2]
";

    #[test]
    fn test_parse_scenario() {
        let scenario: Scenario = serde_yaml::from_str(SCENARIO).unwrap();
        let grid = scenario.build_grid().unwrap();
        assert!(!grid.is_open((1, 1)));
        let agents = scenario.agents(&grid).unwrap();
        assert_eq!(agents.len(), 2);
        assert_eq!(agents[0].id, "A1");
        assert_eq!(agents[0].start, (0, 0));
        assert_eq!(agents[1].goal, (0, 2));
        assert_eq!(scenario.t_max, None);
    }

    #[test]
    fn test_out_of_bounds_agent_rejected() {
        let text = "\
width: 2
height: 2
agents:
  A1:
    start: [0, 0]
    goal: [2, 0]
";
        let scenario: Scenario = serde_yaml::from_str(text).unwrap();
        let grid = scenario.build_grid().unwrap();
        assert!(scenario.agents(&grid).is_err());
    }

    #[test]
    fn test_agent_on_obstacle_rejected() {
        let text = "\
width: 2
height: 2
obstacles:
  - [0, 0]
agents:
  A1:
    start: [0, 0]
    goal: [1, 1]
";
        let scenario: Scenario = serde_yaml::from_str(text).unwrap();
        let grid = scenario.build_grid().unwrap();
        assert!(scenario.agents(&grid).is_err());
    }

    #[test]
    fn test_empty_agent_catalog_rejected() {
        let text = "\
width: 2
height: 2
agents: {}
";
        let scenario: Scenario = serde_yaml::from_str(text).unwrap();
        let grid = scenario.build_grid().unwrap();
        assert!(scenario.agents(&grid).is_err());
    }
}
