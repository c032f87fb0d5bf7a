use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};

use tracing::debug;

use crate::algorithm::a_star_search;
use crate::common::{Agent, AgentId, Constraint, Path, Solution};
use crate::conflict::{detect_conflicts, Conflict};
use crate::grid::Grid;
use crate::stat::Stats;

struct CbsNode {
    constraints: Vec<Constraint>,
    paths: BTreeMap<AgentId, Path>,
    cost: usize,
    // Monotone insertion counter; FIFO on equal cost keeps expansion
    // deterministic.
    seq: u64,
}

impl PartialEq for CbsNode {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost && self.seq == other.seq
    }
}

impl Eq for CbsNode {}

impl Ord for CbsNode {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for CbsNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Conflict-Based Search: best-first over a tree of constraint sets, each
/// expansion branching the earliest conflict onto the two agents involved.
pub struct Cbs<'a> {
    agents: &'a [Agent],
    grid: &'a Grid,
    landing_hold: usize,
    t_max: usize,
    stats: Stats,
}

impl<'a> Cbs<'a> {
    pub fn new(agents: &'a [Agent], grid: &'a Grid, landing_hold: usize, t_max: usize) -> Self {
        Cbs {
            agents,
            grid,
            landing_hold,
            t_max,
            stats: Stats::default(),
        }
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// `None` means infeasible: either some agent has no path under the root
    /// constraints, or the constraint tree was exhausted.
    pub fn solve(&mut self, extra_constraints: &[Constraint]) -> Option<Solution> {
        let mut paths = BTreeMap::new();
        for agent in self.agents {
            let Some(path) = a_star_search(
                self.grid,
                &agent.id,
                agent.start,
                agent.goal,
                extra_constraints,
                self.t_max,
                &mut self.stats,
            ) else {
                debug!(agent = %agent.id, "no root path");
                return None;
            };
            paths.insert(agent.id.clone(), path);
        }

        let mut seq = 0;
        let root = CbsNode {
            constraints: extra_constraints.to_vec(),
            cost: paths.values().map(|path| path.len()).sum(),
            paths,
            seq,
        };
        let mut open = BinaryHeap::new();
        open.push(root);

        while let Some(node) = open.pop() {
            let conflicts = detect_conflicts(&node.paths, self.landing_hold);
            let Some(conflict) = earliest_conflict(&conflicts) else {
                debug!(cost = node.cost, "conflict-free node popped");
                self.stats.costs = node.cost;
                return Some(Solution { paths: node.paths });
            };
            debug!(?conflict, cost = node.cost, "branching");

            for (agent_id, constraint) in branch_constraints(conflict) {
                let mut constraints = node.constraints.clone();
                constraints.push(constraint);

                let agent = self
                    .agents
                    .iter()
                    .find(|agent| agent.id == agent_id)
                    .unwrap_or_else(|| unreachable!("conflict names unknown agent {agent_id}"));
                // Only the newly constrained agent is replanned; the sibling
                // keeps every inherited path.
                let Some(path) = a_star_search(
                    self.grid,
                    &agent.id,
                    agent.start,
                    agent.goal,
                    &constraints,
                    self.t_max,
                    &mut self.stats,
                ) else {
                    continue;
                };

                let mut paths = node.paths.clone();
                let cost = node.cost - paths[&agent_id].len() + path.len();
                paths.insert(agent_id, path);

                seq += 1;
                self.stats.high_level_expanded += 1;
                open.push(CbsNode {
                    constraints,
                    paths,
                    cost,
                    seq,
                });
            }
        }

        debug!("constraint tree exhausted");
        None
    }
}

/// First conflict with minimal time, in emission order.
fn earliest_conflict(conflicts: &[Conflict]) -> Option<&Conflict> {
    let mut best: Option<&Conflict> = None;
    for conflict in conflicts {
        if best.is_none_or(|b| conflict.time() < b.time()) {
            best = Some(conflict);
        }
    }
    best
}

/// The two child constraints for a conflict. An edge conflict forbids each
/// agent only its own transition; the opposite direction stays open for the
/// sibling, as standard CBS permits.
fn branch_constraints(conflict: &Conflict) -> [(AgentId, Constraint); 2] {
    match conflict {
        Conflict::Vertex {
            first,
            second,
            time,
            pos,
        } => [
            (
                first.clone(),
                Constraint::Vertex {
                    agent: Some(first.clone()),
                    time: *time,
                    pos: *pos,
                },
            ),
            (
                second.clone(),
                Constraint::Vertex {
                    agent: Some(second.clone()),
                    time: *time,
                    pos: *pos,
                },
            ),
        ],
        Conflict::Edge {
            first,
            second,
            time,
            first_move,
            second_move,
        } => [
            (
                first.clone(),
                Constraint::Edge {
                    agent: Some(first.clone()),
                    time: *time,
                    from: first_move.0,
                    to: first_move.1,
                },
            ),
            (
                second.clone(),
                Constraint::Edge {
                    agent: Some(second.clone()),
                    time: *time,
                    from: second_move.0,
                    to: second_move.1,
                },
            ),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::DEFAULT_LANDING_HOLD;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("debug")
            .try_init();
    }

    fn agent(id: &str, start: (usize, usize), goal: (usize, usize)) -> Agent {
        Agent {
            id: id.to_string(),
            start,
            goal,
        }
    }

    fn solve(grid: &Grid, agents: &[Agent]) -> Option<Solution> {
        let mut cbs = Cbs::new(agents, grid, DEFAULT_LANDING_HOLD, grid.default_time_limit());
        cbs.solve(&[])
    }

    fn assert_conflict_free(solution: &Solution) {
        assert!(detect_conflicts(&solution.paths, DEFAULT_LANDING_HOLD).is_empty());
    }

    #[test]
    fn test_single_agent_corridor() {
        init_tracing();
        let grid = Grid::from_ascii("...\n...\n...").unwrap();
        let agents = vec![agent("a1", (0, 0), (2, 2))];
        let solution = solve(&grid, &agents).unwrap();
        assert_eq!(solution.paths["a1"].len(), 5);
        assert_eq!(solution.cost(), 5);
    }

    #[test]
    fn test_crossing_agents_resolve_vertex_conflict() {
        init_tracing();
        let grid = Grid::from_ascii("...\n...\n...").unwrap();
        // Both shortest paths want (1, 1) at t=1.
        let agents = vec![agent("a1", (0, 1), (2, 1)), agent("a2", (1, 0), (1, 2))];
        let solution = solve(&grid, &agents).unwrap();
        assert_conflict_free(&solution);
        assert_eq!(*solution.paths["a1"].last().unwrap(), (2, 1));
        assert_eq!(*solution.paths["a2"].last().unwrap(), (1, 2));
    }

    #[test]
    fn test_head_on_swap_uses_passing_bay() {
        init_tracing();
        // Corridor with a single bay at (1, 1); a head-on pair must branch
        // on the swap conflict and send one agent through the bay or into a
        // wait.
        let grid = Grid::from_ascii("....\n#.##").unwrap();
        let agents = vec![agent("a1", (0, 0), (3, 0)), agent("a2", (3, 0), (0, 0))];

        // The unconstrained shortest paths collide head-on: the earliest
        // conflict is the swap in the middle of the corridor.
        let mut stats = Stats::default();
        let free: BTreeMap<AgentId, Path> = agents
            .iter()
            .map(|a| {
                (
                    a.id.clone(),
                    a_star_search(&grid, &a.id, a.start, a.goal, &[], 16, &mut stats).unwrap(),
                )
            })
            .collect();
        let conflicts = detect_conflicts(&free, DEFAULT_LANDING_HOLD);
        assert!(matches!(
            earliest_conflict(&conflicts),
            Some(Conflict::Edge { time: 2, .. })
        ));

        let solution = solve(&grid, &agents).unwrap();
        assert_conflict_free(&solution);
        assert_eq!(solution.cost(), 10);
    }

    #[test]
    fn test_landing_hold_forces_reroute() {
        init_tracing();
        // Column x=0 with the exit (1, 0); a1 lands on (0, 0) at t=2 and
        // holds through t=4, so a2 cannot cross (0, 0) before t=5.
        let grid = Grid::from_ascii("..\n.#\n.#\n.#").unwrap();
        let agents = vec![agent("a1", (0, 2), (0, 0)), agent("a2", (0, 3), (1, 0))];
        let solution = solve(&grid, &agents).unwrap();
        assert_conflict_free(&solution);
        assert_eq!(solution.cost(), 10);
        assert_eq!(*solution.paths["a2"].last().unwrap(), (1, 0));
    }

    #[test]
    fn test_infeasible_root() {
        init_tracing();
        let grid = Grid::from_ascii(".#.\n###\n...").unwrap();
        let agents = vec![agent("a1", (0, 0), (2, 2))];
        let mut cbs = Cbs::new(&agents, &grid, DEFAULT_LANDING_HOLD, grid.default_time_limit());
        assert!(cbs.solve(&[]).is_none());
    }

    #[test]
    fn test_children_never_cheaper_than_parent() {
        init_tracing();
        let grid = Grid::from_ascii("...\n...\n...").unwrap();
        let agents = vec![agent("a1", (0, 1), (2, 1)), agent("a2", (1, 0), (1, 2))];
        let free_cost: usize = agents
            .iter()
            .map(|a| {
                let mut stats = Stats::default();
                a_star_search(&grid, &a.id, a.start, a.goal, &[], 18, &mut stats)
                    .unwrap()
                    .len()
            })
            .sum();
        let solution = solve(&grid, &agents).unwrap();
        assert!(solution.cost() >= free_cost);
    }
}
