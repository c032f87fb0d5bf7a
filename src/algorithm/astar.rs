use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use tracing::{debug, trace};

use super::manhattan;
use crate::common::{Cell, Constraint, Path};
use crate::grid::Grid;
use crate::stat::Stats;

// 4-connected moves plus wait.
const MOVES: [(isize, isize); 5] = [(0, 1), (0, -1), (1, 0), (-1, 0), (0, 0)];

/// Per-call bucketing of the constraint set. Only entries scoped to the
/// planning agent or to all agents are indexed; times are absolute.
struct ConstraintIndex {
    vertex_at: HashMap<usize, HashSet<Cell>>,
    edge_at: HashMap<usize, HashSet<(Cell, Cell)>>,
}

impl ConstraintIndex {
    fn build(constraints: &[Constraint], agent_id: &str) -> Self {
        let mut vertex_at: HashMap<usize, HashSet<Cell>> = HashMap::new();
        let mut edge_at: HashMap<usize, HashSet<(Cell, Cell)>> = HashMap::new();
        for constraint in constraints {
            if constraint.agent().is_some_and(|a| a != agent_id) {
                continue;
            }
            match constraint {
                Constraint::Vertex { time, pos, .. } => {
                    vertex_at.entry(*time).or_default().insert(*pos);
                }
                Constraint::Edge { time, from, to, .. } => {
                    edge_at.entry(*time).or_default().insert((*from, *to));
                }
            }
        }
        ConstraintIndex { vertex_at, edge_at }
    }

    fn vertex_blocked(&self, cell: Cell, time: usize) -> bool {
        self.vertex_at
            .get(&time)
            .is_some_and(|cells| cells.contains(&cell))
    }

    fn edge_blocked(&self, from: Cell, to: Cell, time: usize) -> bool {
        self.edge_at
            .get(&time)
            .is_some_and(|edges| edges.contains(&(from, to)))
    }

    /// Latest time within the step bound at which `cell` is vertex-forbidden.
    fn latest_vertex_block(&self, cell: Cell, t_max: usize) -> Option<usize> {
        self.vertex_at
            .iter()
            .filter(|(time, cells)| **time <= t_max && cells.contains(&cell))
            .map(|(time, _)| *time)
            .max()
    }
}

// Arena entry; parent chains are indices into the arena, reconstructed after
// the goal is accepted.
struct SearchNode {
    cell: Cell,
    time: usize,
    g: usize,
    parent: Option<usize>,
}

#[derive(PartialEq, Eq)]
struct HeapEntry {
    f: usize,
    h: usize,
    idx: usize,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .cmp(&self.f)
            // Smaller h wins ties, preferring deeper nodes.
            .then_with(|| other.h.cmp(&self.h))
            // Insertion order keeps the search idempotent.
            .then_with(|| other.idx.cmp(&self.idx))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Time-extended single-agent shortest path. Returns `None` when the open
/// set empties; infeasibility is a value here, never an error.
pub(crate) fn a_star_search(
    grid: &Grid,
    agent_id: &str,
    start: Cell,
    goal: Cell,
    constraints: &[Constraint],
    t_max: usize,
    stats: &mut Stats,
) -> Option<Path> {
    let index = ConstraintIndex::build(constraints, agent_id);
    let latest_goal_block = index.latest_vertex_block(goal, t_max);
    debug!(
        agent = agent_id,
        ?start,
        ?goal,
        latest_goal_block,
        "low-level search"
    );

    let mut arena = vec![SearchNode {
        cell: start,
        time: 0,
        g: 0,
        parent: None,
    }];
    let start_h = manhattan(start, goal);
    let mut open = BinaryHeap::new();
    open.push(HeapEntry {
        f: start_h,
        h: start_h,
        idx: 0,
    });
    // (cell, time) -> best g seen so far.
    let mut closed: HashMap<(Cell, usize), usize> = HashMap::new();

    while let Some(entry) = open.pop() {
        let (cell, time, g) = {
            let node = &arena[entry.idx];
            (node.cell, node.time, node.g)
        };
        if closed.get(&(cell, time)).is_some_and(|&best| best <= g) {
            continue;
        }
        closed.insert((cell, time), g);
        stats.low_level_expanded += 1;
        trace!(?cell, time, g, "expand");

        // Accept the goal only if no later vertex constraint would evict the
        // agent from it; otherwise keep expanding so it can wait or reroute.
        if cell == goal && latest_goal_block.is_none_or(|blocked| time > blocked) {
            return Some(reconstruct(&arena, entry.idx));
        }

        let next_time = time + 1;
        if next_time > t_max {
            continue;
        }
        for (dx, dy) in MOVES {
            let Some(next) = offset(grid, cell, dx, dy) else {
                continue;
            };
            if !grid.is_open(next) {
                continue;
            }
            if index.vertex_blocked(next, next_time) {
                continue;
            }
            if index.edge_blocked(cell, next, next_time) {
                continue;
            }
            let idx = arena.len();
            arena.push(SearchNode {
                cell: next,
                time: next_time,
                g: g + 1,
                parent: Some(entry.idx),
            });
            let h = manhattan(next, goal);
            open.push(HeapEntry {
                f: g + 1 + h,
                h,
                idx,
            });
        }
    }

    debug!(agent = agent_id, "open set exhausted, no path");
    None
}

fn offset(grid: &Grid, (x, y): Cell, dx: isize, dy: isize) -> Option<Cell> {
    let x = x.checked_add_signed(dx)?;
    let y = y.checked_add_signed(dy)?;
    grid.in_bounds((x, y)).then_some((x, y))
}

fn reconstruct(arena: &[SearchNode], mut idx: usize) -> Path {
    let mut path = vec![arena[idx].cell];
    while let Some(parent) = arena[idx].parent {
        idx = parent;
        path.push(arena[idx].cell);
    }
    path.reverse();
    path
}
