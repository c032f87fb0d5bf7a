use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Grid cell as `(x, y)` with `x` in `[0, width)` and `y` in `[0, height)`.
pub type Cell = (usize, usize);

/// Timestep-indexed trajectory: `path[t]` is the agent's cell at time `t`.
pub type Path = Vec<Cell>;

pub type AgentId = String;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub start: Cell,
    pub goal: Cell,
}

/// Spatio-temporal restriction. `agent == None` scopes the entry to all
/// agents; otherwise only the named agent is bound by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constraint {
    Vertex {
        agent: Option<AgentId>,
        time: usize,
        pos: Cell,
    },
    Edge {
        agent: Option<AgentId>,
        time: usize,
        from: Cell,
        to: Cell,
    },
}

impl Constraint {
    pub fn time(&self) -> usize {
        match self {
            Constraint::Vertex { time, .. } | Constraint::Edge { time, .. } => *time,
        }
    }

    pub fn agent(&self) -> Option<&str> {
        match self {
            Constraint::Vertex { agent, .. } | Constraint::Edge { agent, .. } => agent.as_deref(),
        }
    }
}

/// Wire form of a constraint entry. Generators upstream are allowed to be
/// loose: unknown fields are ignored by serde, and `parse` drops entries
/// missing the fields their kind requires.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstraintRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default)]
    pub time: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos: Option<Cell>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Cell>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Cell>,
}

impl ConstraintRecord {
    /// Missing `time`, a kind-specific field, or an unknown `kind` makes the
    /// record unusable; `None` means "drop it", never an error.
    pub fn parse(&self) -> Option<Constraint> {
        let time = self.time?;
        match self.kind.as_deref() {
            None | Some("vertex") => Some(Constraint::Vertex {
                agent: self.agent.clone(),
                time,
                pos: self.pos?,
            }),
            Some("edge") => Some(Constraint::Edge {
                agent: self.agent.clone(),
                time,
                from: self.from?,
                to: self.to?,
            }),
            Some(_) => None,
        }
    }
}

impl From<&Constraint> for ConstraintRecord {
    fn from(constraint: &Constraint) -> Self {
        match constraint {
            Constraint::Vertex { agent, time, pos } => ConstraintRecord {
                agent: agent.clone(),
                time: Some(*time),
                kind: Some("vertex".to_string()),
                pos: Some(*pos),
                ..ConstraintRecord::default()
            },
            Constraint::Edge {
                agent,
                time,
                from,
                to,
            } => ConstraintRecord {
                agent: agent.clone(),
                time: Some(*time),
                kind: Some("edge".to_string()),
                from: Some(*from),
                to: Some(*to),
                ..ConstraintRecord::default()
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Solution {
    pub paths: BTreeMap<AgentId, Path>,
}

impl Solution {
    /// Sum-of-costs objective: path lengths including the start element.
    pub fn cost(&self) -> usize {
        self.paths.values().map(|path| path.len()).sum()
    }
}
