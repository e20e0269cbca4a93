use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::lane::{ExecutionMode, NodeShape};

/// Terminal state of an executed node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Failed { error: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Succeeded => write!(f, "succeeded"),
            Outcome::Failed { .. } => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    Task { entry_point: String },
    Lane { execution: ExecutionMode },
}

/// Timing and outcome of one executed node, nested per lane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub name: String,
    pub kind: NodeKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ExecutionRecord>,
    /// Sequential children never started because an earlier sibling failed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
}

impl ExecutionRecord {
    /// `Task.entry_point` for tasks, the lane name for lanes.
    pub fn display_name(&self) -> String {
        match &self.kind {
            NodeKind::Task { entry_point } => format!("{}.{}", self.name, entry_point),
            NodeKind::Lane { .. } => self.name.clone(),
        }
    }

    pub fn is_lane(&self) -> bool {
        matches!(self.kind, NodeKind::Lane { .. })
    }

    /// Depth-first search by name or `Task.entry_point`.
    pub fn find(&self, name: &str) -> Option<&ExecutionRecord> {
        if self.name == name || self.display_name() == name {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(name))
    }

    pub fn task_duration_ms(&self, name: &str) -> Option<u64> {
        self.find(name)
            .filter(|record| !record.is_lane())
            .map(|record| record.duration_ms)
    }

    /// Executed tasks in depth-first order.
    pub fn tasks(&self) -> Vec<&ExecutionRecord> {
        let mut out = Vec::new();
        self.collect_tasks(&mut out);
        out
    }

    fn collect_tasks<'a>(&'a self, out: &mut Vec<&'a ExecutionRecord>) {
        for child in &self.children {
            if child.is_lane() {
                child.collect_tasks(out);
            } else {
                out.push(child);
            }
        }
    }

    pub fn shape(&self) -> NodeShape {
        NodeShape {
            name: self.display_name(),
            children: self.children.iter().map(ExecutionRecord::shape).collect(),
        }
    }

    /// Human-readable summary, one line per node.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        self.summarize_into(&mut out, 0);
        out
    }

    fn summarize_into(&self, out: &mut String, depth: usize) {
        use std::fmt::Write as _;

        let indent = "  ".repeat(depth);
        let _ = writeln!(
            out,
            "{}{} {} ({}ms)",
            indent,
            self.display_name(),
            self.outcome,
            self.duration_ms
        );
        for child in &self.children {
            child.summarize_into(out, depth + 1);
        }
        for name in &self.skipped {
            let _ = writeln!(out, "{}  {} skipped", indent, name);
        }
    }
}
