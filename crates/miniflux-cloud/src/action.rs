//! Action types for child resource management

use crate::resource::ResourceKind;
use serde::{Deserialize, Serialize};

/// A planned or executed action for one child resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Node id in the resource graph
    pub node: String,

    /// Resource kind
    pub kind: ResourceKind,

    /// Type of action to perform
    pub action_type: ActionType,
}

impl Action {
    pub fn new(node: impl Into<String>, kind: ResourceKind, action_type: ActionType) -> Self {
        Self {
            node: node.into(),
            kind,
            action_type,
        }
    }
}

/// Type of action to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Create a new resource
    Create,
    /// Update an existing resource
    Update,
    /// Delete a resource
    Delete,
    /// Read back a resource to detect drift
    Read,
    /// No changes needed
    NoOp,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::Update => write!(f, "update"),
            ActionType::Delete => write!(f, "delete"),
            ActionType::Read => write!(f, "read"),
            ActionType::NoOp => write!(f, "no-op"),
        }
    }
}

/// Record of the actions carried out by one apply or destroy run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionLog {
    /// Successfully applied actions, in completion order
    pub succeeded: Vec<Action>,

    /// Failed actions with their redacted error
    pub failed: Vec<(Action, String)>,

    /// Nodes that were never started
    pub skipped: Vec<String>,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl ActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }

    pub fn add_success(&mut self, action: Action) {
        self.succeeded.push(action);
    }

    pub fn add_failure(&mut self, action: Action, error: String) {
        self.failed.push((action, error));
    }

    pub fn add_skipped(&mut self, node: impl Into<String>) {
        self.skipped.push(node.into());
    }

    /// Count of successful actions per type
    pub fn summary(&self) -> PlanSummary {
        PlanSummary::from_actions(self.succeeded.iter())
    }
}

/// Summary of planned or applied actions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub no_change: usize,
}

impl PlanSummary {
    pub fn from_actions<'a>(actions: impl IntoIterator<Item = &'a Action>) -> Self {
        let mut summary = Self::default();
        for action in actions {
            match action.action_type {
                ActionType::Create => summary.create += 1,
                ActionType::Update => summary.update += 1,
                ActionType::Delete => summary.delete += 1,
                ActionType::Read | ActionType::NoOp => summary.no_change += 1,
            }
        }
        summary
    }

    pub fn has_changes(&self) -> bool {
        self.create + self.update + self.delete > 0
    }
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to delete, {} unchanged",
            self.create, self.update, self.delete, self.no_change
        )
    }
}
