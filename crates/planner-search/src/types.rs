use std::fmt;

use planner_core::{ActionId, Assignment, Goal};
use serde::{Deserialize, Serialize};

/// An action with its parameters bound.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActionInstance {
    pub action_id: ActionId,
    #[serde(default, skip_serializing_if = "Assignment::is_empty")]
    pub parameters: Assignment,
}

impl ActionInstance {
    pub fn new(action_id: impl Into<ActionId>) -> Self {
        Self {
            action_id: action_id.into(),
            parameters: Assignment::new(),
        }
    }
}

impl fmt::Display for ActionInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.action_id)?;
        if !self.parameters.is_empty() {
            f.write_str("(")?;
            for (index, (parameter, value)) in self.parameters.iter().enumerate() {
                if index > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{} -> {}", parameter.name, value.value)?;
            }
            f.write_str(")")?;
        }
        Ok(())
    }
}

/// One planning decision: the action and the goal it serves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerStep {
    pub action_instance: ActionInstance,
    pub goal: Goal,
    pub priority: i32,
}
