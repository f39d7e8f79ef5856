use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ActionId;

/// How many times each action was executed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Historical {
    counts: BTreeMap<ActionId, u32>,
}

impl Historical {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify_action_done(&mut self, action_id: &str) {
        *self.counts.entry(action_id.to_owned()).or_default() += 1;
    }

    pub fn has_been_done(&self, action_id: &str) -> bool {
        self.count(action_id) > 0
    }

    pub fn count(&self, action_id: &str) -> u32 {
        self.counts.get(action_id).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ActionId, u32)> {
        self.counts.iter().map(|(id, count)| (id, *count))
    }
}
