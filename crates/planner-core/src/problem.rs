use serde::{Deserialize, Serialize};

use crate::{Domain, Effect, Fact, GoalStack, Historical, SetOfEntities, WorldState};

/// Mutable planning state: what is true, what is wanted, what was done.
///
/// Cloned freely for what-if replays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "SetOfEntities::is_empty")]
    pub entities: SetOfEntities,
    #[serde(default)]
    pub goal_stack: GoalStack,
    #[serde(default)]
    pub world_state: WorldState,
    #[serde(default, skip_serializing_if = "Historical::is_empty")]
    pub historical: Historical,
}

impl Problem {
    pub fn new(
        facts: impl IntoIterator<Item = Fact>,
        goal_stack: GoalStack,
        entities: SetOfEntities,
    ) -> Self {
        Self {
            name: String::new(),
            entities,
            goal_stack,
            world_state: WorldState::from_facts(facts),
            historical: Historical::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Adds facts, runs the inferences they trigger and drops the goals
    /// this satisfies.
    pub fn add_facts(&mut self, facts: impl IntoIterator<Item = Fact>, domain: &Domain) -> bool {
        let effect = Effect::and(facts.into_iter().map(Effect::Add));
        self.modify(&effect, domain)
    }

    pub fn remove_facts(&mut self, facts: impl IntoIterator<Item = Fact>, domain: &Domain) -> bool {
        let effect = Effect::and(facts.into_iter().map(Effect::Remove));
        self.modify(&effect, domain)
    }

    /// Applies a ground effect with its inferences, then drops satisfied
    /// goals.
    pub fn modify(&mut self, effect: &Effect, domain: &Domain) -> bool {
        let changed = self.world_state.modify(effect, domain);
        if changed {
            self.goal_stack.remove_satisfied_goals(&self.world_state);
        }
        changed
    }
}
