use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Goal, WorldState};

/// What the planner decided about one goal while walking the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalDecision {
    /// An action was found; the walk stops here.
    Pursue,
    /// The objective already holds.
    Satisfied,
    /// Disabled, or no action can progress it right now.
    Skip,
}

/// Goals grouped by priority, highest priority first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GoalStack {
    goals: BTreeMap<i32, Vec<Goal>>,
}

impl GoalStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_goals(goals: BTreeMap<i32, Vec<Goal>>) -> Self {
        let mut stack = Self { goals };
        stack.goals.retain(|_, goals| !goals.is_empty());
        stack
    }

    pub fn goals(&self) -> &BTreeMap<i32, Vec<Goal>> {
        &self.goals
    }

    pub fn is_empty(&self) -> bool {
        self.goals.is_empty()
    }

    pub fn len(&self) -> usize {
        self.goals.values().map(Vec::len).sum()
    }

    /// Goals with their priority, highest priority first.
    pub fn iter(&self) -> impl Iterator<Item = (i32, &Goal)> {
        self.goals
            .iter()
            .rev()
            .flat_map(|(priority, goals)| goals.iter().map(move |goal| (*priority, goal)))
    }

    pub fn current_goal(&self) -> Option<&Goal> {
        self.iter().next().map(|(_, goal)| goal)
    }

    pub fn push_back(&mut self, priority: i32, goal: Goal) {
        self.goals.entry(priority).or_default().push(goal);
    }

    pub fn push_front(&mut self, priority: i32, goal: Goal) {
        self.goals.entry(priority).or_default().insert(0, goal);
    }

    /// Inserts each priority's goals ahead of the goals already there.
    pub fn add_goals(&mut self, goals: &BTreeMap<i32, Vec<Goal>>) {
        for (priority, new_goals) in goals {
            self.add_goals_in_priority(new_goals, *priority);
        }
    }

    pub fn add_goals_in_priority(&mut self, goals: &[Goal], priority: i32) {
        if goals.is_empty() {
            return;
        }
        let slot = self.goals.entry(priority).or_default();
        slot.splice(0..0, goals.iter().cloned());
    }

    pub fn set_goals(&mut self, goals: BTreeMap<i32, Vec<Goal>>) {
        *self = Self::from_goals(goals);
    }

    pub fn clear(&mut self) {
        self.goals.clear();
    }

    /// Removes every goal of `group_id`. Returns whether one was removed.
    pub fn remove_goals(&mut self, group_id: &str) -> bool {
        let before = self.len();
        for goals in self.goals.values_mut() {
            goals.retain(|goal| goal.group_id != group_id);
        }
        self.goals.retain(|_, goals| !goals.is_empty());
        before != self.len()
    }

    /// Drops enabled, satisfied, non-persistent goals.
    pub fn remove_satisfied_goals(&mut self, world: &WorldState) -> bool {
        let before = self.len();
        for goals in self.goals.values_mut() {
            goals.retain(|goal| {
                goal.persistent || !goal.is_enabled(world) || !goal.is_satisfied(world)
            });
        }
        self.goals.retain(|_, goals| !goals.is_empty());
        before != self.len()
    }

    /// Drops goals inactive for longer than they allow.
    pub fn remove_expired_goals(&mut self, now: Option<DateTime<Utc>>) -> bool {
        let before = self.len();
        for goals in self.goals.values_mut() {
            goals.retain(|goal| {
                let expired = goal.is_inactive_for_too_long(now);
                if expired {
                    debug!(goal = %goal, "dropping expired goal");
                }
                !expired
            });
        }
        self.goals.retain(|_, goals| !goals.is_empty());
        before != self.len()
    }

    /// Walks the goals from the highest priority down until `decide`
    /// returns [`GoalDecision::Pursue`].
    ///
    /// Satisfied non-persistent goals met along the way are removed. Every
    /// goal that is not pursued starts its inactivity timer; the pursued one
    /// has it reset. Returns whether a goal was pursued.
    pub fn iterate_on_goals_and_remove_non_persistent<F>(
        &mut self,
        now: Option<DateTime<Utc>>,
        mut decide: F,
    ) -> bool
    where
        F: FnMut(&Goal, i32) -> GoalDecision,
    {
        self.remove_expired_goals(now);
        let mut pursued = false;
        for (priority, goals) in self.goals.iter_mut().rev() {
            let priority = *priority;
            goals.retain_mut(|goal| {
                if pursued {
                    goal.set_inactive_since_if_not_set(now);
                    return true;
                }
                match decide(goal, priority) {
                    GoalDecision::Pursue => {
                        goal.notify_activity();
                        pursued = true;
                        true
                    }
                    GoalDecision::Satisfied => goal.persistent,
                    GoalDecision::Skip => {
                        goal.set_inactive_since_if_not_set(now);
                        true
                    }
                }
            });
        }
        self.goals.retain(|_, goals| !goals.is_empty());
        pursued
    }
}
