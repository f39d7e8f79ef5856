use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{Assignment, Condition, Fact, WorldState};

const INFINITE: i64 = -1;

fn infinite() -> i64 {
    INFINITE
}

fn is_infinite(seconds: &i64) -> bool {
    *seconds == INFINITE
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Something the agent wants to be true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    pub objective: Condition,
    /// Negative means the goal never expires.
    #[serde(default = "infinite", skip_serializing_if = "is_infinite")]
    pub max_inactive_seconds: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inactive_since: Option<DateTime<Utc>>,
    /// Persistent goals stay in the stack once satisfied.
    #[serde(default, skip_serializing_if = "is_false")]
    pub persistent: bool,
    /// The goal is only considered while this fact is present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_fact: Option<Fact>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group_id: String,
}

impl Goal {
    pub fn new(objective: Condition) -> Self {
        Self {
            objective,
            max_inactive_seconds: INFINITE,
            inactive_since: None,
            persistent: false,
            condition_fact: None,
            group_id: String::new(),
        }
    }

    pub fn from_fact(fact: Fact) -> Self {
        Self::new(Condition::fact(fact))
    }

    pub fn with_max_inactive_seconds(mut self, seconds: i64) -> Self {
        self.max_inactive_seconds = seconds;
        self
    }

    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }

    pub fn with_condition_fact(mut self, fact: Fact) -> Self {
        self.condition_fact = Some(fact);
        self
    }

    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = group_id.into();
        self
    }

    /// False while the guard fact is missing from `world`.
    pub fn is_enabled(&self, world: &WorldState) -> bool {
        self.condition_fact
            .as_ref()
            .map_or(true, |fact| world.contains(fact))
    }

    pub fn is_satisfied(&self, world: &WorldState) -> bool {
        self.objective.is_true(world, &BTreeSet::new(), None)
    }

    pub fn notify_activity(&mut self) {
        self.inactive_since = None;
    }

    pub fn set_inactive_since_if_not_set(&mut self, now: Option<DateTime<Utc>>) {
        if self.inactive_since.is_none() {
            self.inactive_since = now;
        }
    }

    pub fn is_inactive_for_too_long(&self, now: Option<DateTime<Utc>>) -> bool {
        if self.max_inactive_seconds < 0 {
            return false;
        }
        // Timeouts beyond the representable range never expire.
        match (now, self.inactive_since, Duration::try_seconds(self.max_inactive_seconds)) {
            (Some(now), Some(since), Some(limit)) => now - since > limit,
            _ => false,
        }
    }

    pub fn substitute(&self, assignment: &Assignment) -> Goal {
        Goal {
            objective: self.objective.substitute(assignment),
            condition_fact: self
                .condition_fact
                .as_ref()
                .map(|fact| fact.substitute(assignment)),
            ..self.clone()
        }
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.persistent {
            f.write_str("persist(")?;
        }
        if let Some(guard) = &self.condition_fact {
            write!(f, "imply({guard}, ")?;
        }
        write!(f, "{}", self.objective)?;
        if self.condition_fact.is_some() {
            f.write_str(")")?;
        }
        if self.persistent {
            f.write_str(")")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_needs_a_finite_timeout_and_a_clock() {
        let start = Utc::now();
        let mut goal = Goal::from_fact("done(x)".parse().unwrap()).with_max_inactive_seconds(10);
        goal.set_inactive_since_if_not_set(Some(start));
        assert!(!goal.is_inactive_for_too_long(None));
        assert!(!goal.is_inactive_for_too_long(Some(start + Duration::seconds(5))));
        assert!(goal.is_inactive_for_too_long(Some(start + Duration::seconds(11))));

        goal.notify_activity();
        assert!(!goal.is_inactive_for_too_long(Some(start + Duration::seconds(11))));

        let forever = Goal::from_fact("done(x)".parse().unwrap());
        assert!(!forever.is_inactive_for_too_long(Some(start + Duration::days(365))));
    }

    #[test]
    fn huge_timeout_never_expires() {
        let start = Utc::now();
        let mut goal = Goal::from_fact("done(x)".parse().unwrap()).with_max_inactive_seconds(i64::MAX);
        goal.set_inactive_since_if_not_set(Some(start));
        assert!(!goal.is_inactive_for_too_long(Some(start + Duration::days(365 * 100))));
    }

    #[test]
    fn guard_fact_enables_the_goal() {
        let goal = Goal::from_fact("clean(room)".parse().unwrap())
            .with_condition_fact("awake(me)".parse().unwrap());
        assert!(!goal.is_enabled(&WorldState::default()));
        let world = WorldState::from_facts(["awake(me)".parse().unwrap()]);
        assert!(goal.is_enabled(&world));
        assert_eq!(goal.to_string(), "imply(awake(me), clean(room))");
    }
}
