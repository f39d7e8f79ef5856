//! World state modifications carried by actions and inferences.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::ControlFlow;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::fact::Undeclared;
use crate::world_state::PendingChanges;
use crate::{
    Assignment, Condition, Expression, Fact, FactOptional, Goal, OnFact, Parameter,
    ParameterValues, SuccessorCache, Term, Visitor, WorldState,
};

/// Fluent value that unsets a fluent.
pub const UNDEFINED: &str = "undefined";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    Add(Fact),
    Remove(Fact),
    /// Sets the fluent of `fact`, replacing the previous value.
    Assign { fact: Fact, value: Term },
    /// Adds `by` to a numeric fluent. A missing fluent counts as 0.
    Increment { fact: Fact, by: i64 },
    Expression(Expression),
    And(Vec<Effect>),
    When {
        condition: Condition,
        effect: Box<Effect>,
    },
    ForAll {
        parameter: Parameter,
        condition: Condition,
        effect: Box<Effect>,
    },
}

impl Effect {
    pub fn add(text: &str) -> crate::Result<Self> {
        text.parse().map(Effect::Add)
    }

    pub fn remove(text: &str) -> crate::Result<Self> {
        text.parse().map(Effect::Remove)
    }

    pub fn and(effects: impl IntoIterator<Item = Effect>) -> Self {
        let mut flat = Vec::new();
        for effect in effects {
            match effect {
                Effect::And(children) => flat.extend(children),
                other => flat.push(other),
            }
        }
        if flat.len() == 1 {
            flat.remove(0)
        } else {
            Effect::And(flat)
        }
    }

    /// Visits the facts this effect may add (present) or remove (negated).
    pub fn walk<V: Visitor + ?Sized>(&self, visitor: &mut V) -> ControlFlow<()> {
        match self {
            Effect::Add(fact) => visitor.fact(&FactOptional::present(fact.clone())),
            Effect::Remove(fact) => visitor.fact(&FactOptional::absent(fact.clone())),
            Effect::Assign { fact, value } => {
                if value.as_entity().is_some_and(|entity| entity.value == UNDEFINED) {
                    visitor.fact(&FactOptional::absent(fact.clone().with_fluent(Parameter::any())))
                } else {
                    visitor.fact(&FactOptional::present(fact.clone().with_fluent(value.clone())))
                }
            }
            Effect::Increment { fact, .. } => {
                visitor.fact(&FactOptional::present(fact.clone().with_fluent(Parameter::any())))
            }
            Effect::Expression(expression) => visitor.expression(expression),
            Effect::And(children) => {
                for child in children {
                    child.walk(visitor)?;
                }
                ControlFlow::Continue(())
            }
            Effect::When { effect, .. } | Effect::ForAll { effect, .. } => effect.walk(visitor),
        }
    }

    /// Facts added, then facts removed.
    pub fn produced_facts(&self) -> (Vec<Fact>, Vec<Fact>) {
        let mut added = Vec::new();
        let mut removed = Vec::new();
        let _ = self.walk(&mut OnFact(|fact: &FactOptional| {
            if fact.negated {
                removed.push(fact.fact.clone());
            } else {
                added.push(fact.fact.clone());
            }
            ControlFlow::Continue(())
        }));
        (added, removed)
    }

    fn is_only_facts(&self) -> bool {
        match self {
            Effect::Add(_) | Effect::Remove(_) => true,
            Effect::And(children) => children.iter().all(Effect::is_only_facts),
            _ => false,
        }
    }

    pub fn substitute(&self, assignment: &Assignment) -> Effect {
        match self {
            Effect::Add(fact) => Effect::Add(fact.substitute(assignment)),
            Effect::Remove(fact) => Effect::Remove(fact.substitute(assignment)),
            Effect::Assign { fact, value } => Effect::Assign {
                fact: fact.substitute(assignment),
                value: value.substitute(assignment),
            },
            Effect::Increment { fact, by } => Effect::Increment {
                fact: fact.substitute(assignment),
                by: *by,
            },
            Effect::Expression(expression) => Effect::Expression(expression.clone()),
            Effect::And(children) => {
                Effect::And(children.iter().map(|child| child.substitute(assignment)).collect())
            }
            Effect::When { condition, effect } => Effect::When {
                condition: condition.substitute(assignment),
                effect: Box::new(effect.substitute(assignment)),
            },
            Effect::ForAll {
                parameter,
                condition,
                effect,
            } => {
                let mut inner = assignment.clone();
                inner.remove(parameter);
                Effect::ForAll {
                    parameter: parameter.clone(),
                    condition: condition.substitute(&inner),
                    effect: Box::new(effect.substitute(&inner)),
                }
            }
        }
    }

    pub(crate) fn find_undeclared(&self, declared: &[Parameter]) -> Option<Undeclared> {
        match self {
            Effect::Add(fact) | Effect::Remove(fact) | Effect::Increment { fact, .. } => {
                fact.find_undeclared(declared)
            }
            Effect::Assign { fact, value } => fact.find_undeclared(declared).or_else(|| {
                value
                    .as_parameter()
                    .filter(|parameter| !declared.contains(parameter))
                    .map(|parameter| Undeclared::Fluent(parameter.clone()))
            }),
            Effect::Expression(_) => None,
            Effect::And(children) => children
                .iter()
                .find_map(|child| child.find_undeclared(declared)),
            Effect::When { condition, effect } => condition
                .find_undeclared(declared)
                .or_else(|| effect.find_undeclared(declared)),
            Effect::ForAll {
                parameter,
                condition,
                effect,
            } => {
                let mut scope = declared.to_vec();
                scope.push(parameter.clone());
                condition
                    .find_undeclared(&scope)
                    .or_else(|| effect.find_undeclared(&scope))
            }
        }
    }

    /// Records what applying this effect under `assignment` changes.
    ///
    /// Conditional parts are evaluated against `world` as it was before the
    /// modification.
    pub(crate) fn collect(
        &self,
        world: &WorldState,
        punctual: &BTreeSet<Fact>,
        assignment: &Assignment,
        changes: &mut PendingChanges,
    ) {
        match self {
            Effect::Add(fact) => {
                let fact = fact.substitute(assignment);
                if fact.punctual {
                    changes.punctual.insert(fact);
                } else if fact.is_ground() {
                    changes.add.push(fact);
                } else {
                    warn!(fact = %fact, "cannot add a fact with unbound parameters");
                }
            }
            Effect::Remove(fact) => changes.remove.push(fact.substitute(assignment)),
            Effect::Assign { fact, value } => {
                let fact = fact.substitute(assignment);
                match value.substitute(assignment) {
                    Term::Entity(entity) if entity.value == UNDEFINED => changes.unassign.push(fact),
                    Term::Entity(entity) => changes.assign.push((fact, entity)),
                    Term::Parameter(parameter) => {
                        warn!(fact = %fact, parameter = %parameter, "cannot assign an unbound value")
                    }
                }
            }
            Effect::Increment { fact, by } => changes.increment.push((fact.substitute(assignment), *by)),
            Effect::Expression(expression) => changes.expressions.push(expression.clone()),
            Effect::And(children) => {
                for child in children {
                    child.collect(world, punctual, assignment, changes);
                }
            }
            Effect::When { condition, effect } => {
                if condition.substitute(assignment).is_true(world, punctual, None) {
                    effect.collect(world, punctual, assignment, changes);
                }
            }
            Effect::ForAll {
                parameter,
                condition,
                effect,
            } => {
                let mut scope = assignment.clone();
                scope.remove(parameter);
                let condition = condition.substitute(&scope);
                let mut values = ParameterValues::new();
                values.insert(parameter.clone(), BTreeSet::new());
                if !condition.is_true(world, punctual, Some(&mut values)) {
                    return;
                }
                let candidates = values.remove(parameter).unwrap_or_default();
                for entity in candidates {
                    let mut single = Assignment::new();
                    single.insert(parameter.clone(), entity.clone());
                    if !condition.substitute(&single).is_true(world, punctual, None) {
                        continue;
                    }
                    scope.insert(parameter.clone(), entity);
                    effect.collect(world, punctual, &scope, changes);
                }
            }
        }
    }
}

/// Everything an action changes: its effect on the world, a potential
/// effect that may happen as a side effect, and goals to push.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProblemModification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<Effect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub potential_effect: Option<Effect>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub goals_to_add: BTreeMap<i32, Vec<Goal>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub goals_to_add_in_current_priority: Vec<Goal>,
    #[serde(skip)]
    pub(crate) successors: SuccessorCache,
}

impl PartialEq for ProblemModification {
    fn eq(&self, other: &Self) -> bool {
        self.effect == other.effect
            && self.potential_effect == other.potential_effect
            && self.goals_to_add == other.goals_to_add
            && self.goals_to_add_in_current_priority == other.goals_to_add_in_current_priority
    }
}

impl ProblemModification {
    pub fn new(effect: Effect) -> Self {
        Self {
            effect: Some(effect),
            ..Self::default()
        }
    }

    pub fn with_potential_effect(mut self, effect: Effect) -> Self {
        self.potential_effect = Some(effect);
        self
    }

    pub fn with_goals_to_add(mut self, priority: i32, goals: Vec<Goal>) -> Self {
        self.goals_to_add.entry(priority).or_default().extend(goals);
        self
    }

    pub fn with_goals_in_current_priority(mut self, goals: Vec<Goal>) -> Self {
        self.goals_to_add_in_current_priority.extend(goals);
        self
    }

    /// Committed effect, then potential effect.
    pub fn effects(&self) -> impl Iterator<Item = &Effect> {
        self.effect.iter().chain(self.potential_effect.iter())
    }

    pub fn successors(&self) -> &SuccessorCache {
        &self.successors
    }

    /// False when the modification only re-asserts what `precondition`
    /// already requires.
    pub fn can_do_something(&self, precondition: Option<&Condition>) -> bool {
        if !self.goals_to_add.is_empty() || !self.goals_to_add_in_current_priority.is_empty() {
            return true;
        }
        let required = precondition.map(Condition::facts).unwrap_or_default();
        for effect in self.effects() {
            if !effect.is_only_facts() {
                return true;
            }
            let changes_something = effect
                .walk(&mut OnFact(|fact: &FactOptional| {
                    if required.contains(fact) {
                        ControlFlow::Continue(())
                    } else {
                        ControlFlow::Break(())
                    }
                }))
                .is_break();
            if changes_something {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produced_facts_cover_nested_effects() {
        let effect = Effect::and([
            Effect::add("done(?x)").unwrap(),
            Effect::When {
                condition: "tired(robot)".parse().unwrap(),
                effect: Box::new(Effect::remove("awake(robot)").unwrap()),
            },
            Effect::Increment {
                fact: "count(robot)".parse().unwrap(),
                by: 1,
            },
        ]);
        let (added, removed) = effect.produced_facts();
        let added: Vec<String> = added.iter().map(ToString::to_string).collect();
        assert_eq!(added, vec!["done(?x)", "count(robot)=?_any"]);
        assert_eq!(removed[0].to_string(), "awake(robot)");
    }

    #[test]
    fn modification_that_restates_its_precondition_does_nothing() {
        let precondition: Condition = "ready(a)".parse().unwrap();
        let idle = ProblemModification::new(Effect::add("ready(a)").unwrap());
        assert!(!idle.can_do_something(Some(&precondition)));

        let useful = ProblemModification::new(Effect::add("done(a)").unwrap());
        assert!(useful.can_do_something(Some(&precondition)));
        assert!(!ProblemModification::default().can_do_something(None));
    }

    #[test]
    fn forall_scopes_its_parameter() {
        let declared = [Parameter::new("?r")];
        let effect = Effect::ForAll {
            parameter: Parameter::new("?b"),
            condition: "on(?b, ?r)".parse().unwrap(),
            effect: Box::new(Effect::remove("on(?b, ?r)").unwrap()),
        };
        assert!(effect.find_undeclared(&declared).is_none());
        assert!(Effect::add("on(?c, ?r)").unwrap().find_undeclared(&declared).is_some());
    }
}
