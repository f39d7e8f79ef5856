use serde::{Deserialize, Serialize};

use crate::fact::Undeclared;
use crate::{Condition, Fact, Ontology, Parameter, PlannerError, ProblemModification, Result};

pub type ActionId = String;

fn is_false(value: &bool) -> bool {
    !*value
}

/// An action template of the domain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precondition: Option<Condition>,
    /// Facts that make the action more attractive when they hold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefer_in_context: Option<Condition>,
    pub effect: ProblemModification,
    #[serde(default, skip_serializing_if = "is_false")]
    pub high_importance_of_not_repeating_it: bool,
}

impl Action {
    pub fn new(effect: ProblemModification) -> Self {
        Self {
            effect,
            ..Self::default()
        }
    }

    pub fn with_parameters(mut self, parameters: Vec<Parameter>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_precondition(mut self, precondition: Condition) -> Self {
        self.precondition = Some(precondition);
        self
    }

    pub fn with_prefer_in_context(mut self, prefer_in_context: Condition) -> Self {
        self.prefer_in_context = Some(prefer_in_context);
        self
    }

    pub fn not_repeatable(mut self) -> Self {
        self.high_importance_of_not_repeating_it = true;
        self
    }

    /// Checks that every parameter is declared and every fact agrees with
    /// the ontology's predicate arities.
    pub fn validate(&self, id: &str, ontology: &Ontology) -> Result<()> {
        let undeclared = self
            .precondition
            .iter()
            .chain(self.prefer_in_context.iter())
            .find_map(|condition| condition.find_undeclared(&self.parameters))
            .or_else(|| {
                self.effect
                    .effects()
                    .find_map(|effect| effect.find_undeclared(&self.parameters))
            });
        match undeclared {
            Some(Undeclared::Argument(parameter)) => {
                return Err(PlannerError::UndeclaredParameter {
                    action: id.to_owned(),
                    parameter: parameter.name,
                })
            }
            Some(Undeclared::Fluent(parameter)) => {
                return Err(PlannerError::UndeclaredFluentParameter {
                    action: id.to_owned(),
                    parameter: parameter.name,
                })
            }
            None => {}
        }
        for fact in self.facts() {
            check_arity(&fact, ontology)?;
        }
        Ok(())
    }

    fn facts(&self) -> Vec<Fact> {
        let mut facts: Vec<Fact> = self
            .precondition
            .iter()
            .chain(self.prefer_in_context.iter())
            .flat_map(Condition::facts)
            .map(|leaf| leaf.fact)
            .collect();
        for effect in self.effect.effects() {
            let (added, removed) = effect.produced_facts();
            facts.extend(added);
            facts.extend(removed);
        }
        facts
    }
}

pub(crate) fn check_arity(fact: &Fact, ontology: &Ontology) -> Result<()> {
    match ontology.predicates.get(&fact.name) {
        Some(predicate) if predicate.parameters.len() != fact.arguments.len() => {
            Err(PlannerError::PredicateArity {
                fact: fact.to_string(),
                expected: predicate.parameters.len(),
                found: fact.arguments.len(),
            })
        }
        _ => Ok(()),
    }
}
