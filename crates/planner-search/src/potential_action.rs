use std::collections::BTreeSet;
use std::ops::ControlFlow;

use planner_core::{assignments, Action, ActionId, FactOptional, OnFact, ParameterValues, WorldState};

use crate::search::SearchContext;
use crate::ActionInstance;

/// Upper bound on the assignments tried when resolving ambiguous
/// parameters.
const MAX_ASSIGNMENTS: usize = 256;

/// An action that makes progress toward the current target.
#[derive(Debug, Clone)]
pub(crate) struct PotentialNextAction<'a> {
    pub(crate) action_id: &'a ActionId,
    pub(crate) action: &'a Action,
    pub(crate) parameters: ParameterValues,
    /// The action itself produces the target, rather than enabling a chain
    /// that does.
    pub(crate) satisfy_objective: bool,
}

impl<'a> PotentialNextAction<'a> {
    pub(crate) fn new(action_id: &'a ActionId, action: &'a Action) -> Self {
        Self {
            action_id,
            action,
            parameters: action
                .parameters
                .iter()
                .map(|parameter| (parameter.clone(), BTreeSet::new()))
                .collect(),
            satisfy_objective: false,
        }
    }

    /// Filters values by type and picks one value per bound parameter: the
    /// first assignment, in order, under which the precondition holds.
    /// Typed parameters left unbound take the first entity of their type.
    pub(crate) fn finalize_parameters(&mut self, ctx: &SearchContext<'_>) -> bool {
        let ontology = ctx.domain.ontology();
        for (parameter, values) in self.parameters.iter_mut() {
            if values.is_empty() {
                if let Some(entity) = ontology.first_entity_of_type(parameter, ctx.entities) {
                    values.insert(entity);
                }
                continue;
            }
            values.retain(|entity| ontology.accepts(parameter, entity, ctx.entities));
            if values.is_empty() {
                return false;
            }
        }

        let punctual = BTreeSet::new();
        let chosen = assignments(&self.parameters)
            .into_iter()
            .take(MAX_ASSIGNMENTS)
            .find(|assignment| {
                self.action.precondition.as_ref().map_or(true, |precondition| {
                    precondition
                        .substitute(assignment)
                        .is_true(ctx.world, &punctual, None)
                })
            });
        let Some(chosen) = chosen else {
            return false;
        };
        for (parameter, values) in self.parameters.iter_mut() {
            if let Some(entity) = chosen.get(parameter) {
                *values = BTreeSet::from([entity.clone()]);
            }
        }
        true
    }

    /// Ranking between two candidates for the same target.
    ///
    /// In order: producing the target directly, not repeating actions that
    /// ask for it, prefer-in-context facts satisfied then unsatisfied, fewer
    /// executions in the session then in the global history, identifier.
    pub(crate) fn is_more_important_than(&self, other: &Self, ctx: &SearchContext<'_>) -> bool {
        if self.satisfy_objective != other.satisfy_objective {
            return self.satisfy_objective;
        }

        let done = ctx.historical.count(self.action_id);
        let other_done = ctx.historical.count(other.action_id);
        let avoid = self.action.high_importance_of_not_repeating_it;
        let other_avoid = other.action.high_importance_of_not_repeating_it;
        if avoid && other_avoid {
            if done != other_done {
                return done < other_done;
            }
        } else if avoid && done > 0 && other_done == 0 {
            return false;
        } else if other_avoid && other_done > 0 && done == 0 {
            return true;
        }

        let (satisfied, unsatisfied) = self.prefer_in_context_statistics(ctx.world);
        let (other_satisfied, other_unsatisfied) = other.prefer_in_context_statistics(ctx.world);
        if satisfied != other_satisfied {
            return satisfied > other_satisfied;
        }
        if unsatisfied != other_unsatisfied {
            return unsatisfied < other_unsatisfied;
        }

        if done != other_done {
            return done < other_done;
        }
        if let Some(global) = ctx.global_historical {
            let global_done = global.count(self.action_id);
            let other_global_done = global.count(other.action_id);
            if global_done != other_global_done {
                return global_done < other_global_done;
            }
        }
        self.action_id < other.action_id
    }

    // Leaves of the prefer-in-context condition that hold / do not hold.
    fn prefer_in_context_statistics(&self, world: &WorldState) -> (usize, usize) {
        let Some(prefer) = &self.action.prefer_in_context else {
            return (0, 0);
        };
        let mut satisfied = 0;
        let mut unsatisfied = 0;
        let _ = prefer.walk(
            Some(world),
            &mut OnFact(|leaf: &FactOptional| {
                let bound = FactOptional::new(leaf.fact.substitute_values(&self.parameters), leaf.negated);
                if world.is_fact_pattern_satisfied(&bound, &self.parameters) {
                    satisfied += 1;
                } else {
                    unsatisfied += 1;
                }
                ControlFlow::Continue(())
            }),
        );
        (satisfied, unsatisfied)
    }

    pub(crate) fn to_instance(&self) -> ActionInstance {
        let parameters = self
            .parameters
            .iter()
            .filter_map(|(parameter, values)| {
                values
                    .first()
                    .map(|entity| (parameter.clone(), entity.clone()))
            })
            .collect();
        ActionInstance {
            action_id: self.action_id.clone(),
            parameters,
        }
    }
}
