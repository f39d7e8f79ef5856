//! Does an action make progress toward the target fact, directly or through
//! the actions and inferences it enables?

use std::collections::{BTreeMap, BTreeSet};
use std::ops::ControlFlow;

use planner_core::{
    ActionId, Condition, Domain, Effect, Fact, FactOptional, Historical, OnFact, Parameter,
    ParameterValues, SetOfEntities, Term, WorldState,
};
use tracing::debug;

use crate::facts_already_checked::FactsAlreadyChecked;
use crate::potential_action::PotentialNextAction;

/// Outcome of chasing one fact through the rules that read it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum PossibleEffect {
    NotSatisfied,
    SatisfiedButDoesNotModifyTheWorld,
    Satisfied,
}

impl PossibleEffect {
    fn merge(self, other: Self) -> Self {
        self.max(other)
    }
}

/// Everything the search reads, borrowed for one goal.
pub(crate) struct SearchContext<'a> {
    pub(crate) world: &'a WorldState,
    pub(crate) historical: &'a Historical,
    pub(crate) entities: &'a SetOfEntities,
    pub(crate) domain: &'a Domain,
    pub(crate) global_historical: Option<&'a Historical>,
    pub(crate) target: &'a FactOptional,
}

impl<'a> SearchContext<'a> {
    /// The most important action that makes progress toward the target.
    pub(crate) fn best_action(&self) -> Option<PotentialNextAction<'a>> {
        let mut candidates: BTreeSet<&'a ActionId> = BTreeSet::new();
        for name in self.world.fact_names() {
            if let Some(ids) = self.domain.precondition_to_actions().get(name) {
                candidates.extend(ids);
            }
        }
        candidates.extend(self.domain.actions_without_fact_to_add_in_precondition());

        let punctual = BTreeSet::new();
        let mut best: Option<PotentialNextAction<'a>> = None;
        for (id, action) in candidates
            .into_iter()
            .filter_map(|id| self.domain.action(id).map(|action| (id, action)))
        {
            let mut candidate = PotentialNextAction::new(id, action);
            let effects: Vec<&Effect> = action.effect.effects().collect();
            let mut checked = FactsAlreadyChecked::default();
            if !self.look_for_a_possible_effect(
                &mut candidate.satisfy_objective,
                &mut candidate.parameters,
                &effects,
                &mut checked,
            ) {
                continue;
            }
            if let Some(precondition) = &action.precondition {
                if !precondition.is_true(self.world, &punctual, Some(&mut candidate.parameters)) {
                    continue;
                }
            }
            if !candidate.finalize_parameters(self) {
                debug!(action = %id, "no parameter values satisfy the precondition");
                continue;
            }
            let better = match &best {
                Some(current) => candidate.is_more_important_than(current, self),
                None => true,
            };
            if better {
                best = Some(candidate);
            }
        }
        best
    }

    /// Whether `effects` bring the target about, directly or by enabling
    /// other rules. Narrows `parameters` to the values that do.
    pub(crate) fn look_for_a_possible_effect(
        &self,
        satisfy_objective: &mut bool,
        parameters: &mut ParameterValues,
        effects: &[&Effect],
        checked: &mut FactsAlreadyChecked,
    ) -> bool {
        for effect in effects {
            if self.produces_target(effect, parameters) {
                *satisfy_objective = true;
                return true;
            }
        }

        for removed in [false, true] {
            for effect in effects {
                let (added, retracted) = effect.produced_facts();
                let facts = if removed { retracted } else { added };
                for fact in facts {
                    if parameters.is_empty() && self.world.contains(&fact) != removed {
                        continue;
                    }
                    if checked.contains(&fact, removed) {
                        continue;
                    }
                    let mut branch = checked.clone();
                    branch.insert(fact.clone(), removed);

                    let mut possible = self.chase_through_actions(&fact, removed, parameters, &mut branch);
                    if possible != PossibleEffect::Satisfied {
                        possible = possible
                            .merge(self.chase_through_inferences(&fact, removed, parameters, &mut branch));
                    }
                    if possible != PossibleEffect::SatisfiedButDoesNotModifyTheWorld {
                        *checked = branch;
                    }
                    if possible == PossibleEffect::Satisfied {
                        return true;
                    }
                }
            }
        }
        false
    }

    // Direct unification of an effect fact with the target.
    fn produces_target(&self, effect: &Effect, parameters: &mut ParameterValues) -> bool {
        let (added, removed) = effect.produced_facts();
        let facts = if self.target.negated { removed } else { added };
        for fact in facts {
            if let Some(bindings) = fact.match_against(&self.target.fact, parameters) {
                for (parameter, entity) in bindings {
                    parameters.insert(parameter, BTreeSet::from([entity]));
                }
                return true;
            }
        }
        false
    }

    fn chase_through_actions(
        &self,
        fact: &Fact,
        removed: bool,
        parent: &mut ParameterValues,
        checked: &mut FactsAlreadyChecked,
    ) -> PossibleEffect {
        let index = if removed {
            self.domain.not_precondition_to_actions()
        } else {
            self.domain.precondition_to_actions()
        };
        let mut result = PossibleEffect::NotSatisfied;
        for id in index.get(&fact.name).into_iter().flatten() {
            let Some(action) = self.domain.action(id) else {
                continue;
            };
            let effects: Vec<&Effect> = action.effect.effects().collect();
            result = result.merge(self.deduce(
                &action.parameters,
                action.precondition.as_ref(),
                &effects,
                fact,
                removed,
                parent,
                checked,
            ));
            if result == PossibleEffect::Satisfied {
                break;
            }
        }
        result
    }

    fn chase_through_inferences(
        &self,
        fact: &Fact,
        removed: bool,
        parent: &mut ParameterValues,
        checked: &mut FactsAlreadyChecked,
    ) -> PossibleEffect {
        let mut result = PossibleEffect::NotSatisfied;
        for set in self.domain.set_of_inferences().values() {
            let index = if removed {
                set.not_condition_to_inferences()
            } else {
                set.condition_to_inferences()
            };
            for id in index.get(&fact.name).into_iter().flatten() {
                let Some(inference) = set.inference(id) else {
                    continue;
                };
                let effects: Vec<&Effect> = inference.facts_to_modify.iter().collect();
                result = result.merge(self.deduce(
                    &inference.parameters,
                    Some(&inference.condition),
                    &effects,
                    fact,
                    removed,
                    parent,
                    checked,
                ));
                if result == PossibleEffect::Satisfied {
                    return result;
                }
            }
        }
        result
    }

    /// Can the rule reading `fact` lead to the target?
    ///
    /// Parent parameter values are only committed when it can and the
    /// chased fact does not already hold.
    #[allow(clippy::too_many_arguments)]
    fn deduce(
        &self,
        parameters: &[Parameter],
        condition: Option<&Condition>,
        effects: &[&Effect],
        fact: &Fact,
        removed: bool,
        parent: &mut ParameterValues,
        checked: &mut FactsAlreadyChecked,
    ) -> PossibleEffect {
        let pattern = FactOptional::new(fact.clone(), removed);
        let mut candidate_parent = parent.clone();
        if let Some(condition) = condition {
            if !condition.contains_fact_opt(&pattern, &mut candidate_parent)
                || !condition.can_become_true(self.world)
            {
                return PossibleEffect::NotSatisfied;
            }
        }

        let mut own: ParameterValues = parameters
            .iter()
            .map(|parameter| (parameter.clone(), BTreeSet::new()))
            .collect();
        let mut satisfy_objective = false;
        if !self.look_for_a_possible_effect(&mut satisfy_objective, &mut own, effects, checked) {
            return PossibleEffect::NotSatisfied;
        }

        if let Some(condition) = condition {
            fill_from_condition(&mut candidate_parent, condition, fact, &own);
        }

        if self.world.is_fact_pattern_satisfied(&pattern, &candidate_parent) {
            return PossibleEffect::SatisfiedButDoesNotModifyTheWorld;
        }
        *parent = candidate_parent;
        PossibleEffect::Satisfied
    }
}

// Gives still-unbound parent parameters the values the reading condition
// uses at the same position, resolving its own parameters through `own`.
fn fill_from_condition(
    parent: &mut ParameterValues,
    condition: &Condition,
    fact: &Fact,
    own: &ParameterValues,
) {
    let unbound: Vec<Parameter> = parent
        .iter()
        .filter(|(_, values)| values.is_empty())
        .map(|(parameter, _)| parameter.clone())
        .collect();
    let mut found: BTreeMap<Parameter, BTreeSet<planner_core::Entity>> = BTreeMap::new();
    for parameter in unbound {
        let mut values = BTreeSet::new();
        let _ = condition.walk(
            None,
            &mut OnFact(|leaf: &FactOptional| {
                match fact.extract_parameter_value(&parameter, &leaf.fact) {
                    Some(Term::Entity(entity)) => {
                        values.insert(entity.clone());
                    }
                    Some(Term::Parameter(inner)) => {
                        if let Some(candidates) = own.get(inner) {
                            values.extend(candidates.iter().cloned());
                        }
                    }
                    None => {}
                }
                if values.is_empty() {
                    ControlFlow::Continue(())
                } else {
                    ControlFlow::Break(())
                }
            }),
        );
        if !values.is_empty() {
            found.insert(parameter, values);
        }
    }
    parent.extend(found);
}
