//! The action catalog, its inference sets and the indexes the planner walks.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::action::check_arity;
use crate::fact::Undeclared;
use crate::{
    Action, ActionId, Condition, Effect, FactOptional, Inference, OnFact, Ontology, Parameter,
    ParameterValues, PlannerError, Result, SetOfInferences, SetOfInferencesId, Succession,
    SuccessorCache,
};

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

fn next_generation() -> u64 {
    NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
}

const CONSTRUCTOR_INFERENCES: &str = "soi_from_constructor";

/// The parts of an action or inference the reachability closure needs.
pub struct Rule<'a> {
    pub parameters: &'a [Parameter],
    pub condition: Option<&'a Condition>,
    pub effects: Vec<&'a Effect>,
    pub successors: &'a SuccessorCache,
}

/// Actions and inferences available to the planner.
///
/// Every change to the catalog rebuilds the indexes and successor caches and
/// moves the domain to a new generation, which invalidates the reachability
/// closures computed against the previous one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "DomainData", into = "DomainData")]
pub struct Domain {
    name: String,
    generation: u64,
    ontology: Ontology,
    actions: BTreeMap<ActionId, Action>,
    set_of_inferences: BTreeMap<SetOfInferencesId, SetOfInferences>,
    precondition_to_actions: BTreeMap<String, BTreeSet<ActionId>>,
    not_precondition_to_actions: BTreeMap<String, BTreeSet<ActionId>>,
    actions_without_fact_to_add_in_precondition: BTreeSet<ActionId>,
}

#[derive(Serialize, Deserialize)]
struct DomainData {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    name: String,
    #[serde(default)]
    ontology: Ontology,
    #[serde(default)]
    actions: BTreeMap<ActionId, Action>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    inferences: BTreeMap<SetOfInferencesId, SetOfInferences>,
}

impl TryFrom<DomainData> for Domain {
    type Error = PlannerError;

    fn try_from(data: DomainData) -> Result<Self> {
        let mut domain = Domain::empty(data.name, data.ontology);
        for (id, action) in data.actions {
            domain.insert_action(id, action)?;
        }
        for (id, set) in data.inferences {
            domain.validate_inferences(&set)?;
            domain.set_of_inferences.insert(id, set);
        }
        domain.rebuild();
        Ok(domain)
    }
}

impl From<Domain> for DomainData {
    fn from(domain: Domain) -> Self {
        Self {
            name: domain.name,
            ontology: domain.ontology,
            actions: domain.actions,
            inferences: domain.set_of_inferences,
        }
    }
}

impl PartialEq for Domain {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.ontology == other.ontology
            && self.actions == other.actions
            && self.set_of_inferences == other.set_of_inferences
    }
}

impl Default for Domain {
    fn default() -> Self {
        Self::empty(String::new(), Ontology::default())
    }
}

impl Domain {
    pub fn new(
        actions: BTreeMap<ActionId, Action>,
        ontology: Ontology,
        inferences: SetOfInferences,
    ) -> Result<Self> {
        let mut domain = Self::empty(String::new(), ontology);
        for (id, action) in actions {
            domain.insert_action(id, action)?;
        }
        if !inferences.is_empty() {
            domain.validate_inferences(&inferences)?;
            domain
                .set_of_inferences
                .insert(CONSTRUCTOR_INFERENCES.to_owned(), inferences);
        }
        domain.rebuild();
        Ok(domain)
    }

    fn empty(name: String, ontology: Ontology) -> Self {
        Self {
            name,
            generation: next_generation(),
            ontology,
            actions: BTreeMap::new(),
            set_of_inferences: BTreeMap::new(),
            precondition_to_actions: BTreeMap::new(),
            not_precondition_to_actions: BTreeMap::new(),
            actions_without_fact_to_add_in_precondition: BTreeSet::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Version token, different after every catalog change.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn ontology(&self) -> &Ontology {
        &self.ontology
    }

    pub fn actions(&self) -> &BTreeMap<ActionId, Action> {
        &self.actions
    }

    pub fn action(&self, id: &str) -> Option<&Action> {
        self.actions.get(id)
    }

    pub fn set_of_inferences(&self) -> &BTreeMap<SetOfInferencesId, SetOfInferences> {
        &self.set_of_inferences
    }

    pub fn precondition_to_actions(&self) -> &BTreeMap<String, BTreeSet<ActionId>> {
        &self.precondition_to_actions
    }

    pub fn not_precondition_to_actions(&self) -> &BTreeMap<String, BTreeSet<ActionId>> {
        &self.not_precondition_to_actions
    }

    pub fn actions_without_fact_to_add_in_precondition(&self) -> &BTreeSet<ActionId> {
        &self.actions_without_fact_to_add_in_precondition
    }

    pub fn add_action(&mut self, id: impl Into<ActionId>, action: Action) -> Result<()> {
        self.insert_action(id.into(), action)?;
        self.rebuild();
        Ok(())
    }

    pub fn remove_action(&mut self, id: &str) -> Option<Action> {
        let removed = self.actions.remove(id)?;
        self.rebuild();
        Some(removed)
    }

    /// Adds a set of inferences under `id`, or under `id_2`, `id_3`... when
    /// the id is taken. Returns the id used.
    pub fn add_set_of_inferences(
        &mut self,
        set: SetOfInferences,
        id: &str,
    ) -> Result<SetOfInferencesId> {
        self.validate_inferences(&set)?;
        let mut unique = id.to_owned();
        let mut suffix = 2;
        while self.set_of_inferences.contains_key(&unique) {
            unique = format!("{id}_{suffix}");
            suffix += 1;
        }
        self.set_of_inferences.insert(unique.clone(), set);
        self.rebuild();
        Ok(unique)
    }

    pub fn remove_set_of_inferences(&mut self, id: &str) -> bool {
        let removed = self.set_of_inferences.remove(id).is_some();
        if removed {
            self.rebuild();
        }
        removed
    }

    pub fn clear_inferences(&mut self) {
        if !self.set_of_inferences.is_empty() {
            self.set_of_inferences.clear();
            self.rebuild();
        }
    }

    fn insert_action(&mut self, id: ActionId, action: Action) -> Result<()> {
        if self.actions.contains_key(&id) {
            return Err(PlannerError::ActionAlreadyExists(id));
        }
        action.validate(&id, &self.ontology)?;
        self.actions.insert(id, action);
        Ok(())
    }

    fn validate_inferences(&self, set: &SetOfInferences) -> Result<()> {
        for (id, inference) in set.inferences() {
            let undeclared = inference
                .condition
                .find_undeclared(&inference.parameters)
                .or_else(|| {
                    inference
                        .facts_to_modify
                        .as_ref()
                        .and_then(|effect| effect.find_undeclared(&inference.parameters))
                });
            match undeclared {
                Some(Undeclared::Argument(parameter)) => {
                    return Err(PlannerError::UndeclaredParameter {
                        action: id.clone(),
                        parameter: parameter.name,
                    })
                }
                Some(Undeclared::Fluent(parameter)) => {
                    return Err(PlannerError::UndeclaredFluentParameter {
                        action: id.clone(),
                        parameter: parameter.name,
                    })
                }
                None => {}
            }
            for leaf in inference.condition.facts() {
                check_arity(&leaf.fact, &self.ontology)?;
            }
        }
        Ok(())
    }

    fn rebuild(&mut self) {
        self.generation = next_generation();
        self.precondition_to_actions.clear();
        self.not_precondition_to_actions.clear();
        self.actions_without_fact_to_add_in_precondition.clear();

        for (id, action) in &self.actions {
            if !action.effect.can_do_something(action.precondition.as_ref()) {
                debug!(action = %id, "action cannot change anything, not indexed");
                continue;
            }
            let mut has_positive_fact = false;
            if let Some(precondition) = &action.precondition {
                for leaf in precondition.facts() {
                    let index = if leaf.negated {
                        &mut self.not_precondition_to_actions
                    } else {
                        has_positive_fact = true;
                        &mut self.precondition_to_actions
                    };
                    index.entry(leaf.fact.name).or_default().insert(id.clone());
                }
            }
            if !has_positive_fact {
                self.actions_without_fact_to_add_in_precondition
                    .insert(id.clone());
            }
        }
        self.update_successions();
        debug!(
            generation = self.generation,
            actions = self.actions.len(),
            inference_sets = self.set_of_inferences.len(),
            "domain indexes rebuilt"
        );
    }

    fn update_successions(&mut self) {
        let action_caches: Vec<(ActionId, SuccessorCache)> = self
            .actions
            .iter()
            .map(|(id, action)| (id.clone(), self.successor_cache_for(action.effect.effects())))
            .collect();
        for (id, cache) in action_caches {
            if let Some(action) = self.actions.get_mut(&id) {
                action.effect.successors = cache;
            }
        }

        let inference_caches: Vec<(SetOfInferencesId, String, SuccessorCache)> = self
            .set_of_inferences
            .iter()
            .flat_map(|(set_id, set)| {
                set.inferences().iter().map(move |(id, inference)| {
                    (set_id.clone(), id.clone(), inference.facts_to_modify.iter())
                })
            })
            .map(|(set_id, id, effects)| {
                let cache = self.successor_cache_for(effects);
                (set_id, id, cache)
            })
            .collect();
        for (set_id, id, cache) in inference_caches {
            if let Some(inference) = self
                .set_of_inferences
                .get_mut(&set_id)
                .and_then(|set| set.inference_mut(&id))
            {
                inference.successors = cache;
            }
        }
    }

    fn successor_cache_for<'a>(&self, effects: impl Iterator<Item = &'a Effect>) -> SuccessorCache {
        let mut successors = BTreeSet::new();
        let mut not_successors = BTreeSet::new();
        for effect in effects {
            let _ = effect.walk(&mut OnFact(|produced: &FactOptional| {
                self.classify_readers(produced, &mut successors, &mut not_successors);
                ControlFlow::Continue(())
            }));
        }
        SuccessorCache::new(self.generation, successors, not_successors)
    }

    // Sorts the rules reading `produced` into those it can influence and
    // those it never can.
    fn classify_readers(
        &self,
        produced: &FactOptional,
        successors: &mut BTreeSet<Succession>,
        not_successors: &mut BTreeSet<Succession>,
    ) {
        let action_index = if produced.negated {
            &self.not_precondition_to_actions
        } else {
            &self.precondition_to_actions
        };
        for id in action_index.get(&produced.fact.name).into_iter().flatten() {
            let Some(precondition) = self.actions.get(id).and_then(|a| a.precondition.as_ref()) else {
                continue;
            };
            let succession = Succession::Action(id.clone());
            if precondition.contains_fact_opt(produced, &mut ParameterValues::new()) {
                successors.insert(succession);
            } else {
                not_successors.insert(succession);
            }
        }

        for (set_id, set) in &self.set_of_inferences {
            let index = if produced.negated {
                set.not_condition_to_inferences()
            } else {
                set.condition_to_inferences()
            };
            for id in index.get(&produced.fact.name).into_iter().flatten() {
                let Some(inference) = set.inference(id) else {
                    continue;
                };
                let succession = Succession::Inference {
                    set: set_id.clone(),
                    inference: id.clone(),
                };
                if inference
                    .condition
                    .contains_fact_opt(produced, &mut ParameterValues::new())
                {
                    successors.insert(succession);
                } else {
                    not_successors.insert(succession);
                }
            }
        }
    }

    /// Every indexed action and every inference.
    pub fn all_successions(&self) -> BTreeSet<Succession> {
        let indexed: BTreeSet<&ActionId> = self
            .precondition_to_actions
            .values()
            .chain(self.not_precondition_to_actions.values())
            .flatten()
            .chain(self.actions_without_fact_to_add_in_precondition.iter())
            .collect();
        let actions = indexed
            .into_iter()
            .map(|id| Succession::Action(id.clone()));
        let inferences = self.set_of_inferences.iter().flat_map(|(set_id, set)| {
            set.inferences().keys().map(move |id| Succession::Inference {
                set: set_id.clone(),
                inference: id.clone(),
            })
        });
        actions.chain(inferences).collect()
    }

    pub fn rule(&self, succession: &Succession) -> Option<Rule<'_>> {
        match succession {
            Succession::Action(id) => {
                let action = self.actions.get(id)?;
                Some(Rule {
                    parameters: &action.parameters,
                    condition: action.precondition.as_ref(),
                    effects: action.effect.effects().collect(),
                    successors: &action.effect.successors,
                })
            }
            Succession::Inference { set, inference } => {
                let inference = self.set_of_inferences.get(set)?.inference(inference)?;
                Some(Rule {
                    parameters: &inference.parameters,
                    condition: Some(&inference.condition),
                    effects: inference.facts_to_modify.iter().collect(),
                    successors: &inference.successors,
                })
            }
        }
    }

    /// Inferences whose condition reads one of `fact_names`, in order.
    pub fn inferences_triggered_by(
        &self,
        fact_names: &BTreeSet<String>,
    ) -> Vec<(Succession, &Inference)> {
        let mut triggered = BTreeMap::new();
        for (set_id, set) in &self.set_of_inferences {
            for index in [set.condition_to_inferences(), set.not_condition_to_inferences()] {
                for name in fact_names {
                    for id in index.get(name).into_iter().flatten() {
                        if let Some(inference) = set.inference(id) {
                            let succession = Succession::Inference {
                                set: set_id.clone(),
                                inference: id.clone(),
                            };
                            triggered.insert(succession, inference);
                        }
                    }
                }
            }
        }
        triggered.into_iter().collect()
    }

    /// Human-readable dump of every successor cache.
    pub fn print_successions(&self) -> String {
        let mut out = String::new();
        for (id, action) in &self.actions {
            if action.effect.successors.is_empty() {
                continue;
            }
            let _ = writeln!(out, "action: {id}");
            action.effect.successors.print(&mut out);
            out.push('\n');
        }
        for (set_id, set) in &self.set_of_inferences {
            for (id, inference) in set.inferences() {
                if inference.successors.is_empty() {
                    continue;
                }
                let _ = writeln!(out, "inference: {set_id}|{id}");
                inference.successors.print(&mut out);
                out.push('\n');
            }
        }
        out
    }
}
