//! The set of facts currently true, plus what could become true.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::ControlFlow;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::fact::{assignments, facts_named, narrow};
use crate::{
    Assignment, Condition, Domain, Effect, Entity, Fact, FactOptional, OnFact, Parameter,
    ParameterValues, Succession, Term,
};

/// Bound on inference cascades triggered by one modification.
const MAX_INFERENCE_ROUNDS: usize = 100;

/// Above this many combinations, a fact is recorded as reachable with any
/// value instead of being grounded.
const MAX_GROUNDINGS: usize = 64;

/// Facts, named variables and the lazily computed reachability closure.
///
/// The closure is recomputed by [`WorldState::refresh_reachability`] after
/// any mutation that could make it wrong, or when the domain changed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "WorldStateData", into = "WorldStateData")]
pub struct WorldState {
    facts: BTreeSet<Fact>,
    variables: BTreeMap<String, String>,
    fact_name_counts: BTreeMap<String, usize>,
    reachability: Reachability,
}

#[derive(Serialize, Deserialize)]
struct WorldStateData {
    #[serde(default)]
    facts: BTreeSet<Fact>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    variables: BTreeMap<String, String>,
}

impl From<WorldStateData> for WorldState {
    fn from(data: WorldStateData) -> Self {
        let mut world = WorldState::from_facts(data.facts);
        world.variables = data.variables;
        world
    }
}

impl From<WorldState> for WorldStateData {
    fn from(world: WorldState) -> Self {
        Self {
            facts: world.facts,
            variables: world.variables,
        }
    }
}

impl PartialEq for WorldState {
    fn eq(&self, other: &Self) -> bool {
        self.facts == other.facts && self.variables == other.variables
    }
}

impl Eq for WorldState {}

#[derive(Debug, Clone)]
struct Reachability {
    stale: bool,
    generation: u64,
    reachable: BTreeSet<Fact>,
    any_value: BTreeSet<Fact>,
    removable: BTreeSet<Fact>,
}

impl Default for Reachability {
    fn default() -> Self {
        Self {
            stale: true,
            generation: 0,
            reachable: BTreeSet::new(),
            any_value: BTreeSet::new(),
            removable: BTreeSet::new(),
        }
    }
}

/// Changes gathered from an effect before any of them is applied.
#[derive(Debug, Default)]
pub(crate) struct PendingChanges {
    pub(crate) add: Vec<Fact>,
    pub(crate) remove: Vec<Fact>,
    pub(crate) assign: Vec<(Fact, Entity)>,
    pub(crate) unassign: Vec<Fact>,
    pub(crate) increment: Vec<(Fact, i64)>,
    pub(crate) expressions: Vec<crate::Expression>,
    pub(crate) punctual: BTreeSet<Fact>,
}

#[derive(Debug, Default)]
struct Outcome {
    changed: BTreeSet<String>,
    punctual: BTreeSet<Fact>,
    variables_changed: bool,
}

impl Outcome {
    fn modified(&self) -> bool {
        !self.changed.is_empty() || self.variables_changed
    }
}

impl WorldState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_facts(facts: impl IntoIterator<Item = Fact>) -> Self {
        let mut world = Self::default();
        world.add_facts(facts);
        world
    }

    pub fn facts(&self) -> &BTreeSet<Fact> {
        &self.facts
    }

    pub fn contains(&self, fact: &Fact) -> bool {
        self.facts.contains(fact)
    }

    pub fn facts_named<'s, 'n>(&'s self, name: &'n str) -> impl Iterator<Item = &'s Fact> + use<'s, 'n> {
        facts_named(&self.facts, name)
    }

    /// Names of the facts present, each once.
    pub fn fact_names(&self) -> impl Iterator<Item = &str> {
        self.fact_name_counts.keys().map(String::as_str)
    }

    pub fn variables(&self) -> &BTreeMap<String, String> {
        &self.variables
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(name.into(), value.into());
    }

    /// Current fluent value of the fact with the same name and arguments.
    pub fn fluent_of(&self, fact: &Fact) -> Option<&Term> {
        self.facts_named(&fact.name)
            .find(|stored| stored.same_key(fact) && stored.fluent.is_some())
            .and_then(|stored| stored.fluent.as_ref())
    }

    /// Whether a fact matching `pattern` is present (absent when negated).
    pub fn is_fact_pattern_satisfied(&self, pattern: &FactOptional, parameters: &ParameterValues) -> bool {
        let present = self
            .facts_named(&pattern.fact.name)
            .any(|fact| pattern.fact.match_against(fact, parameters).is_some());
        present != pattern.negated
    }

    pub fn is_optional_fact_satisfied(&self, fact: &FactOptional) -> bool {
        self.is_fact_pattern_satisfied(fact, &ParameterValues::new())
    }

    /// Adds facts without running inferences. Punctual facts are ignored.
    pub fn add_facts(&mut self, facts: impl IntoIterator<Item = Fact>) -> bool {
        let mut changed = false;
        for fact in facts {
            changed |= self.insert_fact(fact);
        }
        changed
    }

    pub fn remove_facts<'a>(&mut self, facts: impl IntoIterator<Item = &'a Fact>) -> bool {
        let mut changed = false;
        for fact in facts {
            changed |= self.erase_fact(fact);
        }
        changed
    }

    /// Replaces the whole fact set.
    pub fn set_facts(&mut self, facts: BTreeSet<Fact>) -> bool {
        let obsolete: Vec<Fact> = self.facts.difference(&facts).cloned().collect();
        let changed = self.remove_facts(&obsolete);
        self.add_facts(facts) || changed
    }

    fn insert_fact(&mut self, fact: Fact) -> bool {
        if fact.punctual {
            warn!(fact = %fact, "punctual facts are not stored");
            return false;
        }
        if self.facts.contains(&fact) {
            return false;
        }
        if !self.reachability.reachable.contains(&fact) {
            self.reachability.stale = true;
        }
        *self.fact_name_counts.entry(fact.name.clone()).or_default() += 1;
        self.facts.insert(fact);
        true
    }

    fn erase_fact(&mut self, fact: &Fact) -> bool {
        if !self.facts.remove(fact) {
            return false;
        }
        if let Some(count) = self.fact_name_counts.get_mut(&fact.name) {
            *count -= 1;
            if *count == 0 {
                self.fact_name_counts.remove(&fact.name);
            }
        }
        self.reachability.stale = true;
        true
    }

    fn erase_same_key(&mut self, fact: &Fact, outcome: &mut Outcome) {
        let stored: Vec<Fact> = self
            .facts_named(&fact.name)
            .filter(|stored| stored.same_key(fact))
            .cloned()
            .collect();
        for stored in stored {
            if self.erase_fact(&stored) {
                outcome.changed.insert(stored.name);
            }
        }
    }

    fn set_fluent(&mut self, fact: Fact, value: Entity, outcome: &mut Outcome) {
        let updated = fact.with_fluent(value);
        if self.contains(&updated) {
            return;
        }
        self.erase_same_key(&updated, outcome);
        let name = updated.name.clone();
        if self.insert_fact(updated) {
            outcome.changed.insert(name);
        }
    }

    // Removes, then fluent updates, then additions.
    fn commit(&mut self, changes: PendingChanges) -> Outcome {
        let mut outcome = Outcome {
            punctual: changes.punctual,
            ..Outcome::default()
        };

        for pattern in &changes.remove {
            let any_value = pattern.clone().with_fluent(Parameter::any());
            let matching: Vec<Fact> = self
                .facts_named(&pattern.name)
                .filter(|fact| {
                    pattern.unifiable_with(fact)
                        || (pattern.fluent.is_none() && any_value.unifiable_with(fact))
                })
                .cloned()
                .collect();
            for fact in matching {
                if self.erase_fact(&fact) {
                    outcome.changed.insert(fact.name);
                }
            }
        }

        for fact in &changes.unassign {
            self.erase_same_key(fact, &mut outcome);
        }

        for (fact, value) in changes.assign {
            self.set_fluent(fact, value, &mut outcome);
        }

        for (fact, by) in changes.increment {
            if !fact.is_ground() {
                warn!(fact = %fact, "cannot increment a fact with unbound parameters");
                continue;
            }
            let current = match self.fluent_of(&fact) {
                None => 0,
                Some(Term::Entity(entity)) => match entity.as_i64() {
                    Some(value) => value,
                    None => {
                        warn!(fact = %fact, value = %entity, "cannot increment a non-numeric fluent");
                        continue;
                    }
                },
                Some(Term::Parameter(_)) => continue,
            };
            let Some(next) = current.checked_add(by) else {
                warn!(fact = %fact, current, by, "fluent increment overflows, keeping the previous value");
                continue;
            };
            self.set_fluent(fact, Entity::new(next.to_string()), &mut outcome);
        }

        for fact in changes.add {
            let name = fact.name.clone();
            if self.insert_fact(fact) {
                outcome.changed.insert(name);
            }
        }

        for expression in &changes.expressions {
            outcome.variables_changed |= expression.apply(&mut self.variables);
        }
        outcome
    }

    /// Applies `effect` under `assignment`, then runs the inferences of
    /// `domain` triggered by the change. Returns whether anything changed.
    pub fn apply(&mut self, effect: &Effect, assignment: &Assignment, domain: &Domain) -> bool {
        let mut changes = PendingChanges::default();
        effect.collect(self, &BTreeSet::new(), assignment, &mut changes);
        let outcome = self.commit(changes);
        let modified = outcome.modified();
        self.run_inferences(domain, outcome) || modified
    }

    /// Applies a ground effect.
    pub fn modify(&mut self, effect: &Effect, domain: &Domain) -> bool {
        self.apply(effect, &Assignment::new(), domain)
    }

    fn run_inferences(&mut self, domain: &Domain, first: Outcome) -> bool {
        let mut modified = false;
        let mut fired: BTreeSet<(Succession, Assignment)> = BTreeSet::new();
        let mut changed = first.changed;
        let mut punctual = first.punctual;

        for _ in 0..MAX_INFERENCE_ROUNDS {
            if changed.is_empty() && punctual.is_empty() {
                return modified;
            }
            let mut triggers = changed.clone();
            triggers.extend(punctual.iter().map(|fact| fact.name.clone()));

            let mut next = Outcome::default();
            for (succession, inference) in domain.inferences_triggered_by(&triggers) {
                let Some(effect) = &inference.facts_to_modify else {
                    continue;
                };
                let candidates =
                    self.satisfying_assignments(&inference.parameters, &inference.condition, &punctual);
                for assignment in candidates {
                    if !fired.insert((succession.clone(), assignment.clone())) {
                        continue;
                    }
                    debug!(inference = %succession, "inference fired");
                    let mut changes = PendingChanges::default();
                    effect.collect(self, &punctual, &assignment, &mut changes);
                    let outcome = self.commit(changes);
                    modified |= outcome.modified();
                    next.changed.extend(outcome.changed);
                    next.punctual.extend(outcome.punctual);
                }
            }
            changed = next.changed;
            punctual = next.punctual;
        }
        if !changed.is_empty() || !punctual.is_empty() {
            warn!(rounds = MAX_INFERENCE_ROUNDS, "inference cascade stopped before a fixpoint");
        }
        modified
    }

    /// Assignments of `parameters` under which `condition` holds.
    pub fn satisfying_assignments(
        &self,
        parameters: &[Parameter],
        condition: &Condition,
        punctual: &BTreeSet<Fact>,
    ) -> Vec<Assignment> {
        let mut values: ParameterValues = parameters
            .iter()
            .map(|parameter| (parameter.clone(), BTreeSet::new()))
            .collect();
        if !condition.is_true(self, punctual, Some(&mut values)) {
            return Vec::new();
        }
        assignments(&values)
            .into_iter()
            .filter(|assignment| condition.substitute(assignment).is_true(self, punctual, None))
            .collect()
    }

    pub fn is_reachability_stale(&self, domain: &Domain) -> bool {
        self.reachability.stale || self.reachability.generation != domain.generation()
    }

    /// Recomputes the reachability closure if it is stale.
    ///
    /// Every action and inference whose condition may hold over the current
    /// and reachable facts contributes the facts its effects touch, until
    /// nothing grows. Only the successors of a rule that grew the closure
    /// are examined again.
    pub fn refresh_reachability(&mut self, domain: &Domain) {
        if !self.is_reachability_stale(domain) {
            return;
        }
        let mut builder = ClosureBuilder::new(&self.facts);
        let everything = domain.all_successions();
        let mut queue = everything.clone();
        let mut visits = 0usize;
        while let Some(next) = queue.pop_first() {
            visits += 1;
            let Some(rule) = domain.rule(&next) else {
                continue;
            };
            let Some(values) = builder.optimistic_bindings(rule.parameters, rule.condition) else {
                continue;
            };
            let mut grew = false;
            for effect in &rule.effects {
                grew |= builder.absorb(effect, &values);
            }
            if grew {
                match rule.successors.get(domain.generation()) {
                    Some(successors) => queue.extend(successors.iter().cloned()),
                    None => queue.extend(everything.iter().cloned()),
                }
            }
        }
        let ClosureBuilder {
            reachable,
            any_value,
            removable,
            ..
        } = builder;
        debug!(
            visits,
            reachable = reachable.len(),
            any_value = any_value.len(),
            removable = removable.len(),
            "reachability closure computed"
        );
        self.reachability = Reachability {
            stale: false,
            generation: domain.generation(),
            reachable,
            any_value,
            removable,
        };
    }

    pub fn reachable_facts(&self) -> &BTreeSet<Fact> {
        &self.reachability.reachable
    }

    pub fn reachable_facts_with_any_value(&self) -> &BTreeSet<Fact> {
        &self.reachability.any_value
    }

    pub fn removable_facts(&self) -> &BTreeSet<Fact> {
        &self.reachability.removable
    }

    /// Optimistic. Always true while the closure is stale.
    pub fn can_fact_become_true(&self, fact: &Fact) -> bool {
        if self.reachability.stale {
            return true;
        }
        let unifies = |set: &BTreeSet<Fact>| facts_named(set, &fact.name).any(|known| fact.unifiable_with(known));
        unifies(&self.facts) || unifies(&self.reachability.reachable) || unifies(&self.reachability.any_value)
    }

    /// Optimistic. Always true while the closure is stale.
    pub fn can_fact_become_false(&self, fact: &Fact) -> bool {
        if self.reachability.stale {
            return true;
        }
        let present = self.facts_named(&fact.name).any(|known| fact.unifiable_with(known));
        !present
            || facts_named(&self.reachability.removable, &fact.name)
                .any(|removable| fact.unifiable_with(removable))
    }
}

struct ClosureBuilder<'a> {
    facts: &'a BTreeSet<Fact>,
    reachable: BTreeSet<Fact>,
    any_value: BTreeSet<Fact>,
    removable: BTreeSet<Fact>,
}

impl<'a> ClosureBuilder<'a> {
    fn new(facts: &'a BTreeSet<Fact>) -> Self {
        Self {
            facts,
            reachable: BTreeSet::new(),
            any_value: BTreeSet::new(),
            removable: BTreeSet::new(),
        }
    }

    /// Parameter values under which `condition` may hold, if any.
    fn optimistic_bindings(
        &self,
        parameters: &[Parameter],
        condition: Option<&Condition>,
    ) -> Option<ParameterValues> {
        let mut values: ParameterValues = parameters
            .iter()
            .map(|parameter| (parameter.clone(), BTreeSet::new()))
            .collect();
        let Some(condition) = condition else {
            return Some(values);
        };
        let flow = condition.walk(
            None,
            &mut OnFact(|leaf: &FactOptional| {
                if self.may_hold(leaf, &mut values) {
                    ControlFlow::Continue(())
                } else {
                    ControlFlow::Break(())
                }
            }),
        );
        flow.is_continue().then_some(values)
    }

    fn may_hold(&self, leaf: &FactOptional, values: &mut ParameterValues) -> bool {
        let name = leaf.fact.name.as_str();
        if leaf.negated {
            let ground = leaf.fact.substitute_values(values);
            if !ground.is_ground() || !self.facts.contains(&ground) {
                return true;
            }
            return facts_named(&self.removable, name).any(|removable| ground.unifiable_with(removable));
        }

        if facts_named(&self.any_value, name).any(|pattern| leaf.fact.unifiable_with(pattern)) {
            return true;
        }
        let mut matched = false;
        let mut found = ParameterValues::new();
        for candidate in facts_named(self.facts, name).chain(facts_named(&self.reachable, name)) {
            if let Some(bindings) = leaf.fact.match_against(candidate, values) {
                matched = true;
                for (parameter, entity) in bindings {
                    found.entry(parameter).or_default().insert(entity);
                }
            }
        }
        if matched {
            narrow(values, found);
        }
        matched
    }

    fn absorb(&mut self, effect: &Effect, values: &ParameterValues) -> bool {
        let mut grew = false;
        let _ = effect.walk(&mut OnFact(|leaf: &FactOptional| {
            grew |= self.absorb_fact(leaf, values);
            ControlFlow::Continue(())
        }));
        grew
    }

    fn absorb_fact(&mut self, leaf: &FactOptional, values: &ParameterValues) -> bool {
        let mut grew = false;
        for fact in groundings(&leaf.fact, values) {
            if leaf.negated {
                grew |= self.removable.insert(fact);
                continue;
            }
            if fact.fluent.is_some() {
                grew |= self
                    .removable
                    .insert(fact.clone().with_fluent(Parameter::any()));
            }
            if !fact.is_ground() {
                grew |= self.any_value.insert(fact);
            } else if !self.facts.contains(&fact) {
                grew |= self.reachable.insert(fact);
            }
        }
        grew
    }
}

fn groundings(fact: &Fact, values: &ParameterValues) -> Vec<Fact> {
    let relevant: ParameterValues = fact
        .parameters()
        .filter_map(|parameter| {
            values
                .get(parameter)
                .filter(|candidates| !candidates.is_empty())
                .map(|candidates| (parameter.clone(), candidates.clone()))
        })
        .collect();
    let combinations = relevant
        .values()
        .map(BTreeSet::len)
        .fold(1usize, usize::saturating_mul);
    if combinations > MAX_GROUNDINGS {
        return vec![fact.clone()];
    }
    assignments(&relevant)
        .iter()
        .map(|assignment| fact.substitute(assignment))
        .collect()
}
