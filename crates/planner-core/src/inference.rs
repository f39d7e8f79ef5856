use std::collections::{BTreeMap, BTreeSet};
use std::ops::ControlFlow;

use serde::{Deserialize, Serialize};

use crate::{Condition, Effect, FactOptional, OnFact, Parameter, SuccessorCache};

pub type InferenceId = String;
pub type SetOfInferencesId = String;

/// A rule applied automatically whenever its condition becomes true.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inference {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
    pub condition: Condition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facts_to_modify: Option<Effect>,
    #[serde(skip)]
    pub(crate) successors: SuccessorCache,
}

impl PartialEq for Inference {
    fn eq(&self, other: &Self) -> bool {
        self.parameters == other.parameters
            && self.condition == other.condition
            && self.facts_to_modify == other.facts_to_modify
    }
}

impl Inference {
    pub fn new(condition: Condition, facts_to_modify: Effect) -> Self {
        Self {
            parameters: Vec::new(),
            condition,
            facts_to_modify: Some(facts_to_modify),
            successors: SuccessorCache::default(),
        }
    }

    pub fn with_parameters(mut self, parameters: Vec<Parameter>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn successors(&self) -> &SuccessorCache {
        &self.successors
    }
}

/// Named inferences indexed by the fact names their conditions read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<InferenceId, Inference>", into = "BTreeMap<InferenceId, Inference>")]
pub struct SetOfInferences {
    inferences: BTreeMap<InferenceId, Inference>,
    condition_to_inferences: BTreeMap<String, BTreeSet<InferenceId>>,
    not_condition_to_inferences: BTreeMap<String, BTreeSet<InferenceId>>,
}

impl From<BTreeMap<InferenceId, Inference>> for SetOfInferences {
    fn from(inferences: BTreeMap<InferenceId, Inference>) -> Self {
        let mut set = Self::default();
        for (id, inference) in inferences {
            set.add_inference(id, inference);
        }
        set
    }
}

impl From<SetOfInferences> for BTreeMap<InferenceId, Inference> {
    fn from(set: SetOfInferences) -> Self {
        set.inferences
    }
}

impl SetOfInferences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an inference.
    pub fn add_inference(&mut self, id: impl Into<InferenceId>, inference: Inference) {
        let id = id.into();
        self.remove_inference(&id);
        let _ = inference.condition.walk(
            None,
            &mut OnFact(|leaf: &FactOptional| {
                let index = if leaf.negated {
                    &mut self.not_condition_to_inferences
                } else {
                    &mut self.condition_to_inferences
                };
                index
                    .entry(leaf.fact.name.clone())
                    .or_default()
                    .insert(id.clone());
                ControlFlow::Continue(())
            }),
        );
        self.inferences.insert(id, inference);
    }

    pub fn remove_inference(&mut self, id: &str) -> Option<Inference> {
        let removed = self.inferences.remove(id)?;
        for index in [
            &mut self.condition_to_inferences,
            &mut self.not_condition_to_inferences,
        ] {
            for ids in index.values_mut() {
                ids.remove(id);
            }
            index.retain(|_, ids| !ids.is_empty());
        }
        Some(removed)
    }

    pub fn inferences(&self) -> &BTreeMap<InferenceId, Inference> {
        &self.inferences
    }

    pub(crate) fn inference_mut(&mut self, id: &str) -> Option<&mut Inference> {
        self.inferences.get_mut(id)
    }

    pub fn inference(&self, id: &str) -> Option<&Inference> {
        self.inferences.get(id)
    }

    pub fn condition_to_inferences(&self) -> &BTreeMap<String, BTreeSet<InferenceId>> {
        &self.condition_to_inferences
    }

    pub fn not_condition_to_inferences(&self) -> &BTreeMap<String, BTreeSet<InferenceId>> {
        &self.not_condition_to_inferences
    }

    pub fn is_empty(&self) -> bool {
        self.inferences.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexes_follow_additions_and_removals() {
        let mut set = SetOfInferences::new();
        set.add_inference(
            "wake",
            Inference::new("alarm(on) & !awake(me)".parse().unwrap(), Effect::add("awake(me)").unwrap()),
        );
        assert!(set.condition_to_inferences()["alarm"].contains("wake"));
        assert!(set.not_condition_to_inferences()["awake"].contains("wake"));

        assert!(set.remove_inference("wake").is_some());
        assert!(set.condition_to_inferences().is_empty());
        assert!(set.not_condition_to_inferences().is_empty());
    }
}
