use std::collections::BTreeSet;
use std::fmt;

use crate::{ActionId, InferenceId, SetOfInferencesId};

/// Something whose precondition an effect may influence.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Succession {
    Action(ActionId),
    Inference {
        set: SetOfInferencesId,
        inference: InferenceId,
    },
}

impl fmt::Display for Succession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Succession::Action(id) => write!(f, "action: {id}"),
            Succession::Inference { set, inference } => write!(f, "inference: {set}|{inference}"),
        }
    }
}

/// Successors of one effect, valid for a single domain generation.
///
/// `not_successors` lists the rules that read a fact the effect touches but
/// whose condition can never be unified with it.
#[derive(Debug, Clone, Default)]
pub struct SuccessorCache {
    generation: Option<u64>,
    pub successors: BTreeSet<Succession>,
    pub not_successors: BTreeSet<Succession>,
}

impl SuccessorCache {
    pub(crate) fn new(
        generation: u64,
        successors: BTreeSet<Succession>,
        mut not_successors: BTreeSet<Succession>,
    ) -> Self {
        not_successors.retain(|succession| !successors.contains(succession));
        Self {
            generation: Some(generation),
            successors,
            not_successors,
        }
    }

    /// Successors, or `None` when the cache was built for another generation.
    pub fn get(&self, generation: u64) -> Option<&BTreeSet<Succession>> {
        (self.generation == Some(generation)).then_some(&self.successors)
    }

    pub fn is_empty(&self) -> bool {
        self.successors.is_empty() && self.not_successors.is_empty()
    }

    pub(crate) fn print(&self, out: &mut String) {
        for succession in &self.successors {
            out.push_str("  ");
            out.push_str(&succession.to_string());
            out.push('\n');
        }
        for succession in &self.not_successors {
            out.push_str("  not ");
            out.push_str(&succession.to_string());
            out.push('\n');
        }
    }
}
