use std::collections::BTreeSet;

use planner_core::Fact;

/// Facts already chased while looking for an action's possible effect.
///
/// Each branch of the search works on its own copy, so a fact explored in
/// one branch may still be explored in a sibling.
#[derive(Debug, Clone, Default)]
pub(crate) struct FactsAlreadyChecked {
    pub(crate) facts_to_add: BTreeSet<Fact>,
    pub(crate) facts_to_remove: BTreeSet<Fact>,
}

impl FactsAlreadyChecked {
    pub(crate) fn contains(&self, fact: &Fact, removed: bool) -> bool {
        if removed {
            self.facts_to_remove.contains(fact)
        } else {
            self.facts_to_add.contains(fact)
        }
    }

    pub(crate) fn insert(&mut self, fact: Fact, removed: bool) {
        if removed {
            self.facts_to_remove.insert(fact);
        } else {
            self.facts_to_add.insert(fact);
        }
    }
}
