//! Data model of the contextual planner: facts, conditions, effects, world
//! states, goals and domains.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![forbid(unsafe_code)]

pub mod action;
pub mod condition;
pub mod domain;
pub mod effect;
pub mod error;
pub mod expression;
pub mod fact;
pub mod goal;
pub mod goal_stack;
pub mod historical;
pub mod inference;
pub mod ontology;
pub mod problem;
pub mod succession;
pub mod visit;
pub mod world_state;

pub use action::{Action, ActionId};
pub use condition::Condition;
pub use domain::{Domain, Rule};
pub use effect::{Effect, ProblemModification};
pub use error::{PlannerError, Result};
pub use expression::Expression;
pub use fact::{
    assignments, Assignment, Entity, Fact, FactOptional, Parameter, ParameterValues, Term,
};
pub use goal::Goal;
pub use goal_stack::{GoalDecision, GoalStack};
pub use historical::Historical;
pub use inference::{Inference, InferenceId, SetOfInferences, SetOfInferencesId};
pub use ontology::{Ontology, Predicate, SetOfEntities, SetOfTypes};
pub use problem::Problem;
pub use succession::{Succession, SuccessorCache};
pub use visit::{OnFact, Visitor};
pub use world_state::WorldState;
