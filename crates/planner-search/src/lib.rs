//! Action selection for prioritized goals, plan construction and
//! sequential-to-parallel plan conversion.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![forbid(unsafe_code)]

mod facts_already_checked;
mod parallel;
mod planner;
mod potential_action;
mod search;
mod types;

pub use parallel::to_parallel_plan;
pub use planner::{
    look_for_an_action_to_do, look_for_resolution_plan, look_for_resolution_plan_with_goals,
    notify_action_done,
};
pub use types::{ActionInstance, PlannerStep};
