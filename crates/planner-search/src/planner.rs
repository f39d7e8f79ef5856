use std::collections::BTreeSet;
use std::ops::ControlFlow;

use chrono::{DateTime, Utc};
use planner_core::{
    Domain, FactOptional, Goal, GoalDecision, Historical, OnFact, Problem, SetOfEntities,
    WorldState,
};
use tracing::{debug, info, warn};

use crate::search::SearchContext;
use crate::{ActionInstance, PlannerStep};

/// Picks the next action for the highest-priority goal that can progress.
///
/// Walks the goal stack from the highest priority down. Satisfied
/// non-persistent goals are dropped on the way, disabled goals and goals no
/// action can progress are skipped. `now` drives the inactivity timers;
/// with `None` no goal expires.
pub fn look_for_an_action_to_do(
    problem: &mut Problem,
    domain: &Domain,
    now: Option<DateTime<Utc>>,
    global_historical: Option<&Historical>,
) -> Option<PlannerStep> {
    problem.world_state.refresh_reachability(domain);
    let Problem {
        entities,
        goal_stack,
        world_state,
        historical,
        ..
    } = problem;
    let world: &WorldState = world_state;
    let historical: &Historical = historical;
    let entities: &SetOfEntities = entities;

    let mut step = None;
    goal_stack.iterate_on_goals_and_remove_non_persistent(now, |goal, priority| {
        if !goal.is_enabled(world) {
            return GoalDecision::Skip;
        }
        if goal.is_satisfied(world) {
            return GoalDecision::Satisfied;
        }
        let Some(target) = first_unsatisfied_fact(goal, world) else {
            return GoalDecision::Skip;
        };
        let ctx = SearchContext {
            world,
            historical,
            entities,
            domain,
            global_historical,
            target: &target,
        };
        match ctx.best_action() {
            Some(best) => {
                let action_instance = best.to_instance();
                debug!(action = %action_instance, goal = %goal, priority, "action selected");
                step = Some(PlannerStep {
                    action_instance,
                    goal: goal.clone(),
                    priority,
                });
                GoalDecision::Pursue
            }
            None => {
                debug!(goal = %goal, target = %target, "no action progresses the goal");
                GoalDecision::Skip
            }
        }
    });
    step
}

fn first_unsatisfied_fact(goal: &Goal, world: &WorldState) -> Option<FactOptional> {
    let mut found = None;
    let _ = goal.objective.walk(
        Some(world),
        &mut OnFact(|leaf: &FactOptional| {
            if world.is_optional_fact_satisfied(leaf) {
                ControlFlow::Continue(())
            } else {
                found = Some(leaf.clone());
                ControlFlow::Break(())
            }
        }),
    );
    found
}

/// Records `step` as executed: updates the session history, applies the
/// action's effect with its inferences, pushes the goals it adds and drops
/// the goals now satisfied.
pub fn notify_action_done(
    problem: &mut Problem,
    domain: &Domain,
    step: &PlannerStep,
    now: Option<DateTime<Utc>>,
) {
    let id = &step.action_instance.action_id;
    let Some(action) = domain.action(id) else {
        warn!(action = %id, "unknown action reported as done");
        return;
    };
    let assignment = &step.action_instance.parameters;
    problem.historical.notify_action_done(id);
    if let Some(effect) = &action.effect.effect {
        problem.world_state.apply(effect, assignment, domain);
    }
    for (priority, goals) in &action.effect.goals_to_add {
        let goals: Vec<Goal> = goals.iter().map(|goal| goal.substitute(assignment)).collect();
        problem.goal_stack.add_goals_in_priority(&goals, *priority);
    }
    let current: Vec<Goal> = action
        .effect
        .goals_to_add_in_current_priority
        .iter()
        .map(|goal| goal.substitute(assignment))
        .collect();
    problem.goal_stack.add_goals_in_priority(&current, step.priority);
    problem.goal_stack.remove_expired_goals(now);
    problem.goal_stack.remove_satisfied_goals(&problem.world_state);
}

/// Builds a sequential plan by selecting and applying actions until the
/// goals are exhausted or nothing can progress.
///
/// A step whose action was already selected earlier in the plan is kept
/// and ends the plan. Each applied step is recorded in the session history
/// and, when given, in `global_historical`.
pub fn look_for_resolution_plan_with_goals(
    problem: &mut Problem,
    domain: &Domain,
    now: Option<DateTime<Utc>>,
    mut global_historical: Option<&mut Historical>,
) -> Vec<PlannerStep> {
    let mut plan = Vec::new();
    let mut already_done = BTreeSet::new();
    while !problem.goal_stack.is_empty() {
        let Some(step) =
            look_for_an_action_to_do(problem, domain, now, global_historical.as_deref())
        else {
            break;
        };
        let id = step.action_instance.action_id.clone();
        plan.push(step.clone());
        if !already_done.insert(id.clone()) {
            info!(action = %id, "action repeats, stopping the plan");
            break;
        }
        if let Some(global) = global_historical.as_deref_mut() {
            global.notify_action_done(&id);
        }
        notify_action_done(problem, domain, &step, now);
    }
    info!(steps = plan.len(), "plan built");
    plan
}

/// Like [`look_for_resolution_plan_with_goals`], keeping only the actions.
pub fn look_for_resolution_plan(
    problem: &mut Problem,
    domain: &Domain,
    now: Option<DateTime<Utc>>,
    global_historical: Option<&mut Historical>,
) -> Vec<ActionInstance> {
    look_for_resolution_plan_with_goals(problem, domain, now, global_historical)
        .into_iter()
        .map(|step| step.action_instance)
        .collect()
}
