use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use planner_core::{Domain, Fact, Goal, Problem};
use tracing::debug;

use crate::{notify_action_done, PlannerStep};

/// Groups a sequential plan into steps of actions that can run together.
///
/// Later actions are pulled into the current step when their precondition
/// already holds before it, and replaying the rest of the plan with them
/// moved either ahead of the step or right after its actions satisfies the
/// same `goals` and ends in the same facts. The second replay is the order
/// the result flattens to, so flattening it reaches the same state as the
/// sequential plan. With `only_first_step`, only the first step is grouped.
pub fn to_parallel_plan(
    sequential_plan: Vec<PlannerStep>,
    only_first_step: bool,
    problem: &Problem,
    domain: &Domain,
    goals: &[Goal],
    now: Option<DateTime<Utc>>,
) -> Vec<Vec<PlannerStep>> {
    let mut steps: Vec<Vec<PlannerStep>> = sequential_plan.into_iter().map(|step| vec![step]).collect();
    let mut before_step = problem.clone();
    let mut index = 0;
    while index < steps.len() {
        let mut candidate = index + 1;
        while candidate < steps.len() {
            if can_pull_forward(&before_step, domain, &steps, index, candidate, goals, now) {
                let moved = steps[candidate].remove(0);
                debug!(action = %moved.action_instance, step = index, "action pulled forward");
                steps[index].push(moved);
                if steps[candidate].is_empty() {
                    steps.remove(candidate);
                }
            } else {
                candidate += 1;
            }
        }
        if only_first_step {
            break;
        }
        for step in &steps[index] {
            notify_action_done(&mut before_step, domain, step, now);
        }
        index += 1;
    }
    steps
}

fn can_pull_forward(
    before_step: &Problem,
    domain: &Domain,
    steps: &[Vec<PlannerStep>],
    index: usize,
    candidate: usize,
    goals: &[Goal],
    now: Option<DateTime<Utc>>,
) -> bool {
    let Some(moved) = steps[candidate].first() else {
        return false;
    };
    if !precondition_holds(before_step, domain, moved) {
        return false;
    }

    let unmoved: Vec<&PlannerStep> = steps[index..].iter().flatten().collect();
    let Some(expected) = replay(before_step, domain, unmoved.iter().copied(), goals, now) else {
        return false;
    };
    let current = steps[index].len();
    let others: Vec<&PlannerStep> = unmoved
        .iter()
        .copied()
        .filter(|step| !std::ptr::eq(*step, moved))
        .collect();

    // Both ends of the step: ahead of its actions, and after them as emitted.
    let moved_first = std::iter::once(moved).chain(others.iter().copied());
    let emitted = others[..current]
        .iter()
        .copied()
        .chain(std::iter::once(moved))
        .chain(others[current..].iter().copied());
    replay(before_step, domain, moved_first, goals, now).is_some_and(|outcome| outcome == expected)
        && replay(before_step, domain, emitted, goals, now).is_some_and(|outcome| outcome == expected)
}

fn precondition_holds(problem: &Problem, domain: &Domain, step: &PlannerStep) -> bool {
    let Some(action) = domain.action(&step.action_instance.action_id) else {
        return false;
    };
    action.precondition.as_ref().map_or(true, |precondition| {
        precondition
            .substitute(&step.action_instance.parameters)
            .is_true(&problem.world_state, &BTreeSet::new(), None)
    })
}

// Satisfied goal positions and final facts, or `None` as soon as a
// precondition fails.
fn replay<'a>(
    start: &Problem,
    domain: &Domain,
    steps: impl Iterator<Item = &'a PlannerStep>,
    goals: &[Goal],
    now: Option<DateTime<Utc>>,
) -> Option<(Vec<usize>, BTreeSet<Fact>)> {
    let mut problem = start.clone();
    for step in steps {
        if !precondition_holds(&problem, domain, step) {
            return None;
        }
        notify_action_done(&mut problem, domain, step, now);
    }
    let satisfied = goals
        .iter()
        .enumerate()
        .filter(|(_, goal)| goal.is_satisfied(&problem.world_state))
        .map(|(position, _)| position)
        .collect();
    Some((satisfied, problem.world_state.facts().clone()))
}
