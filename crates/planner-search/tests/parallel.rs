use std::collections::{BTreeMap, BTreeSet};

use planner_core::{
    Action, Domain, Effect, Fact, Goal, GoalStack, Ontology, Problem, ProblemModification,
    SetOfEntities, SetOfInferences,
};
use planner_search::{
    look_for_resolution_plan_with_goals, notify_action_done, to_parallel_plan, ActionInstance,
    PlannerStep,
};
use proptest::prelude::*;

fn fact(text: &str) -> Fact {
    text.parse().expect("fact")
}

fn action(precondition: Option<&str>, effect: Effect) -> Action {
    let action = Action::new(ProblemModification::new(effect));
    match precondition {
        Some(text) => action.with_precondition(text.parse().expect("precondition")),
        None => action,
    }
}

fn domain(actions: Vec<(&str, Action)>) -> Domain {
    let actions: BTreeMap<_, _> = actions
        .into_iter()
        .map(|(id, action)| (id.to_owned(), action))
        .collect();
    Domain::new(actions, Ontology::default(), SetOfInferences::new()).expect("domain")
}

fn goals_of(problem: &Problem) -> Vec<Goal> {
    problem.goal_stack.iter().map(|(_, goal)| goal.clone()).collect()
}

fn ids(step: &[PlannerStep]) -> Vec<&str> {
    step.iter()
        .map(|step| step.action_instance.action_id.as_str())
        .collect()
}

#[test]
fn independent_actions_share_a_step() {
    let domain = domain(vec![
        ("openDoor", action(Some("hasKey"), Effect::add("doorOpen").expect("effect"))),
        ("turnOnLight", action(Some("hasPower"), Effect::add("lightOn").expect("effect"))),
    ]);
    let mut stack = GoalStack::new();
    stack.push_back(10, Goal::from_fact(fact("doorOpen")));
    stack.push_back(9, Goal::from_fact(fact("lightOn")));
    let start = Problem::new([fact("hasKey"), fact("hasPower")], stack, SetOfEntities::new());
    let goals = goals_of(&start);

    let mut working = start.clone();
    let plan = look_for_resolution_plan_with_goals(&mut working, &domain, None, None);
    assert_eq!(plan.len(), 2);

    let parallel = to_parallel_plan(plan, false, &start, &domain, &goals, None);
    assert_eq!(parallel.len(), 1);
    assert_eq!(ids(&parallel[0]), ["openDoor", "turnOnLight"]);
}

#[test]
fn dependent_actions_stay_in_order() {
    let domain = domain(vec![
        ("openDoor", action(Some("hasKey"), Effect::add("doorOpen").expect("effect"))),
        ("enterRoom", action(Some("doorOpen"), Effect::add("inRoom").expect("effect"))),
    ]);
    let mut stack = GoalStack::new();
    stack.push_back(0, Goal::from_fact(fact("inRoom")));
    let start = Problem::new([fact("hasKey")], stack, SetOfEntities::new());
    let goals = goals_of(&start);

    let mut working = start.clone();
    let plan = look_for_resolution_plan_with_goals(&mut working, &domain, None, None);
    let parallel = to_parallel_plan(plan, false, &start, &domain, &goals, None);
    assert_eq!(parallel.len(), 2);
    assert_eq!(ids(&parallel[0]), ["openDoor"]);
    assert_eq!(ids(&parallel[1]), ["enterRoom"]);
}

#[test]
fn only_first_step_leaves_the_tail_sequential() {
    let domain = domain(vec![
        ("a", action(None, Effect::add("x").expect("effect"))),
        ("b", action(None, Effect::add("y").expect("effect"))),
        ("c", action(Some("x"), Effect::add("z").expect("effect"))),
        ("d", action(Some("x"), Effect::add("w").expect("effect"))),
    ]);
    let start = Problem::new(Vec::<Fact>::new(), GoalStack::new(), SetOfEntities::new());
    let plan: Vec<PlannerStep> = ["a", "c", "b", "d"]
        .into_iter()
        .map(|id| step(id))
        .collect();

    let first_only = to_parallel_plan(plan.clone(), true, &start, &domain, &[], None);
    assert_eq!(ids(&first_only[0]), ["a", "b"]);
    assert_eq!(first_only.len(), 3);

    let full = to_parallel_plan(plan, false, &start, &domain, &[], None);
    assert_eq!(full.len(), 2);
    assert_eq!(ids(&full[1]), ["c", "d"]);
}

#[test]
fn conflicting_effects_are_not_reordered() {
    let paint = |color: &str, other: &str| {
        action(
            None,
            Effect::and([
                Effect::add(color).expect("effect"),
                Effect::remove(other).expect("effect"),
            ]),
        )
    };
    let domain = domain(vec![
        ("paintRed", paint("red", "blue")),
        ("paintBlue", paint("blue", "red")),
    ]);
    let start = Problem::new(Vec::<Fact>::new(), GoalStack::new(), SetOfEntities::new());
    let plan = vec![step("paintRed"), step("paintBlue")];

    let parallel = to_parallel_plan(plan, false, &start, &domain, &[], None);
    assert_eq!(parallel.len(), 2);
}

#[test]
fn pulled_action_is_checked_in_emitted_order() {
    let domain = domain(vec![
        ("a", action(None, Effect::add("x").expect("effect"))),
        (
            "b",
            action(
                None,
                Effect::When {
                    condition: "x".parse().expect("condition"),
                    effect: Box::new(Effect::add("w").expect("effect")),
                },
            ),
        ),
        ("c", action(None, Effect::remove("x").expect("effect"))),
    ]);
    let start = Problem::new(Vec::<Fact>::new(), GoalStack::new(), SetOfEntities::new());
    let plan = vec![step("a"), step("c"), step("b")];

    let sequential = replay(&start, &domain, plan.iter());
    let parallel = to_parallel_plan(plan, false, &start, &domain, &[], None);
    let flattened = replay(&start, &domain, parallel.iter().flatten());

    assert!(sequential.world_state.facts().is_empty());
    assert_eq!(flattened.world_state.facts(), sequential.world_state.facts());
    assert!(parallel.iter().all(|step| ids(step) != ["a", "b"]));
}

fn step(id: &str) -> PlannerStep {
    PlannerStep {
        action_instance: ActionInstance::new(id),
        goal: Goal::from_fact(fact("unused")),
        priority: 0,
    }
}

fn toy_domain() -> Domain {
    domain(vec![
        ("light", action(None, Effect::add("lit").expect("effect"))),
        ("dark", action(Some("lit"), Effect::remove("lit").expect("effect"))),
        ("grab", action(None, Effect::add("key").expect("effect"))),
        ("drop", action(Some("key"), Effect::remove("key").expect("effect"))),
        ("open", action(Some("key"), Effect::add("door").expect("effect"))),
        ("close", action(Some("door"), Effect::remove("door").expect("effect"))),
    ])
}

const TOY_ACTIONS: [&str; 6] = ["light", "dark", "grab", "drop", "open", "close"];

fn holds(problem: &Problem, domain: &Domain, id: &str) -> bool {
    domain
        .action(id)
        .and_then(|action| action.precondition.as_ref())
        .map_or(true, |precondition| {
            precondition.is_true(&problem.world_state, &BTreeSet::new(), None)
        })
}

fn replay<'a>(start: &Problem, domain: &Domain, steps: impl Iterator<Item = &'a PlannerStep>) -> Problem {
    let mut problem = start.clone();
    for step in steps {
        notify_action_done(&mut problem, domain, step, None);
    }
    problem
}

proptest! {
    #[test]
    fn parallel_plan_replays_to_the_same_state(choices in prop::collection::vec(0..TOY_ACTIONS.len(), 0..12)) {
        let domain = toy_domain();
        let start = Problem::new(Vec::<Fact>::new(), GoalStack::new(), SetOfEntities::new());
        let goals = vec![Goal::from_fact(fact("lit")), Goal::from_fact(fact("door"))];

        let mut simulated = start.clone();
        let mut plan = Vec::new();
        for choice in choices {
            let candidate = step(TOY_ACTIONS[choice]);
            if holds(&simulated, &domain, TOY_ACTIONS[choice]) {
                notify_action_done(&mut simulated, &domain, &candidate, None);
                plan.push(candidate);
            }
        }

        let parallel = to_parallel_plan(plan.clone(), false, &start, &domain, &goals, None);
        let flattened: Vec<&PlannerStep> = parallel.iter().flatten().collect();
        prop_assert_eq!(flattened.len(), plan.len());

        let sequential = replay(&start, &domain, plan.iter());
        let mut checked = start.clone();
        for step in &flattened {
            prop_assert!(holds(&checked, &domain, &step.action_instance.action_id));
            notify_action_done(&mut checked, &domain, step, None);
        }
        prop_assert_eq!(checked.world_state.facts(), sequential.world_state.facts());
        for goal in &goals {
            prop_assert_eq!(
                goal.is_satisfied(&checked.world_state),
                goal.is_satisfied(&sequential.world_state)
            );
        }
    }
}
