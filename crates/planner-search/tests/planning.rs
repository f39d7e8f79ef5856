use std::collections::BTreeMap;

use planner_core::{
    Action, Domain, Effect, Entity, Fact, Goal, GoalStack, Historical, Ontology, Parameter,
    Problem, ProblemModification, SetOfEntities, SetOfInferences,
};
use planner_search::{
    look_for_an_action_to_do, look_for_resolution_plan, look_for_resolution_plan_with_goals,
    notify_action_done,
};

fn fact(text: &str) -> Fact {
    text.parse().expect("fact")
}

fn action(parameters: &[&str], precondition: Option<&str>, effect: Effect) -> Action {
    let action = Action::new(ProblemModification::new(effect))
        .with_parameters(parameters.iter().map(|name| Parameter::new(*name)).collect());
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

fn problem(facts: &[&str], goals: &[(i32, Goal)]) -> Problem {
    let mut stack = GoalStack::new();
    for (priority, goal) in goals {
        stack.push_back(*priority, goal.clone());
    }
    Problem::new(facts.iter().map(|text| fact(text)), stack, SetOfEntities::new())
}

fn build_wall_domain() -> Domain {
    domain(vec![(
        "buildWall",
        action(
            &["s"],
            Some("foundationsSet(?s)"),
            Effect::add("wallsBuilt(?s)").expect("effect"),
        ),
    )])
}

#[test]
fn build_wall_is_selected_then_applied() {
    let domain = build_wall_domain();
    let mut problem = problem(
        &["foundationsSet(site1)"],
        &[(0, Goal::from_fact(fact("wallsBuilt(site1)")))],
    );

    let step = look_for_an_action_to_do(&mut problem, &domain, None, None).expect("an action");
    assert_eq!(step.action_instance.action_id, "buildWall");
    assert_eq!(
        step.action_instance.parameters.get(&Parameter::new("s")),
        Some(&Entity::new("site1"))
    );
    assert_eq!(step.action_instance.to_string(), "buildWall(?s -> site1)");

    notify_action_done(&mut problem, &domain, &step, None);
    assert!(problem.world_state.contains(&fact("wallsBuilt(site1)")));
    assert!(problem.goal_stack.is_empty());
    assert_eq!(problem.historical.count("buildWall"), 1);
}

#[test]
fn no_candidate_leaves_the_goal_in_place() {
    let domain = build_wall_domain();
    let mut problem = problem(&[], &[(0, Goal::from_fact(fact("wallsBuilt(site1)")))]);

    assert!(look_for_an_action_to_do(&mut problem, &domain, None, None).is_none());
    assert_eq!(problem.goal_stack.len(), 1);
}

#[test]
fn selection_is_deterministic() {
    let domain = domain(vec![
        ("walk", action(&[], None, Effect::add("arrived").expect("effect"))),
        ("drive", action(&[], None, Effect::add("arrived").expect("effect"))),
        ("cycle", action(&[], None, Effect::add("arrived").expect("effect"))),
    ]);
    let start = problem(&[], &[(0, Goal::from_fact(fact("arrived")))]);

    let mut first = start.clone();
    let mut second = start.clone();
    let a = look_for_an_action_to_do(&mut first, &domain, None, None).expect("an action");
    let b = look_for_an_action_to_do(&mut second, &domain, None, None).expect("an action");
    assert_eq!(a, b);
    assert_eq!(a.action_instance.action_id, "cycle");
}

#[test]
fn session_history_breaks_ties() {
    let domain = domain(vec![
        ("walk", action(&[], None, Effect::add("arrived").expect("effect"))),
        ("drive", action(&[], None, Effect::add("arrived").expect("effect"))),
    ]);
    let mut problem = problem(&[], &[(0, Goal::from_fact(fact("arrived")))]);
    problem.historical.notify_action_done("drive");

    let step = look_for_an_action_to_do(&mut problem, &domain, None, None).expect("an action");
    assert_eq!(step.action_instance.action_id, "walk");
}

#[test]
fn global_history_breaks_ties_after_session_history() {
    let domain = domain(vec![
        ("walk", action(&[], None, Effect::add("arrived").expect("effect"))),
        ("drive", action(&[], None, Effect::add("arrived").expect("effect"))),
    ]);
    let mut problem = problem(&[], &[(0, Goal::from_fact(fact("arrived")))]);
    let mut global = Historical::new();
    global.notify_action_done("drive");
    global.notify_action_done("drive");

    let step =
        look_for_an_action_to_do(&mut problem, &domain, None, Some(&global)).expect("an action");
    assert_eq!(step.action_instance.action_id, "walk");
}

fn calming_domain(apologize: Action, explain: Action) -> Domain {
    domain(vec![("apologize", apologize), ("explain", explain)])
}

fn calm(prefer: Option<&str>) -> Action {
    let action = action(&[], None, Effect::add("calm").expect("effect"));
    match prefer {
        Some(text) => action.with_prefer_in_context(text.parse().expect("condition")),
        None => action,
    }
}

#[test]
fn repeated_flagged_action_loses_to_a_fresh_one() {
    let domain = calming_domain(calm(Some("upset")).not_repeatable(), calm(None));
    let mut problem = problem(&["upset"], &[(0, Goal::from_fact(fact("calm")))]);
    problem.historical.notify_action_done("apologize");

    let step = look_for_an_action_to_do(&mut problem, &domain, None, None).expect("an action");
    assert_eq!(step.action_instance.action_id, "explain");
}

#[test]
fn flag_does_not_penalize_against_an_executed_candidate() {
    let domain = calming_domain(calm(Some("upset")).not_repeatable(), calm(None));
    let mut problem = problem(&["upset"], &[(0, Goal::from_fact(fact("calm")))]);
    problem.historical.notify_action_done("apologize");
    problem.historical.notify_action_done("explain");

    let step = look_for_an_action_to_do(&mut problem, &domain, None, None).expect("an action");
    assert_eq!(step.action_instance.action_id, "apologize");
}

#[test]
fn flagged_actions_compare_execution_counts() {
    let domain = calming_domain(
        calm(Some("upset")).not_repeatable(),
        calm(None).not_repeatable(),
    );
    let mut problem = problem(&["upset"], &[(0, Goal::from_fact(fact("calm")))]);
    problem.historical.notify_action_done("apologize");
    problem.historical.notify_action_done("apologize");
    problem.historical.notify_action_done("explain");

    let step = look_for_an_action_to_do(&mut problem, &domain, None, None).expect("an action");
    assert_eq!(step.action_instance.action_id, "explain");
}

#[test]
fn satisfied_preference_beats_identifier_order() {
    let domain = calming_domain(calm(None), calm(Some("upset")));
    let mut problem = problem(&["upset"], &[(0, Goal::from_fact(fact("calm")))]);

    let step = look_for_an_action_to_do(&mut problem, &domain, None, None).expect("an action");
    assert_eq!(step.action_instance.action_id, "explain");
}

#[test]
fn fewer_unsatisfied_preferences_break_ties() {
    let domain = calming_domain(calm(Some("upset & listening")), calm(Some("upset")));
    let mut problem = problem(&["upset"], &[(0, Goal::from_fact(fact("calm")))]);

    let step = look_for_an_action_to_do(&mut problem, &domain, None, None).expect("an action");
    assert_eq!(step.action_instance.action_id, "explain");
}

#[test]
fn higher_priority_goal_is_served_first() {
    let domain = domain(vec![
        ("eat", action(&[], None, Effect::add("fed").expect("effect"))),
        ("sleep", action(&[], None, Effect::add("rested").expect("effect"))),
    ]);
    let mut problem = problem(
        &[],
        &[
            (1, Goal::from_fact(fact("rested"))),
            (5, Goal::from_fact(fact("fed"))),
        ],
    );

    let step = look_for_an_action_to_do(&mut problem, &domain, None, None).expect("an action");
    assert_eq!(step.action_instance.action_id, "eat");
    assert_eq!(step.priority, 5);
}

#[test]
fn satisfied_goals_do_not_resurface() {
    let domain = build_wall_domain();
    let mut problem = problem(
        &["foundationsSet(site1)", "wallsBuilt(site1)"],
        &[
            (2, Goal::from_fact(fact("wallsBuilt(site1)"))),
            (1, Goal::from_fact(fact("wallsBuilt(site1)")).persistent()),
        ],
    );

    assert!(look_for_an_action_to_do(&mut problem, &domain, None, None).is_none());
    assert_eq!(problem.goal_stack.len(), 1);
    assert!(problem.goal_stack.iter().all(|(_, goal)| goal.persistent));

    problem.remove_facts([fact("wallsBuilt(site1)")], &domain);
    let step = look_for_an_action_to_do(&mut problem, &domain, None, None).expect("an action");
    assert_eq!(step.priority, 1);
}

#[test]
fn disabled_goal_is_skipped() {
    let domain = build_wall_domain();
    let mut problem = problem(
        &["foundationsSet(site1)"],
        &[(
            0,
            Goal::from_fact(fact("wallsBuilt(site1)")).with_condition_fact(fact("permitGranted")),
        )],
    );

    assert!(look_for_an_action_to_do(&mut problem, &domain, None, None).is_none());
    assert_eq!(problem.goal_stack.len(), 1);

    problem.add_facts([fact("permitGranted")], &domain);
    assert!(look_for_an_action_to_do(&mut problem, &domain, None, None).is_some());
}

#[test]
fn chained_actions_reach_the_goal() {
    let domain = domain(vec![
        ("openDoor", action(&[], Some("hasKey"), Effect::add("doorOpen").expect("effect"))),
        ("enterRoom", action(&[], Some("doorOpen"), Effect::add("inRoom").expect("effect"))),
    ]);
    let mut problem = problem(&["hasKey"], &[(0, Goal::from_fact(fact("inRoom")))]);

    let plan = look_for_resolution_plan(&mut problem, &domain, None, None);
    let ids: Vec<&str> = plan.iter().map(|step| step.action_id.as_str()).collect();
    assert_eq!(ids, ["openDoor", "enterRoom"]);
    assert!(problem.world_state.contains(&fact("inRoom")));
    assert!(problem.goal_stack.is_empty());
}

#[test]
fn three_step_precondition_cycle_terminates() {
    let cycle = || {
        vec![
            ("a", action(&[], Some("x"), Effect::add("y").expect("effect"))),
            ("b", action(&[], Some("y"), Effect::add("z").expect("effect"))),
            ("c", action(&[], Some("z"), Effect::add("x").expect("effect"))),
        ]
    };

    let unreachable = domain(cycle());
    let mut problem_without_exit = problem(&["x"], &[(0, Goal::from_fact(fact("w")))]);
    assert!(look_for_resolution_plan(&mut problem_without_exit, &unreachable, None, None).is_empty());

    let mut actions = cycle();
    actions.push(("d", action(&[], Some("z"), Effect::add("w").expect("effect"))));
    let with_exit = domain(actions);
    let mut problem_with_exit = problem(&["x"], &[(0, Goal::from_fact(fact("w")))]);
    let plan = look_for_resolution_plan(&mut problem_with_exit, &with_exit, None, None);
    let ids: Vec<&str> = plan.iter().map(|step| step.action_id.as_str()).collect();
    assert_eq!(ids, ["a", "b", "d"]);
    assert!(problem_with_exit.goal_stack.is_empty());
}

#[test]
fn two_action_cycle_stops_on_repeat() {
    let domain = domain(vec![
        (
            "setA",
            action(
                &[],
                Some("b"),
                Effect::and([
                    Effect::add("a").expect("effect"),
                    Effect::remove("b").expect("effect"),
                ]),
            ),
        ),
        (
            "setB",
            action(
                &[],
                Some("a"),
                Effect::and([
                    Effect::add("b").expect("effect"),
                    Effect::remove("a").expect("effect"),
                ]),
            ),
        ),
    ]);
    let mut problem = problem(&["b"], &[(0, Goal::new("a & b".parse().expect("condition")))]);
    let mut global = Historical::new();

    let plan = look_for_resolution_plan_with_goals(&mut problem, &domain, None, Some(&mut global));
    let ids: Vec<&str> = plan
        .iter()
        .map(|step| step.action_instance.action_id.as_str())
        .collect();
    assert_eq!(ids, ["setA", "setB", "setA"]);
    assert_eq!(problem.goal_stack.len(), 1);
    assert_eq!(problem.historical.count("setA"), 1);
    assert_eq!(global.count("setA"), 1);
    assert_eq!(global.count("setB"), 1);
}

#[test]
fn added_goals_are_pushed_when_the_action_is_done() {
    let effect = ProblemModification::new(Effect::add("alarmRaised").expect("effect"))
        .with_goals_to_add(9, vec![Goal::from_fact(fact("evacuated"))]);
    let domain = domain(vec![
        ("raiseAlarm", Action::new(effect)),
        ("evacuate", action(&[], Some("alarmRaised"), Effect::add("evacuated").expect("effect"))),
    ]);
    let mut problem = problem(&[], &[(0, Goal::from_fact(fact("alarmRaised")))]);

    let step = look_for_an_action_to_do(&mut problem, &domain, None, None).expect("an action");
    notify_action_done(&mut problem, &domain, &step, None);
    assert_eq!(
        problem.goal_stack.current_goal().map(|goal| goal.to_string()),
        Some(Goal::from_fact(fact("evacuated")).to_string())
    );

    let next = look_for_an_action_to_do(&mut problem, &domain, None, None).expect("an action");
    assert_eq!(next.action_instance.action_id, "evacuate");
    assert_eq!(next.priority, 9);
}
