use std::collections::BTreeMap;

use planner_core::{
    Action, Condition, Domain, Effect, Entity, Fact, Goal, GoalStack, Inference, Ontology,
    Parameter, Predicate, Problem, ProblemModification, SetOfEntities, SetOfInferences, Term,
};

fn fact(text: &str) -> Fact {
    text.parse().expect("fact")
}

fn sample_domain() -> Domain {
    let mut ontology = Ontology::default();
    ontology.types.add_type("site", None);
    ontology.predicates.insert(
        "wallsBuilt".to_owned(),
        Predicate {
            parameters: vec![Parameter::new("s")],
            fluent: None,
        },
    );

    let build = Action::new(
        ProblemModification::new(Effect::and([
            Effect::add("wallsBuilt(?s)").expect("effect"),
            Effect::Assign {
                fact: fact("progress(?s)"),
                value: Term::from("done"),
            },
        ]))
        .with_goals_to_add(3, vec![Goal::from_fact(fact("roofed(?s)"))]),
    )
    .with_parameters(vec![Parameter::new("s")])
    .with_precondition("foundationsSet(?s) & !wallsBuilt(?s)".parse().expect("condition"))
    .with_prefer_in_context("sunny".parse().expect("condition"))
    .not_repeatable();

    let mut inferences = SetOfInferences::new();
    inferences.add_inference(
        "inspect",
        Inference::new(
            "wallsBuilt(?s)".parse().expect("condition"),
            Effect::add("inspected(?s)").expect("effect"),
        )
        .with_parameters(vec![Parameter::new("s")]),
    );

    Domain::new(
        BTreeMap::from([("buildWall".to_owned(), build)]),
        ontology,
        inferences,
    )
    .expect("domain")
    .with_name("construction")
}

fn sample_problem() -> Problem {
    let mut goals = GoalStack::new();
    goals.push_back(
        5,
        Goal::new(Condition::and([
            Condition::fact(fact("wallsBuilt(site1)")),
            Condition::not(fact("flooded(site1)")),
        ]))
        .with_max_inactive_seconds(30)
        .with_group_id("build"),
    );
    goals.push_back(0, Goal::from_fact(fact("rested(crew)")).persistent());

    let mut entities = SetOfEntities::new();
    entities.add(Entity::new("site1"));
    let mut problem = Problem::new(
        [fact("foundationsSet(site1)"), fact("batteryLevel(robot)=3")],
        goals,
        entities,
    )
    .with_name("morning");
    problem.historical.notify_action_done("buildWall");
    problem
}

#[test]
fn domain_survives_json_round_trip() {
    let domain = sample_domain();
    let text = serde_json::to_string_pretty(&domain).expect("serialize");
    let parsed: Domain = serde_json::from_str(&text).expect("deserialize");

    assert_eq!(parsed, domain);
    assert_eq!(serde_json::to_string_pretty(&parsed).expect("serialize"), text);
    assert!(parsed.precondition_to_actions().contains_key("foundationsSet"));
}

#[test]
fn problem_survives_json_round_trip() {
    let problem = sample_problem();
    let text = serde_json::to_string_pretty(&problem).expect("serialize");
    let parsed: Problem = serde_json::from_str(&text).expect("deserialize");

    assert_eq!(parsed, problem);
    assert_eq!(serde_json::to_string_pretty(&parsed).expect("serialize"), text);
    let order: Vec<i32> = parsed.goal_stack.iter().map(|(priority, _)| priority).collect();
    assert_eq!(order, [5, 0]);
}

#[test]
fn invalid_action_is_rejected_on_load() {
    let text = r#"{
        "actions": {
            "broken": {
                "precondition": "at(?x)",
                "effect": { "effect": { "add": "at(?y)" } }
            }
        }
    }"#;
    assert!(serde_json::from_str::<Domain>(text).is_err());
}
