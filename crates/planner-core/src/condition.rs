//! Conditions: preconditions, goal objectives and inference triggers.

use std::collections::BTreeSet;
use std::fmt;
use std::ops::ControlFlow;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::fact::{facts_named, narrow};
use crate::{
    Assignment, Expression, Fact, FactOptional, OnFact, Parameter, ParameterValues, PlannerError,
    Result, Term, Visitor, WorldState,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Condition {
    Fact(FactOptional),
    Expression(Expression),
    And(Vec<Condition>),
    /// `left` holds the current fluent value of `right`.
    Equality { left: Fact, right: Fact },
}

impl Condition {
    pub fn fact(fact: Fact) -> Self {
        Condition::Fact(FactOptional::present(fact))
    }

    pub fn not(fact: Fact) -> Self {
        Condition::Fact(FactOptional::absent(fact))
    }

    /// Conjunction, flattening nested conjunctions.
    pub fn and(conditions: impl IntoIterator<Item = Condition>) -> Self {
        let mut flat = Vec::new();
        for condition in conditions {
            match condition {
                Condition::And(children) => flat.extend(children),
                other => flat.push(other),
            }
        }
        if flat.len() == 1 {
            flat.remove(0)
        } else {
            Condition::And(flat)
        }
    }

    /// Visits the leaves left to right.
    ///
    /// With a world state, an equality is visited once as its left fact
    /// carrying the right fact's current value. Without one, both sides are
    /// visited with a wildcard value.
    pub fn walk<V: Visitor + ?Sized>(
        &self,
        world: Option<&WorldState>,
        visitor: &mut V,
    ) -> ControlFlow<()> {
        match self {
            Condition::Fact(fact) => visitor.fact(fact),
            Condition::Expression(expression) => visitor.expression(expression),
            Condition::And(children) => {
                for child in children {
                    child.walk(world, visitor)?;
                }
                ControlFlow::Continue(())
            }
            Condition::Equality { left, right } => match world {
                Some(world) => visitor.fact(&FactOptional::present(resolve_equality(
                    left, right, world,
                ))),
                None => {
                    visitor.fact(&FactOptional::present(
                        left.clone().with_fluent(Parameter::any()),
                    ))?;
                    visitor.fact(&FactOptional::present(
                        right.clone().with_fluent(Parameter::any()),
                    ))
                }
            },
        }
    }

    /// Fact leaves, in order, equalities expanded on both sides.
    pub fn facts(&self) -> Vec<FactOptional> {
        let mut facts = Vec::new();
        let _ = self.walk(
            None,
            &mut OnFact(|fact: &FactOptional| {
                facts.push(fact.clone());
                ControlFlow::Continue(())
            }),
        );
        facts
    }

    /// Evaluates the condition against `world` and the punctual facts of the
    /// current modification.
    ///
    /// When `parameters` is given, every parameter it lists is narrowed to
    /// the values that make the matched leaves true. Other parameters match
    /// anything.
    pub fn is_true(
        &self,
        world: &WorldState,
        punctual: &BTreeSet<Fact>,
        parameters: Option<&mut ParameterValues>,
    ) -> bool {
        let mut scratch = ParameterValues::new();
        let parameters = match parameters {
            Some(parameters) => parameters,
            None => &mut scratch,
        };
        self.is_true_with(world, punctual, parameters)
    }

    fn is_true_with(
        &self,
        world: &WorldState,
        punctual: &BTreeSet<Fact>,
        parameters: &mut ParameterValues,
    ) -> bool {
        match self {
            Condition::Fact(fact) => fact_is_true(fact, world, punctual, parameters),
            Condition::Expression(expression) => expression.is_valid(world.variables()),
            Condition::And(children) => children
                .iter()
                .all(|child| child.is_true_with(world, punctual, parameters)),
            Condition::Equality { left, right } => {
                let resolved = FactOptional::present(resolve_equality(left, right, world));
                fact_is_true(&resolved, world, punctual, parameters)
            }
        }
    }

    /// Optimistic: false only when the reachability closure proves a leaf
    /// can never hold.
    pub fn can_become_true(&self, world: &WorldState) -> bool {
        match self {
            Condition::Fact(fact) if fact.negated => world.can_fact_become_false(&fact.fact),
            Condition::Fact(fact) => world.can_fact_become_true(&fact.fact),
            Condition::Expression(_) => true,
            Condition::And(children) => children.iter().all(|child| child.can_become_true(world)),
            Condition::Equality { left, right } => {
                world.can_fact_become_true(&left.clone().with_fluent(Parameter::any()))
                    && world.can_fact_become_true(&right.clone().with_fluent(Parameter::any()))
            }
        }
    }

    /// Whether some leaf unifies with `pattern`.
    ///
    /// Unification is one-directional: parameters of `pattern` listed in
    /// `parent` must take a value the leaf allows, and the values found are
    /// recorded in `parent` for parameters that were still unbound.
    pub fn contains_fact_opt(&self, pattern: &FactOptional, parent: &mut ParameterValues) -> bool {
        let mut matched = false;
        let mut found = ParameterValues::new();
        let _ = self.walk(
            None,
            &mut OnFact(|leaf: &FactOptional| {
                if let Some(bindings) = unify_with_leaf(pattern, leaf, parent) {
                    matched = true;
                    for (parameter, entity) in bindings {
                        found.entry(parameter).or_default().insert(entity);
                    }
                }
                ControlFlow::Continue(())
            }),
        );
        if matched {
            for (parameter, values) in found {
                if let Some(slot) = parent.get_mut(&parameter) {
                    if slot.is_empty() {
                        *slot = values;
                    }
                }
            }
        }
        matched
    }

    pub fn substitute(&self, assignment: &Assignment) -> Condition {
        match self {
            Condition::Fact(fact) => {
                Condition::Fact(FactOptional::new(fact.fact.substitute(assignment), fact.negated))
            }
            Condition::Expression(expression) => Condition::Expression(expression.clone()),
            Condition::And(children) => Condition::And(
                children
                    .iter()
                    .map(|child| child.substitute(assignment))
                    .collect(),
            ),
            Condition::Equality { left, right } => Condition::Equality {
                left: left.substitute(assignment),
                right: right.substitute(assignment),
            },
        }
    }

    pub(crate) fn find_undeclared(&self, declared: &[Parameter]) -> Option<crate::fact::Undeclared> {
        self.facts()
            .iter()
            .find_map(|leaf| leaf.fact.find_undeclared(declared))
    }
}

fn resolve_equality(left: &Fact, right: &Fact, world: &WorldState) -> Fact {
    match world.fluent_of(right) {
        Some(value) => left.clone().with_fluent(value.clone()),
        None => left.clone().without_fluent(),
    }
}

fn fact_is_true(
    leaf: &FactOptional,
    world: &WorldState,
    punctual: &BTreeSet<Fact>,
    parameters: &mut ParameterValues,
) -> bool {
    let candidates = if leaf.fact.punctual {
        facts_named(punctual, &leaf.fact.name)
    } else {
        facts_named(world.facts(), &leaf.fact.name)
    };
    let mut matched = false;
    let mut found = ParameterValues::new();
    for candidate in candidates {
        if let Some(bindings) = leaf.fact.match_against(candidate, parameters) {
            matched = true;
            if leaf.negated {
                break;
            }
            for (parameter, entity) in bindings {
                found.entry(parameter).or_default().insert(entity);
            }
        }
    }
    if leaf.negated {
        return !matched;
    }
    if matched {
        narrow(parameters, found);
    }
    matched
}

fn unify_with_leaf(
    pattern: &FactOptional,
    leaf: &FactOptional,
    parent: &ParameterValues,
) -> Option<Vec<(Parameter, crate::Entity)>> {
    if pattern.negated != leaf.negated
        || pattern.fact.name != leaf.fact.name
        || pattern.fact.arguments.len() != leaf.fact.arguments.len()
    {
        return None;
    }
    let mut bindings = Vec::new();
    let fluents = match (&pattern.fact.fluent, &leaf.fact.fluent) {
        (Some(pattern), Some(leaf)) => Some((pattern, leaf)),
        _ => None,
    };
    let pairs = pattern
        .fact
        .arguments
        .iter()
        .zip(&leaf.fact.arguments)
        .chain(fluents);
    for (expected, found) in pairs {
        match (expected, found) {
            (Term::Entity(expected), Term::Entity(found)) if expected != found => return None,
            (Term::Parameter(parameter), Term::Entity(found)) => {
                if let Some(values) = parent.get(parameter) {
                    if !values.is_empty() && !values.contains(found) {
                        return None;
                    }
                    bindings.push((parameter.clone(), found.clone()));
                }
            }
            _ => {}
        }
    }
    Some(bindings)
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Fact(fact) => write!(f, "{fact}"),
            Condition::Expression(expression) => write!(f, "{expression}"),
            Condition::And(children) => {
                for (index, child) in children.iter().enumerate() {
                    if index > 0 {
                        f.write_str(" & ")?;
                    }
                    write!(f, "{child}")?;
                }
                Ok(())
            }
            Condition::Equality { left, right } => write!(f, "equals({left}, {right})"),
        }
    }
}

// Splits on `separator` outside parentheses.
pub(crate) fn split_top_level(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (index, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            c if c == separator && depth == 0 => {
                parts.push(&text[start..index]);
                start = index + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

fn parse_leaf(text: &str) -> Result<Condition> {
    let invalid = || PlannerError::InvalidCondition(text.to_owned());
    let text = text.trim();
    if text.is_empty() {
        return Err(invalid());
    }
    if let Some(inner) = text
        .strip_prefix("equals(")
        .and_then(|rest| rest.strip_suffix(')'))
    {
        let sides = split_top_level(inner, ',');
        let [left, right] = sides.as_slice() else {
            return Err(invalid());
        };
        return Ok(Condition::Equality {
            left: left.parse().map_err(|_| invalid())?,
            right: right.parse().map_err(|_| invalid())?,
        });
    }
    if text.contains("${") {
        return text.parse().map(Condition::Expression);
    }
    text.parse().map(Condition::Fact)
}

impl FromStr for Condition {
    type Err = PlannerError;

    fn from_str(text: &str) -> Result<Self> {
        let leaves = split_top_level(text, '&')
            .into_iter()
            .map(parse_leaf)
            .collect::<Result<Vec<_>>>()?;
        Ok(Condition::and(leaves))
    }
}

impl TryFrom<String> for Condition {
    type Error = PlannerError;

    fn try_from(text: String) -> Result<Self> {
        text.parse()
    }
}

impl From<Condition> for String {
    fn from(condition: Condition) -> Self {
        condition.to_string()
    }
}
