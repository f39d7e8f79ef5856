//! Facts and the terms they are built from.
//!
//! A [`Fact`] is a named relation over [`Term`]s with an optional fluent
//! value: `at(robot, kitchen)` or `battery(robot)=3`. Facts are stored in
//! ordered sets so that every traversal of a world state is deterministic.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{PlannerError, Result};

/// Candidate values per parameter. An empty set means "not bound yet".
pub type ParameterValues = BTreeMap<Parameter, BTreeSet<Entity>>;

/// One value per parameter.
pub type Assignment = BTreeMap<Parameter, Entity>;

/// Parameter matching any value, used for fluents nobody cares about.
pub const ANY_VALUE: &str = "?_any";

// Identity is the name; the type is metadata checked against the ontology.
macro_rules! identity_by_name {
    ($ty:ident, $field:ident) => {
        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                self.$field == other.$field
            }
        }

        impl Eq for $ty {}

        impl PartialOrd for $ty {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $ty {
            fn cmp(&self, other: &Self) -> Ordering {
                self.$field.cmp(&other.$field)
            }
        }

        impl Hash for $ty {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.$field.hash(state);
            }
        }
    };
}

/// A ground value, optionally typed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Entity {
    pub value: String,
    pub ty: Option<String>,
}

identity_by_name!(Entity, value);

impl Entity {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ty: None,
        }
    }

    pub fn typed(value: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ty: Some(ty.into()),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.value.parse().ok()
    }
}

/// A placeholder bound at planning time. Names always start with `?`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Parameter {
    pub name: String,
    pub ty: Option<String>,
}

identity_by_name!(Parameter, name);

impl Parameter {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let name = if name.starts_with('?') {
            name
        } else {
            format!("?{name}")
        };
        Self { name, ty: None }
    }

    pub fn typed(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            ty: Some(ty.into()),
            ..Self::new(name)
        }
    }

    pub fn any() -> Self {
        Self::new(ANY_VALUE)
    }
}

// "name" or "name - type"
fn split_typed(text: &str) -> (&str, Option<&str>) {
    match text.split_once(" - ") {
        Some((name, ty)) => (name.trim(), Some(ty.trim())),
        None => (text.trim(), None),
    }
}

fn is_valid_symbol(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| !c.is_whitespace() && !"()=,&!~?$".contains(c))
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ty {
            Some(ty) => write!(f, "{} - {}", self.value, ty),
            None => f.write_str(&self.value),
        }
    }
}

impl FromStr for Entity {
    type Err = PlannerError;

    fn from_str(text: &str) -> Result<Self> {
        let (value, ty) = split_typed(text);
        if !is_valid_symbol(value) {
            return Err(PlannerError::InvalidFact(text.to_owned()));
        }
        Ok(Self {
            value: value.to_owned(),
            ty: ty.map(str::to_owned),
        })
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ty {
            Some(ty) => write!(f, "{} - {}", self.name, ty),
            None => f.write_str(&self.name),
        }
    }
}

impl FromStr for Parameter {
    type Err = PlannerError;

    fn from_str(text: &str) -> Result<Self> {
        let (name, ty) = split_typed(text);
        match name.strip_prefix('?') {
            Some(rest) if is_valid_symbol(rest) => Ok(Self {
                name: name.to_owned(),
                ty: ty.map(str::to_owned),
            }),
            _ => Err(PlannerError::InvalidFact(text.to_owned())),
        }
    }
}

impl TryFrom<String> for Entity {
    type Error = PlannerError;

    fn try_from(text: String) -> Result<Self> {
        text.parse()
    }
}

impl From<Entity> for String {
    fn from(entity: Entity) -> Self {
        entity.to_string()
    }
}

impl TryFrom<String> for Parameter {
    type Error = PlannerError;

    fn try_from(text: String) -> Result<Self> {
        text.parse()
    }
}

impl From<Parameter> for String {
    fn from(parameter: Parameter) -> Self {
        parameter.to_string()
    }
}

/// Argument of a fact: either a ground entity or a parameter.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Term {
    Entity(Entity),
    Parameter(Parameter),
}

impl Term {
    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Term::Entity(entity) => Some(entity),
            Term::Parameter(_) => None,
        }
    }

    pub fn as_parameter(&self) -> Option<&Parameter> {
        match self {
            Term::Parameter(parameter) => Some(parameter),
            Term::Entity(_) => None,
        }
    }

    pub(crate) fn substitute(&self, assignment: &Assignment) -> Term {
        match self {
            Term::Parameter(parameter) => match assignment.get(parameter) {
                Some(entity) => Term::Entity(entity.clone()),
                None => self.clone(),
            },
            Term::Entity(_) => self.clone(),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Entity(entity) => f.write_str(&entity.value),
            Term::Parameter(parameter) => f.write_str(&parameter.name),
        }
    }
}

impl FromStr for Term {
    type Err = PlannerError;

    fn from_str(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.starts_with('?') {
            text.parse().map(Term::Parameter)
        } else {
            text.parse().map(Term::Entity)
        }
    }
}

impl TryFrom<String> for Term {
    type Error = PlannerError;

    fn try_from(text: String) -> Result<Self> {
        text.parse()
    }
}

impl From<Term> for String {
    fn from(term: Term) -> Self {
        term.to_string()
    }
}

impl From<Entity> for Term {
    fn from(entity: Entity) -> Self {
        Term::Entity(entity)
    }
}

impl From<Parameter> for Term {
    fn from(parameter: Parameter) -> Self {
        Term::Parameter(parameter)
    }
}

impl From<&str> for Term {
    fn from(text: &str) -> Self {
        if text.starts_with('?') {
            Term::Parameter(Parameter::new(text))
        } else {
            Term::Entity(Entity::new(text))
        }
    }
}

/// A named relation, `name(arg, ...)` with an optional fluent value.
///
/// Punctual facts (`~name(...)`) are instantaneous: they are never stored in
/// a world state and only trigger inferences.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fact {
    pub name: String,
    pub arguments: Vec<Term>,
    pub fluent: Option<Term>,
    pub punctual: bool,
}

impl Fact {
    pub fn new<T: Into<Term>>(name: impl Into<String>, arguments: impl IntoIterator<Item = T>) -> Self {
        Self {
            name: name.into(),
            arguments: arguments.into_iter().map(Into::into).collect(),
            fluent: None,
            punctual: false,
        }
    }

    pub fn with_fluent(mut self, fluent: impl Into<Term>) -> Self {
        self.fluent = Some(fluent.into());
        self
    }

    pub fn without_fluent(mut self) -> Self {
        self.fluent = None;
        self
    }

    pub fn as_punctual(mut self) -> Self {
        self.punctual = true;
        self
    }

    /// Smallest fact with this name, used as a range bound.
    pub(crate) fn lower_bound(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            arguments: Vec::new(),
            fluent: None,
            punctual: false,
        }
    }

    fn terms(&self) -> impl Iterator<Item = &Term> {
        self.arguments.iter().chain(self.fluent.iter())
    }

    pub fn is_ground(&self) -> bool {
        self.terms().all(|term| matches!(term, Term::Entity(_)))
    }

    pub fn parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.terms().filter_map(Term::as_parameter)
    }

    /// Same name and arguments, fluent ignored.
    pub fn same_key(&self, other: &Fact) -> bool {
        self.name == other.name && self.arguments == other.arguments
    }

    pub fn substitute(&self, assignment: &Assignment) -> Fact {
        Fact {
            name: self.name.clone(),
            arguments: self
                .arguments
                .iter()
                .map(|term| term.substitute(assignment))
                .collect(),
            fluent: self.fluent.as_ref().map(|term| term.substitute(assignment)),
            punctual: self.punctual,
        }
    }

    /// Replaces every parameter that has exactly one candidate value.
    pub fn substitute_values(&self, values: &ParameterValues) -> Fact {
        let assignment: Assignment = values
            .iter()
            .filter(|(_, candidates)| candidates.len() == 1)
            .filter_map(|(parameter, candidates)| {
                candidates
                    .first()
                    .map(|entity| (parameter.clone(), entity.clone()))
            })
            .collect();
        self.substitute(&assignment)
    }

    /// Unifies `self` (the pattern) with `target`, position by position.
    ///
    /// Parameters listed in `parameters` must take a value among their
    /// candidates (any value when the set is empty) and bind consistently.
    /// Other parameters, on either side, match anything. Returns the
    /// bindings of the listed parameters.
    pub fn match_against(
        &self,
        target: &Fact,
        parameters: &ParameterValues,
    ) -> Option<Vec<(Parameter, Entity)>> {
        if self.name != target.name || self.arguments.len() != target.arguments.len() {
            return None;
        }
        let mut bound = Vec::new();
        for (pattern, value) in self.arguments.iter().zip(&target.arguments) {
            if !bind_term(pattern, value, parameters, &mut bound) {
                return None;
            }
        }
        match (&self.fluent, &target.fluent) {
            (None, None) => {}
            (Some(pattern), Some(value)) => {
                if !bind_term(pattern, value, parameters, &mut bound) {
                    return None;
                }
            }
            _ => return None,
        }
        Some(bound)
    }

    /// Whether some substitution of parameters on both sides makes the two
    /// facts equal.
    pub fn unifiable_with(&self, other: &Fact) -> bool {
        self.match_against(other, &ParameterValues::new()).is_some()
    }

    /// Value found in `example` at the position where `self` holds
    /// `parameter`.
    pub fn extract_parameter_value<'a>(
        &self,
        parameter: &Parameter,
        example: &'a Fact,
    ) -> Option<&'a Term> {
        if self.name != example.name || self.arguments.len() != example.arguments.len() {
            return None;
        }
        let position = self
            .arguments
            .iter()
            .position(|term| term.as_parameter() == Some(parameter));
        match position {
            Some(index) => example.arguments.get(index),
            None if self.fluent.as_ref().and_then(Term::as_parameter) == Some(parameter) => {
                example.fluent.as_ref()
            }
            None => None,
        }
    }

    /// First parameter not listed in `declared`, if any.
    pub(crate) fn find_undeclared(&self, declared: &[Parameter]) -> Option<Undeclared> {
        let is_declared = |parameter: &Parameter| {
            parameter.name == ANY_VALUE || declared.contains(parameter)
        };
        if let Some(parameter) = self
            .arguments
            .iter()
            .filter_map(Term::as_parameter)
            .find(|parameter| !is_declared(parameter))
        {
            return Some(Undeclared::Argument(parameter.clone()));
        }
        match self.fluent.as_ref().and_then(Term::as_parameter) {
            Some(parameter) if !is_declared(parameter) => {
                Some(Undeclared::Fluent(parameter.clone()))
            }
            _ => None,
        }
    }
}

pub(crate) enum Undeclared {
    Argument(Parameter),
    Fluent(Parameter),
}

fn bind_term(
    pattern: &Term,
    value: &Term,
    parameters: &ParameterValues,
    bound: &mut Vec<(Parameter, Entity)>,
) -> bool {
    match (pattern, value) {
        (Term::Entity(expected), Term::Entity(found)) => expected == found,
        (Term::Parameter(parameter), Term::Entity(found)) => {
            if let Some((_, previous)) = bound.iter().find(|(p, _)| p == parameter) {
                return previous == found;
            }
            if let Some(candidates) = parameters.get(parameter) {
                if !candidates.is_empty() && !candidates.contains(found) {
                    return false;
                }
                bound.push((parameter.clone(), found.clone()));
            }
            true
        }
        (_, Term::Parameter(_)) => true,
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.punctual {
            f.write_str("~")?;
        }
        write!(f, "{}(", self.name)?;
        for (index, argument) in self.arguments.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{argument}")?;
        }
        f.write_str(")")?;
        if let Some(fluent) = &self.fluent {
            write!(f, "={fluent}")?;
        }
        Ok(())
    }
}

impl FromStr for Fact {
    type Err = PlannerError;

    fn from_str(text: &str) -> Result<Self> {
        let invalid = || PlannerError::InvalidFact(text.to_owned());
        let mut rest = text.trim();
        let punctual = match rest.strip_prefix('~') {
            Some(stripped) => {
                rest = stripped.trim_start();
                true
            }
            None => false,
        };

        let (name, arguments, fluent) = match rest.find('(') {
            Some(open) => {
                let close = rest.rfind(')').ok_or_else(invalid)?;
                if close < open {
                    return Err(invalid());
                }
                let inner = rest[open + 1..close].trim();
                let arguments = if inner.is_empty() {
                    Vec::new()
                } else {
                    inner
                        .split(',')
                        .map(str::parse)
                        .collect::<Result<Vec<Term>>>()
                        .map_err(|_| invalid())?
                };
                let tail = rest[close + 1..].trim();
                let fluent = match tail.strip_prefix('=') {
                    Some(value) => Some(value),
                    None if tail.is_empty() => None,
                    None => return Err(invalid()),
                };
                (rest[..open].trim(), arguments, fluent)
            }
            None => match rest.split_once('=') {
                Some((name, value)) => (name.trim(), Vec::new(), Some(value)),
                None => (rest, Vec::new(), None),
            },
        };

        if !is_valid_symbol(name) {
            return Err(invalid());
        }
        let fluent = fluent
            .map(|value| value.parse::<Term>().map_err(|_| invalid()))
            .transpose()?;
        Ok(Fact {
            name: name.to_owned(),
            arguments,
            fluent,
            punctual,
        })
    }
}

impl TryFrom<String> for Fact {
    type Error = PlannerError;

    fn try_from(text: String) -> Result<Self> {
        text.parse()
    }
}

impl From<Fact> for String {
    fn from(fact: Fact) -> Self {
        fact.to_string()
    }
}

/// A fact that must be present, or absent when `negated`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FactOptional {
    pub fact: Fact,
    pub negated: bool,
}

impl FactOptional {
    pub fn new(fact: Fact, negated: bool) -> Self {
        Self { fact, negated }
    }

    pub fn present(fact: Fact) -> Self {
        Self::new(fact, false)
    }

    pub fn absent(fact: Fact) -> Self {
        Self::new(fact, true)
    }
}

impl fmt::Display for FactOptional {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            f.write_str("!")?;
        }
        write!(f, "{}", self.fact)
    }
}

impl FromStr for FactOptional {
    type Err = PlannerError;

    fn from_str(text: &str) -> Result<Self> {
        let text = text.trim();
        match text.strip_prefix('!') {
            Some(rest) => rest.parse().map(Self::absent),
            None => text.parse().map(Self::present),
        }
    }
}

impl TryFrom<String> for FactOptional {
    type Error = PlannerError;

    fn try_from(text: String) -> Result<Self> {
        text.parse()
    }
}

impl From<FactOptional> for String {
    fn from(fact: FactOptional) -> Self {
        fact.to_string()
    }
}

/// Facts of `set` named `name`, in order.
pub fn facts_named<'s, 'n>(
    set: &'s BTreeSet<Fact>,
    name: &'n str,
) -> impl Iterator<Item = &'s Fact> + use<'s, 'n> {
    set.range(Fact::lower_bound(name)..)
        .take_while(move |fact| fact.name == name)
}

/// Every assignment picking one candidate per bound parameter, in order.
/// Parameters without candidates are left out.
pub fn assignments(values: &ParameterValues) -> Vec<Assignment> {
    let mut result = vec![Assignment::new()];
    for (parameter, candidates) in values.iter().filter(|(_, c)| !c.is_empty()) {
        result = result
            .into_iter()
            .flat_map(|partial| {
                candidates.iter().map(move |entity| {
                    let mut next = partial.clone();
                    next.insert(parameter.clone(), entity.clone());
                    next
                })
            })
            .collect();
    }
    result
}

/// Narrows `parameters` with values found by a successful match.
pub(crate) fn narrow(parameters: &mut ParameterValues, found: ParameterValues) {
    for (parameter, values) in found {
        if let Some(slot) = parameters.get_mut(&parameter) {
            if slot.is_empty() {
                *slot = values;
            } else {
                slot.retain(|value| values.contains(value));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fact(text: &str) -> Fact {
        text.parse().unwrap()
    }

    #[test]
    fn parses_and_prints_text_form() {
        let parsed = fact("at(robot, ?place)=3");
        assert_eq!(parsed.name, "at");
        assert_eq!(parsed.arguments.len(), 2);
        assert_eq!(parsed.fluent, Some(Term::Entity(Entity::new("3"))));
        assert_eq!(parsed.to_string(), "at(robot, ?place)=3");

        assert_eq!(fact("~ping").to_string(), "~ping()");
        assert!("at(robot".parse::<Fact>().is_err());
        assert!("(robot)".parse::<Fact>().is_err());
    }

    #[test]
    fn match_binds_listed_parameters_consistently() {
        let pattern = fact("link(?a, ?a)");
        let mut values = ParameterValues::new();
        values.insert(Parameter::new("?a"), BTreeSet::new());

        let bound = pattern.match_against(&fact("link(x, x)"), &values).unwrap();
        assert_eq!(bound, vec![(Parameter::new("?a"), Entity::new("x"))]);
        assert!(pattern.match_against(&fact("link(x, y)"), &values).is_none());

        values.insert(Parameter::new("?a"), [Entity::new("y")].into());
        assert!(pattern.match_against(&fact("link(x, x)"), &values).is_none());
    }

    #[test]
    fn fluent_presence_must_agree() {
        let values = ParameterValues::new();
        assert!(fact("battery(r)").match_against(&fact("battery(r)=3"), &values).is_none());
        assert!(fact("battery(r)=?v").match_against(&fact("battery(r)=3"), &values).is_some());
    }

    #[test]
    fn assignments_enumerate_in_order() {
        let mut values = ParameterValues::new();
        values.insert(Parameter::new("?a"), [Entity::new("1"), Entity::new("2")].into());
        values.insert(Parameter::new("?b"), BTreeSet::new());
        let all = assignments(&values);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0][&Parameter::new("?a")], Entity::new("1"));
        assert!(!all[0].contains_key(&Parameter::new("?b")));
    }

    #[test]
    fn facts_named_is_a_range() {
        let set: BTreeSet<Fact> = ["a(x)", "b(x)", "b(y)=1", "c"].iter().map(|t| fact(t)).collect();
        let names: Vec<String> = facts_named(&set, "b").map(ToString::to_string).collect();
        assert_eq!(names, vec!["b(x)", "b(y)=1"]);
    }
}
