//! Minimal typing: a single-inheritance type tree, typed constants and
//! predicate signatures.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Entity, Parameter};

/// Types with their optional parent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SetOfTypes {
    parents: BTreeMap<String, Option<String>>,
}

impl SetOfTypes {
    pub fn add_type(&mut self, name: impl Into<String>, parent: Option<&str>) {
        if let Some(parent) = parent {
            self.parents.entry(parent.to_owned()).or_insert(None);
        }
        self.parents.insert(name.into(), parent.map(str::to_owned));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.parents.contains_key(name)
    }

    /// Whether `sub` is `sup` or one of its descendants.
    pub fn is_a(&self, sub: &str, sup: &str) -> bool {
        let mut current = Some(sub);
        // The chain is at most as long as the number of types.
        for _ in 0..=self.parents.len() {
            match current {
                Some(name) if name == sup => return true,
                Some(name) => current = self.parents.get(name).and_then(|p| p.as_deref()),
                None => return false,
            }
        }
        false
    }
}

/// Entities keyed by value, with their optional type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SetOfEntities {
    entities: BTreeMap<String, Option<String>>,
}

impl SetOfEntities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, entity: Entity) {
        self.entities.insert(entity.value, entity.ty);
    }

    pub fn contains(&self, value: &str) -> bool {
        self.entities.contains_key(value)
    }

    pub fn type_of(&self, value: &str) -> Option<&str> {
        self.entities.get(value).and_then(|ty| ty.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Entity> + '_ {
        self.entities.iter().map(|(value, ty)| Entity {
            value: value.clone(),
            ty: ty.clone(),
        })
    }
}

impl FromIterator<Entity> for SetOfEntities {
    fn from_iter<I: IntoIterator<Item = Entity>>(iter: I) -> Self {
        let mut set = Self::new();
        for entity in iter {
            set.add(entity);
        }
        set
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predicate {
    pub parameters: Vec<Parameter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fluent: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ontology {
    #[serde(default, skip_serializing_if = "is_empty_types")]
    pub types: SetOfTypes,
    #[serde(default, skip_serializing_if = "SetOfEntities::is_empty")]
    pub constants: SetOfEntities,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub predicates: BTreeMap<String, Predicate>,
}

fn is_empty_types(types: &SetOfTypes) -> bool {
    types.parents.is_empty()
}

impl Ontology {
    /// Type of `entity`: its own, else the one declared for it in
    /// `entities` or among the constants.
    pub fn type_of<'a>(&'a self, entity: &'a Entity, entities: &'a SetOfEntities) -> Option<&'a str> {
        entity
            .ty
            .as_deref()
            .or_else(|| entities.type_of(&entity.value))
            .or_else(|| self.constants.type_of(&entity.value))
    }

    /// Whether `entity` may be bound to `parameter`. Untyped parameters and
    /// untyped entities accept anything.
    pub fn accepts(&self, parameter: &Parameter, entity: &Entity, entities: &SetOfEntities) -> bool {
        match (parameter.ty.as_deref(), self.type_of(entity, entities)) {
            (Some(expected), Some(found)) => self.types.is_a(found, expected),
            _ => true,
        }
    }

    /// First known entity accepted by a typed `parameter`.
    pub fn first_entity_of_type(&self, parameter: &Parameter, entities: &SetOfEntities) -> Option<Entity> {
        let expected = parameter.ty.as_deref()?;
        entities
            .iter()
            .chain(self.constants.iter())
            .find(|entity| {
                self.type_of(entity, entities)
                    .is_some_and(|found| self.types.is_a(found, expected))
            })
    }
}
