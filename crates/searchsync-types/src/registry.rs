//! Registered record type tree.
//!
//! Types form single-inheritance chains. Attributes and relations declared on
//! an ancestor are visible on every descendant. Ancestry is resolved once when
//! the registry is built so lookups never walk parent pointers.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Cardinality of a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// To-one relation
    HasOne,
    /// One-to-many relation
    HasMany,
    /// Many-to-many relation
    ManyMany,
}

impl RelationKind {
    pub fn is_collection(&self) -> bool {
        !matches!(self, RelationKind::HasOne)
    }
}

/// A relation from one type to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDef {
    pub kind: RelationKind,
    pub target: String,
}

/// Declaration of one record type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDef {
    pub name: String,
    pub parent: Option<String>,
    #[serde(default)]
    pub attributes: BTreeSet<String>,
    #[serde(default)]
    pub relations: BTreeMap<String, RelationDef>,
    /// Versioned types keep draft and live stages plus an archive.
    #[serde(default)]
    pub versioned: bool,
}

impl TypeDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            attributes: BTreeSet::new(),
            relations: BTreeMap::new(),
            versioned: false,
        }
    }

    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        self.attributes.insert(name.into());
        self
    }

    pub fn has_one(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.relation(name, RelationKind::HasOne, target)
    }

    pub fn has_many(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.relation(name, RelationKind::HasMany, target)
    }

    pub fn many_many(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.relation(name, RelationKind::ManyMany, target)
    }

    fn relation(
        mut self,
        name: impl Into<String>,
        kind: RelationKind,
        target: impl Into<String>,
    ) -> Self {
        self.relations.insert(
            name.into(),
            RelationDef {
                kind,
                target: target.into(),
            },
        );
        self
    }

    pub fn versioned(mut self) -> Self {
        self.versioned = true;
        self
    }
}

/// The registered type tree with precomputed ancestry chains.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: BTreeMap<String, TypeDef>,
    ancestry: BTreeMap<String, Vec<String>>,
}

impl TypeRegistry {
    /// Build a registry, validating that every parent and relation target exists.
    pub fn new(defs: impl IntoIterator<Item = TypeDef>) -> Result<Self, ConfigError> {
        let types: BTreeMap<String, TypeDef> =
            defs.into_iter().map(|d| (d.name.clone(), d)).collect();

        for def in types.values() {
            if let Some(parent) = &def.parent {
                if !types.contains_key(parent) {
                    return Err(ConfigError::UnknownType(parent.clone()));
                }
            }
            for relation in def.relations.values() {
                if !types.contains_key(&relation.target) {
                    return Err(ConfigError::UnknownType(relation.target.clone()));
                }
            }
        }

        let mut ancestry = BTreeMap::new();
        for name in types.keys() {
            let mut chain = vec![name.clone()];
            let mut current = types.get(name).and_then(|d| d.parent.clone());
            while let Some(parent) = current {
                if chain.contains(&parent) {
                    return Err(ConfigError::Settings(format!(
                        "type hierarchy of `{}` is cyclic",
                        name
                    )));
                }
                current = types.get(&parent).and_then(|d| d.parent.clone());
                chain.push(parent);
            }
            ancestry.insert(name.clone(), chain);
        }

        Ok(Self { types, ancestry })
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    pub fn get(&self, type_name: &str) -> Option<&TypeDef> {
        self.types.get(type_name)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// The type followed by its ancestors, most specific first.
    ///
    /// Unknown types yield an empty chain.
    pub fn ancestry(&self, type_name: &str) -> &[String] {
        self.ancestry
            .get(type_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Root of the type's inheritance chain.
    pub fn base_type<'a>(&'a self, type_name: &'a str) -> &'a str {
        self.ancestry(type_name)
            .last()
            .map(String::as_str)
            .unwrap_or(type_name)
    }

    /// Whether `type_name` is `ancestor` or descends from it.
    pub fn is_subtype_of(&self, type_name: &str, ancestor: &str) -> bool {
        self.ancestry(type_name).iter().any(|t| t == ancestor)
    }

    /// All registered types that are `type_name` or descend from it.
    pub fn descendants(&self, type_name: &str) -> Vec<&str> {
        self.types
            .keys()
            .filter(|t| self.is_subtype_of(t, type_name))
            .map(String::as_str)
            .collect()
    }

    pub fn is_versioned(&self, type_name: &str) -> bool {
        self.ancestry(type_name)
            .iter()
            .filter_map(|t| self.types.get(t))
            .any(|d| d.versioned)
    }

    /// Look up a relation on the type or any ancestor.
    pub fn relation(&self, type_name: &str, relation: &str) -> Option<&RelationDef> {
        self.ancestry(type_name)
            .iter()
            .filter_map(|t| self.types.get(t))
            .find_map(|d| d.relations.get(relation))
    }

    /// Whether the attribute is declared on the type or any ancestor.
    pub fn has_attribute(&self, type_name: &str, attribute: &str) -> bool {
        self.ancestry(type_name)
            .iter()
            .filter_map(|t| self.types.get(t))
            .any(|d| d.attributes.contains(attribute))
    }
}
