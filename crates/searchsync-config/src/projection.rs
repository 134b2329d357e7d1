//! Field declarations and the flattened per-type field table.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use searchsync_types::{ConfigError, Field, SearchSettings, TypeRegistry};

/// A parsed field declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldDeclaration {
    /// Explicitly removed (`false`)
    Removed,
    Declared(Field),
}

/// Parse one entry of an include's `fields` table.
pub fn parse_field(
    type_name: &str,
    search_name: &str,
    spec: &Value,
) -> Result<FieldDeclaration, ConfigError> {
    let malformed = |reason: &str| ConfigError::MalformedField {
        type_name: type_name.to_string(),
        field: search_name.to_string(),
        reason: reason.to_string(),
    };

    match spec {
        Value::Bool(false) => Ok(FieldDeclaration::Removed),
        Value::Bool(true) => Ok(FieldDeclaration::Declared(Field::new(search_name))),
        Value::Object(table) => {
            if table.contains_key("type") {
                return Err(ConfigError::FieldTypeOutsideOptions {
                    type_name: type_name.to_string(),
                    field: search_name.to_string(),
                });
            }

            let mut field = Field::new(search_name);
            for (key, value) in table {
                match (key.as_str(), value) {
                    ("property", Value::String(property)) if !property.is_empty() => {
                        field = field.with_property(property.clone());
                    }
                    ("property", _) => return Err(malformed("`property` must be a non-empty string")),
                    ("options", Value::Object(options)) => {
                        field = field.with_options(options.clone());
                    }
                    ("options", _) => return Err(malformed("`options` must be a table")),
                    (other, _) => return Err(malformed(&format!("unknown key `{}`", other))),
                }
            }
            Ok(FieldDeclaration::Declared(field))
        }
        _ => Err(malformed("expected true, false or a table")),
    }
}

/// One declaration in a type's flattened table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableEntry {
    pub index: String,
    /// Type in the ancestry chain that carried the declaration.
    pub declared_on: String,
    pub search_name: String,
    pub declaration: FieldDeclaration,
}

/// Field declarations for every registered type, flattened over its ancestry.
///
/// Entries are level-major: all declarations on the type itself, then its
/// parent, up to the root. Within a level, indexes appear in name order and
/// fields in declaration order.
#[derive(Debug, Clone, Default)]
pub struct FieldTable {
    by_type: BTreeMap<String, Vec<TableEntry>>,
}

impl FieldTable {
    pub fn build(settings: &SearchSettings, registry: &TypeRegistry) -> Result<Self, ConfigError> {
        // Parse every declaration once, keyed by the type it is declared on.
        let mut declared: BTreeMap<&str, Vec<TableEntry>> = BTreeMap::new();
        for (index_name, index) in &settings.indexes {
            for include in index.include.iter().filter(|i| i.enabled) {
                let entries = declared.entry(include.type_name.as_str()).or_default();
                for (search_name, spec) in &include.fields {
                    entries.push(TableEntry {
                        index: index_name.clone(),
                        declared_on: include.type_name.clone(),
                        search_name: search_name.clone(),
                        declaration: parse_field(&include.type_name, search_name, spec)?,
                    });
                }
            }
        }

        let mut by_type = BTreeMap::new();
        for type_name in registry.type_names() {
            let flattened: Vec<TableEntry> = registry
                .ancestry(type_name)
                .iter()
                .filter_map(|level| declared.get(level.as_str()))
                .flat_map(|entries| entries.iter().cloned())
                .collect();
            by_type.insert(type_name.to_string(), flattened);
        }

        Ok(Self { by_type })
    }

    pub fn entries(&self, type_name: &str) -> &[TableEntry] {
        self.by_type
            .get(type_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Merge a type's declarations restricted to `indexes`.
    ///
    /// A name keeps the position of its first occurrence and the value of its
    /// last. A `false` anywhere removes the name.
    pub fn merge(&self, type_name: &str, indexes: impl Fn(&str) -> bool) -> Vec<Field> {
        let entries: Vec<&TableEntry> = self
            .entries(type_name)
            .iter()
            .filter(|e| indexes(&e.index))
            .collect();

        let removed: BTreeSet<&str> = entries
            .iter()
            .filter(|e| e.declaration == FieldDeclaration::Removed)
            .map(|e| e.search_name.as_str())
            .collect();

        let mut order: Vec<&str> = Vec::new();
        let mut merged: BTreeMap<&str, &Field> = BTreeMap::new();
        for entry in entries {
            let name = entry.search_name.as_str();
            if removed.contains(name) {
                continue;
            }
            if let FieldDeclaration::Declared(field) = &entry.declaration {
                if merged.insert(name, field).is_none() {
                    order.push(name);
                }
            }
        }

        order
            .into_iter()
            .filter_map(|name| merged.get(name).map(|f| (*f).clone()))
            .collect()
    }
}
