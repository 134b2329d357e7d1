//! Field projection rules.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A named field in a search index and where its value comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    search_name: String,
    property: Option<String>,
    #[serde(default)]
    options: Map<String, Value>,
}

impl Field {
    pub fn new(search_name: impl Into<String>) -> Self {
        Self {
            search_name: search_name.into(),
            property: None,
            options: Map::new(),
        }
    }

    pub fn with_property(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }

    pub fn with_options(mut self, options: Map<String, Value>) -> Self {
        self.options = options;
        self
    }

    /// Name of the field in the index.
    pub fn search_name(&self) -> &str {
        &self.search_name
    }

    /// Explicit dot-separated property path, if declared.
    pub fn property(&self) -> Option<&str> {
        self.property.as_deref()
    }

    /// Path used to read the value: the property, or the search name.
    pub fn source_path(&self) -> &str {
        self.property.as_deref().unwrap_or(&self.search_name)
    }

    /// Dot-separated segments of the source path.
    pub fn path_segments(&self) -> Vec<&str> {
        self.source_path().split('.').collect()
    }

    /// Whether the source path walks through at least one other record.
    pub fn is_relational(&self) -> bool {
        self.source_path().contains('.')
    }

    pub fn options(&self) -> &Map<String, Value> {
        &self.options
    }

    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }
}
