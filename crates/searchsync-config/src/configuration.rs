//! Index membership, field projection and batch-size policy.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use searchsync_types::{
    ConfigError, Document, DocumentError, Field, IndexSettings, SearchSettings, TypeRegistry,
};

use crate::filter::IndexMembershipFilter;
use crate::projection::FieldTable;

/// Resolved index configuration.
///
/// Built once from [`SearchSettings`] and the type registry; field
/// declarations are validated and flattened per type at construction.
/// Membership per type is cached for the lifetime of the instance.
///
/// The `only_indexes` restriction is instance state. Use [`Self::scoped`] to
/// derive a restricted copy rather than mutating a shared instance.
pub struct IndexConfiguration {
    settings: SearchSettings,
    registry: Arc<TypeRegistry>,
    fields: FieldTable,
    only_indexes: Option<Vec<String>>,
    filters: Vec<Arc<dyn IndexMembershipFilter>>,
    membership: RwLock<HashMap<String, Vec<String>>>,
}

impl std::fmt::Debug for IndexConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexConfiguration")
            .field("indexes", &self.settings.indexes.keys().collect::<Vec<_>>())
            .field("only_indexes", &self.only_indexes)
            .field("filters", &self.filters.len())
            .finish()
    }
}

impl Clone for IndexConfiguration {
    fn clone(&self) -> Self {
        Self {
            settings: self.settings.clone(),
            registry: Arc::clone(&self.registry),
            fields: self.fields.clone(),
            only_indexes: self.only_indexes.clone(),
            filters: self.filters.clone(),
            membership: RwLock::new(HashMap::new()),
        }
    }
}

impl IndexConfiguration {
    pub fn new(settings: SearchSettings, registry: Arc<TypeRegistry>) -> Result<Self, ConfigError> {
        if settings.default_batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize(0));
        }

        for index in settings.indexes.values() {
            for include in &index.include {
                if !registry.contains(&include.type_name) {
                    return Err(ConfigError::UnknownType(include.type_name.clone()));
                }
                if include.batch_size == Some(0) {
                    return Err(ConfigError::InvalidBatchSize(0));
                }
            }
            for excluded in &index.exclude {
                if !registry.contains(excluded) {
                    return Err(ConfigError::UnknownType(excluded.clone()));
                }
            }
        }

        let fields = FieldTable::build(&settings, &registry)?;

        Ok(Self {
            settings,
            registry,
            fields,
            only_indexes: None,
            filters: Vec::new(),
            membership: RwLock::new(HashMap::new()),
        })
    }

    pub fn with_filter(mut self, filter: Arc<dyn IndexMembershipFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    pub fn enabled(&self) -> bool {
        self.settings.enabled
    }

    pub fn default_batch_size(&self) -> usize {
        self.settings.default_batch_size
    }

    pub fn max_cascade_depth(&self) -> usize {
        self.settings.max_cascade_depth
    }

    pub fn max_document_size(&self) -> Option<usize> {
        self.settings.max_document_size
    }

    pub fn use_sync_jobs(&self) -> bool {
        self.settings.use_sync_jobs
    }

    /// Restrict every query to the named indexes; `None` lifts the restriction.
    pub fn set_only_indexes(&mut self, only: Option<Vec<String>>) -> Result<(), ConfigError> {
        if let Some(names) = &only {
            for name in names {
                if !self.settings.indexes.contains_key(name) {
                    return Err(ConfigError::UnknownIndex(name.clone()));
                }
            }
        }
        self.only_indexes = only;
        self.membership
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }

    /// A copy restricted to `only`, leaving this instance untouched.
    pub fn scoped(&self, only: Vec<String>) -> Result<Self, ConfigError> {
        let mut scoped = self.clone();
        scoped.set_only_indexes(Some(only))?;
        Ok(scoped)
    }

    pub fn only_indexes(&self) -> Option<&[String]> {
        self.only_indexes.as_deref()
    }

    fn is_active(&self, index: &str) -> bool {
        self.settings.indexes.contains_key(index)
            && self
                .only_indexes
                .as_ref()
                .map_or(true, |only| only.iter().any(|o| o == index))
    }

    /// Names of the configured indexes after the `only_indexes` restriction.
    pub fn index_names(&self) -> Vec<&str> {
        self.settings
            .indexes
            .keys()
            .filter(|name| self.is_active(name))
            .map(String::as_str)
            .collect()
    }

    pub fn index(&self, name: &str) -> Option<&IndexSettings> {
        self.settings.indexes.get(name).filter(|_| self.is_active(name))
    }

    /// Name of the index on the backend, with the variant prefix applied.
    pub fn backend_index_name(&self, name: &str) -> String {
        match &self.settings.index_variant {
            Some(variant) if !variant.is_empty() => format!("{}-{}", variant, name),
            _ => name.to_string(),
        }
    }

    fn compute_membership(&self, type_name: &str) -> Vec<String> {
        let ancestry = self.registry.ancestry(type_name);
        self.index_names()
            .into_iter()
            .filter(|name| {
                let Some(index) = self.settings.indexes.get(*name) else {
                    return false;
                };
                let included = index
                    .include
                    .iter()
                    .any(|i| i.enabled && ancestry.contains(&i.type_name));
                let excluded = index.exclude.iter().any(|e| ancestry.contains(e));
                included && !excluded
            })
            .map(str::to_string)
            .collect()
    }

    fn membership_names(&self, type_name: &str) -> Vec<String> {
        if let Some(names) = self
            .membership
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(type_name)
        {
            return names.clone();
        }

        let names = self.compute_membership(type_name);
        debug!(type_name, indexes = ?names, "Resolved index membership");
        self.membership
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(type_name.to_string(), names.clone());
        names
    }

    /// Indexes the type belongs to: the type or an ancestor is included with
    /// a non-false entry, and neither is excluded.
    pub fn indexes_for_type(&self, type_name: &str) -> BTreeMap<&str, &IndexSettings> {
        self.membership_names(type_name)
            .iter()
            .filter_map(|name| self.settings.indexes.get_key_value(name.as_str()))
            .map(|(name, index)| (name.as_str(), index))
            .collect()
    }

    /// Indexes for one document instance, after membership filters.
    pub fn indexes_for_document(&self, document: &dyn Document) -> Result<Vec<String>, DocumentError> {
        let mut names = self.membership_names(document.source_type());
        for filter in &self.filters {
            names = match filter.filter(document, names) {
                Ok(filtered) => filtered,
                Err(DocumentError::Unresolvable { identifier, reason }) if document.is_versioned() => {
                    debug!(%identifier, %reason, "Unresolvable versioned document has no indexes");
                    return Ok(Vec::new());
                }
                Err(e) => return Err(e),
            };
        }
        Ok(names)
    }

    pub fn is_indexed(&self, type_name: &str) -> bool {
        !self.membership_names(type_name).is_empty()
    }

    /// Every type named in any include, in configuration order.
    fn configured_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = Vec::new();
        for index in self.settings.indexes.values() {
            for include in index.include.iter().filter(|i| i.enabled) {
                if !types.contains(&include.type_name.as_str()) {
                    types.push(include.type_name.as_str());
                }
            }
        }
        types
    }

    /// Configured types that belong to `index`.
    pub fn classes_for_index(&self, index: &str) -> Vec<&str> {
        if !self.is_active(index) {
            return Vec::new();
        }
        self.configured_types()
            .into_iter()
            .filter(|t| self.membership_names(t).iter().any(|n| n == index))
            .collect()
    }

    /// Union of `classes_for_index` over the active indexes.
    pub fn searchable_classes(&self) -> Vec<&str> {
        let mut classes: Vec<&str> = Vec::new();
        for index in self.index_names() {
            for class in self.classes_for_index(index) {
                if !classes.contains(&class) {
                    classes.push(class);
                }
            }
        }
        classes
    }

    /// Searchable classes minus those that descend from another member.
    pub fn searchable_base_classes(&self) -> Vec<&str> {
        let classes = self.searchable_classes();
        classes
            .iter()
            .copied()
            .filter(|candidate| {
                !classes
                    .iter()
                    .any(|other| other != candidate && self.registry.is_subtype_of(candidate, other))
            })
            .collect()
    }

    /// Merged fields for the type across all of its active indexes.
    pub fn fields_for_type(&self, type_name: &str) -> Vec<Field> {
        let names = self.membership_names(type_name);
        self.fields
            .merge(type_name, |index| names.iter().any(|n| n == index))
    }

    /// Merged fields for the type within one index.
    pub fn fields_for_index(&self, index: &str, type_name: &str) -> Vec<Field> {
        if !self.membership_names(type_name).iter().any(|n| n == index) {
            return Vec::new();
        }
        self.fields.merge(type_name, |candidate| candidate == index)
    }

    /// Smallest batch size declared for the type or its ancestors within the
    /// relevant active indexes, else the default.
    pub fn lowest_batch_size_for_type(&self, type_name: &str, index: Option<&str>) -> usize {
        let ancestry = self.registry.ancestry(type_name);
        self.membership_names(type_name)
            .iter()
            .filter(|name| index.map_or(true, |wanted| wanted == name.as_str()))
            .filter_map(|name| self.settings.indexes.get(name))
            .flat_map(|index| index.include.iter())
            .filter(|include| include.enabled && ancestry.contains(&include.type_name))
            .filter_map(|include| include.batch_size)
            .min()
            .unwrap_or(self.settings.default_batch_size)
    }

    /// Smallest batch size over `type_name` and every searchable subtype, for
    /// sources that yield records of the whole family.
    pub fn lowest_batch_size_for_family(&self, type_name: &str, index: Option<&str>) -> usize {
        self.searchable_classes()
            .into_iter()
            .filter(|class| self.registry.is_subtype_of(class, type_name))
            .map(|class| self.lowest_batch_size_for_type(class, index))
            .min()
            .unwrap_or_else(|| self.lowest_batch_size_for_type(type_name, index))
    }

    /// Batch size with precedence: explicit, lowest declared, default.
    pub fn resolve_batch_size(
        &self,
        explicit: Option<usize>,
        type_name: &str,
        index: Option<&str>,
    ) -> Result<usize, ConfigError> {
        match explicit {
            Some(0) => Err(ConfigError::InvalidBatchSize(0)),
            Some(size) => Ok(size),
            None => Ok(self.lowest_batch_size_for_type(type_name, index)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FnFilter;
    use searchsync_types::{FieldValue, IncludeSettings, RecordId, TypeDef};

    fn registry() -> Arc<TypeRegistry> {
        Arc::new(
            TypeRegistry::new(vec![
                TypeDef::new("Page").attribute("title").attribute("content").versioned(),
                TypeDef::new("Article").extends("Page").attribute("summary"),
                TypeDef::new("NewsArticle").extends("Article"),
                TypeDef::new("Secret").extends("Page"),
                TypeDef::new("Tag").attribute("name"),
                TypeDef::new("File").attribute("name"),
            ])
            .unwrap(),
        )
    }

    fn settings() -> SearchSettings {
        SearchSettings::default()
            .with_index(
                "main",
                IndexSettings::new()
                    .include(IncludeSettings::new("Page").field("title").field("content"))
                    .include(IncludeSettings::new("Article").batch_size(75).field("summary"))
                    .include(IncludeSettings::new("Tag").field("name"))
                    .exclude("Secret"),
            )
            .with_index(
                "articles",
                IndexSettings::new()
                    .include(IncludeSettings::new("Article").batch_size(25).field("title"))
                    .include(IncludeSettings::new("File").disabled()),
            )
    }

    fn config() -> IndexConfiguration {
        IndexConfiguration::new(settings(), registry()).unwrap()
    }

    #[test]
    fn test_indexes_for_type_walks_ancestry() {
        let config = config();
        let names: Vec<&str> = config.indexes_for_type("NewsArticle").keys().copied().collect();
        assert_eq!(names, vec!["articles", "main"]);
        let names: Vec<&str> = config.indexes_for_type("Page").keys().copied().collect();
        assert_eq!(names, vec!["main"]);
        assert!(config.indexes_for_type("Secret").is_empty());
        assert!(config.indexes_for_type("File").is_empty());
        assert!(!config.is_indexed("File"));
    }

    #[test]
    fn test_membership_is_symmetric() {
        let config = config();
        for index in config.index_names() {
            for class in config.classes_for_index(index) {
                assert!(config.indexes_for_type(class).contains_key(index));
            }
        }
        for class in config.searchable_classes() {
            for index in config.indexes_for_type(class).keys() {
                assert!(config.classes_for_index(index).contains(&class));
            }
        }
    }

    #[test]
    fn test_searchable_base_classes() {
        let config = config();
        assert_eq!(config.searchable_classes(), vec!["Article", "Page", "Tag"]);
        assert_eq!(config.searchable_base_classes(), vec!["Page", "Tag"]);
    }

    #[test]
    fn test_fields_for_type_merges_indexes() {
        let config = config();
        let names: Vec<String> = config
            .fields_for_type("Article")
            .iter()
            .map(|f| f.search_name().to_string())
            .collect();
        assert_eq!(names, vec!["title", "summary", "content"]);

        let names: Vec<String> = config
            .fields_for_index("articles", "NewsArticle")
            .iter()
            .map(|f| f.search_name().to_string())
            .collect();
        assert_eq!(names, vec!["title"]);
        assert!(config.fields_for_index("articles", "Tag").is_empty());
    }

    #[test]
    fn test_lowest_batch_size_wins() {
        let mut config = config();
        assert_eq!(config.lowest_batch_size_for_type("Article", None), 25);
        assert_eq!(config.lowest_batch_size_for_type("Article", Some("main")), 75);
        assert_eq!(config.lowest_batch_size_for_type("Tag", None), 100);

        config.set_only_indexes(Some(vec!["main".into()])).unwrap();
        assert_eq!(config.lowest_batch_size_for_type("Article", None), 75);
        assert!(config.classes_for_index("articles").is_empty());

        config.set_only_indexes(None).unwrap();
        assert_eq!(config.lowest_batch_size_for_type("NewsArticle", None), 25);
    }

    #[test]
    fn test_family_batch_size_includes_subtypes() {
        let config = config();
        assert_eq!(config.lowest_batch_size_for_type("Page", None), 100);
        assert_eq!(config.lowest_batch_size_for_family("Page", None), 25);
        assert_eq!(config.lowest_batch_size_for_family("Page", Some("main")), 75);
        assert_eq!(config.lowest_batch_size_for_family("Tag", None), 100);
        assert_eq!(config.lowest_batch_size_for_family("File", None), 100);
    }

    #[test]
    fn test_resolve_batch_size_precedence() {
        let config = config();
        assert_eq!(config.resolve_batch_size(Some(3), "Article", None).unwrap(), 3);
        assert_eq!(config.resolve_batch_size(None, "Article", None).unwrap(), 25);
        assert_eq!(config.resolve_batch_size(None, "Tag", None).unwrap(), 100);
        assert_eq!(
            config.resolve_batch_size(Some(0), "Tag", None).unwrap_err(),
            ConfigError::InvalidBatchSize(0)
        );
    }

    #[test]
    fn test_scoped_leaves_original_untouched() {
        let config = config();
        let scoped = config.scoped(vec!["articles".into()]).unwrap();
        assert_eq!(scoped.index_names(), vec!["articles"]);
        assert_eq!(config.index_names(), vec!["articles", "main"]);
        assert_eq!(
            config.scoped(vec!["nope".into()]).unwrap_err(),
            ConfigError::UnknownIndex("nope".into())
        );
    }

    #[test]
    fn test_validation_at_load() {
        let bad = SearchSettings::default().with_index(
            "main",
            IndexSettings::new().include(
                IncludeSettings::new("Page").field_spec("title", serde_json::json!({ "type": "text" })),
            ),
        );
        assert!(matches!(
            IndexConfiguration::new(bad, registry()),
            Err(ConfigError::FieldTypeOutsideOptions { .. })
        ));

        let bad = SearchSettings::default()
            .with_index("main", IndexSettings::new().include(IncludeSettings::new("Ghost")));
        assert_eq!(
            IndexConfiguration::new(bad, registry()).unwrap_err(),
            ConfigError::UnknownType("Ghost".into())
        );

        let bad = SearchSettings::default().with_index(
            "main",
            IndexSettings::new().include(IncludeSettings::new("Page").batch_size(0)),
        );
        assert_eq!(
            IndexConfiguration::new(bad, registry()).unwrap_err(),
            ConfigError::InvalidBatchSize(0)
        );
    }

    #[test]
    fn test_backend_index_name() {
        let config = config();
        assert_eq!(config.backend_index_name("main"), "main");

        let mut settings = settings();
        settings.index_variant = Some("dev".into());
        let config = IndexConfiguration::new(settings, registry()).unwrap();
        assert_eq!(config.backend_index_name("main"), "dev-main");
    }

    #[derive(Debug)]
    struct Probe {
        type_name: &'static str,
        versioned: bool,
    }

    impl Document for Probe {
        fn source_type(&self) -> &str {
            self.type_name
        }

        fn base_type(&self) -> &str {
            self.type_name
        }

        fn source_id(&self) -> RecordId {
            1
        }

        fn field_value(&self, _field: &Field) -> Result<FieldValue, DocumentError> {
            Ok(FieldValue::Null)
        }

        fn should_index(&self) -> Result<bool, DocumentError> {
            Ok(true)
        }

        fn is_versioned(&self) -> bool {
            self.versioned
        }
    }

    fn unresolvable(doc: &dyn Document, _: Vec<String>) -> Result<Vec<String>, DocumentError> {
        Err(DocumentError::Unresolvable {
            identifier: doc.identifier(),
            reason: "no subsite".into(),
        })
    }

    #[test]
    fn test_membership_filters() {
        let narrowing = config().with_filter(Arc::new(FnFilter(
            |_: &dyn Document, names: Vec<String>| -> Result<Vec<String>, DocumentError> {
                Ok(names.into_iter().filter(|n| n == "main").collect())
            },
        )));
        let doc = Probe { type_name: "Article", versioned: true };
        assert_eq!(narrowing.indexes_for_document(&doc).unwrap(), vec!["main".to_string()]);

        let failing = config().with_filter(Arc::new(FnFilter(unresolvable)));
        assert!(failing.indexes_for_document(&doc).unwrap().is_empty());

        let plain = Probe { type_name: "Tag", versioned: false };
        assert!(matches!(
            failing.indexes_for_document(&plain),
            Err(DocumentError::Unresolvable { .. })
        ));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn batch_size_never_exceeds_smallest_declaration(
                first in 1usize..500,
                second in 1usize..500,
                default in 1usize..500,
            ) {
                let mut settings = SearchSettings::default()
                    .with_index("a", IndexSettings::new().include(IncludeSettings::new("Page").batch_size(first)))
                    .with_index("b", IndexSettings::new().include(IncludeSettings::new("Article").batch_size(second)));
                settings.default_batch_size = default;
                let config = IndexConfiguration::new(settings, registry()).unwrap();

                prop_assert_eq!(config.lowest_batch_size_for_type("NewsArticle", None), first.min(second));
                prop_assert_eq!(config.lowest_batch_size_for_type("Page", None), first);
                prop_assert_eq!(config.lowest_batch_size_for_type("Tag", None), default);
            }
        }
    }
}
