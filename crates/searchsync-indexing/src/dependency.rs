//! Dependency discovery: which documents embed data from a given document.
//!
//! An owner type depends on a document when one of its projected fields walks
//! a relation whose target the document's type can be. Discovery first probes
//! the schema of each candidate owner type, and only pages through real owner
//! records when the probe finds a plausible hop.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use searchsync_types::{
    resolve_path, ConfigError, Document, DocumentError, DocumentHandle, Field, Record, Resolved,
    TypeRegistry, View, ID_SEGMENT,
};

use crate::context::RecordContext;

/// A relation prefix of a field path that can reach the document's type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hop {
    /// Dot-separated relation path from the owner
    pub path: String,
    /// Whether any relation along the prefix is a collection
    pub collection: bool,
}

/// Walk `field`'s path over the schema of `owner_type`, collecting every
/// relation prefix whose target `document_type` is or descends from.
///
/// A segment that is neither a relation nor a final attribute is a broken
/// field declaration.
pub fn probe_field(
    registry: &TypeRegistry,
    owner_type: &str,
    field: &Field,
    document_type: &str,
) -> Result<Vec<Hop>, ConfigError> {
    let segments = field.path_segments();
    let mut declared = owner_type.to_string();
    let mut collection = false;
    let mut hops = Vec::new();

    for (position, segment) in segments.iter().enumerate() {
        let last = position + 1 == segments.len();

        if let Some(relation) = registry.relation(&declared, segment) {
            collection |= relation.kind.is_collection();
            declared = relation.target.clone();
            if registry.is_subtype_of(document_type, &declared) {
                hops.push(Hop {
                    path: segments[..=position].join("."),
                    collection,
                });
            }
            continue;
        }

        if last && (*segment == ID_SEGMENT || registry.has_attribute(&declared, segment)) {
            break;
        }

        return Err(ConfigError::UnknownPathSegment {
            type_name: declared,
            path: field.source_path().to_string(),
            segment: segment.to_string(),
        });
    }

    Ok(hops)
}

fn reaches(
    ctx: &RecordContext,
    view: View,
    owner: &Record,
    hop: &Hop,
    document: &dyn Document,
) -> Result<bool, DocumentError> {
    let registry = ctx.store().registry();
    let reached = match resolve_path(ctx.store().as_ref(), view, owner, &hop.path)? {
        Resolved::Records(records) => records,
        Resolved::Value(_) => return Ok(false),
    };
    let is_document = |record: &Record| {
        record.id == document.source_id()
            && registry.base_type(&record.type_name) == document.base_type()
    };

    if hop.collection {
        Ok(reached.iter().any(is_document))
    } else {
        Ok(reached.first().is_some_and(is_document))
    }
}

/// Documents whose projected fields reach `document` in `view`, deduplicated
/// by identifier. The document itself may appear; callers drop self-references.
pub fn discover_dependents(
    ctx: &Arc<RecordContext>,
    document: &dyn Document,
    view: View,
) -> Result<Vec<DocumentHandle>, DocumentError> {
    let config = ctx.config();
    let store = ctx.store();
    let registry = store.registry();
    let batch_size = config.default_batch_size();

    let mut seen: HashSet<String> = HashSet::new();
    let mut dependents: Vec<DocumentHandle> = Vec::new();

    for owner_type in config.searchable_classes() {
        // Per index: a field dropped by one index may still be projected by another
        let mut hops: Vec<Hop> = Vec::new();
        for index in config.index_names() {
            for field in config.fields_for_index(index, owner_type) {
                if !field.is_relational() {
                    continue;
                }
                for hop in probe_field(registry, owner_type, &field, document.source_type())? {
                    if !hops.contains(&hop) {
                        hops.push(hop);
                    }
                }
            }
        }
        if hops.is_empty() {
            continue;
        }
        debug!(
            owner_type,
            document = %document.identifier(),
            hops = hops.len(),
            "Scanning owners for dependents"
        );

        let mut offset = 0;
        loop {
            let owners = store.query(view, owner_type, batch_size, offset)?;
            if owners.is_empty() {
                break;
            }
            offset += owners.len();

            for owner in owners {
                let mut depends = false;
                for hop in &hops {
                    if reaches(ctx, view, &owner, hop, document)? {
                        depends = true;
                        break;
                    }
                }
                if !depends {
                    continue;
                }
                let dependent = ctx.document_from_record(owner);
                if seen.insert(dependent.identifier()) {
                    dependents.push(Arc::new(dependent));
                }
            }
        }
    }

    debug!(
        document = %document.identifier(),
        count = dependents.len(),
        "Discovered dependents"
    );
    Ok(dependents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use searchsync_config::IndexConfiguration;
    use searchsync_types::{
        DependencyTracking, IncludeSettings, IndexSettings, MemoryRecordStore, RecordStore,
        SearchSettings, TypeDef,
    };

    fn registry() -> TypeRegistry {
        TypeRegistry::new(vec![
            TypeDef::new("Page").attribute("title").versioned(),
            TypeDef::new("Article")
                .extends("Page")
                .many_many("tags", "Tag")
                .has_one("author", "Author"),
            TypeDef::new("Tag").attribute("name"),
            TypeDef::new("Author").attribute("name").has_one("team", "Team"),
            TypeDef::new("Team").attribute("title"),
        ])
        .unwrap()
    }

    fn setup(fields: IncludeSettings) -> (Arc<MemoryRecordStore>, Arc<RecordContext>) {
        let registry = registry();
        let store = Arc::new(MemoryRecordStore::new(registry.clone()));
        let settings = SearchSettings::default().with_index(
            "main",
            IndexSettings::new()
                .include(fields)
                .include(IncludeSettings::new("Tag").field("name")),
        );
        let mut settings = settings;
        settings.default_batch_size = 2;
        let config = IndexConfiguration::new(settings, Arc::new(registry)).unwrap();
        let store_dyn: Arc<dyn RecordStore> = store.clone();
        (store, Arc::new(RecordContext::new(store_dyn, Arc::new(config))))
    }

    fn article(id: u64, tags: Vec<u64>) -> Record {
        Record::new("Article", id)
            .with_attribute("title", format!("Article {}", id))
            .with_link("tags", tags)
    }

    fn publish(store: &MemoryRecordStore, record: Record) {
        let (type_name, id) = (record.type_name.clone(), record.id);
        store.write(record).unwrap();
        store.publish(&type_name, id).unwrap();
    }

    fn ids(documents: &[DocumentHandle]) -> Vec<String> {
        let mut ids: Vec<String> = documents.iter().map(|d| d.identifier()).collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_probe_finds_collection_and_to_one_hops() {
        let registry = registry();
        let field = Field::new("tags").with_property("tags.name");
        assert_eq!(
            probe_field(&registry, "Article", &field, "Tag").unwrap(),
            vec![Hop { path: "tags".into(), collection: true }]
        );
        assert!(probe_field(&registry, "Article", &field, "Author").unwrap().is_empty());

        let field = Field::new("team").with_property("author.team.title");
        assert_eq!(
            probe_field(&registry, "Article", &field, "Team").unwrap(),
            vec![Hop { path: "author.team".into(), collection: false }]
        );
        assert_eq!(
            probe_field(&registry, "Article", &field, "Author").unwrap(),
            vec![Hop { path: "author".into(), collection: false }]
        );
    }

    #[test]
    fn test_probe_rejects_unknown_segments() {
        let registry = registry();
        let field = Field::new("x").with_property("tags.colour");
        assert!(matches!(
            probe_field(&registry, "Article", &field, "Tag"),
            Err(ConfigError::UnknownPathSegment { .. })
        ));
        let field = Field::new("x").with_property("comments.name");
        assert!(probe_field(&registry, "Article", &field, "Tag").is_err());
    }

    #[test]
    fn test_collection_membership() {
        let (store, ctx) = setup(
            IncludeSettings::new("Article")
                .field("title")
                .field_with_property("tags", "tags.name"),
        );
        store.write(Record::new("Tag", 1).with_attribute("name", "rust")).unwrap();
        store.write(Record::new("Tag", 2).with_attribute("name", "go")).unwrap();
        for (id, tags) in [(1, vec![1]), (2, vec![2]), (3, vec![1, 2]), (4, vec![1]), (5, vec![])] {
            publish(&store, article(id, tags));
        }

        let tag = ctx.document("Tag", 1).unwrap().unwrap();
        let dependents = tag.dependent_documents().unwrap();
        assert_eq!(ids(&dependents), vec!["page_1", "page_3", "page_4"]);
    }

    #[test]
    fn test_to_one_chain_membership() {
        let (store, ctx) = setup(
            IncludeSettings::new("Article").field_with_property("team", "author.team.title"),
        );
        store.write(Record::new("Team", 1).with_attribute("title", "Core")).unwrap();
        store.write(Record::new("Team", 2).with_attribute("title", "Docs")).unwrap();
        store.write(Record::new("Author", 1).with_link("team", vec![1])).unwrap();
        store.write(Record::new("Author", 2).with_link("team", vec![2])).unwrap();
        publish(&store, Record::new("Article", 1).with_link("author", vec![1]));
        publish(&store, Record::new("Article", 2).with_link("author", vec![2]));

        let team = ctx.document("Team", 2).unwrap().unwrap();
        assert_eq!(ids(&team.dependent_documents().unwrap()), vec!["page_2"]);

        let author = ctx.document("Author", 1).unwrap().unwrap();
        assert_eq!(ids(&author.dependent_documents().unwrap()), vec!["page_1"]);
    }

    #[test]
    fn test_archived_view_sees_removed_links() {
        let (store, ctx) = setup(
            IncludeSettings::new("Article").field_with_property("tags", "tags.name"),
        );
        let t0 = Utc::now() - Duration::hours(1);
        store.write_at(Record::new("Tag", 1), t0).unwrap();
        store.write_at(article(1, vec![1]), t0).unwrap();
        store.publish_at("Article", 1, t0).unwrap();
        store.delete_at("Tag", 1, t0 + Duration::minutes(30)).unwrap();

        let tag = ctx
            .rehydrate(&searchsync_types::DocumentRef::new("Tag", 1).with_archive_fallback())
            .unwrap()
            .unwrap();
        let tracking = tag.dependency_tracking().unwrap();

        assert!(tracking.dependent_documents().unwrap().is_empty());
        let archived = tracking
            .dependent_documents_in(View::Archived(t0 + Duration::minutes(29)))
            .unwrap();
        assert_eq!(ids(&archived), vec!["page_1"]);
    }

    #[test]
    fn test_field_dropped_in_one_index_still_tracked() {
        let registry = registry();
        let store = Arc::new(MemoryRecordStore::new(registry.clone()));
        let settings = SearchSettings::default()
            .with_index(
                "main",
                IndexSettings::new()
                    .include(
                        IncludeSettings::new("Article")
                            .field("title")
                            .field_with_property("tags", "tags.name"),
                    )
                    .include(IncludeSettings::new("Tag").field("name")),
            )
            .with_index(
                "slim",
                IndexSettings::new().include(
                    IncludeSettings::new("Article")
                        .field("title")
                        .without_field("tags"),
                ),
            );
        let config = IndexConfiguration::new(settings, Arc::new(registry)).unwrap();
        let store_dyn: Arc<dyn RecordStore> = store.clone();
        let ctx = Arc::new(RecordContext::new(store_dyn, Arc::new(config)));

        store.write(Record::new("Tag", 1).with_attribute("name", "rust")).unwrap();
        publish(&store, article(1, vec![1]));
        publish(&store, article(2, vec![]));

        let tag = ctx.document("Tag", 1).unwrap().unwrap();
        assert_eq!(ids(&tag.dependent_documents().unwrap()), vec!["page_1"]);
    }

    #[test]
    fn test_unrelated_types_are_not_scanned() {
        let (store, ctx) = setup(IncludeSettings::new("Article").field("title"));
        store.write(Record::new("Tag", 1)).unwrap();
        publish(&store, article(1, vec![1]));

        let tag = ctx.document("Tag", 1).unwrap().unwrap();
        assert!(tag.dependent_documents().unwrap().is_empty());
    }
}
