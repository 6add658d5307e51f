use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::schema::types::FieldKey;
use crate::schema::SchemaHandle;
use crate::store::Locator;

// ── Declarations ────────────────────────────────────────────────────────────

/// Index kinds the engine can maintain over a field path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    /// Ordered index over a single orderable scalar field.
    OrderedScalar,
}

impl IndexKind {
    pub fn name(&self) -> &'static str {
        match self {
            IndexKind::OrderedScalar => "ordered_scalar",
        }
    }

    pub fn from_name(name: &str) -> Option<IndexKind> {
        match name {
            "ordered_scalar" => Some(IndexKind::OrderedScalar),
            _ => None,
        }
    }
}

/// One index declaration: which field path to index and how.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub field_path: String,
    pub kind: IndexKind,
}

impl IndexInfo {
    pub fn ordered(field_path: impl Into<String>) -> Self {
        Self {
            field_path: field_path.into(),
            kind: IndexKind::OrderedScalar,
        }
    }
}

/// Comparison operators an index lookup understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Gt,
    GtEq,
    Lt,
    LtEq,
}

// ── Ordered scalar index ────────────────────────────────────────────────────

/// BTree from field key to the locators of every document carrying that key,
/// in insertion order. Lookups return locators in ascending key order.
#[derive(Debug, Default)]
struct OrderedScalarIndex {
    entries: BTreeMap<FieldKey, Vec<Locator>>,
    entry_count: usize,
}

impl OrderedScalarIndex {
    fn insert(&mut self, key: FieldKey, locator: Locator) {
        self.entries.entry(key).or_default().push(locator);
        self.entry_count += 1;
    }

    fn lookup(&self, op: CompareOp, key: &FieldKey) -> Vec<Locator> {
        let bounds = match op {
            CompareOp::Eq => (Bound::Included(key.clone()), Bound::Included(key.clone())),
            CompareOp::Gt => (Bound::Excluded(key.clone()), Bound::Unbounded),
            CompareOp::GtEq => (Bound::Included(key.clone()), Bound::Unbounded),
            CompareOp::Lt => (Bound::Unbounded, Bound::Excluded(key.clone())),
            CompareOp::LtEq => (Bound::Unbounded, Bound::Included(key.clone())),
        };
        self.entries
            .range(bounds)
            .flat_map(|(_, locators)| locators.iter().copied())
            .collect()
    }

    fn len(&self) -> usize {
        self.entry_count
    }
}

enum IndexData {
    OrderedScalar(OrderedScalarIndex),
}

struct CollectionIndex {
    info: IndexInfo,
    data: IndexData,
}

impl CollectionIndex {
    fn new(info: IndexInfo) -> Self {
        let data = match info.kind {
            IndexKind::OrderedScalar => IndexData::OrderedScalar(OrderedScalarIndex::default()),
        };
        Self { info, data }
    }

    fn insert(&mut self, key: FieldKey, locator: Locator) {
        match &mut self.data {
            IndexData::OrderedScalar(index) => index.insert(key, locator),
        }
    }

    fn lookup(&self, op: CompareOp, key: &FieldKey) -> Vec<Locator> {
        match &self.data {
            IndexData::OrderedScalar(index) => index.lookup(op, key),
        }
    }

    fn len(&self) -> usize {
        match &self.data {
            IndexData::OrderedScalar(index) => index.len(),
        }
    }
}

// ── Manager ─────────────────────────────────────────────────────────────────

/// All indexes of one collection, in declaration order. Indexes live in
/// memory only; they are rebuilt from the store when the database opens.
pub(crate) struct IndexManager {
    schema: Arc<SchemaHandle>,
    indexes: Vec<CollectionIndex>,
}

impl IndexManager {
    pub fn new(schema: Arc<SchemaHandle>) -> Self {
        Self {
            schema,
            indexes: Vec::new(),
        }
    }

    pub fn add(&mut self, info: IndexInfo) {
        self.indexes.push(CollectionIndex::new(info));
    }

    /// Feeds one committed document into every index. A value that cannot be
    /// indexed (absent, unreadable or not orderable) is skipped; it will
    /// simply never match an indexed predicate.
    pub fn on_insert(&mut self, locator: Locator, document: &[u8]) {
        let schema = &self.schema;
        for index in &mut self.indexes {
            let path = &index.info.field_path;
            match schema.extract(document, path) {
                Ok(Some(value)) => match value.as_key() {
                    Some(key) => index.insert(key, locator),
                    None => log::warn!(
                        "index '{path}': {} value at {locator} is not orderable, skipped",
                        value.type_name()
                    ),
                },
                Ok(None) => {}
                Err(e) => {
                    log::warn!("index '{path}': could not extract value at {locator}: {e}")
                }
            }
        }
    }

    /// Runs a lookup against the index covering `path`, or `None` when no
    /// index covers it.
    pub fn lookup(&self, path: &str, op: CompareOp, key: &FieldKey) -> Option<Vec<Locator>> {
        self.index_for(path).map(|index| index.lookup(op, key))
    }

    pub fn covers(&self, path: &str) -> bool {
        self.index_for(path).is_some()
    }

    /// Declaration position of the index covering `path`, used to break
    /// planner ties deterministically.
    pub fn position(&self, path: &str) -> Option<usize> {
        self.indexes
            .iter()
            .position(|index| index.info.field_path == path)
    }

    pub fn infos(&self) -> Vec<IndexInfo> {
        self.indexes.iter().map(|index| index.info.clone()).collect()
    }

    pub fn indexed_values(&self, path: &str) -> Option<usize> {
        self.index_for(path).map(|index| index.len())
    }

    fn index_for(&self, path: &str) -> Option<&CollectionIndex> {
        self.indexes
            .iter()
            .find(|index| index.info.field_path == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{FormatRegistry, SchemaFormat};
    use crate::schema::SchemaCatalog;
    use bson::doc;

    fn schema() -> Arc<SchemaHandle> {
        let catalog = SchemaCatalog::new(Arc::new(FormatRegistry::with_builtin()));
        let descriptor = bson::to_vec(&doc! {
            "name": "character",
            "fields": {
                "name": "string",
                "age": "int",
                "house": "string",
                "rating": "float",
            }
        })
        .unwrap();
        catalog.register(SchemaFormat::Bson, &descriptor).unwrap()
    }

    fn manager_with_docs(docs: &[bson::Document]) -> IndexManager {
        let mut manager = IndexManager::new(schema());
        manager.add(IndexInfo::ordered("house"));
        manager.add(IndexInfo::ordered("age"));
        for (i, doc) in docs.iter().enumerate() {
            let bytes = bson::to_vec(doc).unwrap();
            manager.on_insert(Locator::new(0, i as u64), &bytes);
        }
        manager
    }

    fn got_docs() -> Vec<bson::Document> {
        vec![
            doc! { "name": "Tyrion", "house": "Lannister", "age": 39 },
            doc! { "name": "Jon Snow", "house": "Stark", "age": 21 },
            doc! { "name": "Petyr Baelish", "house": "Baelish", "age": 51 },
        ]
    }

    #[test]
    fn test_equality_lookup() {
        let manager = manager_with_docs(&got_docs());
        let hits = manager
            .lookup("house", CompareOp::Eq, &FieldKey::Str("Stark".into()))
            .unwrap();
        assert_eq!(hits, vec![Locator::new(0, 1)]);
        let misses = manager
            .lookup("house", CompareOp::Eq, &FieldKey::Str("Tully".into()))
            .unwrap();
        assert!(misses.is_empty());
    }

    #[test]
    fn test_range_lookup_returns_ascending_key_order() {
        let manager = manager_with_docs(&got_docs());
        let hits = manager
            .lookup("age", CompareOp::Gt, &FieldKey::Int(25))
            .unwrap();
        // age 39 (Tyrion, locator 0) then age 51 (Baelish, locator 2).
        assert_eq!(hits, vec![Locator::new(0, 0), Locator::new(0, 2)]);

        let hits = manager
            .lookup("age", CompareOp::LtEq, &FieldKey::Int(39))
            .unwrap();
        assert_eq!(hits, vec![Locator::new(0, 1), Locator::new(0, 0)]);
    }

    #[test]
    fn test_float_bound_against_int_index() {
        let manager = manager_with_docs(&got_docs());
        let hits = manager
            .lookup("age", CompareOp::Gt, &FieldKey::Float(38.5))
            .unwrap();
        assert_eq!(hits, vec![Locator::new(0, 0), Locator::new(0, 2)]);
        let hits = manager
            .lookup("age", CompareOp::Eq, &FieldKey::Float(21.0))
            .unwrap();
        assert_eq!(hits, vec![Locator::new(0, 1)]);
    }

    #[test]
    fn test_duplicate_keys_keep_insertion_order() {
        let docs = vec![
            doc! { "name": "Sandor", "house": "Clegane", "age": 40 },
            doc! { "name": "Gregor", "house": "Clegane", "age": 45 },
        ];
        let manager = manager_with_docs(&docs);
        let hits = manager
            .lookup("house", CompareOp::Eq, &FieldKey::Str("Clegane".into()))
            .unwrap();
        assert_eq!(hits, vec![Locator::new(0, 0), Locator::new(0, 1)]);
    }

    #[test]
    fn test_absent_field_is_not_indexed() {
        let docs = vec![
            doc! { "name": "Varys", "age": 47 },
            doc! { "name": "Tyrion", "house": "Lannister", "age": 39 },
        ];
        let manager = manager_with_docs(&docs);
        assert_eq!(manager.indexed_values("house"), Some(1));
        let hits = manager
            .lookup("house", CompareOp::Gt, &FieldKey::Str("".into()))
            .unwrap();
        assert_eq!(hits, vec![Locator::new(0, 1)]);
    }

    #[test]
    fn test_uncovered_path_returns_none() {
        let manager = manager_with_docs(&got_docs());
        assert!(manager
            .lookup("name", CompareOp::Eq, &FieldKey::Str("Tyrion".into()))
            .is_none());
        assert!(manager.covers("age"));
        assert!(!manager.covers("name"));
        assert_eq!(manager.position("house"), Some(0));
        assert_eq!(manager.position("age"), Some(1));
    }

    #[test]
    fn test_nan_values_are_skipped() {
        let mut manager = IndexManager::new(schema());
        manager.add(IndexInfo::ordered("rating"));
        let bytes = bson::to_vec(&doc! { "name": "x", "rating": f64::NAN }).unwrap();
        manager.on_insert(Locator::new(0, 0), &bytes);
        assert_eq!(manager.indexed_values("rating"), Some(0));
    }
}
