use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::buffer::DocumentBuffer;
use crate::catalog::Catalog;
use crate::error::{DbError, Result};
use crate::format::{FormatRegistry, SchemaFormat};
use crate::index::{IndexInfo, IndexManager};
use crate::query::{self, ResultSet};
use crate::schema::{SchemaCatalog, SchemaHandle};
use crate::store::DocumentStore;

const DEFAULT_SEGMENT_THRESHOLD: u64 = 4 * 1024 * 1024;

// ── Open options ────────────────────────────────────────────────────────────

/// Tunables for opening a database.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    create_if_missing: bool,
    segment_size_threshold: u64,
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether opening a database that does not exist yet creates it.
    /// Defaults to true.
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    /// Size at which the active segment of a collection is sealed and a new
    /// one opened. Defaults to 4 MiB.
    pub fn segment_size_threshold(mut self, bytes: u64) -> Self {
        self.segment_size_threshold = bytes;
        self
    }
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            segment_size_threshold: DEFAULT_SEGMENT_THRESHOLD,
        }
    }
}

// ── Collection ──────────────────────────────────────────────────────────────

/// Runtime state of one collection. Writers serialize on `write_lock`;
/// readers plan under the index read lock and then run lock-free against
/// their snapshot.
pub(crate) struct Collection {
    pub(crate) name: String,
    pub(crate) schema: Arc<SchemaHandle>,
    pub(crate) store: DocumentStore,
    pub(crate) indexes: RwLock<IndexManager>,
    write_lock: Mutex<()>,
}

// ── Database ────────────────────────────────────────────────────────────────

/// An embedded document database: a catalog file `<name>.dat` plus segment
/// files `<name>_<collection>.<n>`, all inside one root directory. A
/// database belongs to a single process at a time.
pub struct Database {
    name: String,
    root: PathBuf,
    options: OpenOptions,
    catalog: Catalog,
    schemas: SchemaCatalog,
    collections: RwLock<HashMap<String, Arc<Collection>>>,
}

impl Database {
    /// Opens `name` under `root` with default options, creating it when it
    /// does not exist yet.
    pub fn open(root: impl AsRef<Path>, name: &str) -> Result<Database> {
        Self::open_with_options(root, name, OpenOptions::default())
    }

    pub fn open_with_options(
        root: impl AsRef<Path>,
        name: &str,
        options: OpenOptions,
    ) -> Result<Database> {
        validate_identifier("database name", name)?;
        if options.segment_size_threshold == 0 {
            return Err(DbError::InvalidArgument(
                "segment_size_threshold must be positive".into(),
            ));
        }
        let root = root.as_ref().to_path_buf();
        let catalog_path = root.join(format!("{name}.dat"));
        if !catalog_path.exists() {
            if !options.create_if_missing {
                return Err(DbError::DatabaseNotFound(format!(
                    "no catalog at '{}'",
                    catalog_path.display()
                )));
            }
            std::fs::create_dir_all(&root)?;
            log::info!("creating database '{name}' in '{}'", root.display());
        }
        let catalog = Catalog::open(&catalog_path)?;
        let schemas = SchemaCatalog::new(Arc::new(FormatRegistry::with_builtin()));

        let mut collections = HashMap::new();
        for record in catalog.load_collections()? {
            let format = SchemaFormat::from_name(&record.format).ok_or_else(|| {
                DbError::DatabaseCorrupt(format!(
                    "collection '{}' uses unknown format '{}'",
                    record.name, record.format
                ))
            })?;
            let schema = schemas.register(format, &record.schema).map_err(|e| {
                DbError::DatabaseCorrupt(format!(
                    "collection '{}' has an unreadable schema: {e}",
                    record.name
                ))
            })?;
            let segments = catalog.segments(&record.name)?;
            let store = DocumentStore::open(
                &root,
                stem(name, &record.name),
                record.name.clone(),
                options.segment_size_threshold,
                &segments,
            )?;

            // Indexes live in memory only: rebuild them from the committed
            // documents.
            let mut manager = IndexManager::new(schema.clone());
            for info in &record.indexes {
                manager.add(info.clone());
            }
            let docs = store.snapshot();
            for locator in &docs {
                let doc = store.read(*locator)?;
                manager.on_insert(*locator, doc.as_slice());
            }
            log::info!(
                "opened collection '{}': {} documents, {} indexes",
                record.name,
                docs.len(),
                record.indexes.len()
            );

            collections.insert(
                record.name.clone(),
                Arc::new(Collection {
                    name: record.name,
                    schema,
                    store,
                    indexes: RwLock::new(manager),
                    write_lock: Mutex::new(()),
                }),
            );
        }

        Ok(Database {
            name: name.to_string(),
            root,
            options,
            catalog,
            schemas,
            collections: RwLock::new(collections),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates a collection from a schema descriptor plus its index
    /// declarations. Index paths must resolve to orderable scalar leaves.
    pub fn create_collection(
        &self,
        name: &str,
        format: SchemaFormat,
        descriptor: &[u8],
        indexes: &[IndexInfo],
    ) -> Result<()> {
        validate_identifier("collection name", name)?;
        let mut collections = self.collections.write();
        if collections.contains_key(name) {
            return Err(DbError::CollectionAlreadyExists(name.to_string()));
        }
        let schema = self.schemas.register(format, descriptor)?;

        let mut seen = HashSet::new();
        for info in indexes {
            let field = schema.resolve(&info.field_path)?;
            if !field.is_orderable() {
                return Err(DbError::TypeMismatch {
                    name: info.field_path.clone(),
                    expected: "an orderable field (int, float, string or bool)".to_string(),
                    actual: field.name().to_string(),
                });
            }
            if !seen.insert(info.field_path.as_str()) {
                return Err(DbError::InvalidArgument(format!(
                    "duplicate index declaration for '{}'",
                    info.field_path
                )));
            }
        }

        let store = DocumentStore::create(
            &self.root,
            stem(&self.name, name),
            name.to_string(),
            self.options.segment_size_threshold,
        )?;
        if let Err(e) = self
            .catalog
            .create_collection(name, format.name(), descriptor, indexes)
        {
            let _ = std::fs::remove_file(self.root.join(format!("{}.0", stem(&self.name, name))));
            return Err(e);
        }

        let mut manager = IndexManager::new(schema.clone());
        for info in indexes {
            manager.add(info.clone());
        }
        collections.insert(
            name.to_string(),
            Arc::new(Collection {
                name: name.to_string(),
                schema,
                store,
                indexes: RwLock::new(manager),
                write_lock: Mutex::new(()),
            }),
        );
        log::info!(
            "created collection '{name}' with {} index declarations",
            indexes.len()
        );
        Ok(())
    }

    /// Inserts one document.
    pub fn insert(&self, collection: &str, document: DocumentBuffer) -> Result<()> {
        self.multi_insert(collection, vec![document])
    }

    /// Inserts a batch atomically: either every document becomes durable and
    /// visible, or none does. Documents are validated up front; the batch is
    /// then appended, synced, committed to the catalog, indexed and finally
    /// published to readers in one step.
    pub fn multi_insert(&self, collection: &str, documents: Vec<DocumentBuffer>) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }
        let coll = self.collection(collection)?;
        let _write = coll.write_lock.lock();

        for (i, doc) in documents.iter().enumerate() {
            coll.schema.validate(doc.as_slice()).map_err(|e| match e {
                DbError::SchemaValidation(reason) => DbError::SchemaValidation(format!(
                    "collection '{}', document {i}: {reason}",
                    coll.name
                )),
                other => other,
            })?;
        }

        let locators = coll.store.append_batch(&documents, &self.catalog)?;
        let mut indexes = coll.indexes.write();
        for (locator, doc) in locators.iter().zip(&documents) {
            indexes.on_insert(*locator, doc.as_slice());
        }
        // Published under the index write lock so a planner never sees the
        // batch in the store without also seeing it in the indexes.
        coll.store.publish(&locators);
        drop(indexes);

        log::debug!(
            "collection '{}': committed batch of {} documents",
            coll.name,
            documents.len()
        );
        Ok(())
    }

    /// Plans and opens a cursor for one SELECT statement. The candidate set
    /// is snapshotted here; iterating the cursor never blocks writers.
    pub fn execute_select(&self, sql: &str) -> Result<ResultSet> {
        let parsed = query::parse::parse_select(sql)?;
        let coll = self.collection(&parsed.collection)?;
        let plan = query::plan::build(&coll, parsed)?;
        Ok(ResultSet::new(coll, plan))
    }

    /// Names of all collections, sorted.
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Point-in-time counters per collection, for tooling.
    pub fn stats(&self) -> serde_json::Value {
        let collections = self.collections.read();
        let mut names: Vec<&String> = collections.keys().collect();
        names.sort();
        let mut per_collection = serde_json::Map::new();
        for name in names {
            let coll = &collections[name];
            let indexes = coll.indexes.read().infos();
            per_collection.insert(
                name.clone(),
                serde_json::json!({
                    "schema": coll.schema.name(),
                    "format": coll.schema.format().name(),
                    "documents": coll.store.doc_count(),
                    "segments": coll.store.segment_count(),
                    "data_bytes": coll.store.committed_bytes(),
                    "indexes": indexes,
                }),
            );
        }
        serde_json::json!({
            "name": self.name,
            "root": self.root.display().to_string(),
            "collections": per_collection,
        })
    }

    fn collection(&self, name: &str) -> Result<Arc<Collection>> {
        self.collections
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| DbError::UnknownCollection(name.to_string()))
    }
}

fn stem(db: &str, collection: &str) -> String {
    format!("{db}_{collection}")
}

fn validate_identifier(what: &str, value: &str) -> Result<()> {
    let ok = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(DbError::InvalidArgument(format!(
            "{what} '{value}' may only contain alphanumerics, '_' and '-'"
        )))
    }
}
