use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{DbError, Result};
use crate::format::{DocumentFormat, FormatRegistry, ParsedSchema, SchemaFormat};

pub mod types;

pub use self::types::{FieldDef, FieldKey, FieldType, FieldValue};

// ── Schema handle ───────────────────────────────────────────────────────────

/// A registered schema bound to its format adapter. Holds the flattened
/// leaf-path table used to resolve dotted paths in queries and indexes.
pub struct SchemaHandle {
    format: SchemaFormat,
    adapter: Arc<dyn DocumentFormat>,
    schema: ParsedSchema,
    leaves: Vec<(String, FieldType)>,
    by_path: HashMap<String, FieldType>,
}

impl SchemaHandle {
    fn new(format: SchemaFormat, adapter: Arc<dyn DocumentFormat>, schema: ParsedSchema) -> Self {
        let mut leaves = Vec::new();
        flatten(&schema.fields, "", &mut leaves);
        let by_path = leaves.iter().cloned().collect();
        Self {
            format,
            adapter,
            schema,
            leaves,
            by_path,
        }
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn format(&self) -> SchemaFormat {
        self.format
    }

    /// Resolves a dotted path to its declared type. Only scalar leaves
    /// resolve; object and list nodes are not addressable.
    pub fn resolve(&self, path: &str) -> Result<FieldType> {
        self.by_path
            .get(path)
            .copied()
            .ok_or_else(|| DbError::UnknownField {
                schema: self.schema.name.clone(),
                path: path.to_string(),
            })
    }

    /// Scalar leaf paths in schema declaration order, depth first.
    pub fn leaf_paths(&self) -> &[(String, FieldType)] {
        &self.leaves
    }

    pub fn validate(&self, document: &[u8]) -> Result<()> {
        self.adapter.validate(&self.schema, document)
    }

    pub fn extract(&self, document: &[u8], path: &str) -> Result<Option<FieldValue>> {
        self.adapter.extract(document, path)
    }
}

impl std::fmt::Debug for SchemaHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaHandle")
            .field("name", &self.schema.name)
            .field("format", &self.format)
            .field("leaves", &self.leaves.len())
            .finish()
    }
}

fn flatten(fields: &[FieldDef], prefix: &str, out: &mut Vec<(String, FieldType)>) {
    for field in fields {
        let path = if prefix.is_empty() {
            field.name.clone()
        } else {
            format!("{prefix}.{}", field.name)
        };
        match field.ty {
            FieldType::Object => flatten(&field.children, &path, out),
            FieldType::List => {}
            _ => out.push((path, field.ty)),
        }
    }
}

// ── Schema catalog ──────────────────────────────────────────────────────────

/// Registers schema descriptors through their format adapters. The returned
/// handles are owned by the collections that registered them; the catalog
/// itself keeps no state beyond the adapter registry.
pub struct SchemaCatalog {
    registry: Arc<FormatRegistry>,
}

impl SchemaCatalog {
    pub fn new(registry: Arc<FormatRegistry>) -> Self {
        Self { registry }
    }

    /// Parses a descriptor through its format adapter.
    pub fn register(&self, format: SchemaFormat, descriptor: &[u8]) -> Result<Arc<SchemaHandle>> {
        let adapter = self.registry.get(format)?;
        let schema = adapter.parse_descriptor(descriptor)?;
        Ok(Arc::new(SchemaHandle::new(format, adapter, schema)))
    }
}
