use std::sync::Arc;

use crate::error::{DbError, Result};
use crate::schema::types::{FieldDef, FieldValue};

pub mod bson;

pub use self::bson::BsonFormat;

// ── Schema formats ──────────────────────────────────────────────────────────

/// Identifies the wire encoding a collection's documents and schema
/// descriptor use. The name is what the catalog persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaFormat {
    Bson,
}

impl SchemaFormat {
    pub fn name(&self) -> &'static str {
        match self {
            SchemaFormat::Bson => "bson",
        }
    }

    pub fn from_name(name: &str) -> Option<SchemaFormat> {
        match name {
            "bson" => Some(SchemaFormat::Bson),
            _ => None,
        }
    }
}

impl std::fmt::Display for SchemaFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ── Format adapter ──────────────────────────────────────────────────────────

/// Schema descriptor parsed into the engine's field tree. Field order is the
/// descriptor's declaration order and is observable through `SELECT *`.
#[derive(Debug, Clone)]
pub struct ParsedSchema {
    pub name: String,
    pub fields: Vec<FieldDef>,
}

/// Capability set every document format must provide. The rest of the engine
/// never inspects document bytes directly; it goes through an adapter.
pub trait DocumentFormat: Send + Sync {
    fn format(&self) -> SchemaFormat;

    /// Parses a schema descriptor into the engine's representation.
    fn parse_descriptor(&self, descriptor: &[u8]) -> Result<ParsedSchema>;

    /// Checks one encoded document against a parsed schema.
    fn validate(&self, schema: &ParsedSchema, document: &[u8]) -> Result<()>;

    /// Extracts the scalar at a dotted field path. `Ok(None)` means the field
    /// is absent from this document; errors mean the bytes are unreadable.
    fn extract(&self, document: &[u8], path: &str) -> Result<Option<FieldValue>>;
}

// ── Registry ────────────────────────────────────────────────────────────────

/// Maps schema formats to their adapters.
pub struct FormatRegistry {
    adapters: Vec<Arc<dyn DocumentFormat>>,
}

impl FormatRegistry {
    /// Registry with every built-in format registered.
    pub fn with_builtin() -> Self {
        Self {
            adapters: vec![Arc::new(BsonFormat)],
        }
    }

    pub fn get(&self, format: SchemaFormat) -> Result<Arc<dyn DocumentFormat>> {
        self.adapters
            .iter()
            .find(|a| a.format() == format)
            .cloned()
            .ok_or_else(|| DbError::UnsupportedSchemaFormat(format.name().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_serves_bson() {
        let registry = FormatRegistry::with_builtin();
        let adapter = registry.get(SchemaFormat::Bson).unwrap();
        assert_eq!(adapter.format(), SchemaFormat::Bson);
    }

    #[test]
    fn test_format_names_round_trip() {
        assert_eq!(SchemaFormat::from_name("bson"), Some(SchemaFormat::Bson));
        assert_eq!(SchemaFormat::from_name("protobuf"), None);
        assert_eq!(SchemaFormat::Bson.name(), "bson");
    }
}
