use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Schema parse error: {0}")]
    SchemaParse(String),

    #[error("Schema validation error: {0}")]
    SchemaValidation(String),

    #[error("Unsupported schema format: {0}")]
    UnsupportedSchemaFormat(String),

    #[error("Unknown field path '{path}' in schema '{schema}'")]
    UnknownField { schema: String, path: String },

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Type mismatch for '{name}': expected {expected}, got {actual}")]
    TypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Collection already exists: {0}")]
    CollectionAlreadyExists(String),

    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    #[error("Database not found: {0}")]
    DatabaseNotFound(String),

    #[error("Database is locked by another process: {0}")]
    DatabaseLocked(String),

    #[error("Database corrupt: {0}")]
    DatabaseCorrupt(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Query syntax error: {0}")]
    QuerySyntax(String),

    #[error("Locator not found: {0}")]
    LocatorNotFound(String),

    #[error("Cursor is not positioned on a row")]
    CursorPosition,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Catalog error: {0}")]
    Catalog(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, DbError>;
