pub mod buffer;
pub mod catalog;
pub mod database;
pub mod error;
pub mod format;
pub mod index;
pub mod query;
pub mod schema;
pub mod store;

pub use buffer::DocumentBuffer;
pub use database::{Database, OpenOptions};
pub use error::{DbError, Result};
pub use format::SchemaFormat;
pub use index::{IndexInfo, IndexKind};
pub use query::{ResultSet, DOCUMENT_COLUMN};
pub use schema::{FieldType, FieldValue};
pub use store::Locator;
