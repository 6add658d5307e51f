pub(crate) mod cursor;
pub(crate) mod parse;
pub(crate) mod plan;

pub use cursor::ResultSet;
pub use parse::DOCUMENT_COLUMN;
