use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{DbError, Result};
use crate::index::{IndexInfo, IndexKind};

/// Everything the catalog knows about one collection.
#[derive(Debug, Clone)]
pub struct CollectionRecord {
    pub name: String,
    pub format: String,
    pub schema: Vec<u8>,
    pub indexes: Vec<IndexInfo>,
}

/// One data segment row. `committed_len` is the durability watermark: bytes
/// past it are not part of the database.
#[derive(Debug, Clone, Copy)]
pub struct SegmentRecord {
    pub no: u32,
    pub committed_len: u64,
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS collections (
    name TEXT PRIMARY KEY,
    format TEXT NOT NULL,
    schema BLOB NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE TABLE IF NOT EXISTS collection_indexes (
    collection TEXT NOT NULL,
    field_path TEXT NOT NULL,
    kind TEXT NOT NULL,
    position INTEGER NOT NULL,
    PRIMARY KEY (collection, field_path)
);
CREATE TABLE IF NOT EXISTS segments (
    collection TEXT NOT NULL,
    segment_no INTEGER NOT NULL,
    committed_len INTEGER NOT NULL,
    PRIMARY KEY (collection, segment_no)
);
";

/// SQLite-backed catalog holding collection definitions, index declarations
/// and segment watermarks. The catalog file doubles as the database's
/// single-process lock.
pub struct Catalog {
    conn: Mutex<Connection>,
}

impl Catalog {
    /// Opens the catalog and takes an exclusive file lock that is held until
    /// the connection closes. A concurrent opener gets `DatabaseLocked`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| classify(e, path))?;
        conn.query_row("PRAGMA locking_mode = EXCLUSIVE", [], |_| Ok(()))
            .map_err(|e| classify(e, path))?;
        conn.execute_batch(SCHEMA_SQL).map_err(|e| classify(e, path))?;
        // The first write acquires the exclusive lock. Under EXCLUSIVE
        // locking mode SQLite never releases it afterwards.
        conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('opened_at', datetime('now'))",
            [],
        )
        .map_err(|e| classify(e, path))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Records a collection, its index declarations and its first segment in
    /// one transaction.
    pub fn create_collection(
        &self,
        name: &str,
        format: &str,
        schema: &[u8],
        indexes: &[IndexInfo],
    ) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let existing: Option<String> = tx
            .query_row(
                "SELECT name FROM collections WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Err(DbError::CollectionAlreadyExists(name.to_string()));
        }
        tx.execute(
            "INSERT INTO collections (name, format, schema) VALUES (?1, ?2, ?3)",
            params![name, format, schema],
        )?;
        for (position, index) in indexes.iter().enumerate() {
            tx.execute(
                "INSERT INTO collection_indexes (collection, field_path, kind, position)
                 VALUES (?1, ?2, ?3, ?4)",
                params![name, index.field_path, index.kind.name(), position as i64],
            )?;
        }
        tx.execute(
            "INSERT INTO segments (collection, segment_no, committed_len) VALUES (?1, 0, 0)",
            params![name],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn load_collections(&self) -> Result<Vec<CollectionRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT name, format, schema FROM collections ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Vec<u8>>(2)?,
            ))
        })?;
        let mut records = Vec::new();
        for row in rows {
            let (name, format, schema) = row?;
            let indexes = indexes_for(&conn, &name)?;
            records.push(CollectionRecord {
                name,
                format,
                schema,
                indexes,
            });
        }
        Ok(records)
    }

    /// Registers a segment with a zero watermark. Replaces any stale row a
    /// crashed rollover may have left behind.
    pub fn add_segment(&self, collection: &str, no: u32) -> Result<()> {
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO segments (collection, segment_no, committed_len)
             VALUES (?1, ?2, 0)",
            params![collection, no],
        )?;
        Ok(())
    }

    /// Advances a segment's durability watermark. Documents become part of
    /// the database the moment this commits.
    pub fn commit_segment(&self, collection: &str, no: u32, committed_len: u64) -> Result<()> {
        let updated = self.conn.lock().execute(
            "UPDATE segments SET committed_len = ?3 WHERE collection = ?1 AND segment_no = ?2",
            params![collection, no, committed_len as i64],
        )?;
        if updated == 0 {
            return Err(DbError::DatabaseCorrupt(format!(
                "no catalog row for segment {no} of collection '{collection}'"
            )));
        }
        Ok(())
    }

    pub fn segments(&self, collection: &str) -> Result<Vec<SegmentRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT segment_no, committed_len FROM segments
             WHERE collection = ?1 ORDER BY segment_no",
        )?;
        let rows = stmt.query_map(params![collection], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut records = Vec::new();
        for row in rows {
            let (no, committed_len) = row?;
            let no = u32::try_from(no).map_err(|_| {
                DbError::DatabaseCorrupt(format!(
                    "invalid segment number {no} for collection '{collection}'"
                ))
            })?;
            let committed_len = u64::try_from(committed_len).map_err(|_| {
                DbError::DatabaseCorrupt(format!(
                    "invalid watermark for segment {no} of collection '{collection}'"
                ))
            })?;
            records.push(SegmentRecord { no, committed_len });
        }
        Ok(records)
    }
}

fn indexes_for(conn: &Connection, collection: &str) -> Result<Vec<IndexInfo>> {
    let mut stmt = conn.prepare(
        "SELECT field_path, kind FROM collection_indexes
         WHERE collection = ?1 ORDER BY position",
    )?;
    let rows = stmt.query_map(params![collection], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    let mut indexes = Vec::new();
    for row in rows {
        let (field_path, kind_name) = row?;
        let kind = IndexKind::from_name(&kind_name).ok_or_else(|| {
            DbError::DatabaseCorrupt(format!(
                "unknown index kind '{kind_name}' for collection '{collection}'"
            ))
        })?;
        indexes.push(IndexInfo { field_path, kind });
    }
    Ok(indexes)
}

fn classify(e: rusqlite::Error, path: &Path) -> DbError {
    if let rusqlite::Error::SqliteFailure(code, _) = &e {
        match code.code {
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                return DbError::DatabaseLocked(path.display().to_string());
            }
            rusqlite::ErrorCode::NotADatabase => {
                return DbError::DatabaseCorrupt(format!(
                    "'{}' is not a catalog file",
                    path.display()
                ));
            }
            _ => {}
        }
    }
    DbError::Catalog(e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_indexes() -> Vec<IndexInfo> {
        vec![
            IndexInfo::ordered("house"),
            IndexInfo::ordered("age"),
        ]
    }

    #[test]
    fn test_create_and_load_collections() {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog
            .create_collection("character", "bson", b"schema-bytes", &sample_indexes())
            .unwrap();

        let records = catalog.load_collections().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "character");
        assert_eq!(records[0].format, "bson");
        assert_eq!(records[0].schema, b"schema-bytes");
        assert_eq!(records[0].indexes, sample_indexes());

        let segments = catalog.segments("character").unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].no, 0);
        assert_eq!(segments[0].committed_len, 0);
    }

    #[test]
    fn test_create_duplicate_collection_fails() {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog
            .create_collection("character", "bson", b"s", &[])
            .unwrap();
        assert!(matches!(
            catalog.create_collection("character", "bson", b"s", &[]),
            Err(DbError::CollectionAlreadyExists(name)) if name == "character"
        ));
    }

    #[test]
    fn test_index_declaration_order_is_preserved() {
        let catalog = Catalog::open_in_memory().unwrap();
        let indexes = vec![
            IndexInfo::ordered("zfalse"),
            IndexInfo::ordered("alpha"),
            IndexInfo::ordered("middle"),
        ];
        catalog
            .create_collection("c", "bson", b"s", &indexes)
            .unwrap();
        let records = catalog.load_collections().unwrap();
        assert_eq!(records[0].indexes, indexes);
    }

    #[test]
    fn test_segment_watermark_lifecycle() {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog.create_collection("c", "bson", b"s", &[]).unwrap();
        catalog.commit_segment("c", 0, 128).unwrap();
        catalog.add_segment("c", 1).unwrap();
        catalog.commit_segment("c", 1, 64).unwrap();

        let segments = catalog.segments("c").unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].committed_len, 128);
        assert_eq!(segments[1].committed_len, 64);
    }

    #[test]
    fn test_commit_unknown_segment_is_corruption() {
        let catalog = Catalog::open_in_memory().unwrap();
        assert!(matches!(
            catalog.commit_segment("ghost", 0, 10),
            Err(DbError::DatabaseCorrupt(_))
        ));
    }

    #[test]
    fn test_catalog_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("got.dat");
        {
            let catalog = Catalog::open(&path).unwrap();
            catalog
                .create_collection("character", "bson", b"s", &sample_indexes())
                .unwrap();
            catalog.commit_segment("character", 0, 42).unwrap();
        }
        let catalog = Catalog::open(&path).unwrap();
        let records = catalog.load_collections().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(catalog.segments("character").unwrap()[0].committed_len, 42);
    }

    #[test]
    fn test_second_opener_is_locked_out() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("got.dat");
        let _first = Catalog::open(&path).unwrap();
        assert!(matches!(
            Catalog::open(&path),
            Err(DbError::DatabaseLocked(_))
        ));
    }
}
