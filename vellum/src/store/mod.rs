use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::buffer::DocumentBuffer;
use crate::catalog::{Catalog, SegmentRecord};
use crate::error::{DbError, Result};

mod segment;

use segment::{Segment, FRAME_HEADER};

// ── Locators ────────────────────────────────────────────────────────────────

/// Stable handle to one stored document: segment number plus the byte offset
/// of its frame. Locators never change for the lifetime of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Locator {
    segment: u32,
    offset: u64,
}

impl Locator {
    pub(crate) fn new(segment: u32, offset: u64) -> Self {
        Self { segment, offset }
    }

    pub(crate) fn segment(&self) -> u32 {
        self.segment
    }

    pub(crate) fn offset(&self) -> u64 {
        self.offset
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.segment, self.offset)
    }
}

// ── Document store ──────────────────────────────────────────────────────────

/// Append-only document store for one collection, spread over numbered
/// segment files named `<db>_<collection>.<n>`.
///
/// Documents are framed as `[len u32][crc32 u32][payload]`, both header
/// fields little endian. A batch is written and synced before the catalog
/// watermark moves, so a crash at any point leaves either the whole batch
/// committed or none of it.
pub(crate) struct DocumentStore {
    collection: String,
    dir: PathBuf,
    stem: String,
    threshold: u64,
    segments: RwLock<Vec<Arc<Segment>>>,
    docs: RwLock<Vec<Locator>>,
}

impl DocumentStore {
    /// Creates the store for a brand new collection, with an empty segment 0.
    /// The caller records the segment in the catalog.
    pub fn create(dir: &Path, stem: String, collection: String, threshold: u64) -> Result<Self> {
        let first = Segment::create(segment_path(dir, &stem, 0), 0)?;
        Ok(Self {
            collection,
            dir: dir.to_path_buf(),
            stem,
            threshold,
            segments: RwLock::new(vec![Arc::new(first)]),
            docs: RwLock::new(Vec::new()),
        })
    }

    /// Opens the store of an existing collection from its catalog segment
    /// rows, truncating torn tails and walking the committed frames to
    /// rebuild the document list.
    pub fn open(
        dir: &Path,
        stem: String,
        collection: String,
        threshold: u64,
        records: &[SegmentRecord],
    ) -> Result<Self> {
        if records.is_empty() {
            return Err(DbError::DatabaseCorrupt(format!(
                "collection '{collection}' has no segments in the catalog"
            )));
        }
        let mut segments = Vec::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            if record.no as usize != i {
                return Err(DbError::DatabaseCorrupt(format!(
                    "collection '{collection}' has a gap in its segment numbering at {i}"
                )));
            }
            let seg = Segment::open(
                segment_path(dir, &stem, record.no),
                record.no,
                record.committed_len,
            )?;
            segments.push(Arc::new(seg));
        }

        let mut docs = Vec::new();
        for seg in &segments {
            walk_frames(seg, &mut docs)?;
        }
        Ok(Self {
            collection,
            dir: dir.to_path_buf(),
            stem,
            threshold,
            segments: RwLock::new(segments),
            docs: RwLock::new(docs),
        })
    }

    /// Appends a batch of documents: frames are written and synced to the
    /// active segment, then the catalog watermark advances. The documents
    /// are not visible to readers until `publish` is called with the
    /// returned locators.
    pub fn append_batch(
        &self,
        documents: &[DocumentBuffer],
        catalog: &Catalog,
    ) -> Result<Vec<Locator>> {
        let active = self.active_segment(catalog)?;
        let base = active.committed();

        let mut total = 0u64;
        for doc in documents {
            frame_len(doc.len())?;
            total += FRAME_HEADER + doc.len() as u64;
        }

        let mut frames = Vec::with_capacity(total as usize);
        let mut locators = Vec::with_capacity(documents.len());
        let mut offset = base;
        for doc in documents {
            locators.push(Locator::new(active.no(), offset));
            frames.extend_from_slice(&(doc.len() as u32).to_le_bytes());
            frames.extend_from_slice(&crc32fast::hash(doc.as_slice()).to_le_bytes());
            frames.extend_from_slice(doc.as_slice());
            offset += FRAME_HEADER + doc.len() as u64;
        }

        let committed = active.write_frames(&frames)?;
        catalog.commit_segment(&self.collection, active.no(), committed)?;
        active.advance(committed);
        Ok(locators)
    }

    /// Makes appended documents visible to scans. Called after indexes are
    /// updated so a reader never sees a half-indexed batch.
    pub fn publish(&self, locators: &[Locator]) {
        self.docs.write().extend_from_slice(locators);
    }

    /// Locators of every visible document, in insertion order.
    pub fn snapshot(&self) -> Vec<Locator> {
        self.docs.read().clone()
    }

    pub fn doc_count(&self) -> usize {
        self.docs.read().len()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.read().len()
    }

    pub fn committed_bytes(&self) -> u64 {
        self.segments.read().iter().map(|s| s.committed()).sum()
    }

    /// Reads one document frame back, verifying its checksum.
    pub fn read(&self, locator: Locator) -> Result<DocumentBuffer> {
        let seg = {
            let segments = self.segments.read();
            segments
                .get(locator.segment() as usize)
                .cloned()
                .ok_or_else(|| self.not_found(locator))?
        };
        let committed = seg.committed();
        let header_end = locator
            .offset()
            .checked_add(FRAME_HEADER)
            .ok_or_else(|| self.not_found(locator))?;
        if header_end > committed {
            return Err(self.not_found(locator));
        }

        let mut header = [0u8; FRAME_HEADER as usize];
        seg.read_at(locator.offset(), &mut header)?;
        let mut len_bytes = [0u8; 4];
        let mut crc_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&header[..4]);
        crc_bytes.copy_from_slice(&header[4..]);
        let len = u32::from_le_bytes(len_bytes) as u64;
        let expected_crc = u32::from_le_bytes(crc_bytes);

        if header_end + len > committed {
            return Err(self.not_found(locator));
        }
        let mut payload = vec![0u8; len as usize];
        seg.read_at(header_end, &mut payload)?;
        let actual_crc = crc32fast::hash(&payload);
        if actual_crc != expected_crc {
            return Err(DbError::DatabaseCorrupt(format!(
                "checksum mismatch for document {locator} in '{}'",
                seg.path().display()
            )));
        }
        Ok(DocumentBuffer::from(payload))
    }

    /// Active segment for the next append, rolling over to a new segment
    /// once the current one reached the size threshold.
    fn active_segment(&self, catalog: &Catalog) -> Result<Arc<Segment>> {
        let mut segments = self.segments.write();
        let last = segments
            .last()
            .cloned()
            .ok_or_else(|| DbError::DatabaseCorrupt(format!(
                "collection '{}' has no active segment",
                self.collection
            )))?;
        if last.committed() < self.threshold {
            return Ok(last);
        }
        let no = last.no() + 1;
        let seg = Arc::new(Segment::create(segment_path(&self.dir, &self.stem, no), no)?);
        if let Err(e) = catalog.add_segment(&self.collection, no) {
            let _ = std::fs::remove_file(seg.path());
            return Err(e);
        }
        log::info!(
            "collection '{}': rolled over to segment {no}",
            self.collection
        );
        segments.push(seg.clone());
        Ok(seg)
    }

    fn not_found(&self, locator: Locator) -> DbError {
        DbError::LocatorNotFound(format!("{locator} in collection '{}'", self.collection))
    }
}

fn segment_path(dir: &Path, stem: &str, no: u32) -> PathBuf {
    dir.join(format!("{stem}.{no}"))
}

/// A frame header stores the payload length as u32; larger documents cannot
/// be framed, whatever their schema says.
fn frame_len(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| {
        DbError::InvalidArgument(format!(
            "document of {len} bytes exceeds the frame size limit"
        ))
    })
}

/// Walks the committed frames of a segment, appending a locator per frame.
/// The committed region ending mid-frame means the watermark and the file
/// disagree, which only corruption can produce.
fn walk_frames(seg: &Arc<Segment>, docs: &mut Vec<Locator>) -> Result<()> {
    let committed = seg.committed();
    let mut offset = 0u64;
    while offset < committed {
        if offset + FRAME_HEADER > committed {
            return Err(DbError::DatabaseCorrupt(format!(
                "segment '{}': committed region ends mid-header at {offset}",
                seg.path().display()
            )));
        }
        let mut len_bytes = [0u8; 4];
        seg.read_at(offset, &mut len_bytes)?;
        let len = u32::from_le_bytes(len_bytes) as u64;
        let end = offset + FRAME_HEADER + len;
        if end > committed {
            return Err(DbError::DatabaseCorrupt(format!(
                "segment '{}': frame at {offset} overruns the committed length",
                seg.path().display()
            )));
        }
        docs.push(Locator::new(seg.no(), offset));
        offset = end;
    }
    Ok(())
}
