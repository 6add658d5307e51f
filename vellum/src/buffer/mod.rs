/// Owned byte buffer holding one encoded document.
///
/// Buffers decouple the caller's memory from the engine: inserts copy the
/// buffer contents into the store, and reads hand back a fresh buffer, so a
/// buffer can be reused across operations without aliasing engine state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentBuffer {
    bytes: Vec<u8>,
}

impl DocumentBuffer {
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
        }
    }

    /// Replaces the buffer contents with a copy of `data`, growing the
    /// allocation if needed. Existing capacity is reused.
    pub fn copy_from(&mut self, data: &[u8]) {
        self.bytes.clear();
        self.bytes.extend_from_slice(data);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.bytes.capacity()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl From<Vec<u8>> for DocumentBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

impl From<&[u8]> for DocumentBuffer {
    fn from(data: &[u8]) -> Self {
        Self {
            bytes: data.to_vec(),
        }
    }
}

impl AsRef<[u8]> for DocumentBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_from_replaces_contents() {
        let mut buf = DocumentBuffer::new();
        buf.copy_from(b"first document");
        assert_eq!(buf.as_slice(), b"first document");

        buf.copy_from(b"second");
        assert_eq!(buf.as_slice(), b"second");
        assert_eq!(buf.len(), 6);
    }

    #[test]
    fn test_capacity_is_reused_on_smaller_copy() {
        let mut buf = DocumentBuffer::with_capacity(64);
        let cap = buf.capacity();
        assert!(cap >= 64);

        buf.copy_from(&[7u8; 32]);
        assert_eq!(buf.capacity(), cap);
        assert_eq!(buf.len(), 32);
    }

    #[test]
    fn test_from_and_into_round_trip() {
        let buf = DocumentBuffer::from(vec![1, 2, 3]);
        assert_eq!(buf.as_ref(), &[1, 2, 3]);
        assert_eq!(buf.into_bytes(), vec![1, 2, 3]);
    }
}
