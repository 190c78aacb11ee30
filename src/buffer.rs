//! Buffer types for data passing.

use crate::metadata::Metadata;
use bytes::Bytes;

/// A buffer containing payload bytes and metadata.
///
/// Buffers are the primary data container in weft pipelines. The payload is
/// a reference-counted [`Bytes`] region, so cloning a buffer is O(1) and the
/// data itself is never copied while flowing through the graph.
///
/// # Example
///
/// ```rust
/// use weft::buffer::Buffer;
/// use weft::metadata::Metadata;
///
/// let buffer = Buffer::from_vec(vec![1, 2, 3], Metadata::from_sequence(0));
/// let view = buffer.slice(1, 2);
/// assert_eq!(view.as_bytes(), &[2, 3]);
/// ```
#[derive(Clone)]
pub struct Buffer {
    /// The payload bytes.
    payload: Bytes,
    /// Buffer metadata.
    metadata: Metadata,
}

impl Buffer {
    /// Create a new buffer from payload bytes and metadata.
    pub fn new(payload: Bytes, metadata: Metadata) -> Self {
        Self { payload, metadata }
    }

    /// Create a buffer from a `Vec<u8>`.
    pub fn from_vec(data: Vec<u8>, metadata: Metadata) -> Self {
        Self::new(Bytes::from(data), metadata)
    }

    /// Create a buffer by copying a slice.
    pub fn copy_from_slice(data: &[u8], metadata: Metadata) -> Self {
        Self::new(Bytes::copy_from_slice(data), metadata)
    }

    /// Create an empty buffer (used for markers like EOS).
    pub fn empty(metadata: Metadata) -> Self {
        Self::new(Bytes::new(), metadata)
    }

    /// Get a reference to the buffer's metadata.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Get a mutable reference to the buffer's metadata.
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// Get the buffer data as a byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.payload
    }

    /// Get the payload as `Bytes` (O(1) clone of the handle).
    pub fn payload(&self) -> Bytes {
        self.payload.clone()
    }

    /// Get the length of the buffer data.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Create a sub-buffer (a view into a portion of this buffer).
    ///
    /// The new buffer shares the same backing storage and metadata.
    ///
    /// # Panics
    ///
    /// Panics if `offset + len > self.len()`.
    pub fn slice(&self, offset: usize, len: usize) -> Buffer {
        Buffer {
            payload: self.payload.slice(offset..offset + len),
            metadata: self.metadata.clone(),
        }
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("len", &self.payload.len())
            .field("metadata", &self.metadata)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_creation() {
        let buffer = Buffer::from_vec(vec![0u8; 1024], Metadata::from_sequence(42));
        assert_eq!(buffer.len(), 1024);
        assert_eq!(buffer.metadata().sequence, 42);
    }

    #[test]
    fn test_buffer_clone_is_cheap() {
        let buffer = Buffer::from_vec(vec![1, 2, 3], Metadata::new());
        let buffer2 = buffer.clone();

        // Both point to the same backing memory
        assert_eq!(buffer.as_bytes().as_ptr(), buffer2.as_bytes().as_ptr());
    }

    #[test]
    fn test_buffer_slice() {
        let buffer = Buffer::from_vec((0u8..10).collect(), Metadata::new());
        let sub = buffer.slice(3, 4);
        assert_eq!(sub.as_bytes(), &[3, 4, 5, 6]);
    }

    #[test]
    #[should_panic]
    fn test_buffer_slice_out_of_bounds() {
        let buffer = Buffer::from_vec(vec![0u8; 10], Metadata::new());
        let _ = buffer.slice(8, 4);
    }

    #[test]
    fn test_empty_buffer() {
        let buffer = Buffer::empty(Metadata::new().with_eos());
        assert!(buffer.is_empty());
        assert!(buffer.metadata().flags.eos);
    }
}
