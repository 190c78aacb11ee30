//! Buffer metadata types.

use crate::clock::ClockTime;

/// Flags indicating buffer properties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferFlags {
    /// Buffer marks end of stream.
    pub eos: bool,
    /// Buffer contains a sync point (keyframe equivalent).
    pub sync_point: bool,
    /// Buffer belongs to a sparse stream (metadata side channel).
    pub sparse: bool,
    /// Buffer is a gap/discontinuity marker.
    pub gap: bool,
    /// Buffer was generated due to a timeout (fallback/heartbeat).
    pub timeout: bool,
}

/// A key-value pair for extra metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtraField {
    /// Field name.
    pub key: String,
    /// Field value.
    pub value: MetadataValue,
}

/// Possible values for extra metadata fields.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    /// String value.
    String(String),
    /// Integer value.
    Int(i64),
    /// Floating-point value.
    Float(f64),
    /// Boolean value.
    Bool(bool),
    /// Raw bytes.
    Bytes(Vec<u8>),
}

/// Metadata associated with a buffer.
///
/// Contains timing information, sequence numbers, flags, and extensible
/// key-value fields for domain-specific data.
#[derive(Debug, Clone)]
pub struct Metadata {
    /// Presentation timestamp (when this buffer should be presented).
    pub pts: ClockTime,

    /// Decode timestamp.
    pub dts: ClockTime,

    /// Duration of this buffer's content.
    pub duration: ClockTime,

    /// Monotonic sequence number within a stream.
    pub sequence: u64,

    /// Stream identifier for demultiplexing.
    pub stream_id: Option<u64>,

    /// Buffer flags.
    pub flags: BufferFlags,

    /// Extra key-value metadata fields. Empty or small for most buffers.
    pub extra: Vec<ExtraField>,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            pts: ClockTime::NONE,
            dts: ClockTime::NONE,
            duration: ClockTime::NONE,
            sequence: 0,
            stream_id: None,
            flags: BufferFlags::default(),
            extra: Vec::new(),
        }
    }
}

impl Metadata {
    /// Create new metadata with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create metadata with a sequence number.
    pub fn from_sequence(sequence: u64) -> Self {
        Self {
            sequence,
            ..Default::default()
        }
    }

    /// Set the presentation timestamp.
    pub fn with_pts(mut self, pts: ClockTime) -> Self {
        self.pts = pts;
        self
    }

    /// Set the duration.
    pub fn with_duration(mut self, duration: ClockTime) -> Self {
        self.duration = duration;
        self
    }

    /// Set the stream identifier.
    pub fn with_stream_id(mut self, stream_id: u64) -> Self {
        self.stream_id = Some(stream_id);
        self
    }

    /// Mark as end-of-stream.
    pub fn with_eos(mut self) -> Self {
        self.flags.eos = true;
        self
    }

    /// Mark as a sync point.
    pub fn with_sync_point(mut self) -> Self {
        self.flags.sync_point = true;
        self
    }

    /// Mark as sparse (metadata side channel).
    pub fn with_sparse(mut self) -> Self {
        self.flags.sparse = true;
        self
    }

    /// Add an extra field.
    pub fn with_extra(mut self, key: impl Into<String>, value: MetadataValue) -> Self {
        self.extra.push(ExtraField {
            key: key.into(),
            value,
        });
        self
    }

    /// Get an extra field by key.
    pub fn get_extra(&self, key: &str) -> Option<&MetadataValue> {
        self.extra.iter().find(|f| f.key == key).map(|f| &f.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_builder() {
        let meta = Metadata::from_sequence(42)
            .with_pts(ClockTime::from_millis(100))
            .with_duration(ClockTime::from_millis(33))
            .with_extra("source", MetadataValue::String("camera1".into()));

        assert_eq!(meta.sequence, 42);
        assert_eq!(meta.pts, ClockTime::from_millis(100));
        assert_eq!(meta.duration, ClockTime::from_millis(33));
        assert_eq!(
            meta.get_extra("source"),
            Some(&MetadataValue::String("camera1".into()))
        );
    }

    #[test]
    fn test_default_timestamps_invalid() {
        let meta = Metadata::new();
        assert!(meta.pts.is_none());
        assert!(meta.dts.is_none());
        assert!(meta.duration.is_none());
    }

    #[test]
    fn test_flags() {
        let meta = Metadata::new().with_sparse().with_sync_point();
        assert!(meta.flags.sparse);
        assert!(meta.flags.sync_point);
        assert!(!meta.flags.eos);
    }
}
