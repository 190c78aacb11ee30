//! Null sink: consumes and discards buffers.

use crate::buffer::Buffer;
use crate::element::Sink;
use crate::error::Result;

/// A sink that discards everything it receives, counting buffers and bytes.
pub struct NullSink {
    name: String,
    buffers: u64,
    bytes: u64,
}

impl NullSink {
    /// Create a new null sink.
    pub fn new() -> Self {
        Self {
            name: "nullsink".to_string(),
            buffers: 0,
            bytes: 0,
        }
    }

    /// Set a custom name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Number of buffers consumed.
    pub fn buffers(&self) -> u64 {
        self.buffers
    }

    /// Number of payload bytes consumed.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl Default for NullSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink for NullSink {
    fn consume(&mut self, buffer: Buffer) -> Result<()> {
        self.buffers += 1;
        self.bytes += buffer.len() as u64;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Metadata;

    #[test]
    fn test_null_sink_counts() {
        let mut sink = NullSink::new();
        sink.consume(Buffer::from_vec(vec![0u8; 10], Metadata::new()))
            .unwrap();
        sink.consume(Buffer::from_vec(vec![0u8; 5], Metadata::new()))
            .unwrap();

        assert_eq!(sink.buffers(), 2);
        assert_eq!(sink.bytes(), 15);
    }
}
