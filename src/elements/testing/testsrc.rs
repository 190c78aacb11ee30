//! Test source producing a bounded sequence of buffers.

use crate::buffer::Buffer;
use crate::element::{Produced, Source};
use crate::error::Result;
use crate::metadata::Metadata;

/// A source that produces `count` buffers of `size` bytes, then EOS.
///
/// Each buffer's payload starts with the little-endian sequence number so
/// sinks can verify ordering.
pub struct TestSrc {
    name: String,
    count: u64,
    size: usize,
    produced: u64,
}

impl TestSrc {
    /// Create a test source producing `count` buffers of `size` bytes.
    pub fn new(count: u64, size: usize) -> Self {
        Self {
            name: "testsrc".to_string(),
            count,
            size: size.max(8),
            produced: 0,
        }
    }

    /// Set a custom name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Source for TestSrc {
    fn produce(&mut self) -> Result<Produced> {
        if self.produced >= self.count {
            return Ok(Produced::Eos);
        }

        let mut data = vec![0u8; self.size];
        data[..8].copy_from_slice(&self.produced.to_le_bytes());

        let buffer = Buffer::from_vec(data, Metadata::from_sequence(self.produced));
        self.produced += 1;
        Ok(Produced::Buffer(buffer))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_produces_count_then_eos() {
        let mut src = TestSrc::new(3, 16);
        for i in 0..3u64 {
            match src.produce().unwrap() {
                Produced::Buffer(b) => {
                    assert_eq!(b.metadata().sequence, i);
                    assert_eq!(&b.as_bytes()[..8], &i.to_le_bytes());
                    assert_eq!(b.len(), 16);
                }
                other => panic!("expected buffer, got {:?}", other),
            }
        }
        assert!(src.produce().unwrap().is_eos());
        // Stays at EOS
        assert!(src.produce().unwrap().is_eos());
    }

    #[test]
    fn test_minimum_size() {
        let mut src = TestSrc::new(1, 0);
        match src.produce().unwrap() {
            Produced::Buffer(b) => assert_eq!(b.len(), 8),
            other => panic!("expected buffer, got {:?}", other),
        }
    }
}
