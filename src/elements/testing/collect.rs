//! Collecting sink for tests.

use crate::buffer::Buffer;
use crate::element::Sink;
use crate::error::{Error, Result};
use std::sync::{Arc, Mutex};

/// A sink that stores every received buffer behind a shared handle.
///
/// Tests keep a clone of the handle and inspect the collected buffers after
/// the pipeline finishes. A failure threshold can be armed to exercise
/// runtime error paths.
pub struct CollectSink {
    name: String,
    collected: Arc<Mutex<Vec<Buffer>>>,
    fail_after: Option<u64>,
    consumed: u64,
}

impl CollectSink {
    /// Create a new collecting sink.
    pub fn new() -> Self {
        Self {
            name: "collectsink".to_string(),
            collected: Arc::new(Mutex::new(Vec::new())),
            fail_after: None,
            consumed: 0,
        }
    }

    /// Set a custom name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Fail with an element error after consuming `n` buffers.
    pub fn fail_after(mut self, n: u64) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Get a handle to the collected buffers.
    pub fn handle(&self) -> Arc<Mutex<Vec<Buffer>>> {
        Arc::clone(&self.collected)
    }
}

impl Default for CollectSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink for CollectSink {
    fn consume(&mut self, buffer: Buffer) -> Result<()> {
        if let Some(limit) = self.fail_after {
            if self.consumed >= limit {
                return Err(Error::Element(format!(
                    "{}: injected failure after {} buffers",
                    self.name, limit
                )));
            }
        }
        self.consumed += 1;
        self.collected
            .lock()
            .map_err(|_| Error::Element("collect sink poisoned".into()))?
            .push(buffer);
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
    fn test_collects_buffers() {
        let mut sink = CollectSink::new();
        let handle = sink.handle();

        for i in 0..3 {
            sink.consume(Buffer::from_vec(vec![i], Metadata::from_sequence(i as u64)))
                .unwrap();
        }

        let collected = handle.lock().unwrap();
        assert_eq!(collected.len(), 3);
        assert_eq!(collected[2].metadata().sequence, 2);
    }

    #[test]
    fn test_injected_failure() {
        let mut sink = CollectSink::new().fail_after(1);
        sink.consume(Buffer::from_vec(vec![0], Metadata::new()))
            .unwrap();
        assert!(sink.consume(Buffer::from_vec(vec![1], Metadata::new())).is_err());
    }
}
