//! AppSrc element for injecting data from application code.

use crate::buffer::Buffer;
use crate::element::{Produced, Source};
use crate::error::{Error, Result};
use crate::format::Caps;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// A source element that lets application code push buffers into a pipeline.
///
/// # Example
///
/// ```rust,ignore
/// use weft::elements::AppSrc;
///
/// let app_src = AppSrc::new();
/// let handle = app_src.handle();
///
/// // In another thread:
/// handle.push_buffer(buffer)?;
/// handle.end_stream();
/// ```
pub struct AppSrc {
    name: String,
    caps: Caps,
    inner: Arc<AppSrcInner>,
}

struct AppSrcInner {
    state: Mutex<AppSrcState>,
    data_available: Condvar,
}

struct AppSrcState {
    queue: VecDeque<Buffer>,
    max_buffers: usize,
    eos: bool,
    total_pushed: u64,
    total_produced: u64,
}

/// Handle for pushing data into an [`AppSrc`].
///
/// Cloneable and sendable to other threads.
#[derive(Clone)]
pub struct AppSrcHandle {
    inner: Arc<AppSrcInner>,
}

impl AppSrc {
    /// Create a new AppSrc with default settings.
    pub fn new() -> Self {
        Self::with_max_buffers(64)
    }

    /// Create a new AppSrc with a specific queue size.
    pub fn with_max_buffers(max_buffers: usize) -> Self {
        Self {
            name: "appsrc".to_string(),
            caps: Caps::any(),
            inner: Arc::new(AppSrcInner {
                state: Mutex::new(AppSrcState {
                    queue: VecDeque::with_capacity(max_buffers.min(256)),
                    max_buffers,
                    eos: false,
                    total_pushed: 0,
                    total_produced: 0,
                }),
                data_available: Condvar::new(),
            }),
        }
    }

    /// Set a custom name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the caps advertised on the source pad.
    pub fn with_caps(mut self, caps: Caps) -> Self {
        self.caps = caps;
        self
    }

    /// Get a handle for pushing data into this source.
    pub fn handle(&self) -> AppSrcHandle {
        AppSrcHandle {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Get the current queue length.
    pub fn queue_len(&self) -> usize {
        self.inner.state.lock().map(|s| s.queue.len()).unwrap_or(0)
    }

    /// Check if end-of-stream has been signaled.
    pub fn is_eos(&self) -> bool {
        self.inner.state.lock().map(|s| s.eos).unwrap_or(true)
    }

    /// Get statistics.
    pub fn stats(&self) -> AppSrcStats {
        let state = match self.inner.state.lock() {
            Ok(s) => s,
            Err(_) => return AppSrcStats::default(),
        };
        AppSrcStats {
            queued_buffers: state.queue.len(),
            total_pushed: state.total_pushed,
            total_produced: state.total_produced,
            eos: state.eos,
        }
    }
}

impl Default for AppSrc {
    fn default() -> Self {
        Self::new()
    }
}

impl Source for AppSrc {
    fn produce(&mut self) -> Result<Produced> {
        let mut state = self
            .inner
            .state
            .lock()
            .map_err(|_| Error::Element("appsrc state poisoned".into()))?;

        if let Some(buffer) = state.queue.pop_front() {
            state.total_produced += 1;
            return Ok(Produced::Buffer(buffer));
        }
        if state.eos {
            return Ok(Produced::Eos);
        }

        // Wait briefly for data; a timeout surfaces as backpressure so the
        // executor can yield instead of parking this thread forever.
        let (mut state, timeout) = self
            .inner
            .data_available
            .wait_timeout(state, Duration::from_millis(10))
            .map_err(|_| Error::Element("appsrc state poisoned".into()))?;

        if let Some(buffer) = state.queue.pop_front() {
            state.total_produced += 1;
            Ok(Produced::Buffer(buffer))
        } else if state.eos {
            Ok(Produced::Eos)
        } else {
            debug_assert!(timeout.timed_out() || state.queue.is_empty());
            Ok(Produced::WouldBlock)
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn output_caps(&self) -> Caps {
        self.caps.clone()
    }
}

impl AppSrcHandle {
    /// Push a buffer into the source.
    ///
    /// Fails if end-of-stream has been signaled or the queue is full.
    pub fn push_buffer(&self, buffer: Buffer) -> Result<()> {
        let mut state = self
            .inner
            .state
            .lock()
            .map_err(|_| Error::Element("appsrc state poisoned".into()))?;

        if state.eos {
            return Err(Error::Element("appsrc is at EOS".into()));
        }
        if state.queue.len() >= state.max_buffers {
            return Err(Error::Element("appsrc queue full".into()));
        }

        state.queue.push_back(buffer);
        state.total_pushed += 1;

        self.inner.data_available.notify_one();
        Ok(())
    }

    /// Signal end of stream. After this no more buffers can be pushed.
    pub fn end_stream(&self) {
        if let Ok(mut state) = self.inner.state.lock() {
            state.eos = true;
        }
        self.inner.data_available.notify_all();
    }

    /// Get the current queue length.
    pub fn queue_len(&self) -> usize {
        self.inner.state.lock().map(|s| s.queue.len()).unwrap_or(0)
    }

    /// Check if the queue is full.
    pub fn is_full(&self) -> bool {
        self.inner
            .state
            .lock()
            .map(|s| s.queue.len() >= s.max_buffers)
            .unwrap_or(true)
    }
}

/// Statistics about AppSrc operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppSrcStats {
    /// Number of buffers currently queued.
    pub queued_buffers: usize,
    /// Total buffers pushed by the application.
    pub total_pushed: u64,
    /// Total buffers produced into the pipeline.
    pub total_produced: u64,
    /// Whether EOS has been signaled.
    pub eos: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Metadata;

    fn test_buffer(seq: u64) -> Buffer {
        Buffer::from_vec(vec![0u8; 16], Metadata::from_sequence(seq))
    }

    #[test]
    fn test_push_produce() {
        let mut src = AppSrc::new();
        let handle = src.handle();

        handle.push_buffer(test_buffer(0)).unwrap();
        handle.push_buffer(test_buffer(1)).unwrap();
        assert_eq!(src.queue_len(), 2);

        match src.produce().unwrap() {
            Produced::Buffer(b) => assert_eq!(b.metadata().sequence, 0),
            other => panic!("expected buffer, got {:?}", other),
        }
        match src.produce().unwrap() {
            Produced::Buffer(b) => assert_eq!(b.metadata().sequence, 1),
            other => panic!("expected buffer, got {:?}", other),
        }
    }

    #[test]
    fn test_eos_after_drain() {
        let mut src = AppSrc::new();
        let handle = src.handle();

        handle.push_buffer(test_buffer(0)).unwrap();
        handle.end_stream();
        assert!(src.is_eos());

        // Buffered data still delivered before EOS
        assert!(matches!(src.produce().unwrap(), Produced::Buffer(_)));
        assert!(src.produce().unwrap().is_eos());
    }

    #[test]
    fn test_push_after_eos_fails() {
        let src = AppSrc::new();
        let handle = src.handle();
        handle.end_stream();
        assert!(handle.push_buffer(test_buffer(0)).is_err());
    }

    #[test]
    fn test_empty_queue_would_block() {
        let mut src = AppSrc::new();
        assert!(matches!(src.produce().unwrap(), Produced::WouldBlock));
    }

    #[test]
    fn test_queue_full() {
        let src = AppSrc::with_max_buffers(1);
        let handle = src.handle();
        handle.push_buffer(test_buffer(0)).unwrap();
        assert!(handle.is_full());
        assert!(handle.push_buffer(test_buffer(1)).is_err());
    }

    #[test]
    fn test_stats() {
        let mut src = AppSrc::new();
        let handle = src.handle();

        handle.push_buffer(test_buffer(0)).unwrap();
        handle.push_buffer(test_buffer(1)).unwrap();
        let _ = src.produce().unwrap();

        let stats = src.stats();
        assert_eq!(stats.total_pushed, 2);
        assert_eq!(stats.total_produced, 1);
        assert_eq!(stats.queued_buffers, 1);
    }
}
