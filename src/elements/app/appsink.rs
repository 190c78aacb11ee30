//! AppSink element for extracting data to application code.

use crate::buffer::Buffer;
use crate::clock::ClockTime;
use crate::element::{FlowStatus, Sink};
use crate::error::{Error, Result};
use crate::format::Caps;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A sample delivered to an application callback.
///
/// Carries the payload, the presentation timestamp, and the wall-clock time
/// at which the sample arrived, so consumers can correlate stream time
/// against real time.
pub struct Sample {
    /// The buffer that arrived on the sink pad.
    pub buffer: Buffer,
    /// Wall-clock time of arrival, microseconds since the Unix epoch.
    pub wall_clock_micros: u64,
}

impl Sample {
    /// Presentation timestamp of the underlying buffer.
    pub fn pts(&self) -> ClockTime {
        self.buffer.metadata().pts
    }
}

/// Callback invoked for every new sample. Returning [`FlowStatus::Error`]
/// halts upstream delivery and fails the pipeline.
pub type SampleCallback = Box<dyn FnMut(Sample) -> FlowStatus + Send>;

/// A terminal sink exposing buffers to application code.
///
/// Two consumption styles, mirroring pull and signal modes:
/// - pull: [`AppSinkHandle::pull_buffer`] from any thread
/// - callback: [`AppSink::on_sample`] invoked on the pipeline's thread
///
/// # Example
///
/// ```rust,ignore
/// use weft::element::FlowStatus;
/// use weft::elements::AppSink;
///
/// let sink = AppSink::new().on_sample(Box::new(|sample| {
///     println!("payload {} bytes at pts {}", sample.buffer.len(), sample.pts());
///     FlowStatus::Ok
/// }));
/// ```
pub struct AppSink {
    name: String,
    caps: Caps,
    callback: Option<SampleCallback>,
    inner: Arc<AppSinkInner>,
}

struct AppSinkInner {
    state: Mutex<AppSinkState>,
    data_available: Condvar,
    space_available: Condvar,
}

struct AppSinkState {
    queue: VecDeque<Buffer>,
    max_buffers: usize,
    drop_on_full: bool,
    eos: bool,
    total_received: u64,
    total_pulled: u64,
    total_dropped: u64,
}

/// Handle for pulling data from an [`AppSink`].
///
/// Cloneable and sendable to other threads.
#[derive(Clone)]
pub struct AppSinkHandle {
    inner: Arc<AppSinkInner>,
}

fn wall_clock_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

impl AppSink {
    /// Create a new AppSink with default settings.
    pub fn new() -> Self {
        Self::with_max_buffers(64)
    }

    /// Create a new AppSink with a specific queue size.
    pub fn with_max_buffers(max_buffers: usize) -> Self {
        Self {
            name: "appsink".to_string(),
            caps: Caps::any(),
            callback: None,
            inner: Arc::new(AppSinkInner {
                state: Mutex::new(AppSinkState {
                    queue: VecDeque::with_capacity(max_buffers.min(256)),
                    max_buffers,
                    drop_on_full: false,
                    eos: false,
                    total_received: 0,
                    total_pulled: 0,
                    total_dropped: 0,
                }),
                data_available: Condvar::new(),
                space_available: Condvar::new(),
            }),
        }
    }

    /// Set a custom name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the caps accepted on the sink pad.
    pub fn with_caps(mut self, caps: Caps) -> Self {
        self.caps = caps;
        self
    }

    /// Drop the oldest queued buffer when the queue is full instead of the
    /// incoming one blocking. Matches live operation with a tiny queue.
    pub fn drop_on_full(self, drop: bool) -> Self {
        if let Ok(mut state) = self.inner.state.lock() {
            state.drop_on_full = drop;
        }
        self
    }

    /// Register a callback invoked for every new sample.
    ///
    /// The callback runs on whatever thread drives the sink, concurrently
    /// with pipeline teardown; it must not assume the pipeline outlives it.
    pub fn on_sample(mut self, callback: SampleCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Get a handle for pulling data from this sink.
    pub fn handle(&self) -> AppSinkHandle {
        AppSinkHandle {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Get statistics.
    pub fn stats(&self) -> AppSinkStats {
        let state = match self.inner.state.lock() {
            Ok(s) => s,
            Err(_) => return AppSinkStats::default(),
        };
        AppSinkStats {
            queued_buffers: state.queue.len(),
            total_received: state.total_received,
            total_pulled: state.total_pulled,
            total_dropped: state.total_dropped,
            eos: state.eos,
        }
    }
}

impl Default for AppSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink for AppSink {
    fn consume(&mut self, buffer: Buffer) -> Result<()> {
        // Callback mode: deliver directly, honoring the flow status.
        if let Some(callback) = self.callback.as_mut() {
            let status = callback(Sample {
                buffer: buffer.clone(),
                wall_clock_micros: wall_clock_micros(),
            });
            if status == FlowStatus::Error {
                return Err(Error::Element(format!(
                    "{}: sample callback returned error flow status",
                    self.name
                )));
            }
        }

        let mut state = self
            .inner
            .state
            .lock()
            .map_err(|_| Error::Element("appsink state poisoned".into()))?;

        while state.queue.len() >= state.max_buffers {
            if state.drop_on_full {
                // Displace the oldest buffer; live consumers want the newest.
                state.queue.pop_front();
                state.total_dropped += 1;
            } else {
                state = self
                    .inner
                    .space_available
                    .wait(state)
                    .map_err(|_| Error::Element("appsink state poisoned".into()))?;
            }
        }

        state.queue.push_back(buffer);
        state.total_received += 1;

        self.inner.data_available.notify_one();
        Ok(())
    }

    fn end_of_stream(&mut self) -> Result<()> {
        if let Ok(mut state) = self.inner.state.lock() {
            state.eos = true;
        }
        self.inner.data_available.notify_all();
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn input_caps(&self) -> Caps {
        self.caps.clone()
    }
}

impl AppSinkHandle {
    /// Pull a buffer, blocking until one arrives or EOS.
    ///
    /// Returns `Ok(None)` once EOS is reached and the queue is drained.
    pub fn pull_buffer(&self) -> Result<Option<Buffer>> {
        self.pull_buffer_timeout(None)
    }

    /// Pull a buffer with a timeout. Returns `Ok(None)` on timeout or EOS.
    pub fn pull_buffer_timeout(&self, timeout: Option<Duration>) -> Result<Option<Buffer>> {
        let mut state = self
            .inner
            .state
            .lock()
            .map_err(|_| Error::Element("appsink state poisoned".into()))?;

        while state.queue.is_empty() && !state.eos {
            state = if let Some(t) = timeout {
                let (s, result) = self
                    .inner
                    .data_available
                    .wait_timeout(state, t)
                    .map_err(|_| Error::Element("appsink state poisoned".into()))?;
                if result.timed_out() {
                    return Ok(None);
                }
                s
            } else {
                self.inner
                    .data_available
                    .wait(state)
                    .map_err(|_| Error::Element("appsink state poisoned".into()))?
            };
        }

        if let Some(buffer) = state.queue.pop_front() {
            state.total_pulled += 1;
            self.inner.space_available.notify_one();
            Ok(Some(buffer))
        } else {
            Ok(None)
        }
    }

    /// Try to pull a buffer without blocking.
    pub fn try_pull_buffer(&self) -> Option<Buffer> {
        let mut state = self.inner.state.lock().ok()?;
        let buffer = state.queue.pop_front()?;
        state.total_pulled += 1;
        self.inner.space_available.notify_one();
        Some(buffer)
    }

    /// Check if EOS has been reached.
    pub fn is_eos(&self) -> bool {
        self.inner.state.lock().map(|s| s.eos).unwrap_or(true)
    }

    /// Get the current queue length.
    pub fn queue_len(&self) -> usize {
        self.inner.state.lock().map(|s| s.queue.len()).unwrap_or(0)
    }
}

/// Statistics about AppSink operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppSinkStats {
    /// Number of buffers currently queued.
    pub queued_buffers: usize,
    /// Total buffers received from the pipeline.
    pub total_received: u64,
    /// Total buffers pulled by the application.
    pub total_pulled: u64,
    /// Total buffers dropped on overflow.
    pub total_dropped: u64,
    /// Whether EOS has been received.
    pub eos: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Metadata;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn test_buffer(seq: u64) -> Buffer {
        Buffer::from_vec(vec![0u8; 16], Metadata::from_sequence(seq))
    }

    #[test]
    fn test_consume_pull() {
        let mut sink = AppSink::new();
        let handle = sink.handle();

        sink.consume(test_buffer(0)).unwrap();
        sink.consume(test_buffer(1)).unwrap();
        assert_eq!(handle.queue_len(), 2);

        let buf = handle.try_pull_buffer().unwrap();
        assert_eq!(buf.metadata().sequence, 0);
        let buf = handle.try_pull_buffer().unwrap();
        assert_eq!(buf.metadata().sequence, 1);
        assert!(handle.try_pull_buffer().is_none());
    }

    #[test]
    fn test_eos() {
        let mut sink = AppSink::new();
        let handle = sink.handle();

        sink.consume(test_buffer(0)).unwrap();
        sink.end_of_stream().unwrap();
        assert!(handle.is_eos());

        // Buffered data still available, then None
        assert!(handle.pull_buffer().unwrap().is_some());
        assert!(handle.pull_buffer().unwrap().is_none());
    }

    #[test]
    fn test_callback_flow_ok() {
        let count = Arc::new(AtomicU64::new(0));
        let count_clone = Arc::clone(&count);

        let mut sink = AppSink::new().on_sample(Box::new(move |sample| {
            assert!(sample.wall_clock_micros > 0);
            count_clone.fetch_add(1, Ordering::SeqCst);
            FlowStatus::Ok
        }));

        sink.consume(test_buffer(0)).unwrap();
        sink.consume(test_buffer(1)).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_callback_flow_error_halts() {
        let mut sink = AppSink::new().on_sample(Box::new(|_| FlowStatus::Error));
        assert!(sink.consume(test_buffer(0)).is_err());
    }

    #[test]
    fn test_overflow_keeps_newest() {
        let mut sink = AppSink::with_max_buffers(2).drop_on_full(true);
        let handle = sink.handle();

        for i in 0..4 {
            sink.consume(test_buffer(i)).unwrap();
        }

        assert_eq!(sink.stats().total_dropped, 2);
        // Oldest buffers were displaced
        assert_eq!(handle.try_pull_buffer().unwrap().metadata().sequence, 2);
    }

    #[test]
    fn test_pull_timeout() {
        let sink = AppSink::new();
        let handle = sink.handle();
        let got = handle
            .pull_buffer_timeout(Some(Duration::from_millis(10)))
            .unwrap();
        assert!(got.is_none());
    }

    #[test]
    fn test_sample_pts() {
        let meta = Metadata::from_sequence(0).with_pts(ClockTime::from_millis(40));
        let sample = Sample {
            buffer: Buffer::from_vec(vec![1], meta),
            wall_clock_micros: 1,
        };
        assert_eq!(sample.pts(), ClockTime::from_millis(40));
    }
}
