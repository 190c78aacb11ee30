//! Bounded buffering queue.

use crate::buffer::Buffer;
use crate::element::{Element, Output};
use crate::error::Result;
use std::collections::VecDeque;

/// Drop policy for a full queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Leaky {
    /// Never drop; pass the overflow straight through.
    #[default]
    No,
    /// Drop the oldest queued buffer to make room (live streams).
    Downstream,
}

/// A bounded queue decoupling producer and consumer rates.
///
/// As a synchronous transform the queue absorbs bursts: buffers accumulate
/// up to `max_buffers`, and each incoming buffer flushes the backlog
/// downstream in order. With [`Leaky::Downstream`] the oldest buffer is
/// dropped on overflow instead, which keeps latency bounded for live input.
pub struct Queue {
    name: String,
    queue: VecDeque<Buffer>,
    max_buffers: usize,
    leaky: Leaky,
    dropped: u64,
}

impl Queue {
    /// Create a queue with the default capacity (16 buffers).
    pub fn new() -> Self {
        Self::with_max_buffers(16)
    }

    /// Create a queue holding at most `max_buffers` buffers.
    pub fn with_max_buffers(max_buffers: usize) -> Self {
        Self {
            name: "queue".to_string(),
            queue: VecDeque::with_capacity(max_buffers.min(256)),
            max_buffers: max_buffers.max(1),
            leaky: Leaky::No,
            dropped: 0,
        }
    }

    /// Set the drop policy.
    pub fn with_leaky(mut self, leaky: Leaky) -> Self {
        self.leaky = leaky;
        self
    }

    /// Set a custom name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Number of buffers dropped due to the leaky policy.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Number of buffers currently queued.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Default for Queue {
    fn default() -> Self {
        Self::new()
    }
}

impl Element for Queue {
    fn transform(&mut self, buffer: Buffer) -> Result<Output> {
        self.queue.push_back(buffer);

        if self.queue.len() > self.max_buffers {
            match self.leaky {
                Leaky::Downstream => {
                    self.queue.pop_front();
                    self.dropped += 1;
                }
                Leaky::No => {}
            }
        }

        // Drain the backlog in arrival order.
        let out: Vec<Buffer> = self.queue.drain(..).collect();
        Ok(Output::from(out))
    }

    fn flush(&mut self) -> Result<Output> {
        let out: Vec<Buffer> = self.queue.drain(..).collect();
        Ok(Output::from(out))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Metadata;

    fn buf(seq: u64) -> Buffer {
        Buffer::from_vec(vec![0u8; 4], Metadata::from_sequence(seq))
    }

    #[test]
    fn test_queue_passes_in_order() {
        let mut q = Queue::with_max_buffers(4);
        let out = q.transform(buf(0)).unwrap();
        assert_eq!(out.len(), 1);

        let out = q.transform(buf(1)).unwrap();
        let seqs: Vec<u64> = out.into_iter().map(|b| b.metadata().sequence).collect();
        assert_eq!(seqs, vec![1]);
    }

    #[test]
    fn test_leaky_drops_oldest() {
        let mut q = Queue::with_max_buffers(1).with_leaky(Leaky::Downstream);
        q.queue.push_back(buf(0));
        q.queue.push_back(buf(1));

        let out = q.transform(buf(2)).unwrap();
        // Oldest (seq 0) dropped, rest drained
        let seqs: Vec<u64> = out.into_iter().map(|b| b.metadata().sequence).collect();
        assert_eq!(seqs, vec![1, 2]);
        assert_eq!(q.dropped(), 1);
    }

    #[test]
    fn test_flush_drains() {
        let mut q = Queue::new();
        q.queue.push_back(buf(0));
        q.queue.push_back(buf(1));

        let out = q.flush().unwrap();
        assert_eq!(out.len(), 2);
        assert!(q.is_empty());
    }
}
