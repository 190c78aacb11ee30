//! Pipeline event system.
//!
//! Events are emitted by the pipeline during execution and received
//! asynchronously by the controlling loop, which drains them until a
//! terminal condition (error or end-of-stream) is observed.

use crate::format::Caps;
use std::fmt;
use tokio::sync::broadcast;

/// Events emitted by the pipeline during execution.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// Pipeline state has changed.
    StateChanged {
        /// Previous state.
        from: super::PipelineState,
        /// New state.
        to: super::PipelineState,
    },

    /// End of stream reached (all sources exhausted). Terminal, graceful.
    Eos,

    /// An error occurred in the pipeline. Terminal, fatal.
    Error {
        /// The error message.
        message: String,
        /// The node where the error occurred (if known).
        node: Option<String>,
    },

    /// A demuxer discovered a new pad and it was linked downstream.
    PadAdded {
        /// The demuxer node.
        node: String,
        /// The discovered pad's caps.
        caps: Caps,
    },

    /// A duplicate pad notification was ignored (informational, not an error).
    PadIgnored {
        /// The demuxer node.
        node: String,
    },

    /// A node started processing.
    NodeStarted {
        /// The node that started.
        node: String,
    },

    /// A node finished processing.
    NodeFinished {
        /// The node that finished.
        node: String,
        /// Number of buffers processed.
        buffers_processed: u64,
    },

    /// Pipeline execution started.
    Started,

    /// Pipeline execution stopped.
    Stopped,

    /// Warning (non-fatal issue).
    Warning {
        /// The warning message.
        message: String,
        /// The node that emitted the warning (if known).
        node: Option<String>,
    },
}

/// The terminal event classes a control loop can observe.
#[derive(Debug, Clone)]
pub enum TerminalEvent {
    /// Graceful end of stream.
    Eos,
    /// Fatal runtime error.
    Error {
        /// The error message.
        message: String,
        /// The node where the error occurred (if known).
        node: Option<String>,
    },
}

impl fmt::Display for PipelineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineEvent::StateChanged { from, to } => {
                write!(f, "StateChanged: {:?} -> {:?}", from, to)
            }
            PipelineEvent::Eos => write!(f, "EOS"),
            PipelineEvent::Error { message, node } => {
                if let Some(n) = node {
                    write!(f, "Error in {}: {}", n, message)
                } else {
                    write!(f, "Error: {}", message)
                }
            }
            PipelineEvent::PadAdded { node, caps } => {
                write!(f, "Pad added on {} ({})", node, caps)
            }
            PipelineEvent::PadIgnored { node } => {
                write!(f, "Pad already linked on {}, ignoring", node)
            }
            PipelineEvent::NodeStarted { node } => write!(f, "Node {} started", node),
            PipelineEvent::NodeFinished {
                node,
                buffers_processed,
            } => {
                write!(f, "Node {} finished ({} buffers)", node, buffers_processed)
            }
            PipelineEvent::Started => write!(f, "Pipeline started"),
            PipelineEvent::Stopped => write!(f, "Pipeline stopped"),
            PipelineEvent::Warning { message, node } => {
                if let Some(n) = node {
                    write!(f, "Warning in {}: {}", n, message)
                } else {
                    write!(f, "Warning: {}", message)
                }
            }
        }
    }
}

/// Sender for pipeline events.
///
/// Held by the pipeline executor and the node tasks; emitting is lossy if
/// there are no receivers, which is fine.
#[derive(Clone)]
pub struct EventSender {
    sender: broadcast::Sender<PipelineEvent>,
}

impl EventSender {
    /// Create a new event sender with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Send an event. Returns the number of receivers that saw it.
    pub fn send(&self, event: PipelineEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Send an EOS event.
    pub fn send_eos(&self) {
        self.send(PipelineEvent::Eos);
    }

    /// Send an error event.
    pub fn send_error(&self, message: impl Into<String>, node: Option<String>) {
        self.send(PipelineEvent::Error {
            message: message.into(),
            node,
        });
    }

    /// Send a state changed event.
    pub fn send_state_changed(&self, from: super::PipelineState, to: super::PipelineState) {
        self.send(PipelineEvent::StateChanged { from, to });
    }

    /// Send a node started event.
    pub fn send_node_started(&self, node: impl Into<String>) {
        self.send(PipelineEvent::NodeStarted { node: node.into() });
    }

    /// Send a node finished event.
    pub fn send_node_finished(&self, node: impl Into<String>, buffers_processed: u64) {
        self.send(PipelineEvent::NodeFinished {
            node: node.into(),
            buffers_processed,
        });
    }

    /// Create a receiver for events.
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for EventSender {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Receiver for pipeline events.
///
/// Multiple receivers can be created from a single sender.
pub struct EventReceiver {
    receiver: broadcast::Receiver<PipelineEvent>,
}

impl EventReceiver {
    /// Receive the next event.
    ///
    /// Returns `None` if the sender has been dropped.
    pub async fn recv(&mut self) -> Option<PipelineEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                // Missed events; keep draining.
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive an event without blocking.
    pub fn try_recv(&mut self) -> Option<PipelineEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    /// Block until the first terminal event (EOS or error).
    ///
    /// Channel closure without a terminal event is reported as an error
    /// terminal, so the caller always proceeds to teardown.
    pub async fn wait_terminal(&mut self) -> TerminalEvent {
        while let Some(event) = self.recv().await {
            match event {
                PipelineEvent::Eos => return TerminalEvent::Eos,
                PipelineEvent::Error { message, node } => {
                    return TerminalEvent::Error { message, node };
                }
                _ => continue,
            }
        }
        TerminalEvent::Error {
            message: "event channel closed unexpectedly".to_string(),
            node: None,
        }
    }

    /// Block until a fatal error, ignoring EOS and everything else.
    ///
    /// Used by control loops that run indefinitely (live receivers).
    pub async fn wait_error(&mut self) -> TerminalEvent {
        while let Some(event) = self.recv().await {
            if let PipelineEvent::Error { message, node } = event {
                return TerminalEvent::Error { message, node };
            }
        }
        TerminalEvent::Error {
            message: "event channel closed unexpectedly".to_string(),
            node: None,
        }
    }

    /// Wait for EOS or an error.
    ///
    /// Returns `Ok(())` on EOS, `Err(message)` on error.
    pub async fn wait_eos(&mut self) -> std::result::Result<(), String> {
        match self.wait_terminal().await {
            TerminalEvent::Eos => Ok(()),
            TerminalEvent::Error { message, node } => Err(match node {
                Some(n) => format!("error in {}: {}", n, message),
                None => message,
            }),
        }
    }
}

/// A stream adapter for receiving events with `futures::Stream` combinators.
pub struct EventStream {
    receiver: EventReceiver,
}

impl EventStream {
    /// Create a new event stream from a receiver.
    pub fn new(receiver: EventReceiver) -> Self {
        Self { receiver }
    }
}

impl futures::Stream for EventStream {
    type Item = PipelineEvent;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        use std::future::Future;
        let fut = self.receiver.recv();
        tokio::pin!(fut);
        fut.poll(cx)
    }
}

impl EventSender {
    /// Create a stream of events.
    pub fn stream(&self) -> EventStream {
        EventStream::new(self.subscribe())
    }
}
