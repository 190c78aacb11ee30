//! Core element traits.
//!
//! Elements follow the "sync processing, async orchestration" principle: the
//! `produce`/`transform`/`consume` methods are synchronous, and the pipeline
//! executor handles scheduling and backpressure via channels.

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::format::Caps;
use smallvec::SmallVec;

// ============================================================================
// Produced (source output)
// ============================================================================

/// Result of a single call to [`Source::produce`].
#[derive(Debug)]
pub enum Produced {
    /// A buffer was produced.
    Buffer(Buffer),
    /// No buffer is available yet; the producer missed its deadline or is
    /// waiting on external data. The executor retries after yielding.
    WouldBlock,
    /// The source is exhausted; no further data will arrive.
    Eos,
}

impl Produced {
    /// Check if this is an EOS signal.
    pub fn is_eos(&self) -> bool {
        matches!(self, Self::Eos)
    }
}

// ============================================================================
// Output (transform result)
// ============================================================================

/// Output of element processing: zero, one, or multiple buffers.
#[derive(Debug, Default)]
pub enum Output {
    /// No output (buffer was filtered/consumed).
    #[default]
    None,
    /// Single output buffer.
    Single(Buffer),
    /// Multiple output buffers (same destination).
    Multiple(Vec<Buffer>),
}

impl Output {
    /// Create a single buffer output.
    #[inline]
    pub fn single(buf: Buffer) -> Self {
        Self::Single(buf)
    }

    /// Create an empty output.
    #[inline]
    pub fn none() -> Self {
        Self::None
    }

    /// Check if there is no output.
    #[inline]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Get the number of output buffers.
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Single(_) => 1,
            Self::Multiple(v) => v.len(),
        }
    }

    /// Check if empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Convert to a Vec of buffers.
    pub fn into_vec(self) -> Vec<Buffer> {
        match self {
            Self::None => vec![],
            Self::Single(b) => vec![b],
            Self::Multiple(v) => v,
        }
    }

    /// Take the single buffer, returning None for other variants.
    pub fn into_single(self) -> Option<Buffer> {
        match self {
            Self::Single(b) => Some(b),
            _ => None,
        }
    }
}

impl From<Buffer> for Output {
    #[inline]
    fn from(b: Buffer) -> Self {
        Self::Single(b)
    }
}

impl From<Option<Buffer>> for Output {
    fn from(opt: Option<Buffer>) -> Self {
        match opt {
            Some(b) => Self::Single(b),
            None => Self::None,
        }
    }
}

impl From<Vec<Buffer>> for Output {
    fn from(mut v: Vec<Buffer>) -> Self {
        match v.len() {
            0 => Self::None,
            1 => Self::Single(v.remove(0)),
            _ => Self::Multiple(v),
        }
    }
}

impl IntoIterator for Output {
    type Item = Buffer;
    type IntoIter = std::vec::IntoIter<Buffer>;

    fn into_iter(self) -> Self::IntoIter {
        self.into_vec().into_iter()
    }
}

// ============================================================================
// FlowStatus (application callbacks)
// ============================================================================

/// Flow status returned by application sample callbacks.
///
/// Returning [`FlowStatus::Error`] from a callback halts upstream delivery:
/// the owning sink fails and the pipeline tears down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStatus {
    /// Continue delivering buffers.
    Ok,
    /// Stop: the consumer cannot process further data.
    Error,
}

// ============================================================================
// Source
// ============================================================================

/// A source element that produces buffers.
///
/// Sources are the entry points of a pipeline.
///
/// - Return `Produced::Buffer` to emit a buffer
/// - Return `Produced::WouldBlock` to signal backpressure (retried later)
/// - Return `Produced::Eos` when the stream ends
/// - Return `Err(...)` to signal a fatal error
pub trait Source: Send {
    /// Produce the next buffer.
    fn produce(&mut self) -> Result<Produced>;

    /// Get the name of this source (for logging).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Get the output caps (what formats this source produces).
    fn output_caps(&self) -> Caps {
        Caps::any()
    }
}

// ============================================================================
// Sink
// ============================================================================

/// A sink element that consumes buffers.
///
/// Sinks are the exit points of a pipeline. An error return halts delivery
/// from upstream and fails the pipeline.
pub trait Sink: Send {
    /// Consume a buffer.
    fn consume(&mut self, buffer: Buffer) -> Result<()>;

    /// Called when the stream ends; flush any pending state.
    fn end_of_stream(&mut self) -> Result<()> {
        Ok(())
    }

    /// Get the name of this sink (for logging).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Get the input caps (what formats this sink accepts).
    fn input_caps(&self) -> Caps {
        Caps::any()
    }
}

// ============================================================================
// Element (transform)
// ============================================================================

/// A transform element that processes buffers.
///
/// Elements sit in the middle of a pipeline, receiving buffers from upstream
/// and sending zero or more transformed buffers downstream.
pub trait Element: Send {
    /// Transform an input buffer into output(s).
    ///
    /// Return `Output::None` to filter out (drop) the buffer.
    fn transform(&mut self, buffer: Buffer) -> Result<Output>;

    /// Called when the stream ends; drain any buffered output.
    fn flush(&mut self) -> Result<Output> {
        Ok(Output::None)
    }

    /// Get the name of this element (for logging).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Get the input caps (what formats this element accepts).
    fn input_caps(&self) -> Caps {
        Caps::any()
    }

    /// Get the output caps (what formats this element produces).
    fn output_caps(&self) -> Caps {
        Caps::any()
    }
}

// ============================================================================
// Demuxer
// ============================================================================

/// Output pad identifier for demuxers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PadId(pub u32);

impl PadId {
    /// Create a new pad ID.
    pub const fn new(id: u32) -> Self {
        Self(id)
    }
}

impl From<u32> for PadId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Routed output for demuxers (buffers with destination pads).
///
/// Uses SmallVec to avoid allocation for the common 1-2 output case.
#[derive(Default)]
pub struct RoutedOutput(pub SmallVec<[(PadId, Buffer); 2]>);

impl RoutedOutput {
    /// Create an empty routed output.
    pub fn new() -> Self {
        Self(SmallVec::new())
    }

    /// Create a routed output with a single buffer.
    pub fn single(pad: PadId, buffer: Buffer) -> Self {
        let mut r = Self::new();
        r.push(pad, buffer);
        r
    }

    /// Add a buffer destined for a specific pad.
    pub fn push(&mut self, pad: PadId, buffer: Buffer) {
        self.0.push((pad, buffer));
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get the number of routed buffers.
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl IntoIterator for RoutedOutput {
    type Item = (PadId, Buffer);
    type IntoIter = smallvec::IntoIter<[(PadId, Buffer); 2]>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Callback invoked when a demuxer discovers a new output pad.
pub type PadAddedCallback = Box<dyn FnMut(PadId, Caps) + Send>;

/// A demuxer element that routes input to multiple output pads.
///
/// Demuxers split a single stream into multiple streams based on content
/// (e.g., a transport stream demuxer splitting into video and metadata).
/// Pads are discovered at runtime; register a callback with `on_pad_added`
/// to be notified. The callback runs on the demuxer's processing thread.
pub trait Demuxer: Send {
    /// Process input and route payloads to output pads.
    fn demux(&mut self, buffer: Buffer) -> Result<RoutedOutput>;

    /// The input reached EOS; emit any partially assembled payloads.
    fn flush(&mut self) -> Result<RoutedOutput> {
        Ok(RoutedOutput::new())
    }

    /// Get the currently known output pads and their caps.
    fn outputs(&self) -> Vec<(PadId, Caps)>;

    /// Register a callback for when new pads are discovered.
    fn on_pad_added(&mut self, callback: PadAddedCallback);

    /// Get the name of this demuxer (for logging).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Get the input caps (what formats this demuxer accepts).
    fn input_caps(&self) -> Caps {
        Caps::any()
    }
}

// ============================================================================
// Muxer
// ============================================================================

/// A muxer element that combines multiple input pads into one stream.
pub trait Muxer: Send {
    /// Accept a buffer on a named input pad, emitting muxed output.
    fn mux(&mut self, pad: &str, buffer: Buffer) -> Result<Output>;

    /// All inputs reached EOS; emit any trailing output.
    fn finish(&mut self) -> Result<Output> {
        Ok(Output::None)
    }

    /// Names of this muxer's input pads.
    fn input_pads(&self) -> Vec<String>;

    /// Caps accepted on a given input pad.
    fn pad_caps(&self, _pad: &str) -> Caps {
        Caps::any()
    }

    /// Get the name of this muxer (for logging).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Get the output caps (what this muxer emits).
    fn output_caps(&self) -> Caps {
        Caps::any()
    }
}

// ============================================================================
// Dynamic Element (type-erased)
// ============================================================================

/// The role of an element in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// Produces buffers.
    Source,
    /// Consumes buffers.
    Sink,
    /// Transforms buffers 1-to-N.
    Transform,
    /// Routes one input to many output pads.
    Demuxer,
    /// Combines many input pads into one output.
    Muxer,
}

/// Dynamic (type-erased) element trait used by the executor.
///
/// Most users implement [`Source`], [`Sink`], [`Element`], [`Demuxer`] or
/// [`Muxer`] instead; the adapters below lift those into `ElementDyn`.
/// Calling a method that does not match the element's kind is a logic error
/// and returns `Error::Element`.
pub trait ElementDyn: Send {
    /// Get the element's name.
    fn name(&self) -> &str;

    /// Get the element's kind.
    fn kind(&self) -> ElementKind;

    /// Produce a buffer (sources only).
    fn produce(&mut self) -> Result<Produced> {
        Err(Error::Element(format!("{} is not a source", self.name())))
    }

    /// Transform a buffer (transforms only).
    fn transform(&mut self, _buffer: Buffer) -> Result<Output> {
        Err(Error::Element(format!("{} is not a transform", self.name())))
    }

    /// Drain buffered transform output at EOS.
    fn flush(&mut self) -> Result<Output> {
        Ok(Output::None)
    }

    /// Consume a buffer (sinks only).
    fn consume(&mut self, _buffer: Buffer) -> Result<()> {
        Err(Error::Element(format!("{} is not a sink", self.name())))
    }

    /// Notify a sink of end-of-stream.
    fn end_of_stream(&mut self) -> Result<()> {
        Ok(())
    }

    /// Demultiplex a buffer (demuxers only).
    fn demux(&mut self, _buffer: Buffer) -> Result<RoutedOutput> {
        Err(Error::Element(format!("{} is not a demuxer", self.name())))
    }

    /// Emit partially assembled demuxer payloads at EOS (demuxers only).
    fn demux_flush(&mut self) -> Result<RoutedOutput> {
        Ok(RoutedOutput::new())
    }

    /// Register a pad-added callback (demuxers only).
    fn on_pad_added(&mut self, _callback: PadAddedCallback) {}

    /// Multiplex a buffer arriving on a named pad (muxers only).
    fn mux(&mut self, _pad: &str, _buffer: Buffer) -> Result<Output> {
        Err(Error::Element(format!("{} is not a muxer", self.name())))
    }

    /// Emit trailing muxer output at EOS.
    fn finish(&mut self) -> Result<Output> {
        Ok(Output::None)
    }

    /// Names of muxer input pads (muxers only; empty otherwise).
    fn mux_input_pads(&self) -> Vec<String> {
        Vec::new()
    }

    /// Caps accepted on a named muxer input pad (muxers only).
    fn mux_pad_caps(&self, _pad: &str) -> Caps {
        Caps::any()
    }

    /// Get the input caps (for link validation).
    fn input_caps(&self) -> Caps {
        Caps::any()
    }

    /// Get the output caps (for link validation).
    fn output_caps(&self) -> Caps {
        Caps::any()
    }
}

// ============================================================================
// Adapters
// ============================================================================

/// Wrapper to adapt a [`Source`] to [`ElementDyn`].
pub struct SourceAdapter<S: Source> {
    inner: S,
}

impl<S: Source> SourceAdapter<S> {
    /// Create a new source adapter.
    pub fn new(source: S) -> Self {
        Self { inner: source }
    }
}

impl<S: Source + 'static> ElementDyn for SourceAdapter<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn kind(&self) -> ElementKind {
        ElementKind::Source
    }

    fn produce(&mut self) -> Result<Produced> {
        self.inner.produce()
    }

    fn output_caps(&self) -> Caps {
        self.inner.output_caps()
    }
}

/// Wrapper to adapt a [`Sink`] to [`ElementDyn`].
pub struct SinkAdapter<S: Sink> {
    inner: S,
}

impl<S: Sink> SinkAdapter<S> {
    /// Create a new sink adapter.
    pub fn new(sink: S) -> Self {
        Self { inner: sink }
    }
}

impl<S: Sink + 'static> ElementDyn for SinkAdapter<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn kind(&self) -> ElementKind {
        ElementKind::Sink
    }

    fn consume(&mut self, buffer: Buffer) -> Result<()> {
        self.inner.consume(buffer)
    }

    fn end_of_stream(&mut self) -> Result<()> {
        self.inner.end_of_stream()
    }

    fn input_caps(&self) -> Caps {
        self.inner.input_caps()
    }
}

/// Wrapper to adapt an [`Element`] to [`ElementDyn`].
pub struct ElementAdapter<E: Element> {
    inner: E,
}

impl<E: Element> ElementAdapter<E> {
    /// Create a new element adapter.
    pub fn new(element: E) -> Self {
        Self { inner: element }
    }
}

impl<E: Element + 'static> ElementDyn for ElementAdapter<E> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn kind(&self) -> ElementKind {
        ElementKind::Transform
    }

    fn transform(&mut self, buffer: Buffer) -> Result<Output> {
        self.inner.transform(buffer)
    }

    fn flush(&mut self) -> Result<Output> {
        self.inner.flush()
    }

    fn input_caps(&self) -> Caps {
        self.inner.input_caps()
    }

    fn output_caps(&self) -> Caps {
        self.inner.output_caps()
    }
}

/// Wrapper to adapt a [`Demuxer`] to [`ElementDyn`].
pub struct DemuxerAdapter<D: Demuxer> {
    inner: D,
}

impl<D: Demuxer> DemuxerAdapter<D> {
    /// Create a new demuxer adapter.
    pub fn new(demuxer: D) -> Self {
        Self { inner: demuxer }
    }
}

impl<D: Demuxer + 'static> ElementDyn for DemuxerAdapter<D> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn kind(&self) -> ElementKind {
        ElementKind::Demuxer
    }

    fn demux(&mut self, buffer: Buffer) -> Result<RoutedOutput> {
        self.inner.demux(buffer)
    }

    fn demux_flush(&mut self) -> Result<RoutedOutput> {
        self.inner.flush()
    }

    fn on_pad_added(&mut self, callback: PadAddedCallback) {
        self.inner.on_pad_added(callback);
    }

    fn input_caps(&self) -> Caps {
        self.inner.input_caps()
    }
}

/// Wrapper to adapt a [`Muxer`] to [`ElementDyn`].
pub struct MuxerAdapter<M: Muxer> {
    inner: M,
}

impl<M: Muxer> MuxerAdapter<M> {
    /// Create a new muxer adapter.
    pub fn new(muxer: M) -> Self {
        Self { inner: muxer }
    }
}

impl<M: Muxer + 'static> ElementDyn for MuxerAdapter<M> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn kind(&self) -> ElementKind {
        ElementKind::Muxer
    }

    fn mux(&mut self, pad: &str, buffer: Buffer) -> Result<Output> {
        self.inner.mux(pad, buffer)
    }

    fn finish(&mut self) -> Result<Output> {
        self.inner.finish()
    }

    fn mux_input_pads(&self) -> Vec<String> {
        self.inner.input_pads()
    }

    fn mux_pad_caps(&self, pad: &str) -> Caps {
        self.inner.pad_caps(pad)
    }

    fn output_caps(&self) -> Caps {
        self.inner.output_caps()
    }
}
