//! Element system for weft pipelines.
//!
//! This module defines the core traits and types for pipeline elements:
//!
//! - [`Source`]: Produces buffers (e.g., test source, network receiver)
//! - [`Sink`]: Consumes buffers (e.g., network sender, application sink)
//! - [`Element`]: Transforms buffers 1-to-N (e.g., parser, queue)
//! - [`Demuxer`]: Routes one input to dynamically discovered output pads
//! - [`Muxer`]: Combines named input pads into one output stream
//!
//! Elements are synchronous; the executor orchestrates them over channels.

mod pad;
mod traits;

pub use pad::{Pad, PadDirection, PadList, PadPresence};
pub use traits::{
    Demuxer, DemuxerAdapter, Element, ElementAdapter, ElementDyn, ElementKind, FlowStatus, Muxer,
    MuxerAdapter, Output, PadAddedCallback, PadId, Produced, RoutedOutput, Sink, SinkAdapter,
    Source, SourceAdapter,
};
