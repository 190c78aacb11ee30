//! # weft
//!
//! A streaming pipeline engine that weaves an H.264 video stream and a KLV
//! telemetry side channel through a node graph and over UDP.
//!
//! weft builds small graphs of processing elements (sources, transforms,
//! muxers, demuxers, sinks), links their pads with capability checking, and
//! runs each node on its own task connected by bounded channels. Demuxers
//! grow output pads at runtime; a [`pipeline::PadRouter`] links discovered
//! pads to pre-registered branches. A broadcast event bus carries errors,
//! end-of-stream and pad notifications to the controlling loop.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use weft::pipeline::{ElementConfig, Executor, GraphBuilder};
//!
//! # async fn run() -> weft::Result<()> {
//! let mut pipeline = GraphBuilder::new()
//!     .element("src", "h264testsrc", ElementConfig::new().set("num-frames", 250_i64))
//!     .element("parse", "h264parse", ElementConfig::new())
//!     .element("sink", "nullsink", ElementConfig::new())
//!     .link("src", "parse")
//!     .link("parse", "sink")
//!     .build()?;
//!
//! Executor::new().run(&mut pipeline).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod clock;
pub mod element;
pub mod elements;
pub mod error;
pub mod format;
pub mod metadata;
pub mod pipeline;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::buffer::Buffer;
    pub use crate::clock::ClockTime;
    pub use crate::element::{
        Element, ElementDyn, FlowStatus, Output, Produced, Sink, Source,
    };
    pub use crate::error::{Error, Result};
    pub use crate::format::{Caps, FormatFamily, MediaFormat};
    pub use crate::metadata::Metadata;
    pub use crate::pipeline::{
        ElementConfig, Executor, GraphBuilder, PadRouter, Pipeline, PipelineEvent,
    };
}

pub use error::{Error, Result};
