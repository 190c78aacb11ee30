//! Pipeline construction and execution.
//!
//! This module provides the core pipeline infrastructure:
//!
//! - [`Pipeline`]: The pipeline container and DAG
//! - [`GraphBuilder`]: Declarative construction from (kind, config) pairs
//! - [`ElementFactory`]: Element kind registry
//! - [`PadRouter`]: Dynamic pad routing for demuxers
//! - [`Executor`]: Task-per-node execution over bounded channels
//! - [`PipelineEvent`]: Async events drained by the control loop
//!
//! # Example
//!
//! ```rust,no_run
//! use weft::pipeline::{ElementConfig, Executor, GraphBuilder};
//!
//! # async fn run() -> weft::Result<()> {
//! let mut pipeline = GraphBuilder::new()
//!     .element("src", "testsrc", ElementConfig::new().set("num-buffers", 100_i64))
//!     .element("sink", "nullsink", ElementConfig::new())
//!     .link("src", "sink")
//!     .build()?;
//!
//! Executor::new().run(&mut pipeline).await?;
//! # Ok(())
//! # }
//! ```

mod builder;
mod events;
mod executor;
pub mod factory;
mod graph;
mod router;

pub use builder::GraphBuilder;
pub use events::{EventReceiver, EventSender, EventStream, PipelineEvent, TerminalEvent};
pub use executor::{Executor, ExecutorConfig, PipelineHandle};
pub use factory::{ElementConfig, ElementFactory, PropertyValue};
pub use graph::{Link, Node, NodeId, Pipeline, PipelineState};
pub use router::{PadRouter, RouteDecision, RouteRule};
