//! Application-facing source and sink.

mod appsink;
mod appsrc;

pub use appsink::{AppSink, AppSinkHandle, AppSinkStats, Sample, SampleCallback};
pub use appsrc::{AppSrc, AppSrcHandle, AppSrcStats};
