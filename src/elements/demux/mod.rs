//! Stream demultiplexers.

mod mpegts;

pub use mpegts::{DemuxEvent, TsDemux, TsDemuxElement, TsDemuxStats};
