//! Stream multiplexers.

mod mpegts;

pub use mpegts::{
    TsMux, TsMuxConfig, TsMuxElement, TsMuxStats, TsMuxStreamType, TsMuxTrack, TS_PACKET_SIZE,
};
