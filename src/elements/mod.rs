//! Built-in pipeline elements.
//!
//! - [`app`]: application-driven source and sink
//! - [`codec`]: H.264 bitstream alignment
//! - [`demux`]: MPEG-TS demultiplexer
//! - [`flow`]: queues and flow control
//! - [`metadata`]: KLV encoding and the telemetry side-channel source
//! - [`mux`]: MPEG-TS multiplexer
//! - [`network`]: UDP transport
//! - [`rtp`]: RTP packetization and transport
//! - [`testing`]: test sources and sinks

pub mod app;
pub mod codec;
pub mod demux;
pub mod flow;
pub mod metadata;
pub mod mux;
pub mod network;
pub mod rtp;
pub mod testing;

pub use app::{AppSink, AppSinkHandle, AppSrc, AppSrcHandle, Sample};
pub use codec::H264Parse;
pub use demux::{TsDemux, TsDemuxElement};
pub use flow::{Leaky, Queue};
pub use metadata::{KlvEncoder, KlvPacket, KlvTag, TelemetryBuilder, TelemetrySrc, Uls};
pub use mux::{TsMux, TsMuxConfig, TsMuxElement, TsMuxStreamType, TsMuxTrack};
pub use network::{UdpSink, UdpSrc};
pub use rtp::{RtpH264Depay, RtpH264Pay, RtpSink, RtpSrc};
pub use testing::{CollectSink, H264TestSrc, NullSink, TestSrc};
