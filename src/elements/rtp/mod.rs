//! RTP transport elements.
//!
//! The raw-RTP leg of the transport: H.264 access units are packetized per
//! RFC 6184 (single NAL / FU-A via the `rtp` crate's payloader), framed in
//! RTP headers and carried over UDP.
//!
//! - [`RtpH264Pay`] / [`RtpH264Depay`]: access units ⇄ RTP payloads
//! - [`RtpSink`] / [`RtpSrc`]: RTP packets over a UDP socket

mod rtp_h264;
mod transport;

pub use rtp_h264::{RtpH264Depay, RtpH264Pay};
pub use transport::{RtpSink, RtpSinkStats, RtpSrc, RtpSrcStats};

/// Buffer metadata key holding the RTP marker bit.
pub(crate) const RTP_MARKER_KEY: &str = "rtp-marker";
