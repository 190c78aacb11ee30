//! Network transport elements.

mod udp;

pub use udp::{UdpSink, UdpSrc};
