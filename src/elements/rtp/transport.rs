//! RTP over UDP transport.

use crate::buffer::Buffer;
use crate::clock::ClockTime;
use crate::element::{Produced, Sink, Source};
use crate::error::{Error, Result};
use crate::format::{Caps, RtpFormat};
use crate::metadata::{Metadata, MetadataValue};

use rtp::packet::Packet;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;
use webrtc_util::marshal::{Marshal, MarshalSize, Unmarshal};

use super::RTP_MARKER_KEY;

/// Maximum RTP packet size (UDP MTU).
const MAX_RTP_PACKET_SIZE: usize = 1500;

/// Statistics for [`RtpSrc`].
#[derive(Debug, Clone, Default)]
pub struct RtpSrcStats {
    /// Total packets received.
    pub packets_received: u64,
    /// Packets dropped due to parse errors.
    pub packets_dropped: u64,
    /// Packets filtered out (wrong payload type).
    pub packets_filtered: u64,
    /// Total payload bytes received.
    pub bytes_received: u64,
    /// Last RTP sequence number seen.
    pub last_rtp_seq: u16,
    /// Last SSRC seen.
    pub last_ssrc: u32,
}

/// An RTP source that receives and parses RTP packets from UDP.
///
/// Each datagram is parsed as an RTP packet; the payload becomes a buffer
/// whose PTS is derived from the RTP timestamp at the configured clock rate.
pub struct RtpSrc {
    name: String,
    socket: UdpSocket,
    format: RtpFormat,
    sequence: u64,
    last_sender: Option<SocketAddr>,
    stats: RtpSrcStats,
}

impl RtpSrc {
    /// Create a new RTP source bound to the given address, expecting H.264
    /// at payload type 96 with a 90 kHz clock.
    pub fn bind<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let socket = UdpSocket::bind(&addr)?;
        let local_addr = socket.local_addr()?;

        Ok(Self {
            name: format!("rtpsrc-{}", local_addr),
            socket,
            format: RtpFormat::H264,
            sequence: 0,
            last_sender: None,
            stats: RtpSrcStats::default(),
        })
    }

    /// Set the expected RTP stream format.
    pub fn with_format(mut self, format: RtpFormat) -> Self {
        self.format = format;
        self
    }

    /// Set a custom name for this source.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the receive timeout. A timed-out receive yields backpressure.
    pub fn with_read_timeout(self, timeout: Duration) -> Result<Self> {
        self.socket.set_read_timeout(Some(timeout))?;
        Ok(self)
    }

    /// Get the local address this socket is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Get current statistics.
    pub fn stats(&self) -> &RtpSrcStats {
        &self.stats
    }
}

impl Source for RtpSrc {
    fn produce(&mut self) -> Result<Produced> {
        let mut recv_buf = vec![0u8; MAX_RTP_PACKET_SIZE];

        let (n, sender) = match self.socket.recv_from(&mut recv_buf) {
            Ok(result) => result,
            Err(ref e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                return Ok(Produced::WouldBlock);
            }
            Err(e) => return Err(Error::Io(e)),
        };

        self.last_sender = Some(sender);
        self.stats.packets_received += 1;

        let mut data = &recv_buf[..n];
        let packet = match Packet::unmarshal(&mut data) {
            Ok(p) => p,
            Err(e) => {
                self.stats.packets_dropped += 1;
                tracing::warn!(node = %self.name, error = %e, "RTP parse error, dropping");
                return Ok(Produced::WouldBlock);
            }
        };

        // Filter foreign payload types: the fixed caps of this receiver.
        if packet.header.payload_type != self.format.payload_type {
            self.stats.packets_filtered += 1;
            return Ok(Produced::WouldBlock);
        }

        self.stats.last_rtp_seq = packet.header.sequence_number;
        self.stats.last_ssrc = packet.header.ssrc;
        self.stats.bytes_received += packet.payload.len() as u64;

        let pts = rtp_ticks_to_clock(packet.header.timestamp, self.format.clock_rate);
        let seq = self.sequence;
        self.sequence += 1;

        let metadata = Metadata::from_sequence(seq)
            .with_pts(pts)
            .with_extra(RTP_MARKER_KEY, MetadataValue::Bool(packet.header.marker));

        Ok(Produced::Buffer(Buffer::new(packet.payload, metadata)))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn output_caps(&self) -> Caps {
        Caps::rtp_h264()
    }
}

/// Statistics for [`RtpSink`].
#[derive(Debug, Clone, Default)]
pub struct RtpSinkStats {
    /// Total packets sent.
    pub packets_sent: u64,
    /// Total payload bytes sent.
    pub bytes_sent: u64,
    /// Packets that failed to send.
    pub packets_failed: u64,
}

/// An RTP sink that wraps buffers in RTP packets and sends them over UDP.
///
/// Sequence numbers are generated per packet; timestamps derive from the
/// buffer PTS at the configured clock rate.
pub struct RtpSink {
    name: String,
    socket: UdpSocket,
    destination: SocketAddr,
    format: RtpFormat,
    ssrc: u32,
    next_seq: u16,
    stats: RtpSinkStats,
}

impl RtpSink {
    /// Create a new RTP sink connected to the given address, sending H.264
    /// at payload type 96 with a 90 kHz clock.
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| Error::Config("invalid address".into()))?;

        let socket = UdpSocket::bind("0.0.0.0:0")?;
        let local_addr = socket.local_addr()?;

        Ok(Self {
            name: format!("rtpsink-{}->{}", local_addr, addr),
            socket,
            destination: addr,
            format: RtpFormat::H264,
            ssrc: seed_u32(),
            next_seq: seed_u32() as u16,
            stats: RtpSinkStats::default(),
        })
    }

    /// Set the RTP stream format for outgoing packets.
    pub fn with_format(mut self, format: RtpFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the SSRC for outgoing packets.
    pub fn with_ssrc(mut self, ssrc: u32) -> Self {
        self.ssrc = ssrc;
        self
    }

    /// Set the initial sequence number.
    pub fn with_initial_seq(mut self, seq: u16) -> Self {
        self.next_seq = seq;
        self
    }

    /// Set a custom name for this sink.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Get current statistics.
    pub fn stats(&self) -> &RtpSinkStats {
        &self.stats
    }

    /// Get the destination address.
    pub fn destination(&self) -> SocketAddr {
        self.destination
    }
}

impl Sink for RtpSink {
    fn consume(&mut self, buffer: Buffer) -> Result<()> {
        let metadata = buffer.metadata();

        let marker = matches!(
            metadata.get_extra(RTP_MARKER_KEY),
            Some(MetadataValue::Bool(true))
        );

        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);

        let packet = Packet {
            header: rtp::header::Header {
                version: 2,
                padding: false,
                extension: false,
                marker,
                payload_type: self.format.payload_type,
                sequence_number: seq,
                timestamp: clock_to_rtp_ticks(metadata.pts, self.format.clock_rate),
                ssrc: self.ssrc,
                csrc: vec![],
                extension_profile: 0,
                extensions: vec![],
                extensions_padding: 0,
            },
            payload: buffer.payload(),
        };

        let mut out = vec![0u8; packet.marshal_size()];
        packet.marshal_to(&mut out).map_err(|e| {
            self.stats.packets_failed += 1;
            Error::Element(format!("RTP marshal error: {}", e))
        })?;

        match self.socket.send_to(&out, self.destination) {
            Ok(_) => {
                self.stats.packets_sent += 1;
                self.stats.bytes_sent += buffer.len() as u64;
                Ok(())
            }
            Err(e) => {
                self.stats.packets_failed += 1;
                Err(Error::Io(e))
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn input_caps(&self) -> Caps {
        Caps::rtp_h264()
    }
}

/// Convert an RTP timestamp to pipeline time at the given clock rate.
fn rtp_ticks_to_clock(ticks: u32, clock_rate: u32) -> ClockTime {
    if clock_rate == 0 {
        return ClockTime::NONE;
    }
    ClockTime::from_nanos((ticks as u64 * 1_000_000_000) / clock_rate as u64)
}

/// Convert pipeline time to RTP timestamp ticks at the given clock rate.
fn clock_to_rtp_ticks(time: ClockTime, clock_rate: u32) -> u32 {
    if time.is_none() {
        return 0;
    }
    ((time.nanos() as u128 * clock_rate as u128) / 1_000_000_000) as u32
}

/// Weak non-cryptographic seed for SSRC and initial sequence numbers.
fn seed_u32() -> u32 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    nanos ^ (std::process::id().rotate_left(16))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_conversions() {
        // 40ms at 90kHz is 3600 ticks
        let pts = ClockTime::from_millis(40);
        assert_eq!(clock_to_rtp_ticks(pts, 90_000), 3600);
        assert_eq!(rtp_ticks_to_clock(3600, 90_000), pts);

        assert_eq!(clock_to_rtp_ticks(ClockTime::NONE, 90_000), 0);
        assert!(rtp_ticks_to_clock(100, 0).is_none());
    }

    #[test]
    fn test_rtp_send_receive() {
        let mut src = RtpSrc::bind("127.0.0.1:0").unwrap();
        let addr = src.local_addr().unwrap();
        let mut sink = RtpSink::connect(addr).unwrap().with_ssrc(0x1234_5678);

        let metadata = Metadata::from_sequence(0)
            .with_pts(ClockTime::from_millis(40))
            .with_extra(RTP_MARKER_KEY, MetadataValue::Bool(true));
        sink.consume(Buffer::from_vec(vec![0xAA; 64], metadata))
            .unwrap();

        match src.produce().unwrap() {
            Produced::Buffer(buffer) => {
                assert_eq!(buffer.len(), 64);
                assert_eq!(buffer.metadata().pts, ClockTime::from_millis(40));
                assert_eq!(
                    buffer.metadata().get_extra(RTP_MARKER_KEY),
                    Some(&MetadataValue::Bool(true))
                );
                assert_eq!(src.stats().last_ssrc, 0x1234_5678);
            }
            other => panic!("expected buffer, got {:?}", other),
        }
    }

    #[test]
    fn test_foreign_payload_type_filtered() {
        let mut src = RtpSrc::bind("127.0.0.1:0")
            .unwrap()
            .with_read_timeout(Duration::from_millis(50))
            .unwrap();
        let addr = src.local_addr().unwrap();

        // Send PT 111 at an H.264 (PT 96) receiver
        let mut sink = RtpSink::connect(addr)
            .unwrap()
            .with_format(RtpFormat::new(111, 48_000, crate::format::RtpEncoding::H264));
        sink.consume(Buffer::from_vec(vec![1, 2, 3], Metadata::new()))
            .unwrap();

        assert!(matches!(src.produce().unwrap(), Produced::WouldBlock));
        assert_eq!(src.stats().packets_filtered, 1);
    }

    #[test]
    fn test_sequence_numbers_increment() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        let mut sink = RtpSink::connect(receiver.local_addr().unwrap())
            .unwrap()
            .with_initial_seq(100);

        for _ in 0..2 {
            sink.consume(Buffer::from_vec(vec![0u8; 8], Metadata::new()))
                .unwrap();
        }

        let mut buf = [0u8; 256];
        let (n, _) = receiver.recv_from(&mut buf).unwrap();
        let mut data = &buf[..n];
        let first = Packet::unmarshal(&mut data).unwrap();
        let (n, _) = receiver.recv_from(&mut buf).unwrap();
        let mut data = &buf[..n];
        let second = Packet::unmarshal(&mut data).unwrap();

        assert_eq!(first.header.sequence_number, 100);
        assert_eq!(second.header.sequence_number, 101);
    }
}
