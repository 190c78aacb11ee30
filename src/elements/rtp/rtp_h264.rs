//! H.264 RTP payloader and depayloader.

use crate::buffer::Buffer;
use crate::element::{Element, Output};
use crate::error::{Error, Result};
use crate::format::Caps;
use crate::metadata::MetadataValue;

use bytes::Bytes;
use rtp::codecs::h264::{H264Packet, H264Payloader};
use rtp::packetizer::{Depacketizer, Payloader};

use super::RTP_MARKER_KEY;

/// Default MTU for RTP payloaders.
const DEFAULT_MTU: usize = 1400;

/// H.264/AVC RTP packetizer.
///
/// Converts Annex B access units into RTP payload chunks with proper
/// fragmentation (FU-A) and aggregation (STAP-A). One output buffer per RTP
/// payload; the last chunk of each access unit carries the marker flag in
/// its extra metadata for the downstream [`super::RtpSink`].
pub struct RtpH264Pay {
    name: String,
    payloader: H264Payloader,
    mtu: usize,
    frames_in: u64,
    packets_out: u64,
}

impl RtpH264Pay {
    /// Create a new H.264 packetizer.
    pub fn new() -> Self {
        Self {
            name: "rtp-h264-pay".into(),
            payloader: H264Payloader::default(),
            mtu: DEFAULT_MTU,
            frames_in: 0,
            packets_out: 0,
        }
    }

    /// Set the MTU (maximum payload size per RTP packet).
    pub fn with_mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    /// Set a custom name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Number of RTP payloads emitted.
    pub fn packets_out(&self) -> u64 {
        self.packets_out
    }
}

impl Default for RtpH264Pay {
    fn default() -> Self {
        Self::new()
    }
}

impl Element for RtpH264Pay {
    fn transform(&mut self, buffer: Buffer) -> Result<Output> {
        let payload = buffer.payload();
        self.frames_in += 1;

        let packets = self
            .payloader
            .payload(self.mtu, &payload)
            .map_err(|e| Error::Element(format!("H.264 packetize error: {}", e)))?;

        if packets.is_empty() {
            return Ok(Output::None);
        }

        let last = packets.len() - 1;
        self.packets_out += packets.len() as u64;

        let out: Vec<Buffer> = packets
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| {
                let metadata = buffer
                    .metadata()
                    .clone()
                    .with_extra(RTP_MARKER_KEY, MetadataValue::Bool(i == last));
                Buffer::new(chunk, metadata)
            })
            .collect();

        Ok(Output::from(out))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn input_caps(&self) -> Caps {
        Caps::h264()
    }

    fn output_caps(&self) -> Caps {
        Caps::rtp_h264()
    }
}

/// H.264/AVC RTP depacketizer.
///
/// Converts RTP payloads back into Annex B access units. Fragmented units
/// produce no output until the final fragment arrives.
pub struct RtpH264Depay {
    name: String,
    depacketizer: H264Packet,
    packets_in: u64,
    frames_out: u64,
}

impl RtpH264Depay {
    /// Create a new H.264 depacketizer.
    pub fn new() -> Self {
        Self {
            name: "rtp-h264-depay".into(),
            depacketizer: H264Packet::default(),
            packets_in: 0,
            frames_out: 0,
        }
    }

    /// Set a custom name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Number of access units emitted.
    pub fn frames_out(&self) -> u64 {
        self.frames_out
    }
}

impl Default for RtpH264Depay {
    fn default() -> Self {
        Self::new()
    }
}

impl Element for RtpH264Depay {
    fn transform(&mut self, buffer: Buffer) -> Result<Output> {
        let payload: Bytes = buffer.payload();
        self.packets_in += 1;

        let output = self
            .depacketizer
            .depacketize(&payload)
            .map_err(|e| Error::Element(format!("H.264 depacketize error: {}", e)))?;

        if output.is_empty() {
            // Fragment not complete yet
            return Ok(Output::None);
        }

        self.frames_out += 1;

        let mut metadata = buffer.metadata().clone();
        // IDR NAL right after the start code marks a sync point.
        if output.len() > 4 {
            let nal_type = output[4] & 0x1F;
            metadata.flags.sync_point = nal_type == 5;
        }

        Ok(Output::single(Buffer::new(output, metadata)))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn input_caps(&self) -> Caps {
        Caps::rtp_h264()
    }

    fn output_caps(&self) -> Caps {
        Caps::h264()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Metadata;

    fn annexb_idr() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&[0, 0, 0, 1, 0x67, 0x42, 0x00, 0x1E]);
        data.extend_from_slice(&[0, 0, 0, 1, 0x68, 0xCE, 0x3C, 0x80]);
        data.extend_from_slice(&[0, 0, 0, 1, 0x65]);
        data.extend_from_slice(&vec![0xAB; 100]);
        data
    }

    #[test]
    fn test_pay_small_frame_single_packet_per_nal() {
        let mut pay = RtpH264Pay::new();
        let out = pay
            .transform(Buffer::from_vec(annexb_idr(), Metadata::from_sequence(0)))
            .unwrap();
        assert!(!out.is_empty());
    }

    #[test]
    fn test_pay_fragments_large_frame() {
        let mut pay = RtpH264Pay::new().with_mtu(200);
        let mut data = vec![0, 0, 0, 1, 0x65];
        data.extend_from_slice(&vec![0xCD; 1000]);

        let out = pay
            .transform(Buffer::from_vec(data, Metadata::new()))
            .unwrap();
        // 1000 bytes at MTU 200 fragments into multiple FU-A packets
        assert!(out.len() > 1);
    }

    #[test]
    fn test_pay_marks_last_chunk() {
        let mut pay = RtpH264Pay::new().with_mtu(200);
        let mut data = vec![0, 0, 0, 1, 0x65];
        data.extend_from_slice(&vec![0xCD; 1000]);

        let buffers = pay
            .transform(Buffer::from_vec(data, Metadata::new()))
            .unwrap()
            .into_vec();
        let n = buffers.len();
        for (i, b) in buffers.iter().enumerate() {
            let marker = b.metadata().get_extra(RTP_MARKER_KEY);
            assert_eq!(marker, Some(&MetadataValue::Bool(i == n - 1)));
        }
    }

    #[test]
    fn test_pay_depay_round_trip() {
        let mut pay = RtpH264Pay::new().with_mtu(200);
        let mut depay = RtpH264Depay::new();

        let mut data = vec![0, 0, 0, 1, 0x65];
        data.extend_from_slice(&vec![0xCD; 1000]);

        let chunks = pay
            .transform(Buffer::from_vec(data.clone(), Metadata::new()))
            .unwrap();

        let mut reassembled = Vec::new();
        for chunk in chunks {
            let out = depay.transform(chunk).unwrap();
            for b in out {
                reassembled.extend_from_slice(b.as_bytes());
            }
        }

        // The depacketizer emits the slice back in Annex B form
        assert!(!reassembled.is_empty());
        let idx = reassembled
            .windows(2)
            .position(|w| w == [0x65, 0xCD])
            .expect("slice NAL present");
        assert_eq!(reassembled[idx..].len(), 1001);
        assert_eq!(depay.frames_out(), 1);
    }

    #[test]
    fn test_empty_payload_rejected() {
        let mut pay = RtpH264Pay::new();
        let out = pay
            .transform(Buffer::from_vec(vec![], Metadata::new()))
            .unwrap();
        assert!(out.is_none());
    }
}
