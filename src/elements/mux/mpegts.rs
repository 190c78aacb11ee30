//! MPEG Transport Stream multiplexer.
//!
//! Combines elementary streams (H.264 video, KLV metadata) into transport
//! stream packets:
//!
//! - PSI table generation (PAT, PMT) with the MPEG CRC-32
//! - PES packetization with 90 kHz PTS
//! - Per-PID continuity counters
//! - PCR on the video track
//!
//! [`TsMux`] is the packetizer; [`TsMuxElement`] exposes it as a pipeline
//! muxer with `video` and `klv` input pads.

use crate::buffer::Buffer;
use crate::clock::ClockTime;
use crate::element::{Muxer, Output};
use crate::error::{Error, Result};
use crate::format::Caps;
use crate::metadata::Metadata;

use std::collections::HashMap;

// ============================================================================
// Constants
// ============================================================================

/// Size of a single MPEG-TS packet.
pub const TS_PACKET_SIZE: usize = 188;

/// Sync byte for TS packets.
const SYNC_BYTE: u8 = 0x47;

/// PMT default PID.
const PMT_PID_DEFAULT: u16 = 0x1000;

/// Repeat PSI every this many TS packets by default.
const PSI_INTERVAL_DEFAULT: u32 = 200;

// ============================================================================
// Stream Types (ISO/IEC 13818-1)
// ============================================================================

/// MPEG-TS stream type for muxing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TsMuxStreamType {
    /// H.264/AVC video (0x1B).
    H264,
    /// Private PES data (0x06).
    PrivateData,
    /// SMPTE ST 0336 KLV metadata (0x15).
    Klv,
}

impl TsMuxStreamType {
    /// Get the ISO/IEC 13818-1 stream type code.
    pub fn stream_type_code(&self) -> u8 {
        match self {
            TsMuxStreamType::H264 => 0x1B,
            TsMuxStreamType::PrivateData => 0x06,
            TsMuxStreamType::Klv => 0x15,
        }
    }

    /// Returns true if this is a video stream type.
    pub fn is_video(&self) -> bool {
        matches!(self, TsMuxStreamType::H264)
    }
}

// ============================================================================
// Track Configuration
// ============================================================================

/// Configuration for one track in the mux.
#[derive(Debug, Clone)]
pub struct TsMuxTrack {
    /// Elementary stream PID (13-bit, 0x0010-0x1FFE).
    pub pid: u16,
    /// Stream type.
    pub stream_type: TsMuxStreamType,
    /// Stream ID for the PES header (0xE0 video, 0xBD private data).
    pub stream_id: u8,
    /// Whether this track carries PCR.
    pub is_pcr_pid: bool,
}

impl TsMuxTrack {
    /// Create a new track with a stream-type appropriate PES stream ID.
    pub fn new(pid: u16, stream_type: TsMuxStreamType) -> Self {
        let stream_id = match stream_type {
            TsMuxStreamType::H264 => 0xE0,
            TsMuxStreamType::PrivateData | TsMuxStreamType::Klv => 0xBD,
        };
        Self {
            pid,
            stream_type,
            stream_id,
            is_pcr_pid: false,
        }
    }

    /// Mark as the video track (carries PCR).
    pub fn video(mut self) -> Self {
        self.stream_id = 0xE0;
        self.is_pcr_pid = true;
        self
    }

    /// Mark as a private data track (KLV metadata).
    pub fn private_data(mut self) -> Self {
        self.stream_id = 0xBD;
        self
    }
}

// ============================================================================
// Mux Configuration
// ============================================================================

/// Configuration for the TS muxer.
#[derive(Debug, Clone)]
pub struct TsMuxConfig {
    /// Program number.
    pub program_number: u16,
    /// PMT PID.
    pub pmt_pid: u16,
    /// Tracks in this program.
    pub tracks: Vec<TsMuxTrack>,
    /// Transport stream ID.
    pub ts_id: u16,
    /// PSI repeat interval in packets (0 = only at start).
    pub psi_interval: u32,
}

impl Default for TsMuxConfig {
    fn default() -> Self {
        Self {
            program_number: 1,
            pmt_pid: PMT_PID_DEFAULT,
            tracks: Vec::new(),
            ts_id: 1,
            psi_interval: PSI_INTERVAL_DEFAULT,
        }
    }
}

impl TsMuxConfig {
    /// Create a new configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a track to the configuration.
    pub fn add_track(mut self, track: TsMuxTrack) -> Self {
        self.tracks.push(track);
        self
    }

    /// Set the program number.
    pub fn program_number(mut self, number: u16) -> Self {
        self.program_number = number;
        self
    }

    /// Set the PMT PID.
    pub fn pmt_pid(mut self, pid: u16) -> Self {
        self.pmt_pid = pid;
        self
    }

    /// Set the PSI repeat interval (in TS packets, 0 = only at start).
    pub fn psi_interval(mut self, interval: u32) -> Self {
        self.psi_interval = interval;
        self
    }

    /// Get the PCR PID (first PCR track, falling back to the first video).
    pub fn pcr_pid(&self) -> Option<u16> {
        self.tracks
            .iter()
            .find(|t| t.is_pcr_pid)
            .or_else(|| self.tracks.iter().find(|t| t.stream_type.is_video()))
            .map(|t| t.pid)
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Statistics for the TS muxer.
#[derive(Debug, Clone, Default)]
pub struct TsMuxStats {
    /// Total TS packets written.
    pub packets_written: u64,
    /// Total bytes written.
    pub bytes_written: u64,
    /// PES packets written.
    pub pes_packets: u64,
    /// PAT sections written.
    pub pat_packets: u64,
    /// PMT sections written.
    pub pmt_packets: u64,
    /// PCR fields written.
    pub pcr_count: u64,
}

// ============================================================================
// TS Muxer
// ============================================================================

#[derive(Debug, Default)]
struct TrackState {
    /// Continuity counter (4-bit).
    continuity_counter: u8,
}

/// MPEG Transport Stream multiplexer.
pub struct TsMux {
    config: TsMuxConfig,
    track_states: HashMap<u16, TrackState>,
    pat_cc: u8,
    pmt_cc: u8,
    stats: TsMuxStats,
    packet_counter: u32,
    psi_written: bool,
}

impl TsMux {
    /// Create a new TS muxer with the given configuration.
    pub fn new(config: TsMuxConfig) -> Self {
        let mut track_states = HashMap::new();
        for track in &config.tracks {
            track_states.insert(track.pid, TrackState::default());
        }

        Self {
            config,
            track_states,
            pat_cc: 0,
            pmt_cc: 0,
            stats: TsMuxStats::default(),
            packet_counter: 0,
            psi_written: false,
        }
    }

    /// Get current statistics.
    pub fn stats(&self) -> &TsMuxStats {
        &self.stats
    }

    /// Get the configuration.
    pub fn config(&self) -> &TsMuxConfig {
        &self.config
    }

    /// Generate PSI tables (PAT + PMT).
    pub fn write_psi(&mut self) -> Vec<u8> {
        let mut output = Vec::new();
        output.extend(self.write_pat());
        output.extend(self.write_pmt());
        self.psi_written = true;
        output
    }

    fn write_pat(&mut self) -> Vec<u8> {
        let mut section = Vec::new();
        section.push(0x00); // table_id = PAT

        let section_length_pos = section.len();
        section.push(0x00);
        section.push(0x00);

        section.push((self.config.ts_id >> 8) as u8);
        section.push((self.config.ts_id & 0xFF) as u8);
        section.push(0xC1); // version 0, current_next 1
        section.push(0x00); // section number
        section.push(0x00); // last section number

        section.push((self.config.program_number >> 8) as u8);
        section.push((self.config.program_number & 0xFF) as u8);
        section.push(0xE0 | ((self.config.pmt_pid >> 8) as u8 & 0x1F));
        section.push((self.config.pmt_pid & 0xFF) as u8);

        let section_length = section.len() - 3 + 4; // CRC included
        section[section_length_pos] = 0xB0 | ((section_length >> 8) as u8 & 0x0F);
        section[section_length_pos + 1] = (section_length & 0xFF) as u8;

        let crc = crc32_mpeg(&section);
        section.extend(crc.to_be_bytes());

        self.stats.pat_packets += 1;
        let cc = self.pat_cc;
        self.pat_cc = (self.pat_cc + 1) & 0x0F;
        self.write_section_packet(0x0000, cc, &section)
    }

    fn write_pmt(&mut self) -> Vec<u8> {
        let pcr_pid = self.config.pcr_pid().unwrap_or(0x1FFF);

        let mut section = Vec::new();
        section.push(0x02); // table_id = PMT

        let section_length_pos = section.len();
        section.push(0x00);
        section.push(0x00);

        section.push((self.config.program_number >> 8) as u8);
        section.push((self.config.program_number & 0xFF) as u8);
        section.push(0xC1);
        section.push(0x00);
        section.push(0x00);

        section.push(0xE0 | ((pcr_pid >> 8) as u8 & 0x1F));
        section.push((pcr_pid & 0xFF) as u8);

        // program_info_length = 0
        section.push(0xF0);
        section.push(0x00);

        for track in &self.config.tracks {
            section.push(track.stream_type.stream_type_code());
            section.push(0xE0 | ((track.pid >> 8) as u8 & 0x1F));
            section.push((track.pid & 0xFF) as u8);
            // ES_info_length = 0
            section.push(0xF0);
            section.push(0x00);
        }

        let section_length = section.len() - 3 + 4;
        section[section_length_pos] = 0xB0 | ((section_length >> 8) as u8 & 0x0F);
        section[section_length_pos + 1] = (section_length & 0xFF) as u8;

        let crc = crc32_mpeg(&section);
        section.extend(crc.to_be_bytes());

        self.stats.pmt_packets += 1;
        let cc = self.pmt_cc;
        self.pmt_cc = (self.pmt_cc + 1) & 0x0F;
        let pid = self.config.pmt_pid;
        self.write_section_packet(pid, cc, &section)
    }

    /// Wrap a PSI section into a single padded TS packet.
    fn write_section_packet(&mut self, pid: u16, cc: u8, section: &[u8]) -> Vec<u8> {
        let mut packet = vec![0xFFu8; TS_PACKET_SIZE];
        packet[0] = SYNC_BYTE;
        packet[1] = 0x40 | ((pid >> 8) as u8 & 0x1F); // PUSI set
        packet[2] = (pid & 0xFF) as u8;
        packet[3] = 0x10 | (cc & 0x0F); // payload only
        packet[4] = 0x00; // pointer field

        let end = 5 + section.len();
        packet[5..end].copy_from_slice(section);

        self.stats.packets_written += 1;
        self.stats.bytes_written += TS_PACKET_SIZE as u64;
        packet
    }

    /// Write a PES packet for the given PID, fragmented into TS packets.
    ///
    /// Interleaves PSI refreshes per the configured interval. The first TS
    /// packet of a PCR track's PES carries a PCR derived from the PTS.
    pub fn write_pes(&mut self, pid: u16, payload: &[u8], pts: Option<ClockTime>) -> Result<Vec<u8>> {
        let track = self
            .config
            .tracks
            .iter()
            .find(|t| t.pid == pid)
            .cloned()
            .ok_or_else(|| Error::Element(format!("unknown mux PID {}", pid)))?;

        let mut output = Vec::new();

        if !self.psi_written
            || (self.config.psi_interval > 0
                && self.packet_counter >= self.config.psi_interval)
        {
            output.extend(self.write_psi());
            self.packet_counter = 0;
        }

        let pes = build_pes(track.stream_id, payload, pts);
        self.stats.pes_packets += 1;

        let pcr = if track.is_pcr_pid {
            pts.map(|t| t.to_90khz() * 300)
        } else {
            None
        };

        let mut remaining = &pes[..];
        let mut first = true;
        while !remaining.is_empty() {
            let state = self.track_states.entry(pid).or_default();
            let cc = state.continuity_counter;
            state.continuity_counter = (state.continuity_counter + 1) & 0x0F;

            let mut packet = vec![0xFFu8; TS_PACKET_SIZE];
            packet[0] = SYNC_BYTE;
            packet[1] = ((first as u8) << 6) | ((pid >> 8) as u8 & 0x1F);
            packet[2] = (pid & 0xFF) as u8;

            let mut header_len = 4usize;
            let mut adaptation: Vec<u8> = Vec::new();

            if first {
                if let Some(pcr_val) = pcr {
                    // Adaptation field with PCR flag
                    let base = pcr_val / 300;
                    let ext = (pcr_val % 300) as u16;
                    adaptation.push(0x10); // PCR flag
                    adaptation.push((base >> 25) as u8);
                    adaptation.push((base >> 17) as u8);
                    adaptation.push((base >> 9) as u8);
                    adaptation.push((base >> 1) as u8);
                    adaptation.push((((base & 0x1) as u8) << 7) | 0x7E | ((ext >> 8) as u8 & 0x01));
                    adaptation.push((ext & 0xFF) as u8);
                    self.stats.pcr_count += 1;
                }
            }

            let space = TS_PACKET_SIZE - header_len;
            let adaptation_overhead = if adaptation.is_empty() { 0 } else { 1 + adaptation.len() };
            let mut payload_space = space - adaptation_overhead;

            // Short final fragments need stuffing in the adaptation field.
            let stuffing = payload_space.saturating_sub(remaining.len());
            if stuffing > 0 && adaptation.is_empty() {
                // Create an adaptation field purely for stuffing.
                if stuffing == 1 {
                    // Single stuffing byte: adaptation_field_length = 0
                    adaptation.clear();
                    payload_space = space - 1;
                } else {
                    adaptation.push(0x00); // no flags
                    adaptation.extend(std::iter::repeat(0xFF).take(stuffing - 2));
                    payload_space = remaining.len();
                }
            } else if stuffing > 0 {
                adaptation.extend(std::iter::repeat(0xFF).take(stuffing));
                payload_space = remaining.len();
            }

            let has_adaptation = !adaptation.is_empty() || (stuffing == 1);
            packet[3] = (if has_adaptation { 0x30 } else { 0x10 }) | (cc & 0x0F);

            if has_adaptation {
                packet[4] = adaptation.len() as u8;
                packet[5..5 + adaptation.len()].copy_from_slice(&adaptation);
                header_len = 5 + adaptation.len();
            }

            let take = remaining.len().min(payload_space);
            packet[header_len..header_len + take].copy_from_slice(&remaining[..take]);
            remaining = &remaining[take..];
            first = false;

            self.stats.packets_written += 1;
            self.stats.bytes_written += TS_PACKET_SIZE as u64;
            self.packet_counter += 1;
            output.extend(packet);
        }

        Ok(output)
    }
}

/// Build a PES packet with an optional 90 kHz PTS.
fn build_pes(stream_id: u8, payload: &[u8], pts: Option<ClockTime>) -> Vec<u8> {
    let mut pes = Vec::with_capacity(payload.len() + 19);
    pes.extend_from_slice(&[0x00, 0x00, 0x01, stream_id]);

    let header_data_len: usize = if pts.is_some() { 5 } else { 0 };
    let packet_len = 3 + header_data_len + payload.len();
    // Video PES may exceed the 16-bit length field; 0 means unbounded.
    if packet_len > 0xFFFF {
        pes.extend_from_slice(&[0x00, 0x00]);
    } else {
        pes.extend_from_slice(&(packet_len as u16).to_be_bytes());
    }

    pes.push(0x80); // marker bits
    pes.push(if pts.is_some() { 0x80 } else { 0x00 }); // PTS flag
    pes.push(header_data_len as u8);

    if let Some(pts) = pts {
        let ticks = pts.to_90khz() & 0x1_FFFF_FFFF;
        pes.push(0x21 | (((ticks >> 30) as u8 & 0x07) << 1));
        pes.push((ticks >> 22) as u8);
        pes.push(0x01 | (((ticks >> 15) as u8 & 0x7F) << 1));
        pes.push((ticks >> 7) as u8);
        pes.push(0x01 | (((ticks & 0x7F) as u8) << 1));
    }

    pes.extend_from_slice(payload);
    pes
}

/// MPEG CRC-32 (polynomial 0x04C11DB7, no reflection, init all-ones).
fn crc32_mpeg(data: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= (byte as u32) << 24;
        for _ in 0..8 {
            if crc & 0x8000_0000 != 0 {
                crc = (crc << 1) ^ 0x04C1_1DB7;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

// ============================================================================
// Muxer element
// ============================================================================

/// Pipeline muxer element wrapping [`TsMux`].
///
/// Exposes `video` and `klv` input pads mapped to the first video and first
/// non-video track in the configuration.
pub struct TsMuxElement {
    name: String,
    mux: TsMux,
    video_pid: Option<u16>,
    klv_pid: Option<u16>,
}

impl TsMuxElement {
    /// Create a muxer element from a mux configuration.
    pub fn new(config: TsMuxConfig) -> Self {
        let video_pid = config
            .tracks
            .iter()
            .find(|t| t.stream_type.is_video())
            .map(|t| t.pid);
        let klv_pid = config
            .tracks
            .iter()
            .find(|t| !t.stream_type.is_video())
            .map(|t| t.pid);

        Self {
            name: "tsmux".to_string(),
            mux: TsMux::new(config),
            video_pid,
            klv_pid,
        }
    }

    /// Set a custom name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Get muxer statistics.
    pub fn stats(&self) -> &TsMuxStats {
        self.mux.stats()
    }
}

impl Muxer for TsMuxElement {
    fn mux(&mut self, pad: &str, buffer: Buffer) -> Result<Output> {
        let pid = match pad {
            "video" => self
                .video_pid
                .ok_or_else(|| Error::Element("muxer has no video track".into()))?,
            "klv" => self
                .klv_pid
                .ok_or_else(|| Error::Element("muxer has no klv track".into()))?,
            other => {
                return Err(Error::Element(format!(
                    "{}: unknown input pad '{}'",
                    self.name, other
                )));
            }
        };

        let pts = buffer.metadata().pts.to_option();
        let ts = self.mux.write_pes(pid, buffer.as_bytes(), pts)?;

        let metadata = Metadata::from_sequence(self.mux.stats().pes_packets)
            .with_pts(buffer.metadata().pts);
        Ok(Output::single(Buffer::from_vec(ts, metadata)))
    }

    fn input_pads(&self) -> Vec<String> {
        let mut pads = Vec::new();
        if self.video_pid.is_some() {
            pads.push("video".to_string());
        }
        if self.klv_pid.is_some() {
            pads.push("klv".to_string());
        }
        pads
    }

    fn pad_caps(&self, pad: &str) -> Caps {
        match pad {
            "video" => Caps::h264(),
            "klv" => Caps::klv(),
            _ => Caps::any(),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn output_caps(&self) -> Caps {
        Caps::mpegts()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> TsMuxConfig {
        TsMuxConfig::new()
            .add_track(TsMuxTrack::new(256, TsMuxStreamType::H264).video())
            .add_track(TsMuxTrack::new(257, TsMuxStreamType::Klv).private_data())
    }

    #[test]
    fn test_psi_packet_shape() {
        let mut mux = TsMux::new(test_config());
        let psi = mux.write_psi();

        // PAT + PMT, one packet each
        assert_eq!(psi.len(), 2 * TS_PACKET_SIZE);
        assert_eq!(psi[0], SYNC_BYTE);
        assert_eq!(psi[TS_PACKET_SIZE], SYNC_BYTE);

        // PAT is on PID 0 with PUSI set
        assert_eq!(psi[1] & 0x40, 0x40);
        assert_eq!(((psi[1] as u16 & 0x1F) << 8) | psi[2] as u16, 0);

        // PMT PID matches config
        let pmt = &psi[TS_PACKET_SIZE..];
        assert_eq!(((pmt[1] as u16 & 0x1F) << 8) | pmt[2] as u16, PMT_PID_DEFAULT);
    }

    #[test]
    fn test_write_pes_packetizes() {
        let mut mux = TsMux::new(test_config());
        let payload = vec![0xAB; 1000];
        let ts = mux
            .write_pes(256, &payload, Some(ClockTime::from_millis(40)))
            .unwrap();

        // PSI emitted first, then PES split over 188-byte packets
        assert_eq!(ts.len() % TS_PACKET_SIZE, 0);
        assert!(ts.len() / TS_PACKET_SIZE >= 7);
        for chunk in ts.chunks(TS_PACKET_SIZE) {
            assert_eq!(chunk[0], SYNC_BYTE);
        }
        assert_eq!(mux.stats().pes_packets, 1);
        assert!(mux.stats().pcr_count >= 1);
    }

    #[test]
    fn test_unknown_pid_rejected() {
        let mut mux = TsMux::new(test_config());
        assert!(mux.write_pes(999, &[0u8; 4], None).is_err());
    }

    #[test]
    fn test_continuity_counters_advance() {
        let mut mux = TsMux::new(test_config());
        let ts1 = mux.write_pes(257, &[0u8; 16], None).unwrap();
        let ts2 = mux.write_pes(257, &[0u8; 16], None).unwrap();

        // Last packet of each write on PID 257
        let last1 = &ts1[ts1.len() - TS_PACKET_SIZE..];
        let last2 = &ts2[ts2.len() - TS_PACKET_SIZE..];
        let cc1 = last1[3] & 0x0F;
        let cc2 = last2[3] & 0x0F;
        assert_eq!((cc1 + 1) & 0x0F, cc2);
    }

    #[test]
    fn test_crc32_known_value() {
        // CRC of an empty message is the initial register
        assert_eq!(crc32_mpeg(&[]), 0xFFFF_FFFF);
        // Differs per content
        assert_ne!(crc32_mpeg(&[0x00]), crc32_mpeg(&[0x01]));
    }

    #[test]
    fn test_pes_header_pts() {
        let pes = build_pes(0xE0, &[1, 2, 3], Some(ClockTime::from_millis(40)));
        assert_eq!(&pes[..4], &[0x00, 0x00, 0x01, 0xE0]);
        // PTS flag set, header data length 5
        assert_eq!(pes[7] & 0x80, 0x80);
        assert_eq!(pes[8], 5);

        // Decode the 33-bit PTS back
        let p = &pes[9..14];
        let ticks = (((p[0] as u64 >> 1) & 0x07) << 30)
            | ((p[1] as u64) << 22)
            | (((p[2] as u64 >> 1) & 0x7F) << 15)
            | ((p[3] as u64) << 7)
            | ((p[4] as u64 >> 1) & 0x7F);
        assert_eq!(ticks, ClockTime::from_millis(40).to_90khz());
    }

    #[test]
    fn test_mux_element_pads() {
        let element = TsMuxElement::new(test_config());
        assert_eq!(element.input_pads(), vec!["video", "klv"]);
        assert!(element.pad_caps("video").intersects(&Caps::h264()));
        assert!(element.pad_caps("klv").intersects(&Caps::klv()));
    }

    #[test]
    fn test_mux_element_unknown_pad() {
        let mut element = TsMuxElement::new(test_config());
        let buffer = Buffer::from_vec(vec![0u8; 8], Metadata::new());
        assert!(element.mux("audio", buffer).is_err());
    }

    #[test]
    fn test_mux_element_output() {
        let mut element = TsMuxElement::new(test_config());
        let buffer = Buffer::from_vec(
            vec![0u8; 32],
            Metadata::new().with_pts(ClockTime::from_millis(40)),
        );
        let out = element.mux("klv", buffer).unwrap();
        let ts = out.into_single().unwrap();
        assert_eq!(ts.len() % TS_PACKET_SIZE, 0);
    }
}
