//! MPEG Transport Stream demultiplexer.
//!
//! Parses transport stream packets back into elementary streams:
//!
//! - sync-byte alignment across arbitrary input chunking
//! - PAT/PMT parsing to discover the program's elementary streams
//! - per-PID PES reassembly with 90 kHz PTS extraction
//!
//! [`TsDemux`] is the parser; [`TsDemuxElement`] exposes it as a pipeline
//! demuxer whose output pads appear as the PMT is parsed.

use crate::buffer::Buffer;
use crate::clock::ClockTime;
use crate::element::{Demuxer, PadAddedCallback, PadId, RoutedOutput};
use crate::error::Result;
use crate::format::Caps;
use crate::metadata::Metadata;

use std::collections::HashMap;

/// Size of a single MPEG-TS packet.
const TS_PACKET_SIZE: usize = 188;

/// Sync byte for TS packets.
const SYNC_BYTE: u8 = 0x47;

/// H.264 stream type (ISO/IEC 13818-1).
const STREAM_TYPE_H264: u8 = 0x1B;
/// SMPTE KLV metadata stream type.
const STREAM_TYPE_KLV: u8 = 0x15;
/// Private PES data stream type.
const STREAM_TYPE_PRIVATE: u8 = 0x06;

/// Events produced while parsing transport stream bytes.
#[derive(Debug)]
pub enum DemuxEvent {
    /// A new elementary stream was found in the PMT.
    StreamFound {
        /// The elementary stream PID.
        pid: u16,
        /// ISO/IEC 13818-1 stream type code.
        stream_type: u8,
    },
    /// A complete PES payload was reassembled.
    Pes {
        /// The elementary stream PID.
        pid: u16,
        /// Presentation timestamp, if the PES header carried one.
        pts: Option<ClockTime>,
        /// The elementary stream payload.
        data: Vec<u8>,
    },
}

/// Statistics for the TS demuxer.
#[derive(Debug, Clone, Default)]
pub struct TsDemuxStats {
    /// TS packets parsed.
    pub packets_parsed: u64,
    /// Bytes skipped while hunting for sync.
    pub bytes_skipped: u64,
    /// PES payloads reassembled.
    pub pes_packets: u64,
    /// Packets dropped for malformed headers.
    pub packets_dropped: u64,
}

#[derive(Debug, Default)]
struct PesAssembly {
    /// Raw PES bytes accumulated since the last PUSI.
    buf: Vec<u8>,
    started: bool,
}

/// Transport stream parser.
pub struct TsDemux {
    /// Partial TS packet carried between feeds.
    pending: Vec<u8>,
    pmt_pid: Option<u16>,
    /// ES PID -> stream type, from the PMT.
    streams: HashMap<u16, u8>,
    assemblies: HashMap<u16, PesAssembly>,
    stats: TsDemuxStats,
}

impl TsDemux {
    /// Create a new parser.
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            pmt_pid: None,
            streams: HashMap::new(),
            assemblies: HashMap::new(),
            stats: TsDemuxStats::default(),
        }
    }

    /// Get parser statistics.
    pub fn stats(&self) -> &TsDemuxStats {
        &self.stats
    }

    /// Known elementary streams (PID -> stream type).
    pub fn streams(&self) -> &HashMap<u16, u8> {
        &self.streams
    }

    /// Feed transport stream bytes, producing demux events.
    ///
    /// Input chunking is arbitrary; partial packets are carried over to the
    /// next feed.
    pub fn feed(&mut self, data: &[u8]) -> Vec<DemuxEvent> {
        let mut events = Vec::new();

        self.pending.extend_from_slice(data);

        let mut pos = 0usize;
        while self.pending.len() - pos >= TS_PACKET_SIZE {
            if self.pending[pos] != SYNC_BYTE {
                pos += 1;
                self.stats.bytes_skipped += 1;
                continue;
            }
            let packet: Vec<u8> = self.pending[pos..pos + TS_PACKET_SIZE].to_vec();
            pos += TS_PACKET_SIZE;
            self.parse_packet(&packet, &mut events);
        }
        self.pending.drain(..pos);

        events
    }

    fn parse_packet(&mut self, packet: &[u8], events: &mut Vec<DemuxEvent>) {
        self.stats.packets_parsed += 1;

        let pusi = packet[1] & 0x40 != 0;
        let pid = ((packet[1] as u16 & 0x1F) << 8) | packet[2] as u16;
        let adaptation_control = (packet[3] >> 4) & 0x03;

        let mut payload_start = 4usize;
        if adaptation_control == 0x02 {
            // Adaptation field only, no payload
            return;
        }
        if adaptation_control == 0x03 {
            let af_len = packet[4] as usize;
            payload_start = 5 + af_len;
            if payload_start >= TS_PACKET_SIZE {
                self.stats.packets_dropped += 1;
                return;
            }
        }
        let payload = &packet[payload_start..];

        if pid == 0x0000 {
            self.parse_pat(payload, pusi);
        } else if Some(pid) == self.pmt_pid {
            self.parse_pmt(payload, pusi, events);
        } else if self.streams.contains_key(&pid) {
            self.accumulate_pes(pid, payload, pusi, events);
        }
    }

    fn parse_pat(&mut self, payload: &[u8], pusi: bool) {
        let section = match section_bytes(payload, pusi) {
            Some(s) => s,
            None => return,
        };
        if section.first() != Some(&0x00) || section.len() < 13 {
            return;
        }
        let section_length = (((section[1] as usize) & 0x0F) << 8) | section[2] as usize;
        let end = (3 + section_length).min(section.len());
        // Program entries run up to the CRC
        let mut pos = 8;
        while pos + 4 <= end.saturating_sub(4) {
            let program = ((section[pos] as u16) << 8) | section[pos + 1] as u16;
            let pid = ((section[pos + 2] as u16 & 0x1F) << 8) | section[pos + 3] as u16;
            if program != 0 {
                self.pmt_pid = Some(pid);
            }
            pos += 4;
        }
    }

    fn parse_pmt(&mut self, payload: &[u8], pusi: bool, events: &mut Vec<DemuxEvent>) {
        let section = match section_bytes(payload, pusi) {
            Some(s) => s,
            None => return,
        };
        if section.first() != Some(&0x02) || section.len() < 17 {
            return;
        }
        let section_length = (((section[1] as usize) & 0x0F) << 8) | section[2] as usize;
        let end = (3 + section_length).min(section.len()).saturating_sub(4);

        let program_info_len = (((section[10] as usize) & 0x0F) << 8) | section[11] as usize;
        let mut pos = 12 + program_info_len;

        while pos + 5 <= end {
            let stream_type = section[pos];
            let pid = ((section[pos + 1] as u16 & 0x1F) << 8) | section[pos + 2] as u16;
            let es_info_len = (((section[pos + 3] as usize) & 0x0F) << 8) | section[pos + 4] as usize;
            pos += 5 + es_info_len;

            if self.streams.insert(pid, stream_type).is_none() {
                tracing::debug!(pid, stream_type, "elementary stream found");
                events.push(DemuxEvent::StreamFound { pid, stream_type });
            }
        }
    }

    fn accumulate_pes(
        &mut self,
        pid: u16,
        payload: &[u8],
        pusi: bool,
        events: &mut Vec<DemuxEvent>,
    ) {
        let mut finished: Option<Vec<u8>> = None;
        {
            let assembly = self.assemblies.entry(pid).or_default();
            if pusi {
                // A new PES starts; the previous one is complete.
                if assembly.started && !assembly.buf.is_empty() {
                    finished = Some(std::mem::take(&mut assembly.buf));
                }
                assembly.started = true;
                assembly.buf.clear();
            }
            if assembly.started {
                assembly.buf.extend_from_slice(payload);
            }
        }

        if let Some(finished) = finished {
            if let Some((pts, data)) = parse_pes(&finished) {
                self.stats.pes_packets += 1;
                events.push(DemuxEvent::Pes { pid, pts, data });
            } else {
                self.stats.packets_dropped += 1;
            }
        }
    }

    /// Flush any partially assembled PES payloads (end of stream).
    pub fn flush(&mut self) -> Vec<DemuxEvent> {
        let mut finished: Vec<(u16, Vec<u8>)> = Vec::new();
        for (&pid, assembly) in self.assemblies.iter_mut() {
            if assembly.started && !assembly.buf.is_empty() {
                finished.push((pid, std::mem::take(&mut assembly.buf)));
                assembly.started = false;
            }
        }

        let mut events = Vec::new();
        for (pid, pes) in finished {
            if let Some((pts, data)) = parse_pes(&pes) {
                self.stats.pes_packets += 1;
                events.push(DemuxEvent::Pes { pid, pts, data });
            }
        }
        events
    }
}

impl Default for TsDemux {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip the pointer field from a PSI payload.
fn section_bytes(payload: &[u8], pusi: bool) -> Option<&[u8]> {
    if !pusi {
        // Multi-packet sections are not produced by the matching muxer.
        return None;
    }
    let pointer = *payload.first()? as usize;
    payload.get(1 + pointer..)
}

/// Parse a complete PES packet into (pts, elementary payload).
fn parse_pes(pes: &[u8]) -> Option<(Option<ClockTime>, Vec<u8>)> {
    if pes.len() < 9 || pes[0] != 0x00 || pes[1] != 0x00 || pes[2] != 0x01 {
        return None;
    }
    let flags = pes[7];
    let header_data_len = pes[8] as usize;
    let payload_start = 9 + header_data_len;
    if payload_start > pes.len() {
        return None;
    }

    let pts = if flags & 0x80 != 0 && header_data_len >= 5 {
        let p = &pes[9..14];
        let ticks = (((p[0] as u64 >> 1) & 0x07) << 30)
            | ((p[1] as u64) << 22)
            | (((p[2] as u64 >> 1) & 0x7F) << 15)
            | ((p[3] as u64) << 7)
            | ((p[4] as u64 >> 1) & 0x7F);
        Some(ClockTime::from_90khz(ticks))
    } else {
        None
    };

    Some((pts, pes[payload_start..].to_vec()))
}

/// Map an ISO stream type to pad caps.
fn caps_for_stream_type(stream_type: u8) -> Caps {
    match stream_type {
        STREAM_TYPE_H264 => Caps::h264(),
        STREAM_TYPE_KLV | STREAM_TYPE_PRIVATE => Caps::klv(),
        _ => Caps::new(crate::format::MediaFormat::Bytes),
    }
}

// ============================================================================
// Demuxer element
// ============================================================================

/// Pipeline demuxer element wrapping [`TsDemux`].
///
/// Output pads appear as elementary streams are discovered in the PMT; each
/// discovery invokes the registered pad-added callback with caps derived
/// from the PMT stream type.
pub struct TsDemuxElement {
    name: String,
    demux: TsDemux,
    /// ES PID -> assigned output pad.
    pads: HashMap<u16, PadId>,
    next_pad: u32,
    pad_added: Option<PadAddedCallback>,
    sequence: u64,
}

impl TsDemuxElement {
    /// Create a new demuxer element.
    pub fn new() -> Self {
        Self {
            name: "tsdemux".to_string(),
            demux: TsDemux::new(),
            pads: HashMap::new(),
            next_pad: 0,
            pad_added: None,
            sequence: 0,
        }
    }

    /// Set a custom name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Get parser statistics.
    pub fn stats(&self) -> &TsDemuxStats {
        self.demux.stats()
    }

    fn handle_events(&mut self, events: Vec<DemuxEvent>, routed: &mut RoutedOutput) {
        for event in events {
            match event {
                DemuxEvent::StreamFound { pid, stream_type } => {
                    let pad = PadId::new(self.next_pad);
                    self.next_pad += 1;
                    self.pads.insert(pid, pad);
                    if let Some(callback) = self.pad_added.as_mut() {
                        callback(pad, caps_for_stream_type(stream_type));
                    }
                }
                DemuxEvent::Pes { pid, pts, data } => {
                    if let Some(&pad) = self.pads.get(&pid) {
                        let seq = self.sequence;
                        self.sequence += 1;
                        let mut metadata = Metadata::from_sequence(seq)
                            .with_stream_id(pid as u64);
                        metadata.pts = pts.unwrap_or(ClockTime::NONE);
                        routed.push(pad, Buffer::from_vec(data, metadata));
                    }
                }
            }
        }
    }
}

impl Default for TsDemuxElement {
    fn default() -> Self {
        Self::new()
    }
}

impl Demuxer for TsDemuxElement {
    fn demux(&mut self, buffer: Buffer) -> Result<RoutedOutput> {
        let events = self.demux.feed(buffer.as_bytes());
        let mut routed = RoutedOutput::new();
        self.handle_events(events, &mut routed);
        Ok(routed)
    }

    fn flush(&mut self) -> Result<RoutedOutput> {
        let events = self.demux.flush();
        let mut routed = RoutedOutput::new();
        self.handle_events(events, &mut routed);
        Ok(routed)
    }

    fn outputs(&self) -> Vec<(PadId, Caps)> {
        self.pads
            .iter()
            .map(|(pid, &pad)| {
                let stream_type = self.demux.streams().get(pid).copied().unwrap_or(0);
                (pad, caps_for_stream_type(stream_type))
            })
            .collect()
    }

    fn on_pad_added(&mut self, callback: PadAddedCallback) {
        self.pad_added = Some(callback);
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn input_caps(&self) -> Caps {
        Caps::mpegts()
    }
}
