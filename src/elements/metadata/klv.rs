//! KLV (Key-Length-Value) encoding for MISB ST 0601 metadata.
//!
//! Produces and parses the KLV local-set packets carried on the metadata
//! side channel of a transport stream:
//!
//! - 16-byte universal label (MISB ST 0601 UAS Datalink Local Set)
//! - BER-encoded lengths
//! - tag/length/value local set entries
//! - trailing running 16-bit checksum (tag 1)

use crate::error::{Error, Result};
use std::collections::BTreeMap;

// ============================================================================
// Universal Labels
// ============================================================================

/// Universal Label Set identifiers for KLV data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Uls {
    /// MISB ST 0601 - UAS Datalink Local Set.
    MisbSt0601,
    /// Custom ULS (16 bytes).
    Custom([u8; 16]),
}

impl Uls {
    /// Get the 16-byte Universal Label for this ULS.
    pub fn as_bytes(&self) -> &[u8; 16] {
        match self {
            // MISB ST 0601 UAS Datalink Local Set
            Uls::MisbSt0601 => &[
                0x06, 0x0E, 0x2B, 0x34, // SMPTE designator
                0x02, 0x0B, 0x01, 0x01, // Registry category + designation
                0x0E, 0x01, 0x03, 0x01, // Organization (MISB)
                0x01, 0x00, 0x00, 0x00, // ST 0601 Local Set
            ],
            Uls::Custom(bytes) => bytes,
        }
    }
}

// ============================================================================
// KLV Tags (MISB ST 0601 subset)
// ============================================================================

/// Local set tags from MISB ST 0601 used by the telemetry source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KlvTag {
    /// Checksum (tag 1) - appended automatically.
    Checksum,
    /// Unix timestamp (tag 2) - microseconds since epoch.
    UnixTimeStamp,
    /// Mission ID (tag 3).
    MissionId,
    /// Platform heading angle (tag 5).
    PlatformHeadingAngle,
    /// Platform pitch angle (tag 6).
    PlatformPitchAngle,
    /// Platform roll angle (tag 7).
    PlatformRollAngle,
    /// Sensor latitude (tag 13).
    SensorLatitude,
    /// Sensor longitude (tag 14).
    SensorLongitude,
    /// Sensor true altitude (tag 15).
    SensorTrueAltitude,
    /// UAS local set version (tag 65).
    UasLsVersion,
    /// Any other tag.
    Custom(u8),
}

impl From<KlvTag> for u8 {
    fn from(tag: KlvTag) -> u8 {
        match tag {
            KlvTag::Checksum => 1,
            KlvTag::UnixTimeStamp => 2,
            KlvTag::MissionId => 3,
            KlvTag::PlatformHeadingAngle => 5,
            KlvTag::PlatformPitchAngle => 6,
            KlvTag::PlatformRollAngle => 7,
            KlvTag::SensorLatitude => 13,
            KlvTag::SensorLongitude => 14,
            KlvTag::SensorTrueAltitude => 15,
            KlvTag::UasLsVersion => 65,
            KlvTag::Custom(v) => v,
        }
    }
}

impl From<u8> for KlvTag {
    fn from(v: u8) -> Self {
        match v {
            1 => KlvTag::Checksum,
            2 => KlvTag::UnixTimeStamp,
            3 => KlvTag::MissionId,
            5 => KlvTag::PlatformHeadingAngle,
            6 => KlvTag::PlatformPitchAngle,
            7 => KlvTag::PlatformRollAngle,
            13 => KlvTag::SensorLatitude,
            14 => KlvTag::SensorLongitude,
            15 => KlvTag::SensorTrueAltitude,
            65 => KlvTag::UasLsVersion,
            v => KlvTag::Custom(v),
        }
    }
}

// ============================================================================
// BER Length Encoding
// ============================================================================

/// Encode a length using BER (Basic Encoding Rules).
fn encode_ber_length(length: usize) -> Vec<u8> {
    if length < 128 {
        vec![length as u8]
    } else if length < 256 {
        vec![0x81, length as u8]
    } else if length < 65536 {
        vec![0x82, (length >> 8) as u8, (length & 0xFF) as u8]
    } else {
        vec![
            0x84,
            (length >> 24) as u8,
            (length >> 16) as u8,
            (length >> 8) as u8,
            (length & 0xFF) as u8,
        ]
    }
}

/// Decode a BER-encoded length, returning (length, bytes_consumed).
pub fn decode_ber_length(data: &[u8]) -> Option<(usize, usize)> {
    let first = *data.first()?;
    if first < 128 {
        Some((first as usize, 1))
    } else {
        let num_bytes = (first & 0x7F) as usize;
        if num_bytes == 0 || num_bytes > 4 || data.len() < 1 + num_bytes {
            return None;
        }
        let mut length = 0usize;
        for &byte in &data[1..1 + num_bytes] {
            length = (length << 8) | byte as usize;
        }
        Some((length, 1 + num_bytes))
    }
}

// ============================================================================
// Checksum
// ============================================================================

/// MISB running 16-bit checksum over a packet prefix.
fn calculate_checksum(data: &[u8]) -> u16 {
    let mut sum: u16 = 0;
    for (i, &byte) in data.iter().enumerate() {
        sum = sum.wrapping_add((byte as u16) << (8 * ((i + 1) % 2)));
    }
    sum
}

// ============================================================================
// Encoder
// ============================================================================

/// KLV encoder for MISB ST 0601 local sets.
#[derive(Debug, Default)]
pub struct KlvEncoder {
    /// Tags and their values; BTreeMap for deterministic ordering.
    tags: BTreeMap<u8, Vec<u8>>,
}

impl KlvEncoder {
    /// Create a new empty KLV encoder.
    pub fn new() -> Self {
        Self {
            tags: BTreeMap::new(),
        }
    }

    /// Add a tag with raw bytes value.
    pub fn add_tag(&mut self, tag: KlvTag, value: Vec<u8>) -> &mut Self {
        self.tags.insert(tag.into(), value);
        self
    }

    /// Add a tag with a u8 value.
    pub fn add_u8(&mut self, tag: KlvTag, value: u8) -> &mut Self {
        self.add_tag(tag, vec![value])
    }

    /// Add a tag with a u64 value (big-endian).
    pub fn add_u64(&mut self, tag: KlvTag, value: u64) -> &mut Self {
        self.add_tag(tag, value.to_be_bytes().to_vec())
    }

    /// Add a tag with a string value.
    pub fn add_string(&mut self, tag: KlvTag, value: &str) -> &mut Self {
        self.add_tag(tag, value.as_bytes().to_vec())
    }

    /// Add a Unix timestamp (microseconds since epoch).
    pub fn add_timestamp(&mut self, micros: u64) -> &mut Self {
        self.add_u64(KlvTag::UnixTimeStamp, micros)
    }

    /// Add sensor latitude (degrees, clamped to [-90, 90], 4-byte scaled).
    pub fn add_sensor_latitude(&mut self, degrees: f64) -> &mut Self {
        let encoded = encode_latitude(degrees);
        self.add_tag(KlvTag::SensorLatitude, encoded.to_be_bytes().to_vec())
    }

    /// Add sensor longitude (degrees, clamped to [-180, 180], 4-byte scaled).
    pub fn add_sensor_longitude(&mut self, degrees: f64) -> &mut Self {
        let encoded = encode_longitude(degrees);
        self.add_tag(KlvTag::SensorLongitude, encoded.to_be_bytes().to_vec())
    }

    /// Add sensor altitude (meters, clamped to [-900, 19000], 2-byte scaled).
    pub fn add_sensor_altitude(&mut self, meters: f64) -> &mut Self {
        let encoded = encode_altitude(meters);
        self.add_tag(KlvTag::SensorTrueAltitude, encoded.to_be_bytes().to_vec())
    }

    /// Add platform heading (degrees, clamped to [0, 360], 2-byte scaled).
    pub fn add_platform_heading(&mut self, degrees: f64) -> &mut Self {
        let encoded = encode_heading(degrees);
        self.add_tag(
            KlvTag::PlatformHeadingAngle,
            encoded.to_be_bytes().to_vec(),
        )
    }

    /// Get the number of tags.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Encode the local set entries (tags only, without ULS key or checksum).
    pub fn encode_local_set(&self) -> Vec<u8> {
        let mut local_set = Vec::new();
        for (&tag, value) in &self.tags {
            if tag == u8::from(KlvTag::Checksum) {
                continue;
            }
            local_set.push(tag);
            local_set.extend(encode_ber_length(value.len()));
            local_set.extend(value);
        }
        local_set
    }

    /// Encode as a complete KLV packet with the specified ULS.
    ///
    /// Layout: 16-byte ULS key, BER length, local set, checksum entry. The
    /// checksum covers the whole packet up to the checksum value itself.
    pub fn encode_with_uls(&self, uls: Uls) -> Vec<u8> {
        let mut packet = Vec::new();
        packet.extend_from_slice(uls.as_bytes());

        let local_set = self.encode_local_set();
        // local set + checksum tag (1) + checksum length (1) + checksum (2)
        let total_length = local_set.len() + 4;
        packet.extend(encode_ber_length(total_length));
        packet.extend(local_set);

        packet.push(u8::from(KlvTag::Checksum));
        packet.push(2);
        let checksum = calculate_checksum(&packet);
        packet.extend(checksum.to_be_bytes());

        packet
    }

    /// Encode as a MISB ST 0601 packet.
    pub fn encode_st0601(&self) -> Vec<u8> {
        self.encode_with_uls(Uls::MisbSt0601)
    }
}

// ============================================================================
// Decoder
// ============================================================================

/// Why a KLV packet failed to parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KlvDecodeError {
    /// Shorter than a ULS key + length.
    Truncated,
    /// The 16-byte key is not a known ULS.
    UnknownKey,
    /// BER length invalid or exceeding the packet.
    BadLength,
    /// The trailing checksum did not match.
    ChecksumMismatch,
}

impl std::fmt::Display for KlvDecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truncated => write!(f, "truncated KLV packet"),
            Self::UnknownKey => write!(f, "unknown universal label"),
            Self::BadLength => write!(f, "invalid BER length"),
            Self::ChecksumMismatch => write!(f, "checksum mismatch"),
        }
    }
}

/// A parsed KLV local set.
#[derive(Debug)]
pub struct KlvPacket {
    /// The universal label the packet carried.
    pub uls: Uls,
    /// Decoded (tag, value) entries, checksum excluded.
    pub entries: Vec<(KlvTag, Vec<u8>)>,
}

impl KlvPacket {
    /// Parse a KLV packet, verifying the trailing checksum.
    pub fn parse(data: &[u8]) -> std::result::Result<Self, KlvDecodeError> {
        if data.len() < 17 {
            return Err(KlvDecodeError::Truncated);
        }

        let mut key = [0u8; 16];
        key.copy_from_slice(&data[..16]);
        let uls = if &key == Uls::MisbSt0601.as_bytes() {
            Uls::MisbSt0601
        } else if key[..4] == [0x06, 0x0E, 0x2B, 0x34] {
            Uls::Custom(key)
        } else {
            return Err(KlvDecodeError::UnknownKey);
        };

        let (value_len, len_bytes) =
            decode_ber_length(&data[16..]).ok_or(KlvDecodeError::BadLength)?;
        let value_start = 16 + len_bytes;
        let value_end = value_start + value_len;
        if value_end > data.len() {
            return Err(KlvDecodeError::BadLength);
        }

        let mut entries = Vec::new();
        let mut pos = value_start;
        while pos < value_end {
            let tag = data[pos];
            pos += 1;
            let (len, consumed) =
                decode_ber_length(&data[pos..value_end]).ok_or(KlvDecodeError::BadLength)?;
            pos += consumed;
            if pos + len > value_end {
                return Err(KlvDecodeError::BadLength);
            }
            let value = data[pos..pos + len].to_vec();
            pos += len;

            if KlvTag::from(tag) == KlvTag::Checksum {
                if value.len() != 2 {
                    return Err(KlvDecodeError::BadLength);
                }
                let stored = u16::from_be_bytes([value[0], value[1]]);
                // Checksum covers everything before its own value bytes.
                let computed = calculate_checksum(&data[..pos - 2]);
                if stored != computed {
                    return Err(KlvDecodeError::ChecksumMismatch);
                }
            } else {
                entries.push((KlvTag::from(tag), value));
            }
        }

        Ok(Self { uls, entries })
    }

    /// Look up the first entry with the given tag.
    pub fn get(&self, tag: KlvTag) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, v)| v.as_slice())
    }

    /// Get the Unix timestamp entry, if present.
    pub fn timestamp_micros(&self) -> Option<u64> {
        let value = self.get(KlvTag::UnixTimeStamp)?;
        let bytes: [u8; 8] = value.try_into().ok()?;
        Some(u64::from_be_bytes(bytes))
    }
}

// ============================================================================
// Scaled value encoding
// ============================================================================

fn encode_latitude(degrees: f64) -> i32 {
    let clamped = degrees.clamp(-90.0, 90.0);
    ((clamped / 90.0) * (i32::MAX as f64)).round() as i32
}

fn encode_longitude(degrees: f64) -> i32 {
    let clamped = degrees.clamp(-180.0, 180.0);
    ((clamped / 180.0) * (i32::MAX as f64)).round() as i32
}

fn encode_altitude(meters: f64) -> u16 {
    let clamped = meters.clamp(-900.0, 19000.0);
    (((clamped + 900.0) / 19900.0) * (u16::MAX as f64)).round() as u16
}

fn encode_heading(degrees: f64) -> u16 {
    let clamped = degrees.clamp(0.0, 360.0);
    ((clamped / 360.0) * (u16::MAX as f64)).round() as u16
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for typical telemetry local sets.
///
/// # Example
///
/// ```rust
/// use weft::elements::metadata::TelemetryBuilder;
///
/// let klv = TelemetryBuilder::new()
///     .version(17)
///     .timestamp(1_700_000_000_000_000)
///     .mission_id("DEMO_MISSION_001")
///     .sensor_position(37.2350, -115.8111, 1500.0)
///     .platform_heading(180.0)
///     .build_st0601();
/// assert_eq!(&klv[..4], &[0x06, 0x0E, 0x2B, 0x34]);
/// ```
#[derive(Debug, Default)]
pub struct TelemetryBuilder {
    encoder: KlvEncoder,
}

impl TelemetryBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            encoder: KlvEncoder::new(),
        }
    }

    /// Add a Unix timestamp in microseconds.
    pub fn timestamp(mut self, micros: u64) -> Self {
        self.encoder.add_timestamp(micros);
        self
    }

    /// Add the current wall-clock timestamp.
    pub fn timestamp_now(self) -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);
        self.timestamp(micros)
    }

    /// Add a mission ID.
    pub fn mission_id(mut self, id: &str) -> Self {
        self.encoder.add_string(KlvTag::MissionId, id);
        self
    }

    /// Add sensor position (lat, lon in degrees; alt in meters).
    pub fn sensor_position(mut self, lat: f64, lon: f64, alt: f64) -> Self {
        self.encoder.add_sensor_latitude(lat);
        self.encoder.add_sensor_longitude(lon);
        self.encoder.add_sensor_altitude(alt);
        self
    }

    /// Add platform heading (degrees).
    pub fn platform_heading(mut self, degrees: f64) -> Self {
        self.encoder.add_platform_heading(degrees);
        self
    }

    /// Add the UAS local set version.
    pub fn version(mut self, version: u8) -> Self {
        self.encoder.add_u8(KlvTag::UasLsVersion, version);
        self
    }

    /// Add a raw tag.
    pub fn raw_tag(mut self, tag: KlvTag, value: Vec<u8>) -> Self {
        self.encoder.add_tag(tag, value);
        self
    }

    /// Build as MISB ST 0601 encoded bytes.
    pub fn build_st0601(self) -> Vec<u8> {
        self.encoder.encode_st0601()
    }
}

/// Convenience: parse bytes as a ST 0601 packet, mapping to crate errors.
pub fn parse_st0601(data: &[u8]) -> Result<KlvPacket> {
    KlvPacket::parse(data).map_err(|e| Error::Element(format!("KLV parse: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ber_length_encoding() {
        assert_eq!(encode_ber_length(0), vec![0x00]);
        assert_eq!(encode_ber_length(127), vec![0x7F]);
        assert_eq!(encode_ber_length(128), vec![0x81, 0x80]);
        assert_eq!(encode_ber_length(255), vec![0x81, 0xFF]);
        assert_eq!(encode_ber_length(256), vec![0x82, 0x01, 0x00]);
        assert_eq!(encode_ber_length(65535), vec![0x82, 0xFF, 0xFF]);
    }

    #[test]
    fn test_ber_length_decoding() {
        assert_eq!(decode_ber_length(&[0x00]), Some((0, 1)));
        assert_eq!(decode_ber_length(&[0x7F]), Some((127, 1)));
        assert_eq!(decode_ber_length(&[0x81, 0x80]), Some((128, 2)));
        assert_eq!(decode_ber_length(&[0x82, 0x01, 0x00]), Some((256, 3)));
        assert_eq!(decode_ber_length(&[]), None);
        assert_eq!(decode_ber_length(&[0x82, 0x01]), None);
    }

    #[test]
    fn test_encode_starts_with_uls() {
        let mut encoder = KlvEncoder::new();
        encoder
            .add_timestamp(1234567890_000_000)
            .add_sensor_latitude(37.2350)
            .add_sensor_longitude(-115.8111);

        let packet = encoder.encode_st0601();
        assert_eq!(&packet[0..4], &[0x06, 0x0E, 0x2B, 0x34]);
        assert!(packet.len() > 20);
    }

    #[test]
    fn test_encode_parse_round_trip() {
        let klv = TelemetryBuilder::new()
            .version(17)
            .timestamp(1_700_000_000_000_000)
            .mission_id("TEST_MISSION")
            .sensor_position(37.2350, -115.8111, 1500.0)
            .platform_heading(180.0)
            .build_st0601();

        let packet = KlvPacket::parse(&klv).unwrap();
        assert_eq!(packet.uls, Uls::MisbSt0601);
        assert_eq!(packet.timestamp_micros(), Some(1_700_000_000_000_000));
        assert_eq!(packet.get(KlvTag::MissionId), Some(b"TEST_MISSION".as_ref()));
        assert_eq!(packet.get(KlvTag::UasLsVersion), Some([17u8].as_ref()));
    }

    #[test]
    fn test_checksum_mismatch_detected() {
        let mut klv = TelemetryBuilder::new()
            .timestamp(1_700_000_000_000_000)
            .build_st0601();
        // Corrupt a payload byte
        let idx = klv.len() - 5;
        klv[idx] ^= 0xFF;

        assert_eq!(
            KlvPacket::parse(&klv).unwrap_err(),
            KlvDecodeError::ChecksumMismatch
        );
    }

    #[test]
    fn test_truncated_packet() {
        assert_eq!(
            KlvPacket::parse(&[0x06, 0x0E]).unwrap_err(),
            KlvDecodeError::Truncated
        );
    }

    #[test]
    fn test_unknown_key() {
        let mut data = vec![0u8; 20];
        data[0] = 0xFF;
        assert_eq!(
            KlvPacket::parse(&data).unwrap_err(),
            KlvDecodeError::UnknownKey
        );
    }

    #[test]
    fn test_latitude_clamping() {
        assert_eq!(encode_latitude(0.0), 0);
        assert!(encode_latitude(45.0) > 0);
        assert!(encode_latitude(-45.0) < 0);
        assert_eq!(encode_latitude(100.0), encode_latitude(90.0));
    }

    #[test]
    fn test_altitude_range() {
        assert_eq!(encode_altitude(-900.0), 0);
        assert_eq!(encode_altitude(19000.0), u16::MAX);
        let mid = encode_altitude(0.0);
        assert!(mid > 0 && mid < u16::MAX);
    }

    #[test]
    fn test_heading_range() {
        assert_eq!(encode_heading(0.0), 0);
        assert_eq!(encode_heading(360.0), u16::MAX);
    }

    #[test]
    fn test_tag_round_trip() {
        assert_eq!(u8::from(KlvTag::SensorLatitude), 13);
        assert_eq!(KlvTag::from(13), KlvTag::SensorLatitude);
        assert_eq!(KlvTag::from(100), KlvTag::Custom(100));
    }
}
