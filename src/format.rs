//! Media format and capabilities types.
//!
//! Capability descriptors (caps) describe what kind of data flows on a pad.
//! They are exchanged at link time, never wire-serialized. Links are only
//! established between pads whose caps intersect; the dynamic pad router
//! matches discovered pads by [`FormatFamily`].

use smallvec::SmallVec;

// ============================================================================
// Media Formats
// ============================================================================

/// Media format - describes buffer contents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MediaFormat {
    /// Encoded video (compressed elementary stream).
    Video(VideoCodec),
    /// RTP packet stream.
    Rtp(RtpFormat),
    /// MPEG transport stream packets.
    MpegTs,
    /// KLV metadata local sets.
    Klv(KlvFormat),
    /// Raw bytes (no format constraints).
    Bytes,
}

impl MediaFormat {
    /// Check compatibility (can data flow between these formats?).
    ///
    /// Two formats are compatible if either is `Bytes` (accepts anything) or
    /// they are the same variant with matching parameters.
    pub fn compatible(&self, other: &MediaFormat) -> bool {
        match (self, other) {
            (Self::Bytes, _) | (_, Self::Bytes) => true,
            (Self::Video(a), Self::Video(b)) => a == b,
            (Self::Rtp(a), Self::Rtp(b)) => a.payload_type == b.payload_type,
            (Self::MpegTs, Self::MpegTs) => true,
            (Self::Klv(_), Self::Klv(_)) => true,
            _ => false,
        }
    }

    /// Get the coarse family of this format, used for dynamic pad routing.
    pub fn family(&self) -> FormatFamily {
        match self {
            Self::Video(_) => FormatFamily::Video,
            Self::Rtp(_) => FormatFamily::Rtp,
            Self::MpegTs => FormatFamily::Container,
            Self::Klv(_) => FormatFamily::Metadata,
            Self::Bytes => FormatFamily::Bytes,
        }
    }
}

/// Coarse format family used by the dynamic pad router.
///
/// Plays the role of a caps-name prefix match ("video/..." vs "meta/...")
/// without string comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FormatFamily {
    /// Encoded or raw video.
    Video,
    /// RTP packet streams.
    Rtp,
    /// Container formats (MPEG-TS).
    Container,
    /// Metadata side channels (KLV).
    Metadata,
    /// Untyped bytes.
    Bytes,
}

/// Video codecs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum VideoCodec {
    /// H.264 / AVC.
    H264,
    /// H.265 / HEVC.
    H265,
}

/// KLV stream properties.
///
/// Mirrors the boolean flags a KLV metadata pad carries: the local sets are
/// already parsed into whole packets, the stream is sparse (buffers appear
/// at telemetry rate, not media rate) and live.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct KlvFormat {
    /// Payload is whole KLV local sets, not a raw byte stream.
    pub parsed: bool,
    /// Stream carries data only when telemetry changes.
    pub sparse: bool,
    /// Stream is produced live.
    pub live: bool,
}

impl KlvFormat {
    /// Parsed, sparse, live KLV - the standard side-channel configuration.
    pub const SIDE_CHANNEL: Self = Self {
        parsed: true,
        sparse: true,
        live: true,
    };
}

impl Default for KlvFormat {
    fn default() -> Self {
        Self::SIDE_CHANNEL
    }
}

/// Frame rate as numerator/denominator (8 bytes, Copy).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Framerate {
    /// Numerator (frames).
    pub num: u32,
    /// Denominator (time units).
    pub den: u32,
}

impl Framerate {
    /// Create a new framerate.
    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    /// 25 fps (PAL).
    pub const FPS_25: Self = Self::new(25, 1);
    /// 30 fps.
    pub const FPS_30: Self = Self::new(30, 1);

    /// Get frame duration in nanoseconds.
    #[inline]
    pub const fn frame_duration_ns(&self) -> u64 {
        if self.num == 0 {
            return 0;
        }
        (self.den as u64 * 1_000_000_000) / self.num as u64
    }
}

impl Default for Framerate {
    fn default() -> Self {
        Self::FPS_30
    }
}

// ============================================================================
// RTP Format
// ============================================================================

/// RTP stream format (8 bytes, Copy).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RtpFormat {
    /// RTP payload type (0-127).
    pub payload_type: u8,
    /// Clock rate in Hz.
    pub clock_rate: u32,
    /// What's inside the RTP payload.
    pub encoding: RtpEncoding,
}

impl RtpFormat {
    /// Create a new RTP format.
    pub const fn new(payload_type: u8, clock_rate: u32, encoding: RtpEncoding) -> Self {
        Self {
            payload_type,
            clock_rate,
            encoding,
        }
    }

    /// H.264 video over RTP (dynamic payload type 96, 90 kHz).
    pub const H264: Self = Self::new(96, 90_000, RtpEncoding::H264);
}

/// What's inside the RTP payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RtpEncoding {
    /// H.264 / AVC video.
    H264,
    /// H.265 / HEVC video.
    H265,
}

// ============================================================================
// Caps
// ============================================================================

/// Element capabilities: the set of formats a pad can handle.
///
/// Empty caps mean "any format". The first format is the preferred one.
///
/// # Example
///
/// ```rust
/// use weft::format::{Caps, MediaFormat, VideoCodec};
///
/// let any = Caps::any();
/// let h264 = Caps::new(MediaFormat::Video(VideoCodec::H264));
/// assert!(any.intersects(&h264));
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Caps(SmallVec<[MediaFormat; 2]>);

impl Caps {
    /// Create caps that accept any format.
    pub fn any() -> Self {
        Self(SmallVec::new())
    }

    /// Create caps with a single format.
    pub fn new(format: MediaFormat) -> Self {
        let mut v = SmallVec::new();
        v.push(format);
        Self(v)
    }

    /// Create caps with multiple acceptable formats (first is preferred).
    pub fn many(formats: impl IntoIterator<Item = MediaFormat>) -> Self {
        Self(formats.into_iter().collect())
    }

    /// Is this "any format"?
    #[inline]
    pub fn is_any(&self) -> bool {
        self.0.is_empty()
    }

    /// Is this a single fixed format?
    #[inline]
    pub fn is_fixed(&self) -> bool {
        self.0.len() == 1
    }

    /// Get the formats.
    #[inline]
    pub fn formats(&self) -> &[MediaFormat] {
        &self.0
    }

    /// Get the preferred format (first one).
    #[inline]
    pub fn preferred(&self) -> Option<&MediaFormat> {
        self.0.first()
    }

    /// Check if compatible with another caps.
    ///
    /// Two caps are compatible if there exists at least one format both can
    /// handle.
    pub fn intersects(&self, other: &Caps) -> bool {
        if self.is_any() || other.is_any() {
            return true;
        }
        self.0
            .iter()
            .any(|a| other.0.iter().any(|b| a.compatible(b)))
    }

    /// Find the first compatible format between two caps.
    ///
    /// Returns the format from `self` compatible with `other`. If either is
    /// "any", returns the other's preferred format.
    pub fn negotiate(&self, other: &Caps) -> Option<MediaFormat> {
        if self.is_any() {
            return other.preferred().copied();
        }
        if other.is_any() {
            return self.preferred().copied();
        }
        self.0
            .iter()
            .find(|a| other.0.iter().any(|b| a.compatible(b)))
            .copied()
    }

    /// Check if any format in these caps belongs to the given family.
    pub fn has_family(&self, family: FormatFamily) -> bool {
        self.0.iter().any(|f| f.family() == family)
    }

    /// Caps for an H.264 elementary stream.
    pub fn h264() -> Self {
        Self::new(MediaFormat::Video(VideoCodec::H264))
    }

    /// Caps for an MPEG transport stream.
    pub fn mpegts() -> Self {
        Self::new(MediaFormat::MpegTs)
    }

    /// Caps for a KLV metadata side channel.
    pub fn klv() -> Self {
        Self::new(MediaFormat::Klv(KlvFormat::SIDE_CHANNEL))
    }

    /// Caps for H.264 over RTP.
    pub fn rtp_h264() -> Self {
        Self::new(MediaFormat::Rtp(RtpFormat::H264))
    }
}

impl Default for Caps {
    fn default() -> Self {
        Self::any()
    }
}

impl std::fmt::Display for Caps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_any() {
            return write!(f, "ANY");
        }
        for (i, fmt) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{:?}", fmt)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caps_any_intersects_everything() {
        let any = Caps::any();
        assert!(any.intersects(&Caps::h264()));
        assert!(any.intersects(&Caps::klv()));
        assert!(any.intersects(&Caps::any()));
    }

    #[test]
    fn test_caps_incompatible() {
        assert!(!Caps::h264().intersects(&Caps::klv()));
        assert!(!Caps::mpegts().intersects(&Caps::rtp_h264()));
    }

    #[test]
    fn test_caps_negotiate() {
        let many = Caps::many([
            MediaFormat::Video(VideoCodec::H265),
            MediaFormat::Video(VideoCodec::H264),
        ]);
        assert_eq!(
            many.negotiate(&Caps::h264()),
            Some(MediaFormat::Video(VideoCodec::H264))
        );
        assert_eq!(Caps::any().negotiate(&Caps::klv()).map(|f| f.family()),
            Some(FormatFamily::Metadata));
        assert_eq!(Caps::h264().negotiate(&Caps::klv()), None);
    }

    #[test]
    fn test_bytes_compatible_with_all() {
        let bytes = Caps::new(MediaFormat::Bytes);
        assert!(bytes.intersects(&Caps::h264()));
        assert!(bytes.intersects(&Caps::mpegts()));
    }

    #[test]
    fn test_family_matching() {
        assert!(Caps::h264().has_family(FormatFamily::Video));
        assert!(Caps::klv().has_family(FormatFamily::Metadata));
        assert!(!Caps::h264().has_family(FormatFamily::Metadata));
    }

    #[test]
    fn test_rtp_format_h264() {
        let fmt = RtpFormat::H264;
        assert_eq!(fmt.payload_type, 96);
        assert_eq!(fmt.clock_rate, 90_000);
    }

    #[test]
    fn test_framerate_duration() {
        assert_eq!(Framerate::FPS_25.frame_duration_ns(), 40_000_000);
        assert_eq!(Framerate::new(0, 1).frame_duration_ns(), 0);
    }
}
