//! Synthetic H.264 test source.

use crate::buffer::Buffer;
use crate::clock::ClockTime;
use crate::element::{Produced, Source};
use crate::error::Result;
use crate::format::{Caps, Framerate};
use crate::metadata::Metadata;

/// IDR period in frames.
const KEYFRAME_INTERVAL: u64 = 30;

/// A source producing synthetic H.264 access units in Annex B format.
///
/// The payload is not decodable video; it is structurally valid Annex B
/// (start codes, SPS/PPS on the first frame, IDR/P NAL headers) so parsers,
/// payloaders and muxers downstream exercise their real code paths.
pub struct H264TestSrc {
    name: String,
    frames: u64,
    produced: u64,
    frame_duration: ClockTime,
    live: bool,
}

impl H264TestSrc {
    /// Create a source producing `frames` access units at `fps`.
    pub fn new(frames: u64, fps: u32) -> Self {
        let rate = Framerate::new(fps.max(1), 1);
        Self {
            name: "h264testsrc".to_string(),
            frames,
            produced: 0,
            frame_duration: ClockTime::from_nanos(rate.frame_duration_ns()),
            live: false,
        }
    }

    /// Set a custom name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Pace production to the frame rate (one frame interval per produce).
    pub fn live(mut self, live: bool) -> Self {
        self.live = live;
        self
    }

    fn make_frame(&self, frame_num: u64) -> Vec<u8> {
        let mut data = Vec::new();

        if frame_num == 0 {
            // SPS NAL unit (type 7)
            data.extend_from_slice(&[0x00, 0x00, 0x00, 0x01]);
            data.push(0x67);
            data.extend_from_slice(&[0x42, 0x00, 0x1E, 0x8D, 0x68, 0x10]);

            // PPS NAL unit (type 8)
            data.extend_from_slice(&[0x00, 0x00, 0x00, 0x01]);
            data.push(0x68);
            data.extend_from_slice(&[0xCE, 0x3C, 0x80]);
        }

        data.extend_from_slice(&[0x00, 0x00, 0x00, 0x01]);
        if frame_num % KEYFRAME_INTERVAL == 0 {
            // IDR slice (type 5)
            data.push(0x65);
        } else {
            // Non-IDR slice (type 1)
            data.push(0x41);
        }

        // Filler payload with per-frame length variation
        data.extend_from_slice(&vec![0xAB; 500 + (frame_num as usize % 200)]);

        data
    }
}

impl Source for H264TestSrc {
    fn produce(&mut self) -> Result<Produced> {
        if self.produced >= self.frames {
            return Ok(Produced::Eos);
        }

        if self.live {
            std::thread::sleep(std::time::Duration::from(self.frame_duration));
        }

        let frame_num = self.produced;
        let data = self.make_frame(frame_num);

        let pts = ClockTime::from_nanos(frame_num * self.frame_duration.nanos());
        let mut metadata = Metadata::from_sequence(frame_num)
            .with_pts(pts)
            .with_duration(self.frame_duration);
        if frame_num % KEYFRAME_INTERVAL == 0 {
            metadata = metadata.with_sync_point();
        }

        self.produced += 1;
        Ok(Produced::Buffer(Buffer::from_vec(data, metadata)))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn output_caps(&self) -> Caps {
        Caps::h264()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn next_buffer(src: &mut H264TestSrc) -> Buffer {
        match src.produce().unwrap() {
            Produced::Buffer(b) => b,
            other => panic!("expected buffer, got {:?}", other),
        }
    }

    #[test]
    fn test_first_frame_has_sps_pps_idr() {
        let mut src = H264TestSrc::new(10, 25);
        let frame = next_buffer(&mut src);
        let data = frame.as_bytes();

        assert_eq!(&data[..4], &[0x00, 0x00, 0x00, 0x01]);
        assert_eq!(data[4] & 0x1F, 7); // SPS
        assert!(frame.metadata().flags.sync_point);
        assert_eq!(frame.metadata().pts, ClockTime::ZERO);
    }

    #[test]
    fn test_non_keyframes() {
        let mut src = H264TestSrc::new(5, 25);
        let _ = next_buffer(&mut src);
        let second = next_buffer(&mut src);

        assert!(!second.metadata().flags.sync_point);
        assert_eq!(second.as_bytes()[4] & 0x1F, 1); // Non-IDR slice
        assert_eq!(second.metadata().pts, ClockTime::from_millis(40));
    }

    #[test]
    fn test_bounded_and_eos() {
        let mut src = H264TestSrc::new(2, 25);
        let _ = next_buffer(&mut src);
        let _ = next_buffer(&mut src);
        assert!(src.produce().unwrap().is_eos());
    }

    #[test]
    fn test_caps() {
        let src = H264TestSrc::new(1, 25);
        assert!(src.output_caps().intersects(&Caps::h264()));
    }
}
