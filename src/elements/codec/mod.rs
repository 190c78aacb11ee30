//! Codec-adjacent elements (bitstream alignment, no decoding).

mod h264;

pub use h264::{H264Parse, nal_type, split_nal_units, NAL_IDR, NAL_PPS, NAL_SLICE, NAL_SPS};
