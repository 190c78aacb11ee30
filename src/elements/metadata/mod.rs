//! Metadata side-channel elements.

mod klv;
mod telemetry;

pub use klv::{
    decode_ber_length, parse_st0601, KlvDecodeError, KlvEncoder, KlvPacket, KlvTag,
    TelemetryBuilder, Uls,
};
pub use telemetry::{TelemetryPayload, TelemetrySrc};
