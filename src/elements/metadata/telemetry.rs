//! Telemetry side-channel source.
//!
//! [`TelemetrySrc`] is a pull-driven producer for the metadata branch of a
//! pipeline. Each call to `produce` is paced to a target frame interval with
//! a bounded sleep, asks a payload generator for the next local set, stamps
//! the buffer with the pipeline clock's running time, and increments a
//! strictly-increasing sequence counter. A generator that has nothing ready
//! within its slot signals backpressure instead of blocking the pipeline.

use crate::buffer::Buffer;
use crate::clock::{ClockTime, PipelineClock};
use crate::element::{Produced, Source};
use crate::error::Result;
use crate::format::Caps;
use crate::metadata::Metadata;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::klv::TelemetryBuilder;

/// Generator invoked once per tick. `None` means no data is ready for this
/// tick, which surfaces as backpressure.
pub type TelemetryPayload = Box<dyn FnMut(u64) -> Option<Vec<u8>> + Send>;

/// Pull-driven, interval-paced metadata source.
///
/// # Example
///
/// ```rust,ignore
/// use std::time::Duration;
/// use weft::elements::metadata::TelemetrySrc;
///
/// // 5 packets per second of MISB ST 0601 telemetry
/// let src = TelemetrySrc::klv(Duration::from_millis(200), "MISSION_01")
///     .with_clock(pipeline.clock());
/// ```
pub struct TelemetrySrc {
    name: String,
    interval: Duration,
    payload: TelemetryPayload,
    clock: Option<Arc<PipelineClock>>,
    /// Stop after this many packets; `None` runs until the payload ends it.
    limit: Option<u64>,
    sequence: u64,
    last_pts: ClockTime,
    next_tick: Option<Instant>,
}

impl TelemetrySrc {
    /// Create a source with a custom payload generator.
    pub fn new(interval: Duration, payload: TelemetryPayload) -> Self {
        Self {
            name: "telemetrysrc".to_string(),
            interval: interval.max(Duration::from_millis(1)),
            payload,
            clock: None,
            limit: None,
            sequence: 0,
            last_pts: ClockTime::NONE,
            next_tick: None,
        }
    }

    /// Create a source producing MISB ST 0601 packets for a mission.
    pub fn klv(interval: Duration, mission_id: &str) -> Self {
        let mission = mission_id.to_string();
        Self::new(
            interval,
            Box::new(move |seq| {
                Some(
                    TelemetryBuilder::new()
                        .version(17)
                        .timestamp_now()
                        .mission_id(&mission)
                        .sensor_position(
                            37.2350 + (seq as f64 * 0.0001),
                            -115.8111,
                            1500.0,
                        )
                        .platform_heading((seq % 360) as f64)
                        .build_st0601(),
                )
            }),
        )
    }

    /// Set a custom name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Stamp timestamps from a pipeline clock.
    pub fn with_clock(mut self, clock: Arc<PipelineClock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Stop after `count` packets (EOS).
    pub fn with_limit(mut self, count: u64) -> Self {
        self.limit = Some(count);
        self
    }

    /// The next sequence number to be assigned.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Wait out the remainder of the current tick.
    ///
    /// The sleep is bounded by the configured interval; this is the
    /// rate-limiting device, not a scheduling primitive.
    fn pace(&mut self) {
        let now = Instant::now();
        let tick = match self.next_tick {
            Some(t) => t,
            None => now,
        };
        if tick > now {
            std::thread::sleep((tick - now).min(self.interval));
        }
        // Next deadline is one interval after the scheduled tick, or after
        // now if we fell behind by more than an interval.
        let mut next = tick + self.interval;
        if next + self.interval < now {
            next = now + self.interval;
        }
        self.next_tick = Some(next);
    }

    fn stamp(&mut self) -> ClockTime {
        let mut pts = match &self.clock {
            Some(clock) => clock.running_time(),
            None => ClockTime::NONE,
        };
        if pts.is_none() {
            // No started clock; derive from the tick count.
            pts = ClockTime::from_nanos(self.sequence * self.interval.as_nanos() as u64);
        }
        // Timestamps never regress across successful pushes.
        if self.last_pts.is_some() && pts < self.last_pts {
            pts = self.last_pts;
        }
        self.last_pts = pts;
        pts
    }
}

impl Source for TelemetrySrc {
    fn produce(&mut self) -> Result<Produced> {
        if let Some(limit) = self.limit {
            if self.sequence >= limit {
                return Ok(Produced::Eos);
            }
        }

        self.pace();

        let data = match (self.payload)(self.sequence) {
            Some(data) => data,
            // Nothing ready within this tick's deadline.
            None => return Ok(Produced::WouldBlock),
        };

        let pts = self.stamp();
        let metadata = Metadata::from_sequence(self.sequence)
            .with_pts(pts)
            .with_duration(ClockTime::from_nanos(self.interval.as_nanos() as u64))
            .with_sparse();

        // Sequence advances only on a successful push.
        self.sequence += 1;

        tracing::trace!(
            seq = self.sequence - 1,
            pts = %pts,
            bytes = data.len(),
            "telemetry packet"
        );

        Ok(Produced::Buffer(Buffer::from_vec(data, metadata)))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn output_caps(&self) -> Caps {
        Caps::klv()
    }
}
