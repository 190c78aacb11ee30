//! Element factory: constructs elements from a kind name and a config map.

use crate::element::{
    DemuxerAdapter, ElementAdapter, ElementDyn, MuxerAdapter, SinkAdapter, SourceAdapter,
};
use crate::elements::codec::H264Parse;
use crate::elements::demux::TsDemuxElement;
use crate::elements::flow::{Leaky, Queue};
use crate::elements::mux::{TsMuxConfig, TsMuxElement, TsMuxStreamType, TsMuxTrack};
use crate::elements::network::{UdpSink, UdpSrc};
use crate::elements::testing::{H264TestSrc, NullSink, TestSrc};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::time::Duration;

/// A typed property value for element configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// String value.
    String(String),
    /// Integer value.
    Int(i64),
    /// Floating-point value.
    Float(f64),
    /// Boolean value.
    Bool(bool),
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for PropertyValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Key/value configuration for an element, consumed by the factory.
#[derive(Debug, Clone, Default)]
pub struct ElementConfig {
    properties: HashMap<String, PropertyValue>,
}

impl ElementConfig {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a property.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Get a string property.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.properties.get(key) {
            Some(PropertyValue::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Get an integer property.
    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.properties.get(key) {
            Some(PropertyValue::Int(i)) => Some(*i),
            _ => None,
        }
    }

    /// Get a boolean property.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.properties.get(key) {
            Some(PropertyValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// Get an integer property narrowed to u16, failing on out-of-range.
    pub fn get_u16(&self, key: &str) -> Result<Option<u16>> {
        match self.get_int(key) {
            None => Ok(None),
            Some(v) => u16::try_from(v)
                .map(Some)
                .map_err(|_| Error::Config(format!("property '{}' out of range: {}", key, v))),
        }
    }
}

/// Constructor function registered for an element kind.
pub type ElementCtor = Box<dyn Fn(&ElementConfig) -> Result<Box<dyn ElementDyn>> + Send + Sync>;

/// Registry mapping element kind names to constructors.
///
/// Looking up an unknown kind, or constructing with an invalid config,
/// fails with [`Error::Creation`] and aborts pipeline construction.
pub struct ElementFactory {
    ctors: HashMap<String, ElementCtor>,
}

impl ElementFactory {
    /// Create an empty factory.
    pub fn empty() -> Self {
        Self {
            ctors: HashMap::new(),
        }
    }

    /// Create a factory with all built-in element kinds registered.
    pub fn new() -> Self {
        let mut factory = Self::empty();
        factory.register_builtins();
        factory
    }

    /// Register a constructor for an element kind.
    pub fn register(
        &mut self,
        kind: impl Into<String>,
        ctor: impl Fn(&ElementConfig) -> Result<Box<dyn ElementDyn>> + Send + Sync + 'static,
    ) {
        self.ctors.insert(kind.into(), Box::new(ctor));
    }

    /// Check whether a kind is registered.
    pub fn has(&self, kind: &str) -> bool {
        self.ctors.contains_key(kind)
    }

    /// Construct an element of the given kind.
    pub fn create(&self, kind: &str, config: &ElementConfig) -> Result<Box<dyn ElementDyn>> {
        let ctor = self
            .ctors
            .get(kind)
            .ok_or_else(|| Error::Creation(format!("no such element kind: '{}'", kind)))?;
        ctor(config)
    }

    fn register_builtins(&mut self) {
        self.register("testsrc", |config| {
            let count = config.get_int("num-buffers").unwrap_or(100) as u64;
            let size = config.get_int("size").unwrap_or(64) as usize;
            Ok(Box::new(SourceAdapter::new(TestSrc::new(count, size))))
        });

        self.register("h264testsrc", |config| {
            let frames = config.get_int("num-frames").unwrap_or(250) as u64;
            let fps = config.get_int("fps").unwrap_or(25) as u32;
            Ok(Box::new(SourceAdapter::new(H264TestSrc::new(frames, fps))))
        });

        self.register("queue", |config| {
            let max_buffers = config.get_int("max-size-buffers").unwrap_or(16) as usize;
            let leaky = match config.get_bool("leaky").unwrap_or(false) {
                true => Leaky::Downstream,
                false => Leaky::No,
            };
            Ok(Box::new(ElementAdapter::new(
                Queue::with_max_buffers(max_buffers).with_leaky(leaky),
            )))
        });

        self.register("h264parse", |_config| {
            Ok(Box::new(ElementAdapter::new(H264Parse::new())))
        });

        self.register("tsmux", |config| {
            let video_pid = config.get_u16("video-pid")?.unwrap_or(256);
            let klv_pid = config.get_u16("klv-pid")?.unwrap_or(257);
            let ts_config = TsMuxConfig::new()
                .add_track(TsMuxTrack::new(video_pid, TsMuxStreamType::H264).video())
                .add_track(TsMuxTrack::new(klv_pid, TsMuxStreamType::Klv).private_data());
            Ok(Box::new(MuxerAdapter::new(TsMuxElement::new(ts_config))))
        });

        self.register("tsdemux", |_config| {
            Ok(Box::new(DemuxerAdapter::new(TsDemuxElement::new())))
        });

        self.register("udpsink", |config| {
            let host = config.get_str("host").unwrap_or("127.0.0.1");
            let port = config
                .get_u16("port")?
                .ok_or_else(|| Error::Creation("udpsink requires a 'port' property".into()))?;
            let sink = UdpSink::connect((host, port))
                .map_err(|e| Error::Creation(format!("udpsink: {}", e)))?;
            Ok(Box::new(SinkAdapter::new(sink)))
        });

        self.register("udpsrc", |config| {
            let port = config
                .get_u16("port")?
                .ok_or_else(|| Error::Creation("udpsrc requires a 'port' property".into()))?;
            let timeout_ms = config.get_int("timeout-ms").unwrap_or(0);
            let mut src = UdpSrc::bind(("0.0.0.0", port))
                .map_err(|e| Error::Creation(format!("udpsrc: {}", e)))?;
            if timeout_ms > 0 {
                src = src
                    .with_read_timeout(Duration::from_millis(timeout_ms as u64))
                    .map_err(|e| Error::Creation(format!("udpsrc: {}", e)))?;
            }
            Ok(Box::new(SourceAdapter::new(src)))
        });

        self.register("nullsink", |_config| {
            Ok(Box::new(SinkAdapter::new(NullSink::new())))
        });
    }
}

impl Default for ElementFactory {
    fn default() -> Self {
        Self::new()
    }
}
