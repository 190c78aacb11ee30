//! Pad abstraction for element inputs and outputs.
//!
//! Pads represent the connection points of elements. Each element can have
//! multiple input and output pads; demuxers grow output pads at runtime as
//! elementary streams are discovered.

use crate::format::Caps;

/// Direction of a pad (input or output).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PadDirection {
    /// An input pad (receives buffers from upstream).
    Input,
    /// An output pad (sends buffers downstream).
    Output,
}

/// Whether a pad is always present or created dynamically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PadPresence {
    /// Pad is always present on the element.
    Always,
    /// Pad is created at runtime (e.g., by demuxers on stream discovery).
    Sometimes,
}

/// A pad instance on an element.
#[derive(Debug, Clone)]
pub struct Pad {
    /// Unique name of this pad within the element.
    name: String,
    /// Direction of this pad.
    direction: PadDirection,
    /// Whether this pad is static or dynamically created.
    presence: PadPresence,
    /// Capabilities carried on this pad.
    caps: Caps,
}

impl Pad {
    /// Create a new always-present pad with any caps.
    pub fn new(name: impl Into<String>, direction: PadDirection) -> Self {
        Self {
            name: name.into(),
            direction,
            presence: PadPresence::Always,
            caps: Caps::any(),
        }
    }

    /// Create a standard input pad named "sink".
    pub fn sink() -> Self {
        Self::new("sink", PadDirection::Input)
    }

    /// Create a standard output pad named "src".
    pub fn src() -> Self {
        Self::new("src", PadDirection::Output)
    }

    /// Set the capabilities for this pad.
    pub fn with_caps(mut self, caps: Caps) -> Self {
        self.caps = caps;
        self
    }

    /// Mark this pad as dynamically created.
    pub fn sometimes(mut self) -> Self {
        self.presence = PadPresence::Sometimes;
        self
    }

    /// Get the pad's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the pad's direction.
    pub fn direction(&self) -> PadDirection {
        self.direction
    }

    /// Get the pad's presence.
    pub fn presence(&self) -> PadPresence {
        self.presence
    }

    /// Get the pad's capabilities.
    pub fn caps(&self) -> &Caps {
        &self.caps
    }

    /// Check if this is an input pad.
    pub fn is_input(&self) -> bool {
        self.direction == PadDirection::Input
    }

    /// Check if this is an output pad.
    pub fn is_output(&self) -> bool {
        self.direction == PadDirection::Output
    }
}

/// Collection of pads for an element.
#[derive(Debug, Default)]
pub struct PadList {
    pads: Vec<Pad>,
}

impl PadList {
    /// Create an empty pad list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pad to the list.
    pub fn add(&mut self, pad: Pad) {
        self.pads.push(pad);
    }

    /// Get a pad by name.
    pub fn get(&self, name: &str) -> Option<&Pad> {
        self.pads.iter().find(|p| p.name() == name)
    }

    /// Get all input pads.
    pub fn inputs(&self) -> impl Iterator<Item = &Pad> {
        self.pads.iter().filter(|p| p.is_input())
    }

    /// Get all output pads.
    pub fn outputs(&self) -> impl Iterator<Item = &Pad> {
        self.pads.iter().filter(|p| p.is_output())
    }

    /// Get all pads.
    pub fn iter(&self) -> impl Iterator<Item = &Pad> {
        self.pads.iter()
    }

    /// Get the number of pads.
    pub fn len(&self) -> usize {
        self.pads.len()
    }

    /// Check if the pad list is empty.
    pub fn is_empty(&self) -> bool {
        self.pads.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Caps;

    #[test]
    fn test_pad_creation() {
        let input = Pad::sink();
        assert_eq!(input.name(), "sink");
        assert!(input.is_input());
        assert!(!input.is_output());

        let output = Pad::src();
        assert_eq!(output.name(), "src");
        assert!(output.is_output());
        assert_eq!(output.presence(), PadPresence::Always);
    }

    #[test]
    fn test_dynamic_pad() {
        let pad = Pad::new("video", PadDirection::Output)
            .with_caps(Caps::h264())
            .sometimes();
        assert_eq!(pad.presence(), PadPresence::Sometimes);
        assert!(pad.caps().intersects(&Caps::h264()));
    }

    #[test]
    fn test_pad_list() {
        let mut list = PadList::new();
        list.add(Pad::sink());
        list.add(Pad::src());
        list.add(Pad::new("aux_out", PadDirection::Output));

        assert_eq!(list.len(), 3);
        assert_eq!(list.inputs().count(), 1);
        assert_eq!(list.outputs().count(), 2);

        assert!(list.get("sink").is_some());
        assert!(list.get("nonexistent").is_none());
    }
}
