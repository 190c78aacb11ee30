//! Dynamic pad routing.
//!
//! Demuxers discover output pads at runtime (a transport stream demuxer
//! learns its elementary streams from the PMT). A [`PadRouter`] holds rules
//! registered before the pipeline starts, each matching a caps family to a
//! pre-registered downstream node. When the demuxer reports a new pad, the
//! executor resolves it through the router and begins forwarding buffers.
//!
//! Resolution is idempotent: a second notification for an already-linked pad
//! is a no-op reported as an informational event, never an error.

use crate::element::PadId;
use crate::format::{Caps, FormatFamily};
use crate::pipeline::NodeId;
use std::collections::HashMap;

/// A routing rule: pads whose caps contain `family` go to `target`.
#[derive(Debug, Clone, Copy)]
pub struct RouteRule {
    /// The caps family to match.
    pub family: FormatFamily,
    /// The downstream node receiving matching pads.
    pub target: NodeId,
}

/// Outcome of resolving a discovered pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    /// The pad was linked to the target node.
    Linked(NodeId),
    /// The pad was already linked; duplicate notification ignored.
    AlreadyLinked(NodeId),
    /// No rule matched the pad's caps.
    NoMatch,
}

/// Routes dynamically discovered pads to pre-registered downstream nodes.
pub struct PadRouter {
    rules: Vec<RouteRule>,
    linked: HashMap<PadId, NodeId>,
}

impl PadRouter {
    /// Create an empty router.
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            linked: HashMap::new(),
        }
    }

    /// Register a rule routing a caps family to a downstream node.
    ///
    /// Rules are consulted in registration order; the first match wins.
    pub fn route(mut self, family: FormatFamily, target: NodeId) -> Self {
        self.rules.push(RouteRule { family, target });
        self
    }

    /// All distinct target nodes, in rule order.
    pub fn targets(&self) -> Vec<NodeId> {
        let mut seen = Vec::new();
        for rule in &self.rules {
            if !seen.contains(&rule.target) {
                seen.push(rule.target);
            }
        }
        seen
    }

    /// Number of pads currently linked.
    pub fn linked_count(&self) -> usize {
        self.linked.len()
    }

    /// Resolve a discovered pad against the rules.
    ///
    /// Idempotent: resolving the same pad twice records exactly one link and
    /// returns [`RouteDecision::AlreadyLinked`] the second time.
    pub fn resolve(&mut self, pad: PadId, caps: &Caps) -> RouteDecision {
        if let Some(&target) = self.linked.get(&pad) {
            return RouteDecision::AlreadyLinked(target);
        }

        for rule in &self.rules {
            if caps.has_family(rule.family) {
                self.linked.insert(pad, rule.target);
                return RouteDecision::Linked(rule.target);
            }
        }

        RouteDecision::NoMatch
    }
}

impl Default for PadRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::SinkAdapter;
    use crate::elements::testing::NullSink;
    use crate::pipeline::Pipeline;

    fn two_targets() -> (NodeId, NodeId) {
        let mut pipeline = Pipeline::new();
        let a = pipeline.add_node("video-queue", Box::new(SinkAdapter::new(NullSink::new())));
        let b = pipeline.add_node("data-queue", Box::new(SinkAdapter::new(NullSink::new())));
        (a, b)
    }

    #[test]
    fn test_routing_by_family() {
        let (video, data) = two_targets();
        let mut router = PadRouter::new()
            .route(FormatFamily::Video, video)
            .route(FormatFamily::Metadata, data);

        assert_eq!(
            router.resolve(PadId(0), &Caps::h264()),
            RouteDecision::Linked(video)
        );
        assert_eq!(
            router.resolve(PadId(1), &Caps::klv()),
            RouteDecision::Linked(data)
        );
        assert_eq!(router.linked_count(), 2);
    }

    #[test]
    fn test_duplicate_notification_is_idempotent() {
        let (video, _) = two_targets();
        let mut router = PadRouter::new().route(FormatFamily::Video, video);

        assert_eq!(
            router.resolve(PadId(7), &Caps::h264()),
            RouteDecision::Linked(video)
        );
        // Second notification for the same pad: exactly one link remains.
        assert_eq!(
            router.resolve(PadId(7), &Caps::h264()),
            RouteDecision::AlreadyLinked(video)
        );
        assert_eq!(router.linked_count(), 1);
    }

    #[test]
    fn test_no_match() {
        let (video, _) = two_targets();
        let mut router = PadRouter::new().route(FormatFamily::Video, video);

        assert_eq!(router.resolve(PadId(0), &Caps::klv()), RouteDecision::NoMatch);
        assert_eq!(router.linked_count(), 0);
    }

    #[test]
    fn test_first_match_wins() {
        let (a, b) = two_targets();
        let mut router = PadRouter::new()
            .route(FormatFamily::Video, a)
            .route(FormatFamily::Video, b);

        assert_eq!(
            router.resolve(PadId(0), &Caps::h264()),
            RouteDecision::Linked(a)
        );
        assert_eq!(router.targets(), vec![a, b]);
    }
}
