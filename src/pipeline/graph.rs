//! Pipeline graph structure using daggy.

use crate::clock::PipelineClock;
use crate::element::{ElementDyn, ElementKind, Pad, PadDirection};
use crate::error::{Error, Result};
use crate::format::Caps;
use daggy::{Dag, NodeIndex, Walker};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Unique identifier for a node in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) NodeIndex);

impl NodeId {
    /// Get the underlying index.
    pub fn index(&self) -> usize {
        self.0.index()
    }
}

/// State of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PipelineState {
    /// Pipeline is not yet started (or has been torn down).
    #[default]
    Stopped,
    /// Pipeline is running.
    Running,
    /// Pipeline has finished (all sources exhausted).
    Finished,
    /// Pipeline encountered an error.
    Error,
}

/// A node in the pipeline graph.
pub struct Node {
    /// Unique name of this node.
    name: String,
    /// The element wrapped by this node.
    /// An Option so that elements can be taken out for execution.
    element: Option<Box<dyn ElementDyn>>,
    /// Cached element kind (queryable after the element is taken).
    kind: ElementKind,
    /// Cached caps (queryable after the element is taken).
    input_caps: Caps,
    output_caps: Caps,
    /// Input pads.
    input_pads: Vec<Pad>,
    /// Output pads.
    output_pads: Vec<Pad>,
}

impl Node {
    /// Create a new node, deriving pads from the element's kind.
    pub fn new(name: impl Into<String>, element: Box<dyn ElementDyn>) -> Self {
        let name = name.into();
        let kind = element.kind();
        let input_caps = element.input_caps();
        let output_caps = element.output_caps();

        let (input_pads, output_pads) = match kind {
            ElementKind::Source => {
                (vec![], vec![Pad::src().with_caps(output_caps.clone())])
            }
            ElementKind::Sink => (vec![Pad::sink().with_caps(input_caps.clone())], vec![]),
            ElementKind::Transform => (
                vec![Pad::sink().with_caps(input_caps.clone())],
                vec![Pad::src().with_caps(output_caps.clone())],
            ),
            // Demuxer output pads appear at runtime.
            ElementKind::Demuxer => (vec![Pad::sink().with_caps(input_caps.clone())], vec![]),
            ElementKind::Muxer => {
                let inputs = element
                    .mux_input_pads()
                    .into_iter()
                    .map(|p| {
                        let caps = element.mux_pad_caps(&p);
                        Pad::new(p, PadDirection::Input).with_caps(caps)
                    })
                    .collect();
                (inputs, vec![Pad::src().with_caps(output_caps.clone())])
            }
        };

        Self {
            name,
            element: Some(element),
            kind,
            input_caps,
            output_caps,
            input_pads,
            output_pads,
        }
    }

    /// Get the node's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get a mutable reference to the element.
    ///
    /// Returns `None` if the element has been taken for execution.
    pub fn element_mut(&mut self) -> Option<&mut Box<dyn ElementDyn>> {
        self.element.as_mut()
    }

    /// Take the element out of this node for execution.
    pub fn take_element(&mut self) -> Option<Box<dyn ElementDyn>> {
        self.element.take()
    }

    /// Get the element kind.
    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// Get the cached input caps.
    pub fn input_caps(&self) -> &Caps {
        &self.input_caps
    }

    /// Get the cached output caps.
    pub fn output_caps(&self) -> &Caps {
        &self.output_caps
    }

    /// Get input pads.
    pub fn input_pads(&self) -> &[Pad] {
        &self.input_pads
    }

    /// Get output pads.
    pub fn output_pads(&self) -> &[Pad] {
        &self.output_pads
    }

    /// Add a dynamically discovered output pad.
    pub fn add_output_pad(&mut self, pad: Pad) {
        debug_assert!(pad.is_output());
        self.output_pads.push(pad);
    }

    fn input_pad(&self, name: &str) -> Option<&Pad> {
        self.input_pads.iter().find(|p| p.name() == name)
    }

    fn output_pad(&self, name: &str) -> Option<&Pad> {
        self.output_pads.iter().find(|p| p.name() == name)
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("input_pads", &self.input_pads.len())
            .field("output_pads", &self.output_pads.len())
            .finish()
    }
}

/// A link between two nodes in the pipeline.
#[derive(Debug, Clone)]
pub struct Link {
    /// Name of the source pad.
    pub src_pad: String,
    /// Name of the sink pad.
    pub sink_pad: String,
}

impl Default for Link {
    fn default() -> Self {
        Self {
            src_pad: "src".to_string(),
            sink_pad: "sink".to_string(),
        }
    }
}

impl Link {
    /// Create a link with specific pad names.
    pub fn with_pads(src_pad: impl Into<String>, sink_pad: impl Into<String>) -> Self {
        Self {
            src_pad: src_pad.into(),
            sink_pad: sink_pad.into(),
        }
    }
}

/// A streaming pipeline represented as a directed acyclic graph.
///
/// The pipeline owns all nodes and links and is the single point of
/// teardown: [`Pipeline::shutdown`] transitions to `Stopped` exactly once,
/// no matter how many times it is called.
pub struct Pipeline {
    /// The DAG structure.
    graph: Dag<Node, Link>,
    /// Name-to-NodeId mapping for quick lookup.
    nodes_by_name: HashMap<String, NodeId>,
    /// Current state of the pipeline.
    state: PipelineState,
    /// Pipeline timing context, shared with clock-stamping elements.
    clock: Arc<PipelineClock>,
    /// Set once the first shutdown has run.
    torn_down: AtomicBool,
    /// Auto-incrementing counter for anonymous node names.
    name_counter: u64,
}

impl Pipeline {
    /// Create a new empty pipeline with a system clock.
    pub fn new() -> Self {
        Self {
            graph: Dag::new(),
            nodes_by_name: HashMap::new(),
            state: PipelineState::Stopped,
            clock: Arc::new(PipelineClock::system()),
            torn_down: AtomicBool::new(false),
            name_counter: 0,
        }
    }

    /// Get the current pipeline state.
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Set the pipeline state.
    pub fn set_state(&mut self, state: PipelineState) {
        self.state = state;
    }

    /// Get the pipeline clock.
    pub fn clock(&self) -> Arc<PipelineClock> {
        Arc::clone(&self.clock)
    }

    /// Add a node to the pipeline. Returns the node's ID for linking.
    pub fn add_node(&mut self, name: impl Into<String>, element: Box<dyn ElementDyn>) -> NodeId {
        let name = name.into();
        let node = Node::new(name.clone(), element);
        let idx = self.graph.add_node(node);
        let id = NodeId(idx);
        self.nodes_by_name.insert(name, id);
        id
    }

    /// Add a node with an auto-generated name.
    pub fn add_node_auto(&mut self, element: Box<dyn ElementDyn>) -> NodeId {
        let name = format!("node_{}", self.name_counter);
        self.name_counter += 1;
        self.add_node(name, element)
    }

    /// Get a node by ID.
    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.graph.node_weight(id.0)
    }

    /// Get a mutable reference to a node by ID.
    pub fn get_node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.graph.node_weight_mut(id.0)
    }

    /// Get a node ID by name.
    pub fn get_node_id(&self, name: &str) -> Option<NodeId> {
        self.nodes_by_name.get(name).copied()
    }

    /// Link two nodes using the default "src" and "sink" pads.
    pub fn link(&mut self, src: NodeId, sink: NodeId) -> Result<()> {
        self.link_pads(src, "src", sink, "sink")
    }

    /// Link two nodes with specific pad names.
    ///
    /// Validates that both pads exist, that the sink pad is not already
    /// linked (an input pad accepts at most one incoming link), and that the
    /// pads' caps intersect. On any failure returns [`Error::Link`] and
    /// records no link.
    pub fn link_pads(
        &mut self,
        src: NodeId,
        src_pad: &str,
        sink: NodeId,
        sink_pad: &str,
    ) -> Result<()> {
        let src_node = self
            .graph
            .node_weight(src.0)
            .ok_or_else(|| Error::Link("source node not found".into()))?;

        let src_caps = match src_node.output_pad(src_pad) {
            Some(pad) => pad.caps().clone(),
            None => {
                return Err(Error::Link(format!(
                    "source node '{}' has no output pad '{}'",
                    src_node.name, src_pad
                )));
            }
        };

        let sink_node = self
            .graph
            .node_weight(sink.0)
            .ok_or_else(|| Error::Link("sink node not found".into()))?;

        let sink_caps = match sink_node.input_pad(sink_pad) {
            Some(pad) => pad.caps().clone(),
            None => {
                return Err(Error::Link(format!(
                    "sink node '{}' has no input pad '{}'",
                    sink_node.name, sink_pad
                )));
            }
        };

        if self.is_input_linked(sink, sink_pad) {
            return Err(Error::Link(format!(
                "input pad '{}' of node '{}' is already linked",
                sink_pad,
                self.graph.node_weight(sink.0).map(|n| n.name()).unwrap_or("?")
            )));
        }

        if !src_caps.intersects(&sink_caps) {
            return Err(Error::Link(format!(
                "caps mismatch: {} ! {}",
                src_caps, sink_caps
            )));
        }

        let link = Link::with_pads(src_pad, sink_pad);

        // daggy rejects edges that would create a cycle.
        self.graph
            .add_edge(src.0, sink.0, link)
            .map_err(|_| Error::Link("linking would create a cycle".into()))?;

        Ok(())
    }

    /// Check whether an input pad already has an incoming link.
    pub fn is_input_linked(&self, node: NodeId, sink_pad: &str) -> bool {
        self.parents(node)
            .iter()
            .any(|(_, link)| link.sink_pad == sink_pad)
    }

    /// Get all source nodes (nodes with no incoming edges).
    pub fn sources(&self) -> Vec<NodeId> {
        self.graph
            .graph()
            .node_indices()
            .filter(|&idx| {
                self.graph
                    .graph()
                    .neighbors_directed(idx, daggy::petgraph::Direction::Incoming)
                    .count()
                    == 0
            })
            .map(NodeId)
            .collect()
    }

    /// Get all sink nodes (nodes with no outgoing edges).
    pub fn sinks(&self) -> Vec<NodeId> {
        self.graph
            .graph()
            .node_indices()
            .filter(|&idx| {
                self.graph
                    .graph()
                    .neighbors_directed(idx, daggy::petgraph::Direction::Outgoing)
                    .count()
                    == 0
            })
            .map(NodeId)
            .collect()
    }

    /// Get the children (downstream nodes) of a node.
    pub fn children(&self, id: NodeId) -> Vec<(NodeId, &Link)> {
        self.graph
            .children(id.0)
            .iter(&self.graph)
            .map(|(edge_idx, node_idx)| {
                let link = self.graph.edge_weight(edge_idx).unwrap();
                (NodeId(node_idx), link)
            })
            .collect()
    }

    /// Get the parents (upstream nodes) of a node.
    pub fn parents(&self, id: NodeId) -> Vec<(NodeId, &Link)> {
        self.graph
            .parents(id.0)
            .iter(&self.graph)
            .map(|(edge_idx, node_idx)| {
                let link = self.graph.edge_weight(edge_idx).unwrap();
                (NodeId(node_idx), link)
            })
            .collect()
    }

    /// Get the number of nodes in the pipeline.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Get the number of edges (links) in the pipeline.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Check if the pipeline is empty.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Validate the pipeline structure.
    ///
    /// Checks that the pipeline is non-empty, has at least one source and
    /// one sink, and that edge nodes have the right element kinds.
    pub fn validate(&self) -> Result<()> {
        self.validate_with_dynamic_inputs(&[])
    }

    /// Validate, treating `dynamic_inputs` as nodes that will be fed at
    /// runtime (router targets of a demuxer) rather than true sources.
    pub fn validate_with_dynamic_inputs(&self, dynamic_inputs: &[NodeId]) -> Result<()> {
        if self.is_empty() {
            return Err(Error::Link("pipeline is empty".into()));
        }

        let sources = self.sources();
        let sinks = self.sinks();

        if sources.is_empty() {
            return Err(Error::Link("pipeline has no source nodes".into()));
        }

        if sinks.is_empty() {
            return Err(Error::Link("pipeline has no sink nodes".into()));
        }

        for src_id in &sources {
            if dynamic_inputs.contains(src_id) {
                continue;
            }
            let node = self.get_node(*src_id).unwrap();
            if node.kind() != ElementKind::Source {
                return Err(Error::Link(format!(
                    "node '{}' has no inputs but is not a source element",
                    node.name()
                )));
            }
        }

        for sink_id in &sinks {
            let node = self.get_node(*sink_id).unwrap();
            // Demuxers may legitimately have no outgoing static edges; their
            // routed targets are linked dynamically.
            if node.kind() != ElementKind::Sink && node.kind() != ElementKind::Demuxer {
                return Err(Error::Link(format!(
                    "node '{}' has no outputs but is not a sink element",
                    node.name()
                )));
            }
        }

        Ok(())
    }

    /// Tear the pipeline down, transitioning to `Stopped`.
    ///
    /// Idempotent: only the first call performs the transition. Returns
    /// `true` if this call performed the teardown.
    pub fn shutdown(&mut self) -> bool {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.clock.reset();
        self.state = PipelineState::Stopped;
        true
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("nodes", &self.node_count())
            .field("edges", &self.edge_count())
            .field("state", &self.state)
            .finish()
    }
}
