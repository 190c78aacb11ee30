//! Declarative pipeline construction.
//!
//! [`GraphBuilder`] takes a list of (element-kind, config) declarations and
//! a list of static links, constructs every element through the factory, and
//! applies the links. Construction is all-or-nothing: if any element fails
//! to build or any link is rejected, the partially built pipeline is dropped
//! and all already-created elements are released with it.

use crate::element::ElementDyn;
use crate::error::Result;
use crate::pipeline::factory::{ElementConfig, ElementFactory};
use crate::pipeline::{NodeId, Pipeline};
use std::collections::HashMap;

enum ElementDecl {
    /// Construct via the factory from (kind, config).
    Factory { kind: String, config: ElementConfig },
    /// Use a pre-constructed element instance.
    Instance(Box<dyn ElementDyn>),
}

struct LinkDecl {
    src: String,
    src_pad: String,
    sink: String,
    sink_pad: String,
}

/// Declarative builder for pipelines.
///
/// # Example
///
/// ```rust,no_run
/// use weft::pipeline::{ElementConfig, GraphBuilder};
///
/// let pipeline = GraphBuilder::new()
///     .element("src", "testsrc", ElementConfig::new().set("num-buffers", 10_i64))
///     .element("sink", "nullsink", ElementConfig::new())
///     .link("src", "sink")
///     .build()?;
/// # Ok::<(), weft::Error>(())
/// ```
pub struct GraphBuilder {
    elements: Vec<(String, ElementDecl)>,
    links: Vec<LinkDecl>,
    factory: ElementFactory,
}

impl GraphBuilder {
    /// Create a builder backed by the default element factory.
    pub fn new() -> Self {
        Self {
            elements: Vec::new(),
            links: Vec::new(),
            factory: ElementFactory::new(),
        }
    }

    /// Create a builder backed by a custom factory.
    pub fn with_factory(factory: ElementFactory) -> Self {
        Self {
            elements: Vec::new(),
            links: Vec::new(),
            factory,
        }
    }

    /// Declare an element by kind and config.
    pub fn element(
        mut self,
        name: impl Into<String>,
        kind: impl Into<String>,
        config: ElementConfig,
    ) -> Self {
        self.elements.push((
            name.into(),
            ElementDecl::Factory {
                kind: kind.into(),
                config,
            },
        ));
        self
    }

    /// Declare a pre-constructed element instance.
    ///
    /// Used for elements the application keeps a handle to (app sources and
    /// sinks) or configures beyond what the factory exposes.
    pub fn instance(mut self, name: impl Into<String>, element: Box<dyn ElementDyn>) -> Self {
        self.elements
            .push((name.into(), ElementDecl::Instance(element)));
        self
    }

    /// Declare a static link using the default "src"/"sink" pads.
    pub fn link(self, src: impl Into<String>, sink: impl Into<String>) -> Self {
        self.link_pads(src, "src", sink, "sink")
    }

    /// Declare a static link with explicit pad names.
    pub fn link_pads(
        mut self,
        src: impl Into<String>,
        src_pad: impl Into<String>,
        sink: impl Into<String>,
        sink_pad: impl Into<String>,
    ) -> Self {
        self.links.push(LinkDecl {
            src: src.into(),
            src_pad: src_pad.into(),
            sink: sink.into(),
            sink_pad: sink_pad.into(),
        });
        self
    }

    /// Construct every element, then apply every static link.
    ///
    /// Fails with [`crate::Error::Creation`] if any factory lookup fails and
    /// with [`crate::Error::Link`] if a link names a missing element or pad
    /// or its caps are incompatible. On failure everything built so far is
    /// dropped.
    pub fn build(self) -> Result<Pipeline> {
        let mut pipeline = Pipeline::new();
        let mut ids: HashMap<String, NodeId> = HashMap::new();

        for (name, decl) in self.elements {
            let element = match decl {
                ElementDecl::Factory { kind, config } => self.factory.create(&kind, &config)?,
                ElementDecl::Instance(element) => element,
            };
            let id = pipeline.add_node(name.clone(), element);
            ids.insert(name, id);
        }

        for link in self.links {
            let src = *ids.get(&link.src).ok_or_else(|| {
                crate::Error::Link(format!("link references unknown element '{}'", link.src))
            })?;
            let sink = *ids.get(&link.sink).ok_or_else(|| {
                crate::Error::Link(format!("link references unknown element '{}'", link.sink))
            })?;
            pipeline.link_pads(src, &link.src_pad, sink, &link.sink_pad)?;
        }

        Ok(pipeline)
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_build_linear_pipeline() {
        let pipeline = GraphBuilder::new()
            .element(
                "src",
                "testsrc",
                ElementConfig::new().set("num-buffers", 10_i64),
            )
            .element("q", "queue", ElementConfig::new())
            .element("sink", "nullsink", ElementConfig::new())
            .link("src", "q")
            .link("q", "sink")
            .build()
            .unwrap();

        assert_eq!(pipeline.node_count(), 3);
        assert_eq!(pipeline.edge_count(), 2);
        assert!(pipeline.validate().is_ok());
    }

    #[test]
    fn test_unknown_kind_aborts_build() {
        let result = GraphBuilder::new()
            .element("src", "doesnotexist", ElementConfig::new())
            .build();
        assert!(matches!(result, Err(Error::Creation(_))));
    }

    #[test]
    fn test_link_to_unknown_element_aborts_build() {
        let result = GraphBuilder::new()
            .element("src", "testsrc", ElementConfig::new())
            .link("src", "ghost")
            .build();
        assert!(matches!(result, Err(Error::Link(_))));
    }

    #[test]
    fn test_muxer_pad_links() {
        let pipeline = GraphBuilder::new()
            .element("video", "h264testsrc", ElementConfig::new())
            .element("mux", "tsmux", ElementConfig::new())
            .element("sink", "nullsink", ElementConfig::new())
            .link_pads("video", "src", "mux", "video")
            .link("mux", "sink")
            .build()
            .unwrap();

        assert_eq!(pipeline.edge_count(), 2);
    }

    #[test]
    fn test_muxer_bad_pad_name_fails() {
        let result = GraphBuilder::new()
            .element("video", "h264testsrc", ElementConfig::new())
            .element("mux", "tsmux", ElementConfig::new())
            .link_pads("video", "src", "mux", "audio")
            .build();
        assert!(matches!(result, Err(Error::Link(_))));
    }
}
