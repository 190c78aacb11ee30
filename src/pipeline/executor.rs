//! Pipeline executor using Tokio tasks and Kanal channels.
//!
//! The executor spawns a task for each node in the pipeline and connects
//! them with bounded channels. Node code is synchronous; the channels carry
//! buffers and end-of-stream markers between the framework-managed tasks.
//! User callbacks (pad-added handlers, sample callbacks) run on whichever
//! task owns the element, so they must be `Send` and safe to run
//! concurrently with teardown.

use crate::buffer::Buffer;
use crate::element::{ElementDyn, ElementKind, PadId, Produced};
use crate::error::{Error, Result};
use crate::format::Caps;
use crate::pipeline::{
    EventReceiver, EventSender, NodeId, PadRouter, Pipeline, PipelineEvent, PipelineState,
    RouteDecision,
};
use kanal::{AsyncReceiver, AsyncSender, bounded_async};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::{AbortHandle, JoinHandle};

/// Configuration for the pipeline executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Channel buffer size between elements.
    pub channel_capacity: usize,
    /// How long a source task sleeps after a `WouldBlock` before retrying.
    pub backoff: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 16,
            backoff: Duration::from_millis(1),
        }
    }
}

/// Message passed between pipeline elements.
#[derive(Debug)]
enum Message {
    /// A data buffer.
    Buffer(Buffer),
    /// End of stream signal.
    Eos,
}

/// Handle to a running pipeline.
pub struct PipelineHandle {
    supervisor: JoinHandle<Result<()>>,
    aborts: Vec<AbortHandle>,
    events: EventSender,
    /// Receiver subscribed before any node task ran, so no event is missed.
    primary: Option<EventReceiver>,
    stopped: Arc<AtomicBool>,
}

impl PipelineHandle {
    /// Wait for the pipeline to complete.
    ///
    /// Returns `Ok(())` if every node finished cleanly, or the first error.
    pub async fn wait(self) -> Result<()> {
        match self.supervisor.await {
            Ok(result) => result,
            Err(e) => Err(Error::Element(format!("supervisor panicked: {e}"))),
        }
    }

    /// Stop the pipeline by aborting all node tasks.
    ///
    /// Idempotent: only the first call aborts and emits `Stopped`.
    pub fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        for abort in &self.aborts {
            abort.abort();
        }
        self.events.send(PipelineEvent::Stopped);
    }

    /// Take the event receiver that was subscribed before the pipeline
    /// started; it observes every event, including a terminal one emitted
    /// before the caller got around to listening. Later calls fall back to
    /// a fresh subscription.
    pub fn take_events(&mut self) -> EventReceiver {
        self.primary
            .take()
            .unwrap_or_else(|| self.events.subscribe())
    }

    /// Subscribe an additional observer to pipeline events.
    ///
    /// New subscriptions only see events emitted after this call; use
    /// [`PipelineHandle::take_events`] for the control loop.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Get the event sender for this pipeline.
    pub fn event_sender(&self) -> &EventSender {
        &self.events
    }
}

/// Executor that runs a pipeline.
pub struct Executor {
    config: ExecutorConfig,
}

impl Executor {
    /// Create a new executor with default configuration.
    pub fn new() -> Self {
        Self {
            config: ExecutorConfig::default(),
        }
    }

    /// Create a new executor with custom configuration.
    pub fn with_config(config: ExecutorConfig) -> Self {
        Self { config }
    }

    /// Run the pipeline to completion and tear it down.
    pub async fn run(&self, pipeline: &mut Pipeline) -> Result<()> {
        let handle = self.start(pipeline)?;
        let result = handle.wait().await;
        match &result {
            Ok(()) => pipeline.set_state(PipelineState::Finished),
            Err(_) => pipeline.set_state(PipelineState::Error),
        }
        pipeline.shutdown();
        result
    }

    /// Start the pipeline without dynamic pad routing.
    pub fn start(&self, pipeline: &mut Pipeline) -> Result<PipelineHandle> {
        self.start_with_router(pipeline, PadRouter::new())
    }

    /// Start the pipeline with a router for dynamically discovered pads.
    ///
    /// Channels to the router's target nodes are created eagerly; buffers
    /// flow on them only once the corresponding pad has been discovered and
    /// resolved.
    pub fn start_with_router(
        &self,
        pipeline: &mut Pipeline,
        router: PadRouter,
    ) -> Result<PipelineHandle> {
        pipeline.validate_with_dynamic_inputs(&router.targets())?;

        let events = EventSender::new(256);

        let old_state = pipeline.state();
        pipeline.set_state(PipelineState::Running);
        pipeline.clock().start();
        events.send_state_changed(old_state, PipelineState::Running);
        events.send(PipelineEvent::Started);

        // Subscribed before any node task runs, so a fast pipeline cannot
        // emit its terminal event unobserved.
        let primary = events.subscribe();

        let mut network = self.build_channels(pipeline, &router);
        let tasks = self.spawn_tasks(pipeline, &mut network, router, &events)?;

        let aborts: Vec<AbortHandle> = tasks.iter().map(|t| t.abort_handle()).collect();
        let stopped = Arc::new(AtomicBool::new(false));

        let supervisor = tokio::spawn(supervise(tasks, events.clone(), Arc::clone(&stopped)));

        Ok(PipelineHandle {
            supervisor,
            aborts,
            events,
            primary: Some(primary),
            stopped,
        })
    }

    /// Build channels for every static link plus every router target.
    fn build_channels(&self, pipeline: &Pipeline, router: &PadRouter) -> ChannelNetwork {
        let mut network = ChannelNetwork::new();

        for src_id in pipeline.sources() {
            self.build_channels_from(pipeline, src_id, &mut network);
        }

        // Channels from demuxers to their routed targets; these carry
        // buffers only after a pad resolves.
        for node_id in pipeline.sources() {
            self.build_route_channels_from(pipeline, node_id, router, &mut network);
        }

        network
    }

    fn build_channels_from(
        &self,
        pipeline: &Pipeline,
        node_id: NodeId,
        network: &mut ChannelNetwork,
    ) {
        for (child_id, link) in pipeline.children(node_id) {
            if !network.has_channel(node_id, &link.src_pad, child_id, &link.sink_pad) {
                let (tx, rx) = bounded_async::<Message>(self.config.channel_capacity);
                network.add_channel(
                    node_id,
                    link.src_pad.clone(),
                    child_id,
                    link.sink_pad.clone(),
                    tx,
                    rx,
                );
            }
            self.build_channels_from(pipeline, child_id, network);
        }
    }

    fn build_route_channels_from(
        &self,
        pipeline: &Pipeline,
        node_id: NodeId,
        router: &PadRouter,
        network: &mut ChannelNetwork,
    ) {
        let mut visited = std::collections::HashSet::new();
        let mut stack = vec![node_id];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let node = match pipeline.get_node(id) {
                Some(n) => n,
                None => continue,
            };
            if node.kind() == ElementKind::Demuxer {
                for target in router.targets() {
                    if !network.has_channel(id, "routed", target, "sink") {
                        let (tx, rx) = bounded_async::<Message>(self.config.channel_capacity);
                        network.add_route_channel(id, target, tx, rx);
                    }
                }
            }
            for (child_id, _) in pipeline.children(id) {
                stack.push(child_id);
            }
        }
    }

    /// Spawn a task for each node reachable from a source.
    fn spawn_tasks(
        &self,
        pipeline: &mut Pipeline,
        network: &mut ChannelNetwork,
        router: PadRouter,
        events: &EventSender,
    ) -> Result<Vec<JoinHandle<Result<()>>>> {
        let mut node_ids: Vec<NodeId> = pipeline.sources();
        node_ids.extend(self.collect_reachable_nodes(pipeline));
        // Router targets may be reachable only via dynamic routes.
        node_ids.extend(router.targets());
        let mut descendants = Vec::new();
        for target in router.targets() {
            self.collect_reachable_from(pipeline, target, &mut descendants);
        }
        node_ids.extend(descendants);

        let mut seen = std::collections::HashSet::new();
        let node_ids: Vec<NodeId> = node_ids.into_iter().filter(|id| seen.insert(*id)).collect();

        let mut router = Some(router);
        let mut tasks = Vec::new();

        for node_id in node_ids {
            let node = pipeline
                .get_node_mut(node_id)
                .ok_or_else(|| Error::Element("node not found".into()))?;

            let kind = node.kind();
            let node_name = node.name().to_string();

            let element = node.take_element().ok_or_else(|| {
                Error::Element(format!("element '{}' already taken", node_name))
            })?;

            let events_clone = events.clone();
            match kind {
                ElementKind::Source => {
                    let outputs = network.take_outputs(node_id);
                    tasks.push(spawn_source_task(
                        node_name,
                        element,
                        outputs,
                        events_clone,
                        self.config.backoff,
                    ));
                }
                ElementKind::Sink => {
                    let inputs = network.take_inputs(node_id);
                    tasks.push(spawn_sink_task(node_name, element, inputs, events_clone));
                }
                ElementKind::Transform => {
                    let inputs = network.take_inputs(node_id);
                    let outputs = network.take_outputs(node_id);
                    tasks.push(spawn_transform_task(
                        node_name,
                        element,
                        inputs,
                        outputs,
                        events_clone,
                    ));
                }
                ElementKind::Demuxer => {
                    let inputs = network.take_inputs(node_id);
                    let route_senders = network.take_route_senders(node_id);
                    let demux_router = router.take().unwrap_or_default();
                    tasks.push(spawn_demuxer_task(
                        node_name,
                        element,
                        inputs,
                        route_senders,
                        demux_router,
                        events_clone,
                    ));
                }
                ElementKind::Muxer => {
                    let inputs_by_pad = network.take_inputs_by_pad(node_id);
                    let outputs = network.take_outputs(node_id);
                    tasks.push(spawn_muxer_task(
                        node_name,
                        element,
                        inputs_by_pad,
                        outputs,
                        events_clone,
                        self.config.channel_capacity,
                    ));
                }
            }
        }

        Ok(tasks)
    }

    fn collect_reachable_nodes(&self, pipeline: &Pipeline) -> Vec<NodeId> {
        let mut result = Vec::new();
        for src in pipeline.sources() {
            self.collect_reachable_from(pipeline, src, &mut result);
        }
        result
    }

    fn collect_reachable_from(&self, pipeline: &Pipeline, from: NodeId, result: &mut Vec<NodeId>) {
        let mut visited = std::collections::HashSet::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            for (child_id, _) in pipeline.children(id) {
                result.push(child_id);
                stack.push(child_id);
            }
        }
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

/// Await all node tasks; emit EOS once everything finished cleanly.
async fn supervise(
    tasks: Vec<JoinHandle<Result<()>>>,
    events: EventSender,
    stopped: Arc<AtomicBool>,
) -> Result<()> {
    let mut first_error: Option<Error> = None;

    for task in tasks {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                // The node task already published the error event.
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
            Err(e) if e.is_cancelled() => {
                // Aborted by shutdown; not an error.
            }
            Err(e) => {
                let err = Error::Element(format!("node task panicked: {e}"));
                events.send_error(err.to_string(), None);
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => {
            if !stopped.load(Ordering::Acquire) {
                events.send_eos();
            }
            Ok(())
        }
    }
}

// ============================================================================
// Channel network
// ============================================================================

/// Key for a channel: (source_node, source_pad, sink_node, sink_pad).
type ChannelKey = (NodeId, String, NodeId, String);

/// Network of channels connecting pipeline nodes.
struct ChannelNetwork {
    channels: std::collections::HashSet<ChannelKey>,
    /// Output channels per node: senders for each outgoing static link.
    outputs: HashMap<NodeId, Vec<AsyncSender<Message>>>,
    /// Input channels per node+pad.
    inputs: HashMap<(NodeId, String), Vec<AsyncReceiver<Message>>>,
    /// Route channels per demuxer: target node -> sender.
    routes: HashMap<NodeId, HashMap<NodeId, AsyncSender<Message>>>,
}

impl ChannelNetwork {
    fn new() -> Self {
        Self {
            channels: std::collections::HashSet::new(),
            outputs: HashMap::new(),
            inputs: HashMap::new(),
            routes: HashMap::new(),
        }
    }

    fn has_channel(&self, src: NodeId, src_pad: &str, sink: NodeId, sink_pad: &str) -> bool {
        self.channels
            .contains(&(src, src_pad.to_string(), sink, sink_pad.to_string()))
    }

    fn add_channel(
        &mut self,
        src: NodeId,
        src_pad: String,
        sink: NodeId,
        sink_pad: String,
        tx: AsyncSender<Message>,
        rx: AsyncReceiver<Message>,
    ) {
        self.channels.insert((src, src_pad, sink, sink_pad.clone()));
        self.outputs.entry(src).or_default().push(tx);
        self.inputs.entry((sink, sink_pad)).or_default().push(rx);
    }

    fn add_route_channel(
        &mut self,
        demuxer: NodeId,
        target: NodeId,
        tx: AsyncSender<Message>,
        rx: AsyncReceiver<Message>,
    ) {
        self.channels
            .insert((demuxer, "routed".to_string(), target, "sink".to_string()));
        self.routes.entry(demuxer).or_default().insert(target, tx);
        self.inputs.entry((target, "sink".to_string())).or_default().push(rx);
    }

    fn take_outputs(&mut self, node: NodeId) -> Vec<AsyncSender<Message>> {
        self.outputs.remove(&node).unwrap_or_default()
    }

    fn take_inputs(&mut self, node: NodeId) -> Vec<AsyncReceiver<Message>> {
        self.take_inputs_by_pad(node).into_values().flatten().collect()
    }

    fn take_inputs_by_pad(&mut self, node: NodeId) -> HashMap<String, Vec<AsyncReceiver<Message>>> {
        let keys: Vec<_> = self
            .inputs
            .keys()
            .filter(|(n, _)| *n == node)
            .cloned()
            .collect();
        let mut result = HashMap::new();
        for (n, pad) in keys {
            if let Some(receivers) = self.inputs.remove(&(n, pad.clone())) {
                result.insert(pad, receivers);
            }
        }
        result
    }

    fn take_route_senders(&mut self, demuxer: NodeId) -> HashMap<NodeId, AsyncSender<Message>> {
        self.routes.remove(&demuxer).unwrap_or_default()
    }
}

// ============================================================================
// Node tasks
// ============================================================================

fn spawn_source_task(
    name: String,
    mut element: Box<dyn ElementDyn>,
    outputs: Vec<AsyncSender<Message>>,
    events: EventSender,
    backoff: Duration,
) -> JoinHandle<Result<()>> {
    tokio::spawn(async move {
        tracing::debug!(node = %name, "source task started");
        events.send_node_started(&name);

        let mut buffers_processed: u64 = 0;

        loop {
            match element.produce() {
                Ok(Produced::Buffer(buffer)) => {
                    buffers_processed += 1;
                    for tx in &outputs {
                        if tx.send(Message::Buffer(buffer.clone())).await.is_err() {
                            tracing::warn!(node = %name, "downstream receiver dropped");
                        }
                    }
                }
                Ok(Produced::WouldBlock) => {
                    tokio::time::sleep(backoff).await;
                }
                Ok(Produced::Eos) => {
                    tracing::debug!(node = %name, "source reached EOS");
                    for tx in &outputs {
                        let _ = tx.send(Message::Eos).await;
                    }
                    break;
                }
                Err(e) => {
                    tracing::error!(node = %name, error = %e, "source error");
                    events.send_error(e.to_string(), Some(name.clone()));
                    return Err(e);
                }
            }
        }

        events.send_node_finished(&name, buffers_processed);
        Ok(())
    })
}

fn spawn_sink_task(
    name: String,
    mut element: Box<dyn ElementDyn>,
    inputs: Vec<AsyncReceiver<Message>>,
    events: EventSender,
) -> JoinHandle<Result<()>> {
    tokio::spawn(async move {
        tracing::debug!(node = %name, "sink task started");
        events.send_node_started(&name);

        let mut buffers_processed: u64 = 0;

        if let Some(rx) = inputs.into_iter().next() {
            loop {
                match rx.recv().await {
                    Ok(Message::Buffer(buffer)) => {
                        buffers_processed += 1;
                        if let Err(e) = element.consume(buffer) {
                            tracing::error!(node = %name, error = %e, "sink error");
                            events.send_error(e.to_string(), Some(name.clone()));
                            return Err(e);
                        }
                    }
                    Ok(Message::Eos) => {
                        tracing::debug!(node = %name, "sink received EOS");
                        if let Err(e) = element.end_of_stream() {
                            events.send_error(e.to_string(), Some(name.clone()));
                            return Err(e);
                        }
                        break;
                    }
                    Err(_) => {
                        tracing::debug!(node = %name, "channel closed");
                        break;
                    }
                }
            }
        }

        events.send_node_finished(&name, buffers_processed);
        Ok(())
    })
}

fn spawn_transform_task(
    name: String,
    mut element: Box<dyn ElementDyn>,
    inputs: Vec<AsyncReceiver<Message>>,
    outputs: Vec<AsyncSender<Message>>,
    events: EventSender,
) -> JoinHandle<Result<()>> {
    tokio::spawn(async move {
        tracing::debug!(node = %name, "transform task started");
        events.send_node_started(&name);

        let mut buffers_processed: u64 = 0;

        if let Some(rx) = inputs.into_iter().next() {
            loop {
                match rx.recv().await {
                    Ok(Message::Buffer(buffer)) => {
                        buffers_processed += 1;
                        match element.transform(buffer) {
                            Ok(output) => {
                                for out_buffer in output {
                                    for tx in &outputs {
                                        if tx
                                            .send(Message::Buffer(out_buffer.clone()))
                                            .await
                                            .is_err()
                                        {
                                            tracing::warn!(
                                                node = %name,
                                                "downstream receiver dropped"
                                            );
                                        }
                                    }
                                }
                            }
                            Err(e) => {
                                tracing::error!(node = %name, error = %e, "transform error");
                                events.send_error(e.to_string(), Some(name.clone()));
                                return Err(e);
                            }
                        }
                    }
                    Ok(Message::Eos) => {
                        tracing::debug!(node = %name, "transform received EOS");
                        if let Ok(output) = element.flush() {
                            for out_buffer in output {
                                for tx in &outputs {
                                    let _ = tx.send(Message::Buffer(out_buffer.clone())).await;
                                }
                            }
                        }
                        for tx in &outputs {
                            let _ = tx.send(Message::Eos).await;
                        }
                        break;
                    }
                    Err(_) => {
                        for tx in &outputs {
                            let _ = tx.send(Message::Eos).await;
                        }
                        break;
                    }
                }
            }
        }

        events.send_node_finished(&name, buffers_processed);
        Ok(())
    })
}

/// Demuxer task: route buffers to dynamically resolved pads.
///
/// The element reports discovered pads through its pad-added callback; the
/// task drains those notifications after each `demux` call, resolves them
/// through the router, and forwards routed buffers only on resolved pads.
fn spawn_demuxer_task(
    name: String,
    mut element: Box<dyn ElementDyn>,
    inputs: Vec<AsyncReceiver<Message>>,
    route_senders: HashMap<NodeId, AsyncSender<Message>>,
    mut router: PadRouter,
    events: EventSender,
) -> JoinHandle<Result<()>> {
    // Discovered pads land here from the element's callback; the callback
    // runs on this task inside `demux`, the Mutex is for the Send bound.
    let pending: Arc<Mutex<Vec<(PadId, Caps)>>> = Arc::new(Mutex::new(Vec::new()));
    {
        let pending = Arc::clone(&pending);
        element.on_pad_added(Box::new(move |pad, caps| {
            if let Ok(mut queue) = pending.lock() {
                queue.push((pad, caps));
            }
        }));
    }

    tokio::spawn(async move {
        tracing::debug!(node = %name, "demuxer task started");
        events.send_node_started(&name);

        let mut buffers_processed: u64 = 0;
        let mut pad_senders: HashMap<PadId, AsyncSender<Message>> = HashMap::new();

        if let Some(rx) = inputs.into_iter().next() {
            loop {
                match rx.recv().await {
                    Ok(Message::Buffer(buffer)) => {
                        buffers_processed += 1;
                        let routed = match element.demux(buffer) {
                            Ok(routed) => routed,
                            Err(e) => {
                                tracing::error!(node = %name, error = %e, "demux error");
                                events.send_error(e.to_string(), Some(name.clone()));
                                return Err(e);
                            }
                        };

                        // Resolve any pads discovered during this demux call.
                        let discovered: Vec<(PadId, Caps)> = match pending.lock() {
                            Ok(mut queue) => queue.drain(..).collect(),
                            Err(_) => Vec::new(),
                        };
                        for (pad, caps) in discovered {
                            match router.resolve(pad, &caps) {
                                RouteDecision::Linked(target) => {
                                    if let Some(tx) = route_senders.get(&target) {
                                        pad_senders.insert(pad, tx.clone());
                                        tracing::info!(
                                            node = %name,
                                            caps = %caps,
                                            "pad linked"
                                        );
                                        events.send(PipelineEvent::PadAdded {
                                            node: name.clone(),
                                            caps,
                                        });
                                    } else {
                                        events.send(PipelineEvent::Warning {
                                            message: "route target has no channel".into(),
                                            node: Some(name.clone()),
                                        });
                                    }
                                }
                                RouteDecision::AlreadyLinked(_) => {
                                    tracing::info!(node = %name, "pad already linked, ignoring");
                                    events.send(PipelineEvent::PadIgnored {
                                        node: name.clone(),
                                    });
                                }
                                RouteDecision::NoMatch => {
                                    tracing::warn!(node = %name, caps = %caps, "no route for pad");
                                    events.send(PipelineEvent::Warning {
                                        message: format!("no route for pad with caps {}", caps),
                                        node: Some(name.clone()),
                                    });
                                }
                            }
                        }

                        for (pad, out_buffer) in routed {
                            match pad_senders.get(&pad) {
                                Some(tx) => {
                                    if tx.send(Message::Buffer(out_buffer)).await.is_err() {
                                        tracing::warn!(node = %name, "route receiver dropped");
                                    }
                                }
                                None => {
                                    tracing::trace!(node = %name, ?pad, "dropping unrouted buffer");
                                }
                            }
                        }
                    }
                    Ok(Message::Eos) | Err(_) => {
                        tracing::debug!(node = %name, "demuxer received EOS");
                        // Emit partially assembled payloads before EOS.
                        if let Ok(routed) = element.demux_flush() {
                            for (pad, out_buffer) in routed {
                                if let Some(tx) = pad_senders.get(&pad) {
                                    let _ = tx.send(Message::Buffer(out_buffer)).await;
                                }
                            }
                        }
                        for tx in route_senders.values() {
                            let _ = tx.send(Message::Eos).await;
                        }
                        break;
                    }
                }
            }
        }

        events.send_node_finished(&name, buffers_processed);
        Ok(())
    })
}

/// Muxer task: merge named input pads into one output stream.
///
/// Per-pad forwarder tasks funnel into a single merged channel; the muxer
/// drains it, tagging each buffer with its pad, and emits trailing output
/// once every input pad has delivered EOS.
fn spawn_muxer_task(
    name: String,
    mut element: Box<dyn ElementDyn>,
    inputs_by_pad: HashMap<String, Vec<AsyncReceiver<Message>>>,
    outputs: Vec<AsyncSender<Message>>,
    events: EventSender,
    channel_capacity: usize,
) -> JoinHandle<Result<()>> {
    tokio::spawn(async move {
        tracing::debug!(node = %name, "muxer task started");
        events.send_node_started(&name);

        let (merged_tx, merged_rx) = bounded_async::<(String, Message)>(channel_capacity);

        let mut total_inputs = 0usize;
        for (pad_name, receivers) in inputs_by_pad {
            for rx in receivers {
                total_inputs += 1;
                let pad = pad_name.clone();
                let tx = merged_tx.clone();
                tokio::spawn(async move {
                    loop {
                        match rx.recv().await {
                            Ok(Message::Buffer(buffer)) => {
                                if tx.send((pad.clone(), Message::Buffer(buffer))).await.is_err() {
                                    break;
                                }
                            }
                            Ok(Message::Eos) | Err(_) => {
                                let _ = tx.send((pad.clone(), Message::Eos)).await;
                                break;
                            }
                        }
                    }
                });
            }
        }
        drop(merged_tx);

        let mut buffers_processed: u64 = 0;
        let mut eos_count = 0usize;

        while eos_count < total_inputs {
            match merged_rx.recv().await {
                Ok((pad, Message::Buffer(buffer))) => {
                    buffers_processed += 1;
                    match element.mux(&pad, buffer) {
                        Ok(output) => {
                            for out_buffer in output {
                                for tx in &outputs {
                                    if tx.send(Message::Buffer(out_buffer.clone())).await.is_err()
                                    {
                                        tracing::warn!(node = %name, "downstream receiver dropped");
                                    }
                                }
                            }
                        }
                        Err(e) => {
                            tracing::error!(node = %name, error = %e, "mux error");
                            events.send_error(e.to_string(), Some(name.clone()));
                            return Err(e);
                        }
                    }
                }
                Ok((_, Message::Eos)) => {
                    eos_count += 1;
                }
                Err(_) => break,
            }
        }

        // All inputs finished; emit trailing output and EOS downstream.
        match element.finish() {
            Ok(output) => {
                for out_buffer in output {
                    for tx in &outputs {
                        let _ = tx.send(Message::Buffer(out_buffer.clone())).await;
                    }
                }
            }
            Err(e) => {
                events.send_error(e.to_string(), Some(name.clone()));
                return Err(e);
            }
        }
        for tx in &outputs {
            let _ = tx.send(Message::Eos).await;
        }

        events.send_node_finished(&name, buffers_processed);
        Ok(())
    })
}
