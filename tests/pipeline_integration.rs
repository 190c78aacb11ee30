//! End-to-end pipeline tests: construction, execution, events, teardown.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use weft::buffer::Buffer;
use weft::element::{
    Demuxer, DemuxerAdapter, PadAddedCallback, PadId, RoutedOutput, SinkAdapter, SourceAdapter,
};
use weft::elements::metadata::TelemetrySrc;
use weft::elements::testing::CollectSink;
use weft::error::{Error, Result};
use weft::format::{Caps, FormatFamily};
use weft::pipeline::{
    ElementConfig, Executor, GraphBuilder, PadRouter, PipelineEvent, PipelineState, TerminalEvent,
};

#[tokio::test]
async fn linear_pipeline_runs_to_eos() {
    let sink = CollectSink::new();
    let collected = sink.handle();

    let mut pipeline = GraphBuilder::new()
        .element(
            "src",
            "testsrc",
            ElementConfig::new().set("num-buffers", 10_i64),
        )
        .element("q", "queue", ElementConfig::new())
        .instance("sink", Box::new(SinkAdapter::new(sink)))
        .link("src", "q")
        .link("q", "sink")
        .build()
        .unwrap();

    let executor = Executor::new();
    let mut handle = executor.start(&mut pipeline).unwrap();
    assert_eq!(pipeline.state(), PipelineState::Running);

    let mut events = handle.take_events();
    let terminal = events.wait_terminal().await;
    assert!(matches!(terminal, TerminalEvent::Eos));

    handle.wait().await.unwrap();
    assert!(pipeline.shutdown());
    assert_eq!(pipeline.state(), PipelineState::Stopped);

    let buffers = collected.lock().unwrap();
    assert_eq!(buffers.len(), 10);
    for (i, buffer) in buffers.iter().enumerate() {
        assert_eq!(buffer.metadata().sequence, i as u64);
    }
}

#[tokio::test]
async fn runtime_error_tears_down_exactly_once() {
    let sink = CollectSink::new().fail_after(3);

    let mut pipeline = GraphBuilder::new()
        .element(
            "src",
            "testsrc",
            ElementConfig::new().set("num-buffers", 100_i64),
        )
        .instance("sink", Box::new(SinkAdapter::new(sink)))
        .link("src", "sink")
        .build()
        .unwrap();

    let executor = Executor::new();
    let mut handle = executor.start(&mut pipeline).unwrap();

    let mut events = handle.take_events();
    match events.wait_terminal().await {
        TerminalEvent::Error { message, node } => {
            assert!(message.contains("injected failure"));
            assert_eq!(node.as_deref(), Some("sink"));
        }
        TerminalEvent::Eos => panic!("expected an error terminal"),
    }

    handle.shutdown();
    assert!(pipeline.shutdown());
    // A second teardown is a no-op.
    assert!(!pipeline.shutdown());
    assert_eq!(pipeline.state(), PipelineState::Stopped);
}

#[tokio::test]
async fn executor_run_reports_element_error() {
    let sink = CollectSink::new().fail_after(0);

    let mut pipeline = GraphBuilder::new()
        .element(
            "src",
            "testsrc",
            ElementConfig::new().set("num-buffers", 5_i64),
        )
        .instance("sink", Box::new(SinkAdapter::new(sink)))
        .link("src", "sink")
        .build()
        .unwrap();

    let result = Executor::new().run(&mut pipeline).await;
    assert!(matches!(result, Err(Error::Element(_))));
    assert_eq!(pipeline.state(), PipelineState::Stopped);
}

#[test]
fn unknown_element_kind_fails_with_creation_error() {
    let result = GraphBuilder::new()
        .element("src", "v4l2src", ElementConfig::new())
        .build();
    assert!(matches!(result, Err(Error::Creation(_))));
}

#[test]
fn incompatible_caps_fail_with_link_error() {
    // KLV telemetry cannot feed an H.264 parser.
    let telemetry = TelemetrySrc::klv(Duration::from_millis(10), "M");
    let result = GraphBuilder::new()
        .instance("telemetry", Box::new(SourceAdapter::new(telemetry)))
        .element("parse", "h264parse", ElementConfig::new())
        .element("sink", "nullsink", ElementConfig::new())
        .link("telemetry", "parse")
        .link("parse", "sink")
        .build();
    assert!(matches!(result, Err(Error::Link(_))));
}

/// A demuxer that announces the same pad on every buffer, then routes
/// everything to it. Exercises the router's idempotency path end to end.
struct RepeatingPadDemux {
    callback: Option<PadAddedCallback>,
}

impl RepeatingPadDemux {
    fn new() -> Self {
        Self { callback: None }
    }
}

impl Demuxer for RepeatingPadDemux {
    fn demux(&mut self, buffer: Buffer) -> Result<RoutedOutput> {
        // Announce the pad again for every buffer; only the first
        // notification may create a link.
        if let Some(callback) = self.callback.as_mut() {
            callback(PadId::new(0), Caps::klv());
        }
        Ok(RoutedOutput::single(PadId::new(0), buffer))
    }

    fn outputs(&self) -> Vec<(PadId, Caps)> {
        vec![(PadId::new(0), Caps::klv())]
    }

    fn on_pad_added(&mut self, callback: PadAddedCallback) {
        self.callback = Some(callback);
    }

    fn name(&self) -> &str {
        "repeating-demux"
    }
}

#[tokio::test]
async fn duplicate_pad_notifications_link_once() {
    let sink = CollectSink::new();
    let collected = sink.handle();

    let mut pipeline = GraphBuilder::new()
        .element(
            "src",
            "testsrc",
            ElementConfig::new().set("num-buffers", 4_i64),
        )
        .instance("demux", Box::new(DemuxerAdapter::new(RepeatingPadDemux::new())))
        .instance("sink", Box::new(SinkAdapter::new(sink)))
        .link("src", "demux")
        .build()
        .unwrap();

    let target = pipeline.get_node_id("sink").unwrap();
    let router = PadRouter::new().route(FormatFamily::Metadata, target);

    let executor = Executor::new();
    let mut handle = executor.start_with_router(&mut pipeline, router).unwrap();

    let mut events = handle.take_events();
    let mut pad_added = 0;
    let mut pad_ignored = 0;
    loop {
        match events.recv().await {
            Some(PipelineEvent::PadAdded { .. }) => pad_added += 1,
            Some(PipelineEvent::PadIgnored { .. }) => pad_ignored += 1,
            Some(PipelineEvent::Eos) => break,
            Some(PipelineEvent::Error { message, .. }) => panic!("pipeline error: {}", message),
            Some(_) => continue,
            None => panic!("event channel closed before EOS"),
        }
    }

    // Four notifications: one link, three informational ignores.
    assert_eq!(pad_added, 1);
    assert_eq!(pad_ignored, 3);

    handle.wait().await.unwrap();
    // Every buffer flowed through the single link.
    assert_eq!(collected.lock().unwrap().len(), 4);
}

#[tokio::test]
async fn telemetry_sequence_and_pts_survive_pipeline() {
    let sink = CollectSink::new();
    let collected = sink.handle();

    let telemetry = TelemetrySrc::klv(Duration::from_millis(5), "SEQ_TEST").with_limit(8);

    let mut pipeline = GraphBuilder::new()
        .instance("telemetry", Box::new(SourceAdapter::new(telemetry)))
        .element("q", "queue", ElementConfig::new())
        .instance("sink", Box::new(SinkAdapter::new(sink)))
        .link("telemetry", "q")
        .link("q", "sink")
        .build()
        .unwrap();

    Executor::new().run(&mut pipeline).await.unwrap();

    let buffers = collected.lock().unwrap();
    assert_eq!(buffers.len(), 8);

    let mut last_seq: Option<u64> = None;
    let mut last_pts = weft::clock::ClockTime::ZERO;
    for buffer in buffers.iter() {
        let meta = buffer.metadata();
        if let Some(prev) = last_seq {
            assert!(meta.sequence > prev, "sequence must strictly increase");
        }
        last_seq = Some(meta.sequence);

        assert!(meta.pts.is_some());
        assert!(meta.pts >= last_pts, "pts must not regress");
        last_pts = meta.pts;

        assert!(meta.flags.sparse);
    }
}

#[tokio::test]
async fn appsrc_feeds_pipeline_from_application_thread() {
    let app_src = weft::elements::app::AppSrc::new().with_name("app-src");
    let push_handle = app_src.handle();

    let sink = CollectSink::new();
    let collected = sink.handle();

    let mut pipeline = GraphBuilder::new()
        .instance("src", Box::new(SourceAdapter::new(app_src)))
        .element("q", "queue", ElementConfig::new())
        .instance("sink", Box::new(SinkAdapter::new(sink)))
        .link("src", "q")
        .link("q", "sink")
        .build()
        .unwrap();

    let executor = Executor::new();
    let mut handle = executor.start(&mut pipeline).unwrap();

    let producer = std::thread::spawn(move || {
        for i in 0..5u64 {
            let buffer = Buffer::from_vec(
                vec![i as u8; 32],
                weft::metadata::Metadata::from_sequence(i),
            );
            push_handle.push_buffer(buffer).unwrap();
            std::thread::sleep(Duration::from_millis(2));
        }
        push_handle.end_stream();
    });

    let mut events = handle.take_events();
    assert!(matches!(events.wait_terminal().await, TerminalEvent::Eos));
    producer.join().unwrap();
    handle.wait().await.unwrap();
    pipeline.shutdown();

    let buffers = collected.lock().unwrap();
    assert_eq!(buffers.len(), 5);
    assert!(buffers.iter().enumerate().all(|(i, b)| b.metadata().sequence == i as u64));
}

#[tokio::test]
async fn shutdown_is_idempotent_under_concurrent_calls() {
    let mut pipeline = GraphBuilder::new()
        .element(
            "src",
            "testsrc",
            ElementConfig::new().set("num-buffers", 1000_i64),
        )
        .element("sink", "nullsink", ElementConfig::new())
        .link("src", "sink")
        .build()
        .unwrap();

    let executor = Executor::new();
    let handle = executor.start(&mut pipeline).unwrap();

    // Stop mid-flight from two call sites.
    handle.shutdown();
    handle.shutdown();
    let _ = handle.wait().await;

    let torn_down = Arc::new(Mutex::new(0u32));
    if pipeline.shutdown() {
        *torn_down.lock().unwrap() += 1;
    }
    if pipeline.shutdown() {
        *torn_down.lock().unwrap() += 1;
    }
    assert_eq!(*torn_down.lock().unwrap(), 1);
}
