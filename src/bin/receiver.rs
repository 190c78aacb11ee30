//! Transport stream receiver.
//!
//! Receives an MPEG transport stream over UDP, splits it back into its
//! video and KLV telemetry branches, and prints each telemetry packet with
//! its presentation timestamp against wall-clock time:
//!
//! ```text
//!                      ┌─ queue (leaky) ─ h264parse ─ nullsink
//! udpsrc :5000 ─ tsdemux
//!                      └─ queue ─ appsink (print KLV + PTS)
//! ```
//!
//! The demuxer's pads appear only once the PMT is seen; a router links the
//! video family to the video queue and the metadata family to the data
//! queue. The control loop runs until a fatal error, like a live receiver.

use tracing_subscriber::EnvFilter;
use weft::element::{FlowStatus, SinkAdapter};
use weft::elements::app::AppSink;
use weft::elements::metadata::KlvPacket;
use weft::format::FormatFamily;
use weft::pipeline::{ElementConfig, Executor, GraphBuilder, PadRouter, TerminalEvent};

const LISTEN_PORT: i64 = 5000;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let data_sink = AppSink::new()
        .with_name("data-sink")
        .drop_on_full(true)
        .on_sample(Box::new(|sample| {
            let wall_sec = sample.wall_clock_micros as f64 / 1_000_000.0;
            let size = sample.buffer.len();
            match KlvPacket::parse(sample.buffer.as_bytes()) {
                Ok(packet) => {
                    println!(
                        "RECEIVER: Real time: {:.6} sec | KLV {} entries ({} bytes) PTS: {}",
                        wall_sec,
                        packet.entries.len(),
                        size,
                        sample.pts()
                    );
                }
                Err(e) => {
                    println!(
                        "RECEIVER: Real time: {:.6} sec | undecodable KLV ({} bytes): {}",
                        wall_sec, size, e
                    );
                }
            }
            FlowStatus::Ok
        }));

    let mut pipeline = match GraphBuilder::new()
        .element(
            "udp",
            "udpsrc",
            ElementConfig::new()
                .set("port", LISTEN_PORT)
                .set("timeout-ms", 100_i64),
        )
        .element("demux", "tsdemux", ElementConfig::new())
        .element(
            "video-queue",
            "queue",
            ElementConfig::new()
                .set("max-size-buffers", 5_i64)
                .set("leaky", true),
        )
        .element("video-parse", "h264parse", ElementConfig::new())
        .element("video-sink", "nullsink", ElementConfig::new())
        .element("data-queue", "queue", ElementConfig::new())
        .instance("data-sink", Box::new(SinkAdapter::new(data_sink)))
        .link("udp", "demux")
        .link("video-queue", "video-parse")
        .link("video-parse", "video-sink")
        .link("data-queue", "data-sink")
        .build()
    {
        Ok(pipeline) => pipeline,
        Err(e) => {
            eprintln!("failed to build pipeline: {}", e);
            std::process::exit(-1);
        }
    };

    let video_queue = pipeline.get_node_id("video-queue");
    let data_queue = pipeline.get_node_id("data-queue");
    let (video_queue, data_queue) = match (video_queue, data_queue) {
        (Some(v), Some(d)) => (v, d),
        _ => {
            eprintln!("queue nodes missing");
            std::process::exit(-1);
        }
    };

    let router = PadRouter::new()
        .route(FormatFamily::Video, video_queue)
        .route(FormatFamily::Metadata, data_queue);

    let executor = Executor::new();
    let mut handle = match executor.start_with_router(&mut pipeline, router) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("failed to start pipeline: {}", e);
            std::process::exit(-1);
        }
    };

    println!("Receiving video + metadata on port {} ...", LISTEN_PORT);

    // Live receiver: only fatal errors end the loop.
    let mut events = handle.take_events();
    match events.wait_error().await {
        TerminalEvent::Error { message, node } => match node {
            Some(node) => eprintln!("Error in {}: {}", node, message),
            None => eprintln!("Error: {}", message),
        },
        TerminalEvent::Eos => {}
    }

    handle.shutdown();
    pipeline.shutdown();
}
