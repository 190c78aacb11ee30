//! Transport stream sender.
//!
//! Streams synthetic H.264 video and KLV telemetry, multiplexed into an
//! MPEG transport stream, over UDP to a fixed destination:
//!
//! ```text
//! h264testsrc ─ h264parse ─┐
//!                          ├─ tsmux ─ udpsink 127.0.0.1:5000
//! telemetrysrc ────────────┘
//! ```

use std::time::Duration;

use tracing_subscriber::EnvFilter;
use weft::element::SourceAdapter;
use weft::elements::metadata::TelemetrySrc;
use weft::elements::testing::H264TestSrc;
use weft::pipeline::{ElementConfig, Executor, GraphBuilder, TerminalEvent};

const DEST_HOST: &str = "127.0.0.1";
const DEST_PORT: i64 = 5000;

const VIDEO_FPS: u32 = 25;
const VIDEO_FRAMES: u64 = 500;
/// 5 telemetry packets per second.
const TELEMETRY_INTERVAL: Duration = Duration::from_millis(200);
const TELEMETRY_PACKETS: u64 = 100;

const MISSION_ID: &str = "DEMO_MISSION_001";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut pipeline = match GraphBuilder::new()
        .instance(
            "video",
            Box::new(SourceAdapter::new(
                H264TestSrc::new(VIDEO_FRAMES, VIDEO_FPS).live(true),
            )),
        )
        .element("parse", "h264parse", ElementConfig::new())
        .element("mux", "tsmux", ElementConfig::new())
        .element(
            "udp",
            "udpsink",
            ElementConfig::new().set("host", DEST_HOST).set("port", DEST_PORT),
        )
        .link("video", "parse")
        .link_pads("parse", "src", "mux", "video")
        .link("mux", "udp")
        .build()
    {
        Ok(pipeline) => pipeline,
        Err(e) => {
            eprintln!("failed to build pipeline: {}", e);
            std::process::exit(-1);
        }
    };

    // The telemetry branch stamps timestamps from the pipeline clock, so it
    // is added once the pipeline (and its clock) exists.
    let telemetry = TelemetrySrc::klv(TELEMETRY_INTERVAL, MISSION_ID)
        .with_clock(pipeline.clock())
        .with_limit(TELEMETRY_PACKETS);
    let telemetry_id = pipeline.add_node("telemetry", Box::new(SourceAdapter::new(telemetry)));

    let mux_id = match pipeline.get_node_id("mux") {
        Some(id) => id,
        None => {
            eprintln!("mux node missing");
            std::process::exit(-1);
        }
    };
    if let Err(e) = pipeline.link_pads(telemetry_id, "src", mux_id, "klv") {
        eprintln!("metadata branch linking failed: {}", e);
        std::process::exit(-1);
    }

    let executor = Executor::new();
    let mut handle = match executor.start(&mut pipeline) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("failed to start pipeline: {}", e);
            std::process::exit(-1);
        }
    };

    println!(
        "Streaming video + metadata to {}:{} ...",
        DEST_HOST, DEST_PORT
    );

    let mut events = handle.take_events();
    match events.wait_terminal().await {
        TerminalEvent::Eos => {
            println!("End-Of-Stream reached.");
        }
        TerminalEvent::Error { message, node } => {
            match node {
                Some(node) => eprintln!("Error in {}: {}", node, message),
                None => eprintln!("Error: {}", message),
            }
        }
    }

    handle.shutdown();
    pipeline.shutdown();
}
