//! Transport round-trip tests: mux → demux in-pipeline, and the UDP / RTP
//! transport legs over loopback sockets.

use std::time::Duration;

use weft::buffer::Buffer;
use weft::element::{Element, Produced, SinkAdapter, Source, SourceAdapter};
use weft::elements::codec::H264Parse;
use weft::elements::metadata::{KlvPacket, TelemetrySrc};
use weft::elements::network::{UdpSink, UdpSrc};
use weft::elements::rtp::{RtpH264Depay, RtpH264Pay, RtpSink, RtpSrc};
use weft::elements::testing::{CollectSink, H264TestSrc};
use weft::format::FormatFamily;
use weft::pipeline::{ElementConfig, Executor, GraphBuilder, PadRouter};

/// Deterministically regenerate the access units H264TestSrc + H264Parse
/// produce, for byte-exact comparison after a transport round trip.
fn expected_access_units(frames: u64, fps: u32) -> Vec<Buffer> {
    let mut src = H264TestSrc::new(frames, fps);
    let mut parse = H264Parse::new();
    let mut out = Vec::new();
    loop {
        match src.produce().unwrap() {
            Produced::Buffer(frame) => {
                out.extend(parse.transform(frame).unwrap());
            }
            Produced::Eos => break,
            Produced::WouldBlock => continue,
        }
    }
    out
}

#[tokio::test]
async fn mux_demux_round_trip_preserves_streams() {
    let video_sink = CollectSink::new();
    let video_collected = video_sink.handle();
    let data_sink = CollectSink::new();
    let data_collected = data_sink.handle();

    let mut pipeline = GraphBuilder::new()
        .instance(
            "video",
            Box::new(SourceAdapter::new(H264TestSrc::new(10, 25))),
        )
        .element("parse", "h264parse", ElementConfig::new())
        .element("mux", "tsmux", ElementConfig::new())
        .element("demux", "tsdemux", ElementConfig::new())
        .element("vq", "queue", ElementConfig::new())
        .element("dq", "queue", ElementConfig::new())
        .instance("vsink", Box::new(SinkAdapter::new(video_sink)))
        .instance("dsink", Box::new(SinkAdapter::new(data_sink)))
        .link("video", "parse")
        .link_pads("parse", "src", "mux", "video")
        .link("mux", "demux")
        .link("vq", "vsink")
        .link("dq", "dsink")
        .build()
        .unwrap();

    let telemetry = TelemetrySrc::klv(Duration::from_millis(5), "ROUNDTRIP")
        .with_clock(pipeline.clock())
        .with_limit(4);
    let telemetry_id = pipeline.add_node("telemetry", Box::new(SourceAdapter::new(telemetry)));
    let mux_id = pipeline.get_node_id("mux").unwrap();
    pipeline
        .link_pads(telemetry_id, "src", mux_id, "klv")
        .unwrap();

    let router = PadRouter::new()
        .route(FormatFamily::Video, pipeline.get_node_id("vq").unwrap())
        .route(FormatFamily::Metadata, pipeline.get_node_id("dq").unwrap());

    let executor = Executor::new();
    let handle = executor.start_with_router(&mut pipeline, router).unwrap();
    handle.wait().await.unwrap();
    pipeline.shutdown();

    // Video: every access unit comes back byte-exact with its PTS.
    let video = video_collected.lock().unwrap();
    let expected = expected_access_units(10, 25);
    assert_eq!(video.len(), expected.len());
    for (got, want) in video.iter().zip(expected.iter()) {
        assert_eq!(got.as_bytes(), want.as_bytes());
        // 25 fps PTS values are exact multiples of the 90 kHz clock
        assert_eq!(got.metadata().pts, want.metadata().pts);
    }

    // Metadata: all packets arrive, parseable, with non-decreasing PTS.
    let data = data_collected.lock().unwrap();
    assert_eq!(data.len(), 4);
    let mut last_pts = weft::clock::ClockTime::ZERO;
    for buffer in data.iter() {
        let packet = KlvPacket::parse(buffer.as_bytes()).unwrap();
        assert!(packet.timestamp_micros().is_some());
        let pts = buffer.metadata().pts;
        assert!(pts.is_some());
        assert!(pts >= last_pts);
        last_pts = pts;
    }
}

#[tokio::test]
async fn udp_transport_leg_delivers_ts() {
    // Receiver side binds first so the sender knows its destination.
    let udp_src = UdpSrc::bind("127.0.0.1:0")
        .unwrap()
        .with_read_timeout(Duration::from_millis(50))
        .unwrap();
    let port = udp_src.local_addr().unwrap().port();

    let video_sink = CollectSink::new();
    let video_collected = video_sink.handle();
    let data_sink = CollectSink::new();
    let data_collected = data_sink.handle();

    let mut receiver = GraphBuilder::new()
        .instance("udp", Box::new(SourceAdapter::new(udp_src)))
        .element("demux", "tsdemux", ElementConfig::new())
        .element("vq", "queue", ElementConfig::new())
        .element("dq", "queue", ElementConfig::new())
        .instance("vsink", Box::new(SinkAdapter::new(video_sink)))
        .instance("dsink", Box::new(SinkAdapter::new(data_sink)))
        .link("udp", "demux")
        .link("vq", "vsink")
        .link("dq", "dsink")
        .build()
        .unwrap();

    let router = PadRouter::new()
        .route(FormatFamily::Video, receiver.get_node_id("vq").unwrap())
        .route(FormatFamily::Metadata, receiver.get_node_id("dq").unwrap());

    let executor = Executor::new();
    let receiver_handle = executor.start_with_router(&mut receiver, router).unwrap();

    // Sender pipeline: video + telemetry muxed onto the wire.
    let udp_sink = UdpSink::connect(("127.0.0.1", port)).unwrap();
    let mut sender = GraphBuilder::new()
        .instance(
            "video",
            Box::new(SourceAdapter::new(H264TestSrc::new(10, 25))),
        )
        .element("parse", "h264parse", ElementConfig::new())
        .element("mux", "tsmux", ElementConfig::new())
        .instance("udp", Box::new(SinkAdapter::new(udp_sink)))
        .link("video", "parse")
        .link_pads("parse", "src", "mux", "video")
        .link("mux", "udp")
        .build()
        .unwrap();

    let telemetry = TelemetrySrc::klv(Duration::from_millis(5), "UDP_LEG")
        .with_clock(sender.clock())
        .with_limit(5);
    let telemetry_id = sender.add_node("telemetry", Box::new(SourceAdapter::new(telemetry)));
    let mux_id = sender.get_node_id("mux").unwrap();
    sender.link_pads(telemetry_id, "src", mux_id, "klv").unwrap();

    Executor::new().run(&mut sender).await.unwrap();

    // Give the receiver time to drain the socket, then stop it.
    tokio::time::sleep(Duration::from_millis(300)).await;
    receiver_handle.shutdown();
    let _ = receiver_handle.wait().await;
    receiver.shutdown();

    let video = video_collected.lock().unwrap();
    assert!(!video.is_empty(), "no video delivered over UDP");
    for buffer in video.iter() {
        assert_eq!(&buffer.as_bytes()[..4], &[0, 0, 0, 1]);
    }

    let data = data_collected.lock().unwrap();
    assert!(!data.is_empty(), "no telemetry delivered over UDP");
    for buffer in data.iter() {
        KlvPacket::parse(buffer.as_bytes()).unwrap();
    }
}

#[tokio::test]
async fn rtp_transport_leg_delivers_h264() {
    let rtp_src = RtpSrc::bind("127.0.0.1:0")
        .unwrap()
        .with_read_timeout(Duration::from_millis(50))
        .unwrap();
    let port = rtp_src.local_addr().unwrap().port();

    let sink = CollectSink::new();
    let collected = sink.handle();

    let mut receiver = GraphBuilder::new()
        .instance("rtp", Box::new(SourceAdapter::new(rtp_src)))
        .instance(
            "depay",
            Box::new(weft::element::ElementAdapter::new(RtpH264Depay::new())),
        )
        .instance("sink", Box::new(SinkAdapter::new(sink)))
        .link("rtp", "depay")
        .link("depay", "sink")
        .build()
        .unwrap();

    let executor = Executor::new();
    let receiver_handle = executor.start(&mut receiver).unwrap();

    let rtp_sink = RtpSink::connect(("127.0.0.1", port)).unwrap();
    let mut sender = GraphBuilder::new()
        .instance(
            "video",
            Box::new(SourceAdapter::new(H264TestSrc::new(5, 25))),
        )
        .element("parse", "h264parse", ElementConfig::new())
        .instance(
            "pay",
            Box::new(weft::element::ElementAdapter::new(RtpH264Pay::new())),
        )
        .instance("udp", Box::new(SinkAdapter::new(rtp_sink)))
        .link("video", "parse")
        .link("parse", "pay")
        .link("pay", "udp")
        .build()
        .unwrap();

    Executor::new().run(&mut sender).await.unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    receiver_handle.shutdown();
    let _ = receiver_handle.wait().await;
    receiver.shutdown();

    let frames = collected.lock().unwrap();
    assert!(!frames.is_empty(), "no frames delivered over RTP");
    for buffer in frames.iter() {
        // Depayloaded output is Annex B
        assert_eq!(&buffer.as_bytes()[..4], &[0, 0, 0, 1]);
    }
}
