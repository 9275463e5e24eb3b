use std::io::Cursor;
use std::sync::atomic::AtomicBool;
use std::sync::mpsc;
use std::thread;

use image::{DynamicImage, ImageFormat, RgbImage};

use obstacle_pilot::control::{RecordingPacer, RecordingSink, SinkEvent};
use obstacle_pilot::transport::channel;
use obstacle_pilot::{
    AuthKey, ControlError, ControlLoop, DeckConfig, DeckSource, FlightPlan, ImageFrame,
    PerceptionPipeline, RollingSmoother, SignalListener, SignalSender, StubClassifier,
    TransportError, VelocityPolicy,
};

fn jpeg(shade: u8) -> Vec<u8> {
    let img = RgbImage::from_pixel(16, 12, image::Rgb([shade, shade / 2, 0]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Jpeg)
        .expect("encode jpeg");
    out.into_inner()
}

/// Six frames with noise before, between and after them.
fn deck_stream() -> Vec<u8> {
    let mut stream = vec![0x00, 0x13, 0xFF, 0xD9, 0x42];
    for i in 0..6u8 {
        stream.extend_from_slice(&jpeg(i * 40));
        stream.extend_from_slice(&[0x55; 7]);
    }
    stream.extend_from_slice(&[0xFF, 0xD8, 0x01, 0x02]);
    stream
}

fn deck(chunk_size: usize) -> DeckSource<Cursor<Vec<u8>>> {
    let config = DeckConfig {
        chunk_size,
        ..DeckConfig::default()
    };
    DeckSource::from_reader(Cursor::new(deck_stream()), "test-deck", &config)
}

fn obstacle_then_clear() -> StubClassifier {
    StubClassifier::scripted([0.9, 0.9, 0.9, 0.9, 0.9, 0.1])
}

#[test]
fn deck_frames_drive_hover_then_cruise() {
    let (tx, mut rx) = channel();
    let mut pipeline = PerceptionPipeline::new(obstacle_then_clear(), RollingSmoother::new(5), tx);

    let stats = pipeline
        .run(deck(13), &AtomicBool::new(false))
        .expect("perception run");
    assert_eq!(stats.frames, 6);
    assert_eq!(stats.decode_failures, 0);
    assert_eq!(stats.samples, 6);
    assert_eq!(stats.signals_sent, 2);
    drop(pipeline);

    let plan = FlightPlan {
        cruise_steps: 1,
        ..FlightPlan::default()
    };
    let mut control = ControlLoop::with_pacer(
        plan,
        VelocityPolicy::threshold(),
        RecordingSink::new(),
        RecordingPacer::default(),
    );
    let report = control.run(&mut rx).expect("flight");

    assert_eq!(report.signals_received, 2);
    assert_eq!(report.hover_ticks, 1);
    assert_eq!(report.cruise_steps, 1);

    let setpoints = control.sink().setpoints();
    assert_eq!(setpoints.len(), 20 + 2 + 20);
    // p = 4.5 / 5 = 0.9 hovers; p = 3.7 / 5 = 0.74 flies.
    assert_eq!(setpoints[20].vx, 0.0);
    assert_eq!(setpoints[20].z, 0.8);
    assert_eq!(setpoints[21].vx, 0.35);
    assert_eq!(setpoints.last().map(|sp| sp.z), Some(0.0));
}

#[test]
fn extraction_does_not_depend_on_read_size() {
    let sums = |chunk: usize| -> Vec<f64> {
        let (tx, mut rx) = channel();
        let mut pipeline =
            PerceptionPipeline::new(obstacle_then_clear(), RollingSmoother::new(5), tx);
        pipeline
            .run(deck(chunk), &AtomicBool::new(false))
            .expect("perception run");
        drop(pipeline);
        std::iter::from_fn(|| obstacle_pilot::SignalSource::recv(&mut rx).ok()).collect()
    };

    let reference = sums(512);
    assert_eq!(reference.len(), 2);
    assert!((reference[0] - 4.5).abs() < 1e-5);
    assert!((reference[1] - 3.7).abs() < 1e-5);
    for chunk in [1, 2, 3, 64, 4096] {
        assert_eq!(sums(chunk), reference, "chunk size {}", chunk);
    }
}

#[test]
fn flight_over_authenticated_tcp_link() {
    let key = AuthKey::from("crazyflie");
    let listener = SignalListener::bind("127.0.0.1:0", key.clone()).expect("bind");
    let addr = listener.local_addr().expect("local addr");

    let pilot = thread::spawn(move || {
        let mut signals = listener.accept().expect("accept");
        let plan = FlightPlan {
            cruise_steps: 1,
            ..FlightPlan::default()
        };
        let mut control = ControlLoop::with_pacer(
            plan,
            VelocityPolicy::threshold(),
            RecordingSink::new(),
            RecordingPacer::default(),
        );
        let result = control.run(&mut signals).map(|report| report.cruise_steps);
        (result, control.into_parts().0)
    });

    let link = SignalSender::connect(addr, &key).expect("connect");
    let mut pipeline = PerceptionPipeline::new(obstacle_then_clear(), RollingSmoother::new(5), link);
    pipeline
        .run(deck(512), &AtomicBool::new(false))
        .expect("perception run");
    drop(pipeline);

    let (result, sink) = pilot.join().expect("pilot thread");
    assert_eq!(result.expect("flight"), 1);
    assert_eq!(sink.events.last(), Some(&SinkEvent::Stop));
}

#[test]
fn perception_ends_cleanly_after_pilot_lands() {
    let key = AuthKey::from("crazyflie");
    let listener = SignalListener::bind("127.0.0.1:0", key.clone()).expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let (landed_tx, landed_rx) = mpsc::channel();

    let pilot = thread::spawn(move || {
        let mut signals = listener.accept().expect("accept");
        let plan = FlightPlan {
            cruise_steps: 1,
            window: 1,
            ..FlightPlan::default()
        };
        let mut control = ControlLoop::with_pacer(
            plan,
            VelocityPolicy::threshold(),
            RecordingSink::new(),
            RecordingPacer::default(),
        );
        let result = control.run(&mut signals).map(|report| report.cruise_steps);
        drop(signals);
        let _ = landed_tx.send(());
        result
    });

    // Two frames before the pilot lands, six more after it has hung up.
    let after_landing = std::iter::once_with(move || {
        let _ = landed_rx.recv();
    })
    .filter_map(|_| None::<anyhow::Result<ImageFrame>>);
    let frames = deck(512).take(2).chain(after_landing).chain(deck(512));

    let link = SignalSender::connect(addr, &key).expect("connect");
    let mut pipeline =
        PerceptionPipeline::new(StubClassifier::constant(0.1), RollingSmoother::new(1), link);
    let stats = pipeline
        .run(frames, &AtomicBool::new(false))
        .expect("hang-up after landing is not an error");

    assert_eq!(pilot.join().expect("pilot thread").expect("flight"), 1);
    assert!(stats.signals_sent < 8);
}

#[test]
fn perception_exit_mid_cruise_lands_the_vehicle() {
    let key = AuthKey::from("crazyflie");
    let listener = SignalListener::bind("127.0.0.1:0", key.clone()).expect("bind");
    let addr = listener.local_addr().expect("local addr");

    let pilot = thread::spawn(move || {
        let mut signals = listener.accept().expect("accept");
        let mut control = ControlLoop::with_pacer(
            FlightPlan::default(),
            VelocityPolicy::low_pass(),
            RecordingSink::new(),
            RecordingPacer::default(),
        );
        let result = control.run(&mut signals);
        (result, control.into_parts().0)
    });

    let link = SignalSender::connect(addr, &key).expect("connect");
    let mut pipeline = PerceptionPipeline::new(obstacle_then_clear(), RollingSmoother::new(5), link);
    pipeline
        .run(deck(512), &AtomicBool::new(false))
        .expect("perception run");
    drop(pipeline);

    let (result, sink) = pilot.join().expect("pilot thread");
    assert!(matches!(
        result,
        Err(ControlError::Transport(TransportError::Closed))
    ));
    let setpoints = sink.setpoints();
    // takeoff, two cruise steps, hold, landing ramp
    assert_eq!(setpoints.len(), 20 + 2 + 1 + 20);
    assert_eq!(setpoints.last().map(|sp| sp.z), Some(0.0));
    assert_eq!(sink.events.last(), Some(&SinkEvent::Stop));
}

#[test]
fn wrong_key_is_rejected_before_any_signal() {
    let listener = SignalListener::bind("127.0.0.1:0", AuthKey::from("crazyflie")).expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let pilot = thread::spawn(move || listener.accept().map(|_| ()));

    let connected = SignalSender::connect(addr, &AuthKey::from("not-the-key"));
    assert!(connected.is_err());
    assert!(pilot.join().expect("pilot thread").is_err());
}
