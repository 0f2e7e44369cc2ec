//! Command engine against a recording device.

mod common;

use std::sync::Arc;

use common::{engine_with, RecordingDevice};
use lightmanager_gateway::{ClientSession, CommandEngine, Outcome, PlainSink};
use lightmanager_protocol::{
    FS20_OFF, FS20_ON, OP_CLOCK_COMMIT, OP_FS20, OP_GET_CLOCK, OP_SCENE, OP_SET_CLOCK,
};

fn run(engine: &CommandEngine, session: &mut ClientSession, line: &str) -> (String, Outcome) {
    let mut sink = PlainSink::new(Vec::new());
    let outcome = engine.execute(line, session, &mut sink).unwrap();
    (String::from_utf8(sink.into_inner()).unwrap(), outcome)
}

#[test]
fn test_out_of_range_scene_sends_nothing() {
    let (device, recorder) = RecordingDevice::new();
    let engine = engine_with(Box::new(device));
    let mut session = ClientSession::new("test");

    let (out, outcome) = run(&engine, &mut session, "SCENE 300");
    assert_eq!(outcome, Outcome::Continue);
    assert!(out.starts_with("SCENE 300: ERROR - "), "{out}");
    assert!(recorder.frames().is_empty());
    assert_eq!(session.failures(), 1);

    let (out, _) = run(&engine, &mut session, "SCENE 254");
    assert_eq!(out, "SCENE 254: OK\r\n");
    let frames = recorder.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0][0], OP_SCENE);
}

#[test]
fn test_non_numeric_scene_is_unknown_parameter() {
    let (device, recorder) = RecordingDevice::new();
    let engine = engine_with(Box::new(device));
    let mut session = ClientSession::new("test");

    let (out, _) = run(&engine, &mut session, "SCENE abc");
    assert_eq!(out, "SCENE abc: ERROR - unknown <scene> parameter 'abc'\r\n");
    assert!(recorder.frames().is_empty());
}

#[test]
fn test_commands_reach_device_in_order() {
    let (device, recorder) = RecordingDevice::new();
    let engine = engine_with(Box::new(device));
    let mut session = ClientSession::new("test");

    let (out, _) = run(&engine, &mut session, "FS20 1111 ON; FS20 1112 OFF");
    assert_eq!(out, "FS20 1111 ON: OK\r\nFS20 1112 OFF: OK\r\n");

    let frames = recorder.frames();
    assert_eq!(frames.len(), 2);
    assert!(frames.iter().all(|frame| frame[0] == OP_FS20));
    assert_eq!((frames[0][3], frames[0][4]), (0x00, FS20_ON));
    assert_eq!((frames[1][3], frames[1][4]), (0x01, FS20_OFF));
}

#[test]
fn test_long_address_uses_low_byte() {
    let (device, recorder) = RecordingDevice::new();
    let engine = engine_with(Box::new(device));
    let mut session = ClientSession::new("test");

    let (out, _) = run(&engine, &mut session, "FS20 11112222 ON;FS20 11112222 OFF");
    assert_eq!(out, "FS20 11112222 ON: OK\r\nFS20 11112222 OFF: OK\r\n");

    let frames = recorder.frames();
    assert_eq!(frames.len(), 2);
    assert_eq!((frames[0][3], frames[0][4]), (0x55, FS20_ON));
    assert_eq!((frames[1][3], frames[1][4]), (0x55, FS20_OFF));
}

#[test]
fn test_failing_device_is_retried_then_reported() {
    let (device, recorder) = RecordingDevice::new();
    let engine = engine_with(Box::new(device.failing()));
    let mut session = ClientSession::new("test");

    let (out, outcome) = run(&engine, &mut session, "GET TEMP; VERSION");
    assert_eq!(outcome, Outcome::Continue);
    assert!(out.starts_with("GET TEMP: ERROR - USB communication error\r\n"), "{out}");
    assert!(out.contains("VERSION: OK\r\n"));
    assert_eq!(recorder.write_attempts(), 5);
    assert!(!engine.transport().is_released());
}

#[test]
fn test_auto_clock_stops_when_read_back_fails() {
    // the recording device never answers GET_CLOCK
    let (device, recorder) = RecordingDevice::new();
    let engine = engine_with(Box::new(device));
    let mut session = ClientSession::new("test");

    let (out, outcome) = run(&engine, &mut session, "SET CLOCK AUTO");
    assert_eq!(outcome, Outcome::Continue);
    assert_eq!(out, "SET CLOCK AUTO: ERROR - USB communication error\r\n");
    assert_eq!(session.failures(), 1);

    let opcodes: Vec<u8> = recorder.frames().iter().map(|frame| frame[0]).collect();
    assert_eq!(opcodes, [OP_SET_CLOCK, 0x00, OP_CLOCK_COMMIT, OP_GET_CLOCK]);
    assert_eq!(recorder.write_attempts(), 4);
}

#[test]
fn test_temperature_reply() {
    let (device, _recorder) = RecordingDevice::new();
    let engine = engine_with(Box::new(device));
    let (out, _) = run(&engine, &mut ClientSession::one_shot(), "GET TEMP");
    assert_eq!(out, "22.5\r\n");
}

#[test]
fn test_housecode_is_shared_between_sessions() {
    let (device, recorder) = RecordingDevice::new();
    let engine = engine_with(Box::new(device));
    let mut first = ClientSession::new("first");
    let mut second = ClientSession::new("second");

    let (out, _) = run(&engine, &mut second, "GET HOUSECODE");
    assert!(out.starts_with("11111111\r\n"), "{out}");

    let (out, _) = run(&engine, &mut first, "SET HOUSECODE 12341234");
    assert_eq!(out, "SET HOUSECODE 12341234: OK\r\n");

    let (out, _) = run(&engine, &mut second, "GET HOUSECODE; FS20 1111 TOGGLE");
    assert!(out.starts_with("12341234\r\n"), "{out}");
    let frames = recorder.frames();
    assert_eq!((frames[0][1], frames[0][2]), (0x1b, 0x1b));
}

#[test]
fn test_bad_housecode_keeps_previous() {
    let (device, _recorder) = RecordingDevice::new();
    let engine = engine_with(Box::new(device));
    let mut session = ClientSession::new("test");

    let (out, _) = run(&engine, &mut session, "SET HOUSECODE 12345");
    assert_eq!(out, "SET HOUSECODE 12345: ERROR - wrong parameter '12345'\r\n");
    assert_eq!(engine.config().housecode().value(), 0);
}

#[test]
fn test_engine_is_shared_across_threads() {
    let (device, recorder) = RecordingDevice::new();
    let engine = engine_with(Box::new(device.with_latency(std::time::Duration::from_millis(1))));

    let workers: Vec<_> = (0..4)
        .map(|n| {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || {
                let mut session = ClientSession::one_shot();
                let line = format!("SCENE {0};SCENE {0};SCENE {0}", n + 1);
                run(&engine, &mut session, &line);
                session.failures()
            })
        })
        .collect();
    for worker in workers {
        assert_eq!(worker.join().unwrap(), 0);
    }
    assert_eq!(recorder.frames().len(), 12);
    assert_eq!(recorder.overlaps(), 0);
}
