//! Keying stream invariants.

use cw_keyer_core::consumer::BestEffortConsumer;
use cw_keyer_core::sample::{GpioState, KeySample};
use cw_keyer_core::stream::KeyingStream;

fn keyed(on: bool) -> KeySample {
    let mut sample = KeySample::EMPTY;
    sample.local_key = on;
    sample
}

#[test]
fn test_content_matches_push_order() {
    let stream = KeyingStream::<128>::new();

    // Distinct gpio values so nothing folds
    for i in 1..=100u8 {
        let mut sample = KeySample::EMPTY;
        sample.gpio = GpioState::from_bits(i);
        stream.push(sample);
    }

    assert_eq!(stream.write_position(), 100);
    for pos in 0..100u32 {
        let sample = stream.read(pos).expect("sample within window");
        assert_eq!(sample.gpio.bits(), pos as u8 + 1);
        assert!(!sample.is_silence());
    }
}

#[test]
fn test_silence_law_total_count_preserved() {
    // K identical observable pushes always decode back to K ticks,
    // however they were folded
    for k in [1u32, 2, 99, 1_000, 65_534] {
        let stream = KeyingStream::<64>::new();

        // A state change first, so the run follows a real record
        stream.push(keyed(true));
        for _ in 0..k {
            stream.push(keyed(true));
        }
        stream.flush();

        let mut total = 0u32;
        let mut pos = 0u32;
        while let Some(sample) = stream.read(pos) {
            if sample.is_silence() {
                total += sample.silence_ticks() as u32;
            } else {
                total += 1;
            }
            pos += 1;
        }
        // The k folded ticks plus the explicit leading sample
        assert_eq!(total, k + 1, "k = {}", k);
    }
}

#[test]
fn test_silence_saturation_splits_run() {
    let stream = KeyingStream::<64>::new();

    let k = u16::MAX as u32 + 100;
    for _ in 0..k {
        stream.push(KeySample::EMPTY);
    }
    stream.flush();

    // Two silence records, never a wrapped count
    let mut total = 0u32;
    let mut records = 0;
    let mut pos = 0u32;
    while let Some(sample) = stream.read(pos) {
        assert!(sample.is_silence());
        total += sample.silence_ticks() as u32;
        records += 1;
        pos += 1;
    }
    assert_eq!(records, 2);
    assert_eq!(total, k);
}

#[test]
fn test_overrun_detection() {
    let stream = KeyingStream::<64>::new();

    for _ in 0..(64 + 10) {
        stream.push_raw(KeySample::EMPTY);
    }

    assert!(stream.is_overrun(0));
    assert!(stream.lag(0) > 64);
    assert!(stream.read(0).is_none());

    // The newest capacity-worth is still readable
    assert!(!stream.is_overrun(10));
    assert!(stream.read(10).is_some());
}

#[test]
fn test_multi_consumer_independence() {
    let stream = KeyingStream::<128>::new();
    let mut first = BestEffortConsumer::new(&stream, 64);
    let mut second = BestEffortConsumer::new(&stream, 64);

    for i in 1..=50u8 {
        let mut sample = KeySample::EMPTY;
        sample.gpio = GpioState::from_bits(i);
        stream.push(sample);
    }

    // First consumer drains everything before the second starts
    let seen_first: Vec<u8> = first.drain().map(|s| s.gpio.bits()).collect();
    let seen_second: Vec<u8> = second.drain().map(|s| s.gpio.bits()).collect();

    assert_eq!(seen_first.len(), 50);
    assert_eq!(seen_first, seen_second);
}

#[test]
fn test_edges_recorded_across_folded_runs() {
    let stream = KeyingStream::<64>::new();

    stream.push(keyed(true));
    for _ in 0..20 {
        stream.push(keyed(true));
    }
    stream.push(keyed(false));

    // key-down edge, silence, key-up edge
    let down = stream.read(0).unwrap();
    assert!(down.local_key);
    assert!(down.has_local_edge());

    let silence = stream.read(1).unwrap();
    assert!(silence.is_silence());
    assert_eq!(silence.silence_ticks(), 20);

    let up = stream.read(2).unwrap();
    assert!(!up.local_key);
    assert!(up.has_local_edge());
}
