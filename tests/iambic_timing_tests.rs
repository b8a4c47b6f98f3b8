//! Iambic FSM timing properties, driven at a 1 ms tick like the RT
//! context.

use cw_keyer_core::config::{IambicMode, MemoryMode};
use cw_keyer_core::iambic::{IambicConfig, IambicKeyer};
use cw_keyer_core::sample::GpioState;

const TICK_US: i64 = 1_000;

fn dit() -> GpioState {
    GpioState::from_bits(GpioState::DIT)
}

fn dah() -> GpioState {
    GpioState::from_bits(GpioState::DAH)
}

/// Tick the keyer from `from` to `to`, returning key edges as
/// (timestamp, key_down).
fn run<F: Fn(i64) -> GpioState>(
    keyer: &mut IambicKeyer,
    from_us: i64,
    to_us: i64,
    paddles: F,
) -> Vec<(i64, bool)> {
    let mut edges = Vec::new();
    let mut last = keyer.is_key_down();
    let mut t = from_us;
    while t <= to_us {
        keyer.tick(t, paddles(t));
        if keyer.is_key_down() != last {
            last = keyer.is_key_down();
            edges.push((t, last));
        }
        t += TICK_US;
    }
    edges
}

/// Durations of the key-down intervals in an edge list.
fn mark_lengths(edges: &[(i64, bool)]) -> Vec<i64> {
    edges
        .chunks(2)
        .filter(|pair| pair.len() == 2 && pair[0].1)
        .map(|pair| pair[1].0 - pair[0].0)
        .collect()
}

#[test]
fn test_paris_dit_budget() {
    for wpm in [5u32, 10, 20, 25, 50, 100] {
        let config = IambicConfig::with_wpm(wpm);
        assert_eq!(config.dit_duration_us() * wpm as i64, 1_200_000);
    }
}

#[test]
fn test_held_dit_produces_exact_marks_and_gaps() {
    let config = IambicConfig::with_wpm(20);
    let dit_us = config.dit_duration_us();
    let mut keyer = IambicKeyer::new(config);

    let edges = run(&mut keyer, 0, 10 * dit_us, |_| dit());

    // Marks of exactly dit_us, separated by exactly dit_us
    let marks = mark_lengths(&edges);
    assert!(marks.len() >= 4);
    assert!(marks.iter().all(|&len| len == dit_us));

    for pair in edges.chunks(2).collect::<Vec<_>>().windows(2) {
        let up = pair[0][1].0;
        let next_down = pair[1][0].0;
        assert_eq!(next_down - up, dit_us);
    }
}

#[test]
fn test_held_dah_produces_triple_marks() {
    let config = IambicConfig::with_wpm(20);
    let dit_us = config.dit_duration_us();
    let mut keyer = IambicKeyer::new(config);

    let edges = run(&mut keyer, 0, 16 * dit_us, |_| dah());

    let marks = mark_lengths(&edges);
    assert!(marks.len() >= 3);
    assert!(marks.iter().all(|&len| len == 3 * dit_us));
}

#[test]
fn test_mode_a_squeeze_release_stops_at_element_end() {
    let config = IambicConfig {
        mode: IambicMode::A,
        ..IambicConfig::with_wpm(20)
    };
    let dit_us = config.dit_duration_us();
    let mut keyer = IambicKeyer::new(config);

    // Squeeze through the first dit and into the dah, release mid-dah
    let release_at = 2 * dit_us + dit_us;
    let edges = run(&mut keyer, 0, 12 * dit_us, |t| {
        if t < release_at {
            GpioState::BOTH
        } else {
            GpioState::IDLE
        }
    });

    // dit (1) + dah (3): exactly two marks, nothing after
    let marks = mark_lengths(&edges);
    assert_eq!(marks, vec![dit_us, 3 * dit_us]);
}

#[test]
fn test_mode_b_squeeze_release_adds_one_bonus() {
    let config = IambicConfig {
        mode: IambicMode::B,
        ..IambicConfig::with_wpm(20)
    };
    let dit_us = config.dit_duration_us();
    let mut keyer = IambicKeyer::new(config);

    let release_at = 2 * dit_us + dit_us;
    let edges = run(&mut keyer, 0, 14 * dit_us, |t| {
        if t < release_at {
            GpioState::BOTH
        } else {
            GpioState::IDLE
        }
    });

    // dit, dah, then exactly one bonus dit
    let marks = mark_lengths(&edges);
    assert_eq!(marks, vec![dit_us, 3 * dit_us, dit_us]);
}

#[test]
fn test_memory_window_full_range_latches_tap() {
    let config = IambicConfig {
        mode: IambicMode::A,
        memory_mode: MemoryMode::Both,
        window_start_pct: 0,
        window_end_pct: 100,
        ..IambicConfig::with_wpm(20)
    };
    let dit_us = config.dit_duration_us();
    let dah_us = config.dah_duration_us();
    let mut keyer = IambicKeyer::new(config);

    // Hold dah; tap dit briefly at 30% of the mark; release dah in
    // the gap so only the latch can produce the next element
    let tap_from = 3 * dah_us / 10;
    let tap_to = tap_from + 20 * TICK_US;
    let edges = run(&mut keyer, 0, dah_us + 8 * dit_us, |t| {
        let mut gpio = GpioState::new();
        gpio.set_dah(t < dah_us - TICK_US);
        gpio.set_dit(t >= tap_from && t < tap_to);
        gpio
    });

    // The dah, then the latched dit
    let marks = mark_lengths(&edges);
    assert_eq!(marks, vec![dah_us, dit_us]);
}

#[test]
fn test_memory_window_point_fifty() {
    let base = IambicConfig {
        mode: IambicMode::A,
        memory_mode: MemoryMode::Both,
        window_start_pct: 50,
        window_end_pct: 50,
        ..IambicConfig::with_wpm(20)
    };
    let dit_us = base.dit_duration_us();
    let dah_us = base.dah_duration_us();

    // Tap entirely before 50%: ignored
    let mut keyer = IambicKeyer::new(base);
    let edges = run(&mut keyer, 0, dah_us + 8 * dit_us, |t| {
        let mut gpio = GpioState::new();
        gpio.set_dah(t < dah_us - TICK_US);
        gpio.set_dit(t >= dah_us / 10 && t < dah_us / 4);
        gpio
    });
    assert_eq!(mark_lengths(&edges), vec![dah_us]);

    // Tap spanning the 50% point: latched
    let mut keyer = IambicKeyer::new(base);
    let edges = run(&mut keyer, 0, dah_us + 8 * dit_us, |t| {
        let mut gpio = GpioState::new();
        gpio.set_dah(t < dah_us - TICK_US);
        gpio.set_dit(t >= 2 * dah_us / 5 && t < 3 * dah_us / 5);
        gpio
    });
    assert_eq!(mark_lengths(&edges), vec![dah_us, dit_us]);
}
