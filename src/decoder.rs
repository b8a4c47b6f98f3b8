//! Morse decoder.
//!
//! Reads keying samples from a best-effort consumer, measures mark
//! and space durations in RT ticks, classifies them against an
//! adaptive dit estimate, and turns accumulated patterns into
//! characters.
//!
//! Advisory only: it never back-pressures the stream, unknown
//! patterns just bump an error counter.
//!
//! # Time base
//!
//! Stream samples carry no timestamp; one sample is one RT tick, a
//! silence record is its run length in ticks. Durations are the run
//! lengths multiplied by the configured tick period.
//!
//! # Classification
//!
//! With `d` the current dit estimate: a mark is a dit below `2d` and
//! a dah at or above; a space is an intra-character gap below `2d`,
//! a character gap in `[2d, 5d)` and a word gap at `5d` and above.
//! Confirmed marks blend into the estimate (dah duration divided by
//! three) with a 1/8 EMA after a short seeded warm-up. Marks shorter
//! than 20 ms or longer than 2 s are rejected as spurious.

use heapless::Vec;

use crate::consumer::BestEffortConsumer;
use crate::morse::{char_for_pattern, PATTERN_MAX};
use crate::sample::KeySample;

/// Decoded-character ring capacity.
pub const OUTPUT_CAPACITY: usize = 64;

/// Marks shorter than this are glitches, not keying.
const MARK_MIN_US: i64 = 20_000;

/// Marks longer than this are a stuck key, not keying.
const MARK_MAX_US: i64 = 2_000_000;

/// Classifications blended at half weight before the EMA settles.
const WARMUP_EVENTS: u8 = 4;

/// A decoded character with the (BG-context) time it was finalised.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodedChar {
    pub ch: char,
    pub timestamp_us: i64,
}

/// Adaptive mark/space decoder.
pub struct MorseDecoder {
    /// RT tick period; the decoder's time base.
    tick_us: i64,

    /// EMA dit estimate.
    dit_avg_us: i64,
    warmup_left: u8,

    /// Key level of the run being measured.
    run_key: bool,
    /// Length of the run being measured, in ticks.
    run_ticks: u32,
    /// Any edge has been seen (the leading idle run is not a space).
    synced: bool,

    /// Wall-clock stamp of the last processed edge.
    last_edge_us: i64,

    /// Element pattern being accumulated.
    pattern: Vec<u8, PATTERN_MAX>,
    /// The pattern outgrew the buffer; finalises as an error.
    pattern_overflow: bool,
    last_emitted: Option<char>,

    // Decoded-character ring
    output: [DecodedChar; OUTPUT_CAPACITY],
    write_idx: usize,
    read_idx: usize,

    errors: u32,
    rejected: u32,
    decoded: u32,
}

impl MorseDecoder {
    /// `nominal_wpm` seeds the dit estimate; `tick_us` is the RT
    /// tick period the stream was produced at.
    pub fn new(nominal_wpm: u32, tick_us: u32) -> Self {
        Self {
            tick_us: tick_us.max(1) as i64,
            dit_avg_us: 1_200_000 / nominal_wpm.max(1) as i64,
            warmup_left: WARMUP_EVENTS,
            run_key: false,
            run_ticks: 0,
            synced: false,
            last_edge_us: 0,
            pattern: Vec::new(),
            pattern_overflow: false,
            last_emitted: None,
            output: [DecodedChar {
                ch: '\0',
                timestamp_us: 0,
            }; OUTPUT_CAPACITY],
            write_idx: 0,
            read_idx: 0,
            errors: 0,
            rejected: 0,
            decoded: 0,
        }
    }

    /// Drain a best-effort consumer and run the inactivity check.
    /// Call once per BG tick.
    pub fn process<const N: usize>(
        &mut self,
        consumer: &mut BestEffortConsumer<'_, N>,
        now_us: i64,
    ) {
        while let Some(sample) = consumer.tick() {
            self.feed(sample, now_us);
        }
        self.poll(now_us);
    }

    /// Feed one stream sample.
    pub fn feed(&mut self, sample: KeySample, now_us: i64) {
        if sample.is_silence() {
            // State persisted for N ticks; extend the current run
            self.run_ticks = self.run_ticks.saturating_add(sample.silence_ticks() as u32);
            return;
        }

        let key = sample.local_key;
        if key == self.run_key {
            self.run_ticks = self.run_ticks.saturating_add(1);
            return;
        }

        // Edge: the finished run becomes a mark or space event
        let duration_us = self.run_ticks as i64 * self.tick_us;
        if self.synced {
            if self.run_key {
                self.on_mark(duration_us, now_us);
            } else {
                self.on_space(duration_us, now_us);
            }
        }

        self.synced = true;
        self.run_key = key;
        self.run_ticks = 1;
        self.last_edge_us = now_us;
    }

    /// Inactivity check: a pattern left hanging for 7 dits with the
    /// key up is finalised even though no edge will close it.
    pub fn poll(&mut self, now_us: i64) {
        let receiving = !self.pattern.is_empty() || self.pattern_overflow;
        if !self.run_key
            && receiving
            && now_us.saturating_sub(self.last_edge_us) > 7 * self.dit_avg_us
        {
            self.finalize(now_us);
        }
    }

    /// Pop the oldest decoded character.
    pub fn pop(&mut self) -> Option<DecodedChar> {
        if self.read_idx == self.write_idx {
            return None;
        }
        let ch = self.output[self.read_idx % OUTPUT_CAPACITY];
        self.read_idx += 1;
        Some(ch)
    }

    /// Copy the most recent decoded characters into `out`, oldest
    /// first, without consuming them. Returns how many were copied.
    pub fn copy_recent(&self, out: &mut [DecodedChar]) -> usize {
        let available = self.write_idx - self.read_idx;
        let count = available.min(out.len()).min(OUTPUT_CAPACITY);

        for (i, slot) in out[..count].iter_mut().enumerate() {
            let idx = self.write_idx - count + i;
            *slot = self.output[idx % OUTPUT_CAPACITY];
        }
        count
    }

    /// Unknown-pattern count.
    pub fn errors(&self) -> u32 {
        self.errors
    }

    /// Spurious-mark count (too short / too long).
    pub fn rejected(&self) -> u32 {
        self.rejected
    }

    /// Total characters decoded (including spaces).
    pub fn decoded(&self) -> u32 {
        self.decoded
    }

    /// Current dit estimate in microseconds.
    pub fn dit_estimate_us(&self) -> i64 {
        self.dit_avg_us
    }

    // --- events ---

    fn on_mark(&mut self, duration_us: i64, _now_us: i64) {
        if !(MARK_MIN_US..=MARK_MAX_US).contains(&duration_us) {
            self.rejected = self.rejected.wrapping_add(1);
            log::debug!("decoder: spurious mark of {} us rejected", duration_us);
            return;
        }

        let is_dah = duration_us >= 2 * self.dit_avg_us;
        let element = if is_dah { b'-' } else { b'.' };
        if self.pattern.push(element).is_err() {
            self.pattern_overflow = true;
        }

        let blend = if is_dah { duration_us / 3 } else { duration_us };
        if self.warmup_left > 0 {
            self.warmup_left -= 1;
            self.dit_avg_us = (self.dit_avg_us + blend) / 2;
        } else {
            self.dit_avg_us += (blend - self.dit_avg_us) / 8;
        }
    }

    fn on_space(&mut self, duration_us: i64, now_us: i64) {
        if duration_us < 2 * self.dit_avg_us {
            // Intra-character gap
            return;
        }

        self.finalize(now_us);

        if duration_us >= 5 * self.dit_avg_us {
            self.emit_space(now_us);
        }
    }

    /// Look the accumulated pattern up and emit the character.
    fn finalize(&mut self, now_us: i64) {
        if self.pattern_overflow {
            self.errors = self.errors.wrapping_add(1);
            self.pattern.clear();
            self.pattern_overflow = false;
            return;
        }
        if self.pattern.is_empty() {
            return;
        }

        // Pattern bytes are only ever '.' and '-'
        let pattern = core::str::from_utf8(&self.pattern).unwrap_or("");
        match char_for_pattern(pattern) {
            Some(ch) => self.emit(ch, now_us),
            None => {
                self.errors = self.errors.wrapping_add(1);
                log::debug!("decoder: unknown pattern {:?}", pattern);
            }
        }
        self.pattern.clear();
    }

    fn emit_space(&mut self, now_us: i64) {
        // A space only separates decoded words
        if matches!(self.last_emitted, Some(ch) if ch != ' ') {
            self.emit(' ', now_us);
        }
    }

    fn emit(&mut self, ch: char, now_us: i64) {
        if self.write_idx - self.read_idx >= OUTPUT_CAPACITY {
            // Ring full: the oldest character gives way
            self.read_idx += 1;
        }
        self.output[self.write_idx % OUTPUT_CAPACITY] = DecodedChar {
            ch,
            timestamp_us: now_us,
        };
        self.write_idx += 1;
        self.last_emitted = Some(ch);
        self.decoded = self.decoded.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK_US: u32 = 1_000;
    const DIT_TICKS: u32 = 60; // 60 ms = 20 WPM

    /// Feed a mark of `ticks`, assuming the key was up before.
    fn mark(dec: &mut MorseDecoder, t: &mut i64, ticks: u32) {
        let mut down = KeySample::EMPTY;
        down.local_key = true;
        for _ in 0..ticks {
            dec.feed(down, *t);
            *t += TICK_US as i64;
        }
    }

    fn space(dec: &mut MorseDecoder, t: &mut i64, ticks: u32) {
        for _ in 0..ticks {
            dec.feed(KeySample::EMPTY, *t);
            *t += TICK_US as i64;
        }
    }

    #[test]
    fn test_decodes_a() {
        let mut dec = MorseDecoder::new(20, TICK_US);
        let mut t = 0i64;

        space(&mut dec, &mut t, 10);
        mark(&mut dec, &mut t, DIT_TICKS); // dit
        space(&mut dec, &mut t, DIT_TICKS); // intra gap
        mark(&mut dec, &mut t, 3 * DIT_TICKS); // dah
        space(&mut dec, &mut t, 3 * DIT_TICKS); // char gap
        // A trailing mark edge closes the gap; use poll instead
        dec.poll(t + 1_000_000);

        let decoded = dec.pop().unwrap();
        assert_eq!(decoded.ch, 'A');
        assert!(dec.pop().is_none());
        assert_eq!(dec.errors(), 0);
    }

    #[test]
    fn test_unknown_pattern_counts_error() {
        let mut dec = MorseDecoder::new(20, TICK_US);
        let mut t = 0i64;

        space(&mut dec, &mut t, 10);
        // Ten dits: no such character
        for _ in 0..10 {
            mark(&mut dec, &mut t, DIT_TICKS);
            space(&mut dec, &mut t, DIT_TICKS);
        }
        dec.poll(t + 1_000_000);

        assert_eq!(dec.errors(), 1);
        assert!(dec.pop().is_none());
    }

    #[test]
    fn test_spurious_marks_rejected() {
        let mut dec = MorseDecoder::new(20, TICK_US);
        let mut t = 0i64;

        space(&mut dec, &mut t, 10);
        mark(&mut dec, &mut t, 5); // 5 ms glitch
        space(&mut dec, &mut t, 10 * DIT_TICKS);
        dec.poll(t + 1_000_000);

        assert_eq!(dec.rejected(), 1);
        assert_eq!(dec.errors(), 0);
        assert!(dec.pop().is_none());
    }

    #[test]
    fn test_silence_records_extend_spaces() {
        let mut dec = MorseDecoder::new(20, TICK_US);
        let mut t = 0i64;

        space(&mut dec, &mut t, 10);
        mark(&mut dec, &mut t, DIT_TICKS); // E

        // One real idle tick, then a folded run as the stream emits it
        dec.feed(KeySample::EMPTY, t);
        t += TICK_US as i64;
        dec.feed(KeySample::silence(3 * DIT_TICKS as u16), t);
        t += (3 * DIT_TICKS * TICK_US) as i64;

        // Next mark closes the gap as a character gap
        mark(&mut dec, &mut t, DIT_TICKS); // E
        space(&mut dec, &mut t, 3 * DIT_TICKS);
        dec.poll(t + 1_000_000);

        assert_eq!(dec.pop().unwrap().ch, 'E');
        assert_eq!(dec.pop().unwrap().ch, 'E');
        assert!(dec.pop().is_none());
    }

    #[test]
    fn test_adaptive_speed_tracking() {
        // Seeded for 20 WPM, fed 30 WPM (dit = 40 ms)
        let mut dec = MorseDecoder::new(20, TICK_US);
        let mut t = 0i64;

        space(&mut dec, &mut t, 10);
        for _ in 0..12 {
            mark(&mut dec, &mut t, 40);
            space(&mut dec, &mut t, 40);
        }
        // Estimate pulled towards 40 ms
        assert!(dec.dit_estimate_us() < 50_000);
        assert!(dec.dit_estimate_us() >= 38_000);
    }

    #[test]
    fn test_copy_recent() {
        let mut dec = MorseDecoder::new(20, TICK_US);
        let mut t = 0i64;

        space(&mut dec, &mut t, 10);
        // "EEE" with char gaps
        for _ in 0..3 {
            mark(&mut dec, &mut t, DIT_TICKS);
            space(&mut dec, &mut t, 3 * DIT_TICKS);
        }
        dec.poll(t + 1_000_000);

        let mut buf = [DecodedChar {
            ch: '\0',
            timestamp_us: 0,
        }; 8];
        let n = dec.copy_recent(&mut buf);
        assert_eq!(n, 3);
        assert!(buf[..n].iter().all(|d| d.ch == 'E'));

        // copy_recent does not consume
        assert_eq!(dec.pop().unwrap().ch, 'E');
    }
}
