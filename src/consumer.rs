//! Stream consumers.
//!
//! Two policies layered on [`KeyingStream`]:
//!
//! - [`HardRtConsumer`]: drives the physical key and sidetone. Must
//!   keep up or FAULT; silence is strictly preferred to corrupt
//!   Morse timing.
//! - [`BestEffortConsumer`]: drives decoder, timeline and network
//!   forwarding. Never faults; skips forward when behind and counts
//!   what it dropped.

use crate::fault::{FaultCode, FaultState};
use crate::sample::KeySample;
use crate::stream::{KeyingStream, DEFAULT_STREAM_CAPACITY};

/// Deadline-enforced reader.
///
/// Contract: "I keep up with the stream, or I FAULT."
///
/// Initialising at the current write position means the first tick
/// sees only samples produced after attach.
pub struct HardRtConsumer<'a, const N: usize = DEFAULT_STREAM_CAPACITY> {
    stream: &'a KeyingStream<N>,
    fault: &'a FaultState,
    read_pos: u32,
    max_lag: u32,
}

impl<'a, const N: usize> HardRtConsumer<'a, N> {
    /// Attach to `stream` at its current write position.
    ///
    /// `max_lag` is the deadline in samples: one tick later than
    /// that and the whole pipeline goes silent.
    pub fn new(stream: &'a KeyingStream<N>, fault: &'a FaultState, max_lag: u32) -> Self {
        Self {
            stream,
            fault,
            read_pos: stream.write_position(),
            max_lag,
        }
    }

    /// Read the next sample, enforcing the deadline.
    ///
    /// - `Ok(Some(sample))`: next sample, read position advanced
    /// - `Ok(None)`: caught up with the producer
    /// - `Err(code)`: deadline violated; the fault is already set
    ///
    /// O(1), never blocks.
    #[inline]
    pub fn tick(&mut self) -> Result<Option<KeySample>, FaultCode> {
        let lag = self.stream.lag(self.read_pos);

        // Lapped by the producer: most severe, checked first
        if lag > N as u32 {
            self.fault.set(FaultCode::Overrun, lag);
            return Err(FaultCode::Overrun);
        }

        if lag > self.max_lag {
            self.fault.set(FaultCode::LatencyExceeded, lag);
            return Err(FaultCode::LatencyExceeded);
        }

        match self.stream.read(self.read_pos) {
            Some(sample) => {
                self.read_pos = self.read_pos.wrapping_add(1);
                Ok(Some(sample))
            }
            None => Ok(None),
        }
    }

    /// Jump to the current write position. Called after fault
    /// clearance so the next tick starts from fresh samples.
    #[inline]
    pub fn resync(&mut self) {
        self.read_pos = self.stream.write_position();
    }

    /// Change the deadline (config change).
    #[inline]
    pub fn set_max_lag(&mut self, max_lag: u32) {
        self.max_lag = max_lag;
    }

    /// Samples behind the producer.
    #[inline]
    pub fn lag(&self) -> u32 {
        self.stream.lag(self.read_pos)
    }

    /// Current read position.
    #[inline]
    pub fn read_pos(&self) -> u32 {
        self.read_pos
    }
}

/// Skip-on-lag reader.
///
/// Contract: "I process when I can, I skip when I'm behind."
///
/// Never faults. When lag exceeds `skip_threshold` the read position
/// jumps close to the producer, leaving half a threshold of margin
/// so the very next reads don't immediately re-trigger the skip. The
/// skipped distance accumulates in [`dropped`](Self::dropped).
pub struct BestEffortConsumer<'a, const N: usize = DEFAULT_STREAM_CAPACITY> {
    stream: &'a KeyingStream<N>,
    read_pos: u32,
    skip_threshold: u32,
    dropped: u32,
}

impl<'a, const N: usize> BestEffortConsumer<'a, N> {
    /// Attach to `stream` at its current write position.
    ///
    /// `skip_threshold` must be positive and no larger than the
    /// stream capacity to be meaningful.
    pub fn new(stream: &'a KeyingStream<N>, skip_threshold: u32) -> Self {
        Self {
            stream,
            read_pos: stream.write_position(),
            skip_threshold: skip_threshold.max(1),
            dropped: 0,
        }
    }

    /// Read the next sample, skipping forward first if behind.
    #[inline]
    pub fn tick(&mut self) -> Option<KeySample> {
        let lag = self.stream.lag(self.read_pos);

        if lag > self.skip_threshold {
            let margin = (self.skip_threshold / 2).min(N as u32 / 2);
            let target = self.stream.write_position().wrapping_sub(margin);
            let skipped = target.wrapping_sub(self.read_pos);

            self.read_pos = target;
            self.dropped = self.dropped.saturating_add(skipped);
        }

        match self.stream.read(self.read_pos) {
            Some(sample) => {
                self.read_pos = self.read_pos.wrapping_add(1);
                Some(sample)
            }
            None => None,
        }
    }

    /// Iterator draining every currently-available sample.
    #[inline]
    pub fn drain(&mut self) -> Drain<'_, 'a, N> {
        Drain { consumer: self }
    }

    /// Total samples skipped over so far.
    #[inline]
    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    /// Reset the drop counter (e.g. after a diagnostics report).
    #[inline]
    pub fn reset_dropped(&mut self) {
        self.dropped = 0;
    }

    /// Samples behind the producer.
    #[inline]
    pub fn lag(&self) -> u32 {
        self.stream.lag(self.read_pos)
    }

    /// Current read position.
    #[inline]
    pub fn read_pos(&self) -> u32 {
        self.read_pos
    }
}

/// Draining iterator over a [`BestEffortConsumer`].
pub struct Drain<'c, 'a, const N: usize> {
    consumer: &'c mut BestEffortConsumer<'a, N>,
}

impl<'c, 'a, const N: usize> Iterator for Drain<'c, 'a, N> {
    type Item = KeySample;

    fn next(&mut self) -> Option<Self::Item> {
        self.consumer.tick()
    }
}
