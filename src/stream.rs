//! Lock-free SPMC (single producer, multiple consumer) keying stream.
//!
//! Every keying event flows through here. The producer is the RT
//! context; consumers (TX/sidetone, decoder, timeline, network) each
//! hold a private read position and never coordinate with each other.
//!
//! ```text
//! producer ──────▶ KeyingStream ──────▶ consumers
//!                  (lock-free)
//! ```
//!
//! # Ordering contract
//!
//! The producer writes the storage slot first, then store-releases
//! the write position. Consumers load-acquire the write position
//! before reading storage. A consumer that observes position `W`
//! therefore also observes the contents of every slot up to `W`,
//! without any lock.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::sample::KeySample;

/// Default stream capacity in samples. At a 1 ms RT tick this is
/// ~4 s of uncompressed history; with silence folding, far more.
pub const DEFAULT_STREAM_CAPACITY: usize = 4096;

/// Lock-free SPMC ring of [`KeySample`]s with silence run-length
/// compression.
///
/// # Safety
///
/// Uses `UnsafeCell` internally but is safe under the architectural
/// rules: exactly one producer (by design, not by type), consumers
/// only ever read slots already published by the release store of
/// the write position, and each consumer owns its read position.
pub struct KeyingStream<const N: usize = DEFAULT_STREAM_CAPACITY> {
    /// Ring storage, owned by the stream for its lifetime.
    slots: UnsafeCell<[KeySample; N]>,

    /// Producer position: monotonically increasing, masked only when
    /// indexing into storage.
    write_pos: AtomicU32,

    /// Folded-tick accumulator for silence compression.
    idle_ticks: AtomicU32,

    /// Last pushed sample, maintained only by the producer, for
    /// change detection and edge derivation.
    last_sample: UnsafeCell<KeySample>,
}

// SAFETY: single producer, multiple consumers, coordination through
// the release/acquire pair on `write_pos`. `idle_ticks` and
// `last_sample` are touched only by the producer.
unsafe impl<const N: usize> Sync for KeyingStream<N> {}
unsafe impl<const N: usize> Send for KeyingStream<N> {}

impl<const N: usize> KeyingStream<N> {
    /// Index mask. N must be a power of two.
    const MASK: u32 = (N as u32) - 1;

    /// Silence run length at which a record is emitted early.
    const SILENCE_SATURATION: u32 = u16::MAX as u32;

    /// Create an empty stream with zeroed storage.
    ///
    /// The capacity check fails at compile time for non-power-of-two
    /// sizes.
    pub const fn new() -> Self {
        assert!(N.is_power_of_two(), "stream capacity must be a power of 2");

        Self {
            slots: UnsafeCell::new([KeySample::EMPTY; N]),
            write_pos: AtomicU32::new(0),
            idle_ticks: AtomicU32::new(0),
            last_sample: UnsafeCell::new(KeySample::EMPTY),
        }
    }

    /// Create a stream that takes ownership of caller-provided
    /// storage. Accounting starts zeroed; prior contents of the
    /// storage are never observable because reads are bounded by the
    /// write position.
    pub const fn from_storage(storage: [KeySample; N]) -> Self {
        assert!(N.is_power_of_two(), "stream capacity must be a power of 2");

        Self {
            slots: UnsafeCell::new(storage),
            write_pos: AtomicU32::new(0),
            idle_ticks: AtomicU32::new(0),
            last_sample: UnsafeCell::new(KeySample::EMPTY),
        }
    }

    /// Push a sample. Producer only.
    ///
    /// Ticks whose observable state matches the previous push (and
    /// that carry no flags) are folded into the idle accumulator
    /// instead of being written; the accumulated run is emitted as a
    /// silence record when the state next changes, when the count
    /// saturates at 65535, or on [`flush`](Self::flush).
    ///
    /// O(1), never blocks, never allocates.
    #[inline]
    pub fn push(&self, sample: KeySample) {
        // SAFETY: producer-only shadow, no aliasing
        let last = unsafe { &*self.last_sample.get() };

        if sample.has_change_from(last) {
            self.flush();
            self.write_slot(sample.with_edges_from(last));

            // SAFETY: producer-only shadow, no aliasing
            unsafe {
                *self.last_sample.get() = sample;
            }
        } else {
            let idle = self.idle_ticks.load(Ordering::Relaxed) + 1;
            if idle >= Self::SILENCE_SATURATION {
                // Run no longer fits a u16 count: emit and restart
                self.idle_ticks.store(0, Ordering::Relaxed);
                self.write_slot(KeySample::silence(idle as u16));
            } else {
                self.idle_ticks.store(idle, Ordering::Relaxed);
            }
        }
    }

    /// Push unconditionally, bypassing silence compression. Producer
    /// only. Used where every tick must be recorded (calibration,
    /// diagnostics capture).
    #[inline]
    pub fn push_raw(&self, sample: KeySample) {
        self.write_slot(sample);
    }

    /// Emit any pending silence record. Producer only. Call at
    /// shutdown or producer handover so the recorded run lengths
    /// account for every tick.
    #[inline]
    pub fn flush(&self) {
        let idle = self.idle_ticks.swap(0, Ordering::Relaxed);
        if idle > 0 {
            self.write_slot(KeySample::silence(idle as u16));
        }
    }

    /// Forget the change-detection shadow so the next push is always
    /// recorded, carrying full edge flags. Producer only. Used after
    /// fault recovery and at producer handover, where freshly
    /// resynced consumers would otherwise never observe a state that
    /// predates their attach point.
    pub fn rearm(&self) {
        self.flush();

        // A state no real sample can equal
        let sentinel = KeySample {
            gpio: crate::sample::GpioState::from_bits(0xFF),
            local_key: true,
            audio_level: 0xFF,
            flags: 0,
            config_gen: 0,
        };

        // SAFETY: producer-only shadow, no aliasing
        unsafe {
            *self.last_sample.get() = sentinel;
        }
    }

    /// Read the sample at `pos`.
    ///
    /// Returns `None` if the position has not been written yet, or
    /// has already been overwritten (consumer overrun).
    ///
    /// O(1), never blocks.
    #[inline]
    pub fn read(&self, pos: u32) -> Option<KeySample> {
        let write = self.write_pos.load(Ordering::Acquire);
        let behind = write.wrapping_sub(pos);

        if behind == 0 || behind > N as u32 {
            return None;
        }

        // SAFETY: `pos` lies in (write - N, write], so the slot was
        // published before the acquire-observed write position and
        // the producer has not wrapped onto it.
        Some(unsafe { (*self.slots.get())[(pos & Self::MASK) as usize] })
    }

    /// Current producer position. Consumers initialise their read
    /// position from this so the first tick sees only new samples.
    #[inline]
    pub fn write_position(&self) -> u32 {
        self.write_pos.load(Ordering::Acquire)
    }

    /// How many samples a consumer at `pos` is behind the producer.
    #[inline]
    pub fn lag(&self, pos: u32) -> u32 {
        self.write_pos.load(Ordering::Acquire).wrapping_sub(pos)
    }

    /// Has a consumer at `pos` been lapped by the producer?
    #[inline]
    pub fn is_overrun(&self, pos: u32) -> bool {
        self.lag(pos) > N as u32
    }

    /// Ring capacity in samples.
    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Write one slot and publish it.
    #[inline]
    fn write_slot(&self, sample: KeySample) {
        let pos = self.write_pos.load(Ordering::Relaxed);

        // SAFETY: single producer; this slot is outside the window
        // consumers may read until the store below publishes it.
        unsafe {
            (*self.slots.get())[(pos & Self::MASK) as usize] = sample;
        }

        // Slot contents before position: the release pairs with the
        // consumers' acquire load.
        self.write_pos.store(pos.wrapping_add(1), Ordering::Release);
    }
}

impl<const N: usize> Default for KeyingStream<N> {
    fn default() -> Self {
        Self::new()
    }
}
