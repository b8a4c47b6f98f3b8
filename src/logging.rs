//! RT-safe logging.
//!
//! The RT path must never call a blocking log sink, so it pushes
//! fixed-size entries into a lock-free ring that a non-RT thread
//! drains into whatever backend the platform has (UART, `log`
//! facade, network). Push is O(1) and drops the entry when the ring
//! is full; drops are counted.
//!
//! Non-RT paths use the `log` crate facade directly.
//!
//! ```text
//! RT thread               LogRing              drain thread
//! ─────────               ───────              ────────────
//! rt_log!() ──────────▶ [e0][e1][e2] ──────▶ log::info! / UART
//! non-blocking            lock-free            blocking ok
//! ```

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU32, Ordering};

/// Maximum formatted message length.
pub const MAX_MSG_LEN: usize = 120;

/// Default ring capacity in entries.
pub const LOG_RING_SIZE: usize = 256;

/// Entry severity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }
}

/// One fixed-size log entry.
#[derive(Clone, Copy)]
#[repr(C)]
pub struct LogEntry {
    /// Timestamp in microseconds.
    pub timestamp_us: i64,
    pub level: LogLevel,
    /// Used bytes of `msg`.
    pub len: u8,
    /// Message bytes, not NUL-terminated.
    pub msg: [u8; MAX_MSG_LEN],
}

impl LogEntry {
    const EMPTY: Self = Self {
        timestamp_us: 0,
        level: LogLevel::Info,
        len: 0,
        msg: [0; MAX_MSG_LEN],
    };

    /// Message as a string slice.
    pub fn message(&self) -> &str {
        core::str::from_utf8(&self.msg[..self.len as usize]).unwrap_or("<invalid>")
    }
}

impl Default for LogEntry {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// One ring slot. The sequence number tracks the slot's lap: it
/// equals the claiming position while free, position + 1 once the
/// entry is committed, and position + N after consumption.
struct Slot {
    seq: AtomicU32,
    entry: UnsafeCell<LogEntry>,
}

/// Lock-free MPSC log ring: any context may push, one drain thread
/// pops. Producers claim a slot with a CAS on the write index and
/// publish the entry by bumping the slot's sequence number, so the
/// consumer never observes a half-written entry. A full ring drops
/// the message rather than block.
pub struct LogRing<const N: usize = LOG_RING_SIZE> {
    slots: [Slot; N],
    write_idx: AtomicU32,
    read_idx: AtomicU32,
    dropped: AtomicU32,
}

// SAFETY: slot access is serialised by the per-slot sequence number;
// the consumer only reads committed entries.
unsafe impl<const N: usize> Sync for LogRing<N> {}
unsafe impl<const N: usize> Send for LogRing<N> {}

impl<const N: usize> LogRing<N> {
    const MASK: u32 = (N as u32) - 1;

    pub const fn new() -> Self {
        assert!(N.is_power_of_two(), "log ring size must be a power of 2");

        const INIT: Slot = Slot {
            seq: AtomicU32::new(0),
            entry: UnsafeCell::new(LogEntry::EMPTY),
        };

        // Each slot starts free for its own first-lap position
        let mut slots = [INIT; N];
        let mut i = 0;
        while i < N {
            slots[i] = Slot {
                seq: AtomicU32::new(i as u32),
                entry: UnsafeCell::new(LogEntry::EMPTY),
            };
            i += 1;
        }

        Self {
            slots,
            write_idx: AtomicU32::new(0),
            read_idx: AtomicU32::new(0),
            dropped: AtomicU32::new(0),
        }
    }

    /// Push an entry. Never blocks; returns `false` when the ring
    /// was full and the message dropped.
    #[inline]
    pub fn push(&self, timestamp_us: i64, level: LogLevel, msg: &[u8]) -> bool {
        let mut pos = self.write_idx.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[(pos & Self::MASK) as usize];
            let seq = slot.seq.load(Ordering::Acquire);
            let dif = seq.wrapping_sub(pos) as i32;

            if dif == 0 {
                // Slot free for this lap: claim it
                match self.write_idx.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: the CAS gave this producer the slot
                        // exclusively until the seq store below
                        unsafe {
                            let entry = &mut *slot.entry.get();
                            entry.timestamp_us = timestamp_us;
                            entry.level = level;
                            entry.len = msg.len().min(MAX_MSG_LEN) as u8;
                            entry.msg[..entry.len as usize]
                                .copy_from_slice(&msg[..entry.len as usize]);
                        }
                        slot.seq.store(pos.wrapping_add(1), Ordering::Release);
                        return true;
                    }
                    Err(actual) => pos = actual,
                }
            } else if dif < 0 {
                // Consumer hasn't freed this slot: ring is full
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return false;
            } else {
                // Another producer claimed this position
                pos = self.write_idx.load(Ordering::Relaxed);
            }
        }
    }

    /// Pop the next entry. Single-consumer.
    #[inline]
    pub fn drain(&self) -> Option<LogEntry> {
        let pos = self.read_idx.load(Ordering::Relaxed);
        let slot = &self.slots[(pos & Self::MASK) as usize];
        let seq = slot.seq.load(Ordering::Acquire);

        if seq != pos.wrapping_add(1) {
            // Not yet committed
            return None;
        }

        // SAFETY: committed and not yet released for the next lap
        let entry = unsafe { *slot.entry.get() };

        slot.seq
            .store(pos.wrapping_add(N as u32), Ordering::Release);
        self.read_idx.store(pos.wrapping_add(1), Ordering::Relaxed);
        Some(entry)
    }

    /// Entries currently committed or in flight.
    #[inline]
    pub fn pending(&self) -> u32 {
        let read = self.read_idx.load(Ordering::Relaxed);
        self.write_idx.load(Ordering::Acquire).wrapping_sub(read)
    }

    #[inline]
    pub fn has_entries(&self) -> bool {
        self.pending() != 0
    }

    /// Messages dropped because the ring was full.
    #[inline]
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn reset_dropped(&self) {
        self.dropped.store(0, Ordering::Relaxed);
    }
}

impl<const N: usize> Default for LogRing<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Format into a fixed buffer, returning the bytes written.
/// Truncates silently.
#[inline]
pub fn format_to_buffer(buf: &mut [u8], args: core::fmt::Arguments<'_>) -> usize {
    use core::fmt::Write;

    struct BufWriter<'a> {
        buf: &'a mut [u8],
        pos: usize,
    }

    impl<'a> Write for BufWriter<'a> {
        fn write_str(&mut self, s: &str) -> core::fmt::Result {
            let bytes = s.as_bytes();
            let remaining = self.buf.len() - self.pos;
            let take = bytes.len().min(remaining);
            self.buf[self.pos..self.pos + take].copy_from_slice(&bytes[..take]);
            self.pos += take;
            Ok(())
        }
    }

    let mut writer = BufWriter { buf, pos: 0 };
    let _ = core::fmt::write(&mut writer, args);
    writer.pos
}

/// RT-safe log macro; use in the RT path instead of `log::*`.
#[macro_export]
macro_rules! rt_log {
    ($level:expr, $ring:expr, $timestamp:expr, $($arg:tt)*) => {{
        let mut buf = [0u8; $crate::logging::MAX_MSG_LEN];
        let len = $crate::logging::format_to_buffer(&mut buf, format_args!($($arg)*));
        $ring.push($timestamp, $level, &buf[..len]);
    }};
}

#[macro_export]
macro_rules! rt_info {
    ($ring:expr, $timestamp:expr, $($arg:tt)*) => {
        $crate::rt_log!($crate::logging::LogLevel::Info, $ring, $timestamp, $($arg)*)
    };
}

#[macro_export]
macro_rules! rt_warn {
    ($ring:expr, $timestamp:expr, $($arg:tt)*) => {
        $crate::rt_log!($crate::logging::LogLevel::Warn, $ring, $timestamp, $($arg)*)
    };
}

#[macro_export]
macro_rules! rt_error {
    ($ring:expr, $timestamp:expr, $($arg:tt)*) => {
        $crate::rt_log!($crate::logging::LogLevel::Error, $ring, $timestamp, $($arg)*)
    };
}

#[macro_export]
macro_rules! rt_debug {
    ($ring:expr, $timestamp:expr, $($arg:tt)*) => {
        $crate::rt_log!($crate::logging::LogLevel::Debug, $ring, $timestamp, $($arg)*)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_drain() {
        let ring = LogRing::<16>::new();

        assert!(ring.push(1_000, LogLevel::Info, b"hello"));
        assert!(ring.has_entries());
        assert_eq!(ring.pending(), 1);

        let entry = ring.drain().unwrap();
        assert_eq!(entry.timestamp_us, 1_000);
        assert_eq!(entry.level, LogLevel::Info);
        assert_eq!(entry.message(), "hello");

        assert!(!ring.has_entries());
        assert!(ring.drain().is_none());
    }

    #[test]
    fn test_full_ring_drops_then_recovers() {
        let ring = LogRing::<4>::new();

        for i in 0..4 {
            assert!(ring.push(i, LogLevel::Info, b"x"));
        }
        assert!(!ring.push(5, LogLevel::Info, b"dropped"));
        assert_eq!(ring.dropped(), 1);

        // Freeing one slot makes room again
        ring.drain().unwrap();
        assert!(ring.push(6, LogLevel::Info, b"fits again"));
    }

    #[test]
    fn test_wraps_many_laps() {
        let ring = LogRing::<4>::new();

        for lap in 0..100i64 {
            assert!(ring.push(lap, LogLevel::Debug, b"lap"));
            let entry = ring.drain().unwrap();
            assert_eq!(entry.timestamp_us, lap);
        }
        assert_eq!(ring.dropped(), 0);
    }

    #[test]
    fn test_truncates_long_messages() {
        let ring = LogRing::<4>::new();
        let long = [b'a'; MAX_MSG_LEN + 40];

        assert!(ring.push(0, LogLevel::Warn, &long));
        let entry = ring.drain().unwrap();
        assert_eq!(entry.len as usize, MAX_MSG_LEN);
    }

    #[test]
    fn test_rt_log_macro() {
        let ring = LogRing::<16>::new();
        rt_info!(&ring, 42, "key {} at {}", true, 42);

        let entry = ring.drain().unwrap();
        assert_eq!(entry.level, LogLevel::Info);
        assert_eq!(entry.message(), "key true at 42");
    }

    #[test]
    fn test_concurrent_producers() {
        use std::sync::Arc;
        use std::thread;

        let ring = Arc::new(LogRing::<256>::new());
        let mut handles = std::vec::Vec::new();

        for i in 0..4 {
            let ring = Arc::clone(&ring);
            handles.push(thread::spawn(move || {
                for j in 0..10 {
                    let mut buf = [0u8; MAX_MSG_LEN];
                    let len = format_to_buffer(&mut buf, format_args!("t{} m{}", i, j));
                    ring.push(j as i64, LogLevel::Info, &buf[..len]);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let mut count = 0;
        while ring.drain().is_some() {
            count += 1;
        }
        assert_eq!(count, 40);
    }
}
