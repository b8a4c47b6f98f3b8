//! Fault tripwire.
//!
//! Corrupted CW timing is worse than silence: any timing violation
//! latches the fault and the RT context forces TX and audio off in
//! the same tick. Only an explicit [`FaultState::clear`], issued by
//! recovery logic outside the core, releases it.

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use num_enum::{FromPrimitive, IntoPrimitive};

/// Reason the keyer went silent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum FaultCode {
    /// Normal operation.
    #[num_enum(default)]
    None = 0,

    /// A hard-RT consumer was lapped by the producer; samples were
    /// lost and timing is compromised.
    Overrun = 1,

    /// A hard-RT consumer fell behind its deadline (`lag > max_lag`).
    LatencyExceeded = 2,

    /// The producer found no room to write without clobbering a
    /// registered consumer.
    ProducerOverrun = 3,

    /// Collaborator-reported hardware failure (GPIO, codec).
    Hardware = 4,
}

impl FaultCode {
    /// Short operator-facing name.
    pub fn as_str(self) -> &'static str {
        match self {
            FaultCode::None => "none",
            FaultCode::Overrun => "overrun",
            FaultCode::LatencyExceeded => "latency",
            FaultCode::ProducerOverrun => "producer-overrun",
            FaultCode::Hardware => "hardware",
        }
    }
}

/// One-shot atomic fault latch.
///
/// Writers publish `code` and `data` with relaxed stores and then
/// release-store `active`; a reader that acquire-loads `active` as
/// true therefore observes a consistent code/data pair. `count` is a
/// monotonic occurrence counter that survives [`clear`](Self::clear).
pub struct FaultState {
    active: AtomicBool,
    code: AtomicU8,
    data: AtomicU32,
    count: AtomicU32,
}

impl FaultState {
    /// New, unfaulted state.
    pub const fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
            code: AtomicU8::new(0),
            data: AtomicU32::new(0),
            count: AtomicU32::new(0),
        }
    }

    /// Trip the fault with a reason and payload (e.g. observed lag).
    #[inline]
    pub fn set(&self, code: FaultCode, data: u32) {
        self.code.store(code.into(), Ordering::Relaxed);
        self.data.store(data, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.active.store(true, Ordering::Release);
    }

    /// Is the fault latched?
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Fault reason. Meaningful only while [`is_active`](Self::is_active).
    #[inline]
    pub fn code(&self) -> FaultCode {
        FaultCode::from(self.code.load(Ordering::Relaxed))
    }

    /// Fault payload; its meaning depends on the code.
    #[inline]
    pub fn data(&self) -> u32 {
        self.data.load(Ordering::Relaxed)
    }

    /// Occurrences since boot. Never reset.
    #[inline]
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::Relaxed)
    }

    /// Release the latch after external recovery. The occurrence
    /// counter is preserved for diagnostics.
    #[inline]
    pub fn clear(&self) {
        self.code.store(FaultCode::None.into(), Ordering::Relaxed);
        self.data.store(0, Ordering::Relaxed);
        self.active.store(false, Ordering::Release);
    }

    /// Consistent point-in-time copy for diagnostics readout.
    #[inline]
    pub fn snapshot(&self) -> FaultSnapshot {
        FaultSnapshot {
            active: self.is_active(),
            code: self.code(),
            data: self.data(),
            count: self.count(),
        }
    }
}

impl Default for FaultState {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the fault state.
#[derive(Clone, Copy, Debug)]
pub struct FaultSnapshot {
    pub active: bool,
    pub code: FaultCode,
    pub data: u32,
    pub count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_clear() {
        let fault = FaultState::new();

        assert!(!fault.is_active());
        assert_eq!(fault.code(), FaultCode::None);
        assert_eq!(fault.count(), 0);

        fault.set(FaultCode::LatencyExceeded, 42);
        assert!(fault.is_active());
        assert_eq!(fault.code(), FaultCode::LatencyExceeded);
        assert_eq!(fault.data(), 42);
        assert_eq!(fault.count(), 1);

        fault.clear();
        assert!(!fault.is_active());
        assert_eq!(fault.code(), FaultCode::None);
        assert_eq!(fault.count(), 1);
    }

    #[test]
    fn test_count_accumulates() {
        let fault = FaultState::new();

        fault.set(FaultCode::Overrun, 1);
        fault.clear();
        fault.set(FaultCode::LatencyExceeded, 2);
        fault.clear();
        fault.set(FaultCode::Hardware, 3);

        assert_eq!(fault.count(), 3);
    }

    #[test]
    fn test_code_round_trip() {
        for code in [
            FaultCode::None,
            FaultCode::Overrun,
            FaultCode::LatencyExceeded,
            FaultCode::ProducerOverrun,
            FaultCode::Hardware,
        ] {
            let raw: u8 = code.into();
            assert_eq!(FaultCode::from(raw), code);
        }
        // Out-of-range values collapse to None
        assert_eq!(FaultCode::from(200u8), FaultCode::None);
    }

    #[test]
    fn test_snapshot() {
        let fault = FaultState::new();
        fault.set(FaultCode::Overrun, 4100);

        let snap = fault.snapshot();
        assert!(snap.active);
        assert_eq!(snap.code, FaultCode::Overrun);
        assert_eq!(snap.data, 4100);
        assert_eq!(snap.count, 1);
    }
}
