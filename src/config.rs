//! Process-wide keyer configuration.
//!
//! One record of atomics, created by the initialisation routine and
//! passed by reference to the components that need it. Mutating
//! setters validate their range, store the field with relaxed
//! ordering, and release-bump a generation counter; readers on any
//! path load fields relaxed and use the generation counter as the
//! single synchronising read for change detection.
//!
//! Writers are single at any instant by convention (the operator I/O
//! paths serialise themselves); readers are unrestricted.
//!
//! [`ConfigSnapshot`] is the serde-friendly plain form used by the
//! out-of-scope persistence store: polled once at init, written
//! through asynchronously on mutation.

use core::sync::atomic::{AtomicU16, AtomicU32, AtomicU8, Ordering};

use num_enum::{FromPrimitive, IntoPrimitive};
use serde::{Deserialize, Serialize};

/// Lowest accepted keying speed.
pub const WPM_MIN: u32 = 5;

/// Highest accepted keying speed.
pub const WPM_MAX: u32 = 100;

/// Iambic squeeze-release behaviour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive, IntoPrimitive, Serialize, Deserialize)]
#[repr(u8)]
pub enum IambicMode {
    /// Stop at the current element's end when both paddles release.
    A = 0,
    /// Send one bonus element of the opposite kind after release.
    #[num_enum(default)]
    B = 1,
}

/// Which paddle presses are latched for the next element slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive, IntoPrimitive, Serialize, Deserialize)]
#[repr(u8)]
pub enum MemoryMode {
    /// No latching.
    None = 0,
    /// Latch dit presses only.
    DitOnly = 1,
    /// Latch dah presses only.
    DahOnly = 2,
    /// Latch both.
    #[num_enum(default)]
    Both = 3,
}

/// How the memory window observes the paddles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive, IntoPrimitive, Serialize, Deserialize)]
#[repr(u8)]
pub enum SqueezeMode {
    /// Sample the opposite paddle live during the window.
    #[num_enum(default)]
    Live = 0,
    /// Evaluate the window against a snapshot of both paddles taken
    /// at element start.
    Latched = 1,
}

/// Typed rejection for a mutating setter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// Value outside the accepted range; the prior value is kept.
    OutOfRange,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ConfigError::OutOfRange => write!(f, "value out of range"),
        }
    }
}

/// The process-wide configuration record.
///
/// `const fn new()` yields the firmware defaults; [`apply`]
/// (Self::apply) overlays a persisted snapshot at init.
pub struct KeyerConfig {
    wpm: AtomicU32,
    mode: AtomicU8,
    memory_mode: AtomicU8,
    squeeze_mode: AtomicU8,
    window_start_pct: AtomicU8,
    window_end_pct: AtomicU8,
    sidetone_hz: AtomicU32,
    fade_samples: AtomicU16,
    sample_rate: AtomicU32,
    ptt_tail_ms: AtomicU32,
    max_lag: AtomicU32,
    tick_us: AtomicU32,
    generation: AtomicU16,
}

impl KeyerConfig {
    /// Defaults: 20 WPM, mode B, both memories, live squeeze, full
    /// memory window, 700 Hz sidetone with a 5 ms fade at 8 kHz,
    /// 800 ms PTT tail, 8-sample RT deadline, 1 ms RT tick.
    pub const fn new() -> Self {
        Self {
            wpm: AtomicU32::new(20),
            mode: AtomicU8::new(IambicMode::B as u8),
            memory_mode: AtomicU8::new(MemoryMode::Both as u8),
            squeeze_mode: AtomicU8::new(SqueezeMode::Live as u8),
            window_start_pct: AtomicU8::new(0),
            window_end_pct: AtomicU8::new(100),
            sidetone_hz: AtomicU32::new(700),
            fade_samples: AtomicU16::new(40),
            sample_rate: AtomicU32::new(8_000),
            ptt_tail_ms: AtomicU32::new(800),
            max_lag: AtomicU32::new(8),
            tick_us: AtomicU32::new(1_000),
            generation: AtomicU16::new(0),
        }
    }

    // --- readers (relaxed; generation is the sync point) ---

    pub fn wpm(&self) -> u32 {
        self.wpm.load(Ordering::Relaxed)
    }

    pub fn mode(&self) -> IambicMode {
        IambicMode::from(self.mode.load(Ordering::Relaxed))
    }

    pub fn memory_mode(&self) -> MemoryMode {
        MemoryMode::from(self.memory_mode.load(Ordering::Relaxed))
    }

    pub fn squeeze_mode(&self) -> SqueezeMode {
        SqueezeMode::from(self.squeeze_mode.load(Ordering::Relaxed))
    }

    /// Memory window bounds in percent of the running interval.
    /// `end < start` disables the window.
    pub fn memory_window(&self) -> (u8, u8) {
        (
            self.window_start_pct.load(Ordering::Relaxed),
            self.window_end_pct.load(Ordering::Relaxed),
        )
    }

    pub fn sidetone_hz(&self) -> u32 {
        self.sidetone_hz.load(Ordering::Relaxed)
    }

    pub fn fade_samples(&self) -> u16 {
        self.fade_samples.load(Ordering::Relaxed)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Relaxed)
    }

    pub fn ptt_tail_ms(&self) -> u32 {
        self.ptt_tail_ms.load(Ordering::Relaxed)
    }

    /// Hard-RT consumer deadline in samples.
    pub fn max_lag(&self) -> u32 {
        self.max_lag.load(Ordering::Relaxed)
    }

    /// RT tick period in microseconds.
    pub fn tick_us(&self) -> u32 {
        self.tick_us.load(Ordering::Relaxed)
    }

    /// Change-detection counter. Bumped by every successful setter.
    pub fn generation(&self) -> u16 {
        self.generation.load(Ordering::Acquire)
    }

    // --- setters (validate, relaxed store, release generation bump) ---

    pub fn set_wpm(&self, wpm: u32) -> Result<(), ConfigError> {
        if !(WPM_MIN..=WPM_MAX).contains(&wpm) {
            return Err(ConfigError::OutOfRange);
        }
        self.wpm.store(wpm, Ordering::Relaxed);
        self.bump();
        log::info!("config: wpm = {}", wpm);
        Ok(())
    }

    pub fn set_mode(&self, mode: IambicMode) {
        self.mode.store(mode.into(), Ordering::Relaxed);
        self.bump();
        log::info!("config: iambic mode = {:?}", mode);
    }

    pub fn set_memory_mode(&self, mode: MemoryMode) {
        self.memory_mode.store(mode.into(), Ordering::Relaxed);
        self.bump();
        log::info!("config: memory mode = {:?}", mode);
    }

    pub fn set_squeeze_mode(&self, mode: SqueezeMode) {
        self.squeeze_mode.store(mode.into(), Ordering::Relaxed);
        self.bump();
        log::info!("config: squeeze mode = {:?}", mode);
    }

    /// Set the memory window. Both bounds must be percentages; an
    /// inverted window (`end < start`) is accepted and disables
    /// latching.
    pub fn set_memory_window(&self, start_pct: u8, end_pct: u8) -> Result<(), ConfigError> {
        if start_pct > 100 || end_pct > 100 {
            return Err(ConfigError::OutOfRange);
        }
        self.window_start_pct.store(start_pct, Ordering::Relaxed);
        self.window_end_pct.store(end_pct, Ordering::Relaxed);
        self.bump();
        Ok(())
    }

    pub fn set_sidetone_hz(&self, hz: u32) -> Result<(), ConfigError> {
        if !(100..=4_000).contains(&hz) {
            return Err(ConfigError::OutOfRange);
        }
        self.sidetone_hz.store(hz, Ordering::Relaxed);
        self.bump();
        Ok(())
    }

    pub fn set_fade_samples(&self, samples: u16) -> Result<(), ConfigError> {
        if samples == 0 {
            return Err(ConfigError::OutOfRange);
        }
        self.fade_samples.store(samples, Ordering::Relaxed);
        self.bump();
        Ok(())
    }

    pub fn set_ptt_tail_ms(&self, ms: u32) -> Result<(), ConfigError> {
        if ms > 10_000 {
            return Err(ConfigError::OutOfRange);
        }
        self.ptt_tail_ms.store(ms, Ordering::Relaxed);
        self.bump();
        Ok(())
    }

    pub fn set_max_lag(&self, samples: u32) -> Result<(), ConfigError> {
        if samples == 0 {
            return Err(ConfigError::OutOfRange);
        }
        self.max_lag.store(samples, Ordering::Relaxed);
        self.bump();
        Ok(())
    }

    /// Copy the record into its persistable plain form.
    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            wpm: self.wpm(),
            mode: self.mode(),
            memory_mode: self.memory_mode(),
            squeeze_mode: self.squeeze_mode(),
            window_start_pct: self.memory_window().0,
            window_end_pct: self.memory_window().1,
            sidetone_hz: self.sidetone_hz(),
            fade_samples: self.fade_samples(),
            sample_rate: self.sample_rate(),
            ptt_tail_ms: self.ptt_tail_ms(),
            max_lag: self.max_lag(),
            tick_us: self.tick_us(),
        }
    }

    /// Overlay a persisted snapshot, validating every field. On any
    /// out-of-range field the whole snapshot is rejected and the
    /// record is left unchanged. Bumps the generation once.
    pub fn apply(&self, snap: &ConfigSnapshot) -> Result<(), ConfigError> {
        if !(WPM_MIN..=WPM_MAX).contains(&snap.wpm)
            || snap.window_start_pct > 100
            || snap.window_end_pct > 100
            || !(100..=4_000).contains(&snap.sidetone_hz)
            || snap.fade_samples == 0
            || snap.ptt_tail_ms > 10_000
            || snap.max_lag == 0
            || snap.tick_us == 0
        {
            return Err(ConfigError::OutOfRange);
        }

        self.wpm.store(snap.wpm, Ordering::Relaxed);
        self.mode.store(snap.mode.into(), Ordering::Relaxed);
        self.memory_mode.store(snap.memory_mode.into(), Ordering::Relaxed);
        self.squeeze_mode.store(snap.squeeze_mode.into(), Ordering::Relaxed);
        self.window_start_pct.store(snap.window_start_pct, Ordering::Relaxed);
        self.window_end_pct.store(snap.window_end_pct, Ordering::Relaxed);
        self.sidetone_hz.store(snap.sidetone_hz, Ordering::Relaxed);
        self.fade_samples.store(snap.fade_samples, Ordering::Relaxed);
        self.sample_rate.store(snap.sample_rate, Ordering::Relaxed);
        self.ptt_tail_ms.store(snap.ptt_tail_ms, Ordering::Relaxed);
        self.max_lag.store(snap.max_lag, Ordering::Relaxed);
        self.tick_us.store(snap.tick_us, Ordering::Relaxed);
        self.bump();
        log::info!("config: snapshot applied");
        Ok(())
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::Release);
    }
}

impl Default for KeyerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Plain, persistable copy of the configuration record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub wpm: u32,
    pub mode: IambicMode,
    pub memory_mode: MemoryMode,
    pub squeeze_mode: SqueezeMode,
    pub window_start_pct: u8,
    pub window_end_pct: u8,
    pub sidetone_hz: u32,
    pub fade_samples: u16,
    pub sample_rate: u32,
    pub ptt_tail_ms: u32,
    pub max_lag: u32,
    pub tick_us: u32,
}
