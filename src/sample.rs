//! Keying samples: the unit that flows through the stream.
//!
//! A [`KeySample`] is one time-slice of keyer state. All samples are
//! time-aligned at the RT tick rate; a run of unchanged ticks is
//! collapsed by the stream into a single silence record whose
//! `config_gen` field carries the run length.
//!
//! Size: 6 bytes.
//!
//! ```text
//! [gpio:1][local_key:1][audio_level:1][flags:1][config_gen:2]
//! ```

/// GPIO paddle state.
///
/// Physical state of the DIT and DAH paddle inputs, packed into one
/// byte. Bits 2-7 are reserved (straight key, extra inputs).
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GpioState(u8);

impl GpioState {
    /// DIT paddle bit mask (bit 0).
    pub const DIT: u8 = 0x01;

    /// DAH paddle bit mask (bit 1).
    pub const DAH: u8 = 0x02;

    /// No paddles pressed.
    pub const IDLE: Self = Self(0);

    /// Both paddles pressed (squeeze).
    pub const BOTH: Self = Self(Self::DIT | Self::DAH);

    /// Create an idle state.
    pub const fn new() -> Self {
        Self(0)
    }

    /// Create from raw GPIO bits.
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Raw bits value.
    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// Set or clear the DIT bit.
    pub fn set_dit(&mut self, pressed: bool) {
        if pressed {
            self.0 |= Self::DIT;
        } else {
            self.0 &= !Self::DIT;
        }
    }

    /// Set or clear the DAH bit.
    pub fn set_dah(&mut self, pressed: bool) {
        if pressed {
            self.0 |= Self::DAH;
        } else {
            self.0 &= !Self::DAH;
        }
    }

    /// DIT paddle pressed?
    pub const fn dit(&self) -> bool {
        (self.0 & Self::DIT) != 0
    }

    /// DAH paddle pressed?
    pub const fn dah(&self) -> bool {
        (self.0 & Self::DAH) != 0
    }

    /// No paddles pressed?
    pub const fn is_idle(&self) -> bool {
        self.0 == 0
    }

    /// Both paddles pressed?
    pub const fn both(&self) -> bool {
        (self.0 & (Self::DIT | Self::DAH)) == (Self::DIT | Self::DAH)
    }

    /// Only DIT pressed?
    pub const fn dit_only(&self) -> bool {
        self.0 == Self::DIT
    }

    /// Only DAH pressed?
    pub const fn dah_only(&self) -> bool {
        self.0 == Self::DAH
    }
}

// ============================================================================
// Sample flags
// ============================================================================

/// GPIO state changed this tick (edge derived by the producer).
pub const FLAG_GPIO_EDGE: u8 = 0x01;

/// Configuration generation changed at this sample.
pub const FLAG_CONFIG_CHANGE: u8 = 0x02;

/// TX session started (RX → TX transition).
pub const FLAG_TX_START: u8 = 0x04;

/// RX session started (TX → RX transition, after PTT tail).
pub const FLAG_RX_START: u8 = 0x08;

/// Silence record: `config_gen` holds the run length in ticks.
pub const FLAG_SILENCE: u8 = 0x10;

/// Keyer output changed this tick (edge derived by the producer).
pub const FLAG_LOCAL_EDGE: u8 = 0x20;

/// A single sample in the keying stream.
///
/// `config_gen` is overloaded: it carries the configuration
/// generation number, except on silence records (`FLAG_SILENCE`)
/// where it is the run-length tick count. Silence records are
/// informational; consumers that only track state skip them.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeySample {
    /// Raw paddle input.
    pub gpio: GpioState,

    /// Keyer output (transmitter key state) after iambic processing.
    pub local_key: bool,

    /// Sidetone amplitude hint, 0 = silent, 255 = full.
    pub audio_level: u8,

    /// Flag bits, see the `FLAG_*` constants.
    pub flags: u8,

    /// Configuration generation, or silence run length.
    pub config_gen: u16,
}

impl KeySample {
    /// All-zero sample.
    pub const EMPTY: Self = Self {
        gpio: GpioState::IDLE,
        local_key: false,
        audio_level: 0,
        flags: 0,
        config_gen: 0,
    };

    /// Build a silence record carrying `ticks` folded ticks.
    pub const fn silence(ticks: u16) -> Self {
        Self {
            gpio: GpioState::IDLE,
            local_key: false,
            audio_level: 0,
            flags: FLAG_SILENCE,
            config_gen: ticks,
        }
    }

    /// Is this a silence record?
    pub const fn is_silence(&self) -> bool {
        (self.flags & FLAG_SILENCE) != 0
    }

    /// Run length of a silence record. Meaningless unless
    /// [`is_silence`](Self::is_silence) is true.
    pub const fn silence_ticks(&self) -> u16 {
        self.config_gen
    }

    /// Do the observable fields (gpio, key output, audio level)
    /// match `other`? Flags and generation are not observable.
    pub const fn observable_eq(&self, other: &Self) -> bool {
        self.gpio.bits() == other.gpio.bits()
            && self.local_key == other.local_key
            && self.audio_level == other.audio_level
    }

    /// Edge flags of `self` relative to the previously pushed sample.
    pub const fn edges_from(&self, prev: &Self) -> u8 {
        let mut flags = 0;
        if self.gpio.bits() != prev.gpio.bits() {
            flags |= FLAG_GPIO_EDGE;
        }
        if self.local_key != prev.local_key {
            flags |= FLAG_LOCAL_EDGE;
        }
        flags
    }

    /// Copy of `self` with edge flags derived from `prev` merged in.
    pub const fn with_edges_from(&self, prev: &Self) -> Self {
        let mut out = *self;
        out.flags |= self.edges_from(prev);
        out
    }

    /// Would pushing `self` after `prev` record anything new?
    ///
    /// False only when the observable fields match and `self`
    /// carries no flag that must be preserved; such ticks are folded
    /// into the stream's idle accumulator.
    pub const fn has_change_from(&self, prev: &Self) -> bool {
        !self.observable_eq(prev) || self.flags != 0
    }

    /// Config-change marker set?
    pub const fn config_changed(&self) -> bool {
        (self.flags & FLAG_CONFIG_CHANGE) != 0
    }

    /// TX-start marker set?
    pub const fn tx_started(&self) -> bool {
        (self.flags & FLAG_TX_START) != 0
    }

    /// RX-start marker set?
    pub const fn rx_started(&self) -> bool {
        (self.flags & FLAG_RX_START) != 0
    }

    /// GPIO edge marker set?
    pub const fn has_gpio_edge(&self) -> bool {
        (self.flags & FLAG_GPIO_EDGE) != 0
    }

    /// Keyer-output edge marker set?
    pub const fn has_local_edge(&self) -> bool {
        (self.flags & FLAG_LOCAL_EDGE) != 0
    }
}

impl Default for KeySample {
    fn default() -> Self {
        Self::EMPTY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_sample_size() {
        assert_eq!(core::mem::size_of::<KeySample>(), 6);
    }

    #[test]
    fn test_gpio_state_bits() {
        let mut gpio = GpioState::new();
        assert!(gpio.is_idle());

        gpio.set_dit(true);
        assert!(gpio.dit());
        assert!(gpio.dit_only());
        assert!(!gpio.dah());

        gpio.set_dah(true);
        assert!(gpio.both());
        assert!(!gpio.dit_only());
        assert!(!gpio.dah_only());

        gpio.set_dit(false);
        assert!(gpio.dah_only());
        assert_eq!(gpio, GpioState::from_bits(GpioState::DAH));
    }

    #[test]
    fn test_silence_record() {
        let rec = KeySample::silence(1234);
        assert!(rec.is_silence());
        assert_eq!(rec.silence_ticks(), 1234);
        assert!(!rec.local_key);
    }

    #[test]
    fn test_edges_from_previous() {
        let prev = KeySample::EMPTY;

        let mut down = KeySample::EMPTY;
        down.local_key = true;
        assert_eq!(down.edges_from(&prev), FLAG_LOCAL_EDGE);

        let mut paddle = KeySample::EMPTY;
        paddle.gpio = GpioState::from_bits(GpioState::DIT);
        assert_eq!(paddle.edges_from(&prev), FLAG_GPIO_EDGE);

        let both = KeySample {
            gpio: GpioState::BOTH,
            local_key: true,
            ..KeySample::EMPTY
        };
        let flagged = both.with_edges_from(&prev);
        assert!(flagged.has_gpio_edge());
        assert!(flagged.has_local_edge());
    }

    #[test]
    fn test_change_detection() {
        let prev = KeySample::EMPTY;

        // Identical observable state, no flags: foldable
        assert!(!KeySample::EMPTY.has_change_from(&prev));

        // Observable change
        let mut keyed = KeySample::EMPTY;
        keyed.local_key = true;
        assert!(keyed.has_change_from(&prev));

        // Marker flag must be recorded even with no observable change
        let mut marked = KeySample::EMPTY;
        marked.flags = FLAG_CONFIG_CHANGE;
        assert!(marked.has_change_from(&prev));
    }

    #[test]
    fn test_marker_flags() {
        let mut sample = KeySample::EMPTY;

        sample.flags = FLAG_CONFIG_CHANGE;
        assert!(sample.config_changed());
        assert!(!sample.tx_started());

        sample.flags = FLAG_TX_START | FLAG_GPIO_EDGE;
        assert!(sample.tx_started());
        assert!(sample.has_gpio_edge());
        assert!(!sample.rx_started());

        sample.flags = FLAG_RX_START;
        assert!(sample.rx_started());
    }
}
