//! Iambic keyer finite-state machine.
//!
//! Pure logic: consumes paddle state and a monotonic timestamp,
//! produces the keying output for that tick. No hardware, fully
//! testable on the host.
//!
//! Timing is PARIS-derived: dit = 1.2 s / WPM, dah = 3 dits, the
//! inter-element gap = 1 dit. Elements are atomic in time: once a
//! mark starts, paddle changes can never shorten it.
//!
//! # Squeeze handling
//!
//! - **Mode A** stops at the running element's end when both paddles
//!   release.
//! - **Mode B** sends one bonus element of the opposite kind if a
//!   squeeze was seen at any point during the just-finished element.
//!
//! # Paddle memory
//!
//! Presses of the opposite paddle that land inside the configured
//! memory window (a percent range of the running mark or gap) are
//! latched for the next element slot, gated by [`MemoryMode`].
//! [`SqueezeMode::Live`] samples the paddle as it is now and latches
//! only presses that arrived after the interval began; a paddle held
//! since the start is the gap decision's business. With
//! [`SqueezeMode::Latched`] the window is evaluated against a
//! snapshot of both paddles taken when the element started, so a
//! squeeze present at element start commits the following element
//! even if released mid-way.

use crate::config::{IambicMode, KeyerConfig, MemoryMode, SqueezeMode};
use crate::sample::{GpioState, KeySample};

/// Keying element kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Element {
    Dit,
    Dah,
}

impl Element {
    /// The other element kind.
    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            Element::Dit => Element::Dah,
            Element::Dah => Element::Dit,
        }
    }
}

/// FSM state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Idle,
    SendDit,
    SendDah,
    Gap,
}

/// Per-instance iambic configuration, snapshotted from the shared
/// [`KeyerConfig`] record by the RT owner.
#[derive(Clone, Copy, Debug)]
pub struct IambicConfig {
    /// Speed in words per minute (PARIS timing).
    pub wpm: u32,

    /// Squeeze-release behaviour.
    pub mode: IambicMode,

    /// Which paddle memories may latch.
    pub memory_mode: MemoryMode,

    /// How the memory window observes the paddles.
    pub squeeze_mode: SqueezeMode,

    /// Memory window start, percent of the running interval.
    pub window_start_pct: u8,

    /// Memory window end, percent. `end < start` disables latching.
    pub window_end_pct: u8,
}

impl Default for IambicConfig {
    fn default() -> Self {
        Self {
            wpm: 20,
            mode: IambicMode::B,
            memory_mode: MemoryMode::Both,
            squeeze_mode: SqueezeMode::Live,
            window_start_pct: 0,
            window_end_pct: 100,
        }
    }
}

impl IambicConfig {
    /// Default settings at the given speed.
    pub fn with_wpm(wpm: u32) -> Self {
        Self {
            wpm,
            ..Default::default()
        }
    }

    /// Snapshot the iambic fields of the shared record.
    pub fn from_shared(config: &KeyerConfig) -> Self {
        let (start, end) = config.memory_window();
        Self {
            wpm: config.wpm(),
            mode: config.mode(),
            memory_mode: config.memory_mode(),
            squeeze_mode: config.squeeze_mode(),
            window_start_pct: start,
            window_end_pct: end,
        }
    }

    /// Dit duration in microseconds (PARIS: 1.2 s / WPM).
    #[inline]
    pub fn dit_duration_us(&self) -> i64 {
        1_200_000 / self.wpm as i64
    }

    /// Dah duration in microseconds (3 dits).
    #[inline]
    pub fn dah_duration_us(&self) -> i64 {
        self.dit_duration_us() * 3
    }

    /// Inter-element gap in microseconds (1 dit).
    #[inline]
    pub fn gap_duration_us(&self) -> i64 {
        self.dit_duration_us()
    }
}

/// The iambic FSM.
///
/// Owned by the RT context; `tick` is called once per RT tick with
/// the current monotonic time and the sampled paddle state, and
/// returns the keying sample for that tick. Edge flags are derived
/// later by the stream producer.
pub struct IambicKeyer {
    config: IambicConfig,

    state: State,
    /// Start of the running interval (mark or gap).
    element_start_us: i64,
    /// End of the running interval.
    element_end_us: i64,
    /// Duration of the running interval.
    element_duration_us: i64,
    last_element: Element,

    // Paddle state this tick
    dit_pressed: bool,
    dah_pressed: bool,

    // Memory latches for the next element slot
    dit_latch: bool,
    dah_latch: bool,

    /// Paddles at element start (latched-squeeze evaluation).
    element_gpio: GpioState,
    /// Paddles at the start of the running interval (new-press test).
    interval_gpio: GpioState,

    /// A squeeze was observed during the running/last element.
    squeeze_seen: bool,

    key_down: bool,
}

impl IambicKeyer {
    pub fn new(config: IambicConfig) -> Self {
        Self {
            config,
            state: State::Idle,
            element_start_us: 0,
            element_end_us: 0,
            element_duration_us: 0,
            // Dah, so the first squeeze leads with a dit
            last_element: Element::Dah,
            dit_pressed: false,
            dah_pressed: false,
            dit_latch: false,
            dah_latch: false,
            element_gpio: GpioState::IDLE,
            interval_gpio: GpioState::IDLE,
            squeeze_seen: false,
            key_down: false,
        }
    }

    /// Replace the configuration. The running element keeps the
    /// duration it started with; new timing applies from the next
    /// element.
    pub fn set_config(&mut self, config: IambicConfig) {
        self.config = config;
    }

    pub fn config(&self) -> &IambicConfig {
        &self.config
    }

    /// Keyer output currently active?
    #[inline]
    pub fn is_key_down(&self) -> bool {
        self.key_down
    }

    /// Force the FSM back to idle (fault handling).
    pub fn reset(&mut self) {
        self.state = State::Idle;
        self.element_start_us = 0;
        self.element_end_us = 0;
        self.element_duration_us = 0;
        self.dit_latch = false;
        self.dah_latch = false;
        self.squeeze_seen = false;
        self.key_down = false;
    }

    /// Advance the FSM one tick.
    #[inline]
    pub fn tick(&mut self, now_us: i64, gpio: GpioState) -> KeySample {
        self.dit_pressed = gpio.dit();
        self.dah_pressed = gpio.dah();

        match self.state {
            State::Idle => self.tick_idle(now_us, gpio),
            State::SendDit => self.tick_mark(now_us, gpio, Element::Dit),
            State::SendDah => self.tick_mark(now_us, gpio, Element::Dah),
            State::Gap => self.tick_gap(now_us, gpio),
        }

        KeySample {
            gpio,
            local_key: self.key_down,
            audio_level: 0,
            flags: 0,
            config_gen: 0,
        }
    }

    // --- state handlers ---

    fn tick_idle(&mut self, now_us: i64, gpio: GpioState) {
        let next = match (self.dit_pressed, self.dah_pressed) {
            (true, false) => Some(Element::Dit),
            (false, true) => Some(Element::Dah),
            // Squeeze from idle: alternate against the last element
            (true, true) => Some(self.last_element.opposite()),
            (false, false) => {
                self.squeeze_seen = false;
                None
            }
        };

        if let Some(element) = next {
            self.dit_latch = false;
            self.dah_latch = false;
            self.start_element(element, now_us, gpio);
        }
    }

    fn tick_mark(&mut self, now_us: i64, gpio: GpioState, element: Element) {
        if now_us < self.element_end_us {
            // Mark running; paddle release never shortens it
            self.eval_memory_window(now_us, gpio, element);

            // Mode B bonus trigger is window-independent
            if self.config.mode == IambicMode::B && gpio.both() {
                self.squeeze_seen = true;
            }
        } else {
            self.key_down = false;
            self.last_element = element;
            self.state = State::Gap;
            self.element_start_us = now_us;
            self.element_duration_us = self.config.gap_duration_us();
            self.element_end_us = now_us + self.element_duration_us;
            self.interval_gpio = gpio;
        }
    }

    fn tick_gap(&mut self, now_us: i64, gpio: GpioState) {
        if now_us < self.element_end_us {
            self.eval_memory_window(now_us, gpio, self.last_element);
        } else {
            self.state = State::Idle;
            if let Some(element) = self.next_after_gap() {
                self.start_element(element, now_us, gpio);
            }
        }
    }

    /// Decide what follows a finished gap, consuming latches.
    fn next_after_gap(&mut self) -> Option<Element> {
        let same = self.last_element;
        let opposite = same.opposite();

        if self.pressed(opposite) || self.latched(opposite) {
            self.clear_latch(opposite);
            return Some(opposite);
        }

        if self.pressed(same) || self.latched(same) {
            self.clear_latch(same);
            return Some(same);
        }

        // Mode B: paddles released, but a squeeze was seen during the
        // just-finished element, so send exactly one bonus element
        if self.config.mode == IambicMode::B && self.squeeze_seen {
            self.squeeze_seen = false;
            return Some(opposite);
        }

        None
    }

    fn start_element(&mut self, element: Element, now_us: i64, gpio: GpioState) {
        self.key_down = true;
        self.state = match element {
            Element::Dit => State::SendDit,
            Element::Dah => State::SendDah,
        };
        self.element_start_us = now_us;
        self.element_duration_us = match element {
            Element::Dit => self.config.dit_duration_us(),
            Element::Dah => self.config.dah_duration_us(),
        };
        self.element_end_us = now_us + self.element_duration_us;
        self.element_gpio = gpio;
        self.interval_gpio = gpio;
        self.squeeze_seen = gpio.both();
    }

    /// Memory-window evaluation for the running interval. `current`
    /// is the element being sent (marks) or just sent (gaps).
    fn eval_memory_window(&mut self, now_us: i64, gpio: GpioState, current: Element) {
        let start_pct = self.config.window_start_pct as i64;
        let end_pct = self.config.window_end_pct as i64;
        if end_pct < start_pct || self.element_duration_us <= 0 {
            // Inverted window: latches never arm
            return;
        }

        let frac = (now_us - self.element_start_us) * 100 / self.element_duration_us;
        if frac < start_pct || frac > end_pct {
            return;
        }

        let other = current.opposite();
        match self.config.squeeze_mode {
            SqueezeMode::Live => {
                let pressed_now = match other {
                    Element::Dit => gpio.dit(),
                    Element::Dah => gpio.dah(),
                };
                let pressed_at_start = match other {
                    Element::Dit => self.interval_gpio.dit(),
                    Element::Dah => self.interval_gpio.dah(),
                };
                if pressed_now && !pressed_at_start {
                    self.arm_latch(other);
                }
            }
            SqueezeMode::Latched => {
                let pressed_at_element_start = match other {
                    Element::Dit => self.element_gpio.dit(),
                    Element::Dah => self.element_gpio.dah(),
                };
                if pressed_at_element_start {
                    self.arm_latch(other);
                }
                if self.element_gpio.both() {
                    self.squeeze_seen = true;
                }
            }
        }
    }

    fn arm_latch(&mut self, element: Element) {
        match element {
            Element::Dit => {
                if matches!(self.config.memory_mode, MemoryMode::DitOnly | MemoryMode::Both) {
                    self.dit_latch = true;
                }
            }
            Element::Dah => {
                if matches!(self.config.memory_mode, MemoryMode::DahOnly | MemoryMode::Both) {
                    self.dah_latch = true;
                }
            }
        }
    }

    fn pressed(&self, element: Element) -> bool {
        match element {
            Element::Dit => self.dit_pressed,
            Element::Dah => self.dah_pressed,
        }
    }

    fn latched(&self, element: Element) -> bool {
        match element {
            Element::Dit => self.dit_latch,
            Element::Dah => self.dah_latch,
        }
    }

    fn clear_latch(&mut self, element: Element) {
        match element {
            Element::Dit => self.dit_latch = false,
            Element::Dah => self.dah_latch = false,
        }
    }
}
