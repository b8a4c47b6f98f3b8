//! Text-to-Morse sender.
//!
//! A cooperative producer that turns ASCII (plus `<PROSIGN>` tags)
//! into a schedule of keying elements. It runs on the BG tick
//! (~10 ms), publishes its key-down state through a shared atomic
//! that the RT context polls and merges with the iambic output, and
//! yields to paddle input: when the owner raises the shared abort
//! flag the key is released and the message dropped on the next
//! tick, before any further element starts.
//!
//! Element timing is the standard spacing in dit units: dit 1,
//! dah 3, intra-element gap 1, inter-character gap 3, word gap 7
//! (a space adds 4 on top of the character gap already emitted).

use core::sync::atomic::{AtomicBool, Ordering};

use heapless::Vec;

use crate::morse::{pattern_for, prosign_elements, PROSIGN_TAG_MAX};

/// Message buffer capacity in bytes.
pub const MESSAGE_MAX: usize = 256;

/// Caller-visible send rejection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendError {
    /// A message is already in flight; retry when idle.
    Busy,
    /// Input exceeds the message buffer.
    TooLong,
}

impl core::fmt::Display for SendError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SendError::Busy => write!(f, "sender busy"),
            SendError::TooLong => write!(f, "message too long"),
        }
    }
}

/// Sender execution state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SenderState {
    Idle,
    Sending,
    Paused,
}

/// What the schedule is currently inside of.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Slot {
    Mark,
    IntraGap,
    CharGap,
    WordGap,
}

/// What the cursor found next in the message.
enum Unit {
    /// `elements` was loaded with a pattern.
    Pattern,
    /// Word space.
    Space,
    /// Unknown character or malformed tag; skip it.
    Skip,
    /// Message exhausted.
    End,
}

/// The text sender.
///
/// `key_out` is the publication flag the RT owner polls; `abort` is
/// the paddle-activity flag the owner raises to make the sender
/// yield.
pub struct TextSender<'a> {
    key_out: &'a AtomicBool,
    abort: &'a AtomicBool,

    wpm: u32,
    state: SenderState,

    message: Vec<u8, MESSAGE_MAX>,
    cursor: usize,

    /// Element sequence of the unit in flight (`.`/`-` bytes).
    elements: Vec<u8, 64>,
    elem_idx: usize,

    slot: Slot,
    element_end_us: i64,
    pause_remaining_us: i64,
    key_down: bool,
}

impl<'a> TextSender<'a> {
    pub fn new(key_out: &'a AtomicBool, abort: &'a AtomicBool) -> Self {
        Self {
            key_out,
            abort,
            wpm: 20,
            state: SenderState::Idle,
            message: Vec::new(),
            cursor: 0,
            elements: Vec::new(),
            elem_idx: 0,
            slot: Slot::CharGap,
            element_end_us: 0,
            pause_remaining_us: 0,
            key_down: false,
        }
    }

    /// Change speed. Elements already scheduled keep their end time;
    /// the new speed applies from the next element.
    pub fn set_wpm(&mut self, wpm: u32) {
        self.wpm = wpm.max(1);
    }

    #[inline]
    pub fn state(&self) -> SenderState {
        self.state
    }

    #[inline]
    pub fn is_sending(&self) -> bool {
        self.state != SenderState::Idle
    }

    #[inline]
    pub fn key_down(&self) -> bool {
        self.key_down
    }

    /// Queue a message. Single-shot: rejected with [`SendError::Busy`]
    /// while a previous message is still in flight.
    pub fn send(&mut self, text: &str) -> Result<(), SendError> {
        if self.state != SenderState::Idle {
            return Err(SendError::Busy);
        }
        if text.len() > MESSAGE_MAX {
            return Err(SendError::TooLong);
        }

        self.message.clear();
        for byte in text.bytes() {
            // Capacity checked above
            let _ = self.message.push(byte.to_ascii_uppercase());
        }

        self.cursor = 0;
        self.elements.clear();
        self.elem_idx = 0;
        self.slot = Slot::CharGap;
        // Expired end time: the first tick loads the first unit
        self.element_end_us = i64::MIN;
        self.state = SenderState::Sending;
        Ok(())
    }

    /// Cooperative tick (~10 ms). Observes the abort flag, then
    /// advances the element schedule.
    pub fn tick(&mut self, now_us: i64) {
        if self.state != SenderState::Idle && self.abort.load(Ordering::Acquire) {
            // Paddle wins: release the key and drop the message
            self.set_key(false);
            self.message.clear();
            self.state = SenderState::Idle;
            return;
        }

        if self.state != SenderState::Sending {
            return;
        }

        while self.state == SenderState::Sending && now_us >= self.element_end_us {
            self.advance(now_us);
        }
    }

    /// Hold the key up and freeze the in-flight element.
    pub fn pause(&mut self, now_us: i64) {
        if self.state == SenderState::Sending {
            self.pause_remaining_us = (self.element_end_us - now_us).max(0);
            self.set_key(false);
            self.state = SenderState::Paused;
        }
    }

    /// Resume a paused message; the interrupted element finishes its
    /// unplayed remainder starting from `now_us`.
    pub fn resume(&mut self, now_us: i64) {
        if self.state == SenderState::Paused {
            self.element_end_us = now_us + self.pause_remaining_us;
            if self.slot == Slot::Mark {
                self.set_key(true);
            }
            self.state = SenderState::Sending;
        }
    }

    // --- schedule ---

    #[inline]
    fn dit_us(&self) -> i64 {
        1_200_000 / self.wpm as i64
    }

    fn advance(&mut self, now_us: i64) {
        match self.slot {
            Slot::Mark => {
                self.set_key(false);
                self.elem_idx += 1;
                if self.elem_idx < self.elements.len() {
                    self.slot = Slot::IntraGap;
                    self.element_end_us = now_us + self.dit_us();
                } else {
                    self.slot = Slot::CharGap;
                    self.element_end_us = now_us + 3 * self.dit_us();
                }
            }
            Slot::IntraGap => self.start_mark(now_us),
            Slot::CharGap | Slot::WordGap => self.load_next(now_us),
        }
    }

    fn start_mark(&mut self, now_us: i64) {
        let duration = if self.elements[self.elem_idx] == b'-' {
            3 * self.dit_us()
        } else {
            self.dit_us()
        };
        self.slot = Slot::Mark;
        self.element_end_us = now_us + duration;
        self.set_key(true);
    }

    fn load_next(&mut self, now_us: i64) {
        loop {
            match self.next_unit() {
                Unit::End => {
                    self.set_key(false);
                    self.message.clear();
                    self.state = SenderState::Idle;
                    return;
                }
                Unit::Space => {
                    // 4 dits on top of the 3-dit character gap = 7
                    self.slot = Slot::WordGap;
                    self.element_end_us = now_us + 4 * self.dit_us();
                    return;
                }
                Unit::Pattern => {
                    self.elem_idx = 0;
                    self.start_mark(now_us);
                    return;
                }
                Unit::Skip => continue,
            }
        }
    }

    /// Scan the next unit out of the message, loading `elements` for
    /// characters and prosigns.
    fn next_unit(&mut self) -> Unit {
        let Some(&byte) = self.message.get(self.cursor) else {
            return Unit::End;
        };
        self.cursor += 1;

        if byte == b' ' {
            return Unit::Space;
        }

        if byte == b'<' {
            // Prosign tag: letters up to '>' within the tag limit
            let rest = &self.message[self.cursor..];
            let close = rest
                .iter()
                .take(PROSIGN_TAG_MAX + 1)
                .position(|&b| b == b'>');
            let Some(close) = close else {
                return Unit::Skip;
            };

            let tag = &rest[..close];
            self.cursor += close + 1;

            self.elements.clear();
            let tag = match core::str::from_utf8(tag) {
                Ok(tag) => tag,
                Err(_) => return Unit::Skip,
            };
            if prosign_elements(tag, &mut self.elements) {
                return Unit::Pattern;
            }
            return Unit::Skip;
        }

        match pattern_for(byte as char) {
            Some(pattern) => {
                self.elements.clear();
                // Patterns always fit the element buffer
                let _ = self.elements.extend_from_slice(pattern.as_bytes());
                Unit::Pattern
            }
            None => Unit::Skip,
        }
    }

    #[inline]
    fn set_key(&mut self, down: bool) {
        self.key_down = down;
        self.key_out.store(down, Ordering::Release);
    }
}
