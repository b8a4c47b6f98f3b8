//! PTT (push-to-talk) controller.
//!
//! Turns the transmit-enable line on at the first audio sample of a
//! keying burst and holds it for a configurable tail after the last
//! one, so TX/RX relays don't chatter between elements.

/// PTT line state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PttState {
    /// Receiving.
    Off,
    /// Transmitting.
    On,
}

/// Keying-presence tail timer.
///
/// [`audio_sample`](PttController::audio_sample) is called for every
/// sample that represents actual keying; [`tick`](PttController::tick)
/// runs once per RT tick and drops PTT once the tail expires with no
/// audio seen.
pub struct PttController {
    state: PttState,
    tail_us: i64,
    last_audio_us: i64,
    /// Audio was reported since the last tick.
    audio_this_tick: bool,
}

impl PttController {
    pub fn new(tail_ms: u32) -> Self {
        Self {
            state: PttState::Off,
            tail_us: tail_ms as i64 * 1_000,
            last_audio_us: 0,
            audio_this_tick: false,
        }
    }

    #[inline]
    pub fn state(&self) -> PttState {
        self.state
    }

    #[inline]
    pub fn is_on(&self) -> bool {
        self.state == PttState::On
    }

    /// Report a keying audio sample. Turns PTT on if it was off and
    /// restamps the tail timer.
    #[inline]
    pub fn audio_sample(&mut self, now_us: i64) {
        self.last_audio_us = now_us;
        self.audio_this_tick = true;

        if self.state == PttState::Off {
            self.state = PttState::On;
        }
    }

    /// Per-tick update. Resets the audio-seen flag and turns PTT off
    /// once the tail has elapsed since the last audio sample.
    #[inline]
    pub fn tick(&mut self, now_us: i64) {
        let audio_seen = self.audio_this_tick;
        self.audio_this_tick = false;

        if self.state == PttState::On
            && !audio_seen
            && now_us.saturating_sub(self.last_audio_us) > self.tail_us
        {
            self.state = PttState::Off;
        }
    }

    /// Change the tail length (config change).
    #[inline]
    pub fn set_tail_ms(&mut self, tail_ms: u32) {
        self.tail_us = tail_ms as i64 * 1_000;
    }

    /// Drop PTT immediately (fault handling).
    #[inline]
    pub fn force_off(&mut self) {
        self.state = PttState::Off;
        self.audio_this_tick = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_on_at_first_audio() {
        let mut ptt = PttController::new(200);
        assert!(!ptt.is_on());

        ptt.audio_sample(1_000);
        assert!(ptt.is_on());
    }

    #[test]
    fn test_holds_through_tail() {
        let mut ptt = PttController::new(200);

        ptt.audio_sample(0);
        ptt.tick(0);

        // Inside the tail window
        ptt.tick(100_000);
        assert!(ptt.is_on());
        ptt.tick(200_000);
        assert!(ptt.is_on());

        // Past the tail
        ptt.tick(201_000);
        assert!(!ptt.is_on());
    }

    #[test]
    fn test_audio_restamps_tail() {
        let mut ptt = PttController::new(100);

        ptt.audio_sample(0);
        ptt.tick(0);

        ptt.audio_sample(90_000);
        ptt.tick(90_000);

        // 150 ms after the first sample but only 60 ms after the last
        ptt.tick(150_000);
        assert!(ptt.is_on());

        ptt.tick(191_000);
        assert!(!ptt.is_on());
    }

    #[test]
    fn test_audio_in_same_tick_blocks_timeout() {
        let mut ptt = PttController::new(1);

        ptt.audio_sample(0);
        // Audio arrived this tick, so even a stale stamp keeps PTT up
        ptt.audio_sample(500_000);
        ptt.tick(500_000);
        assert!(ptt.is_on());
    }

    #[test]
    fn test_force_off() {
        let mut ptt = PttController::new(1_000);

        ptt.audio_sample(0);
        assert!(ptt.is_on());

        ptt.force_off();
        assert!(!ptt.is_on());

        // Stays off until new audio
        ptt.tick(1_000);
        assert!(!ptt.is_on());
        ptt.audio_sample(2_000);
        assert!(ptt.is_on());
    }
}
