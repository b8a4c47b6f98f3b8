//! Collaborator seams.
//!
//! The core names the contracts it needs from the hardware layer;
//! the implementations (GPIO drivers, I2S codecs) live outside and
//! must all be non-blocking.

use crate::sample::GpioState;

/// Paddle input, sampled once per RT tick.
pub trait PaddleInput {
    /// Coherent snapshot of both paddle lines.
    fn read_paddles(&mut self) -> GpioState;
}

/// Transmitter key line, driven once per RT tick.
pub trait TxLine {
    fn set_tx(&mut self, on: bool);
}

/// Mono signed-16-bit PCM sink at the configured sample rate.
///
/// Receives `sample_rate / tick_rate` samples per RT tick and must
/// accept them without blocking; dropping samples is acceptable only
/// while the fault latch is active.
pub trait AudioSink {
    fn write(&mut self, samples: &[i16]);
}

/// Byte sink for the network forwarder. Best-effort: the forwarder
/// runs on the BG context and may drop on congestion; the keying
/// pipeline never waits for it.
pub trait ByteSink {
    fn send(&mut self, bytes: &[u8]);
}
