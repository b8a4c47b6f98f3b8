//! Audio subsystem: sidetone synthesis and PTT control.
//!
//! - Sidetone: 256-entry sine LUT + 32-bit phase accumulator, Q15
//!   linear fade envelope, no floating point in the hot path
//! - PTT: keying-presence tail timer driven by the sidetone

pub mod lut;
pub mod ptt;
pub mod sidetone;

pub use lut::{LUT_SIZE, SINE_LUT};
pub use ptt::{PttController, PttState};
pub use sidetone::{FadeState, SidetoneGen};
