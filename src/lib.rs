//! # cw-keyer-core
//!
//! Real-time core of an iambic Morse keyer: paddle input in, timed
//! keying out (TX line + sidetone), with the same keying stream fanned
//! out to best-effort consumers (decoder, timeline, network).
//!
//! ## Architecture
//!
//! All keying events flow through one [`KeyingStream`]. Components
//! never talk to each other directly:
//! - the RT context produces samples (iambic FSM merged with the
//!   text sender) and consumes them back through a [`HardRtConsumer`]
//!   that faults rather than run late;
//! - everything else reads through [`BestEffortConsumer`]s that skip
//!   when behind;
//! - a single atomic [`FaultState`] forces the whole pipeline silent
//!   on any timing violation.
//!
//! No locks, no heap, no blocking anywhere in the core.

#![cfg_attr(not(test), no_std)]

pub mod audio;
pub mod config;
pub mod consumer;
pub mod decoder;
pub mod fault;
pub mod hal;
pub mod iambic;
pub mod logging;
pub mod morse;
pub mod pipeline;
pub mod sample;
pub mod sender;
pub mod stream;

pub use audio::{FadeState, PttController, PttState, SidetoneGen};
pub use config::{ConfigError, ConfigSnapshot, IambicMode, KeyerConfig, MemoryMode, SqueezeMode};
pub use consumer::{BestEffortConsumer, HardRtConsumer};
pub use decoder::{DecodedChar, MorseDecoder};
pub use fault::{FaultCode, FaultSnapshot, FaultState};
pub use iambic::{Element, IambicConfig, IambicKeyer};
pub use pipeline::RtPipeline;
pub use sample::{GpioState, KeySample};
pub use sender::{SendError, SenderState, TextSender};
pub use stream::KeyingStream;
