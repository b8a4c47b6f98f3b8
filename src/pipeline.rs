//! RT-context pipeline.
//!
//! One struct owning everything the RT thread touches: the iambic
//! FSM, the stream producer role, the hard-RT consumer, the sidetone
//! generator and the PTT controller. The embedding runtime pins a
//! thread, arranges a drift-free tick and calls [`RtPipeline::tick`]
//! once per period with the sampled paddles.
//!
//! Per tick: read paddles → iambic FSM → merge the text sender's
//! key flag → push → consume → drive TX, sidetone and PTT. Any
//! deadline violation trips the fault and forces TX and audio
//! silent within the same tick; they stay silent until
//! [`RtPipeline::recover`].

use core::sync::atomic::{AtomicBool, Ordering};

use crate::audio::{PttController, SidetoneGen};
use crate::config::KeyerConfig;
use crate::consumer::HardRtConsumer;
use crate::fault::FaultState;
use crate::hal::{AudioSink, PaddleInput, TxLine};
use crate::iambic::{IambicConfig, IambicKeyer};
use crate::sample::{FLAG_CONFIG_CHANGE, FLAG_RX_START, FLAG_TX_START};
use crate::stream::{KeyingStream, DEFAULT_STREAM_CAPACITY};

/// Upper bound on audio samples generated per tick.
const MAX_SAMPLES_PER_TICK: usize = 32;

/// Stream records consumed per tick before yielding.
const CONSUME_BUDGET: u32 = 4;

/// The hard-RT execution context, in library form.
pub struct RtPipeline<'a, const N: usize = DEFAULT_STREAM_CAPACITY> {
    stream: &'a KeyingStream<N>,
    fault: &'a FaultState,
    config: &'a KeyerConfig,

    /// Text sender's published key state, merged into the output.
    sender_key: &'a AtomicBool,
    /// Raised while the paddles are active; the sender yields on it.
    paddle_abort: &'a AtomicBool,

    keyer: IambicKeyer,
    consumer: HardRtConsumer<'a, N>,
    sidetone: SidetoneGen,
    ptt: PttController,

    config_gen: u16,
    samples_per_tick: usize,
    /// Key state from the last consumed (non-silence) sample.
    last_key: bool,
    /// Marker flags to merge into the next pushed sample.
    pending_flags: u8,
    ptt_was_on: bool,
}

impl<'a, const N: usize> RtPipeline<'a, N> {
    pub fn new(
        stream: &'a KeyingStream<N>,
        fault: &'a FaultState,
        config: &'a KeyerConfig,
        sender_key: &'a AtomicBool,
        paddle_abort: &'a AtomicBool,
    ) -> Self {
        let samples_per_tick = (config.sample_rate() as u64 * config.tick_us() as u64
            / 1_000_000)
            .clamp(1, MAX_SAMPLES_PER_TICK as u64) as usize;

        Self {
            stream,
            fault,
            config,
            sender_key,
            paddle_abort,
            keyer: IambicKeyer::new(IambicConfig::from_shared(config)),
            consumer: HardRtConsumer::new(stream, fault, config.max_lag()),
            sidetone: SidetoneGen::new(
                config.sidetone_hz(),
                config.sample_rate(),
                config.fade_samples(),
            ),
            ptt: PttController::new(config.ptt_tail_ms()),
            config_gen: config.generation(),
            samples_per_tick,
            last_key: false,
            pending_flags: 0,
            ptt_was_on: false,
        }
    }

    /// One RT tick.
    pub fn tick(
        &mut self,
        now_us: i64,
        paddle: &mut impl PaddleInput,
        tx: &mut impl TxLine,
        audio: &mut impl AudioSink,
    ) {
        // Latched fault: hold silence until recovery
        if self.fault.is_active() {
            self.silence_outputs(tx);
            return;
        }

        let paddles = paddle.read_paddles();

        // Paddle wins over the text sender
        self.paddle_abort.store(!paddles.is_idle(), Ordering::Release);

        let gen = self.config.generation();
        if gen != self.config_gen {
            self.config_gen = gen;
            self.apply_config();
            self.pending_flags |= FLAG_CONFIG_CHANGE;
        }

        let mut sample = self.keyer.tick(now_us, paddles);
        if self.sender_key.load(Ordering::Acquire) {
            sample.local_key = true;
        }
        sample.audio_level = if sample.local_key { 255 } else { 0 };
        sample.config_gen = gen;
        sample.flags |= self.pending_flags;
        self.pending_flags = 0;

        self.stream.push(sample);

        // Catch up with the stream, bounded per tick. Silence
        // records carry no state and are skipped.
        for _ in 0..CONSUME_BUDGET {
            match self.consumer.tick() {
                Ok(Some(s)) => {
                    if !s.is_silence() {
                        self.last_key = s.local_key;
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    self.silence_outputs(tx);
                    return;
                }
            }
        }

        self.drive_outputs(now_us, tx, audio);
    }

    /// Clear the fault and resync after external corrective action.
    pub fn recover(&mut self) {
        self.fault.clear();
        self.consumer.resync();
        self.keyer.reset();
        self.last_key = false;
        // The next push must reach the resynced consumer even if the
        // observable state matches the pre-fault shadow
        self.stream.rearm();
    }

    #[inline]
    pub fn ptt_on(&self) -> bool {
        self.ptt.is_on()
    }

    #[inline]
    pub fn key_down(&self) -> bool {
        self.last_key
    }

    /// Current hard-RT consumer lag in samples.
    #[inline]
    pub fn lag(&self) -> u32 {
        self.consumer.lag()
    }

    // --- internals ---

    fn apply_config(&mut self) {
        self.keyer.set_config(IambicConfig::from_shared(self.config));
        self.sidetone
            .set_frequency(self.config.sidetone_hz(), self.config.sample_rate());
        self.sidetone.set_fade_len(self.config.fade_samples());
        self.ptt.set_tail_ms(self.config.ptt_tail_ms());
        self.consumer.set_max_lag(self.config.max_lag());
    }

    fn drive_outputs(&mut self, now_us: i64, tx: &mut impl TxLine, audio: &mut impl AudioSink) {
        let key = self.last_key;
        tx.set_tx(key);

        let mut buf = [0i16; MAX_SAMPLES_PER_TICK];
        let n = self.samples_per_tick;
        for slot in buf[..n].iter_mut() {
            *slot = self.sidetone.next_sample(key);
        }
        audio.write(&buf[..n]);

        if key {
            self.ptt.audio_sample(now_us);
        }
        self.ptt.tick(now_us);

        // TX/RX session markers ride on the next pushed sample
        let ptt_on = self.ptt.is_on();
        if ptt_on != self.ptt_was_on {
            self.pending_flags |= if ptt_on { FLAG_TX_START } else { FLAG_RX_START };
            self.ptt_was_on = ptt_on;
        }
    }

    /// Force TX and audio silent within the current tick.
    fn silence_outputs(&mut self, tx: &mut impl TxLine) {
        tx.set_tx(false);
        self.sidetone.reset();
        self.ptt.force_off();
        self.ptt_was_on = false;
        self.last_key = false;
    }
}
