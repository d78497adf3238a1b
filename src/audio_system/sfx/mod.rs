/// Sound effect worker pool
///
/// One worker per channel, each with its own output port. A worker sleeps on
/// the work signal (one token per pending slot), claims the lowest pending
/// slot under the id-lock, then decodes and outputs it buffer by buffer until
/// the decoder finishes, the effects are stopped, or the engine shuts down.
pub mod allocator;

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{select, Receiver, TryRecvError};
use parking_lot::Mutex;

use crate::config::EngineConfig;
use crate::error::{AudioError, AudioResult};
use crate::messaging::{EngineEvent, EventBus, WorkerKind};

use super::effects::VolumeEffect;
use super::port::{OutputPort, PortConfig, PortMode, PortProvider};
use super::source::AudioSourceType;

pub use allocator::{SfxPayload, SlotState, SlotTable};

/// State shared by the engine and every SFX worker
pub(crate) struct SfxShared {
    /// The id-lock: every slot transition happens while holding it
    pub(crate) slots: Mutex<SlotTable>,

    /// Bumped by `stop_all`; effects allocated under an older value stop
    pub(crate) stop_generation: AtomicU64,
}

impl SfxShared {
    pub(crate) fn new(count: usize, events: EventBus) -> Self {
        Self {
            slots: Mutex::new(SlotTable::new(count, events)),
            stop_generation: AtomicU64::new(0),
        }
    }

    /// Idle -> Pending for the lowest free slot, stamping the payload with
    /// the current stop generation inside the same critical section
    pub(crate) fn allocate(&self, mut payload: SfxPayload) -> Result<usize, SfxPayload> {
        let mut slots = self.slots.lock();
        payload.generation = self.stop_generation.load(Ordering::SeqCst);
        slots.allocate(payload)
    }

    /// Stop every effect that is playing or waiting to play
    pub(crate) fn stop_all(&self) {
        let _slots = self.slots.lock();
        let generation = self.stop_generation.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!("Stopping all sound effects (generation {})", generation);
    }

    fn is_stopped(&self, payload: &SfxPayload) -> bool {
        self.stop_generation.load(Ordering::SeqCst) != payload.generation
    }
}

/// How a slot's playback ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlaybackEnd {
    Finished,
    Stopped,
    Shutdown,
    OutputFailed,
}

/// One SFX worker thread
pub(crate) struct SfxWorker {
    pub(crate) index: usize,
    pub(crate) shared: Arc<SfxShared>,
    pub(crate) ports: Arc<dyn PortProvider>,
    pub(crate) events: EventBus,
    pub(crate) config: EngineConfig,
    pub(crate) work_rx: Receiver<()>,
    pub(crate) shutdown_rx: Receiver<()>,
}

impl SfxWorker {
    pub(crate) fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(format!("sfx-worker-{}", self.index))
            .spawn(move || self.run())
    }

    fn run(self) {
        // Ports belong to the thread that opened them
        let initial = PortConfig::new(
            self.config.sfx_port_samples,
            self.config.output_rate,
            PortMode::Stereo,
        );
        match self.ports.open(AudioSourceType::SoundEffect, initial) {
            Ok(mut port) => {
                tracing::debug!("SFX worker {} ready", self.index);
                self.serve(&mut *port);
                // Release the port before reporting the exit
                drop(port);
            }
            Err(e) => {
                tracing::warn!("SFX worker {}: Cannot open audio port: {}", self.index, e);
            }
        }

        self.shared.slots.lock().worker_exited();
        self.events.publish(EngineEvent::WorkerExited {
            worker: WorkerKind::SoundEffect(self.index),
        });
        tracing::debug!("SFX worker {} stopped", self.index);
    }

    fn serve(&self, port: &mut dyn OutputPort) {
        loop {
            select! {
                recv(self.work_rx) -> token => {
                    if token.is_err() {
                        break;
                    }
                }
                recv(self.shutdown_rx) -> _ => break,
            }
            if self.shutting_down() {
                break;
            }

            let claimed = self.shared.slots.lock().claim();
            let Some((slot, mut payload)) = claimed else {
                tracing::debug!("SFX worker {}: no pending SE found", self.index);
                continue;
            };

            let end = self.play(port, slot, &mut payload);
            tracing::debug!(
                "SFX worker {}: {} on slot {} ended ({:?})",
                self.index,
                payload.path.display(),
                slot,
                end
            );

            // Decoder and buffers go away with the payload, before the slot
            // is offered again
            drop(payload);
            self.shared.slots.lock().release(slot);

            if end == PlaybackEnd::Shutdown {
                break;
            }
        }
    }

    fn play(&self, port: &mut dyn OutputPort, slot: usize, payload: &mut SfxPayload) -> PlaybackEnd {
        if let Err(e) = self.prepare_port(port, payload) {
            self.report_output_failure(slot, &e);
            return PlaybackEnd::OutputFailed;
        }

        loop {
            if self.shutting_down() {
                return PlaybackEnd::Shutdown;
            }
            if self.shared.is_stopped(payload) {
                return PlaybackEnd::Stopped;
            }

            payload.buffers.swap();
            payload.decoder.decode(payload.buffers.active_mut());

            if let Err(e) = port.output(payload.buffers.active()) {
                self.report_output_failure(slot, &e);
                return PlaybackEnd::OutputFailed;
            }

            if payload.decoder.is_finished() {
                return PlaybackEnd::Finished;
            }
        }
    }

    fn prepare_port(&self, port: &mut dyn OutputPort, payload: &SfxPayload) -> AudioResult<()> {
        let mode = payload.mode;
        port.configure(PortConfig::new(
            self.config.nsamples(mode),
            self.config.output_rate,
            mode,
        ))?;

        let volume = VolumeEffect::new(payload.decoder.volume())
            .to_hardware(self.config.hardware_volume_max);
        port.set_volume(volume, volume)
    }

    fn report_output_failure(&self, slot: usize, error: &AudioError) {
        tracing::warn!(
            "SFX worker {}: output failed on slot {}, dropping it: {}",
            self.index,
            slot,
            error
        );
        self.events.publish(EngineEvent::SoundEffectOutputFailed {
            slot,
            message: error.to_string(),
        });
    }

    fn shutting_down(&self) -> bool {
        matches!(self.shutdown_rx.try_recv(), Err(TryRecvError::Disconnected))
    }
}
