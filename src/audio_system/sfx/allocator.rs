/// Sound effect channel allocation
///
/// A fixed arena of slots, one per SFX channel. The table is only ever
/// touched behind the engine's id-lock, so every method here is one atomic
/// transition. Each slot walks Idle -> Pending -> Playing -> Idle:
///
/// | State   | is_playing | is_finished |
/// |---------|------------|-------------|
/// | Idle    | true       | true        |
/// | Pending | false      | false       |
/// | Playing | true       | false       |
///
/// A slot's payload (decoder and buffers) is stored while Pending and moved
/// out to the worker on claim, so a Playing slot's payload is owned by exactly
/// one worker without further locking.
use std::fmt;
use std::path::{Path, PathBuf};

use crate::audio_system::buffer::PingPongBuffer;
use crate::audio_system::decoder::Decoder;
use crate::audio_system::port::PortMode;
use crate::messaging::{EngineEvent, EventBus};

/// State of one SFX slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotState {
    /// Free, available for allocation
    Idle,

    /// Claimed by a producer, awaiting a worker
    Pending,

    /// Owned by a worker that is decoding and outputting it
    Playing,
}

impl SlotState {
    /// The `(is_playing, is_finished)` pair this state is encoded as
    pub fn flags(&self) -> (bool, bool) {
        match self {
            SlotState::Idle => (true, true),
            SlotState::Pending => (false, false),
            SlotState::Playing => (true, false),
        }
    }

    /// State for an `(is_playing, is_finished)` pair, if it is a valid one
    pub fn from_flags(is_playing: bool, is_finished: bool) -> Option<Self> {
        match (is_playing, is_finished) {
            (true, true) => Some(SlotState::Idle),
            (false, false) => Some(SlotState::Pending),
            (true, false) => Some(SlotState::Playing),
            (false, true) => None,
        }
    }

    /// The state a slot moves to next
    pub fn next(&self) -> Self {
        match self {
            SlotState::Idle => SlotState::Pending,
            SlotState::Pending => SlotState::Playing,
            SlotState::Playing => SlotState::Idle,
        }
    }
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotState::Idle => write!(f, "Idle"),
            SlotState::Pending => write!(f, "Pending"),
            SlotState::Playing => write!(f, "Playing"),
        }
    }
}

/// Everything a worker needs to play one effect
pub struct SfxPayload {
    pub(crate) buffers: PingPongBuffer,
    pub(crate) decoder: Box<dyn Decoder>,
    pub(crate) mode: PortMode,
    pub(crate) path: PathBuf,
    /// Stop generation the effect was allocated under
    pub(crate) generation: u64,
}

impl SfxPayload {
    pub(crate) fn new(
        decoder: Box<dyn Decoder>,
        mode: PortMode,
        buffer_size: usize,
        path: &Path,
    ) -> Self {
        Self {
            buffers: PingPongBuffer::new(buffer_size),
            decoder,
            mode,
            path: path.to_path_buf(),
            generation: 0,
        }
    }

    pub fn is_stereo(&self) -> bool {
        self.mode == PortMode::Stereo
    }
}

impl fmt::Debug for SfxPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SfxPayload")
            .field("mode", &self.mode)
            .field("path", &self.path)
            .field("generation", &self.generation)
            .finish()
    }
}

#[derive(Debug)]
struct Slot {
    state: SlotState,
    payload: Option<SfxPayload>,
}

/// Fixed table of SFX slots
pub struct SlotTable {
    slots: Vec<Slot>,
    live_workers: usize,
    events: EventBus,
}

impl SlotTable {
    /// `count` idle slots served by `count` workers
    pub fn new(count: usize, events: EventBus) -> Self {
        let slots = (0..count)
            .map(|_| Slot {
                state: SlotState::Idle,
                payload: None,
            })
            .collect();

        Self {
            slots,
            live_workers: count,
            events,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn state(&self, slot: usize) -> Option<SlotState> {
        self.slots.get(slot).map(|s| s.state)
    }

    pub fn states(&self) -> Vec<SlotState> {
        self.slots.iter().map(|s| s.state).collect()
    }

    pub fn count(&self, state: SlotState) -> usize {
        self.slots.iter().filter(|s| s.state == state).count()
    }

    /// Lowest-index idle slot
    pub fn first_idle(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.state == SlotState::Idle)
    }

    /// Whether an allocation could currently succeed
    pub fn can_allocate(&self) -> bool {
        self.live_workers > 0 && self.first_idle().is_some()
    }

    pub fn live_workers(&self) -> usize {
        self.live_workers
    }

    /// Move the lowest-index idle slot to Pending with `payload`.
    /// Hands the payload back when nothing can be allocated.
    pub fn allocate(&mut self, payload: SfxPayload) -> Result<usize, SfxPayload> {
        if self.live_workers == 0 {
            return Err(payload);
        }
        let Some(index) = self.first_idle() else {
            return Err(payload);
        };

        let slot = &mut self.slots[index];
        slot.payload = Some(payload);
        self.transition(index, SlotState::Pending);
        Ok(index)
    }

    /// Move the lowest-index pending slot to Playing and hand its payload to
    /// the caller
    pub fn claim(&mut self) -> Option<(usize, SfxPayload)> {
        let index = self
            .slots
            .iter()
            .position(|s| s.state == SlotState::Pending)?;

        let payload = self.slots[index].payload.take()?;
        self.transition(index, SlotState::Playing);
        Some((index, payload))
    }

    /// Return a Playing slot to Idle
    pub fn release(&mut self, slot: usize) {
        match self.state(slot) {
            Some(SlotState::Playing) => {
                self.slots[slot].payload = None;
                self.transition(slot, SlotState::Idle);
            }
            Some(other) => {
                tracing::warn!("SE slot {} released while {}", slot, other);
            }
            None => {
                tracing::warn!("SE slot {} does not exist", slot);
            }
        }
    }

    /// Record that a worker left its loop. The last one out walks every
    /// pending slot through Playing back to Idle so nothing is left waiting.
    pub fn worker_exited(&mut self) {
        self.live_workers = self.live_workers.saturating_sub(1);
        if self.live_workers > 0 {
            return;
        }

        while let Some((slot, payload)) = self.claim() {
            tracing::debug!(
                "Discarding pending SE {} on slot {}: no workers left",
                payload.path.display(),
                slot
            );
            drop(payload);
            self.release(slot);
        }
    }

    fn transition(&mut self, slot: usize, to: SlotState) {
        let from = self.slots[slot].state;
        debug_assert_eq!(from.next(), to, "slot {} skipped a state", slot);
        self.slots[slot].state = to;

        tracing::debug!("SE slot {}: {} -> {}", slot, from, to);
        self.events
            .publish(EngineEvent::SlotTransition { slot, from, to });
    }
}

impl fmt::Debug for SlotTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotTable")
            .field("states", &self.states())
            .field("live_workers", &self.live_workers)
            .finish()
    }
}
