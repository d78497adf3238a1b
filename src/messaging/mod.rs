/// Messaging module
///
/// The engine reports what happened on its worker threads through an
/// `EventBus`. Hosts subscribe to react to failures (a music hardware failure
/// is the one condition they may want to treat as fatal); tests subscribe to
/// observe slot transitions.
///
/// ## Usage
///
/// ```rust,ignore
/// let (rx, _id) = engine.subscribe();
///
/// while let Ok(event) = rx.recv() {
///     match event {
///         EngineEvent::MusicHardwareFailure { message } => { /* report */ },
///         _ => {}
///     }
/// }
/// ```

pub mod bus;
pub mod events;

// Re-export commonly used types
pub use bus::{EventBus, SubscriberId};
pub use events::{DropReason, EngineEvent, WorkerKind};
