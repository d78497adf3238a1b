/// Engine event bus
///
/// Worker threads publish from inside their critical sections, so publishing
/// never blocks: every subscriber gets a bounded queue and events that do not
/// fit are dropped for that subscriber only. Subscribers whose receiver is
/// gone are pruned on the next publish.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::RwLock;

use super::events::EngineEvent;

/// Events queued per subscriber before new ones are dropped
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Handle for `EventBus::unsubscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(usize);

struct Subscriber {
    id: SubscriberId,
    sender: Sender<EngineEvent>,
}

struct BusInner {
    subscribers: RwLock<Vec<Subscriber>>,
    next_id: AtomicUsize,
    capacity: usize,
}

/// Broadcasts engine events; clones share the same subscribers
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Bus whose subscribers each buffer at most `capacity` events
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: RwLock::new(Vec::new()),
                next_id: AtomicUsize::new(0),
                capacity: capacity.max(1),
            }),
        }
    }

    pub fn subscribe(&self) -> (Receiver<EngineEvent>, SubscriberId) {
        let (sender, rx) = bounded(self.inner.capacity);
        let id = SubscriberId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.subscribers.write().push(Subscriber { id, sender });
        (rx, id)
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.inner.subscribers.write().retain(|s| s.id != id);
    }

    pub fn publish(&self, event: EngineEvent) {
        let mut disconnected = Vec::new();
        {
            let subscribers = self.inner.subscribers.read();
            for subscriber in subscribers.iter() {
                match subscriber.sender.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        tracing::trace!("Subscriber {:?} is behind, event dropped", subscriber.id);
                    }
                    Err(TrySendError::Disconnected(_)) => disconnected.push(subscriber.id),
                }
            }
        }

        if !disconnected.is_empty() {
            self.inner
                .subscribers
                .write()
                .retain(|s| !disconnected.contains(&s.id));
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::events::WorkerKind;

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let bus = EventBus::new();
        let (_rx, id) = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.unsubscribe(id);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_publish_reaches_every_subscriber() {
        let bus = EventBus::new();
        let (rx1, _) = bus.subscribe();
        let (rx2, _) = bus.subscribe();

        bus.publish(EngineEvent::WorkerExited {
            worker: WorkerKind::Music,
        });

        assert_eq!(
            rx1.try_recv().unwrap(),
            EngineEvent::WorkerExited {
                worker: WorkerKind::Music
            }
        );
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn test_slow_subscriber_queue_is_bounded() {
        let bus = EventBus::with_capacity(8);
        let (slow, _) = bus.subscribe();

        for loop_count in 0..100_000 {
            bus.publish(EngineEvent::MusicLooped { loop_count });
        }

        // The oldest events are kept, the overflow is dropped
        assert_eq!(slow.len(), 8);
        assert_eq!(
            slow.try_recv().unwrap(),
            EngineEvent::MusicLooped { loop_count: 0 }
        );
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn test_dropped_receiver_is_pruned() {
        let bus = EventBus::new();
        let (live, _) = bus.subscribe();
        let (gone, _) = bus.subscribe();
        drop(gone);
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(EngineEvent::MusicLooped { loop_count: 3 });
        assert_eq!(bus.subscriber_count(), 1);
        assert!(live.try_recv().is_ok());
    }

    #[test]
    fn test_clones_share_subscribers() {
        let bus = EventBus::new();
        let other = bus.clone();

        let (rx, _) = other.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.publish(EngineEvent::MusicLooped { loop_count: 1 });
        assert!(rx.try_recv().is_ok());
    }
}
