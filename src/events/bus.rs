use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use crate::schemas::{AgentEvent, EventKind};

/// Number of events retained in the ring buffer; overflow drops oldest.
pub const MAX_HISTORY: usize = 1000;

pub type SubscriberId = u64;
type Handler = Arc<dyn Fn(&AgentEvent) + Send + Sync>;

/// Broadcast bus for execution progress events.
///
/// Handlers run synchronously inside `publish` and must not block or
/// re-enter `publish`. A panicking handler is isolated: the panic is caught
/// and logged, remaining subscribers still run.
pub struct EventBus {
    inner: Mutex<BusInner>,
}

struct BusInner {
    subscribers: Vec<(SubscriberId, Handler)>,
    history: VecDeque<AgentEvent>,
    next_id: SubscriberId,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BusInner {
                subscribers: Vec::new(),
                history: VecDeque::with_capacity(MAX_HISTORY),
                next_id: 0,
            }),
        }
    }

    pub fn subscribe<F>(&self, handler: F) -> SubscriberId
    where
        F: Fn(&AgentEvent) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock().expect("event bus poisoned");
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.push((id, Arc::new(handler)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        let mut inner = self.inner.lock().expect("event bus poisoned");
        inner.subscribers.retain(|(sub_id, _)| *sub_id != id);
    }

    /// Publish an event to all subscribers. Never fails.
    pub fn publish(&self, kind: EventKind) {
        let event = AgentEvent::now(kind);
        let mut inner = self.inner.lock().expect("event bus poisoned");

        if inner.history.len() >= MAX_HISTORY {
            inner.history.pop_front();
        }
        inner.history.push_back(event.clone());

        for (id, handler) in &inner.subscribers {
            if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                log::error!("Event subscriber {id} panicked handling {}", event.kind.label());
            }
        }
    }

    /// Retained events in publish order, optionally filtered by kind label.
    pub fn history(&self, filter: Option<&str>) -> Vec<AgentEvent> {
        let inner = self.inner.lock().expect("event bus poisoned");
        match filter {
            Some(label) => inner
                .history
                .iter()
                .filter(|e| e.kind.label() == label)
                .cloned()
                .collect(),
            None => inner.history.iter().cloned().collect(),
        }
    }

    pub fn clear_history(&self) {
        let mut inner = self.inner.lock().expect("event bus poisoned");
        inner.history.clear();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::schemas::ExecutionPhase;

    use super::*;

    fn status(phase: ExecutionPhase) -> EventKind {
        EventKind::Status { phase, model: None }
    }

    #[test]
    fn test_subscribers_receive_events() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        bus.subscribe(move |_| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(status(ExecutionPhase::Initializing));
        bus.publish(EventKind::Complete { duration_ms: 1 });

        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        let id = bus.subscribe(move |_| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(status(ExecutionPhase::Initializing));
        bus.unsubscribe(id);
        bus.publish(status(ExecutionPhase::CallingLlm));

        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_subscriber_is_isolated() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        bus.subscribe(|_| panic!("boom"));
        bus.subscribe(move |_| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(status(ExecutionPhase::Initializing));

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(bus.history(None).len(), 1);
    }

    #[test]
    fn test_history_is_bounded_to_last_1000() {
        let bus = EventBus::new();
        for i in 0..1100u64 {
            bus.publish(EventKind::Complete { duration_ms: i });
        }

        let history = bus.history(None);
        assert_eq!(history.len(), MAX_HISTORY);

        // The oldest 100 were dropped; the remainder keeps publish order.
        for (offset, event) in history.iter().enumerate() {
            match event.kind {
                EventKind::Complete { duration_ms } => {
                    assert_eq!(duration_ms, 100 + offset as u64)
                }
                _ => panic!("unexpected event kind"),
            }
        }
    }

    #[test]
    fn test_history_filter_by_label() {
        let bus = EventBus::new();
        bus.publish(status(ExecutionPhase::Initializing));
        bus.publish(EventKind::Thinking {
            chunk: "hmm".into(),
        });
        bus.publish(status(ExecutionPhase::CallingLlm));

        assert_eq!(bus.history(Some("status")).len(), 2);
        assert_eq!(bus.history(Some("thinking")).len(), 1);
        assert_eq!(bus.history(Some("complete")).len(), 0);
    }
}
