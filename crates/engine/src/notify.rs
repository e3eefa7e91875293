//! Outward notification plumbing.

use std::sync::{Mutex, PoisonError};

use graphrun_types::ExecutionEvent;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::trace;

/// Fan-out of [`ExecutionEvent`]s to every subscriber.
///
/// Each subscriber owns an unbounded queue, so a slow reader never loses
/// events. Events sent while nobody is subscribed are dropped, and closed
/// receivers are pruned on the next emit.
#[derive(Debug, Default)]
pub struct EventHub {
    subscribers: Mutex<Vec<UnboundedSender<ExecutionEvent>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> UnboundedReceiver<ExecutionEvent> {
        let (sender, receiver) = unbounded_channel();
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner).push(sender);
        receiver
    }

    pub fn emit(&self, event: ExecutionEvent) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|subscriber| !subscriber.is_closed());
        if subscribers.is_empty() {
            trace!(event = ?event, "no subscribers for execution event");
            return;
        }
        for subscriber in subscribers.iter() {
            let _ = subscriber.send(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphrun_types::LifecycleState;
    use serde_json::json;

    #[test]
    fn every_subscriber_receives_every_event() {
        let hub = EventHub::new();
        let mut first = hub.subscribe();
        let mut second = hub.subscribe();

        for index in 0..500 {
            hub.emit(ExecutionEvent::Result(json!({ "index": index })));
        }
        hub.emit(ExecutionEvent::StateUpdated(LifecycleState::Stop));

        for receiver in [&mut first, &mut second] {
            let mut received = Vec::new();
            while let Ok(event) = receiver.try_recv() {
                received.push(event);
            }
            assert_eq!(received.len(), 501);
            assert_eq!(received[499], ExecutionEvent::Result(json!({ "index": 499 })));
            assert_eq!(received[500], ExecutionEvent::StateUpdated(LifecycleState::Stop));
        }
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let hub = EventHub::new();
        drop(hub.subscribe());
        let mut live = hub.subscribe();

        hub.emit(ExecutionEvent::StateUpdated(LifecycleState::Start));

        assert_eq!(hub.subscribers.lock().unwrap().len(), 1);
        assert_eq!(live.try_recv().unwrap(), ExecutionEvent::StateUpdated(LifecycleState::Start));
    }
}
