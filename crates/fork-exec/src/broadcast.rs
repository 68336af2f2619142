//! Two-scope progress fan-out.
//!
//! Subscribers either know the execution id they care about or only the
//! session that will produce it, so events fan out through two typed
//! registries: one keyed by execution id, one by session id. String
//! rooms are not part of the surface. Channels are created on first
//! subscription only; publishing to a scope nobody subscribed to is a
//! no-op, so the registries stay bounded by live subscriptions.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::array::{ExecutionArray, ProgressEvent, ProgressSubscription};

const DEFAULT_CAPACITY: usize = 64;

pub struct ProgressBroadcaster {
    execution_channels: Mutex<HashMap<String, broadcast::Sender<ProgressEvent>>>,
    session_channels: Mutex<HashMap<String, broadcast::Sender<ProgressEvent>>>,
    capacity: usize,
}

impl Default for ProgressBroadcaster {
    fn default() -> Self {
        ProgressBroadcaster::new(DEFAULT_CAPACITY)
    }
}

impl ProgressBroadcaster {
    pub fn new(capacity: usize) -> Self {
        ProgressBroadcaster {
            execution_channels: Mutex::new(HashMap::new()),
            session_channels: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    /// Subscribe to one execution's events.
    pub fn subscribe_execution(&self, execution_id: &str) -> broadcast::Receiver<ProgressEvent> {
        sender_for(&self.execution_channels, execution_id, self.capacity).subscribe()
    }

    /// Subscribe to every event a session produces, including those from
    /// executions that do not exist yet.
    pub fn subscribe_session(&self, session_id: &str) -> broadcast::Receiver<ProgressEvent> {
        sender_for(&self.session_channels, session_id, self.capacity).subscribe()
    }

    /// Publish one event to both scopes. Only channels a subscriber
    /// already created are used; publishing never allocates one.
    pub fn publish(&self, session_id: &str, event: &ProgressEvent) {
        if let Some(sender) = self.execution_channels.lock().get(event.execution_id()) {
            let _ = sender.send(event.clone());
        }
        if let Some(sender) = self.session_channels.lock().get(session_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Republish an array's progress stream through this broadcaster.
    pub fn attach(
        self: &Arc<Self>,
        session_id: &str,
        array: &Arc<ExecutionArray>,
    ) -> ProgressSubscription {
        let broadcaster = Arc::clone(self);
        let session_id = session_id.to_string();
        array.on_progress(move |event| broadcaster.publish(&session_id, event))
    }

    /// Drop a finished execution's channel.
    pub fn forget_execution(&self, execution_id: &str) {
        self.execution_channels.lock().remove(execution_id);
    }

    /// Drop a closed session's channel.
    pub fn forget_session(&self, session_id: &str) {
        self.session_channels.lock().remove(session_id);
    }
}

fn sender_for(
    channels: &Mutex<HashMap<String, broadcast::Sender<ProgressEvent>>>,
    key: &str,
    capacity: usize,
) -> broadcast::Sender<ProgressEvent> {
    channels
        .lock()
        .entry(key.to_string())
        .or_insert_with(|| broadcast::channel(capacity).0)
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{ExecutionItem, ExecutionKind, ExecutionStatus};

    fn array_with_one_item() -> (Arc<ExecutionArray>, String) {
        let item = ExecutionItem::new("transfer", ExecutionKind::Transaction);
        let id = item.id.clone();
        (ExecutionArray::create(vec![item]), id)
    }

    #[tokio::test]
    async fn test_both_scopes_receive_and_complete_fires_once() {
        let broadcaster = Arc::new(ProgressBroadcaster::default());
        let (array, item_id) = array_with_one_item();

        // Session subscriber exists before the execution is attached.
        let mut session_rx = broadcaster.subscribe_session("session-1");
        let _link = broadcaster.attach("session-1", &array);
        let mut execution_rx = broadcaster.subscribe_execution(array.id());

        array
            .update_status(&item_id, ExecutionStatus::Executing, None)
            .unwrap();
        array
            .update_status(&item_id, ExecutionStatus::Completed, None)
            .unwrap();

        let mut session_events = Vec::new();
        while let Ok(event) = session_rx.try_recv() {
            session_events.push(event);
        }
        let mut execution_events = Vec::new();
        while let Ok(event) = execution_rx.try_recv() {
            execution_events.push(event);
        }

        // Two progress events plus exactly one completion, in each scope.
        assert_eq!(session_events.len(), 3);
        assert_eq!(execution_events.len(), 3);
        let completions = session_events
            .iter()
            .filter(|e| matches!(e, ProgressEvent::Complete { success: true, .. }))
            .count();
        assert_eq!(completions, 1);
    }

    #[tokio::test]
    async fn test_scopes_are_independent() {
        let broadcaster = Arc::new(ProgressBroadcaster::default());
        let (array, item_id) = array_with_one_item();
        let _link = broadcaster.attach("session-a", &array);

        let mut other_session = broadcaster.subscribe_session("session-b");
        let mut other_execution = broadcaster.subscribe_execution("no-such-execution");

        array
            .update_status(&item_id, ExecutionStatus::Failed, Some("boom"))
            .unwrap();

        assert!(other_session.try_recv().is_err());
        assert!(other_execution.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_allocates_no_channels() {
        let broadcaster = Arc::new(ProgressBroadcaster::default());
        let (array, item_id) = array_with_one_item();
        let _link = broadcaster.attach("session-quiet", &array);

        array
            .update_status(&item_id, ExecutionStatus::Executing, None)
            .unwrap();

        // Nobody subscribed, so neither registry gained an entry.
        assert!(broadcaster.execution_channels.lock().is_empty());
        assert!(broadcaster.session_channels.lock().is_empty());

        let _rx = broadcaster.subscribe_session("session-quiet");
        assert_eq!(broadcaster.session_channels.lock().len(), 1);
        broadcaster.forget_session("session-quiet");
        assert!(broadcaster.session_channels.lock().is_empty());
    }
}
