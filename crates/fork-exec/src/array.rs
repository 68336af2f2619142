//! Ordered, observable state machine of one user intent's operations.
//!
//! All mutation goes through [`ExecutionArray::update_status`], which
//! serializes transitions under one lock, validates them against the
//! status machine (compare-and-transition, never blind overwrite),
//! cascades cancellation to dependents, and notifies subscribers after
//! the lock is released. Snapshots are plain values with no live
//! handles.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::item::{ExecutionItem, ExecutionStatus};

// ============================================================================
// Errors and events
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrayError {
    UnknownItem(String),
    InvalidTransition {
        item: String,
        from: ExecutionStatus,
        to: ExecutionStatus,
    },
    /// Simulation succeeded but the item needs an explicit approval
    /// before it may execute.
    ConfirmationRequired(String),
    UnmetDependency {
        item: String,
        dependency: String,
    },
}

impl fmt::Display for ArrayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArrayError::UnknownItem(id) => write!(f, "unknown execution item '{}'", id),
            ArrayError::InvalidTransition { item, from, to } => {
                write!(f, "item '{}' cannot transition from {} to {}", item, from, to)
            }
            ArrayError::ConfirmationRequired(id) => {
                write!(f, "item '{}' requires confirmation before executing", id)
            }
            ArrayError::UnmetDependency { item, dependency } => {
                write!(f, "item '{}' depends on '{}' which has not succeeded", item, dependency)
            }
        }
    }
}

impl std::error::Error for ArrayError {}

/// Serializable snapshot crossing the core boundary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionArrayState {
    pub id: String,
    pub items: Vec<ExecutionItem>,
    pub current_index: usize,
    pub is_executing: bool,
    pub is_paused: bool,
    pub total_items: usize,
    pub completed_items: usize,
    pub failed_items: usize,
    pub cancelled_items: usize,
}

impl ExecutionArrayState {
    /// Every item terminal and at least one item present.
    pub fn is_complete(&self) -> bool {
        self.total_items > 0 && self.items.iter().all(|i| i.status.is_terminal())
    }

    /// Complete with nothing failed or cancelled.
    pub fn is_successful(&self) -> bool {
        self.is_complete() && self.items.iter().all(|i| i.status.is_success())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProgressEvent {
    Progress {
        execution_id: String,
        state: ExecutionArrayState,
    },
    Complete {
        execution_id: String,
        success: bool,
    },
}

impl ProgressEvent {
    pub fn execution_id(&self) -> &str {
        match self {
            ProgressEvent::Progress { execution_id, .. } => execution_id,
            ProgressEvent::Complete { execution_id, .. } => execution_id,
        }
    }
}

// ============================================================================
// Execution array
// ============================================================================

type Subscriber = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

struct Inner {
    items: Vec<ExecutionItem>,
    current_index: usize,
    is_executing: bool,
    is_paused: bool,
    completed_emitted: bool,
}

pub struct ExecutionArray {
    id: String,
    inner: Mutex<Inner>,
    subscribers: Mutex<Vec<(u64, Subscriber)>>,
    next_subscriber_id: Mutex<u64>,
    /// Taken before `inner` is released so concurrent transitions
    /// deliver their snapshots in state order.
    notify_order: Mutex<()>,
}

impl ExecutionArray {
    /// Create an array from planner output. Items start `pending` and
    /// are renumbered in the given order.
    pub fn create(mut items: Vec<ExecutionItem>) -> Arc<Self> {
        for (position, item) in items.iter_mut().enumerate() {
            item.position = position;
            item.status = ExecutionStatus::Pending;
        }
        Arc::new(ExecutionArray {
            id: Uuid::new_v4().to_string(),
            inner: Mutex::new(Inner {
                items,
                current_index: 0,
                is_executing: false,
                is_paused: false,
                completed_emitted: false,
            }),
            subscribers: Mutex::new(Vec::new()),
            next_subscriber_id: Mutex::new(0),
            notify_order: Mutex::new(()),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn get_state(&self) -> ExecutionArrayState {
        self.snapshot(&self.inner.lock())
    }

    pub fn get_items(&self) -> Vec<ExecutionItem> {
        self.inner.lock().items.clone()
    }

    pub fn set_executing(&self, executing: bool) {
        self.inner.lock().is_executing = executing;
    }

    pub fn set_paused(&self, paused: bool) {
        self.inner.lock().is_paused = paused;
    }

    /// Attach a result payload to an item without changing its status.
    pub fn set_result(&self, item_id: &str, result: Value) -> Result<(), ArrayError> {
        let mut inner = self.inner.lock();
        let item = find_item(&mut inner.items, item_id)?;
        item.result = Some(result);
        Ok(())
    }

    /// Validated compare-and-transition.
    ///
    /// On success, recomputes the snapshot and notifies every progress
    /// subscriber; the first transition into a complete array emits one
    /// additional completion event. A failed or cancelled item cascades
    /// `cancelled` to everything transitively depending on it.
    /// Subscribers run outside the state lock, but concurrent callers
    /// deliver their snapshots in the order the transitions applied.
    pub fn update_status(
        &self,
        item_id: &str,
        new_status: ExecutionStatus,
        reason: Option<&str>,
    ) -> Result<(), ArrayError> {
        let (events, _order) = {
            let mut inner = self.inner.lock();
            let position = inner
                .items
                .iter()
                .position(|i| i.id == item_id)
                .ok_or_else(|| ArrayError::UnknownItem(item_id.to_string()))?;

            let current = inner.items[position].status;
            if !current.can_transition(new_status) {
                return Err(ArrayError::InvalidTransition {
                    item: item_id.to_string(),
                    from: current,
                    to: new_status,
                });
            }
            if current == ExecutionStatus::Pending
                && new_status == ExecutionStatus::Executing
                && inner.items[position].requires_confirmation
            {
                return Err(ArrayError::ConfirmationRequired(item_id.to_string()));
            }
            if current == ExecutionStatus::Pending
                && matches!(new_status, ExecutionStatus::Ready | ExecutionStatus::Executing)
            {
                check_dependencies(&inner.items, position)?;
            }

            {
                let item = &mut inner.items[position];
                item.status = new_status;
                if let Some(reason) = reason {
                    item.error = Some(reason.to_string());
                }
                if new_status == ExecutionStatus::Executing {
                    item.executed_at = Some(Utc::now());
                }
            }
            if matches!(new_status, ExecutionStatus::Failed | ExecutionStatus::Cancelled) {
                cascade_cancel(&mut inner.items, item_id);
            }
            inner.current_index = inner
                .items
                .iter()
                .position(|i| !i.status.is_terminal())
                .unwrap_or(inner.items.len());

            let state = self.snapshot(&inner);
            let mut events = vec![ProgressEvent::Progress {
                execution_id: self.id.clone(),
                state: state.clone(),
            }];
            if state.is_complete() && !inner.completed_emitted {
                inner.completed_emitted = true;
                events.push(ProgressEvent::Complete {
                    execution_id: self.id.clone(),
                    success: state.is_successful(),
                });
            }
            (events, self.notify_order.lock())
        };

        for event in &events {
            self.notify(event);
        }
        Ok(())
    }

    /// Register a progress subscriber. The returned handle unsubscribes
    /// idempotently; dropping it without calling `unsubscribe` keeps the
    /// subscription alive for the array's lifetime.
    pub fn on_progress(
        self: &Arc<Self>,
        callback: impl Fn(&ProgressEvent) + Send + Sync + 'static,
    ) -> ProgressSubscription {
        let id = {
            let mut next = self.next_subscriber_id.lock();
            *next += 1;
            *next
        };
        self.subscribers.lock().push((id, Arc::new(callback)));
        ProgressSubscription {
            id,
            array: Arc::downgrade(self),
        }
    }

    fn notify(&self, event: &ProgressEvent) {
        let subscribers: Vec<Subscriber> = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, s)| Arc::clone(s))
            .collect();
        for subscriber in subscribers {
            // One subscriber's panic must not starve the others.
            if catch_unwind(AssertUnwindSafe(|| subscriber(event))).is_err() {
                tracing::warn!(execution_id = %self.id, "progress subscriber panicked");
            }
        }
    }

    fn snapshot(&self, inner: &Inner) -> ExecutionArrayState {
        let completed = inner.items.iter().filter(|i| i.status.is_success()).count();
        let failed = inner
            .items
            .iter()
            .filter(|i| i.status == ExecutionStatus::Failed)
            .count();
        let cancelled = inner
            .items
            .iter()
            .filter(|i| i.status == ExecutionStatus::Cancelled)
            .count();
        ExecutionArrayState {
            id: self.id.clone(),
            items: inner.items.clone(),
            current_index: inner.current_index,
            is_executing: inner.is_executing,
            is_paused: inner.is_paused,
            total_items: inner.items.len(),
            completed_items: completed,
            failed_items: failed,
            cancelled_items: cancelled,
        }
    }
}

/// Handle for one progress subscription.
pub struct ProgressSubscription {
    id: u64,
    array: std::sync::Weak<ExecutionArray>,
}

impl ProgressSubscription {
    /// Remove the subscription. Safe to call more than once.
    pub fn unsubscribe(&self) {
        if let Some(array) = self.array.upgrade() {
            array.subscribers.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

fn find_item<'a>(items: &'a mut [ExecutionItem], id: &str) -> Result<&'a mut ExecutionItem, ArrayError> {
    items
        .iter_mut()
        .find(|i| i.id == id)
        .ok_or_else(|| ArrayError::UnknownItem(id.to_string()))
}

fn check_dependencies(items: &[ExecutionItem], position: usize) -> Result<(), ArrayError> {
    for dep_id in &items[position].depends_on {
        let satisfied = items
            .iter()
            .find(|i| &i.id == dep_id)
            .is_some_and(|dep| dep.status.is_success());
        if !satisfied {
            return Err(ArrayError::UnmetDependency {
                item: items[position].id.clone(),
                dependency: dep_id.clone(),
            });
        }
    }
    Ok(())
}

/// Cancel every non-terminal item that transitively depends on `root`.
fn cascade_cancel(items: &mut [ExecutionItem], root: &str) {
    let mut frontier = vec![root.to_string()];
    while let Some(current) = frontier.pop() {
        let dependents: Vec<String> = items
            .iter()
            .filter(|i| i.depends_on.contains(&current) && !i.status.is_terminal())
            .map(|i| i.id.clone())
            .collect();
        for id in dependents {
            if let Some(item) = items.iter_mut().find(|i| i.id == id) {
                item.status = ExecutionStatus::Cancelled;
                item.error = Some("upstream dependency failed".to_string());
            }
            frontier.push(id);
        }
    }
}
