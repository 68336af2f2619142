//! Execution items and their status machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Lifecycle of one item. Monotonic except for explicit cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Ready,
    Executing,
    Completed,
    Finalized,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed
                | ExecutionStatus::Finalized
                | ExecutionStatus::Failed
                | ExecutionStatus::Cancelled
        )
    }

    pub fn is_success(self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Finalized)
    }

    /// The transition table. Anything not listed is invalid; terminal
    /// states admit nothing except `completed -> finalized`.
    pub fn can_transition(self, to: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        matches!(
            (self, to),
            (Pending, Ready | Executing | Failed | Cancelled)
                | (Ready, Executing | Failed | Cancelled)
                | (Executing, Completed | Failed | Cancelled)
                | (Completed, Finalized)
        )
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Ready => "ready",
            ExecutionStatus::Executing => "executing",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Finalized => "finalized",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionKind {
    Transaction,
    DataFetch,
    Validation,
    UserInput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    pub retry: bool,
    pub max_attempts: u32,
    pub fallback_item: Option<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            retry: false,
            max_attempts: 1,
            fallback_item: None,
        }
    }
}

/// One atomic operation of a user intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionItem {
    pub id: String,
    pub position: usize,
    /// Target capability name, e.g. "transfer".
    pub capability: String,
    pub kind: ExecutionKind,
    pub params: Value,
    pub status: ExecutionStatus,
    /// Items that must reach a success state before this one may leave
    /// `pending`.
    pub depends_on: Vec<String>,
    pub requires_confirmation: bool,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    pub retry: RetryPolicy,
}

impl ExecutionItem {
    pub fn new(capability: &str, kind: ExecutionKind) -> Self {
        ExecutionItem {
            id: Uuid::new_v4().to_string(),
            position: 0,
            capability: capability.to_string(),
            kind,
            params: Value::Null,
            status: ExecutionStatus::Pending,
            depends_on: Vec::new(),
            requires_confirmation: false,
            result: None,
            error: None,
            created_at: Utc::now(),
            executed_at: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    pub fn depending_on(mut self, id: &str) -> Self {
        self.depends_on.push(id.to_string());
        self
    }

    pub fn requiring_confirmation(mut self) -> Self {
        self.requires_confirmation = true;
        self
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }
}
