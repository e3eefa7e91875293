//! Execution lifecycle types: checkpoints, controller states, and the
//! notifications emitted while a stream drains.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{InitData, ThreadId};

/// Node identifier the service reports once an execution has fully completed.
pub const END_NODE: &str = "__END__";

/// Resumable snapshot carried by the last chunk of a stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatedState {
    /// Identifier of the step that last executed.
    pub node: String,
    /// Opaque checkpoint token paired with `node`.
    #[serde(default)]
    pub checkpoint: Option<String>,
    /// Payload sent back as the body when resuming.
    #[serde(default)]
    pub data: Value,
    /// Step scheduled to run next, when the service reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

impl UpdatedState {
    pub fn new(node: impl Into<String>, checkpoint: impl Into<String>, data: Value) -> Self {
        Self {
            node: node.into(),
            checkpoint: Some(checkpoint.into()),
            data,
            next: None,
        }
    }

    /// Whether this snapshot was captured at the terminal node.
    pub fn is_terminal(&self) -> bool {
        self.node == END_NODE
    }
}

/// Whether a request is currently in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionState {
    #[default]
    Idle,
    Running,
}

/// Detail of the `state-updated` notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Start,
    Stop,
    Interrupted,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LifecycleState::Start => "start",
            LifecycleState::Stop => "stop",
            LifecycleState::Interrupted => "interrupted",
        };
        f.write_str(label)
    }
}

/// How a drained cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionOutcome {
    /// The remote execution paused before the terminal node and can be resumed.
    Interrupted,
    /// The remote execution reached the terminal node.
    Completed,
}

impl ExecutionOutcome {
    /// Classify the node reported by the last chunk of a stream.
    pub fn from_node(node: &str) -> Self {
        if node == END_NODE {
            ExecutionOutcome::Completed
        } else {
            ExecutionOutcome::Interrupted
        }
    }

    /// The lifecycle notification announcing this outcome.
    pub fn lifecycle(self) -> LifecycleState {
        match self {
            ExecutionOutcome::Interrupted => LifecycleState::Interrupted,
            ExecutionOutcome::Completed => LifecycleState::Stop,
        }
    }
}

/// Read-only view of the controller handed to the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControllerSnapshot {
    pub thread_id: Option<ThreadId>,
    pub updated_state: Option<UpdatedState>,
    pub execution_state: ExecutionState,
}

/// Notifications emitted by the execution controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "detail", rename_all = "kebab-case")]
pub enum ExecutionEvent {
    /// The service announced its inputs.
    Init(InitData),
    /// A cycle started or reached a terminal classification.
    StateUpdated(LifecycleState),
    /// One decoded chunk, forwarded in wire order.
    Result(Value),
    /// Inward signal changed what should be rendered.
    Invalidated(ControllerSnapshot),
}

/// Extract the `node` reported by a decoded chunk.
///
/// Accepts the `[thread, {node, ...}]` pair the service sends last as well as
/// a bare `{node, ...}` object.
pub fn chunk_node(chunk: &Value) -> Option<&str> {
    match chunk {
        Value::Array(items) => items.get(1)?.get("node")?.as_str(),
        Value::Object(map) => map.get("node")?.as_str(),
        _ => None,
    }
}

/// Split a `[thread, state]` chunk into its thread and resumable state.
pub fn chunk_thread_state(chunk: &Value) -> Option<(ThreadId, UpdatedState)> {
    let items = chunk.as_array()?;
    let thread = items.first()?.as_str()?;
    let state = serde_json::from_value::<UpdatedState>(items.get(1)?.clone()).ok()?;
    Some((ThreadId::from(thread), state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn outcome_follows_terminal_node() {
        assert_eq!(ExecutionOutcome::from_node(END_NODE), ExecutionOutcome::Completed);
        assert_eq!(ExecutionOutcome::from_node("agent"), ExecutionOutcome::Interrupted);
        assert_eq!(ExecutionOutcome::Completed.lifecycle(), LifecycleState::Stop);
        assert_eq!(ExecutionOutcome::Interrupted.lifecycle(), LifecycleState::Interrupted);
    }

    #[test]
    fn chunk_node_reads_pairs_and_objects() {
        let pair = json!(["t1", { "node": "B", "checkpoint": "c1", "data": {} }]);
        assert_eq!(chunk_node(&pair), Some("B"));
        assert_eq!(chunk_node(&json!({ "node": "A" })), Some("A"));
        assert_eq!(chunk_node(&json!(["t1"])), None);
        assert_eq!(chunk_node(&json!(42)), None);
    }

    #[test]
    fn chunk_thread_state_requires_pair_shape() {
        let pair = json!(["t1", { "node": "B", "checkpoint": "c1", "data": { "k": 1 }, "next": "C" }]);
        let (thread, state) = chunk_thread_state(&pair).expect("pair");
        assert_eq!(thread.as_str(), "t1");
        assert_eq!(state.node, "B");
        assert_eq!(state.checkpoint.as_deref(), Some("c1"));
        assert_eq!(state.data, json!({ "k": 1 }));
        assert_eq!(state.next.as_deref(), Some("C"));

        assert!(chunk_thread_state(&json!({ "node": "A" })).is_none());
        assert!(chunk_thread_state(&json!(["t1", { "checkpoint": "c1" }])).is_none());
    }

    #[test]
    fn events_serialize_with_event_name_and_detail() {
        let event = ExecutionEvent::StateUpdated(LifecycleState::Interrupted);
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({ "event": "state-updated", "detail": "interrupted" })
        );

        let event = ExecutionEvent::Result(json!({ "node": "A" }));
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({ "event": "result", "detail": { "node": "A" } })
        );
    }

    #[test]
    fn missing_checkpoint_and_data_default() {
        let state: UpdatedState = serde_json::from_value(json!({ "node": "A" })).unwrap();
        assert_eq!(state.checkpoint, None);
        assert_eq!(state.data, Value::Null);
        assert!(!state.is_terminal());
    }
}
