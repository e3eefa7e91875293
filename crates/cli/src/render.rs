//! Terminal rendering of execution events.
//!
//! Result chunks go to stdout, one JSON document per line, so they can be
//! piped. Lifecycle states and hints go to stderr.

use anyhow::Result;
use graphrun_types::{ExecutionEvent, ExecutionOutcome, LifecycleState, ThreadId, UpdatedState};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Stdout(String),
    Stderr(String),
}

#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    /// Print every event as a tagged JSON object instead of the plain layout.
    pub json: bool,
    /// Print the `init` payload (only the `init` command wants it).
    pub show_init: bool,
}

impl Renderer {
    pub fn render(&self, event: &ExecutionEvent) -> Result<()> {
        match self.format(event)? {
            Some(Line::Stdout(text)) => println!("{text}"),
            Some(Line::Stderr(text)) => eprintln!("{text}"),
            None => {}
        }
        Ok(())
    }

    fn format(&self, event: &ExecutionEvent) -> Result<Option<Line>> {
        let is_init = matches!(event, ExecutionEvent::Init(_));
        if is_init && !self.show_init {
            return Ok(None);
        }
        if self.json {
            return Ok(Some(Line::Stdout(serde_json::to_string(event)?)));
        }

        let line = match event {
            ExecutionEvent::Init(init) => Line::Stdout(serde_json::to_string_pretty(init)?),
            ExecutionEvent::Result(chunk) => Line::Stdout(chunk.to_string()),
            ExecutionEvent::StateUpdated(state) => Line::Stderr(lifecycle_label(*state).to_string()),
            ExecutionEvent::Invalidated(snapshot) => {
                debug!(?snapshot, "controller state changed");
                return Ok(None);
            }
        };
        Ok(Some(line))
    }
}

fn lifecycle_label(state: LifecycleState) -> &'static str {
    match state {
        LifecycleState::Start => "▶ started",
        LifecycleState::Stop => "■ completed",
        LifecycleState::Interrupted => "⏸ interrupted",
    }
}

/// Tell the user how to continue after a cycle ends.
pub fn print_outcome_hint(thread_id: &ThreadId, outcome: Option<ExecutionOutcome>, held: Option<&UpdatedState>) {
    if let Some(hint) = outcome_hint(thread_id, outcome, held) {
        eprintln!("{hint}");
    }
}

fn outcome_hint(thread_id: &ThreadId, outcome: Option<ExecutionOutcome>, held: Option<&UpdatedState>) -> Option<String> {
    match (outcome, held) {
        (Some(ExecutionOutcome::Interrupted), Some(state)) => Some(format!(
            "resume with: graphrun resume --thread {} --node {} --checkpoint {}",
            thread_id,
            state.node,
            state.checkpoint.as_deref().unwrap_or("''")
        )),
        (Some(ExecutionOutcome::Interrupted), None) => Some("execution paused without a checkpoint".to_string()),
        (None, _) => Some("stream ended without a recognizable outcome".to_string()),
        (Some(ExecutionOutcome::Completed), _) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphrun_types::{ControllerSnapshot, ExecutionState, InitData};
    use serde_json::{Value, json};

    const PLAIN: Renderer = Renderer {
        json: false,
        show_init: false,
    };
    const JSON: Renderer = Renderer {
        json: true,
        show_init: false,
    };

    #[test]
    fn json_mode_prints_tagged_events_on_stdout() {
        let line = JSON
            .format(&ExecutionEvent::StateUpdated(LifecycleState::Interrupted))
            .unwrap()
            .expect("line");
        let Line::Stdout(text) = line else {
            panic!("json events go to stdout");
        };
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, json!({"event": "state-updated", "detail": "interrupted"}));

        let Some(Line::Stdout(text)) = JSON.format(&ExecutionEvent::Result(json!({"node": "A"}))).unwrap() else {
            panic!("result line");
        };
        assert_eq!(serde_json::from_str::<Value>(&text).unwrap(), json!({"event": "result", "detail": {"node": "A"}}));
    }

    #[test]
    fn plain_mode_splits_results_and_lifecycle() {
        assert_eq!(
            PLAIN.format(&ExecutionEvent::Result(json!(["t1", {"node": "B"}]))).unwrap(),
            Some(Line::Stdout(r#"["t1",{"node":"B"}]"#.to_string()))
        );
        assert_eq!(
            PLAIN.format(&ExecutionEvent::StateUpdated(LifecycleState::Stop)).unwrap(),
            Some(Line::Stderr("■ completed".to_string()))
        );
        let snapshot = ControllerSnapshot {
            thread_id: None,
            updated_state: None,
            execution_state: ExecutionState::Idle,
        };
        assert_eq!(PLAIN.format(&ExecutionEvent::Invalidated(snapshot)).unwrap(), None);
    }

    #[test]
    fn init_payload_is_shown_only_when_requested() {
        let event = ExecutionEvent::Init(InitData::default());
        assert_eq!(PLAIN.format(&event).unwrap(), None);
        assert_eq!(JSON.format(&event).unwrap(), None);

        let init_command = Renderer {
            json: false,
            show_init: true,
        };
        assert!(matches!(init_command.format(&event).unwrap(), Some(Line::Stdout(_))));
    }

    #[test]
    fn interrupted_outcome_suggests_resume_command() {
        let held = UpdatedState::new("B", "c1", json!({}));
        assert_eq!(
            outcome_hint(&ThreadId::from("t1"), Some(ExecutionOutcome::Interrupted), Some(&held)).as_deref(),
            Some("resume with: graphrun resume --thread t1 --node B --checkpoint c1")
        );
        assert_eq!(outcome_hint(&ThreadId::from("t1"), Some(ExecutionOutcome::Completed), Some(&held)), None);
        assert!(outcome_hint(&ThreadId::from("t1"), None, None).is_some());
    }
}
