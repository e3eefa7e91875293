//! Execution lifecycle controller.
//!
//! The controller owns the single in-flight execution of a thread. A cycle
//! moves `Idle → Running` (emitting `start`), drains the decoded response
//! stream while forwarding every chunk as a `result`, returns to `Idle`, and
//! then classifies the last chunk as `interrupted` or `stop`. Cycles that fail,
//! are cancelled, or time out return to `Idle` without a terminal notification.
//!
//! The controller is a cheap cloneable handle. Clones share state, so one
//! clone can drive a cycle while another cancels it or feeds inward signals.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use graphrun_api::StreamRequest;
use graphrun_types::{
    ArgumentMetadata, ControllerSnapshot, ExecutionEvent, ExecutionOutcome, ExecutionState, InitData, InputValues,
    LifecycleState, ThreadId, UpdatedState, chunk_node, chunk_thread_state,
};
use graphrun_util::{DecoderOptions, decode_json_stream};
use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{errors::ExecutionError, notify::EventHub, service::ExecutionService};

/// Runtime tuning for [`ExecutionController`].
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Upper bound on one whole cycle, from sending the request to the end of the stream.
    pub stream_timeout: Option<Duration>,
    /// Decoder settings applied to every response stream.
    pub decoder: DecoderOptions,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            stream_timeout: None,
            decoder: DecoderOptions::default(),
        }
    }
}

/// Summary of one completed cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// `None` when the stream produced no chunk or the last chunk carried no node.
    pub outcome: Option<ExecutionOutcome>,
    pub chunk_count: usize,
    pub last_chunk: Option<Value>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct ControllerState {
    execution: ExecutionState,
    thread_id: Option<ThreadId>,
    updated_state: Option<UpdatedState>,
    args: Vec<ArgumentMetadata>,
    cancellation: Option<CancellationToken>,
}

impl ControllerState {
    fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            thread_id: self.thread_id.clone(),
            updated_state: self.updated_state.clone(),
            execution_state: self.execution,
        }
    }
}

struct ControllerInner {
    service: Arc<dyn ExecutionService>,
    events: EventHub,
    options: ControllerOptions,
    state: Mutex<ControllerState>,
}

/// Drives submit and resume cycles against an [`ExecutionService`].
#[derive(Clone)]
pub struct ExecutionController {
    inner: Arc<ControllerInner>,
}

/// Returns the controller to `Idle` when a cycle ends, including when the
/// cycle future is dropped before completion.
struct RunningGuard {
    inner: Arc<ControllerInner>,
    token: CancellationToken,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        let mut state = lock(&self.inner.state);
        state.execution = ExecutionState::Idle;
        state.cancellation = None;
    }
}

#[derive(Debug, Default)]
struct Drained {
    chunk_count: usize,
    last_chunk: Option<Value>,
}

impl ExecutionController {
    pub fn new(service: Arc<dyn ExecutionService>, options: ControllerOptions) -> Self {
        let events = EventHub::new();
        Self {
            inner: Arc::new(ControllerInner {
                service,
                events,
                options,
                state: Mutex::new(ControllerState::default()),
            }),
        }
    }

    /// Receive every notification emitted after this call.
    pub fn subscribe(&self) -> UnboundedReceiver<ExecutionEvent> {
        self.inner.events.subscribe()
    }

    pub fn execution_state(&self) -> ExecutionState {
        self.state().execution
    }

    pub fn thread_id(&self) -> Option<ThreadId> {
        self.state().thread_id.clone()
    }

    pub fn updated_state(&self) -> Option<UpdatedState> {
        self.state().updated_state.clone()
    }

    /// Arguments announced by the last successful [`ExecutionController::initialize`].
    pub fn args(&self) -> Vec<ArgumentMetadata> {
        self.state().args.clone()
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        self.state().snapshot()
    }

    /// Whether a held, non-terminal checkpoint can be resumed right now.
    pub fn can_resume(&self) -> bool {
        let state = self.state();
        state.execution == ExecutionState::Idle && state.updated_state.as_ref().is_some_and(|held| !held.is_terminal())
    }

    /// Fetch the service's input metadata and announce it with an `init` notification.
    pub async fn initialize(&self) -> Result<InitData, ExecutionError> {
        let init = self.inner.service.init().await?;
        self.state().args = init.args.clone();
        info!(arg_count = init.args.len(), "execution service initialized");
        self.inner.events.emit(ExecutionEvent::Init(init.clone()));
        Ok(init)
    }

    /// Start a new execution on `thread_id` with `inputs` as the request body.
    pub async fn submit(&self, thread_id: &ThreadId, inputs: InputValues) -> Result<CycleReport, ExecutionError> {
        let body = Value::Object(inputs.into_iter().collect());
        self.run_cycle(StreamRequest::submit(thread_id.clone(), body), false).await
    }

    /// Resume `thread_id` from `updated_state`, clearing the held checkpoint first.
    ///
    /// `node` and `checkpoint` are sent as given; nothing is validated here.
    pub async fn resume(&self, thread_id: &ThreadId, updated_state: UpdatedState) -> Result<CycleReport, ExecutionError> {
        self.run_cycle(StreamRequest::resume(thread_id.clone(), updated_state), true).await
    }

    /// [`ExecutionController::submit`] on the currently selected thread.
    pub async fn submit_selected(&self, inputs: InputValues) -> Result<CycleReport, ExecutionError> {
        let thread_id = self.thread_id().ok_or(ExecutionError::NoThreadSelected)?;
        self.submit(&thread_id, inputs).await
    }

    /// [`ExecutionController::resume`] on the selected thread from the held checkpoint.
    pub async fn resume_held(&self) -> Result<CycleReport, ExecutionError> {
        let (thread_id, held) = {
            let state = self.state();
            (state.thread_id.clone(), state.updated_state.clone())
        };
        let thread_id = thread_id.ok_or(ExecutionError::NoThreadSelected)?;
        let held = held.ok_or(ExecutionError::NothingToResume)?;
        self.resume(&thread_id, held).await
    }

    /// Inward signal: a different thread was selected.
    ///
    /// The held checkpoint belongs to the previous thread and is always cleared.
    pub fn on_thread_selected(&self, thread_id: ThreadId) {
        debug!(thread = %thread_id, "thread selected");
        let snapshot = {
            let mut state = self.state();
            state.thread_id = Some(thread_id);
            state.updated_state = None;
            state.snapshot()
        };
        self.inner.events.emit(ExecutionEvent::Invalidated(snapshot));
    }

    /// Inward signal: a newer checkpoint was produced elsewhere.
    pub fn on_external_state_update(&self, updated_state: UpdatedState) {
        debug!(node = %updated_state.node, "external checkpoint received");
        let snapshot = {
            let mut state = self.state();
            state.updated_state = Some(updated_state);
            state.snapshot()
        };
        self.inner.events.emit(ExecutionEvent::Invalidated(snapshot));
    }

    /// Cancel the in-flight cycle, if any. Returns whether a cycle was running.
    pub fn cancel(&self) -> bool {
        match &self.state().cancellation {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    async fn run_cycle(&self, request: StreamRequest, clear_held_state: bool) -> Result<CycleReport, ExecutionError> {
        let guard = self.begin(clear_held_state)?;
        let started_at = Utc::now();
        let thread_id = request.thread_id.clone();
        let resuming = request.resume.is_some();
        info!(thread = %thread_id, resuming, "execution started");
        self.inner.events.emit(ExecutionEvent::StateUpdated(LifecycleState::Start));

        let token = guard.token.clone();
        let stream_timeout = self.inner.options.stream_timeout;
        let drained = tokio::select! {
            biased;
            _ = token.cancelled() => Err(ExecutionError::Cancelled),
            _ = deadline(stream_timeout) => Err(ExecutionError::timeout(stream_timeout.unwrap_or_default())),
            drained = self.drain(request) => drained,
        };
        drop(guard);

        let drained = match drained {
            Ok(drained) => drained,
            Err(error) => {
                warn!(thread = %thread_id, error = %error, "execution ended without an outcome");
                return Err(error);
            }
        };

        let outcome = drained.last_chunk.as_ref().and_then(|chunk| self.classify(chunk));
        if let Some(outcome) = outcome {
            self.inner.events.emit(ExecutionEvent::StateUpdated(outcome.lifecycle()));
        }
        info!(thread = %thread_id, chunks = drained.chunk_count, outcome = ?outcome, "execution finished");

        Ok(CycleReport {
            outcome,
            chunk_count: drained.chunk_count,
            last_chunk: drained.last_chunk,
            started_at,
            finished_at: Utc::now(),
        })
    }

    fn begin(&self, clear_held_state: bool) -> Result<RunningGuard, ExecutionError> {
        let mut state = self.state();
        if state.execution == ExecutionState::Running {
            return Err(ExecutionError::AlreadyRunning);
        }
        let token = CancellationToken::new();
        state.execution = ExecutionState::Running;
        state.cancellation = Some(token.clone());
        if clear_held_state {
            state.updated_state = None;
        }
        Ok(RunningGuard {
            inner: Arc::clone(&self.inner),
            token,
        })
    }

    async fn drain(&self, request: StreamRequest) -> Result<Drained, ExecutionError> {
        let body = self.inner.service.open_stream(request).await?;
        let chunks = decode_json_stream(body, self.inner.options.decoder);
        futures_util::pin_mut!(chunks);

        let mut drained = Drained::default();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            debug!(index = drained.chunk_count, "chunk decoded");
            drained.chunk_count += 1;
            self.inner.events.emit(ExecutionEvent::Result(chunk.clone()));
            drained.last_chunk = Some(chunk);
        }
        Ok(drained)
    }

    /// Classify the last chunk of a drained stream and hold its checkpoint.
    fn classify(&self, chunk: &Value) -> Option<ExecutionOutcome> {
        let Some(node) = chunk_node(chunk) else {
            warn!(chunk = %chunk, "last chunk carries no node; outcome unknown");
            return None;
        };
        let outcome = ExecutionOutcome::from_node(node);
        if let Some((_, held)) = chunk_thread_state(chunk) {
            self.state().updated_state = Some(held);
        }
        Some(outcome)
    }

    fn state(&self) -> MutexGuard<'_, ControllerState> {
        lock(&self.inner.state)
    }
}

fn lock(state: &Mutex<ControllerState>) -> MutexGuard<'_, ControllerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn deadline(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending::<()>().await,
    }
}
