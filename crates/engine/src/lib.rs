//! # Graphrun Engine
//!
//! The engine drives a long-running, resumable remote execution that reports
//! its progress as a stream of JSON documents.
//!
//! ## Key Features
//!
//! - **Lifecycle state machine**: `Idle → Running → Idle` per submit or resume
//!   cycle, with a guard that rejects overlapping cycles
//! - **Outcome classification**: the last chunk of a stream decides between
//!   `interrupted` (resumable) and `stop` (reached `__END__`)
//! - **Typed notifications**: `init`, `state-updated`, `result`, and re-render
//!   requests delivered to every subscriber without loss
//! - **Cancellation and timeouts** around every cycle
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use graphrun_api::{ClientOptions, GraphClient};
//! use graphrun_engine::{ControllerOptions, ExecutionController};
//!
//! let client = GraphClient::new("http://localhost:8080", ClientOptions::default())?;
//! let controller = ExecutionController::new(Arc::new(client), ControllerOptions::default());
//! let mut events = controller.subscribe();
//! controller.initialize().await?;
//! controller.on_thread_selected("t1".into());
//! let report = controller.submit_selected(inputs).await?;
//! ```
//!
//! ## Architecture
//!
//! - **`controller`**: the execution controller and its cycle bookkeeping
//! - **`service`**: the seam to the remote service, implemented for `GraphClient`
//! - **`notify`**: per-subscriber fan-out of execution events
//! - **`inputs`**: building submit bodies from announced argument metadata
//! - **`config`**: the on-disk client configuration

pub mod config;
pub mod controller;
pub mod errors;
pub mod inputs;
pub mod notify;
pub mod service;

pub use config::{ConfigError, GraphrunConfig, load_config, load_config_from_path};
pub use controller::{ControllerOptions, CycleReport, ExecutionController};
pub use errors::ExecutionError;
pub use inputs::{InputError, collect_inputs, parse_assignment};
pub use notify::EventHub;
pub use service::ExecutionService;
