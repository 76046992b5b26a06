//! Session orchestration for the trading client
//!
//! This module owns the connection state machine, the polling session
//! worker with its batch accounting and execution pipeline, and the
//! one-shot advisory requester.

mod advisory;
mod batch;
mod config;
mod connection;
mod pipeline;
mod readiness;
mod runner;

pub use advisory::AdvisoryRequester;
pub use batch::BatchTracker;
pub use config::{ConnectionSettings, SessionConfig};
pub use connection::{ConnectionCoordinator, ConnectionState};
pub use pipeline::{resolve_offset, ExecutionOutcome, ExecutionPipeline};
pub use readiness::{check_readiness, SymbolReadiness};
pub use runner::{SessionHandle, SessionRunner};
