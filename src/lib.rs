// Library crate - exports the session orchestration core and its collaborators

pub mod advisor;
pub mod broker;
pub mod bus;
pub mod client;
pub mod session;
pub mod strategy;
pub mod types;

// Re-export commonly used types
pub use bus::{BusMessage, EventBus};
pub use client::TradingClient;
pub use session::{ConnectionState, SessionConfig};
pub use types::*;
