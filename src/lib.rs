pub mod app;
pub mod client;
pub mod config;
pub mod credential;
pub mod document;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod session;

// Re-export key types for convenience
pub use app::{create_orchestrator, init_tracing};
pub use client::{Backend, HttpBackend};
pub use config::Config;
pub use error::{ClientError, ClientResult};
pub use orchestrator::{Action, Orchestrator, Outcome, SlotView};
