#![forbid(unsafe_code)]
//! Bidirectional JSON-RPC 2.0 client runtime for driving a long-running CLI agent over stdio.
//!
//! This crate is the core transport and request/response layer an SDK builds typed,
//! per-method wrappers on top of. It does not know about any particular RPC method
//! catalogue; it only knows how to frame, demultiplex, and dispatch JSON-RPC 2.0
//! messages over a pair of byte streams, and how to supervise the child process that
//! produces those streams.
//!
//! ## Layers
//! - [`transport::Transport`] — the framed reader/writer loop: one dedicated reader
//!   task, a write path serialized under a mutex, a pending-request table keyed by a
//!   normalized id (see [`id`]), and panic-isolated dispatch of inbound requests and
//!   notifications.
//! - [`client::Client`] — a thin layer over a `Transport`: id allocation, a default
//!   call timeout, a notification listener registry (one replaceable listener plus
//!   any number of appended ones per method), and the server-request router backed
//!   by an [`handler::ApprovalTable`].
//! - [`supervisor::Supervisor`] — spawns the agent binary, wires its stdio to a fresh
//!   `Transport`/`Client` pair, performs the one-shot `initialize` handshake, and
//!   implements the close sequence (half-close, bounded grace wait, force-kill).
//!
//! ## Example
//! ```rust,no_run
//! use agent_core::supervisor::{Supervisor, SupervisorConfig};
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SupervisorConfig::builder()
//!     .binary("/opt/myapp/bin/agent")
//!     .model("agent-large")
//!     .sandbox("workspace-write")
//!     .build();
//! let supervisor = Supervisor::spawn(config).await?;
//! supervisor.ensure_init(serde_json::json!({})).await?;
//! let reply: serde_json::Value = supervisor
//!     .client()
//!     .call("ping", serde_json::json!({}), true, None, None)
//!     .await?;
//! println!("{reply}");
//! supervisor.close().await?;
//! # Ok(()) }
//! ```
//!
//! This crate never initializes a `tracing` subscriber; wiring one up is left to the
//! embedding binary.

pub mod client;
pub mod error;
pub mod frame;
pub mod handler;
pub mod id;
mod process;
pub mod supervisor;
#[cfg(test)]
mod test_support;
pub mod transport;

pub use client::Client;
pub use error::AgentError;
pub use handler::ApprovalMethod;
pub use id::{IdKey, RequestId};
pub use supervisor::{Supervisor, SupervisorConfig, SupervisorConfigBuilder};
pub use transport::Transport;
