//! The agentmesh coordination kernel.
//!
//! Wires the Pool Store up into a running agent process: identity
//! (claim/heartbeat/rename), presence, the message layer, the janitor
//! and leader-lease election, the blocking receive loop, and the
//! four-operation external surface (`Bridge`) that a tool-calling agent
//! actually talks to.
//!
//! A process constructs one [`Context`] (opening or creating the Pool
//! Store under a root path), hands it to [`Bridge::spawn`], and calls
//! `get_status` / `send` / `recv` / `rename` from there. `Bridge::spawn`
//! starts the background maintenance task that keeps this session's
//! heartbeat fresh and, if elected, runs the janitor's reap/prune/
//! deadlock duties.

pub mod bridge;
pub mod config;
pub mod context;
pub mod error;
pub mod identity;
pub mod janitor;
pub mod message;
pub mod presence;
pub mod recv;

pub use bridge::Bridge;
pub use config::{BusConfig, BusConfigBuilder};
pub use context::Context;
pub use error::{BusError, BusResult};
pub use janitor::Janitor;
pub use message::SendOutcome;
pub use recv::RecvOutcome;
