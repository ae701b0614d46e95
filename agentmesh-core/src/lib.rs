//! Process-local primitives shared by the Pool Store and the bus kernel.
//!
//! This crate has no knowledge of the wire format, schema, or message
//! semantics of `agentmesh`. It provides the small set of building
//! blocks every other crate in the workspace needs: a canonical error
//! type, a retry/backoff policy for transient storage contention, PID
//! liveness checks for the janitor's local reap duty, and short id
//! helpers.

pub mod backoff;
pub mod error;
pub mod ids;
pub mod pid;

pub use backoff::{BackoffPolicy, DEFAULT_BACKOFF};
pub use error::{CoreError, CoreResult};
pub use ids::{new_msg_id, short_id};
pub use pid::is_alive;
