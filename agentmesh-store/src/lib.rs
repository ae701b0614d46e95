//! The Pool Store (spec §4.A): a SQLite file opened directly by every
//! agent process on the host, providing atomic writes, compare-and-swap
//! primitives, and crash-safe recovery, with no server in the loop.

pub mod connection;
pub mod error;
pub mod models;
pub mod root;
pub mod schema;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use models::{AgentMode, AgentRow, DeadlockState, LeaderLease, MessageRow, MessageState};
pub use store::{LeaseBatch, NewMessage, PoolStore};
