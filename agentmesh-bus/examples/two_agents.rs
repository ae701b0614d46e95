//! Two agents on one pool root, exchanging a unicast message.
//!
//! This demonstrates the shape every real agent process follows:
//! construct a `Context` against a pool root, hand it to `Bridge::spawn`,
//! then call the four tool operations from there.
//!
//! # Run This Example
//!
//! ```bash
//! cargo run --example two_agents
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)] // Allow in examples for clarity

use agentmesh_bus::{BusConfig, Context};
use agentmesh_bus::bridge::Bridge;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let root = tempfile::tempdir().expect("create example pool root");
    let cfg = BusConfig::default();

    let alice = Bridge::spawn(Context::new(root.path(), cfg.clone()).unwrap());
    let bob = Bridge::spawn(Context::new(root.path(), cfg).unwrap());

    println!("{}", alice.get_status().await);

    let bob_id = bob.id();
    println!("{}", alice.send(&bob_id, "hello from the other agent").await);

    println!("{}", bob.recv(5).await);

    alice.shutdown().await;
    bob.shutdown().await;
}
