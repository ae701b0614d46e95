//! The four-operation external surface (spec ยง6): `get_status`, `send`,
//! `recv`, `rename`. Every method here returns a plain `String`, no
//! error type crosses this boundary, matching spec ยง7 ("the tool
//! surface exposes textual results only").

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use agentmesh_store::AgentMode;

use crate::context::{now_secs, Context};
use crate::error::BusError;
use crate::identity;
use crate::janitor::Janitor;
use crate::message::{self, SendOutcome};
use crate::presence;
use crate::recv::{recv_loop, RecvOutcome};

/// Owns a `Context` and the `Janitor` driving this process's
/// background maintenance task; the single value agents construct and
/// call the four tool operations against.
pub struct Bridge {
    ctx: Arc<Context>,
    janitor: Arc<Janitor>,
    maintenance: tokio::task::JoinHandle<()>,
}

impl Bridge {
    /// Builds a `Bridge` and spawns its background maintenance task
    /// (heartbeat + leader-lease attempt + janitor duties), matching
    /// spec ยง2 "every agent on startup... starts a background thread".
    pub fn spawn(ctx: Context) -> Self {
        let ctx = Arc::new(ctx);
        let janitor = Arc::new(Janitor::new());

        let task_ctx = ctx.clone();
        let task_janitor = janitor.clone();
        let maintenance = tokio::spawn(async move {
            maintenance_loop(task_ctx, task_janitor).await;
        });

        Self {
            ctx,
            janitor,
            maintenance,
        }
    }

    pub fn id(&self) -> String {
        self.ctx.id()
    }

    /// Direct handle to the shared store, for tests and callers that
    /// need a primitive the four tool operations don't expose.
    pub fn store(&self) -> Arc<agentmesh_store::PoolStore> {
        self.ctx.pool.clone()
    }

    /// Drops this `Bridge` without removing its agent row or stopping
    /// the maintenance task gracefully, simulating an unclean process
    /// exit (crash) for tests exercising the janitor's reap duties.
    pub fn abandon_without_shutdown(self) {
        self.maintenance.abort();
    }

    pub async fn get_status(&self) -> String {
        self.ctx.mark_active();
        match presence::list_online(&self.ctx.pool, &self.ctx.config) {
            Ok(online) => {
                let leader_id = current_leader_id(&self.ctx.pool);
                format_status(&online, &self.ctx.id(), leader_id.as_deref(), &self.ctx.config)
            }
            Err(err) => map_error(err),
        }
    }

    pub async fn send(&self, to: &str, content: &str) -> String {
        self.ctx.mark_active();
        let my_id = self.ctx.id();
        match message::send(&self.ctx.pool, &self.ctx.config, &my_id, to, content) {
            Ok(SendOutcome::Sent { recipient_count, short_id }) => {
                format!("Sent (to {recipient_count} agent(s), id={short_id})")
            }
            Ok(SendOutcome::NoOtherAgentsOnline) => "No other agents online.".to_string(),
            Err(err) => map_error(err),
        }
    }

    /// Blocks until at least one message arrives, `wait_seconds`
    /// elapses, or `cancel` fires (spec ยง4.F).
    pub async fn recv(&self, wait_seconds: i64) -> String {
        self.recv_with_cancellation(wait_seconds, &CancellationToken::new()).await
    }

    pub async fn recv_with_cancellation(&self, wait_seconds: i64, cancel: &CancellationToken) -> String {
        self.ctx.mark_active();
        match recv_loop(&self.ctx, &self.janitor, wait_seconds, cancel).await {
            Ok(RecvOutcome::Messages(text)) => text,
            Ok(RecvOutcome::NoNewMessages) => "No new messages.".to_string(),
            Ok(RecvOutcome::Timeout { wait_seconds }) => format!("Timeout ({wait_seconds}s)."),
            Ok(RecvOutcome::Cancelled) => "Cancelled by new command.".to_string(),
            Err(err) => map_error(err),
        }
    }

    pub async fn rename(&self, new_name: &str) -> String {
        self.ctx.mark_active();
        let _guard = self.ctx.identity_mutex().lock().await;
        let old_id = self.ctx.id();
        match identity::rename(&self.ctx.pool, &self.ctx.config, &old_id, new_name) {
            Ok(identity::RenameOutcome::Ok) => {
                self.ctx.set_id(new_name.to_string());
                "OK".to_string()
            }
            Err(BusError::InvalidName { .. }) | Err(BusError::ReservedName(_)) => "Invalid".to_string(),
            Err(BusError::NameTaken(_)) => "Name taken".to_string(),
            Err(_) => "Fail".to_string(),
        }
    }

    /// Best-effort removal of this session's own row and a clean
    /// shutdown of the background maintenance task.
    pub async fn shutdown(self) {
        self.ctx.shutdown();
        self.maintenance.abort();
    }
}

/// Maps any internal `BusError` to the short, stable strings spec ยง7
/// promises. Validation-shaped errors are handled inline by their
/// specific call sites (`send`, `rename`); this catch-all covers store
/// and core failures that reach `get_status`/`recv` or an
/// unanticipated path out of `send`.
fn map_error(err: BusError) -> String {
    match err {
        BusError::SendToSelf => "Error: cannot send to self.".to_string(),
        BusError::RecipientOffline(id) => format!("Error: Agent '{id}' offline."),
        BusError::NoOtherAgentsOnline => "No other agents online.".to_string(),
        BusError::PoolExhausted => "DB Error: ID pool exhausted".to_string(),
        other => format!("DB Error: {other}"),
    }
}

/// Background maintenance task: heartbeat + leader-lease attempt +
/// (if elected) janitor duties, on the same loop (spec ยง2).
async fn maintenance_loop(ctx: Arc<Context>, janitor: Arc<Janitor>) {
    // De-herd concurrent startups (spec ยง4.E).
    let start_delay = Duration::from_millis(rand::random::<u64>() % 3000);
    tokio::time::sleep(start_delay).await;

    loop {
        let my_id = ctx.id();
        if let Err(err) = identity::heartbeat(&ctx.pool, &my_id, &crate::context::current_cwd()) {
            tracing::warn!(error = %err, "heartbeat failed");
        }

        if let Err(err) = janitor.tick(&ctx.pool, &ctx.config, &my_id, &ctx.hostname, ctx.pid) {
            tracing::warn!(error = %err, "janitor tick failed");
        }

        tokio::time::sleep(ctx.config.heartbeat_interval.min(ctx.config.leader_renew_every)).await;
    }
}

/// Reads the lease row and returns its owner's id, but only while the
/// lease is still live; an expired lease has no current holder.
fn current_leader_id(pool: &agentmesh_store::PoolStore) -> Option<String> {
    let lease = pool.get_lease().ok().flatten()?;
    if lease.lease_until > now_secs() {
        Some(lease.owner_id)
    } else {
        None
    }
}

/// Formats the `get_status` listing (spec ยง6): one line per online
/// agent, self-id flagged `THIS`, the current leader flagged `LEADER`,
/// and a state suffix derived from `mode`/elapsed time.
fn format_status(online: &[agentmesh_store::AgentRow], my_id: &str, leader_id: Option<&str>, cfg: &crate::config::BusConfig) -> String {
    if online.is_empty() {
        return "No active agents.".to_string();
    }

    let now = now_secs();
    let mut lines: Vec<(bool, String, String)> = Vec::new();

    for agent in online {
        let mut flags = Vec::new();
        if agent.id == my_id {
            flags.push("THIS".to_string());
        }
        if leader_id == Some(agent.id.as_str()) {
            flags.push("LEADER".to_string());
        }

        let state = match agent.mode {
            AgentMode::Waiting => {
                let started = agent.recv_started.unwrap_or(agent.mode_since);
                let elapsed = (now - started).max(0);
                match agent.recv_wait_seconds {
                    Some(total) if total > 0 => format!("๐ŸŽง Waiting ({elapsed}s/{total}s)"),
                    _ => format!("๐ŸŽง Waiting ({elapsed}s)"),
                }
            }
            AgentMode::Working => {
                let elapsed = (now - agent.mode_since).max(0);
                if elapsed as u64 >= cfg.stale_working_threshold.as_secs() {
                    format!("โ“ Working ({elapsed}s)")
                } else {
                    format!("๐Ÿ›  Working ({elapsed}s)")
                }
            }
        };

        flags.push(state);
        let bracket = flags.join(" | ");
        let line = format!("Agent {} @ {}  [{}]", agent.id, agent.cwd, bracket);
        lines.push((agent.id == my_id, agent.id.clone(), line));
    }

    // Self first, then by id.
    lines.sort_by(|a, b| match (a.0, b.0) {
        (true, false) => std::cmp::Ordering::Less,
        (false, true) => std::cmp::Ordering::Greater,
        _ => a.1.cmp(&b.1),
    });

    lines.into_iter().map(|(_, _, line)| line).collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BusConfig;

    #[tokio::test]
    async fn empty_fleet_reports_no_active_agents() {
        let bridge = Bridge::spawn(Context::new_in_memory(BusConfig::default()).unwrap());
        // Delete our own just-claimed row to simulate "nobody online".
        bridge.ctx.pool.delete_agent(&bridge.id()).unwrap();
        assert_eq!(bridge.get_status().await, "No active agents.");
        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn rename_to_invalid_name_reports_invalid() {
        let bridge = Bridge::spawn(Context::new_in_memory(BusConfig::default()).unwrap());
        assert_eq!(bridge.rename("not ok!").await, "Invalid");
        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn rename_to_reserved_name_reports_invalid() {
        let bridge = Bridge::spawn(Context::new_in_memory(BusConfig::default()).unwrap());
        assert_eq!(bridge.rename("leader").await, "Invalid");
        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn rename_success_updates_visible_id() {
        let bridge = Bridge::spawn(Context::new_in_memory(BusConfig::default()).unwrap());
        assert_eq!(bridge.rename("scout").await, "OK");
        assert_eq!(bridge.id(), "scout");
        bridge.shutdown().await;
    }

    #[test]
    fn map_error_matches_wire_contract() {
        assert_eq!(map_error(BusError::SendToSelf), "Error: cannot send to self.");
        assert_eq!(
            map_error(BusError::RecipientOffline("042".to_string())),
            "Error: Agent '042' offline."
        );
        assert_eq!(map_error(BusError::PoolExhausted), "DB Error: ID pool exhausted");
    }
}
