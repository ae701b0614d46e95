//! Row types mirroring the data model in spec §3.

use serde::{Deserialize, Serialize};

/// An agent's current activity mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentMode {
    Working,
    Waiting,
}

impl AgentMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentMode::Working => "working",
            AgentMode::Waiting => "waiting",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "waiting" => AgentMode::Waiting,
            _ => AgentMode::Working,
        }
    }
}

/// One row of the `peers` table (spec §3 "Agent record").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRow {
    pub id: String,
    pub pid: i64,
    pub hostname: String,
    pub cwd: String,
    pub last_seen: i64,
    pub mode: AgentMode,
    pub mode_since: i64,
    pub recv_started: Option<i64>,
    pub recv_deadline: Option<i64>,
    pub recv_wait_seconds: Option<i64>,
    pub recv_last_touch: Option<i64>,
}

impl AgentRow {
    pub fn is_online(&self, now: i64, heartbeat_ttl_secs: i64) -> bool {
        now - self.last_seen <= heartbeat_ttl_secs
    }
}

/// The state of a queued message (spec §3 "Message").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageState {
    Queued,
    Inflight,
}

impl MessageState {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageState::Queued => "queued",
            MessageState::Inflight => "inflight",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "inflight" => MessageState::Inflight,
            _ => MessageState::Queued,
        }
    }
}

/// One row of the `messages` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRow {
    pub msg_id: String,
    pub ts: i64,
    pub ts_str: String,
    pub from_user: String,
    pub to_user: String,
    pub content: String,
    pub state: MessageState,
    pub lease_owner: Option<String>,
    pub lease_until: Option<i64>,
    pub attempt: i64,
    pub delivered_at: Option<i64>,
}

/// The single leader-lease row, keyed `"main"` (spec §3 "Leader
/// lease").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderLease {
    pub owner_id: String,
    pub host: String,
    pub pid: i64,
    pub lease_until: i64,
    pub updated_at: i64,
}

/// Tracks the "all peers waiting" cooldown window for the janitor's
/// deadlock-alert duty (spec §4.E.5). Not explicitly named in spec §3,
/// but required to implement that duty's cooldown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadlockState {
    pub first_detected_at: Option<i64>,
    pub last_warned_at: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_mode_roundtrips() {
        assert_eq!(AgentMode::parse(AgentMode::Waiting.as_str()), AgentMode::Waiting);
        assert_eq!(AgentMode::parse(AgentMode::Working.as_str()), AgentMode::Working);
        assert_eq!(AgentMode::parse("garbage"), AgentMode::Working);
    }

    #[test]
    fn message_state_roundtrips() {
        assert_eq!(
            MessageState::parse(MessageState::Inflight.as_str()),
            MessageState::Inflight
        );
        assert_eq!(MessageState::parse("nonsense"), MessageState::Queued);
    }

    #[test]
    fn online_check_respects_ttl() {
        let row = AgentRow {
            id: "001".into(),
            pid: 1,
            hostname: "h".into(),
            cwd: "/".into(),
            last_seen: 100,
            mode: AgentMode::Working,
            mode_since: 100,
            recv_started: None,
            recv_deadline: None,
            recv_wait_seconds: None,
            recv_last_touch: None,
        };
        assert!(row.is_online(160, 60));
        assert!(!row.is_online(161, 60));
    }
}
