//! Bus-wide tuning constants, builder-pattern configuration.
//!
//! Mirrors the teacher's `SystemConfig`/`SystemConfigBuilder` shape
//! (`airssys-rt/src/system/config.rs`): a `Default` impl holding sane
//! production values, a fluent builder, and a `validate()` that the
//! builder's `build()` calls before returning.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How often an agent's own background loop refreshes `last_seen` (spec ยง4.B).
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// An id is online iff `now - last_seen <= HEARTBEAT_TTL`. 6x the
/// heartbeat interval, comfortably above the 5x floor spec ยง4.B names.
pub const DEFAULT_HEARTBEAT_TTL: Duration = Duration::from_secs(60);

/// How long a leased-but-unacked message batch stays exclusively held
/// by its lessee before another reader (or the leader's recovery
/// sweep) may reclaim it.
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(30);

/// Cadence of leader-lease renewal attempts.
pub const DEFAULT_LEADER_RENEW_EVERY: Duration = Duration::from_secs(15);

/// Leader lease lifetime; a 3x ratio over the renew cadence per spec ยง4.E.
pub const DEFAULT_LEADER_LEASE_TTL: Duration = Duration::from_secs(45);

/// Retention window after which a message may be pruned unconditionally.
pub const DEFAULT_MSG_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// How long every online peer must be continuously `waiting` before
/// the janitor raises a deadlock alert.
pub const DEFAULT_DEADLOCK_TRIGGER_DELAY: Duration = Duration::from_secs(20);

/// Minimum gap between repeated deadlock warnings.
pub const DEFAULT_DEADLOCK_WARNING_COOLDOWN: Duration = Duration::from_secs(60);

/// Byte budget for a single `recv` batch (spec ยง4.D `MAX_BATCH_CHARS`).
pub const DEFAULT_MAX_BATCH_CHARS: usize = 4000;

/// Maximum candidate rows scanned per `select_and_lease_batch` call.
pub const DEFAULT_SCAN_CAP: usize = 200;

/// Cadence of `recv`'s poll loop while this process holds the leader lease.
pub const DEFAULT_LEADER_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Cadence of `recv`'s poll loop for a non-leader process.
pub const DEFAULT_FOLLOWER_POLL_INTERVAL: Duration = Duration::from_secs(6);

/// Working elapsed time past which `get_status` prefixes a state with `โ“`.
pub const DEFAULT_STALE_WORKING_THRESHOLD: Duration = Duration::from_secs(30 * 60);

/// Names that may never be claimed via `rename` (spec ยง9 Open Question b:
/// refused outright, no inheritance policy).
pub const RESERVED_NAMES: &[&str] = &["janitor", "leader"];

/// Bus-wide configuration. Constructed via [`BusConfig::builder`] or
/// used as-is via [`BusConfig::default`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    pub heartbeat_interval: Duration,
    pub heartbeat_ttl: Duration,
    pub lease_ttl: Duration,
    pub leader_renew_every: Duration,
    pub leader_lease_ttl: Duration,
    pub msg_ttl: Duration,
    pub deadlock_trigger_delay: Duration,
    pub deadlock_warning_cooldown: Duration,
    pub max_batch_chars: usize,
    pub scan_cap: usize,
    pub leader_poll_interval: Duration,
    pub follower_poll_interval: Duration,
    pub stale_working_threshold: Duration,
    pub deadlock_alerts_enabled: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            heartbeat_ttl: DEFAULT_HEARTBEAT_TTL,
            lease_ttl: DEFAULT_LEASE_TTL,
            leader_renew_every: DEFAULT_LEADER_RENEW_EVERY,
            leader_lease_ttl: DEFAULT_LEADER_LEASE_TTL,
            msg_ttl: DEFAULT_MSG_TTL,
            deadlock_trigger_delay: DEFAULT_DEADLOCK_TRIGGER_DELAY,
            deadlock_warning_cooldown: DEFAULT_DEADLOCK_WARNING_COOLDOWN,
            max_batch_chars: DEFAULT_MAX_BATCH_CHARS,
            scan_cap: DEFAULT_SCAN_CAP,
            leader_poll_interval: DEFAULT_LEADER_POLL_INTERVAL,
            follower_poll_interval: DEFAULT_FOLLOWER_POLL_INTERVAL,
            stale_working_threshold: DEFAULT_STALE_WORKING_THRESHOLD,
            deadlock_alerts_enabled: true,
        }
    }
}

impl BusConfig {
    pub fn builder() -> BusConfigBuilder {
        BusConfigBuilder::default()
    }

    /// Returns an error string if the ratios spec ยง5/ยง9 require are violated.
    pub fn validate(&self) -> Result<(), String> {
        if self.heartbeat_ttl < self.heartbeat_interval * 5 {
            return Err("heartbeat_ttl must be >= 5x heartbeat_interval".to_string());
        }
        if self.leader_lease_ttl < self.leader_renew_every * 2 {
            return Err("leader_lease_ttl must be >= 2x leader_renew_every".to_string());
        }
        if self.max_batch_chars == 0 {
            return Err("max_batch_chars must be > 0".to_string());
        }
        if self.scan_cap == 0 {
            return Err("scan_cap must be > 0".to_string());
        }
        Ok(())
    }

    pub fn is_reserved(name: &str) -> bool {
        RESERVED_NAMES.iter().any(|r| r.eq_ignore_ascii_case(name))
    }
}

/// Fluent builder for [`BusConfig`], following the teacher's
/// `SystemConfigBuilder` pattern exactly.
#[derive(Debug, Default)]
pub struct BusConfigBuilder {
    config: BusConfig,
}

impl BusConfigBuilder {
    pub fn with_heartbeat_interval(mut self, d: Duration) -> Self {
        self.config.heartbeat_interval = d;
        self
    }

    pub fn with_heartbeat_ttl(mut self, d: Duration) -> Self {
        self.config.heartbeat_ttl = d;
        self
    }

    pub fn with_lease_ttl(mut self, d: Duration) -> Self {
        self.config.lease_ttl = d;
        self
    }

    pub fn with_leader_renew_every(mut self, d: Duration) -> Self {
        self.config.leader_renew_every = d;
        self
    }

    pub fn with_leader_lease_ttl(mut self, d: Duration) -> Self {
        self.config.leader_lease_ttl = d;
        self
    }

    pub fn with_msg_ttl(mut self, d: Duration) -> Self {
        self.config.msg_ttl = d;
        self
    }

    pub fn with_deadlock_trigger_delay(mut self, d: Duration) -> Self {
        self.config.deadlock_trigger_delay = d;
        self
    }

    pub fn with_deadlock_warning_cooldown(mut self, d: Duration) -> Self {
        self.config.deadlock_warning_cooldown = d;
        self
    }

    pub fn with_max_batch_chars(mut self, n: usize) -> Self {
        self.config.max_batch_chars = n;
        self
    }

    pub fn with_scan_cap(mut self, n: usize) -> Self {
        self.config.scan_cap = n;
        self
    }

    pub fn with_leader_poll_interval(mut self, d: Duration) -> Self {
        self.config.leader_poll_interval = d;
        self
    }

    pub fn with_follower_poll_interval(mut self, d: Duration) -> Self {
        self.config.follower_poll_interval = d;
        self
    }

    pub fn with_deadlock_alerts_enabled(mut self, enabled: bool) -> Self {
        self.config.deadlock_alerts_enabled = enabled;
        self
    }

    pub fn build(self) -> Result<BusConfig, String> {
        self.config.validate()?;
        Ok(self.config)
    }
}
