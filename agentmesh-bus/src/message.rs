//! Message Layer (spec ยง4.D): enqueue, lease, acknowledge, release,
//! format. Broadcast fans out at enqueue time against a snapshot of
//! currently online peers, matching the shared-store variant chosen in
//! DESIGN.md.

use std::collections::HashMap;

use agentmesh_store::{AgentRow, MessageRow, NewMessage, PoolStore};

use crate::config::BusConfig;
use crate::context::now_secs;
use crate::error::{BusError, BusResult};
use crate::presence;

/// Outcome of [`send`], mapped to the spec ยง6 wire strings by
/// `bridge::send`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent { recipient_count: usize, short_id: String },
    NoOtherAgentsOnline,
}

/// Resolves `to` into a concrete recipient set, validates it, and
/// enqueues one row per recipient (spec ยง4.D "Enqueue").
///
/// `to` is either the literal `"all"`, a single id, or a
/// comma-separated list of ids. Rejects if `from` appears among the
/// recipients, or (for the non-broadcast path) if any listed recipient
/// isn't currently online.
pub fn send(pool: &PoolStore, cfg: &BusConfig, from: &str, to: &str, content: &str) -> BusResult<SendOutcome> {
    let online = presence::list_online(pool, cfg)?;
    let recipients = resolve_recipients(from, to, &online)?;

    if recipients.is_empty() {
        return Ok(SendOutcome::NoOtherAgentsOnline);
    }

    let now = now_secs();
    let ts_str = chrono::Utc::now().format("%H:%M:%S").to_string();

    let mut first_short = None;
    let rows: Vec<NewMessage> = recipients
        .iter()
        .map(|to_id| {
            let msg_id = agentmesh_core::new_msg_id();
            if first_short.is_none() {
                first_short = Some(agentmesh_core::short_id(&msg_id).to_string());
            }
            NewMessage {
                msg_id,
                ts: now,
                ts_str: ts_str.clone(),
                from_user: from.to_string(),
                to_user: to_id.clone(),
                content: content.to_string(),
            }
        })
        .collect();

    pool.enqueue_messages(&rows)?;

    Ok(SendOutcome::Sent {
        recipient_count: recipients.len(),
        // `rows` is always non-empty here, so `first_short` is always set.
        short_id: first_short.unwrap_or_default(),
    })
}

fn resolve_recipients(from: &str, to: &str, online: &[AgentRow]) -> BusResult<Vec<String>> {
    let listed: Vec<&str> = to.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();

    if listed.iter().any(|r| r.eq_ignore_ascii_case("all")) {
        return Ok(online.iter().map(|a| a.id.clone()).filter(|id| id != from).collect());
    }

    if listed.iter().any(|r| *r == from) {
        return Err(BusError::SendToSelf);
    }

    for r in &listed {
        if !online.iter().any(|a| &a.id == r) {
            return Err(BusError::RecipientOffline((*r).to_string()));
        }
    }

    Ok(listed.into_iter().map(str::to_string).collect())
}

/// Result of [`lease`]: the messages leased to the caller plus how
/// many queued messages were left behind by the char budget.
#[derive(Debug, Clone, Default)]
pub struct LeasedBatch {
    pub messages: Vec<MessageRow>,
    pub more_available: bool,
    pub remaining: usize,
}

/// Recovers any of `to_id`'s expired leases back to `queued`, then
/// selects and leases the oldest queued rows up to the configured
/// char budget (spec ยง4.D "Receive window" steps 1-3).
pub fn lease(pool: &PoolStore, cfg: &BusConfig, to_id: &str) -> BusResult<LeasedBatch> {
    let now = now_secs();
    pool.recover_expired_leases(now)?;

    let batch = pool.select_and_lease_batch(
        to_id,
        now,
        cfg.lease_ttl.as_secs() as i64,
        cfg.max_batch_chars,
        cfg.scan_cap,
    )?;

    Ok(LeasedBatch {
        messages: batch.messages,
        more_available: batch.more_available,
        remaining: batch.remaining,
    })
}

pub fn ack(pool: &PoolStore, owner_id: &str, msg_ids: &[String]) -> BusResult<()> {
    pool.ack_messages(owner_id, msg_ids)?;
    Ok(())
}

pub fn release(pool: &PoolStore, owner_id: &str, msg_ids: &[String]) -> BusResult<()> {
    pool.release_messages(owner_id, msg_ids)?;
    Ok(())
}

/// Formats a leased batch per spec ยง4.D: grouped by sender, senders
/// ordered by their earliest `ts` in the batch, with a truncation
/// footer when `more_available` is set.
pub fn format_batch(batch: &LeasedBatch) -> String {
    if batch.messages.is_empty() {
        return "No new messages.".to_string();
    }

    let mut grouped: HashMap<&str, Vec<&MessageRow>> = HashMap::new();
    for m in &batch.messages {
        grouped.entry(m.from_user.as_str()).or_default().push(m);
    }

    let mut senders: Vec<&str> = grouped.keys().copied().collect();
    senders.sort_by_key(|s| grouped[s].iter().map(|m| m.ts).min().unwrap_or(i64::MAX));

    let mut out = format!("=== {} messages from {} agent(s) ===\n\n", batch.messages.len(), grouped.len());
    for sender in senders {
        let msgs = &grouped[sender];
        out.push_str(&format!("[{sender}] - {} message(s)\n", msgs.len()));
        for m in msgs {
            out.push_str(&format!("  {} {}\n", m.ts_str, m.content));
        }
        out.push('\n');
    }

    if batch.more_available {
        out.push_str(&format!("({} more queued. Call recv() again)\n", batch.remaining));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentmesh_store::PoolStore;

    fn store_with_online(ids: &[&str]) -> PoolStore {
        let s = PoolStore::open_in_memory().unwrap();
        for id in ids {
            s.try_claim_agent(id, 1, "h", "/tmp", 0).unwrap();
        }
        s
    }

    #[test]
    fn send_to_self_is_rejected() {
        let s = store_with_online(&["001"]);
        let err = send(&s, &BusConfig::default(), "001", "001", "hi").unwrap_err();
        assert!(matches!(err, BusError::SendToSelf));
    }

    #[test]
    fn send_to_offline_is_rejected() {
        let s = store_with_online(&["001"]);
        let err = send(&s, &BusConfig::default(), "001", "999", "hi").unwrap_err();
        assert!(matches!(err, BusError::RecipientOffline(id) if id == "999"));
    }

    #[test]
    fn broadcast_excludes_sender() {
        let s = store_with_online(&["001", "002", "003"]);
        let outcome = send(&s, &BusConfig::default(), "001", "all", "ping").unwrap();
        assert_eq!(
            outcome.clone_with_any_id(),
            SendOutcome::Sent { recipient_count: 2, short_id: String::new() }
        );
    }

    #[test]
    fn broadcast_with_no_peers_reports_none_online() {
        let s = store_with_online(&["001"]);
        let outcome = send(&s, &BusConfig::default(), "001", "all", "ping").unwrap();
        assert_eq!(outcome, SendOutcome::NoOtherAgentsOnline);
    }

    #[test]
    fn lease_then_format_then_ack() {
        let s = store_with_online(&["001", "002"]);
        send(&s, &BusConfig::default(), "001", "002", "hi there").unwrap();

        let batch = lease(&s, &BusConfig::default(), "002").unwrap();
        assert_eq!(batch.messages.len(), 1);
        let text = format_batch(&batch);
        assert!(text.contains("[001]"));
        assert!(text.contains("hi there"));

        let ids: Vec<String> = batch.messages.iter().map(|m| m.msg_id.clone()).collect();
        ack(&s, "002", &ids).unwrap();

        let empty = lease(&s, &BusConfig::default(), "002").unwrap();
        assert!(empty.messages.is_empty());
    }

    #[test]
    fn release_returns_leased_messages_to_queued() {
        let s = store_with_online(&["001", "002"]);
        send(&s, &BusConfig::default(), "001", "002", "hi there").unwrap();

        let batch = lease(&s, &BusConfig::default(), "002").unwrap();
        assert_eq!(batch.messages.len(), 1);
        let ids: Vec<String> = batch.messages.iter().map(|m| m.msg_id.clone()).collect();

        // A reader that fails after leasing but before formatting/acking
        // releases the batch back to `queued` rather than losing it.
        release(&s, "002", &ids).unwrap();

        let relet = lease(&s, &BusConfig::default(), "002").unwrap();
        assert_eq!(relet.messages.len(), 1);
        assert_eq!(relet.messages[0].msg_id, ids[0]);
    }

    #[test]
    fn truncation_footer_reports_an_actual_count() {
        let s = store_with_online(&["001", "002"]);
        let mut cfg = BusConfig::default();
        cfg.max_batch_chars = 10;
        s.enqueue_messages(&[
            agentmesh_store::NewMessage {
                msg_id: "a".into(),
                ts: 100,
                ts_str: "t1".into(),
                from_user: "001".into(),
                to_user: "002".into(),
                content: "first message".into(),
            },
            agentmesh_store::NewMessage {
                msg_id: "b".into(),
                ts: 101,
                ts_str: "t2".into(),
                from_user: "001".into(),
                to_user: "002".into(),
                content: "second message".into(),
            },
        ])
        .unwrap();

        let batch = lease(&s, &cfg, "002").unwrap();
        assert_eq!(batch.messages.len(), 1);
        assert_eq!(batch.remaining, 1);

        let text = format_batch(&batch);
        assert!(text.contains("(1 more queued. Call recv() again)"));
        assert!(!text.contains("more more"));
    }

    #[test]
    fn senders_ordered_by_earliest_ts() {
        let s = store_with_online(&["001", "002", "003"]);
        s.enqueue_messages(&[
            agentmesh_store::NewMessage {
                msg_id: "a".into(),
                ts: 200,
                ts_str: "t2".into(),
                from_user: "002".into(),
                to_user: "001".into(),
                content: "from 002".into(),
            },
            agentmesh_store::NewMessage {
                msg_id: "b".into(),
                ts: 100,
                ts_str: "t1".into(),
                from_user: "003".into(),
                to_user: "001".into(),
                content: "from 003".into(),
            },
        ])
        .unwrap();

        let batch = lease(&s, &BusConfig::default(), "001").unwrap();
        let text = format_batch(&batch);
        let pos_003 = text.find("[003]").unwrap();
        let pos_002 = text.find("[002]").unwrap();
        assert!(pos_003 < pos_002);
    }
}

#[cfg(test)]
impl SendOutcome {
    /// Test helper: compares only the variant and recipient count,
    /// ignoring the randomly generated short id.
    fn clone_with_any_id(&self) -> Self {
        match self {
            SendOutcome::Sent { recipient_count, .. } => SendOutcome::Sent {
                recipient_count: *recipient_count,
                short_id: String::new(),
            },
            SendOutcome::NoOtherAgentsOnline => SendOutcome::NoOtherAgentsOnline,
        }
    }
}
