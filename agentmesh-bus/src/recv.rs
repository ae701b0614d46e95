//! Receive Loop (spec ยง4.F): blocking long-poll with three
//! cancellation channels, all of which release any held lease before
//! returning.

use tokio_util::sync::CancellationToken;

use crate::config::BusConfig;
use crate::context::{now_secs, Context};
use crate::error::BusResult;
use crate::janitor::Janitor;
use crate::message;

/// Outcome of a `recv` call once the loop exits, before it's turned
/// into the exact wire string by `bridge::recv`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecvOutcome {
    Messages(String),
    NoNewMessages,
    Timeout { wait_seconds: i64 },
    Cancelled,
}

/// Implements the full 8-step protocol. `cancel` models "transport
/// cancellation" (spec ยง4.F step 7); callers that have no transport to
/// watch may pass `CancellationToken::new()` and never trigger it.
pub async fn recv_loop(
    ctx: &Context,
    janitor: &Janitor,
    wait_seconds: i64,
    cancel: &CancellationToken,
) -> BusResult<RecvOutcome> {
    let my_id = ctx.id();
    let my_task_ts = ctx.last_active_snapshot();

    // Step 1: one immediate lease attempt.
    if let Some(outcome) = try_lease_and_format(ctx, &my_id)? {
        return Ok(outcome);
    }

    // Step 2.
    if wait_seconds <= 0 {
        return Ok(RecvOutcome::NoNewMessages);
    }

    // Step 3: mark waiting.
    let start = now_secs();
    let deadline = start + wait_seconds;
    ctx.pool.set_waiting(&my_id, start, wait_seconds)?;

    let result = poll_loop(ctx, janitor, &my_id, my_task_ts, deadline, wait_seconds, cancel).await;

    // `poll_loop` never clears the waiting flag itself; only this
    // caller does, on every exit path, so it always runs regardless of
    // which branch inside `poll_loop` produced `result`.
    ctx.pool.clear_waiting(&my_id, now_secs())?;

    result
}

async fn poll_loop(
    ctx: &Context,
    janitor: &Janitor,
    my_id: &str,
    my_task_ts: i64,
    deadline: i64,
    wait_seconds: i64,
    cancel: &CancellationToken,
) -> BusResult<RecvOutcome> {
    let id_jitter = id_jitter_ms(my_id);

    loop {
        // Step 6: cancellation by activity.
        if ctx.last_active_snapshot() != my_task_ts {
            return Ok(RecvOutcome::Cancelled);
        }

        // Step 8: deadline.
        if now_secs() >= deadline {
            return Ok(RecvOutcome::Timeout { wait_seconds });
        }

        // Step 5: touch + lease attempt.
        ctx.pool.touch_recv(my_id, now_secs())?;
        if let Some(outcome) = try_lease_and_format(ctx, my_id)? {
            return Ok(outcome);
        }

        // Step 4: cadence.
        let base = if janitor.is_leader() {
            ctx.config.leader_poll_interval
        } else {
            ctx.config.follower_poll_interval
        };
        let tick = base + std::time::Duration::from_millis(id_jitter);

        tokio::select! {
            _ = tokio::time::sleep(tick) => {}
            _ = cancel.cancelled() => {
                // Step 7: transport cancellation. Nothing is leased at
                // this point (the previous lease attempt already acked
                // or returned nothing), so there's nothing to release
                // beyond the `clear_waiting` the caller performs.
                return Ok(RecvOutcome::Cancelled);
            }
        }
    }
}

fn try_lease_and_format(ctx: &Context, my_id: &str) -> BusResult<Option<RecvOutcome>> {
    let batch = message::lease(&ctx.pool, &ctx.config, my_id)?;
    if batch.messages.is_empty() {
        return Ok(None);
    }

    let ids: Vec<String> = batch.messages.iter().map(|m| m.msg_id.clone()).collect();
    let formatted = message::format_batch(&batch);
    message::ack(&ctx.pool, my_id, &ids)?;

    Ok(Some(RecvOutcome::Messages(formatted)))
}

fn id_jitter_ms(id: &str) -> u64 {
    let n: u64 = id.parse().unwrap_or(0);
    (n % 10) * 30
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;

    #[tokio::test]
    async fn empty_inbox_with_zero_wait_returns_immediately() {
        let ctx = Context::new_in_memory(BusConfig::default()).unwrap();
        let janitor = Janitor::new();
        let outcome = recv_loop(&ctx, &janitor, 0, &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, RecvOutcome::NoNewMessages);
    }

    #[test]
    fn jitter_is_bounded_and_deterministic() {
        assert_eq!(id_jitter_ms("007"), 7 * 30);
        assert_eq!(id_jitter_ms("010"), 0);
    }
}
