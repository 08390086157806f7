//! CLI commands

use anyhow::Context;
use stash_core::UserId;
use std::collections::BTreeSet;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::context::AppContext;
use crate::submission::InboundEvent;

/// Read inbound events, one JSON object per line
pub fn read_events(path: &Path) -> Result<Vec<InboundEvent>, anyhow::Error> {
    let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut events = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event: InboundEvent =
            serde_json::from_str(&line).with_context(|| format!("{}:{}", path.display(), index + 1))?;
        events.push(event);
    }
    Ok(events)
}

/// Counts printed after a replay
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
    pub accepted: usize,
    pub denied: usize,
    pub failed: usize,
}

/// Submit every event in order, printing one outcome per line
pub async fn submit(ctx: &AppContext, events: Vec<InboundEvent>) -> Result<ReplaySummary, anyhow::Error> {
    let mut summary = ReplaySummary::default();
    for (index, event) in events.into_iter().enumerate() {
        let actor = event.actor_id.clone();
        match ctx.submit(event).await {
            Ok(outcome) => {
                if outcome.accepted {
                    summary.accepted += 1;
                } else {
                    summary.denied += 1;
                }
                println!("#{} {} {}", index + 1, actor, serde_json::to_string(&outcome)?);
            }
            Err(e) => {
                summary.failed += 1;
                println!("#{} {} failed: {}", index + 1, actor, e);
            }
        }
    }
    println!(
        "{} accepted, {} denied, {} failed",
        summary.accepted, summary.denied, summary.failed
    );
    Ok(summary)
}

/// Print the envelope snapshot of `user`
pub async fn snapshot(ctx: &AppContext, user: &str) -> Result<(), anyhow::Error> {
    let snapshot = ctx.ledger.envelope_snapshot(&UserId::new(user)).await?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

/// Run the conservation audit over every user seen in `events`
pub async fn audit(ctx: &AppContext, events: &[InboundEvent]) -> Result<bool, anyhow::Error> {
    let users: BTreeSet<UserId> = events
        .iter()
        .flat_map(|e| std::iter::once(e.actor_id.clone()).chain(e.counterparty.clone()))
        .collect();
    let users: Vec<UserId> = users.into_iter().collect();

    let reports = ctx.audit(&users).await?;
    for report in &reports {
        let mark = if report.consistent { "ok" } else { "MISMATCH" };
        println!(
            "audit {}: balances {} / transactions {} {}",
            report.user_id, report.balance_total, report.transaction_total, mark
        );
    }
    Ok(reports.iter().all(|r| r.consistent))
}

/// Print the effective configuration
pub fn show_config(ctx: &AppContext) -> Result<(), anyhow::Error> {
    println!("{}", serde_json::to_string_pretty(ctx.config())?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stash_core::{Direction, EventKind};
    use std::io::Write;

    #[test]
    fn test_read_events_skips_blank_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"actor_id":"alice","type":"income","amount":2500,"direction":"incoming","origin_ip":"203.0.113.7"}}"#
        )
        .unwrap();
        writeln!(file).unwrap();
        writeln!(
            file,
            r#"{{"actor_id":"alice","type":"peer_transfer","amount":100,"direction":"outgoing","origin_ip":"203.0.113.7","counterparty":"bob","idempotency_key":"k-1"}}"#
        )
        .unwrap();

        let events = read_events(file.path()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].actor_id, UserId::new("ALICE"));
        assert_eq!(events[1].kind, EventKind::PeerTransfer);
        assert_eq!(events[1].direction, Direction::Outgoing);
        assert_eq!(events[1].counterparty, Some(UserId::new("bob")));
    }

    #[test]
    fn test_read_events_reports_the_bad_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"actor_id":"alice","type":"income","amount":1,"direction":"incoming","origin_ip":"203.0.113.7"}}"#
        )
        .unwrap();
        writeln!(file, r#"{{"actor_id":"alice","type":"income","amount":-5}}"#).unwrap();

        let err = read_events(file.path()).unwrap_err();
        assert!(format!("{err}").ends_with(":2"));
    }
}
