//! `nodegraph events` subcommand implementations.

use chrono::Duration;
use colored::Colorize;
use nodegraph::{AckOutcome, EventId, NodeGraph};
use serde_json::json;

use super::display::{format_timestamp, print_events, print_json};

/// Show unprocessed events.
pub fn pending(graph: &NodeGraph, limit: i64, json: bool) -> anyhow::Result<()> {
    let events = graph.pending_events(limit)?;
    if json {
        return print_json(&events);
    }
    print_events(&events, "No pending events.");
    Ok(())
}

/// Show one node's events.
pub fn node(graph: &NodeGraph, key: &str, limit: i64, json: bool) -> anyhow::Result<()> {
    let events = graph.node_events(key, limit)?;
    if json {
        return print_json(&events);
    }
    print_events(&events, "No events for this node.");
    Ok(())
}

/// Acknowledge events. Stops at the first id that does not exist.
pub fn ack(graph: &NodeGraph, ids: &[i64], json: bool) -> anyhow::Result<()> {
    let mut results = Vec::with_capacity(ids.len());
    for &id in ids {
        let outcome = graph.process_event(EventId(id))?;
        if !json {
            let label = match outcome {
                AckOutcome::Acknowledged => "acknowledged".green(),
                AckOutcome::AlreadyProcessed => "already processed".dimmed(),
            };
            println!("{} {label}", format!("#{id}").bold());
        }
        results.push(json!({"id": id, "outcome": outcome}));
    }
    if json {
        print_json(&results)?;
    }
    Ok(())
}

/// Show event log statistics.
pub fn stats(graph: &NodeGraph, json: bool) -> anyhow::Result<()> {
    let stats = graph.event_stats()?;
    if json {
        return print_json(&stats);
    }

    println!("{}", "Event log".white().bold());
    println!("  Total:     {}", stats.total);
    println!("  Pending:   {}", stats.pending.to_string().yellow());
    println!("  Processed: {}", stats.processed.to_string().green());
    if let Some(oldest) = stats.oldest_pending {
        println!("  Oldest pending: {}", format_timestamp(oldest));
    }
    if !stats.by_type.is_empty() {
        println!();
        for (event_type, count) in &stats.by_type {
            println!("  {:<20} {count}", event_type.as_str());
        }
    }
    Ok(())
}

/// Delete processed events older than `hours`.
pub fn cleanup(graph: &NodeGraph, hours: i64, json: bool) -> anyhow::Result<()> {
    let retention = Duration::try_hours(hours)
        .ok_or_else(|| anyhow::anyhow!("retention of {hours} hours is out of range"))?;
    let deleted = graph.cleanup_events(retention)?;
    if json {
        return print_json(&json!({"deleted": deleted}));
    }
    println!("Deleted {} processed event(s).", deleted.to_string().bold());
    Ok(())
}
