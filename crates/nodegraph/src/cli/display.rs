//! Common display utilities for CLI commands.

use chrono::{DateTime, Utc};
use colored::{ColoredString, Colorize};
use nodegraph::{DependencyEdge, ImpactLevel, NodeEvent};
use serde::Serialize;

const MAX_DISPLAY_ITEMS: usize = 25;

/// Print `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Timestamp in a compact, sortable form.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Color an impact level by severity.
pub fn colorize_level(level: ImpactLevel) -> ColoredString {
    let text = level.to_string();
    match level {
        ImpactLevel::Critical => text.red().bold(),
        ImpactLevel::High => text.red(),
        ImpactLevel::Medium => text.yellow(),
        ImpactLevel::Low => text.green(),
    }
}

/// Print one line per edge, showing the node on the far side.
///
/// `show_dependency` selects which endpoint is the far side.
pub fn print_edges(edges: &[DependencyEdge], show_dependency: bool, empty_message: &str) {
    if edges.is_empty() {
        println!("  {}", empty_message.dimmed());
        return;
    }

    for edge in edges.iter().take(MAX_DISPLAY_ITEMS) {
        let far = if show_dependency {
            &edge.dependency_key
        } else {
            &edge.dependent_key
        };
        let mut flags = Vec::new();
        if edge.cascade_delete {
            flags.push("cascade-delete");
        }
        if edge.cascade_update {
            flags.push("cascade-update");
        }
        println!(
            "  {} {} {} strength {} {}",
            format!("#{}", edge.id).dimmed(),
            far.to_string().cyan(),
            edge.dependency_type.magenta(),
            edge.strength,
            flags.join(", ").dimmed()
        );
    }

    if edges.len() > MAX_DISPLAY_ITEMS {
        println!(
            "  {} ... and {} more",
            "•".dimmed(),
            edges.len() - MAX_DISPLAY_ITEMS
        );
    }
}

/// Print one line per event.
pub fn print_events(events: &[NodeEvent], empty_message: &str) {
    if events.is_empty() {
        println!("{}", empty_message.dimmed());
        return;
    }

    for event in events {
        let status = if event.is_processed() {
            "processed".green()
        } else {
            "pending".yellow()
        };
        println!(
            "{} {} {} {} {}",
            format!("#{}", event.id).dimmed(),
            format_timestamp(event.occurred_at),
            event.node_key.to_string().cyan(),
            event.event_type.as_str().bold(),
            status
        );
    }
}
