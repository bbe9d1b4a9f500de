//! `nodegraph deps`, `dependents` and `history` command implementations.

use colored::Colorize;
use nodegraph::{EdgeId, NodeGraph};

use super::display::{format_timestamp, print_edges, print_json};

/// Show what `key` depends on.
pub fn dependencies(graph: &NodeGraph, key: &str, json: bool) -> anyhow::Result<()> {
    let edges = graph.list_dependencies(key)?;
    if json {
        return print_json(&edges);
    }

    println!("{} depends on:", key.cyan().bold());
    print_edges(&edges, true, "(nothing)");
    Ok(())
}

/// Show what depends on `key`.
pub fn dependents(graph: &NodeGraph, key: &str, json: bool) -> anyhow::Result<()> {
    let edges = graph.list_dependents(key)?;
    if json {
        return print_json(&edges);
    }

    println!("Depending on {}:", key.cyan().bold());
    print_edges(&edges, false, "(nothing)");
    Ok(())
}

/// Show the audit trail of an edge.
pub fn history(graph: &NodeGraph, edge: i64, json: bool) -> anyhow::Result<()> {
    let id = EdgeId(edge);
    let history = graph.dependency_history(id)?;
    if json {
        return print_json(&history);
    }

    let current = graph.dependency(id)?;
    println!(
        "Dependency {} {} -> {} ({})",
        format!("#{id}").bold(),
        current.dependent_key.to_string().cyan(),
        current.dependency_key.to_string().cyan(),
        if current.is_active {
            "active".green()
        } else {
            "inactive".dimmed()
        }
    );
    for entry in &history {
        println!(
            "  {} {}",
            format_timestamp(entry.recorded_at).dimmed(),
            entry.action.as_str().bold()
        );
    }
    Ok(())
}
