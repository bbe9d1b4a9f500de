//! `nodegraph nodes` command implementation.

use colored::Colorize;
use nodegraph::NodeGraph;

use super::display::{format_timestamp, print_json};

/// Run the nodes command.
pub fn run(graph: &NodeGraph, domain: Option<&str>, json: bool) -> anyhow::Result<()> {
    let nodes = graph.nodes(domain)?;

    if json {
        return print_json(&nodes);
    }

    if nodes.is_empty() {
        println!("{}", "No nodes registered.".dimmed());
        return Ok(());
    }

    for node in &nodes {
        println!(
            "{} {} {}",
            node.key.to_string().cyan(),
            node.title,
            format!("updated {}", format_timestamp(node.updated_at)).dimmed()
        );
    }
    println!();
    println!("{} node(s)", nodes.len().to_string().bold());
    Ok(())
}
