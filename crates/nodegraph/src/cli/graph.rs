//! `nodegraph graph` command implementation.

use colored::Colorize;
use nodegraph::{GraphNode, NodeGraph};

use super::display::{format_timestamp, print_json};

/// Run the graph command.
pub fn run(graph: &NodeGraph, key: &str, json: bool) -> anyhow::Result<()> {
    let (hood, lookup) = graph.dependency_graph_lookup(key)?;
    tracing::debug!(?lookup, "Graph cache lookup");

    if json {
        return print_json(&hood);
    }

    println!(
        "Neighborhood of {} (depth {}, generation {}, computed {})",
        hood.node_key.to_string().cyan().bold(),
        hood.max_depth,
        hood.generation,
        format_timestamp(hood.computed_at)
    );
    if hood.has_circular {
        println!("  {}", "contains a cycle".red().bold());
    }

    println!();
    println!("  {}:", "Dependencies".white().bold());
    print_level(&hood.dependencies);
    println!();
    println!("  {}:", "Dependents".white().bold());
    print_level(&hood.dependents);
    Ok(())
}

fn print_level(nodes: &[GraphNode]) {
    if nodes.is_empty() {
        println!("    {}", "(none)".dimmed());
        return;
    }
    for node in nodes {
        let indent = "  ".repeat(node.depth.saturating_sub(1));
        println!(
            "    {indent}{} {} {}",
            "•".dimmed(),
            node.node_key.to_string().cyan(),
            node.dependency_type.magenta()
        );
    }
}
