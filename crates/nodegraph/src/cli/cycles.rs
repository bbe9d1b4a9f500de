//! `nodegraph cycles` command implementation.

use colored::Colorize;
use nodegraph::NodeGraph;

use super::display::print_json;

/// Run the cycles command.
pub fn run(graph: &NodeGraph, domain: Option<&str>, json: bool) -> anyhow::Result<()> {
    let cycles = graph.detect_cycles(domain)?;

    if json {
        return print_json(&cycles);
    }

    if cycles.is_empty() {
        println!("{}", "No circular dependencies detected.".green());
        return Ok(());
    }

    println!(
        "Found {} circular dependencies:",
        cycles.len().to_string().red().bold()
    );
    println!();

    for (i, cycle) in cycles.iter().enumerate() {
        println!("  {} {}:", "Cycle".yellow().bold(), i + 1);

        // Display cycle as: a → b → c → a
        let mut path = cycle
            .nodes
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" → ");
        if let Some(first) = cycle.nodes.first() {
            path.push_str(" → ");
            path.push_str(&first.to_string());
        }
        println!("    {}", path.dimmed());
        println!(
            "    weakest link: edge #{} (strength {})",
            cycle.weakest_edge, cycle.weakest_strength
        );
    }

    Ok(())
}
