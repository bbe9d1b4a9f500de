//! `nodegraph impact` command implementation.

use anyhow::bail;
use colored::Colorize;
use nodegraph::{ImpactAnalysis, ImpactType, NodeGraph};

use super::display::{colorize_level, print_json};

/// Run the impact command.
///
/// With a `threshold`, a score above it is reported as an error so scripts
/// can stop before the destructive change.
pub fn run(
    graph: &NodeGraph,
    key: &str,
    impact_type: ImpactType,
    threshold: Option<u8>,
    json: bool,
) -> anyhow::Result<()> {
    let analysis = graph.analyze_impact(key, impact_type)?;

    if json {
        print_json(&analysis)?;
    } else {
        print_analysis(&analysis);
    }

    if let Some(threshold) = threshold {
        if analysis.exceeds(threshold) {
            bail!(
                "impact score {} exceeds threshold {threshold}",
                analysis.score
            );
        }
    }
    Ok(())
}

fn print_analysis(analysis: &ImpactAnalysis) {
    println!(
        "Impact of {} on {}:",
        analysis.impact_type.as_str().bold(),
        analysis.source_key.to_string().cyan().bold()
    );
    println!();

    let score = analysis.score.to_string();
    let score = match analysis.score {
        0..=29 => score.green(),
        30..=69 => score.yellow(),
        _ => score.red().bold(),
    };
    println!(
        "  Score {score}/100, {} affected, cascade depth {}",
        analysis.affected_nodes.len(),
        analysis.cascade_depth
    );

    if !analysis.affected_nodes.is_empty() {
        println!();
        println!("  {}:", "Affected nodes".white().bold());
        for node in &analysis.affected_nodes {
            println!(
                "    {} {} {} (depth {}, {} {})",
                "•".dimmed(),
                node.node_key.to_string().cyan(),
                colorize_level(node.impact_level),
                node.depth,
                node.dependency_type.magenta(),
                node.strength
            );
            println!("      {}", node.action_needed.dimmed());
        }
    }

    for warning in &analysis.warnings {
        println!("  {}: {warning}", "warning".yellow().bold());
    }
    for recommendation in &analysis.recommendations {
        println!("  {} {recommendation}", "→".dimmed());
    }
}
