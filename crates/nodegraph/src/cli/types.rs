//! `nodegraph types` command implementation.

use colored::Colorize;
use nodegraph::TypeRegistry;

use super::display::print_json;

/// Run the types command.
pub fn run(json: bool) -> anyhow::Result<()> {
    let registry = TypeRegistry::builtin();

    if json {
        let types: Vec<_> = registry.iter().collect();
        return print_json(&types);
    }

    let header = format!(
        "{:<10} {:<11} {:>8} {:>8}  {}",
        "TYPE", "CATEGORY", "STRENGTH", "PRIORITY", "CASCADES"
    );
    println!("{}", header.bold());
    for t in registry.iter() {
        let cascades = match (t.cascade_delete, t.cascade_update) {
            (true, true) => "delete, update",
            (true, false) => "delete",
            (false, true) => "update",
            (false, false) => "-",
        };
        println!(
            "{} {:<11} {:>8} {:>8}  {}",
            format!("{:<10}", t.name).magenta(),
            t.category.to_string(),
            t.default_strength,
            t.default_priority,
            cascades
        );
        println!("           {}", t.description.dimmed());
    }
    Ok(())
}
