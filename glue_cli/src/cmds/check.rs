/* Check command - load, resolve and validate without generating */

use super::load_and_index;
use anyhow::Context;
use glue_gen::ResolvedSchema;
use glue_types::Layer;
use std::fmt::Write;
use std::path::PathBuf;

/* Namespaces per layer followed by every dependency edge */
pub fn summary(resolved: &ResolvedSchema) -> String {
    let schema = resolved.schema();
    let mut out = String::new();

    for layer in Layer::ALL {
        let names: Vec<&str> = schema.in_layer(layer).map(|ns| ns.name.as_str()).collect();
        if !names.is_empty() {
            let _ = writeln!(out, "{:<7} {}", layer.name(), names.join(", "));
        }
    }

    let name = |id: u16| schema.namespace(id).map_or("?", |ns| ns.name.as_str());
    let edges = &resolved.graph().edges;
    let _ = writeln!(out, "\n{} dependency edges:", edges.len());
    for edge in edges {
        let _ = writeln!(
            out,
            "  {} -> {} ({:?}: {})",
            name(edge.from),
            name(edge.to),
            edge.kind,
            edge.context
        );
    }
    out
}

/* Execute the check command */
pub fn run(files: &[PathBuf], print_schema: bool) -> anyhow::Result<()> {
    let resolved = load_and_index(files)?;
    if print_schema {
        let json = serde_json::to_string_pretty(resolved.schema()).context("cannot serialize schema")?;
        println!("{}", json);
    } else {
        print!("{}", summary(&resolved));
        println!("\n[✓] Schema is valid");
    }
    Ok(())
}
