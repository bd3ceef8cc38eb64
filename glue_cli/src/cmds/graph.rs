/* Graph command - print the namespace emission order */

use super::load_and_index;
use glue_gen::ResolvedSchema;
use std::path::PathBuf;

/* One "id name (layer)" line per namespace, dependencies first */
pub fn emission_order(resolved: &ResolvedSchema) -> anyhow::Result<Vec<String>> {
    let order = resolved
        .graph()
        .topological_sort()
        .ok_or_else(|| anyhow::anyhow!("dependency graph has a cycle"))?;
    let schema = resolved.schema();
    order
        .into_iter()
        .map(|id| {
            let ns = schema
                .namespace(id)
                .ok_or_else(|| anyhow::anyhow!("graph names unknown namespace {}", id))?;
            Ok(format!("{:>5} {} ({})", ns.id, ns.name, ns.layer.name()))
        })
        .collect()
}

/* Execute the graph command */
pub fn run(files: &[PathBuf]) -> anyhow::Result<()> {
    let resolved = load_and_index(files)?;
    for line in emission_order(&resolved)? {
        println!("{}", line);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glue_types::{prelude, Layer, Type};

    #[test]
    fn test_dependencies_come_first() {
        let schema = prelude::standard()
            .unwrap()
            .namespace(20010, "store", Layer::Infra, |ns| {
                ns.record(0, "account", |r| r.field(0, "name", Type::Str))
            })
            .unwrap()
            .namespace(30001, "host", Layer::Svc, |ns| {
                ns.record(0, "view", |r| r.field(0, "account", Type::named("store/account")))
            })
            .unwrap()
            .build();
        let resolved = glue_gen::index(&schema).unwrap();
        let order = emission_order(&resolved).unwrap();

        assert_eq!(order[0], "   64 core (core)");
        let position = |name: &str| order.iter().position(|line| line.contains(name)).unwrap();
        assert!(position(" store ") < position(" host "));
        assert!(position(" infra ") < position(" store "));
        assert_eq!(order.len(), schema.namespaces.len());
    }
}
