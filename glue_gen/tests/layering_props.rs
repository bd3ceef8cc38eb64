/* Property checks of the layering rule over randomly wired namespaces. */

use glue_gen::{index, BuildError};
use glue_types::{Layer, Schema, SchemaBuilder, Type};
use proptest::prelude::*;

const MAX_NAMESPACES: usize = 6;

fn namespace_name(i: usize) -> String {
    format!("n{}", i)
}

/* Every namespace declares one record `t` with a nullable field per
   outgoing reference, so records never contain each other directly */
fn wired_schema(layers: &[Layer], edges: &[(usize, usize)]) -> Schema {
    let mut builder = SchemaBuilder::new();
    for (i, layer) in layers.iter().enumerate() {
        let targets: Vec<usize> = edges.iter().filter(|(from, _)| *from == i).map(|(_, to)| *to).collect();
        builder = builder
            .namespace(100 + i as u32, &namespace_name(i), *layer, |ns| {
                ns.record(0, "t", |mut r| {
                    r = r.field(0, "own", Type::Int32)?;
                    for (n, to) in targets.iter().enumerate() {
                        let target = Type::named(&format!("{}/t", namespace_name(*to)));
                        r = r.field(1 + n as u32, &format!("ref{}", n), Type::nullable(target)?)?;
                    }
                    Ok(r)
                })
            })
            .unwrap();
    }
    builder.build()
}

fn wiring() -> impl Strategy<Value = (Vec<Layer>, Vec<(usize, usize)>)> {
    prop::collection::vec(prop::sample::select(Layer::ALL.to_vec()), 2..=MAX_NAMESPACES).prop_flat_map(|layers| {
        let n = layers.len();
        let edges = prop::collection::vec((0..n, 0..n), 0..(n * 2));
        (Just(layers), edges)
    })
}

proptest! {
    #[test]
    fn prop_no_namespace_depends_on_a_higher_layer((layers, edges) in wiring()) {
        let schema = wired_schema(&layers, &edges);
        let upward = edges.iter().any(|(from, to)| layers[*to] > layers[*from]);

        match index(&schema) {
            Ok(resolved) => {
                prop_assert!(!upward);
                for edge in &resolved.graph().edges {
                    let origin = resolved.schema().namespace(edge.from).unwrap();
                    let target = resolved.schema().namespace(edge.to).unwrap();
                    prop_assert!(target.layer <= origin.layer, "{:?}", edge);
                }
            }
            Err(BuildError::LayeringViolation { origin_layer, target_layer, .. }) => {
                prop_assert!(upward);
                prop_assert!(target_layer > origin_layer);
            }
            Err(BuildError::CyclicDependency { cycle }) => {
                /* Only namespaces sharing a layer can form a cycle */
                prop_assert!(!upward);
                let cycle_layers: Vec<Layer> = cycle
                    .iter()
                    .map(|name| schema.namespace_by_name(name).unwrap().layer)
                    .collect();
                prop_assert!(cycle_layers.windows(2).all(|w| w[0] == w[1]), "{:?}", cycle);
            }
            Err(other) => prop_assert!(false, "unexpected error: {}", other),
        }
    }
}
