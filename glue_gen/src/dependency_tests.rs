use super::*;

fn create_dependency(from: u16, to: u16) -> Dependency {
  Dependency {
    from,
    to,
    kind: DependencyKind::TypeReference,
    context: format!("{} -> {}", from, to),
  }
}

fn create_graph(edges: &[(u16, u16)]) -> DependencyGraph {
  let mut graph = DependencyGraph::new();
  for (from, to) in edges {
    graph.add_dependency(create_dependency(*from, *to));
  }
  graph
}

#[test]
fn test_self_edges_are_dropped() {
  let mut graph = DependencyGraph::new();
  assert!(!graph.add_dependency(create_dependency(5, 5)));
  assert!(graph.edges.is_empty());
  assert!(!graph.has_edge(5, 5));
}

#[test]
fn test_repeated_edges_keep_first_context() {
  let mut graph = DependencyGraph::new();
  assert!(graph.add_dependency(create_dependency(2, 1)));
  let mut again = create_dependency(2, 1);
  again.context = "second".to_string();
  assert!(!graph.add_dependency(again));
  assert_eq!(graph.edges.len(), 1);
  assert_eq!(graph.edge(2, 1).unwrap().context, "2 -> 1");
}

#[test]
fn test_acyclic_graph_has_no_cycle() {
  let graph = create_graph(&[(3, 2), (2, 1), (3, 1)]);
  assert!(graph.find_cycle().is_none());
}

#[test]
fn test_simple_cycle() {
  let graph = create_graph(&[(1, 2), (2, 1)]);
  let cycle = graph.find_cycle().unwrap();
  assert_eq!(cycle.cycle, vec![1, 2, 1]);
  assert_eq!(cycle.dependencies.len(), 2);
}

#[test]
fn test_cycle_report_is_deterministic() {
  /* Two disjoint cycles; the one reachable from the lowest id is reported */
  let forward = create_graph(&[(20, 21), (21, 20), (7, 9), (9, 8), (8, 7)]);
  let backward = create_graph(&[(8, 7), (9, 8), (7, 9), (21, 20), (20, 21)]);
  let a = forward.find_cycle().unwrap();
  let b = backward.find_cycle().unwrap();
  assert_eq!(a.cycle, vec![7, 9, 8, 7]);
  assert_eq!(a.cycle, b.cycle);
}

#[test]
fn test_cycle_behind_acyclic_prefix() {
  let graph = create_graph(&[(1, 2), (2, 3), (3, 4), (4, 2)]);
  let cycle = graph.find_cycle().unwrap();
  assert_eq!(cycle.cycle, vec![2, 3, 4, 2]);
}

#[test]
fn test_topological_sort_dependencies_first() {
  let mut graph = create_graph(&[(30, 20), (20, 10), (40, 10), (40, 30)]);
  graph.add_node(5);
  let order = graph.topological_sort().unwrap();
  assert_eq!(order, vec![5, 10, 20, 30, 40]);
}

#[test]
fn test_topological_sort_rejects_cycles() {
  let graph = create_graph(&[(1, 2), (2, 3), (3, 1)]);
  assert!(graph.topological_sort().is_none());
}
