use std::collections::{BTreeMap, BTreeSet};

/* Why one namespace depends on another */
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DependencyKind {
  /// A type reference crossing namespaces
  TypeReference,
  /// Declared through `depends_on`
  Explicit,
  /// Root namespace of a lower layer
  LayerRoot,
  /// RPC client/server runtime of a namespace owning services
  RpcRuntime,
  /// DB wrapper runtime of a namespace owning db records
  DbRuntime,
  /// A service listed in a service group or a service's requirements
  ServiceReference,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
  pub from: u16,
  pub to: u16,
  pub kind: DependencyKind,
  pub context: String, // Where the dependency was discovered
}

/// Namespace dependency graph. Nodes are namespace ids; an edge `a -> b`
/// means "a depends on b". All collections are ordered so every traversal is
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
  pub nodes: BTreeSet<u16>,
  /// First dependency recorded for each distinct edge
  pub edges: Vec<Dependency>,
  pub adjacency_list: BTreeMap<u16, BTreeSet<u16>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CyclePath {
  /// Nodes of the cycle, first node repeated at the end
  pub cycle: Vec<u16>,
  pub dependencies: Vec<Dependency>,
}

impl DependencyGraph {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add_node(&mut self, node: u16) {
    self.nodes.insert(node);
    self.adjacency_list.entry(node).or_default();
  }

  /// Record a dependency. Self-edges and repeated edges are dropped; returns
  /// whether a new edge was added.
  pub fn add_dependency(&mut self, dependency: Dependency) -> bool {
    if dependency.from == dependency.to {
      return false;
    }
    self.add_node(dependency.from);
    self.add_node(dependency.to);
    let inserted = self
      .adjacency_list
      .entry(dependency.from)
      .or_default()
      .insert(dependency.to);
    if inserted {
      self.edges.push(dependency);
    }
    inserted
  }

  pub fn has_edge(&self, from: u16, to: u16) -> bool {
    self
      .adjacency_list
      .get(&from)
      .is_some_and(|targets| targets.contains(&to))
  }

  /* Direct dependencies of `node`, ascending */
  pub fn dependencies_of(&self, node: u16) -> impl Iterator<Item = u16> + '_ {
    self.adjacency_list.get(&node).into_iter().flatten().copied()
  }

  pub fn edge(&self, from: u16, to: u16) -> Option<&Dependency> {
    self.edges.iter().find(|d| d.from == from && d.to == to)
  }

  /// Depth-first search from every node in ascending id order, visiting
  /// neighbors in ascending id order. The first back edge found closes the
  /// reported cycle, so the result depends only on the graph contents.
  pub fn find_cycle(&self) -> Option<CyclePath> {
    let mut visited = BTreeSet::new();
    let mut rec_stack = BTreeSet::new();
    let mut path = Vec::new();

    for node in &self.nodes {
      if !visited.contains(node) {
        if let Some(cycle) = self.dfs_cycle_detection(*node, &mut visited, &mut rec_stack, &mut path) {
          return Some(cycle);
        }
      }
    }
    None
  }

  fn dfs_cycle_detection(
    &self,
    node: u16,
    visited: &mut BTreeSet<u16>,
    rec_stack: &mut BTreeSet<u16>,
    path: &mut Vec<u16>,
  ) -> Option<CyclePath> {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node);

    for neighbor in self.dependencies_of(node) {
      if !visited.contains(&neighbor) {
        if let Some(cycle) = self.dfs_cycle_detection(neighbor, visited, rec_stack, path) {
          return Some(cycle);
        }
      } else if rec_stack.contains(&neighbor) {
        let start = path.iter().position(|n| *n == neighbor).unwrap_or(0);
        let mut cycle: Vec<u16> = path[start..].to_vec();
        cycle.push(neighbor);
        let dependencies = cycle
          .windows(2)
          .filter_map(|pair| self.edge(pair[0], pair[1]).cloned())
          .collect();
        return Some(CyclePath { cycle, dependencies });
      }
    }

    path.pop();
    rec_stack.remove(&node);
    None
  }

  /// Order in which namespaces can be processed so that every namespace
  /// comes after all of its dependencies. Ties are broken by ascending id.
  /// Returns `None` for a cyclic graph.
  pub fn topological_sort(&self) -> Option<Vec<u16>> {
    let mut in_degree: BTreeMap<u16, usize> = self.nodes.iter().map(|n| (*n, 0)).collect();
    let mut reverse_adjacency: BTreeMap<u16, Vec<u16>> = BTreeMap::new();

    /* If A -> B means "A depends on B", A can only be emitted once B is done */
    for (from, targets) in &self.adjacency_list {
      for to in targets {
        *in_degree.entry(*from).or_insert(0) += 1;
        reverse_adjacency.entry(*to).or_default().push(*from);
      }
    }

    let mut ready: BTreeSet<u16> = in_degree
      .iter()
      .filter(|(_, degree)| **degree == 0)
      .map(|(node, _)| *node)
      .collect();
    let mut result = Vec::with_capacity(self.nodes.len());

    while let Some(node) = ready.pop_first() {
      result.push(node);
      for dependent in reverse_adjacency.get(&node).into_iter().flatten() {
        if let Some(degree) = in_degree.get_mut(dependent) {
          *degree -= 1;
          if *degree == 0 {
            ready.insert(*dependent);
          }
        }
      }
    }

    if result.len() == self.nodes.len() {
      Some(result)
    } else {
      None
    }
  }
}

#[cfg(test)]
#[path = "dependency_tests.rs"]
mod dependency_tests;
