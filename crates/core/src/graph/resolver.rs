//! Dependency resolver: deterministic topological ordering of resources.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use super::error::{CycleError, GraphError};
use crate::descriptor::{ResourceId, ResourceKind};

/// A resource together with the resources that must exist before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: ResourceId,
    pub dependencies: Vec<ResourceId>,
}

impl Node {
    pub fn new(id: ResourceId, dependencies: Vec<ResourceId>) -> Self {
        Self { id, dependencies }
    }
}

/// Directed graph where an edge `a -> b` means `b` must exist before `a`.
///
/// Node indices follow declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    ids: Vec<ResourceId>,
    index: HashMap<ResourceId, usize>,
    dependencies: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// Builds the graph. Every dependency must be one of the given nodes.
    pub fn new(nodes: &[Node]) -> Result<Self, GraphError> {
        let mut index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if index.insert(node.id.clone(), i).is_some() {
                return Err(GraphError::DuplicateNode(node.id.clone()));
            }
        }

        let mut dependencies = vec![Vec::new(); nodes.len()];
        let mut dependents = vec![Vec::new(); nodes.len()];

        for (i, node) in nodes.iter().enumerate() {
            let mut seen = HashSet::new();
            for dependency in &node.dependencies {
                let j = *index
                    .get(dependency)
                    .ok_or_else(|| GraphError::UnknownDependency {
                        resource: node.id.clone(),
                        dependency: dependency.clone(),
                    })?;
                if seen.insert(j) {
                    dependencies[i].push(j);
                    dependents[j].push(i);
                }
            }
        }

        Ok(Self {
            ids: nodes.iter().map(|n| n.id.clone()).collect(),
            index,
            dependencies,
            dependents,
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.index.contains_key(id)
    }

    /// Direct dependencies of `id`.
    pub fn dependencies(&self, id: &ResourceId) -> Vec<&ResourceId> {
        self.index
            .get(id)
            .map(|i| self.dependencies[*i].iter().map(|j| &self.ids[*j]).collect())
            .unwrap_or_default()
    }

    /// Resources that directly depend on `id`.
    pub fn dependents(&self, id: &ResourceId) -> Vec<&ResourceId> {
        self.index
            .get(id)
            .map(|i| self.dependents[*i].iter().map(|j| &self.ids[*j]).collect())
            .unwrap_or_default()
    }

    /// Every resource that depends on `id`, directly or not, in declaration
    /// order.
    pub fn transitive_dependents(&self, id: &ResourceId) -> Vec<&ResourceId> {
        let Some(&start) = self.index.get(id) else {
            return Vec::new();
        };

        let mut visited = vec![false; self.ids.len()];
        let mut stack = vec![start];
        while let Some(i) = stack.pop() {
            for &j in &self.dependents[i] {
                if !visited[j] {
                    visited[j] = true;
                    stack.push(j);
                }
            }
        }

        visited
            .iter()
            .enumerate()
            .filter(|(i, v)| **v && *i != start)
            .map(|(i, _)| &self.ids[i])
            .collect()
    }

    /// Topological order. Among resources that are ready at the same time,
    /// lower kind precedence goes first, then declaration order.
    pub fn resolve_order(&self) -> Result<Vec<ResourceId>, CycleError> {
        let mut in_degree: Vec<usize> = self.dependencies.iter().map(Vec::len).collect();
        let mut ready: BinaryHeap<Reverse<(ResourceKind, usize)>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| Reverse((self.ids[i].kind, i)))
            .collect();

        let mut order = Vec::with_capacity(self.ids.len());
        while let Some(Reverse((_, i))) = ready.pop() {
            order.push(self.ids[i].clone());
            for &j in &self.dependents[i] {
                in_degree[j] -= 1;
                if in_degree[j] == 0 {
                    ready.push(Reverse((self.ids[j].kind, j)));
                }
            }
        }

        if order.len() == self.ids.len() {
            Ok(order)
        } else {
            Err(self.find_cycle(&in_degree))
        }
    }

    /// Every node left with a positive in-degree still waits on another such
    /// node, so walking unresolved dependencies must revisit a node.
    fn find_cycle(&self, in_degree: &[usize]) -> CycleError {
        let Some(start) = in_degree.iter().position(|d| *d > 0) else {
            return CycleError { cycle: Vec::new() };
        };

        let mut path: Vec<usize> = Vec::new();
        let mut position: HashMap<usize, usize> = HashMap::new();
        let mut current = start;

        loop {
            if let Some(&at) = position.get(&current) {
                let cycle = path[at..].iter().map(|i| self.ids[*i].clone()).collect();
                return CycleError { cycle };
            }
            position.insert(current, path.len());
            path.push(current);

            match self.dependencies[current]
                .iter()
                .copied()
                .find(|j| in_degree[*j] > 0)
            {
                Some(next) => current = next,
                None => return CycleError { cycle: Vec::new() },
            }
        }
    }
}

/// Orders `nodes` so every resource comes after all of its dependencies.
pub fn resolve_order(nodes: &[Node]) -> Result<Vec<ResourceId>, GraphError> {
    let graph = DependencyGraph::new(nodes)?;
    Ok(graph.resolve_order()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: ResourceId, deps: &[ResourceId]) -> Node {
        Node::new(id, deps.to_vec())
    }

    fn position(order: &[ResourceId], id: &ResourceId) -> usize {
        order.iter().position(|x| x == id).unwrap()
    }

    #[test]
    fn test_dependencies_come_first() {
        let table = ResourceId::table("users");
        let role = ResourceId::role("exec");
        let function = ResourceId::function("hello");
        let api = ResourceId::api("api");
        let route = ResourceId::route("/hello");

        // Declared in reverse to make sure ordering does not rely on input order.
        let nodes = vec![
            node(route.clone(), &[api.clone(), function.clone()]),
            node(function.clone(), &[role.clone(), table.clone()]),
            node(api.clone(), &[]),
            node(role.clone(), &[table.clone()]),
            node(table.clone(), &[]),
        ];

        let order = resolve_order(&nodes).unwrap();

        for n in &nodes {
            for dep in &n.dependencies {
                assert!(position(&order, dep) < position(&order, &n.id));
            }
        }
    }

    #[test]
    fn test_independent_resources_follow_kind_then_declaration_order() {
        let nodes = vec![
            node(ResourceId::route("/b"), &[]),
            node(ResourceId::function("f"), &[]),
            node(ResourceId::table("t2"), &[]),
            node(ResourceId::role("r"), &[]),
            node(ResourceId::table("t1"), &[]),
        ];

        let order = resolve_order(&nodes).unwrap();

        assert_eq!(
            order,
            vec![
                ResourceId::table("t2"),
                ResourceId::table("t1"),
                ResourceId::role("r"),
                ResourceId::function("f"),
                ResourceId::route("/b"),
            ]
        );
    }

    #[test]
    fn test_cycle_is_detected_and_named() {
        let a = ResourceId::role("a");
        let b = ResourceId::function("b");
        let c = ResourceId::table("c");
        let nodes = vec![
            node(c.clone(), &[]),
            node(a.clone(), &[b.clone()]),
            node(b.clone(), &[a.clone(), c]),
        ];

        let err = resolve_order(&nodes).unwrap_err();

        match err {
            GraphError::Cycle(cycle) => {
                assert_eq!(cycle.cycle.len(), 2);
                assert!(cycle.cycle.contains(&a));
                assert!(cycle.cycle.contains(&b));
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let a = ResourceId::table("a");
        let err = resolve_order(&[node(a.clone(), &[a.clone()])]).unwrap_err();
        assert_eq!(err, GraphError::Cycle(CycleError { cycle: vec![a] }));
    }

    #[test]
    fn test_unknown_dependency_is_rejected() {
        let err = resolve_order(&[node(
            ResourceId::function("f"),
            &[ResourceId::role("missing")],
        )])
        .unwrap_err();

        assert!(matches!(err, GraphError::UnknownDependency { .. }));
    }

    #[test]
    fn test_transitive_dependents() {
        let table = ResourceId::table("t");
        let role = ResourceId::role("r");
        let function = ResourceId::function("f");
        let other = ResourceId::table("other");
        let graph = DependencyGraph::new(&[
            node(table.clone(), &[]),
            node(other.clone(), &[]),
            node(role.clone(), &[table.clone()]),
            node(function.clone(), &[role.clone()]),
        ])
        .unwrap();

        assert_eq!(graph.transitive_dependents(&table), vec![&role, &function]);
        assert!(graph.transitive_dependents(&other).is_empty());
        assert_eq!(graph.dependencies(&function), vec![&role]);
    }
}
