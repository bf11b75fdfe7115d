//! Dependency graph
//!
//! Used at two levels: resources inside a unit, and units inside an app.
//! Edges point from a dependent to its dependency. Ordering is Kahn's
//! algorithm with ties broken by insertion order, so the same declarations
//! always produce the same order.

use crate::error::{Result, SynthError};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Nodes in insertion order
    nodes: Vec<String>,
    position: HashMap<String, usize>,
    /// node -> its dependencies
    dependencies: HashMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: impl Into<String>) {
        let id = id.into();
        if !self.position.contains_key(&id) {
            self.position.insert(id.clone(), self.nodes.len());
            self.dependencies.insert(id.clone(), BTreeSet::new());
            self.nodes.push(id);
        }
    }

    /// `dependent` must come after `dependency`
    pub fn add_edge(&mut self, dependent: impl Into<String>, dependency: impl Into<String>) {
        let dependent = dependent.into();
        let dependency = dependency.into();
        self.add_node(dependent.clone());
        self.add_node(dependency.clone());
        if let Some(deps) = self.dependencies.get_mut(&dependent) {
            deps.insert(dependency);
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Direct dependencies of a node, sorted
    pub fn dependencies_of(&self, id: &str) -> Vec<String> {
        self.dependencies
            .get(id)
            .map(|deps| deps.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Dependencies first; fails with the cycle path if there is one
    pub fn topological_order(&self) -> Result<Vec<String>> {
        let mut remaining: HashMap<&str, usize> = self
            .nodes
            .iter()
            .map(|n| (n.as_str(), self.dependencies[n].len()))
            .collect();

        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for node in &self.nodes {
            for dependency in &self.dependencies[node] {
                dependents
                    .entry(dependency.as_str())
                    .or_default()
                    .push(node.as_str());
            }
        }
        for list in dependents.values_mut() {
            list.sort_by_key(|n| self.position[*n]);
        }

        let mut queue: VecDeque<&str> = self
            .nodes
            .iter()
            .map(String::as_str)
            .filter(|n| remaining[n] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(node) = queue.pop_front() {
            order.push(node.to_string());
            if let Some(next) = dependents.get(node) {
                for &dependent in next {
                    if let Some(count) = remaining.get_mut(dependent) {
                        *count -= 1;
                        if *count == 0 {
                            queue.push_back(dependent);
                        }
                    }
                }
            }
        }

        if order.len() < self.nodes.len() {
            let cycle = self
                .find_cycle()
                .map(|c| c.join(" -> "))
                .unwrap_or_else(|| "unknown cycle".to_string());
            return Err(SynthError::CircularDependency(cycle));
        }

        Ok(order)
    }

    /// First cycle found by a depth-first search, closed on its first node
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut visited = HashSet::new();
        let mut on_stack = HashSet::new();
        let mut path = Vec::new();

        for node in &self.nodes {
            if !visited.contains(node.as_str())
                && let Some(cycle) = self.visit(node, &mut visited, &mut on_stack, &mut path)
            {
                return Some(cycle);
            }
        }
        None
    }

    fn visit<'a>(
        &'a self,
        node: &'a str,
        visited: &mut HashSet<&'a str>,
        on_stack: &mut HashSet<&'a str>,
        path: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        visited.insert(node);
        on_stack.insert(node);
        path.push(node);

        for dependency in &self.dependencies[node] {
            let dependency = dependency.as_str();
            if on_stack.contains(dependency) {
                let start = path.iter().position(|n| *n == dependency).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].iter().map(|n| n.to_string()).collect();
                cycle.push(dependency.to_string());
                return Some(cycle);
            }
            if !visited.contains(dependency)
                && let Some(cycle) = self.visit(dependency, visited, on_stack, path)
            {
                return Some(cycle);
            }
        }

        on_stack.remove(node);
        path.pop();
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_respects_edges_and_insertion() {
        let mut graph = DependencyGraph::new();
        graph.add_node("network");
        graph.add_node("replication");
        graph.add_edge("backend", "load-balancer");
        graph.add_edge("backend", "security");
        graph.add_edge("load-balancer", "security");
        graph.add_edge("load-balancer", "network");
        graph.add_edge("security", "network");

        let order = graph.topological_order().unwrap();
        assert_eq!(
            order,
            ["network", "replication", "security", "load-balancer", "backend"]
        );
    }

    #[test]
    fn test_cycle_reported_with_path() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("DBSG", "ECSSG");
        graph.add_edge("ECSSG", "ALBSG");
        graph.add_edge("ALBSG", "DBSG");

        let cycle = graph.find_cycle().unwrap();
        assert_eq!(cycle.first(), cycle.last());
        assert_eq!(cycle.len(), 4);

        let err = graph.topological_order().unwrap_err();
        assert!(matches!(err, SynthError::CircularDependency(msg) if msg.contains("ECSSG")));
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("Vpc", "Vpc");
        assert_eq!(graph.find_cycle().unwrap(), ["Vpc", "Vpc"]);
    }

    #[test]
    fn test_dependencies_of_sorted() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("backend", "security");
        graph.add_edge("backend", "network");

        assert_eq!(graph.dependencies_of("backend"), ["network", "security"]);
        assert!(graph.dependencies_of("unknown").is_empty());
        assert_eq!(graph.len(), 3);
    }
}
