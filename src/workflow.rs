// src/workflow.rs

//! The [`Workflow`]: a validated collection of [`TaskSpec`]s plus the
//! adjacency derived from their `deps`.

use std::collections::{BTreeMap, HashMap};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::error::MicroflowError;
use crate::task::{TaskName, TaskSpec};

/// Adjacency node: direct dependencies and dependents of one task.
#[derive(Debug, Clone, Default)]
struct Node {
    deps: Vec<TaskName>,
    dependents: Vec<TaskName>,
}

/// Ordered collection of [`TaskSpec`]s plus the adjacency list derived
/// from their `deps`.
///
/// Constructed only through [`Workflow::try_new`], which validates that
/// every `deps` entry resolves, names are unique, and the graph is
/// acyclic — mirroring the TOML-config validation performed before ever
/// building a `DagGraph`.
#[derive(Debug, Clone)]
pub struct Workflow {
    specs: BTreeMap<TaskName, TaskSpec>,
    nodes: HashMap<TaskName, Node>,
}

impl Workflow {
    /// Validate and build a workflow from a set of task specs.
    ///
    /// Fails with [`MicroflowError::ConfigError`] if any name is
    /// duplicated, any `deps` entry is unresolvable, or the dependency
    /// graph contains a cycle. No partial state is written on failure —
    /// this runs entirely in memory before a `Scheduler` ever sees the
    /// workflow.
    pub fn try_new(specs: Vec<TaskSpec>) -> Result<Self, MicroflowError> {
        let mut by_name = BTreeMap::new();
        for spec in specs {
            if by_name.insert(spec.name().to_string(), spec).is_some() {
                return Err(MicroflowError::ConfigError(format!(
                    "duplicate task name '{}'",
                    by_name.keys().next_back().unwrap()
                )));
            }
        }

        for (name, spec) in by_name.iter() {
            for dep in spec.deps() {
                if !by_name.contains_key(dep) {
                    return Err(MicroflowError::ConfigError(format!(
                        "task '{name}' depends on unknown task '{dep}'"
                    )));
                }
                if dep == name {
                    return Err(MicroflowError::ConfigError(format!(
                        "task '{name}' cannot depend on itself"
                    )));
                }
            }
        }

        validate_acyclic(&by_name)?;

        let nodes = build_adjacency(&by_name);

        Ok(Self {
            specs: by_name,
            nodes,
        })
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn task(&self, name: &str) -> Option<&TaskSpec> {
        self.specs.get(name)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &TaskSpec> {
        self.specs.values()
    }

    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }

    /// Immediate upstream dependencies of `name`.
    pub fn dependencies_of(&self, name: &str) -> &[TaskName] {
        self.nodes
            .get(name)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate downstream dependents of `name`.
    pub fn dependents_of(&self, name: &str) -> &[TaskName] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// Every task reachable downstream of `name`, transitively, excluding
    /// `name` itself.
    pub fn transitive_dependents_of(&self, name: &str) -> Vec<TaskName> {
        let mut stack: Vec<TaskName> = self.dependents_of(name).to_vec();
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();

        while let Some(next) = stack.pop() {
            if !seen.insert(next.clone()) {
                continue;
            }
            stack.extend(self.dependents_of(&next).iter().cloned());
            out.push(next);
        }

        out
    }

    /// Tasks with no upstream dependencies — the initial ready set.
    pub fn roots(&self) -> Vec<TaskName> {
        self.specs
            .keys()
            .filter(|name| self.dependencies_of(name).is_empty())
            .cloned()
            .collect()
    }
}

fn validate_acyclic(specs: &BTreeMap<TaskName, TaskSpec>) -> Result<(), MicroflowError> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in specs.keys() {
        graph.add_node(name.as_str());
    }

    for (name, spec) in specs.iter() {
        for dep in spec.deps() {
            // Edge dep -> name: name runs after dep.
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(MicroflowError::ConfigError(format!(
            "cycle detected in task DAG involving task '{}'",
            cycle.node_id()
        ))),
    }
}

fn build_adjacency(specs: &BTreeMap<TaskName, TaskSpec>) -> HashMap<TaskName, Node> {
    let mut nodes: HashMap<TaskName, Node> = specs
        .keys()
        .map(|name| (name.clone(), Node::default()))
        .collect();

    for (name, spec) in specs.iter() {
        nodes.get_mut(name).unwrap().deps = spec.deps().iter().cloned().collect();
    }

    let names: Vec<TaskName> = nodes.keys().cloned().collect();
    for name in names {
        let deps = nodes.get(&name).map(|n| n.deps.clone()).unwrap_or_default();
        for dep in deps {
            if let Some(dep_node) = nodes.get_mut(&dep) {
                dep_node.dependents.push(name.clone());
            }
        }
    }

    nodes
}
