//! Step graph analysis.
//!
//! Uses `petgraph` to model a definition's `next_steps` as a directed graph.
//! Forward traversal finds steps reachable from the start step, traversal over
//! the reversed graph finds steps that can still reach a terminal, and the
//! edge set gives a cheap structural fingerprint for comparing two forms of
//! the same workflow.

use std::collections::{BTreeSet, HashMap};

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, Reversed};
use puente_types::workflow::WorkflowDefinition;

use super::definition::WorkflowError;

/// Directed graph over step IDs.
#[derive(Debug)]
pub struct StepGraph {
    graph: DiGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
}

impl StepGraph {
    /// Build the graph from a definition's `next_steps` lists.
    ///
    /// Fails on the first `next_steps` entry that names an unknown step.
    pub fn from_definition(def: &WorkflowDefinition) -> Result<Self, WorkflowError> {
        let mut graph = DiGraph::<String, ()>::new();
        let mut index = HashMap::new();
        for step in &def.steps {
            let idx = graph.add_node(step.step_id.clone());
            index.insert(step.step_id.clone(), idx);
        }

        for step in &def.steps {
            let from = index[step.step_id.as_str()];
            for next in &step.next_steps {
                let to = index.get(next.as_str()).ok_or_else(|| {
                    WorkflowError::UnknownStep(format!(
                        "step '{}' transitions to unknown step '{}'",
                        step.step_id, next
                    ))
                })?;
                graph.add_edge(from, *to, ());
            }
        }

        Ok(Self { graph, index })
    }

    /// Steps reachable from `start`, including `start` itself.
    /// Empty if `start` is unknown.
    pub fn reachable_from(&self, start: &str) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        let Some(&start) = self.index.get(start) else {
            return found;
        };
        let mut bfs = Bfs::new(&self.graph, start);
        while let Some(node) = bfs.next(&self.graph) {
            found.insert(self.graph[node].clone());
        }
        found
    }

    /// Steps from which at least one of `targets` is reachable, including
    /// the targets themselves.
    pub fn reaching_any(&self, targets: &[&str]) -> BTreeSet<String> {
        let reversed = Reversed(&self.graph);
        let mut found = BTreeSet::new();
        for target in targets {
            let Some(&target) = self.index.get(*target) else {
                continue;
            };
            let mut bfs = Bfs::new(reversed, target);
            while let Some(node) = bfs.next(reversed) {
                found.insert(self.graph[node].clone());
            }
        }
        found
    }

    /// All edges as `(from, to)` pairs.
    pub fn edges(&self) -> BTreeSet<(String, String)> {
        self.graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .map(|(a, b)| (self.graph[a].clone(), self.graph[b].clone()))
            .collect()
    }

    pub fn has_cycle(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }
}

/// Whether two definitions describe the same graph: identical step ID sets,
/// identical edges, and identical reachability from their start steps.
///
/// Step kinds, names and input lists are not compared.
pub fn same_shape(a: &WorkflowDefinition, b: &WorkflowDefinition) -> Result<bool, WorkflowError> {
    let ga = StepGraph::from_definition(a)?;
    let gb = StepGraph::from_definition(b)?;

    let ids_a: BTreeSet<&str> = a.steps.iter().map(|s| s.step_id.as_str()).collect();
    let ids_b: BTreeSet<&str> = b.steps.iter().map(|s| s.step_id.as_str()).collect();

    Ok(ids_a == ids_b
        && a.start_step_id == b.start_step_id
        && ga.edges() == gb.edges()
        && ga.reachable_from(&a.start_step_id) == gb.reachable_from(&b.start_step_id))
}
