//! Dependency graph construction, cycle detection, and topological order.
//!
//! The graph is built from a workflow's declared steps: one node per
//! step, one edge predecessor -> dependent for every dependency whose
//! identifier resolves to another step in the same workflow. Dangling
//! dependency ids contribute no edge; downstream validation operates
//! only on identifiers that actually appear.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{HashMap, VecDeque};
use taskwave_core::step::{Step, StepId};
use thiserror::Error;

/// Error types for dependency-structure validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Cycle detected in the dependency graph
    #[error("Cycle detected in workflow involving steps: {0:?}")]
    CycleDetected(Vec<StepId>),

    /// Topological order came up short of the node count
    #[error("Unresolved dependencies for steps: {0:?}")]
    UnresolvedDependencies(Vec<StepId>),

    /// No executable wave although work remains
    #[error("Deadlock: no executable steps remain among: {0:?}")]
    Deadlock(Vec<StepId>),
}

/// DFS color marking for cycle detection.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    /// Not yet visited
    White,
    /// On the current recursion stack
    Gray,
    /// Fully explored
    Black,
}

/// Directed dependency graph over a workflow's steps.
///
/// Nodes are inserted in declaration order, which [`topo_order`](Self::topo_order)
/// uses as its tie-break: when several steps reach in-degree zero
/// together, the earliest-declared one is emitted first.
pub struct DepGraph {
    graph: DiGraph<StepId, ()>,
    node_map: HashMap<StepId, NodeIndex>,
}

impl DepGraph {
    /// Builds the graph from a workflow's step list.
    ///
    /// No validation happens here; malformed predecessor ids are
    /// treated as the empty relation.
    pub fn build(steps: &[Step]) -> Self {
        let mut graph = DiGraph::new();
        let mut node_map = HashMap::new();

        for step in steps {
            let idx = graph.add_node(step.id.clone());
            node_map.insert(step.id.clone(), idx);
        }

        for step in steps {
            let to = node_map[&step.id];
            for dep in &step.dependencies {
                if let Some(&from) = node_map.get(dep) {
                    graph.add_edge(from, to, ());
                }
            }
        }

        Self { graph, node_map }
    }

    /// Number of steps in the graph.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Checks whether a step id is present.
    pub fn contains(&self, id: &StepId) -> bool {
        self.node_map.contains_key(id)
    }

    /// Reports whether the dependency relation contains a cycle.
    ///
    /// Standard color-marking depth-first search: a back-edge to a node
    /// currently on the recursion stack signals a cycle. O(V+E).
    pub fn has_cycle(&self) -> bool {
        !self.cycle_nodes().is_empty()
    }

    /// Returns the steps involved in a cycle, empty if the graph is acyclic.
    pub fn cycle_nodes(&self) -> Vec<StepId> {
        let mut colors = vec![Color::White; self.graph.node_count()];

        for start in self.graph.node_indices() {
            if colors[start.index()] == Color::White {
                if let Some(cycle) = self.dfs_cycle(start, &mut colors, &mut Vec::new()) {
                    return cycle;
                }
            }
        }
        Vec::new()
    }

    fn dfs_cycle(
        &self,
        node: NodeIndex,
        colors: &mut [Color],
        stack: &mut Vec<NodeIndex>,
    ) -> Option<Vec<StepId>> {
        colors[node.index()] = Color::Gray;
        stack.push(node);

        for next in self.graph.neighbors_directed(node, Direction::Outgoing) {
            match colors[next.index()] {
                Color::Gray => {
                    // Back-edge: the cycle is the stack suffix from `next`
                    let from = stack.iter().position(|&n| n == next).unwrap_or(0);
                    return Some(
                        stack[from..]
                            .iter()
                            .map(|&n| self.graph[n].clone())
                            .collect(),
                    );
                }
                Color::White => {
                    if let Some(cycle) = self.dfs_cycle(next, colors, stack) {
                        return Some(cycle);
                    }
                }
                Color::Black => {}
            }
        }

        stack.pop();
        colors[node.index()] = Color::Black;
        None
    }

    /// Returns one valid linear execution order via Kahn's algorithm.
    ///
    /// In-degrees are computed for every node, the queue is seeded with
    /// in-degree-zero nodes in declaration order, and nodes unlocked by
    /// the same dequeue are enqueued in declaration order, so ties
    /// always resolve to the earliest-declared step. If the produced order is
    /// shorter than the node count a cycle or unresolved dependency
    /// exists; that is reported even when [`has_cycle`](Self::has_cycle)
    /// was checked first.
    pub fn topo_order(&self) -> Result<Vec<StepId>, GraphError> {
        let mut in_degree: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|idx| {
                (
                    idx,
                    self.graph.neighbors_directed(idx, Direction::Incoming).count(),
                )
            })
            .collect();

        // node_indices() iterates in insertion order, which is declaration order
        let mut queue: VecDeque<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|idx| in_degree[idx] == 0)
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        let mut unlocked = Vec::new();
        while let Some(idx) = queue.pop_front() {
            order.push(self.graph[idx].clone());
            unlocked.clear();
            for next in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                let deg = in_degree.get_mut(&next).unwrap();
                *deg -= 1;
                if *deg == 0 {
                    unlocked.push(next);
                }
            }
            // Neighbor iteration runs in reverse edge-insertion order;
            // sorting by node index restores declaration order for
            // nodes unlocked by the same dequeue
            unlocked.sort_unstable();
            queue.extend(unlocked.iter().copied());
        }

        if order.len() < self.graph.node_count() {
            let leftover: Vec<StepId> = self
                .graph
                .node_indices()
                .map(|idx| self.graph[idx].clone())
                .filter(|id| !order.contains(id))
                .collect();
            let cycle = self.cycle_nodes();
            return Err(if cycle.is_empty() {
                GraphError::UnresolvedDependencies(leftover)
            } else {
                GraphError::CycleDetected(cycle)
            });
        }

        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskwave_core::step::StepBlueprint;

    fn steps(defs: &[(&str, &[&str])]) -> Vec<Step> {
        defs.iter()
            .map(|(id, deps)| {
                let mut bp = StepBlueprint::new(*id, format!("Step {id}"), "noop");
                for dep in *deps {
                    bp = bp.depends_on(*dep);
                }
                Step::from_blueprint(bp)
            })
            .collect()
    }

    #[test]
    fn test_build_counts_nodes() {
        let g = DepGraph::build(&steps(&[("a", &[]), ("b", &["a"])]));
        assert_eq!(g.node_count(), 2);
        assert!(g.contains(&StepId::new("a")));
        assert!(!g.contains(&StepId::new("z")));
    }

    #[test]
    fn test_dangling_dependency_is_ignored() {
        let g = DepGraph::build(&steps(&[("a", &["ghost"])]));
        assert!(!g.has_cycle());
        assert_eq!(g.topo_order().unwrap(), vec![StepId::new("a")]);
    }

    #[test]
    fn test_acyclic_graph_has_no_cycle() {
        let g = DepGraph::build(&steps(&[
            ("a", &[]),
            ("b", &["a"]),
            ("c", &["a"]),
            ("d", &["b", "c"]),
        ]));
        assert!(!g.has_cycle());
    }

    #[test]
    fn test_two_node_cycle_detected() {
        let g = DepGraph::build(&steps(&[("a", &["b"]), ("b", &["a"])]));
        assert!(g.has_cycle());

        let cycle = g.cycle_nodes();
        assert!(cycle.contains(&StepId::new("a")));
        assert!(cycle.contains(&StepId::new("b")));
    }

    #[test]
    fn test_self_cycle_detected() {
        let g = DepGraph::build(&steps(&[("a", &["a"])]));
        assert!(g.has_cycle());
        assert_eq!(g.cycle_nodes(), vec![StepId::new("a")]);
    }

    #[test]
    fn test_cycle_behind_acyclic_prefix() {
        let g = DepGraph::build(&steps(&[
            ("a", &[]),
            ("b", &["a", "d"]),
            ("c", &["b"]),
            ("d", &["c"]),
        ]));
        assert!(g.has_cycle());
        assert!(matches!(g.topo_order(), Err(GraphError::CycleDetected(_))));
    }

    #[test]
    fn test_topo_order_respects_dependencies() {
        let g = DepGraph::build(&steps(&[
            ("a", &[]),
            ("b", &["a"]),
            ("c", &["a"]),
            ("d", &["b", "c"]),
        ]));
        let order = g.topo_order().unwrap();
        assert_eq!(order.len(), 4);

        let pos = |id: &str| order.iter().position(|s| s == &StepId::new(id)).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("a") < pos("c"));
        assert!(pos("b") < pos("d"));
        assert!(pos("c") < pos("d"));
    }

    #[test]
    fn test_topo_order_tie_break_is_declaration_order() {
        // Three independent roots: the order must match declaration
        let g = DepGraph::build(&steps(&[("z", &[]), ("m", &[]), ("a", &[])]));
        assert_eq!(
            g.topo_order().unwrap(),
            vec![StepId::new("z"), StepId::new("m"), StepId::new("a")]
        );

        // Steps that reach in-degree zero together mid-run keep
        // declaration order too
        let g = DepGraph::build(&steps(&[("a", &[]), ("b", &["a"]), ("c", &["a"])]));
        assert_eq!(
            g.topo_order().unwrap(),
            vec![StepId::new("a"), StepId::new("b"), StepId::new("c")]
        );

        // A deeper fan-out: both branches unlock their children in
        // declaration order after the shared root
        let g = DepGraph::build(&steps(&[
            ("root", &[]),
            ("late", &["root"]),
            ("early", &["root"]),
            ("tail", &["late", "early"]),
        ]));
        assert_eq!(
            g.topo_order().unwrap(),
            vec![
                StepId::new("root"),
                StepId::new("late"),
                StepId::new("early"),
                StepId::new("tail"),
            ]
        );
    }

    #[test]
    fn test_empty_graph_topo_order() {
        let g = DepGraph::build(&[]);
        assert_eq!(g.topo_order().unwrap(), Vec::<StepId>::new());
        assert!(!g.has_cycle());
    }
}
