// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Compiles trait declarations into an immutable [`TraitGraph`].
//!
//! An edge `X → Y` exists when one of `Y`'s deps overlaps `X`'s write target
//! (one path is a prefix of the other). The graph keeps:
//!
//! * forward edges in both directions (producers and consumers per node)
//! * a topological order computed with Kahn's algorithm, ties broken by
//!   declaration order so evaluation is deterministic
//! * a reverse index `FieldPath → {TraitNodeId}` over declared deps, plus a
//!   prefix index so a dirty path finds dependents declared above or below it
//!
//! Compilation is not on the hot path; lookups used during convergence are.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::errors::{GraphError, GraphErrors};
use crate::graph::validation::{validate_acyclic, validate_paths, validate_unique_owners};
use crate::graph::{FieldPath, TraitNode, TraitNodeId, TraitSpec};
use crate::state::DirtySet;

/// How often a bounded closure walk consults its stop predicate.
pub const CLOSURE_BUDGET_CHECK_INTERVAL: usize = 32;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

fn next_generation() -> u64 {
    NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
}

/// Validated DAG of trait nodes with precomputed order and indexes.
#[derive(Debug, Default)]
pub struct TraitGraph {
    generation: u64,
    nodes: Vec<TraitNode>,
    order: Vec<TraitNodeId>,
    position: Vec<usize>,
    producers: Vec<Vec<TraitNodeId>>,
    consumers: Vec<Vec<TraitNodeId>>,
    reverse_index: HashMap<FieldPath, BTreeSet<TraitNodeId>>,
    below_index: HashMap<FieldPath, BTreeSet<TraitNodeId>>,
}

impl TraitGraph {
    /// Graph with no traits; every convergence is a no-op.
    pub fn empty() -> Self {
        Self {
            generation: next_generation(),
            ..Self::default()
        }
    }

    /// Validates and compiles `specs`.
    ///
    /// Errors are accumulated: every malformed path and every contested
    /// target is reported at once. Cycle detection only runs on an otherwise
    /// valid declaration set.
    pub fn compile(specs: Vec<TraitSpec>) -> Result<Self, GraphErrors> {
        let nodes = validate_paths(specs).map_err(GraphErrors)?;
        validate_unique_owners(&nodes).map_err(GraphErrors)?;

        let (producers, consumers) = build_edges(&nodes);
        validate_acyclic(&nodes, &consumers).map_err(GraphErrors)?;

        let order = topological_order(&nodes, &producers, &consumers).ok_or_else(|| {
            GraphErrors(vec![GraphError::TraitCycle { cycle: Vec::new() }])
        })?;
        let mut position = vec![0; nodes.len()];
        for (pos, id) in order.iter().enumerate() {
            position[id.0] = pos;
        }

        let mut reverse_index: HashMap<FieldPath, BTreeSet<TraitNodeId>> = HashMap::new();
        let mut below_index: HashMap<FieldPath, BTreeSet<TraitNodeId>> = HashMap::new();
        for node in &nodes {
            for dep in &node.deps {
                reverse_index.entry(dep.clone()).or_default().insert(node.id);
                for prefix in dep.prefixes() {
                    below_index.entry(prefix).or_default().insert(node.id);
                }
            }
        }

        Ok(Self {
            generation: next_generation(),
            nodes,
            order,
            position,
            producers,
            consumers,
            reverse_index,
            below_index,
        })
    }

    /// Process-unique id of this compiled graph; never reused.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[TraitNode] {
        &self.nodes
    }

    pub fn node(&self, id: TraitNodeId) -> &TraitNode {
        &self.nodes[id.0]
    }

    pub fn topo_order(&self) -> &[TraitNodeId] {
        &self.order
    }

    pub fn position(&self, id: TraitNodeId) -> usize {
        self.position[id.0]
    }

    /// Nodes whose write target feeds `id`.
    pub fn producers(&self, id: TraitNodeId) -> &[TraitNodeId] {
        &self.producers[id.0]
    }

    /// Nodes that read what `id` writes.
    pub fn consumers(&self, id: TraitNodeId) -> &[TraitNodeId] {
        &self.consumers[id.0]
    }

    pub fn edge_count(&self) -> usize {
        self.consumers.iter().map(Vec::len).sum()
    }

    /// Exact reverse index: declared dep path → dependent nodes.
    pub fn reverse_index(&self) -> &HashMap<FieldPath, BTreeSet<TraitNodeId>> {
        &self.reverse_index
    }

    /// Every node with a dep overlapping `path`.
    pub fn dependents_of(&self, path: &FieldPath) -> BTreeSet<TraitNodeId> {
        let mut found = BTreeSet::new();
        for prefix in path.prefixes() {
            if let Some(ids) = self.reverse_index.get(&prefix) {
                found.extend(ids.iter().copied());
            }
        }
        if let Some(ids) = self.below_index.get(path) {
            found.extend(ids.iter().copied());
        }
        found
    }

    /// All nodes transitively dependent on `dirty`, in topological order.
    pub fn closure(&self, dirty: &DirtySet) -> Vec<TraitNodeId> {
        self.closure_bounded(dirty, || false).unwrap_or_default()
    }

    /// Like [`closure`](Self::closure) but gives up (returning `None`) once
    /// `should_stop` answers true. The predicate is polled every
    /// [`CLOSURE_BUDGET_CHECK_INTERVAL`] visited nodes.
    pub fn closure_bounded<F>(&self, dirty: &DirtySet, mut should_stop: F) -> Option<Vec<TraitNodeId>>
    where
        F: FnMut() -> bool,
    {
        if dirty.is_dirty_all() {
            return Some(self.order.clone());
        }

        let mut selected: HashSet<TraitNodeId> = HashSet::new();
        let mut frontier: VecDeque<FieldPath> = dirty.roots().cloned().collect();
        let mut visited_paths: HashSet<FieldPath> = HashSet::new();
        let mut steps = 0usize;

        while let Some(path) = frontier.pop_front() {
            if !visited_paths.insert(path.clone()) {
                continue;
            }
            for id in self.dependents_of(&path) {
                steps += 1;
                if steps % CLOSURE_BUDGET_CHECK_INTERVAL == 0 && should_stop() {
                    return None;
                }
                if selected.insert(id) {
                    frontier.push_back(self.nodes[id.0].write_target());
                }
            }
        }

        let mut plan: Vec<TraitNodeId> = selected.into_iter().collect();
        plan.sort_by_key(|id| self.position[id.0]);
        Some(plan)
    }
}

/// Producer and consumer adjacency, indexed by node id.
fn build_edges(nodes: &[TraitNode]) -> (Vec<Vec<TraitNodeId>>, Vec<Vec<TraitNodeId>>) {
    let mut exact_targets: HashMap<FieldPath, Vec<TraitNodeId>> = HashMap::new();
    let mut targets_below: HashMap<FieldPath, Vec<TraitNodeId>> = HashMap::new();
    for node in nodes {
        let target = node.write_target();
        for prefix in target.prefixes() {
            targets_below.entry(prefix).or_default().push(node.id);
        }
        exact_targets.entry(target).or_default().push(node.id);
    }

    let mut producers = vec![Vec::new(); nodes.len()];
    let mut consumers = vec![Vec::new(); nodes.len()];

    for node in nodes {
        let mut found: BTreeSet<TraitNodeId> = BTreeSet::new();
        for dep in &node.deps {
            for prefix in dep.prefixes() {
                if let Some(ids) = exact_targets.get(&prefix) {
                    found.extend(ids.iter().copied());
                }
            }
            if let Some(ids) = targets_below.get(dep) {
                found.extend(ids.iter().copied());
            }
        }
        for producer in found {
            producers[node.id.0].push(producer);
            consumers[producer.0].push(node.id);
        }
    }

    (producers, consumers)
}

/// Kahn's algorithm; ready nodes are taken lowest declaration index first.
fn topological_order(
    nodes: &[TraitNode],
    producers: &[Vec<TraitNodeId>],
    consumers: &[Vec<TraitNodeId>],
) -> Option<Vec<TraitNodeId>> {
    let mut in_degree: Vec<usize> = producers.iter().map(Vec::len).collect();
    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(index, _)| Reverse(index))
        .collect();

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(Reverse(index)) = ready.pop() {
        order.push(TraitNodeId(index));
        for consumer in &consumers[index] {
            in_degree[consumer.0] -= 1;
            if in_degree[consumer.0] == 0 {
                ready.push(Reverse(consumer.0));
            }
        }
    }

    (order.len() == nodes.len()).then_some(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn plus_one(path: &str, dep: &str) -> TraitSpec {
        let dep_name = dep.to_string();
        TraitSpec::computed(path, [dep], move |inputs| {
            json!(inputs.get(&dep_name).and_then(Value::as_i64).unwrap_or(0) + 1)
        })
    }

    fn path(raw: &str) -> FieldPath {
        FieldPath::parse(raw).unwrap()
    }

    #[test]
    fn test_topological_order_respects_edges() {
        // Declared out of order on purpose.
        let graph = TraitGraph::compile(vec![
            plus_one("e", "d"),
            plus_one("d", "b"),
            TraitSpec::link("f", "e"),
        ])
        .unwrap();

        let order: Vec<String> = graph
            .topo_order()
            .iter()
            .map(|id| graph.node(*id).field_path.to_string())
            .collect();
        assert_eq!(order, vec!["d", "e", "f"]);
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_each_compile_gets_a_new_generation() {
        let first = TraitGraph::compile(vec![plus_one("d", "b")]).unwrap();
        let second = TraitGraph::compile(vec![plus_one("d", "b")]).unwrap();
        assert_ne!(first.generation(), second.generation());
        assert_ne!(TraitGraph::empty().generation(), TraitGraph::empty().generation());
    }

    #[test]
    fn test_cycle_rejected_with_code() {
        let errors = TraitGraph::compile(vec![plus_one("a", "b"), plus_one("b", "a")]).unwrap_err();
        assert!(errors.has_code("trait_cycle"));
        match &errors.0[0] {
            GraphError::TraitCycle { cycle } => {
                assert_eq!(cycle.first(), cycle.last());
                assert!(cycle.contains(&"a".to_string()));
                assert!(cycle.contains(&"b".to_string()));
            }
            other => panic!("Expected TraitCycle, got {:?}", other),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let errors = TraitGraph::compile(vec![plus_one("a", "a")]).unwrap_err();
        assert_eq!(
            errors.0,
            vec![GraphError::TraitCycle {
                cycle: vec!["a".to_string(), "a".to_string()]
            }]
        );
    }

    #[test]
    fn test_prefix_dependency_creates_edge() {
        // "summary" reads the whole profile object; "profile.full_name" is written below it.
        let graph = TraitGraph::compile(vec![
            TraitSpec::computed("summary", ["profile"], |_| json!("s")),
            TraitSpec::computed("profile.full_name", ["first"], |_| json!("n")),
        ])
        .unwrap();

        assert_eq!(graph.producers(TraitNodeId(0)), &[TraitNodeId(1)]);
        assert_eq!(graph.topo_order(), &[TraitNodeId(1), TraitNodeId(0)]);
    }

    #[test]
    fn test_duplicate_owner_rejected() {
        let errors = TraitGraph::compile(vec![plus_one("d", "a"), plus_one("d", "b")]).unwrap_err();
        assert!(errors.has_code("duplicate_field_owner"));
    }

    #[test]
    fn test_dependents_of_matches_both_directions() {
        let graph = TraitGraph::compile(vec![
            TraitSpec::computed("x", ["profile"], |_| json!(1)),
            TraitSpec::computed("y", ["profile.name"], |_| json!(1)),
            TraitSpec::computed("z", ["other"], |_| json!(1)),
        ])
        .unwrap();

        let from_leaf = graph.dependents_of(&path("profile.name.first"));
        assert_eq!(from_leaf.into_iter().collect::<Vec<_>>(), vec![TraitNodeId(0), TraitNodeId(1)]);

        let from_parent = graph.dependents_of(&path("profile"));
        assert_eq!(from_parent.into_iter().collect::<Vec<_>>(), vec![TraitNodeId(0), TraitNodeId(1)]);
    }

    #[test]
    fn test_closure_follows_written_paths() {
        let graph = TraitGraph::compile(vec![
            plus_one("c", "b"),
            plus_one("d", "c"),
            plus_one("unrelated", "q"),
        ])
        .unwrap();

        let mut dirty = DirtySet::new();
        dirty.mark(&path("b"));
        assert_eq!(graph.closure(&dirty), vec![TraitNodeId(0), TraitNodeId(1)]);
    }

    #[test]
    fn test_closure_dirty_all_is_everything() {
        let graph = TraitGraph::compile(vec![plus_one("c", "b"), plus_one("z", "q")]).unwrap();
        let mut dirty = DirtySet::new();
        dirty.mark_all();
        assert_eq!(graph.closure(&dirty).len(), 2);
    }

    #[test]
    fn test_closure_bounded_gives_up() {
        let specs: Vec<TraitSpec> = (0..100)
            .map(|i| plus_one(&format!("n{}", i + 1), &format!("n{}", i)))
            .collect();
        let graph = TraitGraph::compile(specs).unwrap();

        let mut dirty = DirtySet::new();
        dirty.mark(&path("n0"));
        assert!(graph.closure_bounded(&dirty, || true).is_none());
        assert_eq!(graph.closure_bounded(&dirty, || false).map(|p| p.len()), Some(100));
    }
}
