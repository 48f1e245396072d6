// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Structural validation for trait declarations.
//!
//! The compiler runs three checks, in order, before it builds any index:
//!
//! 1. **Path Validation**: every target, dependency and link source parses as a
//!    [`FieldPath`]; no trait may own `$root`
//! 2. **Ownership Validation**: no two traits share a write target
//! 3. **Cycle Detection**: DFS over node edges, reporting the cycle as field paths
//!
//! Cycle detection needs a well-formed node set, so it is skipped when either
//! of the first two stages reported errors.
//!
//! # Cycle Detection Algorithm
//! **Depth-First Search with a recursion stack** ("three colors"):
//! - **White**: not yet explored
//! - **Gray**: on the current DFS path
//! - **Black**: fully explored
//!
//! Meeting a gray node closes a cycle; the path segment from that node to the
//! current one, plus the back edge, is the reported cycle.
//! - **Time Complexity**: O(V + E)
//! - **Space Complexity**: O(V)

use std::collections::{HashMap, HashSet};

use crate::errors::GraphError;
use crate::graph::{FieldPath, TraitEval, TraitNode, TraitNodeId, TraitSpec, TraitSpecEval};

/// Parses every declaration into a [`TraitNode`], accumulating path errors.
pub(crate) fn validate_paths(specs: Vec<TraitSpec>) -> Result<Vec<TraitNode>, Vec<GraphError>> {
    let mut nodes = Vec::with_capacity(specs.len());
    let mut errors = Vec::new();

    for (index, spec) in specs.into_iter().enumerate() {
        let field_path = match FieldPath::parse(&spec.field_path) {
            Ok(path) if path.is_root() => {
                errors.push(GraphError::RootTarget { declaration: index });
                continue;
            }
            Ok(path) => path,
            Err(source) => {
                errors.push(GraphError::InvalidFieldPath {
                    declaration: index,
                    source,
                });
                continue;
            }
        };

        let mut deps = Vec::with_capacity(spec.deps.len());
        let mut deps_ok = true;
        for raw in &spec.deps {
            match FieldPath::parse(raw) {
                Ok(dep) => {
                    if !deps.contains(&dep) {
                        deps.push(dep);
                    }
                }
                Err(source) => {
                    errors.push(GraphError::InvalidFieldPath {
                        declaration: index,
                        source,
                    });
                    deps_ok = false;
                }
            }
        }

        let eval = match spec.eval {
            TraitSpecEval::Computed { derive, equals } => TraitEval::Computed { derive, equals },
            TraitSpecEval::Source { key, resource } => TraitEval::Source { key, resource },
            TraitSpecEval::Check { validate } => TraitEval::Check { validate },
            TraitSpecEval::Link { from } => match FieldPath::parse(&from) {
                Ok(from) => TraitEval::Link { from },
                Err(source) => {
                    errors.push(GraphError::InvalidFieldPath {
                        declaration: index,
                        source,
                    });
                    continue;
                }
            },
        };

        if deps_ok {
            nodes.push(TraitNode {
                id: TraitNodeId(nodes.len()),
                field_path,
                deps,
                eval,
            });
        }
    }

    if errors.is_empty() {
        Ok(nodes)
    } else {
        Err(errors)
    }
}

/// Rejects write targets owned by more than one node.
///
/// Ownership is by write target, so `computed a` and `check a` coexist:
/// the check writes `errors.a`.
pub(crate) fn validate_unique_owners(nodes: &[TraitNode]) -> Result<(), Vec<GraphError>> {
    let mut owners: HashMap<FieldPath, Vec<usize>> = HashMap::new();
    let mut first_seen = Vec::new();

    for node in nodes {
        let target = node.write_target();
        let entry = owners.entry(target.clone()).or_default();
        if entry.is_empty() {
            first_seen.push(target);
        }
        entry.push(node.id.0);
    }

    let errors: Vec<GraphError> = first_seen
        .into_iter()
        .filter_map(|target| {
            let ids = owners.remove(&target)?;
            (ids.len() > 1).then(|| GraphError::DuplicateFieldOwner {
                field_path: target.to_string(),
                owners: ids,
            })
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Detects cycles over `edges` (producer -> consumers), visiting nodes in
/// declaration order so the reported cycle is deterministic.
pub(crate) fn validate_acyclic(
    nodes: &[TraitNode],
    edges: &[Vec<TraitNodeId>],
) -> Result<(), Vec<GraphError>> {
    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();
    let mut path = Vec::new();

    for node in nodes {
        if visited.contains(&node.id) {
            continue;
        }
        if let Some(cycle) =
            dfs_cycle_detection(node.id, edges, &mut visited, &mut rec_stack, &mut path)
        {
            let cycle = cycle
                .into_iter()
                .map(|id| nodes[id.0].field_path.to_string())
                .collect();
            return Err(vec![GraphError::TraitCycle { cycle }]);
        }
    }

    Ok(())
}

/// Three-color DFS returning the first cycle found from `node`.
///
/// For edges a → b → c → a starting at a:
/// path grows to [a, b, c]; the edge back to the gray node `a` closes the
/// cycle, giving [a, b, c, a].
fn dfs_cycle_detection(
    node: TraitNodeId,
    edges: &[Vec<TraitNodeId>],
    visited: &mut HashSet<TraitNodeId>,
    rec_stack: &mut HashSet<TraitNodeId>,
    path: &mut Vec<TraitNodeId>,
) -> Option<Vec<TraitNodeId>> {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node);

    for &neighbor in &edges[node.0] {
        if !visited.contains(&neighbor) {
            if let Some(cycle) = dfs_cycle_detection(neighbor, edges, visited, rec_stack, path) {
                return Some(cycle);
            }
        } else if rec_stack.contains(&neighbor) {
            let cycle_start = path.iter().position(|id| *id == neighbor).unwrap_or(0);
            let mut cycle = path[cycle_start..].to_vec();
            cycle.push(neighbor);
            return Some(cycle);
        }
    }

    rec_stack.remove(&node);
    path.pop();
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn computed(path: &str, deps: Vec<&str>) -> TraitSpec {
        TraitSpec::computed(path, deps, |_| json!(null))
    }

    #[test]
    fn test_valid_paths_compile_to_nodes() {
        let nodes = validate_paths(vec![computed("d", vec!["b"]), TraitSpec::link("e", "d")]).unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[1].id, TraitNodeId(1));
    }

    #[test]
    fn test_invalid_paths_accumulate() {
        let errors = validate_paths(vec![
            computed("items[0]", vec!["b"]),
            computed("ok", vec!["list.3"]),
            computed("$root", vec!["b"]),
        ])
        .unwrap_err();

        assert_eq!(errors.len(), 3);
        assert!(matches!(errors[0], GraphError::InvalidFieldPath { declaration: 0, .. }));
        assert!(matches!(errors[1], GraphError::InvalidFieldPath { declaration: 1, .. }));
        assert!(matches!(errors[2], GraphError::RootTarget { declaration: 2 }));
    }

    #[test]
    fn test_duplicate_owner_detected() {
        let nodes = validate_paths(vec![
            computed("d", vec!["a"]),
            computed("d", vec!["b"]),
        ])
        .unwrap();

        let errors = validate_unique_owners(&nodes).unwrap_err();
        assert_eq!(errors.len(), 1);
        match &errors[0] {
            GraphError::DuplicateFieldOwner { field_path, owners } => {
                assert_eq!(field_path, "d");
                assert_eq!(owners, &vec![0, 1]);
            }
            other => panic!("Expected DuplicateFieldOwner, got {:?}", other),
        }
    }

    #[test]
    fn test_check_and_computed_on_same_field_do_not_conflict() {
        let nodes = validate_paths(vec![
            computed("email", vec!["raw"]),
            TraitSpec::check("email", ["email"], |_| None),
        ])
        .unwrap();
        assert!(validate_unique_owners(&nodes).is_ok());
    }

    #[test]
    fn test_cycle_path_is_reported() {
        let nodes = validate_paths(vec![computed("a", vec!["b"]), computed("b", vec!["a"])]).unwrap();
        // a produces for b, b produces for a
        let edges = vec![vec![TraitNodeId(1)], vec![TraitNodeId(0)]];

        let errors = validate_acyclic(&nodes, &edges).unwrap_err();
        assert_eq!(
            errors[0],
            GraphError::TraitCycle {
                cycle: vec!["a".to_string(), "b".to_string(), "a".to_string()]
            }
        );
        assert_eq!(errors[0].code(), "trait_cycle");
    }

    #[test]
    fn test_acyclic_chain_passes() {
        let nodes = validate_paths(vec![computed("b", vec!["a"]), computed("c", vec!["b"])]).unwrap();
        let edges = vec![vec![TraitNodeId(1)], vec![]];
        assert!(validate_acyclic(&nodes, &edges).is_ok());
    }
}
