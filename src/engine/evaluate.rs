// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Per-kind trait evaluation and the topologically ordered sweep shared by
//! every converger.

use std::time::Duration;

use serde_json::Value;

use crate::engine::source::{SourceRefresh, SourceSnapshot, SourceStatus};
use crate::engine::{ConvergePass, Hotspot};
use crate::graph::{FieldPath, TraitEval, TraitInputs, TraitNode, TraitNodeId};
use crate::state::{Draft, PatchReason};

/// Which planned nodes a sweep actually evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SweepGate {
    /// Every node in the plan
    All,
    /// Only nodes with a dep that is dirty when the sweep reaches them
    DirtyDeps,
}

#[derive(Debug, Default)]
pub(crate) struct SweepStats {
    pub planned: usize,
    pub evaluated: usize,
    pub changed: usize,
    pub skipped: usize,
    pub incomplete: bool,
    pub duration: Duration,
    pub hotspots: Vec<Hotspot>,
    pub refreshes: Vec<SourceRefresh>,
}

const HOTSPOT_LIMIT: usize = 3;

/// Evaluates `plan` in order, stopping when the converge budget runs out.
pub(crate) fn sweep(pass: &mut ConvergePass<'_>, plan: &[TraitNodeId], gate: SweepGate) -> SweepStats {
    let graph = pass.graph;
    let clock = pass.budget.clock.clone();
    let started = clock.now();
    let mut stats = SweepStats {
        planned: plan.len(),
        ..SweepStats::default()
    };

    for (step, id) in plan.iter().enumerate() {
        if clock.now().saturating_sub(started) > pass.budget.converge {
            stats.incomplete = true;
            stats.skipped += plan.len() - step;
            break;
        }

        let node = graph.node(*id);
        if gate == SweepGate::DirtyDeps && !node.deps.iter().any(|dep| pass.draft.dirty().overlaps(dep)) {
            stats.skipped += 1;
            continue;
        }

        let node_started = pass.collect_hotspots.then(|| clock.now());
        let changed = evaluate_node(node, pass.draft, step, &mut stats.refreshes);
        stats.evaluated += 1;
        if changed {
            stats.changed += 1;
        }

        if let Some(node_started) = node_started {
            record_hotspot(&mut stats.hotspots, node, clock.now().saturating_sub(node_started));
        }
    }

    stats.duration = clock.now().saturating_sub(started);
    stats
}

fn record_hotspot(hotspots: &mut Vec<Hotspot>, node: &TraitNode, duration: Duration) {
    hotspots.push(Hotspot {
        node_id: node.id,
        field_path: node.field_path.clone(),
        kind: node.kind(),
        duration,
    });
    hotspots.sort_by(|a, b| b.duration.cmp(&a.duration));
    hotspots.truncate(HOTSPOT_LIMIT);
}

/// Evaluates one node against the draft. Returns whether it wrote a patch.
pub(crate) fn evaluate_node(
    node: &TraitNode,
    draft: &mut Draft,
    step: usize,
    refreshes: &mut Vec<SourceRefresh>,
) -> bool {
    match &node.eval {
        TraitEval::Computed { derive, equals } => {
            let next = derive(&TraitInputs::new(draft.state(), &node.deps));
            let unchanged = match (draft.get(&node.field_path), equals) {
                (Some(previous), Some(equals)) => equals(previous, &next),
                (Some(previous), None) => previous == &next,
                (None, _) => false,
            };
            if unchanged {
                return false;
            }
            write(draft, node, node.field_path.clone(), Some(next), PatchReason::TraitComputed, step)
        }
        TraitEval::Link { from } => {
            let next = draft.get(from).cloned().unwrap_or(Value::Null);
            if draft.get(&node.field_path) == Some(&next) {
                return false;
            }
            write(draft, node, node.field_path.clone(), Some(next), PatchReason::TraitLink, step)
        }
        TraitEval::Check { validate } => {
            let result = validate(&TraitInputs::new(draft.state(), &node.deps));
            let target = node.write_target();
            if draft.get(&target) == result.as_ref() {
                return false;
            }
            write(draft, node, target, result, PatchReason::TraitCheck, step)
        }
        TraitEval::Source { key, resource } => {
            let key = key(&TraitInputs::new(draft.state(), &node.deps));
            let current = draft.get(&node.field_path).and_then(SourceSnapshot::from_value);

            match key {
                None => {
                    if current.as_ref().map(|s| s.status) == Some(SourceStatus::Idle) {
                        return false;
                    }
                    let idle = SourceSnapshot::idle().to_value();
                    write(draft, node, node.field_path.clone(), Some(idle), PatchReason::TraitSource, step)
                }
                Some(key) => {
                    let same_key = current
                        .as_ref()
                        .is_some_and(|s| s.status != SourceStatus::Idle && s.key.as_ref() == Some(&key));
                    if same_key {
                        return false;
                    }
                    let previous_data = current.and_then(|s| s.data);
                    let loading = SourceSnapshot::loading(key.clone(), previous_data).to_value();
                    refreshes.push(SourceRefresh {
                        node_id: node.id,
                        field_path: node.field_path.clone(),
                        key,
                        resource: resource.clone(),
                    });
                    write(draft, node, node.field_path.clone(), Some(loading), PatchReason::TraitSource, step)
                }
            }
        }
    }
}

fn write(
    draft: &mut Draft,
    node: &TraitNode,
    target: FieldPath,
    to: Option<Value>,
    reason: PatchReason,
    step: usize,
) -> bool {
    let from = draft.get(&target).cloned();
    draft.record(target, from, to, reason, Some(node.id), Some(step));
    true
}
