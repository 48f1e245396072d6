// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::engine::evaluate::{sweep, SweepGate};
use crate::engine::{ConvergeMode, ConvergePass, ConvergeReport, ExecutedMode};
use crate::graph::TraitNodeId;
use crate::traits::Converger;

/// Evaluates only what the dirty roots can reach.
///
/// The plan is the closure of the dirty roots over the reverse-dependency
/// index, sorted topologically. During the sweep a node runs only if one of
/// its deps is dirty at that moment; a node that changes its output marks
/// that path dirty for the nodes after it. The DAG guarantees one sweep is
/// enough, and each node is evaluated at most once.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirtyConverger;

impl DirtyConverger {
    pub fn new() -> Self {
        Self
    }

    pub(crate) fn run_plan(
        &self,
        pass: &mut ConvergePass<'_>,
        plan: &[TraitNodeId],
        requested: ConvergeMode,
    ) -> ConvergeReport {
        let total = pass.graph.len();
        let stats = sweep(pass, plan, SweepGate::DirtyDeps);
        ConvergeReport::from_sweep(requested, ExecutedMode::Dirty, total, stats)
    }
}

impl Converger for DirtyConverger {
    fn name(&self) -> &'static str {
        "dirty"
    }

    fn mode(&self) -> ConvergeMode {
        ConvergeMode::Dirty
    }

    fn converge(&self, pass: &mut ConvergePass<'_>) -> ConvergeReport {
        let plan = pass.graph.closure(pass.draft.dirty());
        self.run_plan(pass, &plan, ConvergeMode::Dirty)
    }
}
