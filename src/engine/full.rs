// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::engine::evaluate::{sweep, SweepGate};
use crate::engine::{ConvergeMode, ConvergePass, ConvergeReport, ExecutedMode};
use crate::traits::Converger;

/// Evaluates every trait node in topological order, unconditionally.
///
/// Cost is O(|nodes|) per transaction. Always correct even when dependency
/// tracking elsewhere is imprecise, which makes it the safe default and the
/// `auto` fallback.
#[derive(Debug, Default, Clone, Copy)]
pub struct FullConverger;

impl FullConverger {
    pub fn new() -> Self {
        Self
    }

    pub(crate) fn run(&self, pass: &mut ConvergePass<'_>, requested: ConvergeMode) -> ConvergeReport {
        let graph = pass.graph;
        let stats = sweep(pass, graph.topo_order(), SweepGate::All);
        ConvergeReport::from_sweep(requested, ExecutedMode::Full, graph.len(), stats)
    }
}

impl Converger for FullConverger {
    fn name(&self) -> &'static str {
        "full"
    }

    fn mode(&self) -> ConvergeMode {
        ConvergeMode::Full
    }

    fn converge(&self, pass: &mut ConvergePass<'_>) -> ConvergeReport {
        self.run(pass, ConvergeMode::Full)
    }
}
