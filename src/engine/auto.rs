// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Cost-based selection between `full` and `dirty` per transaction.
//!
//! # Decision Procedure
//!
//! 1. First transaction of the module → `full` (`coldStart`)
//! 2. Whole state dirty → `full` (`dirtyAll`)
//! 3. No dirty roots or no traits → empty `dirty` plan
//! 4. Dirty roots already cover most of the graph → `full` (`nearFull`)
//! 5. Plan from the cache of recent dirty-root sets (`cacheHit`), or from a
//!    closure walk bounded by the decision budget (`cacheMiss`); running out
//!    of budget → `full` (`decisionBudgetExceeded`)
//! 6. Plan covering most of the graph → `full` (`nearFull`), otherwise `dirty`
//!
//! The near-full root threshold drops for large graphs, where a full sweep
//! is the cheaper bet sooner.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use crate::engine::{
    ConvergeDecision, ConvergeMode, ConvergePass, ConvergeReport, DecisionReason, DirtyConverger,
    FullConverger,
};
use crate::graph::{TraitGraph, TraitNodeId};
use crate::traits::Converger;

/// Plan ratio at or above which a full sweep is chosen.
pub const NEAR_FULL_PLAN_RATIO: f64 = 0.9;

/// Recent dirty-root plans kept for reuse.
pub const PLAN_CACHE_CAPACITY: usize = 128;

/// Dirty-root ratio at or above which a full sweep is chosen.
pub fn near_full_root_ratio_threshold(step_count: usize) -> f64 {
    match step_count {
        n if n >= 1536 => 0.65,
        n if n >= 1024 => 0.7,
        n if n >= 512 => 0.75,
        _ => 0.9,
    }
}

#[derive(Debug, Default)]
struct PlanCache {
    graph_generation: u64,
    plans: HashMap<String, Arc<[TraitNodeId]>>,
    insertion_order: VecDeque<String>,
    hits: u64,
    misses: u64,
}

impl PlanCache {
    fn bind(&mut self, graph: &TraitGraph) {
        if self.graph_generation != graph.generation() {
            self.graph_generation = graph.generation();
            self.plans.clear();
            self.insertion_order.clear();
        }
    }

    fn get(&mut self, key: &str) -> Option<Arc<[TraitNodeId]>> {
        let plan = self.plans.get(key).cloned();
        match plan {
            Some(_) => self.hits += 1,
            None => self.misses += 1,
        }
        plan
    }

    fn insert(&mut self, key: String, plan: Arc<[TraitNodeId]>) {
        if self.plans.len() >= PLAN_CACHE_CAPACITY {
            if let Some(oldest) = self.insertion_order.pop_front() {
                self.plans.remove(&oldest);
            }
        }
        self.insertion_order.push_back(key.clone());
        self.plans.insert(key, plan);
    }
}

enum Choice {
    Full(DecisionReason),
    Dirty(DecisionReason, Arc<[TraitNodeId]>),
}

/// Picks `full` or `dirty` per transaction; see the module docs.
#[derive(Debug, Default)]
pub struct AutoConverger {
    full: FullConverger,
    dirty: DirtyConverger,
    cache: Mutex<PlanCache>,
}

impl AutoConverger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plan-cache (hits, misses) so far.
    pub fn cache_stats(&self) -> (u64, u64) {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        (cache.hits, cache.misses)
    }

    fn decide(&self, pass: &ConvergePass<'_>) -> Choice {
        let graph = pass.graph;
        let dirty = pass.draft.dirty();
        let total = graph.len();

        if pass.txn_seq <= 1 {
            return Choice::Full(DecisionReason::ColdStart);
        }
        if dirty.is_dirty_all() {
            return Choice::Full(DecisionReason::DirtyAll);
        }
        if total == 0 {
            return Choice::Dirty(DecisionReason::EmptyGraph, Arc::from(Vec::new()));
        }
        if dirty.is_empty() {
            return Choice::Dirty(DecisionReason::NoDirtyRoots, Arc::from(Vec::new()));
        }

        let root_ratio = dirty.len() as f64 / total as f64;
        if root_ratio >= near_full_root_ratio_threshold(total) {
            return Choice::Full(DecisionReason::NearFull);
        }

        let key = dirty.cache_key();
        let cached = {
            let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            cache.bind(graph);
            cache.get(&key)
        };

        let (plan, reason) = match cached {
            Some(plan) => (plan, DecisionReason::CacheHit),
            None => {
                let clock = pass.budget.clock.clone();
                let started = clock.now();
                let limit = pass.budget.decision;
                let walked = graph.closure_bounded(dirty, || clock.now().saturating_sub(started) > limit);
                let Some(plan) = walked else {
                    return Choice::Full(DecisionReason::DecisionBudgetExceeded);
                };
                let plan: Arc<[TraitNodeId]> = Arc::from(plan);
                self.cache
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(key, plan.clone());
                (plan, DecisionReason::CacheMiss)
            }
        };

        if plan.len() as f64 / total as f64 >= NEAR_FULL_PLAN_RATIO {
            return Choice::Full(DecisionReason::NearFull);
        }
        Choice::Dirty(reason, plan)
    }
}

impl Converger for AutoConverger {
    fn name(&self) -> &'static str {
        "auto"
    }

    fn mode(&self) -> ConvergeMode {
        ConvergeMode::Auto
    }

    fn converge(&self, pass: &mut ConvergePass<'_>) -> ConvergeReport {
        let clock = pass.budget.clock.clone();
        let decision_started = clock.now();
        let choice = self.decide(pass);
        let decision_duration = clock.now().saturating_sub(decision_started);

        let (mut report, reason) = match choice {
            Choice::Full(reason) => (self.full.run(pass, ConvergeMode::Auto), reason),
            Choice::Dirty(reason, plan) => (self.dirty.run_plan(pass, &plan, ConvergeMode::Auto), reason),
        };

        report.decision = Some(ConvergeDecision {
            mode_used: report.executed,
            decision_duration,
            cutoff: reason == DecisionReason::DecisionBudgetExceeded,
            reason,
        });
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_near_full_threshold_drops_for_large_graphs() {
        assert_eq!(near_full_root_ratio_threshold(10), 0.9);
        assert_eq!(near_full_root_ratio_threshold(512), 0.75);
        assert_eq!(near_full_root_ratio_threshold(1024), 0.7);
        assert_eq!(near_full_root_ratio_threshold(4096), 0.65);
    }
}
