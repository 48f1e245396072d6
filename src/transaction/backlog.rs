// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Queue of write requests waiting for a module's writer lane.
//!
//! Requests come in two shapes:
//!
//! * **Open** - a caller waiting for a [`TransactionHandle`](crate::transaction::TransactionHandle)
//!   it will drive itself
//! * **Batch** - one or more synchronous write bodies that run back to back
//!   in a single transaction when the lane is handed over
//!
//! A new body whose origin equals a pending batch's origin joins that batch
//! instead of queueing on its own (coalescing). With dual lanes, urgent
//! requests are served before non-urgent ones; each lane is FIFO.
//!
//! Requests whose callers gave up (cancelled token, dropped future) stay in
//! the queue until they reach the front, where they are discarded and counted
//! as canceled.
//!
//! # Examples
//!
//! Callers never see the backlog directly; they observe it through
//! [`BacklogSnapshot`]:
//!
//! ```rust
//! use the_statewood::transaction::BacklogSnapshot;
//!
//! let idle = BacklogSnapshot::default();
//! assert_eq!(idle.pending_count, 0);
//! assert!(idle.reasons.is_empty());
//! ```

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::{json, Value};

use crate::engine::as_millis;
use crate::transaction::{TxnLane, TxnOrigin};

/// Observable description of the requests queued behind the lane.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BacklogSnapshot {
    /// Queued requests, counting each coalesced body
    pub pending_count: usize,
    /// How long the oldest request has waited
    #[serde(skip)]
    pub age: Duration,
    /// Bodies merged into an existing batch so far
    pub coalesced_count: u64,
    /// Requests discarded because their caller gave up
    pub canceled_count: u64,
    /// Origins of the queued requests, front first
    pub reasons: Vec<String>,
}

impl BacklogSnapshot {
    pub fn to_diagnostic_payload(&self) -> Value {
        json!({
            "pendingCount": self.pending_count,
            "ageMs": as_millis(self.age),
            "coalescedCount": self.coalesced_count,
            "canceledCount": self.canceled_count,
            "reasons": self.reasons,
        })
    }
}

/// How the backlog orders and merges requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanePolicy {
    /// Serve urgent requests before non-urgent ones
    pub dual_lanes: bool,
    pub allow_coalesce: bool,
    /// Requests beyond this are rejected with `BacklogFull`
    pub capacity: usize,
}

/// A queued request whose caller may have given up.
pub(crate) trait Waiter {
    fn is_abandoned(&self) -> bool;
}

pub(crate) enum Request<O, B> {
    Open(O),
    Batch(Vec<B>),
}

pub(crate) struct Entry<O, B> {
    pub origin: TxnOrigin,
    pub enqueued_at: Instant,
    pub request: Request<O, B>,
}

impl<O, B> Entry<O, B> {
    fn weight(&self) -> usize {
        match &self.request {
            Request::Open(_) => 1,
            Request::Batch(bodies) => bodies.len(),
        }
    }
}

/// Where an accepted body ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Queued {
    New { pending: usize },
    Coalesced { batch_size: usize, pending: usize },
}

pub(crate) struct Backlog<O, B> {
    policy: LanePolicy,
    urgent: VecDeque<Entry<O, B>>,
    non_urgent: VecDeque<Entry<O, B>>,
    pending: usize,
    coalesced: u64,
    canceled: u64,
}

impl<O: Waiter, B: Waiter> Backlog<O, B> {
    pub fn new(policy: LanePolicy) -> Self {
        Self {
            policy,
            urgent: VecDeque::new(),
            non_urgent: VecDeque::new(),
            pending: 0,
            coalesced: 0,
            canceled: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.pending
    }

    pub fn is_full(&self) -> bool {
        self.pending >= self.policy.capacity
    }

    fn lane_for(&mut self, origin: &TxnOrigin) -> &mut VecDeque<Entry<O, B>> {
        if self.policy.dual_lanes && origin.lane() == TxnLane::NonUrgent {
            &mut self.non_urgent
        } else {
            &mut self.urgent
        }
    }

    /// Queues a caller waiting for its own handle. Never coalesced.
    pub fn push_open(&mut self, origin: TxnOrigin, waiter: O) -> usize {
        let entry = Entry {
            origin: origin.clone(),
            enqueued_at: Instant::now(),
            request: Request::Open(waiter),
        };
        self.lane_for(&origin).push_back(entry);
        self.pending += 1;
        self.pending
    }

    /// Queues a write body, merging it into a pending batch with the same
    /// origin when coalescing is allowed.
    pub fn push_body(&mut self, origin: TxnOrigin, body: B) -> Queued {
        let allow_coalesce = self.policy.allow_coalesce;
        let lane = self.lane_for(&origin);

        if allow_coalesce {
            let existing = lane.iter_mut().find_map(|entry| match &mut entry.request {
                Request::Batch(bodies) if entry.origin == origin => Some(bodies),
                _ => None,
            });
            if let Some(bodies) = existing {
                bodies.push(body);
                let batch_size = bodies.len();
                self.pending += 1;
                self.coalesced += 1;
                return Queued::Coalesced {
                    batch_size,
                    pending: self.pending,
                };
            }
        }

        lane.push_back(Entry {
            origin,
            enqueued_at: Instant::now(),
            request: Request::Batch(vec![body]),
        });
        self.pending += 1;
        Queued::New {
            pending: self.pending,
        }
    }

    /// Next live request, urgent lane first. Abandoned requests (and abandoned
    /// bodies inside a batch) are discarded on the way.
    pub fn pop_next(&mut self) -> Option<Entry<O, B>> {
        loop {
            let mut entry = self.urgent.pop_front().or_else(|| self.non_urgent.pop_front())?;
            self.pending -= entry.weight();

            match &mut entry.request {
                Request::Open(waiter) => {
                    if waiter.is_abandoned() {
                        self.canceled += 1;
                        continue;
                    }
                }
                Request::Batch(bodies) => {
                    let before = bodies.len();
                    bodies.retain(|body| !body.is_abandoned());
                    self.canceled += (before - bodies.len()) as u64;
                    if bodies.is_empty() {
                        continue;
                    }
                }
            }
            return Some(entry);
        }
    }

    /// Counts a request that was handed out but then found abandoned.
    pub fn note_canceled(&mut self, count: usize) {
        self.canceled += count as u64;
    }

    /// Removes every queued request; dropping them disconnects their callers.
    pub fn drain(&mut self) -> Vec<Entry<O, B>> {
        self.pending = 0;
        self.urgent.drain(..).chain(self.non_urgent.drain(..)).collect()
    }

    pub fn oldest_age(&self) -> Duration {
        self.urgent
            .front()
            .into_iter()
            .chain(self.non_urgent.front())
            .map(|entry| entry.enqueued_at.elapsed())
            .max()
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> BacklogSnapshot {
        let reasons = self
            .urgent
            .iter()
            .chain(self.non_urgent.iter())
            .map(|entry| entry.origin.to_string())
            .collect();
        BacklogSnapshot {
            pending_count: self.pending,
            age: self.oldest_age(),
            coalesced_count: self.coalesced,
            canceled_count: self.canceled,
            reasons,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[derive(Clone)]
    struct Probe {
        tag: &'static str,
        gone: Arc<AtomicBool>,
    }

    impl Probe {
        fn new(tag: &'static str) -> Self {
            Self {
                tag,
                gone: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl Waiter for Probe {
        fn is_abandoned(&self) -> bool {
            self.gone.load(Ordering::SeqCst)
        }
    }

    fn policy(dual_lanes: bool, allow_coalesce: bool) -> LanePolicy {
        LanePolicy {
            dual_lanes,
            allow_coalesce,
            capacity: 8,
        }
    }

    fn tags(entry: &Entry<Probe, Probe>) -> Vec<&'static str> {
        match &entry.request {
            Request::Open(probe) => vec![probe.tag],
            Request::Batch(bodies) => bodies.iter().map(|b| b.tag).collect(),
        }
    }

    #[test]
    fn test_same_origin_bodies_coalesce() {
        let mut backlog: Backlog<Probe, Probe> = Backlog::new(policy(true, true));
        backlog.push_body(TxnOrigin::dispatch("inc"), Probe::new("a"));
        backlog.push_body(TxnOrigin::dispatch("other"), Probe::new("b"));
        let queued = backlog.push_body(TxnOrigin::dispatch("inc"), Probe::new("c"));

        assert_eq!(queued, Queued::Coalesced { batch_size: 2, pending: 3 });
        let first = backlog.pop_next().unwrap();
        assert_eq!(tags(&first), vec!["a", "c"]);
        assert_eq!(tags(&backlog.pop_next().unwrap()), vec!["b"]);
        assert_eq!(backlog.snapshot().coalesced_count, 1);
        assert_eq!(backlog.len(), 0);
    }

    #[test]
    fn test_coalescing_disabled_keeps_fifo() {
        let mut backlog: Backlog<Probe, Probe> = Backlog::new(policy(false, false));
        backlog.push_body(TxnOrigin::dispatch("inc"), Probe::new("a"));
        backlog.push_body(TxnOrigin::dispatch("inc"), Probe::new("b"));

        assert_eq!(backlog.len(), 2);
        assert_eq!(tags(&backlog.pop_next().unwrap()), vec!["a"]);
        assert_eq!(tags(&backlog.pop_next().unwrap()), vec!["b"]);
    }

    #[test]
    fn test_urgent_lane_first() {
        let mut backlog: Backlog<Probe, Probe> = Backlog::new(policy(true, true));
        backlog.push_body(TxnOrigin::source_refresh("user"), Probe::new("refresh"));
        backlog.push_open(TxnOrigin::task_pending("save"), Probe::new("open"));

        assert_eq!(tags(&backlog.pop_next().unwrap()), vec!["open"]);
        assert_eq!(tags(&backlog.pop_next().unwrap()), vec!["refresh"]);
    }

    #[test]
    fn test_single_lane_ignores_urgency() {
        let mut backlog: Backlog<Probe, Probe> = Backlog::new(policy(false, true));
        backlog.push_body(TxnOrigin::source_refresh("user"), Probe::new("refresh"));
        backlog.push_open(TxnOrigin::task_pending("save"), Probe::new("open"));

        assert_eq!(tags(&backlog.pop_next().unwrap()), vec!["refresh"]);
    }

    #[test]
    fn test_abandoned_requests_are_skipped_and_counted() {
        let mut backlog: Backlog<Probe, Probe> = Backlog::new(policy(true, true));
        let gone = Probe::new("gone");
        gone.gone.store(true, Ordering::SeqCst);
        backlog.push_open(TxnOrigin::custom("x"), gone.clone());
        backlog.push_body(TxnOrigin::dispatch("inc"), gone);
        backlog.push_body(TxnOrigin::dispatch("inc"), Probe::new("live"));

        let entry = backlog.pop_next().unwrap();
        assert_eq!(tags(&entry), vec!["live"]);
        assert_eq!(backlog.snapshot().canceled_count, 2);
        assert!(backlog.pop_next().is_none());
    }

    #[test]
    fn test_capacity_and_snapshot() {
        let mut backlog: Backlog<Probe, Probe> = Backlog::new(LanePolicy {
            dual_lanes: true,
            allow_coalesce: false,
            capacity: 2,
        });
        backlog.push_body(TxnOrigin::dispatch("a"), Probe::new("a"));
        assert!(!backlog.is_full());
        backlog.push_open(TxnOrigin::task_pending("b"), Probe::new("b"));
        assert!(backlog.is_full());

        let snapshot = backlog.snapshot();
        assert_eq!(snapshot.pending_count, 2);
        assert_eq!(snapshot.reasons, vec!["dispatch:a", "task:pending:b"]);
    }
}
