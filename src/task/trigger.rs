// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Trigger streams feeding task runners.
//!
//! A [`TriggerStream`] is pulled by exactly one runner. Combinators wrap the
//! underlying source and run before the policy boundary, so an occurrence
//! removed by `filter`, `debounce` or `throttle` never counts as dropped.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{self, Instant, MissedTickBehavior};

#[async_trait]
trait TriggerSource<T>: Send {
    async fn next(&mut self) -> Option<T>;
}

/// Pull-based stream of trigger occurrences.
pub struct TriggerStream<T> {
    source: Box<dyn TriggerSource<T>>,
}

impl<T: Send + 'static> TriggerStream<T> {
    fn from_source<S: TriggerSource<T> + 'static>(source: S) -> Self {
        Self {
            source: Box::new(source),
        }
    }

    /// A stream fed by hand through the returned sender.
    pub fn channel(capacity: usize) -> (mpsc::Sender<T>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self::from_source(ChannelSource { rx }))
    }

    /// Waits for the next occurrence. `None` once the source is exhausted.
    ///
    /// Cancel-safe: dropping the future before it resolves loses no
    /// occurrence, so runners can race it in `select!`.
    pub async fn recv(&mut self) -> Option<T> {
        self.source.next().await
    }

    pub fn filter<F>(self, predicate: F) -> Self
    where
        F: FnMut(&T) -> bool + Send + 'static,
    {
        Self::from_source(Filter {
            inner: self,
            predicate,
        })
    }

    pub fn map<U, F>(self, f: F) -> TriggerStream<U>
    where
        U: Send + 'static,
        F: FnMut(T) -> U + Send + 'static,
    {
        TriggerStream::from_source(Map { inner: self, f })
    }

    /// Emits the last occurrence once `window` passes without a new one.
    pub fn debounce(self, window: Duration) -> Self {
        Self::from_source(Debounce {
            inner: self,
            window,
            pending: None,
            deadline: None,
            exhausted: false,
        })
    }

    /// Leading edge: emits an occurrence, then ignores others for `window`.
    pub fn throttle(self, window: Duration) -> Self {
        Self::from_source(Throttle {
            inner: self,
            window,
            last: None,
        })
    }
}

impl<T: Clone + Send + 'static> TriggerStream<T> {
    /// Follows a broadcast channel. Lagged occurrences are skipped.
    pub fn from_broadcast(rx: broadcast::Receiver<T>) -> Self {
        Self::from_source(BroadcastSource { rx })
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> TriggerStream<T> {
    /// Emits `selector(state)` each time a committed state changes it.
    /// The value at subscription time is the baseline and is not emitted.
    pub fn from_state<F>(mut rx: watch::Receiver<Arc<Value>>, selector: F) -> Self
    where
        F: Fn(&Value) -> T + Send + Sync + 'static,
    {
        let last = selector(&rx.borrow_and_update());
        Self::from_source(Selector { rx, selector, last })
    }
}

impl TriggerStream<u64> {
    /// Ticks every `period`, starting after the first period. Yields the
    /// tick number.
    pub fn interval(period: Duration) -> Self {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self::from_source(IntervalSource { interval, ticks: 0 })
    }
}

struct ChannelSource<T> {
    rx: mpsc::Receiver<T>,
}

#[async_trait]
impl<T: Send> TriggerSource<T> for ChannelSource<T> {
    async fn next(&mut self) -> Option<T> {
        self.rx.recv().await
    }
}

struct BroadcastSource<T> {
    rx: broadcast::Receiver<T>,
}

#[async_trait]
impl<T: Clone + Send> TriggerSource<T> for BroadcastSource<T> {
    async fn next(&mut self) -> Option<T> {
        loop {
            match self.rx.recv().await {
                Ok(item) => return Some(item),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "trigger stream lagged behind its source");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

struct Selector<T, F> {
    rx: watch::Receiver<Arc<Value>>,
    selector: F,
    last: T,
}

#[async_trait]
impl<T, F> TriggerSource<T> for Selector<T, F>
where
    T: Clone + PartialEq + Send + Sync,
    F: Fn(&Value) -> T + Send + Sync,
{
    async fn next(&mut self) -> Option<T> {
        loop {
            self.rx.changed().await.ok()?;
            let state = self.rx.borrow_and_update().clone();
            let selected = (self.selector)(&state);
            if selected != self.last {
                self.last = selected.clone();
                return Some(selected);
            }
        }
    }
}

struct IntervalSource {
    interval: time::Interval,
    ticks: u64,
}

#[async_trait]
impl TriggerSource<u64> for IntervalSource {
    async fn next(&mut self) -> Option<u64> {
        self.interval.tick().await;
        self.ticks += 1;
        Some(self.ticks)
    }
}

struct Filter<T, F> {
    inner: TriggerStream<T>,
    predicate: F,
}

#[async_trait]
impl<T, F> TriggerSource<T> for Filter<T, F>
where
    T: Send + 'static,
    F: FnMut(&T) -> bool + Send,
{
    async fn next(&mut self) -> Option<T> {
        loop {
            let item = self.inner.recv().await?;
            if (self.predicate)(&item) {
                return Some(item);
            }
        }
    }
}

struct Map<T, F> {
    inner: TriggerStream<T>,
    f: F,
}

#[async_trait]
impl<T, U, F> TriggerSource<U> for Map<T, F>
where
    T: Send + 'static,
    U: Send + 'static,
    F: FnMut(T) -> U + Send,
{
    async fn next(&mut self) -> Option<U> {
        let item = self.inner.recv().await?;
        Some((self.f)(item))
    }
}

/// Keeps the pending occurrence and its deadline on the struct, so a
/// `next()` dropped mid-window resumes where it left off.
struct Debounce<T> {
    inner: TriggerStream<T>,
    window: Duration,
    pending: Option<T>,
    deadline: Option<Instant>,
    exhausted: bool,
}

#[async_trait]
impl<T: Send + 'static> TriggerSource<T> for Debounce<T> {
    async fn next(&mut self) -> Option<T> {
        loop {
            if self.exhausted {
                // Flush the trailing occurrence before ending.
                return self.pending.take();
            }
            let Some(deadline) = self.deadline else {
                let item = self.inner.recv().await?;
                self.pending = Some(item);
                self.deadline = Some(Instant::now() + self.window);
                continue;
            };
            tokio::select! {
                next = self.inner.recv() => match next {
                    Some(item) => {
                        self.pending = Some(item);
                        self.deadline = Some(Instant::now() + self.window);
                    }
                    None => {
                        self.exhausted = true;
                        self.deadline = None;
                    }
                },
                _ = time::sleep_until(deadline) => {
                    self.deadline = None;
                    return self.pending.take();
                }
            }
        }
    }
}

/// Cancel-safe: an occurrence is consumed and judged without awaiting.
struct Throttle<T> {
    inner: TriggerStream<T>,
    window: Duration,
    last: Option<Instant>,
}

#[async_trait]
impl<T: Send + 'static> TriggerSource<T> for Throttle<T> {
    async fn next(&mut self) -> Option<T> {
        loop {
            let item = self.inner.recv().await?;
            let now = Instant::now();
            let open = self
                .last
                .map_or(true, |last| now.duration_since(last) >= self.window);
            if open {
                self.last = Some(now);
                return Some(item);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_filter_and_map() {
        let (tx, stream) = TriggerStream::channel(8);
        let mut stream = stream.filter(|n: &i32| n % 2 == 0).map(|n| n * 10);
        for n in 1..=4 {
            tx.send(n).await.unwrap();
        }
        drop(tx);

        assert_eq!(stream.recv().await, Some(20));
        assert_eq!(stream.recv().await, Some(40));
        assert_eq!(stream.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_keeps_last_of_burst() {
        let (tx, stream) = TriggerStream::channel(8);
        let mut stream = stream.debounce(Duration::from_millis(50));
        for n in 1..=3 {
            tx.send(n).await.unwrap();
        }

        assert_eq!(stream.recv().await, Some(3));

        tx.send(4).await.unwrap();
        drop(tx);
        assert_eq!(stream.recv().await, Some(4));
        assert_eq!(stream.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_survives_dropped_recv() {
        let (tx, stream) = TriggerStream::channel(8);
        let mut stream = stream.debounce(Duration::from_millis(100));
        tx.send(1).await.unwrap();

        assert!(time::timeout(Duration::from_millis(30), stream.recv()).await.is_err());
        assert_eq!(stream.recv().await, Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_takes_leading_edge() {
        let (tx, stream) = TriggerStream::channel(8);
        let mut stream = stream.throttle(Duration::from_millis(100));

        tx.send(1).await.unwrap();
        tx.send(2).await.unwrap();
        assert_eq!(stream.recv().await, Some(1));
        assert!(time::timeout(Duration::from_millis(10), stream.recv()).await.is_err());

        time::advance(Duration::from_millis(150)).await;
        tx.send(3).await.unwrap();
        assert_eq!(stream.recv().await, Some(3));
    }

    #[tokio::test]
    async fn test_state_selector_emits_only_changes() {
        let (tx, rx) = watch::channel(Arc::new(json!({"q": "a", "n": 0})));
        let mut stream = TriggerStream::from_state(rx, |state| state["q"].clone());

        tx.send_replace(Arc::new(json!({"q": "a", "n": 1})));
        tx.send_replace(Arc::new(json!({"q": "b", "n": 1})));
        drop(tx);

        assert_eq!(stream.recv().await, Some(json!("b")));
        assert_eq!(stream.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_counts_ticks() {
        let mut stream = TriggerStream::interval(Duration::from_secs(1));
        assert_eq!(stream.recv().await, Some(1));
        assert_eq!(stream.recv().await, Some(2));
    }
}
