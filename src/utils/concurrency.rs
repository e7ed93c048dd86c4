//! Two bounded-parallelism primitives.
//!
//! * [`bounded_pool`]: at most `limit` futures in flight, admitted in FIFO
//!   order. Used for listings and database batch writes.
//! * [`run_lanes`]: `lanes` long-lived workers that each pull the next item
//!   from a shared cursor until it is exhausted. A lane picks up new work the
//!   moment its previous item finishes, so one slow item never blocks a wave.

use futures::stream::{self, StreamExt};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Runs `f` over `items` with at most `limit` calls in flight. Results come
/// back in input order.
pub async fn bounded_pool<T, R, F, Fut>(items: Vec<T>, limit: usize, f: F) -> Vec<R>
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = R>,
{
    stream::iter(items)
        .map(f)
        .buffered(limit.max(1))
        .collect()
        .await
}

/// Runs `f` over `items` on `lanes` concurrent lanes. `f` receives the item
/// index alongside the item. Results come back in input order.
pub async fn run_lanes<T, R, F, Fut>(items: Vec<T>, lanes: usize, f: F) -> Vec<R>
where
    T: Clone,
    F: Fn(usize, T) -> Fut,
    Fut: Future<Output = R>,
{
    let total = items.len();
    let cursor = Arc::new(AtomicUsize::new(0));
    let items = Arc::new(items);
    let f = &f;

    let lane_futures = (0..lanes.max(1).min(total.max(1))).map(|_| {
        let cursor = Arc::clone(&cursor);
        let items = Arc::clone(&items);
        async move {
            let mut done = Vec::new();
            loop {
                let idx = cursor.fetch_add(1, Ordering::SeqCst);
                if idx >= total {
                    break;
                }
                let result = f(idx, items[idx].clone()).await;
                done.push((idx, result));
            }
            done
        }
    });

    let mut indexed: Vec<(usize, R)> = futures::future::join_all(lane_futures)
        .await
        .into_iter()
        .flatten()
        .collect();
    indexed.sort_by_key(|(idx, _)| *idx);
    indexed.into_iter().map(|(_, r)| r).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn pool_caps_in_flight_work() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let results = bounded_pool((0..20).collect(), 3, |i: u32| {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                i * 2
            }
        })
        .await;

        assert_eq!(results, (0..20).map(|i| i * 2).collect::<Vec<_>>());
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn lanes_do_not_wait_for_slow_neighbours() {
        // One slow item must not hold back the rest: with two lanes, the
        // fast lane drains every other item while the slow one runs.
        let items: Vec<u64> = vec![1000, 10, 10, 10, 10, 10];
        let started = tokio::time::Instant::now();
        let results = run_lanes(items, 2, |idx, ms| async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            idx
        })
        .await;

        assert_eq!(results, vec![0, 1, 2, 3, 4, 5]);
        assert!(started.elapsed() < Duration::from_millis(1100));
    }

    #[tokio::test]
    async fn lanes_handle_empty_input() {
        let results: Vec<u8> = run_lanes(Vec::<u8>::new(), 8, |_, x| async move { x }).await;
        assert!(results.is_empty());
    }
}
