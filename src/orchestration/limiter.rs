//! Bounded worker pool that preserves input order.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::join_all;

/// Run `f` over every item with at most `limit` invocations in flight.
///
/// `limit` is clamped to `[1, items.len()]`. Workers claim indices from a
/// shared cursor, so a slow item never holds up the rest of the queue. The
/// returned vector is in the same order as `items` regardless of completion
/// order. An empty slice returns immediately without starting any worker.
pub async fn run_all<'a, T, R, F, Fut>(items: &'a [T], limit: usize, f: F) -> Vec<R>
where
    F: Fn(&'a T, usize) -> Fut,
    Fut: Future<Output = R>,
{
    if items.is_empty() {
        return Vec::new();
    }

    let workers = limit.clamp(1, items.len());
    let cursor = AtomicUsize::new(0);
    let (cursor, f) = (&cursor, &f);

    let finished = join_all((0..workers).map(|_| async move {
        let mut done = Vec::new();
        loop {
            let index = cursor.fetch_add(1, Ordering::Relaxed);
            let Some(item) = items.get(index) else {
                break;
            };
            done.push((index, f(item, index).await));
        }
        done
    }))
    .await;

    let mut slots: Vec<Option<R>> = std::iter::repeat_with(|| None).take(items.len()).collect();
    for (index, result) in finished.into_iter().flatten() {
        slots[index] = Some(result);
    }
    // Every index below len is claimed by exactly one worker.
    slots.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Deterministic pseudo-shuffled delay so completion order differs from input order.
    fn delay_for(index: usize) -> Duration {
        Duration::from_millis(((index * 7919 + 13) % 17) as u64 * 3)
    }

    #[tokio::test]
    async fn results_keep_input_order() {
        let items: Vec<usize> = (0..25).collect();
        for limit in [1, 3, 8, 25, 100] {
            let results = run_all(&items, limit, |item, index| async move {
                tokio::time::sleep(delay_for(index)).await;
                item * 10
            })
            .await;
            let expected: Vec<usize> = items.iter().map(|i| i * 10).collect();
            assert_eq!(results, expected, "limit {limit}");
        }
    }

    #[tokio::test]
    async fn never_exceeds_limit() {
        let items: Vec<usize> = (0..12).collect();
        for limit in 1..=items.len() {
            let in_flight = AtomicUsize::new(0);
            let peak = AtomicUsize::new(0);
            let (in_flight_ref, peak_ref) = (&in_flight, &peak);

            run_all(&items, limit, |_, index| async move {
                let now = in_flight_ref.fetch_add(1, Ordering::SeqCst) + 1;
                peak_ref.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(delay_for(index) + Duration::from_millis(1)).await;
                in_flight_ref.fetch_sub(1, Ordering::SeqCst);
            })
            .await;

            let peak = peak.load(Ordering::SeqCst);
            assert!(peak <= limit, "peak {peak} exceeded limit {limit}");
            assert_eq!(peak, limit, "all {limit} workers should overlap");
        }
    }

    #[tokio::test]
    async fn empty_input_never_calls_f() {
        let items: Vec<u8> = Vec::new();
        let calls = AtomicUsize::new(0);
        let results: Vec<u8> = run_all(&items, 4, |item, _| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { *item }
        })
        .await;
        assert!(results.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn zero_limit_still_makes_progress() {
        let items = vec!["a", "b", "c"];
        let results = run_all(&items, 0, |item, index| async move { format!("{index}:{item}") }).await;
        assert_eq!(results, vec!["0:a", "1:b", "2:c"]);
    }
}
