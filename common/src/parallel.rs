//! Concurrency-limited parallel iteration.
//!
//! Wraps rayon's `par_iter` so that at most a fixed number of items are in
//! flight at once (e.g. to cap the number of device pipelines alive together).

use rayon::prelude::*;

/// Maps `f` over `items` in parallel, with at most `max_concurrent` items in flight.
///
/// `f` receives the item index alongside the item. Results keep input order.
/// Stops at the first chunk that contains an error and returns that error;
/// items within the failing chunk may still have been processed.
///
/// # Panics
///
/// Panics if `max_concurrent` is 0.
pub fn try_par_map_limited<T, R, E, F>(
    items: &[T],
    max_concurrent: usize,
    f: F,
) -> Result<Vec<R>, E>
where
    T: Sync,
    R: Send,
    E: Send,
    F: Fn(usize, &T) -> Result<R, E> + Sync,
{
    assert!(max_concurrent > 0, "max_concurrent must be > 0");

    let mut results = Vec::with_capacity(items.len());
    for (chunk_index, chunk) in items.chunks(max_concurrent).enumerate() {
        let base = chunk_index * max_concurrent;
        let chunk_results: Result<Vec<R>, E> = chunk
            .par_iter()
            .enumerate()
            .map(|(offset, item)| f(base + offset, item))
            .collect();
        results.extend(chunk_results?);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn preserves_order_and_indices() {
        let items: Vec<i32> = (0..10).collect();
        let result: Result<Vec<(usize, i32)>, ()> =
            try_par_map_limited(&items, 3, |i, &x| Ok((i, x * 2)));
        let expected: Vec<(usize, i32)> = (0..10).map(|x| (x as usize, x * 2)).collect();
        assert_eq!(result.unwrap(), expected);
    }

    #[test]
    fn empty_input() {
        let items: Vec<i32> = vec![];
        let result: Result<Vec<i32>, ()> = try_par_map_limited(&items, 3, |_, &x| Ok(x));
        assert!(result.unwrap().is_empty());
    }

    #[test]
    fn first_error_is_returned() {
        let items: Vec<i32> = (0..10).collect();
        let result: Result<Vec<i32>, String> = try_par_map_limited(&items, 4, |_, &x| {
            if x == 5 {
                Err(format!("bad item {x}"))
            } else {
                Ok(x)
            }
        });
        assert_eq!(result.unwrap_err(), "bad item 5");
    }

    #[test]
    fn later_chunks_are_skipped_after_error() {
        let items: Vec<i32> = (0..12).collect();
        let processed = AtomicUsize::new(0);
        let result: Result<Vec<i32>, ()> = try_par_map_limited(&items, 4, |_, &x| {
            processed.fetch_add(1, Ordering::SeqCst);
            if x == 1 {
                Err(())
            } else {
                Ok(x)
            }
        });
        assert!(result.is_err());
        assert!(processed.load(Ordering::SeqCst) <= 4);
    }

    #[test]
    fn concurrency_is_capped() {
        let items: Vec<i32> = (0..20).collect();
        let in_flight = AtomicUsize::new(0);
        let max_observed = AtomicUsize::new(0);

        let _: Result<Vec<i32>, ()> = try_par_map_limited(&items, 3, |_, &x| {
            let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            max_observed.fetch_max(current, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(5));
            in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(x)
        });

        let max = max_observed.load(Ordering::SeqCst);
        assert!(max <= 3, "max in-flight was {max}, expected <= 3");
    }

    #[test]
    #[should_panic(expected = "max_concurrent must be > 0")]
    fn zero_concurrency_panics() {
        let _: Result<Vec<i32>, ()> = try_par_map_limited(&[1, 2, 3], 0, |_, &x| Ok(x));
    }
}
