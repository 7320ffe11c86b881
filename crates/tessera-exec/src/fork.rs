//! Fork-join over scoped threads.

use std::any::Any;
use std::thread;
use tessera_common::{Result, TesseraError};

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs `tasks` on at most `max_threads` threads at a time and returns their
/// outputs in task order.
///
/// Tasks are launched in waves; each wave is fully joined before the next
/// starts. The first error (or panic) in task order is returned and the
/// remaining outputs are discarded. A single task runs on the caller's thread.
pub fn fork_join<T, F>(tasks: Vec<F>, max_threads: usize) -> Result<Vec<T>>
where
    T: Send,
    F: FnOnce() -> Result<T> + Send,
{
    if tasks.len() <= 1 {
        return tasks.into_iter().map(|task| task()).collect();
    }

    let wave = max_threads.max(1);
    let mut outputs = Vec::with_capacity(tasks.len());
    let mut pending = tasks.into_iter().peekable();

    while pending.peek().is_some() {
        let batch: Vec<F> = pending.by_ref().take(wave).collect();
        let results: Vec<Result<T>> = thread::scope(|s| {
            let handles: Vec<_> = batch.into_iter().map(|task| s.spawn(task)).collect();
            handles
                .into_iter()
                .map(|h| {
                    h.join()
                        .unwrap_or_else(|p| Err(TesseraError::WorkerPanicked(panic_message(p))))
                })
                .collect()
        });
        for result in results {
            outputs.push(result?);
        }
    }
    Ok(outputs)
}
