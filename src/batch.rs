//! Chunked concurrent fan-out
//!
//! Destinations are processed in fixed-size chunks: all members of a chunk
//! run concurrently and settle before the next chunk starts, with a fixed
//! pause between chunks. The pause is rate discipline toward receivers and
//! providers, not a throughput knob. Output order always matches input
//! order, and a panicking task becomes a synthesized failure instead of
//! taking its chunk siblings down.

use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinError;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub batch_size: usize,
    pub batch_delay: Duration,
}

impl BatchOptions {
    pub fn new(batch_size: usize, batch_delay: Duration) -> Self {
        Self {
            // A zero-size chunk would never drain the input.
            batch_size: batch_size.max(1),
            batch_delay,
        }
    }
}

/// Run `total` tasks in chunks, returning results in task-index order.
///
/// `make_task(i)` produces the future for item `i`; each is spawned so
/// chunk members run concurrently while the chunk as a whole settles
/// before the next one starts. `on_join_error(i, err)` synthesizes the
/// result for a task that panicked or was cancelled. No pause follows the
/// final chunk.
pub(crate) async fn run_batched<R, Fut, M, E>(
    total: usize,
    options: &BatchOptions,
    mut make_task: M,
    mut on_join_error: E,
) -> Vec<R>
where
    R: Send + 'static,
    Fut: Future<Output = R> + Send + 'static,
    M: FnMut(usize) -> Fut,
    E: FnMut(usize, JoinError) -> R,
{
    let mut results = Vec::with_capacity(total);
    let mut next = 0usize;

    while next < total {
        let end = (next + options.batch_size).min(total);
        let handles: Vec<_> = (next..end).map(|i| tokio::spawn(make_task(i))).collect();

        // join_all returns outcomes in spawn order, keeping results aligned
        // with input order while the tasks run concurrently.
        for (offset, joined) in join_all(handles).await.into_iter().enumerate() {
            let index = next + offset;
            match joined {
                Ok(result) => results.push(result),
                Err(err) => {
                    warn!(
                        index,
                        error = %err,
                        "Dispatch task did not settle cleanly, synthesizing failure"
                    );
                    results.push(on_join_error(index, err));
                }
            }
        }

        next = end;
        if next < total {
            tokio::time::sleep(options.batch_delay).await;
        }
    }

    results
}
