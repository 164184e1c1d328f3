use crate::Error;

/// Split `items` into groups of at most `limit`, preserving order
///
/// Every group but the last holds exactly `limit` items. An empty input gives
/// no groups.
pub fn chunk<T>(items: Vec<T>, limit: usize) -> Result<Vec<Vec<T>>, Error> {
    if limit == 0 {
        return Err(Error::InvalidChunkLimit);
    }

    let mut chunks = Vec::with_capacity(items.len().div_ceil(limit));
    let mut items = items.into_iter().peekable();
    while items.peek().is_some() {
        chunks.push(items.by_ref().take(limit).collect());
    }
    Ok(chunks)
}

/// Batch processing utilities
pub(crate) mod batch_processor {
    use crate::Error;
    use futures_util::{StreamExt, TryStreamExt};
    use std::{cmp, future::Future};
    use tokio_stream::{self as stream};
    use tracing::debug;

    use super::chunk;

    /// Chunks items and runs one operation per chunk with bounded concurrency
    #[derive(Debug)]
    pub(crate) struct BatchProcessor {
        chunk_size: usize,
        concurrency: usize,
    }

    impl BatchProcessor {
        pub(crate) fn new(chunk_size: usize, concurrency: usize) -> Self {
            Self {
                chunk_size,
                concurrency,
            }
        }

        /// Process items in chunks, merging results in chunk order
        pub(crate) async fn process<T, R, F, Fut, O, M>(
            &self,
            items: Vec<T>,
            operation: F,
            output: O,
            merge_results: M,
        ) -> Result<O, Error>
        where
            F: Fn(Vec<T>) -> Fut,
            Fut: Future<Output = Result<R, Error>>,
            M: Fn(&mut O, R) -> Result<(), Error>,
        {
            if items.is_empty() {
                return Ok(output);
            }

            let batches = chunk(items, self.chunk_size)?;
            let concurrency = cmp::max(1, batches.len().min(self.concurrency));
            debug!(
                chunks = batches.len(),
                chunk_size = self.chunk_size,
                concurrency,
                "dispatching batch"
            );

            stream::iter(batches.into_iter().map(operation))
                .buffered(concurrency)
                .try_fold(output, |mut acc, result| {
                    let merge_results = &merge_results;
                    async move {
                        merge_results(&mut acc, result)?;
                        Ok(acc)
                    }
                })
                .await
        }
    }

    /// Standard batch sizes for DynamoDB operations
    pub(crate) const BATCH_WRITE_SIZE: usize = 25;
    pub(crate) const BATCH_READ_SIZE: usize = 100;
    pub(crate) const TRANSACTION_SIZE: usize = 25;
    pub(crate) const DEFAULT_CONCURRENCY: usize = 10;
}
