//! C1 Indexed Log: an ordered, index-addressable queue per (stream, queue),
//! built on [`KvBackend`]. Keys follow spec.md §6's layout — `{stream}:{queue}`
//! for the data hash, `{stream}:{queue}:marks` for the per-consumer marks —
//! so any `KvBackend` implementation sees the same entity regardless of
//! which Rust type constructed the key.

use std::sync::Arc;

use snowcat_backend::KvBackend;
use snowcat_core::{ConsumerName, Error, QueueName, StreamId};

/// Handle to one (stream, queue) log. Cheap to construct; holds no local
/// state beyond the key names and a shared backend handle.
pub struct Log {
    backend: Arc<dyn KvBackend>,
    data_key: String,
    marks_key: String,
}

impl Log {
    pub fn new(backend: Arc<dyn KvBackend>, stream: &StreamId, queue: &QueueName) -> Self {
        let data_key = format!("{stream}:{queue}");
        let marks_key = format!("{data_key}:marks");
        Self {
            backend,
            data_key,
            marks_key,
        }
    }

    #[tracing::instrument(level = "debug", skip(self, values), fields(queue = %self.data_key, n = values.len()))]
    pub async fn append(&self, values: Vec<Vec<u8>>) -> Result<u64, Error> {
        if values.is_empty() {
            return self.len().await;
        }
        self.backend.log_append(&self.data_key, values).await
    }

    pub async fn len(&self) -> Result<u64, Error> {
        self.backend.log_len(&self.data_key).await
    }

    pub async fn base_offset(&self) -> Result<u64, Error> {
        self.backend.log_base_offset(&self.data_key).await
    }

    pub async fn get(&self, index: u64) -> Result<Option<Vec<u8>>, Error> {
        self.backend.log_get(&self.data_key, index).await
    }

    /// Fetch `[start, stop]` inclusive, negative indices counting from the
    /// tail relative to the current length (spec.md §4.1 `getRange`).
    /// Returns an empty vec when the requested window is inverted or lies
    /// entirely outside `[baseOffset, length)`.
    pub async fn get_range(&self, start: i64, stop: i64) -> Result<Vec<Vec<u8>>, Error> {
        let length = self.len().await? as i64;
        let offset = self.base_offset().await? as i64;

        let resolve = |i: i64| -> i64 {
            if i < 0 {
                length + i
            } else {
                i
            }
        };
        let lo = resolve(start).max(offset);
        let hi = resolve(stop).min(length - 1);

        if lo > hi || hi < offset || lo >= length {
            return Ok(Vec::new());
        }

        let indices: Vec<u64> = (lo..=hi).map(|i| i as u64).collect();
        let fetched = self.backend.log_get_many(&self.data_key, &indices).await?;
        Ok(fetched.into_iter().flatten().collect())
    }

    /// Buffered-window fetch: the underlying `mlindex`-style primitive the
    /// Stage Runner's buffered read uses to fill its cache in one round
    /// trip (spec.md §4.5 `bufferedGet`, supplemented feature in SPEC_FULL
    /// §3).
    pub async fn get_many(&self, indices: &[u64]) -> Result<Vec<Option<Vec<u8>>>, Error> {
        self.backend.log_get_many(&self.data_key, indices).await
    }

    #[tracing::instrument(level = "debug", skip(self), fields(queue = %self.data_key, consumer = %consumer))]
    pub async fn mark(&self, consumer: &ConsumerName, index: Option<u64>) -> Result<u64, Error> {
        self.backend
            .log_mark(&self.data_key, &self.marks_key, consumer.as_str(), index)
            .await
    }

    pub async fn unmark(&self, consumer: &ConsumerName) -> Result<(), Error> {
        self.backend
            .log_unmark(&self.marks_key, consumer.as_str())
            .await
    }

    pub async fn marks(&self) -> Result<Vec<(String, u64)>, Error> {
        self.backend.log_marks(&self.marks_key).await
    }

    pub async fn pop_front(&self) -> Result<Option<Vec<u8>>, Error> {
        self.backend.log_pop_front(&self.data_key).await
    }

    /// Administrative forced reclamation ahead of consumer marks. Can
    /// orphan a slow consumer whose mark sits below `upto` — the caller's
    /// responsibility, mirroring the original `RedisList.killfirstn`'s own
    /// warning.
    pub async fn compact(&self, upto: u64) -> Result<(), Error> {
        self.backend.log_compact(&self.data_key, upto).await
    }

    pub async fn drop_queue(&self) -> Result<(), Error> {
        self.backend.log_drop(&self.data_key, &self.marks_key).await
    }
}
