use async_trait::async_trait;
use snowcat_core::Error;

/// Async KV service backing every higher-level SnowCat abstraction.
///
/// Scalar operations (`get`/`set`/`set_with_ttl`/`delete`/`exists`) back the
/// Snapshot cursor, the lease key, and the finalization tombstone. Hash
/// operations back the Bag's namespaced fields. The `log_*` operations are
/// the atomic scripts the Indexed Log needs: append, random-access get,
/// and the combined mark-then-reclaim step, mirroring the Lua scripts in
/// the original `RedisList` (`rpush`, `lindex`, `mlindex`, `lrange`,
/// `remfirstn`, `lpop`) but generalized to per-consumer marks instead of a
/// single offset.
///
/// Implementations must make every individual method atomic against
/// concurrent callers; none of these operations fail *logically* — a
/// failing call means the backend itself is unavailable, and the error is
/// propagated to the caller for retry (spec.md §4.1, §7).
#[async_trait]
pub trait KvBackend: Send + Sync {
    // ---- scalar ----------------------------------------------------

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error>;

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), Error>;

    async fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<(), Error>;

    async fn delete(&self, key: &str) -> Result<(), Error>;

    async fn exists(&self, key: &str) -> Result<bool, Error>;

    /// Set `key` to `value` with the given TTL iff it does not already
    /// hold a live value. Returns `true` iff the set happened. Used by the
    /// Lease Manager's non-blocking `tryAcquire` (spec.md §4.3).
    async fn set_nx_ttl(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<bool, Error>;

    /// Delete `key` iff its current value equals `expected`. Returns
    /// `true` iff the delete happened. Used by the Lease Manager's
    /// idempotent, token-scoped `release` so a release never clobbers a
    /// lease re-acquired by another owner after TTL expiry.
    async fn delete_if_eq(&self, key: &str, expected: &[u8]) -> Result<bool, Error>;

    /// List every key with the given prefix. Used only by stream
    /// finalization's best-effort purge sweep (spec.md §4.4); callers must
    /// not rely on strong consistency across a scan.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, Error>;

    // ---- hash (Bag) --------------------------------------------------

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>, Error>;

    async fn hash_set(&self, key: &str, field: &str, value: Vec<u8>) -> Result<(), Error>;

    /// Atomic compare-and-set on a single hash field: if `field` is absent,
    /// install `new` and return `None`; otherwise leave the hash untouched
    /// and return the existing value. This is the Bag's `getOrSet`
    /// primitive (spec.md §4.2), used by the initialization handshake.
    async fn hash_get_or_set(
        &self,
        key: &str,
        field: &str,
        new: Vec<u8>,
    ) -> Result<Option<Vec<u8>>, Error>;

    // ---- indexed log (C1) ---------------------------------------------

    /// Append `values` to the log at `key`, returning the new length.
    /// Atomic: every appended value gets a unique, dense absolute index.
    async fn log_append(&self, key: &str, values: Vec<Vec<u8>>) -> Result<u64, Error>;

    async fn log_len(&self, key: &str) -> Result<u64, Error>;

    async fn log_base_offset(&self, key: &str) -> Result<u64, Error>;

    async fn log_get(&self, key: &str, index: u64) -> Result<Option<Vec<u8>>, Error>;

    /// Fetch several absolute indices in one round trip — the underlying
    /// primitive for the Stage Runner's buffered window fill, grounded on
    /// the original `RedisList.mlindex`.
    async fn log_get_many(&self, key: &str, indices: &[u64]) -> Result<Vec<Option<Vec<u8>>>, Error>;

    /// Set `marks[consumer] = clip(index, 0, length)` (or register it at 0
    /// if `index` is `None` and no mark yet exists), then reclaim
    /// `[minReclaimed, newMin)` if the new minimum mark advanced past the
    /// previously reclaimed prefix. Returns the resulting `min(marks.values)`.
    /// This is the single atomic step spec.md §4.1 requires: "readers must
    /// never ... see reclamation that crosses an existing mark".
    async fn log_mark(
        &self,
        key: &str,
        marks_key: &str,
        consumer: &str,
        index: Option<u64>,
    ) -> Result<u64, Error>;

    async fn log_unmark(&self, marks_key: &str, consumer: &str) -> Result<(), Error>;

    async fn log_marks(&self, marks_key: &str) -> Result<Vec<(String, u64)>, Error>;

    /// Pop and return the entry at the current front, advancing the base
    /// offset by one. Does not touch marks.
    async fn log_pop_front(&self, key: &str) -> Result<Option<Vec<u8>>, Error>;

    /// Administrative forced reclamation ahead of consumer marks (spec
    /// supplement, grounded on `RedisList.killfirstn`): deletes entries
    /// `[baseOffset, upto)` regardless of any mark below `upto`. Callers
    /// are responsible for knowing this can orphan a slow consumer.
    async fn log_compact(&self, key: &str, upto: u64) -> Result<(), Error>;

    /// Delete the entire log (data + marks) for a queue. Used by stream
    /// finalization's queue reclamation step.
    async fn log_drop(&self, key: &str, marks_key: &str) -> Result<(), Error>;
}
