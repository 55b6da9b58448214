//! The user-facing categorizer contract (spec.md §4.4, §4.5), grounded in
//! `original_source/snowcat/categorizers.py`'s `Categorizer` base class:
//! `initialize`, `is_active`, `process`, `checkpoint` map directly onto
//! its `initialize`, `ping`/`is_active`, `process_result`, and `on_checkpoint`
//! hooks.

use std::time::Duration;

use async_trait::async_trait;
use snowcat_core::{Error, QueueName, StageName, StreamId, DEFAULT_INGRESS_QUEUE};

/// What `Stage::process` tells the runner to do with its run loop
/// (spec.md §7 "Cooperative 'loop flag' to end a stage" redesign note):
/// the cursor's `loop_flag` is an explicit signal set from this return
/// value rather than mutable state a stage pokes from the outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Keep draining the queue on this activation.
    Continue,
    /// Stop draining after this item; the runner still checkpoints, wakes
    /// children, and saves the cursor, but will not re-arm itself.
    Stop,
}

/// One node in the topology's stage DAG.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &StageName;

    /// Upstream stage names this stage depends on. Empty means the stage
    /// is a root, fed directly by ingress.
    fn dependencies(&self) -> &[StageName] {
        &[]
    }

    /// The queue this stage reads from. Roots default to the ingress
    /// queue; a derived stage names the queue its parent writes to
    /// (`original_source`'s per-categorizer `QUEUE` class attribute —
    /// `WordSplitter.QUEUE = 'Stream'`, `WordCounter.QUEUE = 'Words'`).
    fn input_queue(&self) -> QueueName {
        QueueName::from(DEFAULT_INGRESS_QUEUE)
    }

    /// Extra cursor fields merged into the fresh `Cursor` the first time
    /// a stream activates this stage (spec.md §4.5 step 4, `S.defaults`),
    /// mirroring `original_source`'s per-categorizer `DEFAULT_S`. An empty
    /// object if the stage keeps no cursor-local scratch state.
    fn cursor_defaults(&self) -> serde_json::Value {
        serde_json::json!({})
    }

    /// Whether the Stage Runner should wake this stage's children after
    /// each checkpoint and on an empty-queue exit (spec.md §4.5 step 6,
    /// §4.6 "wake children").
    fn call_children(&self) -> bool {
        true
    }

    /// Overrides `stage.checkpointFrequency` (spec.md §6) for this stage
    /// specifically; `None` defers to the runner's configured default.
    fn checkpoint_frequency(&self) -> Option<Duration> {
        None
    }

    /// Runs once per stream, the first time any activation needs this
    /// stage initialized (spec.md §4.4 initialization protocol).
    async fn initialize(&self, _stream: &StreamId) -> Result<(), Error> {
        Ok(())
    }

    /// Activity gate: if `false`, the runner wakes children (if
    /// `call_children`) and returns without reading the queue (spec.md
    /// §4.5 step 3).
    async fn is_active(&self, _stream: &StreamId) -> Result<bool, Error> {
        Ok(true)
    }

    async fn process(&self, stream: &StreamId, item: &[u8]) -> Result<ProcessOutcome, Error>;

    /// Invoked on every checkpoint boundary (queue-empty or the
    /// checkpoint-frequency timer), before the cursor is saved.
    async fn checkpoint(&self, _stream: &StreamId) -> Result<(), Error> {
        Ok(())
    }

    /// Runs once per activation, before the main loop (spec.md §4.5 step 5).
    async fn pre_run(&self, _stream: &StreamId) -> Result<(), Error> {
        Ok(())
    }

    /// Runs once per activation, after the main loop and final cursor
    /// save (spec.md §4.5 step 5).
    async fn post_run(&self, _stream: &StreamId) -> Result<(), Error> {
        Ok(())
    }
}
