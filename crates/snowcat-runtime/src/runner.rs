//! C5 Stage Runner: the per-activation algorithm of spec.md §4.5, built
//! on the Lease Manager, the State Store's `Snapshot` cursor, and the
//! Indexed Log's buffered-window read.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use snowcat_backend::KvBackend;
use snowcat_core::{Error, StageName, StreamId};
use snowcat_lease::LeaseManager;
use snowcat_log::Log;
use snowcat_state::Snapshot;
use snowcat_topology::{ProcessOutcome, Topology};

use crate::cursor::{now_secs, Cursor};
use crate::dispatcher::{ActivationHandler, TaskDispatcher};
use crate::wake::run_if_not_running;

/// Runner-wide defaults (spec.md §6); a stage may override
/// `checkpoint_frequency` individually via `Stage::checkpoint_frequency`.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub lease_ttl: Duration,
    pub checkpoint_frequency: Duration,
    pub buffer_length: u32,
    pub re_arm_delay: Duration,
}

pub struct StageRunner {
    backend: Arc<dyn KvBackend>,
    topology: Arc<Topology>,
    lease: LeaseManager,
    dispatcher: Arc<dyn TaskDispatcher>,
    config: RunnerConfig,
    stage_name: StageName,
}

impl StageRunner {
    pub fn new(
        backend: Arc<dyn KvBackend>,
        topology: Arc<Topology>,
        dispatcher: Arc<dyn TaskDispatcher>,
        config: RunnerConfig,
        stage_name: StageName,
    ) -> Self {
        Self {
            lease: LeaseManager::new(backend.clone()),
            backend,
            topology,
            dispatcher,
            config,
            stage_name,
        }
    }

    /// Entry point for one activation of this stage on `stream` (spec.md
    /// §4.5, steps 1 and 9 — lease acquire and release bracket everything).
    #[tracing::instrument(level = "debug", skip(self), fields(stage = %self.stage_name, stream = %stream))]
    pub async fn run(&self, stream: &StreamId) -> Result<(), Error> {
        let lock_key = format!("{}:{}:lock", self.stage_name, stream);
        let Some(lease) = self.lease.try_acquire(&lock_key, self.config.lease_ttl).await? else {
            tracing::debug!(stage = %self.stage_name, stream = %stream, "activation skipped, lease already held");
            return Ok(());
        };

        let result = self.run_locked(stream).await;
        if let Err(err) = &result {
            tracing::error!(stage = %self.stage_name, stream = %stream, error = %err, "activation failed");
        }
        // Lease release happens on every exit path, including user errors.
        self.lease.release(&lease).await?;
        result
    }

    async fn run_locked(&self, stream: &StreamId) -> Result<(), Error> {
        let stage = self
            .topology
            .stage(self.stage_name.as_str())
            .ok_or_else(|| Error::NotFound(format!("stage '{}'", self.stage_name)))?;

        if self.is_flagged_finished(stream).await? {
            return Ok(());
        }
        self.topology.initialize_if_needed(stream).await?;

        if !stage.is_active(stream).await? {
            if stage.call_children() {
                self.wake_children(stream).await?;
            }
            return Ok(());
        }

        let log = Log::new(self.backend.clone(), stream, &stage.input_queue());
        let fresh = Cursor::fresh(stage.cursor_defaults());
        let mut cursor =
            Snapshot::load_with_default(self.backend.clone(), &self.stage_name, stream, fresh)
                .await?;
        cursor.loop_flag = true;

        stage.pre_run(stream).await?;

        let checkpoint_frequency = stage
            .checkpoint_frequency()
            .unwrap_or(self.config.checkpoint_frequency);

        loop {
            let item = self
                .buffered_get(&log, &mut cursor, self.config.buffer_length)
                .await?;
            let elapsed = now_secs() - cursor.last_save_ts;

            if item.is_none() || elapsed > checkpoint_frequency.as_secs_f64() {
                if stage.call_children() {
                    self.wake_children(stream).await?;
                }
                if let Err(err) = stage.checkpoint(stream).await {
                    tracing::error!(
                        stage = %self.stage_name, stream = %stream, error = %err,
                        idx = cursor.idx, "checkpoint hook failed"
                    );
                    return Err(err);
                }
                cursor.last_save_ts = now_secs();
                cursor.save().await?;
            }

            let Some(item) = item else {
                break;
            };

            let outcome = match stage.process(stream, &item).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::error!(
                        stage = %self.stage_name, stream = %stream, error = %err,
                        idx = cursor.idx, "process hook failed"
                    );
                    return Err(err);
                }
            };
            cursor.idx += 1;
            cursor.loop_flag = outcome == ProcessOutcome::Continue;

            if !cursor.loop_flag {
                break;
            }
        }

        cursor.save().await?;
        stage.post_run(stream).await?;

        if cursor.loop_flag && log.get(cursor.idx).await?.is_some() {
            self.schedule_rearm(stream.clone());
        }

        Ok(())
    }

    /// Buffered read window fill (spec.md §4.5 "Buffered read"): serves
    /// from the cached window when possible, otherwise refills a
    /// chunk-aligned window in one round trip. Two consecutive empty
    /// refills are treated as end-of-log for this activation.
    async fn buffered_get(
        &self,
        log: &Log,
        cursor: &mut Cursor,
        buffer_length: u32,
    ) -> Result<Option<Vec<u8>>, Error> {
        let chunk = (buffer_length.max(1)) as u64;

        for _ in 0..2 {
            if let Some(item) = Self::serve_from_window(cursor) {
                return Ok(Some(item));
            }

            let aligned_start = (cursor.idx / chunk) * chunk;
            let indices: Vec<u64> = (aligned_start..aligned_start + chunk).collect();
            let fetched = log.get_many(&indices).await?;

            let mut contents = Vec::new();
            for entry in fetched {
                match entry {
                    Some(bytes) => contents.push(bytes),
                    None => break,
                }
            }

            let refilled_something = !contents.is_empty();
            cursor.buffer_window_offset = Some(aligned_start);
            cursor.buffer_chunk = buffer_length;
            cursor.buffer_contents = Some(contents);

            if !refilled_something {
                break;
            }
        }

        Ok(Self::serve_from_window(cursor))
    }

    fn serve_from_window(cursor: &Cursor) -> Option<Vec<u8>> {
        let offset = cursor.buffer_window_offset?;
        let contents = cursor.buffer_contents.as_ref()?;
        let pos = cursor.idx.checked_sub(offset)?;
        contents.get(pos as usize).cloned()
    }

    async fn is_flagged_finished(&self, stream: &StreamId) -> Result<bool, Error> {
        let bag = snowcat_state::Bag::new(self.backend.clone(), stream);
        let finished: std::collections::HashSet<String> =
            bag.get("finished_stages", Default::default()).await?;
        Ok(finished.contains(self.stage_name.as_str()))
    }

    /// Atomically flags this stage finished for `stream`; if every stage
    /// is now flagged, finalization runs (spec.md §4.5 "Completion
    /// flagging"). User `process`/`checkpoint` implementations call this
    /// once they determine the stream is done.
    pub async fn flag_finished(&self, stream: &StreamId) -> Result<(), Error> {
        self.topology.flag_finished(&self.stage_name, stream).await
    }

    async fn wake_children(&self, stream: &StreamId) -> Result<(), Error> {
        for child in self.topology.children_of(&self.stage_name) {
            run_if_not_running(&self.lease, self.dispatcher.as_ref(), child, stream).await?;
        }
        Ok(())
    }

    /// Schedules this stage to run again after `re_arm_delay`, closing the
    /// race between the last buffered read and the lease release (spec.md
    /// §4.5 step 8).
    fn schedule_rearm(&self, stream: StreamId) {
        let dispatcher = self.dispatcher.clone();
        let stage_name = self.stage_name.clone();
        let delay = self.config.re_arm_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            dispatcher.schedule(stage_name, stream).await;
        });
    }
}

#[async_trait]
impl ActivationHandler for StageRunner {
    async fn activate(&self, stream: &StreamId) {
        if let Err(err) = self.run(stream).await {
            tracing::error!(stage = %self.stage_name, stream = %stream, error = %err, "activation error");
        }
    }
}
