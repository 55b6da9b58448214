//! C7 task dispatcher contract and an in-process implementation.
//!
//! `original_source` dispatches via Celery (`AddData.queue` routing,
//! `original_source/snowcat/tasks.py`); this kernel keeps the same
//! "fire-and-forget, no ordering guarantee" contract but leaves the
//! transport external. [`LocalDispatcher`] is the one reference
//! implementation, spawning activations as `tokio` tasks in-process,
//! following `stupid-eisenbahn::worker::WorkerRunner`'s tracing-instrumented
//! lifecycle style.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use snowcat_core::{StageName, StreamId};

/// `schedule` eventually invokes the registered stage's runner; it need
/// not guarantee ordering, exactly-once delivery, or promptness (spec.md
/// §4.7). The core tolerates duplicate, out-of-order, and arbitrarily
/// delayed scheduling by construction (the lease and idempotent
/// checkpointing absorb it).
#[async_trait]
pub trait TaskDispatcher: Send + Sync {
    async fn schedule(&self, stage: StageName, stream: StreamId);
}

/// What a dispatcher invokes once it decides to run a stage activation.
/// Implemented by `snowcat_runtime::StageRunner`; kept as a separate
/// trait from `TaskDispatcher` so callers that only need to *schedule*
/// never need a concrete runner type.
#[async_trait]
pub trait ActivationHandler: Send + Sync {
    async fn activate(&self, stream: &StreamId);
}

/// In-process dispatcher: `schedule` spawns a detached `tokio` task that
/// calls the registered handler for that stage. Suitable for single-process
/// deployments and the bundled `snowcat-cli` demo; a broker-backed
/// dispatcher (AMQP, a Redis list) is a drop-in replacement for
/// multi-process deployments.
#[derive(Default)]
pub struct LocalDispatcher {
    handlers: DashMap<String, Arc<dyn ActivationHandler>>,
}

impl LocalDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, stage: &StageName, handler: Arc<dyn ActivationHandler>) {
        self.handlers.insert(stage.to_string(), handler);
    }
}

#[async_trait]
impl TaskDispatcher for LocalDispatcher {
    async fn schedule(&self, stage: StageName, stream: StreamId) {
        let Some(handler) = self.handlers.get(stage.as_str()).map(|h| h.clone()) else {
            tracing::warn!(stage = %stage, "schedule called for an unregistered stage");
            return;
        };
        tokio::spawn(async move {
            handler.activate(&stream).await;
        });
    }
}
