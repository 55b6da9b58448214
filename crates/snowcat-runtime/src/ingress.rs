//! C6 Ingress Dispatcher: the single `ingest` entry point (spec.md §4.6,
//! §6). The only writer allowed to append to a stream's input queue;
//! derived queues are written by stages themselves.

use std::sync::Arc;

use snowcat_backend::KvBackend;
use snowcat_core::{ConsumerName, Error, QueueName, StreamId, DEFAULT_INGRESS_QUEUE};
use snowcat_lease::LeaseManager;
use snowcat_log::Log;
use snowcat_topology::Topology;

use crate::dispatcher::TaskDispatcher;
use crate::wake::run_if_not_running;

pub struct IngressDispatcher {
    backend: Arc<dyn KvBackend>,
    topology: Arc<Topology>,
    lease: LeaseManager,
    dispatcher: Arc<dyn TaskDispatcher>,
}

impl IngressDispatcher {
    pub fn new(
        backend: Arc<dyn KvBackend>,
        topology: Arc<Topology>,
        dispatcher: Arc<dyn TaskDispatcher>,
    ) -> Self {
        Self {
            lease: LeaseManager::new(backend.clone()),
            backend,
            topology,
            dispatcher,
        }
    }

    /// `ingest(streamId, queueName="Stream", values)`: register every root
    /// stage's mark before the append becomes visible, append, then wake
    /// each root. Registering marks first means the prefix-reclamation
    /// invariant can never discard data a not-yet-started consumer still
    /// needs (spec.md §4.6 invariant).
    #[tracing::instrument(level = "debug", skip(self, values), fields(stream = %stream, n = values.len()))]
    pub async fn ingest(
        &self,
        stream: &StreamId,
        queue: Option<&QueueName>,
        values: Vec<Vec<u8>>,
    ) -> Result<u64, Error> {
        let default_queue = QueueName::from(DEFAULT_INGRESS_QUEUE);
        let queue = queue.unwrap_or(&default_queue);
        let log = Log::new(self.backend.clone(), stream, queue);

        for root in self.topology.roots() {
            log.mark(&ConsumerName::from(root.as_str()), None).await?;
        }

        let new_length = log.append(values).await?;

        for root in self.topology.roots() {
            run_if_not_running(&self.lease, self.dispatcher.as_ref(), root, stream).await?;
        }

        Ok(new_length)
    }
}
