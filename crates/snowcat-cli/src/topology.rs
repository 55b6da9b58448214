//! The two demo stages and the topology that wires them together.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use snowcat_backend::KvBackend;
use snowcat_core::{ConsumerName, Error, QueueName, StageName, StreamId, DEFAULT_INGRESS_QUEUE};
use snowcat_log::Log;
use snowcat_state::{Bag, Snapshot};
use snowcat_topology::{ProcessOutcome, PurgeFinalizer, Stage, Topology};

const WORDS_QUEUE: &str = "Words";

/// Root stage: splits the raw ingress byte stream into whole words on
/// spaces, mirroring `original_source/examples/wordcounter/categorizers/
/// wordsplitter.py`'s `WordSplitter.process`. The in-flight partial word
/// is scratch state private to this stage, kept in its own `Snapshot`
/// rather than the Stage Runner's cursor (the original's `self.s.buf`).
pub struct WordSplitter {
    name: StageName,
    buf_stage: StageName,
    backend: Arc<dyn KvBackend>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PartialWord {
    chars: String,
}

impl WordSplitter {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self {
            name: StageName::from("WordSplitter"),
            buf_stage: StageName::from("WordSplitter.buf"),
            backend,
        }
    }
}

#[async_trait]
impl Stage for WordSplitter {
    fn name(&self) -> &StageName {
        &self.name
    }

    fn input_queue(&self) -> QueueName {
        QueueName::from(DEFAULT_INGRESS_QUEUE)
    }

    fn checkpoint_frequency(&self) -> Option<Duration> {
        Some(Duration::from_secs(10))
    }

    /// Registers `WordCounter`'s mark on the `Words` queue it is about to
    /// start writing to, before any word can be appended — the producing
    /// stage owns registering its own derived queue's consumer marks.
    async fn initialize(&self, stream: &StreamId) -> Result<(), Error> {
        let words = Log::new(self.backend.clone(), stream, &QueueName::from(WORDS_QUEUE));
        words.mark(&ConsumerName::from("WordCounter"), None).await?;
        Ok(())
    }

    async fn process(&self, stream: &StreamId, item: &[u8]) -> Result<ProcessOutcome, Error> {
        let ch = std::str::from_utf8(item)
            .ok()
            .and_then(|s| s.chars().next())
            .unwrap_or(' ');

        let mut partial: Snapshot<PartialWord> =
            Snapshot::load(self.backend.clone(), &self.buf_stage, stream).await?;

        if ch == ' ' && !partial.chars.is_empty() {
            let word = partial.chars.trim().to_string();
            if !word.is_empty() {
                let words = Log::new(self.backend.clone(), stream, &QueueName::from(WORDS_QUEUE));
                words.append(vec![word.into_bytes()]).await?;
            }
            partial.chars.clear();
        }
        if ch != ' ' {
            partial.chars.push(ch);
        }

        partial.save().await?;
        Ok(ProcessOutcome::Continue)
    }
}

/// Derived stage: tallies word frequency for the stream, mirroring
/// `wordcounter.py`'s `WordCounter.process` (`zincrby` becomes a
/// `Bag`-backed counter map, since the backend is no longer assumed to be
/// Redis specifically).
pub struct WordCounter {
    name: StageName,
    dependencies: Vec<StageName>,
    backend: Arc<dyn KvBackend>,
}

impl WordCounter {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self {
            name: StageName::from("WordCounter"),
            dependencies: vec![StageName::from("WordSplitter")],
            backend,
        }
    }
}

#[async_trait]
impl Stage for WordCounter {
    fn name(&self) -> &StageName {
        &self.name
    }

    fn dependencies(&self) -> &[StageName] {
        &self.dependencies
    }

    fn input_queue(&self) -> QueueName {
        QueueName::from(WORDS_QUEUE)
    }

    fn checkpoint_frequency(&self) -> Option<Duration> {
        Some(Duration::from_secs(30))
    }

    async fn process(&self, stream: &StreamId, item: &[u8]) -> Result<ProcessOutcome, Error> {
        let word = String::from_utf8_lossy(item).trim().to_lowercase();
        if word.is_empty() {
            return Ok(ProcessOutcome::Continue);
        }

        let bag = Bag::new(self.backend.clone(), stream);
        let mut counts: std::collections::HashMap<String, u64> =
            bag.get("word_counts", Default::default()).await?;
        *counts.entry(word).or_insert(0) += 1;
        bag.set("word_counts", &counts).await?;
        Ok(ProcessOutcome::Continue)
    }
}

/// Builds the `WordSplitter -> WordCounter` topology with the default
/// purge finalizer, sharing one `backend` handle across both stages.
pub fn build_demo_topology(
    backend: Arc<dyn KvBackend>,
    tombstone_ttl: Duration,
) -> Result<Topology, Error> {
    Topology::builder(backend.clone())
        .stage(Box::new(WordSplitter::new(backend.clone())))
        .stage(Box::new(WordCounter::new(backend.clone())))
        .finalizer(Box::new(PurgeFinalizer::new(backend, tombstone_ttl)))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use snowcat_backend::memory::MemoryBackend;
    use snowcat_runtime::{LocalDispatcher, RunnerConfig, StageRunner, TaskDispatcher};
    use std::sync::Arc as StdArc;

    fn runner_config() -> RunnerConfig {
        RunnerConfig {
            lease_ttl: Duration::from_secs(60),
            checkpoint_frequency: Duration::from_secs(60),
            buffer_length: 8,
            re_arm_delay: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn word_splitter_then_counter_tallies_words() {
        let backend: Arc<dyn KvBackend> = Arc::new(MemoryBackend::new());
        let topology = StdArc::new(
            build_demo_topology(backend.clone(), Duration::from_secs(3600)).unwrap(),
        );
        let dispatcher: Arc<dyn TaskDispatcher> = Arc::new(LocalDispatcher::new());

        let stream = StreamId::from("u1");
        let ingress_log =
            Log::new(backend.clone(), &stream, &QueueName::from(DEFAULT_INGRESS_QUEUE));
        ingress_log
            .append("the cat sat on the mat ".bytes().map(|b| vec![b]).collect())
            .await
            .unwrap();

        let splitter_runner = StageRunner::new(
            backend.clone(),
            topology.clone(),
            dispatcher.clone(),
            runner_config(),
            StageName::from("WordSplitter"),
        );
        splitter_runner.run(&stream).await.unwrap();

        let counter_runner = StageRunner::new(
            backend.clone(),
            topology,
            dispatcher,
            runner_config(),
            StageName::from("WordCounter"),
        );
        counter_runner.run(&stream).await.unwrap();

        let bag = Bag::new(backend, &stream);
        let counts: std::collections::HashMap<String, u64> =
            bag.get("word_counts", Default::default()).await.unwrap();
        assert_eq!(counts.get("the"), Some(&2));
        assert_eq!(counts.get("cat"), Some(&1));
        assert_eq!(counts.get("sat"), Some(&1));
        assert_eq!(counts.get("on"), Some(&1));
        assert_eq!(counts.get("mat"), Some(&1));
    }
}
