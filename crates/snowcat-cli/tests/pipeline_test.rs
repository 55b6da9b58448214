//! Linear pipeline scenario (spec.md §8 S1): ingest raw bytes through the
//! bundled `WordSplitter -> WordCounter` demo topology one character at a
//! time, drive both stages to completion, flag them finished, and assert
//! the stream is fully reclaimed behind a finished tombstone.
//!
//! `WordSplitter` only emits a word on a trailing delimiter (grounded on
//! `original_source/examples/wordcounter/categorizers/wordsplitter.py`,
//! which has the same property), so the ingested text ends in a space to
//! flush its last word deterministically.

use std::sync::Arc;
use std::time::Duration;

use snowcat_backend::memory::MemoryBackend;
use snowcat_backend::KvBackend;
use snowcat_cli::topology::build_demo_topology;
use snowcat_core::{QueueName, StageName, StreamId, DEFAULT_INGRESS_QUEUE};
use snowcat_log::Log;
use snowcat_runtime::{LocalDispatcher, RunnerConfig, StageRunner, TaskDispatcher};
use snowcat_state::Bag;

fn runner_config() -> RunnerConfig {
    RunnerConfig {
        lease_ttl: Duration::from_secs(60),
        checkpoint_frequency: Duration::from_secs(60),
        buffer_length: 8,
        re_arm_delay: Duration::from_millis(5),
    }
}

#[tokio::test]
async fn linear_pipeline_tallies_words_and_reclaims_on_finish() {
    let backend: Arc<dyn KvBackend> = Arc::new(MemoryBackend::new());
    let stream = StreamId::from("u1");
    let topology = Arc::new(build_demo_topology(backend.clone(), Duration::from_secs(3600)).unwrap());
    let dispatcher: Arc<dyn TaskDispatcher> = Arc::new(LocalDispatcher::new());

    let splitter = StageName::from("WordSplitter");
    let counter = StageName::from("WordCounter");

    let ingress = Log::new(backend.clone(), &stream, &QueueName::from(DEFAULT_INGRESS_QUEUE));
    ingress
        .append("ab c ".bytes().map(|b| vec![b]).collect())
        .await
        .unwrap();

    let splitter_runner = StageRunner::new(
        backend.clone(),
        topology.clone(),
        dispatcher.clone(),
        runner_config(),
        splitter.clone(),
    );
    splitter_runner.run(&stream).await.unwrap();

    let words = Log::new(backend.clone(), &stream, &QueueName::from("Words"));
    assert_eq!(
        words.get_range(0, -1).await.unwrap(),
        vec![b"ab".to_vec(), b"c".to_vec()],
    );

    let counter_runner = StageRunner::new(
        backend.clone(),
        topology.clone(),
        dispatcher,
        runner_config(),
        counter.clone(),
    );
    counter_runner.run(&stream).await.unwrap();

    let bag = Bag::new(backend.clone(), &stream);
    let counts: std::collections::HashMap<String, u64> =
        bag.get("word_counts", Default::default()).await.unwrap();
    assert_eq!(counts.get("ab"), Some(&1));
    assert_eq!(counts.get("c"), Some(&1));

    // Both stages report finished once their respective queues are
    // drained; finalization then reclaims the stream.
    topology.flag_finished(&splitter, &stream).await.unwrap();
    assert!(!backend.exists("u1:finished").await.unwrap());
    topology.flag_finished(&counter, &stream).await.unwrap();

    assert!(backend.exists("u1:finished").await.unwrap());
    assert_eq!(
        backend
            .log_len(&format!("u1:{DEFAULT_INGRESS_QUEUE}"))
            .await
            .unwrap(),
        0
    );
    assert_eq!(backend.log_len("u1:Words").await.unwrap(), 0);
}
