//! Mark-driven reclamation scenarios (spec.md §8 S2, S3): the log's
//! baseOffset must track the slowest registered consumer, never lose an
//! entry still below some mark, and never reclaim past one.

use std::sync::Arc;

use snowcat_backend::memory::MemoryBackend;
use snowcat_backend::KvBackend;
use snowcat_core::{ConsumerName, QueueName, StreamId};
use snowcat_log::Log;

fn log(backend: &Arc<dyn KvBackend>) -> Log {
    Log::new(backend.clone(), &StreamId::from("u1"), &QueueName::from("Q"))
}

/// S2 — single consumer, reclamation tracks its mark exactly.
#[tokio::test]
async fn single_consumer_reclaims_up_to_its_mark() {
    let backend: Arc<dyn KvBackend> = Arc::new(MemoryBackend::new());
    let log = log(&backend);

    let values: Vec<Vec<u8>> = (0..10u8).map(|i| vec![i]).collect();
    log.append(values).await.unwrap();

    let a = ConsumerName::from("A");
    log.mark(&a, Some(5)).await.unwrap();

    assert_eq!(log.get(4).await.unwrap(), None);
    assert_eq!(log.get(5).await.unwrap(), Some(vec![5]));
    assert_eq!(log.base_offset().await.unwrap(), 5);
    assert_eq!(log.len().await.unwrap(), 10);

    let tail = log.get_range(0, -1).await.unwrap();
    let expected: Vec<Vec<u8>> = (5..10u8).map(|i| vec![i]).collect();
    assert_eq!(tail, expected);
}

/// S3 — two consumers at different marks; the slower one pins the
/// reclaimed prefix, and nothing at or above its mark is ever lost.
#[tokio::test]
async fn slow_follower_pins_the_reclaimed_prefix() {
    let backend: Arc<dyn KvBackend> = Arc::new(MemoryBackend::new());
    let log = log(&backend);

    let values: Vec<Vec<u8>> = (0..10u8).map(|i| vec![i]).collect();
    log.append(values).await.unwrap();

    let a = ConsumerName::from("A");
    let b = ConsumerName::from("B");
    log.mark(&a, Some(7)).await.unwrap();
    log.mark(&b, Some(3)).await.unwrap();

    assert_eq!(log.base_offset().await.unwrap(), 3);
    assert_eq!(log.get(3).await.unwrap(), Some(vec![3]));
    assert_eq!(log.get(7).await.unwrap(), Some(vec![7]));

    // B catches up; reclamation now advances to A's mark.
    log.mark(&b, Some(7)).await.unwrap();
    assert_eq!(log.base_offset().await.unwrap(), 7);
    assert_eq!(log.get(6).await.unwrap(), None);
    assert_eq!(log.get(7).await.unwrap(), Some(vec![7]));
}
