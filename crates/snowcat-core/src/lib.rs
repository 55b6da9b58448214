pub mod config;
pub mod error;
pub mod ids;

pub use config::SnowcatConfig;
pub use error::Error;
pub use ids::{ConsumerName, QueueName, StageName, StreamId};

/// Default queue name used by the ingress dispatcher (C6) when the caller
/// does not specify one explicitly. See spec §6 `ingest(streamId, queueName?)`.
pub const DEFAULT_INGRESS_QUEUE: &str = "Stream";
