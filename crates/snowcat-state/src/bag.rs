//! Bag: a namespaced mapping from field name to self-describing encoded
//! value, backing the cross-stage coordination keys (`init_started`,
//! `init_finished`, `finished_stages`) at `{stream}:SimpleKV` (spec.md
//! §4.2, §6).

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use snowcat_backend::KvBackend;
use snowcat_core::{Error, StreamId};

use crate::{decode, encode};

pub struct Bag {
    backend: Arc<dyn KvBackend>,
    key: String,
}

impl Bag {
    pub fn new(backend: Arc<dyn KvBackend>, stream: &StreamId) -> Self {
        Self {
            backend,
            key: format!("{stream}:SimpleKV"),
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, field: &str, default: T) -> Result<T, Error> {
        match self.backend.hash_get(&self.key, field).await? {
            Some(bytes) => decode(&bytes),
            None => Ok(default),
        }
    }

    pub async fn set<T: Serialize>(&self, field: &str, value: &T) -> Result<(), Error> {
        let bytes = encode(value)?;
        self.backend.hash_set(&self.key, field, bytes).await
    }

    /// Atomic compare-and-set: if `field` is absent, install `new` and
    /// return `None`; otherwise leave the bag untouched and return the
    /// existing value decoded. Used by the topology initialization
    /// handshake's `init_started` race (spec.md §4.4 step 2).
    pub async fn get_or_set<T>(&self, field: &str, new: &T) -> Result<Option<T>, Error>
    where
        T: Serialize + DeserializeOwned,
    {
        let bytes = encode(new)?;
        match self.backend.hash_get_or_set(&self.key, field, bytes).await? {
            Some(existing) => Ok(Some(decode(&existing)?)),
            None => Ok(None),
        }
    }

    pub async fn field_exists(&self, field: &str) -> Result<bool, Error> {
        Ok(self.backend.hash_get(&self.key, field).await?.is_some())
    }

    /// Whether the bag's namespace has been written to at all.
    pub async fn exists(&self) -> Result<bool, Error> {
        self.backend.exists(&self.key).await
    }

    /// Drop the entire namespace (every field), per spec.md §4.2
    /// `delete(namespace)`. Used by stream finalization's purge sweep.
    pub async fn delete(&self) -> Result<(), Error> {
        self.backend.delete(&self.key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snowcat_backend::memory::MemoryBackend;

    fn bag(backend: &Arc<dyn KvBackend>) -> Bag {
        Bag::new(backend.clone(), &StreamId::from("u1"))
    }

    #[tokio::test]
    async fn get_returns_default_when_absent() {
        let backend: Arc<dyn KvBackend> = Arc::new(MemoryBackend::new());
        let bag = bag(&backend);
        let v: bool = bag.get("init_finished", false).await.unwrap();
        assert!(!v);
    }

    #[tokio::test]
    async fn get_or_set_installs_once() {
        let backend: Arc<dyn KvBackend> = Arc::new(MemoryBackend::new());
        let bag = bag(&backend);

        let prev: Option<bool> = bag.get_or_set("init_started", &true).await.unwrap();
        assert_eq!(prev, None);

        let prev2: Option<bool> = bag.get_or_set("init_started", &true).await.unwrap();
        assert_eq!(prev2, Some(true));
    }

    #[tokio::test]
    async fn delete_clears_every_field() {
        let backend: Arc<dyn KvBackend> = Arc::new(MemoryBackend::new());
        let bag = bag(&backend);
        bag.set("a", &1u32).await.unwrap();
        bag.set("b", &2u32).await.unwrap();
        bag.delete().await.unwrap();
        assert!(!bag.field_exists("a").await.unwrap());
        assert!(!bag.field_exists("b").await.unwrap());
    }
}
