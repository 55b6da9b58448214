//! Snapshot: an in-memory object loaded from one blob on construction and
//! explicitly saved back as one blob. Field writes are local until
//! [`Snapshot::save`] — used for the hot-path stage cursor, where
//! per-field atomicity is not required (spec.md §4.2).

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use snowcat_backend::KvBackend;
use snowcat_core::{Error, StageName, StreamId};

use crate::{decode, encode};

pub struct Snapshot<T> {
    backend: Arc<dyn KvBackend>,
    key: String,
    value: T,
}

impl<T> Snapshot<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Loads the blob at `{stage}:{stream}:PersistentObject`, or `fresh`
    /// if none exists yet (spec.md §6 key layout, §4.5 step 4 — the
    /// runner merges its own cursor defaults with the stage's own
    /// `defaults` before calling this).
    pub async fn load_with_default(
        backend: Arc<dyn KvBackend>,
        stage: &StageName,
        stream: &StreamId,
        fresh: T,
    ) -> Result<Self, Error> {
        let key = format!("{stage}:{stream}:PersistentObject");
        let value = match backend.get(&key).await? {
            Some(bytes) => decode(&bytes)?,
            None => fresh,
        };
        Ok(Self {
            backend,
            key,
            value,
        })
    }

    #[tracing::instrument(level = "debug", skip(self), fields(key = %self.key))]
    pub async fn save(&self) -> Result<(), Error> {
        let bytes = encode(&self.value)?;
        self.backend.set(&self.key, bytes).await
    }
}

impl<T> Snapshot<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    /// Convenience over [`Snapshot::load_with_default`] for types whose
    /// `Default` already is the right fresh value.
    pub async fn load(
        backend: Arc<dyn KvBackend>,
        stage: &StageName,
        stream: &StreamId,
    ) -> Result<Self, Error> {
        Self::load_with_default(backend, stage, stream, T::default()).await
    }
}

impl<T> Deref for Snapshot<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for Snapshot<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}
