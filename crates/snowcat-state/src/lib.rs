//! C2 State Store: [`Bag`] (namespaced atomic KV) and [`Snapshot`]
//! (load-once, explicit-save cursor blob), both built on [`KvBackend`].
//! Values are msgpack-encoded via `rmp-serde`, matching spec.md §6's
//! "self-describing binary (msgpack-like)" encoding note.

pub mod bag;
pub mod snapshot;

pub use bag::Bag;
pub use snapshot::Snapshot;

use snowcat_core::Error;

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, Error> {
    rmp_serde::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, Error> {
    rmp_serde::from_slice(bytes).map_err(|e| Error::Deserialization(e.to_string()))
}
