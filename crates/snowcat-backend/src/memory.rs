//! In-process `dashmap`-backed [`KvBackend`]. No external dependencies —
//! suitable for tests and single-process deployments (spec.md §4.7: "an
//! embedded KV ... is acceptable").

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use snowcat_core::Error;

use crate::trait_def::KvBackend;

struct ScalarEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl ScalarEntry {
    fn is_live(&self) -> bool {
        match self.expires_at {
            Some(at) => Instant::now() < at,
            None => true,
        }
    }
}

#[derive(Default)]
struct LogCore {
    length: u64,
    base_offset: u64,
    entries: HashMap<u64, Vec<u8>>,
}

/// An in-memory [`KvBackend`]. Every method is individually atomic via a
/// per-key lock; there is no cross-key transactionality (none is required
/// by spec.md).
#[derive(Default)]
pub struct MemoryBackend {
    scalars: DashMap<String, ScalarEntry>,
    hashes: DashMap<String, Mutex<HashMap<String, Vec<u8>>>>,
    logs: DashMap<String, Mutex<LogCore>>,
    marks: DashMap<String, Mutex<HashMap<String, u64>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        let live = self
            .scalars
            .get(key)
            .filter(|e| e.is_live())
            .map(|e| e.value.clone());
        if live.is_none() {
            // lazily drop an expired entry
            self.scalars.remove_if(key, |_, e| !e.is_live());
        }
        Ok(live)
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), Error> {
        self.scalars.insert(
            key.to_string(),
            ScalarEntry {
                value,
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<(), Error> {
        self.scalars.insert(
            key.to_string(),
            ScalarEntry {
                value,
                expires_at: Some(Instant::now() + Duration::from_secs(ttl_secs)),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        self.scalars.remove(key);
        self.hashes.remove(key);
        self.logs.remove(key);
        self.marks.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, Error> {
        Ok(self.get(key).await?.is_some())
    }

    async fn set_nx_ttl(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<bool, Error> {
        // Evict an expired entry first so a stale lease doesn't block re-acquisition.
        self.scalars.remove_if(key, |_, e| !e.is_live());
        match self.scalars.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Ok(false),
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(ScalarEntry {
                    value,
                    expires_at: Some(Instant::now() + Duration::from_secs(ttl_secs)),
                });
                Ok(true)
            }
        }
    }

    async fn delete_if_eq(&self, key: &str, expected: &[u8]) -> Result<bool, Error> {
        let removed = self
            .scalars
            .remove_if(key, |_, e| e.is_live() && e.value == expected);
        Ok(removed.is_some())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, Error> {
        let mut out: Vec<String> = self
            .scalars
            .iter()
            .filter(|e| e.is_live())
            .map(|e| e.key().clone())
            .filter(|k| k.starts_with(prefix))
            .collect();
        out.extend(
            self.hashes
                .iter()
                .map(|e| e.key().clone())
                .filter(|k| k.starts_with(prefix)),
        );
        out.extend(
            self.logs
                .iter()
                .map(|e| e.key().clone())
                .filter(|k| k.starts_with(prefix)),
        );
        out.extend(
            self.marks
                .iter()
                .map(|e| e.key().clone())
                .filter(|k| k.starts_with(prefix)),
        );
        Ok(out)
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>, Error> {
        let entry = self.hashes.get(key);
        Ok(entry.and_then(|m| m.lock().unwrap().get(field).cloned()))
    }

    async fn hash_set(&self, key: &str, field: &str, value: Vec<u8>) -> Result<(), Error> {
        let entry = self
            .hashes
            .entry(key.to_string())
            .or_insert_with(|| Mutex::new(HashMap::new()));
        entry.lock().unwrap().insert(field.to_string(), value);
        Ok(())
    }

    async fn hash_get_or_set(
        &self,
        key: &str,
        field: &str,
        new: Vec<u8>,
    ) -> Result<Option<Vec<u8>>, Error> {
        let entry = self
            .hashes
            .entry(key.to_string())
            .or_insert_with(|| Mutex::new(HashMap::new()));
        let mut map = entry.lock().unwrap();
        match map.get(field).cloned() {
            Some(prev) => Ok(Some(prev)),
            None => {
                map.insert(field.to_string(), new);
                Ok(None)
            }
        }
    }

    async fn log_append(&self, key: &str, values: Vec<Vec<u8>>) -> Result<u64, Error> {
        let entry = self
            .logs
            .entry(key.to_string())
            .or_insert_with(|| Mutex::new(LogCore::default()));
        let mut log = entry.lock().unwrap();
        for v in values {
            let idx = log.length;
            log.entries.insert(idx, v);
            log.length += 1;
        }
        Ok(log.length)
    }

    async fn log_len(&self, key: &str) -> Result<u64, Error> {
        Ok(self.logs.get(key).map(|l| l.lock().unwrap().length).unwrap_or(0))
    }

    async fn log_base_offset(&self, key: &str) -> Result<u64, Error> {
        Ok(self
            .logs
            .get(key)
            .map(|l| l.lock().unwrap().base_offset)
            .unwrap_or(0))
    }

    async fn log_get(&self, key: &str, index: u64) -> Result<Option<Vec<u8>>, Error> {
        let Some(entry) = self.logs.get(key) else {
            return Ok(None);
        };
        let log = entry.lock().unwrap();
        if index < log.base_offset || index >= log.length {
            return Ok(None);
        }
        Ok(log.entries.get(&index).cloned())
    }

    async fn log_get_many(&self, key: &str, indices: &[u64]) -> Result<Vec<Option<Vec<u8>>>, Error> {
        let Some(entry) = self.logs.get(key) else {
            return Ok(vec![None; indices.len()]);
        };
        let log = entry.lock().unwrap();
        Ok(indices
            .iter()
            .map(|i| {
                if *i < log.base_offset || *i >= log.length {
                    None
                } else {
                    log.entries.get(i).cloned()
                }
            })
            .collect())
    }

    async fn log_mark(
        &self,
        key: &str,
        marks_key: &str,
        consumer: &str,
        index: Option<u64>,
    ) -> Result<u64, Error> {
        let log_entry = self
            .logs
            .entry(key.to_string())
            .or_insert_with(|| Mutex::new(LogCore::default()));
        let mut log = log_entry.lock().unwrap();
        let length = log.length;

        let marks_entry = self
            .marks
            .entry(marks_key.to_string())
            .or_insert_with(|| Mutex::new(HashMap::new()));
        let min_mark = {
            let mut marks = marks_entry.lock().unwrap();
            match index {
                Some(i) => {
                    marks.insert(consumer.to_string(), i.min(length));
                }
                None => {
                    marks.entry(consumer.to_string()).or_insert(0);
                }
            }
            marks.values().copied().min().unwrap_or(length)
        };

        if min_mark > log.base_offset {
            for idx in log.base_offset..min_mark {
                log.entries.remove(&idx);
            }
            log.base_offset = min_mark;
        }
        Ok(min_mark)
    }

    async fn log_unmark(&self, marks_key: &str, consumer: &str) -> Result<(), Error> {
        if let Some(entry) = self.marks.get(marks_key) {
            entry.lock().unwrap().remove(consumer);
        }
        Ok(())
    }

    async fn log_marks(&self, marks_key: &str) -> Result<Vec<(String, u64)>, Error> {
        Ok(self
            .marks
            .get(marks_key)
            .map(|m| m.lock().unwrap().iter().map(|(k, v)| (k.clone(), *v)).collect())
            .unwrap_or_default())
    }

    async fn log_pop_front(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        let Some(entry) = self.logs.get(key) else {
            return Ok(None);
        };
        let mut log = entry.lock().unwrap();
        if log.base_offset >= log.length {
            return Ok(None);
        }
        let idx = log.base_offset;
        let val = log.entries.remove(&idx);
        log.base_offset += 1;
        Ok(val)
    }

    async fn log_compact(&self, key: &str, upto: u64) -> Result<(), Error> {
        let Some(entry) = self.logs.get(key) else {
            return Ok(());
        };
        let mut log = entry.lock().unwrap();
        let upto = upto.min(log.length);
        if upto > log.base_offset {
            for idx in log.base_offset..upto {
                log.entries.remove(&idx);
            }
            log.base_offset = upto;
        }
        Ok(())
    }

    async fn log_drop(&self, key: &str, marks_key: &str) -> Result<(), Error> {
        self.logs.remove(key);
        self.marks.remove(marks_key);
        Ok(())
    }
}
