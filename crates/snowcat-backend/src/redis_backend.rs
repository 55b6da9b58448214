//! Redis-backed [`KvBackend`], grounded directly in
//! `original_source/snowcat/utils/redis_utils.py`'s `RedisList`: a hash
//! keyed by `__length__`/`__offset__` plus one field per absolute index,
//! mutated through small Lua scripts for atomicity. The mark/reclaim
//! script generalizes the original's single-offset `remfirstn`/`lpop` to
//! the spec's per-consumer marks with reclaim-to-minimum-mark semantics
//! (spec.md §4.1).

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use snowcat_core::Error;

use crate::trait_def::KvBackend;

fn backend_err(e: redis::RedisError) -> Error {
    Error::Backend(e.to_string())
}

/// Connects lazily and reconnects transparently via [`ConnectionManager`].
pub struct RedisBackend {
    conn: ConnectionManager,
}

impl RedisBackend {
    pub async fn connect(url: &str) -> Result<Self, Error> {
        let client = redis::Client::open(url).map_err(backend_err)?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(backend_err)?;
        Ok(Self { conn })
    }
}

const SCRIPT_LOG_APPEND: &str = r#"
local key = KEYS[1]
local length = tonumber(redis.call('HGET', key, '__length__')) or 0
for i, v in ipairs(ARGV) do
  redis.call('HSET', key, tostring(length + i - 1), v)
end
length = length + #ARGV
redis.call('HSET', key, '__length__', length)
return length
"#;

const SCRIPT_LOG_GET: &str = r#"
local key = KEYS[1]
local idx = tonumber(ARGV[1])
local length = tonumber(redis.call('HGET', key, '__length__')) or 0
local offset = tonumber(redis.call('HGET', key, '__offset__')) or 0
if idx < offset or idx >= length then return false end
return redis.call('HGET', key, tostring(idx))
"#;

const SCRIPT_LOG_GET_MANY: &str = r#"
local key = KEYS[1]
local length = tonumber(redis.call('HGET', key, '__length__')) or 0
local offset = tonumber(redis.call('HGET', key, '__offset__')) or 0
local res = {}
for i, v in ipairs(ARGV) do
  local idx = tonumber(v)
  if idx < offset or idx >= length then
    res[i] = false
  else
    res[i] = redis.call('HGET', key, tostring(idx))
  end
end
return res
"#;

const SCRIPT_LOG_MARK: &str = r#"
local data_key = KEYS[1]
local marks_key = KEYS[2]
local consumer = ARGV[1]
local has_index = ARGV[2]
local length = tonumber(redis.call('HGET', data_key, '__length__')) or 0
local offset = tonumber(redis.call('HGET', data_key, '__offset__')) or 0

if has_index == '' then
  if redis.call('HEXISTS', marks_key, consumer) == 0 then
    redis.call('HSET', marks_key, consumer, 0)
  end
else
  local idx = tonumber(has_index)
  if idx > length then idx = length end
  if idx < 0 then idx = 0 end
  redis.call('HSET', marks_key, consumer, idx)
end

local all = redis.call('HGETALL', marks_key)
local min_mark = length
for i = 2, #all, 2 do
  local v = tonumber(all[i])
  if v < min_mark then min_mark = v end
end

if min_mark > offset then
  for i = offset, min_mark - 1 do
    redis.call('HDEL', data_key, tostring(i))
  end
  redis.call('HSET', data_key, '__offset__', min_mark)
end

return min_mark
"#;

const SCRIPT_LOG_POP_FRONT: &str = r#"
local key = KEYS[1]
local offset = tonumber(redis.call('HGET', key, '__offset__')) or 0
local length = tonumber(redis.call('HGET', key, '__length__')) or 0
if offset >= length then return false end
local res = redis.call('HGET', key, tostring(offset))
redis.call('HDEL', key, tostring(offset))
redis.call('HSET', key, '__offset__', offset + 1)
return res
"#;

const SCRIPT_LOG_COMPACT: &str = r#"
local key = KEYS[1]
local offset = tonumber(redis.call('HGET', key, '__offset__')) or 0
local length = tonumber(redis.call('HGET', key, '__length__')) or 0
local upto = tonumber(ARGV[1])
if upto > length then upto = length end
if upto > offset then
  for i = offset, upto - 1 do
    redis.call('HDEL', key, tostring(i))
  end
  redis.call('HSET', key, '__offset__', upto)
end
return upto
"#;

const SCRIPT_HASH_GET_OR_SET: &str = r#"
local key = KEYS[1]
local field = ARGV[1]
local new_val = ARGV[2]
local existing = redis.call('HGET', key, field)
if existing then
  return existing
end
redis.call('HSET', key, field, new_val)
return false
"#;

const SCRIPT_DELETE_IF_EQ: &str = r#"
local key = KEYS[1]
local expected = ARGV[1]
local current = redis.call('GET', key)
if current == expected then
  redis.call('DEL', key)
  return 1
end
return 0
"#;

#[async_trait]
impl KvBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(backend_err)
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), Error> {
        let mut conn = self.conn.clone();
        conn.set(key, value).await.map_err(backend_err)
    }

    async fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<(), Error> {
        let mut conn = self.conn.clone();
        conn.set_ex(key, value, ttl_secs).await.map_err(backend_err)
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await.map_err(backend_err)?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, Error> {
        let mut conn = self.conn.clone();
        conn.exists(key).await.map_err(backend_err)
    }

    async fn set_nx_ttl(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<bool, Error> {
        let mut conn = self.conn.clone();
        let opts = redis::SetOptions::default()
            .conditional_set(redis::ExistenceCheck::NX)
            .with_expiration(redis::SetExpiry::EX(ttl_secs as usize));
        let result: Option<String> = conn.set_options(key, value, opts).await.map_err(backend_err)?;
        Ok(result.is_some())
    }

    async fn delete_if_eq(&self, key: &str, expected: &[u8]) -> Result<bool, Error> {
        let mut conn = self.conn.clone();
        let result: i64 = Script::new(SCRIPT_DELETE_IF_EQ)
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok(result == 1)
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, Error> {
        let mut conn = self.conn.clone();
        let pattern = format!("{prefix}*");
        let mut cursor = 0u64;
        let mut out = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await
                .map_err(backend_err)?;
            out.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(out)
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>, Error> {
        let mut conn = self.conn.clone();
        conn.hget(key, field).await.map_err(backend_err)
    }

    async fn hash_set(&self, key: &str, field: &str, value: Vec<u8>) -> Result<(), Error> {
        let mut conn = self.conn.clone();
        let _: () = conn.hset(key, field, value).await.map_err(backend_err)?;
        Ok(())
    }

    async fn hash_get_or_set(
        &self,
        key: &str,
        field: &str,
        new: Vec<u8>,
    ) -> Result<Option<Vec<u8>>, Error> {
        let mut conn = self.conn.clone();
        let result: Option<Vec<u8>> = Script::new(SCRIPT_HASH_GET_OR_SET)
            .key(key)
            .arg(field)
            .arg(new)
            .invoke_async(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok(result)
    }

    async fn log_append(&self, key: &str, values: Vec<Vec<u8>>) -> Result<u64, Error> {
        let mut conn = self.conn.clone();
        let mut invocation = Script::new(SCRIPT_LOG_APPEND).key(key).to_owned();
        for v in &values {
            invocation.arg(v);
        }
        invocation.invoke_async(&mut conn).await.map_err(backend_err)
    }

    async fn log_len(&self, key: &str) -> Result<u64, Error> {
        let mut conn = self.conn.clone();
        let v: Option<u64> = conn.hget(key, "__length__").await.map_err(backend_err)?;
        Ok(v.unwrap_or(0))
    }

    async fn log_base_offset(&self, key: &str) -> Result<u64, Error> {
        let mut conn = self.conn.clone();
        let v: Option<u64> = conn.hget(key, "__offset__").await.map_err(backend_err)?;
        Ok(v.unwrap_or(0))
    }

    async fn log_get(&self, key: &str, index: u64) -> Result<Option<Vec<u8>>, Error> {
        let mut conn = self.conn.clone();
        Script::new(SCRIPT_LOG_GET)
            .key(key)
            .arg(index)
            .invoke_async(&mut conn)
            .await
            .map_err(backend_err)
    }

    async fn log_get_many(&self, key: &str, indices: &[u64]) -> Result<Vec<Option<Vec<u8>>>, Error> {
        if indices.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let mut invocation = Script::new(SCRIPT_LOG_GET_MANY).key(key).to_owned();
        for i in indices {
            invocation.arg(*i);
        }
        invocation.invoke_async(&mut conn).await.map_err(backend_err)
    }

    async fn log_mark(
        &self,
        key: &str,
        marks_key: &str,
        consumer: &str,
        index: Option<u64>,
    ) -> Result<u64, Error> {
        let mut conn = self.conn.clone();
        let index_arg = index.map(|i| i.to_string()).unwrap_or_default();
        Script::new(SCRIPT_LOG_MARK)
            .key(key)
            .key(marks_key)
            .arg(consumer)
            .arg(index_arg)
            .invoke_async(&mut conn)
            .await
            .map_err(backend_err)
    }

    async fn log_unmark(&self, marks_key: &str, consumer: &str) -> Result<(), Error> {
        let mut conn = self.conn.clone();
        let _: () = conn.hdel(marks_key, consumer).await.map_err(backend_err)?;
        Ok(())
    }

    async fn log_marks(&self, marks_key: &str) -> Result<Vec<(String, u64)>, Error> {
        let mut conn = self.conn.clone();
        let map: std::collections::HashMap<String, u64> =
            conn.hgetall(marks_key).await.map_err(backend_err)?;
        Ok(map.into_iter().collect())
    }

    async fn log_pop_front(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        let mut conn = self.conn.clone();
        Script::new(SCRIPT_LOG_POP_FRONT)
            .key(key)
            .invoke_async(&mut conn)
            .await
            .map_err(backend_err)
    }

    async fn log_compact(&self, key: &str, upto: u64) -> Result<(), Error> {
        let mut conn = self.conn.clone();
        let _: u64 = Script::new(SCRIPT_LOG_COMPACT)
            .key(key)
            .arg(upto)
            .invoke_async(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok(())
    }

    async fn log_drop(&self, key: &str, marks_key: &str) -> Result<(), Error> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(&[key, marks_key]).await.map_err(backend_err)?;
        Ok(())
    }
}
