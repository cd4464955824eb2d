use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use std::time::Duration;

use super::{HashFields, SharedStore};
use crate::errors::GatewayResult;

/// ARGV layout: n, n field/value pairs expected, m, m field/value pairs to write
const COMPARE_AND_SET_SCRIPT: &str = r#"
local n = tonumber(ARGV[1])
if n == 0 then
  if redis.call('EXISTS', KEYS[1]) == 1 then return 0 end
else
  for i = 1, n do
    if redis.call('HGET', KEYS[1], ARGV[2 * i]) ~= ARGV[2 * i + 1] then return 0 end
  end
end
local base = 2 + n * 2
local m = tonumber(ARGV[base])
for i = 1, m do
  redis.call('HSET', KEYS[1], ARGV[base + 2 * i - 1], ARGV[base + 2 * i])
end
return 1
"#;

/// Redis-backed store shared by every gateway instance
///
/// `ConnectionManager` reconnects on its own and is cheap to clone, so each
/// operation works on its own handle.
pub struct RedisStore {
    conn: ConnectionManager,
    cas_script: Script,
}

impl RedisStore {
    pub async fn connect(url: &str) -> GatewayResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            cas_script: Script::new(COMPARE_AND_SET_SCRIPT),
        })
    }
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn hash_get_all(&self, key: &str) -> GatewayResult<HashFields> {
        let mut conn = self.conn.clone();
        let fields: HashFields = conn.hgetall(key).await?;
        Ok(fields)
    }

    async fn hash_compare_and_set(
        &self,
        key: &str,
        expected: &HashFields,
        new: &HashFields,
    ) -> GatewayResult<bool> {
        let mut invocation = self.cas_script.prepare_invoke();
        invocation.key(key).arg(expected.len());
        for (field, value) in expected {
            invocation.arg(field).arg(value);
        }
        invocation.arg(new.len());
        for (field, value) in new {
            invocation.arg(field).arg(value);
        }

        let mut conn = self.conn.clone();
        let written: i64 = invocation.invoke_async(&mut conn).await?;
        Ok(written == 1)
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> GatewayResult<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
