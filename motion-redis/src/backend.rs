//! Redis-backed state store implementation.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use motion_store::{LockToken, StateStore, StoreError, StoreResult};
use redis::{Client, aio::ConnectionManager};
use tokio::sync::OnceCell;
use tracing::trace;

use crate::error::Error;

/// Lua script releasing a lock only if the presented token still matches the
/// one currently holding it.
///
/// This is the standard single-node "compare then delete" idiom used in
/// place of a true Redlock deployment: it prevents a caller from releasing a
/// lock that expired and was subsequently re-acquired by someone else.
const UNLOCK_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end
"#;

/// Distributed state store backed by Redis.
///
/// Provides the cross-process durability the Versioned State Container
/// needs: `GET`/`SET` for the serialized state, `INCR` for the version
/// counter, `SET ... NX PX` plus a compare-and-delete Lua script for the
/// named lock, and `PUBLISH`/`SUBSCRIBE` for flush-barrier signaling.
///
/// The connection is established lazily on first use, mirroring
/// `hitbox_redis::RedisBackend`'s rationale: backend instances can be
/// constructed without blocking, and idle backends never pay for a
/// connection they don't use.
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    connection: OnceCell<ConnectionManager>,
}

impl RedisStore {
    /// Creates a new builder for `RedisStore`.
    pub fn builder() -> RedisStoreBuilder {
        RedisStoreBuilder::default()
    }

    async fn connection(&self) -> StoreResult<ConnectionManager> {
        trace!("get redis connection manager");
        let manager = self
            .connection
            .get_or_try_init(|| async {
                trace!("initialize new redis connection manager");
                self.client.get_connection_manager().await
            })
            .await
            .map_err(Error::from)?;
        Ok(manager.clone())
    }
}

/// Builder for [`RedisStore`].
#[derive(Default)]
pub struct RedisStoreBuilder {
    server: Option<String>,
}

impl RedisStoreBuilder {
    /// Sets the Redis connection URL (e.g. `redis://127.0.0.1:6379/`).
    pub fn server(mut self, url: impl Into<String>) -> Self {
        self.server = Some(url.into());
        self
    }

    /// Builds the [`RedisStore`].
    pub fn build(self) -> Result<RedisStore, Error> {
        let server = self.server.ok_or(Error::MissingServer)?;
        Ok(RedisStore {
            client: Client::open(server)?,
            connection: OnceCell::new(),
        })
    }
}

#[async_trait]
impl StateStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Bytes>> {
        let mut conn = self.connection().await?;
        let value: Option<Vec<u8>> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(Error::from)?;
        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value.as_ref());
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl.as_millis() as u64);
        }
        cmd.query_async::<()>(&mut conn).await.map_err(Error::from)?;
        Ok(())
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        let mut conn = self.connection().await?;
        let value: i64 = redis::cmd("INCR")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(Error::from)?;
        Ok(value)
    }

    async fn lock(&self, name: &str, ttl: Duration) -> StoreResult<LockToken> {
        let mut conn = self.connection().await?;
        let token: [u8; 16] = rand_token();
        let acquired: Option<String> = redis::cmd("SET")
            .arg(name)
            .arg(token.as_slice())
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(Error::from)?;
        match acquired {
            Some(_) => Ok(LockToken::new(token.to_vec())),
            None => Err(StoreError::LockContention {
                name: name.to_string(),
            }),
        }
    }

    async fn unlock(&self, name: &str, token: LockToken) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        redis::Script::new(UNLOCK_SCRIPT)
            .key(name)
            .arg(token.as_bytes())
            .invoke_async::<i64>(&mut conn)
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    async fn publish(&self, channel: &str, msg: Bytes) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        redis::cmd("PUBLISH")
            .arg(channel)
            .arg(msg.as_ref())
            .query_async::<i64>(&mut conn)
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> StoreResult<BoxStream<'static, Bytes>> {
        let mut pubsub = self.client.get_async_pubsub().await.map_err(Error::from)?;
        pubsub.subscribe(channel).await.map_err(Error::from)?;
        let stream = pubsub
            .into_on_message()
            .filter_map(|msg| async move { msg.get_payload_bytes().ok().map(Bytes::copy_from_slice) });
        Ok(stream.boxed())
    }
}

/// A process-local random token, good enough to distinguish this lock holder
/// from any other concurrent attempt — it never needs to be cryptographically
/// unpredictable, only unique among concurrent lockers.
fn rand_token() -> [u8; 16] {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hash, Hasher};
    use std::time::{SystemTime, UNIX_EPOCH};

    let mut bytes = [0u8; 16];
    for chunk in bytes.chunks_mut(8) {
        let mut hasher = RandomState::new().build_hasher();
        SystemTime::now().hash(&mut hasher);
        UNIX_EPOCH.elapsed().ok().hash(&mut hasher);
        let value = hasher.finish();
        chunk.copy_from_slice(&value.to_le_bytes()[..chunk.len()]);
    }
    bytes
}
