//! Redis-backed [`TtlStore`], shared by every process pointed at the same
//! server.
//!
//! | trait call     | command                          |
//! |----------------|----------------------------------|
//! | `ping`         | `PING`                           |
//! | `exists`       | `EXISTS key`                     |
//! | `set_ex`       | `SET key value EX secs`          |
//! | `set_nx_ex`    | `SET key value NX EX secs`       |
//! | `push_bounded` | `MULTI LPUSH key v; LTRIM key 0 cap-1 EXEC` |
//! | `range`        | `LRANGE key 0 limit-1`           |

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::RedisError;
use std::time::Duration;

use super::{StoreError, TtlStore};

/// Cloning shares the underlying multiplexed connection.
#[derive(Clone)]
pub struct RedisTtlStore {
    conn: ConnectionManager,
}

impl RedisTtlStore {
    /// Open a managed connection to `url` (`redis://host:port/db`). The
    /// manager reconnects on its own after the initial connect succeeds.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(unavailable)?;
        let conn = ConnectionManager::new(client).await.map_err(unavailable)?;
        Ok(Self { conn })
    }
}

fn unavailable(e: RedisError) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

/// `EX` takes whole seconds and rejects zero.
fn expiry_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

/// Inclusive `stop` index for the first `n` list entries.
fn last_index(n: usize) -> isize {
    isize::try_from(n).unwrap_or(isize::MAX) - 1
}

#[async_trait]
impl TtlStore for RedisTtlStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let n: i64 = redis::cmd("EXISTS")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(n > 0)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(expiry_secs(ttl))
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        // nil when the key already exists
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(expiry_secs(ttl))
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(reply.is_some())
    }

    async fn push_bounded(&self, key: &str, value: String, cap: usize) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .cmd("LPUSH")
            .arg(key)
            .arg(value)
            .ignore()
            .cmd("LTRIM")
            .arg(key)
            .arg(0)
            .arg(last_index(cap.max(1)))
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn range(&self, key: &str, limit: usize) -> Result<Vec<String>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        redis::cmd("LRANGE")
            .arg(key)
            .arg(0)
            .arg(last_index(limit))
            .query_async(&mut conn)
            .await
            .map_err(unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_rounds_up_to_one_second() {
        assert_eq!(expiry_secs(Duration::from_millis(300)), 1);
        assert_eq!(expiry_secs(Duration::from_secs(900)), 900);
    }

    #[test]
    fn list_bounds_are_inclusive() {
        assert_eq!(last_index(1), 0);
        assert_eq!(last_index(500), 499);
        assert_eq!(last_index(usize::MAX), isize::MAX - 1);
    }

    #[tokio::test]
    async fn malformed_url_is_unavailable() {
        let res = RedisTtlStore::connect("not-a-redis-url").await;
        assert!(matches!(res, Err(StoreError::Unavailable(_))));
    }
}
