//! Pinned ranking sessions.
//!
//! A session freezes the ranked id order a client saw on its first page
//! so later pages slice the same sequence, no matter how the live
//! ranking moves in between. Sessions are keyed per authenticated user
//! or per anonymous address, and expire on a short TTL rather than being
//! invalidated.

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::cache::Keyspace;
use crate::store::KeyedStore;
use crate::types::{ContentId, EmberlineError, Result};

/// Default lifetime of a pinned session.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(300);

/// Identity a session is pinned under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientKey {
    User(u64),
    Anonymous(IpAddr),
}

impl ClientKey {
    /// The authenticated viewer, if this client has one.
    pub fn viewer_id(&self) -> Option<u64> {
        match self {
            ClientKey::User(id) => Some(*id),
            ClientKey::Anonymous(_) => None,
        }
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientKey::User(id) => write!(f, "user:{id}"),
            ClientKey::Anonymous(addr) => write!(f, "ip:{addr}"),
        }
    }
}

/// Store for pinned session snapshots.
#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn KeyedStore>,
    keyspace: Keyspace,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(store: Arc<dyn KeyedStore>, keyspace: &Keyspace, ttl: Duration) -> Self {
        Self {
            store,
            keyspace: keyspace.clone(),
            ttl,
        }
    }

    /// Store using [`DEFAULT_SESSION_TTL`] for every pin.
    pub fn with_default_ttl(store: Arc<dyn KeyedStore>, keyspace: &Keyspace) -> Self {
        Self::new(store, keyspace, DEFAULT_SESSION_TTL)
    }

    /// Pin an id sequence for this client, replacing any live session.
    pub async fn pin(&self, client: &ClientKey, ids: &[ContentId]) -> Result<()> {
        let key = self.keyspace.scoped(&client.to_string());
        let payload = serde_json::to_string(ids)
            .map_err(|e| EmberlineError::Codec(format!("Failed to encode session: {e}")))?;
        self.store.put_with_ttl(&key, &payload, self.ttl).await?;
        debug!(key = %key, ids = ids.len(), "Pinned session");
        Ok(())
    }

    /// Fetch the client's live session, if one exists.
    ///
    /// An undecodable snapshot reads as absent so the caller pins a
    /// fresh one over it.
    pub async fn fetch(&self, client: &ClientKey) -> Result<Option<Vec<ContentId>>> {
        let key = self.keyspace.scoped(&client.to_string());
        let payload = match self.store.fetch(&key).await? {
            Some(payload) => payload,
            None => return Ok(None),
        };
        match serde_json::from_str(&payload) {
            Ok(ids) => Ok(Some(ids)),
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding undecodable session");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn sessions(ttl: Duration) -> (Arc<MemoryStore>, SessionStore) {
        let store = Arc::new(MemoryStore::new());
        let sessions = SessionStore::new(store.clone(), &Keyspace::new("cached_sessions", 2), ttl);
        (store, sessions)
    }

    #[tokio::test]
    async fn test_pin_then_fetch_round_trip() {
        let (_, sessions) = sessions(Duration::from_secs(300));
        let client = ClientKey::User(42);
        sessions.pin(&client, &[9, 3, 7]).await.unwrap();
        assert_eq!(sessions.fetch(&client).await.unwrap(), Some(vec![9, 3, 7]));
    }

    #[tokio::test]
    async fn test_fetch_without_session_is_none() {
        let (_, sessions) = sessions(Duration::from_secs(300));
        assert_eq!(sessions.fetch(&ClientKey::User(1)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_default_ttl_round_trips() {
        assert_eq!(DEFAULT_SESSION_TTL, Duration::from_secs(300));

        let store = Arc::new(MemoryStore::new());
        let sessions =
            SessionStore::with_default_ttl(store, &Keyspace::new("cached_sessions", 2));
        let client = ClientKey::User(7);
        sessions.pin(&client, &[5, 1]).await.unwrap();
        assert_eq!(sessions.fetch(&client).await.unwrap(), Some(vec![5, 1]));
    }

    #[tokio::test]
    async fn test_session_expires() {
        let (_, sessions) = sessions(Duration::from_millis(10));
        let client = ClientKey::User(42);
        sessions.pin(&client, &[1, 2]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(sessions.fetch(&client).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_undecodable_session_reads_as_absent() {
        let (store, sessions) = sessions(Duration::from_secs(300));
        let client = ClientKey::User(42);
        store
            .put_with_ttl(
                "cached_sessions/v2:user:42",
                "not ids",
                Duration::from_secs(300),
            )
            .await
            .unwrap();
        assert_eq!(sessions.fetch(&client).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_clients_do_not_share_sessions() {
        let (_, sessions) = sessions(Duration::from_secs(300));
        let user = ClientKey::User(42);
        let anon = ClientKey::Anonymous("203.0.113.9".parse().unwrap());

        sessions.pin(&user, &[1, 2]).await.unwrap();
        sessions.pin(&anon, &[3, 4]).await.unwrap();

        assert_eq!(sessions.fetch(&user).await.unwrap(), Some(vec![1, 2]));
        assert_eq!(sessions.fetch(&anon).await.unwrap(), Some(vec![3, 4]));
    }
}
