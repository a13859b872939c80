use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;

use super::clock::Clock;

const TOKEN_BYTES: usize = 32;
pub const DEFAULT_HANDSHAKE_TTL: Duration = Duration::minutes(10);

/// Pre-auth form fields carried from the browser to the bot callback.
pub type HandshakePayload = serde_json::Map<String, serde_json::Value>;

/// Principal verified by the bot. Only read once, when it is bound to a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIdentity {
    pub telegram_id: i64,
    pub phone: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("handshake token not found")]
    NotFound,
    #[error("handshake token expired")]
    Expired,
    #[error("handshake has not been confirmed by the bot yet")]
    NotBound,
}

#[derive(Debug, Clone)]
pub struct HandshakeTicket {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Everything a successful consume hands back. Can be put back with [`TokenStore::restore`].
#[derive(Debug, Clone)]
pub struct ConsumedHandshake {
    pub payload: Option<HandshakePayload>,
    pub identity: ExternalIdentity,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct HandshakeEntry {
    payload: Option<HandshakePayload>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    identity: Option<ExternalIdentity>,
}

impl HandshakeEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// In-memory store of pending handshakes.
///
/// Every check-and-mutate happens under one lock acquisition, so a token is
/// consumed at most once no matter how many requests race for it. The lock is
/// never held across an `.await`.
pub struct TokenStore {
    entries: Mutex<HashMap<String, HandshakeEntry>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenStore {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    pub fn issue(&self, payload: Option<HandshakePayload>) -> HandshakeTicket {
        let created_at = self.clock.now();
        let expires_at = created_at + self.ttl;
        let payload = payload.filter(|fields| !fields.is_empty());

        let mut entries = self.lock();
        let token = loop {
            let candidate = generate_token();
            if !entries.contains_key(&candidate) {
                break candidate;
            }
        };

        entries.insert(
            token.clone(),
            HandshakeEntry {
                payload,
                created_at,
                expires_at,
                identity: None,
            },
        );

        HandshakeTicket { token, expires_at }
    }

    /// Returns the attached payload of a live token without changing its state.
    pub fn peek_payload(&self, token: &str) -> Result<Option<HandshakePayload>, TokenError> {
        let now = self.clock.now();
        let mut entries = self.lock();
        let entry = live_entry(&mut entries, token, now)?;
        Ok(entry.payload.clone())
    }

    /// Records the verified identity on the token. A second bind overwrites the first.
    pub fn bind_identity(&self, token: &str, identity: ExternalIdentity) -> Result<(), TokenError> {
        let now = self.clock.now();
        let mut entries = self.lock();
        let entry = live_entry(&mut entries, token, now)?;
        if let Some(previous) = entry.identity.as_ref() {
            if previous.telegram_id != identity.telegram_id {
                tracing::warn!(
                    previous = previous.telegram_id,
                    current = identity.telegram_id,
                    "handshake re-bound to a different telegram account"
                );
            }
        }
        entry.identity = Some(identity);
        Ok(())
    }

    pub fn consume(&self, token: &str) -> Result<ConsumedHandshake, TokenError> {
        let now = self.clock.now();
        let mut entries = self.lock();
        let entry = live_entry(&mut entries, token, now)?;
        if entry.identity.is_none() {
            return Err(TokenError::NotBound);
        }

        let Some(HandshakeEntry {
            payload,
            created_at,
            expires_at,
            identity: Some(identity),
        }) = entries.remove(token)
        else {
            return Err(TokenError::NotFound);
        };

        Ok(ConsumedHandshake {
            payload,
            identity,
            created_at,
            expires_at,
        })
    }

    /// Puts a consumed handshake back after the exchange that consumed it failed.
    /// Does nothing if the key has been reused in the meantime.
    pub fn restore(&self, token: &str, consumed: ConsumedHandshake) {
        let mut entries = self.lock();
        entries
            .entry(token.to_string())
            .or_insert_with(|| HandshakeEntry {
                payload: consumed.payload,
                created_at: consumed.created_at,
                expires_at: consumed.expires_at,
                identity: Some(consumed.identity),
            });
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Periodically evicts expired handshakes until the store is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, period: std::time::Duration) -> JoinHandle<()> {
        let store: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                let removed = store.sweep_expired();
                if removed > 0 {
                    tracing::debug!(removed, "evicted expired handshake tokens");
                }
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, HandshakeEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn live_entry<'a>(
    entries: &'a mut HashMap<String, HandshakeEntry>,
    token: &str,
    now: DateTime<Utc>,
) -> Result<&'a mut HandshakeEntry, TokenError> {
    let expired = match entries.get(token) {
        None => return Err(TokenError::NotFound),
        Some(entry) => entry.is_expired(now),
    };

    if expired {
        entries.remove(token);
        return Err(TokenError::Expired);
    }

    entries.get_mut(token).ok_or(TokenError::NotFound)
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
