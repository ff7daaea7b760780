//! Message Relay Library
//!
//! Store-and-forward mailboxes for MPC traffic. A message is addressed by
//! session, sender, receiver and a per-pair sequence number, so a receiver
//! fetching sequence numbers in order sees each pair's messages FIFO.
//! Messages that nobody collects expire after a TTL.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Relay error types
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Message not found: {0}")]
    NotFound(String),
    #[error("Message already stored: {0}")]
    Duplicate(String),
    #[error("Invalid message format: {0}")]
    InvalidFormat(String),
    #[error("Payload of {0} bytes exceeds limit")]
    TooLarge(usize),
}

pub type Result<T> = std::result::Result<T, RelayError>;

/// Largest payload the relay stores
pub const MAX_PAYLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Message identifier
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct MessageId {
    /// Session identifier
    pub session_id: String,
    /// Sender party index
    pub from: usize,
    /// Receiver party index
    pub to: usize,
    /// Position in the `from → to` stream, starting at zero
    pub seq: u64,
}

impl MessageId {
    pub fn new(session_id: &str, from: usize, to: usize, seq: u64) -> Self {
        Self {
            session_id: session_id.to_string(),
            from,
            to,
            seq,
        }
    }

    /// Lookup key
    pub fn hash(&self) -> String {
        let mut h = blake3::Hasher::new();
        h.update(&(self.session_id.len() as u64).to_be_bytes());
        h.update(self.session_id.as_bytes());
        h.update(&(self.from as u64).to_be_bytes());
        h.update(&(self.to as u64).to_be_bytes());
        h.update(&self.seq.to_be_bytes());
        hex::encode(h.finalize().as_bytes())
    }
}

/// Stored message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: MessageId,
    pub payload: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Message relay store
#[derive(Clone)]
pub struct MessageStore {
    /// Messages indexed by hash
    messages: Arc<DashMap<String, StoredMessage>>,
    /// Default TTL in seconds
    ttl_seconds: i64,
}

impl MessageStore {
    pub fn new(ttl_seconds: i64) -> Self {
        Self {
            messages: Arc::new(DashMap::new()),
            ttl_seconds,
        }
    }

    /// Store a message; a sequence number can be used once per session
    pub fn put(&self, id: MessageId, payload: Vec<u8>) -> Result<()> {
        if payload.len() > MAX_PAYLOAD_BYTES {
            return Err(RelayError::TooLarge(payload.len()));
        }
        if id.from == id.to {
            return Err(RelayError::InvalidFormat("sender and receiver are equal".into()));
        }
        let now = Utc::now();
        let hash = id.hash();
        let message = StoredMessage {
            id,
            payload,
            created_at: now,
            expires_at: now + chrono::Duration::seconds(self.ttl_seconds),
        };

        match self.messages.entry(hash.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(RelayError::Duplicate(hash)),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                debug!(hash = %hash, "message stored");
                slot.insert(message);
                Ok(())
            }
        }
    }

    /// Get a message without removing it
    pub fn get(&self, id: &MessageId) -> Result<StoredMessage> {
        let hash = id.hash();
        self.messages
            .get(&hash)
            .map(|entry| entry.value().clone())
            .ok_or(RelayError::NotFound(hash))
    }

    /// Remove and return a message; each message is delivered once
    pub fn take(&self, id: &MessageId) -> Result<StoredMessage> {
        let hash = id.hash();
        self.messages
            .remove(&hash)
            .map(|(_, msg)| msg)
            .ok_or(RelayError::NotFound(hash))
    }

    pub fn exists(&self, id: &MessageId) -> bool {
        self.messages.contains_key(&id.hash())
    }

    /// Remove expired messages; returns how many were dropped
    pub fn cleanup(&self) -> usize {
        let now = Utc::now();
        let before = self.messages.len();
        self.messages.retain(|_, v| v.expires_at > now);
        let dropped = before.saturating_sub(self.messages.len());
        if dropped > 0 {
            debug!(dropped, "expired messages removed");
        }
        dropped
    }

    /// Number of undelivered messages in a session
    pub fn pending(&self, session_id: &str) -> usize {
        self.messages
            .iter()
            .filter(|entry| entry.id.session_id == session_id)
            .count()
    }
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new(3600) // 1 hour default TTL
    }
}
