//! Message Relay Client
//!
//! [`RelayTransport`] implements the core [`Transport`] over the relay
//! service's HTTP API. Every ordered pair of parties numbers its messages,
//! so a receiver asking for sequence numbers in order gets them FIFO.

use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tmpc_core::mpc::{async_trait, PartyIndex, Transport};
use tmpc_core::{Error, Result};
use tracing::{debug, instrument};

const COMPONENT: &str = "relay-transport";

/// HTTP-based relay transport for one party of one session
pub struct RelayTransport {
    client: Client,
    /// Relay service URL
    url: String,
    session_id: String,
    index: PartyIndex,
    parties: usize,
    send_seq: Vec<AtomicU64>,
    recv_seq: Vec<AtomicU64>,
    aborted: AtomicBool,
    /// Request timeout
    timeout: Duration,
    /// How long a receive waits for its message
    recv_timeout: Duration,
    poll_interval: Duration,
}

impl RelayTransport {
    pub fn new(url: &str, session_id: &str, index: PartyIndex, parties: usize) -> Self {
        Self {
            client: Client::new(),
            url: url.trim_end_matches('/').to_string(),
            session_id: session_id.to_string(),
            index,
            parties,
            send_seq: (0..parties).map(|_| AtomicU64::new(0)).collect(),
            recv_seq: (0..parties).map(|_| AtomicU64::new(0)).collect(),
            aborted: AtomicBool::new(false),
            timeout: Duration::from_secs(30),
            recv_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_millis(100),
        }
    }

    /// Set request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set how long a receive waits before failing
    pub fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = timeout;
        self
    }

    /// Fail all pending and future receives
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    fn check_peer(&self, peer: PartyIndex) -> Result<()> {
        if peer >= self.parties || peer == self.index {
            return Err(Error::invalid_argument(
                COMPONENT,
                format!("no peer {} for party {}", peer, self.index),
            ));
        }
        Ok(())
    }

    fn failure(&self, peer: PartyIndex, reason: impl Into<String>) -> Error {
        Error::transport(COMPONENT, Some(peer), None, reason)
    }

    #[instrument(skip(self, payload), fields(len = payload.len()))]
    async fn post_message(&self, to: PartyIndex, seq: u64, payload: &[u8]) -> Result<()> {
        let req = PostMessageRequest {
            session_id: self.session_id.clone(),
            from: self.index,
            to,
            seq,
            payload: STANDARD.encode(payload),
        };

        let response = self
            .client
            .post(format!("{}/v1/msg", self.url))
            .json(&req)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.failure(to, e.to_string()))?;

        if !response.status().is_success() {
            return Err(self.failure(
                to,
                format!("POST failed with status: {}", response.status()),
            ));
        }

        debug!("Message posted");
        Ok(())
    }

    /// One poll for message `seq` from `from`
    async fn get_message(&self, from: PartyIndex, seq: u64) -> Result<Option<Vec<u8>>> {
        let from_s = from.to_string();
        let to_s = self.index.to_string();
        let seq_s = seq.to_string();
        let response = self
            .client
            .get(format!("{}/v1/msg", self.url))
            .query(&[
                ("session_id", self.session_id.as_str()),
                ("from", from_s.as_str()),
                ("to", to_s.as_str()),
                ("seq", seq_s.as_str()),
            ])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.failure(from, e.to_string()))?;

        if !response.status().is_success() {
            return Err(self.failure(
                from,
                format!("GET failed with status: {}", response.status()),
            ));
        }

        let msg_response: MessageResponse = response
            .json()
            .await
            .map_err(|e| self.failure(from, e.to_string()))?;

        match (msg_response.found, msg_response.payload) {
            (true, Some(payload)) => STANDARD
                .decode(payload)
                .map(Some)
                .map_err(|e| Error::peer(COMPONENT, from, format!("invalid base64: {}", e))),
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl Transport for RelayTransport {
    async fn send(&self, receiver: PartyIndex, bytes: Vec<u8>) -> Result<()> {
        self.check_peer(receiver)?;
        if self.aborted.load(Ordering::SeqCst) {
            return Err(self.failure(receiver, "aborted"));
        }
        let seq = self.send_seq[receiver].fetch_add(1, Ordering::SeqCst);
        self.post_message(receiver, seq, &bytes).await
    }

    #[instrument(skip(self))]
    async fn recv(&self, sender: PartyIndex) -> Result<Vec<u8>> {
        self.check_peer(sender)?;
        let seq = self.recv_seq[sender].fetch_add(1, Ordering::SeqCst);
        let deadline = tokio::time::Instant::now() + self.recv_timeout;

        loop {
            if self.aborted.load(Ordering::SeqCst) {
                return Err(self.failure(sender, "aborted"));
            }
            if let Some(payload) = self.get_message(sender, seq).await? {
                debug!(seq, "Message received");
                return Ok(payload);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(self.failure(
                    sender,
                    format!("timed out waiting for message {}", seq),
                ));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// Body of `POST /v1/msg`
#[derive(Debug, Serialize, Deserialize)]
pub struct PostMessageRequest {
    pub session_id: String,
    pub from: usize,
    pub to: usize,
    pub seq: u64,
    /// base64 encoded
    pub payload: String,
}

/// Query of `GET /v1/msg`
#[derive(Debug, Serialize, Deserialize)]
pub struct GetMessageQuery {
    pub session_id: String,
    pub from: usize,
    pub to: usize,
    pub seq: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub found: bool,
    /// base64 encoded
    pub payload: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tmpc_core::ErrorKind;

    #[tokio::test]
    async fn test_rejects_unknown_peer() {
        let t = RelayTransport::new("http://127.0.0.1:1", "s", 0, 2);
        let err = t.send(0, vec![1]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        let err = t.recv(2).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_abort_fails_receive() {
        let t = RelayTransport::new("http://127.0.0.1:1", "s", 0, 2);
        t.abort();
        let err = t.recv(1).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(err.peer_index(), Some(1));
    }

    #[test]
    fn test_request_wire_format() {
        let req = PostMessageRequest {
            session_id: "s".into(),
            from: 1,
            to: 0,
            seq: 3,
            payload: STANDARD.encode([1u8, 2]),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["seq"], 3);
        assert_eq!(json["payload"], "AQI=");
    }
}
