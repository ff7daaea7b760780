//! In-memory transport implementation

use super::{async_trait, PartyIndex, Transport};
use crate::{Error, Result};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

struct Shared {
    /// Pending messages: (from, to) -> queue
    mailboxes: DashMap<(PartyIndex, PartyIndex), VecDeque<Vec<u8>>>,
    /// Notification channel
    notify: broadcast::Sender<()>,
    aborted: AtomicBool,
    parties: usize,
}

/// A set of connected in-memory endpoints
#[derive(Clone)]
pub struct MemoryNetwork {
    shared: Arc<Shared>,
}

impl MemoryNetwork {
    /// Create a network for `parties` endpoints
    pub fn new(parties: usize) -> Self {
        let (notify, _) = broadcast::channel(100);
        Self {
            shared: Arc::new(Shared {
                mailboxes: DashMap::new(),
                notify,
                aborted: AtomicBool::new(false),
                parties,
            }),
        }
    }

    /// The endpoint used by party `index`
    pub fn endpoint(&self, index: PartyIndex) -> MemoryTransport {
        MemoryTransport {
            index,
            shared: self.shared.clone(),
        }
    }

    /// One endpoint per party, in index order
    pub fn endpoints(&self) -> Vec<MemoryTransport> {
        (0..self.shared.parties).map(|i| self.endpoint(i)).collect()
    }

    /// Fail every pending and future receive
    pub fn abort(&self) {
        self.shared.aborted.store(true, Ordering::SeqCst);
        let _ = self.shared.notify.send(());
    }
}

/// One party's view of a [`MemoryNetwork`]
#[derive(Clone)]
pub struct MemoryTransport {
    index: PartyIndex,
    shared: Arc<Shared>,
}

impl MemoryTransport {
    pub fn index(&self) -> PartyIndex {
        self.index
    }

    fn check_peer(&self, peer: PartyIndex) -> Result<()> {
        if peer >= self.shared.parties || peer == self.index {
            return Err(Error::invalid_argument(
                "memory-transport",
                format!("no peer {} for party {}", peer, self.index),
            ));
        }
        Ok(())
    }

    fn check_aborted(&self, peer: PartyIndex) -> Result<()> {
        if self.shared.aborted.load(Ordering::SeqCst) {
            return Err(Error::transport("memory-transport", Some(peer), None, "aborted"));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, receiver: PartyIndex, bytes: Vec<u8>) -> Result<()> {
        self.check_peer(receiver)?;
        self.check_aborted(receiver)?;

        self.shared
            .mailboxes
            .entry((self.index, receiver))
            .or_default()
            .push_back(bytes);

        let _ = self.shared.notify.send(());
        Ok(())
    }

    async fn recv(&self, sender: PartyIndex) -> Result<Vec<u8>> {
        self.check_peer(sender)?;
        let mut rx = self.shared.notify.subscribe();

        loop {
            self.check_aborted(sender)?;

            let popped = self
                .shared
                .mailboxes
                .get_mut(&(sender, self.index))
                .and_then(|mut queue| queue.pop_front());
            if let Some(bytes) = popped {
                return Ok(bytes);
            }

            // Wait for notification with timeout
            tokio::select! {
                _ = rx.recv() => continue,
                _ = tokio::time::sleep(std::time::Duration::from_millis(100)) => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fifo_per_pair() {
        let net = MemoryNetwork::new(3);
        let a = net.endpoint(0);
        let c = net.endpoint(2);

        a.send(2, vec![1]).await.unwrap();
        a.send(2, vec![2]).await.unwrap();

        assert_eq!(c.recv(0).await.unwrap(), vec![1]);
        assert_eq!(c.recv(0).await.unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn test_recv_all_preserves_order() {
        let net = MemoryNetwork::new(3);
        let eps = net.endpoints();

        eps[2].send(0, b"from-2".to_vec()).await.unwrap();
        eps[1].send(0, b"from-1".to_vec()).await.unwrap();

        let msgs = eps[0].recv_all(&[1, 2]).await.unwrap();
        assert_eq!(msgs, vec![b"from-1".to_vec(), b"from-2".to_vec()]);
    }

    #[tokio::test]
    async fn test_abort_fails_pending_recv() {
        let net = MemoryNetwork::new(2);
        let b = net.endpoint(1);

        let pending = tokio::spawn(async move { b.recv(0).await });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        net.abort();

        let err = pending.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Transport);
    }

    #[tokio::test]
    async fn test_rejects_self_and_unknown_peers() {
        let net = MemoryNetwork::new(2);
        let a = net.endpoint(0);
        assert!(a.send(0, vec![]).await.is_err());
        assert!(a.send(5, vec![]).await.is_err());
    }
}
