//! MPC coordination: the transport capability, wire framing and jobs

use crate::Result;
use std::sync::Arc;

pub use ::async_trait::async_trait;

/// Index of a party in a job's roster
pub type PartyIndex = usize;

/// Point-to-point messenger between numbered parties
///
/// Delivery is FIFO per ordered pair `(sender, receiver)`. A transport may
/// surface an abort, in which case pending and future receives fail.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver `bytes` to party `receiver`
    async fn send(&self, receiver: PartyIndex, bytes: Vec<u8>) -> Result<()>;

    /// Wait for the next message from party `sender`
    async fn recv(&self, sender: PartyIndex) -> Result<Vec<u8>>;

    /// Receive one message from each sender, in the order requested
    async fn recv_all(&self, senders: &[PartyIndex]) -> Result<Vec<Vec<u8>>> {
        futures_util::future::try_join_all(senders.iter().map(|&s| self.recv(s))).await
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, receiver: PartyIndex, bytes: Vec<u8>) -> Result<()> {
        (**self).send(receiver, bytes).await
    }

    async fn recv(&self, sender: PartyIndex) -> Result<Vec<u8>> {
        (**self).recv(sender).await
    }

    async fn recv_all(&self, senders: &[PartyIndex]) -> Result<Vec<Vec<u8>>> {
        (**self).recv_all(senders).await
    }
}

/// Jobs driving one protocol run
pub mod job;

/// In-memory transport for local runs and tests
pub mod memory;

/// Length-prefixed framing and byte codecs
pub mod wire;

pub use job::{Job2P, JobMP, Role};
pub use memory::{MemoryNetwork, MemoryTransport};
