//! Per-invocation protocol coordinators
//!
//! A job owns its transport, knows the roster and its own index, and counts
//! rounds. Typed messages travel inside an envelope carrying the round
//! number so that a message from the wrong step is caught as a protocol
//! violation instead of being misparsed.

use super::wire::{frame, unframe};
use super::{PartyIndex, Transport};
use crate::curve::Curve;
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::trace;

#[derive(Serialize, Deserialize)]
struct Envelope<M> {
    round: u32,
    body: M,
}

#[derive(Serialize, Deserialize)]
struct RoundMsg<B, P> {
    broadcast: B,
    direct: Option<P>,
}

/// Multi-party job over `N ≥ 2` named parties
pub struct JobMP<T: Transport> {
    transport: T,
    roster: Vec<String>,
    index: PartyIndex,
    round: u32,
}

impl<T: Transport> JobMP<T> {
    pub fn new(transport: T, index: PartyIndex, roster: Vec<String>) -> Result<Self> {
        if roster.len() < 2 {
            return Err(Error::invalid_argument("job", "roster needs at least two parties"));
        }
        if index >= roster.len() {
            return Err(Error::invalid_argument(
                "job",
                format!("role index {} outside roster of {}", index, roster.len()),
            ));
        }
        for (i, name) in roster.iter().enumerate() {
            if name.is_empty() {
                return Err(Error::invalid_argument("job", "empty party name"));
            }
            if roster[..i].contains(name) {
                return Err(Error::invalid_argument(
                    "job",
                    format!("duplicate party name {}", name),
                ));
            }
        }
        Ok(Self {
            transport,
            roster,
            index,
            round: 0,
        })
    }

    pub fn role_index(&self) -> PartyIndex {
        self.index
    }

    pub fn is_role(&self, index: PartyIndex) -> bool {
        self.index == index
    }

    pub fn party_count(&self) -> usize {
        self.roster.len()
    }

    pub fn party_name(&self, index: PartyIndex) -> Result<&str> {
        self.roster
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| Error::invalid_argument("job", format!("no party {}", index)))
    }

    pub fn my_name(&self) -> &str {
        &self.roster[self.index]
    }

    pub fn roster(&self) -> &[String] {
        &self.roster
    }

    pub fn index_of(&self, name: &str) -> Option<PartyIndex> {
        self.roster.iter().position(|n| n == name)
    }

    /// Current round number; zero before the first typed message
    pub fn round(&self) -> u32 {
        self.round
    }

    /// Indices of every other party, ascending
    pub fn others(&self) -> Vec<PartyIndex> {
        (0..self.roster.len()).filter(|&i| i != self.index).collect()
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Session id to use: `given` when non-empty, otherwise
    /// `SHA-256(curve nid ‖ N ‖ len ‖ name ...)` over the ordered roster
    pub fn derive_sid(&self, curve: Curve, given: &[u8]) -> Vec<u8> {
        if !given.is_empty() {
            return given.to_vec();
        }
        let mut h = Sha256::new();
        h.update(b"tmpc/session-id");
        h.update(curve.nid().to_be_bytes());
        h.update((self.roster.len() as u32).to_be_bytes());
        for name in &self.roster {
            h.update((name.len() as u32).to_be_bytes());
            h.update(name.as_bytes());
        }
        h.finalize().to_vec()
    }

    fn check_peer(&self, peer: PartyIndex) -> Result<()> {
        if peer >= self.roster.len() || peer == self.index {
            return Err(Error::invalid_argument(
                "job",
                format!("party {} is not a peer of {}", peer, self.index),
            ));
        }
        Ok(())
    }

    fn locate(&self, err: Error, peer: PartyIndex) -> Error {
        match err {
            Error::Transport {
                component,
                peer: p,
                round,
                reason,
            } => Error::Transport {
                component,
                peer: p.or(Some(peer)),
                round: round.or(Some(self.round)),
                reason,
            },
            other => other.blame(peer),
        }
    }

    /// Send raw bytes to party `i`
    pub async fn send_to(&self, i: PartyIndex, bytes: &[u8]) -> Result<()> {
        self.check_peer(i)?;
        let framed = frame(bytes)?;
        self.transport
            .send(i, framed)
            .await
            .map_err(|e| self.locate(e, i))
    }

    /// Receive raw bytes from party `i`
    pub async fn recv_from(&self, i: PartyIndex) -> Result<Vec<u8>> {
        self.check_peer(i)?;
        let raw = self
            .transport
            .recv(i)
            .await
            .map_err(|e| self.locate(e, i))?;
        unframe(&raw).map(<[u8]>::to_vec).map_err(|e| e.blame(i))
    }

    /// Receive one raw message from each of `senders`, in that order
    pub async fn recv_from_all(&self, senders: &[PartyIndex]) -> Result<Vec<Vec<u8>>> {
        for &s in senders {
            self.check_peer(s)?;
        }
        let raw = self.transport.recv_all(senders).await.map_err(|e| match e {
            Error::Transport {
                component,
                peer,
                round,
                reason,
            } => Error::Transport {
                component,
                peer,
                round: round.or(Some(self.round)),
                reason,
            },
            other => other,
        })?;
        raw.iter()
            .zip(senders)
            .map(|(bytes, &s)| unframe(bytes).map(<[u8]>::to_vec).map_err(|e| e.blame(s)))
            .collect()
    }

    /// Send the same bytes to every other party
    pub async fn broadcast_to_others(&self, bytes: &[u8]) -> Result<()> {
        for i in self.others() {
            self.send_to(i, bytes).await?;
        }
        Ok(())
    }

    fn seal<M: Serialize>(&self, body: &M) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&Envelope {
            round: self.round,
            body,
        })?)
    }

    fn open<M: DeserializeOwned>(&self, from: PartyIndex, bytes: &[u8]) -> Result<M> {
        let env: Envelope<M> = serde_json::from_slice(bytes)
            .map_err(|e| Error::peer("job", from, format!("malformed message: {}", e)))?;
        if env.round != self.round {
            return Err(Error::peer(
                "job",
                from,
                format!("message for round {} during round {}", env.round, self.round),
            ));
        }
        Ok(env.body)
    }

    /// Send one typed message to party `i` as its own round
    pub async fn send_msg_to<M: Serialize>(&mut self, i: PartyIndex, msg: &M) -> Result<()> {
        self.round += 1;
        let bytes = self.seal(msg)?;
        self.send_to(i, &bytes).await
    }

    /// Receive one typed message from party `i` as its own round
    pub async fn recv_msg_from<M: DeserializeOwned>(&mut self, i: PartyIndex) -> Result<M> {
        self.round += 1;
        let bytes = self.recv_from(i).await?;
        self.open(i, &bytes)
    }

    /// All-to-all broadcast round; the result is indexed by party and
    /// includes our own message
    pub async fn exchange<M>(&mut self, msg: &M) -> Result<Vec<M>>
    where
        M: Serialize + DeserializeOwned + Clone,
    {
        self.round += 1;
        trace!(round = self.round, "broadcast round");
        let bytes = self.seal(msg)?;
        self.broadcast_to_others(&bytes).await?;

        let others = self.others();
        let received = self.recv_from_all(&others).await?;
        let mut out = Vec::with_capacity(self.party_count());
        let mut it = others.iter().zip(received);
        for i in 0..self.party_count() {
            if i == self.index {
                out.push(msg.clone());
            } else if let Some((&from, raw)) = it.next() {
                out.push(self.open(from, &raw)?);
            }
        }
        Ok(out)
    }

    /// Round combining a broadcast part with a per-recipient part
    ///
    /// `direct[j]` goes to party `j` only; our own slot is ignored and comes
    /// back as `None`.
    pub async fn exchange_with_direct<B, P>(
        &mut self,
        broadcast: &B,
        direct: &[Option<P>],
    ) -> Result<(Vec<B>, Vec<Option<P>>)>
    where
        B: Serialize + DeserializeOwned + Clone,
        P: Serialize + DeserializeOwned,
    {
        if direct.len() != self.party_count() {
            return Err(Error::fatal("job", "direct messages do not match roster"));
        }
        self.round += 1;
        trace!(round = self.round, "broadcast and direct round");
        for j in self.others() {
            let bytes = self.seal(&RoundMsg {
                broadcast,
                direct: direct[j].as_ref(),
            })?;
            self.send_to(j, &bytes).await?;
        }

        let others = self.others();
        let received = self.recv_from_all(&others).await?;
        let mut bcast = Vec::with_capacity(self.party_count());
        let mut priv_msgs = Vec::with_capacity(self.party_count());
        let mut it = others.iter().zip(received);
        for i in 0..self.party_count() {
            if i == self.index {
                bcast.push(broadcast.clone());
                priv_msgs.push(None);
            } else if let Some((&from, raw)) = it.next() {
                let msg: RoundMsg<B, P> = self.open(from, &raw)?;
                bcast.push(msg.broadcast);
                priv_msgs.push(msg.direct);
            }
        }
        Ok((bcast, priv_msgs))
    }

    /// Everyone sends to `receiver`; only the receiver gets the collection
    pub async fn send_all_to_one<M>(
        &mut self,
        receiver: PartyIndex,
        msg: &M,
    ) -> Result<Option<Vec<M>>>
    where
        M: Serialize + DeserializeOwned + Clone,
    {
        if receiver >= self.party_count() {
            return Err(Error::invalid_argument(
                "job",
                format!("receiver {} outside roster", receiver),
            ));
        }
        self.round += 1;
        let bytes = self.seal(msg)?;
        if receiver != self.index {
            self.send_to(receiver, &bytes).await?;
            return Ok(None);
        }

        let others = self.others();
        let received = self.recv_from_all(&others).await?;
        let mut out = Vec::with_capacity(self.party_count());
        let mut it = others.iter().zip(received);
        for i in 0..self.party_count() {
            if i == self.index {
                out.push(msg.clone());
            } else if let Some((&from, raw)) = it.next() {
                out.push(self.open(from, &raw)?);
            }
        }
        Ok(Some(out))
    }
}

/// Role in a two-party protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    P1,
    P2,
}

impl Role {
    pub fn index(&self) -> PartyIndex {
        match self {
            Role::P1 => 0,
            Role::P2 => 1,
        }
    }

    pub fn from_index(index: PartyIndex) -> Result<Self> {
        match index {
            0 => Ok(Role::P1),
            1 => Ok(Role::P2),
            other => Err(Error::invalid_argument(
                "job",
                format!("two-party role index {}", other),
            )),
        }
    }

    pub fn peer(&self) -> Role {
        match self {
            Role::P1 => Role::P2,
            Role::P2 => Role::P1,
        }
    }
}

/// Two-party job: a [`JobMP`] with exactly two parties
pub struct Job2P<T: Transport> {
    inner: JobMP<T>,
}

impl<T: Transport> Job2P<T> {
    pub fn new(transport: T, role: Role, p1_name: &str, p2_name: &str) -> Result<Self> {
        let inner = JobMP::new(
            transport,
            role.index(),
            vec![p1_name.to_string(), p2_name.to_string()],
        )?;
        Ok(Self { inner })
    }

    pub fn role(&self) -> Role {
        match self.inner.role_index() {
            0 => Role::P1,
            _ => Role::P2,
        }
    }

    pub fn role_index(&self) -> PartyIndex {
        self.inner.role_index()
    }

    pub fn is_role(&self, index: PartyIndex) -> bool {
        self.inner.is_role(index)
    }

    pub fn party_count(&self) -> usize {
        2
    }

    pub fn party_name(&self, index: PartyIndex) -> Result<&str> {
        self.inner.party_name(index)
    }

    pub fn peer_index(&self) -> PartyIndex {
        self.role().peer().index()
    }

    pub fn round(&self) -> u32 {
        self.inner.round()
    }

    pub fn derive_sid(&self, curve: Curve, given: &[u8]) -> Vec<u8> {
        self.inner.derive_sid(curve, given)
    }

    pub fn into_transport(self) -> T {
        self.inner.into_transport()
    }

    pub async fn send_to(&self, i: PartyIndex, bytes: &[u8]) -> Result<()> {
        self.inner.send_to(i, bytes).await
    }

    pub async fn recv_from(&self, i: PartyIndex) -> Result<Vec<u8>> {
        self.inner.recv_from(i).await
    }

    pub async fn recv_from_all(&self, senders: &[PartyIndex]) -> Result<Vec<Vec<u8>>> {
        self.inner.recv_from_all(senders).await
    }

    /// Send to the unique peer
    pub async fn broadcast_to_others(&self, bytes: &[u8]) -> Result<()> {
        self.inner.send_to(self.peer_index(), bytes).await
    }

    /// Send a typed message to the peer
    pub async fn send_msg<M: Serialize>(&mut self, msg: &M) -> Result<()> {
        let peer = self.peer_index();
        self.inner.send_msg_to(peer, msg).await
    }

    /// Receive a typed message from the peer
    pub async fn recv_msg<M: DeserializeOwned>(&mut self) -> Result<M> {
        let peer = self.peer_index();
        self.inner.recv_msg_from(peer).await
    }

    /// Simultaneous exchange; returns the peer's message
    pub async fn exchange<M>(&mut self, msg: &M) -> Result<M>
    where
        M: Serialize + DeserializeOwned + Clone,
    {
        let peer = self.peer_index();
        let mut all = self.inner.exchange(msg).await?;
        Ok(all.swap_remove(peer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpc::MemoryNetwork;
    use crate::ErrorKind;

    fn roster(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("party_{}", i)).collect()
    }

    #[test]
    fn test_roster_validation() {
        let net = MemoryNetwork::new(3);
        assert!(JobMP::new(net.endpoint(0), 0, roster(1)).is_err());
        assert!(JobMP::new(net.endpoint(0), 3, roster(3)).is_err());
        let dup = vec!["a".to_string(), "b".to_string(), "a".to_string()];
        assert!(JobMP::new(net.endpoint(0), 0, dup).is_err());

        let job = JobMP::new(net.endpoint(1), 1, roster(3)).unwrap();
        assert_eq!(job.party_count(), 3);
        assert!(job.is_role(1));
        assert_eq!(job.party_name(2).unwrap(), "party_2");
        assert_eq!(job.others(), vec![0, 2]);
    }

    #[tokio::test]
    async fn test_exchange_orders_by_party() {
        let net = MemoryNetwork::new(3);
        let mut handles = Vec::new();
        for i in 0..3 {
            let ep = net.endpoint(i);
            handles.push(tokio::spawn(async move {
                let mut job = JobMP::new(ep, i, roster(3)).unwrap();
                job.exchange(&(i as u32 * 10)).await.unwrap()
            }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap(), vec![0, 10, 20]);
        }
    }

    #[tokio::test]
    async fn test_direct_messages_reach_only_recipient() {
        let net = MemoryNetwork::new(3);
        let mut handles = Vec::new();
        for i in 0..3 {
            let ep = net.endpoint(i);
            handles.push(tokio::spawn(async move {
                let mut job = JobMP::new(ep, i, roster(3)).unwrap();
                let direct: Vec<Option<String>> =
                    (0..3).map(|j| Some(format!("{}->{}", i, j))).collect();
                job.exchange_with_direct(&i, &direct).await.unwrap()
            }));
        }
        for (me, h) in handles.into_iter().enumerate() {
            let (bcast, direct) = h.await.unwrap();
            assert_eq!(bcast, vec![0, 1, 2]);
            for (j, d) in direct.iter().enumerate() {
                if j == me {
                    assert!(d.is_none());
                } else {
                    assert_eq!(d.as_deref(), Some(format!("{}->{}", j, me).as_str()));
                }
            }
        }
    }

    #[tokio::test]
    async fn test_round_mismatch_blames_peer() {
        let net = MemoryNetwork::new(2);
        let a = net.endpoint(0);
        let b = net.endpoint(1);

        let sender = tokio::spawn(async move {
            let mut job = Job2P::new(a, Role::P1, "p1", "p2").unwrap();
            job.send_msg(&1u8).await.unwrap();
            job.send_msg(&2u8).await.unwrap();
        });

        let mut job = Job2P::new(b, Role::P2, "p1", "p2").unwrap();
        let first: u8 = job.recv_msg().await.unwrap();
        assert_eq!(first, 1);
        // skip a round locally
        job.inner.round += 1;
        let err = job.recv_msg::<u8>().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(err.peer_index(), Some(0));
        sender.await.unwrap();
    }

    #[tokio::test]
    async fn test_transport_abort_reports_peer_and_round() {
        let net = MemoryNetwork::new(2);
        let mut job = Job2P::new(net.endpoint(1), Role::P2, "p1", "p2").unwrap();
        net.abort();
        match job.recv_msg::<u8>().await.unwrap_err() {
            Error::Transport { peer, round, .. } => {
                assert_eq!(peer, Some(0));
                assert_eq!(round, Some(1));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_derive_sid() {
        let net = MemoryNetwork::new(2);
        let job = JobMP::new(net.endpoint(0), 0, roster(2)).unwrap();
        assert_eq!(job.derive_sid(Curve::P256, b"given"), b"given".to_vec());
        let a = job.derive_sid(Curve::P256, b"");
        let b = job.derive_sid(Curve::Secp256k1, b"");
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }
}
