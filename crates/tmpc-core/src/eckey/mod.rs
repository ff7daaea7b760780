//! N-party key shares shared by ECDSA and EdDSA
//!
//! [`KeyShareMP`] is an additive share: `x = Σ x_j`, with every party's
//! public share `Q_j = x_j·G` known to all. [`ThresholdShare`] is a leaf
//! share of an access-structure sharing and turns into a [`KeyShareMP`] for
//! any satisfying quorum.

mod dkg;
mod messages;
mod threshold;

pub use dkg::{dkg, refresh};
pub use messages::*;
pub use threshold::{threshold_dkg, threshold_refresh};

use crate::access::AccessStructure;
use crate::curve::{sum_points, Curve, Point, Scalar};
use crate::mpc::wire::{decode_parts, encode_parts};
use crate::mpc::{JobMP, Transport};
use crate::zk::HashTranscript;
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;
use zeroize::Zeroize;

/// Echo round: every party broadcasts a digest of its view and all digests
/// must agree
pub(crate) async fn check_consistency<T: Transport>(
    job: &mut JobMP<T>,
    component: &'static str,
    digest: [u8; 32],
) -> Result<()> {
    let digests = job.exchange(&digest.to_vec()).await?;
    if let Some((j, _)) = digests.iter().enumerate().find(|(_, d)| d[..] != digest[..]) {
        return Err(Error::peer(component, j, "views of the key differ"));
    }
    Ok(())
}

/// Digest of `Q` and the per-party public shares
pub(crate) fn view_digest(q: &Point, public_shares: &BTreeMap<String, Point>) -> [u8; 32] {
    let mut t = HashTranscript::new(b"tmpc/eckey-view");
    t.append_curve(q.curve()).append(&q.to_bytes());
    for (name, p) in public_shares {
        t.append(name.as_bytes()).append(&p.to_bytes());
    }
    t.finish()
}

fn read_u32(component: &'static str, bytes: &[u8]) -> Result<u32> {
    let array: [u8; 4] = bytes
        .try_into()
        .map_err(|_| Error::invalid_argument(component, "expected a 4-byte integer"))?;
    Ok(u32::from_be_bytes(array))
}

fn read_name(component: &'static str, bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| Error::invalid_argument(component, "party name is not UTF-8"))
}

/// Additive share of an N-party key
#[derive(Clone, PartialEq, Eq)]
pub struct KeyShareMP {
    curve: Curve,
    party_name: String,
    x: Scalar,
    q: Point,
    public_shares: BTreeMap<String, Point>,
}

impl KeyShareMP {
    pub fn new(
        party_name: impl Into<String>,
        x: Scalar,
        q: Point,
        public_shares: BTreeMap<String, Point>,
    ) -> Result<Self> {
        let share = Self {
            curve: q.curve(),
            party_name: party_name.into(),
            x,
            q,
            public_shares,
        };
        share.check()?;
        Ok(share)
    }

    fn check(&self) -> Result<()> {
        if self.q.is_identity() {
            return Err(Error::fatal("eckey", "public key is the identity"));
        }
        if self.x.curve() != self.curve
            || self.public_shares.values().any(|p| p.curve() != self.curve)
        {
            return Err(Error::fatal("eckey", "share mixes curves"));
        }
        let mine = self
            .public_shares
            .get(&self.party_name)
            .ok_or_else(|| Error::fatal("eckey", "own public share missing"))?;
        if self.curve.mul_generator(&self.x)? != *mine {
            return Err(Error::fatal("eckey", "public share does not match the scalar"));
        }
        if sum_points(self.curve, self.public_shares.values())? != self.q {
            return Err(Error::fatal("eckey", "public shares do not sum to the key"));
        }
        Ok(())
    }

    pub fn curve(&self) -> Curve {
        self.curve
    }

    pub fn party_name(&self) -> &str {
        &self.party_name
    }

    pub fn x_share(&self) -> &Scalar {
        &self.x
    }

    pub fn public_key(&self) -> &Point {
        &self.q
    }

    /// `Q_j` for every party, keyed by name
    pub fn public_shares(&self) -> &BTreeMap<String, Point> {
        &self.public_shares
    }

    /// Public shares in roster order; the roster must name exactly the
    /// parties of this share
    pub(crate) fn public_shares_for(&self, roster: &[String]) -> Result<Vec<Point>> {
        if roster.len() != self.public_shares.len() {
            return Err(Error::invalid_argument(
                "eckey",
                "roster does not match the parties of the share",
            ));
        }
        roster
            .iter()
            .map(|name| {
                self.public_shares.get(name).copied().ok_or_else(|| {
                    Error::invalid_argument("eckey", format!("{} holds no share of this key", name))
                })
            })
            .collect()
    }

    /// `[curve nid, name, x, Q, (name_j, Q_j)*]`
    pub fn to_parts(&self) -> Vec<Vec<u8>> {
        let mut parts = vec![
            self.curve.nid().to_be_bytes().to_vec(),
            self.party_name.as_bytes().to_vec(),
            self.x.to_bytes(),
            self.q.to_bytes(),
        ];
        for (name, p) in &self.public_shares {
            parts.push(name.as_bytes().to_vec());
            parts.push(p.to_bytes());
        }
        parts
    }

    pub fn from_parts(parts: &[Vec<u8>]) -> Result<Self> {
        Self::parse(parts).map_err(|e| Error::invalid_argument("eckey", e.to_string()))
    }

    fn parse(parts: &[Vec<u8>]) -> Result<Self> {
        if parts.len() < 6 || parts.len() % 2 != 0 {
            return Err(Error::invalid_argument(
                "eckey",
                format!("malformed share of {} parts", parts.len()),
            ));
        }
        let curve = Curve::from_nid(read_u32("eckey", &parts[0])?)?;
        let name = read_name("eckey", &parts[1])?;
        let x = Scalar::from_bytes(curve, &parts[2])?;
        let q = Point::from_bytes(curve, &parts[3])?;
        let mut public_shares = BTreeMap::new();
        for pair in parts[4..].chunks(2) {
            let peer = read_name("eckey", &pair[0])?;
            let p = Point::from_bytes(curve, &pair[1])?;
            if public_shares.insert(peer, p).is_some() {
                return Err(Error::invalid_argument("eckey", "duplicate party in share"));
            }
        }
        Self::new(name, x, q, public_shares)
    }

    pub fn marshal(&self) -> Vec<u8> {
        encode_parts(&self.to_parts())
    }

    pub fn unmarshal(bytes: &[u8]) -> Result<Self> {
        Self::from_parts(&decode_parts(bytes)?)
    }
}

impl fmt::Debug for KeyShareMP {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyShareMP")
            .field("curve", &self.curve)
            .field("party_name", &self.party_name)
            .field("public_key", &self.q)
            .finish_non_exhaustive()
    }
}

impl Drop for KeyShareMP {
    fn drop(&mut self) {
        self.x.zeroize();
    }
}

/// Leaf share of a key shared over an access structure
#[derive(Clone, PartialEq, Eq)]
pub struct ThresholdShare {
    party_name: String,
    x: Scalar,
    q: Point,
    leaf_shares: BTreeMap<String, Point>,
    ac: AccessStructure,
    quorum: Vec<String>,
}

impl ThresholdShare {
    /// `leaf_shares` holds `x_l·G` for every leaf; `quorum` names the
    /// dealers of the last DKG or refresh
    pub fn new(
        party_name: impl Into<String>,
        x: Scalar,
        q: Point,
        leaf_shares: BTreeMap<String, Point>,
        ac: AccessStructure,
        quorum: Vec<String>,
    ) -> Result<Self> {
        let share = Self {
            party_name: party_name.into(),
            x,
            q,
            leaf_shares,
            ac,
            quorum,
        };
        share.check()?;
        Ok(share)
    }

    fn check(&self) -> Result<()> {
        let curve = self.ac.curve();
        if self.q.curve() != curve || self.x.curve() != curve {
            return Err(Error::fatal("eckey", "share mixes curves"));
        }
        if self.q.is_identity() {
            return Err(Error::fatal("eckey", "public key is the identity"));
        }
        let leaves = self.ac.leaf_names();
        if leaves.len() != self.leaf_shares.len() || leaves.iter().any(|l| !self.leaf_shares.contains_key(l)) {
            return Err(Error::fatal("eckey", "leaf public shares do not match the tree"));
        }
        if self.quorum.iter().any(|n| !self.ac.has_leaf(n)) {
            return Err(Error::fatal("eckey", "quorum names an unknown party"));
        }
        let mine = self
            .leaf_shares
            .get(&self.party_name)
            .ok_or_else(|| Error::fatal("eckey", "party is not a leaf of the tree"))?;
        if curve.mul_generator(&self.x)? != *mine {
            return Err(Error::fatal("eckey", "public share does not match the scalar"));
        }
        if self.ac.reconstruct_point(&self.leaf_shares)? != self.q {
            return Err(Error::fatal("eckey", "leaf shares do not reconstruct the key"));
        }
        Ok(())
    }

    pub fn curve(&self) -> Curve {
        self.ac.curve()
    }

    pub fn party_name(&self) -> &str {
        &self.party_name
    }

    pub fn x_share(&self) -> &Scalar {
        &self.x
    }

    pub fn public_key(&self) -> &Point {
        &self.q
    }

    pub fn leaf_shares(&self) -> &BTreeMap<String, Point> {
        &self.leaf_shares
    }

    pub fn access_structure(&self) -> &AccessStructure {
        &self.ac
    }

    pub fn quorum(&self) -> &[String] {
        &self.quorum
    }

    /// Additive share for the parties of `quorum`
    ///
    /// Each member's scalar and public share are scaled by its
    /// reconstruction coefficient, which is zero for members the tree does
    /// not need. The result must still sum to `Q`.
    pub fn to_additive_share<S: AsRef<str>>(&self, quorum: &[S]) -> Result<KeyShareMP> {
        if !quorum.iter().any(|n| n.as_ref() == self.party_name) {
            return Err(Error::invalid_argument(
                "eckey",
                format!("{} is not in the quorum", self.party_name),
            ));
        }
        let coefficients = self.ac.additive_coefficients(quorum)?;
        let mut public_shares = BTreeMap::new();
        for (name, c) in &coefficients {
            let p = self.leaf_shares.get(name).ok_or_else(|| {
                Error::invalid_argument("eckey", format!("no public share for {}", name))
            })?;
            public_shares.insert(name.clone(), p.mul(c)?);
        }
        let c = coefficients
            .get(&self.party_name)
            .ok_or_else(|| Error::fatal("eckey", "own coefficient missing"))?;
        let x = self.x.mul(c)?;
        if sum_points(self.curve(), public_shares.values())? != self.q {
            return Err(Error::crypto("eckey", "quorum shares do not reconstruct the key"));
        }
        KeyShareMP::new(self.party_name.clone(), x, self.q, public_shares)
    }

    /// `[curve nid, name, x, Q, (leaf, Q_l)*]` followed by
    /// `[access structure, quorum names*]`
    pub fn to_parts(&self) -> Vec<Vec<u8>> {
        let mut parts = vec![
            self.curve().nid().to_be_bytes().to_vec(),
            self.party_name.as_bytes().to_vec(),
            self.x.to_bytes(),
            self.q.to_bytes(),
            (self.leaf_shares.len() as u32).to_be_bytes().to_vec(),
        ];
        for (name, p) in &self.leaf_shares {
            parts.push(name.as_bytes().to_vec());
            parts.push(p.to_bytes());
        }
        parts.push(self.ac.to_bytes());
        parts.extend(self.quorum.iter().map(|n| n.as_bytes().to_vec()));
        parts
    }

    pub fn from_parts(parts: &[Vec<u8>]) -> Result<Self> {
        Self::parse(parts).map_err(|e| Error::invalid_argument("eckey", e.to_string()))
    }

    fn parse(parts: &[Vec<u8>]) -> Result<Self> {
        if parts.len() < 6 {
            return Err(Error::invalid_argument("eckey", "threshold share too short"));
        }
        let curve = Curve::from_nid(read_u32("eckey", &parts[0])?)?;
        let name = read_name("eckey", &parts[1])?;
        let x = Scalar::from_bytes(curve, &parts[2])?;
        let q = Point::from_bytes(curve, &parts[3])?;
        let count = read_u32("eckey", &parts[4])? as usize;
        let ac_at = count
            .checked_mul(2)
            .and_then(|n| n.checked_add(5))
            .filter(|&i| i < parts.len())
            .ok_or_else(|| Error::invalid_argument("eckey", "threshold share too short"))?;

        let mut leaf_shares = BTreeMap::new();
        for pair in parts[5..ac_at].chunks(2) {
            let leaf = read_name("eckey", &pair[0])?;
            let p = Point::from_bytes(curve, &pair[1])?;
            if leaf_shares.insert(leaf, p).is_some() {
                return Err(Error::invalid_argument("eckey", "duplicate leaf in share"));
            }
        }
        let ac = AccessStructure::from_bytes(&parts[ac_at])?;
        if ac.curve() != curve {
            return Err(Error::invalid_argument("eckey", "access structure on another curve"));
        }
        let quorum = parts[ac_at + 1..]
            .iter()
            .map(|p| read_name("eckey", p))
            .collect::<Result<Vec<_>>>()?;
        Self::new(name, x, q, leaf_shares, ac, quorum)
    }

    pub fn marshal(&self) -> Vec<u8> {
        encode_parts(&self.to_parts())
    }

    pub fn unmarshal(bytes: &[u8]) -> Result<Self> {
        Self::from_parts(&decode_parts(bytes)?)
    }
}

impl fmt::Debug for ThresholdShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThresholdShare")
            .field("party_name", &self.party_name)
            .field("public_key", &self.q)
            .field("access_structure", &self.ac.to_string())
            .finish_non_exhaustive()
    }
}

impl Drop for ThresholdShare {
    fn drop(&mut self) {
        self.x.zeroize();
    }
}
