//! Hash commitments for commit-reveal rounds
//!
//! `com = HMAC-SHA256(ρ, len ‖ sid ‖ len ‖ committer ‖ (len ‖ item)*)` with a
//! fresh 32-byte `ρ`. Binding the session id and the committer's index keeps
//! a commitment from being replayed into another session or by another party.

use crate::params::SID_BYTES;
use crate::{Error, Result};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Opening randomness kept by the committer until the reveal round
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Opening(#[serde(with = "crate::mpc::wire::serde_hex")] pub Vec<u8>);

impl std::fmt::Debug for Opening {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Opening(..)")
    }
}

fn digest(rand: &[u8], sid: &[u8], committer: usize, items: &[&[u8]]) -> Result<Vec<u8>> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(rand)
        .map_err(|_| Error::fatal("commitment", "bad HMAC key"))?;
    mac.update(&(sid.len() as u32).to_be_bytes());
    mac.update(sid);
    mac.update(&8u32.to_be_bytes());
    mac.update(&(committer as u64).to_be_bytes());
    for item in items {
        mac.update(&(item.len() as u32).to_be_bytes());
        mac.update(item);
    }
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Commit to `items`; returns the commitment and its opening
pub fn commit(sid: &[u8], committer: usize, items: &[&[u8]]) -> Result<(Vec<u8>, Opening)> {
    let mut rand = vec![0u8; SID_BYTES];
    OsRng.fill_bytes(&mut rand);
    let com = digest(&rand, sid, committer, items)?;
    Ok((com, Opening(rand)))
}

/// Check that `opening` opens `com` to `items`
pub fn verify(com: &[u8], opening: &Opening, sid: &[u8], committer: usize, items: &[&[u8]]) -> bool {
    if opening.0.len() != SID_BYTES {
        return false;
    }
    match digest(&opening.0, sid, committer, items) {
        Ok(expected) => expected.ct_eq(com).into(),
        Err(_) => false,
    }
}
