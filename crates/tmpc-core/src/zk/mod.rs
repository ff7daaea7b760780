//! Non-interactive zero-knowledge proofs

pub mod dl;

pub use dl::DlProof;

use crate::curve::{Curve, Scalar};
use digest::Digest;
use sha2::Sha256;

/// Fiat-Shamir hash: SHA-256 over a domain label and length-prefixed items
pub(crate) struct HashTranscript {
    h: Sha256,
}

impl HashTranscript {
    pub fn new(domain: &'static [u8]) -> Self {
        let mut t = Self { h: Sha256::new() };
        t.append(domain);
        t
    }

    /// Absorb `bytes` behind a 4-byte big-endian length
    pub fn append(&mut self, bytes: &[u8]) -> &mut Self {
        self.h.update((bytes.len() as u32).to_be_bytes());
        self.h.update(bytes);
        self
    }

    pub fn append_curve(&mut self, curve: Curve) -> &mut Self {
        self.append(&curve.nid().to_be_bytes())
    }

    /// Absorb a 64-bit value as 8 raw big-endian bytes
    pub fn append_u64(&mut self, v: u64) -> &mut Self {
        self.h.update(v.to_be_bytes());
        self
    }

    pub fn finish(self) -> [u8; 32] {
        self.h.finalize().into()
    }

    pub fn challenge(self, curve: Curve) -> Scalar {
        Scalar::reduce_be(curve, &self.finish())
    }
}
