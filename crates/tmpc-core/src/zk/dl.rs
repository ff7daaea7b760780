//! Schnorr proof of knowledge of a discrete logarithm
//!
//! Proves knowledge of `w` with `w·G = Q`, bound to a session id and a
//! 64-bit auxiliary tag. The encoded proof is `R ‖ z` with `z` as an
//! `ℓ`-byte big-endian scalar.

use super::HashTranscript;
use crate::curve::{Curve, Point, Scalar};
use crate::{Error, Result};
use rand::rngs::OsRng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DlProof {
    big_r: Point,
    z: Scalar,
}

fn challenge(q: &Point, big_r: &Point, sid: &[u8], aux: u64) -> Scalar {
    let curve = q.curve();
    let mut t = HashTranscript::new(b"tmpc/zk-dl");
    t.append_curve(curve)
        .append(&curve.generator().to_bytes())
        .append(&q.to_bytes())
        .append(&big_r.to_bytes())
        .append(sid)
        .append_u64(aux);
    t.challenge(curve)
}

impl DlProof {
    pub fn prove(q: &Point, w: &Scalar, sid: &[u8], aux: u64) -> Result<Self> {
        let curve = q.curve();
        if curve.mul_generator(w)? != *q {
            return Err(Error::invalid_argument("zk-dl", "witness does not match statement"));
        }
        let r = curve.random_scalar(&mut OsRng);
        let big_r = curve.mul_generator(&r)?;
        let e = challenge(q, &big_r, sid, aux);
        let z = r.add(&e.mul(w)?)?;
        Ok(Self { big_r, z })
    }

    /// `z·G == R + e·Q`
    pub fn verify(&self, q: &Point, sid: &[u8], aux: u64) -> bool {
        let curve = q.curve();
        if self.big_r.curve() != curve || self.z.curve() != curve {
            return false;
        }
        let e = challenge(q, &self.big_r, sid, aux);
        let lhs = match curve.mul_generator(&self.z) {
            Ok(p) => p,
            Err(_) => return false,
        };
        match q.mul(&e).and_then(|eq| self.big_r.add(&eq)) {
            Ok(rhs) => lhs == rhs,
            Err(_) => false,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.big_r.to_bytes();
        out.extend_from_slice(&self.z.to_bytes());
        out
    }

    pub fn from_bytes(curve: Curve, bytes: &[u8]) -> Result<Self> {
        let split = bytes
            .len()
            .checked_sub(curve.scalar_len())
            .ok_or_else(|| Error::crypto("zk-dl", "invalid proof"))?;
        let big_r = Point::from_bytes(curve, &bytes[..split])
            .map_err(|_| Error::crypto("zk-dl", "invalid proof"))?;
        let z = Scalar::from_bytes(curve, &bytes[split..])
            .map_err(|_| Error::crypto("zk-dl", "invalid proof"))?;
        Ok(Self { big_r, z })
    }
}

/// Prove knowledge of `w = log_G(q)`; returns the encoded proof
pub fn prove(q: &Point, w: &Scalar, sid: &[u8], aux: u64) -> Result<Vec<u8>> {
    Ok(DlProof::prove(q, w, sid, aux)?.to_bytes())
}

/// Check an encoded proof; any malformation is reported as an invalid proof
pub fn verify(q: &Point, proof: &[u8], sid: &[u8], aux: u64) -> Result<()> {
    let proof = DlProof::from_bytes(q.curve(), proof)?;
    if !proof.verify(q, sid, aux) {
        return Err(Error::crypto("zk-dl", "invalid proof"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statement(curve: Curve) -> (Point, Scalar) {
        let w = curve.random_scalar(&mut OsRng);
        (curve.mul_generator(&w).unwrap(), w)
    }

    #[test]
    fn test_completeness_all_curves() {
        for curve in Curve::ALL {
            let (q, w) = statement(curve);
            let proof = prove(&q, &w, b"sid", 7).unwrap();
            assert_eq!(proof.len(), curve.point_len() + curve.scalar_len());
            verify(&q, &proof, b"sid", 7).unwrap();
        }
    }

    #[test]
    fn test_bound_to_sid_and_aux() {
        let (q, w) = statement(Curve::Secp256k1);
        let proof = prove(&q, &w, b"sid", 7).unwrap();
        assert!(verify(&q, &proof, b"other", 7).is_err());
        assert!(verify(&q, &proof, b"sid", 8).is_err());

        let (q2, _) = statement(Curve::Secp256k1);
        assert!(verify(&q2, &proof, b"sid", 7).is_err());
    }

    #[test]
    fn test_any_byte_flip_rejected() {
        for curve in Curve::ALL {
            let (q, w) = statement(curve);
            let proof = prove(&q, &w, b"flip", 0).unwrap();
            for i in 0..proof.len() {
                let mut bad = proof.clone();
                bad[i] ^= 0x01;
                assert!(verify(&q, &bad, b"flip", 0).is_err(), "byte {} on {}", i, curve);
            }
            assert!(verify(&q, &proof[..proof.len() - 1], b"flip", 0).is_err());
            assert!(verify(&q, &[], b"flip", 0).is_err());
        }
    }

    #[test]
    fn test_wrong_witness_refused() {
        let (q, _) = statement(Curve::P256);
        let w = Curve::P256.random_scalar(&mut OsRng);
        assert!(prove(&q, &w, b"", 0).is_err());
    }
}
