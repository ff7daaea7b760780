//! Signature encodings and verification
//!
//! ECDSA messages are treated as already-hashed data: the first `ℓ` bytes
//! are read as a big-endian integer and reduced mod `n`. Signatures are
//! emitted in DER with a low `s`.

use crate::curve::{Curve, Point, Scalar};
use crate::{Error, Result};

/// ECDSA `(r, s)` pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EcdsaSignature {
    pub r: Scalar,
    pub s: Scalar,
}

impl EcdsaSignature {
    pub fn new(r: Scalar, s: Scalar) -> Result<Self> {
        if r.curve() != s.curve() || !r.curve().is_weierstrass() {
            return Err(Error::invalid_argument("ecdsa", "bad signature curve"));
        }
        if r.is_zero() || s.is_zero() {
            return Err(Error::crypto("ecdsa", "zero signature component"));
        }
        Ok(Self { r, s })
    }

    pub fn curve(&self) -> Curve {
        self.r.curve()
    }

    /// Replace `s` by `n - s` when it lies in the upper half of the order
    pub fn normalize_s(mut self) -> Self {
        let neg = self.s.neg();
        // fixed-length big-endian bytes compare like the integers
        if neg.to_bytes() < self.s.to_bytes() {
            self.s = neg;
        }
        self
    }

    pub fn to_der(&self) -> Result<Vec<u8>> {
        let r = self.r.to_bytes();
        let s = self.s.to_bytes();
        match self.curve() {
            Curve::Secp256k1 => {
                let sig = k256::ecdsa::Signature::from_scalars(
                    *k256::FieldBytes::from_slice(&r),
                    *k256::FieldBytes::from_slice(&s),
                )
                .map_err(|e| Error::crypto("ecdsa", e.to_string()))?;
                Ok(sig.to_der().as_bytes().to_vec())
            }
            Curve::P256 => {
                let sig = p256::ecdsa::Signature::from_scalars(
                    *p256::FieldBytes::from_slice(&r),
                    *p256::FieldBytes::from_slice(&s),
                )
                .map_err(|e| Error::crypto("ecdsa", e.to_string()))?;
                Ok(sig.to_der().as_bytes().to_vec())
            }
            Curve::Ed25519 => Err(Error::invalid_argument("ecdsa", "Ed25519 has no ECDSA")),
        }
    }

    pub fn from_der(curve: Curve, der: &[u8]) -> Result<Self> {
        let (r, s) = match curve {
            Curve::Secp256k1 => {
                let sig = k256::ecdsa::Signature::from_der(der)
                    .map_err(|e| Error::crypto("ecdsa", e.to_string()))?;
                let (r, s) = sig.split_bytes();
                (r.to_vec(), s.to_vec())
            }
            Curve::P256 => {
                let sig = p256::ecdsa::Signature::from_der(der)
                    .map_err(|e| Error::crypto("ecdsa", e.to_string()))?;
                let (r, s) = sig.split_bytes();
                (r.to_vec(), s.to_vec())
            }
            Curve::Ed25519 => {
                return Err(Error::invalid_argument("ecdsa", "Ed25519 has no ECDSA"))
            }
        };
        Self::new(
            Scalar::from_bytes(curve, &r)?,
            Scalar::from_bytes(curve, &s)?,
        )
    }

    /// Standard ECDSA verification against public key `q`
    pub fn verify(&self, q: &Point, msg: &[u8]) -> Result<()> {
        let curve = self.curve();
        if q.curve() != curve || q.is_identity() {
            return Err(Error::invalid_argument("ecdsa", "bad public key"));
        }
        let m = message_scalar(curve, msg)?;
        let w = self.s.invert()?;
        let u1 = m.mul(&w)?;
        let u2 = self.r.mul(&w)?;
        let point = curve.mul_generator(&u1)?.add(&q.mul(&u2)?)?;
        if point.is_identity() {
            return Err(Error::crypto("ecdsa", "signature does not verify"));
        }
        let x = Scalar::reduce_be(curve, &point.x_coordinate()?);
        if x != self.r {
            return Err(Error::crypto("ecdsa", "signature does not verify"));
        }
        Ok(())
    }
}

/// Message representative `m`: the first `ℓ` bytes of `msg`, mod `n`
pub fn message_scalar(curve: Curve, msg: &[u8]) -> Result<Scalar> {
    if msg.is_empty() {
        return Err(Error::invalid_argument("ecdsa", "empty message"));
    }
    let len = msg.len().min(curve.scalar_len());
    Ok(Scalar::reduce_be(curve, &msg[..len]))
}

/// `r = R.x mod n`
pub fn r_from_point(big_r: &Point) -> Result<Scalar> {
    Ok(Scalar::reduce_be(big_r.curve(), &big_r.x_coordinate()?))
}

/// Verify a DER ECDSA signature over `msg`
pub fn verify_ecdsa(q: &Point, msg: &[u8], der: &[u8]) -> Result<()> {
    EcdsaSignature::from_der(q.curve(), der)?.verify(q, msg)
}

/// Verify a 64-byte RFC 8032 signature with strict checks
pub fn verify_eddsa(q: &Point, msg: &[u8], sig: &[u8]) -> Result<()> {
    if q.curve() != Curve::Ed25519 {
        return Err(Error::invalid_argument("eddsa", "public key is not on Ed25519"));
    }
    let key_bytes: [u8; 32] = q
        .to_bytes()
        .try_into()
        .map_err(|_| Error::fatal("eddsa", "Ed25519 encoding is not 32 bytes"))?;
    let sig_bytes: [u8; 64] = sig
        .try_into()
        .map_err(|_| Error::invalid_argument("eddsa", "signature must be 64 bytes"))?;
    let key = ed25519_dalek::VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| Error::crypto("eddsa", e.to_string()))?;
    let signature = ed25519_dalek::Signature::from_bytes(&sig_bytes);
    key.verify_strict(msg, &signature)
        .map_err(|_| Error::crypto("eddsa", "signature does not verify"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::signature::hazmat::PrehashSigner;
    use rand::rngs::OsRng;

    #[test]
    fn test_verify_matches_k256() {
        let sk = k256::ecdsa::SigningKey::random(&mut OsRng);
        let digest = [7u8; 32];
        let sig: k256::ecdsa::Signature = sk.sign_prehash(&digest).unwrap();
        let der = sig.to_der().as_bytes().to_vec();

        let q = Curve::Secp256k1
            .point_from_bytes(sk.verifying_key().to_encoded_point(false).as_bytes())
            .unwrap();
        verify_ecdsa(&q, &digest, &der).unwrap();
        assert!(verify_ecdsa(&q, &[8u8; 32], &der).is_err());
    }

    #[test]
    fn test_normalize_s_and_der() {
        let curve = Curve::P256;
        let r = curve.random_scalar(&mut OsRng);
        let high = Scalar::one(curve).neg();
        let sig = EcdsaSignature::new(r, high).unwrap().normalize_s();
        assert_eq!(sig.s, Scalar::one(curve));

        let der = sig.to_der().unwrap();
        assert_eq!(EcdsaSignature::from_der(curve, &der).unwrap(), sig);
    }

    #[test]
    fn test_message_scalar() {
        assert!(message_scalar(Curve::Secp256k1, &[]).is_err());
        let long = [0xabu8; 40];
        assert_eq!(
            message_scalar(Curve::Secp256k1, &long).unwrap(),
            Scalar::reduce_be(Curve::Secp256k1, &long[..32])
        );
    }

    #[test]
    fn test_verify_eddsa_with_dalek_key() {
        let sk = ed25519_dalek::SigningKey::generate(&mut OsRng);
        let msg = b"hello eddsa";
        let sig = ed25519_dalek::Signer::sign(&sk, msg);
        let q = Curve::Ed25519
            .point_from_bytes(sk.verifying_key().as_bytes())
            .unwrap();
        verify_eddsa(&q, msg, &sig.to_bytes()).unwrap();
        assert!(verify_eddsa(&q, b"other", &sig.to_bytes()).is_err());
    }
}
