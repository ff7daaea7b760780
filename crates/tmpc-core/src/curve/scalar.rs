use super::{mismatch, Curve};
use crate::{Error, Result};
use elliptic_curve::{Field, PrimeField};
use rand_core::{CryptoRng, RngCore};
use std::fmt;
use std::ops::{Add, Mul};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

/// Integer modulo the group order of its curve
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Scalar {
    Secp256k1(k256::Scalar),
    P256(p256::Scalar),
    Ed25519(curve25519_dalek::Scalar),
}

impl Scalar {
    pub fn curve(&self) -> Curve {
        match self {
            Scalar::Secp256k1(_) => Curve::Secp256k1,
            Scalar::P256(_) => Curve::P256,
            Scalar::Ed25519(_) => Curve::Ed25519,
        }
    }

    pub fn zero(curve: Curve) -> Self {
        Self::from_u64(curve, 0)
    }

    pub fn one(curve: Curve) -> Self {
        Self::from_u64(curve, 1)
    }

    pub fn from_u64(curve: Curve, v: u64) -> Self {
        match curve {
            Curve::Secp256k1 => Scalar::Secp256k1(k256::Scalar::from(v)),
            Curve::P256 => Scalar::P256(p256::Scalar::from(v)),
            Curve::Ed25519 => Scalar::Ed25519(curve25519_dalek::Scalar::from(v)),
        }
    }

    /// Uniform non-zero scalar, by rejection sampling
    pub fn random<R: RngCore + CryptoRng>(curve: Curve, rng: &mut R) -> Self {
        let mut bytes = [0u8; 32];
        loop {
            rng.fill_bytes(&mut bytes);
            if curve == Curve::Ed25519 {
                // order is just above 2^252
                bytes[0] &= 0x1f;
            }
            if let Ok(s) = Self::from_bytes(curve, &bytes) {
                if !s.is_zero() {
                    bytes.zeroize();
                    return s;
                }
            }
        }
    }

    /// Decode a canonical big-endian scalar of exactly `ℓ` bytes
    pub fn from_bytes(curve: Curve, bytes: &[u8]) -> Result<Self> {
        if bytes.len() != curve.scalar_len() {
            return Err(Error::invalid_argument(
                "scalar",
                format!("expected {} bytes, got {}", curve.scalar_len(), bytes.len()),
            ));
        }
        let decoded = match curve {
            Curve::Secp256k1 => {
                let repr = k256::FieldBytes::clone_from_slice(bytes);
                Option::<k256::Scalar>::from(k256::Scalar::from_repr(repr)).map(Scalar::Secp256k1)
            }
            Curve::P256 => {
                let repr = p256::FieldBytes::clone_from_slice(bytes);
                Option::<p256::Scalar>::from(p256::Scalar::from_repr(repr)).map(Scalar::P256)
            }
            Curve::Ed25519 => {
                let mut le = [0u8; 32];
                le.copy_from_slice(bytes);
                le.reverse();
                Option::<curve25519_dalek::Scalar>::from(
                    curve25519_dalek::Scalar::from_canonical_bytes(le),
                )
                .map(Scalar::Ed25519)
            }
        };
        decoded.ok_or_else(|| Error::invalid_argument("scalar", "value not below group order"))
    }

    /// Big-endian encoding of exactly `ℓ` bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Scalar::Secp256k1(s) => s.to_repr().to_vec(),
            Scalar::P256(s) => s.to_repr().to_vec(),
            Scalar::Ed25519(s) => {
                let mut be = s.to_bytes();
                be.reverse();
                be.to_vec()
            }
        }
    }

    /// Interpret arbitrary big-endian bytes as an integer and reduce it mod `n`
    pub fn reduce_be(curve: Curve, bytes: &[u8]) -> Self {
        match curve {
            Curve::Secp256k1 => Scalar::Secp256k1(horner::<k256::Scalar>(bytes)),
            Curve::P256 => Scalar::P256(horner::<p256::Scalar>(bytes)),
            Curve::Ed25519 => Scalar::Ed25519(horner::<curve25519_dalek::Scalar>(bytes)),
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Scalar::Secp256k1(s) => bool::from(s.is_zero()),
            Scalar::P256(s) => bool::from(s.is_zero()),
            Scalar::Ed25519(s) => bool::from(s.ct_eq(&curve25519_dalek::Scalar::ZERO)),
        }
    }

    pub fn add(&self, other: &Scalar) -> Result<Scalar> {
        Ok(match (self, other) {
            (Scalar::Secp256k1(a), Scalar::Secp256k1(b)) => Scalar::Secp256k1(*a + *b),
            (Scalar::P256(a), Scalar::P256(b)) => Scalar::P256(*a + *b),
            (Scalar::Ed25519(a), Scalar::Ed25519(b)) => Scalar::Ed25519(*a + *b),
            _ => return Err(mismatch()),
        })
    }

    pub fn sub(&self, other: &Scalar) -> Result<Scalar> {
        Ok(match (self, other) {
            (Scalar::Secp256k1(a), Scalar::Secp256k1(b)) => Scalar::Secp256k1(*a - *b),
            (Scalar::P256(a), Scalar::P256(b)) => Scalar::P256(*a - *b),
            (Scalar::Ed25519(a), Scalar::Ed25519(b)) => Scalar::Ed25519(*a - *b),
            _ => return Err(mismatch()),
        })
    }

    pub fn mul(&self, other: &Scalar) -> Result<Scalar> {
        Ok(match (self, other) {
            (Scalar::Secp256k1(a), Scalar::Secp256k1(b)) => Scalar::Secp256k1(*a * *b),
            (Scalar::P256(a), Scalar::P256(b)) => Scalar::P256(*a * *b),
            (Scalar::Ed25519(a), Scalar::Ed25519(b)) => Scalar::Ed25519(*a * *b),
            _ => return Err(mismatch()),
        })
    }

    pub fn neg(&self) -> Scalar {
        match self {
            Scalar::Secp256k1(s) => Scalar::Secp256k1(-*s),
            Scalar::P256(s) => Scalar::P256(-*s),
            Scalar::Ed25519(s) => Scalar::Ed25519(-*s),
        }
    }

    /// Multiplicative inverse; fails on zero
    pub fn invert(&self) -> Result<Scalar> {
        if self.is_zero() {
            return Err(Error::crypto("scalar", "inverse of zero"));
        }
        Ok(match self {
            Scalar::Secp256k1(s) => {
                let inv = Option::<k256::Scalar>::from(s.invert())
                    .ok_or_else(|| Error::crypto("scalar", "inverse of zero"))?;
                Scalar::Secp256k1(inv)
            }
            Scalar::P256(s) => {
                let inv = Option::<p256::Scalar>::from(s.invert())
                    .ok_or_else(|| Error::crypto("scalar", "inverse of zero"))?;
                Scalar::P256(inv)
            }
            Scalar::Ed25519(s) => Scalar::Ed25519(s.invert()),
        })
    }

    /// `a / b`
    pub fn div(&self, other: &Scalar) -> Result<Scalar> {
        self.mul(&other.invert()?)
    }

    // Callers guarantee both operands share a curve.
    pub(crate) fn add_same(&self, other: &Scalar) -> Scalar {
        match (self, other) {
            (Scalar::Secp256k1(a), Scalar::Secp256k1(b)) => Scalar::Secp256k1(*a + *b),
            (Scalar::P256(a), Scalar::P256(b)) => Scalar::P256(*a + *b),
            (Scalar::Ed25519(a), Scalar::Ed25519(b)) => Scalar::Ed25519(*a + *b),
            _ => *self,
        }
    }

    /// Little-endian bytes, as used by RFC 8032
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut bytes = self.to_bytes();
        bytes.reverse();
        bytes
    }

    pub(crate) fn ed25519_inner(&self) -> Option<&curve25519_dalek::Scalar> {
        match self {
            Scalar::Ed25519(s) => Some(s),
            _ => None,
        }
    }
}

/// Big-endian integer to field element, eight bytes at a time
fn horner<S>(bytes: &[u8]) -> S
where
    S: Copy + Add<Output = S> + Mul<Output = S> + From<u64>,
{
    let base = S::from(1u64 << 32) * S::from(1u64 << 32);
    let pad = (8 - bytes.len() % 8) % 8;
    let mut padded = vec![0u8; pad];
    padded.extend_from_slice(bytes);

    let mut acc = S::from(0u64);
    for chunk in padded.chunks_exact(8) {
        let mut word = [0u8; 8];
        word.copy_from_slice(chunk);
        acc = acc * base + S::from(u64::from_be_bytes(word));
    }
    padded.zeroize();
    acc
}

impl Zeroize for Scalar {
    fn zeroize(&mut self) {
        match self {
            Scalar::Secp256k1(s) => s.zeroize(),
            Scalar::P256(s) => s.zeroize(),
            Scalar::Ed25519(s) => s.zeroize(),
        }
    }
}

impl fmt::Debug for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Scalar({}, ..)", self.curve())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_bytes_round_trip_and_canonical() {
        for curve in Curve::ALL {
            let s = curve.random_scalar(&mut OsRng);
            assert_eq!(Scalar::from_bytes(curve, &s.to_bytes()).unwrap(), s);

            // n itself is not canonical
            assert!(Scalar::from_bytes(curve, curve.order()).is_err());
            assert!(Scalar::from_bytes(curve, &[1u8; 31]).is_err());
        }
    }

    #[test]
    fn test_zeroize_keeps_curve() {
        for curve in Curve::ALL {
            let mut s = zeroize::Zeroizing::new(curve.random_scalar(&mut OsRng));
            assert!(!s.is_zero());
            s.zeroize();
            assert!(s.is_zero());
            assert_eq!(s.curve(), curve);
        }
    }

    #[test]
    fn test_reduce_be() {
        for curve in Curve::ALL {
            assert_eq!(Scalar::reduce_be(curve, curve.order()), Scalar::zero(curve));
            assert_eq!(Scalar::reduce_be(curve, &[]), Scalar::zero(curve));
            assert_eq!(
                Scalar::reduce_be(curve, &[0x01, 0x00]),
                Scalar::from_u64(curve, 256)
            );

            let s = curve.random_scalar(&mut OsRng);
            let mut wide = vec![0u8; 7];
            wide.extend_from_slice(&s.to_bytes());
            assert_eq!(Scalar::reduce_be(curve, &wide), s);
        }
    }

    #[test]
    fn test_arithmetic() {
        for curve in Curve::ALL {
            let a = curve.random_scalar(&mut OsRng);
            let b = curve.random_scalar(&mut OsRng);
            let q = a.div(&b).unwrap();
            assert_eq!(q.mul(&b).unwrap(), a);
            assert_eq!(a.add(&a.neg()).unwrap(), Scalar::zero(curve));
            assert!(Scalar::zero(curve).invert().is_err());
        }

        let k = Curve::Secp256k1.random_scalar(&mut OsRng);
        let e = Curve::Ed25519.random_scalar(&mut OsRng);
        assert!(k.add(&e).is_err());
    }

    #[test]
    fn test_ed25519_le_encoding() {
        let s = Scalar::from_u64(Curve::Ed25519, 0x0102);
        let le = s.to_le_bytes();
        assert_eq!(le[0], 0x02);
        assert_eq!(le[1], 0x01);
        assert_eq!(s.to_bytes()[31], 0x02);
    }
}
