//! Elliptic curves supported by the protocols
//!
//! Three curves are available: secp256k1 and NIST P-256 for ECDSA, and
//! Ed25519 for EdDSA. A [`Curve`] is a runtime value so that shares and
//! messages can carry the curve they belong to; [`Scalar`] and [`Point`]
//! remember their curve and refuse to mix with values from another one.

mod point;
mod raw;
mod scalar;

pub use point::Point;
pub use raw::RawScalar;
pub use scalar::Scalar;

use crate::{Error, Result};
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;

/// OpenSSL NID of secp256k1
pub const NID_SECP256K1: u32 = 714;
/// OpenSSL NID of NIST P-256
pub const NID_P256: u32 = 415;
/// OpenSSL NID of Ed25519
pub const NID_ED25519: u32 = 1087;

const SECP256K1_ORDER: [u8; 32] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xfe,
    0xba, 0xae, 0xdc, 0xe6, 0xaf, 0x48, 0xa0, 0x3b, 0xbf, 0xd2, 0x5e, 0x8c, 0xd0, 0x36, 0x41, 0x41,
];

const P256_ORDER: [u8; 32] = [
    0xff, 0xff, 0xff, 0xff, 0x00, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xbc, 0xe6, 0xfa, 0xad, 0xa7, 0x17, 0x9e, 0x84, 0xf3, 0xb9, 0xca, 0xc2, 0xfc, 0x63, 0x25, 0x51,
];

const ED25519_ORDER: [u8; 32] = [
    0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x14, 0xde, 0xf9, 0xde, 0xa2, 0xf7, 0x9c, 0xd6, 0x58, 0x12, 0x63, 0x1a, 0x5c, 0xf5, 0xd3, 0xed,
];

/// A supported elliptic curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Curve {
    Secp256k1,
    P256,
    Ed25519,
}

impl Curve {
    /// All supported curves
    pub const ALL: [Curve; 3] = [Curve::Secp256k1, Curve::P256, Curve::Ed25519];

    /// OpenSSL NID used in persisted data and on the wire
    pub fn nid(&self) -> u32 {
        match self {
            Curve::Secp256k1 => NID_SECP256K1,
            Curve::P256 => NID_P256,
            Curve::Ed25519 => NID_ED25519,
        }
    }

    /// Look up a curve by its OpenSSL NID
    pub fn from_nid(nid: u32) -> Result<Self> {
        match nid {
            NID_SECP256K1 => Ok(Curve::Secp256k1),
            NID_P256 => Ok(Curve::P256),
            NID_ED25519 => Ok(Curve::Ed25519),
            other => Err(Error::invalid_argument(
                "curve",
                format!("unsupported curve code {}", other),
            )),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Curve::Secp256k1 => "secp256k1",
            Curve::P256 => "P-256",
            Curve::Ed25519 => "Ed25519",
        }
    }

    /// Short-Weierstrass curves sign with ECDSA
    pub fn is_weierstrass(&self) -> bool {
        !matches!(self, Curve::Ed25519)
    }

    /// Length `ℓ` of a scalar (and of a coordinate) in bytes
    pub fn scalar_len(&self) -> usize {
        32
    }

    /// Length of the canonical point encoding
    pub fn point_len(&self) -> usize {
        match self {
            Curve::Secp256k1 | Curve::P256 => 1 + 2 * self.scalar_len(),
            Curve::Ed25519 => 32,
        }
    }

    /// Bit length of the group order
    pub fn order_bits(&self) -> usize {
        match self {
            Curve::Secp256k1 | Curve::P256 => 256,
            Curve::Ed25519 => 253,
        }
    }

    /// Group order `n`, big-endian
    pub fn order(&self) -> &'static [u8; 32] {
        match self {
            Curve::Secp256k1 => &SECP256K1_ORDER,
            Curve::P256 => &P256_ORDER,
            Curve::Ed25519 => &ED25519_ORDER,
        }
    }

    pub fn generator(&self) -> Point {
        Point::generator(*self)
    }

    pub fn identity(&self) -> Point {
        Point::identity(*self)
    }

    /// `k·G`
    pub fn mul_generator(&self, k: &Scalar) -> Result<Point> {
        if k.curve() != *self {
            return Err(Error::invalid_argument("curve", "scalar from another curve"));
        }
        Ok(Point::mul_base(k))
    }

    /// Uniform scalar in `[1, n-1]`
    pub fn random_scalar<R: RngCore + CryptoRng>(&self, rng: &mut R) -> Scalar {
        Scalar::random(*self, rng)
    }

    /// `(a + b) mod n`
    pub fn add_mod_order(&self, a: &RawScalar, b: &RawScalar) -> Scalar {
        let a = Scalar::reduce_be(*self, a.as_bytes());
        let b = Scalar::reduce_be(*self, b.as_bytes());
        a.add_same(&b)
    }

    pub fn scalar_from_bytes(&self, bytes: &[u8]) -> Result<Scalar> {
        Scalar::from_bytes(*self, bytes)
    }

    pub fn point_from_bytes(&self, bytes: &[u8]) -> Result<Point> {
        Point::from_bytes(*self, bytes)
    }

    /// Decode a list of encoded points
    pub fn points_from_bytes<B: AsRef<[u8]>>(&self, encoded: &[B]) -> Result<Vec<Point>> {
        encoded
            .iter()
            .map(|b| self.point_from_bytes(b.as_ref()))
            .collect()
    }
}

impl fmt::Display for Curve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u32> for Curve {
    type Error = Error;

    fn try_from(nid: u32) -> Result<Self> {
        Curve::from_nid(nid)
    }
}

impl From<Curve> for u32 {
    fn from(curve: Curve) -> u32 {
        curve.nid()
    }
}

fn mismatch() -> Error {
    Error::invalid_argument("curve", "operands belong to different curves")
}

/// Sum of a list of points, all on `curve`
pub fn sum_points<'a, I>(curve: Curve, points: I) -> Result<Point>
where
    I: IntoIterator<Item = &'a Point>,
{
    points
        .into_iter()
        .try_fold(curve.identity(), |acc, p| acc.add(p))
}

/// Sum of a list of scalars, all on `curve`
pub fn sum_scalars<'a, I>(curve: Curve, scalars: I) -> Result<Scalar>
where
    I: IntoIterator<Item = &'a Scalar>,
{
    scalars
        .into_iter()
        .try_fold(Scalar::zero(curve), |acc, s| acc.add(s))
}
