use super::{mismatch, Curve, Scalar};
use crate::{Error, Result};
use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::traits::{Identity, IsIdentity};
use elliptic_curve::group::Group;
use elliptic_curve::point::AffineCoordinates;
use elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use std::fmt;

/// Group element of a supported curve, including the point at infinity
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Point {
    Secp256k1(k256::ProjectivePoint),
    P256(p256::ProjectivePoint),
    Ed25519(EdwardsPoint),
}

impl Point {
    pub fn curve(&self) -> Curve {
        match self {
            Point::Secp256k1(_) => Curve::Secp256k1,
            Point::P256(_) => Curve::P256,
            Point::Ed25519(_) => Curve::Ed25519,
        }
    }

    pub fn generator(curve: Curve) -> Self {
        match curve {
            Curve::Secp256k1 => Point::Secp256k1(k256::ProjectivePoint::GENERATOR),
            Curve::P256 => Point::P256(p256::ProjectivePoint::GENERATOR),
            Curve::Ed25519 => {
                Point::Ed25519(curve25519_dalek::constants::ED25519_BASEPOINT_POINT)
            }
        }
    }

    pub fn identity(curve: Curve) -> Self {
        match curve {
            Curve::Secp256k1 => Point::Secp256k1(k256::ProjectivePoint::IDENTITY),
            Curve::P256 => Point::P256(p256::ProjectivePoint::IDENTITY),
            Curve::Ed25519 => Point::Ed25519(EdwardsPoint::identity()),
        }
    }

    pub(crate) fn mul_base(k: &Scalar) -> Self {
        match k {
            Scalar::Secp256k1(k) => Point::Secp256k1(k256::ProjectivePoint::GENERATOR * *k),
            Scalar::P256(k) => Point::P256(p256::ProjectivePoint::GENERATOR * *k),
            Scalar::Ed25519(k) => Point::Ed25519(EdwardsPoint::mul_base(k)),
        }
    }

    pub fn is_identity(&self) -> bool {
        match self {
            Point::Secp256k1(p) => bool::from(p.is_identity()),
            Point::P256(p) => bool::from(p.is_identity()),
            Point::Ed25519(p) => p.is_identity(),
        }
    }

    pub fn add(&self, other: &Point) -> Result<Point> {
        Ok(match (self, other) {
            (Point::Secp256k1(a), Point::Secp256k1(b)) => Point::Secp256k1(*a + *b),
            (Point::P256(a), Point::P256(b)) => Point::P256(*a + *b),
            (Point::Ed25519(a), Point::Ed25519(b)) => Point::Ed25519(*a + *b),
            _ => return Err(mismatch()),
        })
    }

    pub fn sub(&self, other: &Point) -> Result<Point> {
        Ok(match (self, other) {
            (Point::Secp256k1(a), Point::Secp256k1(b)) => Point::Secp256k1(*a - *b),
            (Point::P256(a), Point::P256(b)) => Point::P256(*a - *b),
            (Point::Ed25519(a), Point::Ed25519(b)) => Point::Ed25519(*a - *b),
            _ => return Err(mismatch()),
        })
    }

    pub fn mul(&self, k: &Scalar) -> Result<Point> {
        Ok(match (self, k) {
            (Point::Secp256k1(p), Scalar::Secp256k1(k)) => Point::Secp256k1(*p * *k),
            (Point::P256(p), Scalar::P256(k)) => Point::P256(*p * *k),
            (Point::Ed25519(p), Scalar::Ed25519(k)) => Point::Ed25519(*p * *k),
            _ => return Err(mismatch()),
        })
    }

    pub fn neg(&self) -> Point {
        match self {
            Point::Secp256k1(p) => Point::Secp256k1(-*p),
            Point::P256(p) => Point::P256(-*p),
            Point::Ed25519(p) => Point::Ed25519(-*p),
        }
    }

    /// Canonical encoding
    ///
    /// SEC1 uncompressed on Weierstrass curves (a single zero byte for the
    /// point at infinity), RFC 8032 compressed on Ed25519.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Point::Secp256k1(p) => p.to_affine().to_encoded_point(false).as_bytes().to_vec(),
            Point::P256(p) => p.to_affine().to_encoded_point(false).as_bytes().to_vec(),
            Point::Ed25519(p) => p.compress().as_bytes().to_vec(),
        }
    }

    /// Decode a canonical encoding, rejecting anything else
    pub fn from_bytes(curve: Curve, bytes: &[u8]) -> Result<Self> {
        match curve {
            Curve::Secp256k1 | Curve::P256 => {
                if bytes == [0u8] {
                    return Ok(Point::identity(curve));
                }
                if bytes.len() != curve.point_len() || bytes[0] != 0x04 {
                    return Err(invalid_encoding(curve));
                }
                if curve == Curve::Secp256k1 {
                    let encoded = k256::EncodedPoint::from_bytes(bytes)
                        .map_err(|_| invalid_encoding(curve))?;
                    let affine = Option::<k256::AffinePoint>::from(
                        k256::AffinePoint::from_encoded_point(&encoded),
                    )
                    .ok_or_else(|| invalid_encoding(curve))?;
                    Ok(Point::Secp256k1(affine.into()))
                } else {
                    let encoded = p256::EncodedPoint::from_bytes(bytes)
                        .map_err(|_| invalid_encoding(curve))?;
                    let affine = Option::<p256::AffinePoint>::from(
                        p256::AffinePoint::from_encoded_point(&encoded),
                    )
                    .ok_or_else(|| invalid_encoding(curve))?;
                    Ok(Point::P256(affine.into()))
                }
            }
            Curve::Ed25519 => {
                let array: [u8; 32] = bytes.try_into().map_err(|_| invalid_encoding(curve))?;
                let point = CompressedEdwardsY(array)
                    .decompress()
                    .ok_or_else(|| invalid_encoding(curve))?;
                if point.compress().as_bytes() != &array {
                    return Err(invalid_encoding(curve));
                }
                if !point.is_torsion_free() {
                    return Err(Error::crypto("point", "Ed25519 point has a torsion component"));
                }
                Ok(Point::Ed25519(point))
            }
        }
    }

    /// Affine x-coordinate, big-endian; only defined on Weierstrass curves
    pub fn x_coordinate(&self) -> Result<Vec<u8>> {
        if self.is_identity() {
            return Err(Error::crypto("point", "point at infinity has no coordinates"));
        }
        match self {
            Point::Secp256k1(p) => Ok(p.to_affine().x().to_vec()),
            Point::P256(p) => Ok(p.to_affine().x().to_vec()),
            Point::Ed25519(_) => Err(Error::invalid_argument(
                "point",
                "x-coordinate requested on Ed25519",
            )),
        }
    }
}

fn invalid_encoding(curve: Curve) -> Error {
    Error::crypto("point", format!("invalid {} point encoding", curve))
}

impl fmt::Debug for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Point({}, {})", self.curve(), hex::encode(self.to_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_encoding_round_trip() {
        for curve in Curve::ALL {
            let p = curve.mul_generator(&curve.random_scalar(&mut OsRng)).unwrap();
            let bytes = p.to_bytes();
            assert_eq!(bytes.len(), curve.point_len());
            assert_eq!(Point::from_bytes(curve, &bytes).unwrap(), p);

            let id = curve.identity();
            assert_eq!(Point::from_bytes(curve, &id.to_bytes()).unwrap(), id);
        }
    }

    #[test]
    fn test_rejects_flipped_high_bit() {
        for curve in [Curve::Secp256k1, Curve::P256] {
            let p = curve.mul_generator(&curve.random_scalar(&mut OsRng)).unwrap();
            let mut bytes = p.to_bytes();
            // 0x04 becomes 0x84, not a SEC1 tag
            bytes[0] ^= 0x80;
            assert!(Point::from_bytes(curve, &bytes).is_err());
        }

        // the top bit of an Ed25519 encoding is the sign of x and decodes to
        // the negated point, so flip a bit of y instead
        let p = Curve::Ed25519
            .mul_generator(&Curve::Ed25519.random_scalar(&mut OsRng))
            .unwrap();
        let mut bytes = p.to_bytes();
        bytes[30] ^= 0x80;
        if let Ok(q) = Point::from_bytes(Curve::Ed25519, &bytes) {
            assert_ne!(q, p);
        }
    }

    #[test]
    fn test_rejects_off_curve_and_non_canonical() {
        let mut bytes = Curve::P256.generator().to_bytes();
        bytes[64] ^= 0x01;
        assert!(Point::from_bytes(Curve::P256, &bytes).is_err());

        // y = p + 1 is a non-canonical encoding of y = 1 (the identity)
        let mut non_canonical = [0xffu8; 32];
        non_canonical[0] = 0xee;
        non_canonical[31] = 0x7f;
        assert!(Point::from_bytes(Curve::Ed25519, &non_canonical).is_err());

        // compressed SEC1 is not accepted
        let compressed = k256::ProjectivePoint::GENERATOR
            .to_affine()
            .to_encoded_point(true);
        assert!(Point::from_bytes(Curve::Secp256k1, compressed.as_bytes()).is_err());
    }

    #[test]
    fn test_group_law() {
        for curve in Curve::ALL {
            let a = curve.random_scalar(&mut OsRng);
            let b = curve.random_scalar(&mut OsRng);
            let pa = curve.mul_generator(&a).unwrap();
            let pb = curve.mul_generator(&b).unwrap();
            let sum = curve.mul_generator(&a.add(&b).unwrap()).unwrap();
            assert_eq!(pa.add(&pb).unwrap(), sum);
            assert_eq!(sum.sub(&pb).unwrap(), pa);
            assert_eq!(curve.generator().mul(&a).unwrap(), pa);
            assert!(pa.add(&pa.neg()).unwrap().is_identity());
        }
    }
}
