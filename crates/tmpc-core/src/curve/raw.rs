use super::{Curve, Scalar};
use serde::{Deserialize, Serialize};

/// Unreduced big-endian integer
///
/// Callers that assemble scalars from integers before a curve operation
/// work with this type; [`Curve::add_mod_order`] brings the result back
/// into the field.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RawScalar(Vec<u8>);

impl RawScalar {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// `v` as an `ℓ`-byte big-endian encoding; negative values map to `n - |v|`
    pub fn from_int64(curve: Curve, v: i64) -> Self {
        let magnitude = Scalar::from_u64(curve, v.unsigned_abs());
        let value = if v < 0 { magnitude.neg() } else { magnitude };
        Self(value.to_bytes())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Integer addition with carry and no reduction
    ///
    /// The result is as long as the longer operand, plus one byte when the
    /// top limb carries.
    pub fn add(&self, other: &RawScalar) -> RawScalar {
        let len = self.0.len().max(other.0.len());
        let mut out = vec![0u8; len];
        let mut carry = 0u16;
        for i in 0..len {
            let a = byte_from_end(&self.0, i);
            let b = byte_from_end(&other.0, i);
            let sum = a as u16 + b as u16 + carry;
            out[len - 1 - i] = sum as u8;
            carry = sum >> 8;
        }
        if carry != 0 {
            out.insert(0, carry as u8);
        }
        RawScalar(out)
    }
}

fn byte_from_end(bytes: &[u8], i: usize) -> u8 {
    if i < bytes.len() {
        bytes[bytes.len() - 1 - i]
    } else {
        0
    }
}

impl From<Scalar> for RawScalar {
    fn from(s: Scalar) -> Self {
        RawScalar(s.to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_carries() {
        let a = RawScalar::new(vec![0xff, 0xff]);
        let b = RawScalar::new(vec![0x01]);
        assert_eq!(a.add(&b).as_bytes(), &[0x01, 0x00, 0x00]);

        let c = RawScalar::new(vec![0x01, 0x02]);
        assert_eq!(c.add(&RawScalar::default()).as_bytes(), &[0x01, 0x02]);
    }

    #[test]
    fn test_from_int64() {
        let curve = Curve::Secp256k1;
        let one = RawScalar::from_int64(curve, 1);
        assert_eq!(one.as_bytes().len(), 32);
        assert_eq!(one.as_bytes()[31], 1);

        let zero = RawScalar::from_int64(curve, 0);
        assert_eq!(zero.as_bytes(), &[0u8; 32]);

        let minus_one = RawScalar::from_int64(curve, -1);
        assert_eq!(
            curve.add_mod_order(&one, &minus_one),
            Scalar::zero(curve)
        );
    }
}
