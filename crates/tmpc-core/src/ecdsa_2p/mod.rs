//! Two-party ECDSA
//!
//! P1 holds a Paillier key and an additive share `x1`; P2 holds `x2` and
//! an encryption `c_key = Enc(x1)` under P1's key. Signing lets P2 build an
//! encryption of P1's partial `s` homomorphically, so only P1 learns the
//! signature.

mod dkg;
mod messages;
mod proof;
mod refresh;
mod sign;

pub use dkg::dkg;
pub use messages::*;
pub use proof::AffineProof;
pub use refresh::refresh;
pub use sign::{sign, sign_batch};

pub(crate) use dkg::dkg_with_paillier;

use crate::curve::{Curve, Point, Scalar};
use crate::mpc::wire::{decode_parts, encode_parts};
use crate::mpc::Role;
use crate::paillier::{bn_from_scalar, scalar_from_bn, PaillierPrivateKey, PaillierPublicKey};
use crate::{Error, Result};
use libpaillier::unknown_order::BigNumber;
use std::fmt;
use zeroize::Zeroize;

/// Aux tag for a discrete-log proof made by `role` about item `index`
pub(crate) fn dl_aux(role: Role, index: usize) -> u64 {
    ((role.index() as u64) << 32) | index as u64
}

pub(crate) fn check_curve(curve: Curve) -> Result<()> {
    if !curve.is_weierstrass() {
        return Err(Error::invalid_argument(
            "ecdsa-2p",
            format!("ECDSA is not defined over {}", curve),
        ));
    }
    Ok(())
}

/// P1 keeps its Paillier private key, P2 the matching public key
#[derive(Clone, PartialEq)]
pub enum PaillierKey {
    Private(PaillierPrivateKey),
    Public(PaillierPublicKey),
}

impl PaillierKey {
    pub fn public(&self) -> &PaillierPublicKey {
        match self {
            PaillierKey::Private(sk) => sk.public(),
            PaillierKey::Public(pk) => pk,
        }
    }

    pub fn private(&self) -> Option<&PaillierPrivateKey> {
        match self {
            PaillierKey::Private(sk) => Some(sk),
            PaillierKey::Public(_) => None,
        }
    }
}

/// One party's share of a two-party ECDSA key
#[derive(Clone, PartialEq)]
pub struct Share {
    role: Role,
    curve: Curve,
    x: Scalar,
    q: Point,
    paillier: PaillierKey,
    c_key: BigNumber,
}

impl Share {
    pub(crate) fn new(
        role: Role,
        x: Scalar,
        q: Point,
        paillier: PaillierKey,
        c_key: BigNumber,
    ) -> Result<Self> {
        let share = Self {
            role,
            curve: q.curve(),
            x,
            q,
            paillier,
            c_key,
        };
        share.check()?;
        Ok(share)
    }

    fn check(&self) -> Result<()> {
        check_curve(self.curve)?;
        if self.x.curve() != self.curve || self.x.is_zero() {
            return Err(Error::fatal("ecdsa-2p", "share scalar is zero or on another curve"));
        }
        if self.q.is_identity() {
            return Err(Error::fatal("ecdsa-2p", "public key is the identity"));
        }
        self.paillier.public().check_ciphertext(&self.c_key)?;
        match (self.role, &self.paillier) {
            (Role::P1, PaillierKey::Private(sk)) => {
                let x1 = scalar_from_bn(self.curve, &sk.decrypt(&self.c_key)?);
                if x1 != self.x {
                    return Err(Error::fatal("ecdsa-2p", "c_key does not encrypt the share"));
                }
            }
            (Role::P2, PaillierKey::Public(_)) => {}
            _ => {
                return Err(Error::fatal("ecdsa-2p", "Paillier key does not match role"));
            }
        }
        Ok(())
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn curve(&self) -> Curve {
        self.curve
    }

    /// Joint public key `Q = x1·G + x2·G`
    pub fn public_key(&self) -> &Point {
        &self.q
    }

    pub fn x_share(&self) -> &Scalar {
        &self.x
    }

    pub fn paillier(&self) -> &PaillierKey {
        &self.paillier
    }

    /// `Enc(x1)` under P1's Paillier key
    pub fn c_key(&self) -> &BigNumber {
        &self.c_key
    }

    /// `[role, curve nid, x, Q, paillier key, c_key]`
    ///
    /// The Paillier part is `p ‖ q` for P1 and `N` for P2.
    pub fn to_parts(&self) -> Vec<Vec<u8>> {
        let paillier = match &self.paillier {
            PaillierKey::Private(sk) => sk.to_bytes(),
            PaillierKey::Public(pk) => pk.to_bytes(),
        };
        vec![
            (self.role.index() as u32).to_be_bytes().to_vec(),
            self.curve.nid().to_be_bytes().to_vec(),
            self.x.to_bytes(),
            self.q.to_bytes(),
            paillier,
            self.c_key.to_bytes(),
        ]
    }

    pub fn from_parts(parts: &[Vec<u8>]) -> Result<Self> {
        if parts.len() != 6 {
            return Err(Error::invalid_argument(
                "ecdsa-2p",
                format!("share has {} parts, expected 6", parts.len()),
            ));
        }
        let role = Role::from_index(read_u32(&parts[0])? as usize)?;
        let curve = Curve::from_nid(read_u32(&parts[1])?)?;
        let x = Scalar::from_bytes(curve, &parts[2])?;
        let q = Point::from_bytes(curve, &parts[3])?;
        let paillier = match role {
            Role::P1 => PaillierKey::Private(PaillierPrivateKey::from_bytes(&parts[4])?),
            Role::P2 => PaillierKey::Public(PaillierPublicKey::from_bytes(&parts[4])?),
        };
        let c_key = BigNumber::from_slice(&parts[5]);
        Self::new(role, x, q, paillier, c_key)
            .map_err(|e| Error::invalid_argument("ecdsa-2p", e.to_string()))
    }

    pub fn marshal(&self) -> Vec<u8> {
        encode_parts(&self.to_parts())
    }

    pub fn unmarshal(bytes: &[u8]) -> Result<Self> {
        Self::from_parts(&decode_parts(bytes)?)
    }

    /// Plaintext of `c_key` as an integer, for P1's re-encryption
    pub(crate) fn x_int(&self) -> BigNumber {
        bn_from_scalar(&self.x)
    }
}

fn read_u32(bytes: &[u8]) -> Result<u32> {
    let array: [u8; 4] = bytes
        .try_into()
        .map_err(|_| Error::invalid_argument("ecdsa-2p", "expected a 4-byte integer"))?;
    Ok(u32::from_be_bytes(array))
}

impl fmt::Debug for Share {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Share")
            .field("role", &self.role)
            .field("curve", &self.curve)
            .field("public_key", &self.q)
            .finish_non_exhaustive()
    }
}

impl Drop for Share {
    fn drop(&mut self) {
        self.x.zeroize();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::mpc::{Job2P, MemoryTransport};
    use crate::paillier::tests::test_key;
    use crate::test_utils::run_2p;
    use crate::ErrorKind;

    /// DKG with the cached test Paillier key
    pub(crate) async fn test_dkg(curve: Curve) -> Vec<Share> {
        run_2p(move |mut job: Job2P<MemoryTransport>| async move {
            let sk = test_key().clone();
            dkg_with_paillier(&mut job, curve, Some(sk)).await.unwrap()
        })
        .await
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_share_parts_and_marshal() {
        let shares = test_dkg(Curve::Secp256k1).await;
        for share in &shares {
            let parts = share.to_parts();
            assert_eq!(parts.len(), 6);
            assert_eq!(parts[1], 714u32.to_be_bytes().to_vec());
            let back = Share::from_parts(&parts).unwrap();
            assert!(back == *share);

            let back = Share::unmarshal(&share.marshal()).unwrap();
            assert!(back == *share);
        }
        assert_eq!(shares[0].to_parts()[0], vec![0, 0, 0, 0]);
        assert_eq!(shares[1].to_parts()[0], vec![0, 0, 0, 1]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_from_parts_rejects_inconsistent_share() {
        let shares = test_dkg(Curve::P256).await;

        let mut parts = shares[0].to_parts();
        parts[2] = Scalar::one(Curve::P256).to_bytes();
        let err = Share::from_parts(&parts).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let mut parts = shares[1].to_parts();
        parts[1] = 1087u32.to_be_bytes().to_vec();
        assert!(Share::from_parts(&parts).is_err());

        let mut parts = shares[1].to_parts();
        parts[0] = 0u32.to_be_bytes().to_vec();
        assert!(Share::from_parts(&parts).is_err());

        assert!(Share::from_parts(&shares[0].to_parts()[..5]).is_err());
    }

    #[test]
    fn test_debug_hides_secret() {
        let curve = Curve::Secp256k1;
        let sk = test_key().clone();
        let x = Scalar::from_u64(curve, 12345);
        let (c_key, _) = sk.public().encrypt(&bn_from_scalar(&x));
        let q = curve.mul_generator(&x).unwrap();
        let share = Share::new(Role::P1, x, q, PaillierKey::Private(sk), c_key).unwrap();
        let rendered = format!("{:?}", share);
        assert!(rendered.contains("P1"));
        assert!(!rendered.contains(&hex::encode(x.to_bytes())));
    }
}
