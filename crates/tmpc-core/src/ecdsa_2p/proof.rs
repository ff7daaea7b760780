//! P2's proof that its signing ciphertext is well formed
//!
//! Statement: `c = c_key^(r·w1) · Enc(w1·m + w2·r + ρ·q; rc)` with
//! `w1·R2 = G` and `w2·R2 = X2`. A Σ-protocol with integer responses, so
//! the Paillier relation holds over the integers and the curve relations
//! hold modulo `q`.

use crate::curve::{Curve, Point, Scalar};
use crate::paillier::proofs::challenge_bits;
use crate::paillier::{bn_from_scalar, curve_order, random_unit, scalar_from_bn, PaillierPublicKey};
use crate::params::{PAILLIER_CHALLENGE_BITS, STAT_SEC};
use crate::{Error, Result};
use libpaillier::unknown_order::BigNumber;
use merlin::Transcript;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

/// Public inputs shared by prover and verifier
pub(crate) struct AffineStatement<'a> {
    pub pk: &'a PaillierPublicKey,
    pub c_key: &'a BigNumber,
    pub c: &'a BigNumber,
    pub big_r2: &'a Point,
    pub x2: &'a Point,
    pub m: &'a Scalar,
    pub r: &'a Scalar,
}

/// Secret inputs known to P2
pub(crate) struct AffineWitness<'a> {
    pub w1: &'a Scalar,
    pub w2: &'a Scalar,
    pub rho: &'a BigNumber,
    pub rc: &'a BigNumber,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffineProof {
    #[serde(with = "crate::mpc::wire::serde_hex")]
    a_g: Vec<u8>,
    #[serde(with = "crate::mpc::wire::serde_hex")]
    a_x: Vec<u8>,
    #[serde(with = "crate::paillier::serde_bn")]
    a_c: BigNumber,
    #[serde(with = "crate::paillier::serde_bn")]
    z1: BigNumber,
    #[serde(with = "crate::paillier::serde_bn")]
    z2: BigNumber,
    #[serde(with = "crate::paillier::serde_bn")]
    z3: BigNumber,
    #[serde(with = "crate::paillier::serde_bn")]
    z_beta: BigNumber,
}

/// Bound on the scalar masks; responses may be up to twice as large
fn scalar_mask_bound(curve: Curve) -> BigNumber {
    curve_order(curve) << (STAT_SEC + PAILLIER_CHALLENGE_BITS)
}

/// `ρ` is drawn below `q²·2^(2·STAT_SEC)`; its mask adds one more margin
fn rho_mask_bound(curve: Curve) -> BigNumber {
    let q = curve_order(curve);
    (&q * &q) << (3 * STAT_SEC + PAILLIER_CHALLENGE_BITS)
}

impl AffineStatement<'_> {
    /// `c_key^(r·a) · Enc(a·m + b·r + d·q; randomness)`
    fn evaluate(&self, a: &BigNumber, b: &BigNumber, d: &BigNumber, randomness: &BigNumber) -> BigNumber {
        let curve = self.m.curve();
        let r = bn_from_scalar(self.r);
        let plain = a * bn_from_scalar(self.m) + b * &r + d * curve_order(curve);
        let scaled = self.pk.mul(self.c_key, &(&r * a));
        self.pk.add(&scaled, &self.pk.encrypt_with(&plain, randomness))
    }

    fn challenge(&self, a_g: &[u8], a_x: &[u8], a_c: &BigNumber, sid: &[u8], aux: u64) -> BigNumber {
        let mut t = Transcript::new(b"tmpc/ecdsa-2p-affine");
        t.append_u64(b"curve", self.m.curve().nid() as u64);
        t.append_message(b"N", &self.pk.n().to_bytes());
        t.append_message(b"c_key", &self.c_key.to_bytes());
        t.append_message(b"c", &self.c.to_bytes());
        t.append_message(b"R2", &self.big_r2.to_bytes());
        t.append_message(b"X2", &self.x2.to_bytes());
        t.append_message(b"m", &self.m.to_bytes());
        t.append_message(b"r", &self.r.to_bytes());
        t.append_message(b"A_g", a_g);
        t.append_message(b"A_x", a_x);
        t.append_message(b"A_c", &a_c.to_bytes());
        t.append_message(b"sid", sid);
        t.append_u64(b"aux", aux);
        challenge_bits(&mut t, b"e", PAILLIER_CHALLENGE_BITS)
    }
}

impl AffineProof {
    pub(crate) fn prove(
        st: &AffineStatement<'_>,
        wit: &AffineWitness<'_>,
        sid: &[u8],
        aux: u64,
    ) -> Result<Self> {
        let curve = st.m.curve();
        let alpha1 = BigNumber::from_rng(&scalar_mask_bound(curve), &mut OsRng);
        let alpha2 = BigNumber::from_rng(&scalar_mask_bound(curve), &mut OsRng);
        let alpha3 = BigNumber::from_rng(&rho_mask_bound(curve), &mut OsRng);
        let beta = random_unit(st.pk.n());

        let a_g = st.big_r2.mul(&scalar_from_bn(curve, &alpha1))?.to_bytes();
        let a_x = st.big_r2.mul(&scalar_from_bn(curve, &alpha2))?.to_bytes();
        let a_c = st.evaluate(&alpha1, &alpha2, &alpha3, &beta);

        let e = st.challenge(&a_g, &a_x, &a_c, sid, aux);
        let z1 = alpha1 + &e * bn_from_scalar(wit.w1);
        let z2 = alpha2 + &e * bn_from_scalar(wit.w2);
        let z3 = alpha3 + &e * wit.rho;
        let z_beta = beta.modmul(&wit.rc.modpow(&e, st.pk.n()), st.pk.n());
        Ok(Self {
            a_g,
            a_x,
            a_c,
            z1,
            z2,
            z3,
            z_beta,
        })
    }

    pub(crate) fn verify(&self, st: &AffineStatement<'_>, sid: &[u8], aux: u64) -> Result<()> {
        let curve = st.m.curve();
        let invalid = || Error::crypto("ecdsa-2p-affine", "invalid proof");
        st.pk.check_ciphertext(st.c)?;
        st.pk.check_ciphertext(&self.a_c).map_err(|_| invalid())?;

        let scalar_bound = scalar_mask_bound(curve) << 1;
        if self.z1 >= scalar_bound || self.z2 >= scalar_bound {
            return Err(invalid());
        }
        if self.z3 >= rho_mask_bound(curve) << 1 {
            return Err(invalid());
        }
        if BigNumber::is_zero(&self.z_beta) || &self.z_beta >= st.pk.n() {
            return Err(invalid());
        }
        let a_g = Point::from_bytes(curve, &self.a_g).map_err(|_| invalid())?;
        let a_x = Point::from_bytes(curve, &self.a_x).map_err(|_| invalid())?;

        let e = st.challenge(&self.a_g, &self.a_x, &self.a_c, sid, aux);
        let e_q = scalar_from_bn(curve, &e);

        let lhs = st.big_r2.mul(&scalar_from_bn(curve, &self.z1))?;
        if lhs != a_g.add(&curve.generator().mul(&e_q)?)? {
            return Err(invalid());
        }
        let lhs = st.big_r2.mul(&scalar_from_bn(curve, &self.z2))?;
        if lhs != a_x.add(&st.x2.mul(&e_q)?)? {
            return Err(invalid());
        }

        let lhs = st.evaluate(&self.z1, &self.z2, &self.z3, &self.z_beta);
        let rhs = st.pk.add(&self.a_c, &st.pk.mul(st.c, &e));
        if lhs != rhs {
            return Err(invalid());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paillier::tests::test_key;

    struct Fixture {
        c_key: BigNumber,
        big_r2: Point,
        x2: Point,
        m: Scalar,
        r: Scalar,
        w1: Scalar,
        w2: Scalar,
        rho: BigNumber,
        rc: BigNumber,
        c: BigNumber,
    }

    fn fixture(curve: Curve) -> Fixture {
        let pk = test_key().public();
        let x1 = curve.random_scalar(&mut OsRng);
        let x2_s = curve.random_scalar(&mut OsRng);
        let k2 = curve.random_scalar(&mut OsRng);
        let (c_key, _) = pk.encrypt(&bn_from_scalar(&x1));
        let m = curve.random_scalar(&mut OsRng);
        let r = curve.random_scalar(&mut OsRng);
        let w1 = k2.invert().unwrap();
        let w2 = w1.mul(&x2_s).unwrap();
        let q = curve_order(curve);
        let rho = BigNumber::from_rng(&((&q * &q) << (2 * STAT_SEC)), &mut OsRng);
        let rc = random_unit(pk.n());

        let st_r = bn_from_scalar(&r);
        let w1_int = bn_from_scalar(&w1);
        let plain = &w1_int * bn_from_scalar(&m) + bn_from_scalar(&w2) * &st_r + &rho * &q;
        let c = pk.add(&pk.mul(&c_key, &(&st_r * &w1_int)), &pk.encrypt_with(&plain, &rc));
        Fixture {
            c_key,
            big_r2: curve.mul_generator(&k2).unwrap(),
            x2: curve.mul_generator(&x2_s).unwrap(),
            m,
            r,
            w1,
            w2,
            rho,
            rc,
            c,
        }
    }

    fn statement<'a>(f: &'a Fixture) -> AffineStatement<'a> {
        AffineStatement {
            pk: test_key().public(),
            c_key: &f.c_key,
            c: &f.c,
            big_r2: &f.big_r2,
            x2: &f.x2,
            m: &f.m,
            r: &f.r,
        }
    }

    #[test]
    fn test_affine_proof_completeness() {
        for curve in [Curve::Secp256k1, Curve::P256] {
            let f = fixture(curve);
            let wit = AffineWitness {
                w1: &f.w1,
                w2: &f.w2,
                rho: &f.rho,
                rc: &f.rc,
            };
            let proof = AffineProof::prove(&statement(&f), &wit, b"sid", 3).unwrap();
            proof.verify(&statement(&f), b"sid", 3).unwrap();
            assert!(proof.verify(&statement(&f), b"sid", 4).is_err());
        }
    }

    #[test]
    fn test_affine_proof_binds_message() {
        let curve = Curve::Secp256k1;
        let f = fixture(curve);
        let wit = AffineWitness {
            w1: &f.w1,
            w2: &f.w2,
            rho: &f.rho,
            rc: &f.rc,
        };
        let proof = AffineProof::prove(&statement(&f), &wit, b"sid", 0).unwrap();

        let other_m = f.m.add(&Scalar::one(curve)).unwrap();
        let mut st = statement(&f);
        st.m = &other_m;
        assert!(proof.verify(&st, b"sid", 0).is_err());

        let other_x2 = curve.generator();
        let mut st = statement(&f);
        st.x2 = &other_x2;
        assert!(proof.verify(&st, b"sid", 0).is_err());
    }

    #[test]
    fn test_affine_proof_rejects_wrong_ciphertext() {
        let f = fixture(Curve::P256);
        let wit = AffineWitness {
            w1: &f.w1,
            w2: &f.w2,
            rho: &f.rho,
            rc: &f.rc,
        };
        let proof = AffineProof::prove(&statement(&f), &wit, b"sid", 0).unwrap();
        let pk = test_key().public();
        let shifted = pk.add_plain(&f.c, &BigNumber::one());
        let mut st = statement(&f);
        st.c = &shifted;
        assert!(proof.verify(&st, b"sid", 0).is_err());
    }
}
