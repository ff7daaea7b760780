//! Zero-knowledge proofs about Paillier keys and ciphertexts
//!
//! Both proofs are made non-interactive with a merlin transcript bound to
//! the session id.

use super::{
    bit_len, bn_from_scalar, bn_from_u64, curve_order, random_unit, scalar_from_bn,
    PaillierPrivateKey, PaillierPublicKey,
};
use crate::curve::{Point, Scalar};
use crate::params::{PAILLIER_CHALLENGE_BITS, PAILLIER_ROUNDS, PAILLIER_SMALL_PRIME_BOUND, STAT_SEC};
use crate::{Error, Result};
use libpaillier::unknown_order::BigNumber;
use merlin::Transcript;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

/// Primes below `bound`, by sieve
fn small_primes(bound: u32) -> Vec<u64> {
    let bound = bound as usize;
    let mut composite = vec![false; bound];
    let mut primes = Vec::new();
    for i in 2..bound {
        if composite[i] {
            continue;
        }
        primes.push(i as u64);
        let mut j = i * i;
        while j < bound {
            composite[j] = true;
            j += i;
        }
    }
    primes
}

pub(crate) fn challenge_bits(t: &mut Transcript, label: &'static [u8], bits: usize) -> BigNumber {
    let mut buf = vec![0u8; bits.div_ceil(8)];
    t.challenge_bytes(label, &mut buf);
    BigNumber::from_slice(&buf)
}

/// Proof that `gcd(N, φ(N)) = 1`, by exhibiting N-th roots of random units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidKeyProof {
    #[serde(with = "super::serde_bn_vec")]
    sigmas: Vec<BigNumber>,
}

fn valid_key_rho(n: &BigNumber, sid: &[u8], i: usize) -> BigNumber {
    let mut t = Transcript::new(b"tmpc/paillier-valid-key");
    t.append_message(b"N", &n.to_bytes());
    t.append_message(b"sid", sid);
    t.append_u64(b"i", i as u64);
    challenge_bits(&mut t, b"rho", bit_len(n) + PAILLIER_CHALLENGE_BITS).nmod(n)
}

impl ValidKeyProof {
    pub fn prove(sk: &PaillierPrivateKey, sid: &[u8]) -> Self {
        let n = sk.public().n();
        let sigmas = (0..PAILLIER_ROUNDS)
            .map(|i| sk.nth_root(&valid_key_rho(n, sid, i)))
            .collect();
        Self { sigmas }
    }

    pub fn verify(&self, pk: &PaillierPublicKey, sid: &[u8]) -> Result<()> {
        let n = pk.n();
        let zero = BigNumber::zero();
        for p in small_primes(PAILLIER_SMALL_PRIME_BOUND) {
            if n.nmod(&bn_from_u64(p)) == zero {
                return Err(Error::crypto("paillier-valid-key", "modulus has a small factor"));
            }
        }
        if self.sigmas.len() != PAILLIER_ROUNDS {
            return Err(Error::crypto("paillier-valid-key", "invalid proof"));
        }
        for (i, sigma) in self.sigmas.iter().enumerate() {
            if BigNumber::is_zero(sigma) || sigma >= n {
                return Err(Error::crypto("paillier-valid-key", "invalid proof"));
            }
            if sigma.modpow(n, n) != valid_key_rho(n, sid, i) {
                return Err(Error::crypto("paillier-valid-key", "invalid proof"));
            }
        }
        Ok(())
    }
}

/// Proof that `c = Enc(x; r)` and `X = x·G` share the same `x` modulo the
/// curve order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncDlProof {
    #[serde(with = "super::serde_bn")]
    a_c: BigNumber,
    #[serde(with = "crate::mpc::wire::serde_hex")]
    a_x: Vec<u8>,
    #[serde(with = "super::serde_bn")]
    z: BigNumber,
    #[serde(with = "super::serde_bn")]
    z_beta: BigNumber,
}

fn enc_dl_challenge(
    pk: &PaillierPublicKey,
    c: &BigNumber,
    big_x: &Point,
    a_c: &BigNumber,
    a_x: &[u8],
    sid: &[u8],
    aux: u64,
) -> BigNumber {
    let mut t = Transcript::new(b"tmpc/paillier-enc-dl");
    t.append_u64(b"curve", big_x.curve().nid() as u64);
    t.append_message(b"N", &pk.n().to_bytes());
    t.append_message(b"c", &c.to_bytes());
    t.append_message(b"X", &big_x.to_bytes());
    t.append_message(b"A_c", &a_c.to_bytes());
    t.append_message(b"A_x", a_x);
    t.append_message(b"sid", sid);
    t.append_u64(b"aux", aux);
    challenge_bits(&mut t, b"e", PAILLIER_CHALLENGE_BITS)
}

impl EncDlProof {
    pub fn prove(
        pk: &PaillierPublicKey,
        c: &BigNumber,
        r: &BigNumber,
        x: &Scalar,
        big_x: &Point,
        sid: &[u8],
        aux: u64,
    ) -> Result<Self> {
        let curve = big_x.curve();
        let x_int = bn_from_scalar(x);
        if curve.mul_generator(x)? != *big_x || pk.encrypt_with(&x_int, r) != *c {
            return Err(Error::invalid_argument("paillier-enc-dl", "witness does not match statement"));
        }

        let alpha_bound = curve_order(curve) << (STAT_SEC + PAILLIER_CHALLENGE_BITS);
        let alpha = BigNumber::from_rng(&alpha_bound, &mut OsRng);
        let beta = random_unit(pk.n());
        let a_c = pk.encrypt_with(&alpha, &beta);
        let a_x = curve.mul_generator(&scalar_from_bn(curve, &alpha))?.to_bytes();

        let e = enc_dl_challenge(pk, c, big_x, &a_c, &a_x, sid, aux);
        let z = alpha + &e * &x_int;
        let z_beta = beta.modmul(&r.modpow(&e, pk.n()), pk.n());
        Ok(Self { a_c, a_x, z, z_beta })
    }

    pub fn verify(
        &self,
        pk: &PaillierPublicKey,
        c: &BigNumber,
        big_x: &Point,
        sid: &[u8],
        aux: u64,
    ) -> Result<()> {
        let curve = big_x.curve();
        let invalid = || Error::crypto("paillier-enc-dl", "invalid proof");
        pk.check_ciphertext(c)?;
        pk.check_ciphertext(&self.a_c).map_err(|_| invalid())?;

        let z_bound = curve_order(curve) << (STAT_SEC + PAILLIER_CHALLENGE_BITS + 1);
        if self.z >= z_bound {
            return Err(invalid());
        }
        if BigNumber::is_zero(&self.z_beta) || &self.z_beta >= pk.n() {
            return Err(invalid());
        }
        let a_x = Point::from_bytes(curve, &self.a_x).map_err(|_| invalid())?;

        let e = enc_dl_challenge(pk, c, big_x, &self.a_c, &self.a_x, sid, aux);
        let lhs = pk.encrypt_with(&self.z, &self.z_beta);
        let rhs = pk.add(&self.a_c, &pk.mul(c, &e));
        if lhs != rhs {
            return Err(invalid());
        }

        let e_q = scalar_from_bn(curve, &e);
        let lhs = curve.mul_generator(&scalar_from_bn(curve, &self.z))?;
        let rhs = a_x.add(&big_x.mul(&e_q)?)?;
        if lhs != rhs {
            return Err(invalid());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::Curve;
    use crate::paillier::tests::test_key;

    #[test]
    fn test_small_primes() {
        let primes = small_primes(30);
        assert_eq!(primes, vec![2, 3, 5, 7, 11, 13, 17, 19, 23, 29]);
        assert_eq!(*small_primes(PAILLIER_SMALL_PRIME_BOUND).last().unwrap(), 6367);
    }

    #[test]
    fn test_valid_key_proof() {
        let sk = test_key();
        let proof = ValidKeyProof::prove(sk, b"sid");
        proof.verify(sk.public(), b"sid").unwrap();
        assert!(proof.verify(sk.public(), b"other").is_err());

        let mut bad = proof.clone();
        bad.sigmas[3] = bad.sigmas[3].modadd(&BigNumber::one(), sk.public().n());
        assert!(bad.verify(sk.public(), b"sid").is_err());

        let mut short = proof;
        short.sigmas.pop();
        assert!(short.verify(sk.public(), b"sid").is_err());
    }

    #[test]
    fn test_enc_dl_proof() {
        let sk = test_key();
        let pk = sk.public();
        for curve in Curve::ALL {
            let x = curve.random_scalar(&mut OsRng);
            let big_x = curve.mul_generator(&x).unwrap();
            let (c, r) = pk.encrypt(&bn_from_scalar(&x));

            let proof = EncDlProof::prove(pk, &c, &r, &x, &big_x, b"sid", 1).unwrap();
            proof.verify(pk, &c, &big_x, b"sid", 1).unwrap();
            assert!(proof.verify(pk, &c, &big_x, b"sid", 2).is_err());

            // a ciphertext of a different value does not verify
            let (c2, _) = pk.encrypt(&bn_from_scalar(&x.add(&Scalar::one(curve)).unwrap()));
            assert!(proof.verify(pk, &c2, &big_x, b"sid", 1).is_err());

            let json = serde_json::to_string(&proof).unwrap();
            let back: EncDlProof = serde_json::from_str(&json).unwrap();
            back.verify(pk, &c, &big_x, b"sid", 1).unwrap();
        }
    }

    #[test]
    fn test_enc_dl_refuses_wrong_witness() {
        let sk = test_key();
        let pk = sk.public();
        let curve = Curve::Secp256k1;
        let x = curve.random_scalar(&mut OsRng);
        let big_x = curve.mul_generator(&x).unwrap();
        let (c, _) = pk.encrypt(&bn_from_scalar(&x));
        let wrong_r = random_unit(pk.n());
        assert!(EncDlProof::prove(pk, &c, &wrong_r, &x, &big_x, b"sid", 0).is_err());
    }
}
