//! Paillier encryption over `libpaillier`'s big integers
//!
//! Uses the `g = N + 1` variant: `Enc(m; r) = (1 + m·N)·r^N mod N²`.

pub mod proofs;

pub use proofs::{EncDlProof, ValidKeyProof};

use crate::curve::{Curve, Scalar};
use crate::mpc::wire::{decode_parts, encode_parts};
use crate::params::PAILLIER_BITS;
use crate::{Error, Result};
use libpaillier::unknown_order::BigNumber;
use rand::rngs::OsRng;
use std::fmt;
use zeroize::Zeroize;

const KEYGEN_ATTEMPTS: usize = 64;

/// Bit length of a non-negative integer
pub(crate) fn bit_len(n: &BigNumber) -> usize {
    let bytes = n.to_bytes();
    match bytes.iter().position(|&b| b != 0) {
        None => 0,
        Some(i) => (bytes.len() - i) * 8 - bytes[i].leading_zeros() as usize,
    }
}

pub(crate) fn bn_from_u64(v: u64) -> BigNumber {
    BigNumber::from_slice(v.to_be_bytes())
}

pub(crate) fn bn_from_scalar(s: &Scalar) -> BigNumber {
    BigNumber::from_slice(s.to_bytes())
}

/// Reduce a non-negative integer into a scalar
pub(crate) fn scalar_from_bn(curve: Curve, n: &BigNumber) -> Scalar {
    Scalar::reduce_be(curve, &n.to_bytes())
}

pub(crate) fn curve_order(curve: Curve) -> BigNumber {
    BigNumber::from_slice(curve.order())
}

/// Uniform element of `Z_N^*`
pub(crate) fn random_unit(n: &BigNumber) -> BigNumber {
    loop {
        let r = BigNumber::from_rng(n, &mut OsRng);
        if !BigNumber::is_zero(&r) && r.gcd(n) == BigNumber::one() {
            return r;
        }
    }
}

/// Serde adapter writing big integers as big-endian hex
pub(crate) mod serde_bn {
    use libpaillier::unknown_order::BigNumber;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(n: &BigNumber, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(n.to_bytes()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<BigNumber, D::Error> {
        let s = String::deserialize(d)?;
        let bytes = hex::decode(s).map_err(serde::de::Error::custom)?;
        Ok(BigNumber::from_slice(bytes))
    }
}

pub(crate) mod serde_bn_vec {
    use libpaillier::unknown_order::BigNumber;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(items: &[BigNumber], s: S) -> Result<S::Ok, S::Error> {
        items
            .iter()
            .map(|n| hex::encode(n.to_bytes()))
            .collect::<Vec<_>>()
            .serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<BigNumber>, D::Error> {
        Vec::<String>::deserialize(d)?
            .into_iter()
            .map(|s| {
                hex::decode(s)
                    .map(BigNumber::from_slice)
                    .map_err(serde::de::Error::custom)
            })
            .collect()
    }
}

#[derive(Clone, PartialEq)]
pub struct PaillierPublicKey {
    n: BigNumber,
    nn: BigNumber,
}

impl PaillierPublicKey {
    /// Accept a peer's modulus; size and small factors are checked here,
    /// well-formedness by [`ValidKeyProof`]
    pub fn from_modulus(n: BigNumber) -> Result<Self> {
        if bit_len(&n) < PAILLIER_BITS {
            return Err(Error::crypto("paillier", "modulus too small"));
        }
        if n.nmod(&bn_from_u64(2)) != BigNumber::one() {
            return Err(Error::crypto("paillier", "even modulus"));
        }
        let nn = &n * &n;
        Ok(Self { n, nn })
    }

    pub fn n(&self) -> &BigNumber {
        &self.n
    }

    pub fn nn(&self) -> &BigNumber {
        &self.nn
    }

    /// `(1 + m·N)·r^N mod N²`
    pub fn encrypt_with(&self, m: &BigNumber, r: &BigNumber) -> BigNumber {
        let gm = (BigNumber::one() + m.nmod(&self.n) * &self.n).nmod(&self.nn);
        gm.modmul(&r.modpow(&self.n, &self.nn), &self.nn)
    }

    /// Encrypt with fresh randomness; returns `(c, r)`
    pub fn encrypt(&self, m: &BigNumber) -> (BigNumber, BigNumber) {
        let r = random_unit(&self.n);
        (self.encrypt_with(m, &r), r)
    }

    /// Homomorphic addition of plaintexts
    pub fn add(&self, c1: &BigNumber, c2: &BigNumber) -> BigNumber {
        c1.modmul(c2, &self.nn)
    }

    /// Add a known plaintext without re-randomising
    pub fn add_plain(&self, c: &BigNumber, m: &BigNumber) -> BigNumber {
        let gm = (BigNumber::one() + m.nmod(&self.n) * &self.n).nmod(&self.nn);
        c.modmul(&gm, &self.nn)
    }

    /// Homomorphic multiplication by a non-negative integer
    pub fn mul(&self, c: &BigNumber, k: &BigNumber) -> BigNumber {
        c.modpow(k, &self.nn)
    }

    pub fn rerandomize(&self, c: &BigNumber) -> BigNumber {
        let r = random_unit(&self.n);
        c.modmul(&r.modpow(&self.n, &self.nn), &self.nn)
    }

    /// `0 < c < N²` and `gcd(c, N) = 1`
    pub fn check_ciphertext(&self, c: &BigNumber) -> Result<()> {
        if BigNumber::is_zero(c) || c >= &self.nn || c.gcd(&self.n) != BigNumber::one() {
            return Err(Error::crypto("paillier", "invalid ciphertext"));
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.n.to_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_modulus(BigNumber::from_slice(bytes))
    }
}

impl fmt::Debug for PaillierPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PaillierPublicKey({} bits)", bit_len(&self.n))
    }
}

#[derive(Clone)]
pub struct PaillierPrivateKey {
    public: PaillierPublicKey,
    p: BigNumber,
    q: BigNumber,
    phi: BigNumber,
    /// `φ(N)⁻¹ mod N`
    mu: BigNumber,
    /// `N⁻¹ mod φ(N)`, used for N-th roots
    n_inv: BigNumber,
}

impl PaillierPrivateKey {
    /// Fresh key with a modulus of exactly [`PAILLIER_BITS`] bits
    pub fn generate() -> Result<Self> {
        for _ in 0..KEYGEN_ATTEMPTS {
            let p = BigNumber::prime(PAILLIER_BITS / 2);
            let q = BigNumber::prime(PAILLIER_BITS / 2);
            if p == q {
                continue;
            }
            let n = &p * &q;
            if bit_len(&n) != PAILLIER_BITS {
                continue;
            }
            return Self::from_primes(p, q);
        }
        Err(Error::crypto("paillier", "key generation did not converge"))
    }

    pub fn from_primes(p: BigNumber, q: BigNumber) -> Result<Self> {
        let one = BigNumber::one();
        let n = &p * &q;
        let public = PaillierPublicKey::from_modulus(n)?;
        let phi = (&p - &one) * (&q - &one);
        let mu = phi
            .invert(&public.n)
            .ok_or_else(|| Error::crypto("paillier", "gcd(N, φ(N)) ≠ 1"))?;
        let n_inv = public
            .n
            .invert(&phi)
            .ok_or_else(|| Error::crypto("paillier", "gcd(N, φ(N)) ≠ 1"))?;
        Ok(Self {
            public,
            p,
            q,
            phi,
            mu,
            n_inv,
        })
    }

    pub fn public(&self) -> &PaillierPublicKey {
        &self.public
    }

    pub fn decrypt(&self, c: &BigNumber) -> Result<BigNumber> {
        self.public.check_ciphertext(c)?;
        let n = &self.public.n;
        let u = c.modpow(&self.phi, &self.public.nn);
        let l = (u - BigNumber::one()) / n;
        Ok(l.modmul(&self.mu, n))
    }

    /// `x^(N⁻¹ mod φ(N)) mod N`, the unique N-th root of a unit `x`
    pub(crate) fn nth_root(&self, x: &BigNumber) -> BigNumber {
        x.modpow(&self.n_inv, &self.public.n)
    }

    /// Recover the encryption randomness `r` of `c = Enc(m; r)`
    pub fn randomness_of(&self, c: &BigNumber, m: &BigNumber) -> Result<BigNumber> {
        let n = &self.public.n;
        // c·(1 - m·N) = r^N mod N², then reduce mod N and take the N-th root
        let neg = (n - m.nmod(n)).nmod(n);
        let rn = self.public.add_plain(c, &neg).nmod(n);
        Ok(self.nth_root(&rn))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        encode_parts(&[self.p.to_bytes(), self.q.to_bytes()])
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let parts = decode_parts(bytes)?;
        if parts.len() != 2 {
            return Err(Error::invalid_argument("paillier", "private key needs two primes"));
        }
        Self::from_primes(
            BigNumber::from_slice(&parts[0]),
            BigNumber::from_slice(&parts[1]),
        )
    }
}

impl fmt::Debug for PaillierPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PaillierPrivateKey({:?})", self.public)
    }
}

impl Zeroize for PaillierPrivateKey {
    fn zeroize(&mut self) {
        self.p.zeroize();
        self.q.zeroize();
        self.phi.zeroize();
        self.mu.zeroize();
        self.n_inv.zeroize();
    }
}

impl Drop for PaillierPrivateKey {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl PartialEq for PaillierPrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.p == other.p && self.q == other.q
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::OnceLock;

    /// One key per test binary; generation dominates test time otherwise
    pub(crate) fn test_key() -> &'static PaillierPrivateKey {
        static KEY: OnceLock<PaillierPrivateKey> = OnceLock::new();
        KEY.get_or_init(|| PaillierPrivateKey::generate().unwrap())
    }

    #[test]
    fn test_encrypt_decrypt_homomorphic() {
        let sk = test_key();
        let pk = sk.public();
        assert_eq!(bit_len(pk.n()), PAILLIER_BITS);

        let a = bn_from_u64(1234567);
        let b = bn_from_u64(7654321);
        let (ca, _) = pk.encrypt(&a);
        let (cb, _) = pk.encrypt(&b);

        assert_eq!(sk.decrypt(&ca).unwrap(), a);
        assert_eq!(sk.decrypt(&pk.add(&ca, &cb)).unwrap(), &a + &b);
        assert_eq!(sk.decrypt(&pk.mul(&ca, &bn_from_u64(3))).unwrap(), &a * bn_from_u64(3));
        assert_eq!(sk.decrypt(&pk.add_plain(&ca, &b)).unwrap(), &a + &b);

        let rerand = pk.rerandomize(&ca);
        assert_ne!(rerand, ca);
        assert_eq!(sk.decrypt(&rerand).unwrap(), a);
    }

    #[test]
    fn test_randomness_recovery() {
        let sk = test_key();
        let pk = sk.public();
        let m = bn_from_u64(42);
        let (c, r) = pk.encrypt(&m);
        assert_eq!(sk.randomness_of(&c, &m).unwrap(), r);
    }

    #[test]
    fn test_key_bytes() {
        let sk = test_key();
        let back = PaillierPrivateKey::from_bytes(&sk.to_bytes()).unwrap();
        assert!(back == *sk);
        let pk = PaillierPublicKey::from_bytes(&sk.public().to_bytes()).unwrap();
        assert!(pk == *sk.public());
    }

    #[test]
    fn test_zeroize_clears_factors() {
        let mut sk = test_key().clone();
        sk.zeroize();
        assert!(sk.p.is_zero() && sk.q.is_zero());
        assert!(sk.phi.is_zero() && sk.mu.is_zero() && sk.n_inv.is_zero());
        assert!(sk.public() == test_key().public());
    }

    #[test]
    fn test_rejects_bad_inputs() {
        let sk = test_key();
        let pk = sk.public();
        assert!(pk.check_ciphertext(&BigNumber::zero()).is_err());
        assert!(pk.check_ciphertext(pk.nn()).is_err());
        assert!(PaillierPublicKey::from_modulus(bn_from_u64(15)).is_err());
    }
}
