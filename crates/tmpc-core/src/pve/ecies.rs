//! Hybrid encryption to a leaf key: ephemeral Diffie-Hellman, HKDF-SHA256
//! and AES-256-GCM

use crate::curve::{Curve, Point, Scalar};
use crate::{Error, Result};
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use hkdf::Hkdf;
use rand_core::{CryptoRng, RngCore};
use sha2::Sha256;
use zeroize::Zeroize;

const KEY_BYTES: usize = 32;
const NONCE_BYTES: usize = 12;

/// AES-256-GCM under a key and nonce expanded from `ikm`
pub(crate) struct Sealer {
    cipher: Aes256Gcm,
    nonce: [u8; NONCE_BYTES],
}

impl Sealer {
    pub fn derive(ikm: &[u8], salt: &[u8], info: &[u8]) -> Result<Self> {
        let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
        let mut okm = [0u8; KEY_BYTES + NONCE_BYTES];
        hk.expand(info, &mut okm)
            .map_err(|_| Error::fatal("pve", "HKDF output too long"))?;
        let cipher = Aes256Gcm::new_from_slice(&okm[..KEY_BYTES])
            .map_err(|_| Error::fatal("pve", "bad AES key length"))?;
        let mut nonce = [0u8; NONCE_BYTES];
        nonce.copy_from_slice(&okm[KEY_BYTES..]);
        okm.zeroize();
        Ok(Self { cipher, nonce })
    }

    pub fn seal(&self, aad: &[u8], plain: &[u8]) -> Result<Vec<u8>> {
        self.cipher
            .encrypt(Nonce::from_slice(&self.nonce), Payload { msg: plain, aad })
            .map_err(|_| Error::crypto("pve", "AEAD encryption failed"))
    }

    pub fn open(&self, aad: &[u8], sealed: &[u8]) -> Result<Vec<u8>> {
        self.cipher
            .decrypt(Nonce::from_slice(&self.nonce), Payload { msg: sealed, aad })
            .map_err(|_| Error::crypto("pve", "AEAD authentication failed"))
    }
}

/// Ciphertext of one leaf share
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafCiphertext {
    ephemeral: Point,
    sealed: Vec<u8>,
}

impl LeafCiphertext {
    /// Ephemeral point followed by the AEAD output
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.ephemeral.to_bytes();
        out.extend_from_slice(&self.sealed);
        out
    }

    pub fn from_bytes(curve: Curve, bytes: &[u8]) -> Result<Self> {
        let split = curve.point_len();
        if bytes.len() <= split {
            return Err(Error::crypto("pve", "leaf ciphertext too short"));
        }
        let ephemeral = Point::from_bytes(curve, &bytes[..split])?;
        if ephemeral.is_identity() {
            return Err(Error::crypto("pve", "ephemeral key is the identity"));
        }
        Ok(Self {
            ephemeral,
            sealed: bytes[split..].to_vec(),
        })
    }
}

fn sealer(shared: &Point, ephemeral: &Point) -> Result<Sealer> {
    Sealer::derive(&shared.to_bytes(), &ephemeral.to_bytes(), b"tmpc 2024 pve ecies")
}

/// Encrypt `plain` to `pk`; the ephemeral key is drawn from `rng`
pub fn encrypt<R: RngCore + CryptoRng>(
    pk: &Point,
    aad: &[u8],
    plain: &[u8],
    rng: &mut R,
) -> Result<LeafCiphertext> {
    if pk.is_identity() {
        return Err(Error::invalid_argument("pve", "leaf key is the identity"));
    }
    let curve = pk.curve();
    let e = curve.random_scalar(rng);
    let ephemeral = curve.mul_generator(&e)?;
    let shared = pk.mul(&e)?;
    let sealed = sealer(&shared, &ephemeral)?.seal(aad, plain)?;
    Ok(LeafCiphertext { ephemeral, sealed })
}

pub fn decrypt(sk: &Scalar, ct: &LeafCiphertext, aad: &[u8]) -> Result<Vec<u8>> {
    let shared = ct.ephemeral.mul(sk)?;
    sealer(&shared, &ct.ephemeral)?.open(aad, &ct.sealed)
}
