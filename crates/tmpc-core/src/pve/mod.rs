//! Publicly-verifiable encryption of scalars to an access structure
//!
//! Each of the [`PVE_ROWS`] rows splits the batch `x = x0 + x1`, where `x0`
//! is expanded from a seed. Both halves are encrypted: the seed half under a
//! fresh key `K0` and `x1` under `K1`, each key secret-shared over the tree
//! with every leaf share sealed to that leaf's public key. A Fiat-Shamir
//! challenge bit per row then decides which half is opened. The verifier
//! re-runs the opened half's encryption from its seeds and recomputes the
//! challenge. Decryption needs one row whose unopened half a quorum can
//! decrypt.

mod ecies;

pub use ecies::LeafCiphertext;

use crate::access::{AccessStructure, LeafShares};
use crate::curve::{Curve, Point, Scalar};
use crate::mpc::wire::{decode_parts, encode_parts};
use crate::oblivious::extension::get_bit;
use crate::params::{KAPPA, PVE_ROWS};
use crate::zk::HashTranscript;
use crate::{Error, Result};
use ecies::Sealer;
use rand::rngs::OsRng;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
#[cfg(feature = "multi-thread")]
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::{debug, instrument, warn};
use zeroize::Zeroizing;

const SEED_BYTES: usize = KAPPA / 8;

/// Encryption key of every leaf, keyed by leaf name
pub type LeafKeys = BTreeMap<String, Point>;

/// Decryption keys of a quorum of leaves
pub type LeafSecrets = BTreeMap<String, Scalar>;

/// Fresh leaf key pair `(d, d·G)`
pub fn generate_leaf_key(curve: Curve) -> Result<(Scalar, Point)> {
    let sk = curve.random_scalar(&mut OsRng);
    let pk = curve.mul_generator(&sk)?;
    Ok((sk, pk))
}

fn drbg(seed: &[u8]) -> ChaCha20Rng {
    ChaCha20Rng::from_seed(blake3::derive_key("tmpc 2024 pve drbg", seed))
}

fn row_sealer(k: &Scalar, label_hash: &[u8]) -> Result<Sealer> {
    Sealer::derive(&k.to_bytes(), label_hash, b"tmpc 2024 pve row")
}

fn label_hash(curve: Curve, label: &[u8], q: &[Point]) -> [u8; 32] {
    let mut t = HashTranscript::new(b"tmpc/pve-label");
    t.append_curve(curve).append(label);
    for p in q {
        t.append(&p.to_bytes());
    }
    t.finish()
}

fn batch_to_bytes(xs: &[Scalar]) -> Vec<u8> {
    xs.iter().flat_map(Scalar::to_bytes).collect()
}

fn batch_from_bytes(curve: Curve, count: usize, bytes: &[u8]) -> Result<Vec<Scalar>> {
    if bytes.len() != count * curve.scalar_len() {
        return Err(Error::crypto("pve", "batch of wrong length"));
    }
    bytes
        .chunks_exact(curve.scalar_len())
        .map(|c| Scalar::from_bytes(curve, c))
        .collect()
}

/// `count` scalars expanded from `seed`
fn mask(curve: Curve, seed: &[u8], count: usize) -> Vec<Scalar> {
    let mut rng = drbg(seed);
    (0..count).map(|_| curve.random_scalar(&mut rng)).collect()
}

fn map_rows<T, F>(f: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(usize) -> Result<T> + Sync + Send,
{
    #[cfg(feature = "multi-thread")]
    {
        (0..PVE_ROWS).into_par_iter().map(f).collect()
    }
    #[cfg(not(feature = "multi-thread"))]
    {
        (0..PVE_ROWS).map(f).collect()
    }
}

/// Leaf keys must cover exactly the leaves of `ac`, on its curve
fn check_leaf_keys(ac: &AccessStructure, leaf_pks: &LeafKeys) -> Result<()> {
    let mut leaves = ac.leaf_names();
    leaves.sort();
    if !leaves.iter().eq(leaf_pks.keys()) {
        return Err(Error::invalid_argument(
            "pve",
            "leaf keys do not match the leaves of the access structure",
        ));
    }
    if leaf_pks
        .values()
        .any(|pk| pk.curve() != ac.curve() || pk.is_identity())
    {
        return Err(Error::invalid_argument("pve", "invalid leaf key"));
    }
    Ok(())
}

/// One encrypted half of a row
#[derive(Debug, Clone, PartialEq, Eq)]
struct Half {
    c: Vec<u8>,
    quorum_c: Vec<LeafCiphertext>,
}

impl Half {
    fn encrypt(
        ac: &AccessStructure,
        leaf_pks: &LeafKeys,
        label_hash: &[u8],
        seed: &[u8],
        plain: &[u8],
    ) -> Result<Self> {
        let mut rng = drbg(seed);
        let k = Zeroizing::new(ac.curve().random_scalar(&mut rng));
        let shares = ac.share(&k, &mut rng)?;
        let quorum_c = leaf_pks
            .iter()
            .map(|(name, pk)| {
                let share = shares
                    .get(name)
                    .ok_or_else(|| Error::fatal("pve", "leaf without a share"))?;
                ecies::encrypt(pk, label_hash, &share.to_bytes(), &mut rng)
            })
            .collect::<Result<Vec<_>>>()?;
        let c = row_sealer(&k, label_hash)?.seal(label_hash, plain)?;
        Ok(Self { c, quorum_c })
    }

    /// Half 0 encrypts the seed of `x0`
    fn encrypt_seed(
        ac: &AccessStructure,
        leaf_pks: &LeafKeys,
        label_hash: &[u8],
        r0: &[u8],
        count: usize,
    ) -> Result<(Vec<Scalar>, Self)> {
        let (x0_seed, key_seed) = r0.split_at(SEED_BYTES);
        let x0 = mask(ac.curve(), x0_seed, count);
        let half = Self::encrypt(ac, leaf_pks, label_hash, key_seed, x0_seed)?;
        Ok((x0, half))
    }
}

/// Both halves of a row with the public points of their batches
struct Transcript {
    half0: Half,
    half1: Half,
    big_x0: Vec<Point>,
    big_x1: Vec<Point>,
}

impl Transcript {
    /// `xb·G` for the opened half and `Q - xb·G` for the other
    fn new(q: &[Point], half0: Half, half1: Half, xb: &[Scalar], opened_one: bool) -> Result<Self> {
        let mut opened = Vec::with_capacity(q.len());
        let mut other = Vec::with_capacity(q.len());
        for (qj, x) in q.iter().zip(xb) {
            let p = qj.curve().mul_generator(x)?;
            other.push(qj.sub(&p)?);
            opened.push(p);
        }
        let (big_x0, big_x1) = if opened_one { (other, opened) } else { (opened, other) };
        Ok(Self {
            half0,
            half1,
            big_x0,
            big_x1,
        })
    }
}

fn challenge<'a, I>(curve: Curve, q: &[Point], label: &[u8], rows: I) -> [u8; SEED_BYTES]
where
    I: IntoIterator<Item = &'a Transcript>,
{
    let mut t = HashTranscript::new(b"tmpc/pve-challenge");
    t.append_curve(curve).append(label);
    for p in q {
        t.append(&p.to_bytes());
    }
    for row in rows {
        for half in [&row.half0, &row.half1] {
            t.append(&half.c);
            for ct in &half.quorum_c {
                t.append(&ct.to_bytes());
            }
        }
        for p in row.big_x0.iter().chain(&row.big_x1) {
            t.append(&p.to_bytes());
        }
    }
    let mut out = [0u8; SEED_BYTES];
    out.copy_from_slice(&t.finish()[..SEED_BYTES]);
    out
}

/// Revealed part of a row
#[derive(Debug, Clone, PartialEq, Eq)]
struct Row {
    /// `x1` when the challenge bit is one, empty otherwise
    x_bin: Vec<u8>,
    /// Seed of the opened half
    r: Vec<u8>,
    /// The unopened half
    half: Half,
}

/// Encrypted batch with its proof of correct encryption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PveBundle {
    curve: Curve,
    q: Vec<Point>,
    label_hash: [u8; 32],
    challenge: [u8; SEED_BYTES],
    rows: Vec<Row>,
}

impl PveBundle {
    /// Encrypt `xs` to the leaves of `ac` under `label`
    #[instrument(skip_all, fields(count = xs.len()))]
    pub fn encrypt(
        ac: &AccessStructure,
        leaf_pks: &LeafKeys,
        xs: &[Scalar],
        label: &[u8],
    ) -> Result<Self> {
        check_leaf_keys(ac, leaf_pks)?;
        let curve = ac.curve();
        if xs.is_empty() {
            return Err(Error::invalid_argument("pve", "nothing to encrypt"));
        }
        if xs.iter().any(|x| x.curve() != curve) {
            return Err(Error::invalid_argument("pve", "scalar not on the curve of the access structure"));
        }
        let q = xs
            .iter()
            .map(|x| curve.mul_generator(x))
            .collect::<Result<Vec<_>>>()?;
        let lh = label_hash(curve, label, &q);
        debug!(rows = PVE_ROWS, "encrypting rows");

        let candidates = map_rows(|_| {
            let mut r0 = Zeroizing::new([0u8; 2 * SEED_BYTES]);
            let mut r1 = Zeroizing::new([0u8; SEED_BYTES]);
            OsRng.fill_bytes(&mut r0[..]);
            OsRng.fill_bytes(&mut r1[..]);
            let (x0, half0) = Half::encrypt_seed(ac, leaf_pks, &lh, &r0[..], xs.len())?;
            let x0 = Zeroizing::new(x0);
            let x1 = Zeroizing::new(
                xs.iter()
                    .zip(x0.iter())
                    .map(|(x, m)| x.sub(m))
                    .collect::<Result<Vec<_>>>()?,
            );
            let x_bin = Zeroizing::new(batch_to_bytes(&x1));
            let half1 = Half::encrypt(ac, leaf_pks, &lh, &r1[..], &x_bin)?;
            let transcript = Transcript::new(&q, half0, half1, &x0, false)?;
            Ok((transcript, r0, r1, x_bin))
        })?;

        let b = challenge(curve, &q, label, candidates.iter().map(|c| &c.0));
        let rows = candidates
            .into_iter()
            .enumerate()
            .map(|(i, (t, r0, r1, mut x_bin))| {
                // the seed and batch of the unopened half are wiped on drop
                if get_bit(&b, i) {
                    Row {
                        x_bin: std::mem::take(&mut *x_bin),
                        r: r1.to_vec(),
                        half: t.half0,
                    }
                } else {
                    Row {
                        x_bin: Vec::new(),
                        r: r0.to_vec(),
                        half: t.half1,
                    }
                }
            })
            .collect();
        Ok(Self {
            curve,
            q,
            label_hash: lh,
            challenge: b,
            rows,
        })
    }

    pub fn curve(&self) -> Curve {
        self.curve
    }

    /// The public points `x_l·G` of the encrypted scalars
    pub fn public_shares(&self) -> &[Point] {
        &self.q
    }

    /// Check the bundle against the expected public shares and label
    ///
    /// `Ok(false)` means the bundle is not a valid encryption; errors are
    /// reserved for malformed arguments.
    #[instrument(skip_all)]
    pub fn verify(
        &self,
        ac: &AccessStructure,
        leaf_pks: &LeafKeys,
        public_shares: &[Point],
        label: &[u8],
    ) -> Result<bool> {
        check_leaf_keys(ac, leaf_pks)?;
        if public_shares.is_empty() {
            return Err(Error::invalid_argument("pve", "no public shares to check against"));
        }
        if self.curve != ac.curve() || self.q[..] != *public_shares {
            return Ok(false);
        }
        if label_hash(self.curve, label, &self.q) != self.label_hash {
            return Ok(false);
        }
        let leaves = leaf_pks.len();
        if self.rows.len() != PVE_ROWS
            || self.rows.iter().any(|r| r.half.quorum_c.len() != leaves)
        {
            return Ok(false);
        }

        let recomputed = map_rows(|i| self.reopen(ac, leaf_pks, i));
        let transcripts = match recomputed {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "PVE row does not reopen");
                return Ok(false);
            }
        };
        Ok(challenge(self.curve, &self.q, label, &transcripts) == self.challenge)
    }

    fn reopen(&self, ac: &AccessStructure, leaf_pks: &LeafKeys, i: usize) -> Result<Transcript> {
        let row = &self.rows[i];
        let count = self.q.len();
        if get_bit(&self.challenge, i) {
            if row.r.len() != SEED_BYTES {
                return Err(Error::crypto("pve", "opened seed of wrong length"));
            }
            let x1 = batch_from_bytes(self.curve, count, &row.x_bin)?;
            let half1 = Half::encrypt(ac, leaf_pks, &self.label_hash, &row.r, &row.x_bin)?;
            Transcript::new(&self.q, row.half.clone(), half1, &x1, true)
        } else {
            if row.r.len() != 2 * SEED_BYTES || !row.x_bin.is_empty() {
                return Err(Error::crypto("pve", "opened row of wrong shape"));
            }
            let (x0, half0) = Half::encrypt_seed(ac, leaf_pks, &self.label_hash, &row.r, count)?;
            Transcript::new(&self.q, half0, row.half.clone(), &x0, false)
        }
    }

    /// Verify, then recover the scalars with the keys of a satisfying quorum
    #[instrument(skip_all)]
    pub fn decrypt(
        &self,
        ac: &AccessStructure,
        leaf_pks: &LeafKeys,
        leaf_sks: &LeafSecrets,
        public_shares: &[Point],
        label: &[u8],
    ) -> Result<Vec<Scalar>> {
        check_leaf_keys(ac, leaf_pks)?;
        for (name, sk) in leaf_sks {
            let pk = leaf_pks
                .get(name)
                .ok_or_else(|| Error::invalid_argument("pve", format!("{} is not a leaf", name)))?;
            if sk.curve() != self.curve || ac.curve().mul_generator(sk)? != *pk {
                return Err(Error::invalid_argument(
                    "pve",
                    format!("decryption key of {} does not match its public key", name),
                ));
            }
        }
        let names: Vec<&str> = leaf_sks.keys().map(String::as_str).collect();
        if !ac.satisfies(&names) {
            return Err(Error::invalid_argument(
                "pve",
                "decryption keys do not satisfy the access structure",
            ));
        }
        if !self.verify(ac, leaf_pks, public_shares, label)? {
            return Err(Error::crypto("pve", "bundle does not verify"));
        }

        let mut last = Error::crypto("pve", "no row decrypts");
        for i in 0..self.rows.len() {
            match self.restore_row(ac, leaf_pks, leaf_sks, i) {
                Ok(xs) => return Ok(xs),
                Err(e) => {
                    warn!(row = i, "PVE row does not decrypt");
                    last = e;
                }
            }
        }
        Err(last)
    }

    fn restore_row(
        &self,
        ac: &AccessStructure,
        leaf_pks: &LeafKeys,
        leaf_sks: &LeafSecrets,
        i: usize,
    ) -> Result<Vec<Scalar>> {
        let row = &self.rows[i];
        let mut shares = LeafShares::new();
        for (name, sk) in leaf_sks {
            let pos = leaf_pks
                .keys()
                .position(|n| n == name)
                .ok_or_else(|| Error::fatal("pve", "leaf key vanished"))?;
            let plain = ecies::decrypt(sk, &row.half.quorum_c[pos], &self.label_hash)?;
            shares.insert(name.clone(), Scalar::from_bytes(self.curve, &plain)?);
        }
        let k = Zeroizing::new(ac.reconstruct(&shares)?);
        let plain = Zeroizing::new(row_sealer(&k, &self.label_hash)?.open(&self.label_hash, &row.half.c)?);
        let (seed, x_bin) = if get_bit(&self.challenge, i) {
            (&plain[..], &row.x_bin[..])
        } else {
            (&row.r[..SEED_BYTES], &plain[..])
        };
        if seed.len() != SEED_BYTES {
            return Err(Error::crypto("pve", "decrypted seed of wrong length"));
        }
        let count = self.q.len();
        let x1 = batch_from_bytes(self.curve, count, x_bin)?;
        let x0 = mask(self.curve, seed, count);
        let mut xs = Vec::with_capacity(count);
        for ((a, b), qj) in x0.iter().zip(&x1).zip(&self.q) {
            let x = a.add(b)?;
            if self.curve.mul_generator(&x)? != *qj {
                return Err(Error::crypto("pve", "decrypted scalar does not match its public share"));
            }
            xs.push(x);
        }
        Ok(xs)
    }

    /// `[nid, count, leaves, Q*, label hash, challenge, (x1, seed, c, leaf ciphertexts*)*]`
    pub fn to_bytes(&self) -> Vec<u8> {
        let leaves = self.rows.first().map_or(0, |r| r.half.quorum_c.len());
        let mut parts = vec![
            self.curve.nid().to_be_bytes().to_vec(),
            (self.q.len() as u32).to_be_bytes().to_vec(),
            (leaves as u32).to_be_bytes().to_vec(),
        ];
        parts.extend(self.q.iter().map(Point::to_bytes));
        parts.push(self.label_hash.to_vec());
        parts.push(self.challenge.to_vec());
        for row in &self.rows {
            parts.push(row.x_bin.clone());
            parts.push(row.r.clone());
            parts.push(row.half.c.clone());
            parts.extend(row.half.quorum_c.iter().map(LeafCiphertext::to_bytes));
        }
        encode_parts(&parts)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let parts = decode_parts(bytes)?;
        let read_u32 = |p: &Vec<u8>| -> Result<usize> {
            let a: [u8; 4] = p
                .as_slice()
                .try_into()
                .map_err(|_| Error::crypto("pve", "malformed bundle header"))?;
            Ok(u32::from_be_bytes(a) as usize)
        };
        if parts.len() < 3 {
            return Err(Error::crypto("pve", "truncated bundle"));
        }
        let curve = Curve::from_nid(read_u32(&parts[0])? as u32)?;
        let count = read_u32(&parts[1])?;
        let leaves = read_u32(&parts[2])?;
        let expected = leaves
            .checked_add(3)
            .and_then(|w| w.checked_mul(PVE_ROWS))
            .and_then(|r| r.checked_add(count))
            .and_then(|r| r.checked_add(5));
        if count == 0 || leaves == 0 || expected != Some(parts.len()) {
            return Err(Error::crypto("pve", "bundle has the wrong number of parts"));
        }
        let q = curve.points_from_bytes(&parts[3..3 + count])?;
        let label_hash: [u8; 32] = parts[3 + count]
            .as_slice()
            .try_into()
            .map_err(|_| Error::crypto("pve", "malformed label hash"))?;
        let challenge: [u8; SEED_BYTES] = parts[4 + count]
            .as_slice()
            .try_into()
            .map_err(|_| Error::crypto("pve", "malformed challenge"))?;
        let rows = parts[5 + count..]
            .chunks_exact(3 + leaves)
            .map(|p| {
                Ok(Row {
                    x_bin: p[0].clone(),
                    r: p[1].clone(),
                    half: Half {
                        c: p[2].clone(),
                        quorum_c: p[3..]
                            .iter()
                            .map(|ct| LeafCiphertext::from_bytes(curve, ct))
                            .collect::<Result<Vec<_>>>()?,
                    },
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            curve,
            q,
            label_hash,
            challenge,
            rows,
        })
    }
}

/// Encrypt `xs` to the leaves of `ac`; returns the serialized bundle
pub fn encrypt(
    ac: &AccessStructure,
    leaf_pks: &LeafKeys,
    xs: &[Scalar],
    label: &[u8],
) -> Result<Vec<u8>> {
    Ok(PveBundle::encrypt(ac, leaf_pks, xs, label)?.to_bytes())
}

/// `Ok(false)` for any bundle that does not parse or does not verify
pub fn verify(
    ac: &AccessStructure,
    leaf_pks: &LeafKeys,
    bundle: &[u8],
    public_shares: &[Point],
    label: &[u8],
) -> Result<bool> {
    check_leaf_keys(ac, leaf_pks)?;
    match PveBundle::from_bytes(bundle) {
        Ok(b) => b.verify(ac, leaf_pks, public_shares, label),
        Err(_) => Ok(false),
    }
}

pub fn decrypt(
    ac: &AccessStructure,
    leaf_pks: &LeafKeys,
    leaf_sks: &LeafSecrets,
    bundle: &[u8],
    public_shares: &[Point],
    label: &[u8],
) -> Result<Vec<Scalar>> {
    PveBundle::from_bytes(bundle)?.decrypt(ac, leaf_pks, leaf_sks, public_shares, label)
}

pub fn encrypt_one(
    ac: &AccessStructure,
    leaf_pks: &LeafKeys,
    x: &Scalar,
    label: &[u8],
) -> Result<Vec<u8>> {
    encrypt(ac, leaf_pks, std::slice::from_ref(x), label)
}

pub fn decrypt_one(
    ac: &AccessStructure,
    leaf_pks: &LeafKeys,
    leaf_sks: &LeafSecrets,
    bundle: &[u8],
    public_share: &Point,
    label: &[u8],
) -> Result<Scalar> {
    let mut xs = decrypt(ac, leaf_pks, leaf_sks, bundle, std::slice::from_ref(public_share), label)?;
    xs.pop()
        .ok_or_else(|| Error::fatal("pve", "decryption returned no scalar"))
}
