//! Multiplicative-to-additive conversion over extended OTs
//!
//! The receiver encodes each of its values `b` as choice bits `r` with
//! `Σ g_k·r_k = b` over a gadget vector whose first `order_bits` entries are
//! powers of two and whose last `KAPPA` entries are pseudo-random. For every
//! OT the sender sends a correction `c = h0 − h1 + a`, so the receiver learns
//! `h0 + r·a` and the two sides end with `α + β = a·b`.

use super::extension::{Row, ROW_BYTES};
use crate::curve::{Curve, Scalar};
use crate::params::KAPPA;
use crate::{Error, Result};
use rand_core::{CryptoRng, RngCore};

/// Gadget vector of length `order_bits + KAPPA`
#[derive(Clone)]
pub struct Gadget {
    curve: Curve,
    g: Vec<Scalar>,
}

impl Gadget {
    pub fn new(curve: Curve, sid: &[u8]) -> Result<Self> {
        let mut g = Vec::with_capacity(curve.order_bits() + KAPPA);
        let mut power = Scalar::one(curve);
        for _ in 0..curve.order_bits() {
            g.push(power);
            power = power.add(&power)?;
        }
        for k in 0..KAPPA {
            let mut h = blake3::Hasher::new_derive_key("tmpc 2024 ot-mta gadget");
            h.update(&curve.nid().to_be_bytes());
            h.update(&(sid.len() as u32).to_be_bytes());
            h.update(sid);
            h.update(&(k as u64).to_be_bytes());
            let mut wide = [0u8; 64];
            h.finalize_xof().fill(&mut wide);
            g.push(Scalar::reduce_be(curve, &wide));
        }
        Ok(Self { curve, g })
    }

    pub fn curve(&self) -> Curve {
        self.curve
    }

    /// Choice bits per encoded value
    pub fn len(&self) -> usize {
        self.g.len()
    }

    pub fn is_empty(&self) -> bool {
        self.g.is_empty()
    }

    /// Random choice bits whose gadget combination is `b`
    pub fn encode<R: RngCore + CryptoRng>(&self, b: &Scalar, rng: &mut R) -> Result<Vec<bool>> {
        if b.curve() != self.curve {
            return Err(Error::invalid_argument("ot-mta", "value from another curve"));
        }
        let bits = self.curve.order_bits();
        let mut noise = vec![0u8; KAPPA / 8];
        rng.fill_bytes(&mut noise);
        let noise: Vec<bool> = (0..KAPPA).map(|k| (noise[k / 8] >> (k % 8)) & 1 == 1).collect();

        let mut rest = *b;
        for (g, _) in self.g[bits..].iter().zip(&noise).filter(|(_, r)| **r) {
            rest = rest.sub(g)?;
        }
        let be = rest.to_bytes();
        let mut out: Vec<bool> = (0..bits)
            .map(|k| (be[be.len() - 1 - k / 8] >> (k % 8)) & 1 == 1)
            .collect();
        out.extend(noise);
        Ok(out)
    }

    /// `Σ g_k·r_k`
    pub fn decode(&self, choices: &[bool]) -> Result<Scalar> {
        if choices.len() != self.g.len() {
            return Err(Error::invalid_argument("ot-mta", "wrong number of choice bits"));
        }
        let mut acc = Scalar::zero(self.curve);
        for (g, _) in self.g.iter().zip(choices).filter(|(_, r)| **r) {
            acc = acc.add(g)?;
        }
        Ok(acc)
    }
}

fn pad(curve: Curve, sid: &[u8], ot: usize, slot: usize, row: &Row) -> Scalar {
    let mut h = blake3::Hasher::new_derive_key("tmpc 2024 ot-mta pad");
    h.update(&(sid.len() as u32).to_be_bytes());
    h.update(sid);
    h.update(&(ot as u64).to_be_bytes());
    h.update(&(slot as u64).to_be_bytes());
    h.update(row);
    let mut wide = [0u8; 64];
    h.finalize_xof().fill(&mut wide);
    Scalar::reduce_be(curve, &wide)
}

fn xor_row(a: &Row, b: &Row) -> Row {
    let mut out = [0u8; ROW_BYTES];
    for (o, (x, y)) in out.iter_mut().zip(a.iter().zip(b)) {
        *o = x ^ y;
    }
    out
}

/// Sender half of a batch of multiplications
///
/// The receiver encoded one value per block; `inputs[l]` lists the sender
/// values to multiply with the receiver's `l`-th value. Returns the sender
/// shares `α[l][i]` and the concatenated corrections for the receiver.
pub fn send(
    gadget: &Gadget,
    sid: &[u8],
    q_rows: &[Row],
    delta: &Row,
    inputs: &[Vec<Scalar>],
) -> Result<(Vec<Vec<Scalar>>, Vec<u8>)> {
    let curve = gadget.curve();
    let theta = gadget.len();
    if q_rows.len() != theta * inputs.len() {
        return Err(Error::fatal("ot-mta", "extended OTs do not match the inputs"));
    }
    let mut alphas = Vec::with_capacity(inputs.len());
    let mut corrections = Vec::new();
    for (l, values) in inputs.iter().enumerate() {
        let mut block = Vec::with_capacity(values.len());
        for (slot, a) in values.iter().enumerate() {
            if a.curve() != curve {
                return Err(Error::invalid_argument("ot-mta", "value from another curve"));
            }
            let mut alpha = Scalar::zero(curve);
            for (k, g) in gadget.g.iter().enumerate() {
                let ot = l * theta + k;
                let q = &q_rows[ot];
                let h0 = pad(curve, sid, ot, slot, q);
                let h1 = pad(curve, sid, ot, slot, &xor_row(q, delta));
                corrections.extend(h0.sub(&h1)?.add(a)?.to_bytes());
                alpha = alpha.sub(&g.mul(&h0)?)?;
            }
            block.push(alpha);
        }
        alphas.push(block);
    }
    Ok((alphas, corrections))
}

/// Receiver half: shares `β[l][i]` with `α[l][i] + β[l][i] = a_{l,i}·b_l`
///
/// `shape[l]` is the number of sender values in block `l`.
pub fn receive(
    gadget: &Gadget,
    sid: &[u8],
    t_rows: &[Row],
    choices: &[bool],
    shape: &[usize],
    corrections: &[u8],
) -> Result<Vec<Vec<Scalar>>> {
    let curve = gadget.curve();
    let theta = gadget.len();
    let len = curve.scalar_len();
    if t_rows.len() != theta * shape.len() || choices.len() != t_rows.len() {
        return Err(Error::fatal("ot-mta", "extended OTs do not match the inputs"));
    }
    let expected: usize = shape.iter().map(|n| n * theta * len).sum();
    if corrections.len() != expected {
        return Err(Error::crypto("ot-mta", "wrong number of corrections"));
    }
    let mut chunks = corrections.chunks(len);
    let mut betas = Vec::with_capacity(shape.len());
    for (l, &count) in shape.iter().enumerate() {
        let mut block = Vec::with_capacity(count);
        for slot in 0..count {
            let mut beta = Scalar::zero(curve);
            for (k, g) in gadget.g.iter().enumerate() {
                let ot = l * theta + k;
                let chunk = chunks
                    .next()
                    .ok_or_else(|| Error::crypto("ot-mta", "wrong number of corrections"))?;
                let c = Scalar::from_bytes(curve, chunk)?;
                let mut y = pad(curve, sid, ot, slot, &t_rows[ot]);
                if choices[ot] {
                    y = y.add(&c)?;
                }
                beta = beta.add(&g.mul(&y)?)?;
            }
            block.push(beta);
        }
        betas.push(block);
    }
    Ok(betas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oblivious::extension::tests::setup;
    use rand::rngs::OsRng;

    #[test]
    fn test_gadget_encoding_is_randomised() {
        for curve in Curve::ALL {
            let gadget = Gadget::new(curve, b"sid").unwrap();
            assert_eq!(gadget.len(), curve.order_bits() + KAPPA);
            let b = curve.random_scalar(&mut OsRng);
            let e1 = gadget.encode(&b, &mut OsRng).unwrap();
            let e2 = gadget.encode(&b, &mut OsRng).unwrap();
            assert_ne!(e1, e2);
            assert_eq!(gadget.decode(&e1).unwrap(), b);
            assert_eq!(gadget.decode(&e2).unwrap(), b);
        }
    }

    #[test]
    fn test_shares_add_up_to_products() {
        for curve in [Curve::Secp256k1, Curve::P256] {
            let (sender, receiver) = setup(curve);
            let gadget = Gadget::new(curve, b"mta").unwrap();

            let bs: Vec<Scalar> = (0..2).map(|_| curve.random_scalar(&mut OsRng)).collect();
            let inputs = vec![
                vec![curve.random_scalar(&mut OsRng), curve.random_scalar(&mut OsRng)],
                vec![curve.random_scalar(&mut OsRng)],
            ];
            let mut choices = Vec::new();
            for b in &bs {
                choices.extend(gadget.encode(b, &mut OsRng).unwrap());
            }

            let (u, t) = receiver.extend(b"mta", &choices);
            let q = sender.extend(b"mta", choices.len(), &u).unwrap();
            let (alphas, corrections) = send(&gadget, b"mta", &q, sender.delta(), &inputs).unwrap();
            let betas = receive(&gadget, b"mta", &t, &choices, &[2, 1], &corrections).unwrap();

            for (l, values) in inputs.iter().enumerate() {
                for (i, a) in values.iter().enumerate() {
                    let sum = alphas[l][i].add(&betas[l][i]).unwrap();
                    assert_eq!(sum, a.mul(&bs[l]).unwrap());
                }
            }
        }
    }

    #[test]
    fn test_truncated_corrections_rejected() {
        let curve = Curve::Secp256k1;
        let (sender, receiver) = setup(curve);
        let gadget = Gadget::new(curve, b"mta").unwrap();
        let b = curve.random_scalar(&mut OsRng);
        let choices = gadget.encode(&b, &mut OsRng).unwrap();
        let (u, t) = receiver.extend(b"mta", &choices);
        let q = sender.extend(b"mta", choices.len(), &u).unwrap();
        let a = vec![vec![curve.random_scalar(&mut OsRng)]];
        let (_, mut corrections) = send(&gadget, b"mta", &q, sender.delta(), &a).unwrap();
        corrections.truncate(corrections.len() - 1);
        assert!(receive(&gadget, b"mta", &t, &choices, &[1], &corrections).is_err());
    }
}
