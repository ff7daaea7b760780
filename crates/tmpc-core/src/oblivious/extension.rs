//! IKNP oblivious-transfer extension
//!
//! `KAPPA` base OTs with the roles swapped stretch into any number of
//! random OTs. The extension receiver holds both seeds of every base OT,
//! the extension sender holds one seed per base OT selected by its secret
//! `Δ`. After one message from the receiver the sender has rows
//! `q_j = t_j ⊕ r_j·Δ` and the receiver has `t_j`.

use super::base_ot::OtKey;
use crate::params::KAPPA;
use crate::{Error, Result};
use rand::rngs::OsRng;
use rand::RngCore;

pub const ROW_BYTES: usize = KAPPA / 8;

/// One `KAPPA`-bit row of the transposed matrix
pub type Row = [u8; ROW_BYTES];

pub(crate) fn get_bit(bytes: &[u8], i: usize) -> bool {
    (bytes[i / 8] >> (i % 8)) & 1 == 1
}

fn set_bit(bytes: &mut [u8], i: usize) {
    bytes[i / 8] |= 1 << (i % 8);
}

fn pack_bits(bits: &[bool], len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    for (i, _) in bits.iter().enumerate().filter(|(_, b)| **b) {
        set_bit(&mut out, i);
    }
    out
}

fn column_bytes(m: usize) -> usize {
    (m + 7) / 8
}

/// Expand a base-OT seed into one column of `len` bytes
fn prg(seed: &OtKey, sid: &[u8], column: usize, len: usize) -> Vec<u8> {
    let mut h = blake3::Hasher::new_keyed(seed);
    h.update(&(sid.len() as u32).to_be_bytes());
    h.update(sid);
    h.update(&(column as u64).to_be_bytes());
    let mut out = vec![0u8; len];
    h.finalize_xof().fill(&mut out);
    out
}

fn xor_into(acc: &mut [u8], other: &[u8]) {
    for (a, b) in acc.iter_mut().zip(other) {
        *a ^= b;
    }
}

/// `KAPPA` columns of `m` bits into `m` rows of `KAPPA` bits
fn transpose(columns: &[Vec<u8>], m: usize) -> Vec<Row> {
    let mut rows = vec![[0u8; ROW_BYTES]; m];
    for (i, col) in columns.iter().enumerate() {
        for (j, row) in rows.iter_mut().enumerate() {
            if get_bit(col, j) {
                set_bit(row, i);
            }
        }
    }
    rows
}

/// Extension sender: base-OT receiver with choice bits `Δ`
pub struct ExtSender {
    delta: Row,
    seeds: Vec<OtKey>,
}

impl ExtSender {
    /// Fresh `Δ` as base-OT choice bits
    pub fn random_delta() -> Row {
        let mut delta = [0u8; ROW_BYTES];
        OsRng.fill_bytes(&mut delta);
        delta
    }

    pub fn delta_bits(delta: &Row) -> Vec<bool> {
        (0..KAPPA).map(|i| get_bit(delta, i)).collect()
    }

    pub fn new(delta: Row, seeds: Vec<OtKey>) -> Result<Self> {
        if seeds.len() != KAPPA {
            return Err(Error::invalid_argument("ot-ext", "need one seed per base OT"));
        }
        Ok(Self { delta, seeds })
    }

    pub fn delta(&self) -> &Row {
        &self.delta
    }

    /// Rows `q_j` for `m` extended OTs, given the receiver's matrix `u`
    pub fn extend(&self, sid: &[u8], m: usize, u: &[Vec<u8>]) -> Result<Vec<Row>> {
        let len = column_bytes(m);
        if u.len() != KAPPA || u.iter().any(|col| col.len() != len) {
            return Err(Error::crypto("ot-ext", "malformed extension matrix"));
        }
        let columns: Vec<Vec<u8>> = self
            .seeds
            .iter()
            .zip(u)
            .enumerate()
            .map(|(i, (seed, u_i))| {
                let mut q = prg(seed, sid, i, len);
                if get_bit(&self.delta, i) {
                    xor_into(&mut q, u_i);
                }
                q
            })
            .collect();
        Ok(transpose(&columns, m))
    }
}

/// Extension receiver: base-OT sender holding both seeds
pub struct ExtReceiver {
    seeds: Vec<(OtKey, OtKey)>,
}

impl ExtReceiver {
    pub fn new(seeds: Vec<(OtKey, OtKey)>) -> Result<Self> {
        if seeds.len() != KAPPA {
            return Err(Error::invalid_argument("ot-ext", "need one seed pair per base OT"));
        }
        Ok(Self { seeds })
    }

    /// Matrix `u` for the sender and our rows `t_j`, one per choice bit
    pub fn extend(&self, sid: &[u8], choices: &[bool]) -> (Vec<Vec<u8>>, Vec<Row>) {
        let m = choices.len();
        let len = column_bytes(m);
        let r = pack_bits(choices, len);
        let mut t_columns = Vec::with_capacity(KAPPA);
        let mut u = Vec::with_capacity(KAPPA);
        for (i, (k0, k1)) in self.seeds.iter().enumerate() {
            let t = prg(k0, sid, i, len);
            let mut u_i = prg(k1, sid, i, len);
            xor_into(&mut u_i, &t);
            xor_into(&mut u_i, &r);
            t_columns.push(t);
            u.push(u_i);
        }
        (u, transpose(&t_columns, m))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::curve::Curve;
    use crate::oblivious::base_ot::{receive, BaseOtSender};
    use rand::Rng;

    pub(crate) fn setup(curve: Curve) -> (ExtSender, ExtReceiver) {
        let base_sender = BaseOtSender::new(curve).unwrap();
        let delta = ExtSender::random_delta();
        let (points, chosen) =
            receive(b"base", base_sender.public(), &ExtSender::delta_bits(&delta)).unwrap();
        let pairs = base_sender.keys(b"base", &points).unwrap();
        (
            ExtSender::new(delta, chosen).unwrap(),
            ExtReceiver::new(pairs).unwrap(),
        )
    }

    #[test]
    fn test_rows_differ_by_delta_on_choice() {
        let (sender, receiver) = setup(Curve::Secp256k1);
        let choices: Vec<bool> = (0..301).map(|_| OsRng.gen()).collect();
        let (u, t) = receiver.extend(b"ext", &choices);
        let q = sender.extend(b"ext", choices.len(), &u).unwrap();

        assert_eq!(q.len(), choices.len());
        for ((c, q_j), t_j) in choices.iter().zip(&q).zip(&t) {
            let mut expected = *t_j;
            if *c {
                xor_into(&mut expected, sender.delta());
            }
            assert_eq!(*q_j, expected);
        }
    }

    #[test]
    fn test_malformed_matrix_rejected() {
        let (sender, receiver) = setup(Curve::P256);
        let (mut u, _) = receiver.extend(b"ext", &[true; 16]);
        assert!(sender.extend(b"ext", 24, &u).is_err());
        u.pop();
        assert!(sender.extend(b"ext", 16, &u).is_err());
    }
}
