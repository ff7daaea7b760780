//! Base oblivious transfer
//!
//! The "simplest OT" of Chou and Orlandi: the sender publishes `Y = y·G`,
//! the receiver answers `X_i = x_i·G + c_i·Y` for each choice bit `c_i`, and
//! both hash the shared points. The sender learns both `H(y·X_i)` and
//! `H(y·(X_i − Y))`; the receiver learns only `H(x_i·Y)`, which equals the
//! one selected by `c_i`.

use crate::curve::{Curve, Point, Scalar};
use crate::{Error, Result};
use rand::rngs::OsRng;

pub type OtKey = [u8; 32];

fn derive_key(sid: &[u8], index: usize, big_y: &Point, big_x: &Point, shared: &Point) -> OtKey {
    let mut h = blake3::Hasher::new_derive_key("tmpc 2024 base-ot key");
    h.update(&(sid.len() as u32).to_be_bytes());
    h.update(sid);
    h.update(&(index as u64).to_be_bytes());
    h.update(&big_y.to_bytes());
    h.update(&big_x.to_bytes());
    h.update(&shared.to_bytes());
    *h.finalize().as_bytes()
}

/// Base-OT sender: ends with both keys of every transfer
pub struct BaseOtSender {
    y: Scalar,
    big_y: Point,
}

impl BaseOtSender {
    pub fn new(curve: Curve) -> Result<Self> {
        let y = curve.random_scalar(&mut OsRng);
        let big_y = curve.mul_generator(&y)?;
        Ok(Self { y, big_y })
    }

    /// First message, `Y`
    pub fn public(&self) -> &Point {
        &self.big_y
    }

    /// `(k0_i, k1_i)` for each of the receiver's points
    pub fn keys(&self, sid: &[u8], xs: &[Point]) -> Result<Vec<(OtKey, OtKey)>> {
        let y_big_y = self.big_y.mul(&self.y)?;
        xs.iter()
            .enumerate()
            .map(|(i, big_x)| {
                if big_x.curve() != self.big_y.curve() {
                    return Err(Error::crypto("base-ot", "receiver point on another curve"));
                }
                let shared0 = big_x.mul(&self.y)?;
                let shared1 = shared0.sub(&y_big_y)?;
                Ok((
                    derive_key(sid, i, &self.big_y, big_x, &shared0),
                    derive_key(sid, i, &self.big_y, big_x, &shared1),
                ))
            })
            .collect()
    }
}

/// Base-OT receiver step: the points to send back and the chosen keys
pub fn receive(sid: &[u8], big_y: &Point, choices: &[bool]) -> Result<(Vec<Point>, Vec<OtKey>)> {
    if big_y.is_identity() {
        return Err(Error::crypto("base-ot", "sender point is the identity"));
    }
    let curve = big_y.curve();
    let mut points = Vec::with_capacity(choices.len());
    let mut keys = Vec::with_capacity(choices.len());
    for (i, &c) in choices.iter().enumerate() {
        let x = curve.random_scalar(&mut OsRng);
        let x_g = curve.mul_generator(&x)?;
        let big_x = if c { x_g.add(big_y)? } else { x_g };
        keys.push(derive_key(sid, i, big_y, &big_x, &big_y.mul(&x)?));
        points.push(big_x);
    }
    Ok((points, keys))
}
