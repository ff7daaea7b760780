//! N-party Schnorr signing over Ed25519
//!
//! Rounds:
//! 1. commit to `R_i = k_i·G`
//! 2. open `R_i` with a proof of knowledge; `R = Σ R_i`
//! 3. `s_i = k_i + e·x_i` goes to the receiver, which checks every partial
//!    against `R_i + e·Q_i` before summing

use super::check_curve;
use super::messages::{NonceCommitMessage, NonceRevealMessage, SchnorrPartialMessage};
use crate::commitment;
use crate::curve::{sum_points, Curve, Point, Scalar};
use crate::eckey::KeyShareMP;
use crate::mpc::{JobMP, PartyIndex, Transport};
use crate::signature::verify_eddsa;
use crate::zk::{dl, HashTranscript};
use crate::{Error, Result};
use rand::rngs::OsRng;
use sha2::{Digest, Sha512};
use tracing::{debug, info, instrument, warn};
use zeroize::Zeroizing;

/// Session id bound to the roster and the job's position in its round
/// sequence, so consecutive signatures on one job never share it
fn session_id<T: Transport>(job: &JobMP<T>) -> Vec<u8> {
    let mut t = HashTranscript::new(b"tmpc/eddsa-mp-sign");
    t.append(&job.derive_sid(Curve::Ed25519, &[]))
        .append_u64(job.round() as u64);
    t.finish().to_vec()
}

fn message_digest(msg: &[u8]) -> Vec<u8> {
    let mut t = HashTranscript::new(b"tmpc/eddsa-mp-message");
    t.append(msg);
    t.finish().to_vec()
}

/// RFC 8032 challenge `SHA-512(R ‖ Q ‖ m)`, read little-endian mod `L`
pub(crate) fn challenge(big_r: &Point, q: &Point, msg: &[u8]) -> Scalar {
    let mut digest = Sha512::new()
        .chain_update(big_r.to_bytes())
        .chain_update(q.to_bytes())
        .chain_update(msg)
        .finalize()
        .to_vec();
    digest.reverse();
    Scalar::reduce_be(q.curve(), &digest)
}

/// Sign `msg`; only `receiver` gets the 64-byte `R ‖ s` signature, every
/// other party an empty vector
///
/// The receiver checks each partial signature against the signer's nonce
/// and public share, so a bad partial names its sender.
#[instrument(skip_all, fields(index = job.role_index(), receiver))]
pub async fn sign<T: Transport>(
    job: &mut JobMP<T>,
    share: &KeyShareMP,
    msg: &[u8],
    receiver: PartyIndex,
) -> Result<Vec<u8>> {
    let curve = share.curve();
    check_curve(curve)?;
    let n = job.party_count();
    let me = job.role_index();
    if receiver >= n {
        return Err(Error::invalid_argument(
            "eddsa-mp",
            format!("receiver {} outside roster of {}", receiver, n),
        ));
    }
    if msg.is_empty() {
        return Err(Error::invalid_argument("eddsa-mp", "empty message"));
    }
    if share.party_name() != job.my_name() {
        return Err(Error::invalid_argument("eddsa-mp", "share belongs to another party"));
    }
    let public_shares = share.public_shares_for(job.roster())?;
    let sid = session_id(job);
    let digest = message_digest(msg);
    info!(parties = n, "Starting N-party EdDSA signing");

    let k = Zeroizing::new(curve.random_scalar(&mut OsRng));
    let big_k = curve.mul_generator(&k)?;

    debug!("Sign round 1: commit to R_i");
    let (com, opening) = commitment::commit(&sid, me, &[&big_k.to_bytes()[..]])?;
    let commits = job
        .exchange(&NonceCommitMessage {
            message_digest: digest.clone(),
            commitment: com,
        })
        .await?;
    if let Some((j, _)) = commits
        .iter()
        .enumerate()
        .find(|(_, c)| c.message_digest != digest)
    {
        return Err(Error::peer("eddsa-mp", j, "signing a different message"));
    }

    debug!("Sign round 2: open R_i");
    let reveals = job
        .exchange(&NonceRevealMessage {
            nonce_point: big_k.to_bytes(),
            proof: dl::prove(&big_k, &k, &sid, me as u64)?,
            opening,
        })
        .await?;
    let mut nonces = Vec::with_capacity(n);
    for (j, (c, rev)) in commits.iter().zip(&reveals).enumerate() {
        if !commitment::verify(&c.commitment, &rev.opening, &sid, j, &[&rev.nonce_point[..]]) {
            return Err(Error::peer("eddsa-mp", j, "commitment to R_i does not open"));
        }
        let r_j = Point::from_bytes(curve, &rev.nonce_point).map_err(|e| e.caused_by(j))?;
        dl::verify(&r_j, &rev.proof, &sid, j as u64).map_err(|e| e.caused_by(j))?;
        nonces.push(r_j);
    }
    let big_r = sum_points(curve, &nonces)?;
    if big_r.is_identity() {
        return Err(Error::protocol("eddsa-mp", "aggregate nonce is the identity"));
    }
    let q = share.public_key();
    let e = challenge(&big_r, q, msg);

    debug!("Sign round 3: partial signatures to the receiver");
    let s_i = k.add(&e.mul(share.x_share())?)?;
    let partials = match job
        .send_all_to_one(receiver, &SchnorrPartialMessage { s: s_i.to_bytes() })
        .await?
    {
        Some(p) => p,
        None => return Ok(Vec::new()),
    };

    let mut s = Scalar::zero(curve);
    for (j, p) in partials.iter().enumerate() {
        let s_j = Scalar::from_bytes(curve, &p.s).map_err(|e| e.caused_by(j))?;
        let expected = nonces[j].add(&public_shares[j].mul(&e)?)?;
        if curve.mul_generator(&s_j)? != expected {
            warn!(peer = j, "partial signature rejected");
            return Err(Error::peer("eddsa-mp", j, "partial signature does not verify"));
        }
        s = s.add(&s_j)?;
    }
    let mut sig = big_r.to_bytes();
    sig.extend(s.to_le_bytes());
    verify_eddsa(q, msg, &sig)
        .map_err(|_| Error::protocol("eddsa-mp", "assembled signature does not verify"))?;
    info!(signature_len = sig.len(), "N-party EdDSA signing completed");
    Ok(sig)
}
