//! Two-party ECDSA signing
//!
//! Per message: P1 commits to `R1 = k1·G`, P2 answers with `R2 = k2·G`, P1
//! opens; both derive `R = k1·k2·G`. P2 then sends
//! `c = c_key^(r·k2⁻¹) · Enc(k2⁻¹·m + k2⁻¹·x2·r + ρ·q)`, which decrypts to
//! `k2⁻¹·(m + r·x) mod q`; P1 divides by `k1`.

use super::messages::{
    SignCiphertextMessage, SignCommitMessage, SignP1NonceMessage, SignP2NonceMessage,
};
use super::proof::{AffineProof, AffineStatement, AffineWitness};
use super::{dl_aux, Share};
use crate::commitment::{self, Opening};
use crate::curve::{Curve, Point, Scalar};
use crate::mpc::{Job2P, Role, Transport};
use crate::paillier::{bn_from_scalar, curve_order, scalar_from_bn};
use crate::params::{MAX_SIGN_ATTEMPTS, STAT_SEC};
use crate::signature::{message_scalar, r_from_point, EcdsaSignature};
use crate::zk::{dl, HashTranscript};
use crate::{Error, Result};
use libpaillier::unknown_order::BigNumber;
use rand::rngs::OsRng;
use tracing::{debug, info, instrument, warn};
use zeroize::{Zeroize, Zeroizing};

fn attempt_sid(base: &[u8], attempt: usize) -> Vec<u8> {
    let mut t = HashTranscript::new(b"tmpc/ecdsa-2p-sign");
    t.append(base).append_u64(attempt as u64);
    t.finish().to_vec()
}

/// `r` for a nonce point, or `None` when the nonce is unusable
fn nonce_r(big_r: &Point) -> Result<Option<Scalar>> {
    if big_r.is_identity() {
        return Ok(None);
    }
    let r = r_from_point(big_r)?;
    Ok((!r.is_zero()).then_some(r))
}

/// Fresh nonces with their points and proofs
struct Nonces {
    ks: Vec<Scalar>,
    points: Vec<Vec<u8>>,
    proofs: Vec<Vec<u8>>,
}

impl Zeroize for Nonces {
    fn zeroize(&mut self) {
        self.ks.zeroize();
    }
}

impl Drop for Nonces {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl Nonces {
    fn generate(curve: Curve, count: usize, role: Role, sid: &[u8]) -> Result<Self> {
        let mut nonces = Self {
            ks: Vec::with_capacity(count),
            points: Vec::with_capacity(count),
            proofs: Vec::with_capacity(count),
        };
        for i in 0..count {
            let k = Zeroizing::new(curve.random_scalar(&mut OsRng));
            let big_k = curve.mul_generator(&k)?;
            nonces.proofs.push(dl::prove(&big_k, &k, sid, dl_aux(role, i))?);
            nonces.points.push(big_k.to_bytes());
            nonces.ks.push(*k);
        }
        Ok(nonces)
    }
}

fn commit_items<'a, M: AsRef<[u8]>>(
    msgs: &'a [M],
    points: &'a [Vec<u8>],
    proofs: &'a [Vec<u8>],
) -> Vec<&'a [u8]> {
    msgs.iter()
        .map(|m| m.as_ref())
        .chain(points.iter().map(Vec::as_slice))
        .chain(proofs.iter().map(Vec::as_slice))
        .collect()
}

/// Decode and check the peer's nonce points
fn peer_nonces(
    curve: Curve,
    points: &[Vec<u8>],
    proofs: &[Vec<u8>],
    count: usize,
    peer_role: Role,
    sid: &[u8],
) -> Result<Vec<Point>> {
    let peer = peer_role.index();
    if points.len() != count || proofs.len() != count {
        return Err(Error::peer("ecdsa-2p", peer, "nonce count does not match batch"));
    }
    let decoded = curve.points_from_bytes(points).map_err(|e| e.caused_by(peer))?;
    for (i, (point, proof)) in decoded.iter().zip(proofs).enumerate() {
        dl::verify(point, proof, sid, dl_aux(peer_role, i)).map_err(|e| e.caused_by(peer))?;
    }
    Ok(decoded)
}

/// Sign one message; P1 gets a DER signature, P2 an empty vector
pub async fn sign<T: Transport>(
    job: &mut Job2P<T>,
    share: &Share,
    sid: &[u8],
    msg: &[u8],
) -> Result<Vec<u8>> {
    let mut sigs = sign_batch(job, share, sid, &[msg]).await?;
    Ok(sigs.pop().unwrap_or_default())
}

/// Sign a batch of messages under one transcript
///
/// Every message gets its own nonce pair. P1 returns one DER signature per
/// message in order; P2 returns an empty list. A degenerate nonce restarts
/// the whole batch, up to [`MAX_SIGN_ATTEMPTS`] times.
#[instrument(skip_all, fields(role = ?job.role(), batch = msgs.len()))]
pub async fn sign_batch<T: Transport, M: AsRef<[u8]>>(
    job: &mut Job2P<T>,
    share: &Share,
    sid: &[u8],
    msgs: &[M],
) -> Result<Vec<Vec<u8>>> {
    if share.role() != job.role() {
        return Err(Error::invalid_argument("ecdsa-2p", "share role does not match job role"));
    }
    if msgs.is_empty() {
        return Err(Error::invalid_argument("ecdsa-2p", "no messages to sign"));
    }
    let curve = share.curve();
    let ms = msgs
        .iter()
        .map(|m| message_scalar(curve, m.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    let base_sid = job.derive_sid(curve, sid);
    info!("Starting 2P-ECDSA signing");

    for attempt in 0..MAX_SIGN_ATTEMPTS {
        let sid = attempt_sid(&base_sid, attempt);
        let outcome = match job.role() {
            Role::P1 => sign_p1(job, share, &sid, msgs, &ms).await?,
            Role::P2 => sign_p2(job, share, &sid, msgs, &ms).await?,
        };
        match outcome {
            Some(sigs) => {
                info!(signatures = sigs.len(), "2P-ECDSA signing completed");
                return Ok(sigs);
            }
            None => warn!(attempt, "degenerate nonce, retrying"),
        }
    }
    Err(Error::protocol(
        "ecdsa-2p",
        format!("no usable nonce after {} attempts", MAX_SIGN_ATTEMPTS),
    ))
}

async fn sign_p1<T: Transport, M: AsRef<[u8]>>(
    job: &mut Job2P<T>,
    share: &Share,
    sid: &[u8],
    msgs: &[M],
    ms: &[Scalar],
) -> Result<Option<Vec<Vec<u8>>>> {
    let curve = share.curve();
    let peer = Role::P2.index();
    let sk = share
        .paillier()
        .private()
        .ok_or_else(|| Error::fatal("ecdsa-2p", "P1 share without Paillier private key"))?;

    debug!("Sign round 1: commit to R1");
    let nonces = Nonces::generate(curve, ms.len(), Role::P1, sid)?;
    let (com, opening): (Vec<u8>, Opening) =
        commitment::commit(sid, 0, &commit_items(msgs, &nonces.points, &nonces.proofs))?;
    job.send_msg(&SignCommitMessage { commitment: com }).await?;

    debug!("Sign round 2: receive R2");
    let msg: SignP2NonceMessage = job.recv_msg().await?;
    let r2s = peer_nonces(curve, &msg.nonces, &msg.proofs, ms.len(), Role::P2, sid)?;

    debug!("Sign round 3: open R1");
    job.send_msg(&SignP1NonceMessage {
        nonces: nonces.points.clone(),
        proofs: nonces.proofs.clone(),
        opening,
    })
    .await?;

    let big_rs = nonces
        .ks
        .iter()
        .zip(&r2s)
        .map(|(k1, r2)| r2.mul(k1))
        .collect::<Result<Vec<_>>>()?;
    let rs = match big_rs.iter().map(nonce_r).collect::<Result<Option<Vec<_>>>>()? {
        Some(rs) => rs,
        None => return Ok(None),
    };

    debug!("Sign round 4: decrypt partial signatures");
    let msg: SignCiphertextMessage = job.recv_msg().await?;
    if msg.ciphertexts.len() != ms.len() || msg.proofs.len() != ms.len() {
        return Err(Error::peer("ecdsa-2p", peer, "ciphertext count does not match batch"));
    }
    let x1_point = curve.mul_generator(share.x_share())?;
    let x2_point = share.public_key().sub(&x1_point)?;

    let mut sigs = Vec::with_capacity(ms.len());
    for i in 0..ms.len() {
        let st = AffineStatement {
            pk: sk.public(),
            c_key: share.c_key(),
            c: &msg.ciphertexts[i],
            big_r2: &r2s[i],
            x2: &x2_point,
            m: &ms[i],
            r: &rs[i],
        };
        msg.proofs[i]
            .verify(&st, sid, dl_aux(Role::P2, i))
            .map_err(|e| e.caused_by(peer))?;

        let plain = sk.decrypt(&msg.ciphertexts[i]).map_err(|e| e.caused_by(peer))?;
        let s = scalar_from_bn(curve, &plain).div(&nonces.ks[i])?;
        // P2 has already finished its part, so a zero s cannot be retried here
        if s.is_zero() {
            return Err(Error::peer("ecdsa-2p", peer, "signature s is zero"));
        }
        let sig = EcdsaSignature::new(rs[i], s)?.normalize_s();
        sig.verify(share.public_key(), msgs[i].as_ref())
            .map_err(|_| Error::peer("ecdsa-2p", peer, "assembled signature does not verify"))?;
        sigs.push(sig.to_der()?);
    }
    Ok(Some(sigs))
}

async fn sign_p2<T: Transport, M: AsRef<[u8]>>(
    job: &mut Job2P<T>,
    share: &Share,
    sid: &[u8],
    msgs: &[M],
    ms: &[Scalar],
) -> Result<Option<Vec<Vec<u8>>>> {
    let curve = share.curve();
    let peer = Role::P1.index();

    debug!("Sign round 1: receive commitment");
    let com: SignCommitMessage = job.recv_msg().await?;

    debug!("Sign round 2: send R2");
    let nonces = Nonces::generate(curve, ms.len(), Role::P2, sid)?;
    job.send_msg(&SignP2NonceMessage {
        nonces: nonces.points.clone(),
        proofs: nonces.proofs.clone(),
    })
    .await?;

    debug!("Sign round 3: check R1");
    let msg: SignP1NonceMessage = job.recv_msg().await?;
    let items = commit_items(msgs, &msg.nonces, &msg.proofs);
    if !commitment::verify(&com.commitment, &msg.opening, sid, 0, &items) {
        return Err(Error::peer("ecdsa-2p", peer, "commitment to R1 does not open"));
    }
    let r1s = peer_nonces(curve, &msg.nonces, &msg.proofs, ms.len(), Role::P1, sid)?;

    let big_rs = nonces
        .ks
        .iter()
        .zip(&r1s)
        .map(|(k2, r1)| r1.mul(k2))
        .collect::<Result<Vec<_>>>()?;
    let rs = match big_rs.iter().map(nonce_r).collect::<Result<Option<Vec<_>>>>()? {
        Some(rs) => rs,
        None => return Ok(None),
    };

    debug!("Sign round 4: send encrypted partial signatures");
    let pk = share.paillier().public();
    let q = curve_order(curve);
    let rho_bound = (&q * &q) << (2 * STAT_SEC);
    let x2_point = curve.mul_generator(share.x_share())?;

    let mut ciphertexts = Vec::with_capacity(ms.len());
    let mut proofs = Vec::with_capacity(ms.len());
    for i in 0..ms.len() {
        let big_r2 = curve.mul_generator(&nonces.ks[i])?;
        let w1 = Zeroizing::new(nonces.ks[i].invert()?);
        let w2 = Zeroizing::new(w1.mul(share.x_share())?);
        let rho = BigNumber::from_rng(&rho_bound, &mut OsRng);

        let r_int = bn_from_scalar(&rs[i]);
        let w1_int = bn_from_scalar(&w1);
        let plain = &w1_int * bn_from_scalar(&ms[i]) + bn_from_scalar(&w2) * &r_int + &rho * &q;
        let (masked, rc) = pk.encrypt(&plain);
        let c = pk.add(&pk.mul(share.c_key(), &(&r_int * &w1_int)), &masked);

        let st = AffineStatement {
            pk,
            c_key: share.c_key(),
            c: &c,
            big_r2: &big_r2,
            x2: &x2_point,
            m: &ms[i],
            r: &rs[i],
        };
        let wit = AffineWitness {
            w1: &w1,
            w2: &w2,
            rho: &rho,
            rc: &rc,
        };
        proofs.push(AffineProof::prove(&st, &wit, sid, dl_aux(Role::P2, i))?);
        ciphertexts.push(c);
    }
    job.send_msg(&SignCiphertextMessage { ciphertexts, proofs }).await?;
    Ok(Some(Vec::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecdsa_2p::refresh;
    use crate::ecdsa_2p::tests::test_dkg;
    use crate::mpc::{MemoryNetwork, MemoryTransport};
    use crate::signature::verify_ecdsa;
    use crate::test_utils::run_2p;
    use crate::ErrorKind;
    use k256::ecdsa::signature::hazmat::PrehashVerifier;

    async fn sign_both(shares: &[Share], sid: &'static [u8], msg: &'static [u8]) -> Vec<Vec<u8>> {
        let shares = shares.to_vec();
        run_2p(move |mut job: Job2P<MemoryTransport>| {
            let share = shares[job.role_index()].clone();
            async move { sign(&mut job, &share, sid, msg).await.unwrap() }
        })
        .await
    }

    #[test]
    fn test_nonces_are_wiped() {
        let mut nonces = Nonces::generate(Curve::Secp256k1, 3, Role::P1, b"wipe").unwrap();
        assert!(nonces.ks.iter().all(|k| !k.is_zero()));
        nonces.zeroize();
        assert!(nonces.ks.iter().all(Scalar::is_zero));
        assert_eq!(nonces.points.len(), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sign_then_refresh_then_sign() {
        let shares = test_dkg(Curve::Secp256k1).await;
        let q = *shares[0].public_key();

        let out = sign_both(&shares, b"session-1", b"Hello, CB-MPC!").await;
        assert!((70..=72).contains(&out[0].len()), "DER length {}", out[0].len());
        assert!(out[1].is_empty());
        verify_ecdsa(&q, b"Hello, CB-MPC!", &out[0]).unwrap();

        let shares = shares.to_vec();
        let refreshed = run_2p(move |mut job: Job2P<MemoryTransport>| {
            let share = shares[job.role_index()].clone();
            async move { refresh(&mut job, &share, b"").await.unwrap() }
        })
        .await;

        let again = sign_both(&refreshed, b"session-2", b"Fresh signing after refresh!").await;
        assert!(again[1].is_empty());
        assert_ne!(again[0], out[0]);
        verify_ecdsa(&q, b"Fresh signing after refresh!", &again[0]).unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_signature_verifies_with_k256() {
        let shares = test_dkg(Curve::Secp256k1).await;
        let digest = [0x5au8; 32];
        let shares_c = shares.clone();
        let out = run_2p(move |mut job: Job2P<MemoryTransport>| {
            let share = shares_c[job.role_index()].clone();
            async move { sign(&mut job, &share, b"", &digest).await.unwrap() }
        })
        .await;

        let key = k256::ecdsa::VerifyingKey::from_sec1_bytes(&shares[0].public_key().to_bytes()).unwrap();
        let sig = k256::ecdsa::Signature::from_der(&out[0]).unwrap();
        assert!(sig.normalize_s().is_none(), "s is not low");
        key.verify_prehash(&digest, &sig).unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sign_batch_p256() {
        let shares = test_dkg(Curve::P256).await;
        let q = *shares[0].public_key();
        let msgs: Vec<Vec<u8>> = (0..3).map(|i| vec![i as u8 + 1; 32]).collect();
        let msgs_c = msgs.clone();
        let out = run_2p(move |mut job: Job2P<MemoryTransport>| {
            let share = shares[job.role_index()].clone();
            let msgs = msgs_c.clone();
            async move { sign_batch(&mut job, &share, b"batch", &msgs).await.unwrap() }
        })
        .await;

        assert_eq!(out[0].len(), 3);
        assert!(out[1].is_empty());
        for (msg, der) in msgs.iter().zip(&out[0]) {
            verify_ecdsa(&q, msg, der).unwrap();
        }
        assert_ne!(out[0][0], out[0][1]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_p2_rejects_different_message() {
        let shares = test_dkg(Curve::Secp256k1).await;
        let net = MemoryNetwork::new(2);
        let mut tasks = Vec::new();
        for (role, msg) in [(Role::P1, &b"pay alice"[..]), (Role::P2, &b"pay bob"[..])] {
            let share = shares[role.index()].clone();
            let mut job = Job2P::new(net.endpoint(role.index()), role, "party_0", "party_1").unwrap();
            tasks.push(tokio::spawn(async move { sign(&mut job, &share, b"", msg).await }));
        }
        let p1 = tasks.remove(0);
        let err = tasks.remove(0).await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(err.peer_index(), Some(0));

        // P1 is left waiting for the ciphertexts until the job is aborted
        net.abort();
        let err = p1.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_empty_message_rejected() {
        let shares = test_dkg(Curve::Secp256k1).await;
        let net = MemoryNetwork::new(2);
        let mut job = Job2P::new(net.endpoint(0), Role::P1, "party_0", "party_1").unwrap();
        let err = sign(&mut job, &shares[0], b"", b"").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_nonce_r_rejects_identity() {
        assert!(nonce_r(&Point::identity(Curve::P256)).unwrap().is_none());
        let r = nonce_r(&Curve::P256.generator()).unwrap().unwrap();
        assert!(!r.is_zero());
    }
}
