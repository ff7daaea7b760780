//! N-party ECDSA signing
//!
//! Each party samples `k_i` and `γ_i`. Pairwise OT-based MtA gives every
//! party additive shares `δ_i` of `k·γ` and `σ_i` of `k·x`. Opening `δ` and
//! `Γ = γ·G` yields `R = δ⁻¹·Γ = k⁻¹·G`; then `s_i = m·k_i + r·σ_i` sums to
//! `k·(m + r·x)`, a signature with nonce `k⁻¹`.
//!
//! Rounds:
//! 1. commit to `Γ_i`; the OT receiver of each pair sends its base-OT point
//! 2. the OT sender answers with its base-OT choices
//! 3. the OT receiver sends the extension matrix for its encoded `k, γ, x`
//! 4. the OT sender sends MtA corrections for `γ, x` against `k` and `k`
//!    against `γ` and `x`
//! 5. open `Γ_i` and publish `δ_i`
//! 6. partial signatures go to the receiver only

use super::messages::{
    BaseOtChoiceMessage, BaseOtOfferMessage, MtaMessage, OtExtendMessage, PartialSignatureMessage,
    SignRevealMessage, SignStartMessage,
};
use super::{check_curve, OtRoleMap};
use crate::commitment;
use crate::curve::{Point, Scalar};
use crate::eckey::KeyShareMP;
use crate::mpc::{JobMP, PartyIndex, Transport};
use crate::oblivious::{base_ot, mta, BaseOtSender, ExtReceiver, ExtSender, Gadget, Row};
use crate::params::{KAPPA, MAX_SIGN_ATTEMPTS, SID_BYTES};
use crate::signature::{message_scalar, r_from_point, EcdsaSignature};
use crate::zk::{dl, HashTranscript};
use crate::{Error, Result};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{debug, info, instrument, warn};
use zeroize::Zeroizing;

/// Sender values per block, matching the receiver's encoded `[k, γ, x]`
const MTA_SHAPE: [usize; 3] = [2, 1, 1];

fn attempt_sid(base: &[u8], attempt: usize) -> Vec<u8> {
    let mut t = HashTranscript::new(b"tmpc/ecdsa-mp-sign");
    t.append(base).append_u64(attempt as u64);
    t.finish().to_vec()
}

fn message_digest(msg: &[u8]) -> Vec<u8> {
    let mut t = HashTranscript::new(b"tmpc/ecdsa-mp-message");
    t.append(msg);
    t.finish().to_vec()
}

fn session_id(base: &[u8], starts: &[SignStartMessage]) -> Vec<u8> {
    let mut t = HashTranscript::new(b"tmpc/ecdsa-mp-session");
    t.append(base);
    for s in starts {
        t.append(&s.sid_contribution).append(&s.commitment);
    }
    t.finish().to_vec()
}

/// Session id of the OT between `sender` and `receiver`
fn pair_sid(sid: &[u8], sender: PartyIndex, receiver: PartyIndex) -> Vec<u8> {
    let mut t = HashTranscript::new(b"tmpc/ecdsa-mp-pair");
    t.append(sid)
        .append_u64(sender as u64)
        .append_u64(receiver as u64);
    t.finish().to_vec()
}

fn none_vec<M>(n: usize) -> Vec<Option<M>> {
    (0..n).map(|_| None).collect()
}

fn expect_direct<'a, M>(msgs: &'a [Option<M>], j: PartyIndex, what: &str) -> Result<&'a M> {
    msgs[j]
        .as_ref()
        .ok_or_else(|| Error::peer("ecdsa-mp", j, format!("missing {}", what)))
}

/// Sign `msg` with the default OT roles; only `receiver` gets the DER
/// signature, every other party an empty vector
pub async fn sign<T: Transport>(
    job: &mut JobMP<T>,
    share: &KeyShareMP,
    msg: &[u8],
    receiver: PartyIndex,
) -> Result<Vec<u8>> {
    let roles = OtRoleMap::default_for(job.party_count());
    sign_with_ot_roles(job, share, msg, receiver, &roles).await
}

/// Sign `msg` with caller-chosen OT roles
///
/// All parties must pass the same message, receiver and role map. A
/// degenerate nonce restarts signing with fresh randomness, up to
/// [`MAX_SIGN_ATTEMPTS`] times.
#[instrument(skip_all, fields(index = job.role_index(), receiver))]
pub async fn sign_with_ot_roles<T: Transport>(
    job: &mut JobMP<T>,
    share: &KeyShareMP,
    msg: &[u8],
    receiver: PartyIndex,
    roles: &OtRoleMap,
) -> Result<Vec<u8>> {
    let curve = share.curve();
    check_curve(curve)?;
    let n = job.party_count();
    if receiver >= n {
        return Err(Error::invalid_argument(
            "ecdsa-mp",
            format!("receiver {} outside roster of {}", receiver, n),
        ));
    }
    if roles.parties() != n {
        return Err(Error::invalid_argument("ecdsa-mp", "role map does not match roster"));
    }
    if share.party_name() != job.my_name() {
        return Err(Error::invalid_argument("ecdsa-mp", "share belongs to another party"));
    }
    share.public_shares_for(job.roster())?;
    let m = message_scalar(curve, msg)?;
    let base_sid = job.derive_sid(curve, &[]);
    info!(parties = n, "Starting N-party ECDSA signing");

    for attempt in 0..MAX_SIGN_ATTEMPTS {
        let sid = attempt_sid(&base_sid, attempt);
        match sign_attempt(job, share, msg, &m, &sid, receiver, roles).await? {
            Some(sig) => {
                info!(signature_len = sig.len(), "N-party ECDSA signing completed");
                return Ok(sig);
            }
            None => warn!(attempt, "degenerate nonce, retrying"),
        }
    }
    Err(Error::protocol(
        "ecdsa-mp",
        format!("no usable nonce after {} attempts", MAX_SIGN_ATTEMPTS),
    ))
}

async fn sign_attempt<T: Transport>(
    job: &mut JobMP<T>,
    share: &KeyShareMP,
    msg: &[u8],
    m: &Scalar,
    base_sid: &[u8],
    receiver: PartyIndex,
    roles: &OtRoleMap,
) -> Result<Option<Vec<u8>>> {
    let curve = share.curve();
    let me = job.role_index();
    let n = job.party_count();
    let peers = job.others();
    let digest = message_digest(msg);

    let k = Zeroizing::new(curve.random_scalar(&mut OsRng));
    let gamma = Zeroizing::new(curve.random_scalar(&mut OsRng));
    let x = Zeroizing::new(*share.x_share());
    let big_gamma = curve.mul_generator(&gamma)?;

    debug!("Sign round 1: commit to Γ_i, offer base OTs");
    let mut contribution = vec![0u8; SID_BYTES];
    OsRng.fill_bytes(&mut contribution);
    let (com, opening) = commitment::commit(base_sid, me, &[&big_gamma.to_bytes()[..]])?;
    let mut base_senders: Vec<Option<BaseOtSender>> = none_vec(n);
    let mut offers = none_vec(n);
    for &j in &peers {
        if !roles.is_sender(me, j) {
            let s = BaseOtSender::new(curve)?;
            offers[j] = Some(BaseOtOfferMessage {
                point: s.public().to_bytes(),
            });
            base_senders[j] = Some(s);
        }
    }
    let start = SignStartMessage {
        sid_contribution: contribution,
        message_digest: digest.clone(),
        commitment: com,
    };
    let (starts, offers_in) = job.exchange_with_direct(&start, &offers).await?;
    for (j, s) in starts.iter().enumerate() {
        if s.message_digest != digest {
            return Err(Error::peer("ecdsa-mp", j, "signing a different message"));
        }
        if s.sid_contribution.len() != SID_BYTES {
            return Err(Error::peer("ecdsa-mp", j, "bad session-id contribution"));
        }
    }
    let sid = session_id(base_sid, &starts);

    debug!("Sign round 2: base-OT choices");
    let mut ext_senders: Vec<Option<ExtSender>> = none_vec(n);
    let mut choices_out = none_vec(n);
    for &j in &peers {
        if roles.is_sender(me, j) {
            let offer = expect_direct(&offers_in, j, "base-OT offer")?;
            let big_y = Point::from_bytes(curve, &offer.point).map_err(|e| e.caused_by(j))?;
            let delta = ExtSender::random_delta();
            let (points, keys) =
                base_ot::receive(&pair_sid(&sid, me, j), &big_y, &ExtSender::delta_bits(&delta))
                    .map_err(|e| e.caused_by(j))?;
            ext_senders[j] = Some(ExtSender::new(delta, keys)?);
            choices_out[j] = Some(BaseOtChoiceMessage {
                points: points.iter().map(Point::to_bytes).collect(),
            });
        }
    }
    let (_, choices_in) = job.exchange_with_direct(&(), &choices_out).await?;

    debug!("Sign round 3: extend OTs");
    let gadget = Gadget::new(curve, &sid)?;
    let mut ext_state: Vec<Option<(Vec<bool>, Vec<Row>)>> = none_vec(n);
    let mut extend_out = none_vec(n);
    for &j in &peers {
        if let Some(base) = base_senders[j].take() {
            let choice = expect_direct(&choices_in, j, "base-OT choices")?;
            if choice.points.len() != KAPPA {
                return Err(Error::peer("ecdsa-mp", j, "wrong number of base OTs"));
            }
            let xs = curve.points_from_bytes(&choice.points).map_err(|e| e.caused_by(j))?;
            let psid = pair_sid(&sid, j, me);
            let ext = ExtReceiver::new(base.keys(&psid, &xs).map_err(|e| e.caused_by(j))?)?;
            let mut choices = Vec::with_capacity(MTA_SHAPE.len() * gadget.len());
            for b in [&k, &gamma, &x] {
                choices.extend(gadget.encode(b, &mut OsRng)?);
            }
            let (u, t) = ext.extend(&psid, &choices);
            extend_out[j] = Some(OtExtendMessage { columns: u });
            ext_state[j] = Some((choices, t));
        }
    }
    let (_, extend_in) = job.exchange_with_direct(&(), &extend_out).await?;

    debug!("Sign round 4: MtA");
    let mut delta_share = k.mul(&gamma)?;
    let mut sigma_share = Zeroizing::new(k.mul(&x)?);
    let inputs = Zeroizing::new(vec![vec![*gamma, *x], vec![*k], vec![*k]]);
    let mut mta_out = none_vec(n);
    for &j in &peers {
        if let Some(ext) = ext_senders[j].take() {
            let extend = expect_direct(&extend_in, j, "OT extension")?;
            let psid = pair_sid(&sid, me, j);
            let q = ext
                .extend(&psid, MTA_SHAPE.len() * gadget.len(), &extend.columns)
                .map_err(|e| e.caused_by(j))?;
            let (alphas, corrections) = mta::send(&gadget, &psid, &q, ext.delta(), &inputs)?;
            delta_share = delta_share.add(&alphas[0][0])?.add(&alphas[1][0])?;
            *sigma_share = sigma_share.add(&alphas[0][1])?.add(&alphas[2][0])?;
            mta_out[j] = Some(MtaMessage { corrections });
        }
    }
    let (_, mta_in) = job.exchange_with_direct(&(), &mta_out).await?;
    for &j in &peers {
        if let Some((choices, t)) = ext_state[j].take() {
            let corrections = &expect_direct(&mta_in, j, "MtA corrections")?.corrections;
            let betas = mta::receive(&gadget, &pair_sid(&sid, j, me), &t, &choices, &MTA_SHAPE, corrections)
                .map_err(|e| e.caused_by(j))?;
            delta_share = delta_share.add(&betas[0][0])?.add(&betas[1][0])?;
            *sigma_share = sigma_share.add(&betas[0][1])?.add(&betas[2][0])?;
        }
    }

    debug!("Sign round 5: open Γ_i, publish δ_i");
    let reveals = job
        .exchange(&SignRevealMessage {
            gamma_point: big_gamma.to_bytes(),
            proof: dl::prove(&big_gamma, &gamma, &sid, me as u64)?,
            opening,
            delta: delta_share.to_bytes(),
        })
        .await?;
    let mut big_gamma_sum = curve.identity();
    let mut delta = Scalar::zero(curve);
    for (j, (start, rev)) in starts.iter().zip(&reveals).enumerate() {
        if !commitment::verify(&start.commitment, &rev.opening, base_sid, j, &[&rev.gamma_point[..]]) {
            return Err(Error::peer("ecdsa-mp", j, "commitment to Γ does not open"));
        }
        let g = Point::from_bytes(curve, &rev.gamma_point).map_err(|e| e.caused_by(j))?;
        dl::verify(&g, &rev.proof, &sid, j as u64).map_err(|e| e.caused_by(j))?;
        let d = Scalar::from_bytes(curve, &rev.delta).map_err(|e| e.caused_by(j))?;
        big_gamma_sum = big_gamma_sum.add(&g)?;
        delta = delta.add(&d)?;
    }
    if delta.is_zero() {
        return Ok(None);
    }
    let big_r = big_gamma_sum.mul(&delta.invert()?)?;
    if big_r.is_identity() {
        return Ok(None);
    }
    let r = r_from_point(&big_r)?;
    if r.is_zero() {
        return Ok(None);
    }

    debug!("Sign round 6: partial signatures to the receiver");
    let s_i = m.mul(&k)?.add(&r.mul(&sigma_share)?)?;
    let partials = job
        .send_all_to_one(receiver, &PartialSignatureMessage { s: s_i.to_bytes() })
        .await?;
    let partials = match partials {
        Some(p) => p,
        None => return Ok(Some(Vec::new())),
    };

    let mut s = Scalar::zero(curve);
    for (j, p) in partials.iter().enumerate() {
        s = s.add(&Scalar::from_bytes(curve, &p.s).map_err(|e| e.caused_by(j))?)?;
    }
    // only the receiver sees s, so a zero s cannot restart the other parties
    if s.is_zero() {
        return Err(Error::protocol("ecdsa-mp", "signature s is zero"));
    }
    let sig = EcdsaSignature::new(r, s)?.normalize_s();
    if sig.verify(share.public_key(), msg).is_err() {
        warn!("assembled signature does not verify");
        return Err(Error::protocol("ecdsa-mp", "assembled signature does not verify"));
    }
    Ok(Some(sig.to_der()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::Curve;
    use crate::eckey::tests::{test_dkg, test_threshold_dkg, two_of_three};
    use crate::mpc::{MemoryNetwork, MemoryTransport};
    use crate::signature::verify_ecdsa;
    use crate::test_utils::run_mp;
    use crate::ErrorKind;

    async fn sign_all(
        shares: Vec<KeyShareMP>,
        msg: &'static [u8],
        receiver: PartyIndex,
        roles: OtRoleMap,
    ) -> Vec<Vec<u8>> {
        let n = shares.len();
        run_mp(n, move |mut job: JobMP<MemoryTransport>| {
            let share = shares[job.role_index()].clone();
            let roles = roles.clone();
            async move {
                sign_with_ot_roles(&mut job, &share, msg, receiver, &roles)
                    .await
                    .unwrap()
            }
        })
        .await
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_three_party_sign() {
        let msg = b"test message for 3-party ECDSA";
        let shares = test_dkg(3, Curve::Secp256k1).await;
        let q = *shares[0].public_key();
        let out = sign_all(shares, msg, 0, OtRoleMap::default_for(3)).await;

        assert!(out[1].is_empty());
        assert!(out[2].is_empty());
        verify_ecdsa(&q, msg, &out[0]).unwrap();

        use k256::ecdsa::signature::hazmat::PrehashVerifier;
        let vk = k256::ecdsa::VerifyingKey::from_sec1_bytes(&q.to_bytes()).unwrap();
        let sig = k256::ecdsa::Signature::from_der(&out[0]).unwrap();
        assert!(sig.normalize_s().is_none());
        // a 30-byte prehash is left-padded, matching the message scalar
        vk.verify_prehash(msg, &sig).unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_custom_roles_and_receiver() {
        let msg = b"reversed OT roles";
        let shares = test_dkg(3, Curve::P256).await;
        let q = *shares[0].public_key();
        let roles = OtRoleMap::new(vec![vec![-1, 1, 0], vec![0, -1, 1], vec![1, 0, -1]]).unwrap();
        let out = sign_all(shares, msg, 2, roles).await;
        assert!(out[0].is_empty() && out[1].is_empty());
        verify_ecdsa(&q, msg, &out[2]).unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_two_of_three_threshold_sign() {
        let curve = Curve::Secp256k1;
        let shares = test_threshold_dkg(two_of_three(curve), 3).await;
        let q = *shares[0].public_key();
        assert!(shares.iter().all(|s| *s.public_key() == q));

        let quorum = vec!["party_0".to_string(), "party_2".to_string()];
        let additive: Vec<KeyShareMP> = [0, 2]
            .iter()
            .map(|&i| super::super::to_additive_share(&shares[i], &quorum).unwrap())
            .collect();

        let net = MemoryNetwork::new(2);
        let handles: Vec<_> = additive
            .into_iter()
            .enumerate()
            .map(|(i, share)| {
                let mut job = JobMP::new(net.endpoint(i), i, quorum.clone()).unwrap();
                tokio::spawn(async move { sign(&mut job, &share, b"threshold message", 1).await })
            })
            .collect();
        let mut out = Vec::new();
        for h in handles {
            out.push(h.await.unwrap().unwrap());
        }
        assert!(out[0].is_empty());
        verify_ecdsa(&q, b"threshold message", &out[1]).unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_bad_arguments_rejected() {
        let shares = test_dkg(2, Curve::Secp256k1).await;
        let errors = run_mp(2, move |mut job: JobMP<MemoryTransport>| {
            let share = shares[job.role_index()].clone();
            async move {
                let a = sign(&mut job, &share, b"msg", 5).await.unwrap_err();
                let b = sign(&mut job, &share, b"", 0).await.unwrap_err();
                let roles = OtRoleMap::default_for(3);
                let c = sign_with_ot_roles(&mut job, &share, b"msg", 0, &roles).await.unwrap_err();
                vec![a, b, c]
            }
        })
        .await;
        for err in errors.into_iter().flatten() {
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_different_messages_detected() {
        let shares = test_dkg(2, Curve::Secp256k1).await;
        let errors = run_mp(2, move |mut job: JobMP<MemoryTransport>| {
            let share = shares[job.role_index()].clone();
            let msg: &'static [u8] = if job.role_index() == 0 { b"pay alice" } else { b"pay mallory" };
            async move { sign(&mut job, &share, msg, 0).await.unwrap_err() }
        })
        .await;
        assert_eq!(errors[0].kind(), ErrorKind::Protocol);
        assert_eq!(errors[0].peer_index(), Some(1));
        assert_eq!(errors[1].peer_index(), Some(0));
    }
}
