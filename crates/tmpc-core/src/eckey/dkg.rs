//! Additive N-party key generation and refresh

use super::messages::{
    KeyCommitMessage, KeyRevealMessage, PairCommitMessage, PairOpenMessage, PublicShareMessage,
};
use super::{check_consistency, view_digest, KeyShareMP};
use crate::commitment;
use crate::curve::{sum_points, Curve, Point, Scalar};
use crate::mpc::{JobMP, Transport};
use crate::zk::{dl, HashTranscript};
use crate::{Error, Result};
use rand::rngs::OsRng;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

pub(crate) fn tagged_sid(tag: &'static [u8], sid: &[u8]) -> Vec<u8> {
    let mut t = HashTranscript::new(tag);
    t.append(sid);
    t.finish().to_vec()
}

/// Verify every party's revealed public share against its commitment and
/// proof; returns the shares keyed by party name
pub(crate) fn open_public_shares<T: Transport>(
    job: &JobMP<T>,
    curve: Curve,
    sid: &[u8],
    coms: &[KeyCommitMessage],
    reveals: &[KeyRevealMessage],
) -> Result<BTreeMap<String, Point>> {
    let mut public = BTreeMap::new();
    for (j, (com, rev)) in coms.iter().zip(reveals).enumerate() {
        if !commitment::verify(&com.commitment, &rev.opening, sid, j, &[&rev.public_share[..]]) {
            return Err(Error::peer("eckey", j, "commitment to public share does not open"));
        }
        let p = Point::from_bytes(curve, &rev.public_share).map_err(|e| e.caused_by(j))?;
        dl::verify(&p, &rev.proof, sid, j as u64).map_err(|e| e.caused_by(j))?;
        public.insert(job.party_name(j)?.to_string(), p);
    }
    Ok(public)
}

/// Run additive N-party key generation over `curve`
///
/// Every party commits to `Q_i = x_i·G`, then reveals it with a proof of
/// knowledge. A final echo round checks that all parties hold the same
/// view of `Q` and the public shares.
#[instrument(skip(job, sid), fields(index = job.role_index()))]
pub async fn dkg<T: Transport>(job: &mut JobMP<T>, curve: Curve, sid: &[u8]) -> Result<KeyShareMP> {
    let sid = tagged_sid(b"tmpc/eckey-dkg", &job.derive_sid(curve, sid));
    let me = job.role_index();
    info!(curve = %curve, parties = job.party_count(), "Starting N-party DKG");

    let x = curve.random_scalar(&mut OsRng);
    let big_x = curve.mul_generator(&x)?;

    debug!("DKG round 1: commit to public share");
    let (com, opening) = commitment::commit(&sid, me, &[&big_x.to_bytes()[..]])?;
    let coms = job.exchange(&KeyCommitMessage { commitment: com }).await?;

    debug!("DKG round 2: reveal public share");
    let reveals = job
        .exchange(&KeyRevealMessage {
            public_share: big_x.to_bytes(),
            opening,
            proof: dl::prove(&big_x, &x, &sid, me as u64)?,
        })
        .await?;
    let public = open_public_shares(job, curve, &sid, &coms, &reveals)?;
    let q = sum_points(curve, public.values())?;
    if q.is_identity() {
        return Err(Error::protocol("eckey", "joint public key is the identity"));
    }

    debug!("DKG round 3: compare views");
    check_consistency(job, "eckey", view_digest(&q, &public)).await?;

    let share = KeyShareMP::new(job.my_name(), x, q, public)?;
    info!(public_key = hex::encode(q.to_bytes()), "N-party DKG completed");
    Ok(share)
}

/// Re-randomise additive shares without changing `Q`
///
/// Every pair `i < j` agrees on `δ_ij` by committing to and then opening
/// private contributions; party `i` adds `δ_ij` and party `j` subtracts it.
/// The new public shares are broadcast with proofs and must still sum to
/// `Q`.
#[instrument(skip(job, share, sid), fields(index = job.role_index()))]
pub async fn refresh<T: Transport>(
    job: &mut JobMP<T>,
    share: &KeyShareMP,
    sid: &[u8],
) -> Result<KeyShareMP> {
    let curve = share.curve();
    if share.party_name() != job.my_name() {
        return Err(Error::invalid_argument("eckey", "share belongs to another party"));
    }
    share.public_shares_for(job.roster())?;
    let sid = tagged_sid(b"tmpc/eckey-refresh", &job.derive_sid(curve, sid));
    let me = job.role_index();
    let n = job.party_count();
    info!(parties = n, "Starting N-party refresh");

    let contributions: Vec<Scalar> = (0..n).map(|_| curve.random_scalar(&mut OsRng)).collect();

    debug!("Refresh round 1: commit to pairwise contributions");
    let mut commits = Vec::with_capacity(n);
    let mut openings = Vec::with_capacity(n);
    for (j, c) in contributions.iter().enumerate() {
        if j == me {
            commits.push(None);
            openings.push(None);
            continue;
        }
        let (com, opening) = commitment::commit(&sid, me, &[&c.to_bytes()[..], &(j as u64).to_be_bytes()])?;
        commits.push(Some(PairCommitMessage { commitment: com }));
        openings.push(Some(opening));
    }
    let (_, their_commits) = job.exchange_with_direct(&(), &commits).await?;

    debug!("Refresh round 2: open pairwise contributions");
    let opens: Vec<Option<PairOpenMessage>> = contributions
        .iter()
        .zip(openings)
        .map(|(c, o)| {
            o.map(|opening| PairOpenMessage {
                contribution: c.to_bytes(),
                opening,
            })
        })
        .collect();
    let (_, their_opens) = job.exchange_with_direct(&(), &opens).await?;

    let mut x = *share.x_share();
    for j in job.others() {
        let (com, open) = match (&their_commits[j], &their_opens[j]) {
            (Some(c), Some(o)) => (c, o),
            _ => return Err(Error::peer("eckey", j, "missing refresh contribution")),
        };
        let binding = (me as u64).to_be_bytes();
        if !commitment::verify(&com.commitment, &open.opening, &sid, j, &[&open.contribution[..], &binding]) {
            return Err(Error::peer("eckey", j, "refresh commitment does not open"));
        }
        let theirs = Scalar::from_bytes(curve, &open.contribution).map_err(|e| e.caused_by(j))?;
        let delta = contributions[j].add(&theirs)?;
        x = if me < j { x.add(&delta)? } else { x.sub(&delta)? };
    }
    if x.is_zero() {
        return Err(Error::protocol("eckey", "refreshed share is zero"));
    }

    debug!("Refresh round 3: broadcast new public shares");
    let big_x = curve.mul_generator(&x)?;
    let msgs = job
        .exchange(&PublicShareMessage {
            public_share: big_x.to_bytes(),
            proof: dl::prove(&big_x, &x, &sid, me as u64)?,
        })
        .await?;
    let mut public = BTreeMap::new();
    for (j, msg) in msgs.iter().enumerate() {
        let p = Point::from_bytes(curve, &msg.public_share).map_err(|e| e.caused_by(j))?;
        dl::verify(&p, &msg.proof, &sid, j as u64).map_err(|e| e.caused_by(j))?;
        public.insert(job.party_name(j)?.to_string(), p);
    }
    let q = *share.public_key();
    if sum_points(curve, public.values())? != q {
        return Err(Error::protocol("eckey", "refreshed public shares do not sum to the key"));
    }
    check_consistency(job, "eckey", view_digest(&q, &public)).await?;

    let refreshed = KeyShareMP::new(job.my_name(), x, q, public)?;
    info!("N-party refresh completed");
    Ok(refreshed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eckey::tests::test_dkg;
    use crate::mpc::MemoryTransport;
    use crate::test_utils::run_mp;
    use crate::ErrorKind;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dkg_views_agree() {
        for curve in Curve::ALL {
            let shares = test_dkg(3, curve).await;
            let q = *shares[0].public_key();
            let mut sum = Scalar::zero(curve);
            for (j, s) in shares.iter().enumerate() {
                assert_eq!(s.public_key(), &q);
                assert_eq!(s.public_shares(), shares[0].public_shares());
                assert_eq!(
                    s.public_shares()[&format!("party_{}", j)],
                    curve.mul_generator(s.x_share()).unwrap()
                );
                sum = sum.add(s.x_share()).unwrap();
            }
            assert_eq!(curve.mul_generator(&sum).unwrap(), q);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_refresh_keeps_key() {
        let shares = test_dkg(4, Curve::Secp256k1).await;
        let before = shares.clone();
        let refreshed = run_mp(4, move |mut job: JobMP<MemoryTransport>| {
            let share = shares[job.role_index()].clone();
            async move { refresh(&mut job, &share, b"refresh").await.unwrap() }
        })
        .await;

        let curve = Curve::Secp256k1;
        let sum = |s: &[KeyShareMP]| {
            s.iter()
                .fold(Scalar::zero(curve), |acc, k| acc.add(k.x_share()).unwrap())
        };
        assert_eq!(sum(&before), sum(&refreshed));
        for (old, new) in before.iter().zip(&refreshed) {
            assert_eq!(old.public_key(), new.public_key());
            assert_ne!(old.x_share(), new.x_share());
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_refresh_rejects_foreign_share() {
        let shares = test_dkg(2, Curve::P256).await;
        let errors = run_mp(2, move |mut job: JobMP<MemoryTransport>| {
            let share = shares[1 - job.role_index()].clone();
            async move { refresh(&mut job, &share, b"").await.unwrap_err() }
        })
        .await;
        assert!(errors.iter().all(|e| e.kind() == ErrorKind::InvalidArgument));
    }
}
