//! Key generation and refresh over an access structure
//!
//! Each dealer in the quorum shares a random value (or zero, for refresh)
//! over the tree, publishes the point of every node and sends each leaf its
//! share directly. Every party checks the dealers' public data against the
//! tree and its own shares against the public data, then sums.

use super::dkg::tagged_sid;
use super::messages::{DealerCommitMessage, DealerRevealMessage, LeafShareMessage};
use super::{check_consistency, view_digest, ThresholdShare};
use crate::access::{AccessStructure, PublicData};
use crate::commitment;
use crate::curve::{Curve, Point, Scalar};
use crate::mpc::{JobMP, PartyIndex, Transport};
use crate::zk::dl;
use crate::{Error, Result};
use rand::rngs::OsRng;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, instrument, warn};

/// Leaves must be exactly the roster; the quorum must be non-empty,
/// in range and free of repeats
fn check_setup<T: Transport>(job: &JobMP<T>, ac: &AccessStructure, quorum: &[PartyIndex]) -> Result<()> {
    let leaves: BTreeSet<String> = ac.leaf_names().into_iter().collect();
    let roster: BTreeSet<String> = job.roster().iter().cloned().collect();
    if leaves != roster {
        return Err(Error::invalid_argument(
            "eckey",
            "access structure leaves do not match the roster",
        ));
    }
    if quorum.is_empty() {
        return Err(Error::invalid_argument("eckey", "empty quorum"));
    }
    let mut seen = BTreeSet::new();
    for &i in quorum {
        if i >= job.party_count() || !seen.insert(i) {
            return Err(Error::invalid_argument("eckey", format!("bad quorum index {}", i)));
        }
    }
    Ok(())
}

fn commit_items(names: &[String], points: &[Vec<u8>]) -> Vec<Vec<u8>> {
    names
        .iter()
        .zip(points)
        .flat_map(|(n, p)| [n.as_bytes().to_vec(), p.clone()])
        .collect()
}

/// Result of one dealing round: our summed leaf share, the summed point of
/// every leaf and the summed root
struct Dealt {
    x: Scalar,
    leaf_points: BTreeMap<String, Point>,
    root: Point,
}

/// `secret = None` deals zero
async fn deal<T: Transport>(
    job: &mut JobMP<T>,
    ac: &AccessStructure,
    sid: &[u8],
    quorum: &[PartyIndex],
    secret: Option<Scalar>,
) -> Result<Dealt> {
    let curve = ac.curve();
    let me = job.role_index();
    let n = job.party_count();
    let dealing = quorum.contains(&me);

    let mut own = None;
    let mut commit_msg = None;
    let mut reveal_msg = None;
    let mut direct: Vec<Option<LeafShareMessage>> = (0..n).map(|_| None).collect();
    if dealing {
        let (a, proof) = match secret {
            Some(a) => {
                let big_a = curve.mul_generator(&a)?;
                (a, dl::prove(&big_a, &a, sid, me as u64)?)
            }
            None => (Scalar::zero(curve), Vec::new()),
        };
        let (leaves, public) = ac.share_with_public(&a, &mut OsRng)?;
        let node_names: Vec<String> = public.keys().cloned().collect();
        let node_points: Vec<Vec<u8>> = public.values().map(Point::to_bytes).collect();
        let items = commit_items(&node_names, &node_points);
        let refs: Vec<&[u8]> = items.iter().map(|i| i.as_slice()).collect();
        let (com, opening) = commitment::commit(sid, me, &refs)?;

        for (j, slot) in direct.iter_mut().enumerate() {
            let name = job.party_name(j)?;
            let share = leaves
                .get(name)
                .ok_or_else(|| Error::fatal("eckey", "no share dealt to a roster party"))?;
            if j == me {
                own = Some(*share);
            } else {
                *slot = Some(LeafShareMessage { share: share.to_bytes() });
            }
        }
        commit_msg = Some(DealerCommitMessage { commitment: com });
        reveal_msg = Some(DealerRevealMessage {
            node_names,
            node_points,
            opening,
            proof,
        });
    }

    debug!("Dealing round 1: commit to public data");
    let coms = job.exchange(&commit_msg).await?;

    debug!("Dealing round 2: reveal public data and send leaf shares");
    let (reveals, shares) = job.exchange_with_direct(&reveal_msg, &direct).await?;

    let my_name = job.my_name().to_string();
    let mut x = Scalar::zero(curve);
    let mut root = curve.identity();
    let mut leaf_points: BTreeMap<String, Point> =
        ac.leaf_names().into_iter().map(|l| (l, curve.identity())).collect();

    for d in 0..n {
        let (com, rev) = match (&coms[d], &reveals[d], quorum.contains(&d)) {
            (Some(c), Some(r), true) => (c, r),
            (None, None, false) => continue,
            _ => return Err(Error::peer("eckey", d, "dealer message does not match the quorum")),
        };
        if rev.node_names.len() != rev.node_points.len() {
            return Err(Error::peer("eckey", d, "malformed public data"));
        }
        let items = commit_items(&rev.node_names, &rev.node_points);
        let refs: Vec<&[u8]> = items.iter().map(|i| i.as_slice()).collect();
        if !commitment::verify(&com.commitment, &rev.opening, sid, d, &refs) {
            return Err(Error::peer("eckey", d, "commitment to public data does not open"));
        }

        let mut public = PublicData::new();
        for (name, bytes) in rev.node_names.iter().zip(&rev.node_points) {
            let p = Point::from_bytes(curve, bytes).map_err(|e| e.caused_by(d))?;
            public.insert(name.clone(), p);
        }
        let dealt_root = *public
            .get("")
            .ok_or_else(|| Error::peer("eckey", d, "public data without a root"))?;
        match secret {
            Some(_) => dl::verify(&dealt_root, &rev.proof, sid, d as u64).map_err(|e| e.caused_by(d))?,
            None if !dealt_root.is_identity() => {
                return Err(Error::peer("eckey", d, "refresh dealing is not a sharing of zero"));
            }
            None => {}
        }
        ac.verify_public_data(&dealt_root, &public)
            .map_err(|e| e.caused_by(d))?;

        let share = if d == me {
            own.ok_or_else(|| Error::fatal("eckey", "own dealing missing"))?
        } else {
            let msg = shares[d]
                .as_ref()
                .ok_or_else(|| Error::peer("eckey", d, "missing leaf share"))?;
            Scalar::from_bytes(curve, &msg.share).map_err(|e| e.caused_by(d))?
        };
        if let Err(e) = ac.verify_share(&dealt_root, &my_name, &share, &public) {
            warn!(dealer = d, "leaf share rejected");
            return Err(e.caused_by(d));
        }

        x = x.add(&share)?;
        root = root.add(&dealt_root)?;
        for (leaf, acc) in leaf_points.iter_mut() {
            let p = public
                .get(leaf)
                .ok_or_else(|| Error::peer("eckey", d, "public data misses a leaf"))?;
            *acc = acc.add(p)?;
        }
    }
    Ok(Dealt { x, leaf_points, root })
}

fn quorum_names<T: Transport>(job: &JobMP<T>, quorum: &[PartyIndex]) -> Result<Vec<String>> {
    quorum
        .iter()
        .map(|&i| job.party_name(i).map(str::to_string))
        .collect()
}

/// Generate a key shared over `ac`, dealt by the parties in `quorum`
///
/// An empty `quorum` means every party deals. The leaves of `ac` must be
/// the roster names.
#[instrument(skip(job, sid, ac), fields(index = job.role_index(), ac = %ac))]
pub async fn threshold_dkg<T: Transport>(
    job: &mut JobMP<T>,
    curve: Curve,
    sid: &[u8],
    ac: &AccessStructure,
    quorum: &[PartyIndex],
) -> Result<ThresholdShare> {
    if ac.curve() != curve {
        return Err(Error::invalid_argument("eckey", "access structure on another curve"));
    }
    let all: Vec<PartyIndex> = (0..job.party_count()).collect();
    let quorum = if quorum.is_empty() { &all[..] } else { quorum };
    check_setup(job, ac, quorum)?;
    let sid = tagged_sid(b"tmpc/eckey-threshold-dkg", &job.derive_sid(curve, sid));
    info!(dealers = quorum.len(), "Starting threshold DKG");

    let secret = curve.random_scalar(&mut OsRng);
    let dealt = deal(job, ac, &sid, quorum, Some(secret)).await?;
    if dealt.root.is_identity() {
        return Err(Error::protocol("eckey", "joint public key is the identity"));
    }

    debug!("Threshold DKG round 3: compare views");
    check_consistency(job, "eckey", view_digest(&dealt.root, &dealt.leaf_points)).await?;

    let share = ThresholdShare::new(
        job.my_name(),
        dealt.x,
        dealt.root,
        dealt.leaf_points,
        ac.clone(),
        quorum_names(job, quorum)?,
    )?;
    info!(public_key = hex::encode(dealt.root.to_bytes()), "Threshold DKG completed");
    Ok(share)
}

/// Re-randomise threshold shares: the quorum deals sharings of zero
#[instrument(skip(job, sid, ac, share), fields(index = job.role_index()))]
pub async fn threshold_refresh<T: Transport>(
    job: &mut JobMP<T>,
    sid: &[u8],
    ac: &AccessStructure,
    quorum: &[PartyIndex],
    share: &ThresholdShare,
) -> Result<ThresholdShare> {
    if share.access_structure() != ac {
        return Err(Error::invalid_argument("eckey", "share was made for another access structure"));
    }
    if share.party_name() != job.my_name() {
        return Err(Error::invalid_argument("eckey", "share belongs to another party"));
    }
    let all: Vec<PartyIndex> = (0..job.party_count()).collect();
    let quorum = if quorum.is_empty() { &all[..] } else { quorum };
    check_setup(job, ac, quorum)?;
    let names = quorum_names(job, quorum)?;
    if !ac.satisfies(&names) {
        return Err(Error::invalid_argument("eckey", "refresh quorum does not satisfy the access structure"));
    }
    let curve = ac.curve();
    let sid = tagged_sid(b"tmpc/eckey-threshold-refresh", &job.derive_sid(curve, sid));
    info!(dealers = quorum.len(), "Starting threshold refresh");

    let dealt = deal(job, ac, &sid, quorum, None).await?;
    let x = share.x_share().add(&dealt.x)?;
    let mut leaf_points = BTreeMap::new();
    for (leaf, p) in share.leaf_shares() {
        let delta = dealt
            .leaf_points
            .get(leaf)
            .ok_or_else(|| Error::fatal("eckey", "refresh misses a leaf"))?;
        leaf_points.insert(leaf.clone(), p.add(delta)?);
    }
    let q = *share.public_key();
    check_consistency(job, "eckey", view_digest(&q, &leaf_points)).await?;

    let refreshed = ThresholdShare::new(job.my_name(), x, q, leaf_points, ac.clone(), names)?;
    info!("Threshold refresh completed");
    Ok(refreshed)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::access::{and, leaf, threshold, AccessNode};
    use crate::mpc::MemoryTransport;
    use crate::test_utils::{roster, run_mp};
    use crate::ErrorKind;

    pub(crate) fn two_of_three(curve: Curve) -> AccessStructure {
        AccessStructure::new(
            curve,
            &threshold(2, roster(3).into_iter().map(leaf).collect()),
        )
        .unwrap()
    }

    pub(crate) async fn test_threshold_dkg(ac: AccessStructure, n: usize) -> Vec<ThresholdShare> {
        run_mp(n, move |mut job: JobMP<MemoryTransport>| {
            let ac = ac.clone();
            async move {
                let curve = ac.curve();
                threshold_dkg(&mut job, curve, b"", &ac, &[]).await.unwrap()
            }
        })
        .await
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_any_quorum_gives_same_key() {
        let curve = Curve::Secp256k1;
        let shares = test_threshold_dkg(two_of_three(curve), 3).await;
        let q = *shares[0].public_key();
        for s in &shares {
            assert_eq!(s.public_key(), &q);
            assert_eq!(s.curve().nid(), 714);
        }

        for (a, b) in [(0, 1), (0, 2), (1, 2)] {
            let quorum = [format!("party_{}", a), format!("party_{}", b)];
            let sa = shares[a].to_additive_share(&quorum).unwrap();
            let sb = shares[b].to_additive_share(&quorum).unwrap();
            let x = sa.x_share().add(sb.x_share()).unwrap();
            assert_eq!(curve.mul_generator(&x).unwrap(), q);
        }
        assert!(shares[0].to_additive_share(&["party_0"]).is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_nested_tree_with_partial_dealers() {
        let curve = Curve::P256;
        let ac = AccessStructure::new(
            curve,
            &and(vec![
                leaf("party_0"),
                AccessNode::threshold("backup", 2, vec![leaf("party_1"), leaf("party_2"), leaf("party_3")]),
            ]),
        )
        .unwrap();
        let shares = run_mp(4, move |mut job: JobMP<MemoryTransport>| {
            let ac = ac.clone();
            async move { threshold_dkg(&mut job, curve, b"nested", &ac, &[0, 2]).await.unwrap() }
        })
        .await;
        assert_eq!(shares[3].quorum().to_vec(), vec!["party_0".to_string(), "party_2".to_string()]);

        let quorum = ["party_0", "party_1", "party_3"];
        let parts: Vec<_> = [0, 1, 3]
            .iter()
            .map(|&i| shares[i].to_additive_share(&quorum).unwrap())
            .collect();
        let mut x = Scalar::zero(curve);
        for p in &parts {
            x = x.add(p.x_share()).unwrap();
        }
        assert_eq!(&curve.mul_generator(&x).unwrap(), shares[0].public_key());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_threshold_refresh() {
        let curve = Curve::Ed25519;
        let ac = two_of_three(curve);
        let shares = test_threshold_dkg(ac.clone(), 3).await;
        let before = shares.clone();
        let refreshed = run_mp(3, move |mut job: JobMP<MemoryTransport>| {
            let share = shares[job.role_index()].clone();
            let ac = ac.clone();
            async move { threshold_refresh(&mut job, b"r1", &ac, &[0, 1], &share).await.unwrap() }
        })
        .await;

        for (old, new) in before.iter().zip(&refreshed) {
            assert_eq!(old.public_key(), new.public_key());
            assert_ne!(old.x_share(), new.x_share());
        }
        let quorum = ["party_1", "party_2"];
        let a1 = refreshed[1].to_additive_share(&quorum).unwrap();
        let a2 = refreshed[2].to_additive_share(&quorum).unwrap();
        let x = a1.x_share().add(a2.x_share()).unwrap();
        assert_eq!(&curve.mul_generator(&x).unwrap(), before[0].public_key());
    }

    #[tokio::test]
    async fn test_leaves_must_match_roster() {
        let ac = two_of_three(Curve::Secp256k1);
        let errors = run_mp(2, move |mut job: JobMP<MemoryTransport>| {
            let ac = ac.clone();
            async move {
                threshold_dkg(&mut job, Curve::Secp256k1, b"", &ac, &[])
                    .await
                    .unwrap_err()
            }
        })
        .await;
        assert!(errors.iter().all(|e| e.kind() == ErrorKind::InvalidArgument));
    }
}
