//! Two-party ECDSA share refresh

use super::messages::{RefreshCommitMessage, RefreshP1Message, RefreshP2Message};
use super::{dl_aux, PaillierKey, Share};
use crate::commitment;
use crate::curve::Scalar;
use crate::mpc::{Job2P, Role, Transport};
use crate::paillier::{bn_from_scalar, EncDlProof};
use crate::{Error, Result};
use rand::rngs::OsRng;
use tracing::{debug, info, instrument};

/// Re-randomise both shares by a jointly chosen `δ`
///
/// `x1' = x1 + δ`, `x2' = x2 − δ`; `Q` is unchanged. P1 re-encrypts its new
/// share under the same Paillier key and proves the new `c_key` matches
/// `X1' = Q − x2'·G`.
#[instrument(skip_all, fields(role = ?job.role()))]
pub async fn refresh<T: Transport>(job: &mut Job2P<T>, share: &Share, sid: &[u8]) -> Result<Share> {
    if share.role() != job.role() {
        return Err(Error::invalid_argument("ecdsa-2p", "share role does not match job role"));
    }
    let curve = share.curve();
    let sid = job.derive_sid(curve, sid);
    let peer = job.peer_index();
    info!("Starting 2P-ECDSA refresh");

    let my_delta = curve.random_scalar(&mut OsRng);
    let refreshed = match job.role() {
        Role::P1 => {
            debug!("Refresh round 1: commit to δ1");
            let delta_bytes = my_delta.to_bytes();
            let (com, opening) = commitment::commit(&sid, 0, &[&delta_bytes[..]])?;
            job.send_msg(&RefreshCommitMessage { commitment: com }).await?;

            debug!("Refresh round 2: receive δ2");
            let msg: RefreshP2Message = job.recv_msg().await?;
            let peer_delta = Scalar::from_bytes(curve, &msg.delta).map_err(|e| e.caused_by(peer))?;
            let delta = my_delta.add(&peer_delta)?;
            let x1 = share.x_share().add(&delta)?;
            if x1.is_zero() {
                return Err(Error::protocol("ecdsa-2p", "refreshed share is zero"));
            }

            debug!("Refresh round 3: open δ1 and re-encrypt x1'");
            let pk = share.paillier().public().clone();
            let big_x1 = curve.mul_generator(&x1)?;
            let (c_key, r) = pk.encrypt(&bn_from_scalar(&x1));
            let proof = EncDlProof::prove(&pk, &c_key, &r, &x1, &big_x1, &sid, dl_aux(Role::P1, 1))?;
            job.send_msg(&RefreshP1Message {
                delta: delta_bytes,
                opening,
                c_key: c_key.clone(),
                c_key_proof: proof,
            })
            .await?;

            Share::new(
                Role::P1,
                x1,
                *share.public_key(),
                share.paillier().clone(),
                c_key,
            )?
        }
        Role::P2 => {
            debug!("Refresh round 1: receive commitment");
            let com: RefreshCommitMessage = job.recv_msg().await?;

            debug!("Refresh round 2: send δ2");
            job.send_msg(&RefreshP2Message {
                delta: my_delta.to_bytes(),
            })
            .await?;

            debug!("Refresh round 3: verify δ1 and the new c_key");
            let msg: RefreshP1Message = job.recv_msg().await?;
            if !commitment::verify(&com.commitment, &msg.opening, &sid, 0, &[&msg.delta[..]]) {
                return Err(Error::peer("ecdsa-2p", peer, "commitment to δ1 does not open"));
            }
            let peer_delta = Scalar::from_bytes(curve, &msg.delta).map_err(|e| e.caused_by(peer))?;
            let delta = peer_delta.add(&my_delta)?;
            let x2 = share.x_share().sub(&delta)?;
            if x2.is_zero() {
                return Err(Error::protocol("ecdsa-2p", "refreshed share is zero"));
            }

            let big_x1 = share.public_key().sub(&curve.mul_generator(&x2)?)?;
            let pk = share.paillier().public();
            msg.c_key_proof
                .verify(pk, &msg.c_key, &big_x1, &sid, dl_aux(Role::P1, 1))
                .map_err(|e| e.caused_by(peer))?;

            Share::new(
                Role::P2,
                x2,
                *share.public_key(),
                PaillierKey::Public(pk.clone()),
                msg.c_key,
            )?
        }
    };

    info!("2P-ECDSA refresh completed");
    Ok(refreshed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::Curve;
    use crate::ecdsa_2p::tests::test_dkg;
    use crate::mpc::MemoryTransport;
    use crate::test_utils::run_2p;
    use crate::ErrorKind;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_refresh_preserves_key() {
        let shares = test_dkg(Curve::Secp256k1).await;
        let before = shares.clone();
        let refreshed = run_2p(move |mut job: Job2P<MemoryTransport>| {
            let share = shares[job.role_index()].clone();
            async move { refresh(&mut job, &share, b"refresh-1").await.unwrap() }
        })
        .await;

        assert_eq!(refreshed[0].public_key(), before[0].public_key());
        assert_eq!(refreshed[1].public_key(), before[1].public_key());
        assert_ne!(refreshed[0].x_share(), before[0].x_share());
        assert_ne!(refreshed[1].x_share(), before[1].x_share());
        assert_ne!(refreshed[0].c_key(), before[0].c_key());
        assert_eq!(refreshed[0].c_key(), refreshed[1].c_key());

        let sum_before = before[0].x_share().add(before[1].x_share()).unwrap();
        let sum_after = refreshed[0].x_share().add(refreshed[1].x_share()).unwrap();
        assert_eq!(sum_before, sum_after);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_refresh_rejects_role_mismatch() {
        let shares = test_dkg(Curve::P256).await;
        let errors = run_2p(move |mut job: Job2P<MemoryTransport>| {
            // hand each party the other's share
            let share = shares[1 - job.role_index()].clone();
            async move { refresh(&mut job, &share, b"").await.unwrap_err() }
        })
        .await;
        for err in errors {
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
    }
}
