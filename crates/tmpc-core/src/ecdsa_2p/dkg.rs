//! Two-party ECDSA key generation

use super::messages::{DkgCommitMessage, DkgP1Message, DkgP2Message};
use super::{check_curve, dl_aux, PaillierKey, Share};
use crate::commitment;
use crate::curve::{Curve, Point};
use crate::mpc::{Job2P, Role, Transport};
use crate::paillier::{
    bn_from_scalar, EncDlProof, PaillierPrivateKey, PaillierPublicKey, ValidKeyProof,
};
use crate::params::SID_BYTES;
use crate::zk::{dl, HashTranscript};
use crate::{Error, Result};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{debug, info, instrument};

/// Final session id: P1 commits before seeing P2's contribution
fn session_id(base: &[u8], commitment: &[u8], contribution: &[u8]) -> Vec<u8> {
    let mut t = HashTranscript::new(b"tmpc/ecdsa-2p-dkg");
    t.append(base).append(commitment).append(contribution);
    t.finish().to_vec()
}

async fn generate_paillier() -> Result<PaillierPrivateKey> {
    tokio::task::spawn_blocking(PaillierPrivateKey::generate)
        .await
        .map_err(|e| Error::fatal("ecdsa-2p", format!("Paillier key generation task: {}", e)))?
}

/// Run two-party ECDSA key generation
///
/// Both parties end with the same public key `Q = X1 + X2`. P1 generates a
/// fresh Paillier key and hands P2 an encryption of `x1`.
#[instrument(skip(job), fields(role = ?job.role()))]
pub async fn dkg<T: Transport>(job: &mut Job2P<T>, curve: Curve) -> Result<Share> {
    dkg_with_paillier(job, curve, None).await
}

/// DKG with an optional pre-generated Paillier key for P1
pub(crate) async fn dkg_with_paillier<T: Transport>(
    job: &mut Job2P<T>,
    curve: Curve,
    paillier: Option<PaillierPrivateKey>,
) -> Result<Share> {
    check_curve(curve)?;
    info!(curve = %curve, "Starting 2P-ECDSA DKG");

    let base_sid = job.derive_sid(curve, &[]);
    let x = curve.random_scalar(&mut OsRng);
    let big_x = curve.mul_generator(&x)?;
    let peer = job.peer_index();

    let share = match job.role() {
        Role::P1 => {
            let sk = match paillier {
                Some(sk) => sk,
                None => generate_paillier().await?,
            };

            debug!("DKG round 1: commit to X1");
            let (com, opening) = commitment::commit(&base_sid, 0, &[&big_x.to_bytes()[..]])?;
            job.send_msg(&DkgCommitMessage {
                commitment: com.clone(),
            })
            .await?;

            debug!("DKG round 2: receive X2");
            let msg: DkgP2Message = job.recv_msg().await?;
            if msg.sid_contribution.len() != SID_BYTES {
                return Err(Error::peer("ecdsa-2p", peer, "bad session-id contribution"));
            }
            let sid = session_id(&base_sid, &com, &msg.sid_contribution);
            let x2 = Point::from_bytes(curve, &msg.public_share).map_err(|e| e.caused_by(peer))?;
            dl::verify(&x2, &msg.proof, &sid, dl_aux(Role::P2, 0)).map_err(|e| e.caused_by(peer))?;

            let q = big_x.add(&x2)?;
            if q.is_identity() {
                return Err(Error::peer("ecdsa-2p", peer, "joint public key is the identity"));
            }

            debug!("DKG round 3: open X1, send Paillier key and c_key");
            let pk = sk.public().clone();
            let (c_key, r) = pk.encrypt(&bn_from_scalar(&x));
            let msg = DkgP1Message {
                public_share: big_x.to_bytes(),
                opening,
                proof: dl::prove(&big_x, &x, &sid, dl_aux(Role::P1, 0))?,
                paillier_n: pk.n().clone(),
                c_key: c_key.clone(),
                key_proof: ValidKeyProof::prove(&sk, &sid),
                c_key_proof: EncDlProof::prove(&pk, &c_key, &r, &x, &big_x, &sid, dl_aux(Role::P1, 1))?,
            };
            job.send_msg(&msg).await?;

            Share::new(Role::P1, x, q, PaillierKey::Private(sk), c_key)?
        }
        Role::P2 => {
            debug!("DKG round 1: receive commitment");
            let com: DkgCommitMessage = job.recv_msg().await?;

            debug!("DKG round 2: send X2");
            let mut contribution = vec![0u8; SID_BYTES];
            OsRng.fill_bytes(&mut contribution);
            let sid = session_id(&base_sid, &com.commitment, &contribution);
            job.send_msg(&DkgP2Message {
                public_share: big_x.to_bytes(),
                sid_contribution: contribution,
                proof: dl::prove(&big_x, &x, &sid, dl_aux(Role::P2, 0))?,
            })
            .await?;

            debug!("DKG round 3: verify X1 and the Paillier key");
            let msg: DkgP1Message = job.recv_msg().await?;
            if !commitment::verify(&com.commitment, &msg.opening, &base_sid, 0, &[&msg.public_share[..]]) {
                return Err(Error::peer("ecdsa-2p", peer, "commitment to X1 does not open"));
            }
            let x1 = Point::from_bytes(curve, &msg.public_share).map_err(|e| e.caused_by(peer))?;
            dl::verify(&x1, &msg.proof, &sid, dl_aux(Role::P1, 0)).map_err(|e| e.caused_by(peer))?;

            let pk = PaillierPublicKey::from_modulus(msg.paillier_n).map_err(|e| e.caused_by(peer))?;
            msg.key_proof.verify(&pk, &sid).map_err(|e| e.caused_by(peer))?;
            msg.c_key_proof
                .verify(&pk, &msg.c_key, &x1, &sid, dl_aux(Role::P1, 1))
                .map_err(|e| e.caused_by(peer))?;

            let q = x1.add(&big_x)?;
            if q.is_identity() {
                return Err(Error::peer("ecdsa-2p", peer, "joint public key is the identity"));
            }
            Share::new(Role::P2, x, q, PaillierKey::Public(pk), msg.c_key)?
        }
    };

    info!(
        public_key = hex::encode(share.public_key().to_bytes()),
        "2P-ECDSA DKG completed"
    );
    Ok(share)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecdsa_2p::tests::test_dkg;
    use crate::mpc::{MemoryNetwork, MemoryTransport};
    use crate::paillier::tests::test_key;
    use crate::test_utils::run_2p;
    use crate::ErrorKind;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dkg_shares_sum_to_public_key() {
        for curve in [Curve::Secp256k1, Curve::P256] {
            let shares = test_dkg(curve).await;
            assert_eq!(shares[0].role(), Role::P1);
            assert_eq!(shares[1].role(), Role::P2);
            assert_eq!(shares[0].public_key(), shares[1].public_key());

            let x = shares[0].x_share().add(shares[1].x_share()).unwrap();
            assert_eq!(&curve.mul_generator(&x).unwrap(), shares[0].public_key());
            assert_eq!(shares[0].c_key(), shares[1].c_key());
            assert!(shares[0].paillier().public() == shares[1].paillier().public());
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dkg_generates_paillier_key() {
        let shares = run_2p(|mut job: Job2P<MemoryTransport>| async move {
            dkg(&mut job, Curve::Secp256k1).await.unwrap()
        })
        .await;
        assert!(shares[0].paillier().private().is_some());
        assert!(shares[1].paillier().private().is_none());
        assert_eq!(shares[0].public_key(), shares[1].public_key());
    }

    #[tokio::test]
    async fn test_dkg_rejects_ed25519() {
        let net = MemoryNetwork::new(2);
        let mut job = Job2P::new(net.endpoint(0), Role::P1, "party_0", "party_1").unwrap();
        let err = dkg(&mut job, Curve::Ed25519).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_p2_rejects_tampered_opening() {
        let net = MemoryNetwork::new(2);
        let p1 = net.endpoint(0);
        let p2 = tokio::spawn({
            let ep = net.endpoint(1);
            async move {
                let mut job = Job2P::new(ep, Role::P2, "party_0", "party_1").unwrap();
                dkg_with_paillier(&mut job, Curve::Secp256k1, None).await
            }
        });

        // A P1 that opens to a different X1 than it committed to
        let mut job = Job2P::new(p1, Role::P1, "party_0", "party_1").unwrap();
        let curve = Curve::Secp256k1;
        let base_sid = job.derive_sid(curve, &[]);
        let x = curve.random_scalar(&mut OsRng);
        let big_x = curve.mul_generator(&x).unwrap();
        let (com, opening) = commitment::commit(&base_sid, 0, &[&big_x.to_bytes()[..]]).unwrap();
        job.send_msg(&DkgCommitMessage { commitment: com.clone() }).await.unwrap();
        let reply: DkgP2Message = job.recv_msg().await.unwrap();
        let sid = session_id(&base_sid, &com, &reply.sid_contribution);

        let other = curve.random_scalar(&mut OsRng);
        let other_x = curve.mul_generator(&other).unwrap();
        let sk = test_key().clone();
        let pk = sk.public().clone();
        let (c_key, r) = pk.encrypt(&bn_from_scalar(&other));
        let msg = DkgP1Message {
            public_share: other_x.to_bytes(),
            opening,
            proof: dl::prove(&other_x, &other, &sid, dl_aux(Role::P1, 0)).unwrap(),
            paillier_n: pk.n().clone(),
            c_key: c_key.clone(),
            key_proof: ValidKeyProof::prove(&sk, &sid),
            c_key_proof: EncDlProof::prove(&pk, &c_key, &r, &other, &other_x, &sid, dl_aux(Role::P1, 1))
                .unwrap(),
        };
        job.send_msg(&msg).await.unwrap();

        let err = p2.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(err.peer_index(), Some(0));
    }
}
