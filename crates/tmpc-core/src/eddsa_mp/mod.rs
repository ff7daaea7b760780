//! N-party EdDSA over additive shares of an Ed25519 key

mod messages;
mod sign;

pub use messages::*;
pub use sign::sign;

use crate::access::AccessStructure;
use crate::curve::Curve;
use crate::eckey::{self, KeyShareMP, ThresholdShare};
use crate::mpc::{JobMP, PartyIndex, Transport};
use crate::{Error, Result};

fn check_curve(curve: Curve) -> Result<()> {
    if curve != Curve::Ed25519 {
        return Err(Error::invalid_argument(
            "eddsa-mp",
            format!("EdDSA needs Ed25519, not {}", curve),
        ));
    }
    Ok(())
}

pub async fn dkg<T: Transport>(job: &mut JobMP<T>, curve: Curve) -> Result<KeyShareMP> {
    check_curve(curve)?;
    eckey::dkg(job, curve, &[]).await
}

pub async fn refresh<T: Transport>(
    job: &mut JobMP<T>,
    share: &KeyShareMP,
    sid: &[u8],
) -> Result<KeyShareMP> {
    check_curve(share.curve())?;
    eckey::refresh(job, share, sid).await
}

pub async fn threshold_dkg<T: Transport>(
    job: &mut JobMP<T>,
    curve: Curve,
    sid: &[u8],
    ac: &AccessStructure,
    quorum: &[PartyIndex],
) -> Result<ThresholdShare> {
    check_curve(curve)?;
    eckey::threshold_dkg(job, curve, sid, ac, quorum).await
}

pub fn to_additive_share<S: AsRef<str>>(share: &ThresholdShare, quorum: &[S]) -> Result<KeyShareMP> {
    check_curve(share.curve())?;
    share.to_additive_share(quorum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpc::MemoryTransport;
    use crate::signature::verify_eddsa;
    use crate::test_utils::run_mp;
    use crate::ErrorKind;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dkg_refresh_sign() {
        let out = run_mp(3, |mut job: JobMP<MemoryTransport>| async move {
            let share = dkg(&mut job, Curve::Ed25519).await.unwrap();
            let fresh = refresh(&mut job, &share, b"refresh-1").await.unwrap();
            assert_eq!(fresh.public_key(), share.public_key());
            assert_ne!(fresh.x_share(), share.x_share());
            let sig = sign(&mut job, &fresh, b"after refresh", 1).await.unwrap();
            (*share.public_key(), sig)
        })
        .await;
        let (q, sig) = &out[1];
        verify_eddsa(q, b"after refresh", sig).unwrap();
        assert!(out[0].1.is_empty() && out[2].1.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dkg_rejects_weierstrass_curve() {
        let errors = run_mp(2, |mut job: JobMP<MemoryTransport>| async move {
            dkg(&mut job, Curve::P256).await.unwrap_err()
        })
        .await;
        assert!(errors.iter().all(|e| e.kind() == ErrorKind::InvalidArgument));
    }
}
