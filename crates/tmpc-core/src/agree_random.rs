//! Jointly chosen random strings
//!
//! Every contributor commits to its random bytes before seeing anyone
//! else's, so the XOR of all contributions is uniform as long as one party
//! is honest.

use crate::commitment::{self, Opening};
use crate::mpc::wire::serde_hex;
use crate::mpc::{Job2P, JobMP, Role, Transport};
use crate::{Error, Result};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

const SID: &[u8] = b"tmpc/agree-random";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomCommitMessage {
    #[serde(with = "serde_hex")]
    pub commitment: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomOpenMessage {
    #[serde(with = "serde_hex")]
    pub value: Vec<u8>,
    pub opening: Option<Opening>,
}

fn random_bytes(bits: usize) -> Result<Vec<u8>> {
    if bits == 0 {
        return Err(Error::invalid_argument("agree-random", "bit length must be positive"));
    }
    let mut out = vec![0u8; (bits + 7) / 8];
    OsRng.fill_bytes(&mut out);
    Ok(out)
}

/// Clear the bits past `bits` in the last byte
fn truncate(mut bytes: Vec<u8>, bits: usize) -> Vec<u8> {
    let extra = bytes.len() * 8 - bits;
    if let Some(last) = bytes.last_mut() {
        *last &= 0xffu8 >> extra;
    }
    bytes
}

fn xor_into(acc: &mut [u8], other: &[u8]) {
    for (a, b) in acc.iter_mut().zip(other) {
        *a ^= b;
    }
}

/// Common random string of `bits` bits between the two parties of `job`
#[instrument(skip(job), fields(role = ?job.role()))]
pub async fn two_party<T: Transport>(job: &mut Job2P<T>, bits: usize) -> Result<Vec<u8>> {
    let mine = random_bytes(bits)?;
    let len = mine.len();
    let peer = job.peer_index();

    let mut out = match job.role() {
        Role::P1 => {
            let (com, opening) = commitment::commit(SID, 0, &[&mine[..]])?;
            job.send_msg(&RandomCommitMessage { commitment: com }).await?;
            let theirs: RandomOpenMessage = job.recv_msg().await?;
            if theirs.value.len() != len {
                return Err(Error::peer("agree-random", peer, "contribution of wrong length"));
            }
            job.send_msg(&RandomOpenMessage {
                value: mine.clone(),
                opening: Some(opening),
            })
            .await?;
            theirs.value
        }
        Role::P2 => {
            let com: RandomCommitMessage = job.recv_msg().await?;
            job.send_msg(&RandomOpenMessage {
                value: mine.clone(),
                opening: None,
            })
            .await?;
            let theirs: RandomOpenMessage = job.recv_msg().await?;
            let opens = theirs.opening.as_ref().map_or(false, |o| {
                commitment::verify(&com.commitment, o, SID, 0, &[&theirs.value[..]])
            });
            if !opens {
                return Err(Error::peer("agree-random", peer, "commitment does not open"));
            }
            theirs.value
        }
    };
    xor_into(&mut out, &mine);
    debug!(bits, "agreed on random string");
    Ok(truncate(out, bits))
}

/// Common random string of `bits` bits among all parties of `job`
#[instrument(skip(job), fields(index = job.role_index()))]
pub async fn multi_party<T: Transport>(job: &mut JobMP<T>, bits: usize) -> Result<Vec<u8>> {
    let mine = random_bytes(bits)?;
    let me = job.role_index();

    let (com, opening) = commitment::commit(SID, me, &[&mine[..]])?;
    let coms = job
        .exchange(&RandomCommitMessage { commitment: com })
        .await?;
    let opens = job
        .exchange(&RandomOpenMessage {
            value: mine.clone(),
            opening: Some(opening),
        })
        .await?;

    let mut out = vec![0u8; mine.len()];
    for (j, (c, o)) in coms.iter().zip(&opens).enumerate() {
        let valid = o.value.len() == mine.len()
            && o.opening.as_ref().map_or(false, |op| {
                commitment::verify(&c.commitment, op, SID, j, &[&o.value[..]])
            });
        if !valid {
            return Err(Error::peer("agree-random", j, "commitment does not open"));
        }
        xor_into(&mut out, &o.value);
    }
    debug!(bits, "agreed on random string");
    Ok(truncate(out, bits))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpc::MemoryTransport;
    use crate::test_utils::{run_2p, run_mp};
    use crate::ErrorKind;

    #[tokio::test]
    async fn test_two_party_agree() {
        let out = run_2p(|mut job: Job2P<MemoryTransport>| async move {
            two_party(&mut job, 250).await.unwrap()
        })
        .await;
        assert_eq!(out[0], out[1]);
        assert_eq!(out[0].len(), 32);
        assert_eq!(out[0][31] & 0xfc, 0);
    }

    #[tokio::test]
    async fn test_multi_party_agree() {
        let out = run_mp(4, |mut job: JobMP<MemoryTransport>| async move {
            multi_party(&mut job, 128).await.unwrap()
        })
        .await;
        assert!(out.iter().all(|o| *o == out[0]));
        assert_eq!(out[0].len(), 16);
        assert_ne!(out[0], vec![0u8; 16]);
    }

    #[tokio::test]
    async fn test_zero_bits_rejected() {
        let out = run_2p(|mut job: Job2P<MemoryTransport>| async move {
            two_party(&mut job, 0).await.unwrap_err()
        })
        .await;
        assert_eq!(out[0].kind(), ErrorKind::InvalidArgument);
    }
}
