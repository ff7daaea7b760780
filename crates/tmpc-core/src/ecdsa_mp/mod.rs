//! N-party ECDSA over additive shares
//!
//! Key generation and refresh are the generic ones from [`crate::eckey`]
//! restricted to Weierstrass curves. Signing multiplies the shared nonce and
//! key through pairwise OT-based MtA; the pairing of OT roles is fixed by an
//! [`OtRoleMap`].

mod messages;
mod sign;

pub use messages::*;
pub use sign::{sign, sign_with_ot_roles};

use crate::access::AccessStructure;
use crate::curve::Curve;
use crate::eckey::{self, KeyShareMP, ThresholdShare};
use crate::mpc::{JobMP, PartyIndex, Transport};
use crate::{Error, Result};

pub const NO_ROLE: i32 = -1;
pub const SENDER: i32 = 0;
pub const RECEIVER: i32 = 1;

fn check_curve(curve: Curve) -> Result<()> {
    if !curve.is_weierstrass() {
        return Err(Error::invalid_argument(
            "ecdsa-mp",
            format!("ECDSA is not defined over {}", curve),
        ));
    }
    Ok(())
}

/// Who sends and who receives in the OT between each pair of parties
///
/// Cell `(i, j)` is party `i`'s role towards party `j`. The diagonal is
/// [`NO_ROLE`] and every off-diagonal pair holds one [`SENDER`] and one
/// [`RECEIVER`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtRoleMap {
    n: usize,
    cells: Vec<i32>,
}

impl OtRoleMap {
    /// The lower index sends
    pub fn default_for(n: usize) -> Self {
        let mut cells = vec![NO_ROLE; n * n];
        for i in 0..n {
            for j in 0..n {
                if i < j {
                    cells[i * n + j] = SENDER;
                } else if i > j {
                    cells[i * n + j] = RECEIVER;
                }
            }
        }
        Self { n, cells }
    }

    pub fn new(rows: Vec<Vec<i32>>) -> Result<Self> {
        let n = rows.len();
        if n < 2 {
            return Err(Error::invalid_argument("ecdsa-mp", "role map needs two parties"));
        }
        if rows.iter().any(|r| r.len() != n) {
            return Err(Error::invalid_argument("ecdsa-mp", "role map is not square"));
        }
        let map = Self {
            n,
            cells: rows.into_iter().flatten().collect(),
        };
        for i in 0..n {
            if map.role(i, i) != NO_ROLE {
                return Err(Error::invalid_argument("ecdsa-mp", "role map diagonal must be -1"));
            }
            for j in i + 1..n {
                match (map.role(i, j), map.role(j, i)) {
                    (SENDER, RECEIVER) | (RECEIVER, SENDER) => {}
                    _ => {
                        return Err(Error::invalid_argument(
                            "ecdsa-mp",
                            format!("parties {} and {} need one sender and one receiver", i, j),
                        ))
                    }
                }
            }
        }
        Ok(map)
    }

    pub fn parties(&self) -> usize {
        self.n
    }

    pub fn role(&self, i: PartyIndex, j: PartyIndex) -> i32 {
        self.cells[i * self.n + j]
    }

    pub fn is_sender(&self, i: PartyIndex, j: PartyIndex) -> bool {
        self.role(i, j) == SENDER
    }

    pub fn rows(&self) -> Vec<Vec<i32>> {
        self.cells.chunks(self.n).map(<[i32]>::to_vec).collect()
    }

    /// `N` records of `4·N` bytes, one little-endian `i32` per cell
    pub fn to_wire(&self) -> Vec<Vec<u8>> {
        self.cells
            .chunks(self.n)
            .map(|row| row.iter().flat_map(|c| c.to_le_bytes()).collect())
            .collect()
    }

    pub fn from_wire(records: &[Vec<u8>]) -> Result<Self> {
        let n = records.len();
        let rows = records
            .iter()
            .map(|rec| {
                if rec.len() != 4 * n {
                    return Err(Error::invalid_argument("ecdsa-mp", "role map record of wrong length"));
                }
                Ok(rec
                    .chunks_exact(4)
                    .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect())
            })
            .collect::<Result<Vec<Vec<i32>>>>()?;
        Self::new(rows)
    }
}

/// Additive N-party ECDSA key generation
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

/// Key generation over an access structure; see [`eckey::threshold_dkg`]
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

/// Additive share of `share` for the parties named in `quorum`
pub fn to_additive_share<S: AsRef<str>>(share: &ThresholdShare, quorum: &[S]) -> Result<KeyShareMP> {
    check_curve(share.curve())?;
    share.to_additive_share(quorum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_default_role_map() {
        let map = OtRoleMap::default_for(3);
        assert_eq!(
            map.rows(),
            vec![vec![-1, 0, 0], vec![1, -1, 0], vec![1, 1, -1]]
        );
        assert!(map.is_sender(0, 2));
        assert!(!map.is_sender(2, 0));
        assert_eq!(OtRoleMap::new(map.rows()).unwrap(), map);
    }

    #[test]
    fn test_role_map_wire_format() {
        let map = OtRoleMap::new(vec![vec![-1, 1], vec![0, -1]]).unwrap();
        let wire = map.to_wire();
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0], vec![0xff, 0xff, 0xff, 0xff, 1, 0, 0, 0]);
        assert_eq!(wire[1], vec![0, 0, 0, 0, 0xff, 0xff, 0xff, 0xff]);
        assert_eq!(OtRoleMap::from_wire(&wire).unwrap(), map);
    }

    #[test]
    fn test_role_map_must_be_tournament() {
        for rows in [
            vec![vec![-1, 0], vec![0, -1]],
            vec![vec![0, 0], vec![1, -1]],
            vec![vec![-1, 0, 1], vec![1, -1]],
            vec![vec![-1]],
        ] {
            let err = OtRoleMap::new(rows).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
        let short = vec![vec![0xff; 8], vec![0; 7]];
        assert!(OtRoleMap::from_wire(&short).is_err());
    }
}
