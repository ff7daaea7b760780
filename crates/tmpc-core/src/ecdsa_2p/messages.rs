//! Two-party ECDSA message types

use super::proof::AffineProof;
use crate::commitment::Opening;
use crate::paillier::{EncDlProof, ValidKeyProof};
use libpaillier::unknown_order::BigNumber;
use serde::{Deserialize, Serialize};

/// DKG round 1 (P1 → P2): commitment to `X1`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DkgCommitMessage {
    #[serde(with = "crate::mpc::wire::serde_hex")]
    pub commitment: Vec<u8>,
}

/// DKG round 2 (P2 → P1): `X2`, P2's session-id contribution and its proof
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DkgP2Message {
    #[serde(with = "crate::mpc::wire::serde_hex")]
    pub public_share: Vec<u8>,
    #[serde(with = "crate::mpc::wire::serde_hex")]
    pub sid_contribution: Vec<u8>,
    #[serde(with = "crate::mpc::wire::serde_hex")]
    pub proof: Vec<u8>,
}

/// DKG round 3 (P1 → P2): opening of `X1`, its proof, and the Paillier
/// key with `c_key = Enc(x1)`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DkgP1Message {
    #[serde(with = "crate::mpc::wire::serde_hex")]
    pub public_share: Vec<u8>,
    pub opening: Opening,
    #[serde(with = "crate::mpc::wire::serde_hex")]
    pub proof: Vec<u8>,
    #[serde(with = "crate::paillier::serde_bn")]
    pub paillier_n: BigNumber,
    #[serde(with = "crate::paillier::serde_bn")]
    pub c_key: BigNumber,
    pub key_proof: ValidKeyProof,
    pub c_key_proof: EncDlProof,
}

/// Refresh round 1 (P1 → P2)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshCommitMessage {
    #[serde(with = "crate::mpc::wire::serde_hex")]
    pub commitment: Vec<u8>,
}

/// Refresh round 2 (P2 → P1)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshP2Message {
    #[serde(with = "crate::mpc::wire::serde_hex")]
    pub delta: Vec<u8>,
}

/// Refresh round 3 (P1 → P2): P1's offset and the re-encrypted share
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshP1Message {
    #[serde(with = "crate::mpc::wire::serde_hex")]
    pub delta: Vec<u8>,
    pub opening: Opening,
    #[serde(with = "crate::paillier::serde_bn")]
    pub c_key: BigNumber,
    pub c_key_proof: EncDlProof,
}

/// Sign round 1 (P1 → P2): commitment to P1's nonce points and proofs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignCommitMessage {
    #[serde(with = "crate::mpc::wire::serde_hex")]
    pub commitment: Vec<u8>,
}

/// Sign round 2 (P2 → P1): one `R2 = k2·G` and proof per message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignP2NonceMessage {
    #[serde(with = "crate::mpc::wire::serde_hex_vec")]
    pub nonces: Vec<Vec<u8>>,
    #[serde(with = "crate::mpc::wire::serde_hex_vec")]
    pub proofs: Vec<Vec<u8>>,
}

/// Sign round 3 (P1 → P2): opening of round 1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignP1NonceMessage {
    #[serde(with = "crate::mpc::wire::serde_hex_vec")]
    pub nonces: Vec<Vec<u8>>,
    #[serde(with = "crate::mpc::wire::serde_hex_vec")]
    pub proofs: Vec<Vec<u8>>,
    pub opening: Opening,
}

/// Sign round 4 (P2 → P1): one ciphertext of the partial `s` per message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignCiphertextMessage {
    #[serde(with = "crate::paillier::serde_bn_vec")]
    pub ciphertexts: Vec<BigNumber>,
    pub proofs: Vec<AffineProof>,
}
