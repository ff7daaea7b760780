use crate::commitment::Opening;
use crate::mpc::wire::serde_hex;
use serde::{Deserialize, Serialize};

/// Round 1 broadcast: message digest and a commitment to `R_i`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NonceCommitMessage {
    #[serde(with = "serde_hex")]
    pub message_digest: Vec<u8>,
    #[serde(with = "serde_hex")]
    pub commitment: Vec<u8>,
}

/// Round 2 broadcast: `R_i` with its opening and a proof of knowledge of `k_i`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NonceRevealMessage {
    #[serde(with = "serde_hex")]
    pub nonce_point: Vec<u8>,
    #[serde(with = "serde_hex")]
    pub proof: Vec<u8>,
    pub opening: Opening,
}

/// Partial signature `s_i = k_i + e·x_i` for the receiver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchnorrPartialMessage {
    #[serde(with = "serde_hex")]
    pub s: Vec<u8>,
}
