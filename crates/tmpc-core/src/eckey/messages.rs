use crate::commitment::Opening;
use crate::mpc::wire::{serde_hex, serde_hex_vec};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyCommitMessage {
    #[serde(with = "serde_hex")]
    pub commitment: Vec<u8>,
}

/// Reveal of `Q_i` with its proof of knowledge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyRevealMessage {
    #[serde(with = "serde_hex")]
    pub public_share: Vec<u8>,
    pub opening: Opening,
    #[serde(with = "serde_hex")]
    pub proof: Vec<u8>,
}

/// Pairwise refresh contribution, sent directly
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairCommitMessage {
    #[serde(with = "serde_hex")]
    pub commitment: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairOpenMessage {
    #[serde(with = "serde_hex")]
    pub contribution: Vec<u8>,
    pub opening: Opening,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicShareMessage {
    #[serde(with = "serde_hex")]
    pub public_share: Vec<u8>,
    #[serde(with = "serde_hex")]
    pub proof: Vec<u8>,
}

/// A dealer's public data for one sharing over the access structure:
/// node names and points, plus a proof for the root when it is not a
/// sharing of zero
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealerCommitMessage {
    #[serde(with = "serde_hex")]
    pub commitment: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealerRevealMessage {
    pub node_names: Vec<String>,
    #[serde(with = "serde_hex_vec")]
    pub node_points: Vec<Vec<u8>>,
    pub opening: Opening,
    #[serde(with = "serde_hex")]
    pub proof: Vec<u8>,
}

/// Leaf share sent privately by a dealer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeafShareMessage {
    #[serde(with = "serde_hex")]
    pub share: Vec<u8>,
}
