use crate::commitment::Opening;
use crate::mpc::wire::{serde_hex, serde_hex_vec};
use serde::{Deserialize, Serialize};

/// Round 1 broadcast: session-id contribution, message digest and a
/// commitment to `Γ_i`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignStartMessage {
    #[serde(with = "serde_hex")]
    pub sid_contribution: Vec<u8>,
    #[serde(with = "serde_hex")]
    pub message_digest: Vec<u8>,
    #[serde(with = "serde_hex")]
    pub commitment: Vec<u8>,
}

/// Base-OT sender's point `Y`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseOtOfferMessage {
    #[serde(with = "serde_hex")]
    pub point: Vec<u8>,
}

/// Base-OT receiver's points `X_i`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseOtChoiceMessage {
    #[serde(with = "serde_hex_vec")]
    pub points: Vec<Vec<u8>>,
}

/// OT extension matrix `u`, one column per base OT
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtExtendMessage {
    #[serde(with = "serde_hex_vec")]
    pub columns: Vec<Vec<u8>>,
}

/// MtA corrections, concatenated scalars
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MtaMessage {
    #[serde(with = "serde_hex")]
    pub corrections: Vec<u8>,
}

/// Round 5 broadcast: opening of `Γ_i` and the share `δ_i` of `k·γ`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignRevealMessage {
    #[serde(with = "serde_hex")]
    pub gamma_point: Vec<u8>,
    #[serde(with = "serde_hex")]
    pub proof: Vec<u8>,
    pub opening: Opening,
    #[serde(with = "serde_hex")]
    pub delta: Vec<u8>,
}

/// Partial signature `s_i` for the receiver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialSignatureMessage {
    #[serde(with = "serde_hex")]
    pub s: Vec<u8>,
}
