//! Oblivious transfer primitives
//!
//! These are message-free state machines; the N-party signing rounds carry
//! their messages:
//! - `base_ot`: Chou-Orlandi base OT
//! - `extension`: IKNP extension of `KAPPA` base OTs
//! - `mta`: OT-based multiplicative-to-additive conversion

pub mod base_ot;
pub mod extension;
pub mod mta;

pub use base_ot::{BaseOtSender, OtKey};
pub use extension::{ExtReceiver, ExtSender, Row};
pub use mta::Gadget;
