//! # tmpc core
//!
//! Threshold ECDSA and EdDSA protocols over secp256k1, P-256 and Ed25519.
//!
//! This crate provides:
//! - 2-party ECDSA: DKG, refresh and (batch) signing with Paillier-based
//!   multiplication
//! - N-party ECDSA: additive and access-structure DKG, refresh and signing
//!   with OT-based multiplication
//! - N-party EdDSA: the same key management with Schnorr signing
//! - Publicly-verifiable encryption of scalars to an access structure
//!
//! ## Protocol Overview
//!
//! Every protocol is an `async fn` taking a [`mpc::Job2P`] or
//! [`mpc::JobMP`], which wraps a caller-supplied [`mpc::Transport`]. Each
//! party runs the same function concurrently; the designated signature
//! receiver alone gets the signature.
//!
//! ## Example
//!
//! ```rust,ignore
//! use tmpc_core::{curve::Curve, ecdsa_mp, mpc::JobMP};
//!
//! let mut job = JobMP::new(transport, index, roster)?;
//! let share = ecdsa_mp::dkg(&mut job, Curve::Secp256k1).await?;
//! let der = ecdsa_mp::sign(&mut job, &share, &digest, 0).await?;
//! ```

pub mod access;
pub mod agree_random;
pub mod commitment;
pub mod curve;
pub mod ecdsa_2p;
pub mod ecdsa_mp;
pub mod eckey;
pub mod eddsa_mp;
pub mod error;
pub mod mpc;
pub mod oblivious;
pub mod paillier;
pub mod params;
pub mod pve;
pub mod signature;
pub mod zk;

#[cfg(test)]
mod test_utils;

pub use error::{Error, ErrorKind, Result};

/// Protocol version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
