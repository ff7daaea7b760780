//! Protocol parameters

/// Computational security parameter in bits
pub const KAPPA: usize = 128;

/// Statistical security parameter in bits
pub const STAT_SEC: usize = 80;

/// Bit length of Paillier moduli generated and accepted by the 2-party protocol
pub const PAILLIER_BITS: usize = 2048;

/// Repetitions of the Paillier N-th root proof
pub const PAILLIER_ROUNDS: usize = 11;

/// Paillier moduli must not have a prime factor below this bound
pub const PAILLIER_SMALL_PRIME_BOUND: u32 = 6370;

/// Challenge length of the Paillier range proofs in bits
pub const PAILLIER_CHALLENGE_BITS: usize = 128;

/// Signing attempts before a zero `r` is reported as an error
pub const MAX_SIGN_ATTEMPTS: usize = 3;

/// Largest payload accepted from the transport
pub const MAX_MESSAGE_BYTES: usize = 10 * 1024 * 1024;

/// Number of cut-and-choose rows in a PVE bundle
pub const PVE_ROWS: usize = KAPPA;

/// Length of commitment randomness and derived session ids in bytes
pub const SID_BYTES: usize = 32;
