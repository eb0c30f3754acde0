use std::hash::BuildHasher;

use num::{BigUint, One};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha224};

use crate::error::{Result, SfileError};
use crate::vocab::TokenId;

/// 受け付ける最大 bit 精度 (SHA-224 の出力幅)
pub const MAX_BIT_PRECISION: u32 = 224;
/// fast hash が使える最大 bit 精度
pub const MAX_FAST_BIT_PRECISION: u32 = 64;

// fixed keys so ids are stable for the lifetime of a saved vocabulary
const AHASH_SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashAlgorithm {
    /// keyed ahash, up to 64 bits
    Fast,
    /// SHA-224 digest read as a big-endian integer
    Sha224,
}

/// Maps a token to an id in `[0, 2^bit_precision)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenHasher {
    bit_precision: u32,
    algorithm: HashAlgorithm,
}

impl TokenHasher {
    /// Fast hash up to 64 bits, SHA-224 above.
    pub fn new(bit_precision: u32) -> Result<Self> {
        let algorithm = if bit_precision <= MAX_FAST_BIT_PRECISION {
            HashAlgorithm::Fast
        } else {
            HashAlgorithm::Sha224
        };
        Self::with_algorithm(bit_precision, algorithm)
    }

    pub fn with_algorithm(bit_precision: u32, algorithm: HashAlgorithm) -> Result<Self> {
        if bit_precision == 0 || bit_precision > MAX_BIT_PRECISION {
            return Err(SfileError::Configuration(format!(
                "bit_precision must be in 1..={MAX_BIT_PRECISION}, got {bit_precision}"
            )));
        }
        if algorithm == HashAlgorithm::Fast && bit_precision > MAX_FAST_BIT_PRECISION {
            return Err(SfileError::Configuration(format!(
                "fast hashing only covers {MAX_FAST_BIT_PRECISION} bits, got {bit_precision}"
            )));
        }
        Ok(Self { bit_precision, algorithm })
    }

    #[inline]
    pub fn bit_precision(&self) -> u32 {
        self.bit_precision
    }

    #[inline]
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Exclusive upper bound of the id space, `2^bit_precision`.
    pub fn id_space(&self) -> BigUint {
        BigUint::one() << self.bit_precision
    }

    pub fn hash(&self, token: &str) -> TokenId {
        match self.algorithm {
            HashAlgorithm::Fast => {
                let state = ahash::RandomState::with_seeds(
                    AHASH_SEEDS[0],
                    AHASH_SEEDS[1],
                    AHASH_SEEDS[2],
                    AHASH_SEEDS[3],
                );
                let raw = state.hash_one(token);
                let masked = if self.bit_precision >= 64 {
                    raw
                } else {
                    raw & ((1u64 << self.bit_precision) - 1)
                };
                BigUint::from(masked)
            }
            HashAlgorithm::Sha224 => {
                let digest = Sha224::digest(token.as_bytes());
                let raw = BigUint::from_bytes_be(&digest);
                raw % self.id_space()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_precision() {
        assert!(matches!(TokenHasher::new(0), Err(SfileError::Configuration(_))));
        assert!(matches!(TokenHasher::new(225), Err(SfileError::Configuration(_))));
        assert!(TokenHasher::new(224).is_ok());
        assert!(TokenHasher::with_algorithm(65, HashAlgorithm::Fast).is_err());
    }

    #[test]
    fn picks_algorithm_by_width() {
        assert_eq!(TokenHasher::new(18).unwrap().algorithm(), HashAlgorithm::Fast);
        assert_eq!(TokenHasher::new(64).unwrap().algorithm(), HashAlgorithm::Fast);
        assert_eq!(TokenHasher::new(65).unwrap().algorithm(), HashAlgorithm::Sha224);
    }

    #[test]
    fn hashes_stay_in_range_and_are_deterministic() {
        for bits in [1u32, 8, 18, 64, 100, 224] {
            let hasher = TokenHasher::new(bits).unwrap();
            let bound = hasher.id_space();
            for token in ["alpha", "beta", "gamma", ""] {
                let id = hasher.hash(token);
                assert!(id < bound, "bits={bits} token={token}");
                assert_eq!(id, hasher.hash(token));
            }
        }
    }

    #[test]
    fn sha_hash_matches_small_precision_variant() {
        let narrow = TokenHasher::with_algorithm(16, HashAlgorithm::Sha224).unwrap();
        let wide = TokenHasher::new(224).unwrap();
        let mask = BigUint::from(0xffffu32);
        assert_eq!(narrow.hash("cable"), wide.hash("cable") & mask);
    }
}
