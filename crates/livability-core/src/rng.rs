//! Explicit seed derivation.
//!
//! Every stochastic step takes a caller-supplied seed. Sub-streams (one per
//! raster row, per sample, per tree, per stratum) are derived from that seed
//! and a stable index, so results never depend on iteration order or thread
//! count.

use rand::rngs::StdRng;
use rand::SeedableRng;

/// Salts keep the streams of different stages apart even when callers reuse
/// one seed value everywhere (the default configuration does).
pub(crate) const NOISE_SALT: u64 = 0x4E01_5E00_A11C_E5ED;
pub(crate) const SAMPLE_SALT: u64 = 0x5A3C_9F12_6B7E_4D01;
pub(crate) const SPLIT_SALT: u64 = 0x0005_B117_F01D_0042;
pub(crate) const TREE_SALT: u64 = 0x7AEE_F0E5_7000_0100;
pub(crate) const CHART_SALT: u64 = 0xC4A2_7000_0099_0B5E;

/// SplitMix64 finaliser over `seed ^ salt` and `index`.
pub(crate) fn derive_seed(seed: u64, salt: u64, index: u64) -> u64 {
    let mut z = (seed ^ salt).wrapping_add(index.wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Independent RNG for sub-stream `index` of `seed`.
pub(crate) fn substream(seed: u64, salt: u64, index: u64) -> StdRng {
    StdRng::seed_from_u64(derive_seed(seed, salt, index))
}
