//! Perceptual fingerprint record
//!
//! A fingerprint captures the decisions an H.264 encoder made for one
//! still image: per-macroblock type codes, intra prediction modes and DC
//! coefficients, plus summary statistics and a two-level spatial pyramid
//! of the luma DC plane. Fingerprints are immutable once built and safe
//! to share across threads.
//!
//! ## Macroblock type codes
//!
//! The byte codes stored in `mb_types` are local to this fingerprint
//! format (they are not raw H.264 mb_type values):
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | macroblock never reached by a slice walk |
//! | 1-24 | I_16x16 variants (the slice-level mb_type value) |
//! | 25 | I_4x4 / I_PCM |
//! | 26-30 | P macroblock types (26 + mb_type) |
//! | 37 | P_Skip |
//! | 50-72 | B macroblock types (50 + mb_type) |
//! | 87 | B_Skip |
//!
//! Codes <= 25 are classified as intra; 37 and 87 as skipped.

mod distance;
mod serial;

pub use distance::{
    cosine_similarity, distance_fast, distance_full, distance_pyramid, hamming_distance,
    is_similar, similarity, SIMILARITY_THRESHOLD,
};

/// Macroblock type code for P_Skip
pub const MB_CODE_P_SKIP: u8 = 37;
/// Macroblock type code for B_Skip
pub const MB_CODE_B_SKIP: u8 = 87;
/// Shared code for I_4x4 (I_NxN) and I_PCM macroblocks
pub const MB_CODE_INTRA_NXN: u8 = 25;
/// Base code for P macroblock types (26..=30)
pub const MB_CODE_P_BASE: u8 = 26;
/// Base code for B macroblock types (50..=72)
pub const MB_CODE_B_BASE: u8 = 50;
/// Highest code classified as intra
pub const MB_CODE_INTRA_MAX: u8 = 25;

/// Whether a type code marks a skipped macroblock
pub fn is_skip_code(code: u8) -> bool {
    code == MB_CODE_P_SKIP || code == MB_CODE_B_SKIP
}

/// Whether a type code is classified as intra
pub fn is_intra_code(code: u8) -> bool {
    code <= MB_CODE_INTRA_MAX
}

/// Perceptual fingerprint of a single image
///
/// Built by [`crate::extract::Extractor`]; treat as read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Fingerprint {
    /// Pixel dimensions after cropping
    pub width: u16,
    pub height: u16,
    /// Macroblock grid dimensions
    pub width_mbs: u16,
    pub height_mbs: u16,
    /// Per-macroblock type codes (see module docs), length num_mbs
    pub mb_types: Vec<u8>,
    /// Per-macroblock intra prediction mode summary (2 = DC), length num_mbs
    pub intra_modes: Vec<u8>,
    /// Per-macroblock mean DC coefficients, length num_mbs each
    pub dc_luma: Vec<i16>,
    pub dc_cb: Vec<i16>,
    pub dc_cr: Vec<i16>,
    /// Mean slice QP, clamped to [0, 51]
    pub qp_avg: u8,
    /// Fraction of skipped macroblocks, in [0, 1]
    pub skip_ratio: f32,
    /// Fraction of intra macroblocks, in [0, 1]
    pub intra_ratio: f32,
    /// Mean of dc_luma (integer truncation toward zero)
    pub dc_mean: i16,
    /// Population standard deviation of dc_luma
    pub dc_std: f32,
    /// Fraction of macroblocks with a directional intra mode, in [0, 1]
    pub edge_density: f32,
    /// Mean dc_luma over a 2x2 tiling of the grid, row-major
    pub pyramid_2x2: [i16; 4],
    /// Mean dc_luma over a 4x4 tiling of the grid, row-major
    pub pyramid_4x4: [i16; 16],
}

impl Fingerprint {
    /// Number of macroblocks in the grid
    pub fn num_mbs(&self) -> usize {
        self.width_mbs as usize * self.height_mbs as usize
    }

    /// Whether two fingerprints have the same macroblock grid
    pub fn same_grid(&self, other: &Fingerprint) -> bool {
        self.width_mbs == other.width_mbs && self.height_mbs == other.height_mbs
    }

    /// Serialized size in bytes for this fingerprint
    pub fn serialized_len(&self) -> usize {
        serial::serialized_len(self.num_mbs())
    }

    /// Serialize to the fixed little-endian layout
    pub fn serialize(&self) -> Vec<u8> {
        serial::serialize(self)
    }

    /// Deserialize from the fixed little-endian layout
    pub fn deserialize(data: &[u8]) -> crate::error::Result<Fingerprint> {
        serial::deserialize(data)
    }

    /// Read a serialized fingerprint from a file
    pub fn read_from(path: &std::path::Path) -> crate::error::Result<Fingerprint> {
        let data = std::fs::read(path)?;
        Self::deserialize(&data)
    }

    /// Write the serialized fingerprint to a file
    pub fn write_to(&self, path: &std::path::Path) -> crate::error::Result<()> {
        std::fs::write(path, self.serialize())?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::testfp::uniform;

    #[test]
    fn test_num_mbs() {
        let fp = uniform(8, 6, 0);
        assert_eq!(fp.num_mbs(), 48);
    }

    #[test]
    fn test_same_grid() {
        let a = uniform(8, 6, 0);
        let b = uniform(8, 6, 100);
        let c = uniform(4, 4, 0);
        assert!(a.same_grid(&b));
        assert!(!a.same_grid(&c));
    }
}
