//! avchash - perceptual image fingerprints from H.264 encoder decisions
//!
//! avchash computes a compact perceptual fingerprint of a still image by
//! encoding it once with an H.264 compressor and mining the compressor's
//! *decisions* - macroblock types, intra prediction modes, DC
//! coefficients, quantization parameters - rather than the reconstructed
//! pixels. Two fingerprints can be compared with several distance
//! metrics trading speed for accuracy.
//!
//! # Architecture
//!
//! Data flows strictly left to right, each stage a pure function of its
//! input:
//!
//! ```text
//! bytes -> NAL units -> syntax records -> feature arrays -> fingerprint
//! ```
//!
//! - `bitstream`: MSB-first bit reader with Exp-Golomb decoding
//! - `nal`: Annex B start-code scanning and RBSP unescaping
//! - `syntax`: SPS / PPS / slice-header parsing
//! - `extract`: macroblock walking and feature extraction
//! - `fingerprint`: the fingerprint record, distance metrics, and the
//!   binary serialization format
//! - `encoder` (feature `encoder`): the OpenH264-backed collaborator
//!   that turns raster images into Annex B input
//!
//! # Example
//!
//! ```no_run
//! use avchash::{extract, distance_full};
//!
//! let a = extract(&std::fs::read("a.h264").unwrap()).unwrap();
//! let b = extract(&std::fs::read("b.h264").unwrap()).unwrap();
//! println!("distance: {}", distance_full(&a, &b));
//! ```

pub mod bitstream;
pub mod error;
pub mod extract;
pub mod fingerprint;
pub mod nal;
pub mod syntax;

#[cfg(feature = "encoder")]
pub mod encoder;
#[cfg(feature = "encoder")]
pub mod hasher;

pub use error::{Error, Result};
pub use extract::{extract, DcMode, Extractor};
pub use fingerprint::{
    cosine_similarity, distance_fast, distance_full, distance_pyramid, hamming_distance,
    is_similar, similarity, Fingerprint,
};

#[cfg(feature = "encoder")]
pub use hasher::Hasher;

/// avchash version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Configuration for the avchash library
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Maximum number of threads for parallel hashing
    pub max_threads: Option<usize>,
    /// Enable verbose logging
    pub verbose: bool,
    /// Enable debug output
    pub debug: bool,
}

/// Initialize the avchash library with the given configuration
pub fn init(config: Config) -> Result<()> {
    if let Some(threads) = config.max_threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .map_err(|e| Error::invalid_data(format!("failed to initialize thread pool: {}", e)))?;
    }

    if config.verbose || config.debug {
        let level = if config.debug { "debug" } else { "info" };
        tracing_subscriber::fmt().with_env_filter(level).init();
    }

    Ok(())
}
