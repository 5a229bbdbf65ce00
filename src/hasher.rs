//! Raster-to-fingerprint facade
//!
//! Glues the encoder collaborator to the extraction pipeline: raster in,
//! fingerprint out. A process-wide shared instance is offered for
//! callers that want to amortize encoder setup; the extraction core
//! itself stays stateless.

use std::sync::OnceLock;
use std::time::Duration;

use parking_lot::Mutex;

use crate::encoder::{
    encode_with_deadline, EncodeConfig, ImageEncoder, Openh264Encoder, RasterImage,
};
use crate::error::Result;
use crate::extract::extract;
use crate::fingerprint::Fingerprint;

static SHARED: OnceLock<Mutex<Hasher>> = OnceLock::new();

/// Still-image hasher: owns an encoder session and runs the
/// encode-then-extract pipeline
pub struct Hasher {
    encoder: Openh264Encoder,
}

impl Hasher {
    /// Create a hasher with the default encoder configuration
    pub fn new() -> Result<Self> {
        Ok(Hasher {
            encoder: Openh264Encoder::new()?,
        })
    }

    /// Create a hasher with an explicit encoder configuration
    pub fn with_config(config: EncodeConfig) -> Result<Self> {
        Ok(Hasher {
            encoder: Openh264Encoder::with_config(config)?,
        })
    }

    /// Process-wide shared hasher, created on first use
    ///
    /// The encoder session is released when the process exits; callers
    /// needing tighter teardown should own a `Hasher` directly.
    pub fn shared() -> Result<&'static Mutex<Hasher>> {
        if SHARED.get().is_none() {
            let hasher = Hasher::new()?;
            // A racing initializer may win; that instance serves everyone
            let _ = SHARED.set(Mutex::new(hasher));
        }
        Ok(SHARED.get().expect("shared hasher initialized"))
    }

    /// Fingerprint a raster image
    pub fn hash_raster(&mut self, image: &RasterImage) -> Result<Fingerprint> {
        let bytes = self.encoder.encode(image)?;
        extract(&bytes)
    }

    /// Fingerprint a raster image, bounding the encode by a deadline
    ///
    /// A fresh encoder session runs on a worker thread; on expiry the
    /// call fails with `Timeout` and no partial output is consumed.
    pub fn hash_raster_with_deadline(
        image: RasterImage,
        config: EncodeConfig,
        deadline: Duration,
    ) -> Result<Fingerprint> {
        let bytes = encode_with_deadline(
            move || Openh264Encoder::with_config(config)?.encode(&image),
            deadline,
        )?;
        extract(&bytes)
    }
}
