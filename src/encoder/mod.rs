//! Still-image encoder collaborator
//!
//! The fingerprint core only consumes the encoder through a narrow
//! contract: given a raster image and a configuration, yield an Annex B
//! byte sequence starting with SPS/PPS and one or more IDR slices. The
//! encoder itself is an external service; this module provides the
//! contract types, a YUV 4:2:0 raster buffer, and a deadline wrapper for
//! callback-style backends.

pub mod openh264;

pub use self::openh264::Openh264Encoder;

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use crate::error::{Error, Result};

/// Default encode deadline
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(5);

/// H.264 profile requested from the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    /// Baseline: CAVLC only, the profile the fingerprint core expects
    #[default]
    Baseline,
    Main,
}

/// Entropy coder requested from the encoder; the core rejects CABAC
/// streams, so only CAVLC is expressible
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntropyMode {
    #[default]
    Cavlc,
}

/// Encoder configuration
#[derive(Debug, Clone)]
pub struct EncodeConfig {
    /// Expected raster width in pixels (0 = taken from the raster)
    pub width: u32,
    /// Expected raster height in pixels (0 = taken from the raster)
    pub height: u32,
    /// Target bitrate in bits per second
    pub bitrate: u32,
    /// Requested profile
    pub profile: Profile,
    /// Emit only intra frames (required for still-image hashing)
    pub i_frame_only: bool,
    /// Quality knob, 0-100 (backend-specific meaning)
    pub quality: u8,
    /// Entropy coder
    pub entropy_mode: EntropyMode,
}

impl Default for EncodeConfig {
    fn default() -> Self {
        EncodeConfig {
            width: 0,
            height: 0,
            bitrate: 2_000_000,
            profile: Profile::Baseline,
            i_frame_only: true,
            quality: 80,
            entropy_mode: EntropyMode::Cavlc,
        }
    }
}

/// Planar YUV 4:2:0 raster image
///
/// The buffer owns its planes; chroma planes are half resolution in both
/// dimensions (rounded up).
#[derive(Debug, Clone)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    pub y: Vec<u8>,
    pub u: Vec<u8>,
    pub v: Vec<u8>,
}

impl RasterImage {
    /// Allocate a mid-gray image
    pub fn gray(width: u32, height: u32) -> Self {
        let (cw, ch) = ((width as usize + 1) / 2, (height as usize + 1) / 2);
        RasterImage {
            width,
            height,
            y: vec![128; width as usize * height as usize],
            u: vec![128; cw * ch],
            v: vec![128; cw * ch],
        }
    }

    /// Convert packed RGB8 data to BT.601 limited-range YUV 4:2:0
    ///
    /// `rgb` is row-major, 3 bytes per pixel, `width * height` pixels.
    pub fn from_rgb(rgb: &[u8], width: u32, height: u32) -> Result<Self> {
        let (w, h) = (width as usize, height as usize);
        if rgb.len() < w * h * 3 {
            return Err(Error::invalid_data(format!(
                "RGB buffer {} too small for {}x{}",
                rgb.len(),
                width,
                height
            )));
        }

        let mut image = RasterImage::gray(width, height);
        let cw = (w + 1) / 2;

        for py in 0..h {
            for px in 0..w {
                let i = (py * w + px) * 3;
                let (r, g, b) = (rgb[i] as i32, rgb[i + 1] as i32, rgb[i + 2] as i32);
                let y = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
                image.y[py * w + px] = y.clamp(0, 255) as u8;
            }
        }

        // Chroma from the top-left pixel of each 2x2 quad
        for cy in 0..(h + 1) / 2 {
            for cx in 0..cw {
                let (px, py) = ((cx * 2).min(w - 1), (cy * 2).min(h - 1));
                let i = (py * w + px) * 3;
                let (r, g, b) = (rgb[i] as i32, rgb[i + 1] as i32, rgb[i + 2] as i32);
                let u = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
                let v = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
                image.u[cy * cw + cx] = u.clamp(0, 255) as u8;
                image.v[cy * cw + cx] = v.clamp(0, 255) as u8;
            }
        }

        Ok(image)
    }

    /// Contiguous I420 layout (Y plane, then U, then V)
    pub fn to_i420(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.y.len() + self.u.len() + self.v.len());
        out.extend_from_slice(&self.y);
        out.extend_from_slice(&self.u);
        out.extend_from_slice(&self.v);
        out
    }
}

/// The encode contract the fingerprint pipeline consumes
///
/// A single call blocks until one compressed bitstream is available.
/// Implementations must emit Annex B output with SPS/PPS ahead of the
/// first slice.
pub trait ImageEncoder {
    /// Encode one raster image into an Annex B byte stream
    fn encode(&mut self, image: &RasterImage) -> Result<Vec<u8>>;
}

/// Run a blocking encode with a deadline
///
/// Translates callback-plus-signal style backends into the synchronous
/// contract: the encode runs on a worker thread and the caller waits at
/// most `deadline` for the completion signal. On expiry the pending call
/// fails with [`Error::Timeout`] and no partial output is returned; the
/// abandoned worker finishes in the background.
pub fn encode_with_deadline<F>(encode: F, deadline: Duration) -> Result<Vec<u8>>
where
    F: FnOnce() -> Result<Vec<u8>> + Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel(1);
    thread::spawn(move || {
        let _ = tx.send(encode());
    });

    match rx.recv_timeout(deadline) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(Error::Timeout(deadline)),
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Err(Error::encoder("encoder worker dropped its result"))
        }
    }
}
