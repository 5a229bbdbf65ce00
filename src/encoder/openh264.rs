//! OpenH264-backed still-image encoder
//!
//! Wraps Cisco's OpenH264 behind the [`ImageEncoder`] contract,
//! configured for the output the fingerprint core expects: baseline
//! profile, CAVLC, every frame an IDR.

use openh264::encoder::{
    BitRate, Encoder as OpenH264Encoder, EncoderConfig, FrameRate, IntraFramePeriod,
    RateControlMode,
};
use openh264::formats::YUVBuffer;
use openh264::OpenH264API;

use super::{EncodeConfig, ImageEncoder, RasterImage};
use crate::error::{Error, Result};

/// Still-image encoder over OpenH264
///
/// One instance can encode rasters of varying dimensions; OpenH264
/// reconfigures itself from the input buffer.
pub struct Openh264Encoder {
    encoder: OpenH264Encoder,
    config: EncodeConfig,
}

impl Openh264Encoder {
    /// Create an encoder with the default still-image configuration
    pub fn new() -> Result<Self> {
        Self::with_config(EncodeConfig::default())
    }

    /// Create an encoder with an explicit configuration
    pub fn with_config(config: EncodeConfig) -> Result<Self> {
        let mut encoder_config = EncoderConfig::new();

        encoder_config = encoder_config
            .bitrate(BitRate::from_bps(config.bitrate))
            .max_frame_rate(FrameRate::from_hz(1.0))
            .rate_control_mode(RateControlMode::Quality)
            .scene_change_detect(false);

        // Still images: every frame is a keyframe
        encoder_config = if config.i_frame_only {
            encoder_config.intra_frame_period(IntraFramePeriod::from_num_frames(1))
        } else {
            encoder_config.intra_frame_period(IntraFramePeriod::auto())
        };

        let api = OpenH264API::from_source();
        let encoder = OpenH264Encoder::with_api_config(api, encoder_config)
            .map_err(|e| Error::encoder(format!("failed to create OpenH264 encoder: {:?}", e)))?;

        Ok(Openh264Encoder { encoder, config })
    }

    /// The configuration this encoder was built with
    pub fn config(&self) -> &EncodeConfig {
        &self.config
    }
}

impl ImageEncoder for Openh264Encoder {
    fn encode(&mut self, image: &RasterImage) -> Result<Vec<u8>> {
        if (self.config.width != 0 && self.config.width != image.width)
            || (self.config.height != 0 && self.config.height != image.height)
        {
            return Err(Error::encoder(format!(
                "raster {}x{} does not match configured {}x{}",
                image.width, image.height, self.config.width, self.config.height
            )));
        }

        let yuv = YUVBuffer::from_vec(
            image.to_i420(),
            image.width as usize,
            image.height as usize,
        );

        if self.config.i_frame_only {
            self.encoder.force_intra_frame();
        }

        let bitstream = self
            .encoder
            .encode(&yuv)
            .map_err(|e| Error::encoder(format!("OpenH264 encode failed: {:?}", e)))?;

        let data = bitstream.to_vec();
        if data.is_empty() {
            return Err(Error::NoOutput);
        }
        Ok(data)
    }
}
