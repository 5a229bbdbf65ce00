//! Sequence Parameter Set parsing
//!
//! Covers the baseline/main syntax of H.264 §7.3.2.1.1 up through the
//! frame-crop offsets, plus the high-profile extension block (chroma
//! format, bit depths, scaling lists). VUI parameters are not read.

use crate::bitstream::BitReader;
use crate::error::{Error, Result};

/// profile_idc values that carry the high-profile SPS extension block
const HIGH_PROFILE_IDCS: &[u8] = &[100, 110, 122, 244, 44, 83, 86, 118, 128, 138, 139, 134, 135];

/// Sequence Parameter Set
///
/// Retains the fields the fingerprint pipeline needs: the macroblock grid
/// geometry, the frame-number / picture-order-count widths required for
/// bit-accurate slice headers, and the chroma format.
#[derive(Debug, Clone)]
pub struct Sps {
    /// AVC profile indication (Baseline=66, Main=77, High=100)
    pub profile_idc: u8,
    /// AVC level indication
    pub level_idc: u8,
    /// SPS identifier (0-31)
    pub seq_parameter_set_id: u32,
    /// Chroma format (0=Mono, 1=4:2:0, 2=4:2:2, 3=4:4:4); defaults to 1
    /// when the profile carries no extension block
    pub chroma_format_idc: u8,
    /// Separate colour plane coding (4:4:4 only)
    pub separate_colour_plane_flag: bool,
    /// Luma bit depth (8-14)
    pub bit_depth_luma: u8,
    /// Chroma bit depth (8-14)
    pub bit_depth_chroma: u8,
    /// Width of the frame_num slice-header field in bits
    pub log2_max_frame_num: u32,
    /// Picture order count type (0-2)
    pub pic_order_cnt_type: u32,
    /// Width of the pic_order_cnt_lsb slice-header field in bits (type 0)
    pub log2_max_pic_order_cnt_lsb: u32,
    /// delta_pic_order_always_zero_flag (type 1)
    pub delta_pic_order_always_zero_flag: bool,
    /// Maximum number of reference frames
    pub max_num_ref_frames: u32,
    /// Picture width in macroblocks
    pub pic_width_in_mbs: u32,
    /// Picture height in map units (macroblock rows for frame coding)
    pub pic_height_in_map_units: u32,
    /// Frame-only coding (no fields)
    pub frame_mbs_only_flag: bool,
    /// Macroblock-adaptive frame/field coding
    pub mb_adaptive_frame_field_flag: bool,
    /// Frame crop offsets (zero when cropping is absent)
    pub frame_crop_left_offset: u32,
    pub frame_crop_right_offset: u32,
    pub frame_crop_top_offset: u32,
    pub frame_crop_bottom_offset: u32,
}

impl Sps {
    /// Macroblock grid width
    pub fn width_mbs(&self) -> u32 {
        self.pic_width_in_mbs
    }

    /// Macroblock grid height
    pub fn height_mbs(&self) -> u32 {
        self.pic_height_in_map_units * (2 - self.frame_mbs_only_flag as u32)
    }

    /// Total number of macroblocks in the grid
    pub fn num_mbs(&self) -> u32 {
        self.width_mbs() * self.height_mbs()
    }

    /// Cropped pixel width
    pub fn pixel_width(&self) -> u32 {
        (self.width_mbs() * 16)
            .saturating_sub(2 * (self.frame_crop_left_offset + self.frame_crop_right_offset))
    }

    /// Cropped pixel height
    pub fn pixel_height(&self) -> u32 {
        (self.height_mbs() * 16)
            .saturating_sub(2 * (self.frame_crop_top_offset + self.frame_crop_bottom_offset))
    }
}

/// Parse an SPS from cleaned RBSP data
pub fn parse_sps(rbsp: &[u8]) -> Result<Sps> {
    let mut r = BitReader::new(rbsp);

    let profile_idc = r.read_bits(8)? as u8;
    // constraint_set0..5 flags + reserved_zero_2bits
    r.skip_bits(8)?;
    let level_idc = r.read_bits(8)? as u8;
    let seq_parameter_set_id = r.read_ue()?;

    let mut chroma_format_idc = 1u8;
    let mut separate_colour_plane_flag = false;
    let mut bit_depth_luma = 8u8;
    let mut bit_depth_chroma = 8u8;

    if HIGH_PROFILE_IDCS.contains(&profile_idc) {
        chroma_format_idc = r.read_ue()? as u8;
        if chroma_format_idc == 3 {
            separate_colour_plane_flag = r.read_bool()?;
        }
        bit_depth_luma = r.read_ue()? as u8 + 8;
        bit_depth_chroma = r.read_ue()? as u8 + 8;
        // qpprime_y_zero_transform_bypass_flag
        r.skip_bits(1)?;

        let seq_scaling_matrix_present = r.read_bool()?;
        if seq_scaling_matrix_present {
            let list_count = if chroma_format_idc == 3 { 12 } else { 8 };
            for i in 0..list_count {
                let present = r.read_bool()?;
                if present {
                    skip_scaling_list(&mut r, if i < 6 { 16 } else { 64 })?;
                }
            }
        }
    }

    if chroma_format_idc != 1 {
        return Err(Error::unsupported_profile(format!(
            "chroma_format_idc {} (only 4:2:0 is supported)",
            chroma_format_idc
        )));
    }

    let log2_max_frame_num = r.read_ue()? + 4;
    let pic_order_cnt_type = r.read_ue()?;

    let mut log2_max_pic_order_cnt_lsb = 4;
    let mut delta_pic_order_always_zero_flag = false;
    match pic_order_cnt_type {
        0 => {
            log2_max_pic_order_cnt_lsb = r.read_ue()? + 4;
        }
        1 => {
            delta_pic_order_always_zero_flag = r.read_bool()?;
            // offset_for_non_ref_pic, offset_for_top_to_bottom_field
            r.read_se()?;
            r.read_se()?;
            let num_ref_frames_in_cycle = r.read_ue()?;
            for _ in 0..num_ref_frames_in_cycle {
                r.read_se()?;
            }
        }
        _ => {}
    }

    let max_num_ref_frames = r.read_ue()?;
    // gaps_in_frame_num_value_allowed_flag
    r.skip_bits(1)?;

    let pic_width_in_mbs = r.read_ue()? + 1;
    let pic_height_in_map_units = r.read_ue()? + 1;

    let frame_mbs_only_flag = r.read_bool()?;
    let mb_adaptive_frame_field_flag = if frame_mbs_only_flag {
        false
    } else {
        r.read_bool()?
    };

    // direct_8x8_inference_flag
    r.skip_bits(1)?;

    let frame_cropping_flag = r.read_bool()?;
    let (crop_left, crop_right, crop_top, crop_bottom) = if frame_cropping_flag {
        (r.read_ue()?, r.read_ue()?, r.read_ue()?, r.read_ue()?)
    } else {
        (0, 0, 0, 0)
    };

    // vui_parameters_present_flag and the VUI itself are not needed

    Ok(Sps {
        profile_idc,
        level_idc,
        seq_parameter_set_id,
        chroma_format_idc,
        separate_colour_plane_flag,
        bit_depth_luma,
        bit_depth_chroma,
        log2_max_frame_num,
        pic_order_cnt_type,
        log2_max_pic_order_cnt_lsb,
        delta_pic_order_always_zero_flag,
        max_num_ref_frames,
        pic_width_in_mbs,
        pic_height_in_map_units,
        frame_mbs_only_flag,
        mb_adaptive_frame_field_flag,
        frame_crop_left_offset: crop_left,
        frame_crop_right_offset: crop_right,
        frame_crop_top_offset: crop_top,
        frame_crop_bottom_offset: crop_bottom,
    })
}

/// Skip one scaling list, tracking the delta chain
///
/// last_scale starts at 8 and follows the signed deltas; a next_scale of
/// zero switches the list to its default and ends the deltas.
fn skip_scaling_list(r: &mut BitReader, size: u32) -> Result<()> {
    let mut last_scale: i32 = 8;
    let mut next_scale: i32 = 8;

    for _ in 0..size {
        if next_scale != 0 {
            let delta = r.read_se()?;
            next_scale = (last_scale + delta + 256) % 256;
        }
        if next_scale != 0 {
            last_scale = next_scale;
        }
    }

    Ok(())
}
