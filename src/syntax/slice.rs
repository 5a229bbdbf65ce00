//! Slice header parsing
//!
//! Decodes the handful of fields the fingerprint needs —
//! `first_mb_in_slice`, `slice_type`, `slice_qp` — while consuming the
//! intermediate syntax (picture order counts, reference-list reordering,
//! prediction weights, reference marking) bit-accurately, so the reader
//! finishes positioned exactly at the first macroblock.

use crate::bitstream::BitReader;
use crate::error::Result;
use crate::syntax::{Pps, Sps};

/// Slice type, after the modulo-5 fold of the coded value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceType {
    P,
    B,
    I,
    Sp,
    Si,
}

impl SliceType {
    /// Map a coded slice_type (0-9) to its kind
    pub fn from_coded(value: u32) -> Self {
        match value % 5 {
            0 => SliceType::P,
            1 => SliceType::B,
            2 => SliceType::I,
            3 => SliceType::Sp,
            _ => SliceType::Si,
        }
    }

    /// Whether macroblocks in this slice can be inter predicted
    pub fn is_inter(&self) -> bool {
        matches!(self, SliceType::P | SliceType::B | SliceType::Sp)
    }
}

/// Decoded slice header
#[derive(Debug, Clone)]
pub struct SliceHeader {
    /// Index of the first macroblock covered by this slice
    pub first_mb_in_slice: u32,
    /// Slice type after the modulo-5 fold
    pub slice_type: SliceType,
    /// PPS the slice refers to
    pub pic_parameter_set_id: u32,
    /// Frame number (width taken from the SPS)
    pub frame_num: u32,
    /// Field (rather than frame) picture
    pub field_pic_flag: bool,
    /// Active l0 reference count for this slice
    pub num_ref_idx_l0_active: u32,
    /// Active l1 reference count for this slice
    pub num_ref_idx_l1_active: u32,
    /// Slice QP: 26 + pic_init_qp_minus26 + slice_qp_delta, clamped to [0, 51]
    pub slice_qp: u8,
}

/// Parse a slice header, leaving `r` at the start of macroblock data
///
/// `nal_unit_type` distinguishes IDR slices (which carry `idr_pic_id`);
/// `nal_ref_idc` gates the reference-marking syntax.
pub fn parse_slice_header(
    r: &mut BitReader,
    sps: &Sps,
    pps: &Pps,
    nal_unit_type: u8,
    nal_ref_idc: u8,
) -> Result<SliceHeader> {
    let is_idr = nal_unit_type == crate::nal::NAL_TYPE_IDR;

    let first_mb_in_slice = r.read_ue()?;
    let slice_type_code = r.read_ue()?;
    let slice_type = SliceType::from_coded(slice_type_code);
    let pic_parameter_set_id = r.read_ue()?;

    if sps.separate_colour_plane_flag {
        r.skip_bits(2)?; // colour_plane_id
    }

    let frame_num = r.read_bits(sps.log2_max_frame_num)?;

    let mut field_pic_flag = false;
    if !sps.frame_mbs_only_flag {
        field_pic_flag = r.read_bool()?;
        if field_pic_flag {
            r.skip_bits(1)?; // bottom_field_flag
        }
    }

    if is_idr {
        r.read_ue()?; // idr_pic_id
    }

    if sps.pic_order_cnt_type == 0 {
        r.skip_bits(sps.log2_max_pic_order_cnt_lsb)?; // pic_order_cnt_lsb
        if pps.pic_order_present_flag && !field_pic_flag {
            r.read_se()?; // delta_pic_order_cnt_bottom
        }
    } else if sps.pic_order_cnt_type == 1 && !sps.delta_pic_order_always_zero_flag {
        r.read_se()?; // delta_pic_order_cnt[0]
        if pps.pic_order_present_flag && !field_pic_flag {
            r.read_se()?; // delta_pic_order_cnt[1]
        }
    }

    if pps.redundant_pic_cnt_present_flag {
        r.read_ue()?; // redundant_pic_cnt
    }

    if slice_type == SliceType::B {
        r.skip_bits(1)?; // direct_spatial_mv_pred_flag
    }

    let mut num_ref_idx_l0_active = pps.num_ref_idx_l0_default_active;
    let mut num_ref_idx_l1_active = pps.num_ref_idx_l1_default_active;
    if slice_type.is_inter() {
        let override_flag = r.read_bool()?;
        if override_flag {
            num_ref_idx_l0_active = r.read_ue()? + 1;
            if slice_type == SliceType::B {
                num_ref_idx_l1_active = r.read_ue()? + 1;
            }
        }
    }

    skip_ref_pic_list_modification(r, slice_type)?;

    if (pps.weighted_pred_flag && matches!(slice_type, SliceType::P | SliceType::Sp))
        || (pps.weighted_bipred_idc == 1 && slice_type == SliceType::B)
    {
        skip_pred_weight_table(r, slice_type, num_ref_idx_l0_active, num_ref_idx_l1_active)?;
    }

    if nal_ref_idc != 0 {
        skip_dec_ref_pic_marking(r, is_idr)?;
    }

    // entropy_coding_mode is always CAVLC here, so no cabac_init_idc

    let slice_qp_delta = r.read_se()?;
    let slice_qp = (26 + pps.pic_init_qp_minus26 + slice_qp_delta).clamp(0, 51) as u8;

    if matches!(slice_type, SliceType::Sp | SliceType::Si) {
        if slice_type == SliceType::Sp {
            r.skip_bits(1)?; // sp_for_switch_flag
        }
        r.read_se()?; // slice_qs_delta
    }

    if pps.deblocking_filter_control_present_flag {
        let disable_idc = r.read_ue()?;
        if disable_idc != 1 {
            r.read_se()?; // slice_alpha_c0_offset_div2
            r.read_se()?; // slice_beta_offset_div2
        }
    }

    if pps.num_slice_groups_minus1 > 0 && (3..=5).contains(&pps.slice_group_map_type) {
        let pic_size_in_map_units = sps.pic_width_in_mbs * sps.pic_height_in_map_units;
        let cycle_max = pic_size_in_map_units / pps.slice_group_change_rate + 1;
        r.skip_bits(ceil_log2(cycle_max))?; // slice_group_change_cycle
    }

    Ok(SliceHeader {
        first_mb_in_slice,
        slice_type,
        pic_parameter_set_id,
        frame_num,
        field_pic_flag,
        num_ref_idx_l0_active,
        num_ref_idx_l1_active,
        slice_qp,
    })
}

fn ceil_log2(v: u32) -> u32 {
    32 - v.saturating_sub(1).leading_zeros()
}

fn skip_ref_pic_list_modification(r: &mut BitReader, slice_type: SliceType) -> Result<()> {
    if !matches!(slice_type, SliceType::I | SliceType::Si) {
        let modify_l0 = r.read_bool()?;
        if modify_l0 {
            skip_modification_list(r)?;
        }
    }
    if slice_type == SliceType::B {
        let modify_l1 = r.read_bool()?;
        if modify_l1 {
            skip_modification_list(r)?;
        }
    }
    Ok(())
}

fn skip_modification_list(r: &mut BitReader) -> Result<()> {
    loop {
        let idc = r.read_ue()?;
        match idc {
            0 | 1 => {
                r.read_ue()?; // abs_diff_pic_num_minus1
            }
            2 => {
                r.read_ue()?; // long_term_pic_num
            }
            3 => return Ok(()),
            _ => return Ok(()), // invalid idc, treat as end of list
        }
    }
}

fn skip_pred_weight_table(
    r: &mut BitReader,
    slice_type: SliceType,
    num_ref_l0: u32,
    num_ref_l1: u32,
) -> Result<()> {
    r.read_ue()?; // luma_log2_weight_denom
    r.read_ue()?; // chroma_log2_weight_denom (ChromaArrayType is 1 here)

    for _ in 0..num_ref_l0 {
        skip_weight_entry(r)?;
    }
    if slice_type == SliceType::B {
        for _ in 0..num_ref_l1 {
            skip_weight_entry(r)?;
        }
    }
    Ok(())
}

fn skip_weight_entry(r: &mut BitReader) -> Result<()> {
    let luma_weight_flag = r.read_bool()?;
    if luma_weight_flag {
        r.read_se()?; // luma_weight
        r.read_se()?; // luma_offset
    }
    let chroma_weight_flag = r.read_bool()?;
    if chroma_weight_flag {
        for _ in 0..2 {
            r.read_se()?; // chroma_weight
            r.read_se()?; // chroma_offset
        }
    }
    Ok(())
}

fn skip_dec_ref_pic_marking(r: &mut BitReader, is_idr: bool) -> Result<()> {
    if is_idr {
        r.skip_bits(2)?; // no_output_of_prior_pics_flag, long_term_reference_flag
        return Ok(());
    }

    let adaptive = r.read_bool()?;
    if adaptive {
        loop {
            match r.read_ue()? {
                0 => return Ok(()),
                1 | 2 | 4 | 6 => {
                    r.read_ue()?;
                }
                3 => {
                    r.read_ue()?; // difference_of_pic_nums_minus1
                    r.read_ue()?; // long_term_frame_idx
                }
                _ => {}
            }
        }
    }
    Ok(())
}
