//! Picture Parameter Set parsing
//!
//! Reads the full §7.3.2.2 syntax. Only CAVLC streams are accepted; a PPS
//! selecting CABAC is rejected immediately since none of the downstream
//! slice machinery can decode arithmetic-coded macroblocks.

use crate::bitstream::BitReader;
use crate::error::{Error, Result};

/// Picture Parameter Set
///
/// Retains the fields that shape slice-header and macroblock parsing;
/// everything else is consumed bit-accurately and dropped.
#[derive(Debug, Clone)]
pub struct Pps {
    /// PPS identifier
    pub pic_parameter_set_id: u32,
    /// SPS this PPS refers to
    pub seq_parameter_set_id: u32,
    /// Entropy coding mode (always false / CAVLC after a successful parse)
    pub entropy_coding_mode_flag: bool,
    /// bottom_field_pic_order_in_frame_present_flag
    pub pic_order_present_flag: bool,
    /// Number of slice groups minus 1 (FMO when > 0)
    pub num_slice_groups_minus1: u32,
    /// Slice group map type (FMO only)
    pub slice_group_map_type: u32,
    /// Slice group change rate (FMO map types 3-5)
    pub slice_group_change_rate: u32,
    /// Default l0 reference count
    pub num_ref_idx_l0_default_active: u32,
    /// Default l1 reference count
    pub num_ref_idx_l1_default_active: u32,
    /// Weighted prediction for P slices
    pub weighted_pred_flag: bool,
    /// Weighted prediction mode for B slices (0-2)
    pub weighted_bipred_idc: u8,
    /// Picture-level QP initializer, relative to 26
    pub pic_init_qp_minus26: i32,
    /// Chroma QP table offset
    pub chroma_qp_index_offset: i32,
    /// Deblocking filter parameters present in slice headers
    pub deblocking_filter_control_present_flag: bool,
    /// Intra prediction constrained to intra neighbours
    pub constrained_intra_pred_flag: bool,
    /// redundant_pic_cnt present in slice headers
    pub redundant_pic_cnt_present_flag: bool,
    /// 8x8 transform allowed (PPS extension)
    pub transform_8x8_mode_flag: bool,
}

/// Parse a PPS from cleaned RBSP data
pub fn parse_pps(rbsp: &[u8]) -> Result<Pps> {
    let mut r = BitReader::new(rbsp);

    let pic_parameter_set_id = r.read_ue()?;
    let seq_parameter_set_id = r.read_ue()?;

    let entropy_coding_mode_flag = r.read_bool()?;
    if entropy_coding_mode_flag {
        return Err(Error::UnsupportedEntropyMode(
            "CABAC stream; only CAVLC is supported".into(),
        ));
    }

    let pic_order_present_flag = r.read_bool()?;

    let num_slice_groups_minus1 = r.read_ue()?;
    let mut slice_group_map_type = 0;
    let mut slice_group_change_rate = 1;
    if num_slice_groups_minus1 > 0 {
        slice_group_map_type = r.read_ue()?;
        match slice_group_map_type {
            0 => {
                for _ in 0..=num_slice_groups_minus1 {
                    r.read_ue()?; // run_length_minus1
                }
            }
            2 => {
                for _ in 0..num_slice_groups_minus1 {
                    r.read_ue()?; // top_left
                    r.read_ue()?; // bottom_right
                }
            }
            3..=5 => {
                r.skip_bits(1)?; // slice_group_change_direction_flag
                slice_group_change_rate = r.read_ue()? + 1;
            }
            6 => {
                let pic_size_in_map_units = r.read_ue()? + 1;
                let id_bits = ceil_log2(num_slice_groups_minus1 + 1);
                for _ in 0..pic_size_in_map_units {
                    r.skip_bits(id_bits)?; // slice_group_id
                }
            }
            _ => {}
        }
    }

    let num_ref_idx_l0_default_active = r.read_ue()? + 1;
    let num_ref_idx_l1_default_active = r.read_ue()? + 1;

    let weighted_pred_flag = r.read_bool()?;
    let weighted_bipred_idc = r.read_bits(2)? as u8;

    let pic_init_qp_minus26 = r.read_se()?;
    r.read_se()?; // pic_init_qs_minus26
    let chroma_qp_index_offset = r.read_se()?;

    let deblocking_filter_control_present_flag = r.read_bool()?;
    let constrained_intra_pred_flag = r.read_bool()?;
    let redundant_pic_cnt_present_flag = r.read_bool()?;

    // PPS extension (High profile): present only when more syntax remains
    let mut transform_8x8_mode_flag = false;
    if r.more_rbsp_data() {
        transform_8x8_mode_flag = r.read_bool()?;
        let pic_scaling_matrix_present = r.read_bool()?;
        if pic_scaling_matrix_present {
            let list_count = 6 + if transform_8x8_mode_flag { 2 } else { 0 };
            for i in 0..list_count {
                let present = r.read_bool()?;
                if present {
                    skip_scaling_list(&mut r, if i < 6 { 16 } else { 64 })?;
                }
            }
        }
        r.read_se()?; // second_chroma_qp_index_offset
    }

    Ok(Pps {
        pic_parameter_set_id,
        seq_parameter_set_id,
        entropy_coding_mode_flag,
        pic_order_present_flag,
        num_slice_groups_minus1,
        slice_group_map_type,
        slice_group_change_rate,
        num_ref_idx_l0_default_active,
        num_ref_idx_l1_default_active,
        weighted_pred_flag,
        weighted_bipred_idc,
        pic_init_qp_minus26,
        chroma_qp_index_offset,
        deblocking_filter_control_present_flag,
        constrained_intra_pred_flag,
        redundant_pic_cnt_present_flag,
        transform_8x8_mode_flag,
    })
}

fn ceil_log2(v: u32) -> u32 {
    32 - v.saturating_sub(1).leading_zeros()
}

/// Same delta-chain skip as the SPS scaling lists
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
