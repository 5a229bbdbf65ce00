//! Shared helpers for integration tests
//!
//! Builds small, fully valid Annex B streams from scratch: baseline SPS
//! and PPS payloads, IDR / P slice headers, and a handful of macroblock
//! shapes (PCM, empty-residual I_16x16, inter with no residual). The
//! streams exercise the real parse path including emulation-prevention
//! escaping.

#![allow(dead_code)]

use avchash::bitstream::BitWriter;

/// Baseline frame-coded SPS for the given macroblock grid
pub fn build_sps_rbsp(width_mbs: u32, height_mbs: u32) -> Vec<u8> {
    let mut w = BitWriter::new();
    w.put_bits(66, 8); // profile_idc = Baseline
    w.put_bits(0, 8); // constraint flags
    w.put_bits(30, 8); // level_idc
    w.put_ue(0); // seq_parameter_set_id
    w.put_ue(0); // log2_max_frame_num_minus4
    w.put_ue(2); // pic_order_cnt_type
    w.put_ue(1); // max_num_ref_frames
    w.put_bit(0); // gaps_in_frame_num_value_allowed_flag
    w.put_ue(width_mbs - 1);
    w.put_ue(height_mbs - 1);
    w.put_bit(1); // frame_mbs_only_flag
    w.put_bit(1); // direct_8x8_inference_flag
    w.put_bit(0); // frame_cropping_flag
    w.put_bit(0); // vui_parameters_present_flag
    w.finish()
}

/// Minimal CAVLC PPS
pub fn build_pps_rbsp(pic_init_qp_minus26: i32) -> Vec<u8> {
    let mut w = BitWriter::new();
    w.put_ue(0); // pic_parameter_set_id
    w.put_ue(0); // seq_parameter_set_id
    w.put_bit(0); // entropy_coding_mode_flag = CAVLC
    w.put_bit(0); // pic_order_present_flag
    w.put_ue(0); // num_slice_groups_minus1
    w.put_ue(0); // num_ref_idx_l0_default_active_minus1
    w.put_ue(0); // num_ref_idx_l1_default_active_minus1
    w.put_bit(0); // weighted_pred_flag
    w.put_bits(0, 2); // weighted_bipred_idc
    w.put_se(pic_init_qp_minus26);
    w.put_se(0); // pic_init_qs_minus26
    w.put_se(0); // chroma_qp_index_offset
    w.put_bit(0); // deblocking_filter_control_present_flag
    w.put_bit(0); // constrained_intra_pred_flag
    w.put_bit(0); // redundant_pic_cnt_present_flag
    w.finish()
}

/// CABAC PPS, for rejection tests
pub fn build_cabac_pps_rbsp() -> Vec<u8> {
    let mut w = BitWriter::new();
    w.put_ue(0);
    w.put_ue(0);
    w.put_bit(1); // entropy_coding_mode_flag = CABAC
    w.put_bit(0);
    w.put_ue(0);
    w.finish()
}

/// Insert emulation-prevention bytes into an RBSP payload
pub fn escape_rbsp(rbsp: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(rbsp.len());
    let mut zeros = 0usize;
    for &byte in rbsp {
        if zeros >= 2 && byte <= 0x03 {
            out.push(0x03);
            zeros = 0;
        }
        if byte == 0x00 {
            zeros += 1;
        } else {
            zeros = 0;
        }
        out.push(byte);
    }
    out
}

/// Wrap an RBSP payload as an Annex B NAL unit with a 4-byte start code
pub fn nal(header: u8, rbsp: &[u8]) -> Vec<u8> {
    let mut out = vec![0x00, 0x00, 0x00, 0x01, header];
    out.extend_from_slice(&escape_rbsp(rbsp));
    out
}

/// NAL header byte for an IDR slice (nal_ref_idc 3, type 5)
pub const NAL_IDR: u8 = 0x65;
/// NAL header byte for a non-IDR slice (nal_ref_idc 2, type 1)
pub const NAL_NON_IDR: u8 = 0x41;
/// NAL header byte for an SPS (nal_ref_idc 3, type 7)
pub const NAL_SPS: u8 = 0x67;
/// NAL header byte for a PPS (nal_ref_idc 3, type 8)
pub const NAL_PPS: u8 = 0x68;

/// Builds one slice RBSP: header fields, then macroblocks
pub struct SliceBuilder {
    w: BitWriter,
}

impl SliceBuilder {
    /// IDR I-slice header (pair with [`NAL_IDR`])
    pub fn idr(first_mb: u32, qp_delta: i32) -> Self {
        let mut w = BitWriter::new();
        w.put_ue(first_mb);
        w.put_ue(7); // slice_type: I, all slices in picture
        w.put_ue(0); // pic_parameter_set_id
        w.put_bits(0, 4); // frame_num
        w.put_ue(0); // idr_pic_id
        w.put_bits(0, 2); // no_output_of_prior_pics, long_term_reference
        w.put_se(qp_delta);
        SliceBuilder { w }
    }

    /// Non-IDR P-slice header (pair with [`NAL_NON_IDR`])
    pub fn p(first_mb: u32, frame_num: u32, qp_delta: i32) -> Self {
        let mut w = BitWriter::new();
        w.put_ue(first_mb);
        w.put_ue(5); // slice_type: P, all slices in picture
        w.put_ue(0); // pic_parameter_set_id
        w.put_bits(frame_num, 4);
        w.put_bit(0); // num_ref_idx_active_override_flag
        w.put_bit(0); // ref_pic_list_modification_flag_l0
        w.put_bit(0); // adaptive_ref_pic_marking_mode_flag
        w.put_se(qp_delta);
        SliceBuilder { w }
    }

    /// I_PCM macroblock with uniform sample values per plane
    pub fn pcm_mb(mut self, luma: u8, cb: u8, cr: u8) -> Self {
        self.w.put_ue(25); // mb_type: I_PCM
        while self.w.bit_len() % 8 != 0 {
            self.w.put_bit(0); // pcm_alignment_zero_bit
        }
        for _ in 0..256 {
            self.w.put_bits(luma as u32, 8);
        }
        for _ in 0..64 {
            self.w.put_bits(cb as u32, 8);
        }
        for _ in 0..64 {
            self.w.put_bits(cr as u32, 8);
        }
        self
    }

    /// I_16x16 macroblock, DC prediction, no coded residual at all
    /// (mb_type 3 = I_16x16_2_0_0), with an empty luma DC block
    pub fn i16_empty_mb(mut self) -> Self {
        self.w.put_ue(3); // mb_type
        self.w.put_ue(0); // intra_chroma_pred_mode
        self.w.put_se(0); // mb_qp_delta
        // Intra16x16DCLevel with nC = 0: coeff_token (0,0) is "1"
        self.w.put_bit(1);
        self
    }

    /// I_16x16 macroblock (DC prediction, cbp 0) whose luma DC block
    /// holds a single trailing one
    pub fn i16_dc_one_mb(mut self, negative: bool) -> Self {
        self.w.put_ue(3); // mb_type
        self.w.put_ue(0); // intra_chroma_pred_mode
        self.w.put_se(0); // mb_qp_delta
        // coeff_token (total_coeff 1, trailing_ones 1) in context 0: "01"
        self.w.put_bits(0b01, 2);
        self.w.put_bit(negative as u32); // trailing-one sign
        self.w.put_bit(1); // total_zeros = 0: "1"
        self
    }

    /// Vertical-prediction I_16x16 macroblock, no residual
    /// (mb_type 1 = I_16x16_0_0_0)
    pub fn i16_vertical_mb(mut self) -> Self {
        self.w.put_ue(1); // mb_type
        self.w.put_ue(0); // intra_chroma_pred_mode
        self.w.put_se(0); // mb_qp_delta
        self.w.put_bit(1); // empty DC block
        self
    }

    /// mb_skip_run for inter slices
    pub fn skip_run(mut self, run: u32) -> Self {
        self.w.put_ue(run);
        self
    }

    /// P_L0_16x16 macroblock with zero motion and no residual
    pub fn p16_mb(mut self) -> Self {
        self.w.put_ue(0); // mb_type: P_L0_16x16
        self.w.put_se(0); // mvd_l0 x
        self.w.put_se(0); // mvd_l0 y
        self.w.put_ue(0); // coded_block_pattern: inter code 0 -> cbp 0
        self
    }

    /// Append raw bits (for hand-built or deliberately broken payloads)
    pub fn raw_bits(mut self, value: u32, n: u32) -> Self {
        self.w.put_bits(value, n);
        self
    }

    /// Finish the RBSP (adds the stop bit and alignment)
    pub fn finish(self) -> Vec<u8> {
        self.w.finish()
    }
}

/// A complete stream: SPS + PPS + the given slice NALs
pub fn build_stream(width_mbs: u32, height_mbs: u32, slices: &[(u8, Vec<u8>)]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&nal(NAL_SPS, &build_sps_rbsp(width_mbs, height_mbs)));
    out.extend_from_slice(&nal(NAL_PPS, &build_pps_rbsp(0)));
    for (header, rbsp) in slices {
        out.extend_from_slice(&nal(*header, rbsp));
    }
    out
}

/// All-PCM IDR frame covering the whole grid with a uniform luma value
pub fn build_pcm_frame(width_mbs: u32, height_mbs: u32, luma: u8) -> Vec<u8> {
    let mut slice = SliceBuilder::idr(0, 0);
    for _ in 0..width_mbs * height_mbs {
        slice = slice.pcm_mb(luma, 128, 128);
    }
    build_stream(width_mbs, height_mbs, &[(NAL_IDR, slice.finish())])
}
