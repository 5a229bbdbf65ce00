//! End-to-end extraction tests over constructed Annex B streams

mod common;

use avchash::{extract, DcMode, Error, Extractor};
use common::*;

#[test]
fn test_gray_frame_hash_shape() {
    // 128x96 image: an 8x6 macroblock grid, all intra
    let stream = build_pcm_frame(8, 6, 160);
    let fp = extract(&stream).unwrap();

    assert_eq!(fp.width, 128);
    assert_eq!(fp.height, 96);
    assert_eq!(fp.width_mbs, 8);
    assert_eq!(fp.height_mbs, 6);
    assert_eq!(fp.num_mbs(), 48);
    assert_eq!(fp.intra_ratio, 1.0);
    assert_eq!(fp.skip_ratio, 0.0);
    assert_eq!(fp.qp_avg, 26);

    // Uniform 160-gray PCM: every luma DC is 160 - 128
    assert!(fp.dc_luma.iter().all(|&dc| dc == 32));
    assert!(fp.dc_cb.iter().all(|&dc| dc == 0));
    assert_eq!(fp.dc_mean, 32);
    assert_eq!(fp.dc_std, 0.0);
    assert_eq!(fp.edge_density, 0.0);
}

#[test]
fn test_uniform_frame_fills_both_pyramids() {
    let stream = build_pcm_frame(8, 6, 200);
    let fp = extract(&stream).unwrap();

    assert_eq!(fp.pyramid_2x2, [72; 4]);
    assert_eq!(fp.pyramid_4x4, [72; 16]);
}

#[test]
fn test_emulation_prevention_survives_zero_heavy_payload() {
    // All-black PCM macroblocks produce long zero runs in the payload,
    // which the writer escapes and the scanner must unescape
    let stream = build_pcm_frame(2, 2, 0);

    // The escaped stream really does carry emulation-prevention bytes
    let has_epb = stream.windows(3).any(|w| w == [0x00, 0x00, 0x03]);
    assert!(has_epb);

    let fp = extract(&stream).unwrap();
    assert!(fp.dc_luma.iter().all(|&dc| dc == -128));
    assert_eq!(fp.intra_ratio, 1.0);
}

#[test]
fn test_i16x16_macroblock_types_and_modes() {
    // Two DC-predicted macroblocks with a one-coefficient DC block and
    // two vertical-predicted ones with empty DC blocks
    let slice = SliceBuilder::idr(0, 0)
        .i16_dc_one_mb(false)
        .i16_dc_one_mb(true)
        .i16_vertical_mb()
        .i16_vertical_mb()
        .finish();
    let stream = build_stream(2, 2, &[(NAL_IDR, slice)]);
    let fp = extract(&stream).unwrap();

    // mb_type 3 and 1 carry through as the fingerprint codes
    assert_eq!(fp.mb_types, vec![3, 3, 1, 1]);
    // DC prediction maps to 2, vertical to 1
    assert_eq!(fp.intra_modes, vec![2, 2, 1, 1]);
    // Single +/-1 DC coefficient averages to 0 over 16 blocks
    assert_eq!(fp.dc_luma, vec![0, 0, 0, 0]);
    assert_eq!(fp.intra_ratio, 1.0);
    // Two of four macroblocks use a directional mode
    assert_eq!(fp.edge_density, 0.5);
}

#[test]
fn test_multi_slice_qp_average() {
    // Two slices covering half the grid each, QPs 28 and 31
    let top = SliceBuilder::idr(0, 2).pcm_mb(128, 128, 128).pcm_mb(128, 128, 128);
    let bottom = SliceBuilder::idr(2, 5).pcm_mb(128, 128, 128).pcm_mb(128, 128, 128);
    let stream = build_stream(
        2,
        2,
        &[(NAL_IDR, top.finish()), (NAL_IDR, bottom.finish())],
    );

    let fp = extract(&stream).unwrap();
    // round((28 + 31) / 2) = 30
    assert_eq!(fp.qp_avg, 30);
    assert_eq!(fp.intra_ratio, 1.0);
}

#[test]
fn test_p_slice_skip_run() {
    // An IDR frame, then a P frame that skips every macroblock
    let idr = {
        let mut s = SliceBuilder::idr(0, 0);
        for _ in 0..4 {
            s = s.pcm_mb(150, 128, 128);
        }
        s.finish()
    };
    let p_all_skip = SliceBuilder::p(0, 1, 0).skip_run(4).finish();
    let stream = build_stream(2, 2, &[(NAL_IDR, idr), (NAL_NON_IDR, p_all_skip)]);

    let fp = extract(&stream).unwrap();
    assert!(fp.mb_types.iter().all(|&c| c == 37));
    assert_eq!(fp.skip_ratio, 1.0);
    assert_eq!(fp.intra_ratio, 0.0);
    // DC values from the IDR frame stay in place; skips carry no residual
    assert!(fp.dc_luma.iter().all(|&dc| dc == 22));
}

#[test]
fn test_p_slice_coded_macroblock() {
    let idr = {
        let mut s = SliceBuilder::idr(0, 0);
        for _ in 0..4 {
            s = s.pcm_mb(128, 128, 128);
        }
        s.finish()
    };
    // Skip two, code one P_L0_16x16, trailing skip of one
    let p = SliceBuilder::p(0, 1, 0)
        .skip_run(2)
        .p16_mb()
        .skip_run(1)
        .finish();
    let stream = build_stream(2, 2, &[(NAL_IDR, idr), (NAL_NON_IDR, p)]);

    let fp = extract(&stream).unwrap();
    assert_eq!(fp.mb_types, vec![37, 37, 26, 37]);
    assert_eq!(fp.skip_ratio, 0.75);
}

#[test]
fn test_truncated_slice_keeps_partial_features() {
    // First macroblock is complete; the second one's type begins and the
    // payload ends. The extractor keeps what it has.
    let slice = SliceBuilder::idr(0, 0)
        .pcm_mb(200, 128, 128)
        .raw_bits(0b101010, 6) // an I_4x4 mb_type, then the payload ends
        .finish();
    let stream = build_stream(2, 2, &[(NAL_IDR, slice)]);

    let fp = extract(&stream).unwrap();
    assert_eq!(fp.mb_types[0], 25);
    assert_eq!(fp.dc_luma[0], 72);
    assert_eq!(fp.mb_types[1], 0);
    assert_eq!(fp.dc_luma[1], 0);
}

#[test]
fn test_missing_sps_rejected() {
    let slice = SliceBuilder::idr(0, 0).pcm_mb(128, 128, 128).finish();
    let mut stream = Vec::new();
    stream.extend_from_slice(&nal(NAL_PPS, &build_pps_rbsp(0)));
    stream.extend_from_slice(&nal(NAL_IDR, &slice));

    assert!(matches!(extract(&stream), Err(Error::MissingSps)));
}

#[test]
fn test_missing_pps_rejected() {
    let slice = SliceBuilder::idr(0, 0).pcm_mb(128, 128, 128).finish();
    let mut stream = Vec::new();
    stream.extend_from_slice(&nal(NAL_SPS, &build_sps_rbsp(2, 2)));
    stream.extend_from_slice(&nal(NAL_IDR, &slice));

    assert!(matches!(extract(&stream), Err(Error::MissingPps)));
}

#[test]
fn test_cabac_stream_rejected() {
    let slice = SliceBuilder::idr(0, 0).pcm_mb(128, 128, 128).finish();
    let mut stream = Vec::new();
    stream.extend_from_slice(&nal(NAL_SPS, &build_sps_rbsp(2, 2)));
    stream.extend_from_slice(&nal(NAL_PPS, &build_cabac_pps_rbsp()));
    stream.extend_from_slice(&nal(NAL_IDR, &slice));

    assert!(matches!(
        extract(&stream),
        Err(Error::UnsupportedEntropyMode(_))
    ));
}

#[test]
fn test_sei_and_aud_nals_ignored() {
    let mut stream = Vec::new();
    stream.extend_from_slice(&nal(0x09, &[0xF0])); // AUD
    stream.extend_from_slice(&nal(NAL_SPS, &build_sps_rbsp(2, 2)));
    stream.extend_from_slice(&nal(0x06, &[0x05, 0x01, 0xAA, 0x80])); // SEI
    stream.extend_from_slice(&nal(NAL_PPS, &build_pps_rbsp(0)));
    let slice = {
        let mut s = SliceBuilder::idr(0, 0);
        for _ in 0..4 {
            s = s.pcm_mb(140, 128, 128);
        }
        s.finish()
    };
    stream.extend_from_slice(&nal(NAL_IDR, &slice));

    let fp = extract(&stream).unwrap();
    assert_eq!(fp.intra_ratio, 1.0);
    assert!(fp.dc_luma.iter().all(|&dc| dc == 12));
}

#[test]
fn test_extractor_is_deterministic() {
    let stream = build_pcm_frame(4, 3, 99);
    let a = extract(&stream).unwrap();
    let b = extract(&stream).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_approximate_dc_mode() {
    let stream = build_pcm_frame(2, 2, 150);
    let extractor = Extractor::with_dc_mode(DcMode::Approximate);
    let fp = extractor.extract(&stream).unwrap();

    // The degraded mode samples payload bytes rather than decoding
    // residuals; macroblocks are still typed as intra for an I slice
    assert!(fp.mb_types.iter().all(|&c| c == 2));
    assert_eq!(fp.intra_ratio, 1.0);
}

#[test]
fn test_grid_too_large_rejected() {
    // A 70000-wide grid does not fit the fingerprint's u16 fields
    let mut stream = Vec::new();
    stream.extend_from_slice(&nal(NAL_SPS, &build_sps_rbsp(70_000, 2)));
    stream.extend_from_slice(&nal(NAL_PPS, &build_pps_rbsp(0)));

    assert!(matches!(extract(&stream), Err(Error::InvalidData(_))));
}
