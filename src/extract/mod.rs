//! Feature extraction pipeline
//!
//! Turns an Annex B byte stream into a [`Fingerprint`]: scan NAL units,
//! parse the first SPS and PPS, walk each slice's macroblocks, then fold
//! the per-macroblock features into summary statistics and the 2x2 / 4x4
//! spatial pyramids.
//!
//! The extractor is synchronous and stateless between calls; it is safe
//! to run on disjoint inputs from many threads.

mod cavlc;
mod macroblock;
mod tables;

pub use macroblock::MbFeatures;

use tracing::debug;

use crate::bitstream::BitReader;
use crate::error::{Error, Result};
use crate::fingerprint::{is_intra_code, is_skip_code, Fingerprint, MB_CODE_P_BASE};
use crate::nal::{NalIter, NAL_TYPE_IDR, NAL_TYPE_PPS, NAL_TYPE_SLICE, NAL_TYPE_SPS};
use crate::syntax::{parse_pps, parse_slice_header, parse_sps, SliceType, Sps};
use macroblock::MbWalker;

/// Upper bound on the macroblock grid, stopping absurd SPS dimensions
/// from driving allocation (1M macroblocks is a 256-megapixel frame)
const MAX_NUM_MBS: u32 = 1 << 20;

/// How per-macroblock DC values are obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DcMode {
    /// Decode the actual CAVLC residual DC coefficients
    #[default]
    Residual,
    /// Degraded mode: sample the cleaned slice payload at macroblock
    /// stride (`dc_luma[i] = rbsp[2i] - 128`) instead of decoding
    /// residuals. Cheap, but only a coarse texture proxy.
    Approximate,
}

/// Fingerprint extractor
#[derive(Debug, Default, Clone)]
pub struct Extractor {
    dc_mode: DcMode,
}

impl Extractor {
    /// Extractor with the reference (residual-decoding) behavior
    pub fn new() -> Self {
        Extractor::default()
    }

    /// Select how DC values are obtained
    pub fn with_dc_mode(dc_mode: DcMode) -> Self {
        Extractor { dc_mode }
    }

    /// Compute the fingerprint of an Annex B stream
    ///
    /// The stream must carry an SPS and a PPS before its first slice.
    /// Malformed macroblock data inside a slice stops the walk for that
    /// slice but keeps everything already extracted; parameter-set and
    /// slice-header errors abort the whole extraction.
    pub fn extract(&self, data: &[u8]) -> Result<Fingerprint> {
        let mut sps: Option<Sps> = None;
        let mut pps = None;
        let mut walker: Option<MbWalker> = None;
        let mut qp_sum = 0u32;
        let mut qp_count = 0u32;

        for nal in NalIter::new(data) {
            match nal.nal_unit_type {
                NAL_TYPE_SPS if sps.is_none() => {
                    let parsed = parse_sps(&nal.rbsp())?;
                    if parsed.num_mbs() == 0
                        || parsed.num_mbs() > MAX_NUM_MBS
                        || parsed.width_mbs() > u16::MAX as u32
                        || parsed.height_mbs() > u16::MAX as u32
                    {
                        return Err(Error::invalid_data(format!(
                            "macroblock grid {}x{} out of range",
                            parsed.width_mbs(),
                            parsed.height_mbs()
                        )));
                    }
                    sps = Some(parsed);
                }
                NAL_TYPE_PPS if pps.is_none() => {
                    pps = Some(parse_pps(&nal.rbsp())?);
                }
                NAL_TYPE_SLICE | NAL_TYPE_IDR => {
                    let sps = sps.as_ref().ok_or(Error::MissingSps)?;
                    let pps = pps.as_ref().ok_or(Error::MissingPps)?;
                    let walker = walker.get_or_insert_with(|| MbWalker::new(sps, pps));

                    let rbsp = nal.rbsp();
                    let mut r = BitReader::new(&rbsp);
                    let header =
                        parse_slice_header(&mut r, sps, pps, nal.nal_unit_type, nal.nal_ref_idc)?;
                    debug!(
                        slice_type = ?header.slice_type,
                        first_mb = header.first_mb_in_slice,
                        qp = header.slice_qp,
                        "slice"
                    );

                    qp_sum += header.slice_qp as u32;
                    qp_count += 1;

                    if header.first_mb_in_slice as usize >= walker.features.mb_types.len() {
                        debug!("first_mb_in_slice beyond grid; slice ignored");
                        continue;
                    }

                    match self.dc_mode {
                        DcMode::Residual => walker.walk_slice(&mut r, &header),
                        DcMode::Approximate => {
                            approximate_slice(&mut walker.features, &rbsp, &header)
                        }
                    }
                }
                _ => {}
            }
        }

        let sps = sps.ok_or(Error::MissingSps)?;
        if pps.is_none() {
            return Err(Error::MissingPps);
        }

        let features = match walker {
            Some(w) => w.features,
            None => MbFeatures::new(sps.num_mbs() as usize),
        };

        Ok(build_fingerprint(&sps, features, qp_sum, qp_count))
    }
}

/// Extract with the default (residual) extractor
pub fn extract(data: &[u8]) -> Result<Fingerprint> {
    Extractor::new().extract(data)
}

/// Degraded DC mode: sample the cleaned slice payload at macroblock
/// stride instead of decoding residuals
fn approximate_slice(features: &mut MbFeatures, rbsp: &[u8], header: &crate::syntax::SliceHeader) {
    let num_mbs = features.mb_types.len();
    let type_code = match header.slice_type {
        SliceType::I | SliceType::Si => 2,
        _ => MB_CODE_P_BASE,
    };

    for mb_idx in header.first_mb_in_slice as usize..num_mbs {
        let byte_idx = 2 * mb_idx;
        if byte_idx >= rbsp.len() {
            break;
        }
        features.mb_types[mb_idx] = type_code;
        features.dc_luma[mb_idx] = rbsp[byte_idx] as i16 - 128;
        if byte_idx + 1 < rbsp.len() {
            features.dc_cb[mb_idx] = rbsp[byte_idx + 1] as i16 - 128;
        }
    }
}

/// Fold per-macroblock features into the final record
fn build_fingerprint(sps: &Sps, features: MbFeatures, qp_sum: u32, qp_count: u32) -> Fingerprint {
    let width_mbs = sps.width_mbs() as usize;
    let height_mbs = sps.height_mbs() as usize;
    let num_mbs = width_mbs * height_mbs;

    let qp_avg = if qp_count == 0 {
        26
    } else {
        (qp_sum as f64 / qp_count as f64).round().clamp(0.0, 51.0) as u8
    };

    let skips = features.mb_types.iter().filter(|&&c| is_skip_code(c)).count();
    let intras = features.mb_types.iter().filter(|&&c| is_intra_code(c)).count();
    let edges = features
        .intra_modes
        .iter()
        .filter(|&&m| m != 0 && m != 2)
        .count();

    let dc_sum: i64 = features.dc_luma.iter().map(|&v| v as i64).sum();
    let dc_mean = (dc_sum / num_mbs as i64) as i16;
    let mean = dc_sum as f64 / num_mbs as f64;
    let variance = features
        .dc_luma
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / num_mbs as f64;

    let pyramid_2x2 = tile_means::<4>(&features.dc_luma, width_mbs, height_mbs, 2);
    let pyramid_4x4 = tile_means::<16>(&features.dc_luma, width_mbs, height_mbs, 4);

    Fingerprint {
        width: clamp_u16(sps.pixel_width()),
        height: clamp_u16(sps.pixel_height()),
        width_mbs: clamp_u16(sps.width_mbs()),
        height_mbs: clamp_u16(sps.height_mbs()),
        mb_types: features.mb_types,
        intra_modes: features.intra_modes,
        dc_luma: features.dc_luma,
        dc_cb: features.dc_cb,
        dc_cr: features.dc_cr,
        qp_avg,
        skip_ratio: skips as f32 / num_mbs as f32,
        intra_ratio: intras as f32 / num_mbs as f32,
        dc_mean,
        dc_std: variance.sqrt() as f32,
        edge_density: edges as f32 / num_mbs as f32,
        pyramid_2x2,
        pyramid_4x4,
    }
}

fn clamp_u16(v: u32) -> u16 {
    v.min(u16::MAX as u32) as u16
}

/// Integer mean of `dc` over a `tiles` x `tiles` tiling of the grid
///
/// Tile (px, py) covers x in [px*tw, min((px+1)*tw, w)) with tw = max(w /
/// tiles, 1), and likewise for y; entries land at index py*tiles + px.
/// A tile with no cells (grid smaller than the tiling) stays 0.
fn tile_means<const N: usize>(dc: &[i16], w: usize, h: usize, tiles: usize) -> [i16; N] {
    let tw = (w / tiles).max(1);
    let th = (h / tiles).max(1);
    let mut out = [0i16; N];

    for py in 0..tiles {
        for px in 0..tiles {
            let x0 = px * tw;
            let x1 = ((px + 1) * tw).min(w);
            let y0 = py * th;
            let y1 = ((py + 1) * th).min(h);
            if x0 >= x1 || y0 >= y1 {
                continue;
            }

            let mut sum = 0i64;
            let mut count = 0i64;
            for y in y0..y1 {
                for x in x0..x1 {
                    sum += dc[y * w + x] as i64;
                    count += 1;
                }
            }
            out[py * tiles + px] = (sum / count) as i16;
        }
    }

    out
}
