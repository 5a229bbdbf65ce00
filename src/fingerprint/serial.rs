//! Fingerprint binary serialization
//!
//! Fixed little-endian layout with a 32-byte summary header followed by
//! the per-macroblock arrays and the pyramids:
//!
//! ```text
//! +--------------------------------------+
//! |  HEADER (32B)                        |
//! |    0  u16  width                     |
//! |    2  u16  height                    |
//! |    4  u16  width_mbs                 |
//! |    6  u16  height_mbs                |
//! |    8  u8   qp_avg                    |
//! |    9  f16  skip_ratio                |
//! |   11  f16  intra_ratio               |
//! |   13  i16  dc_mean                   |
//! |   15  f16  dc_std                    |
//! |   17  f16  edge_density              |
//! |   19  zero padding to offset 32      |
//! +--------------------------------------+
//! |  mb_types     (num_mbs bytes)        |
//! |  intra_modes  (num_mbs bytes)        |
//! |  dc_luma      (2 * num_mbs)          |
//! |  dc_cb        (2 * num_mbs)          |
//! |  dc_cr        (2 * num_mbs)          |
//! |  pyramid_2x2  (8 bytes)              |
//! |  pyramid_4x4  (32 bytes)             |
//! +--------------------------------------+
//! ```
//!
//! Total size is `32 + 8 * num_mbs + 40`. The ratio fields are stored as
//! IEEE-754 half-precision bit patterns. No magic number or version is
//! written; callers store a schema identifier at a higher layer.

use byteorder::{LittleEndian, ReadBytesExt};
use half::f16;
use std::io::Cursor;

use super::Fingerprint;
use crate::error::{Error, Result};

/// Size of the summary header in bytes
pub const HEADER_SIZE: usize = 32;

/// Trailing pyramid bytes (4 + 16 i16 values)
const PYRAMID_SIZE: usize = 40;

/// Serialized size for a grid of `num_mbs` macroblocks
pub fn serialized_len(num_mbs: usize) -> usize {
    HEADER_SIZE + 8 * num_mbs + PYRAMID_SIZE
}

/// Serialize a fingerprint to the fixed layout
pub fn serialize(fp: &Fingerprint) -> Vec<u8> {
    let num_mbs = fp.num_mbs();
    let mut out = Vec::with_capacity(serialized_len(num_mbs));

    out.extend_from_slice(&fp.width.to_le_bytes());
    out.extend_from_slice(&fp.height.to_le_bytes());
    out.extend_from_slice(&fp.width_mbs.to_le_bytes());
    out.extend_from_slice(&fp.height_mbs.to_le_bytes());
    out.push(fp.qp_avg);
    out.extend_from_slice(&f16::from_f32(fp.skip_ratio).to_bits().to_le_bytes());
    out.extend_from_slice(&f16::from_f32(fp.intra_ratio).to_bits().to_le_bytes());
    out.extend_from_slice(&fp.dc_mean.to_le_bytes());
    out.extend_from_slice(&f16::from_f32(fp.dc_std).to_bits().to_le_bytes());
    out.extend_from_slice(&f16::from_f32(fp.edge_density).to_bits().to_le_bytes());
    out.resize(HEADER_SIZE, 0);

    out.extend_from_slice(&fp.mb_types);
    out.extend_from_slice(&fp.intra_modes);
    for &v in fp.dc_luma.iter().chain(&fp.dc_cb).chain(&fp.dc_cr) {
        out.extend_from_slice(&v.to_le_bytes());
    }
    for &v in fp.pyramid_2x2.iter().chain(&fp.pyramid_4x4) {
        out.extend_from_slice(&v.to_le_bytes());
    }

    out
}

/// Deserialize a fingerprint, validating the length against the grid
pub fn deserialize(data: &[u8]) -> Result<Fingerprint> {
    if data.len() < HEADER_SIZE {
        return Err(Error::invalid_data(format!(
            "fingerprint shorter than header: {} bytes",
            data.len()
        )));
    }

    let mut cur = Cursor::new(data);
    let width = cur.read_u16::<LittleEndian>()?;
    let height = cur.read_u16::<LittleEndian>()?;
    let width_mbs = cur.read_u16::<LittleEndian>()?;
    let height_mbs = cur.read_u16::<LittleEndian>()?;
    let qp_avg = cur.read_u8()?;
    let skip_ratio = f16::from_bits(cur.read_u16::<LittleEndian>()?).to_f32();
    let intra_ratio = f16::from_bits(cur.read_u16::<LittleEndian>()?).to_f32();
    let dc_mean = cur.read_i16::<LittleEndian>()?;
    let dc_std = f16::from_bits(cur.read_u16::<LittleEndian>()?).to_f32();
    let edge_density = f16::from_bits(cur.read_u16::<LittleEndian>()?).to_f32();

    if width_mbs == 0 || height_mbs == 0 {
        return Err(Error::invalid_data("macroblock grid cannot be empty"));
    }

    let num_mbs = width_mbs as usize * height_mbs as usize;
    let expected = serialized_len(num_mbs);
    if data.len() != expected {
        return Err(Error::invalid_data(format!(
            "fingerprint length {} does not match {} for {} macroblocks",
            data.len(),
            expected,
            num_mbs
        )));
    }

    cur.set_position(HEADER_SIZE as u64);

    let mut mb_types = vec![0u8; num_mbs];
    std::io::Read::read_exact(&mut cur, &mut mb_types)?;
    let mut intra_modes = vec![0u8; num_mbs];
    std::io::Read::read_exact(&mut cur, &mut intra_modes)?;

    let read_i16s = |cur: &mut Cursor<&[u8]>, n: usize| -> Result<Vec<i16>> {
        let mut v = Vec::with_capacity(n);
        for _ in 0..n {
            v.push(cur.read_i16::<LittleEndian>()?);
        }
        Ok(v)
    };

    let dc_luma = read_i16s(&mut cur, num_mbs)?;
    let dc_cb = read_i16s(&mut cur, num_mbs)?;
    let dc_cr = read_i16s(&mut cur, num_mbs)?;

    let mut pyramid_2x2 = [0i16; 4];
    for v in pyramid_2x2.iter_mut() {
        *v = cur.read_i16::<LittleEndian>()?;
    }
    let mut pyramid_4x4 = [0i16; 16];
    for v in pyramid_4x4.iter_mut() {
        *v = cur.read_i16::<LittleEndian>()?;
    }

    Ok(Fingerprint {
        width,
        height,
        width_mbs,
        height_mbs,
        mb_types,
        intra_modes,
        dc_luma,
        dc_cb,
        dc_cr,
        qp_avg,
        skip_ratio,
        intra_ratio,
        dc_mean,
        dc_std,
        edge_density,
        pyramid_2x2,
        pyramid_4x4,
    })
}
