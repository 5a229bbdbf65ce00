//! CAVLC residual block decoding
//!
//! Implements the §9.2 parsing process: coeff_token, trailing-one signs,
//! level prefix/suffix with adaptive suffix length, total_zeros and
//! run_before, producing the coefficient array in scan order. Only the
//! coefficient values are kept; no inverse transform is performed.

use super::tables::*;
use crate::bitstream::BitReader;
use crate::error::{Error, Result};

/// A decoded residual block
#[derive(Debug, Clone)]
pub struct ResidualBlock {
    /// Coefficients in scan order, length = max_num_coeff of the block
    pub coeffs: Vec<i32>,
    /// Number of non-zero coefficients (feeds neighbour nC contexts)
    pub total_coeff: u8,
}

impl ResidualBlock {
    /// Empty block (all coefficients zero)
    pub fn empty(max_num_coeff: usize) -> Self {
        ResidualBlock {
            coeffs: vec![0; max_num_coeff],
            total_coeff: 0,
        }
    }
}

/// Incrementally match a (length, bits) VLC table, returning the index of
/// the matched entry
fn read_vlc(r: &mut BitReader, lens: &[u8], bits: &[u16], max_len: u8) -> Result<usize> {
    let mut value = 0u16;
    for len in 1..=max_len {
        value = (value << 1) | r.read_bit()? as u16;
        for (idx, (&l, &b)) in lens.iter().zip(bits.iter()).enumerate() {
            if l == len && b == value {
                return Ok(idx);
            }
        }
    }
    Err(Error::invalid_data(format!(
        "no VLC match after {} bits",
        max_len
    )))
}

/// Read coeff_token for a block with the given nC context
///
/// `nc` is -1 for chroma-DC blocks, otherwise the predicted number of
/// non-zero coefficients from the neighbours. Returns
/// (total_coeff, trailing_ones).
fn read_coeff_token(r: &mut BitReader, nc: i32) -> Result<(u8, u8)> {
    if nc == -1 {
        let idx = read_vlc(
            r,
            &CHROMA_DC_COEFF_TOKEN_LEN,
            &CHROMA_DC_COEFF_TOKEN_BITS,
            8,
        )?;
        return Ok(((idx / 4) as u8, (idx % 4) as u8));
    }

    if nc >= 8 {
        // Fixed 6-bit code: total_coeff << 2 | trailing_ones, with
        // 000011 standing in for the empty block
        let code = r.read_bits(6)?;
        if code == 3 {
            return Ok((0, 0));
        }
        return Ok(((code >> 2) as u8, (code & 3) as u8));
    }

    let ctx = match nc {
        0 | 1 => 0,
        2 | 3 => 1,
        _ => 2,
    };
    let idx = read_vlc(r, &COEFF_TOKEN_LEN[ctx], &COEFF_TOKEN_BITS[ctx], 16)?;
    Ok(((idx / 4) as u8, (idx % 4) as u8))
}

/// Read one level_prefix (leading zeros before a 1)
fn read_level_prefix(r: &mut BitReader) -> Result<u32> {
    let mut prefix = 0u32;
    while r.read_bit()? == 0 {
        prefix += 1;
        if prefix > 47 {
            return Err(Error::invalid_data("level_prefix too long"));
        }
    }
    Ok(prefix)
}

/// Decode one CAVLC residual block
///
/// `max_num_coeff` is 16 for Luma4x4 / Intra16x16DC, 15 for AC blocks,
/// 4 for chroma DC. `nc` selects the coeff_token context. The returned
/// coefficient array is in scan order for the block (index 0 is the
/// lowest-frequency coefficient that block carries).
pub fn residual_block(r: &mut BitReader, nc: i32, max_num_coeff: usize) -> Result<ResidualBlock> {
    let (total_coeff, trailing_ones) = read_coeff_token(r, nc)?;
    let total_coeff = total_coeff as usize;
    let trailing_ones = trailing_ones as usize;

    if total_coeff > max_num_coeff {
        return Err(Error::invalid_data(format!(
            "coeff_token total_coeff {} exceeds block size {}",
            total_coeff, max_num_coeff
        )));
    }

    let mut block = ResidualBlock::empty(max_num_coeff);
    block.total_coeff = total_coeff as u8;
    if total_coeff == 0 {
        return Ok(block);
    }

    // Levels in decoding order: highest frequency first
    let mut levels = vec![0i32; total_coeff];

    for level in levels.iter_mut().take(trailing_ones) {
        *level = if r.read_bit()? == 1 { -1 } else { 1 };
    }

    let mut suffix_length = if total_coeff > 10 && trailing_ones < 3 {
        1u32
    } else {
        0u32
    };

    for i in trailing_ones..total_coeff {
        let level_prefix = read_level_prefix(r)?;

        let suffix_size = if level_prefix == 14 && suffix_length == 0 {
            4
        } else if level_prefix >= 15 {
            level_prefix - 3
        } else {
            suffix_length
        };

        let mut level_code = (level_prefix.min(15) << suffix_length) as i64;
        if suffix_size > 0 {
            level_code += r.read_bits(suffix_size)? as i64;
        }
        if level_prefix >= 15 && suffix_length == 0 {
            level_code += 15;
        }
        if level_prefix >= 16 {
            level_code += (1i64 << (level_prefix - 3)) - 4096;
        }
        if i == trailing_ones && trailing_ones < 3 {
            level_code += 2;
        }

        levels[i] = if level_code % 2 == 0 {
            ((level_code + 2) >> 1) as i32
        } else {
            (-((level_code + 1) >> 1)) as i32
        };

        if suffix_length == 0 {
            suffix_length = 1;
        }
        if levels[i].unsigned_abs() > (3 << (suffix_length - 1)) && suffix_length < 6 {
            suffix_length += 1;
        }
    }

    // total_zeros
    let mut zeros_left = if total_coeff < max_num_coeff {
        read_total_zeros(r, total_coeff, max_num_coeff)?
    } else {
        0
    };

    // Place levels into scan positions, highest frequency first
    let mut pos = total_coeff - 1 + zeros_left;
    if pos >= max_num_coeff {
        return Err(Error::invalid_data("total_zeros exceeds block size"));
    }
    for (k, &level) in levels.iter().enumerate() {
        block.coeffs[pos] = level;
        if k == total_coeff - 1 {
            break;
        }

        let run = if zeros_left > 0 {
            let row = (zeros_left.min(7) - 1) as usize;
            let idx = read_vlc(r, &RUN_BEFORE_LEN[row], &RUN_BEFORE_BITS[row], 11)?;
            idx
        } else {
            0
        };
        if run > zeros_left {
            return Err(Error::invalid_data("run_before exceeds zeros_left"));
        }
        zeros_left -= run;
        pos = pos
            .checked_sub(1 + run)
            .ok_or_else(|| Error::invalid_data("run placement underflow"))?;
    }

    Ok(block)
}

fn read_total_zeros(r: &mut BitReader, total_coeff: usize, max_num_coeff: usize) -> Result<usize> {
    let idx = if max_num_coeff == 4 {
        // Chroma DC variant
        let row = total_coeff - 1;
        read_vlc(
            r,
            &CHROMA_DC_TOTAL_ZEROS_LEN[row],
            &CHROMA_DC_TOTAL_ZEROS_BITS[row],
            3,
        )?
    } else {
        let row = total_coeff - 1;
        read_vlc(r, &TOTAL_ZEROS_LEN[row], &TOTAL_ZEROS_BITS[row], 9)?
    };
    Ok(idx)
}


#[cfg(test)]
mod tests {
    use super::testenc::put_coeff_token;
    use super::*;
    use crate::bitstream::BitWriter;

    #[test]
    fn test_empty_block() {
        let mut w = BitWriter::new();
        put_coeff_token(&mut w, 0, 0, 0);
        let data = w.finish();

        let mut r = BitReader::new(&data);
        let block = residual_block(&mut r, 0, 16).unwrap();
        assert_eq!(block.total_coeff, 0);
        assert!(block.coeffs.iter().all(|&c| c == 0));
    }

    #[test]
    fn test_single_trailing_one_at_dc() {
        // One coefficient, a trailing one, sitting at scan position 0:
        // coeff_token(1,1), sign bit, total_zeros = 0
        let mut w = BitWriter::new();
        put_coeff_token(&mut w, 0, 1, 1);
        w.put_bit(0); // positive sign
        // total_zeros for total_coeff=1: value 0 is code "1"
        w.put_bits(TOTAL_ZEROS_BITS[0][0] as u32, TOTAL_ZEROS_LEN[0][0] as u32);
        let data = w.finish();

        let mut r = BitReader::new(&data);
        let block = residual_block(&mut r, 0, 16).unwrap();
        assert_eq!(block.total_coeff, 1);
        assert_eq!(block.coeffs[0], 1);
        assert!(block.coeffs[1..].iter().all(|&c| c == 0));
    }

    #[test]
    fn test_negative_trailing_one_with_zeros() {
        // One coefficient at scan position 2 (total_zeros = 2)
        let mut w = BitWriter::new();
        put_coeff_token(&mut w, 0, 1, 1);
        w.put_bit(1); // negative sign
        w.put_bits(TOTAL_ZEROS_BITS[0][2] as u32, TOTAL_ZEROS_LEN[0][2] as u32);
        let data = w.finish();

        let mut r = BitReader::new(&data);
        let block = residual_block(&mut r, 0, 16).unwrap();
        assert_eq!(block.total_coeff, 1);
        assert_eq!(block.coeffs[2], -1);
        assert_eq!(block.coeffs[0], 0);
    }

    #[test]
    fn test_level_coding_beyond_trailing_ones() {
        // Two coefficients: one level (+3) then a trailing one, adjacent
        // at scan positions 1 and 0.
        // Decode order: trailing one first (highest frequency).
        let mut w = BitWriter::new();
        put_coeff_token(&mut w, 0, 2, 1);
        w.put_bit(0); // trailing one, positive
        // level for +3 with suffix_length 0 and the +2 first-level bias:
        // level_code = 2*3 - 2 - 2 = 2 -> level_prefix 2, no suffix
        w.put_bits(0b001, 3);
        // total_zeros for total_coeff=2: value 0 is "111"
        w.put_bits(TOTAL_ZEROS_BITS[1][0] as u32, TOTAL_ZEROS_LEN[1][0] as u32);
        // run_before between the two coefficients: zeros_left = 0, no bits
        let data = w.finish();

        let mut r = BitReader::new(&data);
        let block = residual_block(&mut r, 0, 16).unwrap();
        assert_eq!(block.total_coeff, 2);
        assert_eq!(block.coeffs[1], 1); // trailing one, higher frequency
        assert_eq!(block.coeffs[0], 3); // the explicit level at DC
    }

    #[test]
    fn test_chroma_dc_block() {
        // Chroma DC: 4-coefficient block, nC = -1.
        // Two trailing ones (+1, +1) with one zero between them.
        let mut w = BitWriter::new();
        put_coeff_token(&mut w, -1, 2, 2);
        w.put_bit(0); // +1
        w.put_bit(0); // +1
        // total_zeros (chroma, total_coeff=2): value 1 is "01"
        w.put_bits(
            CHROMA_DC_TOTAL_ZEROS_BITS[1][1] as u32,
            CHROMA_DC_TOTAL_ZEROS_LEN[1][1] as u32,
        );
        // run_before for the first coefficient: zeros_left = 1, run 1 = "0"
        w.put_bits(RUN_BEFORE_BITS[0][1] as u32, RUN_BEFORE_LEN[0][1] as u32);
        let data = w.finish();

        let mut r = BitReader::new(&data);
        let block = residual_block(&mut r, -1, 4).unwrap();
        assert_eq!(block.total_coeff, 2);
        assert_eq!(block.coeffs, vec![1, 0, 1, 0]);
    }

    #[test]
    fn test_full_block_no_total_zeros() {
        // total_coeff == max_num_coeff: total_zeros is absent.
        // Chroma DC with all four coefficients as trailing ones... CAVLC
        // caps trailing ones at 3, so use 3 ones and one level.
        let mut w = BitWriter::new();
        put_coeff_token(&mut w, -1, 4, 3);
        w.put_bit(0);
        w.put_bit(1);
        w.put_bit(0);
        // fourth coefficient: level +2 with suffix_length 0, no bias
        // (trailing_ones == 3): level_code = 2*2 - 2 = 2 -> prefix 2
        w.put_bits(0b001, 3);
        let data = w.finish();

        let mut r = BitReader::new(&data);
        let block = residual_block(&mut r, -1, 4).unwrap();
        assert_eq!(block.total_coeff, 4);
        // Scan order: the level decoded last lands at position 0
        assert_eq!(block.coeffs, vec![2, 1, -1, 1]);
    }

    #[test]
    fn test_high_nc_fixed_length_codes() {
        let mut w = BitWriter::new();
        put_coeff_token(&mut w, 8, 0, 0);
        let data = w.finish();
        let mut r = BitReader::new(&data);
        let block = residual_block(&mut r, 8, 16).unwrap();
        assert_eq!(block.total_coeff, 0);

        let mut w = BitWriter::new();
        put_coeff_token(&mut w, 9, 1, 1);
        w.put_bit(0);
        w.put_bits(TOTAL_ZEROS_BITS[0][0] as u32, TOTAL_ZEROS_LEN[0][0] as u32);
        let data = w.finish();
        let mut r = BitReader::new(&data);
        let block = residual_block(&mut r, 9, 16).unwrap();
        assert_eq!(block.total_coeff, 1);
        assert_eq!(block.coeffs[0], 1);
    }

    #[test]
    fn test_garbage_vlc_rejected() {
        // A long run of zeros matches nothing in the coeff_token table
        let data = vec![0x00, 0x00, 0x00];
        let mut r = BitReader::new(&data);
        assert!(residual_block(&mut r, 0, 16).is_err());
    }
}
