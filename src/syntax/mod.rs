//! H.264 syntax parsing
//!
//! Structured records for the parameter sets and slice headers the
//! fingerprint pipeline needs. Each parser consumes a cleaned RBSP
//! payload (emulation-prevention bytes already removed, see
//! [`crate::nal`]) and reads the syntax bit-accurately, so that slice
//! parsing lands exactly at the start of macroblock data.

pub mod pps;
pub mod slice;
pub mod sps;

pub use pps::{parse_pps, Pps};
pub use slice::{parse_slice_header, SliceHeader, SliceType};
pub use sps::{parse_sps, Sps};
