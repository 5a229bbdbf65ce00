//! Error types for avchash

use thiserror::Error;

/// Result type alias for avchash operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for avchash
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// BitReader ran out of bits mid-read
    #[error("Truncated bitstream: {0}")]
    TruncatedBitstream(String),

    /// Exp-Golomb leading-zero run exceeded 31 bits
    #[error("Invalid Exp-Golomb code: {0}")]
    InvalidExpGolomb(String),

    /// No SPS NAL unit before the first slice
    #[error("Missing SPS before first slice")]
    MissingSps,

    /// No PPS NAL unit before the first slice
    #[error("Missing PPS before first slice")]
    MissingPps,

    /// PPS selected CABAC; only CAVLC streams are supported
    #[error("Unsupported entropy mode: {0}")]
    UnsupportedEntropyMode(String),

    /// Stream uses a chroma format or profile feature outside 4:2:0
    #[error("Unsupported profile: {0}")]
    UnsupportedProfile(String),

    /// Serialized fingerprint is malformed or length-inconsistent
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// The encoder collaborator failed
    #[error("Encoder failure: {0}")]
    EncoderFailure(String),

    /// The encoder collaborator missed its deadline
    #[error("Encoder timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The encoder collaborator returned an empty bitstream
    #[error("Encoder produced no output")]
    NoOutput,
}

impl Error {
    /// Create a truncated-bitstream error
    pub fn truncated<S: Into<String>>(msg: S) -> Self {
        Error::TruncatedBitstream(msg.into())
    }

    /// Create an invalid-Exp-Golomb error
    pub fn exp_golomb<S: Into<String>>(msg: S) -> Self {
        Error::InvalidExpGolomb(msg.into())
    }

    /// Create an unsupported-profile error
    pub fn unsupported_profile<S: Into<String>>(msg: S) -> Self {
        Error::UnsupportedProfile(msg.into())
    }

    /// Create an invalid-data error
    pub fn invalid_data<S: Into<String>>(msg: S) -> Self {
        Error::InvalidData(msg.into())
    }

    /// Create an encoder-failure error
    pub fn encoder<S: Into<String>>(msg: S) -> Self {
        Error::EncoderFailure(msg.into())
    }
}
