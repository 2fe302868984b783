// Error types for TAF conversion

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for reading, repacking and writing TAF files
#[derive(Error, Debug)]
pub enum TafError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid ogg page: {0}")]
    InvalidPage(String),

    #[error("{what} ogg page not found")]
    MissingPage { what: &'static str },

    #[error("Invalid opus identification header: {reason}")]
    InvalidIdentificationHeader { reason: String },

    #[error("Transcoding {} failed: {reason}", input.display())]
    TranscodeFailure { input: PathBuf, reason: String },

    #[error(
        "Found config value {config} in opus packet, but CELT-only encodings (16-31) are required by the box"
    )]
    UnsupportedPacket { config: u8 },

    #[error("Malformed opus packet: {0}")]
    MalformedPacket(String),

    #[error("Opus packet of {size} bytes does not fit into a page of {limit} bytes")]
    PacketTooLarge { size: usize, limit: usize },

    #[error("Page is already {size} bytes, larger than the target of {target} bytes")]
    PageOverflow { size: usize, target: usize },

    #[error("Page cannot be padded by exactly {needed} bytes")]
    PaddingImpossible { needed: usize },

    #[error("Too many segments: {0} - max 255 allowed")]
    TooManySegments(usize),

    #[error("Failed to decode tonie header: {0}")]
    HeaderDecode(#[from] prost::DecodeError),

    #[error("Invalid tonie header: {0}")]
    InvalidHeader(String),

    #[error("Tonie header must be {expected} bytes, serialized to {actual}")]
    HeaderSize { expected: usize, actual: usize },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid writer state: {0}")]
    WriterState(&'static str),

    #[error("No input files")]
    NoInputFiles,
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, TafError>;
