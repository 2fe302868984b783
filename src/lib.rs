//! opus2taf - builds Toniebox audio files (TAF) from Opus or any ffmpeg readable audio
//!
//! A TAF is a 4 KiB protobuf header followed by one Ogg-Opus stream whose
//! audio pages are exactly one 4 KiB flash block each. Tracks are appended
//! as chapters of that single stream.

pub mod assembler;
pub mod checksum;
pub mod config;
pub mod error;
pub mod extract;
pub mod header;
pub mod ogg;
pub mod opus;
pub mod repack;
pub mod transcode;
mod utils;

pub use assembler::{AssemblerState, TafSummary, TafWriter, TrackAssembler};
pub use checksum::StreamChecksum;
pub use config::{collect_inputs, parse_timestamp, ConvertOptions, PageLayout};
pub use error::{Result, TafError};
pub use extract::{inspect, inspect_file, split_to_opus_files, ChapterInfo, TafInfo};
pub use header::{read_header, write_header, TonieHeader};
pub use ogg::OggPage;
pub use repack::PageRepacker;
pub use transcode::{open_track, ExternalTranscoder, OpusSource, Transcoder};
