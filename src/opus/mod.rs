// OPUS format support (in OGG container)
//
// OPUS File Structure:
// - Uses OGG container
// - Identification header: "OpusHead" (19 bytes for mapping family 0) in first page
// - Comment header: "OpusTags" followed by Vorbis Comment in second page
// - Audio data pages
//
// The box only plays 48 kHz stereo streams, so the identification header is
// validated before any audio page of a track is used.
//
// Reference:
// - https://wiki.xiph.org/OggOpus
// - RFC 7845: Ogg Encapsulation for the Opus Audio Codec

pub mod packet;
pub mod tags;

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Serialize;

use crate::error::{Result, TafError};
use crate::ogg::{OggPage, OGG_SIGNATURE};

pub use packet::{OpusPacket, PacketInfo, SAMPLE_RATE_KHZ};
pub use tags::{OpusTags, OPUS_TAGS};

pub const OPUS_SIGNATURE: &[u8; 8] = b"OpusHead";
pub const OPUS_TAGS_SIGNATURE: &[u8; 8] = b"OpusTags";

/// Minimal identification header size (channel mapping family 0)
pub const OPUS_HEAD_SIZE: usize = 19;

pub const REQUIRED_CHANNELS: u8 = 2;
pub const REQUIRED_SAMPLE_RATE: u32 = SAMPLE_RATE_KHZ * 1000;

/// Fields of an OpusHead packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IdentificationHeader {
    pub version: u8,
    pub channels: u8,
    pub pre_skip: u16,
    pub input_sample_rate: u32,
    pub output_gain: i16,
    pub mapping_family: u8,
}

impl IdentificationHeader {
    /// Parse an OpusHead packet
    pub fn parse(packet: &[u8]) -> Result<Self> {
        if packet.len() < OPUS_HEAD_SIZE {
            return Err(TafError::InvalidIdentificationHeader {
                reason: format!("header is {} bytes, expected at least {}", packet.len(), OPUS_HEAD_SIZE),
            });
        }
        if &packet[..8] != OPUS_SIGNATURE {
            return Err(TafError::InvalidIdentificationHeader {
                reason: "missing OpusHead signature".to_string(),
            });
        }

        Ok(IdentificationHeader {
            version: packet[8],
            channels: packet[9],
            pre_skip: u16::from_le_bytes([packet[10], packet[11]]),
            input_sample_rate: u32::from_le_bytes([packet[12], packet[13], packet[14], packet[15]]),
            output_gain: i16::from_le_bytes([packet[16], packet[17]]),
            mapping_family: packet[18],
        })
    }

    /// Check the constraints of the box: version 1, stereo, 48 kHz
    pub fn validate(&self) -> Result<()> {
        let reason = if self.version != 1 {
            format!("unsupported version {}", self.version)
        } else if self.channels != REQUIRED_CHANNELS {
            format!("only stereo tracks are supported, found {} channel(s)", self.channels)
        } else if self.input_sample_rate != REQUIRED_SAMPLE_RATE {
            format!("sample rate needs to be 48 kHz, found {} Hz", self.input_sample_rate)
        } else {
            return Ok(());
        };
        Err(TafError::InvalidIdentificationHeader { reason })
    }
}

/// Parse and validate the identification header carried by a stream's first page
pub fn check_identification_header(page: &OggPage) -> Result<IdentificationHeader> {
    let segment = page
        .segments
        .first()
        .ok_or_else(|| TafError::InvalidIdentificationHeader {
            reason: "first page is empty".to_string(),
        })?;

    let header = IdentificationHeader::parse(&segment.data)?;
    header.validate()?;
    Ok(header)
}

/// Detect if file is an Ogg Opus stream
pub fn is_opus_file(path: &Path) -> bool {
    let Ok(mut file) = File::open(path) else {
        return false;
    };

    let mut page_header = [0u8; 27];
    if file.read_exact(&mut page_header).is_err() || &page_header[..4] != OGG_SIGNATURE {
        return false;
    }

    // Skip the segment table, the first packet starts right after it
    let segment_count = page_header[26] as usize;
    let mut segment_table = vec![0u8; segment_count];
    if file.read_exact(&mut segment_table).is_err() {
        return false;
    }

    let mut opus_sig = [0u8; 8];
    file.read_exact(&mut opus_sig).is_ok() && &opus_sig == OPUS_SIGNATURE
}
