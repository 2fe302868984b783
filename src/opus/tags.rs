// Opus comment header
//
// The box firmware expects the comment header written by the reference
// encoder setup, byte for byte: vendor "Lavf58.20.100", two encoder comments
// and a "pad=000..." comment that fills the packet to 436 bytes. With the
// 47 byte identification page this makes the first two pages exactly 512
// bytes long, leaving 0xE00 bytes of the first block for audio.

use std::io::Read;

use crate::error::{Result, TafError};
use crate::opus::OPUS_TAGS_SIGNATURE;

/// Comment header payload written into every TAF
pub static OPUS_TAGS: &[u8; 436] = b"OpusTags\x0d\x00\x00\x00Lavf58.20.100\
\x03\x00\x00\x00&\x00\x00\x00encoder=opusenc from opus-tools 0.1.10\
*\x00\x00\x00encoder_options=--quiet --bitrate 96 --vbr\
;\x01\x00\x00pad=\
0000000000000000000000000000000000000000000000000000000000000000\
0000000000000000000000000000000000000000000000000000000000000000\
0000000000000000000000000000000000000000000000000000000000000000\
0000000000000000000000000000000000000000000000000000000000000000\
0000000000000000000000000000000000000000000000000000000";

/// Vorbis style comment block of an OpusTags packet
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OpusTags {
    pub vendor_string: String,
    pub comments: Vec<(String, String)>,
}

impl OpusTags {
    /// Parse a complete OpusTags packet
    pub fn parse(packet: &[u8]) -> Result<Self> {
        if packet.len() < 8 || &packet[..8] != OPUS_TAGS_SIGNATURE {
            return Err(TafError::MalformedPacket(
                "comment header does not start with OpusTags".to_string(),
            ));
        }
        let mut reader = &packet[8..];

        let vendor_length = read_le_u32(&mut reader)? as usize;
        let vendor_string = read_string(&mut reader, vendor_length)?;

        let comment_count = read_le_u32(&mut reader)? as usize;
        let mut comments = Vec::with_capacity(comment_count.min(64));
        for _ in 0..comment_count {
            let comment_length = read_le_u32(&mut reader)? as usize;
            let comment = read_string(&mut reader, comment_length)?;

            // Parse comment (format: FIELD=value)
            if let Some((field, value)) = comment.split_once('=') {
                comments.push((field.to_string(), value.to_string()));
            }
        }

        Ok(OpusTags {
            vendor_string,
            comments,
        })
    }

    /// Get a comment value by field name
    pub fn get(&self, field: &str) -> Option<&String> {
        self.comments
            .iter()
            .find(|(f, _)| f.eq_ignore_ascii_case(field))
            .map(|(_, v)| v)
    }
}

fn read_le_u32(reader: &mut &[u8]) -> Result<u32> {
    let mut buffer = [0u8; 4];
    reader
        .read_exact(&mut buffer)
        .map_err(|_| TafError::MalformedPacket("truncated comment header".to_string()))?;
    Ok(u32::from_le_bytes(buffer))
}

fn read_string(reader: &mut &[u8], length: usize) -> Result<String> {
    if reader.len() < length {
        return Err(TafError::MalformedPacket("truncated comment header".to_string()));
    }
    let (bytes, rest) = reader.split_at(length);
    *reader = rest;
    Ok(String::from_utf8_lossy(bytes).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_tags_layout() {
        let tags = OpusTags::parse(OPUS_TAGS).unwrap();
        assert_eq!(tags.vendor_string, "Lavf58.20.100");
        assert_eq!(tags.comments.len(), 3);
        assert_eq!(
            tags.get("encoder").map(String::as_str),
            Some("opusenc from opus-tools 0.1.10")
        );
        assert_eq!(
            tags.get("ENCODER_OPTIONS").map(String::as_str),
            Some("--quiet --bitrate 96 --vbr")
        );
        let pad = tags.get("pad").unwrap();
        assert_eq!(pad.len(), 311);
        assert!(pad.bytes().all(|b| b == b'0'));
    }

    #[test]
    fn test_rejects_other_packets() {
        assert!(OpusTags::parse(b"OpusHead\x01\x02").is_err());
        assert!(OpusTags::parse(b"OpusTags\x05\x00").is_err());
    }
}
