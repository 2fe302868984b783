// Tonie header
//
// Layout of the reserved region at the start of a TAF file:
// - Header length (4 bytes, big-endian)
// - Protobuf encoded TonieHeader (exactly 0xFFC bytes, sized with the padding field)
//
// The header can only be built once all audio pages are written, it carries
// the SHA-1 and the length of everything after the region.

use std::io::{Read, Seek, SeekFrom, Write};

use prost::Message;
use serde::Serialize;

use crate::config::BLOCK_SIZE;
use crate::error::{Result, TafError};
use crate::utils::io::read_be_u32;

/// Size of the reserved region holding the header
pub const HEADER_REGION_SIZE: usize = BLOCK_SIZE;

/// Serialized header size, the region minus the length prefix
pub const HEADER_SIZE: usize = HEADER_REGION_SIZE - 4;

/// Padding used for the first, measuring serialization
const INITIAL_PADDING: usize = 0x100;

/// Header record read by the box firmware
#[derive(Clone, PartialEq, Message)]
pub struct TonieHeader {
    /// SHA-1 of the audio region
    #[prost(bytes = "vec", required, tag = "1")]
    pub data_hash: Vec<u8>,
    /// Length of the audio region in bytes
    #[prost(uint64, required, tag = "2")]
    pub data_length: u64,
    /// Also the serial number of every ogg page
    #[prost(uint32, required, tag = "3")]
    pub timestamp: u32,
    /// First page number of every chapter
    #[prost(uint32, repeated, packed = "true", tag = "4")]
    pub chapter_pages: Vec<u32>,
    #[prost(bytes = "vec", required, tag = "5")]
    pub padding: Vec<u8>,
}

/// Header fields in a form fit for reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeaderSummary {
    pub data_hash: String,
    pub data_length: u64,
    pub timestamp: u32,
    pub chapter_pages: Vec<u32>,
    pub padding_length: usize,
}

impl TonieHeader {
    pub fn with_contents(data_hash: &[u8], data_length: u64, timestamp: u32, chapter_pages: Vec<u32>) -> Self {
        TonieHeader {
            data_hash: data_hash.to_vec(),
            data_length,
            timestamp,
            chapter_pages,
            padding: Vec::new(),
        }
    }

    /// Serialize to exactly `HEADER_SIZE` bytes.
    ///
    /// The length prefix of the padding field depends on the padding length,
    /// so the header is measured with a fixed padding first and then encoded
    /// again with the corrected one.
    pub fn to_sized_bytes(&self) -> Result<Vec<u8>> {
        let mut header = self.clone();

        header.padding = vec![0u8; INITIAL_PADDING];
        let measured = header.encoded_len();

        let padding = (HEADER_SIZE + INITIAL_PADDING)
            .checked_sub(measured)
            .ok_or(TafError::HeaderSize {
                expected: HEADER_SIZE,
                actual: measured - INITIAL_PADDING,
            })?;
        header.padding = vec![0u8; padding];

        let bytes = header.encode_to_vec();
        if bytes.len() != HEADER_SIZE {
            return Err(TafError::HeaderSize {
                expected: HEADER_SIZE,
                actual: bytes.len(),
            });
        }
        Ok(bytes)
    }

    pub fn summary(&self) -> HeaderSummary {
        HeaderSummary {
            data_hash: hex::encode(&self.data_hash),
            data_length: self.data_length,
            timestamp: self.timestamp,
            chapter_pages: self.chapter_pages.clone(),
            padding_length: self.padding.len(),
        }
    }
}

/// Write length prefix and header at the start of the output
pub fn write_header<W: Write + Seek>(writer: &mut W, header: &TonieHeader) -> Result<()> {
    let bytes = header.to_sized_bytes()?;
    writer.seek(SeekFrom::Start(0))?;
    writer.write_all(&(bytes.len() as u32).to_be_bytes())?;
    writer.write_all(&bytes)?;
    Ok(())
}

/// Read the header from the start of a TAF file.
/// The reader is left at the first audio byte.
pub fn read_header<R: Read + Seek>(reader: &mut R) -> Result<TonieHeader> {
    reader.seek(SeekFrom::Start(0))?;
    let length = read_be_u32(reader)? as usize;
    if length == 0 || length > HEADER_SIZE {
        return Err(TafError::InvalidHeader(format!(
            "header length {} outside of 1..={}",
            length, HEADER_SIZE
        )));
    }

    let mut bytes = vec![0u8; length];
    reader.read_exact(&mut bytes)?;
    let header = TonieHeader::decode(bytes.as_slice())?;

    reader.seek(SeekFrom::Start(HEADER_REGION_SIZE as u64))?;
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn header(chapters: Vec<u32>) -> TonieHeader {
        TonieHeader::with_contents(&[0xAB; 20], 123_456, 0x5E1A_2B3C, chapters)
    }

    #[test]
    fn test_sized_bytes() {
        for chapters in [vec![0], vec![0, 30, 61], (0..400).map(|i| i * 9).collect()] {
            let bytes = header(chapters.clone()).to_sized_bytes().unwrap();
            assert_eq!(bytes.len(), HEADER_SIZE, "{} chapters", chapters.len());

            let decoded = TonieHeader::decode(bytes.as_slice()).unwrap();
            assert_eq!(decoded.chapter_pages, chapters);
            assert!(decoded.padding.iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn test_tiny_data_length_still_fills_region() {
        let bytes = TonieHeader::with_contents(&[0; 20], 0, 0, vec![0]).to_sized_bytes().unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE);
    }

    #[test]
    fn test_too_many_chapters() {
        let chapters: Vec<u32> = (0..2000).map(|i| 100_000 + i).collect();
        assert!(matches!(
            header(chapters).to_sized_bytes(),
            Err(TafError::HeaderSize { .. })
        ));
    }

    #[test]
    fn test_write_and_read_header() {
        let mut cursor = Cursor::new(vec![0u8; HEADER_REGION_SIZE + 10]);
        let original = header(vec![0, 12]);
        write_header(&mut cursor, &original).unwrap();
        assert_eq!(&cursor.get_ref()[..4], &[0x00, 0x00, 0x0F, 0xFC]);

        let parsed = read_header(&mut cursor).unwrap();
        assert_eq!(cursor.position(), HEADER_REGION_SIZE as u64);
        assert_eq!(parsed.data_hash, vec![0xAB; 20]);
        assert_eq!(parsed.data_length, 123_456);
        assert_eq!(parsed.timestamp, 0x5E1A_2B3C);
        assert_eq!(parsed.chapter_pages, vec![0, 12]);

        let summary = parsed.summary();
        assert_eq!(summary.data_hash, "ab".repeat(20));
    }

    #[test]
    fn test_read_rejects_bad_length() {
        let mut data = vec![0u8; HEADER_REGION_SIZE];
        data[..4].copy_from_slice(&0x2000u32.to_be_bytes());
        assert!(matches!(
            read_header(&mut Cursor::new(data)),
            Err(TafError::InvalidHeader(_))
        ));
    }
}
