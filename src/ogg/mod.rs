// OGG container support
//
// OGG File Structure:
// - OGG Page Header (27 bytes)
//   - Capture Pattern: "OggS" (4 bytes)
//   - Version: 0 (1 byte)
//   - Header Type: 1=continuation, 2=bos, 4=eos (1 byte)
//   - Granule Position (8 bytes)
//   - Bitstream Serial Number (4 bytes)
//   - Page Sequence Number (4 bytes)
//   - CRC Checksum (4 bytes)
//   - Number of Page Segments (1 byte)
//   - Segment Table (variable)
//
// A TAF file carries one logical Opus stream: identification header page,
// comment header page, then audio pages of exactly one flash block each.

pub mod crc;
pub mod page;

pub use page::OggPage;

// OGG signature
pub const OGG_SIGNATURE: &[u8; 4] = b"OggS";

/// Size of the fixed part of a page header, up to and including the segment count
pub const OGG_PAGE_HEADER_SIZE: usize = 27;

/// Largest number of lacing values a page can hold
pub const OGG_MAX_SEGMENTS: usize = 255;

/// Lacing value that continues a packet into the next segment
pub const OGG_LACING_CONTINUE: usize = 255;

// OGG page header types
pub const OGG_HEADER_TYPE_CONTINUATION: u8 = 0x01;
pub const OGG_HEADER_TYPE_BOS: u8 = 0x02; // Beginning of Stream
pub const OGG_HEADER_TYPE_EOS: u8 = 0x04; // End of Stream
