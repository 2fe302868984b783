use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::ops::Range;

use tracing::warn;

use crate::checksum::StreamChecksum;
use crate::error::{Result, TafError};
use crate::ogg::crc::crc32;
use crate::ogg::{
    OGG_HEADER_TYPE_BOS, OGG_HEADER_TYPE_CONTINUATION, OGG_HEADER_TYPE_EOS, OGG_MAX_SEGMENTS,
    OGG_PAGE_HEADER_SIZE, OGG_SIGNATURE,
};
use crate::opus::packet::{grow_packet, lacing_count, OpusPacket, PacketInfo};
use crate::utils::io::{read_le_u32, read_le_u64, read_u8};

/// Capture pattern followed by stream structure version 0
const PAGE_CAPTURE: &[u8; 5] = b"OggS\0";

/// OGG Page
///
/// The payload is kept as lacing segments so packets can be moved between
/// pages and grown in place before the page is written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OggPage {
    pub version: u8,
    pub header_type: u8,
    pub granule_position: u64,
    pub serial_no: u32,
    pub page_no: u32,
    pub checksum: u32,
    pub segments: Vec<OpusPacket>,
}

impl OggPage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Position the reader at the start of the next page.
    /// Returns false when no further page exists.
    pub fn seek_to_page_header<R: Read + Seek>(reader: &mut R) -> Result<bool> {
        let mut window = [0u8; PAGE_CAPTURE.len()];
        let mut filled = 0usize;
        let mut byte = [0u8; 1];

        loop {
            match reader.read(&mut byte) {
                Ok(0) => return Ok(false),
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }

            if filled < window.len() {
                window[filled] = byte[0];
                filled += 1;
            } else {
                window.copy_within(1.., 0);
                window[PAGE_CAPTURE.len() - 1] = byte[0];
            }

            if filled == window.len() && &window == PAGE_CAPTURE {
                reader.seek(SeekFrom::Current(-(PAGE_CAPTURE.len() as i64)))?;
                return Ok(true);
            }
        }
    }

    /// Read OGG page from a reader positioned at its capture pattern.
    ///
    /// With `parse_info` set, the TOC of every packet starting on this page is
    /// decoded so the page can later be repacked and padded.
    pub fn read<R: Read>(reader: &mut R, parse_info: bool) -> Result<Self> {
        let mut signature = [0u8; 4];
        reader.read_exact(&mut signature)?;
        if &signature != OGG_SIGNATURE {
            return Err(TafError::InvalidPage("missing OggS capture pattern".to_string()));
        }

        let version = read_u8(reader)?;
        if version != 0 {
            return Err(TafError::InvalidPage(format!("unsupported version {}", version)));
        }

        let mut page = OggPage {
            version,
            header_type: read_u8(reader)?,
            granule_position: read_le_u64(reader)?,
            serial_no: read_le_u32(reader)?,
            page_no: read_le_u32(reader)?,
            checksum: read_le_u32(reader)?,
            segments: Vec::new(),
        };

        let segment_count = read_u8(reader)? as usize;
        let mut segment_table = vec![0u8; segment_count];
        reader.read_exact(&mut segment_table)?;

        let mut continued = page.is_continuation();
        for &lacing in &segment_table {
            let mut data = vec![0u8; lacing as usize];
            reader.read_exact(&mut data)?;

            let mut segment = OpusPacket::new(data, !continued);
            if parse_info && segment.first_packet && !segment.data.is_empty() {
                segment.info = Some(PacketInfo::parse(&segment.data)?);
            }
            continued = segment.spanning_packet;
            page.segments.push(segment);
        }

        let expected = page.calc_checksum();
        if expected != page.checksum {
            warn!(
                page_no = page.page_no,
                stored = format!("{:08x}", page.checksum),
                computed = format!("{:08x}", expected),
                "Page checksum mismatch"
            );
        }

        Ok(page)
    }

    /// Empty page sharing version, flags and serial number with `template`
    pub fn from_template(template: &OggPage) -> Self {
        OggPage {
            version: template.version,
            header_type: template.header_type
                & !(OGG_HEADER_TYPE_CONTINUATION | OGG_HEADER_TYPE_BOS | OGG_HEADER_TYPE_EOS),
            granule_position: template.granule_position,
            serial_no: template.serial_no,
            page_no: template.page_no,
            checksum: 0,
            segments: Vec::new(),
        }
    }

    pub fn is_continuation(&self) -> bool {
        self.header_type & OGG_HEADER_TYPE_CONTINUATION != 0
    }

    pub fn is_eos(&self) -> bool {
        self.header_type & OGG_HEADER_TYPE_EOS != 0
    }

    pub fn set_eos(&mut self) {
        self.header_type |= OGG_HEADER_TYPE_EOS;
    }

    /// Encoded size including header and segment table
    pub fn page_size(&self) -> usize {
        OGG_PAGE_HEADER_SIZE + self.segments.len() + self.payload_size()
    }

    pub fn payload_size(&self) -> usize {
        self.segments.iter().map(OpusPacket::size).sum()
    }

    /// Segments up to and including the first one that does not continue
    pub fn first_packet_segment_count(&self) -> usize {
        match self.segments.iter().position(|s| !s.spanning_packet) {
            Some(index) => index + 1,
            None => self.segments.len(),
        }
    }

    pub fn first_packet_size(&self) -> usize {
        self.segments[..self.first_packet_segment_count()]
            .iter()
            .map(OpusPacket::size)
            .sum()
    }

    /// Remove and return the segments of the leading packet
    pub fn take_first_packet(&mut self) -> Vec<OpusPacket> {
        let count = self.first_packet_segment_count();
        self.segments.drain(..count).collect()
    }

    /// Segment index ranges of the packets on this page, in order.
    /// A trailing packet continued on the next page is included as well.
    fn packet_ranges(&self) -> Vec<Range<usize>> {
        let mut ranges = Vec::new();
        let mut start = 0;
        for (index, segment) in self.segments.iter().enumerate() {
            if !segment.spanning_packet {
                ranges.push(start..index + 1);
                start = index + 1;
            }
        }
        if start < self.segments.len() {
            ranges.push(start..self.segments.len());
        }
        ranges
    }

    pub fn packet_count(&self) -> usize {
        self.packet_ranges().len()
    }

    /// Packet payloads as laid out on this page
    pub fn packets(&self) -> Vec<Vec<u8>> {
        self.packet_ranges()
            .into_iter()
            .map(|range| self.packet_data(range))
            .collect()
    }

    fn packet_data(&self, range: Range<usize>) -> Vec<u8> {
        self.segments[range]
            .iter()
            .flat_map(|s| s.data.iter().copied())
            .collect()
    }

    /// Append a complete packet
    pub fn push_packet(&mut self, data: &[u8], info: Option<PacketInfo>) {
        self.segments.extend(OpusPacket::segment(data, info));
    }

    /// Append already laced segments of one packet
    pub fn append_segments(&mut self, segments: Vec<OpusPacket>) {
        self.segments.extend(segments);
    }

    /// Remove and return the segments of the last packet
    pub fn pop_last_packet(&mut self) -> Option<Vec<OpusPacket>> {
        let range = self.packet_ranges().pop()?;
        Some(self.segments.drain(range).collect())
    }

    /// Grow the page to exactly `target` bytes.
    ///
    /// Growth is absorbed by Opus code 3 padding inside existing packets, so
    /// every packet still decodes to the same frames. Nothing is changed when
    /// the exact size cannot be reached.
    pub fn pad(&mut self, target: usize) -> Result<()> {
        let size = self.page_size();
        if size > target {
            return Err(TafError::PageOverflow { size, target });
        }
        let needed = target - size;
        if needed == 0 {
            return Ok(());
        }

        let segment_count = self.segments.len();
        let candidates: Vec<(Range<usize>, usize)> = self
            .packet_ranges()
            .into_iter()
            .rev()
            .filter(|range| self.can_grow(range))
            .map(|range| {
                let len = self.segments[range.clone()].iter().map(OpusPacket::size).sum();
                (range, len)
            })
            .collect();

        for (range, len) in &candidates {
            if let Some(growth) = packet_growth(*len, needed, segment_count) {
                return self.grow_packet_at(range.clone(), growth);
            }
        }

        // One packet alone can land on a page size its lacing skips, two never both do
        for (i, (later, later_len)) in candidates.iter().enumerate() {
            for (earlier, earlier_len) in &candidates[i + 1..] {
                for share in 1..needed.min(4) {
                    let Some(later_growth) = packet_growth(*later_len, share, segment_count) else {
                        continue;
                    };
                    let added_segments =
                        lacing_count(later_len + later_growth) - lacing_count(*later_len);
                    let Some(earlier_growth) =
                        packet_growth(*earlier_len, needed - share, segment_count + added_segments)
                    else {
                        continue;
                    };

                    // Grow the later packet first, the earlier range stays valid
                    self.grow_packet_at(later.clone(), later_growth)?;
                    return self.grow_packet_at(earlier.clone(), earlier_growth);
                }
            }
        }

        Err(TafError::PaddingImpossible { needed })
    }

    fn can_grow(&self, range: &Range<usize>) -> bool {
        let first = &self.segments[range.start];
        let terminated = !self.segments[range.end - 1].spanning_packet;
        terminated && first.first_packet && !first.data.is_empty() && first.info.is_some()
    }

    fn grow_packet_at(&mut self, range: Range<usize>, growth: usize) -> Result<()> {
        let mut info = self.segments[range.start]
            .info
            .ok_or_else(|| TafError::MalformedPacket("packet without TOC info".to_string()))?;
        let mut data = self.packet_data(range.clone());
        grow_packet(&mut data, &mut info, growth)?;

        let _ = self.segments.splice(range, OpusPacket::segment(&data, Some(info)));
        Ok(())
    }

    /// Finalize granule position and checksum.
    ///
    /// The granule position becomes `last_granule` plus the samples of every
    /// packet starting on this page.
    pub fn correct_values(&mut self, last_granule: u64) -> Result<()> {
        if self.segments.len() > OGG_MAX_SEGMENTS {
            return Err(TafError::TooManySegments(self.segments.len()));
        }

        let granule: u64 = self.segments.iter().map(OpusPacket::granule).sum();
        self.granule_position = last_granule + granule;
        self.checksum = self.calc_checksum();
        Ok(())
    }

    fn encode(&self, checksum: u32) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.page_size());
        data.extend_from_slice(OGG_SIGNATURE);
        data.push(self.version);
        data.push(self.header_type);
        data.extend_from_slice(&self.granule_position.to_le_bytes());
        data.extend_from_slice(&self.serial_no.to_le_bytes());
        data.extend_from_slice(&self.page_no.to_le_bytes());
        data.extend_from_slice(&checksum.to_le_bytes());
        data.push(self.segments.len() as u8);
        data.extend(self.segments.iter().map(OpusPacket::lacing_value));
        for segment in &self.segments {
            data.extend_from_slice(&segment.data);
        }
        data
    }

    /// CRC over the encoded page with the checksum field zeroed
    pub fn calc_checksum(&self) -> u32 {
        crc32(&self.encode(0))
    }

    pub fn verify_checksum(&self) -> bool {
        self.calc_checksum() == self.checksum
    }

    /// Encoded page with the stored checksum
    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode(self.checksum)
    }

    /// Write the page, feeding the emitted bytes to `checksum` when given
    pub fn write<W: Write>(&self, writer: &mut W, checksum: Option<&mut StreamChecksum>) -> Result<()> {
        let bytes = self.to_bytes();
        if let Some(checksum) = checksum {
            checksum.update(&bytes);
        }
        writer.write_all(&bytes)?;
        Ok(())
    }
}

/// Growth that makes a packet of `len` bytes take `page_bytes` more page
/// bytes, counting its lacing values. None when that size is unreachable or
/// the extra lacing values would overflow the segment table.
fn packet_growth(len: usize, page_bytes: usize, segment_count: usize) -> Option<usize> {
    // 255 * q + r bytes cost 256 * q + r + 1 page bytes with r < 255
    let target = len + lacing_count(len) + page_bytes;
    if target % 256 == 0 {
        return None;
    }

    let new_len = (target / 256) * 255 + target % 256 - 1;
    if segment_count + lacing_count(new_len) - lacing_count(len) > OGG_MAX_SEGMENTS {
        return None;
    }
    Some(new_len - len)
}
