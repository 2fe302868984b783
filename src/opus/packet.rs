// Opus packets as seen through Ogg lacing
//
// An Ogg page stores its payload as lacing segments of at most 255 bytes. A
// run of 255-byte segments followed by a shorter one forms one Opus packet.
// The first segment of each audio packet carries the decoded TOC byte
// (RFC 6716, section 3.1), which is all we need to compute granule positions
// and to grow a packet with code 3 padding.

use crate::error::{Result, TafError};
use crate::ogg::OGG_LACING_CONTINUE;

pub const SAMPLE_RATE_KHZ: u32 = 48;

/// Frame layout decoded from a packet's TOC byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketInfo {
    /// Configuration number (bits 3..8 of the TOC byte)
    pub config: u8,
    pub stereo: bool,
    /// Frame count code 0..=3
    pub framepacking: u8,
    pub frame_count: u8,
    /// Code 3 packet with the padding flag set
    pub padded: bool,
}

impl PacketInfo {
    /// Parse the TOC (and for code 3 the frame count byte) of a packet
    pub fn parse(data: &[u8]) -> Result<Self> {
        let toc = *data
            .first()
            .ok_or_else(|| TafError::MalformedPacket("empty packet".to_string()))?;

        let config = toc >> 3;
        if !(16..=31).contains(&config) {
            return Err(TafError::UnsupportedPacket { config });
        }

        let framepacking = toc & 0b11;
        let (frame_count, padded) = match framepacking {
            0 => (1, false),
            1 | 2 => (2, false),
            _ => {
                let count_byte = *data.get(1).ok_or_else(|| {
                    TafError::MalformedPacket("code 3 packet without frame count".to_string())
                })?;
                (count_byte & 0x3F, count_byte & 0x40 != 0)
            }
        };

        if frame_count == 0 {
            return Err(TafError::MalformedPacket("packet with zero frames".to_string()));
        }

        Ok(PacketInfo {
            config,
            stereo: toc & 0b100 != 0,
            framepacking,
            frame_count,
            padded,
        })
    }

    /// Duration of a single frame in samples at 48 kHz
    pub fn frame_samples(&self) -> u32 {
        // CELT-only configurations cycle through 2.5, 5, 10 and 20 ms
        let tenth_ms = match self.config & 0b11 {
            0 => 25,
            1 => 50,
            2 => 100,
            _ => 200,
        };
        tenth_ms * SAMPLE_RATE_KHZ / 10
    }

    /// Number of samples this packet decodes to
    pub fn granule(&self) -> u64 {
        self.frame_samples() as u64 * self.frame_count as u64
    }
}

/// One lacing segment of an Opus packet inside an Ogg page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpusPacket {
    pub data: Vec<u8>,
    /// Lacing value is 255, the packet continues in the next segment
    pub spanning_packet: bool,
    /// This segment starts a new packet
    pub first_packet: bool,
    /// Decoded TOC, only present on the first segment of an audio packet
    pub info: Option<PacketInfo>,
}

impl OpusPacket {
    pub fn new(data: Vec<u8>, first_packet: bool) -> Self {
        OpusPacket {
            spanning_packet: data.len() == OGG_LACING_CONTINUE,
            data,
            first_packet,
            info: None,
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Value written into the page's segment table
    pub fn lacing_value(&self) -> u8 {
        self.data.len() as u8
    }

    /// Samples contributed by the packet this segment starts
    pub fn granule(&self) -> u64 {
        match (self.first_packet, self.info) {
            (true, Some(info)) => info.granule(),
            _ => 0,
        }
    }

    /// Split complete packet bytes into lacing segments
    pub fn segment(data: &[u8], info: Option<PacketInfo>) -> Vec<OpusPacket> {
        let mut segments: Vec<OpusPacket> = data
            .chunks(OGG_LACING_CONTINUE)
            .map(|chunk| OpusPacket::new(chunk.to_vec(), false))
            .collect();

        // A multiple of 255 needs an empty segment to terminate the packet
        if data.len() % OGG_LACING_CONTINUE == 0 {
            segments.push(OpusPacket::new(Vec::new(), false));
        }

        segments[0].first_packet = true;
        segments[0].info = info;
        segments
    }
}

/// Number of lacing values a complete packet of `len` bytes occupies
pub fn lacing_count(len: usize) -> usize {
    len / OGG_LACING_CONTINUE + 1
}

/// Grow a packet by exactly `growth` bytes without touching its audio frames.
///
/// The packet is switched to frame count code 3 first (one extra byte). Any
/// remaining growth goes into the padding length field plus trailing zero
/// bytes, see RFC 6716 section 3.2.5. Already padded packets get their
/// padding extended.
pub fn grow_packet(data: &mut Vec<u8>, info: &mut PacketInfo, growth: usize) -> Result<()> {
    if growth == 0 {
        return Ok(());
    }
    if data.is_empty() {
        return Err(TafError::MalformedPacket("cannot pad an empty packet".to_string()));
    }

    let mut growth = growth;
    if info.framepacking != 3 {
        let mut count_byte = info.frame_count;
        if info.framepacking == 2 {
            count_byte |= 0x80; // vbr
        }
        data[0] |= 0b11;
        data.insert(1, count_byte);
        info.framepacking = 3;
        growth -= 1;
    }

    if growth == 0 {
        return Ok(());
    }

    // Bytes spent on padding so far: length field plus the padding itself
    let (field_len, padding) = if info.padded { padding_field(data)? } else { (0, 0) };
    let frames_end = data.len() - padding;
    if frames_end < 2 + field_len {
        return Err(TafError::MalformedPacket("padding exceeds packet".to_string()));
    }

    // Each 255 length byte stands for 254 padding bytes, the last byte for itself
    let overhead = field_len + padding + growth;
    let continuations = (overhead - 1) / 255;
    let last = (overhead - 1) % 255;

    let mut length_bytes = vec![255u8; continuations];
    length_bytes.push(last as u8);

    data.truncate(frames_end);
    data.splice(2..2 + field_len, length_bytes);
    data.resize(data.len() + 254 * continuations + last, 0);
    data[1] |= 0x40;
    info.padded = true;

    Ok(())
}

/// Length of the padding length field and the padding it announces
fn padding_field(data: &[u8]) -> Result<(usize, usize)> {
    let mut padding = 0;
    let mut index = 2;
    loop {
        let value = *data
            .get(index)
            .ok_or_else(|| TafError::MalformedPacket("truncated padding length".to_string()))?;
        index += 1;
        if value == 255 {
            padding += 254;
        } else {
            padding += value as usize;
            return Ok((index - 2, padding));
        }
    }
}
