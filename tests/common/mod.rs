// Synthetic Ogg-Opus streams and a transcoder stand-in for integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use opus2taf::ogg::{OggPage, OGG_HEADER_TYPE_BOS, OGG_HEADER_TYPE_EOS};
use opus2taf::opus::{PacketInfo, OPUS_SIGNATURE};
use opus2taf::{OpusSource, Result, TafError, Transcoder};

/// CELT fullband, stereo, one 20 ms frame
pub const TOC_CELT_20MS: u8 = (31 << 3) | 0b100;

pub const SOURCE_SERIAL: u32 = 0xCAFE;

pub fn opus_head(channels: u8, sample_rate: u32) -> Vec<u8> {
    let mut data = OPUS_SIGNATURE.to_vec();
    data.push(1);
    data.push(channels);
    data.extend_from_slice(&312u16.to_le_bytes());
    data.extend_from_slice(&sample_rate.to_le_bytes());
    data.extend_from_slice(&0i16.to_le_bytes());
    data.push(0);
    data
}

pub fn audio_packet(len: usize, seed: usize) -> Vec<u8> {
    let mut data: Vec<u8> = (0..len).map(|i| ((i * 7 + seed * 13) % 251) as u8).collect();
    data[0] = TOC_CELT_20MS;
    data
}

/// Ogg-Opus stream the way an encoder writes it: header pages, then audio
/// pages of `per_page` packets each
pub fn opus_stream_with(channels: u8, packet_sizes: &[usize], per_page: usize) -> Vec<u8> {
    let mut out = Vec::new();
    let mut page_no = 0;

    let mut head = OggPage::new();
    head.header_type = OGG_HEADER_TYPE_BOS;
    head.serial_no = SOURCE_SERIAL;
    head.push_packet(&opus_head(channels, 48000), None);
    head.correct_values(0).unwrap();
    out.extend(head.to_bytes());
    page_no += 1;

    let mut tags = OggPage::new();
    tags.serial_no = SOURCE_SERIAL;
    tags.page_no = page_no;
    tags.push_packet(b"OpusTags\x08\x00\x00\x00testsuit\x00\x00\x00\x00", None);
    tags.correct_values(0).unwrap();
    out.extend(tags.to_bytes());
    page_no += 1;

    let chunks: Vec<&[usize]> = packet_sizes.chunks(per_page.max(1)).collect();
    let mut granule = 0;
    for (index, chunk) in chunks.iter().enumerate() {
        let mut page = OggPage::new();
        page.serial_no = SOURCE_SERIAL;
        page.page_no = page_no;
        for (seed, &len) in chunk.iter().enumerate() {
            let data = audio_packet(len, seed + index);
            page.push_packet(&data, Some(PacketInfo::parse(&data).unwrap()));
        }
        if index + 1 == chunks.len() {
            page.header_type = OGG_HEADER_TYPE_EOS;
        }
        page.correct_values(granule).unwrap();
        granule = page.granule_position;
        out.extend(page.to_bytes());
        page_no += 1;
    }
    out
}

/// Stereo stream of `packets` packets of 20 ms with varying sizes
pub fn opus_stream(packets: usize) -> Vec<u8> {
    let sizes: Vec<usize> = (0..packets).map(|i| 120 + (i * 37) % 300).collect();
    opus_stream_with(2, &sizes, 17)
}

/// Transcoder answering with prepared streams instead of running ffmpeg
#[derive(Default)]
pub struct FakeTranscoder {
    streams: HashMap<PathBuf, Vec<u8>>,
}

impl FakeTranscoder {
    pub fn with_stream(mut self, input: &Path, stream: Vec<u8>) -> Self {
        self.streams.insert(input.to_path_buf(), stream);
        self
    }
}

impl Transcoder for FakeTranscoder {
    fn transcode(&self, input: &Path) -> Result<Box<dyn OpusSource>> {
        match self.streams.get(input) {
            Some(stream) => Ok(Box::new(Cursor::new(stream.clone()))),
            None => Err(TafError::TranscodeFailure {
                input: input.to_path_buf(),
                reason: "no prepared stream".to_string(),
            }),
        }
    }
}

/// All pages of an Ogg stream with their byte offsets
pub fn read_pages(data: &[u8]) -> Vec<(usize, OggPage)> {
    let mut cursor = Cursor::new(data);
    let mut pages = Vec::new();
    while OggPage::seek_to_page_header(&mut cursor).unwrap() {
        let offset = cursor.position() as usize;
        pages.push((offset, OggPage::read(&mut cursor, false).unwrap()));
    }
    pages
}
