// Track assembly
//
// Writes a TAF file track by track:
// - reserved header block (optional)
// - identification and comment pages of the first track
// - repacked audio pages of every track, one continuous logical stream
// - the tonie header, once hash and length of the audio region are known

use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::checksum::StreamChecksum;
use crate::config::{ConvertOptions, PageLayout};
use crate::error::{Result, TafError};
use crate::header::{write_header, TonieHeader, HEADER_REGION_SIZE};
use crate::ogg::OggPage;
use crate::opus::{check_identification_header, OpusTags, OPUS_TAGS, SAMPLE_RATE_KHZ};
use crate::repack::PageRepacker;
use crate::transcode::{open_track, Transcoder};

/// Progress of a [`TafWriter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblerState {
    ExpectingFirstTrack,
    /// Number of tracks written so far
    ProcessingTrack(usize),
    Sealed,
}

/// Outcome of a finished conversion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TafSummary {
    pub timestamp: u32,
    pub tonie_header: bool,
    pub tracks: usize,
    pub chapter_pages: Vec<u32>,
    pub audio_pages: u32,
    pub data_length: u64,
    pub data_hash: String,
    pub granule: u64,
    pub duration_seconds: f64,
}

/// Streaming TAF writer over any seekable output
pub struct TafWriter<W: Write + Seek> {
    writer: W,
    timestamp: u32,
    tonie_header: bool,
    layout: PageLayout,
    checksum: StreamChecksum,
    repacker: Option<PageRepacker>,
    chapters: Vec<u32>,
    state: AssemblerState,
    last_track_written: bool,
}

impl<W: Write + Seek> TafWriter<W> {
    /// Start a new file. With `tonie_header` set, the header block is
    /// reserved with zeros and filled in by [`TafWriter::finish`].
    pub fn new(mut writer: W, timestamp: u32, tonie_header: bool, layout: PageLayout) -> Result<Self> {
        if tonie_header {
            writer.write_all(&[0u8; HEADER_REGION_SIZE])?;
        }

        Ok(TafWriter {
            writer,
            timestamp,
            tonie_header,
            layout,
            checksum: StreamChecksum::new(),
            repacker: None,
            chapters: Vec::new(),
            state: AssemblerState::ExpectingFirstTrack,
            last_track_written: false,
        })
    }

    pub fn state(&self) -> AssemblerState {
        self.state
    }

    pub fn chapters(&self) -> &[u32] {
        &self.chapters
    }

    /// Append one Ogg-Opus track and return its chapter page.
    ///
    /// `last_track` marks the final page of this track as end of stream.
    pub fn append_track<R: Read + Seek>(&mut self, reader: &mut R, last_track: bool) -> Result<u32> {
        let tracks_done = match self.state {
            AssemblerState::Sealed => return Err(TafError::WriterState("file is already sealed")),
            _ if self.last_track_written => {
                return Err(TafError::WriterState("last track was already written"))
            }
            AssemblerState::ExpectingFirstTrack => 0,
            AssemblerState::ProcessingTrack(done) => done,
        };

        if tracks_done == 0 {
            self.copy_header_pages(reader)?;
        } else {
            skip_header_pages(reader)?;
        }

        let mut pages = Vec::new();
        while OggPage::seek_to_page_header(reader)? {
            pages.push(OggPage::read(reader, true)?);
        }
        debug!(source_pages = pages.len(), "Read track");
        if pages.iter().all(|page| page.segments.is_empty()) {
            return Err(TafError::MissingPage { what: "Audio" });
        }

        let timestamp = self.timestamp;
        let layout = self.layout;
        let repacker = self.repacker.get_or_insert_with(|| {
            let mut template = pages.first().map(OggPage::from_template).unwrap_or_default();
            template.serial_no = timestamp;
            PageRepacker::new(&template, layout)
        });

        let chapter = if tracks_done == 0 { 0 } else { repacker.next_page_no() };
        info!(track = tracks_done + 1, chapter, "Adding track");

        let repacked = repacker.repack(pages, last_track)?;
        for page in &repacked {
            page.write(&mut self.writer, Some(&mut self.checksum))?;
        }

        self.chapters.push(chapter);
        self.state = AssemblerState::ProcessingTrack(tracks_done + 1);
        self.last_track_written = last_track;
        Ok(chapter)
    }

    /// Identification and comment pages of the first track go to the output,
    /// the comment is replaced by the fixed tag payload.
    fn copy_header_pages<R: Read + Seek>(&mut self, reader: &mut R) -> Result<()> {
        if !OggPage::seek_to_page_header(reader)? {
            return Err(TafError::MissingPage { what: "First" });
        }
        let mut id_page = OggPage::read(reader, false)?;
        check_identification_header(&id_page)?;
        id_page.serial_no = self.timestamp;
        id_page.page_no = 0;
        id_page.checksum = id_page.calc_checksum();

        let mut tags_page = read_comment_pages(reader)?;
        if let Some(Ok(tags)) = tags_page.packets().first().map(|p| OpusTags::parse(p)) {
            debug!(
                vendor = %tags.vendor_string,
                title = tags.get("title").map(String::as_str).unwrap_or(""),
                "Replacing comment header"
            );
        }
        tags_page.serial_no = self.timestamp;
        tags_page.page_no = 1;
        tags_page.header_type = 0;
        tags_page.segments.clear();
        tags_page.push_packet(OPUS_TAGS, None);
        tags_page.correct_values(0)?;

        id_page.write(&mut self.writer, Some(&mut self.checksum))?;
        tags_page.write(&mut self.writer, Some(&mut self.checksum))?;
        Ok(())
    }

    /// Write the tonie header and flush the output
    pub fn finish(&mut self) -> Result<TafSummary> {
        let tracks = match self.state {
            AssemblerState::ExpectingFirstTrack => return Err(TafError::NoInputFiles),
            AssemblerState::Sealed => return Err(TafError::WriterState("file is already sealed")),
            AssemblerState::ProcessingTrack(done) => done,
        };
        if !self.last_track_written {
            warn!("Sealing a file whose last page has no end of stream flag");
        }

        let data_length = self.checksum.length();
        let digest = std::mem::take(&mut self.checksum).finalize();

        if self.tonie_header {
            let header = TonieHeader::with_contents(&digest, data_length, self.timestamp, self.chapters.clone());
            write_header(&mut self.writer, &header)?;
            self.writer.seek(SeekFrom::End(0))?;
        }
        self.writer.flush()?;
        self.state = AssemblerState::Sealed;

        let (audio_pages, granule) = match &self.repacker {
            Some(repacker) => (repacker.next_page_no() - crate::repack::FIRST_AUDIO_PAGE_NO, repacker.granule()),
            None => (0, 0),
        };

        Ok(TafSummary {
            timestamp: self.timestamp,
            tonie_header: self.tonie_header,
            tracks,
            chapter_pages: self.chapters.clone(),
            audio_pages,
            data_length,
            data_hash: hex::encode(digest),
            granule,
            duration_seconds: granule as f64 / (SAMPLE_RATE_KHZ as f64 * 1000.0),
        })
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Read the comment header, including pages it continues on
fn read_comment_pages<R: Read + Seek>(reader: &mut R) -> Result<OggPage> {
    if !OggPage::seek_to_page_header(reader)? {
        return Err(TafError::MissingPage { what: "Second" });
    }
    let first = OggPage::read(reader, false)?;

    let mut continues = first.segments.last().is_some_and(|s| s.spanning_packet);
    while continues {
        if !OggPage::seek_to_page_header(reader)? {
            return Err(TafError::MissingPage { what: "Comment continuation" });
        }
        let page = OggPage::read(reader, false)?;
        continues = page.segments.last().is_some_and(|s| s.spanning_packet);
    }
    Ok(first)
}

/// Validate and drop the header pages of a following track
fn skip_header_pages<R: Read + Seek>(reader: &mut R) -> Result<()> {
    if !OggPage::seek_to_page_header(reader)? {
        return Err(TafError::MissingPage { what: "First" });
    }
    let id_page = OggPage::read(reader, false)?;
    check_identification_header(&id_page)?;
    read_comment_pages(reader)?;
    Ok(())
}

/// Converts a list of input files into one TAF file
pub struct TrackAssembler<'a> {
    options: ConvertOptions,
    transcoder: &'a dyn Transcoder,
}

impl<'a> TrackAssembler<'a> {
    pub fn new(options: ConvertOptions, transcoder: &'a dyn Transcoder) -> Self {
        TrackAssembler { options, transcoder }
    }

    /// Convert `inputs` in order into `output`
    pub fn convert(&self, inputs: &[PathBuf], output: &Path) -> Result<TafSummary> {
        if inputs.is_empty() {
            return Err(TafError::NoInputFiles);
        }

        let timestamp = self.options.resolve_timestamp();
        let file = BufWriter::new(File::create(output)?);
        let mut writer = TafWriter::new(file, timestamp, self.options.tonie_header, self.options.layout)?;
        info!(output = %output.display(), timestamp = format!("{:#x}", timestamp), "Creating TAF");

        let width = inputs.len().to_string().len();
        for (index, input) in inputs.iter().enumerate() {
            info!("[{:0width$}/{}] {}", index + 1, inputs.len(), input.display(), width = width);

            let mut source = open_track(input, self.transcoder)?;
            writer.append_track(&mut source, index + 1 == inputs.len())?;
        }

        writer.finish()
    }
}
