// Inspection and splitting of existing TAF files

use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::checksum::sha1_digest;
use crate::config::BLOCK_SIZE;
use crate::error::{Result, TafError};
use crate::header::{read_header, HeaderSummary, TonieHeader};
use crate::ogg::{OggPage, OGG_HEADER_TYPE_EOS, OGG_SIGNATURE};
use crate::opus::{check_identification_header, IdentificationHeader, SAMPLE_RATE_KHZ};
use crate::repack::FIRST_AUDIO_PAGE_NO;
use crate::utils::io::check_signature;

/// One chapter of a TAF file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChapterInfo {
    pub index: usize,
    pub page_no: u32,
    pub start_granule: u64,
    pub start_seconds: f64,
    pub duration_seconds: f64,
}

/// Report of [`inspect`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TafInfo {
    pub has_tonie_header: bool,
    pub header: Option<HeaderSummary>,
    pub identification: Option<IdentificationHeader>,
    pub audio_length: u64,
    pub audio_hash: String,
    pub hash_valid: Option<bool>,
    pub length_valid: Option<bool>,
    pub pages: usize,
    pub serial_no: Option<u32>,
    /// Page numbers whose stored CRC does not match their contents
    pub bad_checksums: Vec<u32>,
    /// Audio pages that do not end on a block boundary
    pub misaligned_pages: Vec<u32>,
    pub numbering_valid: bool,
    pub chapters_valid: bool,
    pub chapters: Vec<ChapterInfo>,
    pub granule: u64,
    pub duration_seconds: f64,
    pub valid: bool,
}

/// Audio region of a TAF, with its header if there is one
struct TafContents {
    header: Option<TonieHeader>,
    audio: Vec<u8>,
    pages: Vec<(usize, OggPage)>,
}

fn granule_seconds(granule: u64) -> f64 {
    granule as f64 / (SAMPLE_RATE_KHZ as f64 * 1000.0)
}

fn read_contents<R: Read + Seek>(reader: &mut R) -> Result<TafContents> {
    reader.seek(SeekFrom::Start(0))?;
    let header = if check_signature(reader, OGG_SIGNATURE)? {
        debug!("No tonie header, reading raw ogg stream");
        None
    } else {
        Some(read_header(reader)?)
    };

    let mut audio = Vec::new();
    reader.read_to_end(&mut audio)?;

    let mut cursor = Cursor::new(audio.as_slice());
    let mut pages = Vec::new();
    while OggPage::seek_to_page_header(&mut cursor)? {
        let offset = cursor.position() as usize;
        pages.push((offset, OggPage::read(&mut cursor, false)?));
    }

    Ok(TafContents { header, audio, pages })
}

/// Chapter start pages, a header-less stream is one chapter
fn chapter_pages(contents: &TafContents) -> Vec<u32> {
    match &contents.header {
        Some(header) => header.chapter_pages.clone(),
        None => vec![0],
    }
}

/// First audio page of a chapter, chapter 0 starts after the header pages
fn chapter_start(page_no: u32) -> u32 {
    page_no.max(FIRST_AUDIO_PAGE_NO)
}

/// Validate a TAF file (or a header-less TAF stream) and describe its layout
pub fn inspect<R: Read + Seek>(reader: &mut R) -> Result<TafInfo> {
    let contents = read_contents(reader)?;
    let pages = &contents.pages;

    let audio_hash = sha1_digest(&contents.audio);
    let audio_length = contents.audio.len() as u64;
    let (hash_valid, length_valid) = match &contents.header {
        Some(header) => (
            Some(header.data_hash == audio_hash),
            Some(header.data_length == audio_length),
        ),
        None => (None, None),
    };

    let identification = pages
        .first()
        .and_then(|(_, page)| check_identification_header(page).ok());

    let bad_checksums: Vec<u32> = pages
        .iter()
        .filter(|(_, page)| !page.verify_checksum())
        .map(|(_, page)| page.page_no)
        .collect();

    let misaligned_pages: Vec<u32> = pages
        .iter()
        .filter(|(_, page)| page.page_no >= FIRST_AUDIO_PAGE_NO)
        .filter(|(offset, page)| (offset + page.page_size()) % BLOCK_SIZE != 0)
        .map(|(_, page)| page.page_no)
        .collect();

    let numbering_valid = pages
        .iter()
        .enumerate()
        .all(|(index, (_, page))| page.page_no as usize == index);

    let granule_of = |page_no: u32| -> Option<u64> {
        pages
            .get(page_no as usize)
            .map(|(_, page)| page.granule_position)
    };
    let granule = pages.last().map(|(_, page)| page.granule_position).unwrap_or(0);

    let starts = chapter_pages(&contents);
    let chapters_valid = starts.first() == Some(&0)
        && starts.windows(2).all(|w| chapter_start(w[0]) < w[1])
        && starts.iter().all(|&p| (chapter_start(p) as usize) < pages.len());

    let mut chapters = Vec::new();
    if chapters_valid {
        for (index, &page_no) in starts.iter().enumerate() {
            let start_granule = granule_of(chapter_start(page_no) - 1).unwrap_or(0);
            let end_granule = starts
                .get(index + 1)
                .and_then(|&next| granule_of(next - 1))
                .unwrap_or(granule);
            chapters.push(ChapterInfo {
                index: index + 1,
                page_no,
                start_granule,
                start_seconds: granule_seconds(start_granule),
                duration_seconds: granule_seconds(end_granule.saturating_sub(start_granule)),
            });
        }
    }

    let eos_pages = pages
        .iter()
        .filter(|(_, page)| page.header_type & OGG_HEADER_TYPE_EOS != 0)
        .count();

    let valid = hash_valid.unwrap_or(true)
        && length_valid.unwrap_or(true)
        && identification.is_some()
        && bad_checksums.is_empty()
        && misaligned_pages.is_empty()
        && numbering_valid
        && chapters_valid
        && eos_pages == 1
        && pages.last().is_some_and(|(_, page)| page.is_eos());

    Ok(TafInfo {
        has_tonie_header: contents.header.is_some(),
        header: contents.header.as_ref().map(TonieHeader::summary),
        identification,
        audio_length,
        audio_hash: hex::encode(audio_hash),
        hash_valid,
        length_valid,
        pages: pages.len(),
        serial_no: pages.first().map(|(_, page)| page.serial_no),
        bad_checksums,
        misaligned_pages,
        numbering_valid,
        chapters_valid,
        chapters,
        granule,
        duration_seconds: granule_seconds(granule),
        valid,
    })
}

/// Inspect a file on disk
pub fn inspect_file(path: &Path) -> Result<TafInfo> {
    let mut reader = BufReader::new(File::open(path)?);
    inspect(&mut reader)
}

/// Write every chapter of a TAF file as a standalone Ogg-Opus file into
/// `output_dir`, named `NN_<file name>.opus`.
pub fn split_to_opus_files(input: &Path, output_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut reader = BufReader::new(File::open(input)?);
    let contents = read_contents(&mut reader)?;
    let pages: Vec<OggPage> = contents.pages.iter().map(|(_, page)| page.clone()).collect();

    if pages.len() <= FIRST_AUDIO_PAGE_NO as usize {
        return Err(TafError::MissingPage { what: "Audio" });
    }
    let header_pages = &pages[..FIRST_AUDIO_PAGE_NO as usize];

    let starts = chapter_pages(&contents);
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "taf".to_string());

    std::fs::create_dir_all(output_dir)?;
    let mut written = Vec::new();

    for (index, &page_no) in starts.iter().enumerate() {
        let first = chapter_start(page_no) as usize;
        let end = starts
            .get(index + 1)
            .map(|&next| next as usize)
            .unwrap_or(pages.len())
            .min(pages.len());
        if first >= end {
            return Err(TafError::InvalidHeader(format!(
                "chapter {} starts at page {} beyond its end {}",
                index + 1,
                first,
                end
            )));
        }

        let base_granule = pages[first - 1].granule_position;
        let path = output_dir.join(format!("{:02}_{}.opus", index + 1, name));
        let mut writer = BufWriter::new(File::create(&path)?);

        for page in header_pages {
            page.write(&mut writer, None)?;
        }
        for (offset, source) in pages[first..end].iter().enumerate() {
            let mut page = source.clone();
            page.page_no = FIRST_AUDIO_PAGE_NO + offset as u32;
            page.granule_position = source.granule_position.saturating_sub(base_granule);
            page.header_type &= !OGG_HEADER_TYPE_EOS;
            if first + offset + 1 == end {
                page.set_eos();
            }
            page.checksum = page.calc_checksum();
            page.write(&mut writer, None)?;
        }
        writer.flush()?;

        info!(chapter = index + 1, pages = end - first, path = %path.display(), "Wrote chapter");
        written.push(path);
    }

    Ok(written)
}
