// Conversion options and input enumeration

use std::path::{Path, PathBuf};

use human_sort::compare;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, TafError};

/// Size of a flash block and of the reserved header region
pub const BLOCK_SIZE: usize = 0x1000;

/// The first audio page shares its block with the two header pages
pub const FIRST_PAGE_SIZE: usize = 0xE00;

/// Audio file extensions picked up when a directory is given as input
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp3", "aac", "m4a", "wav", "flac", "ogg", "opus", "webm"];

/// Target sizes of repacked audio pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLayout {
    pub page_size: usize,
    /// Size of the very first audio page of the file
    pub first_page_size: usize,
}

impl Default for PageLayout {
    fn default() -> Self {
        PageLayout {
            page_size: BLOCK_SIZE,
            first_page_size: FIRST_PAGE_SIZE,
        }
    }
}

/// Options for one conversion run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertOptions {
    /// Reserve and write the tonie header block
    pub tonie_header: bool,
    /// Stream serial number and header timestamp, current time if unset
    pub timestamp: Option<u32>,
    /// Transcoder bitrate in kbps
    pub bitrate: u32,
    pub vbr: bool,
    pub ffmpeg: String,
    pub opusenc: String,
    pub layout: PageLayout,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        ConvertOptions {
            tonie_header: true,
            timestamp: None,
            bitrate: 96,
            vbr: true,
            ffmpeg: "ffmpeg".to_string(),
            opusenc: "opusenc".to_string(),
            layout: PageLayout::default(),
        }
    }
}

impl ConvertOptions {
    /// Timestamp to use for this run
    pub fn resolve_timestamp(&self) -> u32 {
        self.timestamp.unwrap_or_else(current_timestamp)
    }
}

/// Seconds since the epoch, saturated to 32 bits
pub fn current_timestamp() -> u32 {
    let now = chrono::Utc::now().timestamp();
    u32::try_from(now.max(0)).unwrap_or(u32::MAX)
}

/// Parse a decimal or `0x` prefixed hexadecimal timestamp
pub fn parse_timestamp(value: &str) -> Result<u32> {
    let value = value.trim();
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse::<u32>(),
    };
    parsed.map_err(|e| TafError::InvalidTimestamp(format!("{}: {}", value, e)))
}

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Resolve command line inputs into the ordered list of tracks.
///
/// Files are taken as given, directories contribute their supported audio
/// files in natural name order ("2" before "10"), anything else is treated as a glob pattern.
pub fn collect_inputs(inputs: &[String]) -> Result<Vec<PathBuf>> {
    let mut tracks = Vec::new();

    for input in inputs {
        let path = Path::new(input);
        if path.is_file() {
            tracks.push(path.to_path_buf());
        } else if path.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(path)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && has_supported_extension(p))
                .collect();
            entries.sort_by(|a, b| compare(&file_name(a), &file_name(b)));
            debug!(directory = %path.display(), count = entries.len(), "Collected directory");
            tracks.extend(entries);
        } else {
            match glob::glob(input) {
                Ok(paths) => {
                    let mut matched: Vec<PathBuf> = paths.filter_map(|p| p.ok()).filter(|p| p.is_file()).collect();
                    matched.sort_by(|a, b| compare(&a.to_string_lossy(), &b.to_string_lossy()));
                    if matched.is_empty() {
                        warn!(pattern = %input, "No files matched");
                    }
                    tracks.extend(matched);
                }
                Err(e) => warn!(pattern = %input, error = %e, "Invalid input pattern"),
            }
        }
    }

    if tracks.is_empty() {
        return Err(TafError::NoInputFiles);
    }
    Ok(tracks)
}
