// Transcoding of arbitrary audio into 48 kHz stereo Ogg-Opus
//
// ffmpeg decodes the input to WAV, its stdout is piped straight into
// opusenc. The encoded stream is spooled to memory (or a temporary file for
// long tracks) so the assembler can read it like any other Opus file.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::process::{Child, Command, Stdio};

use tempfile::SpooledTempFile;
use tracing::debug;

use crate::config::ConvertOptions;
use crate::error::{Result, TafError};
use crate::opus::is_opus_file;

/// Encoded streams up to this size stay in memory
const SPOOL_LIMIT: usize = 50 * 1024 * 1024;

/// Readable, seekable Ogg-Opus byte source
pub trait OpusSource: Read + Seek {}

impl<T: Read + Seek> OpusSource for T {}

/// Turns an input file into an Ogg-Opus stream
pub trait Transcoder {
    fn transcode(&self, input: &Path) -> Result<Box<dyn OpusSource>>;
}

/// Open `input` directly when it already is Ogg-Opus, otherwise transcode it
pub fn open_track(input: &Path, transcoder: &dyn Transcoder) -> Result<Box<dyn OpusSource>> {
    if is_opus_file(input) {
        debug!(input = %input.display(), "Using opus stream as is");
        Ok(Box::new(BufReader::new(File::open(input)?)))
    } else {
        debug!(input = %input.display(), "Transcoding");
        transcoder.transcode(input)
    }
}

/// Transcoder running the ffmpeg and opusenc executables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalTranscoder {
    pub ffmpeg: String,
    pub opusenc: String,
    pub bitrate: u32,
    pub vbr: bool,
}

impl ExternalTranscoder {
    pub fn from_options(options: &ConvertOptions) -> Self {
        ExternalTranscoder {
            ffmpeg: options.ffmpeg.clone(),
            opusenc: options.opusenc.clone(),
            bitrate: options.bitrate,
            vbr: options.vbr,
        }
    }

    pub fn ffmpeg_args(&self, input: &Path) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "warning".to_string(),
            "-i".to_string(),
            input.to_string_lossy().into_owned(),
            "-f".to_string(),
            "wav".to_string(),
            "-ar".to_string(),
            "48000".to_string(),
            "-ac".to_string(),
            "2".to_string(),
            "-".to_string(),
        ]
    }

    pub fn opusenc_args(&self) -> Vec<String> {
        let mode = if self.vbr { "--vbr" } else { "--hard-cbr" };
        vec![
            "--quiet".to_string(),
            mode.to_string(),
            "--bitrate".to_string(),
            self.bitrate.to_string(),
            "-".to_string(),
            "-".to_string(),
        ]
    }
}

fn failure(input: &Path, reason: String) -> TafError {
    TafError::TranscodeFailure {
        input: input.to_path_buf(),
        reason,
    }
}

/// Stop children of an aborted pipeline and collect their exit status
fn reap(children: &mut [&mut Child]) {
    for child in children.iter_mut() {
        let _ = child.kill();
        let _ = child.wait();
    }
}

fn wait_success(child: &mut Child, name: &str, input: &Path) -> Result<()> {
    let status = child
        .wait()
        .map_err(|e| failure(input, format!("waiting for {} failed: {}", name, e)))?;
    if !status.success() {
        return Err(failure(input, format!("{} exited with {}", name, status)));
    }
    Ok(())
}

impl Transcoder for ExternalTranscoder {
    fn transcode(&self, input: &Path) -> Result<Box<dyn OpusSource>> {
        let mut ffmpeg = Command::new(&self.ffmpeg)
            .args(self.ffmpeg_args(input))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| failure(input, format!("failed to start {}: {}", self.ffmpeg, e)))?;

        let wav = ffmpeg
            .stdout
            .take()
            .ok_or_else(|| failure(input, "ffmpeg stdout not captured".to_string()))?;

        let mut opusenc = match Command::new(&self.opusenc)
            .args(self.opusenc_args())
            .stdin(Stdio::from(wav))
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                reap(&mut [&mut ffmpeg]);
                return Err(failure(input, format!("failed to start {}: {}", self.opusenc, e)));
            }
        };

        let Some(mut encoded) = opusenc.stdout.take() else {
            reap(&mut [&mut opusenc, &mut ffmpeg]);
            return Err(failure(input, "opusenc stdout not captured".to_string()));
        };

        let mut spool = SpooledTempFile::new(SPOOL_LIMIT);
        let copied = match io::copy(&mut encoded, &mut spool) {
            Ok(copied) => copied,
            Err(e) => {
                drop(encoded);
                reap(&mut [&mut opusenc, &mut ffmpeg]);
                return Err(failure(input, format!("reading encoder output failed: {}", e)));
            }
        };

        wait_success(&mut opusenc, "opusenc", input)?;
        wait_success(&mut ffmpeg, "ffmpeg", input)?;

        if copied == 0 {
            return Err(failure(input, "encoder produced no output".to_string()));
        }
        debug!(input = %input.display(), bytes = copied, "Transcoded");

        spool.seek(SeekFrom::Start(0))?;
        Ok(Box::new(spool))
    }
}
