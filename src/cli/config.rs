// CLI configuration
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use opus2taf::ConvertOptions;

/// Default file name of a TAF on the box's SD card
pub const DEFAULT_TONIE_FILENAME: &str = "500304E0";

/// opus2taf - Toniebox audio file tool
#[derive(Parser, Debug)]
#[command(name = "opus2taf")]
#[command(about = "Create, inspect and split Toniebox audio files", long_about = None)]
#[command(version)]
#[command(author = "xwsjjctz <xwsjjctz@icloud.com>")]
pub struct Config {
    /// Output format
    #[arg(short, long, value_enum, default_value = "pretty", global = true)]
    pub format: OutputFormat,

    /// Quiet mode (only warnings and errors)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Verbose mode (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON
    #[default]
    Pretty,
    /// Compact JSON
    Json,
    /// Key-value pairs
    KeyValue,
    /// Table format
    Table,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Convert audio files into one TAF file, one chapter per input
    Convert {
        /// Input files, directories or glob patterns
        #[arg(value_name = "INPUT", required = true)]
        inputs: Vec<String>,

        /// Output file (or directory with --append-tonie-filename)
        #[arg(short, long, default_value = DEFAULT_TONIE_FILENAME)]
        output: PathBuf,

        /// Timestamp and stream serial, decimal or 0x prefixed hex (default: now)
        #[arg(long)]
        timestamp: Option<String>,

        /// Write a plain Ogg-Opus stream without the tonie header
        #[arg(long)]
        no_tonie_header: bool,

        /// Encoder bitrate in kbps
        #[arg(long, default_value_t = 96)]
        bitrate: u32,

        /// Constant bitrate encoding
        #[arg(long)]
        cbr: bool,

        /// ffmpeg executable
        #[arg(long, default_value = "ffmpeg")]
        ffmpeg: String,

        /// opusenc executable
        #[arg(long, default_value = "opusenc")]
        opusenc: String,

        /// Treat OUTPUT as a directory and write 500304E0 into it
        #[arg(long)]
        append_tonie_filename: bool,
    },

    /// Validate TAF file(s) and show header, chapters and duration
    Info {
        /// TAF file path(s)
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,
    },

    /// Split a TAF file into one Opus file per chapter
    Split {
        /// TAF file path
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
}

impl Config {
    /// Log filter used when RUST_LOG is not set
    pub fn default_log_filter(&self) -> &'static str {
        if self.quiet {
            "opus2taf=warn"
        } else if self.verbose {
            "opus2taf=debug"
        } else {
            "opus2taf=info"
        }
    }
}

/// Conversion options from the convert flags
pub fn convert_options(
    timestamp: Option<u32>,
    no_tonie_header: bool,
    bitrate: u32,
    cbr: bool,
    ffmpeg: &str,
    opusenc: &str,
) -> ConvertOptions {
    ConvertOptions {
        tonie_header: !no_tonie_header,
        timestamp,
        bitrate,
        vbr: !cbr,
        ffmpeg: ffmpeg.to_string(),
        opusenc: opusenc.to_string(),
        ..Default::default()
    }
}

/// Resolve the output path of the convert command
pub fn output_path(output: PathBuf, append_tonie_filename: bool) -> PathBuf {
    if append_tonie_filename {
        output.join(DEFAULT_TONIE_FILENAME)
    } else {
        output
    }
}
