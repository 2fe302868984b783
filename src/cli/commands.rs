// CLI command implementations
use anyhow::{Context, Result};
use std::io;
use std::path::PathBuf;

use opus2taf::{collect_inputs, inspect_file, parse_timestamp, split_to_opus_files};
use opus2taf::{ExternalTranscoder, TrackAssembler};

use crate::cli::config::{convert_options, output_path};
use crate::cli::output::OutputFormatter;

/// Arguments of the convert command
#[derive(Debug, Clone)]
pub struct ConvertArgs {
    pub inputs: Vec<String>,
    pub output: PathBuf,
    pub timestamp: Option<String>,
    pub no_tonie_header: bool,
    pub bitrate: u32,
    pub cbr: bool,
    pub ffmpeg: String,
    pub opusenc: String,
    pub append_tonie_filename: bool,
}

/// Convert inputs into one TAF file
pub fn command_convert(args: ConvertArgs, formatter: &OutputFormatter) -> Result<()> {
    let timestamp = args
        .timestamp
        .as_deref()
        .map(parse_timestamp)
        .transpose()
        .context("Invalid --timestamp")?;

    let options = convert_options(
        timestamp,
        args.no_tonie_header,
        args.bitrate,
        args.cbr,
        &args.ffmpeg,
        &args.opusenc,
    );

    let inputs = collect_inputs(&args.inputs).context("No usable input files")?;
    let output = output_path(args.output, args.append_tonie_filename);
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let transcoder = ExternalTranscoder::from_options(&options);
    let assembler = TrackAssembler::new(options, &transcoder);
    let summary = assembler
        .convert(&inputs, &output)
        .with_context(|| format!("Failed to create {}", output.display()))?;

    formatter.print_success(&format!(
        "Created {} ({} tracks, {:.1}s)",
        output.display(),
        summary.tracks,
        summary.duration_seconds
    ));
    formatter.output(&summary, &mut io::stdout())?;
    Ok(())
}

/// Inspect TAF files, returns whether all of them are valid
pub fn command_info(files: Vec<PathBuf>, formatter: &OutputFormatter) -> Result<bool> {
    let mut all_valid = true;

    for file in files {
        match inspect_file(&file) {
            Ok(info) => {
                if !info.valid {
                    all_valid = false;
                    formatter.print_error(&format!("{}: invalid TAF", file.display()));
                }
                let report = serde_json::json!({
                    "file": file.display().to_string(),
                    "info": info,
                });
                formatter.output(&report, &mut io::stdout())?;
            }
            Err(e) => {
                all_valid = false;
                formatter.print_error(&format!("{}: {}", file.display(), e));
            }
        }
    }

    Ok(all_valid)
}

/// Split a TAF file into per-chapter Opus files
pub fn command_split(file: PathBuf, output: PathBuf, formatter: &OutputFormatter) -> Result<()> {
    let written = split_to_opus_files(&file, &output)
        .with_context(|| format!("Failed to split {}", file.display()))?;

    for path in &written {
        formatter.print_success(&path.display().to_string());
    }
    Ok(())
}
