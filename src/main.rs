// CLI binary entry point for opus2taf

mod cli;

use clap::Parser;
use std::process;
use tracing_subscriber::EnvFilter;

use cli::{commands, Commands, Config, ConvertArgs, OutputFormatter};

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.default_log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let config = Config::parse();
    init_logging(&config);

    let formatter = OutputFormatter::new(config.format, config.quiet);

    let result = match config.command {
        Commands::Convert {
            inputs,
            output,
            timestamp,
            no_tonie_header,
            bitrate,
            cbr,
            ffmpeg,
            opusenc,
            append_tonie_filename,
        } => commands::command_convert(
            ConvertArgs {
                inputs,
                output,
                timestamp,
                no_tonie_header,
                bitrate,
                cbr,
                ffmpeg,
                opusenc,
                append_tonie_filename,
            },
            &formatter,
        ),
        Commands::Info { files } => match commands::command_info(files, &formatter) {
            Ok(true) => Ok(()),
            Ok(false) => process::exit(1),
            Err(e) => Err(e),
        },
        Commands::Split { file, output } => commands::command_split(file, output, &formatter),
    };

    if let Err(e) = result {
        formatter.print_error(&format!("{:#}", e));
        process::exit(1);
    }
}
