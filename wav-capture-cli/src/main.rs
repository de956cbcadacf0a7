//! wav-capture - record raw PCM to WAV and repair interrupted recordings
//!
//! Subcommands:
//! - `wav-capture record [OUTPUT]` - capture s16le mono PCM from stdin or `--input`
//! - `wav-capture finalize <RAW>` - add the header to a headerless recording
//! - `wav-capture inspect <WAV>` - print header fields

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod disk_space;
mod logger;
mod reader_source;
mod settings;

use commands::RecordArgs;
use settings::SettingsArgs;

#[derive(Parser)]
#[command(name = "wav-capture")]
#[command(about = "Stream mono 16-bit PCM into WAV files")]
#[command(version)]
struct Cli {
    /// Debug level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record until the input ends, the duration limit is hit or the disk fills up
    Record(RecordArgs),

    /// Insert the WAV header into a file left headerless by an interrupted recording
    Finalize {
        /// Headerless PCM file, rewritten in place
        raw: PathBuf,

        #[command(flatten)]
        settings: SettingsArgs,
    },

    /// Print the header of a WAV file
    Inspect {
        wav: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logger::init(cli.verbose);

    match cli.command {
        Commands::Record(args) => {
            let result = commands::record(&args)?;
            commands::print_result(&result);
        }
        Commands::Finalize { raw, settings } => {
            let report = commands::finalize(&raw, &settings)?;
            println!(
                "{}: {} data bytes, {:?}",
                raw.display(),
                report.data_length,
                report.strategy
            );
        }
        Commands::Inspect { wav, json } => commands::inspect(&wav, json)?,
    }

    Ok(())
}
