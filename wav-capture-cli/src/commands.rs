use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::Args;
use serde_json::json;

use wav_capture_core::storage::metadata;
use wav_capture_core::storage::paths::{timestamped_file_name, with_wav_extension};
use wav_capture_core::{
    parse_header, CaptureDelegate, CaptureError, CaptureSession, FinalizeReport, HeaderFinalizer, RecordingResult,
    SessionState, HEADER_LENGTH,
};

use crate::disk_space::VolumeSpace;
use crate::reader_source::ReaderSource;
use crate::settings::SettingsArgs;

#[derive(Args, Debug, Default)]
pub struct RecordArgs {
    /// Output file; `.wav` is appended when missing (default: Rec_<timestamp>.wav)
    pub output: Option<PathBuf>,

    /// Read PCM from this file instead of stdin
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Stop after this many seconds
    #[arg(short = 'd', long)]
    pub max_duration: Option<f64>,

    /// Bytes per capture block
    #[arg(short, long)]
    pub block_size: Option<usize>,

    /// Write a .metadata.json sidecar next to the recording
    #[arg(short, long)]
    pub metadata: bool,

    #[command(flatten)]
    pub settings: SettingsArgs,
}

/// Reports session events through the logger.
struct ConsoleDelegate;

impl CaptureDelegate for ConsoleDelegate {
    fn on_state_changed(&self, state: &SessionState) {
        log::debug!("Session {}", state.name());
    }

    fn on_low_space(&self, free_bytes: u64) {
        log::warn!("Disk almost full ({} bytes left), stopping", free_bytes);
    }

    fn on_session_failed(&self, error: &CaptureError) {
        log::error!("Recording failed: {}", error);
    }

    fn on_session_completed(&self, result: &RecordingResult) {
        log::info!("Saved {}", result.file_path.display());
    }

    fn on_capture_hardware_unavailable(&self) {
        log::error!("Audio input is unavailable");
    }
}

pub fn record(args: &RecordArgs) -> Result<RecordingResult> {
    let mut config = args.settings.resolve()?;
    if args.block_size.is_some() {
        config.block_size = args.block_size;
    }
    if args.max_duration.is_some() {
        config.max_duration_secs = args.max_duration;
    }
    config.write_metadata |= args.metadata;
    config.validate().map_err(anyhow::Error::msg).context("invalid capture settings")?;

    let output = match &args.output {
        Some(path) => with_wav_extension(path),
        None => PathBuf::from(timestamped_file_name(Local::now())),
    };

    let source: ReaderSource<Box<dyn Read + Send>> = match &args.input {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
            ReaderSource::new(path.display().to_string(), Box::new(file))
        }
        None => ReaderSource::new("stdin", Box::new(io::stdin())),
    };

    let mut session = CaptureSession::new(source, Arc::new(VolumeSpace::for_output(&output)));
    session.set_delegate(Arc::new(ConsoleDelegate));
    session
        .begin_session(config, &output)
        .with_context(|| format!("failed to start recording to {}", output.display()))?;

    match session.wait_for_completion() {
        Ok(result) => {
            if let Some(stop) = result.stop_reason.as_error() {
                log::warn!("Recording cut short: {}", stop);
            }
            Ok(result)
        }
        Err(e) => {
            if session.is_header_written() {
                log::warn!("Audio recorded before the failure was saved to {}", output.display());
            } else if e.preserves_data() {
                log::warn!(
                    "Raw audio left in {}; repair it with `wav-capture finalize`",
                    output.display()
                );
            }
            Err(e).context("recording failed")
        }
    }
}

pub fn print_result(result: &RecordingResult) {
    println!("file:      {}", result.file_path.display());
    println!("duration:  {:.2} s", result.duration_secs);
    println!("data:      {} bytes", result.data_length);
    println!("strategy:  {:?}", result.strategy);
    println!("stopped:   {:?}", result.stop_reason);
    if let Some(checksum) = &result.metadata.checksum {
        println!("sha256:    {}", checksum);
    }
}

fn has_wav_header(path: &Path) -> Result<bool> {
    let mut header = [0u8; HEADER_LENGTH];
    let mut file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    match file.read_exact(&mut header) {
        Ok(()) => Ok(parse_header(&header).is_ok()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
    }
}

/// Insert a header in front of headerless PCM left by an interrupted recording.
pub fn finalize(raw: &Path, settings: &SettingsArgs) -> Result<FinalizeReport> {
    let config = settings.resolve()?;
    if has_wav_header(raw)? {
        bail!("{} already starts with a WAV header", raw.display());
    }

    let data_length = fs::metadata(raw)
        .with_context(|| format!("failed to stat {}", raw.display()))?
        .len();
    if data_length % 2 != 0 {
        log::warn!("{} ends with half a sample", raw.display());
    }

    let mut finalizer = HeaderFinalizer::new(config.sample_rate)
        .with_low_space_threshold(config.low_space_threshold)
        .with_shift_block_size(config.shift_block_size);
    let report = finalizer
        .finalize(raw, data_length, &VolumeSpace::for_output(raw), config.finalize_strategy)
        .with_context(|| format!("failed to finalize {}", raw.display()))?;
    Ok(report)
}

/// Header fields of a WAV file, plus its metadata sidecar when present.
pub fn describe(path: &Path) -> Result<serde_json::Value> {
    let mut file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut header = [0u8; HEADER_LENGTH];
    file.read_exact(&mut header)
        .with_context(|| format!("{} is shorter than a WAV header", path.display()))?;
    let info = parse_header(&header).with_context(|| format!("{} is not a mono 16-bit WAV file", path.display()))?;
    let file_length = file.metadata()?.len();

    let consistent = u64::from(info.data_length) + HEADER_LENGTH as u64 == file_length
        && u64::from(info.riff_length) + 8 == file_length;

    Ok(json!({
        "file": path.display().to_string(),
        "file_length": file_length,
        "sample_rate": info.sample_rate,
        "channels": info.channels,
        "bits_per_sample": info.bits_per_sample,
        "byte_rate": info.byte_rate,
        "block_align": info.block_align,
        "riff_length": info.riff_length,
        "data_length": info.data_length,
        "duration_secs": info.duration_secs(),
        "consistent": consistent,
        "metadata": metadata::read_metadata(path).ok(),
    }))
}

pub fn inspect(path: &Path, as_json: bool) -> Result<()> {
    let description = describe(path)?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&description)?);
        return Ok(());
    }
    if let Some(fields) = description.as_object() {
        for (key, value) in fields {
            if key != "metadata" {
                println!("{:<16} {}", key, value);
            }
        }
    }
    if description["consistent"] == json!(false) {
        log::warn!("Header lengths do not match the file size");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wav_capture_core::{FinalizeStrategy, StopReason, StrategyPreference};

    fn settings(rate: u32) -> SettingsArgs {
        SettingsArgs {
            sample_rate: Some(rate),
            strategy: Some(StrategyPreference::Thrifty),
            low_space_threshold: Some(0),
            ..Default::default()
        }
    }

    #[test]
    fn records_file_input_to_wav() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.pcm");
        let pcm: Vec<u8> = (0..3200u32).map(|i| (i % 256) as u8).collect();
        fs::write(&input, &pcm).unwrap();

        let args = RecordArgs {
            output: Some(dir.path().join("take")),
            input: Some(input),
            metadata: true,
            settings: settings(8000),
            ..Default::default()
        };
        let result = record(&args).unwrap();

        let output = dir.path().join("take.wav");
        assert_eq!(result.file_path, output);
        assert_eq!(result.stop_reason, StopReason::EndOfStream);
        assert_eq!(result.strategy, FinalizeStrategy::Thrifty);

        let bytes = fs::read(&output).unwrap();
        assert_eq!(&bytes[HEADER_LENGTH..], &pcm[..]);
        assert!(dir.path().join("take.metadata.json").exists());

        let description = describe(&output).unwrap();
        assert_eq!(description["data_length"], json!(3200));
        assert_eq!(description["consistent"], json!(true));
        assert_eq!(description["metadata"]["data_length"], json!(3200));
    }

    #[test]
    fn max_duration_caps_recording() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("long.pcm");
        fs::write(&input, vec![1u8; 32000]).unwrap();

        let args = RecordArgs {
            output: Some(dir.path().join("short.wav")),
            input: Some(input),
            max_duration: Some(0.5),
            settings: settings(8000),
            ..Default::default()
        };
        let result = record(&args).unwrap();
        assert_eq!(result.stop_reason, StopReason::SizeLimit);
        assert_eq!(result.data_length, 8000);
    }

    #[test]
    fn finalize_repairs_headerless_file_once() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("interrupted.wav");
        fs::write(&raw, vec![7u8; 1000]).unwrap();

        let report = finalize(&raw, &settings(16000)).unwrap();
        assert_eq!(report.data_length, 1000);
        assert_eq!(report.file_length, 1044);

        let description = describe(&raw).unwrap();
        assert_eq!(description["sample_rate"], json!(16000));
        assert_eq!(description["consistent"], json!(true));

        let again = finalize(&raw, &settings(16000)).unwrap_err();
        assert!(again.to_string().contains("already starts with a WAV header"));
        assert_eq!(fs::read(&raw).unwrap().len(), 1044);
    }

    #[test]
    fn describe_rejects_non_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.wav");
        fs::write(&path, vec![0u8; 100]).unwrap();
        assert!(describe(&path).is_err());

        fs::write(&path, b"RIFF").unwrap();
        assert!(describe(&path).is_err());
    }
}
