use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use wav_capture_core::{CaptureConfig, StrategyPreference};

/// Capture settings shared by `record` and `finalize`. Flags override values
/// loaded from `--config`.
#[derive(Args, Debug, Default, Clone)]
pub struct SettingsArgs {
    /// JSON file with capture settings
    #[arg(short, long)]
    pub config: Option<std::path::PathBuf>,

    /// Sample rate in Hz
    #[arg(short = 'r', long)]
    pub sample_rate: Option<u32>,

    /// Finalization strategy: auto, thrifty (shift in place) or wasteful (copy)
    #[arg(short, long, value_parser = parse_strategy)]
    pub strategy: Option<StrategyPreference>,

    /// Free bytes below which recording stops
    #[arg(long)]
    pub low_space_threshold: Option<u64>,
}

fn parse_strategy(value: &str) -> Result<StrategyPreference, String> {
    match value.to_ascii_lowercase().as_str() {
        "auto" => Ok(StrategyPreference::Auto),
        "thrifty" => Ok(StrategyPreference::Thrifty),
        "wasteful" => Ok(StrategyPreference::Wasteful),
        other => Err(format!("unknown strategy '{}' (expected auto, thrifty or wasteful)", other)),
    }
}

/// Read a `CaptureConfig` from JSON. Missing fields take their defaults.
pub fn load_config(path: &Path) -> Result<CaptureConfig> {
    let text = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

impl SettingsArgs {
    pub fn resolve(&self) -> Result<CaptureConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => CaptureConfig::default(),
        };
        if let Some(rate) = self.sample_rate {
            config.sample_rate = rate;
        }
        if let Some(strategy) = self.strategy {
            config.finalize_strategy = strategy;
        }
        if let Some(threshold) = self.low_space_threshold {
            config.low_space_threshold = threshold;
        }
        config.validate().map_err(anyhow::Error::msg).context("invalid capture settings")?;
        Ok(config)
    }
}
