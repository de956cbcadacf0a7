pub mod audio_source;
pub mod byte_sink;
pub mod capacity_oracle;
pub mod capture_delegate;
