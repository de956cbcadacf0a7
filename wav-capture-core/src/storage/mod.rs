pub mod header_finalizer;
pub mod metadata;
pub mod paths;
pub mod recording_file;
