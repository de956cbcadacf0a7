use env_logger::{Builder, Target};
use log::LevelFilter;
use std::io::Write;

/// Install the process logger. `RUST_LOG` overrides the level chosen here.
///
/// Logs go to stderr so that `inspect --json` output stays machine readable.
pub fn init(verbose: bool) {
    let mut builder = Builder::new();

    builder
        .target(Target::Stderr)
        .filter_level(if verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .format(|buf, record| {
            let ts = buf.timestamp_millis();
            writeln!(buf, "[{}] {}: {}", ts, record.level(), record.args())
        });

    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }

    builder.init();
}
