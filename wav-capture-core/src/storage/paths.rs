//! Output file naming helpers.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

/// Append `.wav` unless the name already ends with it (any case).
pub fn with_wav_extension(path: &Path) -> PathBuf {
    let has_wav = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("wav"))
        .unwrap_or(false);
    if has_wav {
        return path.to_path_buf();
    }
    let mut name = path.as_os_str().to_os_string();
    name.push(".wav");
    PathBuf::from(name)
}

/// Timestamped recording name: `Rec_YYYY-MM-DD_HH.MM.SS.wav`.
pub fn timestamped_file_name(at: DateTime<Local>) -> String {
    format!("Rec_{}.wav", at.format("%Y-%m-%d_%H.%M.%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn appends_missing_extension() {
        assert_eq!(with_wav_extension(Path::new("take")), PathBuf::from("take.wav"));
        assert_eq!(with_wav_extension(Path::new("dir/take.pcm")), PathBuf::from("dir/take.pcm.wav"));
        assert_eq!(with_wav_extension(Path::new("take.WAV")), PathBuf::from("take.WAV"));
    }

    #[test]
    fn timestamped_name_format() {
        let at = Local.with_ymd_and_hms(2012, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(timestamped_file_name(at), "Rec_2012-03-04_05.06.07.wav");
    }
}
