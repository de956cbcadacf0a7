use std::path::{Path, PathBuf};

use wav_capture_core::{CapacityOracle, CaptureError};

/// Free space on the volume holding a directory, as seen by an unprivileged user.
pub struct VolumeSpace {
    dir: PathBuf,
}

impl VolumeSpace {
    /// Oracle for the volume a recording at `output` will be written to.
    pub fn for_output(output: &Path) -> Self {
        let dir = match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Self { dir }
    }
}

#[cfg(unix)]
impl CapacityOracle for VolumeSpace {
    fn free_bytes(&self) -> Result<u64, CaptureError> {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(self.dir.as_os_str().as_bytes())
            .map_err(|_| CaptureError::StorageUnavailable(format!("invalid path {}", self.dir.display())))?;

        let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
        // SAFETY: c_path is NUL-terminated and stat is a valid out-pointer.
        let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            return Err(CaptureError::StorageUnavailable(format!(
                "statvfs {}: {}",
                self.dir.display(),
                err
            )));
        }

        #[allow(clippy::unnecessary_cast)]
        Ok((stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64))
    }
}

#[cfg(not(unix))]
impl CapacityOracle for VolumeSpace {
    fn free_bytes(&self) -> Result<u64, CaptureError> {
        Err(CaptureError::StorageUnavailable(format!(
            "free space of {} is not available on this platform",
            self.dir.display()
        )))
    }
}
