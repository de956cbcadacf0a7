use crate::models::error::CaptureError;

/// Reports the free capacity of the volume holding the recording.
pub trait CapacityOracle: Send + Sync {
    fn free_bytes(&self) -> Result<u64, CaptureError>;
}

impl<F> CapacityOracle for F
where
    F: Fn() -> u64 + Send + Sync,
{
    fn free_bytes(&self) -> Result<u64, CaptureError> {
        Ok(self())
    }
}
