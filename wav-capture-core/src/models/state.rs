use super::error::CaptureError;
use super::recording_result::RecordingResult;

/// Capture session state machine.
///
/// State transitions:
/// ```text
/// idle → recording → finalizing → completed / failed
/// ```
/// `Completed` and `Failed` are terminal for the file they describe; a
/// session may begin a new file from either of them.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    Recording,
    Finalizing,
    Completed(Box<RecordingResult>),
    Failed(CaptureError),
}

impl SessionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording)
    }

    /// Recording or finalizing: a file is owned by the session.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Recording | Self::Finalizing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Failed(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Recording => "recording",
            Self::Finalizing => "finalizing",
            Self::Completed(_) => "completed",
            Self::Failed(_) => "failed",
        }
    }
}
