use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcyonError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid SER file: {0}")]
    InvalidSer(String),

    #[error("Image format error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Inconsistent source: {0}")]
    InconsistentSource(String),

    #[error("Empty frame sequence")]
    EmptySequence,

    #[error("Frame index {index} out of range (total: {total})")]
    FrameIndexOutOfRange { index: usize, total: usize },

    #[error("Frame {index} is excluded from processing")]
    FrameUnusable { index: usize },

    #[error("Invalid configuration parameter '{parameter}': {message}")]
    Config {
        parameter: &'static str,
        message: String,
    },

    #[error("Wrong activity ordering: {0}")]
    Ordering(String),

    #[error("Globally aligned frames have no common intersection")]
    EmptyIntersection,

    #[error("Global shift for frame {frame} saturated the search window")]
    SearchOutOfBounds { frame: usize },

    #[error("No alignment points survive the structure/brightness thresholds")]
    NoAlignmentPoints,

    #[error("Too few usable frames: {usable} (at least 2 required)")]
    TooFewFrames { usable: usize },

    #[error("Cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{activity}: {source}")]
    Activity {
        activity: String,
        #[source]
        source: Box<ProcyonError>,
    },
}

impl ProcyonError {
    /// Annotate a fatal error with the pipeline activity it occurred in, so
    /// callers can resume from that activity after correcting parameters.
    pub fn in_activity(self, activity: impl Into<String>) -> Self {
        match self {
            ProcyonError::Cancelled | ProcyonError::Activity { .. } => self,
            other => ProcyonError::Activity {
                activity: activity.into(),
                source: Box::new(other),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, ProcyonError>;
