use strata_render::{GpuContextError, ReadbackError};

/// Failure to produce a coverage id buffer. Always recoverable: the ranking
/// for that tick is empty and the previous priorities stay in effect.
#[derive(Debug, thiserror::Error)]
pub enum GpuReadbackError {
    #[error("coverage target has zero size")]
    ZeroSizedTarget,

    #[error("GPU context lost during coverage readback")]
    ContextLost,

    #[error("coverage readback failed: {0}")]
    MapFailed(#[source] ReadbackError),

    #[error("no GPU device for coverage rendering: {0}")]
    Device(#[from] GpuContextError),

    /// More candidate sectors than the 24-bit id encoding can address.
    #[error("{count} coverage candidates exceed the id encoding range")]
    TooManySectors { count: usize },
}

impl From<ReadbackError> for GpuReadbackError {
    fn from(err: ReadbackError) -> Self {
        match err {
            ReadbackError::Disconnected => GpuReadbackError::ContextLost,
            other => GpuReadbackError::MapFailed(other),
        }
    }
}
