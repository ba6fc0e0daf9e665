use thiserror::Error;

use crate::store::FrameId;

pub type FrameResult<T> = Result<T, FrameError>;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame {id} not found")]
    NotFound { id: FrameId },
    #[error("frame store is empty")]
    Empty,
    #[error("source unavailable: {message}")]
    SourceUnavailable { message: String },
    #[error("malformed descriptor: {message}")]
    MalformedDescriptor { message: String },
    #[error("invalid image for frame {id}: {message}")]
    InvalidImage { id: FrameId, message: String },
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl FrameError {
    pub fn source_unavailable(message: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedDescriptor {
            message: message.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Network/hardware failures; the caller retries on its next tick.
    /// A malformed descriptor counts as the source being unavailable.
    pub fn is_source_unavailable(&self) -> bool {
        matches!(
            self,
            Self::SourceUnavailable { .. } | Self::MalformedDescriptor { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}
