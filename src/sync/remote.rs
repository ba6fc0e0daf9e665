use crate::core::FrameResult;
use crate::publish::Descriptor;
use crate::store::FrameId;

/// The producer side as seen by a mirror.
pub trait RemoteSource: Send {
    /// Describes the remote for logging.
    fn name(&self) -> &str;

    /// Current published window. Unreachable or malformed → `SourceUnavailable`
    /// or `MalformedDescriptor`.
    fn fetch_descriptor(&self) -> FrameResult<Descriptor>;

    /// Stored bytes of one frame, timestamp embedded. Absent → `NotFound`.
    fn fetch_frame(&self, id: FrameId) -> FrameResult<Vec<u8>>;
}
