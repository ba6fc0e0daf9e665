pub mod error;
pub mod lock;
pub mod logging;
pub mod timestamp;
pub mod worker;

pub use error::{FrameError, FrameResult};
pub use lock::lock_mutex;
pub use logging::{ComponentLogger, LogContext};
pub use timestamp::{CAPTURE_TIME_FORMAT, CaptureTime};
pub use worker::{StopFlag, StopWait, Worker};
