use std::fmt;

use chrono::{NaiveDateTime, SubsecRound, Utc};

/// Text form carried inside every frame.
pub const CAPTURE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// Standard EXIF DateTime layout, accepted when reading frames from other tools.
const EXIF_TIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Capture time of a frame, UTC, whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CaptureTime(NaiveDateTime);

impl CaptureTime {
    pub fn now_utc() -> Self {
        Self(Utc::now().naive_utc().trunc_subsecs(0))
    }

    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim_end_matches('\0').trim();
        NaiveDateTime::parse_from_str(text, CAPTURE_TIME_FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(text, EXIF_TIME_FORMAT))
            .ok()
            .map(Self)
    }
}

impl fmt::Display for CaptureTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(CAPTURE_TIME_FORMAT))
    }
}
