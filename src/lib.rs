// src/lib.rs
pub mod capture;
pub mod config;
pub mod core;
pub mod io;
pub mod monitoring;
pub mod publish;
pub mod store;
pub mod sync;
pub mod testing;
pub mod viewport;

// Re-export die wichtigsten Typen
pub use core::{CaptureTime, ComponentLogger, FrameError, FrameResult, LogContext, Worker};
pub use publish::{Descriptor, Publisher};
pub use store::{Frame, FrameId, FrameNaming, FrameStore, FsFrameStore, Window};
