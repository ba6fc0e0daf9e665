pub mod http_remote;
pub mod http_service;

pub use http_remote::HttpRemote;
pub use http_service::{FrameHttpService, HttpHandle};
