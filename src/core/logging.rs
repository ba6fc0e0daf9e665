// src/core/logging.rs

use crate::store::FrameId;

#[derive(Debug, Clone)]
pub struct LogContext {
    pub component: String,
    pub instance_id: String,
    pub frame_id: Option<FrameId>,
}

impl LogContext {
    pub fn new(component: &str, instance_id: &str) -> Self {
        Self {
            component: component.to_string(),
            instance_id: instance_id.to_string(),
            frame_id: None,
        }
    }

    pub fn with_frame(mut self, id: FrameId) -> Self {
        self.frame_id = Some(id);
        self
    }

    pub fn format(&self, message: &str) -> String {
        let frame_info = match self.frame_id {
            Some(id) => format!(" frame={}", id),
            None => String::new(),
        };

        format!(
            "[{}:{}{}] {}",
            self.component, self.instance_id, frame_info, message
        )
    }
}

/// Uniform prefixing for long-lived components.
pub trait ComponentLogger {
    fn log_context(&self) -> LogContext;

    fn debug(&self, message: &str) {
        log::debug!("{}", self.log_context().format(message));
    }

    fn info(&self, message: &str) {
        log::info!("{}", self.log_context().format(message));
    }

    fn warn(&self, message: &str) {
        log::warn!("{}", self.log_context().format(message));
    }

    fn error(&self, message: &str) {
        log::error!("{}", self.log_context().format(message));
    }

    fn warn_frame(&self, id: FrameId, message: &str) {
        log::warn!("{}", self.log_context().with_frame(id).format(message));
    }

    fn debug_frame(&self, id: FrameId, message: &str) {
        log::debug!("{}", self.log_context().with_frame(id).format(message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_context_creation() {
        let ctx = LogContext::new("capture", "./images");

        assert_eq!(ctx.component, "capture");
        assert_eq!(ctx.instance_id, "./images");
        assert!(ctx.frame_id.is_none());
    }

    #[test]
    fn test_log_formatting() {
        let ctx = LogContext::new("sync", "http://cam:8000");
        let formatted = ctx.format("cycle done");
        assert_eq!(formatted, "[sync:http://cam:8000] cycle done");

        let with_frame = ctx.with_frame(42).format("fetch failed");
        assert!(with_frame.contains("frame=42"));
        assert!(with_frame.ends_with("fetch failed"));
    }

    #[test]
    fn test_component_logger_trait() {
        struct MockComponent {
            id: String,
        }

        impl ComponentLogger for MockComponent {
            fn log_context(&self) -> LogContext {
                LogContext::new("mock", &self.id)
            }
        }

        let component = MockComponent {
            id: "test_001".to_string(),
        };
        let ctx = component.log_context();

        assert_eq!(ctx.component, "mock");
        assert_eq!(ctx.instance_id, "test_001");
        component.info("does not panic without a logger");
    }
}
