//! Logging handle given to extensions.

use std::fmt::Display;
use std::sync::Arc;

/// Structured logger whose events are tagged with the owning module.
#[derive(Debug, Clone)]
pub struct ModuleLogger {
    module: Arc<str>,
}

impl ModuleLogger {
    pub(crate) fn new(module: Arc<str>) -> Self {
        Self { module }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn debug(&self, message: impl Display) {
        tracing::debug!(module = %self.module, "{message}");
    }

    pub fn info(&self, message: impl Display) {
        tracing::info!(module = %self.module, "{message}");
    }

    pub fn warn(&self, message: impl Display) {
        tracing::warn!(module = %self.module, "{message}");
    }

    pub fn error(&self, message: impl Display) {
        tracing::error!(module = %self.module, "{message}");
    }

    /// A span that tags everything recorded inside it with this module.
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!("extension", module = %self.module)
    }
}
