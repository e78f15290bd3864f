use super::*;

pub(crate) const DEFAULT_ATTRIBUTE_PREFIX: &str = "rh:";

/// Construction-time settings for a [`Renderer`](crate::Renderer).
///
/// Trace settings can also be changed later through the renderer's
/// `set_trace_*` methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendererOptions {
    pub(crate) attribute_prefix: String,
    pub(crate) trace: bool,
    pub(crate) trace_to_stderr: bool,
    pub(crate) trace_log_limit: usize,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            attribute_prefix: DEFAULT_ATTRIBUTE_PREFIX.to_string(),
            trace: false,
            trace_to_stderr: true,
            trace_log_limit: 10_000,
        }
    }
}

impl RendererOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix for the handler attributes written into rendered markup, e.g.
    /// `rh:` produces `rh:onclick="3"` and `rh:onclick:stoppropagation`.
    pub fn with_attribute_prefix(mut self, prefix: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into();
        if prefix.is_empty() {
            return Err(Error::InvalidOption(
                "attribute prefix must not be empty".into(),
            ));
        }
        // The prefix must survive a round trip through the markup parser.
        if !prefix.bytes().all(is_attr_name_char) {
            return Err(Error::InvalidOption(format!(
                "attribute prefix {prefix:?} contains characters not allowed in attribute names"
            )));
        }
        self.attribute_prefix = prefix.to_ascii_lowercase();
        Ok(self)
    }

    pub fn with_trace(mut self, enabled: bool) -> Self {
        self.trace = enabled;
        self
    }

    pub fn with_trace_stderr(mut self, enabled: bool) -> Self {
        self.trace_to_stderr = enabled;
        self
    }

    pub fn with_trace_log_limit(mut self, max_entries: usize) -> Result<Self> {
        if max_entries == 0 {
            return Err(Error::InvalidOption(
                "trace log limit requires at least 1 entry".into(),
            ));
        }
        self.trace_log_limit = max_entries;
        Ok(self)
    }

    pub fn attribute_prefix(&self) -> &str {
        &self.attribute_prefix
    }

    pub(crate) fn trace_state(&self) -> TraceState {
        TraceState {
            enabled: self.trace,
            to_stderr: self.trace_to_stderr,
            log_limit: self.trace_log_limit,
            ..TraceState::default()
        }
    }
}
