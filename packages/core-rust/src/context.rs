use std::time::{Duration, Instant};

/// Per-call context carrying correlation and tracing identity plus the call deadline.
/// Threaded explicitly through handlers and every store operation; never stored globally.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Correlation identifier, reused from the caller or generated at the edge.
    pub correlation_id: String,
    /// Distributed trace identifier assigned to the call's span.
    pub trace_id: String,
    /// Method or route being invoked.
    pub method: String,
    /// Point after which backend I/O for this call should be abandoned.
    pub deadline: Option<Instant>,
}

impl RequestContext {
    #[must_use]
    pub fn new(correlation_id: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            trace_id: trace_id.into(),
            method: String::new(),
            deadline: None,
        }
    }

    #[must_use]
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Sets the deadline `timeout` from now.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Time left before the deadline; `None` when the call has no deadline.
    /// An expired deadline yields `Some(Duration::ZERO)`.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.remaining().is_some_and(|left| left.is_zero())
    }
}
