//! User-facing message sink.
//!
//! Steps report progress through a [`Ui`] rather than logging directly, so a
//! frontend can render build output however it likes. [`TracingUi`] is the
//! default sink and forwards everything to `tracing`.

/// Message sink for build progress and failures.
pub trait Ui: Send + Sync {
    /// Report progress.
    fn say(&self, message: &str);

    /// Report a failure.
    fn error(&self, message: &str);
}

/// Ui that emits messages as tracing events.
#[derive(Debug, Clone, Default)]
pub struct TracingUi {
    prefix: Option<String>,
}

impl TracingUi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag every message with a build name, e.g. `vsphere-iso.ubuntu`.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }
}

impl Ui for TracingUi {
    fn say(&self, message: &str) {
        match &self.prefix {
            Some(prefix) => tracing::info!(build = %prefix, "{}", message),
            None => tracing::info!("{}", message),
        }
    }

    fn error(&self, message: &str) {
        match &self.prefix {
            Some(prefix) => tracing::error!(build = %prefix, "{}", message),
            None => tracing::error!("{}", message),
        }
    }
}
