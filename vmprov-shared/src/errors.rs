//! Error types for the provisioning pipeline.

use thiserror::Error;

/// Result alias used throughout vmprov.
pub type VmprovResult<T> = Result<T, VmprovError>;

/// Errors raised by pipeline steps, device drivers and configuration loading.
#[derive(Debug, Error)]
pub enum VmprovError {
    /// Invalid user configuration. Detected before any device is touched.
    #[error("configuration error: {0}")]
    Config(String),

    /// The hypervisor rejected or failed a device operation.
    #[error("driver error: {0}")]
    Driver(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// A step ran without the state it depends on (e.g. no VM handle).
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// An error annotated with the operation that produced it.
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<VmprovError>,
    },
}

impl VmprovError {
    /// Wrap this error with a descriptive prefix.
    pub fn context(self, context: impl Into<String>) -> Self {
        VmprovError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error, skipping any context layers.
    pub fn root(&self) -> &VmprovError {
        match self {
            VmprovError::Context { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), VmprovError::Cancelled)
    }
}

/// Attach a descriptive prefix to the error of a `VmprovResult`.
pub trait ResultExt<T> {
    fn context(self, context: &str) -> VmprovResult<T>;
}

impl<T> ResultExt<T> for VmprovResult<T> {
    fn context(self, context: &str) -> VmprovResult<T> {
        self.map_err(|e| e.context(context))
    }
}
