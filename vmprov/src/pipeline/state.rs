//! Shared build state.

use crate::driver::VirtualMachine;
use crate::ui::Ui;
use std::sync::Arc;
use vmprov_shared::{VmprovError, VmprovResult};

/// Context threaded through every step of one pipeline run.
///
/// Stores the UI sink, the VM being provisioned and the error that halted
/// the run, if any. Steps get it by `&mut`, so there is only ever one writer.
pub struct BuildState {
    pub ui: Arc<dyn Ui>,
    vm: Option<Arc<dyn VirtualMachine>>,
    error: Option<VmprovError>,
    pub(crate) cancelled: bool,
    pub(crate) halted: bool,
}

impl BuildState {
    pub fn new(ui: Arc<dyn Ui>) -> Self {
        Self {
            ui,
            vm: None,
            error: None,
            cancelled: false,
            halted: false,
        }
    }

    pub fn with_vm(mut self, vm: Arc<dyn VirtualMachine>) -> Self {
        self.vm = Some(vm);
        self
    }

    /// Install the VM handle, e.g. from a step that creates or clones the VM.
    pub fn set_vm(&mut self, vm: Arc<dyn VirtualMachine>) {
        self.vm = Some(vm);
    }

    /// Borrow the VM handle.
    pub fn vm(&self) -> VmprovResult<Arc<dyn VirtualMachine>> {
        self.vm
            .clone()
            .ok_or_else(|| VmprovError::InvalidState("no virtual machine in build state".into()))
    }

    /// Record the error that halts the build and report it on the UI.
    ///
    /// The first error wins; later ones are only logged.
    pub fn put_error(&mut self, err: VmprovError) {
        if let Some(existing) = &self.error {
            tracing::warn!(
                recorded = %existing,
                dropped = %err,
                "Build error already recorded, ignoring later error"
            );
            return;
        }
        self.ui.error(&err.to_string());
        self.error = Some(err);
    }

    pub fn error(&self) -> Option<&VmprovError> {
        self.error.as_ref()
    }

    pub fn take_error(&mut self) -> Option<VmprovError> {
        self.error.take()
    }

    /// Whether a step halted the pipeline.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Whether the pipeline was cancelled before finishing.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}
