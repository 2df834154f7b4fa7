//! CD-ROM provisioning steps.
//!
//! ```text
//! AddCdrom        (build start: mount configured ISO images)
//!   ... install / provision guest ...
//! RemoveCdrom     (build end: eject media, optionally delete drives)
//! ReattachCdrom   (build end: leave exactly N empty drives)
//! ```
//!
//! Every step follows the same shape: `run` does the work in a helper that
//! returns `VmprovResult<()>`, and any error is recorded in the build state
//! before halting. None of them allocates anything, so cleanup is a no-op.

mod add_cdrom;
mod reattach_cdrom;
mod remove_cdrom;

pub use add_cdrom::AddCdromStep;
pub use reattach_cdrom::ReattachCdromStep;
pub use remove_cdrom::RemoveCdromStep;

use crate::driver::{CdromBus, ControllerLookup, VirtualMachine};
use crate::pipeline::{BuildState, StepAction};
use crate::ui::Ui;
use vmprov_shared::{ResultExt, VmprovError, VmprovResult};

/// Turn a step result into an action, recording the error on failure.
fn finish(state: &mut BuildState, step: &str, result: VmprovResult<()>) -> StepAction {
    match result {
        Ok(()) => {
            tracing::debug!(step, "Step completed");
            StepAction::Continue
        }
        Err(err) => halt(state, step, err),
    }
}

fn halt(state: &mut BuildState, step: &str, err: VmprovError) -> StepAction {
    tracing::error!(step, error = %err, "Step failed");
    state.put_error(err);
    StepAction::Halt
}

/// Make sure the VM can take devices on `bus`.
///
/// Only SATA needs provisioning; IDE controllers are always present.
async fn ensure_controller(ui: &dyn Ui, vm: &dyn VirtualMachine, bus: CdromBus) -> VmprovResult<()> {
    if bus != CdromBus::Sata {
        return Ok(());
    }

    let lookup = vm
        .find_sata_controller()
        .await
        .context("error finding sata controller")?;

    if lookup == ControllerLookup::NotFound {
        ui.say("Adding SATA controller...");
        let controller = vm
            .add_sata_controller()
            .await
            .context("error adding sata controller")?;
        tracing::info!(vm = vm.name(), key = controller.key, "SATA controller added");
    }
    Ok(())
}
