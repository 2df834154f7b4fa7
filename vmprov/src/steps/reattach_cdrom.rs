//! Step: Reattach CD-ROM devices.
//!
//! Leaves the final VM with exactly `reattach_cdroms` CD-ROM devices, all
//! empty, so the exported template has drives for later use without carrying
//! the build's installation media.
//!
//! ```text
//! delta = reattach_cdroms - len(iso_paths)
//!
//! delta < 0:  remove |delta| → eject
//! delta >= 0: eject → remove(0) → [SATA controller] → make delta devices
//! ```
//!
//! No rollback: a failure part way leaves the devices as the last successful
//! driver call left them.

use super::{ensure_controller, finish};
use crate::config::{CdromConfig, ReattachCdromConfig};
use crate::driver::VirtualMachine;
use crate::pipeline::{BuildState, Step, StepAction};
use crate::ui::Ui;
use async_trait::async_trait;
use vmprov_shared::{ResultExt, VmprovResult};

pub struct ReattachCdromStep {
    pub config: ReattachCdromConfig,
    pub cdrom: CdromConfig,
}

impl ReattachCdromStep {
    pub fn new(config: ReattachCdromConfig, cdrom: CdromConfig) -> Self {
        Self { config, cdrom }
    }

    /// Devices to add (positive) or remove (negative).
    fn delta(&self) -> i64 {
        i64::from(self.config.reattach_cdroms) - self.cdrom.iso_paths.len() as i64
    }

    /// Validate, then reconcile the VM's devices. Nothing touches the VM
    /// unless the configuration is valid.
    async fn execute(&self, state: &BuildState) -> VmprovResult<()> {
        self.config.validate().context("error reattach cdrom")?;
        let vm = state.vm()?;

        state.ui.say("Reattaching CD-ROM devices...");
        self.reconcile(state.ui.as_ref(), vm.as_ref()).await
    }

    async fn reconcile(&self, ui: &dyn Ui, vm: &dyn VirtualMachine) -> VmprovResult<()> {
        let delta = self.delta();
        let bus = self.cdrom.cdrom_type;

        tracing::info!(
            vm = vm.name(),
            desired = self.config.reattach_cdroms,
            configured = self.cdrom.iso_paths.len(),
            delta,
            %bus,
            "Reconciling cdrom devices"
        );

        if delta < 0 {
            let excess = delta.unsigned_abs() as usize;
            vm.remove_cdroms(excess)
                .await
                .context("error removing cdrom prior to reattaching")?;

            ui.say("Ejecting CD-ROM media...");
            vm.eject_cdroms()
                .await
                .context("error ejecting cdrom media")?;
            return Ok(());
        }

        vm.eject_cdroms()
            .await
            .context("error ejecting cdrom media")?;

        vm.remove_cdroms(0)
            .await
            .context("error removing cdrom prior to reattaching")?;

        ensure_controller(ui, vm, bus).await?;

        if delta > 0 {
            ui.say("Adding CD-ROM devices...");
            let created = vm
                .make_cdroms(bus, delta as usize, true)
                .await
                .context("error adding cdrom devices")?;
            tracing::debug!(vm = vm.name(), created = created.len(), %bus, "Added cdrom devices");
        }

        Ok(())
    }
}

#[async_trait]
impl Step for ReattachCdromStep {
    async fn run(&self, state: &mut BuildState) -> StepAction {
        let step = self.name();

        if !self.config.is_enabled() {
            tracing::debug!(step, "reattach_cdroms is 0, skipping");
            return StepAction::Continue;
        }

        let result = self.execute(state).await;
        finish(state, step, result)
    }

    fn name(&self) -> &str {
        "reattach_cdrom"
    }
}
