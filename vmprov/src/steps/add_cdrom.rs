//! Step: Add CD-ROM devices.
//!
//! Mounts each configured ISO image in its own CD-ROM device, in order, so
//! the guest can boot from and install off them.

use super::{ensure_controller, finish};
use crate::config::CdromConfig;
use crate::pipeline::{BuildState, Step, StepAction};
use async_trait::async_trait;
use vmprov_shared::{ResultExt, VmprovResult};

pub struct AddCdromStep {
    pub cdrom: CdromConfig,
}

impl AddCdromStep {
    pub fn new(cdrom: CdromConfig) -> Self {
        Self { cdrom }
    }

    async fn execute(&self, state: &BuildState) -> VmprovResult<()> {
        let vm = state.vm()?;
        let bus = self.cdrom.cdrom_type;

        ensure_controller(state.ui.as_ref(), vm.as_ref(), bus).await?;

        state.ui.say("Mounting ISO images...");
        for path in &self.cdrom.iso_paths {
            let device = vm
                .add_cdrom(bus, path)
                .await
                .context(&format!("error mounting an image '{}'", path))?;
            tracing::info!(
                vm = vm.name(),
                key = device.key,
                unit = device.unit,
                iso = %path,
                "Mounted ISO image"
            );
        }
        Ok(())
    }
}

#[async_trait]
impl Step for AddCdromStep {
    async fn run(&self, state: &mut BuildState) -> StepAction {
        let step = self.name();

        if self.cdrom.iso_paths.is_empty() {
            tracing::debug!(step, "No ISO images configured, skipping");
            return StepAction::Continue;
        }

        let result = self.execute(state).await;
        finish(state, step, result)
    }

    fn name(&self) -> &str {
        "add_cdrom"
    }
}
