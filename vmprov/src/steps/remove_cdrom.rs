//! Step: Remove CD-ROM devices.
//!
//! Ejects the build's installation media and, unless the reattach step is
//! going to shape the final device set, deletes the drives.

use super::finish;
use crate::config::{ReattachCdromConfig, RemoveCdromConfig};
use crate::pipeline::{BuildState, Step, StepAction};
use async_trait::async_trait;
use vmprov_shared::{ResultExt, VmprovResult};

pub struct RemoveCdromStep {
    pub config: RemoveCdromConfig,
    pub reattach: ReattachCdromConfig,
}

impl RemoveCdromStep {
    pub fn new(config: RemoveCdromConfig, reattach: ReattachCdromConfig) -> Self {
        Self { config, reattach }
    }

    fn should_remove(&self) -> bool {
        self.config.remove_cdrom && !self.reattach.is_enabled()
    }

    async fn execute(&self, state: &BuildState) -> VmprovResult<()> {
        let vm = state.vm()?;

        if self.config.eject_cdrom {
            state.ui.say("Ejecting CD-ROM media...");
            vm.eject_cdroms()
                .await
                .context("error ejecting cdrom media")?;
        }

        if self.should_remove() {
            state.ui.say("Deleting CD-ROM drives...");
            vm.remove_all_cdroms()
                .await
                .context("error removing cdrom")?;
        } else if self.config.remove_cdrom {
            tracing::info!(
                vm = vm.name(),
                reattach_cdroms = self.reattach.reattach_cdroms,
                "remove_cdrom ignored because reattach_cdroms is set"
            );
        }
        Ok(())
    }
}

#[async_trait]
impl Step for RemoveCdromStep {
    async fn run(&self, state: &mut BuildState) -> StepAction {
        let step = self.name();

        if !self.config.eject_cdrom && !self.should_remove() {
            tracing::debug!(step, "Nothing to eject or remove, skipping");
            return StepAction::Continue;
        }

        let result = self.execute(state).await;
        finish(state, step, result)
    }

    fn name(&self) -> &str {
        "remove_cdrom"
    }
}
