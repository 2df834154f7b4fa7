//! Build orchestration.
//!
//! ```text
//! 1. AddCdrom       (mount iso_paths)
//! 2. RemoveCdrom    (eject media / delete drives)
//! 3. ReattachCdrom  (leave reattach_cdroms empty drives)
//! ```

use crate::config::BuildConfig;
use crate::driver::VirtualMachine;
use crate::pipeline::{BoxedStep, BuildState, Pipeline, PipelineMetrics, PipelineRunner};
use crate::steps::{AddCdromStep, ReattachCdromStep, RemoveCdromStep};
use crate::ui::Ui;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use vmprov_shared::VmprovResult;

/// Steps for the CD-ROM lifecycle of one build.
pub fn cdrom_pipeline(config: &BuildConfig) -> Pipeline {
    let steps: Vec<BoxedStep> = vec![
        Box::new(AddCdromStep::new(config.cdrom.clone())),
        Box::new(RemoveCdromStep::new(
            config.remove_cdrom.clone(),
            config.reattach_cdrom,
        )),
        Box::new(ReattachCdromStep::new(
            config.reattach_cdrom,
            config.cdrom.clone(),
        )),
    ];
    Pipeline::new(steps)
}

/// Runs a validated build against one VM.
///
/// # Example
///
/// ```ignore
/// let metrics = Build::new(config, vm, ui)?
///     .run(&CancellationToken::new())
///     .await?;
/// ```
pub struct Build {
    config: BuildConfig,
    vm: Arc<dyn VirtualMachine>,
    ui: Arc<dyn Ui>,
}

impl Build {
    /// Validate `config` and prepare a build. Nothing runs yet.
    pub fn new(
        config: BuildConfig,
        vm: Arc<dyn VirtualMachine>,
        ui: Arc<dyn Ui>,
    ) -> VmprovResult<Self> {
        config.validate()?;
        Ok(Self { config, vm, ui })
    }

    /// Run every step, returning the recorded error if the build halted.
    pub async fn run(self, cancel: &CancellationToken) -> VmprovResult<PipelineMetrics> {
        let Build { config, vm, ui } = self;

        tracing::info!(vm = vm.name(), "Starting build");
        let mut state = BuildState::new(ui).with_vm(vm);
        let report = PipelineRunner::run(cdrom_pipeline(&config), &mut state, cancel).await;

        tracing::info!(
            action = ?report.action,
            total_ms = report.metrics.total_duration_ms,
            "Build finished"
        );
        report.into_result(&mut state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CdromConfig, ReattachCdromConfig, RemoveCdromConfig};
    use crate::driver::{CdromBus, DriverCall, DriverOp, InMemoryVm, Media};
    use crate::ui::testing::RecordingUi;
    use vmprov_shared::VmprovError;

    fn config(bus: CdromBus, isos: &[&str], eject: bool, reattach: i32) -> BuildConfig {
        BuildConfig {
            vm_name: "vm".into(),
            cdrom: CdromConfig {
                cdrom_type: bus,
                iso_paths: isos.iter().map(|p| p.to_string()).collect(),
            },
            remove_cdrom: RemoveCdromConfig {
                eject_cdrom: eject,
                remove_cdrom: true,
            },
            reattach_cdrom: ReattachCdromConfig::new(reattach),
        }
    }

    #[tokio::test]
    async fn test_full_build_leaves_requested_empty_drives() {
        let vm = Arc::new(InMemoryVm::new("vm"));
        let build = Build::new(
            config(CdromBus::Sata, &["os.iso"], true, 3),
            vm.clone(),
            Arc::new(RecordingUi::default()),
        )
        .unwrap();

        let metrics = build.run(&CancellationToken::new()).await.unwrap();

        assert_eq!(
            metrics.executed(),
            vec!["add_cdrom", "remove_cdrom", "reattach_cdrom"]
        );
        let devices = vm.devices();
        assert_eq!(devices.len(), 3);
        assert!(devices.iter().all(|d| d.media == Media::Empty));
        assert_eq!(vm.sata_controllers().len(), 1);
        assert!(!vm.calls().contains(&DriverCall::RemoveAllCdroms));
    }

    #[tokio::test]
    async fn test_build_without_reattach_removes_drives() {
        let vm = Arc::new(InMemoryVm::new("vm"));
        let build = Build::new(
            config(CdromBus::Ide, &["os.iso", "tools.iso"], true, 0),
            vm.clone(),
            Arc::new(RecordingUi::default()),
        )
        .unwrap();

        build.run(&CancellationToken::new()).await.unwrap();

        assert!(vm.devices().is_empty());
    }

    #[tokio::test]
    async fn test_build_halts_and_reports_error() {
        let vm = Arc::new(InMemoryVm::new("vm"));
        vm.fail_on(DriverOp::MakeCdroms, "out of slots");
        let build = Build::new(
            config(CdromBus::Ide, &["os.iso"], true, 2),
            vm.clone(),
            Arc::new(RecordingUi::default()),
        )
        .unwrap();

        let err = build.run(&CancellationToken::new()).await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "error adding cdrom devices: driver error: out of slots"
        );
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_up_front() {
        let vm = Arc::new(InMemoryVm::new("vm"));
        let result = Build::new(
            config(CdromBus::Ide, &[], false, 7),
            vm.clone(),
            Arc::new(RecordingUi::default()),
        );

        assert!(matches!(result, Err(VmprovError::Config(_))));
        assert!(vm.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_build() {
        let vm = Arc::new(InMemoryVm::new("vm"));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let build = Build::new(
            config(CdromBus::Ide, &["os.iso"], true, 1),
            vm.clone(),
            Arc::new(RecordingUi::default()),
        )
        .unwrap();

        let err = build.run(&cancel).await.unwrap_err();

        assert!(err.is_cancelled());
        assert!(vm.calls().is_empty());
    }
}
