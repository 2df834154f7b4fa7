//! Build configuration.
//!
//! A build is described by one flat JSON document:
//!
//! ```json
//! {
//!   "vm_name": "ubuntu-22.04",
//!   "cdrom_type": "sata",
//!   "iso_paths": ["[datastore1] iso/ubuntu.iso"],
//!   "eject_cdrom": true,
//!   "reattach_cdroms": 2
//! }
//! ```
//!
//! Every field except `vm_name` is optional.

use crate::driver::CdromBus;
use serde::{Deserialize, Serialize};
use std::path::Path;
use vmprov_shared::{VmprovError, VmprovResult};

/// Upper bound for `reattach_cdroms`.
pub const MAX_REATTACH_CDROMS: i32 = 4;

/// IDE has two controllers with two units each.
const MAX_IDE_CDROMS: usize = 4;

/// CD-ROM devices mounted at build start.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CdromConfig {
    /// Controller family for CD-ROM devices.
    pub cdrom_type: CdromBus,
    /// ISO images to mount, one CD-ROM device each, in order.
    pub iso_paths: Vec<String>,
}

/// What to do with CD-ROM devices once the guest is provisioned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoveCdromConfig {
    /// Eject media from every CD-ROM device.
    pub eject_cdrom: bool,
    /// Delete every CD-ROM device. Ignored when `reattach_cdroms` is set.
    pub remove_cdrom: bool,
}

/// Number of empty CD-ROM devices to leave on the final VM.
///
/// Range 1-4. Zero disables the reattach step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReattachCdromConfig {
    pub reattach_cdroms: i32,
}

impl ReattachCdromConfig {
    pub fn new(reattach_cdroms: i32) -> Self {
        Self { reattach_cdroms }
    }

    pub fn is_enabled(&self) -> bool {
        self.reattach_cdroms != 0
    }

    pub fn validate(&self) -> VmprovResult<()> {
        if self.reattach_cdroms == 0 || (1..=MAX_REATTACH_CDROMS).contains(&self.reattach_cdroms) {
            return Ok(());
        }
        Err(VmprovError::Config(format!(
            "'reattach_cdroms' should be between 1 and {}. if set to 0, `reattach_cdroms` is ignored and the step is skipped",
            MAX_REATTACH_CDROMS
        )))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    pub vm_name: String,
    #[serde(flatten)]
    pub cdrom: CdromConfig,
    #[serde(flatten)]
    pub remove_cdrom: RemoveCdromConfig,
    #[serde(flatten)]
    pub reattach_cdrom: ReattachCdromConfig,
}

impl BuildConfig {
    /// Read a configuration file. Does not validate.
    pub fn load(path: impl AsRef<Path>) -> VmprovResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            VmprovError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config = serde_json::from_str(&raw)?;
        tracing::debug!(path = %path.display(), "Loaded build config");
        Ok(config)
    }

    /// Check the whole configuration, reporting every problem at once.
    pub fn validate(&self) -> VmprovResult<()> {
        let mut problems = Vec::new();

        if self.vm_name.trim().is_empty() {
            problems.push("'vm_name' is required".to_string());
        }

        if let Err(VmprovError::Config(message)) = self.reattach_cdrom.validate() {
            problems.push(message);
        }

        for (i, path) in self.cdrom.iso_paths.iter().enumerate() {
            if path.trim().is_empty() {
                problems.push(format!("'iso_paths[{}]' is empty", i));
            }
        }

        if self.cdrom.cdrom_type == CdromBus::Ide && self.cdrom.iso_paths.len() > MAX_IDE_CDROMS {
            problems.push(format!(
                "{} ISO images requested but IDE supports at most {} CD-ROM devices; use 'cdrom_type': 'sata'",
                self.cdrom.iso_paths.len(),
                MAX_IDE_CDROMS
            ));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(VmprovError::Config(problems.join("; ")))
        }
    }
}
