//! Device driver interface for the hypervisor.
//!
//! ## Architecture
//!
//! - **VirtualMachine**: device operations on one VM (CD-ROMs, controllers)
//! - **InMemoryVm**: self-contained implementation backed by a device table
//!
//! Steps only ever see `Arc<dyn VirtualMachine>` borrowed from the build
//! state, so a real hypervisor client plugs in without touching them.

mod memory;

pub use memory::{DriverCall, DriverOp, InMemoryVm};

use serde::{Deserialize, Serialize};
use std::fmt;
use vmprov_shared::VmprovResult;

/// Controller family a CD-ROM device attaches to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CdromBus {
    #[default]
    Ide,
    Sata,
}

impl fmt::Display for CdromBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            CdromBus::Ide => "ide",
            CdromBus::Sata => "sata",
        })
    }
}

/// Backing of a CD-ROM device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Media {
    /// No media inserted.
    Empty,
    /// ISO image on a datastore.
    Iso(String),
    /// Passthrough to the remote client's drive.
    ClientDevice,
}

/// A CD-ROM device attached to a VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdromDevice {
    /// Hypervisor device key.
    pub key: i32,
    pub bus: CdromBus,
    /// Key of the controller the device is attached to.
    pub controller_key: i32,
    /// Slot on the controller.
    pub unit: u32,
    pub media: Media,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SataController {
    pub key: i32,
    pub bus_number: u32,
}

/// Outcome of a SATA controller lookup.
///
/// Absence is an expected answer, not an error: callers use it to decide
/// whether a controller has to be provisioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerLookup {
    Found(SataController),
    NotFound,
}

/// Device operations on a virtual machine.
///
/// Every call is a blocking round-trip to the hypervisor; callers issue them
/// one at a time. Implementations that support cancellation report it as
/// `VmprovError::Cancelled`.
#[async_trait::async_trait]
pub trait VirtualMachine: Send + Sync {
    /// VM name, for logging.
    fn name(&self) -> &str;

    /// Remove `count` CD-ROM devices. Which devices go is up to the driver.
    /// A count of zero removes nothing.
    async fn remove_cdroms(&self, count: usize) -> VmprovResult<()>;

    /// Remove every CD-ROM device.
    async fn remove_all_cdroms(&self) -> VmprovResult<()>;

    /// Eject the media of every CD-ROM device, leaving the devices attached.
    async fn eject_cdroms(&self) -> VmprovResult<()>;

    async fn find_sata_controller(&self) -> VmprovResult<ControllerLookup>;

    async fn add_sata_controller(&self) -> VmprovResult<SataController>;

    /// Create `count` CD-ROM devices on `bus`.
    ///
    /// With `empty_slot` the devices have no media; otherwise they are backed
    /// by the client device.
    async fn make_cdroms(
        &self,
        bus: CdromBus,
        count: usize,
        empty_slot: bool,
    ) -> VmprovResult<Vec<CdromDevice>>;

    /// Create one CD-ROM device with `iso_path` inserted.
    async fn add_cdrom(&self, bus: CdromBus, iso_path: &str) -> VmprovResult<CdromDevice>;

    /// Currently attached CD-ROM devices.
    async fn cdroms(&self) -> VmprovResult<Vec<CdromDevice>>;
}
