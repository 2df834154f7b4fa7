//! In-memory VM driver.
//!
//! Keeps a device table shaped like a vSphere VM: two IDE controllers with
//! two units each, and SATA controllers added on demand. Every call is
//! recorded, and individual operations can be made to fail, which makes it
//! the driver of choice for tests and dry runs.

use super::{CdromBus, CdromDevice, ControllerLookup, Media, SataController, VirtualMachine};
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;
use vmprov_shared::{VmprovError, VmprovResult};

const IDE_CONTROLLER_KEYS: [i32; 2] = [200, 201];
const IDE_UNITS_PER_CONTROLLER: u32 = 2;
const SATA_CONTROLLER_KEY_BASE: i32 = 15000;
const SATA_UNITS_PER_CONTROLLER: u32 = 30;
const MAX_SATA_CONTROLLERS: usize = 4;
const FIRST_DEVICE_KEY: i32 = 3000;

/// Driver operation, without arguments. Used to inject failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverOp {
    RemoveCdroms,
    RemoveAllCdroms,
    EjectCdroms,
    FindSataController,
    AddSataController,
    MakeCdroms,
    AddCdrom,
}

/// A recorded driver call with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    RemoveCdroms(usize),
    RemoveAllCdroms,
    EjectCdroms,
    FindSataController,
    AddSataController,
    MakeCdroms {
        bus: CdromBus,
        count: usize,
        empty_slot: bool,
    },
    AddCdrom {
        bus: CdromBus,
        iso_path: String,
    },
}

impl DriverCall {
    pub fn op(&self) -> DriverOp {
        match self {
            DriverCall::RemoveCdroms(_) => DriverOp::RemoveCdroms,
            DriverCall::RemoveAllCdroms => DriverOp::RemoveAllCdroms,
            DriverCall::EjectCdroms => DriverOp::EjectCdroms,
            DriverCall::FindSataController => DriverOp::FindSataController,
            DriverCall::AddSataController => DriverOp::AddSataController,
            DriverCall::MakeCdroms { .. } => DriverOp::MakeCdroms,
            DriverCall::AddCdrom { .. } => DriverOp::AddCdrom,
        }
    }
}

#[derive(Debug)]
struct Inner {
    devices: Vec<CdromDevice>,
    sata_controllers: Vec<SataController>,
    next_key: i32,
    calls: Vec<DriverCall>,
    failures: HashMap<DriverOp, String>,
}

impl Inner {
    fn new() -> Self {
        Self {
            devices: Vec::new(),
            sata_controllers: Vec::new(),
            next_key: FIRST_DEVICE_KEY,
            calls: Vec::new(),
            failures: HashMap::new(),
        }
    }

    /// Record the call and apply any injected failure for it.
    fn enter(&mut self, call: DriverCall) -> VmprovResult<()> {
        let op = call.op();
        self.calls.push(call);
        match self.failures.get(&op) {
            Some(message) => Err(VmprovError::Driver(message.clone())),
            None => Ok(()),
        }
    }

    /// Free (controller_key, unit) slots on `bus`, in attach order.
    fn free_slots(&self, bus: CdromBus) -> Vec<(i32, u32)> {
        let controllers: Vec<(i32, u32)> = match bus {
            CdromBus::Ide => IDE_CONTROLLER_KEYS
                .iter()
                .map(|key| (*key, IDE_UNITS_PER_CONTROLLER))
                .collect(),
            CdromBus::Sata => self
                .sata_controllers
                .iter()
                .map(|c| (c.key, SATA_UNITS_PER_CONTROLLER))
                .collect(),
        };

        controllers
            .into_iter()
            .flat_map(|(key, units)| (0..units).map(move |unit| (key, unit)))
            .filter(|(key, unit)| {
                !self
                    .devices
                    .iter()
                    .any(|d| d.controller_key == *key && d.unit == *unit)
            })
            .collect()
    }

    /// Attach one device per entry of `media`. Nothing is attached unless
    /// every device fits.
    fn attach(&mut self, bus: CdromBus, media: Vec<Media>) -> VmprovResult<Vec<CdromDevice>> {
        if bus == CdromBus::Sata && self.sata_controllers.is_empty() {
            return Err(VmprovError::Driver(
                "no SATA controller to attach cdrom devices to".into(),
            ));
        }

        let slots = self.free_slots(bus);
        if slots.len() < media.len() {
            return Err(VmprovError::Driver(format!(
                "not enough free {} slots: requested {}, available {}",
                bus,
                media.len(),
                slots.len()
            )));
        }

        let mut created = Vec::with_capacity(media.len());
        for ((controller_key, unit), media) in slots.into_iter().zip(media) {
            let device = CdromDevice {
                key: self.next_key,
                bus,
                controller_key,
                unit,
                media,
            };
            self.next_key += 1;
            self.devices.push(device.clone());
            created.push(device);
        }
        Ok(created)
    }

    fn add_sata_controller(&mut self) -> VmprovResult<SataController> {
        if self.sata_controllers.len() >= MAX_SATA_CONTROLLERS {
            return Err(VmprovError::Driver(format!(
                "VM already has the maximum of {} SATA controllers",
                MAX_SATA_CONTROLLERS
            )));
        }
        let bus_number = self.sata_controllers.len() as u32;
        let controller = SataController {
            key: SATA_CONTROLLER_KEY_BASE + bus_number as i32,
            bus_number,
        };
        self.sata_controllers.push(controller);
        Ok(controller)
    }
}

/// VM whose devices live in process memory.
#[derive(Debug)]
pub struct InMemoryVm {
    id: Uuid,
    name: String,
    inner: Mutex<Inner>,
}

impl InMemoryVm {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            inner: Mutex::new(Inner::new()),
        }
    }

    /// Start with a SATA controller already present.
    pub fn with_sata_controller(self) -> VmprovResult<Self> {
        self.inner.lock().add_sata_controller()?;
        Ok(self)
    }

    /// Start with `media.len()` CD-ROM devices on `bus`. Not recorded as calls.
    pub fn with_cdroms(self, bus: CdromBus, media: Vec<Media>) -> VmprovResult<Self> {
        {
            let mut inner = self.inner.lock();
            if bus == CdromBus::Sata && inner.sata_controllers.is_empty() {
                inner.add_sata_controller()?;
            }
            inner.attach(bus, media)?;
        }
        Ok(self)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Make every subsequent `op` call fail with a driver error.
    pub fn fail_on(&self, op: DriverOp, message: impl Into<String>) {
        self.inner.lock().failures.insert(op, message.into());
    }

    /// Calls made so far, oldest first.
    pub fn calls(&self) -> Vec<DriverCall> {
        self.inner.lock().calls.clone()
    }

    pub fn devices(&self) -> Vec<CdromDevice> {
        self.inner.lock().devices.clone()
    }

    pub fn sata_controllers(&self) -> Vec<SataController> {
        self.inner.lock().sata_controllers.clone()
    }
}

#[async_trait::async_trait]
impl VirtualMachine for InMemoryVm {
    fn name(&self) -> &str {
        &self.name
    }

    async fn remove_cdroms(&self, count: usize) -> VmprovResult<()> {
        let mut inner = self.inner.lock();
        inner.enter(DriverCall::RemoveCdroms(count))?;

        let attached = inner.devices.len();
        if count > attached {
            return Err(VmprovError::Driver(format!(
                "cannot remove {} cdrom devices, only {} attached",
                count, attached
            )));
        }
        // Most recently attached devices go first.
        inner.devices.truncate(attached - count);
        tracing::debug!(vm = %self.name, removed = count, "Removed cdrom devices");
        Ok(())
    }

    async fn remove_all_cdroms(&self) -> VmprovResult<()> {
        let mut inner = self.inner.lock();
        inner.enter(DriverCall::RemoveAllCdroms)?;
        inner.devices.clear();
        Ok(())
    }

    async fn eject_cdroms(&self) -> VmprovResult<()> {
        let mut inner = self.inner.lock();
        inner.enter(DriverCall::EjectCdroms)?;
        for device in inner.devices.iter_mut() {
            device.media = Media::Empty;
        }
        Ok(())
    }

    async fn find_sata_controller(&self) -> VmprovResult<ControllerLookup> {
        let mut inner = self.inner.lock();
        inner.enter(DriverCall::FindSataController)?;
        Ok(match inner.sata_controllers.first() {
            Some(controller) => ControllerLookup::Found(*controller),
            None => ControllerLookup::NotFound,
        })
    }

    async fn add_sata_controller(&self) -> VmprovResult<SataController> {
        let mut inner = self.inner.lock();
        inner.enter(DriverCall::AddSataController)?;
        let controller = inner.add_sata_controller()?;
        tracing::debug!(vm = %self.name, key = controller.key, "Added SATA controller");
        Ok(controller)
    }

    async fn make_cdroms(
        &self,
        bus: CdromBus,
        count: usize,
        empty_slot: bool,
    ) -> VmprovResult<Vec<CdromDevice>> {
        let mut inner = self.inner.lock();
        inner.enter(DriverCall::MakeCdroms {
            bus,
            count,
            empty_slot,
        })?;
        let media = if empty_slot {
            Media::Empty
        } else {
            Media::ClientDevice
        };
        inner.attach(bus, vec![media; count])
    }

    async fn add_cdrom(&self, bus: CdromBus, iso_path: &str) -> VmprovResult<CdromDevice> {
        let mut inner = self.inner.lock();
        inner.enter(DriverCall::AddCdrom {
            bus,
            iso_path: iso_path.to_string(),
        })?;
        let mut created = inner.attach(bus, vec![Media::Iso(iso_path.to_string())])?;
        created
            .pop()
            .ok_or_else(|| VmprovError::Internal("attach returned no device".into()))
    }

    async fn cdroms(&self) -> VmprovResult<Vec<CdromDevice>> {
        Ok(self.inner.lock().devices.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iso(path: &str) -> Media {
        Media::Iso(path.to_string())
    }

    #[tokio::test]
    async fn test_ide_slots_fill_in_order() {
        let vm = InMemoryVm::new("vm");
        let devices = vm.make_cdroms(CdromBus::Ide, 4, true).await.unwrap();

        let slots: Vec<(i32, u32)> = devices.iter().map(|d| (d.controller_key, d.unit)).collect();
        assert_eq!(slots, vec![(200, 0), (200, 1), (201, 0), (201, 1)]);
        assert!(devices.iter().all(|d| d.media == Media::Empty));
    }

    #[tokio::test]
    async fn test_make_cdroms_is_all_or_nothing() {
        let vm = InMemoryVm::new("vm")
            .with_cdroms(CdromBus::Ide, vec![Media::Empty, Media::Empty])
            .unwrap();

        let result = vm.make_cdroms(CdromBus::Ide, 3, true).await;

        assert!(result.unwrap_err().to_string().contains("not enough free ide slots"));
        assert_eq!(vm.devices().len(), 2);
    }

    #[tokio::test]
    async fn test_sata_requires_controller() {
        let vm = InMemoryVm::new("vm");
        assert!(vm.make_cdroms(CdromBus::Sata, 1, true).await.is_err());

        assert_eq!(
            vm.find_sata_controller().await.unwrap(),
            ControllerLookup::NotFound
        );
        let controller = vm.add_sata_controller().await.unwrap();
        assert_eq!(
            vm.find_sata_controller().await.unwrap(),
            ControllerLookup::Found(controller)
        );

        let devices = vm.make_cdroms(CdromBus::Sata, 2, true).await.unwrap();
        assert!(devices.iter().all(|d| d.controller_key == controller.key));
    }

    #[tokio::test]
    async fn test_remove_takes_most_recent_first() {
        let vm = InMemoryVm::new("vm")
            .with_cdroms(CdromBus::Ide, vec![iso("a.iso"), iso("b.iso"), iso("c.iso")])
            .unwrap();

        vm.remove_cdroms(2).await.unwrap();

        let devices = vm.devices();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].media, iso("a.iso"));
    }

    #[tokio::test]
    async fn test_remove_zero_is_noop() {
        let vm = InMemoryVm::new("vm")
            .with_cdroms(CdromBus::Ide, vec![iso("a.iso")])
            .unwrap();

        vm.remove_cdroms(0).await.unwrap();

        assert_eq!(vm.devices().len(), 1);
        assert_eq!(vm.calls(), vec![DriverCall::RemoveCdroms(0)]);
    }

    #[tokio::test]
    async fn test_remove_more_than_attached_fails() {
        let vm = InMemoryVm::new("vm")
            .with_cdroms(CdromBus::Ide, vec![iso("a.iso")])
            .unwrap();

        assert!(vm.remove_cdroms(2).await.is_err());
        assert_eq!(vm.devices().len(), 1);
    }

    #[tokio::test]
    async fn test_eject_keeps_devices() {
        let vm = InMemoryVm::new("vm")
            .with_cdroms(CdromBus::Ide, vec![iso("a.iso"), Media::ClientDevice])
            .unwrap();

        vm.eject_cdroms().await.unwrap();

        let devices = vm.cdroms().await.unwrap();
        assert_eq!(devices.len(), 2);
        assert!(devices.iter().all(|d| d.media == Media::Empty));
    }

    #[tokio::test]
    async fn test_injected_failure_is_recorded() {
        let vm = InMemoryVm::new("vm");
        vm.fail_on(DriverOp::EjectCdroms, "device busy");

        let err = vm.eject_cdroms().await.unwrap_err();

        assert!(matches!(err, VmprovError::Driver(ref m) if m == "device busy"));
        assert_eq!(vm.calls(), vec![DriverCall::EjectCdroms]);
    }

    #[tokio::test]
    async fn test_add_cdrom_and_client_device() {
        let vm = InMemoryVm::new("vm");

        let device = vm.add_cdrom(CdromBus::Ide, "[ds1] iso/a.iso").await.unwrap();
        assert_eq!(device.media, iso("[ds1] iso/a.iso"));

        let devices = vm.make_cdroms(CdromBus::Ide, 1, false).await.unwrap();
        assert_eq!(devices[0].media, Media::ClientDevice);
        assert_ne!(devices[0].key, device.key);
    }

    #[tokio::test]
    async fn test_preseeded_sata_controller() {
        let vm = InMemoryVm::new("vm").with_sata_controller().unwrap();

        assert!(matches!(
            vm.find_sata_controller().await.unwrap(),
            ControllerLookup::Found(SataController { bus_number: 0, .. })
        ));
        assert!(vm.make_cdroms(CdromBus::Sata, 1, true).await.is_ok());
    }

    #[test]
    fn test_sata_controller_limit() {
        let vm = InMemoryVm::new("vm");
        for _ in 0..MAX_SATA_CONTROLLERS {
            vm.inner.lock().add_sata_controller().unwrap();
        }
        assert!(vm.inner.lock().add_sata_controller().is_err());
    }
}
