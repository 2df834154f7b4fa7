//! vmprov: step-based VM provisioning.
//!
//! A build is an ordered list of [`pipeline::Step`]s run against one VM
//! through the [`driver::VirtualMachine`] interface. The CD-ROM steps in
//! [`steps`] mount installation media, clean it up, and leave the final VM
//! with the requested number of empty drives.

pub mod build;
pub mod config;
pub mod driver;
pub mod pipeline;
pub mod steps;
pub mod ui;

pub use build::{Build, cdrom_pipeline};
pub use config::BuildConfig;
pub use vmprov_shared::{VmprovError, VmprovResult};
