//! Types shared between the vmprov library and its tooling.

pub mod errors;

pub use errors::{ResultExt, VmprovError, VmprovResult};
