pub mod config;
pub mod error;
pub mod geometry;
pub mod ioctl;
pub mod pnp;
pub mod remove_lock;
pub mod rollback;

pub use config::DiskConfig;
pub use error::{DriverError, Result};
pub use geometry::{DiskGeometry, PartitionType};
pub use pnp::PnpState;
pub use remove_lock::{RemoveLock, RemoveLockGuard};
pub use rollback::Rollback;
