//! Driver configuration (`spec.md` §6 "Configuration").

use crate::error::{DriverError, Result};
use crate::geometry::minimum_image_size;
use log::warn;

/// Default image size: 100 MiB.
pub const DEFAULT_IMAGE_SIZE: u64 = 100 * 1024 * 1024;

pub const DISK_DEVICE_NAME: &str = r"\Device\SafeRamDisk";
pub const CONTROL_DEVICE_NAME: &str = r"\Device\SafeRamDiskCtl";

/// DOS alias for the control device. `spec.md` §4.6 / §6: the pointer-width
/// split comes from the original driver reserving the `Global` namespace
/// prefix for 64-bit session isolation.
#[cfg(target_pointer_width = "64")]
pub const CONTROL_DOS_ALIAS: &str = r"\DosDevices\Global\SafeDos";
#[cfg(not(target_pointer_width = "64"))]
pub const CONTROL_DOS_ALIAS: &str = r"\DosDevices\SafeDos";

#[derive(Debug, Clone)]
pub struct DiskConfig {
    pub image_size: u64,
    pub device_name: String,
    pub control_device_name: String,
    pub dos_alias: String,
}

impl DiskConfig {
    /// Build a config, rejecting an `image_size` too small to hold the
    /// reserved sectors, one FAT sector and one data cluster.
    ///
    /// `spec.md` §9 calls out that the original driver only `assert`s this;
    /// we turn it into a real, rejectable `InvalidParameter`.
    pub fn new(image_size: u64) -> Result<Self> {
        let min = minimum_image_size();
        if image_size < min {
            warn!("rejecting image_size {image_size}, below minimum {min}");
            return Err(DriverError::InvalidParameter(format!(
                "image_size {} is below the minimum {} required for reserved sectors + one FAT sector + one data cluster",
                image_size, min
            )));
        }
        Ok(DiskConfig {
            image_size,
            device_name: DISK_DEVICE_NAME.to_string(),
            control_device_name: CONTROL_DEVICE_NAME.to_string(),
            dos_alias: CONTROL_DOS_ALIAS.to_string(),
        })
    }
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE_SIZE).expect("default image size satisfies the minimum")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = DiskConfig::default();
        assert_eq!(cfg.image_size, DEFAULT_IMAGE_SIZE);
    }

    #[test]
    fn rejects_undersized_image() {
        assert!(DiskConfig::new(1024).is_err());
    }

    #[test]
    fn accepts_minimum_image_size() {
        let min = minimum_image_size();
        assert!(DiskConfig::new(min).is_ok());
    }
}
