//! Device Information Service: fixed revision strings.

use crate::config::{HARDWARE_REVISION, SOFTWARE_REVISION};

#[derive(Debug, Clone, Copy)]
pub struct DeviceInformation {
    pub software_revision: &'static str,
    pub hardware_revision: &'static str,
}

impl Default for DeviceInformation {
    fn default() -> Self {
        Self {
            software_revision: SOFTWARE_REVISION,
            hardware_revision: HARDWARE_REVISION,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn software_revision_is_crate_version() {
        let dis = DeviceInformation::default();
        assert_eq!(dis.software_revision, env!("CARGO_PKG_VERSION"));
        assert!(!dis.hardware_revision.is_empty());
    }
}
