//! Device module version management

use serde::{Deserialize, Serialize};

/// Face module API version, packed as `major << 8 | minor` by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleVersion {
    pub major: u8,
    pub minor: u8,
}

/// Module API version this adapter is built against
pub const MODULE_API_VERSION: ModuleVersion = ModuleVersion { major: 1, minor: 0 };

impl ModuleVersion {
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Packed representation reported by the device
    pub const fn as_u16(&self) -> u16 {
        ((self.major as u16) << 8) | self.minor as u16
    }

    pub const fn from_u16(raw: u16) -> Self {
        Self {
            major: (raw >> 8) as u8,
            minor: (raw & 0xff) as u8,
        }
    }

    /// Whether a device reporting `self` can be driven by this adapter
    ///
    /// The translation layer depends on the exact event and error layout, so
    /// only an identical version is accepted.
    pub fn is_supported(&self) -> bool {
        *self == MODULE_API_VERSION
    }
}

impl std::fmt::Display for ModuleVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}
