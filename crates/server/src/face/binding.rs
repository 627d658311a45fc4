//! Device binding
//!
//! Opens the face module once, checks its version and installs the notify
//! callback. A binding that failed to open holds no device; every dependent
//! operation then reports the hardware as unavailable instead of failing hard.

use crate::config::{DeviceSettings, SIMULATED_MODULE};
use crate::face::simulated::SimulatedModule;
use protocol::{
    DeviceCode, DeviceId, DeviceModule, FaceDevice, MODULE_API_VERSION, ModuleError, ModuleVersion,
    NotifyFn,
};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tracing::{error, info, warn};

/// Reasons the face device could not be bound
#[derive(Debug, Error)]
pub enum BindingError {
    #[error("Face module '{0}' not found")]
    ModuleUnavailable(String),

    #[error("Face module '{name}' failed to open: {code}")]
    OpenFailed { name: String, code: DeviceCode },

    #[error("Face module version {actual} not supported, expected {expected}")]
    IncompatibleVersion {
        expected: ModuleVersion,
        actual: ModuleVersion,
    },

    #[error("Failed to install notify callback: {0}")]
    NotifyInstall(DeviceCode),
}

/// Owner of the open face device
pub struct DeviceBinding {
    device: RwLock<Option<Arc<dyn FaceDevice>>>,
}

impl DeviceBinding {
    /// Binding without a device
    pub fn unbound() -> Self {
        Self {
            device: RwLock::new(None),
        }
    }

    /// Open `module` and install `notify`
    ///
    /// Failures are logged and leave the binding empty.
    pub fn open(module: Option<&dyn DeviceModule>, notify: NotifyFn) -> Self {
        match Self::try_open(module, notify) {
            Ok(device) => Self {
                device: RwLock::new(Some(device)),
            },
            Err(e) => {
                error!("Can't open face HAL module: {}", e);
                Self::unbound()
            }
        }
    }

    /// Fallible open, used by [`DeviceBinding::open`]
    pub fn try_open(
        module: Option<&dyn DeviceModule>,
        notify: NotifyFn,
    ) -> Result<Arc<dyn FaceDevice>, BindingError> {
        let module = module.ok_or_else(|| BindingError::ModuleUnavailable("face".to_string()))?;
        let name = module.name().to_string();

        let device = module.open().map_err(|e| match e {
            ModuleError::NotFound(name) => BindingError::ModuleUnavailable(name),
            ModuleError::OpenFailed(code) => BindingError::OpenFailed {
                name: name.clone(),
                code,
            },
        })?;

        let actual = device.version();
        if !actual.is_supported() {
            close_quietly(device.as_ref());
            return Err(BindingError::IncompatibleVersion {
                expected: MODULE_API_VERSION,
                actual,
            });
        }

        if let Err(code) = device.set_notify(notify) {
            close_quietly(device.as_ref());
            return Err(BindingError::NotifyInstall(code));
        }

        info!("Opened face module '{}' (version {})", name, actual);
        Ok(device)
    }

    /// The open device, if any
    ///
    /// Callers must not keep the handle past [`DeviceBinding::close`].
    pub fn device(&self) -> Option<Arc<dyn FaceDevice>> {
        self.device
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_open(&self) -> bool {
        self.device
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Identity reported to clients, `DeviceId(0)` when no device is open
    pub fn device_id(&self) -> DeviceId {
        self.device
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(DeviceId(0), device_id_of)
    }

    /// Close the device; later calls do nothing
    pub fn close(&self) {
        let device = self
            .device
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(device) = device {
            match device.close() {
                Ok(()) => info!("Face module closed"),
                Err(code) => error!("Can't close face module, error: {}", code),
            }
        }
    }
}

/// Identity of an open device handle
pub fn device_id_of(device: &Arc<dyn FaceDevice>) -> DeviceId {
    DeviceId(Arc::as_ptr(device) as *const () as usize as u64)
}

fn close_quietly(device: &dyn FaceDevice) {
    if let Err(code) = device.close() {
        warn!("Closing rejected face module failed: {}", code);
    }
}

/// Locate the face module named in the configuration
pub fn locate_module(settings: &DeviceSettings) -> Option<Box<dyn DeviceModule>> {
    match settings.module.as_str() {
        SIMULATED_MODULE => Some(Box::new(SimulatedModule::new(settings.simulated.clone()))),
        other => {
            error!("Face module '{}' not available", other);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_utils::{DeviceCall, ScriptedDevice, ScriptedModule};
    use protocol::DeviceMessage;

    fn noop() -> NotifyFn {
        Arc::new(|_: DeviceMessage| {})
    }

    #[test]
    fn test_open_installs_notify() {
        let device = Arc::new(ScriptedDevice::new());
        let module = ScriptedModule::new(device.clone());

        let binding = DeviceBinding::open(Some(&module), noop());

        assert!(binding.is_open());
        assert!(device.has_notify());
        assert_ne!(binding.device_id(), DeviceId(0));
    }

    #[test]
    fn test_missing_module() {
        let binding = DeviceBinding::open(None, noop());
        assert!(!binding.is_open());
        assert_eq!(binding.device_id(), DeviceId(0));

        let result = DeviceBinding::try_open(Some(&ScriptedModule::missing()), noop());
        assert!(matches!(result, Err(BindingError::ModuleUnavailable(_))));
    }

    #[test]
    fn test_open_failure() {
        let result = DeviceBinding::try_open(Some(&ScriptedModule::refusing(-19)), noop());
        assert!(matches!(
            result,
            Err(BindingError::OpenFailed { code: -19, .. })
        ));
    }

    #[test]
    fn test_version_mismatch_closes_device() {
        let device = Arc::new(ScriptedDevice::with_version(ModuleVersion::new(2, 0)));
        let module = ScriptedModule::new(device.clone());

        let result = DeviceBinding::try_open(Some(&module), noop());

        assert!(matches!(
            result,
            Err(BindingError::IncompatibleVersion { .. })
        ));
        assert_eq!(device.calls(), vec![DeviceCall::Close]);
    }

    #[test]
    fn test_notify_install_failure() {
        let device = Arc::new(ScriptedDevice::new());
        device.fail("set_notify", -4);
        let module = ScriptedModule::new(device.clone());

        let binding = DeviceBinding::open(Some(&module), noop());

        assert!(!binding.is_open());
        assert_eq!(device.count("close"), 1);
    }

    #[test]
    fn test_close_once() {
        let device = Arc::new(ScriptedDevice::new());
        let binding = DeviceBinding::open(Some(&ScriptedModule::new(device.clone())), noop());

        binding.close();
        binding.close();

        assert_eq!(device.count("close"), 1);
        assert!(binding.device().is_none());
    }

    #[test]
    fn test_locate_module() {
        let mut settings = crate::config::ServiceConfig::default().device;
        assert!(locate_module(&settings).is_some());

        settings.module = "unknown".to_string();
        assert!(locate_module(&settings).is_none());
    }
}
