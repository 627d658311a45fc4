//! Device driver contract
//!
//! The vendor face module is a blocking, single-client device. Every call
//! returns a raw device status code; results arrive later through the
//! notification callback installed with [`FaceDevice::set_notify`], possibly
//! on a thread owned by the device.
//!
//! Raw codes are kept as plain integers because the vendor range is open
//! ended. Translation into client types lives in the service.

use crate::token::HardwareAuthToken;
use crate::types::{FaceId, Feature, UserId};
use crate::version::ModuleVersion;
use std::sync::Arc;
use thiserror::Error;

/// Raw status code returned by device calls
pub type DeviceCode = i32;

/// Result of a blocking device call; `Err` carries the nonzero status code
pub type DeviceResult<T> = Result<T, DeviceCode>;

/// Status codes returned synchronously by device calls
pub mod status_code {
    use super::DeviceCode;

    pub const OK: DeviceCode = 0;
    pub const ILLEGAL_ARGUMENT: DeviceCode = -1;
    pub const OPERATION_NOT_SUPPORTED: DeviceCode = -2;
    pub const NOT_ENROLLED: DeviceCode = -3;
    pub const INTERNAL_ERROR: DeviceCode = -4;
}

/// Error codes carried by [`DeviceMessage::Error`]
pub mod error_code {
    use super::DeviceCode;

    pub const HW_UNAVAILABLE: DeviceCode = 1;
    pub const UNABLE_TO_PROCESS: DeviceCode = 2;
    pub const TIMEOUT: DeviceCode = 3;
    pub const NO_SPACE: DeviceCode = 4;
    pub const CANCELED: DeviceCode = 5;
    pub const UNABLE_TO_REMOVE: DeviceCode = 6;
    pub const LOCKOUT: DeviceCode = 7;
    pub const LOCKOUT_PERMANENT: DeviceCode = 9;
    /// First code of the vendor-specific range
    pub const VENDOR_BASE: DeviceCode = 1000;
    /// Auth token rejected by the device; vendor sub-code is `code - VENDOR_BASE`
    pub const VERIFY_TOKEN_FAIL: DeviceCode = VENDOR_BASE + 1;
}

/// Acquisition codes carried by [`DeviceMessage::Acquired`]
pub mod acquired_code {
    use super::DeviceCode;

    pub const GOOD: DeviceCode = 0;
    pub const INSUFFICIENT: DeviceCode = 1;
    pub const TOO_BRIGHT: DeviceCode = 2;
    pub const TOO_DARK: DeviceCode = 3;
    pub const TOO_CLOSE: DeviceCode = 4;
    pub const TOO_FAR: DeviceCode = 5;
    pub const FACE_TOO_HIGH: DeviceCode = 6;
    pub const FACE_TOO_LOW: DeviceCode = 7;
    pub const FACE_TOO_RIGHT: DeviceCode = 8;
    pub const FACE_TOO_LEFT: DeviceCode = 9;
    pub const POOR_GAZE: DeviceCode = 10;
    pub const NOT_DETECTED: DeviceCode = 11;
    pub const TOO_MUCH_MOTION: DeviceCode = 12;
    pub const RECALIBRATE: DeviceCode = 13;
    pub const TOO_DIFFERENT: DeviceCode = 14;
    pub const TOO_SIMILAR: DeviceCode = 15;
    pub const PAN_TOO_EXTREME: DeviceCode = 16;
    pub const TILT_TOO_EXTREME: DeviceCode = 17;
    pub const ROLL_TOO_EXTREME: DeviceCode = 18;
    pub const FACE_OBSCURED: DeviceCode = 19;
    pub const START: DeviceCode = 20;
    pub const SENSOR_DIRTY: DeviceCode = 21;
    /// First code of the vendor-specific range
    pub const VENDOR_BASE: DeviceCode = 1000;
}

/// Event delivered by the device through the notify callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceMessage {
    /// Terminal error for the current operation
    Error { code: DeviceCode },
    /// Informational acquisition hint
    Acquired { code: DeviceCode },
    /// Enrollment finished; `face_id <= 0` means the capture timed out
    TemplateEnrolling { face_id: i32, remaining: u32 },
    /// One template removed
    TemplateRemoved { face_id: u32 },
    /// Authentication finished; `face_id == 0` means no match
    Authenticated {
        face_id: u32,
        token: HardwareAuthToken,
    },
    /// One enumerated template
    TemplateEnumerated { face_id: u32 },
    /// Lockout state changed; zero clears the lockout
    LockoutChanged { duration_millis: u64 },
    /// Vendor extension: an enroll continuation frame was consumed
    EnrollProcessed { addr: i64, remaining: u32 },
    /// Vendor extension: an authenticate continuation frame was consumed
    AuthenticateProcessed { main: i64, sub: i64 },
    /// Message tag this adapter does not understand
    Unknown { msg_type: i32 },
}

impl DeviceMessage {
    /// Short tag used in log lines
    pub fn kind(&self) -> &'static str {
        match self {
            DeviceMessage::Error { .. } => "error",
            DeviceMessage::Acquired { .. } => "acquired",
            DeviceMessage::TemplateEnrolling { .. } => "template_enrolling",
            DeviceMessage::TemplateRemoved { .. } => "template_removed",
            DeviceMessage::Authenticated { .. } => "authenticated",
            DeviceMessage::TemplateEnumerated { .. } => "template_enumerated",
            DeviceMessage::LockoutChanged { .. } => "lockout_changed",
            DeviceMessage::EnrollProcessed { .. } => "enroll_processed",
            DeviceMessage::AuthenticateProcessed { .. } => "authenticate_processed",
            DeviceMessage::Unknown { .. } => "unknown",
        }
    }
}

/// Notification callback installed on the device
///
/// The device may invoke it from any thread, including from inside one of its
/// own blocking calls.
pub type NotifyFn = Arc<dyn Fn(DeviceMessage) + Send + Sync>;

/// Blocking face device contract
///
/// Implementations must tolerate calls from more than one thread; the service
/// serializes the long-running operations (enroll, authenticate, enumerate,
/// remove, cancel, continuations) on a single worker, but synchronous
/// pass-throughs run on caller threads.
pub trait FaceDevice: Send + Sync {
    /// Module API version reported by the device
    fn version(&self) -> ModuleVersion;

    /// Install the single notification callback, replacing any previous one
    fn set_notify(&self, notify: NotifyFn) -> DeviceResult<()>;

    fn set_active_group(&self, user_id: UserId, store_path: &str) -> DeviceResult<()>;

    /// Generate an enrollment challenge valid for `timeout_sec`
    fn pre_enroll(&self, timeout_sec: u32) -> DeviceResult<u64>;

    fn enroll(
        &self,
        token: &HardwareAuthToken,
        timeout_sec: u32,
        disabled_features: &[Feature],
    ) -> DeviceResult<()>;

    /// Revoke the enrollment challenge
    fn post_enroll(&self) -> DeviceResult<()>;

    fn set_feature(
        &self,
        feature: Feature,
        enabled: bool,
        token: &HardwareAuthToken,
        face_id: FaceId,
    ) -> DeviceResult<()>;

    fn get_feature(&self, feature: Feature, face_id: FaceId) -> DeviceResult<bool>;

    fn get_authenticator_id(&self) -> DeviceResult<u64>;

    fn cancel(&self) -> DeviceResult<()>;

    fn enumerate(&self) -> DeviceResult<()>;

    /// Remove one template, or every template of the active user for `FaceId::NONE`
    fn remove(&self, face_id: FaceId) -> DeviceResult<()>;

    fn authenticate(&self, operation_id: u64) -> DeviceResult<()>;

    fn user_activity(&self) -> DeviceResult<()>;

    fn reset_lockout(&self, token: &HardwareAuthToken) -> DeviceResult<()>;

    /// Vendor extension: feed one enrollment frame
    fn do_enroll_process(&self, addr: i64, info: &[i32], byte_info: &[i8]) -> DeviceResult<()>;

    /// Vendor extension: feed one authentication frame
    fn do_authenticate_process(
        &self,
        main: i64,
        sub: i64,
        otp: i64,
        info: &[i32],
        byte_info: &[i8],
    ) -> DeviceResult<()>;

    /// Release the device; called exactly once at shutdown
    fn close(&self) -> DeviceResult<()>;
}

/// Errors raised while locating or opening a device module
#[derive(Debug, Error)]
pub enum ModuleError {
    /// No module with the requested name is available
    #[error("Face module '{0}' not found")]
    NotFound(String),

    /// The module refused to open
    #[error("Face module open failed with code {0}")]
    OpenFailed(DeviceCode),
}

/// Loadable vendor face module
pub trait DeviceModule: Send + Sync {
    /// Module name, for logs
    fn name(&self) -> &str;

    /// Open the device
    fn open(&self) -> Result<Arc<dyn FaceDevice>, ModuleError>;
}
