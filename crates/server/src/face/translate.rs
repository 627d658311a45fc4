//! Device code translation
//!
//! Maps the raw device status, error and acquisition codes onto the client
//! model. Exact named codes are matched before the vendor range check, so a
//! vendor code that collides with a named one is never reachable.

use protocol::{
    DeviceCode, DeviceResult, FaceAcquiredInfo, FaceError, Status, acquired_code, error_code,
    status_code,
};
use tracing::error;

/// Translate a synchronous device status code
pub fn to_status(code: DeviceCode) -> Status {
    match code {
        status_code::OK => Status::Ok,
        status_code::ILLEGAL_ARGUMENT => Status::IllegalArgument,
        status_code::OPERATION_NOT_SUPPORTED => Status::OperationNotSupported,
        status_code::NOT_ENROLLED => Status::NotEnrolled,
        status_code::INTERNAL_ERROR => Status::InternalError,
        _ => {
            error!("Unknown status code from face device: {}", code);
            Status::InternalError
        }
    }
}

/// Translate the outcome of a device call that returns no value
pub fn status_of(result: DeviceResult<()>) -> Status {
    match result {
        Ok(()) => Status::Ok,
        Err(code) => to_status(code),
    }
}

/// Translate an asynchronous device error into `(FaceError, vendor_code)`
pub fn to_client_error(code: DeviceCode) -> (FaceError, i32) {
    let error = match code {
        error_code::HW_UNAVAILABLE => FaceError::HwUnavailable,
        error_code::UNABLE_TO_PROCESS => FaceError::UnableToProcess,
        error_code::TIMEOUT => FaceError::Timeout,
        error_code::NO_SPACE => FaceError::NoSpace,
        error_code::CANCELED => FaceError::Canceled,
        error_code::UNABLE_TO_REMOVE => FaceError::UnableToRemove,
        error_code::LOCKOUT => FaceError::Lockout,
        error_code::LOCKOUT_PERMANENT => FaceError::LockoutPermanent,
        error_code::VERIFY_TOKEN_FAIL => {
            return (
                FaceError::UnableToProcess,
                code - error_code::VENDOR_BASE,
            );
        }
        _ if code >= error_code::VENDOR_BASE => {
            return (FaceError::Vendor, code - error_code::VENDOR_BASE);
        }
        _ => {
            error!("Unknown error code from face device: {}", code);
            FaceError::UnableToProcess
        }
    };

    (error, 0)
}

/// Translate a device acquisition code into `(FaceAcquiredInfo, vendor_code)`
pub fn to_client_acquired_info(code: DeviceCode) -> (FaceAcquiredInfo, i32) {
    let info = match code {
        acquired_code::GOOD => FaceAcquiredInfo::Good,
        acquired_code::INSUFFICIENT => FaceAcquiredInfo::Insufficient,
        acquired_code::TOO_BRIGHT => FaceAcquiredInfo::TooBright,
        acquired_code::TOO_DARK => FaceAcquiredInfo::TooDark,
        acquired_code::TOO_CLOSE => FaceAcquiredInfo::TooClose,
        acquired_code::TOO_FAR => FaceAcquiredInfo::TooFar,
        acquired_code::FACE_TOO_HIGH => FaceAcquiredInfo::FaceTooHigh,
        acquired_code::FACE_TOO_LOW => FaceAcquiredInfo::FaceTooLow,
        acquired_code::FACE_TOO_RIGHT => FaceAcquiredInfo::FaceTooRight,
        acquired_code::FACE_TOO_LEFT => FaceAcquiredInfo::FaceTooLeft,
        acquired_code::POOR_GAZE => FaceAcquiredInfo::PoorGaze,
        acquired_code::NOT_DETECTED => FaceAcquiredInfo::NotDetected,
        acquired_code::TOO_MUCH_MOTION => FaceAcquiredInfo::TooMuchMotion,
        acquired_code::RECALIBRATE => FaceAcquiredInfo::Recalibrate,
        acquired_code::TOO_DIFFERENT => FaceAcquiredInfo::TooDifferent,
        acquired_code::TOO_SIMILAR => FaceAcquiredInfo::TooSimilar,
        acquired_code::PAN_TOO_EXTREME => FaceAcquiredInfo::PanTooExtreme,
        acquired_code::TILT_TOO_EXTREME => FaceAcquiredInfo::TiltTooExtreme,
        acquired_code::ROLL_TOO_EXTREME => FaceAcquiredInfo::RollTooExtreme,
        acquired_code::FACE_OBSCURED => FaceAcquiredInfo::FaceObscured,
        acquired_code::START => FaceAcquiredInfo::Start,
        acquired_code::SENSOR_DIRTY => FaceAcquiredInfo::SensorDirty,
        _ if code >= acquired_code::VENDOR_BASE => {
            return (FaceAcquiredInfo::Vendor, code - acquired_code::VENDOR_BASE);
        }
        _ => {
            error!("Unknown acquired code from face device: {}", code);
            FaceAcquiredInfo::Insufficient
        }
    };

    (info, 0)
}
