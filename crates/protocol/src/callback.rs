//! Client callback contract
//!
//! The service reports every asynchronous outcome through these traits. A
//! client that also implements [`ExtClientCallback`] exposes it through
//! [`ClientCallback::as_ext`] to receive vendor continuation progress.

use crate::types::{DeviceId, FaceAcquiredInfo, FaceError, FaceId, UserId};
use thiserror::Error;

/// Failure reported by a client callback invocation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallbackError {
    /// The client process or connection is gone
    #[error("Client callback is dead")]
    DeadObject,

    /// Any other transport failure
    #[error("Client transport error: {0}")]
    Transport(String),
}

/// Result of a single callback invocation
pub type CallbackResult = Result<(), CallbackError>;

/// Events reported to the registered client
pub trait ClientCallback: Send + Sync {
    /// Enrollment progress or completion; `remaining == 0` means done
    fn on_enroll_result(
        &self,
        device_id: DeviceId,
        face_id: FaceId,
        user_id: UserId,
        remaining: u32,
    ) -> CallbackResult;

    /// Authentication result; an empty `token` means no face matched
    fn on_authenticated(
        &self,
        device_id: DeviceId,
        face_id: FaceId,
        user_id: UserId,
        token: &[u8],
    ) -> CallbackResult;

    fn on_acquired(
        &self,
        device_id: DeviceId,
        user_id: UserId,
        acquired_info: FaceAcquiredInfo,
        vendor_code: i32,
    ) -> CallbackResult;

    fn on_error(
        &self,
        device_id: DeviceId,
        user_id: UserId,
        error: FaceError,
        vendor_code: i32,
    ) -> CallbackResult;

    fn on_removed(&self, device_id: DeviceId, removed: &[FaceId], user_id: UserId)
    -> CallbackResult;

    fn on_enumerate(&self, device_id: DeviceId, faces: &[FaceId], user_id: UserId)
    -> CallbackResult;

    fn on_lockout_changed(&self, duration_millis: u64) -> CallbackResult;

    /// Vendor extension interface, if the client implements it
    fn as_ext(&self) -> Option<&dyn ExtClientCallback> {
        None
    }
}

/// Vendor extension events for continuation processing
pub trait ExtClientCallback: ClientCallback {
    /// An enroll continuation frame identified by `addr` was consumed
    fn on_enroll_processed(&self, device_id: DeviceId, addr: i64) -> CallbackResult;

    /// An authenticate continuation frame identified by `main`/`sub` was consumed
    fn on_auth_processed(&self, device_id: DeviceId, main: i64, sub: i64) -> CallbackResult;
}
