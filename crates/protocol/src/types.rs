//! Client-facing face HAL type definitions
//!
//! This module defines the identifiers, status codes, error kinds and
//! acquisition hints exchanged with clients of the face service. The numeric
//! values are part of the client contract and must not be reordered.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};

/// Device identity reported to clients
///
/// Derived from the open device handle. Zero means no device is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DeviceId(pub u64);

/// Active user (group) identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub i32);

impl UserId {
    /// User id reported before `set_active_user` has been called
    pub const UNSET: UserId = UserId(-1);
}

impl Default for UserId {
    fn default() -> Self {
        Self::UNSET
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Enrolled face template identifier
///
/// `FaceId(0)` never names a template. In `remove` it selects every template
/// of the active user; in `on_authenticated` it means "no match".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FaceId(pub u32);

impl FaceId {
    /// Wildcard / no-match face id
    pub const NONE: FaceId = FaceId(0);
}

impl std::fmt::Display for FaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Synchronous request status
///
/// Returned from every client call. For queued operations `Ok` only means
/// "accepted"; the outcome arrives later through the client callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum Status {
    /// Request accepted or completed
    Ok = 0,
    /// A parameter was rejected
    IllegalArgument = 1,
    /// The device does not implement the operation
    OperationNotSupported = 2,
    /// Unclassified failure, including "no device"
    InternalError = 3,
    /// The operation needs an enrolled template
    NotEnrolled = 4,
}

impl Status {
    /// Whether the status is `Ok`
    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}

/// Asynchronous terminal error kinds delivered through `on_error`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum FaceError {
    HwUnavailable = 1,
    UnableToProcess = 2,
    Timeout = 3,
    NoSpace = 4,
    Canceled = 5,
    UnableToRemove = 6,
    Lockout = 7,
    /// Hardware specific error, see the accompanying vendor code
    Vendor = 8,
    LockoutPermanent = 9,
}

/// Acquisition hints delivered through `on_acquired`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum FaceAcquiredInfo {
    Good = 0,
    Insufficient = 1,
    TooBright = 2,
    TooDark = 3,
    TooClose = 4,
    TooFar = 5,
    FaceTooHigh = 6,
    FaceTooLow = 7,
    FaceTooRight = 8,
    FaceTooLeft = 9,
    PoorGaze = 10,
    NotDetected = 11,
    TooMuchMotion = 12,
    Recalibrate = 13,
    TooDifferent = 14,
    TooSimilar = 15,
    PanTooExtreme = 16,
    TiltTooExtreme = 17,
    RollTooExtreme = 18,
    FaceObscured = 19,
    Start = 20,
    SensorDirty = 21,
    /// Hardware specific hint, see the accompanying vendor code
    Vendor = 22,
}

/// Optional authentication features
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum Feature {
    /// The user must be looking at the device
    RequireAttention = 1,
    /// Enrollment must capture a diverse set of poses
    RequireDiversity = 2,
}

impl TryFrom<u32> for Feature {
    type Error = ProtocolError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Feature::RequireAttention),
            2 => Ok(Feature::RequireDiversity),
            other => Err(ProtocolError::UnknownFeature(other)),
        }
    }
}

/// Maximum number of features the device can disable at enrollment
pub const MAX_DISABLED_FEATURES: usize = 2;

/// Fixed-capacity set of features disabled for one enrollment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisabledFeatures {
    features: [Option<Feature>; MAX_DISABLED_FEATURES],
    len: usize,
}

impl DisabledFeatures {
    /// Copy a client-supplied feature list, rejecting lists over capacity
    pub fn from_slice(features: &[Feature]) -> Result<Self, ProtocolError> {
        if features.len() > MAX_DISABLED_FEATURES {
            return Err(ProtocolError::TooManyFeatures {
                count: features.len(),
                max: MAX_DISABLED_FEATURES,
            });
        }

        let mut set = Self::default();
        for (slot, feature) in set.features.iter_mut().zip(features) {
            *slot = Some(*feature);
        }
        set.len = features.len();
        Ok(set)
    }

    /// Number of disabled features
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no feature is disabled
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Disabled features in client order
    pub fn to_vec(&self) -> Vec<Feature> {
        self.features.iter().flatten().copied().collect()
    }
}

/// Shortest accepted active-user store path
pub const MIN_STORE_PATH_LEN: usize = 2;

/// Store paths must be strictly shorter than this
pub const MAX_STORE_PATH_LEN: usize = 4096;

/// Check an active-user store path against the accepted length bounds
pub fn validate_store_path(path: &str) -> Result<(), ProtocolError> {
    let len = path.len();
    if (MIN_STORE_PATH_LEN..MAX_STORE_PATH_LEN).contains(&len) {
        Ok(())
    } else {
        Err(ProtocolError::StorePathLength {
            len,
            min: MIN_STORE_PATH_LEN,
            max: MAX_STORE_PATH_LEN,
        })
    }
}

/// A status paired with a value, for synchronous reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionalValue<T> {
    pub status: Status,
    pub value: T,
}

impl<T> OptionalValue<T> {
    pub fn new(status: Status, value: T) -> Self {
        Self { status, value }
    }
}

/// Status plus a 64-bit value (challenge, authenticator id, device id)
pub type OptionalU64 = OptionalValue<u64>;

/// Status plus a flag (feature state)
pub type OptionalBool = OptionalValue<bool>;
