//! Contract types for the face HAL service
//!
//! This crate defines both boundaries of the face service:
//!
//! - the **device contract** ([`FaceDevice`], [`DeviceModule`],
//!   [`DeviceMessage`]) spoken by the vendor face module, with its raw
//!   C-style status, error and acquisition codes;
//! - the **client contract** ([`ClientCallback`], [`ExtClientCallback`]) and
//!   the client-facing types ([`Status`], [`FaceError`],
//!   [`FaceAcquiredInfo`], [`Feature`]).
//!
//! # Example
//!
//! ```
//! use protocol::{DisabledFeatures, Feature, HardwareAuthToken, AUTH_TOKEN_SIZE};
//!
//! let token = HardwareAuthToken::from_slice(&[0u8; AUTH_TOKEN_SIZE]).unwrap();
//! assert_eq!(token.challenge(), 0);
//!
//! let disabled = DisabledFeatures::from_slice(&[Feature::RequireAttention]).unwrap();
//! assert_eq!(disabled.len(), 1);
//! ```

pub mod callback;
pub mod device;
pub mod error;
pub mod token;
pub mod types;
pub mod version;

pub use callback::{CallbackError, CallbackResult, ClientCallback, ExtClientCallback};
pub use device::{
    DeviceCode, DeviceMessage, DeviceModule, DeviceResult, FaceDevice, ModuleError, NotifyFn,
    acquired_code, error_code, status_code,
};
pub use error::{ProtocolError, Result};
pub use token::{AUTH_TOKEN_SIZE, HardwareAuthToken};
pub use types::{
    DeviceId, DisabledFeatures, FaceAcquiredInfo, FaceError, FaceId, Feature,
    MAX_DISABLED_FEATURES, MAX_STORE_PATH_LEN, MIN_STORE_PATH_LEN, OptionalBool, OptionalU64,
    OptionalValue, Status, UserId, validate_store_path,
};
pub use version::{MODULE_API_VERSION, ModuleVersion};
