//! Test utilities for the face HAL service
//!
//! Provides a scripted face device, a matching device module and auth token
//! helpers for testing across crates.
//!
//! # Example
//!
//! ```
//! use common::test_utils::{DeviceCall, ScriptedDevice};
//! use protocol::{DeviceMessage, FaceDevice, FaceId};
//! use std::sync::Arc;
//!
//! let device = Arc::new(ScriptedDevice::new());
//! device.respond_with(|call| match call {
//!     DeviceCall::Remove { face_id } => vec![DeviceMessage::TemplateRemoved { face_id: face_id.0 }],
//!     _ => Vec::new(),
//! });
//!
//! device.remove(FaceId(5)).unwrap();
//! assert_eq!(device.calls(), vec![DeviceCall::Remove { face_id: FaceId(5) }]);
//! ```

use protocol::{
    AUTH_TOKEN_SIZE, DeviceCode, DeviceMessage, DeviceModule, DeviceResult, FaceDevice, FaceId,
    Feature, HardwareAuthToken, MODULE_API_VERSION, ModuleError, ModuleVersion, NotifyFn, UserId,
};
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Short window used to assert that something does *not* happen
pub const QUIET_PERIOD: Duration = Duration::from_millis(150);

/// One call received by a [`ScriptedDevice`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCall {
    SetNotify,
    SetActiveGroup {
        user_id: UserId,
        store_path: String,
    },
    PreEnroll {
        timeout_sec: u32,
    },
    Enroll {
        token: HardwareAuthToken,
        timeout_sec: u32,
        disabled_features: Vec<Feature>,
    },
    PostEnroll,
    SetFeature {
        feature: Feature,
        enabled: bool,
        face_id: FaceId,
    },
    GetFeature {
        feature: Feature,
        face_id: FaceId,
    },
    GetAuthenticatorId,
    Cancel,
    Enumerate,
    Remove {
        face_id: FaceId,
    },
    Authenticate {
        operation_id: u64,
    },
    UserActivity,
    ResetLockout,
    EnrollProcess {
        addr: i64,
        info: Vec<i32>,
        byte_info: Vec<i8>,
    },
    AuthenticateProcess {
        main: i64,
        sub: i64,
        otp: i64,
        info: Vec<i32>,
        byte_info: Vec<i8>,
    },
    Close,
}

impl DeviceCall {
    /// Operation name, used as the key for scripted failures
    pub fn name(&self) -> &'static str {
        match self {
            DeviceCall::SetNotify => "set_notify",
            DeviceCall::SetActiveGroup { .. } => "set_active_group",
            DeviceCall::PreEnroll { .. } => "pre_enroll",
            DeviceCall::Enroll { .. } => "enroll",
            DeviceCall::PostEnroll => "post_enroll",
            DeviceCall::SetFeature { .. } => "set_feature",
            DeviceCall::GetFeature { .. } => "get_feature",
            DeviceCall::GetAuthenticatorId => "get_authenticator_id",
            DeviceCall::Cancel => "cancel",
            DeviceCall::Enumerate => "enumerate",
            DeviceCall::Remove { .. } => "remove",
            DeviceCall::Authenticate { .. } => "authenticate",
            DeviceCall::UserActivity => "user_activity",
            DeviceCall::ResetLockout => "reset_lockout",
            DeviceCall::EnrollProcess { .. } => "do_enroll_process",
            DeviceCall::AuthenticateProcess { .. } => "do_authenticate_process",
            DeviceCall::Close => "close",
        }
    }
}

type Responder = Box<dyn Fn(&DeviceCall) -> Vec<DeviceMessage> + Send + Sync>;

/// Face device driven by the test
///
/// Records every call, returns scripted status codes and lets the test emit
/// notifications either from its own thread ([`ScriptedDevice::emit`]) or
/// from inside the device call ([`ScriptedDevice::respond_with`]).
pub struct ScriptedDevice {
    version: ModuleVersion,
    notify: Mutex<Option<NotifyFn>>,
    calls: Mutex<Vec<DeviceCall>>,
    called: Condvar,
    failures: Mutex<HashMap<&'static str, DeviceCode>>,
    responder: Mutex<Option<Responder>>,
    challenge: u64,
    authenticator_id: u64,
    features: Mutex<HashMap<Feature, bool>>,
}

impl ScriptedDevice {
    pub fn new() -> Self {
        Self::with_version(MODULE_API_VERSION)
    }

    /// Device reporting an arbitrary module version
    pub fn with_version(version: ModuleVersion) -> Self {
        Self {
            version,
            notify: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            called: Condvar::new(),
            failures: Mutex::new(HashMap::new()),
            responder: Mutex::new(None),
            challenge: 0x5eed_c0de,
            authenticator_id: 0xa117_0001,
            features: Mutex::new(HashMap::new()),
        }
    }

    /// Make every call named `operation` fail with `code`
    pub fn fail(&self, operation: &'static str, code: DeviceCode) {
        lock(&self.failures).insert(operation, code);
    }

    /// Notifications to emit from inside each device call
    pub fn respond_with(
        &self,
        responder: impl Fn(&DeviceCall) -> Vec<DeviceMessage> + Send + Sync + 'static,
    ) {
        *lock(&self.responder) = Some(Box::new(responder));
    }

    /// Deliver a notification from the calling thread
    ///
    /// Returns false if no notify callback is installed.
    pub fn emit(&self, message: DeviceMessage) -> bool {
        let notify = lock(&self.notify).clone();
        match notify {
            Some(notify) => {
                notify(message);
                true
            }
            None => false,
        }
    }

    /// Whether a notify callback has been installed
    pub fn has_notify(&self) -> bool {
        lock(&self.notify).is_some()
    }

    /// Snapshot of every call received so far
    pub fn calls(&self) -> Vec<DeviceCall> {
        lock(&self.calls).clone()
    }

    /// Calls received so far, excluding `set_notify`
    pub fn operations(&self) -> Vec<DeviceCall> {
        self.calls()
            .into_iter()
            .filter(|call| *call != DeviceCall::SetNotify)
            .collect()
    }

    /// Number of calls named `operation`
    pub fn count(&self, operation: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| call.name() == operation)
            .count()
    }

    /// Wait until a call named `operation` has been received `times` times
    pub fn wait_for_call(&self, operation: &str, times: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut calls = lock(&self.calls);

        loop {
            let seen = calls.iter().filter(|c| c.name() == operation).count();
            if seen >= times {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            calls = self
                .called
                .wait_timeout(calls, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn call<T>(&self, call: DeviceCall, value: T) -> DeviceResult<T> {
        let failure = lock(&self.failures).get(call.name()).copied();

        let responses = match lock(&self.responder).as_ref() {
            Some(responder) if failure.is_none() => responder(&call),
            _ => Vec::new(),
        };

        lock(&self.calls).push(call);
        self.called.notify_all();

        if let Some(code) = failure {
            return Err(code);
        }
        for message in responses {
            self.emit(message);
        }
        Ok(value)
    }
}

impl Default for ScriptedDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl FaceDevice for ScriptedDevice {
    fn version(&self) -> ModuleVersion {
        self.version
    }

    fn set_notify(&self, notify: NotifyFn) -> DeviceResult<()> {
        if let Some(code) = lock(&self.failures).get("set_notify").copied() {
            return Err(code);
        }
        *lock(&self.notify) = Some(notify);
        self.call(DeviceCall::SetNotify, ())
    }

    fn set_active_group(&self, user_id: UserId, store_path: &str) -> DeviceResult<()> {
        self.call(
            DeviceCall::SetActiveGroup {
                user_id,
                store_path: store_path.to_string(),
            },
            (),
        )
    }

    fn pre_enroll(&self, timeout_sec: u32) -> DeviceResult<u64> {
        self.call(DeviceCall::PreEnroll { timeout_sec }, self.challenge)
    }

    fn enroll(
        &self,
        token: &HardwareAuthToken,
        timeout_sec: u32,
        disabled_features: &[Feature],
    ) -> DeviceResult<()> {
        self.call(
            DeviceCall::Enroll {
                token: *token,
                timeout_sec,
                disabled_features: disabled_features.to_vec(),
            },
            (),
        )
    }

    fn post_enroll(&self) -> DeviceResult<()> {
        self.call(DeviceCall::PostEnroll, ())
    }

    fn set_feature(
        &self,
        feature: Feature,
        enabled: bool,
        _token: &HardwareAuthToken,
        face_id: FaceId,
    ) -> DeviceResult<()> {
        let result = self.call(
            DeviceCall::SetFeature {
                feature,
                enabled,
                face_id,
            },
            (),
        );
        if result.is_ok() {
            lock(&self.features).insert(feature, enabled);
        }
        result
    }

    fn get_feature(&self, feature: Feature, face_id: FaceId) -> DeviceResult<bool> {
        let enabled = lock(&self.features).get(&feature).copied().unwrap_or(true);
        self.call(DeviceCall::GetFeature { feature, face_id }, enabled)
    }

    fn get_authenticator_id(&self) -> DeviceResult<u64> {
        self.call(DeviceCall::GetAuthenticatorId, self.authenticator_id)
    }

    fn cancel(&self) -> DeviceResult<()> {
        self.call(DeviceCall::Cancel, ())
    }

    fn enumerate(&self) -> DeviceResult<()> {
        self.call(DeviceCall::Enumerate, ())
    }

    fn remove(&self, face_id: FaceId) -> DeviceResult<()> {
        self.call(DeviceCall::Remove { face_id }, ())
    }

    fn authenticate(&self, operation_id: u64) -> DeviceResult<()> {
        self.call(DeviceCall::Authenticate { operation_id }, ())
    }

    fn user_activity(&self) -> DeviceResult<()> {
        self.call(DeviceCall::UserActivity, ())
    }

    fn reset_lockout(&self, _token: &HardwareAuthToken) -> DeviceResult<()> {
        self.call(DeviceCall::ResetLockout, ())
    }

    fn do_enroll_process(&self, addr: i64, info: &[i32], byte_info: &[i8]) -> DeviceResult<()> {
        self.call(
            DeviceCall::EnrollProcess {
                addr,
                info: info.to_vec(),
                byte_info: byte_info.to_vec(),
            },
            (),
        )
    }

    fn do_authenticate_process(
        &self,
        main: i64,
        sub: i64,
        otp: i64,
        info: &[i32],
        byte_info: &[i8],
    ) -> DeviceResult<()> {
        self.call(
            DeviceCall::AuthenticateProcess {
                main,
                sub,
                otp,
                info: info.to_vec(),
                byte_info: byte_info.to_vec(),
            },
            (),
        )
    }

    fn close(&self) -> DeviceResult<()> {
        *lock(&self.notify) = None;
        self.call(DeviceCall::Close, ())
    }
}

/// How a [`ScriptedModule`] behaves when opened
enum ModuleBehavior {
    Open(Arc<ScriptedDevice>),
    Missing,
    Refuse(DeviceCode),
}

/// Device module handing out a [`ScriptedDevice`]
pub struct ScriptedModule {
    behavior: ModuleBehavior,
}

impl ScriptedModule {
    /// Module that opens `device`
    pub fn new(device: Arc<ScriptedDevice>) -> Self {
        Self {
            behavior: ModuleBehavior::Open(device),
        }
    }

    /// Module that cannot be located
    pub fn missing() -> Self {
        Self {
            behavior: ModuleBehavior::Missing,
        }
    }

    /// Module whose open call fails with `code`
    pub fn refusing(code: DeviceCode) -> Self {
        Self {
            behavior: ModuleBehavior::Refuse(code),
        }
    }
}

impl DeviceModule for ScriptedModule {
    fn name(&self) -> &str {
        "scripted"
    }

    fn open(&self) -> Result<Arc<dyn FaceDevice>, ModuleError> {
        match &self.behavior {
            ModuleBehavior::Open(device) => Ok(device.clone() as Arc<dyn FaceDevice>),
            ModuleBehavior::Missing => Err(ModuleError::NotFound(self.name().to_string())),
            ModuleBehavior::Refuse(code) => Err(ModuleError::OpenFailed(*code)),
        }
    }
}

/// All-zero auth token bytes
pub fn zero_token() -> Vec<u8> {
    vec![0u8; AUTH_TOKEN_SIZE]
}

/// Random auth token bytes of the right size
pub fn garbage_token() -> Vec<u8> {
    let mut bytes = vec![0u8; AUTH_TOKEN_SIZE];
    rand::rng().fill(&mut bytes[..]);
    bytes
}

/// Auth token bytes for an enrollment bound to `challenge`
pub fn challenge_token(challenge: u64, user_id: u64) -> Vec<u8> {
    HardwareAuthToken::from_fields(challenge, user_id, 0, 1, 1_000)
        .as_bytes()
        .to_vec()
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
