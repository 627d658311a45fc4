//! Simulated face module
//!
//! An in-process device that honours the device contract without vendor
//! hardware. Every result is delivered from a short-lived notifier thread
//! after the configured latency, the way a real module reports from its own
//! threads. Cancel and close invalidate results that have not fired yet.

use crate::config::{SIMULATED_MODULE, SimulatedSettings};
use protocol::{
    DeviceMessage, DeviceModule, DeviceResult, FaceDevice, FaceId, Feature, HardwareAuthToken,
    MODULE_API_VERSION, ModuleError, ModuleVersion, NotifyFn, UserId, acquired_code, error_code,
    status_code,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Templates the simulated sensor can hold
const MAX_TEMPLATES: usize = 5;

/// Failed authentications before the device locks out
const MAX_FAILED_ATTEMPTS: u32 = 5;

/// Lockout duration reported after too many failures
const LOCKOUT_MILLIS: u64 = 30_000;

/// Authenticator type bit for face tokens
const AUTHENTICATOR_TYPE_FACE: u32 = 1 << 2;

/// Module handing out [`SimulatedDevice`]s
pub struct SimulatedModule {
    settings: SimulatedSettings,
}

impl SimulatedModule {
    pub fn new(settings: SimulatedSettings) -> Self {
        Self { settings }
    }
}

impl DeviceModule for SimulatedModule {
    fn name(&self) -> &str {
        SIMULATED_MODULE
    }

    fn open(&self) -> Result<Arc<dyn FaceDevice>, ModuleError> {
        Ok(Arc::new(SimulatedDevice::new(self.settings.clone())))
    }
}

#[derive(Debug, Clone)]
struct PendingEnroll {
    cycle: u64,
    frames_remaining: u32,
    disabled_features: Vec<Feature>,
}

struct DeviceState {
    user_id: UserId,
    store_path: Option<String>,
    templates: BTreeSet<u32>,
    challenge: u64,
    /// Feature flags per enrolled face; unset flags are enabled
    features: HashMap<(u32, Feature), bool>,
    failed_attempts: u32,
    locked_out: bool,
    pending_enroll: Option<PendingEnroll>,
    next_cycle: u64,
    opened: Instant,
}

impl DeviceState {
    fn complete_enroll(&mut self) -> DeviceMessage {
        let disabled_features = self
            .pending_enroll
            .take()
            .map(|pending| pending.disabled_features)
            .unwrap_or_default();
        if self.templates.len() >= MAX_TEMPLATES {
            return DeviceMessage::Error {
                code: error_code::NO_SPACE,
            };
        }
        let face_id = self.templates.last().map_or(1, |last| last + 1);
        self.templates.insert(face_id);
        for feature in disabled_features {
            self.features.insert((face_id, feature), false);
        }
        info!("Simulated device enrolled face {}", face_id);
        DeviceMessage::TemplateEnrolling {
            face_id: face_id as i32,
            remaining: 0,
        }
    }

    fn token_valid(&self, token: &HardwareAuthToken) -> bool {
        self.challenge != 0 && token.challenge() == self.challenge
    }
}

struct Inner {
    settings: SimulatedSettings,
    state: Mutex<DeviceState>,
    notify: Mutex<Option<NotifyFn>>,
    /// Bumped by cancel and close; results scheduled under an older
    /// generation are dropped
    generation: AtomicU64,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, messages: Vec<DeviceMessage>) {
        let notify = self
            .notify
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(notify) = notify else {
            debug!("No notify callback, dropping {} messages", messages.len());
            return;
        };
        for message in messages {
            notify(message);
        }
    }

    /// Run `action` on the device state after `delay` and emit its messages
    fn schedule_after(
        self: &Arc<Self>,
        delay: Duration,
        action: impl FnOnce(&mut DeviceState) -> Vec<DeviceMessage> + Send + 'static,
    ) -> DeviceResult<()> {
        let inner = Arc::clone(self);
        let generation = self.generation.load(Ordering::Acquire);

        std::thread::Builder::new()
            .name("sim-face-notify".to_string())
            .spawn(move || {
                std::thread::sleep(delay);
                let messages = {
                    let mut state = inner.state();
                    if inner.generation.load(Ordering::Acquire) != generation {
                        return;
                    }
                    action(&mut state)
                };
                inner.emit(messages);
            })
            .map(|_| ())
            .map_err(|e| {
                error!("Failed to spawn simulated notifier: {}", e);
                status_code::INTERNAL_ERROR
            })
    }

    fn schedule(
        self: &Arc<Self>,
        action: impl FnOnce(&mut DeviceState) -> Vec<DeviceMessage> + Send + 'static,
    ) -> DeviceResult<()> {
        self.schedule_after(Duration::from_millis(self.settings.latency_ms), action)
    }

    fn invalidate_pending(&self) {
        let mut state = self.state();
        self.generation.fetch_add(1, Ordering::AcqRel);
        state.pending_enroll = None;
    }
}

/// In-process face device
pub struct SimulatedDevice {
    inner: Arc<Inner>,
}

impl SimulatedDevice {
    pub fn new(settings: SimulatedSettings) -> Self {
        let templates = settings.enrolled.iter().copied().collect();
        Self {
            inner: Arc::new(Inner {
                settings,
                state: Mutex::new(DeviceState {
                    user_id: UserId::UNSET,
                    store_path: None,
                    templates,
                    challenge: 0,
                    features: HashMap::new(),
                    failed_attempts: 0,
                    locked_out: false,
                    pending_enroll: None,
                    next_cycle: 0,
                    opened: Instant::now(),
                }),
                notify: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
        }
    }
}

impl FaceDevice for SimulatedDevice {
    fn version(&self) -> ModuleVersion {
        MODULE_API_VERSION
    }

    fn set_notify(&self, notify: NotifyFn) -> DeviceResult<()> {
        *self
            .inner
            .notify
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(notify);
        Ok(())
    }

    fn set_active_group(&self, user_id: UserId, store_path: &str) -> DeviceResult<()> {
        if !store_path.starts_with('/') {
            return Err(status_code::ILLEGAL_ARGUMENT);
        }
        {
            let mut state = self.inner.state();
            state.user_id = user_id;
            state.store_path = Some(store_path.to_string());
        }
        debug!("Simulated device active group {} at {}", user_id.0, store_path);

        self.inner.schedule(|state| {
            let duration_millis = if state.locked_out { LOCKOUT_MILLIS } else { 0 };
            vec![DeviceMessage::LockoutChanged { duration_millis }]
        })
    }

    fn pre_enroll(&self, _timeout_sec: u32) -> DeviceResult<u64> {
        let mut state = self.inner.state();
        let challenge = loop {
            let candidate = rand::random::<u64>();
            if candidate != 0 && candidate != state.challenge {
                break candidate;
            }
        };
        state.challenge = challenge;
        Ok(challenge)
    }

    fn enroll(
        &self,
        token: &HardwareAuthToken,
        timeout_sec: u32,
        disabled_features: &[Feature],
    ) -> DeviceResult<()> {
        let frames = self.inner.settings.enroll_frames;
        let disabled_features = disabled_features.to_vec();
        let cycle = {
            let mut state = self.inner.state();
            if !state.token_valid(token) {
                debug!("Simulated device rejecting enroll token");
                return self.inner.schedule(|_| {
                    vec![DeviceMessage::Error {
                        code: error_code::VERIFY_TOKEN_FAIL,
                    }]
                });
            }
            state.next_cycle += 1;
            state.next_cycle
        };

        self.inner.schedule(move |state| {
            state.pending_enroll = Some(PendingEnroll {
                cycle,
                frames_remaining: frames,
                disabled_features,
            });
            let mut messages = vec![DeviceMessage::Acquired {
                code: acquired_code::START,
            }];
            if frames == 0 {
                messages.push(state.complete_enroll());
            }
            messages
        })?;

        if frames > 0 && timeout_sec > 0 {
            self.inner.schedule_after(
                Duration::from_secs(u64::from(timeout_sec)),
                move |state| {
                    let timed_out = state
                        .pending_enroll
                        .as_ref()
                        .is_some_and(|pending| pending.cycle == cycle);
                    if !timed_out {
                        return Vec::new();
                    }
                    state.pending_enroll = None;
                    vec![DeviceMessage::TemplateEnrolling {
                        face_id: 0,
                        remaining: 0,
                    }]
                },
            )?;
        }
        Ok(())
    }

    fn post_enroll(&self) -> DeviceResult<()> {
        self.inner.state().challenge = 0;
        Ok(())
    }

    fn set_feature(
        &self,
        feature: Feature,
        enabled: bool,
        token: &HardwareAuthToken,
        face_id: FaceId,
    ) -> DeviceResult<()> {
        let mut state = self.inner.state();
        if !state.token_valid(token) || !state.templates.contains(&face_id.0) {
            return Err(status_code::ILLEGAL_ARGUMENT);
        }
        state.features.insert((face_id.0, feature), enabled);
        Ok(())
    }

    fn get_feature(&self, feature: Feature, face_id: FaceId) -> DeviceResult<bool> {
        let state = self.inner.state();
        if !state.templates.contains(&face_id.0) {
            return Err(status_code::ILLEGAL_ARGUMENT);
        }
        Ok(state
            .features
            .get(&(face_id.0, feature))
            .copied()
            .unwrap_or(true))
    }

    fn get_authenticator_id(&self) -> DeviceResult<u64> {
        Ok(self.inner.settings.authenticator_id)
    }

    fn cancel(&self) -> DeviceResult<()> {
        self.inner.invalidate_pending();
        self.inner.schedule(|_| {
            vec![DeviceMessage::Error {
                code: error_code::CANCELED,
            }]
        })
    }

    fn enumerate(&self) -> DeviceResult<()> {
        self.inner.schedule(|state| {
            if state.templates.is_empty() {
                return vec![DeviceMessage::TemplateEnumerated { face_id: 0 }];
            }
            state
                .templates
                .iter()
                .map(|&face_id| DeviceMessage::TemplateEnumerated { face_id })
                .collect()
        })
    }

    fn remove(&self, face_id: FaceId) -> DeviceResult<()> {
        self.inner.schedule(move |state| {
            if face_id == FaceId::NONE {
                state.features.clear();
                let removed = std::mem::take(&mut state.templates);
                if removed.is_empty() {
                    return vec![DeviceMessage::TemplateRemoved { face_id: 0 }];
                }
                return removed
                    .into_iter()
                    .map(|face_id| DeviceMessage::TemplateRemoved { face_id })
                    .collect();
            }

            if state.templates.remove(&face_id.0) {
                state.features.retain(|(face, _), _| *face != face_id.0);
                vec![DeviceMessage::TemplateRemoved { face_id: face_id.0 }]
            } else {
                vec![DeviceMessage::Error {
                    code: error_code::UNABLE_TO_REMOVE,
                }]
            }
        })
    }

    fn authenticate(&self, operation_id: u64) -> DeviceResult<()> {
        let authenticator_id = self.inner.settings.authenticator_id;

        self.inner.schedule(move |state| {
            if state.locked_out {
                return vec![DeviceMessage::Error {
                    code: error_code::LOCKOUT,
                }];
            }

            let mut messages = vec![DeviceMessage::Acquired {
                code: acquired_code::START,
            }];
            match state.templates.first().copied() {
                Some(face_id) => {
                    state.failed_attempts = 0;
                    let token = HardwareAuthToken::from_fields(
                        operation_id,
                        state.user_id.0 as u64,
                        authenticator_id,
                        AUTHENTICATOR_TYPE_FACE,
                        state.opened.elapsed().as_millis() as u64,
                    );
                    messages.push(DeviceMessage::Authenticated { face_id, token });
                }
                None => {
                    state.failed_attempts += 1;
                    if state.failed_attempts >= MAX_FAILED_ATTEMPTS {
                        state.locked_out = true;
                        messages.push(DeviceMessage::Error {
                            code: error_code::LOCKOUT,
                        });
                        messages.push(DeviceMessage::LockoutChanged {
                            duration_millis: LOCKOUT_MILLIS,
                        });
                    } else {
                        messages.push(DeviceMessage::Authenticated {
                            face_id: 0,
                            token: HardwareAuthToken::zeroed(),
                        });
                    }
                }
            }
            messages
        })
    }

    fn user_activity(&self) -> DeviceResult<()> {
        Ok(())
    }

    fn reset_lockout(&self, token: &HardwareAuthToken) -> DeviceResult<()> {
        {
            let mut state = self.inner.state();
            if !state.token_valid(token) {
                return Err(status_code::ILLEGAL_ARGUMENT);
            }
            state.failed_attempts = 0;
            state.locked_out = false;
        }
        self.inner
            .schedule(|_| vec![DeviceMessage::LockoutChanged { duration_millis: 0 }])
    }

    fn do_enroll_process(&self, addr: i64, info: &[i32], byte_info: &[i8]) -> DeviceResult<()> {
        debug!(
            "Simulated enroll frame {:#x} ({} ints, {} bytes)",
            addr,
            info.len(),
            byte_info.len()
        );
        self.inner.schedule(move |state| {
            let remaining = match state.pending_enroll.as_mut() {
                Some(pending) if pending.frames_remaining > 0 => {
                    pending.frames_remaining -= 1;
                    Some(pending.frames_remaining)
                }
                _ => None,
            };

            match remaining {
                Some(0) => vec![
                    DeviceMessage::EnrollProcessed { addr, remaining: 0 },
                    state.complete_enroll(),
                ],
                Some(remaining) => vec![DeviceMessage::EnrollProcessed { addr, remaining }],
                None => vec![DeviceMessage::EnrollProcessed { addr, remaining: 0 }],
            }
        })
    }

    fn do_authenticate_process(
        &self,
        main: i64,
        sub: i64,
        otp: i64,
        info: &[i32],
        byte_info: &[i8],
    ) -> DeviceResult<()> {
        debug!(
            "Simulated auth frame {}/{} otp={} ({} ints, {} bytes)",
            main,
            sub,
            otp,
            info.len(),
            byte_info.len()
        );
        self.inner
            .schedule(move |_| vec![DeviceMessage::AuthenticateProcessed { main, sub }])
    }

    fn close(&self) -> DeviceResult<()> {
        self.inner.invalidate_pending();
        *self
            .inner
            .notify
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        info!("Simulated face device closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    const WAIT: Duration = Duration::from_secs(5);

    fn open(settings: SimulatedSettings) -> (Arc<dyn FaceDevice>, mpsc::Receiver<DeviceMessage>) {
        let device = SimulatedModule::new(settings).open().unwrap();
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        device
            .set_notify(Arc::new(move |message: DeviceMessage| {
                let _ = tx.lock().unwrap().send(message);
            }))
            .unwrap();
        (device, rx)
    }

    fn fast() -> SimulatedSettings {
        SimulatedSettings {
            latency_ms: 1,
            ..SimulatedSettings::default()
        }
    }

    fn valid_token(device: &Arc<dyn FaceDevice>) -> HardwareAuthToken {
        let challenge = device.pre_enroll(3).unwrap();
        HardwareAuthToken::from_fields(challenge, 99, 0, 1, 0)
    }

    #[test]
    fn test_challenges_unique_and_nonzero() {
        let (device, _rx) = open(fast());
        let mut seen = BTreeSet::new();
        for _ in 0..200 {
            let challenge = device.pre_enroll(3).unwrap();
            assert_ne!(challenge, 0);
            assert!(seen.insert(challenge));
        }
    }

    #[test]
    fn test_enroll_with_valid_token() {
        let (device, rx) = open(fast());
        let token = valid_token(&device);

        device.enroll(&token, 3, &[]).unwrap();

        assert_eq!(
            rx.recv_timeout(WAIT).unwrap(),
            DeviceMessage::Acquired {
                code: acquired_code::START
            }
        );
        assert_eq!(
            rx.recv_timeout(WAIT).unwrap(),
            DeviceMessage::TemplateEnrolling {
                face_id: 1,
                remaining: 0
            }
        );
    }

    #[test]
    fn test_enroll_with_zero_token_fails() {
        let (device, rx) = open(fast());
        device.enroll(&HardwareAuthToken::zeroed(), 3, &[]).unwrap();

        assert_eq!(
            rx.recv_timeout(WAIT).unwrap(),
            DeviceMessage::Error {
                code: error_code::VERIFY_TOKEN_FAIL
            }
        );
    }

    #[test]
    fn test_enroll_frames() {
        let (device, rx) = open(SimulatedSettings {
            enroll_frames: 2,
            ..fast()
        });
        let token = valid_token(&device);
        device.enroll(&token, 0, &[]).unwrap();
        assert!(matches!(
            rx.recv_timeout(WAIT).unwrap(),
            DeviceMessage::Acquired { .. }
        ));

        device.do_enroll_process(10, &[1], &[2]).unwrap();
        assert_eq!(
            rx.recv_timeout(WAIT).unwrap(),
            DeviceMessage::EnrollProcessed {
                addr: 10,
                remaining: 1
            }
        );

        device.do_enroll_process(11, &[], &[]).unwrap();
        assert_eq!(
            rx.recv_timeout(WAIT).unwrap(),
            DeviceMessage::EnrollProcessed {
                addr: 11,
                remaining: 0
            }
        );
        assert!(matches!(
            rx.recv_timeout(WAIT).unwrap(),
            DeviceMessage::TemplateEnrolling { face_id: 1, .. }
        ));
    }

    #[test]
    fn test_cancel_reports_canceled_and_drops_pending() {
        let (device, rx) = open(SimulatedSettings {
            latency_ms: 200,
            enrolled: vec![5],
            ..SimulatedSettings::default()
        });

        device.authenticate(1).unwrap();
        device.cancel().unwrap();

        assert_eq!(
            rx.recv_timeout(WAIT).unwrap(),
            DeviceMessage::Error {
                code: error_code::CANCELED
            }
        );
        assert!(rx.recv_timeout(Duration::from_millis(400)).is_err());
    }

    #[test]
    fn test_authenticate_match_and_miss() {
        let (device, rx) = open(SimulatedSettings {
            enrolled: vec![5],
            ..fast()
        });
        device.authenticate(42).unwrap();
        rx.recv_timeout(WAIT).unwrap();
        match rx.recv_timeout(WAIT).unwrap() {
            DeviceMessage::Authenticated { face_id, token } => {
                assert_eq!(face_id, 5);
                assert_eq!(token.challenge(), 42);
                assert_eq!(token.authenticator_type(), AUTHENTICATOR_TYPE_FACE);
            }
            other => panic!("unexpected message {:?}", other),
        }

        let (device, rx) = open(fast());
        device.authenticate(42).unwrap();
        rx.recv_timeout(WAIT).unwrap();
        assert!(matches!(
            rx.recv_timeout(WAIT).unwrap(),
            DeviceMessage::Authenticated { face_id: 0, .. }
        ));
    }

    #[test]
    fn test_lockout_after_failures() {
        let (device, rx) = open(fast());
        for _ in 0..MAX_FAILED_ATTEMPTS {
            device.authenticate(1).unwrap();
            rx.recv_timeout(WAIT).unwrap();
            rx.recv_timeout(WAIT).unwrap();
        }
        assert_eq!(
            rx.recv_timeout(WAIT).unwrap(),
            DeviceMessage::LockoutChanged {
                duration_millis: LOCKOUT_MILLIS
            }
        );

        let token = valid_token(&device);
        device.reset_lockout(&token).unwrap();
        assert_eq!(
            rx.recv_timeout(WAIT).unwrap(),
            DeviceMessage::LockoutChanged { duration_millis: 0 }
        );
    }

    #[test]
    fn test_remove_one_and_all() {
        let (device, rx) = open(SimulatedSettings {
            enrolled: vec![5, 6, 7],
            ..fast()
        });

        device.remove(FaceId(5)).unwrap();
        assert_eq!(
            rx.recv_timeout(WAIT).unwrap(),
            DeviceMessage::TemplateRemoved { face_id: 5 }
        );

        device.remove(FaceId(5)).unwrap();
        assert_eq!(
            rx.recv_timeout(WAIT).unwrap(),
            DeviceMessage::Error {
                code: error_code::UNABLE_TO_REMOVE
            }
        );

        device.remove(FaceId::NONE).unwrap();
        assert_eq!(
            rx.recv_timeout(WAIT).unwrap(),
            DeviceMessage::TemplateRemoved { face_id: 6 }
        );
        assert_eq!(
            rx.recv_timeout(WAIT).unwrap(),
            DeviceMessage::TemplateRemoved { face_id: 7 }
        );

        device.enumerate().unwrap();
        assert_eq!(
            rx.recv_timeout(WAIT).unwrap(),
            DeviceMessage::TemplateEnumerated { face_id: 0 }
        );
    }

    #[test]
    fn test_features_need_valid_token_and_face() {
        let (device, _rx) = open(SimulatedSettings {
            enrolled: vec![5],
            ..fast()
        });
        assert_eq!(
            device.set_feature(
                Feature::RequireDiversity,
                false,
                &HardwareAuthToken::zeroed(),
                FaceId(5)
            ),
            Err(status_code::ILLEGAL_ARGUMENT)
        );
        assert_eq!(
            device.get_feature(Feature::RequireDiversity, FaceId(5)),
            Ok(true)
        );
        assert_eq!(
            device.get_feature(Feature::RequireDiversity, FaceId::NONE),
            Err(status_code::ILLEGAL_ARGUMENT)
        );

        let token = valid_token(&device);
        device
            .set_feature(Feature::RequireDiversity, false, &token, FaceId(5))
            .unwrap();
        assert_eq!(
            device.get_feature(Feature::RequireDiversity, FaceId(5)),
            Ok(false)
        );
        assert_eq!(
            device.set_feature(Feature::RequireDiversity, true, &token, FaceId(6)),
            Err(status_code::ILLEGAL_ARGUMENT)
        );
    }

    #[test]
    fn test_enroll_applies_disabled_features() {
        let (device, rx) = open(fast());
        let token = valid_token(&device);

        device
            .enroll(&token, 3, &[Feature::RequireAttention])
            .unwrap();
        rx.recv_timeout(WAIT).unwrap();
        rx.recv_timeout(WAIT).unwrap();

        assert_eq!(
            device.get_feature(Feature::RequireAttention, FaceId(1)),
            Ok(false)
        );
        assert_eq!(
            device.get_feature(Feature::RequireDiversity, FaceId(1)),
            Ok(true)
        );
    }

    #[test]
    fn test_active_group_reports_lockout_state() {
        let (device, rx) = open(fast());
        assert_eq!(
            device.set_active_group(UserId(3), "data"),
            Err(status_code::ILLEGAL_ARGUMENT)
        );

        device.set_active_group(UserId(5), "/data/faces").unwrap();
        assert_eq!(
            rx.recv_timeout(WAIT).unwrap(),
            DeviceMessage::LockoutChanged { duration_millis: 0 }
        );
    }

    #[test]
    fn test_close_drops_pending_results() {
        let (device, rx) = open(SimulatedSettings {
            latency_ms: 100,
            ..SimulatedSettings::default()
        });
        device.enumerate().unwrap();
        device.close().unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
    }
}
