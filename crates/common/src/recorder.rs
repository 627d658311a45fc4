//! Recording client callback
//!
//! [`RecordingCallback`] implements both client callback traits and stores
//! every event it receives, in arrival order. The service's self-test mode
//! prints them; the test suites assert on them.

use protocol::{
    CallbackError, CallbackResult, ClientCallback, DeviceId, ExtClientCallback, FaceAcquiredInfo,
    FaceError, FaceId, UserId,
};
use serde::Serialize;
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// One client callback invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    EnrollResult {
        device_id: DeviceId,
        face_id: FaceId,
        user_id: UserId,
        remaining: u32,
    },
    Authenticated {
        device_id: DeviceId,
        face_id: FaceId,
        user_id: UserId,
        token: Vec<u8>,
    },
    Acquired {
        device_id: DeviceId,
        user_id: UserId,
        info: FaceAcquiredInfo,
        vendor_code: i32,
    },
    Error {
        device_id: DeviceId,
        user_id: UserId,
        error: FaceError,
        vendor_code: i32,
    },
    Removed {
        device_id: DeviceId,
        removed: Vec<FaceId>,
        user_id: UserId,
    },
    Enumerate {
        device_id: DeviceId,
        faces: Vec<FaceId>,
        user_id: UserId,
    },
    LockoutChanged {
        duration_millis: u64,
    },
    EnrollProcessed {
        device_id: DeviceId,
        addr: i64,
    },
    AuthProcessed {
        device_id: DeviceId,
        main: i64,
        sub: i64,
    },
}

impl ClientEvent {
    /// Whether this event ends an enroll or authenticate cycle
    pub fn is_terminal(&self) -> bool {
        match self {
            ClientEvent::Error { .. } | ClientEvent::Authenticated { .. } => true,
            ClientEvent::EnrollResult { remaining, .. } => *remaining == 0,
            _ => false,
        }
    }
}

/// Client callback that records every event
pub struct RecordingCallback {
    events: Mutex<Vec<ClientEvent>>,
    arrived: Condvar,
    with_ext: bool,
    failure: Option<CallbackError>,
}

impl RecordingCallback {
    /// Recorder implementing the vendor extension interface
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            arrived: Condvar::new(),
            with_ext: true,
            failure: None,
        }
    }

    /// Recorder that only implements the base client interface
    pub fn without_ext() -> Self {
        Self {
            with_ext: false,
            ..Self::new()
        }
    }

    /// Recorder that records each event, then reports `error` to the caller
    pub fn failing(error: CallbackError) -> Self {
        Self {
            failure: Some(error),
            ..Self::new()
        }
    }

    /// Snapshot of the events received so far
    pub fn events(&self) -> Vec<ClientEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drain the events received so far
    pub fn take_events(&self) -> Vec<ClientEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Wait until at least `count` events have arrived
    ///
    /// Returns the events seen when the wait ended, which may be fewer than
    /// `count` if `timeout` expired.
    pub fn wait_for_events(&self, count: usize, timeout: Duration) -> Vec<ClientEvent> {
        self.wait_until(timeout, |events| events.len() >= count)
    }

    /// Wait until an event matching `predicate` has arrived
    pub fn wait_for(
        &self,
        timeout: Duration,
        predicate: impl Fn(&ClientEvent) -> bool,
    ) -> Option<ClientEvent> {
        self.wait_until(timeout, |events| events.iter().any(&predicate))
            .into_iter()
            .find(|event| predicate(event))
    }

    fn wait_until(
        &self,
        timeout: Duration,
        done: impl Fn(&[ClientEvent]) -> bool,
    ) -> Vec<ClientEvent> {
        let deadline = Instant::now() + timeout;
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);

        while !done(&events) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            events = self
                .arrived
                .wait_timeout(events, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }

        events.clone()
    }

    fn record(&self, event: ClientEvent) -> CallbackResult {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
        self.arrived.notify_all();

        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

impl Default for RecordingCallback {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientCallback for RecordingCallback {
    fn on_enroll_result(
        &self,
        device_id: DeviceId,
        face_id: FaceId,
        user_id: UserId,
        remaining: u32,
    ) -> CallbackResult {
        self.record(ClientEvent::EnrollResult {
            device_id,
            face_id,
            user_id,
            remaining,
        })
    }

    fn on_authenticated(
        &self,
        device_id: DeviceId,
        face_id: FaceId,
        user_id: UserId,
        token: &[u8],
    ) -> CallbackResult {
        self.record(ClientEvent::Authenticated {
            device_id,
            face_id,
            user_id,
            token: token.to_vec(),
        })
    }

    fn on_acquired(
        &self,
        device_id: DeviceId,
        user_id: UserId,
        acquired_info: FaceAcquiredInfo,
        vendor_code: i32,
    ) -> CallbackResult {
        self.record(ClientEvent::Acquired {
            device_id,
            user_id,
            info: acquired_info,
            vendor_code,
        })
    }

    fn on_error(
        &self,
        device_id: DeviceId,
        user_id: UserId,
        error: FaceError,
        vendor_code: i32,
    ) -> CallbackResult {
        self.record(ClientEvent::Error {
            device_id,
            user_id,
            error,
            vendor_code,
        })
    }

    fn on_removed(
        &self,
        device_id: DeviceId,
        removed: &[FaceId],
        user_id: UserId,
    ) -> CallbackResult {
        self.record(ClientEvent::Removed {
            device_id,
            removed: removed.to_vec(),
            user_id,
        })
    }

    fn on_enumerate(
        &self,
        device_id: DeviceId,
        faces: &[FaceId],
        user_id: UserId,
    ) -> CallbackResult {
        self.record(ClientEvent::Enumerate {
            device_id,
            faces: faces.to_vec(),
            user_id,
        })
    }

    fn on_lockout_changed(&self, duration_millis: u64) -> CallbackResult {
        self.record(ClientEvent::LockoutChanged { duration_millis })
    }

    fn as_ext(&self) -> Option<&dyn ExtClientCallback> {
        if self.with_ext { Some(self) } else { None }
    }
}

impl ExtClientCallback for RecordingCallback {
    fn on_enroll_processed(&self, device_id: DeviceId, addr: i64) -> CallbackResult {
        self.record(ClientEvent::EnrollProcessed { device_id, addr })
    }

    fn on_auth_processed(&self, device_id: DeviceId, main: i64, sub: i64) -> CallbackResult {
        self.record(ClientEvent::AuthProcessed {
            device_id,
            main,
            sub,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_records_in_order() {
        let recorder = RecordingCallback::new();
        recorder
            .on_acquired(DeviceId(1), UserId(0), FaceAcquiredInfo::Good, 0)
            .unwrap();
        recorder.on_lockout_changed(30_000).unwrap();

        let events = recorder.take_events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], ClientEvent::Acquired { .. }));
        assert_eq!(
            events[1],
            ClientEvent::LockoutChanged {
                duration_millis: 30_000
            }
        );
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn test_ext_interface_optional() {
        assert!(RecordingCallback::new().as_ext().is_some());
        assert!(RecordingCallback::without_ext().as_ext().is_none());
    }

    #[test]
    fn test_failing_recorder_still_records() {
        let recorder = RecordingCallback::failing(CallbackError::DeadObject);
        let result = recorder.on_error(DeviceId(1), UserId(0), FaceError::Canceled, 0);

        assert_eq!(result, Err(CallbackError::DeadObject));
        assert_eq!(recorder.events().len(), 1);
    }

    #[test]
    fn test_wait_across_threads() {
        let recorder = Arc::new(RecordingCallback::new());
        let producer = recorder.clone();

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            producer
                .on_removed(DeviceId(1), &[FaceId(5)], UserId(99))
                .unwrap();
        });

        let event = recorder.wait_for(Duration::from_secs(5), |e| {
            matches!(e, ClientEvent::Removed { .. })
        });
        handle.join().unwrap();

        assert_eq!(
            event,
            Some(ClientEvent::Removed {
                device_id: DeviceId(1),
                removed: vec![FaceId(5)],
                user_id: UserId(99),
            })
        );
    }

    #[test]
    fn test_wait_times_out() {
        let recorder = RecordingCallback::new();
        let events = recorder.wait_for_events(1, Duration::from_millis(10));
        assert!(events.is_empty());
    }

    #[test]
    fn test_terminal_events() {
        let done = ClientEvent::EnrollResult {
            device_id: DeviceId(1),
            face_id: FaceId(7),
            user_id: UserId(0),
            remaining: 0,
        };
        let progress = ClientEvent::EnrollResult {
            device_id: DeviceId(1),
            face_id: FaceId(0),
            user_id: UserId(0),
            remaining: 3,
        };
        assert!(done.is_terminal());
        assert!(!progress.is_terminal());
        assert!(!ClientEvent::LockoutChanged { duration_millis: 0 }.is_terminal());
    }

    #[test]
    fn test_event_json() {
        let event = ClientEvent::Error {
            device_id: DeviceId(3),
            user_id: UserId(0),
            error: FaceError::Canceled,
            vendor_code: 0,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"error\""));
        assert!(json.contains("Canceled"));
    }
}
