//! Session state shared by the service, the worker and the dispatcher

use protocol::{ClientCallback, DeviceId, UserId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Registered client, active user and cycle state
pub struct Session {
    callback: Mutex<Option<Arc<dyn ClientCallback>>>,
    user_id: Mutex<UserId>,
    /// True while an enroll or authenticate cycle is running on the device
    armed: Mutex<bool>,
    device_id: AtomicU64,
}

impl Session {
    pub fn new() -> Self {
        Self {
            callback: Mutex::new(None),
            user_id: Mutex::new(UserId::UNSET),
            armed: Mutex::new(false),
            device_id: AtomicU64::new(0),
        }
    }

    /// Replace the registered client callback
    pub fn set_callback(&self, callback: Option<Arc<dyn ClientCallback>>) {
        match &callback {
            Some(client) => debug!(
                "Client callback registered (extension interface: {})",
                client.as_ext().is_some()
            ),
            None => debug!("Client callback cleared"),
        }
        *self.callback.lock().unwrap_or_else(PoisonError::into_inner) = callback;
    }

    /// Currently registered client callback
    ///
    /// The slot lock is released before this returns, so callers may invoke
    /// the client without holding it.
    pub fn callback(&self) -> Option<Arc<dyn ClientCallback>> {
        self.callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_user_id(&self, user_id: UserId) {
        *self.user_id.lock().unwrap_or_else(PoisonError::into_inner) = user_id;
    }

    pub fn user_id(&self) -> UserId {
        *self.user_id.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn arm(&self) {
        *self.armed.lock().unwrap_or_else(PoisonError::into_inner) = true;
    }

    pub fn disarm(&self) {
        *self.armed.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }

    pub fn is_armed(&self) -> bool {
        *self.armed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_device_id(&self, device_id: DeviceId) {
        self.device_id.store(device_id.0, Ordering::Release);
    }

    /// Identity of the open device, `DeviceId(0)` when there is none
    pub fn device_id(&self) -> DeviceId {
        DeviceId(self.device_id.load(Ordering::Acquire))
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::RecordingCallback;

    #[test]
    fn test_defaults() {
        let session = Session::new();
        assert!(session.callback().is_none());
        assert_eq!(session.user_id(), UserId::UNSET);
        assert!(!session.is_armed());
        assert_eq!(session.device_id(), DeviceId(0));
    }

    #[test]
    fn test_replace_callback() {
        let session = Session::new();
        let first = Arc::new(RecordingCallback::new());
        let second = Arc::new(RecordingCallback::new());

        session.set_callback(Some(first.clone()));
        session.set_callback(Some(second.clone()));

        let current = session.callback().unwrap();
        current.on_lockout_changed(0).unwrap();
        assert!(first.events().is_empty());
        assert_eq!(second.events().len(), 1);

        session.set_callback(None);
        assert!(session.callback().is_none());
    }

    #[test]
    fn test_armed_flag() {
        let session = Session::new();
        session.arm();
        assert!(session.is_armed());
        session.disarm();
        assert!(!session.is_armed());
    }
}
