//! Notification dispatcher
//!
//! Installed as the device's only notify callback. Runs on whatever thread
//! the device uses, checks the cancellation guard, translates the event and
//! forwards it to the registered client.

use crate::face::cancel::CancellationGuard;
use crate::face::session::Session;
use crate::face::translate::{to_client_acquired_info, to_client_error};
use protocol::{
    CallbackResult, ClientCallback, DeviceId, DeviceMessage, ExtClientCallback, FaceError, FaceId,
    NotifyFn, error_code,
};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Forwards device notifications to the client
pub struct Dispatcher {
    session: Arc<Session>,
    guard: Arc<CancellationGuard>,
}

impl Dispatcher {
    pub fn new(session: Arc<Session>, guard: Arc<CancellationGuard>) -> Self {
        Self { session, guard }
    }

    /// Notify callback to install on the device
    pub fn notify_fn(self: &Arc<Self>) -> NotifyFn {
        let dispatcher = Arc::clone(self);
        Arc::new(move |message: DeviceMessage| dispatcher.dispatch(message))
    }

    /// Handle one device notification
    pub fn dispatch(&self, message: DeviceMessage) {
        let Some(client) = self.session.callback() else {
            error!(
                "Received {} notification before a client callback was registered",
                message.kind()
            );
            return;
        };

        let device_id = self.session.device_id();
        let user_id = self.session.user_id();

        match message {
            DeviceMessage::Error { code } => {
                debug!("on_error({})", code);
                if code != error_code::CANCELED && self.suppressed("error") {
                    return;
                }
                let (error, vendor_code) = to_client_error(code);
                self.session.disarm();
                report(
                    "on_error",
                    client.on_error(device_id, user_id, error, vendor_code),
                );
            }

            DeviceMessage::Acquired { code } => {
                debug!("on_acquired({})", code);
                let (info, vendor_code) = to_client_acquired_info(code);
                report(
                    "on_acquired",
                    client.on_acquired(device_id, user_id, info, vendor_code),
                );
            }

            DeviceMessage::TemplateEnrolling { face_id, remaining } => {
                debug!("on_enroll_result(fid={}, remaining={})", face_id, remaining);
                if self.suppressed("enrolling") {
                    return;
                }
                self.session.disarm();
                if face_id <= 0 {
                    report(
                        "on_error",
                        client.on_error(device_id, user_id, FaceError::Timeout, 0),
                    );
                } else {
                    report(
                        "on_enroll_result",
                        client.on_enroll_result(device_id, FaceId(face_id as u32), user_id, 0),
                    );
                }
            }

            DeviceMessage::Authenticated { face_id, token } => {
                debug!("on_authenticated(fid={})", face_id);
                if self.suppressed("authenticated") {
                    return;
                }
                self.session.disarm();
                let token: &[u8] = if face_id != 0 { token.as_bytes() } else { &[] };
                report(
                    "on_authenticated",
                    client.on_authenticated(device_id, FaceId(face_id), user_id, token),
                );
            }

            DeviceMessage::TemplateRemoved { face_id } => {
                debug!("on_removed(fid={})", face_id);
                report(
                    "on_removed",
                    client.on_removed(device_id, &[FaceId(face_id)], user_id),
                );
            }

            DeviceMessage::TemplateEnumerated { face_id } => {
                debug!("on_enumerate(fid={})", face_id);
                report(
                    "on_enumerate",
                    client.on_enumerate(device_id, &[FaceId(face_id)], user_id),
                );
            }

            DeviceMessage::LockoutChanged { duration_millis } => {
                debug!("on_lockout_changed(duration={}ms)", duration_millis);
                report(
                    "on_lockout_changed",
                    client.on_lockout_changed(duration_millis),
                );
            }

            DeviceMessage::EnrollProcessed { addr, remaining } => {
                debug!("on_enroll_processed(addr={}, remaining={})", addr, remaining);
                let Some(ext) = client.as_ext() else {
                    warn!("Client has no extension interface, dropping enroll progress");
                    return;
                };
                report(
                    "on_enroll_processed",
                    ext.on_enroll_processed(device_id, addr),
                );
                report(
                    "on_enroll_result",
                    ext.on_enroll_result(device_id, FaceId::NONE, user_id, remaining),
                );
            }

            DeviceMessage::AuthenticateProcessed { main, sub } => {
                debug!("on_auth_processed(main={}, sub={})", main, sub);
                let Some(ext) = client.as_ext() else {
                    warn!("Client has no extension interface, dropping auth progress");
                    return;
                };
                report(
                    "on_auth_processed",
                    ext.on_auth_processed(device_id, main, sub),
                );
            }

            DeviceMessage::Unknown { msg_type } => {
                error!("Invalid notification type from face device: {}", msg_type);
            }
        }
    }

    /// Report that the device consumed an enroll frame without processing it
    pub fn deliver_enroll_processed(&self, addr: i64) {
        self.with_ext("on_enroll_processed", |ext, device_id| {
            ext.on_enroll_processed(device_id, addr)
        });
    }

    /// Report that the device consumed an auth frame without processing it
    pub fn deliver_auth_processed(&self, main: i64, sub: i64) {
        self.with_ext("on_auth_processed", |ext, device_id| {
            ext.on_auth_processed(device_id, main, sub)
        });
    }

    fn with_ext(
        &self,
        method: &str,
        call: impl FnOnce(&dyn ExtClientCallback, DeviceId) -> CallbackResult,
    ) {
        let Some(client) = self.session.callback() else {
            error!("No client callback registered for {}", method);
            return;
        };
        match client.as_ext() {
            Some(ext) => report(method, call(ext, self.session.device_id())),
            None => warn!("Client has no extension interface, dropping {}", method),
        }
    }

    fn suppressed(&self, kind: &str) -> bool {
        let cancelled = self.guard.is_cancelled();
        if cancelled {
            debug!("Cycle cancelled, suppressing {} notification", kind);
        }
        cancelled
    }
}

fn report(method: &str, result: CallbackResult) {
    if let Err(e) = result {
        error!("Failed to invoke client {} callback: {}", method, e);
    }
}
