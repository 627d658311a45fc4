//! Face worker thread
//!
//! Dedicated thread that owns every long-running device call. Requests are
//! taken from the queue one at a time, in submission order, and each handler
//! runs to completion before the next request is looked at.

use crate::face::binding::DeviceBinding;
use crate::face::cancel::CancellationGuard;
use crate::face::dispatcher::Dispatcher;
use crate::face::session::Session;
use common::{FaceRequest, RequestWorker};
use protocol::{DeviceCode, DeviceMessage, FaceDevice, error_code};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// Face worker thread
pub struct FaceWorkerThread {
    worker: RequestWorker,
    binding: Arc<DeviceBinding>,
    session: Arc<Session>,
    guard: Arc<CancellationGuard>,
    dispatcher: Arc<Dispatcher>,
}

impl FaceWorkerThread {
    pub fn new(
        worker: RequestWorker,
        binding: Arc<DeviceBinding>,
        session: Arc<Session>,
        guard: Arc<CancellationGuard>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            worker,
            binding,
            session,
            guard,
            dispatcher,
        }
    }

    /// Drain the request queue until shutdown
    ///
    /// Stops on a `Shutdown` request or when every queue handle is gone.
    pub fn run(self) {
        info!("Face worker thread started");

        loop {
            match self.worker.recv_request() {
                Ok(FaceRequest::Shutdown) => {
                    info!("Face worker shutting down");
                    break;
                }
                Ok(request) => self.handle_request(request),
                Err(e) => {
                    info!("Face request queue closed: {}", e);
                    break;
                }
            }
        }

        info!("Face worker thread stopped");
    }

    /// Handle one request
    pub fn handle_request(&self, request: FaceRequest) {
        let kind = request.kind();
        // A panicking handler must not take the worker down with it
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.handle_request_inner(request)
        }));

        if let Err(e) = result {
            error!("Panic in face {} handler: {:?}", kind, e);
        }
    }

    fn handle_request_inner(&self, request: FaceRequest) {
        debug!("Running {} request", request.kind());

        match request {
            FaceRequest::Enroll {
                token,
                timeout_sec,
                disabled_features,
            } => {
                let Some(device) = self.device_for_cycle("enroll") else {
                    return;
                };
                debug!(
                    "Enrolling with challenge {:#x}, {} disabled features",
                    token.challenge(),
                    disabled_features.len()
                );
                self.session.arm();
                if let Err(code) = device.enroll(&token, timeout_sec, &disabled_features.to_vec()) {
                    self.cycle_failed("enroll", code);
                }
            }

            FaceRequest::Authenticate { operation_id } => {
                let Some(device) = self.device_for_cycle("authenticate") else {
                    return;
                };
                self.session.arm();
                if let Err(code) = device.authenticate(operation_id) {
                    self.cycle_failed("authenticate", code);
                }
            }

            FaceRequest::Enumerate => {
                if let Some(device) = self.device("enumerate") {
                    log_failure("enumerate", device.enumerate());
                }
            }

            FaceRequest::Remove { face_id } => {
                if let Some(device) = self.device("remove") {
                    log_failure("remove", device.remove(face_id));
                }
            }

            FaceRequest::Cancel => {
                if let Some(device) = self.device("cancel") {
                    log_failure("cancel", device.cancel());
                }
            }

            FaceRequest::EnrollContinue { addr, buffers } => {
                if self.guard.is_cancelled() {
                    debug!("Dropping enroll frame {:#x}, cycle cancelled", addr);
                    return;
                }
                if !self.session.is_armed() {
                    debug!("Enroll frame {:#x} ignored, algorithm not armed", addr);
                    self.dispatcher.deliver_enroll_processed(addr);
                    return;
                }
                if let Some(device) = self.device("enroll_continue") {
                    log_failure(
                        "do_enroll_process",
                        device.do_enroll_process(addr, &buffers.info, &buffers.byte_info),
                    );
                }
            }

            FaceRequest::AuthenticateContinue {
                main,
                sub,
                otp,
                buffers,
            } => {
                if self.guard.is_cancelled() {
                    debug!("Dropping auth frame {}/{}, cycle cancelled", main, sub);
                    return;
                }
                if !self.session.is_armed() {
                    debug!("Auth frame {}/{} ignored, algorithm not armed", main, sub);
                    self.dispatcher.deliver_auth_processed(main, sub);
                    return;
                }
                if let Some(device) = self.device("authenticate_continue") {
                    log_failure(
                        "do_authenticate_process",
                        device.do_authenticate_process(
                            main,
                            sub,
                            otp,
                            &buffers.info,
                            &buffers.byte_info,
                        ),
                    );
                }
            }

            FaceRequest::Shutdown => {
                // Handled in the run loop
            }
        }
    }

    fn device(&self, kind: &str) -> Option<Arc<dyn FaceDevice>> {
        let device = self.binding.device();
        if device.is_none() {
            warn!("Dropping {} request, face hardware unavailable", kind);
        }
        device
    }

    /// Device for an enroll or authenticate cycle; reports an error to the
    /// client when there is none
    fn device_for_cycle(&self, kind: &str) -> Option<Arc<dyn FaceDevice>> {
        let device = self.device(kind);
        if device.is_none() {
            self.dispatcher.dispatch(DeviceMessage::Error {
                code: error_code::HW_UNAVAILABLE,
            });
        }
        device
    }

    /// The device refused to start a cycle; end it as the device would
    fn cycle_failed(&self, kind: &str, code: DeviceCode) {
        error!("Face device {} failed: {}", kind, code);
        // The error below is suppressed if the cycle was cancelled meanwhile
        self.session.disarm();
        self.dispatcher.dispatch(DeviceMessage::Error {
            code: error_code::UNABLE_TO_PROCESS,
        });
    }
}

fn log_failure(kind: &str, result: Result<(), DeviceCode>) {
    if let Err(code) = result {
        error!("Face device {} failed: {}", kind, code);
    }
}

/// Spawn the face worker thread
pub fn spawn_face_worker(worker_thread: FaceWorkerThread) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("face-worker".to_string())
        .spawn(move || worker_thread.run())
        .expect("Failed to spawn face worker thread")
}
