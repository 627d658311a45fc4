//! Face service
//!
//! Client-facing entry point. Long-running operations are validated and
//! copied on the calling thread, queued for the face worker and acknowledged
//! immediately; their outcome arrives later through the client callback.
//! Fast reads and configuration calls go straight to the device and report
//! their outcome synchronously.

use crate::face::binding::DeviceBinding;
use crate::face::cancel::CancellationGuard;
use crate::face::dispatcher::Dispatcher;
use crate::face::session::Session;
use crate::face::translate::{status_of, to_status};
use crate::face::worker::{FaceWorkerThread, spawn_face_worker};
use crate::liveness::{MemoryPropertyStore, PropertyStore, liveness_key};
use common::{ContinuationBuffers, FaceRequest, RequestQueue, create_request_queue};
use protocol::{
    ClientCallback, DeviceId, DeviceModule, DisabledFeatures, FaceDevice, FaceId, Feature,
    HardwareAuthToken, OptionalBool, OptionalU64, Status, UserId, validate_store_path,
};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use tracing::{debug, error, info};

/// Face authentication service
pub struct FaceService {
    queue: RequestQueue,
    binding: Arc<DeviceBinding>,
    session: Arc<Session>,
    guard: Arc<CancellationGuard>,
    liveness: Box<dyn PropertyStore>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl FaceService {
    /// Open `module` and start the face worker
    ///
    /// Liveness modes are kept in memory.
    pub fn open(module: Option<&dyn DeviceModule>) -> Self {
        Self::with_store(module, Box::new(MemoryPropertyStore::new()))
    }

    /// Open `module` and start the face worker, persisting liveness modes in
    /// `liveness`
    pub fn with_store(module: Option<&dyn DeviceModule>, liveness: Box<dyn PropertyStore>) -> Self {
        let session = Arc::new(Session::new());
        let guard = Arc::new(CancellationGuard::new());
        let dispatcher = Arc::new(Dispatcher::new(session.clone(), guard.clone()));

        let binding = Arc::new(DeviceBinding::open(module, dispatcher.notify_fn()));
        session.set_device_id(binding.device_id());

        let (queue, request_worker) = create_request_queue();
        let worker = spawn_face_worker(FaceWorkerThread::new(
            request_worker,
            binding.clone(),
            session.clone(),
            guard.clone(),
            dispatcher,
        ));

        info!(
            "Face service started (device {})",
            if binding.is_open() {
                "open"
            } else {
                "unavailable"
            }
        );

        Self {
            queue,
            binding,
            session,
            guard,
            liveness,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Identity reported to clients, `DeviceId(0)` when no device is open
    pub fn device_id(&self) -> DeviceId {
        self.binding.device_id()
    }

    /// Register the client callback, replacing any previous one
    pub fn set_callback(&self, callback: Option<Arc<dyn ClientCallback>>) -> OptionalU64 {
        debug!("set_callback");
        self.session.set_callback(callback);
        OptionalU64::new(Status::Ok, self.device_id().0)
    }

    /// Select the user whose templates later operations act on
    pub fn set_active_user(&self, user_id: UserId, store_path: &str) -> Status {
        debug!("set_active_user({})", user_id);
        if let Err(e) = validate_store_path(store_path) {
            error!("Bad store path: {}", e);
            return Status::InternalError;
        }
        let Some(device) = self.device("set_active_user") else {
            return Status::InternalError;
        };

        self.session.set_user_id(user_id);
        status_of(device.set_active_group(user_id, store_path))
    }

    /// Ask the device for an enrollment challenge
    pub fn generate_challenge(&self, timeout_sec: u32) -> OptionalU64 {
        debug!("generate_challenge(timeout_sec={})", timeout_sec);
        let Some(device) = self.device("generate_challenge") else {
            return OptionalU64::new(Status::InternalError, 0);
        };

        match device.pre_enroll(timeout_sec) {
            Ok(challenge) => OptionalU64::new(Status::Ok, challenge),
            Err(code) => OptionalU64::new(to_status(code), 0),
        }
    }

    /// Queue an enrollment
    ///
    /// Starts a new cycle: a cancellation left over from the previous one no
    /// longer applies.
    pub fn enroll(&self, hat: &[u8], timeout_sec: u32, disabled_features: &[Feature]) -> Status {
        debug!("enroll(timeout_sec={})", timeout_sec);
        let token = match HardwareAuthToken::from_slice(hat) {
            Ok(token) => token,
            Err(e) => {
                error!("Rejecting enroll: {}", e);
                return Status::IllegalArgument;
            }
        };
        let disabled_features = match DisabledFeatures::from_slice(disabled_features) {
            Ok(features) => features,
            Err(e) => {
                error!("Rejecting enroll: {}", e);
                return Status::IllegalArgument;
            }
        };

        self.guard.start_cycle(|| {
            self.submit(FaceRequest::Enroll {
                token,
                timeout_sec,
                disabled_features,
            })
        })
    }

    /// Revoke the enrollment challenge
    pub fn revoke_challenge(&self) -> Status {
        debug!("revoke_challenge");
        match self.device("revoke_challenge") {
            Some(device) => status_of(device.post_enroll()),
            None => Status::InternalError,
        }
    }

    pub fn set_feature(&self, feature: Feature, enabled: bool, hat: &[u8], face_id: FaceId) -> Status {
        debug!("set_feature({:?}, enabled={})", feature, enabled);
        let token = match HardwareAuthToken::from_slice(hat) {
            Ok(token) => token,
            Err(e) => {
                error!("Rejecting set_feature: {}", e);
                return Status::IllegalArgument;
            }
        };

        match self.device("set_feature") {
            Some(device) => status_of(device.set_feature(feature, enabled, &token, face_id)),
            None => Status::InternalError,
        }
    }

    /// Read a feature flag; the value is false whenever the status is not OK
    pub fn get_feature(&self, feature: Feature, face_id: FaceId) -> OptionalBool {
        debug!("get_feature({:?})", feature);
        let Some(device) = self.device("get_feature") else {
            return OptionalBool::new(Status::InternalError, false);
        };

        match device.get_feature(feature, face_id) {
            Ok(enabled) => OptionalBool::new(Status::Ok, enabled),
            Err(code) => OptionalBool::new(to_status(code), false),
        }
    }

    pub fn get_authenticator_id(&self) -> OptionalU64 {
        debug!("get_authenticator_id");
        let Some(device) = self.device("get_authenticator_id") else {
            return OptionalU64::new(Status::InternalError, 0);
        };

        match device.get_authenticator_id() {
            Ok(id) => OptionalU64::new(Status::Ok, id),
            Err(code) => OptionalU64::new(to_status(code), 0),
        }
    }

    /// Cancel the current cycle
    ///
    /// Results of the cancelled cycle are suppressed from now on; the device
    /// is told to stop once the worker reaches the request.
    pub fn cancel(&self) -> Status {
        debug!("cancel");
        self.guard.cancel(|| self.submit(FaceRequest::Cancel))
    }

    /// Queue template enumeration for the active user
    pub fn enumerate(&self) -> Status {
        debug!("enumerate");
        self.submit(FaceRequest::Enumerate)
    }

    /// Queue removal of `face_id`, or of every template for `FaceId::NONE`
    pub fn remove(&self, face_id: FaceId) -> Status {
        debug!("remove({})", face_id);
        self.submit(FaceRequest::Remove { face_id })
    }

    /// Queue an authentication bound to `operation_id`
    pub fn authenticate(&self, operation_id: u64) -> Status {
        debug!("authenticate(operation_id={})", operation_id);
        self.guard
            .start_cycle(|| self.submit(FaceRequest::Authenticate { operation_id }))
    }

    pub fn user_activity(&self) -> Status {
        debug!("user_activity");
        match self.device("user_activity") {
            Some(device) => status_of(device.user_activity()),
            None => Status::InternalError,
        }
    }

    pub fn reset_lockout(&self, hat: &[u8]) -> Status {
        debug!("reset_lockout");
        let token = match HardwareAuthToken::from_slice(hat) {
            Ok(token) => token,
            Err(e) => {
                error!("Rejecting reset_lockout: {}", e);
                return Status::IllegalArgument;
            }
        };

        match self.device("reset_lockout") {
            Some(device) => status_of(device.reset_lockout(&token)),
            None => Status::InternalError,
        }
    }

    /// Queue one enrollment frame; buffers are copied before returning
    pub fn do_enroll_process(&self, addr: i64, info: &[i32], byte_info: &[i8]) -> Status {
        debug!(
            "do_enroll_process(addr={:#x}, {} ints, {} bytes)",
            addr,
            info.len(),
            byte_info.len()
        );
        self.submit(FaceRequest::EnrollContinue {
            addr,
            buffers: ContinuationBuffers::copy_from(info, byte_info),
        })
    }

    /// Queue one authentication frame; buffers are copied before returning
    pub fn do_authenticate_process(
        &self,
        main: i64,
        sub: i64,
        otp: i64,
        info: &[i32],
        byte_info: &[i8],
    ) -> Status {
        debug!(
            "do_authenticate_process(main={}, sub={}, {} ints, {} bytes)",
            main,
            sub,
            info.len(),
            byte_info.len()
        );
        self.submit(FaceRequest::AuthenticateContinue {
            main,
            sub,
            otp,
            buffers: ContinuationBuffers::copy_from(info, byte_info),
        })
    }

    /// Persist the liveness mode of `user_id`
    ///
    /// A store failure is logged; the call still succeeds.
    pub fn update_liveness_mode(&self, value: i32, user_id: UserId) -> Status {
        debug!("update_liveness_mode({}, {})", value, user_id);
        if let Err(e) = self
            .liveness
            .set(&liveness_key(user_id), &value.to_string())
        {
            error!("Failed to update liveness mode: {}", e);
        }
        Status::Ok
    }

    /// Stop the worker after it drains queued requests, then close the device
    ///
    /// Later calls do nothing.
    pub fn shutdown(&self) {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(worker) = worker else {
            return;
        };

        info!("Shutting down face service");
        if let Err(e) = self.queue.submit(FaceRequest::Shutdown) {
            error!("Failed to stop face worker: {}", e);
        }
        if worker.join().is_err() {
            error!("Face worker thread panicked");
        }
        self.binding.close();
        self.session.set_device_id(DeviceId(0));
    }

    fn device(&self, operation: &str) -> Option<Arc<dyn FaceDevice>> {
        let device = self.binding.device();
        if device.is_none() {
            error!("{}: face hardware unavailable", operation);
        }
        device
    }

    fn submit(&self, request: FaceRequest) -> Status {
        match self.queue.submit(request) {
            Ok(()) => Status::Ok,
            Err(e) => {
                error!("{}", e);
                Status::InternalError
            }
        }
    }
}

impl Drop for FaceService {
    fn drop(&mut self) {
        self.shutdown();
    }
}
