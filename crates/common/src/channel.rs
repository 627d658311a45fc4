//! Request queue between client-facing calls and the face worker thread
//!
//! Client calls validate and copy their parameters on the calling thread,
//! wrap them in a [`FaceRequest`] and push it onto an unbounded FIFO queue.
//! A single worker thread drains the queue and performs the blocking device
//! call. Enqueueing never blocks and never reorders.

use async_channel::{Receiver, Sender, TryRecvError, unbounded};
use protocol::{DisabledFeatures, FaceId, HardwareAuthToken};
use std::sync::Arc;

/// Raw buffers attached to a vendor continuation request
///
/// Owned by the request; released when the worker is done with it, whether or
/// not the device was called.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContinuationBuffers {
    /// Integer frame metadata
    pub info: Arc<[i32]>,
    /// Raw frame bytes
    pub byte_info: Arc<[i8]>,
}

impl ContinuationBuffers {
    /// Copy client buffers into request-owned storage
    pub fn copy_from(info: &[i32], byte_info: &[i8]) -> Self {
        Self {
            info: Arc::from(info),
            byte_info: Arc::from(byte_info),
        }
    }
}

/// Operations executed on the face worker thread
#[derive(Debug)]
pub enum FaceRequest {
    /// Start an enrollment cycle
    Enroll {
        /// Auth token copied verbatim from the client
        token: HardwareAuthToken,
        /// Forwarded to the device, not enforced locally
        timeout_sec: u32,
        /// Features to disable for this enrollment
        disabled_features: DisabledFeatures,
    },

    /// Start an authentication cycle
    Authenticate {
        /// Operation id bound into the resulting auth token
        operation_id: u64,
    },

    /// Enumerate templates of the active user
    Enumerate,

    /// Remove one template, or all of them for `FaceId::NONE`
    Remove {
        face_id: FaceId,
    },

    /// Ask the device to stop the current cycle
    Cancel,

    /// Vendor extension: feed an enrollment frame
    EnrollContinue {
        /// Correlation address echoed back in `on_enroll_processed`
        addr: i64,
        buffers: ContinuationBuffers,
    },

    /// Vendor extension: feed an authentication frame
    AuthenticateContinue {
        /// Correlation values echoed back in `on_auth_processed`
        main: i64,
        sub: i64,
        otp: i64,
        buffers: ContinuationBuffers,
    },

    /// Stop the worker after draining earlier requests
    Shutdown,
}

impl FaceRequest {
    /// Short tag used in log lines
    pub fn kind(&self) -> &'static str {
        match self {
            FaceRequest::Enroll { .. } => "enroll",
            FaceRequest::Authenticate { .. } => "authenticate",
            FaceRequest::Enumerate => "enumerate",
            FaceRequest::Remove { .. } => "remove",
            FaceRequest::Cancel => "cancel",
            FaceRequest::EnrollContinue { .. } => "enroll_continue",
            FaceRequest::AuthenticateContinue { .. } => "authenticate_continue",
            FaceRequest::Shutdown => "shutdown",
        }
    }
}

/// Producer side, cloned into every client-facing call path
#[derive(Clone)]
pub struct RequestQueue {
    request_tx: Sender<FaceRequest>,
}

impl RequestQueue {
    /// Enqueue a request without blocking
    pub fn submit(&self, request: FaceRequest) -> crate::Result<()> {
        // Unbounded, so the only failure is a closed queue
        self.request_tx.try_send(request).map_err(|e| {
            crate::Error::Channel(format!(
                "{} request not queued: worker stopped",
                e.into_inner().kind()
            ))
        })
    }

    /// Number of requests waiting for the worker
    pub fn pending(&self) -> usize {
        self.request_tx.len()
    }

    /// Whether the worker side has gone away
    pub fn is_closed(&self) -> bool {
        self.request_tx.is_closed()
    }
}

/// Consumer side, owned by the face worker thread
pub struct RequestWorker {
    request_rx: Receiver<FaceRequest>,
}

impl RequestWorker {
    /// Wait for the next request (blocking)
    pub fn recv_request(&self) -> crate::Result<FaceRequest> {
        self.request_rx
            .recv_blocking()
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Take the next request if one is waiting
    pub fn try_recv_request(&self) -> Option<FaceRequest> {
        match self.request_rx.try_recv() {
            Ok(request) => Some(request),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => None,
        }
    }
}

/// Create the request queue
///
/// Returns (RequestQueue for callers, RequestWorker for the worker thread).
/// The queue is unbounded so a caller never waits on device latency.
pub fn create_request_queue() -> (RequestQueue, RequestWorker) {
    let (request_tx, request_rx) = unbounded();

    (RequestQueue { request_tx }, RequestWorker { request_rx })
}
