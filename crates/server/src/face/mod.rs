//! Face subsystem
//!
//! Adapts a blocking vendor face device to the asynchronous client contract.
//!
//! - `binding`: opens the device module and owns the handle
//! - `translate`: maps raw device codes onto client kinds
//! - `cancel`: the cancellation flag shared by callers and the dispatcher
//! - `session`: registered client, active user and the armed flag
//! - `dispatcher`: device notify callback forwarding events to the client
//! - `worker`: dedicated thread executing queued requests in order
//! - `service`: the client-facing [`FaceService`]
//! - `simulated`: in-process device module for hosts without face hardware

pub mod binding;
pub mod cancel;
pub mod dispatcher;
pub mod service;
pub mod session;
pub mod simulated;
pub mod translate;
pub mod worker;

pub use binding::{BindingError, DeviceBinding, locate_module};
pub use service::FaceService;
pub use simulated::{SimulatedDevice, SimulatedModule};
pub use worker::{FaceWorkerThread, spawn_face_worker};
