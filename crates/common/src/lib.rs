//! Common utilities for the face HAL service
//!
//! This crate provides shared functionality between the service and its
//! tests: the request queue bridging client calls to the face worker thread,
//! error handling, logging setup, a recording client callback and scripted
//! test devices.

pub mod channel;
pub mod error;
pub mod logging;
pub mod recorder;
pub mod test_utils;

pub use channel::{
    ContinuationBuffers, FaceRequest, RequestQueue, RequestWorker, create_request_queue,
};
pub use error::{Error, Result};
pub use logging::{setup_logging, setup_test_logging};
pub use recorder::{ClientEvent, RecordingCallback};
