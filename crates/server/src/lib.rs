//! Face HAL service library
//!
//! Exposes the face service core to the `face-hal-service` binary and to the
//! integration tests.

pub mod config;
pub mod face;
pub mod liveness;
pub mod systemd;

pub use face::FaceService;
