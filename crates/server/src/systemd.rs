//! Systemd readiness notifications
//!
//! Speaks the sd-notify datagram protocol when the service runs under a
//! `Type=notify` unit. Outside systemd every call is a no-op.

use anyhow::{Context, Result};
use std::env;
use std::os::unix::net::UnixDatagram;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info};

const NOTIFY_SOCKET: &str = "NOTIFY_SOCKET";
const WATCHDOG_USEC: &str = "WATCHDOG_USEC";

/// Whether the service was started by systemd with a notify socket
pub fn is_systemd() -> bool {
    env::var_os(NOTIFY_SOCKET).is_some()
}

/// Tell systemd the face service is ready for clients
pub fn notify_ready() -> Result<()> {
    notify("READY=1")
}

/// Tell systemd the face service is shutting down
pub fn notify_stopping() -> Result<()> {
    notify("STOPPING=1")
}

/// Status line shown by `systemctl status`
pub fn notify_status(status: &str) -> Result<()> {
    notify(&format!("STATUS={}", status))
}

fn notify(state: &str) -> Result<()> {
    match env::var_os(NOTIFY_SOCKET) {
        Some(socket_path) => send_state(Path::new(&socket_path), state),
        None => {
            debug!("{} not set, skipping '{}'", NOTIFY_SOCKET, state);
            Ok(())
        }
    }
}

/// Send one state datagram to the notify socket at `socket_path`
pub fn send_state(socket_path: &Path, state: &str) -> Result<()> {
    let socket = UnixDatagram::unbound().context("Failed to create Unix socket")?;
    socket
        .send_to(state.as_bytes(), socket_path)
        .with_context(|| format!("Failed to send '{}' to systemd", state))?;
    debug!("Notified systemd: {}", state);
    Ok(())
}

/// Keepalive period for a `WATCHDOG_USEC` value: half the timeout, at least
/// one second
pub fn watchdog_interval(watchdog_usec: &str) -> Option<Duration> {
    let usec: u64 = watchdog_usec.trim().parse().ok()?;
    if usec == 0 {
        return None;
    }
    Some(Duration::from_micros(usec / 2).max(Duration::from_secs(1)))
}

/// Send `WATCHDOG=1` periodically while the service runs
///
/// Returns None when the unit has no watchdog configured.
pub fn spawn_watchdog_task() -> Option<tokio::task::JoinHandle<()>> {
    let interval = env::var(WATCHDOG_USEC)
        .ok()
        .and_then(|value| watchdog_interval(&value))?;
    info!("Systemd watchdog enabled, keepalive every {:?}", interval);

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if let Err(e) = notify("WATCHDOG=1") {
                error!("Failed to send watchdog keepalive: {:#}", e);
            }
        }
    }))
}
