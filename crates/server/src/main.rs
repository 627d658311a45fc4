//! face-hal service
//!
//! Hosts the face service on top of the configured face module. Runs until
//! Ctrl+C, or performs one enroll/authenticate/enumerate round with
//! `--self-test` and prints the client events it produced.

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use common::{ClientEvent, RecordingCallback, setup_logging};
use protocol::{FaceAcquiredInfo, HardwareAuthToken, Status, UserId};
use server::config::ServiceConfig;
use server::face::{FaceService, locate_module};
use server::liveness::{MemoryPropertyStore, PropertyStore, TomlPropertyStore};
use server::systemd;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};

/// User the self-test enrolls for
const SELF_TEST_USER: UserId = UserId(0);

const CHALLENGE_TIMEOUT_SEC: u32 = 60;
const ENROLL_TIMEOUT_SEC: u32 = 30;

/// How long the self-test waits for each result
const RESULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "face-hal-service")]
#[command(author, version, about = "Face HAL service - face authentication for the system")]
#[command(long_about = "
Face authentication service adapting a vendor face module to the face client
interface. Device results are reported to the registered client asynchronously.

EXAMPLES:
    # Run with default config
    face-hal-service

    # Run with custom config
    face-hal-service --config /path/to/service.toml

    # Enroll, authenticate and enumerate once, then exit
    face-hal-service --self-test

    # Run with debug logging
    face-hal-service --log-level debug

CONFIGURATION:
    The service looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/face-hal/service.toml
    3. /etc/face-hal/service.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Run one enroll/authenticate/enumerate round and exit
    #[arg(long)]
    self_test: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = ServiceConfig::default();
        let path = ServiceConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = if let Some(ref path) = args.config {
        ServiceConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        ServiceConfig::load_or_default()
    };

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.service.log_level);

    setup_logging(log_level).context("Failed to setup logging")?;

    info!("face-hal service v{}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", log_level);

    let module = locate_module(&config.device);
    let liveness: Box<dyn PropertyStore> = match config.liveness.store_path() {
        Some(path) => {
            info!("Liveness modes stored in {}", path.display());
            Box::new(TomlPropertyStore::new(path))
        }
        None => Box::new(MemoryPropertyStore::new()),
    };
    let service = Arc::new(FaceService::with_store(module.as_deref(), liveness));

    let result = if args.self_test {
        let task_service = service.clone();
        let store_path = config.service.store_path.clone();
        let enroll_frames = config.device.simulated.enroll_frames;
        tokio::task::spawn_blocking(move || {
            run_self_test(&task_service, &store_path, enroll_frames)
        })
        .await
        .context("Self-test task failed")?
    } else {
        run_service(&service).await
    };

    info!("Shutting down face service...");
    service.shutdown();

    result
}

/// Serve clients until Ctrl+C
async fn run_service(service: &FaceService) -> Result<()> {
    if service.device_id().0 == 0 {
        error!("No face device available, every request will report hardware unavailable");
    }

    if systemd::is_systemd() {
        info!("Running under systemd");
    }
    let watchdog = systemd::spawn_watchdog_task();
    systemd::notify_ready().context("Failed to notify systemd ready")?;
    systemd::notify_status(&format!("Serving face device {:#x}", service.device_id().0))
        .context("Failed to send status to systemd")?;

    info!("Press Ctrl+C to shutdown");

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down gracefully..."),
        Err(e) => error!("Error waiting for Ctrl+C: {}", e),
    }

    systemd::notify_stopping().context("Failed to notify systemd stopping")?;
    if let Some(watchdog) = watchdog {
        watchdog.abort();
    }

    Ok(())
}

/// Enroll, authenticate and enumerate once, printing every client event
fn run_self_test(service: &FaceService, store_path: &str, enroll_frames: u32) -> Result<()> {
    let recorder = Arc::new(RecordingCallback::new());
    let device_id = service.set_callback(Some(recorder.clone())).value;
    info!("Self-test against device {:#x}", device_id);

    check("set_active_user", service.set_active_user(SELF_TEST_USER, store_path))?;

    let challenge = service.generate_challenge(CHALLENGE_TIMEOUT_SEC);
    check("generate_challenge", challenge.status)?;
    let token = HardwareAuthToken::from_fields(challenge.value, SELF_TEST_USER.0 as u64, 0, 1, 0);

    check(
        "enroll",
        service.enroll(token.as_bytes(), ENROLL_TIMEOUT_SEC, &[]),
    )?;
    if enroll_frames > 0 {
        wait_for(&recorder, "enroll start", |event| {
            matches!(
                event,
                ClientEvent::Acquired {
                    info: FaceAcquiredInfo::Start,
                    ..
                }
            ) || event.is_terminal()
        })?;
        for frame in 0..enroll_frames {
            check(
                "do_enroll_process",
                service.do_enroll_process(i64::from(frame), &[], &[]),
            )?;
        }
    }
    wait_for(&recorder, "enroll result", ClientEvent::is_terminal)?;
    print_events(recorder.take_events())?;

    check("revoke_challenge", service.revoke_challenge())?;

    check("authenticate", service.authenticate(1))?;
    wait_for(&recorder, "authentication result", ClientEvent::is_terminal)?;
    print_events(recorder.take_events())?;

    check("enumerate", service.enumerate())?;
    wait_for(&recorder, "enumeration", |event| {
        matches!(event, ClientEvent::Enumerate { .. })
    })?;
    // Enumeration reports one event per template; let the rest arrive
    std::thread::sleep(Duration::from_millis(200));
    print_events(recorder.take_events())?;

    info!("Self-test complete");
    Ok(())
}

fn check(operation: &str, status: Status) -> Result<()> {
    if status.is_ok() {
        Ok(())
    } else {
        bail!("{} returned {:?}", operation, status)
    }
}

fn wait_for(
    recorder: &RecordingCallback,
    what: &str,
    predicate: impl Fn(&ClientEvent) -> bool,
) -> Result<ClientEvent> {
    recorder
        .wait_for(RESULT_TIMEOUT, predicate)
        .ok_or_else(|| anyhow!("Timed out waiting for {}", what))
}

fn print_events(events: Vec<ClientEvent>) -> Result<()> {
    for event in events {
        println!(
            "{}",
            serde_json::to_string(&event).context("Failed to serialize client event")?
        );
    }
    Ok(())
}
