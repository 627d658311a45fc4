//! End-to-end scenarios for the face service
//!
//! Drives `FaceService` against a scripted device and checks the exact
//! sequence of client events.

use common::test_utils::{
    DEFAULT_TEST_TIMEOUT, DeviceCall, ScriptedDevice, ScriptedModule, zero_token,
};
use common::{ClientEvent, RecordingCallback, setup_test_logging};
use protocol::{
    AUTH_TOKEN_SIZE, CallbackError, DeviceId, DeviceMessage, FaceAcquiredInfo, FaceError, FaceId,
    HardwareAuthToken, Status, UserId, acquired_code, error_code,
};
use server::FaceService;
use server::liveness::{PropertyStore, TomlPropertyStore, liveness_key};
use std::sync::Arc;
use tempfile::TempDir;

struct Harness {
    service: FaceService,
    device: Arc<ScriptedDevice>,
    client: Arc<RecordingCallback>,
}

impl Harness {
    fn new() -> Self {
        Self::with_client(RecordingCallback::new())
    }

    fn with_client(client: RecordingCallback) -> Self {
        setup_test_logging();
        let device = Arc::new(ScriptedDevice::new());
        let service = FaceService::open(Some(&ScriptedModule::new(device.clone())));
        let client = Arc::new(client);
        service.set_callback(Some(client.clone()));
        Self {
            service,
            device,
            client,
        }
    }

    fn device_id(&self) -> DeviceId {
        self.service.device_id()
    }

    /// Queue an enumerate and wait for the worker to reach it, so every
    /// request queued earlier has been handled
    fn drain(&self) {
        let seen = self.device.count("enumerate");
        assert_eq!(self.service.enumerate(), Status::Ok);
        assert!(
            self.device
                .wait_for_call("enumerate", seen + 1, DEFAULT_TEST_TIMEOUT)
        );
    }
}

fn auth_token(operation_id: u64) -> HardwareAuthToken {
    HardwareAuthToken::from_fields(operation_id, 99, 0xa117_0001, 4, 12_345)
}

#[test]
fn enroll_reports_new_face() {
    let h = Harness::new();
    h.device.respond_with(|call| match call {
        DeviceCall::Enroll { .. } => vec![DeviceMessage::TemplateEnrolling {
            face_id: 7,
            remaining: 0,
        }],
        _ => Vec::new(),
    });

    assert_eq!(h.service.set_active_user(UserId(99), "/data/face"), Status::Ok);
    assert_eq!(h.service.enroll(&zero_token(), 3, &[]), Status::Ok);

    let events = h.client.wait_for_events(1, DEFAULT_TEST_TIMEOUT);
    assert_eq!(
        events,
        vec![ClientEvent::EnrollResult {
            device_id: h.device_id(),
            face_id: FaceId(7),
            user_id: UserId(99),
            remaining: 0,
        }]
    );
}

#[test]
fn enroll_then_cancel_reports_only_canceled() {
    let h = Harness::new();
    h.device.respond_with(|call| match call {
        DeviceCall::Cancel => vec![DeviceMessage::Error {
            code: error_code::CANCELED,
        }],
        _ => Vec::new(),
    });

    assert_eq!(h.service.enroll(&zero_token(), 3, &[]), Status::Ok);
    assert_eq!(h.service.cancel(), Status::Ok);
    h.client.wait_for_events(1, DEFAULT_TEST_TIMEOUT);

    // Late results of the cancelled cycle
    assert!(h.device.emit(DeviceMessage::TemplateEnrolling {
        face_id: 7,
        remaining: 0,
    }));
    assert!(h.device.emit(DeviceMessage::Error {
        code: error_code::UNABLE_TO_PROCESS,
    }));
    assert!(h.device.emit(DeviceMessage::Authenticated {
        face_id: 3,
        token: auth_token(1),
    }));

    assert_eq!(
        h.client.events(),
        vec![ClientEvent::Error {
            device_id: h.device_id(),
            user_id: UserId::UNSET,
            error: FaceError::Canceled,
            vendor_code: 0,
        }]
    );
}

#[test]
fn acquired_delivered_after_cancel() {
    let h = Harness::new();

    h.service.enroll(&zero_token(), 3, &[]);
    h.service.cancel();
    h.drain();

    assert!(h.device.emit(DeviceMessage::Acquired {
        code: acquired_code::TOO_DARK,
    }));
    assert!(matches!(
        h.client.events().as_slice(),
        [ClientEvent::Acquired {
            info: FaceAcquiredInfo::TooDark,
            vendor_code: 0,
            ..
        }]
    ));
}

#[test]
fn new_cycle_clears_cancellation() {
    let h = Harness::new();
    h.device.respond_with(|call| match call {
        DeviceCall::Authenticate { operation_id } => vec![DeviceMessage::Authenticated {
            face_id: 3,
            token: auth_token(*operation_id),
        }],
        _ => Vec::new(),
    });

    h.service.cancel();
    assert_eq!(h.service.authenticate(5), Status::Ok);

    let result = h.client.wait_for(DEFAULT_TEST_TIMEOUT, ClientEvent::is_terminal);
    match result {
        Some(ClientEvent::Authenticated { face_id, token, .. }) => {
            assert_eq!(face_id, FaceId(3));
            assert_eq!(token.len(), AUTH_TOKEN_SIZE);
            assert_eq!(token, auth_token(5).as_bytes());
        }
        other => panic!("Expected authentication result, got {:?}", other),
    }
}

#[test]
fn authenticate_without_match_sends_empty_token() {
    let h = Harness::new();
    h.device.respond_with(|call| match call {
        DeviceCall::Authenticate { .. } => vec![DeviceMessage::Authenticated {
            face_id: 0,
            token: auth_token(9),
        }],
        _ => Vec::new(),
    });

    h.service.authenticate(9);

    let events = h.client.wait_for_events(1, DEFAULT_TEST_TIMEOUT);
    assert_eq!(
        events,
        vec![ClientEvent::Authenticated {
            device_id: h.device_id(),
            face_id: FaceId(0),
            user_id: UserId::UNSET,
            token: Vec::new(),
        }]
    );
}

#[test]
fn enroll_timeout_and_token_failure() {
    let h = Harness::new();

    h.device.emit(DeviceMessage::TemplateEnrolling {
        face_id: 0,
        remaining: 0,
    });
    h.device.emit(DeviceMessage::Error {
        code: error_code::VERIFY_TOKEN_FAIL,
    });

    assert_eq!(
        h.client.events(),
        vec![
            ClientEvent::Error {
                device_id: h.device_id(),
                user_id: UserId::UNSET,
                error: FaceError::Timeout,
                vendor_code: 0,
            },
            ClientEvent::Error {
                device_id: h.device_id(),
                user_id: UserId::UNSET,
                error: FaceError::UnableToProcess,
                vendor_code: 1,
            },
        ]
    );
}

#[test]
fn remove_reports_single_face() {
    let h = Harness::new();
    h.device.respond_with(|call| match call {
        DeviceCall::Remove { face_id } => vec![DeviceMessage::TemplateRemoved {
            face_id: face_id.0,
        }],
        _ => Vec::new(),
    });

    assert_eq!(h.service.remove(FaceId(5)), Status::Ok);

    let events = h.client.wait_for_events(1, DEFAULT_TEST_TIMEOUT);
    assert_eq!(
        events,
        vec![ClientEvent::Removed {
            device_id: h.device_id(),
            removed: vec![FaceId(5)],
            user_id: UserId::UNSET,
        }]
    );
}

#[test]
fn remove_all_passes_wildcard_through() {
    let h = Harness::new();

    h.service.remove(FaceId::NONE);
    h.drain();

    assert_eq!(
        h.device.operations(),
        vec![
            DeviceCall::Remove {
                face_id: FaceId::NONE
            },
            DeviceCall::Enumerate,
        ]
    );
}

#[test]
fn enumerate_reports_one_face_per_event() {
    let h = Harness::new();
    h.device.respond_with(|call| match call {
        DeviceCall::Enumerate => vec![
            DeviceMessage::TemplateEnumerated { face_id: 1 },
            DeviceMessage::TemplateEnumerated { face_id: 2 },
        ],
        _ => Vec::new(),
    });

    h.service.enumerate();

    let events = h.client.wait_for_events(2, DEFAULT_TEST_TIMEOUT);
    let faces: Vec<Vec<FaceId>> = events
        .into_iter()
        .filter_map(|event| match event {
            ClientEvent::Enumerate { faces, .. } => Some(faces),
            _ => None,
        })
        .collect();
    assert_eq!(faces, vec![vec![FaceId(1)], vec![FaceId(2)]]);
}

#[test]
fn lockout_change_forwarded() {
    let h = Harness::new();
    h.device.emit(DeviceMessage::LockoutChanged {
        duration_millis: 30_000,
    });
    assert_eq!(
        h.client.events(),
        vec![ClientEvent::LockoutChanged {
            duration_millis: 30_000
        }]
    );
}

#[test]
fn disarmed_continuation_yields_one_synthetic_processed() {
    let h = Harness::new();

    assert_eq!(h.service.do_enroll_process(0x1234, &[1, 2], &[3]), Status::Ok);
    assert_eq!(
        h.service.do_authenticate_process(4, 5, 6, &[], &[]),
        Status::Ok
    );
    h.drain();

    assert_eq!(h.device.count("do_enroll_process"), 0);
    assert_eq!(h.device.count("do_authenticate_process"), 0);
    assert_eq!(
        h.client.events(),
        vec![
            ClientEvent::EnrollProcessed {
                device_id: h.device_id(),
                addr: 0x1234,
            },
            ClientEvent::AuthProcessed {
                device_id: h.device_id(),
                main: 4,
                sub: 5,
            },
        ]
    );
}

#[test]
fn armed_continuation_reports_progress() {
    let h = Harness::new();
    h.device.respond_with(|call| match call {
        DeviceCall::EnrollProcess { addr, .. } => vec![DeviceMessage::EnrollProcessed {
            addr: *addr,
            remaining: 2,
        }],
        _ => Vec::new(),
    });

    h.service.enroll(&zero_token(), 3, &[]);
    h.service.do_enroll_process(0x10, &[7; 4], &[-1; 8]);

    let events = h.client.wait_for_events(2, DEFAULT_TEST_TIMEOUT);
    assert_eq!(
        events,
        vec![
            ClientEvent::EnrollProcessed {
                device_id: h.device_id(),
                addr: 0x10,
            },
            ClientEvent::EnrollResult {
                device_id: h.device_id(),
                face_id: FaceId::NONE,
                user_id: UserId::UNSET,
                remaining: 2,
            },
        ]
    );
    assert!(h.device.calls().contains(&DeviceCall::EnrollProcess {
        addr: 0x10,
        info: vec![7; 4],
        byte_info: vec![-1; 8],
    }));
}

#[test]
fn cancelled_continuation_dropped_silently() {
    let h = Harness::new();

    h.service.authenticate(1);
    h.service.cancel();
    h.service.do_authenticate_process(1, 2, 3, &[1], &[1]);
    h.service.do_enroll_process(9, &[], &[]);
    h.drain();

    assert_eq!(h.device.count("do_authenticate_process"), 0);
    assert_eq!(h.device.count("do_enroll_process"), 0);
    assert!(h.client.events().is_empty());
}

#[test]
fn client_without_extension_misses_progress_only() {
    let h = Harness::with_client(RecordingCallback::without_ext());

    h.service.do_enroll_process(1, &[], &[]);
    h.drain();
    h.device.emit(DeviceMessage::Error {
        code: error_code::LOCKOUT,
    });

    assert!(matches!(
        h.client.events().as_slice(),
        [ClientEvent::Error {
            error: FaceError::Lockout,
            ..
        }]
    ));
}

#[test]
fn failing_client_does_not_stop_delivery() {
    let h = Harness::with_client(RecordingCallback::failing(CallbackError::DeadObject));
    h.device.respond_with(|call| match call {
        DeviceCall::Enumerate => vec![
            DeviceMessage::TemplateEnumerated { face_id: 1 },
            DeviceMessage::TemplateEnumerated { face_id: 2 },
        ],
        _ => Vec::new(),
    });

    h.service.enumerate();
    h.service.enumerate();

    assert_eq!(h.client.wait_for_events(4, DEFAULT_TEST_TIMEOUT).len(), 4);
}

#[test]
fn missing_device_reports_hardware_unavailable() {
    setup_test_logging();
    let service = FaceService::open(Some(&ScriptedModule::missing()));
    let client = Arc::new(RecordingCallback::new());

    let registered = service.set_callback(Some(client.clone()));
    assert_eq!(registered.status, Status::Ok);
    assert_eq!(registered.value, 0);

    assert_eq!(service.revoke_challenge(), Status::InternalError);
    assert_eq!(service.get_authenticator_id().status, Status::InternalError);
    assert_eq!(service.enroll(&zero_token(), 3, &[]), Status::Ok);

    let events = client.wait_for_events(1, DEFAULT_TEST_TIMEOUT);
    assert_eq!(
        events,
        vec![ClientEvent::Error {
            device_id: DeviceId(0),
            user_id: UserId::UNSET,
            error: FaceError::HwUnavailable,
            vendor_code: 0,
        }]
    );
}

#[test]
fn refused_device_behaves_like_missing() {
    let service = FaceService::open(Some(&ScriptedModule::refusing(-19)));
    assert_eq!(service.device_id(), DeviceId(0));
    assert_eq!(service.user_activity(), Status::InternalError);
}

#[test]
fn liveness_mode_persisted_to_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("liveness.toml");
    let device = Arc::new(ScriptedDevice::new());
    let service = FaceService::with_store(
        Some(&ScriptedModule::new(device)),
        Box::new(TomlPropertyStore::new(&path)),
    );

    assert_eq!(service.update_liveness_mode(1, UserId(0)), Status::Ok);
    assert_eq!(service.update_liveness_mode(3, UserId(10)), Status::Ok);

    let store = TomlPropertyStore::new(&path);
    assert_eq!(
        store.get(&liveness_key(UserId(0))).unwrap(),
        Some("1".to_string())
    );
    assert_eq!(
        store.get(&liveness_key(UserId(10))).unwrap(),
        Some("3".to_string())
    );
}

#[test]
fn liveness_store_failure_still_ok() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "not a directory").unwrap();

    let service = FaceService::with_store(
        None,
        Box::new(TomlPropertyStore::new(blocker.join("liveness.toml"))),
    );

    assert_eq!(service.update_liveness_mode(1, UserId(0)), Status::Ok);
}
