//! Session lifecycle tests against the in-process mock resource manager.
//!
//! Each test builds its own `MockPool` so call counters on the mock devices can be
//! asserted after teardown.

#![cfg(feature = "mock")]

use bytes::Bytes;
use futures::FutureExt;
use hil_driver_mock::{ErrorConfig, ErrorScenario, MockBackendFactory, MockDevice, MockPool};
use rust_hil::{
    BackendRegistry, ConnectorPrimitive, DeviceHandle, DeviceSession, ErrorKind, HilError,
    SerialParameters, SessionConfig, SessionState,
};
use std::io::Write;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing_test::traced_test;

fn registry_with(pool: &Arc<MockPool>) -> Arc<BackendRegistry> {
    let registry = BackendRegistry::new();
    registry.register_factory(Box::new(MockBackendFactory::with_pool(pool.clone())));
    Arc::new(registry)
}

fn one_board(device: MockDevice) -> Arc<MockPool> {
    Arc::new(MockPool::new(vec![device]))
}

fn mock_config() -> SessionConfig {
    SessionConfig::for_backend("mock").with_platform("K64F")
}

fn firmware_image() -> tempfile::NamedTempFile {
    let mut image = tempfile::NamedTempFile::new().unwrap();
    image.write_all(&[0x7f, b'E', b'L', b'F']).unwrap();
    image
}

// =============================================================================
// Unresolvable backend
// =============================================================================

#[tokio::test]
async fn unknown_backend_leaves_session_inert() {
    let pool = Arc::new(MockPool::default());
    let mut session = DeviceSession::new(
        SessionConfig::for_backend("nonexistent"),
        registry_with(&pool),
    );

    assert!(!session.establish().await);
    assert!(!session.connected());
    assert_eq!(session.state(), SessionState::Uninitialized);

    let record = session.error().expect("failure is recorded");
    assert_eq!(record.kind, ErrorKind::BackendUnavailable);
    assert_eq!(record.operation, "initialize");

    assert!(session.read(16).await.is_empty());
    let payload = Bytes::from_static(b"hello");
    assert_eq!(session.write(payload.clone(), false).await, payload);

    session.finish().await;
    assert!(!session.connected());
    assert_eq!(pool.allocated_count(), 0);
}

#[tokio::test]
async fn invalid_config_leaves_session_inert() {
    let pool = one_board(MockDevice::new("board-1", "K64F"));
    let mut session =
        DeviceSession::new(mock_config().with_baud_rate(0), registry_with(&pool));

    assert!(!session.establish().await);
    assert!(!session.connected());
    assert_eq!(session.state(), SessionState::Uninitialized);

    let record = session.error().expect("failure is recorded");
    assert_eq!(record.kind, ErrorKind::Configuration);
    assert_eq!(record.operation, "initialize");

    session.finish().await;
    assert_eq!(pool.device("board-1").unwrap().stats().opens, 0);
    assert_eq!(pool.allocated_count(), 0);
}

// =============================================================================
// Teardown
// =============================================================================

/// Bring a session up to (at most) `steps` lifecycle operations.
async fn session_after(steps: usize, pool: &Arc<MockPool>) -> DeviceSession {
    let mut session = DeviceSession::new(mock_config(), registry_with(pool));
    if steps > 0 {
        session.initialize().await.unwrap();
    }
    if steps > 1 {
        session.allocate().await.unwrap();
    }
    if steps > 2 {
        session.connect().await.unwrap();
    }
    if steps > 3 {
        session.provision().await.unwrap();
    }
    session
}

#[tokio::test]
async fn finish_is_idempotent_in_every_state() {
    for steps in 0..=4 {
        for finishes in [0usize, 1, 3] {
            let pool = one_board(MockDevice::new("board-1", "K64F"));
            let mut session = session_after(steps, &pool).await;

            for _ in 0..finishes {
                session.finish().await;
                assert!(!session.connected());
                assert_eq!(session.state(), SessionState::Finished);
            }

            if finishes > 0 {
                assert_eq!(pool.allocated_count(), 0, "steps={steps}");
                let stats = pool.device("board-1").unwrap().stats();
                assert!(stats.closes <= 1 && stats.releases <= 1);
            } else {
                // Drop without finish never tears down
                drop(session);
                let stats = pool.device("board-1").unwrap().stats();
                assert_eq!(stats.closes, 0);
                assert_eq!(stats.releases, 0);
            }
        }
    }
}

#[tokio::test]
async fn one_close_and_one_release_per_connected_session() {
    let pool = one_board(MockDevice::new("board-1", "K64F"));
    let mut session = session_after(4, &pool).await;

    session.finish().await;
    session.finish().await;

    let stats = pool.device("board-1").unwrap().stats();
    assert_eq!(stats.opens, 1);
    assert_eq!(stats.closes, 1);
    assert_eq!(stats.releases, 1);
    assert_eq!(pool.allocated_count(), 0);
}

#[tokio::test]
async fn failed_close_skips_release_and_records_finish() {
    let pool = one_board(
        MockDevice::builder("board-1", "K64F")
            .errors(ErrorConfig::scenario(ErrorScenario::AlwaysFail { operation: "close" }))
            .build(),
    );
    let mut session = session_after(4, &pool).await;

    session.finish().await;
    session.finish().await;

    assert!(!session.connected());
    assert_eq!(session.state(), SessionState::Finished);
    let record = session.error().unwrap();
    assert_eq!(record.kind, ErrorKind::Device);
    assert_eq!(record.operation, "finish");

    let stats = pool.device("board-1").unwrap().stats();
    assert_eq!(stats.closes, 1);
    assert_eq!(stats.releases, 0);
    // Leaked until the broker reclaims it.
    assert_eq!(pool.allocated_count(), 1);
}

#[tokio::test]
async fn failed_release_is_recorded_under_finish() {
    let pool = one_board(
        MockDevice::builder("board-1", "K64F")
            .errors(ErrorConfig::scenario(ErrorScenario::AlwaysFail {
                operation: "release",
            }))
            .build(),
    );
    let mut session = session_after(4, &pool).await;

    session.finish().await;
    session.finish().await;

    assert!(!session.connected());
    assert_eq!(session.state(), SessionState::Finished);
    let record = session.error().unwrap();
    assert_eq!(record.kind, ErrorKind::Device);
    assert_eq!(record.operation, "finish");

    let stats = pool.device("board-1").unwrap().stats();
    assert_eq!(stats.closes, 1);
    assert_eq!(stats.releases, 1);
    assert_eq!(pool.allocated_count(), 1);
}

#[tokio::test]
async fn failed_connect_releases_without_closing() {
    let pool = one_board(
        MockDevice::builder("board-1", "K64F")
            .errors(ErrorConfig::scenario(ErrorScenario::AlwaysFail { operation: "open" }))
            .build(),
    );
    let mut session = DeviceSession::new(mock_config(), registry_with(&pool));

    assert!(!session.establish().await);
    assert_eq!(session.state(), SessionState::ResourceAllocated);
    assert_eq!(session.error().unwrap().kind, ErrorKind::ConnectionFailed);
    assert!(!session.connected());

    session.finish().await;
    let stats = pool.device("board-1").unwrap().stats();
    assert_eq!(stats.closes, 0);
    assert_eq!(stats.releases, 1);
}

#[tokio::test]
async fn no_matching_resource_touches_nothing() {
    let pool = one_board(MockDevice::new("board-1", "NUCLEO_F429ZI"));
    let mut session = DeviceSession::new(mock_config(), registry_with(&pool));

    assert!(!session.establish().await);
    let record = session.error().unwrap();
    assert_eq!(record.kind, ErrorKind::NoResourceAvailable);
    assert!(record.kind.is_retryable());
    assert!(record.message.contains("platform_name=K64F"));

    session.finish().await;
    let stats = pool.device("board-1").unwrap().stats();
    assert_eq!(stats.opens, 0);
    assert_eq!(stats.closes, 0);
    assert_eq!(stats.releases, 0);
}

#[tokio::test]
async fn pinned_target_held_elsewhere_is_a_conflict() {
    let pool = Arc::new(MockPool::with_boards(&[("a", "K64F"), ("b", "K64F")]));
    let registry = registry_with(&pool);
    let pinned = mock_config().with_target("a");

    let mut first = DeviceSession::new(pinned.clone(), registry.clone());
    assert!(first.establish().await);

    let mut second = DeviceSession::new(pinned, registry);
    second.initialize().await.unwrap();
    let err = second.allocate().await.unwrap_err();
    assert!(matches!(err, HilError::AllocationConflict { ref target_id } if target_id == "a"));
    assert_eq!(second.state(), SessionState::ClientReady);

    first.finish().await;
    second.finish().await;
    assert_eq!(pool.allocated_count(), 0);
}

// =============================================================================
// Provisioning
// =============================================================================

#[tokio::test]
async fn flash_failure_is_recorded_but_session_is_ready() {
    let pool = one_board(
        MockDevice::builder("board-1", "K64F")
            .flash_succeeds(false)
            .build(),
    );
    let image = firmware_image();
    let mut session =
        DeviceSession::new(mock_config().with_image(image.path()), registry_with(&pool));

    assert!(session.establish().await);
    assert_eq!(session.state(), SessionState::Ready);
    assert!(session.connected());

    let record = session.error().unwrap();
    assert_eq!(record.kind, ErrorKind::ProvisioningFailed);
    assert_eq!(record.operation, "provision");
    assert!(record.message.contains("flash"));

    // Reset still ran after the failed flash
    assert_eq!(pool.device("board-1").unwrap().stats().resets, 1);
    session.finish().await;
}

#[tokio::test]
async fn reset_failure_is_recorded_but_session_is_ready() {
    let pool = one_board(
        MockDevice::builder("board-1", "K64F")
            .reset_succeeds(false)
            .build(),
    );
    let image = firmware_image();
    let mut session =
        DeviceSession::new(mock_config().with_image(image.path()), registry_with(&pool));

    assert!(session.establish().await);
    assert!(session.connected());
    let record = session.error().unwrap();
    assert_eq!(record.kind, ErrorKind::ProvisioningFailed);
    assert!(record.message.contains("reset"));

    let device = pool.device("board-1").unwrap();
    assert_eq!(device.flashed_image().as_deref(), Some(image.path()));
    session.finish().await;
}

#[tokio::test]
async fn missing_image_skips_flash_only() {
    let pool = one_board(MockDevice::new("board-1", "K64F"));
    let mut session = DeviceSession::new(mock_config(), registry_with(&pool));

    assert!(session.establish().await);
    assert!(session.error().is_none());

    let stats = pool.device("board-1").unwrap().stats();
    assert_eq!(stats.flashes, 0);
    assert_eq!(stats.resets, 1);
    session.finish().await;
}

// =============================================================================
// I/O
// =============================================================================

#[tokio::test]
async fn write_passes_payload_through_unchanged() {
    let pool = one_board(MockDevice::new("board-1", "K64F"));
    let mut session = session_after(4, &pool).await;

    let payload = Bytes::from_static(b"{{__sync;1}}");
    let returned = session.write(payload.clone(), false).await;
    assert_eq!(returned, payload);

    let device = pool.device("board-1").unwrap();
    assert_eq!(device.stats().writes, 1);
    // No terminator appended
    assert_eq!(device.written(), vec![payload]);
    session.finish().await;
}

#[tokio::test]
async fn loopback_read_returns_what_was_written() {
    let pool = one_board(MockDevice::new("board-1", "K64F"));
    let mut session = session_after(4, &pool).await;

    session.write(Bytes::from_static(b"ping-pong"), false).await;
    session.flush().await;

    let first = session.read(4).await;
    assert_eq!(first, Bytes::from_static(b"ping"));
    let rest = session.read(64).await;
    assert_eq!(rest, Bytes::from_static(b"-pong"));
    assert!(session.read(64).await.is_empty());
    session.finish().await;
}

#[tokio::test]
async fn io_is_a_no_op_once_finished() {
    let pool = one_board(MockDevice::new("board-1", "K64F"));
    let mut session = session_after(4, &pool).await;
    session.finish().await;

    let payload = Bytes::from_static(b"late");
    assert_eq!(session.write(payload.clone(), false).await, payload);
    assert!(session.read(8).await.is_empty());

    let stats = pool.device("board-1").unwrap().stats();
    assert_eq!(stats.writes, 0);
    assert_eq!(stats.reads, 0);
}

#[tokio::test]
async fn transport_error_is_recorded_not_raised() {
    let pool = one_board(
        MockDevice::builder("board-1", "K64F")
            .errors(ErrorConfig::scenario(ErrorScenario::AlwaysFail { operation: "read" }))
            .build(),
    );
    let mut session = session_after(4, &pool).await;

    assert!(session.read(8).await.is_empty());
    let record = session.error().unwrap();
    assert_eq!(record.kind, ErrorKind::Device);
    assert_eq!(record.operation, "read");
    assert!(session.connected());
    session.finish().await;
}

#[tokio::test]
#[traced_test]
async fn echo_logs_payload_on_txd_target() {
    let pool = one_board(MockDevice::new("board-1", "K64F"));
    let mut session = session_after(4, &pool).await;

    session.write(Bytes::from_static(b"echoed-line"), true).await;
    session.write(Bytes::from_static(b"quiet-line"), false).await;

    assert!(logs_contain("rust_hil::txd"));
    assert!(logs_contain("echoed-line"));
    assert!(!logs_contain("quiet-line"));
    session.finish().await;
}

#[tokio::test]
#[traced_test]
async fn echo_is_silent_when_nothing_is_written() {
    let pool = Arc::new(MockPool::default());
    let mut session = DeviceSession::new(
        SessionConfig::for_backend("nonexistent"),
        registry_with(&pool),
    );
    assert!(!session.establish().await);

    session.write(Bytes::from_static(b"unsent-line"), true).await;

    assert!(!logs_contain("unsent-line"));
    session.finish().await;
}

// =============================================================================
// Scoped sessions
// =============================================================================

#[tokio::test]
async fn run_scoped_finishes_after_body() {
    let pool = one_board(MockDevice::new("board-1", "K64F"));
    let session = DeviceSession::new(mock_config(), registry_with(&pool));

    let echoed = session
        .run_scoped(|session| {
            Box::pin(async move {
                assert!(session.establish().await);
                session.write(Bytes::from_static(b"abc"), false).await;
                session.read(3).await
            })
        })
        .await;

    assert_eq!(echoed, Bytes::from_static(b"abc"));
    let stats = pool.device("board-1").unwrap().stats();
    assert_eq!(stats.closes, 1);
    assert_eq!(stats.releases, 1);
}

#[tokio::test]
async fn run_scoped_finishes_when_body_panics() {
    let pool = one_board(MockDevice::new("board-1", "K64F"));
    let session = DeviceSession::new(mock_config(), registry_with(&pool));

    let result = AssertUnwindSafe(session.run_scoped(|session| {
        Box::pin(async move {
            if session.establish().await {
                panic!("firmware never answered");
            }
        })
    }))
    .catch_unwind()
    .await;

    assert!(result.is_err());
    assert_eq!(pool.allocated_count(), 0);
    let stats = pool.device("board-1").unwrap().stats();
    assert_eq!(stats.closes, 1);
    assert_eq!(stats.releases, 1);
}

// =============================================================================
// End to end
// =============================================================================

#[tokio::test]
async fn platform_x_at_9600_baud() {
    let pool = one_board(MockDevice::new("x-1", "X"));
    let config = SessionConfig::for_backend("mock")
        .with_platform("X")
        .with_baud_rate(9600);
    let mut session = DeviceSession::new(config, registry_with(&pool));

    session.initialize().await.unwrap();
    assert_eq!(session.state(), SessionState::ClientReady);
    assert_eq!(session.resources_seen(), 1);

    session.allocate().await.unwrap();
    assert_eq!(session.resource_id(), Some("x-1"));

    session.connect().await.unwrap();
    let device = pool.device("x-1").unwrap();
    assert_eq!(device.last_params(), Some(SerialParameters::raw(9600)));

    session.provision().await.unwrap();
    assert_eq!(session.state(), SessionState::Ready);
    assert!(session.connected());
    assert!(session.error().is_none());

    let payload = Bytes::from_static(b"\x00\x01binary\xff");
    assert_eq!(session.write(payload.clone(), true).await, payload);
    assert_eq!(session.read(payload.len()).await, payload);

    session.finish().await;
    assert_eq!(session.state(), SessionState::Finished);
    assert!(!session.connected());

    let stats = device.stats();
    assert_eq!(stats.closes, 1);
    assert_eq!(stats.releases, 1);
    assert!(!device.is_allocated());
}
