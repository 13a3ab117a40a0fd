//! Integration tests for the mock backend
//!
//! Drives the mock through the public `hil-core` traits only, the way a session does.

use bytes::Bytes;
use hil_core::manager::{BackendFactory, FactoryRegistry};
use hil_core::resource::{AllocationCriteria, ManagerEndpoint, SerialParameters};
use hil_driver_mock::*;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn endpoint() -> ManagerEndpoint {
    ManagerEndpoint {
        host: None,
        port: 8000,
        timeout: Duration::from_secs(5),
    }
}

struct CollectingRegistry {
    ids: Mutex<Vec<&'static str>>,
}

impl FactoryRegistry for CollectingRegistry {
    fn register_factory(&self, factory: Box<dyn BackendFactory>) {
        self.ids.lock().unwrap().push(factory.backend_id());
    }
}

#[test]
fn test_register_all_registers_mock() {
    let registry = CollectingRegistry {
        ids: Mutex::new(Vec::new()),
    };
    register_all(&registry);
    assert_eq!(*registry.ids.lock().unwrap(), vec![MOCK_BACKEND_ID]);
}

#[tokio::test]
async fn test_full_device_cycle_through_traits() {
    let pool = Arc::new(MockPool::default());
    let factory = MockBackendFactory::with_pool(pool.clone());
    let client = factory.build(endpoint()).await.unwrap();

    let resources = client.list_resources().await.unwrap();
    assert_eq!(resources.len(), 3);

    let handle = client
        .allocate(&AllocationCriteria::new(Some("NUCLEO_F429ZI".into()), None))
        .await
        .unwrap()
        .expect("a NUCLEO board is free");
    assert!(handle.is_allocated());

    handle
        .open_connection(SerialParameters::raw(9600))
        .await
        .unwrap();
    assert!(handle.reset().await);
    handle.write_line(b"{{__sync;1}}").await.unwrap();
    assert_eq!(
        handle.read(64).await.unwrap(),
        Bytes::from_static(b"{{__sync;1}}")
    );

    handle.close_connection().await.unwrap();
    handle.release().await.unwrap();

    let device = pool.device(handle.resource_id()).unwrap();
    let stats = device.stats();
    assert_eq!(stats.opens, 1);
    assert_eq!(stats.closes, 1);
    assert_eq!(stats.releases, 1);
    assert_eq!(pool.allocated_count(), 0);
}

#[tokio::test]
async fn test_device_output_without_loopback() {
    let pool = Arc::new(MockPool::new(vec![
        MockDevice::builder("quiet", "K64F").loopback(false).build(),
    ]));
    let client = MockBackendFactory::with_pool(pool.clone())
        .build(endpoint())
        .await
        .unwrap();
    let handle = client
        .allocate(&AllocationCriteria::default())
        .await
        .unwrap()
        .unwrap();
    handle.open_connection(SerialParameters::default()).await.unwrap();

    handle.write_line(b"ping").await.unwrap();
    assert!(handle.read(16).await.unwrap().is_empty());

    pool.device("quiet").unwrap().inject_output(b"pong");
    assert_eq!(handle.read(16).await.unwrap(), Bytes::from_static(b"pong"));
}

#[tokio::test]
async fn test_communication_loss_mid_session() {
    let pool = Arc::new(MockPool::new(vec![
        MockDevice::builder("flaky", "K64F")
            .errors(ErrorConfig::scenario(ErrorScenario::FailAfterN {
                operation: "write",
                count: 1,
            }))
            .build(),
    ]));
    let client = MockBackendFactory::with_pool(pool)
        .build(endpoint())
        .await
        .unwrap();
    let handle = client
        .allocate(&AllocationCriteria::default())
        .await
        .unwrap()
        .unwrap();
    handle.open_connection(SerialParameters::default()).await.unwrap();

    assert!(handle.write_line(b"one").await.is_ok());
    assert!(handle.write_line(b"two").await.is_err());
}
