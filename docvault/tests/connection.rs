//! Lazy establishment, sharing, teardown and time bounds of store connections.

mod common;

use std::{sync::Arc, time::Duration};

use docvault::{memory::InMemoryConnector, prelude::*};

use common::{Donor, StubConnector, config, donor, donor_store, init_tracing, unit};

fn stub_store(connector: &StubConnector, timeout: Duration) -> DocumentStore<Donor, StubConnector> {
    let config = StoreConfig::builder()
        .collection("donor")
        .timeout(timeout)
        .resolve_with(|_| None);
    DocumentStore::new(config, connector.clone())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_operations_connect_once() {
    init_tracing();
    let connector = StubConnector::new().connect_delay(Duration::from_millis(50));
    let donors = stub_store(&connector, Duration::from_secs(10));

    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let donors = donors.clone();
            tokio::spawn(async move {
                donors
                    .create(&Scope::background(), &donor(&format!("d{i}"), "A"))
                    .await
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(connector.attempts(), 1);
    assert_eq!(donors.manager().connections_established(), 1);
    assert_eq!(donors.find_many(&Scope::background(), None).await.unwrap().len(), 32);
}

#[tokio::test]
async fn nothing_connects_before_the_first_operation() {
    let connector = InMemoryConnector::new();
    let donors = donor_store(connector.clone());

    assert!(!donors.manager().is_connected().await);
    assert_eq!(connector.connects(), 0);

    donors.find_many(&Scope::background(), None).await.unwrap();
    assert!(donors.manager().is_connected().await);
    assert_eq!(connector.connects(), 1);
}

#[tokio::test]
async fn refused_connection_is_retried_by_the_next_operation() {
    let connector = StubConnector::new().refuse(1);
    let donors = stub_store(&connector, Duration::from_secs(10));
    let scope = Scope::background();

    let err = donors.find(&scope, "d1").await.unwrap_err();
    assert!(matches!(err, DocumentStoreError::Connection(_)));
    assert!(err.is_retryable());
    assert!(!donors.manager().is_connected().await);

    donors.create(&scope, &donor("d1", "A")).await.unwrap();
    assert_eq!(connector.attempts(), 2);
    assert_eq!(donors.manager().connections_established(), 1);
}

#[tokio::test]
async fn disconnect_is_idempotent_and_the_next_operation_reconnects() {
    let connector = InMemoryConnector::new();
    let donors = donor_store(connector.clone());
    let scope = Scope::background();

    // Never connected: no-op.
    donors.disconnect(&scope).await.unwrap();
    assert_eq!(connector.connects(), 0);

    donors.create(&scope, &donor("d1", "AB")).await.unwrap();
    donors.disconnect(&scope).await.unwrap();
    donors.disconnect(&scope).await.unwrap();
    assert!(!donors.manager().is_connected().await);

    assert_eq!(donors.find(&scope, "d1").await.unwrap().blood_type, "AB");
    assert_eq!(connector.connects(), 2);
    assert_eq!(donors.manager().connections_established(), 2);
}

#[tokio::test]
async fn captured_handle_fails_cleanly_after_disconnect() {
    let donors = donor_store(InMemoryConnector::new());
    let scope = Scope::background();

    let backend = donors.manager().connect(&scope).await.unwrap();
    donors.disconnect(&scope).await.unwrap();

    let err = backend.find_document("d1", "donor").await.unwrap_err();
    assert!(matches!(err, DocumentStoreError::Backend(_)));
}

#[tokio::test]
async fn stores_on_one_manager_share_the_connection() {
    let connector = InMemoryConnector::new();
    let manager = Arc::new(ConnectionManager::new(config("donor"), connector.clone()));
    let donors = DocumentStore::<Donor, _>::with_manager(manager.clone());
    let units = DocumentStore::<common::Unit, _>::with_manager_for(manager, "unit");
    let scope = Scope::background();

    assert_eq!(donors.collection(), "donor");
    assert_eq!(units.collection(), "unit");

    let d = donor("d1", "0");
    donors.create(&scope, &d).await.unwrap();
    units.create(&scope, &unit("u1", &d)).await.unwrap();
    assert_eq!(connector.connects(), 1);

    // Same id, different collection.
    assert!(units.find(&scope, "d1").await.unwrap_err().is_not_found());

    units.disconnect(&scope).await.unwrap();
    assert!(!donors.manager().is_connected().await);
}

#[tokio::test(start_paused = true)]
async fn slow_operation_times_out_with_the_store_timeout() {
    let connector = StubConnector::new().latency(Duration::from_secs(30));
    let donors = stub_store(&connector, Duration::from_secs(2));

    let err = donors.find(&Scope::background(), "d1").await.unwrap_err();
    assert!(matches!(err, DocumentStoreError::Timeout(budget) if budget == Duration::from_secs(2)));
    assert!(err.is_retryable());

    // The connection itself is fine.
    assert!(donors.manager().is_connected().await);
}

#[tokio::test(start_paused = true)]
async fn caller_deadline_shorter_than_store_timeout_wins() {
    let connector = StubConnector::new().latency(Duration::from_secs(5));
    let donors = stub_store(&connector, Duration::from_secs(10));

    let scope = Scope::with_timeout(Duration::from_millis(500));
    let err = donors.find_many(&scope, None).await.unwrap_err();
    assert!(matches!(err, DocumentStoreError::Timeout(budget) if budget == Duration::from_millis(500)));
}

#[tokio::test(start_paused = true)]
async fn slow_establishment_is_a_connection_error() {
    let connector = StubConnector::new().connect_delay(Duration::from_secs(60));
    let manager = ConnectionManager::new(config("donor"), connector.clone())
        .with_connect_timeout(Duration::from_secs(1));
    let donors = DocumentStore::<Donor, _>::with_manager(Arc::new(manager));

    let err = donors.find(&Scope::background(), "d1").await.unwrap_err();
    assert!(matches!(err, DocumentStoreError::Connection(_)));
    assert!(!donors.manager().is_connected().await);
}

#[tokio::test(start_paused = true)]
async fn cancellation_aborts_an_operation_in_flight() {
    let connector = StubConnector::new().latency(Duration::from_secs(30));
    let donors = stub_store(&connector, Duration::from_secs(60));

    let scope = Scope::background();
    let canceller = scope.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        canceller.cancel();
    });

    let err = donors.find(&scope, "d1").await.unwrap_err();
    assert!(matches!(err, DocumentStoreError::Cancelled));

    // An already cancelled scope fails before touching the backend.
    let err = donors.create(&scope, &donor("d1", "A")).await.unwrap_err();
    assert!(matches!(err, DocumentStoreError::Cancelled));
    assert!(connector.data().find_document("d1", "donor").await.unwrap().is_none());
}
