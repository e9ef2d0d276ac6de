//! Transactional creates and the unit intake flow.

mod common;

use std::{collections::HashSet, sync::Arc};

use chrono::Utc;
use uuid::Uuid;

use docvault::{memory::InMemoryConnector, prelude::*};

use common::{Donor, StubConnector, Unit, config, donor, init_tracing, unit};

struct Stores {
    donors: DocumentStore<Donor, InMemoryConnector>,
    units: DocumentStore<Unit, InMemoryConnector>,
}

fn stores(connector: &InMemoryConnector) -> Stores {
    let manager = Arc::new(ConnectionManager::new(config("donor"), connector.clone()));

    Stores {
        donors: DocumentStore::with_manager_for(manager.clone(), "donor"),
        units: DocumentStore::with_manager_for(manager, "unit"),
    }
}

/// Records a donation: stamps the donor, then stores `amount` copies of `template`
/// under fresh ids.
async fn create_units(
    stores: &Stores,
    scope: &Scope,
    template: &Unit,
    amount: usize,
) -> DocumentStoreResult<Vec<String>> {
    let mut donor = stores.donors.find(scope, &template.donor_id).await?;

    let now = Utc::now();
    donor.last_donation = Some(now);
    donor.updated_at = now;
    stores.donors.update(scope, &donor).await?;

    let batch: Vec<Unit> = (0..amount)
        .map(|_| Unit {
            id: Uuid::new_v4().to_string(),
            ..template.clone()
        })
        .collect();

    stores.units.create_many(scope, &batch).await?;
    Ok(batch.into_iter().map(|unit| unit.id).collect())
}

#[tokio::test]
async fn unit_batch_is_stored_and_donor_is_stamped() {
    init_tracing();
    let stores = stores(&InMemoryConnector::new());
    let scope = Scope::background();

    let d = donor("d1", "AB");
    stores.donors.create(&scope, &d).await.unwrap();

    let ids = create_units(&stores, &scope, &unit("template", &d), 3).await.unwrap();

    let distinct: HashSet<_> = ids.iter().collect();
    assert_eq!(distinct.len(), 3);

    let stored = stores
        .units
        .find_many(&scope, Some(Filter::eq("donor_id", "d1")))
        .await
        .unwrap();
    assert_eq!(stored.len(), 3);
    assert!(stored.iter().all(|unit| ids.contains(&unit.id)));

    let stamped = stores.donors.find(&scope, "d1").await.unwrap();
    assert!(stamped.last_donation.is_some());
    assert!(stamped.updated_at > d.updated_at);
}

#[tokio::test]
async fn unit_batch_for_unknown_donor_writes_nothing() {
    let stores = stores(&InMemoryConnector::new());
    let scope = Scope::background();

    let ghost = donor("ghost", "A");
    let err = create_units(&stores, &scope, &unit("template", &ghost), 3).await.unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(err.status_hint(), 404);
    assert!(stores.units.find_many(&scope, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn rolled_back_creates_are_never_visible() {
    let stores = stores(&InMemoryConnector::new());
    let scope = Scope::background();
    let d = donor("d1", "0");

    let mut tx = stores.units.begin_transaction(&scope).await.unwrap();
    assert_eq!(tx.collection(), "unit");
    tx.create(&scope, &unit("u1", &d)).await.unwrap();
    tx.create_many(&scope, &[unit("u2", &d), unit("u3", &d)]).await.unwrap();

    // Not visible outside the transaction while it is open.
    assert!(stores.units.find(&scope, "u1").await.unwrap_err().is_not_found());

    tx.rollback(&scope).await.unwrap();

    for id in ["u1", "u2", "u3"] {
        assert!(stores.units.find(&scope, id).await.unwrap_err().is_not_found());
    }
}

#[tokio::test]
async fn committed_creates_become_visible_together() {
    let stores = stores(&InMemoryConnector::new());
    let scope = Scope::background();
    let d = donor("d1", "0");

    let mut tx = stores.units.begin_transaction(&scope).await.unwrap();
    tx.create_many(&scope, &[unit("u1", &d), unit("u2", &d)]).await.unwrap();
    assert!(stores.units.find_many(&scope, None).await.unwrap().is_empty());

    tx.commit(&scope).await.unwrap();

    let stored = stores.units.find_many(&scope, None).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stores.units.find(&scope, "u2").await.unwrap(), unit("u2", &d));
}

#[tokio::test]
async fn transactional_create_sees_committed_and_own_writes() {
    let stores = stores(&InMemoryConnector::new());
    let scope = Scope::background();
    let d = donor("d1", "0");

    stores.units.create(&scope, &unit("u1", &d)).await.unwrap();

    let mut tx = stores.units.begin_transaction(&scope).await.unwrap();
    assert!(tx.create(&scope, &unit("u1", &d)).await.unwrap_err().is_conflict());

    tx.create(&scope, &unit("u2", &d)).await.unwrap();
    assert!(tx.create(&scope, &unit("u2", &d)).await.unwrap_err().is_conflict());

    // Duplicate inside one batch is rejected before anything is buffered.
    let err = tx
        .create_many(&scope, &[unit("u3", &d), unit("u3", &d)])
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    tx.commit(&scope).await.unwrap();
    assert!(stores.units.find(&scope, "u3").await.unwrap_err().is_not_found());
    assert_eq!(stores.units.find_many(&scope, None).await.unwrap().len(), 2);
}

#[tokio::test]
async fn commit_conflicts_when_another_writer_claims_an_id() {
    let stores = stores(&InMemoryConnector::new());
    let scope = Scope::background();
    let d = donor("d1", "0");

    let mut tx = stores.units.begin_transaction(&scope).await.unwrap();
    tx.create_many(&scope, &[unit("u1", &d), unit("u2", &d)]).await.unwrap();

    stores.units.create(&scope, &unit("u2", &d)).await.unwrap();

    let err = tx.commit(&scope).await.unwrap_err();
    assert!(matches!(err, DocumentStoreError::Conflict { ref id, .. } if id == "u2"));
    assert!(stores.units.find(&scope, "u1").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn empty_transactional_batch_is_a_no_op() {
    let units = DocumentStore::<Unit, _>::new(config("unit"), StubConnector::new());
    let scope = Scope::background();
    let d = donor("d1", "0");

    let mut tx = units.begin_transaction(&scope).await.unwrap();
    tx.create_many(&scope, &[]).await.unwrap();
    tx.create(&scope, &unit("u1", &d)).await.unwrap();
    tx.create_many(&scope, &[]).await.unwrap();
    tx.commit(&scope).await.unwrap();

    assert_eq!(units.find_many(&scope, None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn dropped_transaction_discards_its_writes() {
    let stores = stores(&InMemoryConnector::new());
    let scope = Scope::background();
    let d = donor("d1", "0");

    {
        let mut tx = stores.units.begin_transaction(&scope).await.unwrap();
        tx.create(&scope, &unit("u1", &d)).await.unwrap();
    }

    assert!(stores.units.find(&scope, "u1").await.unwrap_err().is_not_found());
}
