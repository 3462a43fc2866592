// Concurrency tests for the facade: racing releases, racing account
// creation, and racing deployment creation must never lose or duplicate
// state.

mod common;

use common::{package_fields, test_store, unique_email};
use std::collections::HashSet;
use std::sync::Arc;
use updraft_metadata::MetadataError;

#[tokio::test]
async fn concurrent_releases_all_reach_history() {
    let store = Arc::new(test_store().await);
    let account_id = store
        .add_account(&unique_email("user"), "User")
        .await
        .unwrap();
    let app_id = store.add_app("Foo", account_id, None).await.unwrap();
    let (deployment_id, _) = store.add_deployment(app_id, "Staging").await.unwrap();

    let mut handles = Vec::new();
    for i in 0..12 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .add_package(&deployment_id, package_fields(&format!("v{i}")))
                .await
        }));
    }

    let mut package_ids = HashSet::new();
    for handle in handles {
        let id = handle.await.unwrap().unwrap();
        package_ids.insert(id);
    }
    assert_eq!(package_ids.len(), 12);

    let history = store.get_package_history(&deployment_id).await.unwrap();
    assert_eq!(history.len(), 12, "every concurrent release must be recorded");

    let labels: HashSet<_> = history.iter().map(|e| e.label.clone()).collect();
    assert_eq!(labels.len(), 12, "no entry may be duplicated");

    // The deployment points at one of the released packages.
    let deployment = store.get_deployment(&deployment_id).await.unwrap();
    assert!(package_ids.contains(&deployment.latest_package_id.unwrap()));
}

#[tokio::test]
async fn concurrent_account_creation_single_winner() {
    let store = Arc::new(test_store().await);
    let email = unique_email("race");

    let mut handles = Vec::new();
    for i in 0..8 {
        let store = store.clone();
        let email = email.clone();
        handles.push(tokio::spawn(async move {
            store.add_account(&email, &format!("Racer {i}")).await
        }));
    }

    let mut winners = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(id) => winners.push(id),
            Err(MetadataError::Conflict(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(winners.len(), 1, "exactly one create may win the email");

    let account = store.get_account_by_email(&email).await.unwrap();
    assert_eq!(account.id, winners[0]);
}

#[tokio::test]
async fn concurrent_deployments_get_distinct_keys() {
    let store = Arc::new(test_store().await);
    let account_id = store
        .add_account(&unique_email("user"), "User")
        .await
        .unwrap();
    let app_id = store.add_app("Foo", account_id, None).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.add_deployment(app_id, &format!("Channel {i}")).await
        }));
    }

    let mut keys = HashSet::new();
    for handle in handles {
        let (_, key) = handle.await.unwrap().unwrap();
        keys.insert(key.as_str().to_string());
    }
    assert_eq!(keys.len(), 8, "every deployment must get its own key");
    assert_eq!(store.get_deployments(&app_id).await.unwrap().len(), 8);
}

#[tokio::test]
async fn rotation_races_release_without_losing_either() {
    let store = Arc::new(test_store().await);
    let account_id = store
        .add_account(&unique_email("user"), "User")
        .await
        .unwrap();
    let app_id = store.add_app("Foo", account_id, None).await.unwrap();
    let (deployment_id, _) = store.add_deployment(app_id, "Staging").await.unwrap();

    let rotator = {
        let store = store.clone();
        tokio::spawn(async move { store.rotate_deployment_key(&deployment_id).await })
    };
    let releaser = {
        let store = store.clone();
        tokio::spawn(async move { store.add_package(&deployment_id, package_fields("v1")).await })
    };

    let new_key = rotator.await.unwrap().unwrap();
    let package_id = releaser.await.unwrap().unwrap();

    // Both effects are visible afterwards: the new key resolves, the record
    // carries it, and the release landed.
    let deployment = store.get_deployment_by_key(new_key.as_str()).await.unwrap();
    assert_eq!(deployment.id, deployment_id);
    assert_eq!(deployment.latest_package_id, Some(package_id));
    assert_eq!(
        store.get_package_history(&deployment_id).await.unwrap().len(),
        1
    );
}
