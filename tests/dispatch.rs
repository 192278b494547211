//! End-to-end dispatch tests through a wired site pair

use minilend::common::Config;
use minilend::site::start_pair;
use minilend::SiteHandle;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;

fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.storage.data_dir = dir.path().to_path_buf();
    config.storage.catalog_size = 50;
    config.storage.site1_loans = 5;
    config.storage.site2_loans = 5;
    config
}

async fn wait_for<F: Fn() -> bool>(cond: F) {
    for _ in 0..100 {
        if cond() {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

fn shutdown(site1: SiteHandle, site2: SiteHandle) {
    site1.shutdown();
    site2.shutdown();
}

#[tokio::test]
async fn test_loan_blocks_for_the_real_outcome() {
    let dir = TempDir::new().unwrap();
    let (site1, site2) = start_pair(&test_config(&dir)).unwrap();

    // ISBN0007: 3 copies, untouched by initial loans
    let resp = site1.dispatch.submit("loan,user42,ISBN0007").await.unwrap();
    assert!(resp.success, "{}", resp.message);
    assert!(resp.due_date.is_some());

    // The commit already happened by the time the client saw the response
    assert_eq!(site1.engine.loans_for("ISBN0007", "user42").unwrap().len(), 1);

    shutdown(site1, site2);
}

#[tokio::test]
async fn test_loans_fail_synchronously_when_exhausted() {
    let dir = TempDir::new().unwrap();
    let (site1, site2) = start_pair(&test_config(&dir)).unwrap();

    // ISBN0010: single copy (multiple of 10)
    let first = site1.dispatch.submit("loan,userA,ISBN0010").await.unwrap();
    assert!(first.success);

    let second = site1.dispatch.submit("loan,userB,ISBN0010").await.unwrap();
    assert!(!second.success);
    assert!(second.message.contains("no copies"));

    shutdown(site1, site2);
}

#[tokio::test]
async fn test_return_is_acked_then_processed_async() {
    let dir = TempDir::new().unwrap();
    let (site1, site2) = start_pair(&test_config(&dir)).unwrap();

    // user1 holds ISBN0001 from the seed
    let before = site1.engine.item("ISBN0001").unwrap().unwrap().available_copies;

    let resp = site1.dispatch.submit("return,user1,ISBN0001").await.unwrap();
    assert!(resp.success);
    assert_eq!(resp.message, "request received");

    let engine = site1.engine.clone();
    wait_for(move || {
        engine.item("ISBN0001").unwrap().unwrap().available_copies == before + 1
    })
    .await;

    shutdown(site1, site2);
}

#[tokio::test]
async fn test_failed_async_return_is_still_acked() {
    let dir = TempDir::new().unwrap();
    let (site1, site2) = start_pair(&test_config(&dir)).unwrap();

    // Nobody holds this loan; the eventual commit fails in the worker and
    // the caller never hears about it
    let resp = site1.dispatch.submit("return,ghost,ISBN0009").await.unwrap();
    assert!(resp.success);

    shutdown(site1, site2);
}

#[tokio::test]
async fn test_renew_processed_async() {
    let dir = TempDir::new().unwrap();
    let (site1, site2) = start_pair(&test_config(&dir)).unwrap();

    let resp = site1.dispatch.submit("renew,user2,ISBN0002").await.unwrap();
    assert!(resp.success);

    let engine = site1.engine.clone();
    wait_for(move || engine.loans_for("ISBN0002", "user2").unwrap()[0].renewals == 1).await;

    shutdown(site1, site2);
}

#[tokio::test]
async fn test_malformed_request_never_reaches_storage() {
    let dir = TempDir::new().unwrap();
    let (site1, site2) = start_pair(&test_config(&dir)).unwrap();

    let snapshot = site1.engine.catalog_items().unwrap();

    // Missing item field
    let resp = site1.dispatch.submit("loan,user1").await.unwrap();
    assert!(!resp.success);
    assert!(resp.message.contains("invalid request"));

    // Catalog untouched
    assert_eq!(site1.engine.catalog_items().unwrap(), snapshot);

    shutdown(site1, site2);
}

#[tokio::test]
async fn test_sites_replicate_each_other() {
    let dir = TempDir::new().unwrap();
    let (site1, site2) = start_pair(&test_config(&dir)).unwrap();

    site1.dispatch.submit("loan,user77,ISBN0020").await.unwrap();

    // Site 2's replica eventually sees site 1's loan
    let replica = site2.replica.clone();
    wait_for(move || !replica.loans_for("ISBN0020", "user77").unwrap().is_empty()).await;

    shutdown(site1, site2);
}
