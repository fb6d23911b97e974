//! SQLite index driver tests.

use std::sync::Arc;

use chrono::Duration;
use tempfile::TempDir;
use vigil_db::{open_index_driver, IndexConfig, IndexDriver, PathFilter, PathPager};
use vigil_model::{time, Frequency, MetadataRecord, ServiceDefinition};

const MD5: &str = "0123456789abcdef0123456789abcdef";

async fn setup(temp: &TempDir, page_size: i64) -> Arc<dyn IndexDriver> {
    let path = temp.path().join("index").join("index.sqlite3");
    let config = IndexConfig::sqlite(path.to_string_lossy()).with_page_size(page_size);
    let driver = open_index_driver(&config, MD5).unwrap();
    driver.setup_index().await.unwrap();
    driver
}

fn daily() -> ServiceDefinition {
    ServiceDefinition::new("fixity", "fixity-check").with_frequency(Frequency::parse("1 day").unwrap())
}

fn performed_days_ago(days: i64, definition: &ServiceDefinition) -> MetadataRecord {
    let mut record = MetadataRecord::new();
    record.registered_at = Some(time::now() - Duration::days(365));
    record.update_service_as_performed_at(&definition.name, time::now() - Duration::days(days));
    record
}

#[tokio::test]
async fn test_setup_creates_stale_index() {
    let temp = TempDir::new().unwrap();
    let driver = setup(&temp, 10).await;

    let state = driver.index_state().await.unwrap().unwrap();
    assert_eq!(state.config_md5, MD5);
    assert!(state.last_reindexed.is_none());
    assert!(driver.is_stale().await.unwrap());

    driver.update_index_state().await.unwrap();
    let state = driver.index_state().await.unwrap().unwrap();
    assert!(state.last_reindexed.is_some());
    assert!(!driver.is_stale().await.unwrap());
}

#[tokio::test]
async fn test_changed_configuration_is_stale() {
    let temp = TempDir::new().unwrap();
    let driver = setup(&temp, 10).await;
    driver.update_index_state().await.unwrap();

    let path = temp.path().join("index").join("index.sqlite3");
    let other = open_index_driver(&IndexConfig::sqlite(path.to_string_lossy()), "ffff").unwrap();
    assert!(other.is_stale().await.unwrap());
}

#[tokio::test]
async fn test_index_is_upsert() {
    let temp = TempDir::new().unwrap();
    let driver = setup(&temp, 10).await;
    let def = daily();

    let record = performed_days_ago(2, &def);
    driver.index("/data/a.txt", &record, &[&def]).await.unwrap();
    let first = driver.entry("/data/a.txt").await.unwrap().unwrap();

    driver.index("/data/a.txt", &record, &[&def]).await.unwrap();
    let second = driver.entry("/data/a.txt").await.unwrap().unwrap();

    assert_eq!(first.service_time, second.service_time);
    assert!(second.updated >= first.updated);

    let all = PathPager::registered(driver.clone(), PathFilter::all())
        .collect_paths()
        .await
        .unwrap();
    assert_eq!(all, vec!["/data/a.txt".to_string()]);
}

#[tokio::test]
async fn test_service_time_scenarios() {
    let temp = TempDir::new().unwrap();
    let driver = setup(&temp, 10).await;
    let def = daily();

    // Performed one day ago at a one-day frequency: due now-ish.
    let at = time::now() - Duration::days(1);
    let mut record = MetadataRecord::new();
    record.registered_at = Some(at - Duration::days(10));
    record.update_service_as_performed_at("fixity", at);
    driver.index("/data/due.txt", &record, &[&def]).await.unwrap();
    let entry = driver.entry("/data/due.txt").await.unwrap().unwrap();
    assert_eq!(entry.service_time, Some(at + Duration::days(1)));

    // No frequency and already run: never due.
    let once = ServiceDefinition::new("fixity", "fixity-check");
    driver.index("/data/once.txt", &record, &[&once]).await.unwrap();
    let entry = driver.entry("/data/once.txt").await.unwrap().unwrap();
    assert_eq!(entry.service_time, None);

    // Two services performed 2 and 6 days ago, each at 7 days: earliest wins.
    let weekly_a = ServiceDefinition::new("a", "fixity-check").with_frequency(Frequency::parse("7 days").unwrap());
    let weekly_b = ServiceDefinition::new("b", "fixity-check").with_frequency(Frequency::parse("7 days").unwrap());
    let a_at = time::now() - Duration::days(2);
    let b_at = time::now() - Duration::days(6);
    let mut record = MetadataRecord::new();
    record.registered_at = Some(b_at - Duration::days(1));
    record.update_service_as_performed_at("a", a_at);
    record.update_service_as_performed_at("b", b_at);
    driver
        .index("/data/two.txt", &record, &[&weekly_a, &weekly_b])
        .await
        .unwrap();
    let entry = driver.entry("/data/two.txt").await.unwrap().unwrap();
    assert_eq!(entry.service_time, Some(b_at + Duration::days(7)));
}

#[tokio::test]
async fn test_deregistered_record_has_no_service_time() {
    let temp = TempDir::new().unwrap();
    let driver = setup(&temp, 10).await;
    let def = daily();

    let mut record = MetadataRecord::new();
    record.registered_at = Some(time::now() - Duration::days(3));
    record.deregistered_at = Some(time::now());
    driver.index("/data/gone.txt", &record, &[&def]).await.unwrap();

    let entry = driver.entry("/data/gone.txt").await.unwrap().unwrap();
    assert_eq!(entry.service_time, None);

    let due = PathPager::stale_services(driver.clone(), PathFilter::all(), time::now())
        .collect_paths()
        .await
        .unwrap();
    assert!(due.is_empty());
}

#[tokio::test]
async fn test_paging_is_complete_and_ordered() {
    let temp = TempDir::new().unwrap();
    let driver = setup(&temp, 3).await;
    let def = daily();

    // 10 due files, most overdue first: file_9 performed 19 days ago.
    for i in 0..10 {
        let record = performed_days_ago(10 + i, &def);
        driver
            .index(&format!("/data/file_{}.txt", i), &record, &[&def])
            .await
            .unwrap();
    }
    // Not yet due.
    driver
        .index("/data/fresh.txt", &performed_days_ago(0, &def), &[&def])
        .await
        .unwrap();

    let mut pager = PathPager::stale_services(driver.clone(), PathFilter::all(), time::now());
    let mut due = Vec::new();
    while let Some(path) = pager.next_path().await.unwrap() {
        due.push(path);
    }

    let expected: Vec<String> = (0..10).rev().map(|i| format!("/data/file_{}.txt", i)).collect();
    assert_eq!(due, expected);
    assert!(pager.pages_fetched() >= 4);

    let registered = PathPager::registered(driver.clone(), PathFilter::all())
        .collect_paths()
        .await
        .unwrap();
    assert_eq!(registered.len(), 11);
    assert_eq!(registered.last().map(String::as_str), Some("/data/fresh.txt"));
}

#[tokio::test]
async fn test_reindexing_while_paging_does_not_revisit() {
    let temp = TempDir::new().unwrap();
    let driver = setup(&temp, 2).await;
    let def = daily();

    for i in 0..6 {
        driver
            .index(&format!("/data/f{}.txt", i), &performed_days_ago(5 + i, &def), &[&def])
            .await
            .unwrap();
    }

    let mut pager = PathPager::stale_services(driver.clone(), PathFilter::all(), time::now());
    let mut seen = Vec::new();
    while let Some(path) = pager.next_path().await.unwrap() {
        // Perform the service and write the entry back, as the engine does.
        let record = performed_days_ago(0, &def);
        driver.index(&path, &record, &[&def]).await.unwrap();
        seen.push(path);
    }

    seen.sort();
    let mut expected: Vec<String> = (0..6).map(|i| format!("/data/f{}.txt", i)).collect();
    expected.sort();
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn test_prefix_and_exact_filters() {
    let temp = TempDir::new().unwrap();
    let driver = setup(&temp, 10).await;
    let def = daily();
    let record = performed_days_ago(3, &def);

    for path in [
        "/data/loc1/a.txt",
        "/data/loc1/sub/b.txt",
        "/data/loc10/c.txt",
        "/data/other/d.txt",
        "/data/we*rd/e.txt",
    ] {
        driver.index(path, &record, &[&def]).await.unwrap();
    }

    let mut under_loc1 = PathPager::registered(driver.clone(), PathFilter::from_targets(["/data/loc1/"]))
        .collect_paths()
        .await
        .unwrap();
    under_loc1.sort();
    assert_eq!(under_loc1, vec!["/data/loc1/a.txt", "/data/loc1/sub/b.txt"]);

    let mixed = PathPager::stale_services(
        driver.clone(),
        PathFilter::from_targets(["/data/other/d.txt", "/data/we*rd/"]),
        time::now(),
    )
    .collect_paths()
    .await
    .unwrap();
    assert_eq!(mixed.len(), 2);
    assert!(mixed.contains(&"/data/other/d.txt".to_string()));
    assert!(mixed.contains(&"/data/we*rd/e.txt".to_string()));

    // An exact target does not match paths that merely start with it.
    let exact = PathPager::registered(driver.clone(), PathFilter::from_targets(["/data/loc1"]))
        .collect_paths()
        .await
        .unwrap();
    assert!(exact.is_empty());
}

#[tokio::test]
async fn test_clear_index_removes_unrefreshed_entries() {
    let temp = TempDir::new().unwrap();
    let driver = setup(&temp, 10).await;
    let def = daily();
    let record = performed_days_ago(3, &def);

    driver.index("/data/old.txt", &record, &[&def]).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    let start = time::now();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    driver.index("/data/new.txt", &record, &[&def]).await.unwrap();

    let removed = driver.clear_index(start).await.unwrap();
    assert_eq!(removed, 1);
    assert!(driver.entry("/data/old.txt").await.unwrap().is_none());
    assert!(driver.entry("/data/new.txt").await.unwrap().is_some());
}

#[tokio::test]
async fn test_setup_index_drops_existing_entries() {
    let temp = TempDir::new().unwrap();
    let driver = setup(&temp, 10).await;
    let def = daily();
    driver
        .index("/data/a.txt", &performed_days_ago(3, &def), &[&def])
        .await
        .unwrap();
    driver.update_index_state().await.unwrap();

    driver.setup_index().await.unwrap();
    assert!(driver.entry("/data/a.txt").await.unwrap().is_none());
    assert!(driver.is_stale().await.unwrap());
}
