//! Index-backed operation: setup, reindex, and candidate selection.

mod support;

use std::fs;

use support::{sorted, TestEnv, ABC_MD5};
use vigil::commands::{self, parse_checksums, EventOptions};
use vigil::{CandidateLocator, CommandStatus, FileSelector, Strategy, VigilError};
use vigil_model::EventKind;

fn loc1() -> FileSelector {
    FileSelector::from_locations(["loc1"]).unwrap()
}

async fn register_all(ctx: &vigil::AppContext) {
    let options = EventOptions {
        force: false,
        checksums: parse_checksums(&[format!("md5:{}", ABC_MD5)]).unwrap(),
    };
    let status = commands::register(ctx, &loc1(), &options).await.unwrap();
    assert_eq!(status, CommandStatus::Success);
}

#[tokio::test]
async fn test_index_commands_require_configured_index() {
    let env = TestEnv::new();
    let (ctx, _sink) = env.fixity_context(false);

    assert!(matches!(commands::setup_index(&ctx).await, Err(VigilError::Configuration(_))));
    assert!(matches!(commands::reindex(&ctx).await, Err(VigilError::Configuration(_))));
}

#[tokio::test]
async fn test_reindex_is_idempotent_and_drops_vanished_records() {
    let env = TestEnv::new();
    env.write("a.txt", b"abc");
    env.write("b.txt", b"abc");
    env.write("sub/c.txt", b"abc");
    let (ctx, _sink) = env.fixity_context(true);
    commands::setup_index(&ctx).await.unwrap();
    register_all(&ctx).await;

    let driver = ctx.index().unwrap().clone();
    assert!(driver.is_stale().await.unwrap());

    assert_eq!(commands::reindex(&ctx).await.unwrap(), CommandStatus::Success);
    assert!(!driver.is_stale().await.unwrap());
    let key = |rel: &str| env.data.join(rel).to_string_lossy().into_owned();
    let before = driver.entry(&key("a.txt")).await.unwrap().unwrap();

    commands::reindex(&ctx).await.unwrap();
    let after = driver.entry(&key("a.txt")).await.unwrap().unwrap();
    assert_eq!(before.service_time, after.service_time);
    assert!(driver.entry(&key("sub/c.txt")).await.unwrap().is_some());

    fs::remove_file(env.metadata_file("b.txt")).unwrap();
    commands::reindex(&ctx).await.unwrap();
    assert!(driver.entry(&key("b.txt")).await.unwrap().is_none());
    assert!(driver.entry(&key("a.txt")).await.unwrap().is_some());
}

#[tokio::test]
async fn test_stale_index_falls_back_to_filesystem() {
    let env = TestEnv::new();
    env.write("a.txt", b"abc");
    let (ctx, _sink) = env.fixity_context(true);
    commands::setup_index(&ctx).await.unwrap();
    register_all(&ctx).await;

    let locator = CandidateLocator::new(&ctx, &loc1(), EventKind::Verify, false).await.unwrap();
    assert_eq!(locator.strategy(), Strategy::Filesystem);

    commands::reindex(&ctx).await.unwrap();
    let locator = CandidateLocator::new(&ctx, &loc1(), EventKind::Verify, false).await.unwrap();
    assert_eq!(locator.strategy(), Strategy::Index);

    let locator = CandidateLocator::new(&ctx, &loc1(), EventKind::Register, false).await.unwrap();
    assert_eq!(locator.strategy(), Strategy::Filesystem);
}

#[tokio::test]
async fn test_verify_through_index_visits_only_due_files() {
    let env = TestEnv::new();
    for name in ["a.txt", "b.txt", "c.txt", "d.txt", "e.txt"] {
        env.write(name, b"abc");
    }
    let (ctx, sink) = env.fixity_context(true);
    commands::setup_index(&ctx).await.unwrap();
    register_all(&ctx).await;
    commands::reindex(&ctx).await.unwrap();

    let status = commands::verify(&ctx, &loc1(), &EventOptions::default()).await.unwrap();
    assert_eq!(status, CommandStatus::Success);
    assert_eq!(sink.count(vigil::OutcomeKind::Success), 5 * 2 + 5);
    for name in ["a.txt", "b.txt", "c.txt", "d.txt", "e.txt"] {
        assert!(env.metadata(name).service("fixity").unwrap().timestamp.is_some());
    }

    let locator = CandidateLocator::new(&ctx, &loc1(), EventKind::Verify, false).await.unwrap();
    assert_eq!(locator.strategy(), Strategy::Index);
    assert!(locator.collect_paths().await.unwrap().is_empty());

    let locator = CandidateLocator::new(&ctx, &loc1(), EventKind::Verify, true).await.unwrap();
    assert_eq!(locator.collect_paths().await.unwrap().len(), 5);
}

#[tokio::test]
async fn test_forced_candidates_match_filesystem_scan() {
    let env = TestEnv::new();
    env.write("a.txt", b"abc");
    env.write("sub/b.txt", b"abc");
    env.write("sub/deep/c.txt", b"abc");
    env.write("bag/one.txt", b"abc");
    env.write("bag/two.txt", b"abc");

    let (indexed, _sink) = env.fixity_context(true);
    commands::setup_index(&indexed).await.unwrap();
    for target in ["a.txt", "sub/b.txt", "sub/deep/c.txt", "bag"] {
        let selector = FileSelector::from_paths([env.path_arg(target)]).unwrap();
        commands::register(&indexed, &selector, &EventOptions::default()).await.unwrap();
    }
    let gone = FileSelector::from_paths([env.path_arg("sub/b.txt")]).unwrap();
    commands::deregister(&indexed, &gone, &EventOptions::default()).await.unwrap();
    commands::reindex(&indexed).await.unwrap();

    let (plain, _sink) = env.fixity_context(false);
    let sub_tree = FileSelector::from_paths([format!("{}/", env.path_arg("sub"))]).unwrap();
    for selector in [loc1(), sub_tree] {
        let from_index = CandidateLocator::new(&indexed, &selector, EventKind::Preserve, true)
            .await
            .unwrap();
        assert_eq!(from_index.strategy(), Strategy::Index);
        let from_disk = CandidateLocator::new(&plain, &selector, EventKind::Preserve, true)
            .await
            .unwrap();
        assert_eq!(from_disk.strategy(), Strategy::Filesystem);

        assert_eq!(
            sorted(from_index.collect_paths().await.unwrap()),
            sorted(from_disk.collect_paths().await.unwrap())
        );
    }
}
