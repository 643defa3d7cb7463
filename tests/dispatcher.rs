// tests/dispatcher.rs

mod common;
use crate::common::builders::{ConfigFileBuilder, RuleBuilder};
use crate::common::fakes::DenyUsers;
use crate::common::{engine_with_access, engine_with_rules, init_tracing};

use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use tokio::time::{Duration, Instant};

use vgrid_events::engine::{DispatchOutcome, LimitField};
use vgrid_events::exec::CommandOp;
use vgrid_events::fs::FileSystem;
use vgrid_events::fs::mock::MockFileSystem;
use vgrid_events::rules::limits::MAX_SETTLE_SECS;
use vgrid_events::types::Change;
use vgrid_events::watch::{Event, WatchService};

type TestResult = Result<(), Box<dyn Error>>;

fn touch_rule(rule_id: &str, path: &str) -> RuleBuilder {
    RuleBuilder::new(rule_id, path, "command")
        .argument("touch")
        .argument("+TRIGGERPATH+.seen")
}

#[tokio::test]
async fn rate_limit_suppresses_third_event_but_records_it() -> TestResult {
    init_tracing();
    let fs = Arc::new(MockFileSystem::new());
    fs.add_file("/data/Project/data.csv", "a,b");
    let rule = touch_rule("csv", "*.csv").rate_limit("2/m").build("Project");
    let (engine, fakes) =
        engine_with_rules(&fs, ConfigFileBuilder::new().build(), "Project", vec![rule.clone()]);

    let mut outcomes = Vec::new();
    for ts in [1000.0, 1004.0, 1009.0] {
        let event = Event::created("/data/Project/data.csv", false).at(ts);
        outcomes.push(engine.ingest(event).await);
    }
    engine.wait_idle().await;

    assert_eq!(outcomes[0].queued, 1);
    assert_eq!(outcomes[1].queued, 1);
    assert_eq!(outcomes[2].queued, 0);
    assert_eq!(outcomes[2].limited, 1);

    let calls = fakes.commands.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].op, CommandOp::Touch);
    assert_eq!(calls[0].args, vec!["data.csv.seen".to_string()]);

    // The suppressed event still lands in history.
    assert_eq!(engine.history().records(&rule).len(), 3);
    let detail = engine
        .history()
        .describe(&rule, Path::new("/data/Project/data.csv"), LimitField::RateLimit);
    assert!(detail.contains("found 3 entries"), "got: {detail}");
    Ok(())
}

#[tokio::test]
async fn rate_limit_is_per_path() -> TestResult {
    let fs = Arc::new(MockFileSystem::new());
    let rule = touch_rule("csv", "*.csv").rate_limit("1/h").build("Project");
    let (engine, fakes) =
        engine_with_rules(&fs, ConfigFileBuilder::new().build(), "Project", vec![rule]);

    engine.ingest(Event::created("/data/Project/a.csv", false).at(10.0)).await;
    engine.ingest(Event::created("/data/Project/b.csv", false).at(11.0)).await;
    engine.ingest(Event::created("/data/Project/a.csv", false).at(12.0)).await;
    engine.wait_idle().await;

    let mut args: Vec<String> = fakes
        .commands
        .calls()
        .into_iter()
        .flat_map(|c| c.args)
        .collect();
    args.sort();
    assert_eq!(args, vec!["a.csv.seen".to_string(), "b.csv.seen".to_string()]);
    Ok(())
}

#[tokio::test]
async fn change_outside_rule_changes_never_fires() -> TestResult {
    let fs = Arc::new(MockFileSystem::new());
    fs.add_file("/data/Project/data.csv", "x");
    let rule = touch_rule("csv", "*.csv").changes(&["created"]).build("Project");
    let (engine, fakes) =
        engine_with_rules(&fs, ConfigFileBuilder::new().build(), "Project", vec![rule]);

    for change in [Change::Modified, Change::Deleted] {
        let outcome = engine
            .ingest(Event::new("/data/Project/data.csv", change, false))
            .await;
        assert_eq!(outcome.matched, 0, "{change} must not match");
    }
    engine.wait_idle().await;
    assert!(fakes.commands.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn access_only_modification_is_skipped_without_history() -> TestResult {
    let fs = Arc::new(MockFileSystem::new());
    fs.add_file("/data/Project/out.bin", "bytes");
    // Written long ago, read just now.
    fs.set_times("/data/Project/out.bin", 1000.0, 1990.0);
    let rule = touch_rule("bin", "*.bin").changes(&["modified"]).build("Project");
    let (engine, fakes) =
        engine_with_rules(&fs, ConfigFileBuilder::new().build(), "Project", vec![rule.clone()]);

    let outcome = engine
        .ingest(Event::modified("/data/Project/out.bin", false).at(2000.0))
        .await;
    assert!(outcome.access_only);
    assert_eq!(outcome.queued, 0);
    assert!(engine.history().records(&rule).is_empty());

    // A fresh write within the slack window is a real modification.
    fs.set_times("/data/Project/out.bin", 2000.5, 1990.0);
    let outcome = engine
        .ingest(Event::modified("/data/Project/out.bin", false).at(2001.0))
        .await;
    assert!(!outcome.access_only);
    assert_eq!(outcome.queued, 1);
    engine.wait_idle().await;
    assert_eq!(fakes.commands.calls().len(), 1);
    Ok(())
}

#[tokio::test]
async fn directory_and_recursive_filters() -> TestResult {
    let fs = Arc::new(MockFileSystem::new());
    let flat = touch_rule("flat", "*.csv").build("Project");
    let deep = touch_rule("deep", "*.csv").match_recursive(true).build("Project");
    let dirs = touch_rule("dirs", "*")
        .match_dirs(true)
        .match_files(false)
        .build("Project");
    let (engine, _fakes) = engine_with_rules(
        &fs,
        ConfigFileBuilder::new().build(),
        "Project",
        vec![flat, deep, dirs],
    );

    let top = engine.ingest(Event::created("/data/Project/a.csv", false)).await;
    assert_eq!(top.matched, 2, "flat and deep match a top level file");

    let nested = engine
        .ingest(Event::created("/data/Project/sub/a.csv", false))
        .await;
    assert_eq!(nested.matched, 1, "only the recursive rule matches below");

    fs.add_dir("/data/Project/newdir");
    let dir = engine
        .ingest(Event::created("/data/Project/newdir", true))
        .await;
    assert_eq!(dir.matched, 1, "only the directory rule matches a directory");

    engine.wait_idle().await;
    Ok(())
}

#[tokio::test]
async fn rule_owner_without_access_is_ignored() -> TestResult {
    let fs = Arc::new(MockFileSystem::new());
    let rule = touch_rule("csv", "*.csv").run_as("mallory").build("Project");
    let (engine, fakes) = engine_with_access(
        &fs,
        ConfigFileBuilder::new().build(),
        "Project",
        vec![rule],
        Arc::new(DenyUsers::new(&["mallory"])),
    );

    let outcome = engine.ingest(Event::created("/data/Project/a.csv", false)).await;
    assert_eq!(outcome, DispatchOutcome::default());
    engine.wait_idle().await;
    assert!(fakes.commands.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn unmatched_events_hit_the_miss_cache() -> TestResult {
    let fs = Arc::new(MockFileSystem::new());
    let rule = touch_rule("csv", "*.csv").build("Project");
    let (engine, _fakes) =
        engine_with_rules(&fs, ConfigFileBuilder::new().build(), "Project", vec![rule]);

    let first = engine.ingest(Event::created("/data/Project/a.txt", false)).await;
    assert!(!first.cached_miss);
    let second = engine.ingest(Event::created("/data/Project/a.txt", false)).await;
    assert!(second.cached_miss);

    // Reloading rules invalidates cached misses.
    let txt = touch_rule("txt", "*.txt").build("Project");
    engine.reload_rules("Project", vec![txt]);
    let third = engine.ingest(Event::created("/data/Project/a.txt", false)).await;
    assert!(!third.cached_miss);
    assert_eq!(third.queued, 1);
    engine.wait_idle().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn settle_time_fires_once_after_activity_stops() -> TestResult {
    let fs = Arc::new(MockFileSystem::new());
    let rule = touch_rule("settle", "out.bin")
        .changes(&["created", "modified", "deleted"])
        .settle_time("5s")
        .build("Project");
    let (engine, fakes) =
        engine_with_rules(&fs, ConfigFileBuilder::new().build(), "Project", vec![rule]);

    let start = Instant::now();
    let first = engine
        .ingest(Event::created("/data/Project/out.bin", false).at(100.0))
        .await;
    let second = engine
        .ingest(Event::deleted("/data/Project/out.bin", false).at(103.0))
        .await;
    assert_eq!(first.queued, 1);
    assert_eq!(second.limited, 1, "second event falls inside the settle window");

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(fakes.commands.calls().is_empty(), "must not fire at t=5s");

    engine.wait_idle().await;
    let elapsed = start.elapsed();
    assert_eq!(fakes.commands.calls().len(), 1);
    assert!(elapsed >= Duration::from_secs(8), "fired after {elapsed:?}");
    assert!(elapsed < Duration::from_millis(8500), "fired after {elapsed:?}");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn settling_job_still_runs_during_shutdown_grace() -> TestResult {
    let fs = Arc::new(MockFileSystem::new());
    let rule = touch_rule("settle", "*.csv").settle_time("1s").build("Project");
    let (engine, fakes) =
        engine_with_rules(&fs, ConfigFileBuilder::new().build(), "Project", vec![rule]);

    let outcome = engine
        .ingest(Event::created("/data/Project/a.csv", false).at(100.0))
        .await;
    assert_eq!(outcome.queued, 1);

    engine.shutdown(Duration::from_secs(10)).await;
    assert_eq!(fakes.commands.calls().len(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn absurd_settle_time_is_clamped_not_fatal() -> TestResult {
    let fs = Arc::new(MockFileSystem::new());
    let rule = touch_rule("settle", "*.csv").settle_time("1e300s").build("Project");
    assert_eq!(rule.settle_secs, MAX_SETTLE_SECS);
    let (engine, fakes) =
        engine_with_rules(&fs, ConfigFileBuilder::new().build(), "Project", vec![rule]);

    engine
        .ingest(Event::created("/data/Project/a.csv", false).at(100.0))
        .await;
    engine.wait_idle().await;
    assert_eq!(fakes.commands.calls().len(), 1);
    Ok(())
}

#[tokio::test]
async fn directory_moved_out_of_the_tree_is_forgotten() -> TestResult {
    let fs = Arc::new(MockFileSystem::new());
    fs.add_dir("/data/Project/sub");
    let gone = touch_rule("gone", "*")
        .match_dirs(true)
        .match_files(false)
        .changes(&["deleted"])
        .build("Project");
    let (engine, fakes) =
        engine_with_rules(&fs, ConfigFileBuilder::new().build(), "Project", vec![gone]);
    let sub = Path::new("/data/Project/sub");

    engine.ingest(Event::created(sub, true)).await;
    assert!(fakes.watch.is_watched(sub));
    assert!(engine.dir_cache().get(sub).is_some());

    // A rename away reports the old path without knowing what it was.
    fs.remove_dir_all(sub)?;
    let outcome = engine.ingest(Event::deleted(sub, false)).await;
    assert_eq!(outcome.matched, 1, "directory rule sees the deletion");
    assert!(!fakes.watch.is_watched(sub));
    assert!(engine.dir_cache().get(sub).is_none());

    // Re-created at the same path, it is watched again.
    fs.add_dir(sub);
    engine.ingest(Event::created(sub, true)).await;
    assert!(fakes.watch.is_watched(sub));

    engine.wait_idle().await;
    Ok(())
}

#[tokio::test]
async fn reload_forgets_history_of_dropped_rules_only() -> TestResult {
    let fs = Arc::new(MockFileSystem::new());
    let kept = touch_rule("kept", "*.csv").build("Project");
    let dropped = touch_rule("dropped", "*.csv").build("Project");
    let (engine, _fakes) = engine_with_rules(
        &fs,
        ConfigFileBuilder::new().build(),
        "Project",
        vec![kept.clone(), dropped.clone()],
    );

    engine.ingest(Event::created("/data/Project/a.csv", false)).await;
    engine.wait_idle().await;
    assert_eq!(engine.history().records(&dropped).len(), 1);

    engine.reload_rules("Project", vec![kept.clone()]);
    assert_eq!(engine.history().records(&kept).len(), 1);
    assert!(engine.history().records(&dropped).is_empty());
    Ok(())
}
