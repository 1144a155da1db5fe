mod common;

use capsules_container_step::{
    ContainerLifecycle, ContainerSettings, ContainerSpec, ExecError, TeardownPolicy,
};
use common::{Call, FakeEngine};
use std::sync::Arc;

fn spec() -> ContainerSpec {
    ContainerSpec::assemble(
        &ContainerSettings::new("registry.local/etl:1.4"),
        vec!["true".to_string()],
        std::path::Path::new("/var/tmp/steptmp-test"),
    )
    .unwrap()
}

fn lifecycle(engine: &Arc<FakeEngine>, force_pull: bool) -> ContainerLifecycle {
    ContainerLifecycle::new(engine.clone(), force_pull, TeardownPolicy::Remove)
}

#[tokio::test]
async fn present_image_is_not_pulled() {
    let engine = Arc::new(FakeEngine::new());
    lifecycle(&engine, false).run(&spec()).await.unwrap();

    assert_eq!(engine.count(|c| matches!(c, Call::ImageExists(_))), 1);
    assert_eq!(engine.count(|c| matches!(c, Call::Pull(_))), 0);
}

#[tokio::test]
async fn missing_image_is_pulled_once() {
    let engine = Arc::new(FakeEngine::new().image_missing());
    lifecycle(&engine, false).run(&spec()).await.unwrap();

    assert_eq!(engine.count(|c| matches!(c, Call::Pull(_))), 1);
}

#[tokio::test]
async fn force_pull_skips_presence_check() {
    let engine = Arc::new(FakeEngine::new());
    lifecycle(&engine, true).run(&spec()).await.unwrap();

    assert_eq!(engine.count(|c| matches!(c, Call::ImageExists(_))), 0);
    assert_eq!(engine.count(|c| matches!(c, Call::Pull(_))), 1);
}

#[tokio::test]
async fn pull_failure_stops_before_create() {
    let engine = Arc::new(FakeEngine::new().image_missing().pull_fails("manifest unknown"));
    let err = lifecycle(&engine, false).run(&spec()).await.unwrap_err();

    match err {
        ExecError::ImagePull { image, source } => {
            assert_eq!(image, "registry.local/etl:1.4");
            assert_eq!(source.message, "manifest unknown");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(engine.created_specs().is_empty());
}

#[tokio::test]
async fn create_failure_has_nothing_to_tear_down() {
    let engine = Arc::new(FakeEngine::new().create_fails("name conflict"));
    let err = lifecycle(&engine, false).run(&spec()).await.unwrap_err();

    assert_eq!(err.code(), "STEP_EXEC_CONTAINER_CREATE");
    assert_eq!(engine.count(|c| matches!(c, Call::Start(_))), 0);
    assert!(engine.removed().is_empty());
}

#[tokio::test]
async fn start_failure_still_removes_container() {
    let engine = Arc::new(FakeEngine::new().start_fails("port already allocated"));
    let err = lifecycle(&engine, false).run(&spec()).await.unwrap_err();

    assert_eq!(err.code(), "STEP_EXEC_CONTAINER_START");
    assert_eq!(engine.removed().len(), 1);
    assert_eq!(engine.count(|c| matches!(c, Call::Wait(_))), 0);
}

#[tokio::test]
async fn output_and_exit_status_are_both_collected() {
    let engine = Arc::new(
        FakeEngine::new().with_output(&["first line", "  second line  ", "", "third"]),
    );
    let result = lifecycle(&engine, false).run(&spec()).await.unwrap();

    assert_eq!(result.exit_status, 0);
    assert_eq!(result.output.lines(), ["first line", "second line", "third"]);
    assert_eq!(engine.count(|c| matches!(c, Call::Logs(_))), 1);
    assert_eq!(engine.count(|c| matches!(c, Call::Wait(_))), 1);
}

#[tokio::test]
async fn aborted_run_removes_container() {
    let engine = Arc::new(FakeEngine::new().hang());
    let task = {
        let engine = engine.clone();
        tokio::spawn(async move {
            let lifecycle = ContainerLifecycle::new(engine, false, TeardownPolicy::Remove);
            lifecycle.run(&spec()).await
        })
    };

    assert!(engine.wait_for(|c| matches!(c, Call::Wait(_))).await);
    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());

    assert!(engine.wait_for(|c| matches!(c, Call::Remove(_))).await);
}

#[tokio::test]
async fn aborted_run_with_keep_policy_kills_container() {
    let engine = Arc::new(FakeEngine::new().hang());
    let task = {
        let engine = engine.clone();
        tokio::spawn(async move {
            let lifecycle = ContainerLifecycle::new(engine, false, TeardownPolicy::Keep);
            lifecycle.run(&spec()).await
        })
    };

    assert!(engine.wait_for(|c| matches!(c, Call::Wait(_))).await);
    task.abort();
    let _ = task.await;

    assert!(engine.wait_for(|c| matches!(c, Call::Kill(_))).await);
    assert!(engine.removed().is_empty());
}

#[tokio::test]
async fn abort_during_removal_still_removes_container() {
    let engine = Arc::new(FakeEngine::new().stall_first_remove());
    let task = {
        let engine = engine.clone();
        tokio::spawn(async move {
            let lifecycle = ContainerLifecycle::new(engine, false, TeardownPolicy::Remove);
            lifecycle.run(&spec()).await
        })
    };

    // The container exited and teardown is stuck inside its first removal.
    assert!(engine.wait_for(|c| matches!(c, Call::Remove(_))).await);
    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());

    assert!(engine.wait_for_count(2, |c| matches!(c, Call::Remove(_))).await);
    let removed = engine.removed();
    assert_eq!(removed[0], removed[1]);
}

#[tokio::test]
async fn failed_removal_does_not_replace_result() {
    let engine = Arc::new(
        FakeEngine::new()
            .with_output(&["done"])
            .remove_fails("device or resource busy"),
    );
    let result = lifecycle(&engine, false).run(&spec()).await.unwrap();

    assert_eq!(result.exit_status, 0);
    assert_eq!(result.output.lines(), ["done"]);
    assert_eq!(engine.removed().len(), 1);
}
