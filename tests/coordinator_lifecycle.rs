use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::anyhow;
use cluster_exec::errors::{ExecError, LockError};
use cluster_exec::exec::{JobSpec, POST_EXEC_DIVIDER};
use cluster_exec::history::{COMMAND_STRING, COMMAND_YAML};
use cluster_exec::types::ExecutionOutcome;
use cluster_exec_test_utils::builders::{TestEnv, recap_output, replay_job, shell_job};
use cluster_exec_test_utils::fake_ledger::FailingLedger;
use cluster_exec_test_utils::{init_tracing, with_timeout};

const HEALTHY: &[&str] = &[
    "node1 : ok=5 changed=2 unreachable=0 failed=0 skipped=1 rescued=0 ignored=0",
    "node2 : ok=5 changed=2 unreachable=0 failed=0 skipped=1 rescued=0 ignored=0",
];

const ONE_FAILED: &[&str] = &[
    "node1 : ok=5 changed=2 unreachable=0 failed=0",
    "node2 : ok=2 changed=0 unreachable=0 failed=1",
];

fn read_log(path: &Path) -> String {
    fs::read_to_string(path).expect("read run log")
}

fn assert_cluster_free(env: &TestEnv, cluster: &str) {
    let lock = env.locks().acquire(cluster);
    assert!(lock.is_ok(), "cluster lock leaked: {:?}", lock.err());
}

#[tokio::test]
async fn test_successful_run_records_ledger_once() {
    init_tracing();
    let env = TestEnv::new();
    let fixture = env.write_fixture("recap.txt", &recap_output(HEALTHY));

    let job = replay_job("prod", "install", &fixture, 0)
        .with_post_exec(|outcome| Ok(format!("hook saw {} nodes\n", outcome.nodes.len())));

    let handle = with_timeout(env.coordinator.exec(job)).await.unwrap();
    let run_id = handle.run_id().to_string();
    let run_dir = handle.run_dir().to_path_buf();
    let log_path = handle.log_path();

    assert!(run_id.ends_with("_install"));
    assert_eq!(run_dir, env.history().history_dir("prod").join(&run_id));

    let outcome = with_timeout(handle.wait()).await.expect("post hook was registered");

    assert!(outcome.success);
    assert_eq!(outcome.nodes.len(), 2);
    assert_eq!(outcome.run_id, run_id);
    assert_eq!(outcome.run_dir, run_dir);
    assert_eq!(outcome.exit_code, Some(0));

    let successes = env.ledger.for_cluster("prod");
    assert_eq!(successes.len(), 1);
    assert_eq!(successes[0].run_id, run_id);
    assert_eq!(successes[0].job_type, "install");

    let log = read_log(&log_path);
    assert!(log.contains("node2 : ok=5"));
    assert!(log.contains(POST_EXEC_DIVIDER));
    assert!(log.ends_with("hook saw 2 nodes\n"));

    assert!(run_dir.join(COMMAND_STRING).is_file());
    assert!(run_dir.join(COMMAND_YAML).is_file());

    assert_cluster_free(&env, "prod");
}

#[tokio::test]
async fn test_failed_recap_never_records_success() {
    init_tracing();
    let env = TestEnv::new();
    let fixture = env.write_fixture("recap.txt", &recap_output(ONE_FAILED));

    let job = replay_job("prod", "install", &fixture, 0).with_post_exec(|_| Ok(String::new()));
    let handle = with_timeout(env.coordinator.exec(job)).await.unwrap();
    let outcome = with_timeout(handle.wait()).await.unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.nodes[1].failed, "1");
    assert!(env.ledger.entries().is_empty());
    assert_cluster_free(&env, "prod");
}

#[tokio::test]
async fn test_without_post_hook_recap_and_ledger_are_skipped() {
    init_tracing();
    let env = TestEnv::new();
    let fixture = env.write_fixture("recap.txt", &recap_output(HEALTHY));

    let handle = with_timeout(env.coordinator.exec(replay_job("prod", "install", &fixture, 0)))
        .await
        .unwrap();
    let log_path = handle.log_path();

    assert_eq!(with_timeout(handle.wait()).await, None);

    assert!(env.ledger.entries().is_empty());
    assert!(!read_log(&log_path).contains(POST_EXEC_DIVIDER));
    assert_cluster_free(&env, "prod");
}

#[tokio::test]
async fn test_exec_returns_once_started_not_once_finished() {
    init_tracing();
    let env = TestEnv::new();
    let fixture = env.write_fixture("recap.txt", &recap_output(HEALTHY));

    let job = replay_job("prod", "install", &fixture, 2).with_post_exec(|_| Ok(String::new()));

    let started = Instant::now();
    let handle = with_timeout(env.coordinator.exec(job)).await.unwrap();
    assert!(
        started.elapsed() < Duration::from_millis(1500),
        "exec blocked for {:?}",
        started.elapsed()
    );
    assert!(!handle.is_finished());

    // While the job runs the cluster is held and the lock names the run.
    let status = env.locks().inspect("prod").unwrap();
    assert!(status.held);
    assert_eq!(status.run_id.as_deref(), Some(handle.run_id()));

    let second = with_timeout(env.coordinator.exec(shell_job("prod", "upgrade", "true"))).await;
    match second {
        Err(ExecError::Lock(LockError::Busy { cluster })) => assert_eq!(cluster, "prod"),
        other => panic!("expected busy cluster, got {:?}", other.map(|h| h.run_id().to_string())),
    }

    let outcome = with_timeout(handle.wait()).await.unwrap();
    assert!(outcome.success);
    assert!(started.elapsed() >= Duration::from_secs(2));
    assert_cluster_free(&env, "prod");
}

#[tokio::test]
async fn test_busy_cluster_is_reported_without_side_effects() {
    init_tracing();
    let env = TestEnv::new();
    let _held = env.locks().acquire("prod").unwrap();
    let marker = env.root.path().join("ran");

    let job = shell_job("prod", "install", &format!("touch '{}'", marker.display()));
    let result = with_timeout(env.coordinator.exec(job)).await;

    assert!(matches!(result, Err(ExecError::Lock(LockError::Busy { .. }))));
    assert!(env.history().list_runs("prod").unwrap().is_empty());
    assert!(!marker.exists());
}

#[tokio::test]
async fn test_pre_hook_failure_aborts_before_spawn() {
    init_tracing();
    let env = TestEnv::new();
    let marker = env.root.path().join("ran");

    let job = shell_job("prod", "install", &format!("touch '{}'", marker.display()))
        .with_pre_exec(|_| Err(anyhow!("inventory missing")));
    let result = with_timeout(env.coordinator.exec(job)).await;

    match result {
        Err(err @ ExecError::PreHook(_)) => {
            assert!(err.to_string().contains("inventory missing"), "{err}");
        }
        other => panic!("expected PreHook error, got {:?}", other.map(|h| h.run_id().to_string())),
    }

    // Give a stray process a chance to show up before checking.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!marker.exists());
    assert_cluster_free(&env, "prod");
}

#[tokio::test]
async fn test_pre_hook_prepares_run_dir_used_by_args() {
    init_tracing();
    let env = TestEnv::new();
    let recap = recap_output(HEALTHY);

    let job = JobSpec::new("prod", "install", "/bin/cat")
        .with_templated_args(["{run_dir}/inventory.txt"])
        .with_pre_exec(move |run_dir| {
            fs::write(run_dir.join("inventory.txt"), recap)?;
            Ok(())
        })
        .with_post_exec(|_| Ok(String::new()));

    let handle = with_timeout(env.coordinator.exec(job)).await.unwrap();
    let outcome = with_timeout(handle.wait()).await.unwrap();

    assert!(outcome.success);
    assert_eq!(env.ledger.entries().len(), 1);
}

#[tokio::test]
async fn test_spawn_failure_removes_run_dir_and_releases_lock() {
    init_tracing();
    let env = TestEnv::new();

    let job = JobSpec::new("prod", "install", "/nonexistent/definitely-not-a-tool")
        .with_templated_args(["--flag"]);
    let result = with_timeout(env.coordinator.exec(job)).await;

    match result {
        Err(ExecError::Spawn { command, .. }) => {
            assert_eq!(command, "/nonexistent/definitely-not-a-tool --flag");
        }
        other => panic!("expected Spawn error, got {:?}", other.map(|h| h.run_id().to_string())),
    }
    assert!(env.history().list_runs("prod").unwrap().is_empty());
    assert_cluster_free(&env, "prod");
}

#[tokio::test]
async fn test_missing_recap_is_reported_as_failure() {
    init_tracing();
    let env = TestEnv::new();
    let seen: Arc<Mutex<Option<ExecutionOutcome>>> = Arc::new(Mutex::new(None));
    let seen_in_hook = Arc::clone(&seen);

    let job = shell_job("prod", "install", "echo 'ERROR! the playbook could not be found'")
        .with_post_exec(move |outcome| {
            *seen_in_hook.lock().unwrap() = Some(outcome.clone());
            Ok(String::new())
        });
    let handle = with_timeout(env.coordinator.exec(job)).await.unwrap();
    let log_path = handle.log_path();
    let outcome = with_timeout(handle.wait()).await.unwrap();

    assert!(!outcome.success);
    assert!(outcome.nodes.is_empty());
    assert_eq!(seen.lock().unwrap().as_ref(), Some(&outcome));
    assert!(env.ledger.entries().is_empty());

    let log = read_log(&log_path);
    assert!(log.contains("the playbook could not be found"));
    assert!(log.contains("Error in recap: recap banner not found"), "{log}");
    assert_cluster_free(&env, "prod");
}

#[tokio::test]
async fn test_post_hook_error_is_logged_not_propagated() {
    init_tracing();
    let env = TestEnv::new();
    let fixture = env.write_fixture("recap.txt", &recap_output(HEALTHY));

    let job = replay_job("prod", "install", &fixture, 0)
        .with_post_exec(|_| Err(anyhow!("could not update inventory")));
    let handle = with_timeout(env.coordinator.exec(job)).await.unwrap();
    let log_path = handle.log_path();
    let outcome = with_timeout(handle.wait()).await.unwrap();

    assert!(outcome.success);
    assert_eq!(env.ledger.entries().len(), 1);
    assert!(read_log(&log_path).contains("Error in post-exec hook: could not update inventory"));
    assert_cluster_free(&env, "prod");
}

#[tokio::test]
async fn test_ledger_failure_is_logged_not_propagated() {
    init_tracing();
    let ledger = Arc::new(FailingLedger::new());
    let env = TestEnv::with_ledger(ledger.clone());
    let fixture = env.write_fixture("recap.txt", &recap_output(HEALTHY));

    let job = replay_job("prod", "install", &fixture, 0).with_post_exec(|_| Ok(String::new()));
    let handle = with_timeout(env.coordinator.exec(job)).await.unwrap();
    let log_path = handle.log_path();
    let outcome = with_timeout(handle.wait()).await.unwrap();

    assert!(outcome.success);
    assert_eq!(ledger.attempts(), 1);
    assert!(read_log(&log_path).contains("Error in success ledger: ledger unavailable"));
    assert_cluster_free(&env, "prod");
}

#[tokio::test]
async fn test_artifact_failure_does_not_abort_started_run() {
    init_tracing();
    let env = TestEnv::new();
    let fixture = env.write_fixture("recap.txt", &recap_output(HEALTHY));

    // A directory where command.yaml should go makes that write fail.
    let job = replay_job("prod", "install", &fixture, 0)
        .with_pre_exec(|run_dir| {
            fs::create_dir(run_dir.join(COMMAND_YAML))?;
            Ok(())
        })
        .with_post_exec(|_| Ok(String::new()));

    let handle = with_timeout(env.coordinator.exec(job)).await.unwrap();
    let run_dir = handle.run_dir().to_path_buf();
    let outcome = with_timeout(handle.wait()).await.unwrap();

    assert!(outcome.success);
    assert_eq!(env.ledger.entries().len(), 1);
    assert!(run_dir.join(COMMAND_STRING).is_file());
    assert!(run_dir.join(COMMAND_YAML).is_dir());
}

#[tokio::test]
async fn test_environment_and_working_dir_are_applied() {
    init_tracing();
    let env = TestEnv::new();
    let workdir = env.root.path().join("playbooks");
    fs::create_dir_all(&workdir).unwrap();
    fs::write(workdir.join("recap.txt"), recap_output(HEALTHY)).unwrap();

    let job = shell_job("prod", "install", "echo \"greeting=$GREETING home=${HOME:-unset}\"; cat recap.txt")
        .with_dir(&workdir)
        .with_env("GREETING=hello")
        .with_env("PATH=/usr/bin:/bin")
        .with_env("not-a-pair")
        .with_post_exec(|_| Ok(String::new()));

    let handle = with_timeout(env.coordinator.exec(job)).await.unwrap();
    let log_path = handle.log_path();
    let outcome = with_timeout(handle.wait()).await.unwrap();

    assert!(outcome.success);
    let log = read_log(&log_path);
    assert!(log.contains("greeting=hello home=unset"), "{log}");
}

#[tokio::test]
async fn test_stderr_and_exit_code_are_captured() {
    init_tracing();
    let env = TestEnv::new();
    let fixture = env.write_fixture("recap.txt", &recap_output(HEALTHY));

    let script = format!("echo 'warning on stderr' >&2; cat '{}'; exit 3", fixture.display());
    let job = shell_job("prod", "install", &script).with_post_exec(|_| Ok(String::new()));

    let handle = with_timeout(env.coordinator.exec(job)).await.unwrap();
    let log_path = handle.log_path();
    let outcome = with_timeout(handle.wait()).await.unwrap();

    assert_eq!(outcome.exit_code, Some(3));
    assert!(outcome.success, "verdict comes from the recap");
    assert!(read_log(&log_path).contains("warning on stderr"));
}

#[tokio::test]
async fn test_different_clusters_run_concurrently() {
    init_tracing();
    let env = TestEnv::new();
    let fixture = env.write_fixture("recap.txt", &recap_output(HEALTHY));

    let a = with_timeout(
        env.coordinator
            .exec(replay_job("alpha", "install", &fixture, 1).with_post_exec(|_| Ok(String::new()))),
    )
    .await
    .unwrap();
    let b = with_timeout(
        env.coordinator
            .exec(replay_job("beta", "install", &fixture, 1).with_post_exec(|_| Ok(String::new()))),
    )
    .await
    .unwrap();

    assert!(with_timeout(a.wait()).await.unwrap().success);
    assert!(with_timeout(b.wait()).await.unwrap().success);

    assert_eq!(env.ledger.for_cluster("alpha").len(), 1);
    assert_eq!(env.ledger.for_cluster("beta").len(), 1);
}

#[tokio::test]
async fn test_sequential_runs_on_same_cluster_get_distinct_dirs() {
    init_tracing();
    let env = TestEnv::new();
    let fixture = env.write_fixture("recap.txt", &recap_output(HEALTHY));

    let mut run_ids = Vec::new();
    for _ in 0..3 {
        let job = replay_job("prod", "install", &fixture, 0).with_post_exec(|_| Ok(String::new()));
        let handle = with_timeout(env.coordinator.exec(job)).await.unwrap();
        run_ids.push(handle.run_id().to_string());
        with_timeout(handle.wait()).await.unwrap();
    }

    assert_eq!(env.history().list_runs("prod").unwrap(), run_ids);
    assert_eq!(env.ledger.for_cluster("prod").len(), 3);
}

#[tokio::test]
async fn test_invalid_job_type_is_rejected_before_locking() {
    init_tracing();
    let env = TestEnv::new();
    let marker = env.root.path().join("ran");

    let job = shell_job("prod", "x/../../../escaped", &format!("touch '{}'", marker.display()));
    let result = with_timeout(env.coordinator.exec(job)).await;

    match result {
        Err(ExecError::InvalidJobType(job_type)) => assert_eq!(job_type, "x/../../../escaped"),
        other => panic!("expected InvalidJobType, got {:?}", other.map(|h| h.run_id().to_string())),
    }
    assert!(!marker.exists());
    assert!(!env.config.data_dir().exists(), "no directories are created");
    assert!(!env.locks().lock_path("prod").exists(), "lock was never taken");
}

#[tokio::test]
async fn test_slow_pre_hook_does_not_stall_the_runtime() {
    init_tracing();
    let env = TestEnv::new();
    let fixture = env.write_fixture("recap.txt", &recap_output(HEALTHY));

    let ticks = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let ticker = {
        let ticks = Arc::clone(&ticks);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(10)).await;
                ticks.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }
        })
    };

    let job = replay_job("prod", "install", &fixture, 0)
        .with_pre_exec(|_| {
            std::thread::sleep(Duration::from_millis(500));
            Ok(())
        })
        .with_post_exec(|_| Ok(String::new()));

    let handle = with_timeout(env.coordinator.exec(job)).await.unwrap();
    let during_pre_hook = ticks.load(std::sync::atomic::Ordering::SeqCst);
    ticker.abort();

    assert!(
        during_pre_hook >= 10,
        "runtime made only {during_pre_hook} ticks while the pre-hook slept"
    );
    assert!(with_timeout(handle.wait()).await.unwrap().success);
}
