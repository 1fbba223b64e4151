// tests/executor_retry.rs

mod common;
use crate::common::{init_tracing, with_timeout};

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use dagrun::dag::{RetryPolicy, TaskSpec};
use dagrun::exec::{Executor, LAUNCH_FAILURE_EXIT_CODE};
use dagrun::types::TaskStatus;

fn retry(max_attempts: u32, delay_ms: u64) -> RetryPolicy {
    RetryPolicy::new(max_attempts, Duration::from_millis(delay_ms))
}

#[tokio::test]
async fn successful_command_runs_once_and_captures_output() {
    init_tracing();

    let spec = TaskSpec::shell("hello", "echo hello; echo oops >&2").with_retry(retry(3, 0));
    let result = with_timeout(Executor::new().run(&spec)).await;

    assert_eq!(result.task_id, "hello");
    assert_eq!(result.status, TaskStatus::Success);
    assert_eq!(result.attempts, 1);
    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.error, None);
    assert!(!result.cancelled);
    assert_eq!(result.stdout, "hello\n");
    assert_eq!(result.stderr, "oops\n");
    assert!(result.finished_at >= result.started_at);
}

#[tokio::test]
async fn failing_command_without_retry_reports_exit_code() {
    init_tracing();

    let spec = TaskSpec::shell("fail", "exit 3");
    let result = with_timeout(Executor::new().run(&spec)).await;

    assert_eq!(result.status, TaskStatus::Failed);
    assert_eq!(result.attempts, 1);
    assert_eq!(result.exit_code, Some(3));
    assert!(result.error.as_deref().unwrap_or_default().contains("code 3"));
}

#[tokio::test]
async fn retries_until_attempts_are_exhausted() {
    init_tracing();

    let spec = TaskSpec::shell("always_fails", "exit 1").with_retry(retry(3, 5));
    let result = with_timeout(Executor::new().run(&spec)).await;

    assert_eq!(result.status, TaskStatus::Failed);
    assert_eq!(result.attempts, 3);
    assert_eq!(result.exit_code, Some(1));
}

#[tokio::test]
async fn flaky_command_succeeds_on_third_attempt() {
    init_tracing();

    let dir = tempfile::tempdir().unwrap();
    // Fails on attempts 1 and 2, succeeds on 3.
    let script = "n=$(cat count 2>/dev/null || echo 0); n=$((n + 1)); echo $n > count; [ \"$n\" -ge 3 ]";
    let spec = TaskSpec::shell("flaky", script)
        .with_retry(retry(5, 20))
        .with_working_dir(dir.path());

    let started = Instant::now();
    let result = with_timeout(Executor::new().run(&spec)).await;

    assert_eq!(result.status, TaskStatus::Success);
    assert_eq!(result.attempts, 3);
    assert_eq!(result.exit_code, Some(0));
    // Two delays between three attempts.
    assert!(started.elapsed() >= Duration::from_millis(40));

    let count = std::fs::read_to_string(dir.path().join("count")).unwrap();
    assert_eq!(count.trim(), "3");
}

#[tokio::test]
async fn launch_failure_records_sentinel_exit_code() {
    init_tracing();

    let spec = TaskSpec::exec("missing", ["/nonexistent/definitely-not-a-binary", "--flag"])
        .with_retry(retry(2, 0));
    let result = with_timeout(Executor::new().run(&spec)).await;

    assert_eq!(result.status, TaskStatus::Failed);
    assert_eq!(result.attempts, 2);
    assert_eq!(result.exit_code, Some(LAUNCH_FAILURE_EXIT_CODE));
    assert!(
        result
            .error
            .as_deref()
            .unwrap_or_default()
            .contains("failed to launch")
    );
}

#[tokio::test]
async fn empty_argument_vector_is_a_launch_failure() {
    init_tracing();

    let spec = TaskSpec::exec("empty", Vec::<String>::new());
    let result = with_timeout(Executor::new().run(&spec)).await;

    assert_eq!(result.status, TaskStatus::Failed);
    assert_eq!(result.exit_code, Some(-1));
}

#[tokio::test]
async fn exec_command_passes_arguments_verbatim() {
    init_tracing();

    let spec = TaskSpec::exec("printf", ["printf", "%s|%s", "a b", "$HOME"]);
    let result = with_timeout(Executor::new().run(&spec)).await;

    assert_eq!(result.status, TaskStatus::Success);
    // No shell: no word splitting, no expansion.
    assert_eq!(result.stdout, "a b|$HOME\n");
}

#[tokio::test]
async fn task_env_and_injected_variables_reach_the_process() {
    init_tracing();

    let spec = TaskSpec::shell(
        "env_check",
        "echo \"$DAGRUN_TASK_ID $DAGRUN_ATTEMPT $PROJECT_DIR\"",
    )
    .with_env("PROJECT_DIR", "/opt/project");
    let result = with_timeout(Executor::new().run(&spec)).await;

    assert_eq!(result.status, TaskStatus::Success);
    assert_eq!(result.stdout, "env_check 1 /opt/project\n");
}

#[tokio::test]
async fn task_env_overrides_injected_variables() {
    init_tracing();

    let spec = TaskSpec::shell("override", "echo \"$DAGRUN_TASK_ID\"")
        .with_env("DAGRUN_TASK_ID", "custom");
    let result = with_timeout(Executor::new().run(&spec)).await;

    assert_eq!(result.stdout, "custom\n");
}

#[tokio::test]
async fn attempt_number_increases_across_retries() {
    init_tracing();

    let spec = TaskSpec::shell("attempts", "echo \"attempt $DAGRUN_ATTEMPT\"; [ \"$DAGRUN_ATTEMPT\" -ge 2 ]")
        .with_retry(retry(3, 0));
    let result = with_timeout(Executor::new().run(&spec)).await;

    assert_eq!(result.status, TaskStatus::Success);
    assert_eq!(result.attempts, 2);
    // Output of the final attempt only.
    assert_eq!(result.stdout, "attempt 2\n");
}

#[tokio::test]
async fn relative_working_dir_joins_executor_default() {
    init_tracing();

    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir(root.path().join("models")).unwrap();
    std::fs::write(root.path().join("models").join("marker.txt"), "found\n").unwrap();
    std::fs::write(root.path().join("top.txt"), "top\n").unwrap();

    let executor = Executor::with_working_dir(root.path());

    let nested = TaskSpec::shell("nested", "cat marker.txt").with_working_dir("models");
    let result = with_timeout(executor.run(&nested)).await;
    assert_eq!(result.status, TaskStatus::Success);
    assert_eq!(result.stdout, "found\n");

    let default = TaskSpec::shell("default", "cat top.txt");
    let result = with_timeout(executor.run(&default)).await;
    assert_eq!(result.stdout, "top\n");
}

#[tokio::test]
async fn signal_killed_process_has_no_exit_code() {
    init_tracing();

    let spec = TaskSpec::shell("killed", "kill -9 $$");
    let result = with_timeout(Executor::new().run(&spec)).await;

    assert_eq!(result.status, TaskStatus::Failed);
    assert_eq!(result.exit_code, None);
    assert!(!result.cancelled);
}

#[tokio::test]
async fn cancellation_kills_running_process() {
    init_tracing();

    let cancel = CancellationToken::new();
    let spec = TaskSpec::exec("sleeper", ["sleep", "30"]).with_retry(retry(3, 0));

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let result = with_timeout(Executor::new().run_cancellable(&spec, cancel)).await;

    assert_eq!(result.status, TaskStatus::Failed);
    assert!(result.cancelled);
    assert_eq!(result.attempts, 1, "a cancelled attempt is not retried");
    assert_eq!(result.exit_code, None);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn cancellation_interrupts_retry_delay() {
    init_tracing();

    let cancel = CancellationToken::new();
    let spec = TaskSpec::shell("backoff", "exit 2").with_retry(retry(3, 30_000));

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let result = with_timeout(Executor::new().run_cancellable(&spec, cancel)).await;

    assert_eq!(result.status, TaskStatus::Failed);
    assert!(result.cancelled);
    assert_eq!(result.attempts, 1);
    // The exit code of the attempt that did run is kept.
    assert_eq!(result.exit_code, Some(2));
}

#[tokio::test]
async fn already_cancelled_token_runs_nothing() {
    init_tracing();

    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let spec = TaskSpec::shell("never", "touch ran").with_working_dir(dir.path());
    let result = with_timeout(Executor::new().run_cancellable(&spec, cancel)).await;

    assert_eq!(result.status, TaskStatus::Failed);
    assert!(result.cancelled);
    assert_eq!(result.attempts, 0);
    assert!(!dir.path().join("ran").exists());
}

#[tokio::test]
async fn task_env_is_merged_over_the_inherited_environment() {
    init_tracing();

    let parent_path = std::env::var("PATH").unwrap();
    assert_ne!(std::env::var("HOME").ok().as_deref(), Some("/child-home"));

    let spec = TaskSpec::shell("merge", "echo \"$HOME\"; echo \"$PATH\"")
        .with_env("HOME", "/child-home");
    let result = with_timeout(Executor::new().run(&spec)).await;

    assert_eq!(result.status, TaskStatus::Success);
    assert_eq!(result.stdout, format!("/child-home\n{parent_path}\n"));
}

#[tokio::test]
async fn non_utf8_output_does_not_fail_the_task() {
    init_tracing();

    let spec = TaskSpec::shell("bin", "printf '\\377\\n'; sleep 0.3; echo done; exit 0");
    let result = with_timeout(Executor::new().run(&spec)).await;

    assert_eq!(result.status, TaskStatus::Success);
    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.stdout, "\u{FFFD}\ndone\n");
}

#[tokio::test]
async fn oversized_single_line_keeps_its_tail() {
    init_tracing();

    let spec = TaskSpec::shell(
        "long_line",
        "head -c 70000 /dev/zero | tr '\\0' x; printf 'END\\n'",
    );
    let result = with_timeout(Executor::new().run(&spec)).await;

    assert_eq!(result.status, TaskStatus::Success);
    assert_eq!(result.stdout.len(), 64 * 1024);
    assert!(result.stdout.ends_with("xxxEND\n"));
}

#[tokio::test]
async fn output_cap_drops_whole_lines_from_the_front() {
    init_tracing();

    // 20000 lines of "line NNNNN" overflow the cap many times over.
    let spec = TaskSpec::shell(
        "many_lines",
        "i=0; while [ $i -lt 20000 ]; do printf 'line %05d\\n' $i; i=$((i + 1)); done",
    );
    let result = with_timeout(Executor::new().run(&spec)).await;

    assert_eq!(result.status, TaskStatus::Success);
    assert!(result.stdout.len() <= 64 * 1024);
    assert!(result.stdout.starts_with("line "));
    assert!(result.stdout.ends_with("line 19999\n"));
}
