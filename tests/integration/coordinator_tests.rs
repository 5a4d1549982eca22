//! Integration tests for `RunCoordinator` against scripted test executables.
//!
//! Each script answers `--discover_tests` with discovery lines and any other
//! invocation with run-mode output, standing in for a compiled test binary.

use std::fs;
use std::time::Duration;

use serial_test::serial;
use tokio::sync::mpsc;

use cpputf_adapter::mode::ProtocolMode;
use cpputf_adapter::models::outcome::{RunOutcome, TestSelection, TestUpdate};
use cpputf_adapter::protocol::decoder::{DecoderOptions, LINE_SEPARATOR};
use cpputf_adapter::AppError;

use super::test_helpers::{
    coordinator, drain_updates, protocol_script, write_script, SESSION_TIMEOUT,
};

const DISCOVERY: &str = "Math::Adds,math.cpp,10\nMath::Subtracts,math.cpp,20\nStrings::Concat,strings.cpp,5";

const PASS_FAIL_RUN: &str = "Running...\nTest:Math::Adds\nTest Complete:passed\nTest:Math::Subtracts\n    expected 1\n    got 2\nTest Complete:failed\nSkip:Strings::Concat\nComplete.";

async fn within<F: std::future::Future>(future: F) -> F::Output {
    tokio::time::timeout(SESSION_TIMEOUT, future)
        .await
        .expect("session must end in time")
}

// ── Discovery ────────────────────────────────────────────────────────────────

/// Discovery groups tests by fixture and keeps bad lines as warnings.
#[tokio::test]
#[serial]
async fn discover_groups_and_warns() {
    let dir = tempfile::tempdir().expect("tempdir");
    let discovery = format!("{DISCOVERY}\nnot a test line\nBroken::Line,x.cpp,ten\n");
    let exe = write_script(dir.path(), "t.sh", &protocol_script(&discovery, ""));
    let coordinator = coordinator(DecoderOptions::default());

    let result = within(coordinator.discover(&exe)).await.expect("discovery succeeds");

    assert_eq!(result.executable, exe);
    assert_eq!(result.len(), 3);
    let fixtures: Vec<&str> = result.fixtures.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(fixtures, vec!["Math", "Strings"]);
    let adds = result.find("Math::Adds").expect("Math::Adds discovered");
    assert_eq!(adds.source_file, "math.cpp");
    assert_eq!(adds.source_line, 10);
    assert_eq!(adds.executable, exe);

    assert_eq!(result.warnings.len(), 2);
    assert_eq!(result.warnings[0].line, "not a test line");
    assert_eq!(result.warnings[1].reason, "source line is not a number");
    assert!(!coordinator.is_active());
}

/// A discovery process exiting non-zero yields no result.
#[tokio::test]
#[serial]
async fn discover_non_zero_exit_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let exe = write_script(dir.path(), "t.sh", "echo 'Math::Adds,math.cpp,10'\nexit 2\n");
    let coordinator = coordinator(DecoderOptions::default());

    let err = within(coordinator.discover(&exe)).await.expect_err("must fail");
    assert!(
        matches!(err, AppError::DiscoveryFailed(ref msg) if msg.contains("code 2")),
        "{err}"
    );
}

/// Discovery passes the discover and adapter-info flags.
#[tokio::test]
#[serial]
async fn discover_passes_flags() {
    let dir = tempfile::tempdir().expect("tempdir");
    let exe = write_script(dir.path(), "t.sh", "echo \"$*\" > args.txt\n");
    let coordinator = coordinator(DecoderOptions::default());

    let result = within(coordinator.discover(&exe)).await.expect("discovery succeeds");
    assert!(result.is_empty());

    let args = fs::read_to_string(dir.path().join("args.txt")).expect("args recorded");
    assert_eq!(args.trim(), "--discover_tests --adapter_info");
}

// ── Run ──────────────────────────────────────────────────────────────────────

/// Updates follow output order, and failures carry their message lines.
#[tokio::test]
#[serial]
async fn run_reports_updates_in_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let exe = write_script(dir.path(), "t.sh", &protocol_script(DISCOVERY, PASS_FAIL_RUN));
    let coordinator = coordinator(DecoderOptions::default());
    let (tx, mut rx) = mpsc::channel(64);

    let summary = within(coordinator.run(&exe, &TestSelection::All, &tx))
        .await
        .expect("run succeeds");

    let updates = drain_updates(&mut rx);
    assert_eq!(
        updates,
        vec![
            TestUpdate::new("Math::Adds", RunOutcome::Running),
            TestUpdate::new("Math::Adds", RunOutcome::Passed),
            TestUpdate::new("Math::Subtracts", RunOutcome::Running),
            TestUpdate::with_message(
                "Math::Subtracts",
                RunOutcome::Failed,
                format!("expected 1{LINE_SEPARATOR}got 2"),
            ),
            TestUpdate::new("Strings::Concat", RunOutcome::Skipped),
        ]
    );
    assert_eq!((summary.passed, summary.failed, summary.skipped), (1, 1, 1));
    assert_eq!(summary.total(), 3);
    assert!(summary.completed);
    assert_eq!(summary.exit_code, Some(0));
    assert!(summary.unreported.is_empty());
    assert!(!coordinator.is_active());
}

/// A selection is passed after the verbose and adapter-info flags.
#[tokio::test]
#[serial]
async fn run_passes_selection_as_arguments() {
    let dir = tempfile::tempdir().expect("tempdir");
    let exe = write_script(
        dir.path(),
        "t.sh",
        "echo \"$*\" > args.txt\necho 'Test:Math::Adds'\necho 'Test Complete:passed'\necho 'Complete.'\n",
    );
    let coordinator = coordinator(DecoderOptions::default());
    let (tx, _rx) = mpsc::channel(64);

    let selection = TestSelection::from(vec!["Math::Adds".to_owned()]);
    within(coordinator.run(&exe, &selection, &tx))
        .await
        .expect("run succeeds");

    let args = fs::read_to_string(dir.path().join("args.txt")).expect("args recorded");
    assert_eq!(args.trim(), "--verbose --adapter_info Math::Adds");
}

/// Selected identities the executable never mentions are reported back.
#[tokio::test]
#[serial]
async fn run_lists_unreported_identities() {
    let dir = tempfile::tempdir().expect("tempdir");
    let exe = write_script(
        dir.path(),
        "t.sh",
        &protocol_script("", "Test:Math::Adds\nTest Complete:passed\nComplete."),
    );
    let coordinator = coordinator(DecoderOptions::default());
    let (tx, _rx) = mpsc::channel(64);

    let selection = TestSelection::from(vec!["Math::Adds".to_owned(), "Math::Gone".to_owned()]);
    let summary = within(coordinator.run(&exe, &selection, &tx))
        .await
        .expect("run succeeds");
    assert_eq!(summary.unreported, vec!["Math::Gone".to_owned()]);
}

/// `Test Complete:` without an open test aborts the session.
#[tokio::test]
#[serial]
async fn completion_without_test_is_violation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let exe = write_script(
        dir.path(),
        "t.sh",
        &protocol_script("", "Running...\nTest Complete:passed\nTest:Math::Adds\nComplete."),
    );
    let coordinator = coordinator(DecoderOptions::default());
    let (tx, mut rx) = mpsc::channel(64);

    let err = within(coordinator.run(&exe, &TestSelection::All, &tx))
        .await
        .expect_err("must fail");
    assert!(
        matches!(err, AppError::RunFailed(ref msg) if msg.starts_with("protocol violation")),
        "{err}"
    );
    assert!(drain_updates(&mut rx).is_empty(), "lines after the violation are ignored");
}

/// A stray unindented line inside a test fails that test.
#[tokio::test]
#[serial]
async fn stray_line_fails_open_test() {
    let dir = tempfile::tempdir().expect("tempdir");
    let exe = write_script(
        dir.path(),
        "t.sh",
        &protocol_script("", "Test:Math::Adds\nsegmentation fault\nTest Complete:passed\nComplete."),
    );
    let coordinator = coordinator(DecoderOptions::default());
    let (tx, mut rx) = mpsc::channel(64);

    let err = within(coordinator.run(&exe, &TestSelection::All, &tx))
        .await
        .expect_err("must fail");

    let updates = drain_updates(&mut rx);
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0], TestUpdate::new("Math::Adds", RunOutcome::Running));
    assert_eq!(updates[1].outcome, RunOutcome::Failed);
    assert_eq!(updates[1].message, err.to_string().trim_start_matches("run failed: "));
}

/// Lenient mode keeps the stray line as a message instead.
#[tokio::test]
#[serial]
async fn lenient_mode_keeps_stray_line() {
    let dir = tempfile::tempdir().expect("tempdir");
    let exe = write_script(
        dir.path(),
        "t.sh",
        &protocol_script("", "Test:Math::Adds\nsegmentation fault\nTest Complete:failed\nComplete."),
    );
    let coordinator = coordinator(DecoderOptions {
        lenient: true,
        ..DecoderOptions::default()
    });
    let (tx, mut rx) = mpsc::channel(64);

    let summary = within(coordinator.run(&exe, &TestSelection::All, &tx))
        .await
        .expect("run succeeds");
    assert_eq!(summary.failed, 1);
    let updates = drain_updates(&mut rx);
    assert_eq!(
        updates.last(),
        Some(&TestUpdate::with_message(
            "Math::Adds",
            RunOutcome::Failed,
            "segmentation fault"
        ))
    );
}

/// A crash mid-test fails the open test with the exit code.
#[tokio::test]
#[serial]
async fn exit_mid_test_fails_open_test() {
    let dir = tempfile::tempdir().expect("tempdir");
    let exe = write_script(dir.path(), "t.sh", "echo 'Test:Math::Adds'\nexit 3\n");
    let coordinator = coordinator(DecoderOptions::default());
    let (tx, mut rx) = mpsc::channel(64);

    let err = within(coordinator.run(&exe, &TestSelection::All, &tx))
        .await
        .expect_err("must fail");
    assert!(matches!(err, AppError::RunFailed(ref msg) if msg.contains("code 3")), "{err}");

    let updates = drain_updates(&mut rx);
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0].outcome, RunOutcome::Running);
    assert_eq!(updates[1].identity, "Math::Adds");
    assert_eq!(updates[1].outcome, RunOutcome::Failed);
    assert!(updates[1].message.contains("code 3"), "{}", updates[1].message);
}

/// Output ending inside a test with a clean exit still fails that test.
#[tokio::test]
#[serial]
async fn clean_exit_inside_test_fails_open_test() {
    let dir = tempfile::tempdir().expect("tempdir");
    let exe = write_script(dir.path(), "t.sh", "echo 'Test:Math::Adds'\nexit 0\n");
    let coordinator = coordinator(DecoderOptions::default());
    let (tx, mut rx) = mpsc::channel(64);

    let err = within(coordinator.run(&exe, &TestSelection::All, &tx))
        .await
        .expect_err("must fail");
    assert_eq!(
        err.to_string(),
        "run failed: output ended while Math::Adds was running"
    );
    let updates = drain_updates(&mut rx);
    assert_eq!(updates.last().map(|u| u.outcome), Some(RunOutcome::Failed));
}

/// A final `Complete.` without a trailing newline is still seen.
#[tokio::test]
#[serial]
async fn final_line_without_newline_completes_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    let exe = write_script(
        dir.path(),
        "t.sh",
        "printf 'Test:Math::Adds\\nTest Complete:passed\\nComplete.'\n",
    );
    let coordinator = coordinator(DecoderOptions::default());
    let (tx, _rx) = mpsc::channel(64);

    let summary = within(coordinator.run(&exe, &TestSelection::All, &tx))
        .await
        .expect("run succeeds");
    assert!(summary.completed);
    assert_eq!(summary.passed, 1);
}

/// Carriage-return line endings are handled like newlines.
#[tokio::test]
#[serial]
async fn crlf_output_is_decoded() {
    let dir = tempfile::tempdir().expect("tempdir");
    let exe = write_script(
        dir.path(),
        "t.sh",
        "printf 'Running...\\r\\nTest:Math::Adds\\r\\nTest Complete:passed\\r\\nComplete.\\r\\n'\n",
    );
    let coordinator = coordinator(DecoderOptions::default());
    let (tx, _rx) = mpsc::channel(64);

    let summary = within(coordinator.run(&exe, &TestSelection::All, &tx))
        .await
        .expect("run succeeds");
    assert_eq!(summary.passed, 1);
    assert!(summary.completed);
}

/// Implicit mode closes tests at the next control line.
#[tokio::test]
#[serial]
async fn implicit_mode_closes_tests_on_next_control_line() {
    let dir = tempfile::tempdir().expect("tempdir");
    let exe = write_script(
        dir.path(),
        "t.sh",
        &protocol_script(
            "",
            "Running...\nTest:Math::Adds\nTest:Math::Subtracts\n    off by one\nComplete.",
        ),
    );
    let coordinator = coordinator(DecoderOptions {
        mode: ProtocolMode::Implicit,
        lenient: false,
    });
    let (tx, mut rx) = mpsc::channel(64);

    let summary = within(coordinator.run(&exe, &TestSelection::All, &tx))
        .await
        .expect("run succeeds");
    assert_eq!((summary.passed, summary.failed), (1, 1));

    let outcomes: Vec<(String, RunOutcome)> = drain_updates(&mut rx)
        .into_iter()
        .map(|u| (u.identity, u.outcome))
        .collect();
    assert_eq!(
        outcomes,
        vec![
            ("Math::Adds".to_owned(), RunOutcome::Running),
            ("Math::Adds".to_owned(), RunOutcome::Passed),
            ("Math::Subtracts".to_owned(), RunOutcome::Running),
            ("Math::Subtracts".to_owned(), RunOutcome::Failed),
        ]
    );
}

// ── Cancellation and exclusivity ─────────────────────────────────────────────

/// Cancel terminates the process and fails the open test.
#[tokio::test]
#[serial]
async fn cancel_fails_open_test() {
    let dir = tempfile::tempdir().expect("tempdir");
    let exe = write_script(dir.path(), "t.sh", "echo 'Test:Math::Slow'\nsleep 30\n");
    let coordinator = coordinator(DecoderOptions::default());
    let (tx, mut rx) = mpsc::channel(64);

    let runner = coordinator.clone();
    let task = tokio::spawn(async move { runner.run(&exe, &TestSelection::All, &tx).await });

    let first = within(rx.recv()).await.expect("running update");
    assert_eq!(first, TestUpdate::new("Math::Slow", RunOutcome::Running));

    coordinator.cancel();
    let err = within(task)
        .await
        .expect("task joins")
        .expect_err("run must fail");
    assert_eq!(err.to_string(), "run failed: run cancelled");

    let last = rx.recv().await.expect("final update");
    assert_eq!(
        last,
        TestUpdate::with_message("Math::Slow", RunOutcome::Failed, "run cancelled")
    );
    assert!(!coordinator.is_active());
}

/// Requests are rejected while a session is active, then accepted again.
#[tokio::test]
#[serial]
async fn second_request_is_rejected_while_active() {
    let dir = tempfile::tempdir().expect("tempdir");
    let slow = write_script(dir.path(), "slow.sh", "echo 'Test:Math::Slow'\nsleep 30\n");
    let quick = write_script(
        dir.path(),
        "quick.sh",
        &protocol_script(DISCOVERY, PASS_FAIL_RUN),
    );
    let coordinator = coordinator(DecoderOptions::default());
    let (tx, mut rx) = mpsc::channel(64);

    let runner = coordinator.clone();
    let slow_tx = tx.clone();
    let task = tokio::spawn(async move { runner.run(&slow, &TestSelection::All, &slow_tx).await });
    within(rx.recv()).await.expect("running update");

    assert!(coordinator.is_active());
    let err = coordinator.discover(&quick).await.expect_err("discover rejected");
    assert!(matches!(err, AppError::AlreadyRunning(_)), "{err}");
    let err = coordinator
        .run(&quick, &TestSelection::All, &tx)
        .await
        .expect_err("run rejected");
    assert_eq!(
        err.to_string(),
        "already running: cannot run while another session is active"
    );

    coordinator.cancel();
    let _ = within(task).await.expect("task joins");

    let summary = within(coordinator.run(&quick, &TestSelection::All, &tx))
        .await
        .expect("coordinator accepts work after cancel");
    assert_eq!(summary.total(), 3);
}

/// Abandoning a run terminates its process and frees the coordinator.
#[tokio::test]
#[serial]
async fn dropped_run_terminates_process() {
    let dir = tempfile::tempdir().expect("tempdir");
    let slow = write_script(dir.path(), "slow.sh", "echo 'Test:Math::Slow'\nsleep 30\n");
    let quick = write_script(dir.path(), "quick.sh", &protocol_script(DISCOVERY, PASS_FAIL_RUN));
    let coordinator = coordinator(DecoderOptions::default());
    let (tx, _rx) = mpsc::channel(64);

    let abandoned = tokio::time::timeout(
        Duration::from_millis(300),
        coordinator.run(&slow, &TestSelection::All, &tx),
    )
    .await;
    assert!(abandoned.is_err(), "the run must still be going when dropped");

    coordinator.cancel();
    within(async {
        while coordinator.is_active() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;

    let result = within(coordinator.discover(&quick))
        .await
        .expect("coordinator accepts work again");
    assert_eq!(result.len(), 3);
}

/// A process outliving its session blocks new work as `AlreadyRunning`.
#[tokio::test]
#[serial]
async fn leftover_process_is_reported_as_busy() {
    let dir = tempfile::tempdir().expect("tempdir");
    let slow = write_script(dir.path(), "slow.sh", "echo 'Test:Math::Slow'\nsleep 30\n");
    let quick = write_script(dir.path(), "quick.sh", &protocol_script(DISCOVERY, PASS_FAIL_RUN));
    let coordinator = coordinator(DecoderOptions::default());
    let (tx, _rx) = mpsc::channel(64);

    let _ = tokio::time::timeout(
        Duration::from_millis(300),
        coordinator.run(&slow, &TestSelection::All, &tx),
    )
    .await;

    match coordinator.discover(&quick).await {
        Err(err) => assert!(matches!(err, AppError::AlreadyRunning(_)), "{err}"),
        Ok(result) => assert_eq!(result.len(), 3, "process already gone"),
    }
    coordinator.cancel();
}

/// Cancel with no active session is a no-op.
#[tokio::test]
#[serial]
async fn cancel_when_idle_is_noop() {
    let coordinator = coordinator(DecoderOptions::default());
    coordinator.cancel();
    coordinator.cancel();
    assert!(!coordinator.is_active());
}

/// A failed run leaves the coordinator ready for the next request.
#[tokio::test]
#[serial]
async fn coordinator_is_reusable_after_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    let broken = dir.path().join("missing.sh");
    let good = write_script(dir.path(), "t.sh", &protocol_script(DISCOVERY, PASS_FAIL_RUN));
    let coordinator = coordinator(DecoderOptions::default());
    let (tx, _rx) = mpsc::channel(64);

    let err = within(coordinator.run(&broken, &TestSelection::All, &tx))
        .await
        .expect_err("shell cannot open the script");
    assert!(matches!(err, AppError::RunFailed(_)), "{err}");

    let summary = within(coordinator.run(&good, &TestSelection::All, &tx))
        .await
        .expect("next run succeeds");
    assert!(summary.completed);
}

// ── Batches ──────────────────────────────────────────────────────────────────

/// Tests from two executables run as one process each.
#[tokio::test]
#[serial]
async fn run_tests_starts_one_process_per_executable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let run = "echo \"$0 $*\" >> calls.log\nfor id in \"$@\"; do\ncase \"$id\" in --*) continue ;; esac\necho \"Test:$id\"\necho 'Test Complete:passed'\ndone\necho 'Complete.'\n";
    let first = write_script(
        dir.path(),
        "first.sh",
        &format!(
            "if [ \"$1\" = \"--discover_tests\" ]; then\necho 'A::one,a.cpp,1'\necho 'A::two,a.cpp,2'\nexit 0\nfi\n{run}"
        ),
    );
    let second = write_script(
        dir.path(),
        "second.sh",
        &format!(
            "if [ \"$1\" = \"--discover_tests\" ]; then\necho 'B::one,b.cpp,1'\nexit 0\nfi\n{run}"
        ),
    );
    let coordinator = coordinator(DecoderOptions::default());

    let mut tests = within(coordinator.discover(&first))
        .await
        .expect("discover first")
        .into_tests();
    tests.extend(
        within(coordinator.discover(&second))
            .await
            .expect("discover second")
            .into_tests(),
    );

    let (tx, mut rx) = mpsc::channel(64);
    let runs = within(coordinator.run_tests(&tests, &tx))
        .await
        .expect("batch accepted");

    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].executable, first);
    assert_eq!(runs[1].executable, second);
    let first_summary = runs[0].result.as_ref().expect("first run succeeds");
    assert_eq!(first_summary.passed, 2);
    let second_summary = runs[1].result.as_ref().expect("second run succeeds");
    assert_eq!(second_summary.passed, 1);

    let calls = fs::read_to_string(dir.path().join("calls.log")).expect("calls recorded");
    let calls: Vec<&str> = calls.lines().collect();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].ends_with("first.sh --verbose --adapter_info A::one A::two"), "{}", calls[0]);
    assert!(calls[1].ends_with("second.sh --verbose --adapter_info B::one"), "{}", calls[1]);

    let passed = drain_updates(&mut rx)
        .into_iter()
        .filter(|u| u.outcome == RunOutcome::Passed)
        .count();
    assert_eq!(passed, 3);
}

/// `run_all` discovers then runs each executable, reporting failures per entry.
#[tokio::test]
#[serial]
async fn run_all_discovers_then_runs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let good = write_script(dir.path(), "good.sh", &protocol_script(DISCOVERY, PASS_FAIL_RUN));
    let empty = write_script(dir.path(), "empty.sh", &protocol_script("", "Complete."));
    let broken = write_script(dir.path(), "broken.sh", "exit 1\n");
    let coordinator = coordinator(DecoderOptions::default());
    let (tx, mut rx) = mpsc::channel(64);

    let runs = within(coordinator.run_all(&[good.clone(), empty, broken.clone()], &tx))
        .await
        .expect("batch accepted");

    assert_eq!(runs.len(), 2, "executables without tests are skipped");
    assert_eq!(runs[0].executable, good);
    let summary = runs[0].result.as_ref().expect("good run succeeds");
    assert_eq!(summary.total(), 3);
    assert_eq!(runs[1].executable, broken);
    assert!(matches!(runs[1].result, Err(AppError::DiscoveryFailed(_))));

    assert_eq!(drain_updates(&mut rx).len(), 5);
    assert!(!coordinator.is_active());
}

// ── Debug ────────────────────────────────────────────────────────────────────

/// Debug sessions run under the debugger prefix and report the exit code.
#[tokio::test]
#[serial]
async fn debug_reports_exit_code() {
    let dir = tempfile::tempdir().expect("tempdir");
    let exe = write_script(dir.path(), "t.sh", "echo \"$*\" > args.txt\nexit 4\n");
    let coordinator = coordinator(DecoderOptions::default());

    let selection = TestSelection::from(vec!["Math::Adds".to_owned()]);
    let code = within(coordinator.debug(&exe, &selection))
        .await
        .expect("debug session runs");
    assert_eq!(code, Some(4));

    let args = fs::read_to_string(dir.path().join("args.txt")).expect("args recorded");
    assert_eq!(args.trim(), "--verbose Math::Adds");
    assert!(!coordinator.is_active());
}

/// Read the pid and process group a script recorded in `pgid.txt`.
#[cfg(target_os = "linux")]
fn recorded_process_ids(dir: &std::path::Path) -> (i32, i32) {
    let raw = fs::read_to_string(dir.join("pgid.txt")).expect("ids recorded");
    let ids: Vec<i32> = raw
        .split_whitespace()
        .map(|id| id.parse().expect("numeric id"))
        .collect();
    (ids[0], ids[1])
}

#[cfg(target_os = "linux")]
const RECORD_PROCESS_IDS: &str = "echo \"$$ $(cut -d' ' -f5 /proc/$$/stat)\" > pgid.txt\n";

/// A debugger stays in the adapter's process group so it keeps the terminal.
#[cfg(target_os = "linux")]
#[tokio::test]
#[serial]
async fn debug_session_shares_process_group() {
    let dir = tempfile::tempdir().expect("tempdir");
    let exe = write_script(dir.path(), "t.sh", RECORD_PROCESS_IDS);
    let coordinator = coordinator(DecoderOptions::default());

    within(coordinator.debug(&exe, &TestSelection::All))
        .await
        .expect("debug session runs");

    let (_, pgid) = recorded_process_ids(dir.path());
    assert_eq!(pgid, nix::unistd::getpgrp().as_raw());
}

/// Captured sessions lead their own process group.
#[cfg(target_os = "linux")]
#[tokio::test]
#[serial]
async fn captured_session_leads_process_group() {
    let dir = tempfile::tempdir().expect("tempdir");
    let exe = write_script(dir.path(), "t.sh", RECORD_PROCESS_IDS);
    let coordinator = coordinator(DecoderOptions::default());

    within(coordinator.discover(&exe))
        .await
        .expect("discovery succeeds");

    let (pid, pgid) = recorded_process_ids(dir.path());
    assert_eq!(pgid, pid);
    assert_ne!(pgid, nix::unistd::getpgrp().as_raw());
}
