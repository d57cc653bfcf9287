//! Supervisor 수명주기 통합 테스트
//!
//! 실제 자식 프로세스(/bin/sh)를 띄워 시작 확인 프로브, 정지 사다리,
//! 외부 종료 감지를 검증한다. 핵심 속성: 정지는 추적 중인 프로세스
//! 핸들에만 작용하고, 이름이 같은 무관한 프로세스는 건드리지 않는다.
#![cfg(unix)]

use std::path::Path;
use std::time::Duration;

use mcwarden_core::supervisor::{
    LaunchSpec, ServerState, Supervisor, SupervisorOptions,
};

fn test_options() -> SupervisorOptions {
    SupervisorOptions {
        probe_window: Duration::from_millis(250),
        stop_grace: Duration::from_secs(5),
        console_stop_command: None,
    }
}

fn sleeper_spec(dir: &Path) -> LaunchSpec {
    LaunchSpec::new("sleep", vec!["300".to_string()], dir)
}

fn shell_spec(dir: &Path, script: &str) -> LaunchSpec {
    LaunchSpec::new("/bin/sh", vec!["-c".to_string(), script.to_string()], dir)
}

async fn kill_pid(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    let _ = kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
    // waiter 태스크가 종료를 관측할 때까지 잠시 대기
    tokio::time::sleep(Duration::from_millis(500)).await;
}

#[tokio::test]
async fn test_start_stop_lifecycle() {
    let sup = Supervisor::new(test_options());
    let dir = tempfile::tempdir().unwrap();

    let started = sup.start(&sleeper_spec(dir.path())).await.unwrap();
    assert!(started.pid > 0);

    let status = sup.status(dir.path()).await.unwrap();
    assert_eq!(status.state, ServerState::Running);
    assert_eq!(status.pid, Some(started.pid));
    assert!(status.uptime_secs.is_some());
    println!("✓ Server running with pid {}", started.pid);

    let stopped = sup.stop(dir.path(), false).await.unwrap();
    assert_eq!(stopped.state, ServerState::Stopped);
    assert!(stopped.pid.is_none());

    // 정지는 멱등: 이미 멈춘 서버를 다시 멈춰도 성공
    let again = sup.stop(dir.path(), false).await.unwrap();
    assert_eq!(again.state, ServerState::Stopped);
    println!("✓ Stop is idempotent");
}

#[tokio::test]
async fn test_second_start_is_rejected_while_running() {
    let sup = Supervisor::new(test_options());
    let dir = tempfile::tempdir().unwrap();

    let started = sup.start(&sleeper_spec(dir.path())).await.unwrap();
    let before = sup.status(dir.path()).await.unwrap();

    let err = sup.start(&sleeper_spec(dir.path())).await.unwrap_err();
    assert_eq!(err.error_code(), "ALREADY_RUNNING");

    // 거부된 시작은 기존 세션을 건드리지 않는다
    let after = sup.status(dir.path()).await.unwrap();
    assert_eq!(after.state, ServerState::Running);
    assert_eq!(after.pid, before.pid);
    assert_eq!(after.session_id, Some(started.session_id));
    println!("✓ Second start rejected, original session untouched");

    sup.stop(dir.path(), true).await.unwrap();
}

#[tokio::test]
async fn test_restart_gets_a_fresh_session_id() {
    let sup = Supervisor::new(test_options());
    let dir = tempfile::tempdir().unwrap();

    let first = sup.start(&sleeper_spec(dir.path())).await.unwrap();
    sup.stop(dir.path(), false).await.unwrap();

    let second = sup.start(&sleeper_spec(dir.path())).await.unwrap();
    assert_ne!(first.session_id, second.session_id);
    println!("✓ Restart produced a new session id");

    sup.stop(dir.path(), true).await.unwrap();
}

#[tokio::test]
async fn test_stop_spares_unrelated_process_with_same_name() {
    // 관리 대상과 같은 실행 파일 이름의 무관한 프로세스를 미리 띄워 둔다
    let mut decoy = std::process::Command::new("sleep")
        .arg("300")
        .spawn()
        .unwrap();

    let sup = Supervisor::new(test_options());
    let dir = tempfile::tempdir().unwrap();
    sup.start(&sleeper_spec(dir.path())).await.unwrap();
    sup.stop(dir.path(), false).await.unwrap();

    let decoy_alive = matches!(decoy.try_wait(), Ok(None));
    let _ = decoy.kill();
    let _ = decoy.wait();
    assert!(
        decoy_alive,
        "stop must only act on the tracked pid, never on processes matched by name"
    );
    println!("✓ Unrelated process with the same executable name survived the stop");
}

#[tokio::test]
async fn test_externally_killed_server_reconciles_to_failed() {
    let sup = Supervisor::new(test_options());
    let dir = tempfile::tempdir().unwrap();

    let started = sup.start(&sleeper_spec(dir.path())).await.unwrap();
    kill_pid(started.pid).await;

    // Running이라 믿고 있던 핸들이 죽어 있으면 stop은 NOT_RUNNING을 보고한다
    let err = sup.stop(dir.path(), false).await.unwrap_err();
    assert_eq!(err.error_code(), "NOT_RUNNING");
    assert_eq!(
        sup.status(dir.path()).await.unwrap().state,
        ServerState::Failed
    );
    println!("✓ External kill detected, state reconciled to Failed");

    // 실패를 확인한 다음 stop은 상태를 Stopped로 정리한다
    let cleared = sup.stop(dir.path(), false).await.unwrap();
    assert_eq!(cleared.state, ServerState::Stopped);
    println!("✓ Second stop acknowledged the failure and cleared it");
}

#[tokio::test]
async fn test_reconcile_sweep_detects_external_exit() {
    let sup = Supervisor::new(test_options());
    let dir = tempfile::tempdir().unwrap();

    let started = sup.start(&sleeper_spec(dir.path())).await.unwrap();
    kill_pid(started.pid).await;

    // 주기 스윕이 stop 요청 없이 죽은 프로세스를 Failed로 표시한다
    sup.reconcile().await.unwrap();
    assert_eq!(
        sup.status(dir.path()).await.unwrap().state,
        ServerState::Failed
    );
    println!("✓ Reconcile sweep flagged the dead server as Failed");
}

#[tokio::test]
async fn test_console_stop_command_shuts_down_cleanly() {
    let sup = Supervisor::new(SupervisorOptions {
        console_stop_command: Some("stop".to_string()),
        ..test_options()
    });
    let dir = tempfile::tempdir().unwrap();

    // "stop"을 읽으면 마커 파일을 남기고 스스로 종료하는 서버 흉내
    let script = r#"while read line; do
        if [ "$line" = "stop" ]; then echo bye > stopped.marker; exit 0; fi
    done"#;
    sup.start(&shell_spec(dir.path(), script)).await.unwrap();

    let stopped = sup.stop(dir.path(), false).await.unwrap();
    assert_eq!(stopped.state, ServerState::Stopped);
    assert!(
        dir.path().join("stopped.marker").exists(),
        "server should have exited via the console command, not a signal"
    );
    println!("✓ Graceful stop went through the server console");
}

#[tokio::test]
async fn test_send_command_reaches_server_stdin() {
    let sup = Supervisor::new(test_options());
    let dir = tempfile::tempdir().unwrap();

    let script = r#"read line; echo "got $line"; sleep 300"#;
    sup.start(&shell_spec(dir.path(), script)).await.unwrap();

    sup.send_command(dir.path(), "ping").await.unwrap();

    // 콘솔 버퍼에 에코가 나타날 때까지 폴링
    let mut echoed = false;
    for _ in 0..30 {
        let lines = sup.get_console(dir.path(), None, 50).await.unwrap();
        if lines.iter().any(|l| l.content.contains("got ping")) {
            echoed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(echoed, "console command should round-trip through stdin");
    println!("✓ Console command reached the server and echoed back");

    sup.stop(dir.path(), true).await.unwrap();
}

#[tokio::test]
async fn test_crash_tail_stays_readable() {
    let sup = Supervisor::new(test_options());
    let dir = tempfile::tempdir().unwrap();

    let script = r#"echo "booting world"; sleep 300"#;
    let started = sup.start(&shell_spec(dir.path(), script)).await.unwrap();
    kill_pid(started.pid).await;
    sup.reconcile().await.unwrap();

    // Failed 상태에서도 마지막 콘솔 출력은 진단용으로 남아 있어야 한다
    assert_eq!(
        sup.status(dir.path()).await.unwrap().state,
        ServerState::Failed
    );
    let lines = sup.get_console(dir.path(), None, 50).await.unwrap();
    assert!(
        lines.iter().any(|l| l.content.contains("booting world")),
        "crash tail should still be readable after the process died"
    );
    println!("✓ Crash tail readable after external kill");
}
