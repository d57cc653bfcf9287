//! PID liveness checks backing the supervisor's reconcile sweep.
//!
//! 프로세스 이름 기반 검색은 제공하지 않는다. 같은 실행 파일 이름을 쓰는
//! 무관한 프로세스(예: 다른 java.exe)를 잘못 잡을 수 있기 때문에, 추적은
//! 항상 spawn 시점에 받은 PID로만 한다.

use sysinfo::{Pid, System};

/// 특정 PID가 실행 중인지 확인 (크로스 플랫폼)
pub fn is_running(pid: u32) -> bool {
    let mut sys = System::new();
    sys.refresh_processes();
    sys.process(Pid::from_u32(pid)).is_some()
}

// ── Async wrapper ──────────────────────────────────────────
// sysinfo 시스템 콜은 동기적으로 OS 프로세스 테이블을 스캔합니다.
// tokio 워커 스레드에서 직접 호출하면 런타임 전체가 블로킹되므로,
// spawn_blocking을 통해 전용 블로킹 스레드풀에서 실행합니다.

/// `is_running`의 비동기 래퍼.
pub async fn is_running_async(pid: u32) -> bool {
    tokio::task::spawn_blocking(move || is_running(pid))
        .await
        .unwrap_or(false)
}
