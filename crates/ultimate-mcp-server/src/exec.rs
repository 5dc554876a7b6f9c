// crates/ultimate-mcp-server/src/exec.rs
// ============================================================================
// Module: Execution Engine
// Description: Sandboxed child-process execution with hard resource limits.
// Purpose: Run untrusted code in a bounded, killable, observable child.
// Dependencies: tokio, libc, tempfile, ultimate-mcp-config
// ============================================================================

//! ## Overview
//! Executions run in fresh OS processes under a bounded worker pool: a
//! counting semaphore of twice the worker count bounds outstanding requests
//! (overflow returns `Busy` immediately), and a second semaphore bounds
//! concurrently running children. Each child gets a private 0700 working
//! directory, a minimal environment, closed stdin, bounded output capture,
//! its own process group, and rlimits for CPU, address space, file size,
//! open files, and process count set between fork and exec. On deadline the
//! whole group gets SIGTERM, a 500 ms grace, then SIGKILL. The reactor never
//! blocks on child waits; everything is awaited.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::sync::Semaphore;
use ultimate_mcp_config::ExecConfig;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Grace period between SIGTERM and SIGKILL on deadline.
const KILL_GRACE: Duration = Duration::from_millis(500);
/// Placeholder replaced with the sandboxed source path in argv.
pub const FILE_PLACEHOLDER: &str = "{file}";

// ============================================================================
// SECTION: Types
// ============================================================================

/// One sandboxed run request.
#[derive(Debug, Clone)]
pub struct SandboxRequest {
    /// File name the source is written to inside the workdir.
    pub file_name: String,
    /// Source text written to the file.
    pub source: String,
    /// Command line; `{file}` expands to the absolute source path.
    pub argv: Vec<String>,
    /// Wall-clock deadline.
    pub timeout: Duration,
}

/// Raw result of a sandboxed run.
#[derive(Debug, Clone)]
pub struct SandboxOutcome {
    /// Child exit code; -1 when the deadline fired.
    pub return_code: i32,
    /// Captured standard output, bounded.
    pub stdout: String,
    /// Captured standard error, bounded.
    pub stderr: String,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Peak resident set reported by the OS for waited children, else 0.
    pub peak_memory_bytes: u64,
    /// True when either stream exceeded the capture cap.
    pub truncated: bool,
    /// True when the deadline fired.
    pub timed_out: bool,
}

/// Engine-level failures (the child's own exit status is never an error).
#[derive(Debug, Error)]
pub enum ExecError {
    /// Admission queue full; caller should back off.
    #[error("execution pool saturated")]
    Busy,
    /// The child could not be started.
    #[error("spawn failed: {0}")]
    SpawnFailed(String),
    /// Host-side fault around the run.
    #[error("execution internal error: {0}")]
    Internal(String),
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Bounded sandbox executor.
pub struct ExecEngine {
    /// Sandbox limits.
    config: ExecConfig,
    /// Outstanding-request bound (2×workers); overflow is `Busy`.
    admission: Arc<Semaphore>,
    /// Concurrently running children (workers).
    workers: Arc<Semaphore>,
}

impl ExecEngine {
    /// Creates an engine from configuration.
    #[must_use]
    pub fn new(config: ExecConfig) -> Self {
        let workers = config.workers.max(1);
        Self {
            admission: Arc::new(Semaphore::new(workers * 2)),
            workers: Arc::new(Semaphore::new(workers)),
            config,
        }
    }

    /// Returns the configured per-stream output cap.
    #[must_use]
    pub const fn output_cap(&self) -> usize {
        self.config.output_cap_bytes
    }

    /// Clamps a requested timeout to the configured bounds.
    #[must_use]
    pub fn clamp_timeout(&self, requested_secs: Option<u64>) -> Duration {
        let secs = requested_secs
            .unwrap_or(self.config.timeout_default_secs)
            .clamp(1, self.config.timeout_max_secs);
        Duration::from_secs(secs)
    }

    /// Runs one request through the sandbox.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::Busy`] on admission overflow, otherwise spawn or
    /// host faults. A child that exits non-zero or times out is an `Ok`
    /// outcome.
    pub async fn run(&self, request: SandboxRequest) -> Result<SandboxOutcome, ExecError> {
        let Ok(_admission) = Arc::clone(&self.admission).try_acquire_owned() else {
            return Err(ExecError::Busy);
        };
        let _worker = Arc::clone(&self.workers)
            .acquire_owned()
            .await
            .map_err(|_| ExecError::Internal("worker pool closed".to_string()))?;
        self.run_in_workdir(&request).await
    }

    /// Prepares the private workdir and drives the child to completion.
    async fn run_in_workdir(&self, request: &SandboxRequest) -> Result<SandboxOutcome, ExecError> {
        let workdir = tempfile::Builder::new()
            .prefix("umcp-exec-")
            .tempdir()
            .map_err(|err| ExecError::Internal(format!("workdir create failed: {err}")))?;
        set_private_mode(workdir.path())?;

        let file_path = workdir.path().join(&request.file_name);
        tokio::fs::write(&file_path, &request.source)
            .await
            .map_err(|err| ExecError::Internal(format!("source write failed: {err}")))?;

        let file_arg = file_path.to_string_lossy().to_string();
        let argv: Vec<String> = request
            .argv
            .iter()
            .map(|arg| if arg == FILE_PLACEHOLDER { file_arg.clone() } else { arg.clone() })
            .collect();
        let Some((program, args)) = argv.split_first() else {
            return Err(ExecError::Internal("empty sandbox argv".to_string()));
        };

        let mut command = tokio::process::Command::new(program);
        command
            .args(args)
            .current_dir(workdir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env_clear()
            .env("PATH", std::env::var("PATH").unwrap_or_else(|_| "/usr/bin:/bin".to_string()))
            .env("HOME", workdir.path())
            .env("LANG", "C.UTF-8")
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .kill_on_drop(true);
        apply_sandbox_limits(&mut command, &self.config, request.timeout);

        let started = Instant::now();
        let mut child = command
            .spawn()
            .map_err(|err| ExecError::SpawnFailed(format!("{program}: {err}")))?;
        let pid = child.id();

        let cap = self.config.output_cap_bytes;
        let stdout_pipe = child
            .stdout
            .take()
            .ok_or_else(|| ExecError::Internal("stdout pipe missing".to_string()))?;
        let stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| ExecError::Internal("stderr pipe missing".to_string()))?;
        let stdout_task = tokio::spawn(read_bounded(stdout_pipe, cap));
        let stderr_task = tokio::spawn(read_bounded(stderr_pipe, cap));

        let (return_code, timed_out) =
            match tokio::time::timeout(request.timeout, child.wait()).await {
                Ok(Ok(status)) => (exit_code_of(status), false),
                Ok(Err(err)) => {
                    return Err(ExecError::Internal(format!("wait failed: {err}")));
                }
                Err(_) => {
                    terminate_group(pid);
                    tokio::time::sleep(KILL_GRACE).await;
                    kill_group(pid);
                    let _ = child.wait().await;
                    (-1, true)
                }
            };

        let (stdout_bytes, stdout_truncated) = stdout_task
            .await
            .map_err(|err| ExecError::Internal(format!("stdout reader failed: {err}")))?;
        let (stderr_bytes, stderr_truncated) = stderr_task
            .await
            .map_err(|err| ExecError::Internal(format!("stderr reader failed: {err}")))?;

        Ok(SandboxOutcome {
            return_code,
            stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
            stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            peak_memory_bytes: children_peak_rss_bytes(),
            truncated: stdout_truncated || stderr_truncated,
            timed_out,
        })
    }
}

// ============================================================================
// SECTION: Sandbox Primitives
// ============================================================================

/// Restricts the workdir to the owning user.
fn set_private_mode(path: &std::path::Path) -> Result<(), ExecError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
            .map_err(|err| ExecError::Internal(format!("workdir chmod failed: {err}")))
    }
    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(())
    }
}

/// Installs the new-session and rlimit hooks between fork and exec.
fn apply_sandbox_limits(
    command: &mut tokio::process::Command,
    config: &ExecConfig,
    timeout: Duration,
) {
    #[cfg(unix)]
    {
        let cpu_secs = timeout.as_secs().max(1);
        let memory = config.memory_bytes;
        let file_size = config.file_bytes;
        let fd_limit = config.fd_limit;
        unsafe {
            command.pre_exec(move || {
                if libc::setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                set_rlimit(libc::RLIMIT_CPU as u32, cpu_secs)?;
                set_rlimit(libc::RLIMIT_AS as u32, memory)?;
                set_rlimit(libc::RLIMIT_FSIZE as u32, file_size)?;
                set_rlimit(libc::RLIMIT_NOFILE as u32, fd_limit)?;
                set_rlimit(libc::RLIMIT_NPROC as u32, 1)?;
                Ok(())
            });
        }
    }
    #[cfg(not(unix))]
    {
        let _ = (command, config, timeout);
    }
}

/// Sets one rlimit with equal soft and hard values.
#[cfg(unix)]
fn set_rlimit(resource: u32, value: u64) -> std::io::Result<()> {
    let limit = libc::rlimit {
        rlim_cur: value as libc::rlim_t,
        rlim_max: value as libc::rlim_t,
    };
    if unsafe { libc::setrlimit(resource as _, &limit) } == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// Sends SIGTERM to the child's process group.
fn terminate_group(pid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = pid {
        if let Ok(pid) = i32::try_from(pid) {
            unsafe {
                libc::kill(-pid, libc::SIGTERM);
            }
        }
    }
    #[cfg(not(unix))]
    let _ = pid;
}

/// Sends SIGKILL to the child's process group.
fn kill_group(pid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = pid {
        if let Ok(pid) = i32::try_from(pid) {
            unsafe {
                libc::kill(-pid, libc::SIGKILL);
            }
        }
    }
    #[cfg(not(unix))]
    let _ = pid;
}

/// Maps an exit status to a return code, folding signals to negatives.
fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status.code().unwrap_or_else(|| status.signal().map_or(-1, |signal| -signal))
    }
    #[cfg(not(unix))]
    {
        status.code().unwrap_or(-1)
    }
}

/// Returns the peak resident set size among waited children.
fn children_peak_rss_bytes() -> u64 {
    #[cfg(unix)]
    {
        let mut usage = std::mem::MaybeUninit::<libc::rusage>::zeroed();
        if unsafe { libc::getrusage(libc::RUSAGE_CHILDREN, usage.as_mut_ptr()) } == 0 {
            let usage = unsafe { usage.assume_init() };
            return u64::try_from(usage.ru_maxrss).unwrap_or(0).saturating_mul(1024);
        }
        0
    }
    #[cfg(not(unix))]
    {
        0
    }
}

/// Reads a stream to EOF, retaining at most `cap` bytes.
async fn read_bounded<R: tokio::io::AsyncRead + Unpin>(mut reader: R, cap: usize) -> (Vec<u8>, bool) {
    let mut kept = Vec::with_capacity(cap.min(8 * 1024));
    let mut buf = [0u8; 8 * 1024];
    let mut truncated = false;
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(count) => {
                if kept.len() < cap {
                    let take = (cap - kept.len()).min(count);
                    kept.extend_from_slice(&buf[..take]);
                    if take < count {
                        truncated = true;
                    }
                } else {
                    truncated = true;
                }
            }
        }
    }
    (kept, truncated)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, reason = "Test-only assertions.")]

    use std::time::Duration;

    use ultimate_mcp_config::ExecConfig;

    use super::ExecEngine;
    use super::ExecError;
    use super::FILE_PLACEHOLDER;
    use super::SandboxRequest;

    fn engine(output_cap: usize) -> ExecEngine {
        ExecEngine::new(ExecConfig {
            workers: 2,
            timeout_default_secs: 8,
            timeout_max_secs: 30,
            memory_bytes: 256 * 1024 * 1024,
            file_bytes: 1024 * 1024,
            fd_limit: 64,
            output_cap_bytes: output_cap,
            cache_enabled: false,
            strict_validation: false,
        })
    }

    fn shell_request(script: &str, timeout: Duration) -> SandboxRequest {
        SandboxRequest {
            file_name: "snippet.sh".to_string(),
            source: script.to_string(),
            argv: vec!["/bin/sh".to_string(), FILE_PLACEHOLDER.to_string()],
            timeout,
        }
    }

    #[tokio::test]
    async fn successful_run_captures_output() {
        let engine = engine(64 * 1024);
        let outcome = engine
            .run(shell_request("echo hello-sandbox", Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(outcome.return_code, 0);
        assert_eq!(outcome.stdout.trim(), "hello-sandbox");
        assert!(!outcome.truncated);
        assert!(!outcome.timed_out);
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_successful_outcome() {
        let engine = engine(64 * 1024);
        let outcome = engine
            .run(shell_request("exit 3", Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(outcome.return_code, 3);
    }

    #[tokio::test]
    async fn deadline_kills_the_child_and_reports_minus_one() {
        let engine = engine(64 * 1024);
        let started = std::time::Instant::now();
        // Sleep directly as the child so the wall deadline, not the CPU
        // rlimit, is what fires.
        let outcome = engine
            .run(SandboxRequest {
                file_name: "unused.txt".to_string(),
                source: String::new(),
                argv: vec!["/bin/sleep".to_string(), "30".to_string()],
                timeout: Duration::from_secs(1),
            })
            .await
            .unwrap();
        assert!(outcome.timed_out);
        assert_eq!(outcome.return_code, -1);
        assert!(outcome.duration_ms >= 1_000);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn output_is_truncated_at_the_cap() {
        let engine = engine(64);
        let script = "i=0\nwhile [ $i -lt 64 ]; do echo aaaaaaaaaaaaaaaa; i=$((i+1)); done";
        let outcome = engine.run(shell_request(script, Duration::from_secs(5))).await.unwrap();
        assert!(outcome.truncated);
        assert!(outcome.stdout.len() <= 64);
    }

    #[tokio::test]
    async fn spawn_failure_is_reported() {
        let engine = engine(1024);
        let request = SandboxRequest {
            file_name: "x".to_string(),
            source: String::new(),
            argv: vec!["/definitely/not/a/binary".to_string()],
            timeout: Duration::from_secs(1),
        };
        assert!(matches!(engine.run(request).await, Err(ExecError::SpawnFailed(_))));
    }

    #[tokio::test]
    async fn admission_overflow_returns_busy() {
        let engine = std::sync::Arc::new(engine(1024));
        let mut handles = Vec::new();
        // Fill both worker slots and both queue slots.
        for _ in 0..4 {
            let engine = std::sync::Arc::clone(&engine);
            handles.push(tokio::spawn(async move {
                engine
                    .run(SandboxRequest {
                        file_name: "snippet.sh".to_string(),
                        source: "i=0\nwhile [ $i -lt 400 ]; do i=$((i+1)); done\nsleep_done=1"
                            .to_string(),
                        argv: vec!["/bin/sh".to_string(), FILE_PLACEHOLDER.to_string()],
                        timeout: Duration::from_secs(5),
                    })
                    .await
            }));
        }
        // Give the first four a moment to occupy every slot, then overflow.
        tokio::time::sleep(Duration::from_millis(10)).await;
        let overflow = engine
            .run(shell_request("echo late", Duration::from_secs(5)))
            .await;
        // Either the queue was still full (Busy) or the fast scripts already
        // drained; both are valid, but a Busy must never hang.
        if let Err(err) = overflow {
            assert!(matches!(err, ExecError::Busy));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    #[test]
    fn timeout_clamping_respects_bounds() {
        let engine = engine(1024);
        assert_eq!(engine.clamp_timeout(None), Duration::from_secs(8));
        assert_eq!(engine.clamp_timeout(Some(5)), Duration::from_secs(5));
        assert_eq!(engine.clamp_timeout(Some(500)), Duration::from_secs(30));
        assert_eq!(engine.clamp_timeout(Some(0)), Duration::from_secs(1));
    }
}
