use crate::config::types::{Result, SynthError};
use crate::core::preexec::PreExecPlan;
use crate::core::seccomp;
use crate::core::types::{KillReport, OutputIntegrity, WorkerOutcome, WorkerProfile, WorkerReply};
use crossbeam_channel::{bounded, Receiver};
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::io::{Read, Write};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(5);
/// How long to wait for pipes to drain once the worker group is dead.
const COLLECTION_TIMEOUT: Duration = Duration::from_secs(2);
const STDERR_TAIL_BYTES: usize = 4096;

fn to_process_error(prefix: &str, err: impl std::fmt::Display) -> SynthError {
    SynthError::Process(format!("{prefix}: {err}"))
}

/// Which part of an over-long stream to keep.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Keep {
    /// The first n bytes. Used for the reply channel.
    Head(usize),
    /// The last n bytes. Used for diagnostics.
    Tail(usize),
}

/// Drain `stream` to EOF on a helper thread, keeping at most the configured
/// amount. Bytes past the limit are read and dropped so the writer never sees
/// a closed pipe. The result lands in a single-slot channel, written once.
fn read_stream_async<R: Read + Send + 'static>(
    mut stream: R,
    keep: Keep,
) -> Receiver<(Vec<u8>, OutputIntegrity)> {
    let (tx, rx) = bounded(1);
    thread::spawn(move || {
        let mut out = Vec::new();
        let mut buf = [0u8; 8192];
        let mut integrity = OutputIntegrity::Complete;

        loop {
            match stream.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => match keep {
                    Keep::Head(limit) => {
                        let room = limit.saturating_sub(out.len());
                        if n > room {
                            integrity = OutputIntegrity::TruncatedByLimit;
                        }
                        out.extend_from_slice(&buf[..n.min(room)]);
                    }
                    Keep::Tail(limit) => {
                        out.extend_from_slice(&buf[..n]);
                        if out.len() > limit {
                            let excess = out.len() - limit;
                            out.drain(..excess);
                            integrity = OutputIntegrity::TruncatedByLimit;
                        }
                    }
                },
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => {
                    integrity = OutputIntegrity::ReadError;
                    break;
                }
            }
        }

        let _ = tx.send((out, integrity));
    });
    rx
}

/// Report whether `pid` has exited, leaving it unreaped so its process group
/// id stays reserved until we have killed the group.
fn peek_exited(pid: i32) -> Result<bool> {
    loop {
        let mut info: libc::siginfo_t = unsafe { std::mem::zeroed() };
        let rc = unsafe {
            libc::waitid(
                libc::P_PID,
                pid as libc::id_t,
                &mut info,
                libc::WEXITED | libc::WNOHANG | libc::WNOWAIT,
            )
        };
        if rc == 0 {
            return Ok(unsafe { info.si_pid() } != 0);
        }
        let err = std::io::Error::last_os_error();
        if err.kind() != std::io::ErrorKind::Interrupted {
            return Err(to_process_error("waitid(worker)", err));
        }
    }
}

/// SIGKILL the whole worker group. No SIGTERM first: the candidate is
/// untrusted and owes us no cooperation.
fn kill_worker_group(pgid: i32) -> KillReport {
    let started = Instant::now();
    let mut report = KillReport::default();
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) => report.kill_sent = true,
        Err(Errno::ESRCH) => report.notes.push("group already empty".to_string()),
        Err(e) => report.notes.push(format!("killpg failed: {}", e)),
    }
    report.waited_ms = started.elapsed().as_millis() as u64;
    report
}

fn spawn_worker(profile: &WorkerProfile) -> Result<Child> {
    let (program, args) = profile
        .command
        .split_first()
        .ok_or_else(|| SynthError::Config("empty worker command".to_string()))?;

    let plan = PreExecPlan {
        limits: profile.limits.clone(),
        enable_network_namespace: profile.enable_network_namespace,
        enable_pid_namespace: profile.enable_pid_namespace,
        launch_filter: profile.enable_syscall_filter.then(seccomp::launch_filter),
        strict_mode: profile.strict_mode,
        running_as_root: unsafe { libc::geteuid() } == 0,
    };

    let mut cmd = Command::new(program);
    cmd.args(args)
        .env_clear()
        .envs(profile.environment.iter().map(|(k, v)| (k, v)))
        .current_dir(&profile.workdir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0);
    unsafe {
        cmd.pre_exec(move || plan.apply());
    }

    cmd.spawn().map_err(|e| to_process_error("spawn(worker)", e))
}

/// Run one worker to completion or timeout, then tear its group down.
///
/// `request` is written to the worker's stdin; the worker's stdout is the
/// reply channel. Returns `Err` only when the worker cannot be started or
/// waited on; anything the candidate does is reported in the outcome.
pub fn run_worker(profile: &WorkerProfile, request: Vec<u8>) -> Result<WorkerOutcome> {
    let started = Instant::now();
    let mut child = spawn_worker(profile)?;
    let worker_pid = child.id() as i32;
    log::debug!("worker {} started: {:?}", worker_pid, profile.command.first());

    if let Some(mut stdin) = child.stdin.take() {
        // Writer runs detached; a worker that dies early just breaks the pipe.
        thread::spawn(move || {
            let _ = stdin.write_all(&request);
        });
    }
    let stdout_rx = child
        .stdout
        .take()
        .map(|s| read_stream_async(s, Keep::Head(profile.limits.output_limit)));
    let stderr_rx = child
        .stderr
        .take()
        .map(|s| read_stream_async(s, Keep::Tail(STDERR_TAIL_BYTES)));

    let watch = loop {
        match peek_exited(worker_pid) {
            Ok(true) => break Ok(false),
            Ok(false) if started.elapsed() > profile.wall_time_limit => break Ok(true),
            Ok(false) => thread::sleep(POLL_INTERVAL),
            Err(e) => break Err(e),
        }
    };

    // Unconditional teardown: the leader is still unreaped here, so the group
    // id cannot have been recycled.
    let kill_report = kill_worker_group(worker_pid);
    let timed_out = match watch {
        Ok(timed_out) => timed_out,
        Err(e) => {
            let _ = child.wait();
            return Err(e);
        }
    };
    if timed_out {
        log::info!(
            "worker {} exceeded {:?}; group killed",
            worker_pid,
            profile.wall_time_limit
        );
    }
    let status = child
        .wait()
        .map_err(|e| to_process_error("wait(worker)", e))?;
    let wall_time_ms = started.elapsed().as_millis() as u64;

    let collect = |rx: Option<Receiver<(Vec<u8>, OutputIntegrity)>>| match rx {
        Some(rx) => rx
            .recv_timeout(COLLECTION_TIMEOUT)
            .unwrap_or((Vec::new(), OutputIntegrity::Abandoned)),
        None => (Vec::new(), OutputIntegrity::ReadError),
    };
    let (stdout, stdout_integrity) = collect(stdout_rx);
    let (stderr, _) = collect(stderr_rx);

    let (reply, protocol_error) = if timed_out {
        (None, None)
    } else {
        decode_reply(&stdout, &stdout_integrity)
    };

    Ok(WorkerOutcome {
        worker_pid,
        exit_code: status.code(),
        term_signal: status.signal(),
        timed_out,
        wall_time_ms,
        reply,
        protocol_error,
        stdout_integrity,
        stderr_tail: String::from_utf8_lossy(&stderr).to_string(),
        teardown: kill_report,
        configured_controls: profile.configured_controls(),
    })
}

fn decode_reply(stdout: &[u8], integrity: &OutputIntegrity) -> (Option<WorkerReply>, Option<String>) {
    if *integrity != OutputIntegrity::Complete {
        return (None, Some(format!("reply stream {:?}", integrity)));
    }
    let trimmed = String::from_utf8_lossy(stdout);
    let trimmed = trimmed.trim();
    if trimmed.is_empty() {
        return (None, Some("worker produced no reply".to_string()));
    }
    match serde_json::from_str::<WorkerReply>(trimmed) {
        Ok(reply) => (Some(reply), None),
        Err(e) => (None, Some(format!("undecodable reply: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::EvaluatorConfig;

    fn shell_profile(script: &str, wall: Duration) -> WorkerProfile {
        let mut config = EvaluatorConfig::default();
        config.enable_network_namespace = false;
        // The shell needs fork for pipelines and background jobs.
        config.enable_syscall_filter = false;
        config.limits.process_limit = None;
        WorkerProfile::from_config(
            &config,
            vec!["/bin/sh".to_string(), "-c".to_string(), script.to_string()],
            vec![("PATH".to_string(), "/usr/bin:/bin".to_string())],
            wall,
        )
    }

    fn process_gone(pid: i32) -> bool {
        !std::path::Path::new(&format!("/proc/{}", pid)).exists()
    }

    #[test]
    fn decodes_reply_from_stdout() {
        let profile = shell_profile(
            r#"cat >/dev/null; printf '{"status":"ok","outputs":[["2"]]}'"#,
            Duration::from_secs(10),
        );
        let outcome = run_worker(&profile, b"{}".to_vec()).unwrap();
        assert!(!outcome.timed_out);
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(
            outcome.reply,
            Some(WorkerReply::Ok {
                outputs: vec![vec!["2".to_string()]]
            })
        );
    }

    #[test]
    fn timeout_kills_and_reaps_the_group() {
        let profile = shell_profile("sleep 30 & sleep 30", Duration::from_millis(300));
        let started = Instant::now();
        let outcome = run_worker(&profile, Vec::new()).unwrap();

        assert!(outcome.timed_out);
        assert!(outcome.reply.is_none());
        assert_eq!(outcome.term_signal, Some(libc::SIGKILL));
        assert!(outcome.teardown.kill_sent);
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(process_gone(outcome.worker_pid));
    }

    #[test]
    fn garbage_on_stdout_is_a_protocol_error() {
        let profile = shell_profile("echo not-json", Duration::from_secs(10));
        let outcome = run_worker(&profile, Vec::new()).unwrap();
        assert!(outcome.reply.is_none());
        assert!(outcome.protocol_error.unwrap().contains("undecodable"));
    }

    #[test]
    fn silent_exit_is_reported_as_missing_reply() {
        let profile = shell_profile("echo oops >&2; exit 3", Duration::from_secs(10));
        let outcome = run_worker(&profile, Vec::new()).unwrap();
        assert_eq!(outcome.exit_code, Some(3));
        assert!(outcome.stderr_tail.contains("oops"));
        assert_eq!(outcome.protocol_error.as_deref(), Some("worker produced no reply"));
    }

    #[test]
    fn file_writes_are_refused_by_fsize_limit() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("leak.txt");
        let script = format!("echo data > {}; echo done", target.display());
        let profile = shell_profile(&script, Duration::from_secs(10));
        let _ = run_worker(&profile, Vec::new()).unwrap();
        let written = std::fs::metadata(&target).map(|m| m.len()).unwrap_or(0);
        assert_eq!(written, 0);
    }

    #[test]
    fn chatty_stderr_is_drained_past_the_limit() {
        let mut profile = shell_profile(
            r#"cat >/dev/null; head -c 3000000 /dev/zero >&2 || exit 9; printf '{"status":"ok","outputs":[["2"]]}'"#,
            Duration::from_secs(10),
        );
        profile.limits.output_limit = 1024;
        let outcome = run_worker(&profile, b"{}".to_vec()).unwrap();
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.stdout_integrity, OutputIntegrity::Complete);
        assert!(outcome.stderr_tail.len() <= STDERR_TAIL_BYTES);
        assert!(matches!(outcome.reply, Some(WorkerReply::Ok { .. })));
    }

    #[test]
    fn oversized_reply_is_truncated_without_breaking_the_pipe() {
        let mut profile = shell_profile(
            "head -c 100000 /dev/zero || exit 9",
            Duration::from_secs(10),
        );
        profile.limits.output_limit = 1024;
        let outcome = run_worker(&profile, Vec::new()).unwrap();
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.stdout_integrity, OutputIntegrity::TruncatedByLimit);
        assert!(outcome.reply.is_none());
    }

    #[test]
    fn tail_keeps_the_last_bytes() {
        let data: Vec<u8> = (0..20000u32).map(|i| (i % 251) as u8).collect();
        let rx = read_stream_async(std::io::Cursor::new(data.clone()), Keep::Tail(100));
        let (kept, integrity) = rx.recv().unwrap();
        assert_eq!(kept, data[data.len() - 100..]);
        assert_eq!(integrity, OutputIntegrity::TruncatedByLimit);

        let rx = read_stream_async(std::io::Cursor::new(data.clone()), Keep::Head(100));
        let (kept, _) = rx.recv().unwrap();
        assert_eq!(kept, data[..100]);
    }

    fn session_survivor(marker: &str) -> bool {
        let Ok(entries) = std::fs::read_dir("/proc") else {
            return false;
        };
        entries.flatten().any(|entry| {
            std::fs::read(entry.path().join("cmdline"))
                .map(|cmdline| String::from_utf8_lossy(&cmdline).contains(marker))
                .unwrap_or(false)
        })
    }

    #[test]
    fn detached_session_dies_with_the_worker() {
        let marker = "97.531";
        let mut profile = shell_profile(
            &format!("setsid sleep {} </dev/null >/dev/null 2>&1 & sleep 0.2; exit 0", marker),
            Duration::from_secs(10),
        );
        profile.enable_pid_namespace = true;
        profile.strict_mode = true;
        let outcome = match run_worker(&profile, Vec::new()) {
            Ok(outcome) => outcome,
            Err(e) => {
                eprintln!("skipping: pid namespace unavailable: {}", e);
                return;
            }
        };
        assert_eq!(outcome.exit_code, Some(0));

        let deadline = Instant::now() + Duration::from_secs(2);
        while session_survivor(marker) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        assert!(!session_survivor(marker));
    }

    #[test]
    fn launch_filter_refuses_fork() {
        let mut profile = shell_profile("/bin/sh -c true && echo forked >&2; exit 0", Duration::from_secs(10));
        profile.enable_syscall_filter = true;
        profile.enable_pid_namespace = false;
        profile.strict_mode = true;
        let outcome = match run_worker(&profile, Vec::new()) {
            Ok(outcome) => outcome,
            Err(e) => {
                eprintln!("skipping: seccomp unavailable: {}", e);
                return;
            }
        };
        assert!(!outcome.stderr_tail.contains("forked"));
    }

    #[test]
    fn empty_command_is_a_config_error() {
        let mut profile = shell_profile("true", Duration::from_secs(1));
        profile.command.clear();
        assert!(matches!(
            run_worker(&profile, Vec::new()),
            Err(SynthError::Config(_))
        ));
    }
}
