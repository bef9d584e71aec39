//! Worker hardening applied between fork and exec.
//!
//! Runs inside the forked child, so it only makes raw syscalls: no logging,
//! no allocation beyond what the error path needs. Order is fixed:
//! 1. prctl(PR_SET_PDEATHSIG, SIGKILL) so a dying supervisor takes the worker along
//! 2. network and PID namespaces (inside a user namespace when unprivileged)
//! 3. with a new PID namespace, fork once: the child goes on to exec as PID 1,
//!    the parent stays behind as a stub that mirrors its exit status
//! 4. rlimit set
//! 5. prctl(PR_SET_NO_NEW_PRIVS, 1)
//! 6. launch syscall filter
//!
//! When PID 1 of a namespace dies the kernel kills every process left in it,
//! so a candidate that escapes the process group still dies with the worker.
//!
//! In strict mode any failure aborts the spawn; otherwise failures are skipped
//! and the launch proceeds with whatever was applied.

use crate::config::types::SandboxLimits;
use crate::core::seccomp::{self, BpfInstruction};
use nix::sched::{unshare, CloneFlags};
use std::io;

/// Snapshot of the settings the child needs, captured before fork.
#[derive(Clone, Debug)]
pub struct PreExecPlan {
    pub limits: SandboxLimits,
    pub enable_network_namespace: bool,
    pub enable_pid_namespace: bool,
    /// Built before fork; the child only hands it to the kernel.
    pub launch_filter: Option<Vec<BpfInstruction>>,
    pub strict_mode: bool,
    pub running_as_root: bool,
}

fn apply_rlimit_value(resource: libc::__rlimit_resource_t, soft: u64, hard: u64) -> io::Result<()> {
    let limit = libc::rlimit {
        rlim_cur: soft as libc::rlim_t,
        rlim_max: hard as libc::rlim_t,
    };
    let rc = unsafe { libc::setrlimit(resource, &limit) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

fn prctl_flag(option: libc::c_int, value: libc::c_ulong) -> io::Result<()> {
    let rc = unsafe { libc::prctl(option, value, 0 as libc::c_ulong, 0 as libc::c_ulong, 0 as libc::c_ulong) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Close every descriptor, including std's exec-status pipe, so the stub
/// holds nothing the supervisor waits on.
fn close_all_fds() {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    let max = if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) } == 0 {
        (limit.rlim_cur as u64).min(65536)
    } else {
        1024
    };
    for fd in 0..max as libc::c_int {
        unsafe {
            libc::close(fd);
        }
    }
}

/// Body of the stub left outside the PID namespace: wait for namespace init,
/// then exit the same way it did.
fn mirror_exit(child: libc::pid_t) -> ! {
    close_all_fds();
    let mut status: libc::c_int = 0;
    loop {
        if unsafe { libc::waitpid(child, &mut status, 0) } == child {
            break;
        }
        if io::Error::last_os_error().raw_os_error() != Some(libc::EINTR) {
            unsafe { libc::_exit(1) }
        }
    }
    if libc::WIFEXITED(status) {
        unsafe { libc::_exit(libc::WEXITSTATUS(status)) }
    }
    if libc::WIFSIGNALED(status) {
        let signal = libc::WTERMSIG(status);
        let _ = apply_rlimit_value(libc::RLIMIT_CORE, 0, 0);
        unsafe {
            libc::signal(signal, libc::SIG_DFL);
            libc::kill(libc::getpid(), signal);
        }
    }
    unsafe { libc::_exit(1) }
}

impl PreExecPlan {
    fn enforce(&self, step: io::Result<()>) -> io::Result<()> {
        match step {
            Err(e) if self.strict_mode => Err(e),
            _ => Ok(()),
        }
    }

    fn namespace_flags(&self) -> CloneFlags {
        let mut flags = CloneFlags::empty();
        if self.enable_network_namespace {
            flags |= CloneFlags::CLONE_NEWNET;
        }
        if self.enable_pid_namespace {
            flags |= CloneFlags::CLONE_NEWPID;
        }
        if !flags.is_empty() && !self.running_as_root {
            // Unprivileged processes may only create these namespaces from
            // inside a user namespace they own.
            flags |= CloneFlags::CLONE_NEWUSER;
        }
        flags
    }

    /// Returns whether children of this process land in a new PID namespace.
    fn isolate_namespaces(&self) -> io::Result<bool> {
        let flags = self.namespace_flags();
        if flags.is_empty() {
            return Ok(false);
        }
        match unshare(flags) {
            Ok(()) => Ok(flags.contains(CloneFlags::CLONE_NEWPID)),
            Err(e) if self.strict_mode => Err(io::Error::from(e)),
            Err(_) => Ok(false),
        }
    }

    /// Fork so the process that execs is PID 1 of the new namespace. Only
    /// the child returns.
    fn enter_pid_namespace(&self) -> io::Result<()> {
        let pid = unsafe { libc::fork() };
        if pid < 0 {
            return Err(io::Error::last_os_error());
        }
        if pid > 0 {
            mirror_exit(pid);
        }
        // The stub is our parent now; die with it.
        prctl_flag(libc::PR_SET_PDEATHSIG, libc::SIGKILL as libc::c_ulong)
    }

    fn apply_limits(&self) -> io::Result<()> {
        let limits = &self.limits;
        if let Some(memory) = limits.memory_limit {
            self.enforce(apply_rlimit_value(libc::RLIMIT_AS, memory, memory))?;
        }
        if let Some(cpu) = limits.cpu_time_limit_secs {
            // SIGXCPU at the soft limit, SIGKILL one second later.
            self.enforce(apply_rlimit_value(libc::RLIMIT_CPU, cpu, cpu + 1))?;
        }
        if let Some(fsize) = limits.file_size_limit {
            self.enforce(apply_rlimit_value(libc::RLIMIT_FSIZE, fsize, fsize))?;
        }
        if let Some(fds) = limits.fd_limit {
            self.enforce(apply_rlimit_value(libc::RLIMIT_NOFILE, fds, fds))?;
        }
        if let Some(procs) = limits.process_limit {
            self.enforce(apply_rlimit_value(libc::RLIMIT_NPROC, procs, procs))?;
        }
        let core = limits.core_limit.unwrap_or(0);
        self.enforce(apply_rlimit_value(libc::RLIMIT_CORE, core, core))?;
        Ok(())
    }

    /// Body of the `pre_exec` hook.
    pub fn apply(&self) -> io::Result<()> {
        self.enforce(prctl_flag(libc::PR_SET_PDEATHSIG, libc::SIGKILL as libc::c_ulong))?;
        if self.isolate_namespaces()? {
            self.enforce(self.enter_pid_namespace())?;
        }
        self.apply_limits()?;
        // No-new-privs is never optional.
        prctl_flag(libc::PR_SET_NO_NEW_PRIVS, 1)?;
        if let Some(filter) = &self.launch_filter {
            self.enforce(seccomp::install(filter))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(strict_mode: bool) -> PreExecPlan {
        PreExecPlan {
            limits: SandboxLimits::default(),
            enable_network_namespace: false,
            enable_pid_namespace: false,
            launch_filter: None,
            strict_mode,
            running_as_root: false,
        }
    }

    #[test]
    fn permissive_plan_swallows_step_failures() {
        let failing = Err(io::Error::from_raw_os_error(libc::EPERM));
        assert!(plan(false).enforce(failing).is_ok());
    }

    #[test]
    fn strict_plan_propagates_step_failures() {
        let failing = Err(io::Error::from_raw_os_error(libc::EPERM));
        assert_eq!(
            plan(true).enforce(failing).unwrap_err().raw_os_error(),
            Some(libc::EPERM)
        );
    }

    #[test]
    fn unprivileged_namespaces_ride_on_a_user_namespace() {
        let mut p = plan(false);
        assert!(p.namespace_flags().is_empty());

        p.enable_pid_namespace = true;
        assert_eq!(
            p.namespace_flags(),
            CloneFlags::CLONE_NEWPID | CloneFlags::CLONE_NEWUSER
        );

        p.running_as_root = true;
        p.enable_network_namespace = true;
        assert_eq!(
            p.namespace_flags(),
            CloneFlags::CLONE_NEWPID | CloneFlags::CLONE_NEWNET
        );
    }
}
