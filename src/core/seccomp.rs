//! Syscall filters for candidate workers.
//!
//! Two classic-BPF programs, both deny-listed and returning `EPERM`/`EACCES`
//! rather than killing, so the candidate sees an ordinary Python exception:
//!
//! - the **launch** filter is installed by the pre-exec hook after
//!   `NO_NEW_PRIVS`. It refuses process creation, sockets, write-mode opens
//!   and directory mutation. The worker still needs `execve` once, to start
//!   the runtime.
//! - the **lockdown** filter is handed to the harness in the request and
//!   installed once the allowed modules are loaded. It refuses every `open*`
//!   and `exec*`, so nothing the candidate reaches through the object graph
//!   can read the host filesystem or replace the worker image.
//!
//! Filters stack: lockdown narrows launch, never widens it.

use std::io;

// Classic BPF opcodes (linux/filter.h).
const BPF_LD_W_ABS: u16 = 0x20;
const BPF_JMP_JEQ_K: u16 = 0x15;
const BPF_JMP_JGE_K: u16 = 0x35;
const BPF_JMP_JSET_K: u16 = 0x45;
const BPF_RET_K: u16 = 0x06;

// struct seccomp_data offsets.
const DATA_NR: u32 = 0;
const DATA_ARCH: u32 = 4;
const fn data_arg_low(index: u32) -> u32 {
    16 + index * 8
}

const SECCOMP_RET_KILL_PROCESS: u32 = 0x8000_0000;
const SECCOMP_RET_ERRNO: u32 = 0x0005_0000;
const SECCOMP_RET_ALLOW: u32 = 0x7fff_0000;

const PR_SET_SECCOMP: libc::c_int = 22;
const SECCOMP_MODE_FILTER: libc::c_ulong = 2;

// Same number on every architecture that has them.
const SYS_CLONE3: u32 = 435;
const SYS_OPENAT2: u32 = 437;

#[cfg(target_arch = "x86_64")]
const AUDIT_ARCH: u32 = 0xC000_003E;
#[cfg(target_arch = "aarch64")]
const AUDIT_ARCH: u32 = 0xC000_00B7;
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
const AUDIT_ARCH: u32 = 0;

/// x32 syscalls on x86_64 carry this bit; they bypass a per-number list.
#[cfg(target_arch = "x86_64")]
const X32_SYSCALL_BIT: u32 = 0x4000_0000;

const WRITE_INTENT: u32 =
    (libc::O_WRONLY | libc::O_RDWR | libc::O_CREAT | libc::O_TRUNC | libc::O_APPEND) as u32;

/// One `struct sock_filter`. The harness packs the serialized fields back
/// into the same layout.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BpfInstruction {
    pub code: u16,
    pub jt: u8,
    pub jf: u8,
    pub k: u32,
}

const fn stmt(code: u16, k: u32) -> BpfInstruction {
    BpfInstruction { code, jt: 0, jf: 0, k }
}

const fn jump(code: u16, k: u32, jt: u8, jf: u8) -> BpfInstruction {
    BpfInstruction { code, jt, jf, k }
}

#[repr(C)]
struct SockFprog {
    len: libc::c_ushort,
    filter: *const BpfInstruction,
}

/// How a denied syscall is matched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Rule {
    /// Any call.
    Always(u32),
    /// Only when the low word of argument `arg` shares a bit with `mask`.
    AnyBits { nr: u32, arg: u32, mask: u32 },
    /// Only when the low word of argument `arg` has none of `mask` set.
    NoBits { nr: u32, arg: u32, mask: u32 },
}

fn nr(value: libc::c_long) -> u32 {
    value as u32
}

#[cfg(target_arch = "x86_64")]
fn legacy_launch_rules() -> Vec<Rule> {
    vec![
        Rule::Always(nr(libc::SYS_fork)),
        Rule::Always(nr(libc::SYS_vfork)),
        Rule::Always(nr(libc::SYS_creat)),
        Rule::AnyBits {
            nr: nr(libc::SYS_open),
            arg: 1,
            mask: WRITE_INTENT,
        },
        Rule::Always(nr(libc::SYS_unlink)),
        Rule::Always(nr(libc::SYS_rename)),
        Rule::Always(nr(libc::SYS_mkdir)),
        Rule::Always(nr(libc::SYS_rmdir)),
        Rule::Always(nr(libc::SYS_link)),
        Rule::Always(nr(libc::SYS_symlink)),
        Rule::Always(nr(libc::SYS_chmod)),
        Rule::Always(nr(libc::SYS_chown)),
        Rule::Always(nr(libc::SYS_lchown)),
        Rule::Always(nr(libc::SYS_mknod)),
    ]
}

#[cfg(not(target_arch = "x86_64"))]
fn legacy_launch_rules() -> Vec<Rule> {
    Vec::new()
}

#[cfg(target_arch = "x86_64")]
fn legacy_lockdown_rules() -> Vec<Rule> {
    vec![Rule::Always(nr(libc::SYS_open))]
}

#[cfg(not(target_arch = "x86_64"))]
fn legacy_lockdown_rules() -> Vec<Rule> {
    Vec::new()
}

fn launch_rules() -> Vec<(Rule, i32)> {
    let clone_thread = libc::CLONE_THREAD as u32;
    let mut rules = vec![
        // New processes, in any form. Threads stay allowed.
        Rule::NoBits {
            nr: nr(libc::SYS_clone),
            arg: 0,
            mask: clone_thread,
        },
        Rule::Always(nr(libc::SYS_execveat)),
        Rule::Always(nr(libc::SYS_setsid)),
        Rule::Always(nr(libc::SYS_kill)),
        Rule::Always(nr(libc::SYS_ptrace)),
        Rule::Always(nr(libc::SYS_socket)),
        Rule::Always(nr(libc::SYS_socketpair)),
        Rule::AnyBits {
            nr: nr(libc::SYS_openat),
            arg: 2,
            mask: WRITE_INTENT,
        },
        Rule::Always(nr(libc::SYS_unlinkat)),
        Rule::Always(nr(libc::SYS_renameat)),
        Rule::Always(nr(libc::SYS_renameat2)),
        Rule::Always(nr(libc::SYS_mkdirat)),
        Rule::Always(nr(libc::SYS_linkat)),
        Rule::Always(nr(libc::SYS_symlinkat)),
        Rule::Always(nr(libc::SYS_fchmod)),
        Rule::Always(nr(libc::SYS_fchmodat)),
        Rule::Always(nr(libc::SYS_fchown)),
        Rule::Always(nr(libc::SYS_fchownat)),
        Rule::Always(nr(libc::SYS_truncate)),
        Rule::Always(nr(libc::SYS_ftruncate)),
        Rule::Always(nr(libc::SYS_mknodat)),
        Rule::Always(nr(libc::SYS_mount)),
        Rule::Always(nr(libc::SYS_unshare)),
        Rule::Always(nr(libc::SYS_setns)),
    ];
    rules.extend(legacy_launch_rules());

    let mut out: Vec<(Rule, i32)> = rules.into_iter().map(|r| (r, libc::EPERM)).collect();
    // ENOSYS makes libc fall back to clone(2), where CLONE_THREAD is checked.
    out.push((Rule::Always(SYS_CLONE3), libc::ENOSYS));
    out.push((Rule::Always(SYS_OPENAT2), libc::ENOSYS));
    out
}

fn lockdown_rules() -> Vec<(Rule, i32)> {
    let mut rules = vec![
        Rule::Always(nr(libc::SYS_openat)),
        Rule::Always(nr(libc::SYS_execve)),
        Rule::Always(nr(libc::SYS_execveat)),
        Rule::Always(SYS_OPENAT2),
    ];
    rules.extend(legacy_lockdown_rules());
    rules.into_iter().map(|r| (r, libc::EACCES)).collect()
}

/// Append the instructions for one rule. Each block either returns or falls
/// through to the next block.
fn emit_rule(program: &mut Vec<BpfInstruction>, rule: Rule, errno: i32) {
    let deny = stmt(BPF_RET_K, SECCOMP_RET_ERRNO | (errno as u32 & 0xffff));
    match rule {
        Rule::Always(number) => {
            program.push(jump(BPF_JMP_JEQ_K, number, 0, 1));
            program.push(deny);
        }
        Rule::AnyBits { nr, arg, mask } => {
            program.push(jump(BPF_JMP_JEQ_K, nr, 0, 4));
            program.push(stmt(BPF_LD_W_ABS, data_arg_low(arg)));
            program.push(jump(BPF_JMP_JSET_K, mask, 0, 1));
            program.push(deny);
            // Restore the syscall number for the blocks that follow.
            program.push(stmt(BPF_LD_W_ABS, DATA_NR));
        }
        Rule::NoBits { nr, arg, mask } => {
            program.push(jump(BPF_JMP_JEQ_K, nr, 0, 4));
            program.push(stmt(BPF_LD_W_ABS, data_arg_low(arg)));
            program.push(jump(BPF_JMP_JSET_K, mask, 1, 0));
            program.push(deny);
            program.push(stmt(BPF_LD_W_ABS, DATA_NR));
        }
    }
}

fn assemble(rules: &[(Rule, i32)]) -> Vec<BpfInstruction> {
    let mut program = vec![
        stmt(BPF_LD_W_ABS, DATA_ARCH),
        jump(BPF_JMP_JEQ_K, AUDIT_ARCH, 1, 0),
        stmt(BPF_RET_K, SECCOMP_RET_KILL_PROCESS),
        stmt(BPF_LD_W_ABS, DATA_NR),
    ];
    #[cfg(target_arch = "x86_64")]
    {
        program.push(jump(BPF_JMP_JGE_K, X32_SYSCALL_BIT, 0, 1));
        program.push(stmt(BPF_RET_K, SECCOMP_RET_ERRNO | libc::EPERM as u32));
    }
    for (rule, errno) in rules {
        emit_rule(&mut program, *rule, *errno);
    }
    program.push(stmt(BPF_RET_K, SECCOMP_RET_ALLOW));
    program
}

/// Filter installed between fork and exec.
pub fn launch_filter() -> Vec<BpfInstruction> {
    assemble(&launch_rules())
}

/// Filter the harness installs after preloading allowed modules.
pub fn lockdown_filter() -> Vec<BpfInstruction> {
    assemble(&lockdown_rules())
}

/// Install `program` on the calling thread. Requires `NO_NEW_PRIVS`.
///
/// Async-signal-safe: `program` must be built before fork.
pub fn install(program: &[BpfInstruction]) -> io::Result<()> {
    if AUDIT_ARCH == 0 {
        return Err(io::Error::from_raw_os_error(libc::ENOSYS));
    }
    let fprog = SockFprog {
        len: program.len() as libc::c_ushort,
        filter: program.as_ptr(),
    };
    let rc = unsafe {
        libc::prctl(
            PR_SET_SECCOMP,
            SECCOMP_MODE_FILTER,
            &fprog as *const SockFprog as libc::c_ulong,
            0 as libc::c_ulong,
            0 as libc::c_ulong,
        )
    };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// True when this kernel accepts seccomp filters at all.
pub fn is_supported() -> bool {
    AUDIT_ARCH != 0
        && (std::path::Path::new("/proc/sys/kernel/seccomp").exists()
        || std::fs::read_to_string("/proc/self/status")
            .map(|s| s.contains("Seccomp:"))
            .unwrap_or(false))
}
