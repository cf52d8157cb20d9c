use std::io::{self, IsTerminal};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use log::debug;
use nix::errno::Errno;
use nix::sys::signal::{self, killpg, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal};
use nix::sys::wait::WaitStatus;
use nix::unistd::{getpgrp, getpid, setpgid, Pid};

use super::error::ShellError;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

// SIGCHLD 处理函数回收的 (pid, status)。pid 为 0 表示空槽。
// 只有处理函数写入空槽，只有主循环清空槽位；槽满时只回收不汇报。
const REAP_SLOTS: usize = 128;
#[allow(clippy::declare_interior_mutable_const)]
const EMPTY_SLOT: AtomicI32 = AtomicI32::new(0);
static REAPED_PIDS: [AtomicI32; REAP_SLOTS] = [EMPTY_SLOT; REAP_SLOTS];
static REAPED_STATUS: [AtomicI32; REAP_SLOTS] = [EMPTY_SLOT; REAP_SLOTS];

const JOB_CONTROL_SIGNALS: [Signal; 4] = [
    Signal::SIGQUIT,
    Signal::SIGTSTP,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
];

extern "C" fn on_sigint(_: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

extern "C" fn on_sigchld(_: libc::c_int) {
    let saved = errno::errno();
    loop {
        let mut status: libc::c_int = 0;
        let pid = unsafe { libc::waitpid(-1, &mut status, libc::WNOHANG) };
        if pid <= 0 {
            break;
        }
        record_reaped(pid, status);
    }
    errno::set_errno(saved);
}

fn record_reaped(pid: libc::pid_t, status: libc::c_int) {
    for (slot_pid, slot_status) in REAPED_PIDS.iter().zip(REAPED_STATUS.iter()) {
        if slot_pid.load(Ordering::Acquire) == 0 {
            slot_status.store(status, Ordering::Relaxed);
            slot_pid.store(pid, Ordering::Release);
            return;
        }
    }
}

/// 取出 SIGCHLD 处理函数回收到的子进程，只在主循环中调用
pub fn drain_reaped() -> Vec<WaitStatus> {
    let mut reaped = Vec::new();
    for (slot_pid, slot_status) in REAPED_PIDS.iter().zip(REAPED_STATUS.iter()) {
        let pid = slot_pid.load(Ordering::Acquire);
        if pid == 0 {
            continue;
        }
        let status = slot_status.load(Ordering::Relaxed);
        slot_pid.store(0, Ordering::Release);
        if let Ok(ws) = WaitStatus::from_raw(Pid::from_raw(pid), status) {
            reaped.push(ws);
        }
    }
    reaped
}

/// 忽略会让 shell 自己停下来的作业控制信号
pub fn ignore_block_signals() -> nix::Result<()> {
    for sig in JOB_CONTROL_SIGNALS {
        unsafe { signal::signal(sig, SigHandler::SigIgn) }?;
    }
    Ok(())
}

/// 不带 SA_RESTART：前台 waitpid 会被 EINTR 打断，然后由主循环处理中断
pub fn setup_sigint_handler() -> nix::Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(on_sigint),
        SaFlags::empty(),
        SigSet::empty(),
    );
    unsafe { signal::sigaction(Signal::SIGINT, &action) }?;
    Ok(())
}

pub fn setup_sigchld_handler() -> nix::Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(on_sigchld),
        SaFlags::SA_RESTART | SaFlags::SA_NOCLDSTOP,
        SigSet::empty(),
    );
    unsafe { signal::sigaction(Signal::SIGCHLD, &action) }?;
    Ok(())
}

/// 在 fork 出的子进程里调用：恢复默认信号处理并清空信号屏蔽字。
/// Rust 运行时在 main 之前把 SIGPIPE 设成了忽略，这里一并恢复。
/// SIGTSTP 保持忽略，没有 fg/bg 可以把停下来的作业恢复。
pub fn restore_defaults_in_child() {
    for sig in [
        Signal::SIGINT,
        Signal::SIGQUIT,
        Signal::SIGCHLD,
        Signal::SIGPIPE,
        Signal::SIGTTIN,
        Signal::SIGTTOU,
    ] {
        let _ = unsafe { signal::signal(sig, SigHandler::SigDfl) };
    }
    let _ = SigSet::empty().thread_set_mask();
}

pub fn take_interrupt() -> bool {
    INTERRUPTED.swap(false, Ordering::SeqCst)
}

pub fn terminate_group(pgid: Pid) -> nix::Result<()> {
    debug!("向进程组 {} 发送 SIGTERM", pgid);
    killpg(pgid, Signal::SIGTERM)
}

/// 前台作业运行期间屏蔽 SIGCHLD，异步回收就不会抢走前台子进程的状态
pub struct SigchldBlock {
    previous: SigSet,
}

impl SigchldBlock {
    pub fn new() -> nix::Result<Self> {
        let mut set = SigSet::empty();
        set.add(Signal::SIGCHLD);
        let mut previous = SigSet::empty();
        signal::pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&set), Some(&mut previous))?;
        Ok(Self { previous })
    }
}

impl Drop for SigchldBlock {
    fn drop(&mut self) {
        let _ = signal::pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(&self.previous), None);
    }
}

/// 控制终端。只有交互模式下才存在。
#[derive(Debug, Clone, Copy)]
pub struct Terminal {
    shell_pgid: Pid,
}

impl Terminal {
    /// stdin 不是终端时返回 `None`，此时不做任何终端交接
    pub fn acquire() -> Result<Option<Self>, ShellError> {
        if !io::stdin().is_terminal() {
            return Ok(None);
        }

        // 等到自己成为前台进程组
        loop {
            let owner = tcgetpgrp().map_err(ShellError::Terminal)?;
            let own_group = getpgrp();
            if owner == own_group {
                break;
            }
            killpg(own_group, Signal::SIGTTIN).map_err(ShellError::Terminal)?;
        }
        ignore_block_signals().map_err(ShellError::Terminal)?;

        let shell_pid = getpid();
        if getpgrp() != shell_pid {
            setpgid(shell_pid, shell_pid).map_err(ShellError::Terminal)?;
        }
        let terminal = Terminal {
            shell_pgid: shell_pid,
        };
        terminal.give_to(shell_pid).map_err(ShellError::Terminal)?;
        debug!("已获取控制终端, pgid={}", shell_pid);
        Ok(Some(terminal))
    }

    pub fn give_to(&self, pgid: Pid) -> nix::Result<()> {
        tcsetpgrp(pgid)
    }

    pub fn reclaim(&self) -> nix::Result<()> {
        tcsetpgrp(self.shell_pgid)
    }

    /// 把终端交给前台作业，离开作用域时收回
    pub fn lease(&self, pgid: Pid) -> TerminalLease {
        if let Err(e) = self.give_to(pgid) {
            debug!("交出终端失败: {}", e);
        }
        TerminalLease { terminal: *self }
    }
}

pub struct TerminalLease {
    terminal: Terminal,
}

impl Drop for TerminalLease {
    fn drop(&mut self) {
        if let Err(e) = self.terminal.reclaim() {
            debug!("收回终端失败: {}", e);
        }
    }
}

fn tcgetpgrp() -> nix::Result<Pid> {
    let pgid = unsafe { libc::tcgetpgrp(libc::STDIN_FILENO) };
    Errno::result(pgid).map(Pid::from_raw)
}

fn tcsetpgrp(pgid: Pid) -> nix::Result<()> {
    let res = unsafe { libc::tcsetpgrp(libc::STDIN_FILENO, pgid.as_raw()) };
    Errno::result(res).map(drop)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_reap_ring_round_trip() {
        let _lock = crate::shell::TEST_LOCK
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        // 0x0300 == 正常退出，退出码 3
        record_reaped(424242, 3 << 8);
        let reaped = drain_reaped();
        assert!(reaped.contains(&WaitStatus::Exited(Pid::from_raw(424242), 3)));
        assert!(!drain_reaped()
            .iter()
            .any(|ws| ws.pid() == Some(Pid::from_raw(424242))));
    }

    #[test]
    fn test_sigchld_block_restores_mask() {
        let before = SigSet::thread_get_mask().unwrap();
        {
            let _guard = SigchldBlock::new().unwrap();
            assert!(SigSet::thread_get_mask().unwrap().contains(Signal::SIGCHLD));
        }
        assert_eq!(
            SigSet::thread_get_mask().unwrap().contains(Signal::SIGCHLD),
            before.contains(Signal::SIGCHLD)
        );
    }
}
