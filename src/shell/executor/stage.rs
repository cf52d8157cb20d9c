use std::ffi::CString;
use std::io::{self, Write};
use std::os::fd::RawFd;

use log::debug;
use nix::unistd::{close, dup2, execvp, fork, getpid, setpgid, ForkResult, Pid};

use super::builtin;
use crate::shell::error::ShellError;
use crate::shell::parser::ast::Stage;
use crate::shell::signals::{self, Terminal};
use crate::shell::state::ShellState;

/// exec 失败（找不到程序或不可执行）时子进程的退出码
pub const EXIT_NOT_FOUND: i32 = 127;
/// 子进程在 exec 之前设置描述符失败
pub const EXIT_SETUP_FAILED: i32 = 126;

/// 这个 stage 加入哪个进程组，以及是否要把终端交给它
#[derive(Debug, Clone, Copy, Default)]
pub struct SpawnContext {
    pub pgid: Option<Pid>,
    pub terminal: Option<Terminal>,
}

/// fork 一个子进程执行 `stage`。`stdin`/`stdout` 为 `None` 时继承 shell 的描述符。
/// 父进程只拿到 pid，不做其他 I/O。
pub fn spawn(
    state: &mut ShellState,
    stage: &Stage,
    stdin: Option<RawFd>,
    stdout: Option<RawFd>,
    ctx: SpawnContext,
) -> Result<Pid, ShellError> {
    // fork 之前准备好子进程需要的一切，子进程里尽量不分配内存
    let argv = stage
        .command
        .argv()
        .iter()
        .map(|arg| CString::new(arg.as_bytes()))
        .collect::<Result<Vec<CString>, _>>()?;
    let not_found = format!("pipesh: {}: command not found\n", stage.command.program());
    let builtin = builtin::lookup(stage.command.program());

    match unsafe { fork() } {
        Err(e) => Err(ShellError::Fork(e)),
        Ok(ForkResult::Parent { child }) => {
            // 父子进程都设置一次进程组，谁先运行都不会有竞争
            let pgid = ctx.pgid.unwrap_or(child);
            if let Err(e) = setpgid(child, pgid) {
                debug!("setpgid({}, {}) 失败: {}", child, pgid, e);
            }
            debug!("fork 子进程 {} (pgid={}): {}", child, pgid, stage.command);
            Ok(child)
        }
        Ok(ForkResult::Child) => {
            let pgid = ctx.pgid.unwrap_or_else(getpid);
            let _ = setpgid(Pid::from_raw(0), pgid);
            if let Some(terminal) = ctx.terminal {
                // SIGTTOU 此时仍被忽略
                let _ = terminal.give_to(pgid);
            }
            signals::restore_defaults_in_child();

            if wire(stdin, libc::STDIN_FILENO).is_err() || wire(stdout, libc::STDOUT_FILENO).is_err()
            {
                exit_child(EXIT_SETUP_FAILED);
            }

            if let Some(builtin) = builtin {
                let code = builtin(state, stage.command.arguments()).unwrap_or(1);
                let _ = io::stdout().flush();
                exit_child(code);
            }

            let _ = execvp(&argv[0], &argv);
            report_raw(not_found.as_bytes());
            exit_child(EXIT_NOT_FOUND)
        }
    }
}

fn wire(fd: Option<RawFd>, target: RawFd) -> nix::Result<()> {
    if let Some(fd) = fd {
        if fd != target {
            dup2(fd, target)?;
            close(fd)?;
        }
    }
    Ok(())
}

/// 直接写 fd 2：fork 之后 std 的 stderr 锁可能被别的线程持有
fn report_raw(msg: &[u8]) {
    unsafe {
        libc::write(
            libc::STDERR_FILENO,
            msg.as_ptr() as *const libc::c_void,
            msg.len(),
        );
    }
}

fn exit_child(code: i32) -> ! {
    unsafe { libc::_exit(code) }
}
