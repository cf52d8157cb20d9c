use std::os::fd::AsRawFd;

use log::{debug, error, warn};
use nix::sys::signal::Signal;
use nix::sys::wait::waitpid;
use nix::unistd::Pid;

use super::builtin::{self, Builtin};
use super::fd::{self, Pipes, StdioRedirect};
use super::stage::{self, SpawnContext, EXIT_NOT_FOUND};
use crate::shell::error::ShellError;
use crate::shell::job_manager::Job;
use crate::shell::parser::ast::{Pipeline, Stage};
use crate::shell::parser::{conditional, split};
use crate::shell::signals::{self, SigchldBlock};
use crate::shell::state::ShellState;

/// 后台作业启动后立即返回的状态
pub const STARTED: i32 = 0;

pub struct Executor {
    state: ShellState,
}

impl Executor {
    pub fn new(state: ShellState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &ShellState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ShellState {
        &mut self.state
    }

    /// 执行一行 token，返回这一行的退出码
    pub fn execute(&mut self, tokens: &[String]) -> Result<i32, ShellError> {
        debug!("执行命令: {:?}", tokens);
        let result = if conditional::is_conditional(tokens) {
            evaluate_conditional(&mut self.state, tokens)
        } else {
            split(tokens).and_then(|pipeline| run(&mut self.state, &pipeline))
        };
        self.state.last_status = match &result {
            Ok(status) => *status,
            Err(e) => e.status(),
        };
        result
    }

    pub fn reap_jobs(&mut self) -> Vec<Job> {
        let finished = self.state.jobs.reap();
        if !finished.is_empty() {
            debug!(
                "{} 个后台作业结束, 仍在运行 {} 个",
                finished.len(),
                self.state.jobs.get_jobs().len()
            );
        }
        finished
    }
}

/// `if <cond> then <a> [else <b>] end`。三段都先解析，有任何语法错误整行都不执行。
pub fn evaluate_conditional(state: &mut ShellState, tokens: &[String]) -> Result<i32, ShellError> {
    let block = conditional::parse(tokens)?;
    let mut condition = split(block.condition)?;
    let then_branch = split(block.then_branch)?;
    let else_branch = block.else_branch.map(split).transpose()?;

    // 条件总是在前台执行
    condition.background = false;
    let status = run(state, &condition)?;
    debug!("条件 `{}` 返回 {}", condition, status);

    match (status, else_branch) {
        (0, _) => run(state, &then_branch),
        (_, Some(else_branch)) => run(state, &else_branch),
        (_, None) => Ok(0),
    }
}

/// 执行一条流水线：N 个 stage，N-1 个管道，前台等待最后一个 stage 的状态
pub fn run(state: &mut ShellState, pipeline: &Pipeline) -> Result<i32, ShellError> {
    if pipeline.len() == 1 && !pipeline.background {
        if let Some(builtin) = builtin::lookup(pipeline.first().command.program()) {
            return run_builtin(state, pipeline.first(), builtin);
        }
    }

    let foreground = !pipeline.background;
    if foreground {
        state.jobs.ensure_foreground_free()?;
    }

    // 所有描述符在 fork 之前准备好，任何一步失败都不会留下进程
    let input = pipeline
        .first()
        .redirections
        .input
        .as_deref()
        .map(fd::open_input)
        .transpose()?;
    let output = pipeline
        .last()
        .redirections
        .output
        .as_ref()
        .map(fd::open_output)
        .transpose()?;
    let pipes = Pipes::create(pipeline.len() - 1)?;

    if foreground {
        // 丢掉提示符阶段残留的中断
        signals::take_interrupt();
    }
    // leader 在后面的 stage 加入进程组之前就可能退出；被异步回收后进程组随之消失，
    // 所以 fork 期间无论前后台都屏蔽 SIGCHLD
    let sigchld = SigchldBlock::new()?;
    let terminal = if foreground { state.terminal } else { None };

    let last = pipeline.len() - 1;
    let mut pids: Vec<Pid> = Vec::with_capacity(pipeline.len());
    let mut lease = None;
    for (i, stage) in pipeline.stages.iter().enumerate() {
        let stdin = if i > 0 {
            Some(pipes.reader(i - 1))
        } else {
            input.as_ref().map(|f| f.as_raw_fd())
        };
        let stdout = if i < last {
            Some(pipes.writer(i))
        } else {
            output.as_ref().map(|f| f.as_raw_fd())
        };
        let ctx = SpawnContext {
            pgid: pids.first().copied(),
            terminal,
        };

        match stage::spawn(state, stage, stdin, stdout, ctx) {
            Ok(pid) => {
                if pids.is_empty() && foreground {
                    state.jobs.set_foreground(pid);
                    lease = terminal.map(|t| t.lease(pid));
                }
                pids.push(pid);
            }
            Err(e) => {
                error!("启动 `{}` 失败: {}", stage.command, e);
                abandon(&pids);
                state.jobs.clear_foreground();
                return Err(e);
            }
        }
    }

    // 父进程必须关闭所有管道端口，否则下游永远读不到 EOF
    drop(pipes);
    drop(input);
    drop(output);

    let pgid = pids[0];
    if pipeline.background {
        let job = state.jobs.add_job(pgid, &pids, pipeline.to_string());
        println!("[{}] {}", job.index, job.pid());
        // 作业已登记，之后由 SIGCHLD 处理函数回收
        drop(sigchld);
        return Ok(STARTED);
    }

    let result = state.jobs.wait_fg_job(pgid, &pids);
    state.jobs.clear_foreground();
    drop(lease);
    drop(sigchld);

    if result.interrupted || result.status == 128 + Signal::SIGINT as i32 {
        state.mark_interrupted(pgid);
    }
    if result.status == EXIT_NOT_FOUND {
        warn!("`{}` 返回 127: command not found", pipeline.last().command);
    }
    debug!("前台作业 {} 结束, 状态 {}", result.gid, result.status);
    Ok(result.status)
}

fn run_builtin(state: &mut ShellState, stage: &Stage, builtin: Builtin) -> Result<i32, ShellError> {
    debug!("执行内建命令: {}", stage.command);
    let _redirect = StdioRedirect::apply(&stage.redirections)?;
    Ok(builtin(state, stage.command.arguments())?)
}

/// 流水线中途 fork 失败：终止已经启动的进程并回收，不留僵尸
fn abandon(pids: &[Pid]) {
    let Some(&pgid) = pids.first() else {
        return;
    };
    if let Err(e) = signals::terminate_group(pgid) {
        error!("无法终止进程组 {}: {}", pgid, e);
    }
    for &pid in pids {
        let _ = waitpid(pid, None);
    }
}
