use std::fmt;

use log::{debug, error, info};
use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::sys::wait::waitpid;
use nix::sys::wait::WaitPidFlag as WF;
use nix::sys::wait::WaitStatus as WS;
use nix::unistd::Pid;

use super::error::ShellError;
use super::signals;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    Code(i32),
    Signal(Signal),
}

impl ProcessExit {
    pub fn from_wait_status(ws: WS) -> Option<(Pid, ProcessExit)> {
        match ws {
            WS::Exited(pid, code) => Some((pid, ProcessExit::Code(code))),
            WS::Signaled(pid, sig, _core_dumped) => Some((pid, ProcessExit::Signal(sig))),
            _ => None,
        }
    }

    /// 被信号杀死时按惯例返回 128 + 信号值
    pub fn code(&self) -> i32 {
        match self {
            ProcessExit::Code(code) => *code,
            ProcessExit::Signal(sig) => 128 + *sig as i32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Done,
    Killed,
}

#[derive(Debug, Clone)]
pub struct Process {
    pub pid: Pid,
    pub exit: Option<ProcessExit>,
}

#[derive(Debug, Clone)]
pub struct Job {
    pub gid: Pid,
    pub index: usize,
    pub command: String,
    pub processes: Vec<Process>,
    pub status: JobStatus,
}

impl Job {
    fn new(gid: Pid, pids: &[Pid], index: usize, command: String) -> Self {
        Self {
            gid,
            index,
            command,
            processes: pids.iter().map(|&pid| Process { pid, exit: None }).collect(),
            status: JobStatus::Running,
        }
    }

    /// 第一个 stage 的 pid，也就是进程组 leader
    pub fn pid(&self) -> Pid {
        self.gid
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.processes.iter().any(|p| p.pid == pid)
    }

    fn record(&mut self, pid: Pid, exit: ProcessExit) {
        if let Some(process) = self.processes.iter_mut().find(|p| p.pid == pid) {
            process.exit = Some(exit);
        }
        if self.processes.iter().all(|p| p.exit.is_some()) {
            self.status = match self.processes.last().and_then(|p| p.exit) {
                Some(ProcessExit::Signal(_)) => JobStatus::Killed,
                _ => JobStatus::Done,
            };
        }
    }

    /// 成员都已被别处回收但没有拿到状态
    fn finish_unreported(&mut self) {
        if self.status == JobStatus::Running {
            self.status = JobStatus::Done;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status != JobStatus::Running
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self.status {
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Killed => "killed",
        };
        write!(
            f,
            "[{}] {} {} {}",
            self.index,
            self.pid(),
            status,
            self.command
        )
    }
}

#[derive(Debug, Default)]
pub struct JobManager {
    jobs: Vec<Job>,
    foreground: Option<Pid>,
}

impl JobManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_jobs(&self) -> &Vec<Job> {
        &self.jobs
    }

    fn find_available_index(&self) -> usize {
        let mut index = 1;
        while self.jobs.iter().any(|job| job.index == index) {
            index += 1;
        }
        index
    }

    pub fn add_job(&mut self, gid: Pid, pids: &[Pid], command: String) -> &Job {
        let index = self.find_available_index();
        info!("后台作业 [{}] 启动: pgid={} {}", index, gid, command);
        self.jobs.push(Job::new(gid, pids, index, command));
        let pos = self.jobs.len() - 1;
        &self.jobs[pos]
    }

    pub fn foreground(&self) -> Option<Pid> {
        self.foreground
    }

    /// 终端同一时间只属于一个前台作业
    pub fn ensure_foreground_free(&self) -> Result<(), ShellError> {
        match self.foreground() {
            Some(gid) => {
                error!("前台作业 {} 仍然持有终端", gid);
                Err(ShellError::ForegroundBusy)
            }
            None => Ok(()),
        }
    }

    pub fn set_foreground(&mut self, gid: Pid) {
        self.foreground = Some(gid);
    }

    pub fn clear_foreground(&mut self) {
        self.foreground = None;
    }

    /// 等待前台作业的所有成员退出，取最后一个 stage 的状态。
    /// 调用方负责在 fork 之前屏蔽 SIGCHLD。
    pub fn wait_fg_job(&mut self, gid: Pid, pids: &[Pid]) -> CommandResult {
        let mut cmd_result = CommandResult::new(gid);
        let Some(&pid_last) = pids.last() else {
            return cmd_result;
        };
        let mut remaining: Vec<Pid> = pids.to_vec();

        while !remaining.is_empty() {
            match waitpid(Pid::from_raw(-gid.as_raw()), None) {
                Ok(ws) => {
                    let Some((pid, exit)) = ProcessExit::from_wait_status(ws) else {
                        continue;
                    };
                    debug!("前台子进程 {} 结束: {:?}", pid, exit);
                    remaining.retain(|&p| p != pid);
                    if pid == pid_last {
                        cmd_result.status = exit.code();
                    }
                }
                Err(Errno::EINTR) => {
                    if signals::take_interrupt() {
                        cmd_result.interrupted = true;
                        if let Err(e) = signals::terminate_group(gid) {
                            error!("无法终止前台作业 {}: {}", gid, e);
                        }
                    }
                }
                Err(Errno::ECHILD) => break,
                Err(e) => {
                    error!("jobc unexpected waitpid error: {}", e);
                    cmd_result.status = 1;
                    break;
                }
            }
        }
        cmd_result
    }

    /// 把 SIGCHLD 处理函数回收到的状态记到对应的作业上
    fn mark_reaped(&mut self) {
        for ws in signals::drain_reaped() {
            let Some((pid, exit)) = ProcessExit::from_wait_status(ws) else {
                continue;
            };
            match self.jobs.iter_mut().find(|job| job.contains(pid)) {
                Some(job) => job.record(pid, exit),
                None => debug!("回收到不属于任何后台作业的进程 {}", pid),
            }
        }
    }

    /// 非阻塞地回收后台作业，返回已经结束的作业（同时从表中移除）
    pub fn reap(&mut self) -> Vec<Job> {
        // 轮询期间处理函数不能插进来，否则它拿走的状态会被当成 ECHILD
        let _sigchld = match signals::SigchldBlock::new() {
            Ok(guard) => Some(guard),
            Err(e) => {
                error!("无法屏蔽 SIGCHLD: {}", e);
                None
            }
        };
        self.mark_reaped();

        let mut vanished = Vec::new();
        for job in self.jobs.iter_mut().filter(|job| !job.is_finished()) {
            loop {
                match waitpid(Pid::from_raw(-job.gid.as_raw()), Some(WF::WNOHANG)) {
                    Ok(WS::StillAlive) => break,
                    Ok(ws) => {
                        if let Some((pid, exit)) = ProcessExit::from_wait_status(ws) {
                            job.record(pid, exit);
                        }
                    }
                    Err(Errno::EINTR) => continue,
                    Err(Errno::ECHILD) => {
                        vanished.push(job.gid);
                        break;
                    }
                    Err(e) => {
                        error!("回收后台作业 {} 失败: {}", job.gid, e);
                        break;
                    }
                }
            }
        }

        // 进程组已经没有可回收的成员：状态要么在槽里，要么已经丢失
        if !vanished.is_empty() {
            self.mark_reaped();
            for job in self.jobs.iter_mut().filter(|job| vanished.contains(&job.gid)) {
                job.finish_unreported();
            }
        }

        let (finished, running): (Vec<Job>, Vec<Job>) =
            self.jobs.drain(..).partition(|job| job.is_finished());
        self.jobs = running;
        for job in &finished {
            info!("后台作业结束: {}", job);
        }
        finished
    }
}

#[derive(Clone, Debug)]
pub struct CommandResult {
    pub gid: Pid,
    pub status: i32,
    pub interrupted: bool,
}

impl CommandResult {
    pub fn new(gid: Pid) -> CommandResult {
        CommandResult {
            gid,
            status: 0,
            interrupted: false,
        }
    }
}
