use nix::unistd::Pid;

use super::job_manager::JobManager;
use super::signals::Terminal;

/// 解释器的全部可变状态，按引用传给流水线执行和条件求值。
/// 环境变量和当前目录由进程本身持有，只在两行命令之间被内建命令修改。
#[derive(Debug, Default)]
pub struct ShellState {
    pub jobs: JobManager,
    pub terminal: Option<Terminal>,
    pub last_status: i32,
    pub exit_requested: Option<i32>,
    interrupted: Option<Pid>,
}

impl ShellState {
    pub fn new(terminal: Option<Terminal>) -> Self {
        Self {
            jobs: JobManager::new(),
            terminal,
            ..Self::default()
        }
    }

    pub fn mark_interrupted(&mut self, pgid: Pid) {
        self.interrupted = Some(pgid);
    }

    /// 本轮被中断的前台进程组（读取后清零）
    pub fn take_interrupted(&mut self) -> Option<Pid> {
        self.interrupted.take()
    }
}
