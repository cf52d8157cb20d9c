mod error;
mod executor;
mod job_manager;
mod parser;
mod readline;
#[allow(clippy::module_inception)]
mod shell;
mod signals;
mod state;

pub use shell::Shell;

// 中断标志和回收槽是进程级的，fork 相关的测试串行执行
#[cfg(test)]
pub(crate) static TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
