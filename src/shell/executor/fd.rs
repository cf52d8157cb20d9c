use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use log::debug;
use nix::fcntl::OFlag;
use nix::unistd::{dup, dup2, pipe2};

use crate::shell::error::ShellError;
use crate::shell::parser::ast::{OutputMode, OutputTarget, Redirections};

const CREATE_MODE: u32 = 0o644;

pub fn open_input(path: &Path) -> Result<File, ShellError> {
    File::open(path).map_err(|source| ShellError::RedirectionOpen {
        path: path.to_path_buf(),
        source,
    })
}

pub fn open_output(target: &OutputTarget) -> Result<File, ShellError> {
    let mut options = OpenOptions::new();
    options.create(true).mode(CREATE_MODE);
    match target.mode {
        OutputMode::Truncate => options.write(true).truncate(true),
        OutputMode::Append => options.append(true),
    };
    options
        .open(&target.path)
        .map_err(|source| ShellError::RedirectionOpen {
            path: target.path.clone(),
            source,
        })
}

/// 一条流水线的 N-1 个管道。两端都带 O_CLOEXEC，exec 时自动关闭；
/// 父进程在 drop 时关闭所有端口，下游才能读到 EOF。
pub struct Pipes {
    ends: Vec<(OwnedFd, OwnedFd)>,
}

impl Pipes {
    pub fn create(count: usize) -> Result<Self, ShellError> {
        let mut ends = Vec::with_capacity(count);
        for _ in 0..count {
            ends.push(pipe2(OFlag::O_CLOEXEC).map_err(ShellError::PipeCreation)?);
        }
        debug!("创建了 {} 个管道", count);
        Ok(Self { ends })
    }

    pub fn reader(&self, index: usize) -> RawFd {
        self.ends[index].0.as_raw_fd()
    }

    pub fn writer(&self, index: usize) -> RawFd {
        self.ends[index].1.as_raw_fd()
    }
}

/// 在 shell 进程内临时替换 stdin/stdout，drop 时恢复原来的描述符
pub struct StdioRedirect {
    saved: Vec<(RawFd, OwnedFd)>,
}

impl StdioRedirect {
    pub fn apply(redirections: &Redirections) -> Result<Self, ShellError> {
        let mut guard = StdioRedirect { saved: Vec::new() };
        if redirections.is_empty() {
            return Ok(guard);
        }
        if let Some(path) = &redirections.input {
            let file = open_input(path)?;
            guard.replace(&file, libc::STDIN_FILENO)?;
        }
        if let Some(target) = &redirections.output {
            let file = open_output(target)?;
            guard.replace(&file, libc::STDOUT_FILENO)?;
        }
        Ok(guard)
    }

    fn replace(&mut self, file: &File, target: RawFd) -> Result<(), ShellError> {
        if target == libc::STDOUT_FILENO {
            io::stdout().flush()?;
        }
        let saved = unsafe { OwnedFd::from_raw_fd(dup(target)?) };
        dup2(file.as_raw_fd(), target)?;
        self.saved.push((target, saved));
        Ok(())
    }
}

impl Drop for StdioRedirect {
    fn drop(&mut self) {
        let _ = io::stdout().flush();
        for (target, saved) in self.saved.drain(..).rev() {
            if let Err(e) = dup2(saved.as_raw_fd(), target) {
                debug!("恢复描述符 {} 失败: {}", target, e);
            }
        }
    }
}
