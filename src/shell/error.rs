use std::ffi::NulError;
use std::path::PathBuf;
use std::{error, fmt, io};

use nix::errno::Errno;

#[derive(Debug)]
pub enum ShellError {
    Fork(Errno),
    PipeCreation(Errno),
    RedirectionOpen { path: PathBuf, source: io::Error },
    MalformedRedirection(String),
    MalformedConditional(&'static str),
    EmptyStage,
    MisplacedBackground,
    InteriorRedirection(usize),
    ForegroundBusy,
    Terminal(Errno),
    Nix(Errno),
    Nul(NulError),
    Io(io::Error),
}

impl ShellError {
    /// 语法错误：整行被拒绝，不会启动任何进程
    pub fn is_syntax(&self) -> bool {
        matches!(
            self,
            ShellError::MalformedRedirection(_)
                | ShellError::MalformedConditional(_)
                | ShellError::EmptyStage
                | ShellError::MisplacedBackground
                | ShellError::InteriorRedirection(_)
        )
    }

    /// 返回给主循环的退出码
    pub fn status(&self) -> i32 {
        if self.is_syntax() {
            2
        } else {
            1
        }
    }
}

impl From<Errno> for ShellError {
    fn from(e: Errno) -> ShellError {
        ShellError::Nix(e)
    }
}

impl From<io::Error> for ShellError {
    fn from(e: io::Error) -> ShellError {
        ShellError::Io(e)
    }
}

impl From<NulError> for ShellError {
    fn from(e: NulError) -> ShellError {
        ShellError::Nul(e)
    }
}

impl fmt::Display for ShellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShellError::Fork(e) => write!(f, "child process could not be created: {}", e),
            ShellError::PipeCreation(e) => write!(f, "pipe could not be created: {}", e),
            ShellError::RedirectionOpen { path, source } => {
                write!(f, "{}: {}", path.display(), source)
            }
            ShellError::MalformedRedirection(op) => {
                write!(f, "syntax error: expected a file name after '{}'", op)
            }
            ShellError::MalformedConditional(why) => write!(f, "malformed if block: {}", why),
            ShellError::EmptyStage => write!(f, "syntax error: empty command in pipeline"),
            ShellError::MisplacedBackground => {
                write!(f, "syntax error: '&' is only allowed as the last token")
            }
            ShellError::InteriorRedirection(stage) => write!(
                f,
                "syntax error: stage {} cannot redirect a stream that is connected to a pipe",
                stage + 1
            ),
            ShellError::ForegroundBusy => write!(f, "terminal is still held by a foreground job"),
            ShellError::Terminal(e) => write!(f, "could not acquire the terminal: {}", e),
            ShellError::Nix(e) => write!(f, "system error: {}", e),
            ShellError::Nul(e) => write!(f, "argument contains a NUL byte: {}", e),
            ShellError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl error::Error for ShellError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            ShellError::Fork(e)
            | ShellError::PipeCreation(e)
            | ShellError::Terminal(e)
            | ShellError::Nix(e) => Some(e),
            ShellError::RedirectionOpen { source, .. } => Some(source),
            ShellError::Nul(e) => Some(e),
            ShellError::Io(e) => Some(e),
            _ => None,
        }
    }
}
