use std::fmt;
use std::path::PathBuf;

/// 一个命令：argv[0] 是程序名，构建后不可变
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    argv: Vec<String>,
}

impl Command {
    /// `argv` 为空时返回 `None`
    pub fn new(argv: Vec<String>) -> Option<Self> {
        if argv.is_empty() || argv.iter().any(|arg| arg.is_empty()) {
            return None;
        }
        Some(Self { argv })
    }

    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    pub fn arguments(&self) -> &[String] {
        &self.argv[1..]
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argv.join(" "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectOp {
    Input,  // <
    Output, // >
    Append, // >>
}

impl RedirectOp {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "<" => Some(RedirectOp::Input),
            ">" => Some(RedirectOp::Output),
            ">>" => Some(RedirectOp::Append),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RedirectOp::Input => "<",
            RedirectOp::Output => ">",
            RedirectOp::Append => ">>",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Truncate,
    Append,
}

/// 输出重定向：模式只在有路径时才有意义，所以两者绑在一起
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    pub path: PathBuf,
    pub mode: OutputMode,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Redirections {
    pub input: Option<PathBuf>,
    pub output: Option<OutputTarget>,
}

impl Redirections {
    pub fn is_empty(&self) -> bool {
        self.input.is_none() && self.output.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub command: Command,
    pub redirections: Redirections,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub stages: Vec<Stage>,
    pub background: bool,
}

impl Pipeline {
    pub fn first(&self) -> &Stage {
        &self.stages[0]
    }

    pub fn last(&self) -> &Stage {
        &self.stages[self.stages.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stages: Vec<String> = self.stages.iter().map(|s| s.command.to_string()).collect();
        write!(f, "{}", stages.join(" | "))?;
        if self.background {
            write!(f, " &")?;
        }
        Ok(())
    }
}

/// `if <cond> then <then> [else <else>] end` 的三段 token 区间
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionalBlock<'a> {
    pub condition: &'a [String],
    pub then_branch: &'a [String],
    pub else_branch: Option<&'a [String]>,
}
