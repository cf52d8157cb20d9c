use std::path::PathBuf;

use super::ast::{OutputMode, OutputTarget, RedirectOp, Redirections};
use crate::shell::error::ShellError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub redirections: Redirections,
    pub consumed: usize,
}

pub fn is_operator(token: &str) -> bool {
    RedirectOp::from_token(token).is_some()
}

/// 从 `start`（一个重定向符）开始扫描到切片末尾。
///
/// 符号后面连续的普通 token 用单个空格拼成一个路径，所以 `> my file.txt`
/// 写入的是 `my file.txt`。遇到新的符号就切换到新的目标，同一方向上后出现的覆盖先出现的。
pub fn resolve(tokens: &[String], start: usize) -> Result<Resolved, ShellError> {
    let mut redirections = Redirections::default();
    let mut current: Option<(RedirectOp, Vec<&str>)> = None;

    for token in &tokens[start..] {
        if let Some(op) = RedirectOp::from_token(token) {
            if let Some((prev, words)) = current.take() {
                commit(&mut redirections, prev, &words)?;
            }
            current = Some((op, Vec::new()));
            continue;
        }
        match current.as_mut() {
            Some((_, words)) => words.push(token),
            None => return Err(ShellError::MalformedRedirection(token.clone())),
        }
    }

    if let Some((op, words)) = current {
        commit(&mut redirections, op, &words)?;
    }

    Ok(Resolved {
        redirections,
        consumed: tokens.len() - start,
    })
}

fn commit(redirections: &mut Redirections, op: RedirectOp, words: &[&str]) -> Result<(), ShellError> {
    if words.is_empty() {
        return Err(ShellError::MalformedRedirection(op.as_str().to_string()));
    }
    let path = PathBuf::from(words.join(" "));
    match op {
        RedirectOp::Input => redirections.input = Some(path),
        RedirectOp::Output => {
            redirections.output = Some(OutputTarget {
                path,
                mode: OutputMode::Truncate,
            })
        }
        RedirectOp::Append => {
            redirections.output = Some(OutputTarget {
                path,
                mode: OutputMode::Append,
            })
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn tokens(line: &str) -> Vec<String> {
        line.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn test_output_truncate() {
        let t = tokens("echo hi > out.txt");
        let r = resolve(&t, 2).unwrap();
        assert_eq!(r.consumed, 2);
        assert_eq!(r.redirections.input, None);
        let out = r.redirections.output.unwrap();
        assert_eq!(out.path, PathBuf::from("out.txt"));
        assert_eq!(out.mode, OutputMode::Truncate);
    }

    #[test]
    fn test_append_and_input() {
        let t = tokens("sort < in.txt >> log.txt");
        let r = resolve(&t, 1).unwrap();
        assert_eq!(r.consumed, 4);
        assert_eq!(r.redirections.input, Some(PathBuf::from("in.txt")));
        let out = r.redirections.output.unwrap();
        assert_eq!(out.path, PathBuf::from("log.txt"));
        assert_eq!(out.mode, OutputMode::Append);
    }

    #[test]
    fn test_multi_word_path() {
        let t = tokens("cat < my notes.txt > copy of notes");
        let r = resolve(&t, 1).unwrap();
        assert_eq!(r.redirections.input, Some(PathBuf::from("my notes.txt")));
        assert_eq!(r.redirections.output.unwrap().path, PathBuf::from("copy of notes"));
    }

    #[test]
    fn test_later_operator_overrides() {
        let t = tokens("echo > a >> b");
        let out = resolve(&t, 1).unwrap().redirections.output.unwrap();
        assert_eq!(out.path, PathBuf::from("b"));
        assert_eq!(out.mode, OutputMode::Append);
    }

    #[test]
    fn test_operator_without_operand() {
        let t = tokens("echo hi >");
        assert!(matches!(
            resolve(&t, 2),
            Err(ShellError::MalformedRedirection(op)) if op == ">"
        ));

        let t = tokens("cat < > out");
        assert!(matches!(
            resolve(&t, 1),
            Err(ShellError::MalformedRedirection(op)) if op == "<"
        ));
    }

    #[test]
    fn test_must_start_at_operator() {
        let t = tokens("echo hi");
        assert!(resolve(&t, 1).is_err());
    }
}
