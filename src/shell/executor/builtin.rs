use std::env;
use std::io::{self, Write};

use log::debug;

use crate::shell::state::ShellState;
use crate::utils::path;

pub type Builtin = fn(&mut ShellState, &[String]) -> io::Result<i32>;

const HELP: &str = "\
pipesh builtins:
  cd [dir]               change the working directory (default: $HOME)
  pwd                    print the working directory
  true / false           return 0 / 1
  exit [n]               leave the shell
  environ                list the environment
  setenv NAME [VALUE]    set an environment variable
  unsetenv NAME          remove an environment variable
  help                   show this text

syntax:
  cmd | cmd | ...        pipeline, status of the last command
  cmd < in > out         redirection, '>>' appends
  cmd &                  run in the background
  if c then a [else b] end
  # comment              everything after a lone '#' is ignored
";

pub fn lookup(program: &str) -> Option<Builtin> {
    match program {
        "cd" => Some(builtin_cd),
        "pwd" => Some(builtin_pwd),
        "true" => Some(builtin_true),
        "false" => Some(builtin_false),
        "exit" => Some(builtin_exit),
        "environ" => Some(builtin_environ),
        "setenv" => Some(builtin_setenv),
        "unsetenv" => Some(builtin_unsetenv),
        "help" => Some(builtin_help),
        _ => None,
    }
}

fn builtin_cd(_state: &mut ShellState, args: &[String]) -> io::Result<i32> {
    let target = match args.first() {
        Some(dir) => shellexpand::tilde(dir).into_owned(),
        None => env::var("HOME").unwrap_or_else(|_| String::from("/")),
    };
    match env::set_current_dir(&target) {
        Ok(()) => {
            debug!("切换目录: {}", target);
            Ok(0)
        }
        Err(e) => {
            debug!("cd {} 失败: {}", target, e);
            writeln!(io::stderr(), "cd: {}: no such directory", target)?;
            Ok(1)
        }
    }
}

fn builtin_pwd(_state: &mut ShellState, _args: &[String]) -> io::Result<i32> {
    let dir = path::current_dir();
    if dir.is_empty() {
        return Ok(1);
    }
    writeln!(io::stdout(), "{}", dir)?;
    Ok(0)
}

fn builtin_true(_state: &mut ShellState, _args: &[String]) -> io::Result<i32> {
    Ok(0)
}

fn builtin_false(_state: &mut ShellState, _args: &[String]) -> io::Result<i32> {
    Ok(1)
}

fn builtin_exit(state: &mut ShellState, args: &[String]) -> io::Result<i32> {
    let code = match args.first() {
        // 和 waitpid 看到的一样只保留低 8 位
        Some(arg) => match arg.parse::<i32>() {
            Ok(code) => code & 0xff,
            Err(_) => {
                writeln!(io::stderr(), "exit: {}: numeric argument required", arg)?;
                2
            }
        },
        None => state.last_status,
    };
    state.exit_requested = Some(code);
    Ok(code)
}

fn builtin_environ(_state: &mut ShellState, _args: &[String]) -> io::Result<i32> {
    let mut out = io::stdout().lock();
    for (key, value) in env::vars_os() {
        writeln!(out, "{}={}", key.to_string_lossy(), value.to_string_lossy())?;
    }
    Ok(0)
}

fn builtin_setenv(_state: &mut ShellState, args: &[String]) -> io::Result<i32> {
    let Some(name) = args.first() else {
        writeln!(io::stderr(), "setenv: not enough input arguments")?;
        return Ok(1);
    };
    if !valid_name(name) {
        writeln!(io::stderr(), "setenv: {}: invalid variable name", name.escape_debug())?;
        return Ok(1);
    }
    let value = args.get(1).map(String::as_str).unwrap_or_default();
    if value.contains('\0') {
        writeln!(io::stderr(), "setenv: {}: value contains a NUL byte", name)?;
        return Ok(1);
    }
    if env::var_os(name).is_some() {
        writeln!(io::stdout(), "The variable has been overwritten")?;
    } else {
        writeln!(io::stdout(), "The variable has been created")?;
    }
    debug!("设置环境变量: {}={}", name, value);
    env::set_var(name, value);
    Ok(0)
}

fn builtin_unsetenv(_state: &mut ShellState, args: &[String]) -> io::Result<i32> {
    let Some(name) = args.first() else {
        writeln!(io::stderr(), "unsetenv: not enough input arguments")?;
        return Ok(1);
    };
    if !valid_name(name) {
        writeln!(io::stderr(), "unsetenv: {}: invalid variable name", name.escape_debug())?;
        return Ok(1);
    }
    if env::var_os(name).is_some() {
        env::remove_var(name);
        writeln!(io::stdout(), "The variable has been erased")?;
    } else {
        writeln!(io::stdout(), "The variable does not exist")?;
    }
    Ok(0)
}

/// `env::set_var` / `env::remove_var` 遇到这些名字会 panic
fn valid_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['=', '\0'])
}

fn builtin_help(_state: &mut ShellState, _args: &[String]) -> io::Result<i32> {
    write!(io::stdout(), "{}", HELP)?;
    Ok(0)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn run(name: &str, args: &[&str], state: &mut ShellState) -> i32 {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        lookup(name).unwrap()(state, &args).unwrap()
    }

    #[test]
    fn test_lookup() {
        assert!(lookup("cd").is_some());
        assert!(lookup("ls").is_none());
    }

    #[test]
    fn test_true_false() {
        let mut state = ShellState::default();
        assert_eq!(run("true", &[], &mut state), 0);
        assert_eq!(run("false", &[], &mut state), 1);
    }

    #[test]
    fn test_exit_requests_termination() {
        let mut state = ShellState::default();
        state.last_status = 4;
        assert_eq!(run("exit", &[], &mut state), 4);
        assert_eq!(state.exit_requested, Some(4));
        assert_eq!(run("exit", &["9"], &mut state), 9);
        assert_eq!(state.exit_requested, Some(9));
    }

    #[test]
    fn test_exit_code_keeps_low_byte() {
        let mut state = ShellState::default();
        assert_eq!(run("exit", &["999"], &mut state), 231);
        assert_eq!(state.exit_requested, Some(231));
        assert_eq!(run("exit", &["-1"], &mut state), 255);
        assert_eq!(run("exit", &["256"], &mut state), 0);
        assert_eq!(run("exit", &["many"], &mut state), 2);
    }

    #[test]
    fn test_setenv_rejects_names_the_environment_cannot_hold() {
        let _lock = crate::shell::TEST_LOCK
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let mut state = ShellState::default();
        assert_eq!(run("setenv", &["A=B", "x"], &mut state), 1);
        assert_eq!(run("setenv", &["PIPESH\0NUL", "x"], &mut state), 1);
        assert_eq!(run("setenv", &["PIPESH_NUL_VALUE", "a\0b"], &mut state), 1);
        assert!(env::var_os("PIPESH_NUL_VALUE").is_none());
        assert_eq!(run("unsetenv", &["PIPESH\0NUL"], &mut state), 1);
        assert_eq!(run("unsetenv", &["A=B"], &mut state), 1);
    }

    #[test]
    fn test_setenv_unsetenv() {
        let _lock = crate::shell::TEST_LOCK
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let mut state = ShellState::default();
        assert_eq!(run("setenv", &["PIPESH_TEST_VAR", "on"], &mut state), 0);
        assert_eq!(env::var("PIPESH_TEST_VAR").unwrap(), "on");
        assert_eq!(run("setenv", &["PIPESH_TEST_VAR"], &mut state), 0);
        assert_eq!(env::var("PIPESH_TEST_VAR").unwrap(), "");
        assert_eq!(run("unsetenv", &["PIPESH_TEST_VAR"], &mut state), 0);
        assert!(env::var_os("PIPESH_TEST_VAR").is_none());
        assert_eq!(run("setenv", &[], &mut state), 1);
        assert_eq!(run("unsetenv", &[], &mut state), 1);
    }

    #[test]
    fn test_cd_to_missing_directory() {
        let mut state = ShellState::default();
        assert_eq!(run("cd", &["/definitely/not/here"], &mut state), 1);
    }
}
