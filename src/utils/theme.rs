use std::collections::HashMap;

use colored::Colorize;
use once_cell::sync::Lazy;

use crate::utils::path;

type Style = Box<dyn Fn(&str) -> String>;

static MESSAGES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("welcome", "pipesh 已启动"),
        ("help", "输入 help 查看内建命令和语法，Ctrl-D 退出"),
        ("exit", "再见"),
        ("eof_signal", "收到 EOF，退出 pipesh"),
        ("interrupt_signal", "收到 SIGINT 信号"),
        ("error", "错误"),
        ("command_success", "执行成功"),
        ("command_error", "执行失败"),
    ])
});

pub struct Theme {
    pub name: &'static str,
    pub success_symbol: &'static str,
    pub error_symbol: &'static str,
    pub prompt_style: Style,
    pub success_style: Style,
    pub warning_style: Style,
    pub error_style: Style,
}

impl Default for Theme {
    fn default() -> Self {
        Theme {
            name: "default",
            success_symbol: "✓",
            error_symbol: "✗",
            prompt_style: Box::new(|s: &str| s.bright_cyan().to_string()),
            success_style: Box::new(|s: &str| s.bright_green().to_string()),
            warning_style: Box::new(|s: &str| s.bright_yellow().to_string()),
            error_style: Box::new(|s: &str| s.bright_red().to_string()),
        }
    }
}

impl Theme {
    pub fn load_theme(theme_name: &str) -> Theme {
        match theme_name {
            "dark" => Theme {
                name: "dark",
                success_symbol: "●",
                error_symbol: "✗",
                prompt_style: Box::new(|s: &str| s.bright_purple().to_string()),
                success_style: Box::new(|s: &str| s.magenta().to_string()),
                warning_style: Box::new(|s: &str| s.yellow().to_string()),
                error_style: Box::new(|s: &str| s.red().to_string()),
            },
            _ => Theme::default(),
        }
    }

    /// 未知的 key 原样返回
    pub fn get_message<'a>(&self, key: &'a str) -> &'a str {
        MESSAGES.get(key).copied().unwrap_or(key)
    }

    pub fn prompt(&self) -> String {
        let dir = path::current_dir();
        let prompt = format!("pipesh:{}> ", path::basename(&dir));
        (self.prompt_style)(&prompt)
    }

    /// 每条命令之后的状态提示
    pub fn status_banner(&self, status: i32) -> String {
        if status == 0 {
            (self.success_style)(&format!(
                "{} {}",
                self.success_symbol,
                self.get_message("command_success")
            ))
        } else {
            (self.error_style)(&format!(
                "{} {} ({})",
                self.error_symbol,
                self.get_message("command_error"),
                status
            ))
        }
    }
}
