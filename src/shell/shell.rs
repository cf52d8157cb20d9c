use log::{debug, error, warn};
use std::error::Error;
use std::io::{self, Write};

use crate::shell::error::ShellError;
use crate::shell::executor::Executor;
use crate::shell::parser::tokenize;
use crate::shell::readline::{ReadlineError, ReadlineManager};
use crate::shell::signals::{self, Terminal};
use crate::shell::state::ShellState;
use crate::utils::config::Config;
use crate::utils::theme::Theme;

pub struct Shell<'a> {
    theme: Theme,
    readline: ReadlineManager<'a>,
    executor: Executor,
    interactive: bool,
}

impl<'a> Shell<'a> {
    pub fn new(config: &'a Config) -> Result<Self, Box<dyn Error>> {
        debug!("初始化 pipesh...");

        // 交互模式下先拿到控制终端，拿不到直接退出
        let terminal = Terminal::acquire()?;
        signals::ignore_block_signals()?;
        signals::setup_sigint_handler()?;
        // 后台子进程由 SIGCHLD 处理函数回收
        signals::setup_sigchld_handler()?;

        let theme = Theme::load_theme(&config.theme);
        debug!("使用主题: {}", theme.name);

        Ok(Self {
            theme,
            readline: ReadlineManager::new(config)?,
            executor: Executor::new(ShellState::new(terminal)),
            interactive: terminal.is_some(),
        })
    }

    /// 运行主循环，返回 shell 的退出码
    pub fn run(&mut self) -> Result<i32, Box<dyn Error>> {
        self.readline.load_history();

        if self.interactive {
            println!(
                "{}",
                (self.theme.success_style)(self.theme.get_message("welcome"))
            );
            println!(
                "{}",
                (self.theme.warning_style)(self.theme.get_message("help"))
            );
        }
        debug!("pipesh 准备就绪, 交互模式: {}", self.interactive);

        let code = self.run_loop()?;
        if let Err(err) = self.readline.save_history() {
            error!("保存历史记录失败: {}", err);
        }

        debug!("退出 pipesh, 状态 {}", code);
        Ok(code)
    }

    fn run_loop(&mut self) -> Result<i32, Box<dyn Error>> {
        loop {
            self.report_finished_jobs();
            io::stdout().flush()?;

            let prompt = if self.interactive {
                self.theme.prompt()
            } else {
                String::new()
            };

            match self.readline.readline(&prompt) {
                Ok(line) => {
                    self.handle_input(&line);
                    if let Some(code) = self.executor.state().exit_requested {
                        if self.interactive {
                            println!(
                                "{}",
                                (self.theme.success_style)(self.theme.get_message("exit"))
                            );
                        }
                        return Ok(code);
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    // 提示符阶段没有前台作业
                    debug!("提示符阶段收到 Ctrl-C");
                }
                Err(ReadlineError::Eof) => {
                    debug!("接收到 EOF，退出 pipesh...");
                    if self.interactive {
                        println!(
                            "\n{}",
                            (self.theme.warning_style)(self.theme.get_message("eof_signal"))
                        );
                    }
                    return Ok(self.executor.state().last_status);
                }
                Err(err) => {
                    error!("读取输入失败: {}", err);
                    return Err(err.into());
                }
            }
        }
    }

    fn report_finished_jobs(&mut self) {
        for job in self.executor.reap_jobs() {
            debug!("后台作业结束: {}", job);
            println!("{}", job);
        }
    }

    fn handle_input(&mut self, line: &str) {
        let tokens = tokenize(line);
        if tokens.is_empty() {
            return;
        }
        if let Err(err) = self.readline.add_history(line) {
            warn!("无法写入历史记录: {}", err);
        }

        let result = self.executor.execute(&tokens);
        let interrupted = self.executor.state_mut().take_interrupted();

        match &result {
            Ok(_) => {}
            Err(ShellError::MalformedConditional(reason)) => {
                warn!("条件语句格式错误, 整行忽略: {}", reason);
            }
            Err(e) => {
                error!("执行失败: {}", e);
                eprintln!(
                    "{}: {}",
                    (self.theme.error_style)(self.theme.get_message("error")),
                    e
                );
            }
        }

        if let Some(pgid) = interrupted {
            warn!("前台进程组 {} 被中断", pgid);
            println!(
                "\n{}",
                (self.theme.warning_style)(&format!(
                    "进程 {} {}",
                    pgid,
                    self.theme.get_message("interrupt_signal")
                ))
            );
            // 被中断的这一轮不再输出状态提示
            return;
        }

        if self.interactive && self.executor.state().exit_requested.is_none() {
            println!(
                "{}",
                self.theme.status_banner(self.executor.state().last_status)
            );
        }
    }
}
