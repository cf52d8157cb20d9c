use log::{debug, error};
use std::error::Error;
use std::process;

use crate::shell::Shell;
use crate::utils::config::Config;
use crate::utils::log::init_logger;

mod shell;
mod utils;

fn main() -> Result<(), Box<dyn Error>> {
    let config = Config::new()?;
    init_logger(&config)?;
    debug!("配置加载成功 {}", config.config_dir.display());

    // shell 在退出前析构，历史记录已经保存
    let code = {
        let mut shell = Shell::new(&config).inspect_err(|e| error!("pipesh 启动失败: {}", e))?;
        shell.run().inspect_err(|e| error!("pipesh 异常退出: {}", e))?
    };
    if code != 0 {
        process::exit(code);
    }
    Ok(())
}
