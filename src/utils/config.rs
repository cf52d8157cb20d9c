use dotenv::dotenv;
use rustyline::EditMode;
use std::env;
use std::error::Error;
use std::fs;
use std::path::PathBuf;

pub struct Config {
    pub name: String,
    pub theme: String,
    pub history_file: PathBuf,
    pub editor_mode: String,
    pub logger_level: String,
    pub logger_dir: PathBuf,
    pub log_to_stderr: bool,
    pub config_dir: PathBuf,
}

impl Config {
    fn get_config_dir() -> PathBuf {
        if let Ok(home) = env::var("HOME") {
            PathBuf::from(home).join(".config/pipesh")
        } else {
            PathBuf::from("/tmp/pipesh")
        }
    }

    fn default() -> Self {
        let config_dir = Self::get_config_dir();
        Config {
            name: String::from(env!("CARGO_PKG_NAME")),
            theme: String::from("default"),
            history_file: config_dir.join(".pipesh_history"),
            editor_mode: String::from("emacs"),
            logger_level: String::from("warn"),
            logger_dir: config_dir.join("logs"),
            log_to_stderr: false,
            config_dir,
        }
    }

    pub fn new() -> Result<Self, Box<dyn Error>> {
        // 优先加载环境变量文件
        if cfg!(debug_assertions) {
            dotenv::from_filename(".env.development").ok();
        } else {
            dotenv().ok();
        }

        let mut config = Config::default();

        if let Ok(theme) = env::var("PIPESH_THEME") {
            config.theme = theme;
        }
        if let Ok(editor) = env::var("PIPESH_EDITOR") {
            config.editor_mode = editor;
        }
        if let Ok(history) = env::var("PIPESH_HISTORY") {
            config.history_file = PathBuf::from(shellexpand::tilde(&history).into_owned());
        }
        if let Ok(level) = env::var("PIPESH_LOG_LEVEL") {
            config.logger_level = level;
        }
        if let Ok(dir) = env::var("PIPESH_LOG_DIR") {
            config.logger_dir = PathBuf::from(shellexpand::tilde(&dir).into_owned());
        }
        config.log_to_stderr = env::var_os("PIPESH_LOG_STDERR").is_some();

        // 确保历史文件和日志目录存在
        if let Some(parent) = config.history_file.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("无法创建历史记录目录 {}: {}", parent.display(), e))?;
        }
        fs::create_dir_all(&config.logger_dir)
            .map_err(|e| format!("无法创建日志目录 {}: {}", config.logger_dir.display(), e))?;

        Ok(config)
    }

    pub fn get_edit_mode(&self) -> EditMode {
        match self.editor_mode.to_lowercase().as_str() {
            "vi" => EditMode::Vi,
            _ => EditMode::Emacs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_mode() {
        let mut config = Config::default();
        assert_eq!(config.get_edit_mode(), EditMode::Emacs);
        config.editor_mode = String::from("VI");
        assert_eq!(config.get_edit_mode(), EditMode::Vi);
        config.editor_mode = String::from("nano");
        assert_eq!(config.get_edit_mode(), EditMode::Emacs);
    }

    #[test]
    fn test_defaults_live_under_config_dir() {
        let config = Config::default();
        assert_eq!(config.name, "pipesh");
        assert!(config.history_file.starts_with(&config.config_dir));
        assert!(config.logger_dir.starts_with(&config.config_dir));
        assert!(!config.log_to_stderr);
    }
}
