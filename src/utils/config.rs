use dotenv::dotenv;
use rustyline::EditMode;
use std::env;
use std::path::PathBuf;

const DEFAULT_HISTORY_SIZE: usize = 1000;

#[derive(Debug, Clone)]
pub struct Config {
    pub name: String,
    pub config_dir: PathBuf,
    pub theme: String,
    pub history_file: PathBuf,
    pub history_size: usize,
    pub editor_mode: String,
    pub logger_level: String,
    pub logger_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = Self::get_config_dir();
        Config {
            name: String::from("neosh"),
            theme: String::from("default"),
            history_file: config_dir.join(".neosh_history"),
            history_size: DEFAULT_HISTORY_SIZE,
            editor_mode: String::from("emacs"),
            logger_level: String::from("warn"),
            logger_dir: config_dir.join("logs"),
            config_dir,
        }
    }
}

impl Config {
    fn get_config_dir() -> PathBuf {
        if let Ok(home) = env::var("HOME") {
            PathBuf::from(home).join(".config/neosh")
        } else {
            env::temp_dir().join("neosh")
        }
    }

    pub fn new() -> Self {
        // 优先加载 .env 文件中的环境变量
        if cfg!(debug_assertions) {
            dotenv::from_filename(".env.development").ok();
        } else {
            dotenv().ok();
        }

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 用给定的查找函数覆盖默认配置
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(theme) = lookup("NEOSH_THEME") {
            config.theme = theme;
        }

        if let Some(editor) = lookup("NEOSH_EDITOR") {
            config.editor_mode = editor;
        }

        if let Some(history) = lookup("NEOSH_HISTORY") {
            config.history_file = PathBuf::from(history);
        }

        if let Some(size) = lookup("NEOSH_HISTORY_SIZE").and_then(|s| s.trim().parse().ok()) {
            config.history_size = size;
        }

        if let Some(level) = lookup("NEOSH_LOG_LEVEL") {
            config.logger_level = level;
        }

        if let Some(dir) = lookup("NEOSH_LOG_DIR") {
            config.logger_dir = PathBuf::from(dir);
        }

        config
    }

    pub fn get_edit_mode(&self) -> EditMode {
        match self.editor_mode.to_lowercase().as_str() {
            "vi" => EditMode::Vi,
            _ => EditMode::Emacs,
        }
    }
}
