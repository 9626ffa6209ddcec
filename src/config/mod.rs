/// 统一配置系统
///
/// 提供TOML/JSON配置文件与环境变量覆盖
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod script;
pub mod window;

pub use script::{GameLoopConfig, ScriptConfig};
pub use window::WindowConfig;

/// 默认配置文件名
pub const DEFAULT_CONFIG_FILE: &str = "lovejs.toml";

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 文件读取错误
    #[error("Config file error: {0}")]
    FileError(#[from] std::io::Error),
    /// 解析错误
    #[error("Config parse error: {0}")]
    ParseError(String),
    /// 验证错误
    #[error("Config validation error: {0}")]
    ValidationError(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// 运行时主配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoveConfig {
    /// 窗口配置
    #[serde(default)]
    pub window: WindowConfig,

    /// 脚本引擎配置
    #[serde(default)]
    pub script: ScriptConfig,

    /// 帧循环配置
    #[serde(default)]
    pub game_loop: GameLoopConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl LoveConfig {
    /// 从TOML文件加载配置
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::FileError)?;
        Self::from_toml_str(&content)
    }

    /// 从TOML字符串解析配置
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 从JSON文件加载配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::FileError)?;
        Self::from_json_str(&content)
    }

    /// 从JSON字符串解析配置
    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 加载配置
    ///
    /// 查找顺序：
    /// 1. 显式给出的文件（`.json` 按JSON解析，其余按TOML）
    /// 2. 当前目录的 `lovejs.toml`
    /// 3. 默认配置
    ///
    /// 之后应用环境变量覆盖并验证。
    pub fn load(explicit: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match explicit {
            Some(path) if path.extension().is_some_and(|ext| ext == "json") => {
                Self::from_json_file(path)?
            }
            Some(path) => Self::from_toml_file(path)?,
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.is_file() {
                    tracing::info!(target: "app", "Loaded config from {}", default_path.display());
                    Self::from_toml_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 从环境变量覆盖配置
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // 窗口配置
        if let Some(val) = lookup("LOVEJS_WINDOW_WIDTH") {
            if let Ok(width) = val.parse() {
                self.window.width = width;
            }
        }
        if let Some(val) = lookup("LOVEJS_WINDOW_HEIGHT") {
            if let Ok(height) = val.parse() {
                self.window.height = height;
            }
        }
        if let Some(title) = lookup("LOVEJS_WINDOW_TITLE") {
            self.window.title = title;
        }

        // 脚本配置
        if let Some(root) = lookup("LOVEJS_MODULE_ROOT") {
            self.script.module_root = PathBuf::from(root);
        }

        // 日志配置
        if let Some(val) = lookup("LOVEJS_LOG_LEVEL") {
            if let Ok(level) = val.parse() {
                self.logging.level = level;
            }
        }
    }

    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        self.window.validate()?;
        self.script.validate()?;
        Ok(())
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: LogLevel,
}

use crate::impl_default;

impl_default!(LoggingConfig {
    level: LogLevel::Info,
});

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// 跟踪
    Trace,
    /// 调试
    Debug,
    /// 信息
    Info,
    /// 警告
    Warn,
    /// 错误
    Error,
}

impl LogLevel {
    /// `EnvFilter` 指令
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(ConfigError::ParseError(format!("unknown log level '{other}'"))),
        }
    }
}
