use super::{ConfigError, ConfigResult};
use crate::impl_default;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 脚本引擎配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    /// 入口脚本
    pub entry: PathBuf,

    /// 非相对导入的解析根目录
    pub module_root: PathBuf,

    /// 导入名缺少扩展名时追加的扩展名
    pub extension: String,

    /// QuickJS 堆内存上限（字节）
    pub memory_limit: Option<usize>,

    /// QuickJS 栈大小上限（字节）
    pub max_stack_size: Option<usize>,
}

impl_default!(ScriptConfig {
    entry: PathBuf::from("main.js"),
    module_root: PathBuf::from("."),
    extension: "js".to_string(),
    memory_limit: None,
    max_stack_size: None,
});

impl ScriptConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.extension.is_empty() {
            return Err(ConfigError::ValidationError(
                "script extension must not be empty".to_string(),
            ));
        }
        if self.extension.starts_with('.') {
            return Err(ConfigError::ValidationError(format!(
                "script extension '{}' must not start with a dot",
                self.extension
            )));
        }
        Ok(())
    }
}

/// 帧循环配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameLoopConfig {
    /// 不创建窗口，使用无头后端
    pub headless: bool,

    /// 运行指定帧数后停止
    pub max_frames: Option<u64>,
}

impl_default!(GameLoopConfig {
    headless: false,
    max_frames: None,
});
