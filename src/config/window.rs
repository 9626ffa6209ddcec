use super::{ConfigError, ConfigResult};
use crate::impl_default;
use serde::{Deserialize, Serialize};

/// 窗口配置
///
/// 脚本可以通过 `graphics.setWindow` 在运行时覆盖这些值。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// 窗口标题
    pub title: String,

    /// 宽度（像素）
    pub width: u32,

    /// 高度（像素）
    pub height: u32,
}

impl_default!(WindowConfig {
    title: "LoveJS".to_string(),
    width: 800,
    height: 600,
});

impl WindowConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::ValidationError(format!(
                "window size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}
