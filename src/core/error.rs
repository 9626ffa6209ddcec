//! 统一错误处理模块
//!
//! 提供运行时范围内的统一错误类型定义
//!
//! ## 错误类型分层
//!
//! - **脚本边界错误**: 发生在 JS 调用栈内部，以 `rquickjs::Error` 形式传播，
//!   最终被捕获为 [`ScriptError`] 并交给错误上报回调
//! - **宿主错误** (`EngineError`): 初始化、IO、编译、嵌入等 Rust 侧错误
//!
//! `EngineError` 可以同时承载两层的错误。

use std::fmt;

use rquickjs::{Ctx, Value};
use thiserror::Error;

use crate::config::ConfigError;
use crate::core::embed::EmbedError;

/// 引擎核心错误类型
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Script engine is not initialized")]
    NotInitialized,

    #[error("Script engine has been cleaned up")]
    CleanedUp,

    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Compile error in {name}: {message}")]
    Compile { name: String, message: String },

    #[error("Script error: {0}")]
    Script(#[from] ScriptError),

    #[error("QuickJS error: {0}")]
    Js(#[from] rquickjs::Error),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Embed error: {0}")]
    Embed(#[from] EmbedError),

    #[error("Platform error: {0}")]
    Platform(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// 引擎结果类型
pub type EngineResult<T> = Result<T, EngineError>;

/// 从 JS 侧捕获的异常
///
/// `message` 带有错误名前缀（例如 `TypeError: expected 2 arguments, got 1`），
/// `stack` 在异常对象没有堆栈信息时为 `None`。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct ScriptError {
    pub message: String,
    pub stack: Option<String>,
}

impl ScriptError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
        }
    }

    /// 将一次失败的 rquickjs 调用转换为 `ScriptError`
    ///
    /// 对 `Error::Exception` 会取出上下文中挂起的异常值；其他错误直接使用其描述。
    pub fn capture<'js>(ctx: &Ctx<'js>, error: rquickjs::Error) -> Self {
        if error.is_exception() {
            Self::from_thrown(&ctx.catch())
        } else {
            Self::new(error.to_string())
        }
    }

    /// 从被抛出的 JS 值中提取消息与堆栈，容忍缺失的字段
    pub fn from_thrown<'js>(thrown: &Value<'js>) -> Self {
        if let Some(exception) = thrown.as_exception() {
            let message = exception.message().unwrap_or_default();
            let name = thrown
                .as_object()
                .and_then(|obj| obj.get::<_, Option<String>>("name").ok().flatten());
            let message = match name {
                Some(name) if !name.is_empty() => format!("{name}: {message}"),
                _ => message,
            };
            let stack = exception.stack().filter(|stack| !stack.trim().is_empty());
            return Self { message, stack };
        }

        let message = match thrown.as_string() {
            Some(s) => s.to_string().unwrap_or_default(),
            None => format!("{thrown:?}"),
        };
        Self::new(message)
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(stack) = &self.stack {
            write!(f, "\n{}", stack.trim_end())?;
        }
        Ok(())
    }
}
