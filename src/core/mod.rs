//! 核心模块
//!
//! - `app` - 命令行各模式的组装与运行
//! - `game_loop` - 帧循环
//! - `embed` - 可执行文件字节码嵌入
//! - `error` - 错误类型定义

pub mod app;
pub mod embed;
pub mod error;
pub mod game_loop;
#[macro_use]
pub mod macros;

pub use app::{App, Mode, RunSummary};
pub use embed::EmbedError;
pub use error::{EngineError, EngineResult, ScriptError};
pub use game_loop::{GameLoop, LoopState, StopHandle};
