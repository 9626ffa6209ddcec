//! 原生绑定
//!
//! 在首次执行脚本前注册到根命名空间：
//! - `print(msg)` - 写到标准输出
//! - `console` - `log`/`warn`/`error`，经由 `tracing` 输出
//! - `graphics` - 后端绘图能力，同时可作为 `import ... from 'graphics'` 导入

pub mod console;
pub mod graphics;

use crate::platform::SharedBackend;
use crate::scripting::Namespace;

/// Registers every built-in binding on `root`.
pub fn register_all(root: &mut Namespace, backend: SharedBackend) {
    console::register(root);
    graphics::register(root, backend);
}
