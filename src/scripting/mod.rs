//! 脚本系统
//!
//! QuickJS 与原生代码之间的双向桥接：
//! - `convert` - 值转换
//! - `callable` - 原生函数包装
//! - `namespace` - 命名空间/模块注册表
//! - `loader` - `import` 解析与原生模块合成
//! - `engine` - 引擎生命周期、全局函数调用、字节码编译与加载

pub mod callable;
pub mod convert;
pub mod engine;
pub mod loader;
pub mod namespace;

pub use callable::{IntoCallable, NativeCallable, ScriptReturn};
pub use convert::{ScriptType, MAX_SEQUENCE_LEN};
pub use engine::{CompiledUnit, Engine, ErrorReporter, ScriptArgs};
pub use namespace::{ConstantValue, Namespace, GLOBAL_NAMESPACE};
