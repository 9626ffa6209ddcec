//! 应用入口
//!
//! 把配置、后端、脚本引擎与帧循环组装起来。命令行的每种模式对应一个
//! [`Mode`]：
//!
//! 1. **运行**：源码文件、字节码文件或嵌入在可执行文件中的字节码
//! 2. **编译**：把脚本编译为字节码文件
//! 3. **嵌入**：编译并写出携带字节码的可执行文件

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use tracing::{info, warn};

use super::embed;
use super::error::{EngineError, EngineResult, ScriptError};
use super::game_loop::GameLoop;
use crate::bindings;
use crate::config::LoveConfig;
use crate::platform::{HeadlessBackend, SharedBackend};
use crate::scripting::{CompiledUnit, Engine};

/// 窗口模式下的帧间隔
const FRAME_INTERVAL: Duration = Duration::from_nanos(16_666_667);

/// 运行模式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// 运行源码；`None` 使用配置中的入口脚本
    Run(Option<PathBuf>),
    /// 运行字节码文件
    Bytecode(PathBuf),
    /// 运行嵌入的字节码
    Embedded(Vec<u8>),
    /// 编译到 `output` 后退出
    Compile { script: Option<PathBuf>, output: PathBuf },
    /// 编译并写出自包含可执行文件
    Embed { script: Option<PathBuf>, output: PathBuf },
}

/// What a finished run produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub frames: u64,
    pub bytecode_len: usize,
}

pub struct App {
    config: LoveConfig,
}

impl App {
    pub fn new(config: LoveConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LoveConfig {
        &self.config
    }

    pub fn run(&self, mode: Mode) -> EngineResult<RunSummary> {
        match mode {
            Mode::Run(script) => {
                let path = self.script_path(script);
                self.play(|engine| {
                    ensure_exists(&path)?;
                    loaded(engine.run_file(&path), || format!("failed to run {}", path.display()))
                })
            }
            Mode::Bytecode(path) => {
                let bytes = fs::read(&path)?;
                info!(target: "app", "running bytecode {} ({} bytes)", path.display(), bytes.len());
                self.play(|engine| loaded(engine.load_bytecode(&bytes), || format!("failed to load {}", path.display())))
            }
            Mode::Embedded(bytes) => {
                info!(target: "app", "running embedded bytecode ({} bytes)", bytes.len());
                self.play(|engine| loaded(engine.load_bytecode(&bytes), || "failed to load embedded bytecode".to_string()))
            }
            Mode::Compile { script, output } => {
                let unit = self.compile(&self.script_path(script))?;
                if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&output, unit.as_bytes())?;
                info!(target: "app", "wrote {} ({} bytes)", output.display(), unit.len());
                Ok(RunSummary {
                    frames: 0,
                    bytecode_len: unit.len(),
                })
            }
            Mode::Embed { script, output } => {
                let unit = self.compile(&self.script_path(script))?;
                let exe = std::env::current_exe()?;
                embed::create_executable(&exe, unit.as_bytes(), &output)?;
                Ok(RunSummary {
                    frames: 0,
                    bytecode_len: unit.len(),
                })
            }
        }
    }

    /// 编译单个脚本文件；原生模块名来自内置绑定
    pub fn compile(&self, path: &Path) -> EngineResult<CompiledUnit> {
        ensure_exists(path)?;
        let code = fs::read_to_string(path)?;
        let engine = self.engine(self.headless_backend());
        engine.compile(&code, &path.to_string_lossy())
    }

    fn script_path(&self, script: Option<PathBuf>) -> PathBuf {
        script.unwrap_or_else(|| self.config.script.entry.clone())
    }

    /// Engine with every binding registered against `backend`.
    fn engine(&self, backend: SharedBackend) -> Engine {
        let engine = Engine::new(self.config.script.clone());
        bindings::register_all(&mut engine.global(), backend);
        engine
    }

    fn headless_backend(&self) -> SharedBackend {
        let window = &self.config.window;
        Rc::new(RefCell::new(HeadlessBackend::new(window.title.clone(), window.width, window.height)))
    }

    /// 窗口后端；创建失败时退回无头后端
    fn backend(&self) -> (SharedBackend, bool) {
        if self.config.game_loop.headless {
            return (self.headless_backend(), false);
        }
        #[cfg(not(any(target_arch = "wasm32", target_os = "ios")))]
        {
            let window = &self.config.window;
            match crate::platform::WinitBackend::new(window.title.clone(), window.width, window.height) {
                Ok(backend) => return (Rc::new(RefCell::new(backend)), true),
                Err(err) => warn!(target: "app", "no window available ({}), running headless", err),
            }
        }
        (self.headless_backend(), false)
    }

    /// Loads the program with `load` and drives the frame loop until it stops.
    fn play(&self, load: impl FnOnce(&mut Engine) -> EngineResult<()>) -> EngineResult<RunSummary> {
        let (backend, windowed) = self.backend();
        {
            let window = &self.config.window;
            let created = backend.borrow_mut().create_window(&window.title, window.width, window.height);
            if !created {
                return Err(EngineError::Platform(format!(
                    "cannot create window {}x{}",
                    window.width, window.height
                )));
            }
        }

        let mut engine = self.engine(Rc::clone(&backend));
        engine.initialize()?;
        load(&mut engine)?;

        let mut game = GameLoop::new(backend)
            .with_max_frames(self.config.game_loop.max_frames)
            .with_frame_interval(windowed.then_some(FRAME_INTERVAL));
        let frames = game.run(&mut engine);
        engine.cleanup();
        Ok(RunSummary {
            frames,
            bytecode_len: 0,
        })
    }
}

fn ensure_exists(path: &Path) -> EngineResult<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(EngineError::ModuleNotFound(path.display().to_string()))
    }
}

fn loaded(ok: bool, message: impl FnOnce() -> String) -> EngineResult<()> {
    if ok {
        Ok(())
    } else {
        Err(EngineError::Script(ScriptError::new(message())))
    }
}
