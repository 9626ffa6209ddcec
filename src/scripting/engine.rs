//! Engine lifecycle.
//!
//! [`Engine`] owns one QuickJS runtime and context, the root [`Namespace`]
//! and the module cache. Its lifecycle is one-shot:
//!
//! ```text
//! Uninitialized -> Initialized -> Installed -> Running -> CleanedUp
//! ```
//!
//! Once [`Engine::cleanup`] has run, every entry point logs an error and fails
//! without touching the released runtime.

use std::cell::{RefCell, RefMut};
use std::fs;
use std::path::Path;
use std::rc::Rc;

use rquickjs::function::Rest;
use rquickjs::module::Declared;
use rquickjs::{qjs, Context, Ctx, Error, Module, Object, Promise, Runtime, Value};
use tracing::{debug, error, info, warn};

use super::convert::ScriptType;
use super::loader::{CompileLoader, ModuleCache, ModuleLoader, ScriptResolver};
use super::namespace::Namespace;
use crate::config::ScriptConfig;
use crate::core::error::{EngineError, EngineResult, ScriptError};

/// Serialized QuickJS bytecode of one compiled module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledUnit(Vec<u8>);

impl CompiledUnit {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Argument lists passed from native code to script functions.
pub trait ScriptArgs {
    fn into_values<'js>(self, ctx: &Ctx<'js>) -> rquickjs::Result<Vec<Value<'js>>>;
}

impl ScriptArgs for () {
    fn into_values<'js>(self, _ctx: &Ctx<'js>) -> rquickjs::Result<Vec<Value<'js>>> {
        Ok(Vec::new())
    }
}

macro_rules! impl_script_args {
    ($($ty:ident $idx:tt),+) => {
        impl<$($ty: ScriptType,)+> ScriptArgs for ($($ty,)+) {
            fn into_values<'js>(self, ctx: &Ctx<'js>) -> rquickjs::Result<Vec<Value<'js>>> {
                Ok(vec![$(self.$idx.to_script(ctx)?),+])
            }
        }
    };
}

impl_script_args!(A 0);
impl_script_args!(A 0, B 1);
impl_script_args!(A 0, B 1, C 2);
impl_script_args!(A 0, B 1, C 2, D 3);
impl_script_args!(A 0, B 1, C 2, D 3, E 4);
impl_script_args!(A 0, B 1, C 2, D 3, E 4, F 5);
impl_script_args!(A 0, B 1, C 2, D 3, E 4, F 5, G 6);
impl_script_args!(A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7);

/// Sink for script exceptions.
pub type ErrorReporter = Rc<dyn Fn(&ScriptError)>;

fn default_reporter() -> ErrorReporter {
    Rc::new(|err: &ScriptError| {
        error!(target: "script", "{}", err);
    })
}

// Field order is drop order: the context goes before its runtime.
struct Live {
    context: Context,
    runtime: Runtime,
}

/// Unhandled promise rejections, keyed by promise, waiting to be reported.
///
/// QuickJS announces a rejection without a handler and retracts it when a
/// handler is attached later, so entries are only reported on drain.
#[derive(Clone, Default)]
struct Rejections(Rc<RefCell<Vec<(usize, ScriptError)>>>);

fn promise_key(promise: &Value<'_>) -> usize {
    // SAFETY: reads the pointer payload of an object value, never dereferenced
    unsafe { qjs::JS_VALUE_GET_PTR(promise.as_raw()) as usize }
}

impl Rejections {
    fn track(&self, promise: &Value<'_>, reason: &Value<'_>, handled: bool) {
        let key = promise_key(promise);
        let Ok(mut pending) = self.0.try_borrow_mut() else {
            return;
        };
        if handled {
            pending.retain(|(k, _)| *k != key);
        } else {
            pending.push((key, ScriptError::from_thrown(reason)));
        }
    }

    /// Drops the entry of a promise whose failure is reported elsewhere.
    fn forget(&self, promise: &Value<'_>) {
        let key = promise_key(promise);
        if let Ok(mut pending) = self.0.try_borrow_mut() {
            pending.retain(|(k, _)| *k != key);
        }
    }

    fn take(&self) -> Vec<ScriptError> {
        self.0
            .try_borrow_mut()
            .map(|mut pending| pending.drain(..).map(|(_, err)| err).collect())
            .unwrap_or_default()
    }
}

/// Copies every export in `namespace` onto the global object.
fn export_to_global<'js>(ctx: &Ctx<'js>, namespace: &Object<'js>) -> rquickjs::Result<usize> {
    let globals = ctx.globals();
    let mut count = 0;
    for prop in namespace.props::<String, Value>() {
        let (name, value) = prop?;
        globals.set(name, value)?;
        count += 1;
    }
    Ok(count)
}

/// Waits for a module evaluation promise; its rejection is the caller's error.
fn finish_evaluation(promise: &Promise<'_>, rejections: &Rejections) -> rquickjs::Result<()> {
    let finished = promise.finish::<()>();
    rejections.forget(promise.as_value());
    finished
}

/// Evaluates a declared module to completion and publishes its exports.
fn evaluate_module<'js>(
    ctx: &Ctx<'js>,
    module: Module<'js, Declared>,
    rejections: &Rejections,
) -> rquickjs::Result<usize> {
    let (module, promise) = module.eval()?;
    finish_evaluation(&promise, rejections)?;
    export_to_global(ctx, &module.namespace()?)
}

/// Reads module bytecode, links its imports through the runtime loader, then
/// evaluates it and publishes its exports.
///
/// `Module::load` only deserializes: imports of a module read from bytecode
/// stay unlinked until `JS_ResolveModule` runs, and evaluating it before that
/// dereferences unresolved import entries.
///
/// # Safety
/// `bytes` must be module bytecode written by this QuickJS version.
unsafe fn evaluate_bytecode<'js>(ctx: &Ctx<'js>, bytes: &[u8], rejections: &Rejections) -> rquickjs::Result<usize> {
    let raw = ctx.as_raw().as_ptr();
    let read = qjs::JS_ReadObject(raw, bytes.as_ptr(), bytes.len() as _, qjs::JS_READ_OBJ_BYTECODE as i32);
    if qjs::JS_IsException(read) {
        return Err(Error::Exception);
    }
    // Owns the read reference; dropping it releases the module value.
    let module = Value::from_raw(ctx.clone(), read);
    if !module.is_module() {
        return Err(Error::new_from_js(module.type_name(), "module"));
    }
    if qjs::JS_ResolveModule(raw, module.as_raw()) < 0 {
        // A failed link frees every unresolved module def, this one included.
        std::mem::forget(module);
        return Err(Error::Exception);
    }
    let def = qjs::JS_VALUE_GET_PTR(module.as_raw()).cast::<qjs::JSModuleDef>();

    // JS_EvalFunction consumes its argument.
    let evaluated = qjs::JS_EvalFunction(raw, qjs::JS_DupValue(raw, module.as_raw()));
    if qjs::JS_IsException(evaluated) {
        return Err(Error::Exception);
    }
    let promise = Promise::from_value(Value::from_raw(ctx.clone(), evaluated))?;
    finish_evaluation(&promise, rejections)?;

    let namespace = qjs::JS_GetModuleNamespace(raw, def);
    if qjs::JS_IsException(namespace) {
        return Err(Error::Exception);
    }
    let namespace = Object::from_value(Value::from_raw(ctx.clone(), namespace))?;
    export_to_global(ctx, &namespace)
}

/// QuickJS 脚本引擎
pub struct Engine {
    config: ScriptConfig,
    registry: Rc<RefCell<Namespace>>,
    cache: ModuleCache,
    live: Option<Live>,
    installed: bool,
    cleaned_up: bool,
    reporter: ErrorReporter,
    rejections: Rejections,
}

impl Engine {
    pub fn new(config: ScriptConfig) -> Self {
        Self {
            config,
            registry: Rc::new(RefCell::new(Namespace::root())),
            cache: ModuleCache::default(),
            live: None,
            installed: false,
            cleaned_up: false,
            reporter: default_reporter(),
            rejections: Rejections::default(),
        }
    }

    pub fn config(&self) -> &ScriptConfig {
        &self.config
    }

    /// 初始化运行时；重复调用无副作用
    pub fn initialize(&mut self) -> EngineResult<()> {
        if self.cleaned_up {
            error!(target: "script", "initialize called after cleanup");
            return Err(EngineError::CleanedUp);
        }
        if self.live.is_some() {
            return Ok(());
        }

        let runtime = Runtime::new()?;
        if let Some(limit) = self.config.memory_limit {
            runtime.set_memory_limit(limit);
        }
        if let Some(size) = self.config.max_stack_size {
            runtime.set_max_stack_size(size);
        }

        let registry = Rc::clone(&self.registry);
        let resolver = ScriptResolver::new(
            move |name| {
                registry
                    .try_borrow()
                    .map(|root| root.child(name).is_some())
                    .unwrap_or(false)
            },
            self.config.module_root.clone(),
            self.config.extension.clone(),
        );
        let loader = ModuleLoader::new(Rc::clone(&self.registry), Rc::clone(&self.cache));
        runtime.set_loader(resolver, loader);

        let rejections = self.rejections.clone();
        runtime.set_host_promise_rejection_tracker(Some(Box::new(
            move |_ctx: Ctx<'_>, promise: Value<'_>, reason: Value<'_>, handled: bool| {
                rejections.track(&promise, &reason, handled);
            },
        )));

        let context = Context::full(&runtime)?;
        self.live = Some(Live { context, runtime });
        info!(target: "script", "QuickJS runtime initialized");
        Ok(())
    }

    /// Root namespace. Registrations must happen before the first evaluation.
    pub fn global(&self) -> RefMut<'_, Namespace> {
        self.registry.borrow_mut()
    }

    /// Replace the sink that receives script exceptions.
    pub fn set_error_reporter(&mut self, reporter: impl Fn(&ScriptError) + 'static) {
        self.reporter = Rc::new(reporter);
    }

    pub fn is_initialized(&self) -> bool {
        self.live.is_some()
    }

    pub fn is_installed(&self) -> bool {
        self.installed
    }

    pub fn is_cleaned_up(&self) -> bool {
        self.cleaned_up
    }

    /// Resolved names of on-disk modules loaded so far, sorted.
    pub fn cached_modules(&self) -> Vec<String> {
        let mut names: Vec<String> = self.cache.borrow().keys().cloned().collect();
        names.sort();
        names
    }

    /// Live context, or `None` with a logged error when unusable.
    fn live_context(&self, operation: &str) -> Option<Context> {
        if self.cleaned_up {
            error!(target: "script", "{} called after cleanup", operation);
            return None;
        }
        match &self.live {
            Some(live) => Some(live.context.clone()),
            None => {
                error!(target: "script", "{} called before initialize", operation);
                None
            }
        }
    }

    fn report(&self, err: &ScriptError) {
        (self.reporter)(err);
    }

    /// Pushes the root namespace onto the global object, once.
    fn install(&mut self, ctx: &Ctx<'_>) -> bool {
        if self.installed {
            return true;
        }
        let result = match self.registry.try_borrow() {
            Ok(root) => root
                .install(ctx, &ctx.globals())
                .map(|_| root.len())
                .map_err(|err| ScriptError::capture(ctx, err)),
            Err(_) => Err(ScriptError::new("namespace registry is borrowed during install")),
        };
        match result {
            Ok(count) => {
                self.installed = true;
                debug!(target: "script", "installed {} global entries", count);
                true
            }
            Err(err) => {
                self.report(&err);
                false
            }
        }
    }

    /// Reports a failed script operation; `true` on success.
    fn settle<T>(&self, ctx: &Ctx<'_>, result: rquickjs::Result<T>) -> bool {
        match result {
            Ok(_) => true,
            Err(err) => {
                self.report(&ScriptError::capture(ctx, err));
                false
            }
        }
    }

    /// 调用全局脚本函数
    ///
    /// Returns `false` when `name` is missing or not callable (without side
    /// effects) and when the call throws (after reporting the exception).
    pub fn call_global<A: ScriptArgs>(&mut self, name: &str, args: A) -> bool {
        self.invoke_global(name, args, |_, _| Ok(())).is_some()
    }

    /// Like [`Engine::call_global`], converting the return value to `R`.
    pub fn call_global_with<R: ScriptType, A: ScriptArgs>(&mut self, name: &str, args: A) -> Option<R> {
        self.invoke_global(name, args, |ctx, value| R::from_script(ctx, &value))
    }

    fn invoke_global<A, T>(
        &mut self,
        name: &str,
        args: A,
        convert: impl for<'js> FnOnce(&Ctx<'js>, Value<'js>) -> rquickjs::Result<T>,
    ) -> Option<T>
    where
        A: ScriptArgs,
    {
        let context = self.live_context("call_global")?;
        context.with(|ctx| {
            let value: Value = ctx.globals().get(name).ok()?;
            let function = value.as_function()?.clone();
            let result = args
                .into_values(&ctx)
                .and_then(|values| function.call::<_, Value>((Rest(values),)))
                .and_then(|value| convert(&ctx, value));
            match result {
                Ok(value) => Some(value),
                Err(err) => {
                    let mut captured = ScriptError::capture(&ctx, err);
                    if captured.stack.is_none() {
                        captured.message = format!("{} (in {})", captured.message, name);
                    }
                    self.report(&captured);
                    None
                }
            }
        })
    }

    /// 以 ES 模块方式执行源码，并把导出复制到全局对象
    pub fn run_source(&mut self, code: &str, name: &str) -> bool {
        let Some(context) = self.live_context("run_source") else {
            return false;
        };
        context.with(|ctx| {
            if !self.install(&ctx) {
                return false;
            }
            let result = Module::declare(ctx.clone(), name, code)
                .and_then(|module| evaluate_module(&ctx, module, &self.rejections));
            if let Ok(count) = &result {
                debug!(target: "script", "module '{}' exported {} bindings", name, count);
            }
            self.settle(&ctx, result)
        })
    }

    /// Reads `path` and runs it as the module named by the path.
    pub fn run_file(&mut self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        if self.live_context("run_file").is_none() {
            return false;
        }
        match fs::read_to_string(path) {
            Ok(code) => {
                info!(target: "script", "running {}", path.display());
                self.run_source(&code, &path.to_string_lossy())
            }
            Err(err) => {
                error!(target: "script", "cannot read {}: {}", path.display(), err);
                false
            }
        }
    }

    /// 以经典脚本方式在全局作用域中执行源码
    pub fn eval_script(&mut self, code: &str, name: &str) -> bool {
        let Some(context) = self.live_context("eval_script") else {
            return false;
        };
        context.with(|ctx| {
            if !self.install(&ctx) {
                return false;
            }
            debug!(target: "script", "evaluating script '{}'", name);
            let result = ctx.eval::<(), _>(code);
            self.settle(&ctx, result)
        })
    }

    /// 编译为字节码
    ///
    /// Runs in a throwaway runtime: native modules resolve to stubs exporting
    /// `undefined` under the same names, so the live globals are never touched.
    pub fn compile(&self, code: &str, name: &str) -> EngineResult<CompiledUnit> {
        if self.cleaned_up {
            error!(target: "script", "compile called after cleanup");
            return Err(EngineError::CleanedUp);
        }
        let compile_error = |message: String| EngineError::Compile {
            name: name.to_string(),
            message,
        };

        let loader = match self.registry.try_borrow() {
            Ok(root) => CompileLoader::new(&root, Rc::clone(&self.cache)),
            Err(_) => return Err(compile_error("namespace registry is borrowed".to_string())),
        };
        let natives = loader.native_names();
        let resolver = ScriptResolver::new(
            move |name| natives.iter().any(|native| native == name),
            self.config.module_root.clone(),
            self.config.extension.clone(),
        );

        let runtime = Runtime::new()?;
        runtime.set_loader(resolver, loader);
        let context = Context::full(&runtime)?;
        let unit = context.with(|ctx| {
            Module::declare(ctx.clone(), name, code)
                .and_then(|module| module.write(false))
                .map_err(|err| compile_error(ScriptError::capture(&ctx, err).message))
        })?;
        info!(target: "script", "compiled '{}' to {} bytes of bytecode", name, unit.len());
        Ok(CompiledUnit(unit))
    }

    /// 加载并执行字节码，随后把导出复制到全局对象
    pub fn load_bytecode(&mut self, bytes: &[u8]) -> bool {
        let Some(context) = self.live_context("load_bytecode") else {
            return false;
        };
        if bytes.is_empty() {
            error!(target: "script", "load_bytecode called with an empty buffer");
            return false;
        }
        context.with(|ctx| {
            if !self.install(&ctx) {
                return false;
            }
            // SAFETY: QuickJS bounds-checks the buffer while reading; the bytes are
            // module bytecode written by `compile` for this QuickJS version.
            let result = unsafe { evaluate_bytecode(&ctx, bytes, &self.rejections) };
            if let Ok(count) = &result {
                debug!(target: "script", "bytecode module exported {} bindings", count);
            }
            self.settle(&ctx, result)
        })
    }

    /// Drains the promise job queue; returns the number of jobs run.
    pub fn run_pending_jobs(&mut self) -> usize {
        if self.cleaned_up {
            return 0;
        }
        let Some(live) = &self.live else {
            return 0;
        };
        let mut ran = 0;
        loop {
            match live.runtime.execute_pending_job() {
                Ok(true) => ran += 1,
                Ok(false) => break,
                Err(job) => {
                    ran += 1;
                    let captured = job.0.with(|ctx| ScriptError::from_thrown(&ctx.catch()));
                    self.report(&captured);
                }
            }
        }
        for rejection in self.rejections.take() {
            self.report(&rejection);
        }
        ran
    }

    /// 释放运行时；之后所有调用都会失败
    pub fn cleanup(&mut self) {
        if self.cleaned_up {
            warn!(target: "script", "cleanup called twice");
            return;
        }
        if let Some(live) = self.live.take() {
            live.runtime.run_gc();
            drop(live);
        }
        self.cache.borrow_mut().clear();
        let dropped = self.rejections.take().len();
        if dropped > 0 {
            debug!(target: "script", "dropped {} unreported promise rejections", dropped);
        }
        self.cleaned_up = true;
        info!(target: "script", "script engine cleaned up");
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(ScriptConfig::default())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if !self.cleaned_up {
            self.cleanup();
        }
    }
}
