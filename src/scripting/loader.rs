//! Module resolution for `import` statements.
//!
//! Native modules are registry children exposed through a hidden global table
//! plus a generated stub module that re-exports the table entry's properties.
//! Everything else is a script file resolved against the importer or the
//! configured module root.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::rc::Rc;

use rquickjs::loader::{Loader, Resolver};
use rquickjs::module::Declared;
use rquickjs::{Ctx, Exception, Module, Object};

use super::namespace::Namespace;

/// Global property holding the exports objects of native modules.
pub const NATIVE_TABLE: &str = "__native_modules__";

/// Source text of on-disk modules, keyed by resolved name.
///
/// Shared by the live loader and every compile runtime of one engine, so a
/// file is read from disk at most once per engine. The live runtime links a
/// name only once; hits come from compiles and from imports of files a
/// compile already read.
pub type ModuleCache = Rc<RefCell<HashMap<String, String>>>;

/// Whether `name` is a valid JS IdentifierName (ASCII subset).
pub fn is_identifier_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' || first == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn js_string(text: &str) -> String {
    serde_json::Value::from(text).to_string()
}

/// Export names of a native module that can appear in an `export` clause.
pub fn exportable_names(module: &Namespace) -> Vec<String> {
    module
        .export_names()
        .filter(|name| {
            let ok = is_identifier_name(name);
            if !ok {
                tracing::warn!(
                    target: "script.loader",
                    "module '{}': export '{}' is not an identifier name, skipped",
                    module.name(),
                    name
                );
            }
            ok
        })
        .map(str::to_string)
        .collect()
}

/// Source of a stub module binding each export from the hidden native table.
pub fn native_stub_source(module: &str, exports: &[String]) -> String {
    let mut source = format!(
        "const __native = globalThis[{}][{}];\n",
        js_string(NATIVE_TABLE),
        js_string(module)
    );
    for (index, name) in exports.iter().enumerate() {
        source.push_str(&format!(
            "const __e{index} = __native[{}];\nexport {{ __e{index} as {name} }};\n",
            js_string(name)
        ));
    }
    source
}

/// Source of a stub module declaring each export bound to `undefined`.
pub fn undefined_stub_source(exports: &[String]) -> String {
    let mut source = String::new();
    for (index, name) in exports.iter().enumerate() {
        source.push_str(&format!("const __e{index} = undefined;\nexport {{ __e{index} as {name} }};\n"));
    }
    source
}

/// Lexically resolve `.` and `..` so equal paths share a cache key.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(out.components().next_back(), Some(Component::Normal(_))) && out.pop();
                if !popped {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Maps import specifiers to module names.
pub struct ScriptResolver {
    is_native: Box<dyn Fn(&str) -> bool>,
    root: PathBuf,
    extension: String,
}

impl ScriptResolver {
    pub fn new(is_native: impl Fn(&str) -> bool + 'static, root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            is_native: Box::new(is_native),
            root: root.into(),
            extension: extension.into(),
        }
    }

    /// Resolved module name for `name` imported from the module named `base`.
    pub fn resolve_name(&self, base: &str, name: &str) -> String {
        if (self.is_native)(name) {
            return name.to_string();
        }
        let relative = name.starts_with("./") || name.starts_with("../");
        let mut path = if relative {
            Path::new(base).parent().unwrap_or_else(|| Path::new("")).join(name)
        } else {
            self.root.join(name)
        };
        if path.extension().is_none() {
            path.set_extension(&self.extension);
        }
        normalize(&path).to_string_lossy().into_owned()
    }
}

impl Resolver for ScriptResolver {
    fn resolve<'js>(&mut self, _ctx: &Ctx<'js>, base: &str, name: &str) -> rquickjs::Result<String> {
        let resolved = self.resolve_name(base, name);
        tracing::trace!(target: "script.loader", "resolve '{}' from '{}' -> '{}'", name, base, resolved);
        Ok(resolved)
    }
}

fn read_module<'js>(ctx: &Ctx<'js>, cache: &ModuleCache, name: &str) -> rquickjs::Result<Module<'js, Declared>> {
    let cached = cache.borrow().get(name).cloned();
    let source = match cached {
        Some(source) => {
            tracing::trace!(target: "script.loader", "module cache hit: {}", name);
            source
        }
        None => {
            let source = fs::read_to_string(name).map_err(|err| {
                tracing::debug!(target: "script.loader", "cannot read '{}': {}", name, err);
                Exception::throw_reference(ctx, &format!("module not found: {name}"))
            })?;
            cache.borrow_mut().insert(name.to_string(), source.clone());
            tracing::debug!(target: "script.loader", "loaded module '{}' from disk", name);
            source
        }
    };
    Module::declare(ctx.clone(), name, source)
}

/// Loader of the live engine runtime.
pub struct ModuleLoader {
    registry: Rc<RefCell<Namespace>>,
    cache: ModuleCache,
}

impl ModuleLoader {
    pub fn new(registry: Rc<RefCell<Namespace>>, cache: ModuleCache) -> Self {
        Self { registry, cache }
    }

    /// Publishes the exports object of native module `name` and returns the stub source.
    fn synthesize<'js>(&self, ctx: &Ctx<'js>, name: &str) -> rquickjs::Result<Option<String>> {
        let registry = self
            .registry
            .try_borrow()
            .map_err(|_| Exception::throw_internal(ctx, "namespace registry is borrowed during import"))?;
        let Some(module) = registry.child(name) else {
            return Ok(None);
        };

        let globals = ctx.globals();
        let table = match globals.get::<_, Option<Object>>(NATIVE_TABLE)? {
            Some(table) => table,
            None => {
                let table = Object::new(ctx.clone())?;
                globals.set(NATIVE_TABLE, table.clone())?;
                table
            }
        };
        table.set(name, module.to_object(ctx)?)?;

        let exports = exportable_names(module);
        tracing::debug!(target: "script.loader", "synthesized native module '{}' ({} exports)", name, exports.len());
        Ok(Some(native_stub_source(name, &exports)))
    }
}

impl Loader for ModuleLoader {
    fn load<'js>(&mut self, ctx: &Ctx<'js>, name: &str) -> rquickjs::Result<Module<'js, Declared>> {
        if let Some(source) = self.synthesize(ctx, name)? {
            return Module::declare(ctx.clone(), name, source);
        }
        read_module(ctx, &self.cache, name)
    }
}

/// Loader of the throwaway compile runtime: native modules become `undefined` stubs.
pub struct CompileLoader {
    natives: BTreeMap<String, Vec<String>>,
    cache: ModuleCache,
}

impl CompileLoader {
    /// Snapshot of the export names of every top-level child in `registry`.
    pub fn new(registry: &Namespace, cache: ModuleCache) -> Self {
        let natives = registry
            .export_names()
            .filter_map(|name| registry.child(name).map(|module| (name.to_string(), exportable_names(module))))
            .collect();
        Self { natives, cache }
    }

    pub fn native_names(&self) -> Vec<String> {
        self.natives.keys().cloned().collect()
    }
}

impl Loader for CompileLoader {
    fn load<'js>(&mut self, ctx: &Ctx<'js>, name: &str) -> rquickjs::Result<Module<'js, Declared>> {
        if let Some(exports) = self.natives.get(name) {
            return Module::declare(ctx.clone(), name, undefined_stub_source(exports));
        }
        read_module(ctx, &self.cache, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> ScriptResolver {
        ScriptResolver::new(|name| name == "graphics", "game", "js")
    }

    #[test]
    fn test_identifier_names() {
        assert!(is_identifier_name("setColor"));
        assert!(is_identifier_name("_private$"));
        assert!(is_identifier_name("WHITE"));
        assert!(!is_identifier_name(""));
        assert!(!is_identifier_name("2d"));
        assert!(!is_identifier_name("draw-rect"));
    }

    #[test]
    fn test_bare_names_resolve_against_root() {
        let resolver = resolver();
        assert_eq!(resolver.resolve_name("game/main.js", "util"), "game/util.js");
        assert_eq!(resolver.resolve_name("main.js", "lib/vec.mjs"), "game/lib/vec.mjs");
    }

    #[test]
    fn test_relative_names_resolve_against_importer() {
        let resolver = resolver();
        assert_eq!(resolver.resolve_name("game/scenes/title.js", "./menu"), "game/scenes/menu.js");
        assert_eq!(resolver.resolve_name("game/scenes/title.js", "../util.js"), "game/util.js");
        assert_eq!(resolver.resolve_name("title.js", "../shared"), "../shared.js");
    }

    #[test]
    fn test_native_names_are_not_paths() {
        assert_eq!(resolver().resolve_name("game/main.js", "graphics"), "graphics");
    }

    #[test]
    fn test_stub_sources() {
        let exports = vec!["clear".to_string(), "WHITE".to_string()];
        let stub = native_stub_source("graphics", &exports);
        assert!(stub.starts_with("const __native = globalThis[\"__native_modules__\"][\"graphics\"];"));
        assert!(stub.contains("const __e1 = __native[\"WHITE\"];\nexport { __e1 as WHITE };"));

        let stub = undefined_stub_source(&exports);
        assert_eq!(
            stub,
            "const __e0 = undefined;\nexport { __e0 as clear };\nconst __e1 = undefined;\nexport { __e1 as WHITE };\n"
        );
    }

    #[test]
    fn test_unexportable_names_are_skipped() {
        let mut module = Namespace::new("odd");
        module.func("ok", || 1).func("not-ok", || 2);
        assert_eq!(exportable_names(&module), vec!["ok".to_string()]);
    }
}
