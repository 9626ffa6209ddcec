//! Namespace/module registry.
//!
//! A [`Namespace`] is a named tree node holding native functions, constant
//! values and child namespaces. The root node (`global`) is installed onto the
//! script global object once; its top-level children double as importable
//! native modules.
//!
//! Names are unique within a node across all three kinds of entries: a later
//! registration replaces whatever was registered under the same name before,
//! whether it was a function, a value or a child.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use rquickjs::{Ctx, Object, Value};

use super::callable::{to_function, IntoCallable, NativeCallable};
use super::convert::ScriptType;

/// Name of the root namespace.
pub const GLOBAL_NAMESPACE: &str = "global";

/// A constant that is materialized into a fresh script value on every install.
pub trait ConstantValue {
    fn materialize<'js>(&self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>>;
}

impl<T: ScriptType> ConstantValue for T {
    fn materialize<'js>(&self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        self.to_script(ctx)
    }
}

enum Entry {
    Function(Rc<dyn NativeCallable>),
    Value(Rc<dyn ConstantValue>),
    Child(Namespace),
}

impl Entry {
    fn kind(&self) -> &'static str {
        match self {
            Entry::Function(_) => "function",
            Entry::Value(_) => "value",
            Entry::Child(_) => "module",
        }
    }

    fn materialize<'js>(&self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        match self {
            Entry::Function(callable) => Ok(to_function(ctx, Rc::clone(callable))?.into_value()),
            Entry::Value(constant) => constant.materialize(ctx),
            Entry::Child(child) => Ok(child.to_object(ctx)?.into_value()),
        }
    }
}

/// 命名空间节点
pub struct Namespace {
    name: String,
    entries: BTreeMap<String, Entry>,
}

impl Namespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: BTreeMap::new(),
        }
    }

    /// The root `global` namespace.
    pub fn root() -> Self {
        Self::new(GLOBAL_NAMESPACE)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Existing child named `name`, or a new empty one.
    ///
    /// A function or value registered under `name` is replaced by the child.
    pub fn module(&mut self, name: &str) -> &mut Namespace {
        let is_child = matches!(self.entries.get(name), Some(Entry::Child(_)));
        if !is_child {
            self.replace(name, Entry::Child(Namespace::new(name)));
        }
        match self.entries.get_mut(name) {
            Some(Entry::Child(child)) => child,
            _ => unreachable!("child namespace was just inserted"),
        }
    }

    /// Register a native function.
    pub fn func<F, Args>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: IntoCallable<Args>,
    {
        self.callable(name, f.into_callable())
    }

    /// Register an already wrapped callable.
    pub fn callable(&mut self, name: &str, callable: Rc<dyn NativeCallable>) -> &mut Self {
        self.replace(name, Entry::Function(callable));
        self
    }

    /// Register a constant; each install produces a fresh copy.
    pub fn value<T>(&mut self, name: &str, value: T) -> &mut Self
    where
        T: ScriptType + 'static,
    {
        self.replace(name, Entry::Value(Rc::new(value)));
        self
    }

    pub fn child(&self, name: &str) -> Option<&Namespace> {
        match self.entries.get(name) {
            Some(Entry::Child(child)) => Some(child),
            _ => None,
        }
    }

    pub fn function(&self, name: &str) -> Option<Rc<dyn NativeCallable>> {
        match self.entries.get(name) {
            Some(Entry::Function(callable)) => Some(Rc::clone(callable)),
            _ => None,
        }
    }

    /// Entry names in sorted order.
    pub fn export_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Set every entry as a property of `target`, children as nested plain objects.
    pub fn install<'js>(&self, ctx: &Ctx<'js>, target: &Object<'js>) -> rquickjs::Result<()> {
        for (name, entry) in &self.entries {
            target.set(name.as_str(), entry.materialize(ctx)?)?;
        }
        Ok(())
    }

    /// A fresh plain object carrying this namespace's entries.
    pub fn to_object<'js>(&self, ctx: &Ctx<'js>) -> rquickjs::Result<Object<'js>> {
        let object = Object::new(ctx.clone())?;
        self.install(ctx, &object)?;
        Ok(object)
    }

    fn replace(&mut self, name: &str, entry: Entry) {
        if let Some(previous) = self.entries.insert(name.to_string(), entry) {
            tracing::debug!(
                target: "script",
                "{}.{}: {} replaced by later registration",
                self.name,
                name,
                previous.kind()
            );
        }
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::root()
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, entry) in &self.entries {
            match entry {
                Entry::Child(child) => map.entry(name, child),
                other => map.entry(name, &other.kind()),
            };
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rquickjs::{Context, Runtime};

    fn check(namespace: &Namespace, source: &str) {
        let rt = Runtime::new().unwrap();
        let context = Context::full(&rt).unwrap();
        context.with(|ctx| {
            namespace.install(&ctx, &ctx.globals()).unwrap();
            if let Err(err) = ctx.eval::<(), _>(source) {
                let captured = crate::core::error::ScriptError::capture(&ctx, err);
                panic!("script failed: {captured}");
            }
        });
    }

    #[test]
    fn test_last_function_registration_wins() {
        let mut root = Namespace::root();
        root.func("f", || 1).func("f", || 2);
        assert_eq!(root.len(), 1);
        check(&root, "if (f() !== 2) throw new Error('first registration survived');");
    }

    #[test]
    fn test_names_are_unique_across_kinds() {
        let mut root = Namespace::root();
        root.func("thing", || 1);
        root.value("thing", "now a value".to_string());
        assert!(root.function("thing").is_none());
        check(&root, "if (thing !== 'now a value') throw new Error(typeof thing);");

        root.module("thing").value("inner", 7);
        assert!(root.child("thing").is_some());
        check(&root, "if (thing.inner !== 7) throw new Error('child missing');");
    }

    #[test]
    fn test_module_is_idempotent() {
        let mut root = Namespace::root();
        root.module("math").func("inc", |x: i32| x + 1);
        root.module("math").func("dec", |x: i32| x - 1);
        let math = root.child("math").unwrap();
        assert_eq!(math.name(), "math");
        assert_eq!(math.export_names().collect::<Vec<_>>(), vec!["dec", "inc"]);
        check(&root, "if (math.inc(1) !== 2 || math.dec(1) !== 0) throw new Error('bad math');");
    }

    #[test]
    fn test_nested_children_install_as_objects() {
        let mut root = Namespace::root();
        root.module("outer").module("inner").func("answer", || 42);
        check(
            &root,
            "if (typeof outer.inner !== 'object' || outer.inner.answer() !== 42) throw new Error('nesting');",
        );
    }

    #[test]
    fn test_values_are_fresh_per_install() {
        let mut root = Namespace::root();
        root.value("RED", vec![1.0, 0.0, 0.0, 1.0]);
        let rt = Runtime::new().unwrap();
        let context = Context::full(&rt).unwrap();
        context.with(|ctx| {
            let first = root.to_object(&ctx).unwrap();
            let second = root.to_object(&ctx).unwrap();
            ctx.globals().set("first", first).unwrap();
            ctx.globals().set("second", second).unwrap();
            let same: bool = ctx
                .eval("first.RED[0] = 99; first.RED === second.RED || second.RED[0] === 99")
                .unwrap();
            assert!(!same);
        });
    }
}
