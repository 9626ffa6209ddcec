use crate::scripting::Namespace;

/// `print` and the `console` namespace.
pub fn register(root: &mut Namespace) {
    root.func("print", |msg: String| println!("{msg}"));

    root.module("console")
        .func("log", |msg: String| tracing::info!(target: "script.console", "{}", msg))
        .func("warn", |msg: String| tracing::warn!(target: "script.console", "{}", msg))
        .func("error", |msg: String| tracing::error!(target: "script.console", "{}", msg));
}
