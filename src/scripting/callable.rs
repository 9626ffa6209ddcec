//! Native-callable wrapping.
//!
//! [`IntoCallable`] turns any Rust closure or function of arity 0 to 8 whose
//! parameters implement [`ScriptType`] into a [`NativeCallable`]: a unit the
//! script runtime invokes with a raw argument list. Arity is checked exactly
//! before any argument is looked at; arguments are converted left to right and
//! the first failure aborts the call without running native code.

use std::fmt::Display;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use rquickjs::function::Rest;
use rquickjs::{Ctx, Exception, Function, Value};

use super::convert::ScriptType;

/// A native function exposed to scripts.
pub trait NativeCallable {
    /// Number of arguments the function requires.
    fn arity(&self) -> usize;

    /// Invoke with the raw script argument list.
    fn invoke<'js>(&self, ctx: &Ctx<'js>, args: &[Value<'js>]) -> rquickjs::Result<Value<'js>>;
}

/// Values a native function may return to script code.
pub trait ScriptReturn {
    fn into_script<'js>(self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>>;
}

impl ScriptReturn for () {
    fn into_script<'js>(self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        Ok(Value::new_undefined(ctx.clone()))
    }
}

impl<T: ScriptType> ScriptReturn for T {
    fn into_script<'js>(self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        self.to_script(ctx)
    }
}

/// `Err` becomes a thrown `Error` carrying the displayed message.
impl<R: ScriptReturn, E: Display> ScriptReturn for Result<R, E> {
    fn into_script<'js>(self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        match self {
            Ok(value) => value.into_script(ctx),
            Err(err) => Err(Exception::throw_message(ctx, &err.to_string())),
        }
    }
}

/// Conversion of a Rust function into a shared [`NativeCallable`].
///
/// `Args` is the parameter tuple and only serves to select the impl.
pub trait IntoCallable<Args> {
    fn into_callable(self) -> Rc<dyn NativeCallable>;
}

/// A typed Rust function behind the [`NativeCallable`] interface.
pub struct FnCallable<F, Args> {
    f: F,
    _args: PhantomData<fn(Args)>,
}

fn check_arity(ctx: &Ctx<'_>, expected: usize, actual: usize) -> rquickjs::Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Exception::throw_type(
            ctx,
            &format!("expected {expected} arguments, got {actual}"),
        ))
    }
}

/// Runs native code, turning a panic into an `InternalError` for the script caller.
fn guarded<R>(ctx: &Ctx<'_>, f: impl FnOnce() -> R) -> rquickjs::Result<R> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        tracing::error!(target: "script.native", "native function panicked: {}", reason);
        Exception::throw_internal(ctx, &format!("native function panicked: {reason}"))
    })
}

macro_rules! impl_callable {
    ($count:expr; $($ty:ident $var:ident $idx:tt),*) => {
        impl<F, R, $($ty,)*> NativeCallable for FnCallable<F, ($($ty,)*)>
        where
            F: Fn($($ty),*) -> R,
            R: ScriptReturn,
            $($ty: ScriptType,)*
        {
            fn arity(&self) -> usize {
                $count
            }

            fn invoke<'js>(&self, ctx: &Ctx<'js>, args: &[Value<'js>]) -> rquickjs::Result<Value<'js>> {
                check_arity(ctx, $count, args.len())?;
                $(let $var = <$ty as ScriptType>::from_script(ctx, &args[$idx])?;)*
                guarded(ctx, || (self.f)($($var),*))?.into_script(ctx)
            }
        }

        impl<F, R, $($ty,)*> IntoCallable<($($ty,)*)> for F
        where
            F: Fn($($ty),*) -> R + 'static,
            R: ScriptReturn + 'static,
            $($ty: ScriptType + 'static,)*
        {
            fn into_callable(self) -> Rc<dyn NativeCallable> {
                Rc::new(FnCallable::<F, ($($ty,)*)> {
                    f: self,
                    _args: PhantomData,
                })
            }
        }
    };
}

impl_callable!(0;);
impl_callable!(1; A a 0);
impl_callable!(2; A a 0, B b 1);
impl_callable!(3; A a 0, B b 1, C c 2);
impl_callable!(4; A a 0, B b 1, C c 2, D d 3);
impl_callable!(5; A a 0, B b 1, C c 2, D d 3, E e 4);
impl_callable!(6; A a 0, B b 1, C c 2, D d 3, E e 4, G g 5);
impl_callable!(7; A a 0, B b 1, C c 2, D d 3, E e 4, G g 5, H h 6);
impl_callable!(8; A a 0, B b 1, C c 2, D d 3, E e 4, G g 5, H h 6, I i 7);

/// Create a JS function object that forwards to `callable`.
///
/// The closure (and with it the `Rc`) is owned by the runtime through the
/// function's opaque data and released when the function is collected.
pub fn to_function<'js>(ctx: &Ctx<'js>, callable: Rc<dyn NativeCallable>) -> rquickjs::Result<Function<'js>> {
    Function::new(ctx.clone(), move |ctx: Ctx<'js>, args: Rest<Value<'js>>| {
        callable.invoke(&ctx, &args.0)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ScriptError;
    use rquickjs::{Context, Runtime};
    use std::cell::Cell;

    /// Installs `callable` as global `f`, evaluates `source`, returns result or exception text.
    fn eval_with(callable: Rc<dyn NativeCallable>, source: &str) -> Result<String, String> {
        let rt = Runtime::new().unwrap();
        let context = Context::full(&rt).unwrap();
        context.with(|ctx| {
            let function = to_function(&ctx, callable).unwrap();
            ctx.globals().set("f", function).unwrap();
            match ctx.eval::<Value, _>(source) {
                Ok(value) => Ok(format!("{value:?}")),
                Err(err) => Err(ScriptError::capture(&ctx, err).message),
            }
        })
    }

    #[test]
    fn test_arity_is_exact() {
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let add = (move |a: i32, b: i32| {
            counter.set(counter.get() + 1);
            a + b
        })
        .into_callable();
        assert_eq!(add.arity(), 2);

        let err = eval_with(Rc::clone(&add), "f(1)").unwrap_err();
        assert_eq!(err, "TypeError: expected 2 arguments, got 1");
        let err = eval_with(Rc::clone(&add), "f(1, 2, 3)").unwrap_err();
        assert_eq!(err, "TypeError: expected 2 arguments, got 3");
        assert_eq!(calls.get(), 0);

        assert!(eval_with(add, "if (f(2, 3) !== 5) throw new Error('bad sum')").is_ok());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_conversion_failure_skips_native_code() {
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let greet = (move |name: String, times: i32| {
            counter.set(counter.get() + 1);
            name.repeat(times as usize)
        })
        .into_callable();

        let err = eval_with(Rc::clone(&greet), "f('x', 'y')").unwrap_err();
        assert_eq!(err, "TypeError: expected int32, got string");
        // The first argument fails first; the second is never inspected.
        let err = eval_with(Rc::clone(&greet), "f(1, 'y')").unwrap_err();
        assert_eq!(err, "TypeError: expected string, got number");
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_void_returns_undefined() {
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        let touch = (move || counter.set(counter.get() + 1)).into_callable();
        assert!(eval_with(touch, "if (f() !== undefined) throw new Error('not undefined')").is_ok());
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_err_result_is_thrown() {
        let parse = (|text: String| text.parse::<i32>().map_err(|e| format!("cannot parse {text:?}: {e}")))
            .into_callable();
        assert!(eval_with(Rc::clone(&parse), "if (f('12') !== 12) throw new Error('bad')").is_ok());
        let err = eval_with(parse, "f('twelve')").unwrap_err();
        assert!(err.starts_with("Error: cannot parse \"twelve\""));
    }

    #[test]
    fn test_panic_becomes_internal_error() {
        let explode = (|| -> i32 { panic!("kaboom") }).into_callable();
        let err = eval_with(explode, "f()").unwrap_err();
        assert_eq!(err, "InternalError: native function panicked: kaboom");
    }

    #[test]
    fn test_script_can_catch_native_errors() {
        let strict = (|x: f64| x * 2.0).into_callable();
        let result = eval_with(
            strict,
            "let msg; try { f('nope'); } catch (e) { msg = e.message; } if (msg !== 'expected number, got string') throw new Error(msg);",
        );
        assert!(result.is_ok());
    }
}
