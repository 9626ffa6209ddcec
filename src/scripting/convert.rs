//! Value conversion between Rust types and QuickJS values.
//!
//! Every crossing of the native/script boundary goes through [`ScriptType`].
//! Conversions never coerce silently: a value of the wrong JS type raises a
//! `TypeError`, a number that does not fit the target raises a `RangeError`.
//! In both cases the exception is left pending on the context and the call
//! returns `Err(rquickjs::Error::Exception)`.

use std::borrow::Cow;

use rquickjs::{Array, Ctx, Exception, Value};

/// Upper bound on the number of elements decoded from or encoded into an array.
pub const MAX_SEQUENCE_LEN: usize = 1 << 20;

/// Largest integer magnitude a JS number represents exactly (2^53).
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// A Rust type that can cross the script boundary in both directions.
pub trait ScriptType: Sized {
    /// Name used in conversion error messages.
    fn type_name() -> Cow<'static, str>;

    /// Convert a JS value into `Self`, throwing a script-visible error on mismatch.
    fn from_script<'js>(ctx: &Ctx<'js>, value: &Value<'js>) -> rquickjs::Result<Self>;

    /// Produce a fresh JS value for `self`.
    fn to_script<'js>(&self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>>;
}

/// JS type name of a value, as reported in conversion errors.
pub fn describe(value: &Value<'_>) -> &'static str {
    if value.is_undefined() {
        "undefined"
    } else if value.is_null() {
        "null"
    } else if value.is_bool() {
        "boolean"
    } else if value.is_number() {
        "number"
    } else if value.is_string() {
        "string"
    } else if value.is_symbol() {
        "symbol"
    } else if value.is_array() {
        "array"
    } else if value.is_function() {
        "function"
    } else if value.is_object() {
        "object"
    } else {
        "unknown"
    }
}

pub(crate) fn type_mismatch<'js>(ctx: &Ctx<'js>, expected: &str, value: &Value<'js>) -> rquickjs::Error {
    Exception::throw_type(ctx, &format!("expected {expected}, got {}", describe(value)))
}

fn out_of_range(ctx: &Ctx<'_>, expected: &str, number: f64) -> rquickjs::Error {
    Exception::throw_range(ctx, &format!("expected {expected}, got {number}"))
}

/// Reads an integral number within `[min, max]`.
fn integral<'js>(ctx: &Ctx<'js>, value: &Value<'js>, expected: &str, min: f64, max: f64) -> rquickjs::Result<f64> {
    if let Some(int) = value.as_int() {
        return Ok(f64::from(int));
    }
    let Some(number) = value.as_float() else {
        return Err(type_mismatch(ctx, expected, value));
    };
    if !number.is_finite() || number.fract() != 0.0 || number < min || number > max {
        return Err(out_of_range(ctx, expected, number));
    }
    Ok(number)
}

impl ScriptType for i32 {
    fn type_name() -> Cow<'static, str> {
        Cow::Borrowed("int32")
    }

    fn from_script<'js>(ctx: &Ctx<'js>, value: &Value<'js>) -> rquickjs::Result<Self> {
        if let Some(int) = value.as_int() {
            return Ok(int);
        }
        let number = integral(ctx, value, "int32", f64::from(i32::MIN), f64::from(i32::MAX))?;
        Ok(number as i32)
    }

    fn to_script<'js>(&self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        Ok(Value::new_int(ctx.clone(), *self))
    }
}

impl ScriptType for i64 {
    fn type_name() -> Cow<'static, str> {
        Cow::Borrowed("int64")
    }

    fn from_script<'js>(ctx: &Ctx<'js>, value: &Value<'js>) -> rquickjs::Result<Self> {
        // Doubles at or above 2^63 do not fit, the lower bound -2^63 does.
        let number = integral(ctx, value, "int64", -9_223_372_036_854_775_808.0, 9_223_372_036_854_774_784.0)?;
        Ok(number as i64)
    }

    fn to_script<'js>(&self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        match i32::try_from(*self) {
            Ok(small) => Ok(Value::new_int(ctx.clone(), small)),
            Err(_) => Ok(Value::new_float(ctx.clone(), *self as f64)),
        }
    }
}

impl ScriptType for f64 {
    fn type_name() -> Cow<'static, str> {
        Cow::Borrowed("number")
    }

    fn from_script<'js>(ctx: &Ctx<'js>, value: &Value<'js>) -> rquickjs::Result<Self> {
        value.as_number().ok_or_else(|| type_mismatch(ctx, "number", value))
    }

    fn to_script<'js>(&self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        Ok(Value::new_float(ctx.clone(), *self))
    }
}

impl ScriptType for bool {
    fn type_name() -> Cow<'static, str> {
        Cow::Borrowed("boolean")
    }

    fn from_script<'js>(ctx: &Ctx<'js>, value: &Value<'js>) -> rquickjs::Result<Self> {
        value.as_bool().ok_or_else(|| type_mismatch(ctx, "boolean", value))
    }

    fn to_script<'js>(&self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        Ok(Value::new_bool(ctx.clone(), *self))
    }
}

impl ScriptType for String {
    fn type_name() -> Cow<'static, str> {
        Cow::Borrowed("string")
    }

    fn from_script<'js>(ctx: &Ctx<'js>, value: &Value<'js>) -> rquickjs::Result<Self> {
        match value.as_string() {
            // Copies out of the runtime-owned string storage.
            Some(s) => s.to_string(),
            None => Err(type_mismatch(ctx, "string", value)),
        }
    }

    fn to_script<'js>(&self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        Ok(rquickjs::String::from_str(ctx.clone(), self)?.into_value())
    }
}

impl<T: ScriptType> ScriptType for Vec<T> {
    fn type_name() -> Cow<'static, str> {
        Cow::Owned(format!("array<{}>", T::type_name()))
    }

    fn from_script<'js>(ctx: &Ctx<'js>, value: &Value<'js>) -> rquickjs::Result<Self> {
        let Some(array) = value.as_array() else {
            return Err(type_mismatch(ctx, &Self::type_name(), value));
        };
        let len = array.len();
        if len > MAX_SEQUENCE_LEN {
            return Err(Exception::throw_range(
                ctx,
                &format!("array length {len} exceeds the maximum of {MAX_SEQUENCE_LEN}"),
            ));
        }

        let mut items = Vec::with_capacity(len);
        for index in 0..len {
            let element: Value = array.get(index)?;
            // On failure the partially built vector is dropped here.
            items.push(T::from_script(ctx, &element)?);
        }
        Ok(items)
    }

    fn to_script<'js>(&self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        if self.len() > MAX_SEQUENCE_LEN {
            return Err(Exception::throw_range(
                ctx,
                &format!("array length {} exceeds the maximum of {MAX_SEQUENCE_LEN}", self.len()),
            ));
        }
        let array = Array::new(ctx.clone())?;
        for (index, item) in self.iter().enumerate() {
            array.set(index, item.to_script(ctx)?)?;
        }
        Ok(array.into_value())
    }
}

/// Whether `value` survives an `i64` round trip through a JS number.
pub fn is_exact_i64(value: i64) -> bool {
    (value as f64).abs() <= MAX_SAFE_INTEGER
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ScriptError;
    use proptest::prelude::*;
    use rquickjs::{Context, Runtime};

    fn with_ctx<R>(f: impl FnOnce(Ctx<'_>) -> R) -> R {
        let rt = Runtime::new().unwrap();
        let context = Context::full(&rt).unwrap();
        context.with(f)
    }

    fn round_trip<T: ScriptType>(value: &T) -> T {
        with_ctx(|ctx| {
            let js = value.to_script(&ctx).unwrap();
            T::from_script(&ctx, &js).unwrap()
        })
    }

    fn conversion_error<T: ScriptType>(source: &str) -> String {
        with_ctx(|ctx| {
            let value: Value = ctx.eval(source).unwrap();
            let err = T::from_script(&ctx, &value).err().expect("conversion should fail");
            ScriptError::capture(&ctx, err).message
        })
    }

    #[test]
    fn test_scalar_round_trips() {
        assert_eq!(round_trip(&-17i32), -17);
        assert_eq!(round_trip(&i32::MAX), i32::MAX);
        assert_eq!(round_trip(&(1i64 << 40)), 1i64 << 40);
        assert_eq!(round_trip(&0.25f64), 0.25);
        assert!(round_trip(&true));
        assert_eq!(round_trip(&"héllo wörld".to_string()), "héllo wörld");
    }

    #[test]
    fn test_nested_sequences_round_trip() {
        let value = vec![vec![1i32, 2], vec![], vec![3]];
        assert_eq!(round_trip(&value), value);
    }

    #[test]
    fn test_numbers_from_script_code() {
        with_ctx(|ctx| {
            let whole: Value = ctx.eval("4.0 * 2").unwrap();
            assert_eq!(i32::from_script(&ctx, &whole).unwrap(), 8);
            let big: Value = ctx.eval("2 ** 40").unwrap();
            assert_eq!(i64::from_script(&ctx, &big).unwrap(), 1i64 << 40);
            let int: Value = ctx.eval("3").unwrap();
            assert_eq!(f64::from_script(&ctx, &int).unwrap(), 3.0);
        });
    }

    #[test]
    fn test_string_is_not_coerced_to_int() {
        let message = conversion_error::<i32>("'5'");
        assert_eq!(message, "TypeError: expected int32, got string");
    }

    #[test]
    fn test_fractional_and_out_of_range_ints() {
        assert!(conversion_error::<i32>("2.5").starts_with("RangeError"));
        assert!(conversion_error::<i32>("2 ** 31").starts_with("RangeError"));
        assert!(conversion_error::<i64>("NaN").starts_with("RangeError"));
    }

    #[test]
    fn test_bool_and_string_are_strict() {
        assert_eq!(conversion_error::<bool>("1"), "TypeError: expected boolean, got number");
        assert_eq!(conversion_error::<String>("null"), "TypeError: expected string, got null");
        assert_eq!(conversion_error::<f64>("undefined"), "TypeError: expected number, got undefined");
    }

    #[test]
    fn test_sequence_element_failure_rejects_whole_array() {
        let message = conversion_error::<Vec<f64>>("[1, 2, 'three']");
        assert_eq!(message, "TypeError: expected number, got string");
        assert_eq!(
            conversion_error::<Vec<i32>>("({ length: 2 })"),
            "TypeError: expected array<int32>, got object"
        );
    }

    #[test]
    fn test_sequence_length_is_bounded() {
        let source = format!("const a = []; a.length = {}; a", MAX_SEQUENCE_LEN + 1);
        let message = conversion_error::<Vec<i32>>(&source);
        assert!(message.starts_with("RangeError: array length"));
    }

    proptest! {
        #[test]
        fn prop_i32_round_trip(v in any::<i32>()) {
            prop_assert_eq!(round_trip(&v), v);
        }

        #[test]
        fn prop_i64_round_trip(v in -(1i64 << 53)..=(1i64 << 53)) {
            prop_assume!(is_exact_i64(v));
            prop_assert_eq!(round_trip(&v), v);
        }

        #[test]
        fn prop_f64_round_trip(v in any::<f64>().prop_filter("finite", |f| f.is_finite())) {
            prop_assert_eq!(round_trip(&v), v);
        }

        #[test]
        fn prop_string_round_trip(s in ".*") {
            prop_assert_eq!(round_trip(&s), s);
        }

        #[test]
        fn prop_sequence_preserves_order(v in proptest::collection::vec(any::<i32>(), 0..64)) {
            prop_assert_eq!(round_trip(&v), v);
        }
    }
}
