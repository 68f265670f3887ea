//! Conversions between engine values and host data.

use rquickjs::convert::Coerced;
use rquickjs::function::This;
use rquickjs::{Array, Ctx, Exception, FromJs, Function, IntoJs, Object, Value};

fn reflect<'js>(ctx: &Ctx<'js>) -> rquickjs::Result<Object<'js>> {
    ctx.globals().get("Reflect")
}

/// A JS array holding `values`.
pub(crate) fn array<'js>(ctx: &Ctx<'js>, values: Vec<Value<'js>>) -> rquickjs::Result<Array<'js>> {
    let array = Array::new(ctx.clone())?;
    for (i, value) in values.into_iter().enumerate() {
        array.set(i, value)?;
    }
    Ok(array)
}

/// `Reflect.apply(func, this, args)`; any number of arguments.
pub(crate) fn apply<'js, R: FromJs<'js>>(
    ctx: &Ctx<'js>,
    func: &Function<'js>,
    this: Value<'js>,
    args: Vec<Value<'js>>,
) -> rquickjs::Result<R> {
    let apply: Function<'js> = reflect(ctx)?.get("apply")?;
    apply.call((func.clone(), this, array(ctx, args)?))
}

/// `Reflect.construct(constructor, args)`.
pub(crate) fn construct<'js, R: FromJs<'js>>(
    ctx: &Ctx<'js>,
    constructor: &str,
    args: Vec<Value<'js>>,
) -> rquickjs::Result<R> {
    let target: Value<'js> = ctx.globals().get(constructor)?;
    let construct: Function<'js> = reflect(ctx)?.get("construct")?;
    construct.call((target, array(ctx, args)?))
}

/// `JSON.stringify(value, null, indent)`; `None` where JSON has no
/// representation (undefined, functions).
pub(crate) fn stringify<'js>(
    ctx: &Ctx<'js>,
    value: Value<'js>,
    indent: Option<i32>,
) -> rquickjs::Result<Option<String>> {
    let json: Object<'js> = ctx.globals().get("JSON")?;
    let stringify: Function<'js> = json.get("stringify")?;
    let indent = match indent {
        Some(n) => n.into_js(ctx)?,
        None => Value::new_undefined(ctx.clone()),
    };
    stringify.call((value, Value::new_null(ctx.clone()), indent))
}

/// `String(value)`.
pub(crate) fn display<'js>(ctx: &Ctx<'js>, value: Value<'js>) -> rquickjs::Result<String> {
    Coerced::<String>::from_js(ctx, value).map(|s| s.0)
}

/// Host JSON for `value`, or `None` when it has no JSON form or cannot be
/// serialised (cycles, BigInt). Conversion errors never reach the script.
pub(crate) fn js_to_json<'js>(ctx: &Ctx<'js>, value: Value<'js>) -> Option<serde_json::Value> {
    match stringify(ctx, value, None) {
        Ok(Some(text)) => serde_json::from_str(&text).ok(),
        Ok(None) => None,
        Err(e) => {
            if matches!(e, rquickjs::Error::Exception) {
                let _ = ctx.catch();
            }
            tracing::debug!("value is not JSON-serialisable: {}", e);
            None
        }
    }
}

/// Build an engine value from host JSON.
pub(crate) fn json_to_js<'js>(ctx: &Ctx<'js>, json: &serde_json::Value) -> rquickjs::Result<Value<'js>> {
    use serde_json::Value as Json;

    Ok(match json {
        Json::Null => Value::new_null(ctx.clone()),
        Json::Bool(b) => b.into_js(ctx)?,
        Json::Number(n) => match n.as_i64().and_then(|i| i32::try_from(i).ok()) {
            Some(i) => i.into_js(ctx)?,
            None => n.as_f64().unwrap_or(f64::NAN).into_js(ctx)?,
        },
        Json::String(s) => s.as_str().into_js(ctx)?,
        Json::Array(items) => {
            let values = items
                .iter()
                .map(|item| json_to_js(ctx, item))
                .collect::<rquickjs::Result<Vec<_>>>()?;
            array(ctx, values)?.into_value()
        }
        Json::Object(map) => {
            let object = Object::new(ctx.clone())?;
            for (key, value) in map {
                object.set(key.as_str(), json_to_js(ctx, value)?)?;
            }
            object.into_value()
        }
    })
}

/// A fresh `Uint8Array` holding `bytes`.
pub(crate) fn uint8_array<'js>(ctx: &Ctx<'js>, bytes: &[u8]) -> rquickjs::Result<Value<'js>> {
    let values = bytes
        .iter()
        .map(|b| i32::from(*b).into_js(ctx))
        .collect::<rquickjs::Result<Vec<_>>>()?;
    construct(ctx, "Uint8Array", vec![array(ctx, values)?.into_value()])
}

/// Longest plain array-like [`bytes_of`] will walk element by element.
pub(crate) const MAX_ARRAY_LIKE: usize = 1 << 20;

/// Bytes of any array-like value. Elements are truncated to `u8`.
///
/// A `Uint8Array` is copied straight from its backing store. Other
/// array-likes are read index by index and rejected with a `RangeError`
/// when `length` exceeds [`MAX_ARRAY_LIKE`].
pub(crate) fn bytes_of<'js>(value: &Value<'js>) -> rquickjs::Result<Vec<u8>> {
    let Some(object) = value.as_object() else {
        return Ok(Vec::new());
    };
    if let Some(bytes) = object.as_typed_array::<u8>().and_then(|typed| typed.as_bytes()) {
        return Ok(bytes.to_vec());
    }

    let len: Option<f64> = object.get("length")?;
    let len = len.filter(|n| n.is_finite() && *n > 0.0).unwrap_or(0.0);
    if len > MAX_ARRAY_LIKE as f64 {
        return Err(Exception::throw_range(
            value.ctx(),
            &format!("array-like length {} exceeds {}", len, MAX_ARRAY_LIKE),
        ));
    }
    let len = len as usize;
    let mut bytes = Vec::with_capacity(len);
    for i in 0..len {
        let byte: Coerced<i32> = object.get(i as u32)?;
        bytes.push(byte.0 as u8);
    }
    Ok(bytes)
}

/// `Object.prototype.toString.call(value)`, e.g. `[object Uint8Array]`.
pub(crate) fn type_tag<'js>(ctx: &Ctx<'js>, value: Value<'js>) -> rquickjs::Result<String> {
    let object: Object<'js> = ctx.globals().get("Object")?;
    let prototype: Object<'js> = object.get("prototype")?;
    let to_string: Function<'js> = prototype.get("toString")?;
    to_string.call((This(value),))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rquickjs::{Context, Runtime};
    use serde_json::json;

    use super::*;

    fn with_ctx(f: impl for<'js> FnOnce(Ctx<'js>)) {
        let rt = Runtime::new().unwrap();
        let ctx = Context::full(&rt).unwrap();
        ctx.with(f);
    }

    #[test]
    fn test_json_round_trip() {
        with_ctx(|ctx| {
            let input = json!({"a": [1, 2.5, "x", null, true], "b": {"c": -3}});
            let value = json_to_js(&ctx, &input).unwrap();
            assert_eq!(js_to_json(&ctx, value), Some(input));
        });
    }

    #[test]
    fn test_js_to_json_without_representation() {
        with_ctx(|ctx| {
            let undefined = Value::new_undefined(ctx.clone());
            assert_eq!(js_to_json(&ctx, undefined), None);

            let cyclic: Value = ctx.eval("const o = {}; o.self = o; o").unwrap();
            assert_eq!(js_to_json(&ctx, cyclic), None);
            // The failed stringify left no pending exception behind.
            let ok: i32 = ctx.eval("1 + 1").unwrap();
            assert_eq!(ok, 2);
        });
    }

    #[test]
    fn test_bytes() {
        with_ctx(|ctx| {
            let value = uint8_array(&ctx, b"hi\xff").unwrap();
            assert_eq!(type_tag(&ctx, value.clone()).unwrap(), "[object Uint8Array]");
            assert_eq!(bytes_of(&value).unwrap(), b"hi\xff");

            let view: Value = ctx.eval("new Uint8Array([9, 1, 2, 3]).subarray(1, 3)").unwrap();
            assert_eq!(bytes_of(&view).unwrap(), vec![1, 2]);

            let plain: Value = ctx.eval("({ length: 2, 0: 65, 1: 322 })").unwrap();
            assert_eq!(bytes_of(&plain).unwrap(), vec![65, 66]);
        });
    }

    #[test]
    fn test_bytes_rejects_huge_array_like() {
        with_ctx(|ctx| {
            let huge: Value = ctx.eval("({ length: 1e10 })").unwrap();
            assert!(matches!(bytes_of(&huge), Err(rquickjs::Error::Exception)));
            let message: String = ctx.catch().as_object().unwrap().get("message").unwrap();
            assert!(message.contains("exceeds"));
        });
    }

    #[test]
    fn test_apply_many_arguments() {
        with_ctx(|ctx| {
            let sum: Function = ctx.eval("(function () { let s = 0; for (const a of arguments) s += a; return s; })").unwrap();
            let args = (1..=20).map(|i| i.into_js(&ctx).unwrap()).collect();
            let total: i32 = apply(&ctx, &sum, Value::new_undefined(ctx.clone()), args).unwrap();
            assert_eq!(total, 210);
        });
    }
}
