//! The `console` binding.

use std::sync::Arc;

use rquickjs::function::{Opt, Rest};
use rquickjs::{Ctx, Function, Object, Value};

use super::convert;
use super::output::{OutputLevel, OutputSink};

/// Join arguments with spaces. Non-null objects are pretty-printed as JSON
/// with a 2-space indent; everything else goes through `String(value)`.
pub(crate) fn format_args<'js>(ctx: &Ctx<'js>, args: &[Value<'js>]) -> rquickjs::Result<String> {
    let mut parts = Vec::with_capacity(args.len());
    for arg in args {
        let part = if arg.is_object() && !arg.is_function() {
            match convert::stringify(ctx, arg.clone(), Some(2))? {
                Some(json) => json,
                None => convert::display(ctx, arg.clone())?,
            }
        } else {
            convert::display(ctx, arg.clone())?
        };
        parts.push(part);
    }
    Ok(parts.join(" "))
}

/// One line per element: `<index>: <element as JSON>`. Non-arrays are
/// pretty-printed whole.
fn format_table<'js>(ctx: &Ctx<'js>, data: Value<'js>) -> rquickjs::Result<String> {
    let Some(array) = data.as_array() else {
        return Ok(convert::stringify(ctx, data, Some(2))?.unwrap_or_else(|| "undefined".to_string()));
    };
    let mut lines = Vec::with_capacity(array.len());
    for (i, item) in array.iter::<Value<'js>>().enumerate() {
        let item = convert::stringify(ctx, item?, None)?.unwrap_or_else(|| "undefined".to_string());
        lines.push(format!("{}: {}", i, item));
    }
    Ok(lines.join("\n"))
}

pub(crate) fn install<'js>(ctx: &Ctx<'js>, sink: &Arc<dyn OutputSink>) -> rquickjs::Result<Object<'js>> {
    let console = Object::new(ctx.clone())?;
    let levels = [
        ("log", OutputLevel::Log),
        ("error", OutputLevel::Error),
        ("warn", OutputLevel::Warn),
        ("info", OutputLevel::Info),
        ("debug", OutputLevel::Log),
    ];
    for (name, level) in levels {
        let sink = Arc::clone(sink);
        let method = Function::new(ctx.clone(), move |ctx: Ctx<'js>, args: Rest<Value<'js>>| {
            let message = format_args(&ctx, &args.0)?;
            sink.emit(level, &message);
            rquickjs::Result::Ok(())
        })?;
        console.set(name, method.with_name(name)?)?;
    }

    let dir_sink = Arc::clone(sink);
    let dir = Function::new(ctx.clone(), move |ctx: Ctx<'js>, value: Opt<Value<'js>>| {
        let value = value.0.unwrap_or_else(|| Value::new_undefined(ctx.clone()));
        let message = convert::stringify(&ctx, value, Some(2))?.unwrap_or_else(|| "undefined".to_string());
        dir_sink.emit(OutputLevel::Log, &message);
        rquickjs::Result::Ok(())
    })?;
    console.set("dir", dir.with_name("dir")?)?;

    let table_sink = Arc::clone(sink);
    let table = Function::new(ctx.clone(), move |ctx: Ctx<'js>, data: Opt<Value<'js>>| {
        let data = data.0.unwrap_or_else(|| Value::new_undefined(ctx.clone()));
        let message = format_table(&ctx, data)?;
        table_sink.emit(OutputLevel::Log, &message);
        rquickjs::Result::Ok(())
    })?;
    console.set("table", table.with_name("table")?)?;

    Ok(console)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rquickjs::{Context, Runtime};

    use super::*;

    fn format(source: &str) -> String {
        let rt = Runtime::new().unwrap();
        let ctx = Context::full(&rt).unwrap();
        ctx.with(|ctx| {
            let args: rquickjs::Array = ctx.eval(source).unwrap();
            let args: Vec<Value> = args.iter().collect::<rquickjs::Result<_>>().unwrap();
            format_args(&ctx, &args).unwrap()
        })
    }

    #[test]
    fn test_format_primitives() {
        assert_eq!(format("['a', 1, true, null, undefined]"), "a 1 true null undefined");
    }

    #[test]
    fn test_format_objects_as_pretty_json() {
        assert_eq!(format("['x', {a: 1}]"), "x {\n  \"a\": 1\n}");
        assert_eq!(format("[[1, 2]]"), "[\n  1,\n  2\n]");
    }

    #[test]
    fn test_format_function_uses_string() {
        assert!(format("[function f() {}]").starts_with("function f"));
    }
}
