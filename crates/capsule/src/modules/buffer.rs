//! Byte buffers as plain `Uint8Array`s.

use rquickjs::function::Opt;
use rquickjs::{Ctx, Function, Object, Value};

use super::{BuiltinModule, ModuleEnv};
use crate::sandbox::convert;

/// The `buffer` module: `{ Buffer }`. The same `Buffer` namespace is bound
/// as a script parameter.
#[derive(Debug, Clone, Copy, Default)]
pub struct BufferModule;

impl BuiltinModule for BufferModule {
    fn name(&self) -> &'static str {
        "buffer"
    }

    fn methods(&self) -> &'static [&'static str] {
        &["Buffer"]
    }

    fn instantiate<'js>(&self, ctx: &Ctx<'js>, _env: &ModuleEnv) -> rquickjs::Result<Object<'js>> {
        let module = Object::new(ctx.clone())?;
        module.set("Buffer", namespace(ctx)?)?;
        Ok(module)
    }
}

/// `Buffer.from/toString/alloc/isBuffer`. Only UTF-8 is supported; the
/// encoding argument is accepted and ignored.
fn namespace<'js>(ctx: &Ctx<'js>) -> rquickjs::Result<Object<'js>> {
    let buffer = Object::new(ctx.clone())?;

    // Strings are UTF-8 encoded; anything else goes to the Uint8Array
    // constructor as-is (length, array, another buffer).
    let from = Function::new(ctx.clone(), |ctx: Ctx<'js>, value: Value<'js>, _encoding: Opt<Value<'js>>| {
        match value.as_string() {
            Some(s) => convert::uint8_array(&ctx, s.to_string()?.as_bytes()),
            None => convert::construct::<Value<'js>>(&ctx, "Uint8Array", vec![value]),
        }
    })?;
    buffer.set("from", from.with_name("from")?)?;

    let to_string = Function::new(ctx.clone(), |bytes: Value<'js>, _encoding: Opt<Value<'js>>| {
        let bytes = convert::bytes_of(&bytes)?;
        rquickjs::Result::Ok(String::from_utf8_lossy(&bytes).into_owned())
    })?;
    buffer.set("toString", to_string.with_name("toString")?)?;

    let alloc = Function::new(ctx.clone(), |ctx: Ctx<'js>, size: Value<'js>| {
        convert::construct::<Value<'js>>(&ctx, "Uint8Array", vec![size])
    })?;
    buffer.set("alloc", alloc.with_name("alloc")?)?;

    let is_buffer = Function::new(ctx.clone(), |ctx: Ctx<'js>, value: Opt<Value<'js>>| match value.0 {
        Some(value) if value.is_object() => {
            rquickjs::Result::Ok(convert::type_tag(&ctx, value)? == "[object Uint8Array]")
        }
        _ => Ok(false),
    })?;
    buffer.set("isBuffer", is_buffer.with_name("isBuffer")?)?;

    Ok(buffer)
}
