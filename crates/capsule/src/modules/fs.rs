//! Filesystem stub.
//!
//! Scripts get no file access. Synchronous operations throw, callback
//! operations report an error to their callback on a later tick, and
//! `existsSync` answers `false` with a warning.

use std::time::Duration;

use rquickjs::convert::Coerced;
use rquickjs::function::{Opt, Rest};
use rquickjs::{Ctx, Exception, Function, IntoJs, Object, Value};

use super::{BuiltinModule, ModuleEnv};
use crate::sandbox::{OutputLevel, convert};

fn unsupported(op: &str) -> String {
    format!("{} not implemented in sandboxed environment", op)
}

fn throwing<'js>(ctx: &Ctx<'js>, op: &'static str) -> rquickjs::Result<Function<'js>> {
    Function::new(ctx.clone(), move |ctx: Ctx<'js>, _args: Rest<Value<'js>>| {
        rquickjs::Result::<()>::Err(Exception::throw_message(&ctx, &unsupported(op)))
    })?
    .with_name(op)
}

/// Calls the last function argument with an `Error` on the next timer tick.
fn deferred<'js>(ctx: &Ctx<'js>, env: &ModuleEnv, op: &'static str) -> rquickjs::Result<Function<'js>> {
    let events = env.events.clone();
    Function::new(ctx.clone(), move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<()> {
        let Some(callback) = args.0.iter().rev().find_map(|arg| arg.as_function().cloned()) else {
            return Ok(());
        };
        let error: Value<'js> = convert::construct(&ctx, "Error", vec![unsupported(op).into_js(&ctx)?])?;
        events.schedule(&ctx, callback, Duration::ZERO, false, vec![error]);
        Ok(())
    })?
    .with_name(op)
}

/// The `fs` module.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsModule;

impl BuiltinModule for FsModule {
    fn name(&self) -> &'static str {
        "fs"
    }

    fn methods(&self) -> &'static [&'static str] {
        &["readFileSync", "writeFileSync", "existsSync", "readFile", "writeFile"]
    }

    fn instantiate<'js>(&self, ctx: &Ctx<'js>, env: &ModuleEnv) -> rquickjs::Result<Object<'js>> {
        let fs = Object::new(ctx.clone())?;
        fs.set("readFileSync", throwing(ctx, "readFileSync")?)?;
        fs.set("writeFileSync", throwing(ctx, "writeFileSync")?)?;
        fs.set("readFile", deferred(ctx, env, "readFile")?)?;
        fs.set("writeFile", deferred(ctx, env, "writeFile")?)?;

        let sink = env.sink.clone();
        let exists = Function::new(ctx.clone(), move |path: Opt<Coerced<String>>| {
            let path = path.0.map(|p| p.0).unwrap_or_else(|| "undefined".to_string());
            sink.emit(
                OutputLevel::Warn,
                &format!("fs.existsSync({}) - returning false (not implemented)", path),
            );
            false
        })?;
        fs.set("existsSync", exists.with_name("existsSync")?)?;
        Ok(fs)
    }
}
